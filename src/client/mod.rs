//! Client side of the session: keeps tokens fresh by calling the BFF
//! shortly before they expire.

pub mod http;
pub mod scheduler;

pub use http::BffClient;
pub use scheduler::{
    refresh_delay, RefreshError, RefreshFailure, RefreshScheduler, SchedulerState, SessionApi,
};
