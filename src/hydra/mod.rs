//! Hydra admin API proxy
//!
//! The external login/consent UI cannot reach Hydra's admin port; these
//! endpoints fetch and accept login, consent and logout challenges on its
//! behalf.

pub mod admin;
pub mod handlers;

pub use admin::{AdminError, ChallengeKind, HydraAdmin};
pub use handlers::{
    accept_consent_handler, accept_login_handler, accept_logout_handler, get_consent_handler,
    get_login_handler, get_logout_handler,
};
