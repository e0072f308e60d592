use super::handlers::{healthz_handler, readyz_handler};
use crate::{
    auth::{callback_handler, login_handler, logout_handler, refresh_handler, session_handler},
    hydra, AppState,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/auth/login", get(login_handler))
        .route("/auth/callback", get(callback_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/session", get(session_handler))
        .route(
            "/api/hydra/login",
            get(hydra::get_login_handler).post(hydra::accept_login_handler),
        )
        .route(
            "/api/hydra/consent",
            get(hydra::get_consent_handler).post(hydra::accept_consent_handler),
        )
        .route(
            "/api/hydra/logout",
            get(hydra::get_logout_handler).post(hydra::accept_logout_handler),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
