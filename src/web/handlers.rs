use crate::{config::SessionVerification, AppState};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use std::sync::Arc;

/// Liveness probe - always returns OK if the process is running
pub async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe
///
/// Under JWKS session verification, ready once the key set has been cached
/// (Hydra reachable). Decode-only verification has no upstream dependency.
pub async fn readyz_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.config.session_verification == SessionVerification::DecodeOnly {
        return (StatusCode::OK, "ready");
    }

    if state.id_token_verifier.is_jwks_cached().await {
        (StatusCode::OK, "ready")
    } else {
        tracing::warn!("Readiness check failed: JWKS not cached");
        (StatusCode::SERVICE_UNAVAILABLE, "not ready: JWKS not cached")
    }
}
