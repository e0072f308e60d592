//! Authentication handlers for login, callback, refresh, logout and session
//!
//! Every handler takes the request's [`CookieJar`] and returns it alongside
//! the response, so cookie writes and removals travel with every outcome.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::authorize::{build_authorization_url, AuthorizationRequestContext};
use super::callback::{complete_callback, found, CallbackParams, CallbackStage};
use super::cookies::{
    clear_kratos_sessions, clear_tokens, clear_transient, read_value, store_transient,
    take_transient, write_tokens, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
};
use super::error::{AuthError, UpstreamError};
use super::helpers::build_logout_url;
use super::session::materialize;
use super::tokens::now_ms;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "returnTo")]
    pub return_to: Option<String>,
    pub redirect: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl LoginQuery {
    fn wants_redirect(&self) -> bool {
        matches!(self.redirect.as_deref(), Some("true") | Some("1"))
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Login handler - initiates the authorization code + PKCE flow
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
    jar: CookieJar,
) -> Response {
    // A failed callback lands here; answer instead of starting another round trip
    if let Some(error) = &query.error {
        tracing::info!(error = %error, "Login page reached with callback error");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": error,
                "error_description": query.error_description,
            })),
        )
            .into_response();
    }

    let wants_redirect = query.wants_redirect();
    let ctx = AuthorizationRequestContext::generate(query.return_to);
    let authorization_url =
        build_authorization_url(state.provider.oauth(), &ctx, &state.config.scopes());
    let jar = store_transient(jar, &ctx, &state.cookie_policy);

    tracing::info!(
        has_return_to = ctx.return_to.is_some(),
        redirect = wants_redirect,
        "Starting authorization request"
    );

    if wants_redirect {
        (jar, found(authorization_url.to_string())).into_response()
    } else {
        (
            jar,
            Json(json!({ "authorizationUrl": authorization_url.as_str() })),
        )
            .into_response()
    }
}

/// Callback handler - validates the provider response and exchanges the code
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Response {
    tracing::info!(stage = CallbackStage::Received.as_str(), "OAuth callback received");

    // Cleared before any validation branch so every outcome drops them
    let (jar, secrets) = take_transient(jar, &state.cookie_policy);

    match complete_callback(
        params,
        secrets,
        &state.provider,
        &state.config.app_url,
        now_ms(),
    )
    .await
    {
        Ok(success) => {
            let jar = write_tokens(jar, &success.token_set, &state.cookie_policy);
            tracing::debug!(stage = CallbackStage::CookiesWritten.as_str(), "Session cookies written");
            tracing::info!(
                stage = CallbackStage::Redirected.as_str(),
                redirect_to = %success.redirect_to,
                "Login completed"
            );
            (jar, found(success.redirect_to)).into_response()
        }
        Err(failure) => (jar, failure.into_response(&state.config.login_page_path)).into_response(),
    }
}

/// Refresh handler - trades the refresh token cookie for a new token set
pub async fn refresh_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let Some(refresh_token) = read_value(&jar, REFRESH_TOKEN_COOKIE) else {
        tracing::info!(event = "refresh_without_token", "No refresh token cookie");
        return (jar, AuthError::ExpiredCredential("No refresh token available")).into_response();
    };

    match state.provider.refresh(refresh_token, now_ms()).await {
        Ok(token_set) => {
            let expires_at = token_set.expires_at;
            let jar = write_tokens(jar, &token_set, &state.cookie_policy);
            tracing::info!(
                rotated = token_set.refresh_token.is_some(),
                expires_at = expires_at,
                "Token refresh succeeded"
            );
            (jar, Json(json!({ "expiresAt": expires_at }))).into_response()
        }
        Err(e @ UpstreamError::Rejected { .. }) => {
            tracing::warn!(event = "refresh_rejected", error = %e, "Refresh token rejected");
            let jar = clear_tokens(jar, &state.cookie_policy);
            let error = AuthError::Upstream {
                status: StatusCode::UNAUTHORIZED,
                message: "Token refresh failed",
            };
            (jar, error).into_response()
        }
        Err(e @ UpstreamError::Transport { .. }) => {
            tracing::error!(event = "refresh_transport_failed", error = %e, "Token refresh failed");
            let error = AuthError::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Token refresh failed",
            };
            (jar, error).into_response()
        }
    }
}

/// Logout handler - clears local state, then best-effort revocation
pub async fn logout_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let access_token = read_value(&jar, ACCESS_TOKEN_COOKIE);

    let jar = clear_tokens(jar, &state.cookie_policy);
    let jar = clear_transient(jar, &state.cookie_policy);
    let (jar, kratos_cleared) = clear_kratos_sessions(jar, &state.cookie_policy);

    if let Some(access_token) = access_token {
        // Local logout already happened; a provider failure must not undo it
        if let Err(e) = state.provider.revoke_access_token(&access_token).await {
            tracing::warn!(event = "revocation_failed", error = %e, "Token revocation failed");
        }
    }

    let logout_url = build_logout_url(state.config.end_session_url.as_deref());
    tracing::info!(
        kratos_cleared = kratos_cleared,
        logout_url = %logout_url,
        "Logout completed"
    );

    (
        jar,
        Json(json!({ "success": true, "logoutUrl": logout_url })),
    )
        .into_response()
}

/// Session handler - rebuilds the session view from cookies
pub async fn session_handler(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (jar, view) = materialize(
        jar,
        &state.id_token_verifier,
        state.config.session_verification,
        &state.cookie_policy,
        now_ms(),
    )
    .await;
    (jar, Json(view)).into_response()
}
