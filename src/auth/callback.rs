//! Callback validation and code exchange
//!
//! The callback runs as a strictly ordered sequence of stages. Transient
//! secrets are taken (and their removal cookies emitted) by the caller before
//! [`complete_callback`] runs, so every outcome below already clears them.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use url::Url;

use super::cookies::TransientSecrets;
use super::error::AuthError;
use super::helpers::{build_login_error_url, safe_redirect_target};
use super::provider::ProviderClient;
use super::session::decode_claims;
use super::tokens::TokenSet;

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Where a callback is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStage {
    Received,
    StateChecked,
    ErrorFromProvider,
    CodePresent,
    TokenExchanged,
    NonceChecked,
    CookiesWritten,
    Redirected,
}

impl CallbackStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallbackStage::Received => "received",
            CallbackStage::StateChecked => "state_checked",
            CallbackStage::ErrorFromProvider => "error_from_provider",
            CallbackStage::CodePresent => "code_present",
            CallbackStage::TokenExchanged => "token_exchanged",
            CallbackStage::NonceChecked => "nonce_checked",
            CallbackStage::CookiesWritten => "cookies_written",
            CallbackStage::Redirected => "redirected",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackFailure {
    InvalidState,
    ProviderError {
        error: String,
        description: Option<String>,
    },
    MissingCode,
    MissingVerifier,
    ExchangeFailed,
    NonceMismatch,
}

impl CallbackFailure {
    /// Last stage reached before the failure
    pub fn stage(&self) -> CallbackStage {
        match self {
            CallbackFailure::InvalidState => CallbackStage::Received,
            CallbackFailure::ProviderError { .. } => CallbackStage::ErrorFromProvider,
            CallbackFailure::MissingCode => CallbackStage::StateChecked,
            CallbackFailure::MissingVerifier => CallbackStage::CodePresent,
            CallbackFailure::ExchangeFailed => CallbackStage::CodePresent,
            CallbackFailure::NonceMismatch => CallbackStage::TokenExchanged,
        }
    }

    /// Browser-facing failures redirect to the login page; missing request
    /// parameters answer 400 since there is nothing safe to redirect with.
    pub fn into_response(self, login_path: &str) -> Response {
        match self {
            CallbackFailure::InvalidState => found(build_login_error_url(
                login_path,
                "invalid_state",
                "Invalid or missing OAuth state",
            )),
            CallbackFailure::ProviderError { error, description } => found(build_login_error_url(
                login_path,
                &error,
                description.as_deref().unwrap_or_default(),
            )),
            CallbackFailure::MissingCode => {
                AuthError::ClientInput("Missing authorization code").into_response()
            }
            CallbackFailure::MissingVerifier => {
                AuthError::ClientInput("Missing PKCE verifier").into_response()
            }
            // Exchange and nonce failures are indistinguishable to the browser
            CallbackFailure::ExchangeFailed | CallbackFailure::NonceMismatch => found(
                build_login_error_url(login_path, "callback_failed", "Token exchange failed"),
            ),
        }
    }
}

/// Tokens to persist and where to send the browser
#[derive(Debug)]
pub struct CallbackSuccess {
    pub token_set: TokenSet,
    pub redirect_to: String,
}

/// `302 Found` with a `Location` header
pub fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Compare without short-circuiting on the first differing byte
fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// The returned `state` must be present and equal to the stored one
pub fn check_state(stored: Option<&str>, returned: Option<&str>) -> Result<(), CallbackFailure> {
    match (stored, returned) {
        (Some(stored), Some(returned)) if constant_time_eq(stored, returned) => Ok(()),
        _ => Err(CallbackFailure::InvalidState),
    }
}

/// When a nonce was stored, the ID token must exist, decode, and echo it
pub fn check_nonce(stored: Option<&str>, id_token: Option<&str>) -> Result<(), CallbackFailure> {
    let Some(stored) = stored else {
        return Ok(());
    };
    let claims = id_token
        .ok_or(CallbackFailure::NonceMismatch)
        .and_then(|token| decode_claims(token).map_err(|_| CallbackFailure::NonceMismatch))?;

    match claims.nonce.as_deref() {
        Some(nonce) if constant_time_eq(stored, nonce) => Ok(()),
        _ => Err(CallbackFailure::NonceMismatch),
    }
}

/// Run the callback from `Received` through `NonceChecked`.
///
/// The token endpoint is only reached once state, code and verifier are all
/// accounted for.
pub async fn complete_callback(
    params: CallbackParams,
    secrets: TransientSecrets,
    provider: &ProviderClient,
    app_url: &Url,
    now_ms: i64,
) -> Result<CallbackSuccess, CallbackFailure> {
    if let Err(failure) = check_state(secrets.state.as_deref(), params.state.as_deref()) {
        tracing::warn!(
            event = "callback_state_mismatch",
            stage = CallbackStage::Received.as_str(),
            has_stored_state = secrets.state.is_some(),
            has_returned_state = params.state.is_some(),
            "OAuth state validation failed"
        );
        return Err(failure);
    }

    if let Some(error) = params.error {
        tracing::warn!(
            event = "callback_provider_error",
            stage = CallbackStage::ErrorFromProvider.as_str(),
            error = %error,
            description = ?params.error_description,
            "Provider returned an authorization error"
        );
        return Err(CallbackFailure::ProviderError {
            error,
            description: params.error_description,
        });
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        tracing::warn!(
            event = "callback_missing_code",
            stage = CallbackStage::StateChecked.as_str(),
            "Callback without authorization code"
        );
        return Err(CallbackFailure::MissingCode);
    };

    let Some(pkce_verifier) = secrets.pkce_verifier else {
        tracing::warn!(
            event = "callback_missing_verifier",
            stage = CallbackStage::CodePresent.as_str(),
            "Callback without PKCE verifier cookie"
        );
        return Err(CallbackFailure::MissingVerifier);
    };

    let token_set = match provider.exchange_code(code, pkce_verifier, now_ms).await {
        Ok(token_set) => token_set,
        Err(e) => {
            tracing::error!(
                event = "callback_exchange_failed",
                stage = CallbackStage::CodePresent.as_str(),
                error = %e,
                "Authorization code exchange failed"
            );
            return Err(CallbackFailure::ExchangeFailed);
        }
    };

    if let Err(failure) = check_nonce(secrets.nonce.as_deref(), token_set.id_token.as_deref()) {
        tracing::warn!(
            event = "callback_nonce_mismatch",
            stage = CallbackStage::TokenExchanged.as_str(),
            has_id_token = token_set.id_token.is_some(),
            "ID token nonce validation failed"
        );
        return Err(failure);
    }

    let redirect_to = safe_redirect_target(app_url, secrets.return_to.as_deref());

    tracing::info!(
        stage = CallbackStage::NonceChecked.as_str(),
        has_id_token = token_set.id_token.is_some(),
        has_refresh_token = token_set.refresh_token.is_some(),
        expires_in = token_set.expires_in,
        redirect_to = %redirect_to,
        "OAuth callback validated"
    );

    Ok(CallbackSuccess {
        token_set,
        redirect_to,
    })
}
