//! Session materialization from the cookie store
//!
//! Every `/auth/session` request rebuilds the view from cookies; nothing is
//! cached server-side.

use axum_extra::extract::cookie::CookieJar;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use super::cookies::{
    clear_access, read_meta, read_value, CookiePolicy, ID_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
};
use super::jwt::{IdTokenVerifier, VerificationError};
use crate::config::SessionVerification;

/// ID token claims this service reads; anything else lands in `extra`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Error, PartialEq)]
pub enum ClaimsError {
    #[error("token is not a three-part JWT")]
    Structure,
    #[error("payload is not base64url: {0}")]
    Encoding(String),
    #[error("payload is not a JSON claims object: {0}")]
    Json(String),
}

/// Decode JWT claims without checking the signature.
///
/// Padding on the payload segment is tolerated.
pub fn decode_claims(token: &str) -> Result<IdTokenClaims, ClaimsError> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ClaimsError::Structure);
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClaimsError::Encoding(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ClaimsError::Json(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl SessionUser {
    fn from_claims(claims: &IdTokenClaims) -> Option<Self> {
        let id = claims.sub.clone().filter(|s| !s.is_empty())?;
        Some(Self {
            id,
            email: claims.email.clone(),
            name: claims
                .name
                .clone()
                .or_else(|| claims.preferred_username.clone()),
        })
    }
}

/// What `/auth/session` answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub user: Option<SessionUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub has_refresh_token: bool,
    #[serde(default)]
    pub is_authenticated: bool,
    #[serde(default)]
    pub needs_refresh: bool,
}

impl SessionView {
    /// No usable ID token. A surviving refresh token means the session can
    /// still be recovered without a login round trip.
    pub fn unauthenticated(has_refresh_token: bool) -> Self {
        Self {
            user: None,
            expires_at: None,
            has_refresh_token,
            is_authenticated: false,
            needs_refresh: has_refresh_token,
        }
    }

    fn expired(has_refresh_token: bool) -> Self {
        Self {
            needs_refresh: true,
            ..Self::unauthenticated(has_refresh_token)
        }
    }

    fn authenticated(user: SessionUser, expires_at: Option<i64>, has_refresh_token: bool) -> Self {
        Self {
            user: Some(user),
            expires_at,
            has_refresh_token,
            is_authenticated: true,
            needs_refresh: false,
        }
    }
}

/// Rebuild the session view from cookies.
///
/// Under [`SessionVerification::Jwks`], an invalid or expired ID token also
/// clears the access, ID and metadata cookies; the refresh cookie is kept so
/// the refresh path stays available.
pub async fn materialize(
    jar: CookieJar,
    verifier: &IdTokenVerifier,
    strategy: SessionVerification,
    policy: &CookiePolicy,
    now_ms: i64,
) -> (CookieJar, SessionView) {
    let has_refresh_token = read_value(&jar, REFRESH_TOKEN_COOKIE).is_some();

    let Some(id_token) = read_value(&jar, ID_TOKEN_COOKIE) else {
        return (jar, SessionView::unauthenticated(has_refresh_token));
    };

    let claims = match strategy {
        SessionVerification::DecodeOnly => match decode_claims(&id_token) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(
                    event = "session_token_malformed",
                    error = %e,
                    token_len = id_token.len(),
                    "Treating malformed ID token as absent"
                );
                return (jar, SessionView::unauthenticated(has_refresh_token));
            }
        },
        SessionVerification::Jwks => match verifier.verify(&id_token).await {
            Ok(claims) => claims,
            Err(VerificationError::KeySet(reason)) => {
                // Provider outage: the token may be fine, so leave the cookies alone
                tracing::error!(
                    event = "session_jwks_unavailable",
                    reason = %reason,
                    "Cannot verify ID token"
                );
                return (jar, SessionView::unauthenticated(has_refresh_token));
            }
            Err(e) => {
                tracing::warn!(
                    event = "session_token_invalid",
                    error = %e,
                    "Clearing session cookies for unverifiable ID token"
                );
                let jar = clear_access(jar, policy);
                return (jar, SessionView::unauthenticated(has_refresh_token));
            }
        },
    };

    let meta_expires_at = read_meta(&jar).map(|meta| meta.expires_at);
    let token_expires_at = claims.exp.map(|exp| exp.saturating_mul(1000));
    // The meta cookie is readable and writable by the page; under jwks it can
    // only shorten the verified token lifetime
    let expires_at = match (strategy, meta_expires_at, token_expires_at) {
        (SessionVerification::Jwks, Some(meta), Some(exp)) => Some(meta.min(exp)),
        (_, meta, exp) => meta.or(exp),
    };

    if let Some(expires_at) = expires_at {
        if expires_at <= now_ms {
            tracing::info!(
                event = "session_expired",
                expired_ms_ago = now_ms.saturating_sub(expires_at),
                has_refresh_token = has_refresh_token,
                "Session expired"
            );
            let jar = match strategy {
                SessionVerification::Jwks => clear_access(jar, policy),
                SessionVerification::DecodeOnly => jar,
            };
            return (jar, SessionView::expired(has_refresh_token));
        }
    }

    match SessionUser::from_claims(&claims) {
        Some(user) => (
            jar,
            SessionView::authenticated(user, expires_at, has_refresh_token),
        ),
        None => {
            tracing::warn!(event = "session_token_missing_sub", "ID token has no subject");
            (jar, SessionView::unauthenticated(has_refresh_token))
        }
    }
}
