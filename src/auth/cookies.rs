//! Cookie codec for the authorization round trip and the session
//!
//! Every function takes the request's [`CookieJar`] and returns the updated
//! jar; nothing reads ambient request state. Removal is always expressed as an
//! explicit empty cookie with `Max-Age=0` so the browser is told to drop it
//! whether or not this request carried it.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

use super::authorize::AuthorizationRequestContext;
use super::tokens::{TokenMeta, TokenSet};

pub const STATE_COOKIE: &str = "oauth_state";
pub const NONCE_COOKIE: &str = "oauth_nonce";
pub const PKCE_VERIFIER_COOKIE: &str = "oauth_pkce_verifier";
pub const RETURN_TO_COOKIE: &str = "oauth_return_to";

pub const ACCESS_TOKEN_COOKIE: &str = "oauth_access_token";
pub const ID_TOKEN_COOKIE: &str = "oauth_id_token";
pub const REFRESH_TOKEN_COOKIE: &str = "oauth_refresh_token";
pub const TOKEN_META_COOKIE: &str = "oauth_token_meta";

/// Kratos session cookies are dropped on logout as well
pub const KRATOS_SESSION_PREFIX: &str = "ory_kratos_session";

pub const TRANSIENT_COOKIES: [&str; 4] = [
    STATE_COOKIE,
    NONCE_COOKIE,
    PKCE_VERIFIER_COOKIE,
    RETURN_TO_COOKIE,
];

pub const SESSION_COOKIES: [&str; 4] = [
    ACCESS_TOKEN_COOKIE,
    ID_TOKEN_COOKIE,
    REFRESH_TOKEN_COOKIE,
    TOKEN_META_COOKIE,
];

/// Ten minutes to complete the provider round trip
pub const TRANSIENT_MAX_AGE_SECS: i64 = 600;

/// Thirty days
pub const REFRESH_TOKEN_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

/// Attributes shared by every cookie this service writes
#[derive(Debug, Clone, Default)]
pub struct CookiePolicy {
    pub secure: bool,
    pub domain: Option<String>,
}

impl CookiePolicy {
    pub fn new(secure: bool, domain: Option<String>) -> Self {
        Self { secure, domain }
    }

    fn build(
        &self,
        name: &'static str,
        value: String,
        http_only: bool,
        same_site: SameSite,
        max_age_secs: i64,
    ) -> Cookie<'static> {
        let mut builder = Cookie::build((name, value))
            .http_only(http_only)
            .secure(self.secure)
            .same_site(same_site)
            .path("/")
            .max_age(Duration::seconds(max_age_secs));
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }

    /// Empty value, `Max-Age=0`, same path/domain as the original
    pub fn removal(&self, name: impl Into<String>) -> Cookie<'static> {
        let mut builder = Cookie::build((name.into(), ""))
            .path("/")
            .max_age(Duration::ZERO);
        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        builder.build()
    }
}

/// Read a cookie value, treating empty (cleared) cookies as absent
pub fn read_value(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Transient secrets (one authorization round trip)
// =============================================================================

/// Secrets recovered from the transient cookies at callback time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransientSecrets {
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub pkce_verifier: Option<String>,
    pub return_to: Option<String>,
}

/// Store `state`, `nonce`, verifier and `return_to` for the callback.
///
/// `SameSite=Lax`: these must survive the top-level redirect back from the
/// provider, which `Strict` would drop when the provider is cross-site.
pub fn store_transient(
    jar: CookieJar,
    ctx: &AuthorizationRequestContext,
    policy: &CookiePolicy,
) -> CookieJar {
    let transient = |name, value: &str| {
        policy.build(
            name,
            value.to_string(),
            true,
            SameSite::Lax,
            TRANSIENT_MAX_AGE_SECS,
        )
    };

    let mut jar = jar
        .add(transient(STATE_COOKIE, &ctx.state))
        .add(transient(NONCE_COOKIE, &ctx.nonce))
        .add(transient(PKCE_VERIFIER_COOKIE, &ctx.pkce_verifier));

    jar = match ctx.return_to.as_deref() {
        Some(return_to) => jar.add(transient(RETURN_TO_COOKIE, return_to)),
        // A stale return_to from an abandoned attempt must not leak into this one
        None => jar.add(policy.removal(RETURN_TO_COOKIE)),
    };
    jar
}

/// Emit removal cookies for all four transient secrets. Idempotent.
pub fn clear_transient(jar: CookieJar, policy: &CookiePolicy) -> CookieJar {
    TRANSIENT_COOKIES
        .iter()
        .fold(jar, |jar, name| jar.add(policy.removal(*name)))
}

/// Read the transient secrets, then clear them before anything can inspect them.
pub fn take_transient(jar: CookieJar, policy: &CookiePolicy) -> (CookieJar, TransientSecrets) {
    let secrets = TransientSecrets {
        state: read_value(&jar, STATE_COOKIE),
        nonce: read_value(&jar, NONCE_COOKIE),
        pkce_verifier: read_value(&jar, PKCE_VERIFIER_COOKIE),
        return_to: read_value(&jar, RETURN_TO_COOKIE),
    };
    (clear_transient(jar, policy), secrets)
}

// =============================================================================
// Session tokens
// =============================================================================

/// Persist a token set.
///
/// Access, ID and refresh tokens are httpOnly. The metadata cookie is readable
/// by client script so it can schedule refresh without a round trip.
pub fn write_tokens(jar: CookieJar, tokens: &TokenSet, policy: &CookiePolicy) -> CookieJar {
    let mut jar = jar.add(policy.build(
        ACCESS_TOKEN_COOKIE,
        tokens.access_token.clone(),
        true,
        SameSite::Strict,
        tokens.expires_in,
    ));

    if let Some(id_token) = &tokens.id_token {
        jar = jar.add(policy.build(
            ID_TOKEN_COOKIE,
            id_token.clone(),
            true,
            SameSite::Strict,
            tokens.expires_in,
        ));
    }

    // Rotation is provider policy; keep the existing cookie when none was issued
    if let Some(refresh_token) = &tokens.refresh_token {
        jar = jar.add(policy.build(
            REFRESH_TOKEN_COOKIE,
            refresh_token.clone(),
            true,
            SameSite::Strict,
            REFRESH_TOKEN_MAX_AGE_SECS,
        ));
    }

    match serde_json::to_string(&tokens.meta()) {
        Ok(meta) => jar.add(policy.build(
            TOKEN_META_COOKIE,
            meta,
            false,
            SameSite::Strict,
            tokens.expires_in,
        )),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize token metadata");
            jar
        }
    }
}

/// Emit removal cookies for the four session cookies. Idempotent.
pub fn clear_tokens(jar: CookieJar, policy: &CookiePolicy) -> CookieJar {
    SESSION_COOKIES
        .iter()
        .fold(jar, |jar, name| jar.add(policy.removal(*name)))
}

/// Clear access, ID and metadata cookies but keep the refresh token
pub fn clear_access(jar: CookieJar, policy: &CookiePolicy) -> CookieJar {
    [ACCESS_TOKEN_COOKIE, ID_TOKEN_COOKIE, TOKEN_META_COOKIE]
        .iter()
        .fold(jar, |jar, name| jar.add(policy.removal(*name)))
}

/// Clear any Kratos session cookies the browser sent along
pub fn clear_kratos_sessions(jar: CookieJar, policy: &CookiePolicy) -> (CookieJar, usize) {
    let names: Vec<String> = jar
        .iter()
        .map(|c| c.name().to_string())
        .filter(|name| name.starts_with(KRATOS_SESSION_PREFIX))
        .collect();
    let count = names.len();
    let jar = names
        .into_iter()
        .fold(jar, |jar, name| jar.add(policy.removal(name)));
    (jar, count)
}

/// Parse the readable metadata cookie; malformed values are treated as absent
pub fn read_meta(jar: &CookieJar) -> Option<TokenMeta> {
    let raw = read_value(jar, TOKEN_META_COOKIE)?;
    match serde_json::from_str(&raw) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed token metadata cookie");
            None
        }
    }
}
