use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// Current wall-clock time in epoch milliseconds
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Tokens issued by the provider for one session.
///
/// Deliberately not `Serialize`: raw tokens only ever leave the server in
/// httpOnly cookies.
#[derive(Clone)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    /// Seconds, as issued (or the default)
    pub expires_in: i64,
    /// Epoch milliseconds, derived here from `expires_in`
    pub expires_at: i64,
}

impl TokenSet {
    pub fn new(
        access_token: String,
        id_token: Option<String>,
        refresh_token: Option<String>,
        token_type: String,
        scope: Option<String>,
        expires_in: Option<i64>,
        now_ms: i64,
    ) -> Self {
        let expires_in = expires_in
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS)
            .min(i64::MAX / 1000);
        Self {
            access_token,
            id_token,
            refresh_token,
            token_type,
            scope,
            expires_in,
            expires_at: now_ms.saturating_add(expires_in * 1000),
        }
    }

    pub fn meta(&self) -> TokenMeta {
        TokenMeta {
            token_type: self.token_type.clone(),
            scope: self.scope.clone(),
            expires_at: self.expires_at,
        }
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("has_id_token", &self.id_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Non-sensitive token metadata, readable by client script (`oauth_token_meta`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenMeta {
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
    pub expires_at: i64,
}
