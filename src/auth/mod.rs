//! Authentication module
//!
//! Authorization Code + PKCE against Ory Hydra, with the session held in
//! httpOnly cookies.
//!
//! ## Structure
//!
//! - `pkce`: verifier/challenge and random token generation
//! - `authorize`: per-attempt secrets and the authorization URL
//! - `cookies`: transient and session cookie codec
//! - `callback`: callback validation stages
//! - `provider`: token endpoint client (code exchange, refresh, revocation)
//! - `session`: session view materialization
//! - `jwt`: JWKS-backed ID token verification
//! - `helpers`: pure URL helpers
//! - `handlers`: HTTP handlers
//!
//! ## Authentication Flow
//!
//! 1. Browser calls `/auth/login` → transient secrets set → provider authorization URL
//! 2. Provider authenticates → redirect to `/auth/callback`
//! 3. Secrets cleared, state/nonce checked, code exchanged → session cookies → `returnTo`
//! 4. `/auth/session` on each page load; `/auth/refresh` shortly before expiry
//! 5. `/auth/logout` clears cookies, revokes, returns the provider logout URL

pub mod authorize;
pub mod callback;
pub mod cookies;
pub mod error;
pub mod handlers;
pub mod helpers;
pub mod jwt;
pub mod pkce;
pub mod provider;
pub mod session;
pub mod tokens;

// Re-export handlers for convenient routing
pub use handlers::{
    callback_handler, login_handler, logout_handler, refresh_handler, session_handler, LoginQuery,
};

pub use callback::{CallbackFailure, CallbackParams, CallbackStage};
pub use cookies::CookiePolicy;
pub use error::{AuthError, UpstreamError};
pub use jwt::IdTokenVerifier;
pub use provider::ProviderClient;
pub use session::{SessionUser, SessionView};
pub use tokens::{TokenMeta, TokenSet};
