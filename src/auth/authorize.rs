//! Authorization request builder

use oauth2::{CsrfToken, PkceCodeChallenge, PkceCodeVerifier, Scope};
use url::Url;

use super::pkce::{compute_challenge, generate_verifier, secure_random_token};
use super::provider::ConfiguredOAuthClient;

/// Longest `return_to` carried through the round trip; longer values are dropped
/// rather than risking a cookie the browser silently discards.
const MAX_RETURN_TO_LEN: usize = 2048;

/// Secrets for one login attempt
#[derive(Debug, Clone, PartialEq)]
pub struct AuthorizationRequestContext {
    pub state: String,
    pub nonce: String,
    pub pkce_verifier: String,
    pub pkce_challenge: String,
    pub return_to: Option<String>,
}

impl AuthorizationRequestContext {
    pub fn generate(return_to: Option<String>) -> Self {
        let pkce_verifier = generate_verifier();
        let pkce_challenge = compute_challenge(&pkce_verifier);

        let return_to = return_to.filter(|r| !r.is_empty()).and_then(|r| {
            if r.len() > MAX_RETURN_TO_LEN {
                tracing::warn!(len = r.len(), "Dropping oversized returnTo");
                None
            } else {
                Some(r)
            }
        });

        Self {
            state: secure_random_token(),
            nonce: secure_random_token(),
            pkce_verifier,
            pkce_challenge,
            return_to,
        }
    }
}

/// Build the `/oauth2/auth` URL carrying client id, scope, redirect URI,
/// S256 PKCE challenge, `state` and `nonce`.
pub fn build_authorization_url(
    client: &ConfiguredOAuthClient,
    ctx: &AuthorizationRequestContext,
    scopes: &[String],
) -> Url {
    let verifier = PkceCodeVerifier::new(ctx.pkce_verifier.clone());
    let state = ctx.state.clone();

    let (url, _csrf) = client
        .authorize_url(move || CsrfToken::new(state))
        .add_scopes(scopes.iter().cloned().map(Scope::new))
        .set_pkce_challenge(PkceCodeChallenge::from_code_verifier_sha256(&verifier))
        .add_extra_param("nonce", ctx.nonce.clone())
        .url();

    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::create_oauth_client;
    use crate::config::Config;
    use std::collections::HashMap;

    fn client() -> ConfiguredOAuthClient {
        let config = Config::from_lookup(|_| None).unwrap();
        create_oauth_client(&config).unwrap()
    }

    fn query(url: &Url) -> HashMap<String, String> {
        url.query_pairs().into_owned().collect()
    }

    #[test]
    fn test_context_invariants() {
        let ctx = AuthorizationRequestContext::generate(Some("/settings".to_string()));
        assert_eq!(ctx.pkce_challenge, compute_challenge(&ctx.pkce_verifier));
        assert!(ctx.state.len() >= 8);
        assert_ne!(ctx.state, ctx.nonce);
        assert_eq!(ctx.return_to.as_deref(), Some("/settings"));
    }

    #[test]
    fn test_empty_and_oversized_return_to_are_dropped() {
        assert!(AuthorizationRequestContext::generate(Some(String::new()))
            .return_to
            .is_none());
        let long = format!("/{}", "a".repeat(MAX_RETURN_TO_LEN));
        assert!(AuthorizationRequestContext::generate(Some(long))
            .return_to
            .is_none());
    }

    #[test]
    fn test_authorization_url_parameters() {
        let ctx = AuthorizationRequestContext::generate(None);
        let scopes = vec!["openid".to_string(), "offline".to_string()];
        let url = build_authorization_url(&client(), &ctx, &scopes);
        let params = query(&url);

        assert!(url.as_str().starts_with("http://localhost:5444/oauth2/auth?"));
        assert_eq!(params["client_id"], "frontend-app");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "openid offline");
        assert_eq!(params["redirect_uri"], "http://localhost:3000/auth/callback");
        assert_eq!(params["code_challenge"], ctx.pkce_challenge);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["state"], ctx.state);
        assert_eq!(params["nonce"], ctx.nonce);
    }
}
