//! Token endpoint client for the OAuth2 provider
//!
//! Code exchange and refresh go through the `oauth2` crate (HTTP Basic client
//! authentication, form-encoded bodies). Revocation is a plain reqwest POST:
//! the `oauth2` crate refuses non-HTTPS revocation URLs, which would make
//! revocation silently impossible against a local provider.

use oauth2::{
    basic::{BasicErrorResponseType, BasicTokenType},
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
    ExtraTokenFields, HttpClientError, PkceCodeVerifier, RedirectUrl, RefreshToken,
    RequestTokenError, RevocationErrorResponseType, StandardErrorResponse,
    StandardRevocableToken, StandardTokenIntrospectionResponse, StandardTokenResponse,
    TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::UpstreamError;
use super::tokens::TokenSet;
use crate::config::Config;

/// Custom extra fields to capture id_token from OIDC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcTokenFields {
    pub id_token: Option<String>,
}

impl ExtraTokenFields for OidcTokenFields {}

pub type OidcTokenResponse = StandardTokenResponse<OidcTokenFields, BasicTokenType>;

/// Type alias for our configured OAuth client with OIDC support
pub type ConfiguredOAuthClient = oauth2::Client<
    StandardErrorResponse<BasicErrorResponseType>,
    OidcTokenResponse,
    StandardTokenIntrospectionResponse<OidcTokenFields, BasicTokenType>,
    StandardRevocableToken,
    StandardErrorResponse<RevocationErrorResponseType>,
    EndpointSet,    // HasAuthUrl
    EndpointNotSet, // HasDeviceAuthUrl
    EndpointNotSet, // HasIntrospectionUrl
    EndpointNotSet, // HasRevocationUrl
    EndpointSet,    // HasTokenUrl
>;

type TokenRequestError =
    RequestTokenError<HttpClientError<reqwest::Error>, StandardErrorResponse<BasicErrorResponseType>>;

/// Create a reqwest client for provider calls using config timeouts
pub fn create_http_client(
    connect_timeout_secs: u64,
    request_timeout_secs: u64,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none()) // Security: prevent SSRF
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(request_timeout_secs))
        .build()
}

/// Initialize the OAuth2 client from configuration
pub fn create_oauth_client(config: &Config) -> Result<ConfiguredOAuthClient, String> {
    let auth_url = AuthUrl::new(config.authorization_endpoint())
        .map_err(|e| format!("Invalid auth URL: {}", e))?;
    let token_url =
        TokenUrl::new(config.token_endpoint()).map_err(|e| format!("Invalid token URL: {}", e))?;
    let redirect_url = RedirectUrl::new(config.redirect_uri.clone())
        .map_err(|e| format!("Invalid redirect URL: {}", e))?;

    let client = oauth2::Client::new(ClientId::new(config.client_id.clone()))
        .set_client_secret(ClientSecret::new(config.client_secret.clone()))
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url);

    Ok(client)
}

/// Provider-facing client shared by every handler
pub struct ProviderClient {
    oauth: ConfiguredOAuthClient,
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    revocation_url: String,
}

impl ProviderClient {
    pub fn new(config: &Config, http: reqwest::Client) -> anyhow::Result<Self> {
        let oauth = create_oauth_client(config).map_err(|e| anyhow::anyhow!(e))?;
        Ok(Self {
            oauth,
            http,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            revocation_url: config.revocation_endpoint(),
        })
    }

    pub fn oauth(&self) -> &ConfiguredOAuthClient {
        &self.oauth
    }

    /// `grant_type=authorization_code` with the PKCE verifier.
    /// The client's configured redirect URI is sent unchanged.
    pub async fn exchange_code(
        &self,
        code: String,
        pkce_verifier: String,
        now_ms: i64,
    ) -> Result<TokenSet, UpstreamError> {
        let response = self
            .oauth
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
            .request_async(&self.http)
            .await
            .map_err(|e| classify_token_error("token", e))?;

        Ok(token_set_from_response(&response, now_ms))
    }

    /// `grant_type=refresh_token`
    pub async fn refresh(&self, refresh_token: String, now_ms: i64) -> Result<TokenSet, UpstreamError> {
        let response = self
            .oauth
            .exchange_refresh_token(&RefreshToken::new(refresh_token))
            .request_async(&self.http)
            .await
            .map_err(|e| classify_token_error("token", e))?;

        Ok(token_set_from_response(&response, now_ms))
    }

    /// RFC 7009 revocation of an access token
    pub async fn revoke_access_token(&self, access_token: &str) -> Result<(), UpstreamError> {
        let response = self
            .http
            .post(&self.revocation_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("token", access_token), ("token_type_hint", "access_token")])
            .send()
            .await
            .map_err(|e| UpstreamError::Transport {
                endpoint: "revoke",
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(UpstreamError::Rejected {
                endpoint: "revoke",
                status: Some(status.as_u16()),
            })
        }
    }
}

fn token_set_from_response(response: &OidcTokenResponse, now_ms: i64) -> TokenSet {
    let scope = response.scopes().map(|scopes| {
        scopes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    });

    TokenSet::new(
        response.access_token().secret().clone(),
        response.extra_fields().id_token.clone(),
        response.refresh_token().map(|t| t.secret().clone()),
        token_type_name(response.token_type()),
        scope,
        response
            .expires_in()
            .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX)),
        now_ms,
    )
}

fn token_type_name(token_type: &BasicTokenType) -> String {
    match token_type {
        BasicTokenType::Bearer => "bearer".to_string(),
        BasicTokenType::Mac => "mac".to_string(),
        BasicTokenType::Extension(ext) => ext.clone(),
    }
}

/// Provider answered with an error vs. we never got a usable answer
fn classify_token_error(endpoint: &'static str, err: TokenRequestError) -> UpstreamError {
    match err {
        RequestTokenError::ServerResponse(response) => {
            tracing::warn!(
                endpoint = endpoint,
                error = ?response.error(),
                "Provider rejected token request"
            );
            UpstreamError::Rejected {
                endpoint,
                status: None,
            }
        }
        RequestTokenError::Parse(e, body) => {
            // Body is not logged: a partially parsed token response may carry secrets
            tracing::warn!(
                endpoint = endpoint,
                error = %e,
                body_len = body.len(),
                "Unparseable token endpoint response"
            );
            UpstreamError::Rejected {
                endpoint,
                status: None,
            }
        }
        RequestTokenError::Request(e) => UpstreamError::Transport {
            endpoint,
            reason: e.to_string(),
        },
        RequestTokenError::Other(reason) => UpstreamError::Transport { endpoint, reason },
    }
}
