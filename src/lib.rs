//! Session BFF library
//!
//! OAuth2 Authorization Code + PKCE backend-for-frontend in front of Ory Hydra.

#![deny(dead_code)]

pub mod auth;
pub mod client;
pub mod config;
pub mod hydra;
pub mod web;

use auth::provider::create_http_client;
use auth::{CookiePolicy, IdTokenVerifier, ProviderClient};
use config::Config;
use hydra::HydraAdmin;

pub struct AppState {
    pub config: Config,
    pub cookie_policy: CookiePolicy,
    pub provider: ProviderClient,
    pub id_token_verifier: IdTokenVerifier,
    pub hydra_admin: HydraAdmin,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http = create_http_client(
            config.http_connect_timeout_secs,
            config.http_request_timeout_secs,
        )?;

        Ok(Self {
            cookie_policy: CookiePolicy::new(config.cookie_secure, config.cookie_domain.clone()),
            provider: ProviderClient::new(&config, http.clone())?,
            id_token_verifier: IdTokenVerifier::new(&config, http.clone()),
            hydra_admin: HydraAdmin::new(&config, http),
            config,
        })
    }
}
