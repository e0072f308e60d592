use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::Config;

/// How long Hydra remembers an accepted login or consent
pub const REMEMBER_FOR_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeKind {
    Login,
    Consent,
    Logout,
}

impl ChallengeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChallengeKind::Login => "login",
            ChallengeKind::Consent => "consent",
            ChallengeKind::Logout => "logout",
        }
    }

    /// Query parameter and body field carrying the challenge
    pub fn challenge_param(&self) -> &'static str {
        match self {
            ChallengeKind::Login => "login_challenge",
            ChallengeKind::Consent => "consent_challenge",
            ChallengeKind::Logout => "logout_challenge",
        }
    }
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0} is required")]
    MissingParameter(&'static str),
    #[error("Failed to {action} {kind} request")]
    Upstream {
        kind: &'static str,
        action: &'static str,
    },
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdminError::MissingParameter(_) => StatusCode::BAD_REQUEST,
            AdminError::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CompletedRequest {
    redirect_to: String,
}

/// Client for Hydra's admin API
pub struct HydraAdmin {
    base_url: String,
    http: reqwest::Client,
}

impl HydraAdmin {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        Self {
            base_url: config.hydra_admin_url.clone(),
            http,
        }
    }

    fn request_url(&self, kind: ChallengeKind) -> String {
        format!(
            "{}/admin/oauth2/auth/requests/{}",
            self.base_url,
            kind.as_str()
        )
    }

    /// Fetch a pending login, consent or logout request
    pub async fn get_request(&self, kind: ChallengeKind, challenge: &str) -> Result<Value, AdminError> {
        let upstream = AdminError::Upstream {
            kind: kind.as_str(),
            action: "fetch",
        };

        let response = self
            .http
            .get(self.request_url(kind))
            .query(&[(kind.challenge_param(), challenge)])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(kind = kind.as_str(), error = %e, "Hydra admin unreachable");
                AdminError::Upstream {
                    kind: kind.as_str(),
                    action: "fetch",
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                kind = kind.as_str(),
                status = status.as_u16(),
                "Hydra admin rejected request lookup"
            );
            return Err(upstream);
        }

        response.json::<Value>().await.map_err(|e| {
            tracing::error!(kind = kind.as_str(), error = %e, "Unparseable Hydra admin response");
            upstream
        })
    }

    /// Accept a pending request; `body` is `None` for logout
    pub async fn accept(
        &self,
        kind: ChallengeKind,
        challenge: &str,
        body: Option<Value>,
    ) -> Result<String, AdminError> {
        let upstream = || AdminError::Upstream {
            kind: kind.as_str(),
            action: "accept",
        };

        let mut request = self
            .http
            .put(format!("{}/accept", self.request_url(kind)))
            .query(&[(kind.challenge_param(), challenge)]);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(kind = kind.as_str(), error = %e, "Hydra admin unreachable");
            upstream()
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(
                kind = kind.as_str(),
                status = status.as_u16(),
                "Hydra admin rejected accept"
            );
            return Err(upstream());
        }

        let completed: CompletedRequest = response.json().await.map_err(|e| {
            tracing::error!(kind = kind.as_str(), error = %e, "Unparseable Hydra admin response");
            upstream()
        })?;

        tracing::info!(kind = kind.as_str(), "Hydra request accepted");
        Ok(completed.redirect_to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::provider::create_http_client;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn admin(uri: &str) -> HydraAdmin {
        let config = Config::from_lookup(|name| match name {
            "HYDRA_ADMIN_URL" => Some(uri.to_string()),
            _ => None,
        })
        .unwrap();
        HydraAdmin::new(&config, create_http_client(5, 10).unwrap())
    }

    #[tokio::test]
    async fn test_get_request_passes_challenge() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/admin/oauth2/auth/requests/consent"))
            .and(query_param("consent_challenge", "c-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "skip": true, "subject": "u" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let value = admin(&server.uri())
            .get_request(ChallengeKind::Consent, "c-1")
            .await
            .unwrap();
        assert_eq!(value["subject"], "u");
    }

    #[tokio::test]
    async fn test_accept_returns_redirect() {
        let server = MockServer::start().await;
        let body = json!({ "subject": "u", "remember": true, "remember_for": 3600 });
        Mock::given(method("PUT"))
            .and(path("/admin/oauth2/auth/requests/login/accept"))
            .and(query_param("login_challenge", "l-1"))
            .and(body_json(body.clone()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "redirect_to": "http://hydra/continue" })),
            )
            .mount(&server)
            .await;

        let redirect = admin(&server.uri())
            .accept(ChallengeKind::Login, "l-1", Some(body))
            .await
            .unwrap();
        assert_eq!(redirect, "http://hydra/continue");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_generic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("secret detail"))
            .mount(&server)
            .await;

        let err = admin(&server.uri())
            .get_request(ChallengeKind::Logout, "x")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch logout request");
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
