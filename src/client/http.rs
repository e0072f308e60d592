use reqwest::StatusCode;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use url::Url;

use super::scheduler::{RefreshError, SessionApi};
use crate::auth::session::SessionView;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    expires_at: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogoutResponse {
    logout_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    authorization_url: String,
}

/// HTTP client for the BFF's `/auth/*` endpoints.
///
/// Keeps its own cookie store, standing in for the browser's.
#[derive(Clone)]
pub struct BffClient {
    base_url: Url,
    http: reqwest::Client,
}

impl BffClient {
    pub fn new(base_url: Url, request_timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::ClientBuilder::new()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(request_timeout)
            .build()?;
        Ok(Self { base_url, http })
    }

    fn endpoint(&self, path: &str) -> Result<Url, RefreshError> {
        self.base_url
            .join(path)
            .map_err(|e| RefreshError::Transient(format!("invalid endpoint: {}", e)))
    }

    /// Start a login; yields the provider authorization URL
    pub async fn login_url(&self, return_to: Option<&str>) -> Result<String, RefreshError> {
        let mut url = self.endpoint("/auth/login")?;
        if let Some(return_to) = return_to {
            url.query_pairs_mut().append_pair("returnTo", return_to);
        }
        let response = self.http.get(url).send().await.map_err(transport)?;
        let login: LoginResponse = json_body(response).await?;
        Ok(login.authorization_url)
    }
}

fn transport(e: reqwest::Error) -> RefreshError {
    RefreshError::Transient(e.to_string())
}

async fn json_body<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, RefreshError> {
    match response.status() {
        status if status.is_success() => response.json().await.map_err(transport),
        StatusCode::UNAUTHORIZED => Err(RefreshError::Unauthorized),
        status => Err(RefreshError::Transient(format!(
            "unexpected status {}",
            status.as_u16()
        ))),
    }
}

impl SessionApi for BffClient {
    fn refresh(&self) -> impl Future<Output = Result<i64, RefreshError>> + Send {
        let client = self.clone();
        async move {
            let url = client.endpoint("/auth/refresh")?;
            let response = client.http.post(url).send().await.map_err(transport)?;
            let refreshed: RefreshResponse = json_body(response).await?;
            Ok(refreshed.expires_at)
        }
    }

    fn session(&self) -> impl Future<Output = Result<SessionView, RefreshError>> + Send {
        let client = self.clone();
        async move {
            let url = client.endpoint("/auth/session")?;
            let response = client.http.get(url).send().await.map_err(transport)?;
            json_body(response).await
        }
    }

    fn logout(&self) -> impl Future<Output = Result<String, RefreshError>> + Send {
        let client = self.clone();
        async move {
            let url = client.endpoint("/auth/logout")?;
            let response = client.http.post(url).send().await.map_err(transport)?;
            let logout: LogoutResponse = json_body(response).await?;
            Ok(logout.logout_url)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> BffClient {
        BffClient::new(Url::parse(&server.uri()).unwrap(), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_cookies_from_session_are_sent_on_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/session"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "oauth_refresh_token=r1; Path=/")
                    .set_body_json(json!({
                        "user": { "id": "u", "email": null, "name": null },
                        "expiresAt": 5,
                        "hasRefreshToken": true,
                        "isAuthenticated": true,
                        "needsRefresh": false
                    })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .and(header("cookie", "oauth_refresh_token=r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "expiresAt": 42 })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server).await;
        let view = client.session().await.unwrap();
        assert!(view.is_authenticated);
        assert_eq!(client.refresh().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_refresh_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({ "error": "No refresh token available" })),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/refresh"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert_eq!(client.refresh().await, Err(RefreshError::Unauthorized));
        assert!(matches!(
            client.refresh().await,
            Err(RefreshError::Transient(_))
        ));
    }

    #[tokio::test]
    async fn test_login_and_logout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/login"))
            .and(query_param("returnTo", "/settings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "authorizationUrl": "http://hydra/oauth2/auth?x=1" })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/logout"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true, "logoutUrl": "/" })),
            )
            .mount(&server)
            .await;

        let client = client(&server).await;
        assert_eq!(
            client.login_url(Some("/settings")).await.unwrap(),
            "http://hydra/oauth2/auth?x=1"
        );
        assert_eq!(client.logout().await.unwrap(), "/");
    }
}
