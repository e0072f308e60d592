mod common;

use axum::http::{Method, StatusCode};
use common::*;
use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_get_login_request_is_proxied() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/admin/oauth2/auth/requests/login"))
        .and(query_param("login_challenge", "lc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "challenge": "lc-1",
            "skip": false,
            "subject": ""
        })))
        .expect(1)
        .mount(&server)
        .await;
    let app = test_app(test_config(&server.uri(), &[]));

    let response = send(
        &app,
        request(Method::GET, "/api/hydra/login?login_challenge=lc-1", &[]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["challenge"], "lc-1");
}

#[tokio::test]
async fn test_missing_challenge_is_bad_request() {
    let server = MockServer::start().await;
    let app = test_app(test_config(&server.uri(), &[]));

    for uri in ["/api/hydra/login", "/api/hydra/consent", "/api/hydra/logout"] {
        let response = send(&app, request(Method::GET, uri, &[])).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }

    let response = send(
        &app,
        json_request("/api/hydra/login", json!({ "login_challenge": "lc-1" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "subject is required");
}

#[tokio::test]
async fn test_accept_login_remembers_subject() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/admin/oauth2/auth/requests/login/accept"))
        .and(query_param("login_challenge", "lc-1"))
        .and(body_json(json!({
            "subject": "identity-1",
            "remember": true,
            "remember_for": 3600
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "redirect_to": "http://hydra/oauth2/auth?login_verifier=v" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let app = test_app(test_config(&server.uri(), &[]));

    let response = send(
        &app,
        json_request(
            "/api/hydra/login",
            json!({ "login_challenge": "lc-1", "subject": "identity-1" }),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({ "redirect_to": "http://hydra/oauth2/auth?login_verifier=v" })
    );
}

#[tokio::test]
async fn test_accept_consent_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/admin/oauth2/auth/requests/consent/accept"))
        .and(query_param("consent_challenge", "cc-1"))
        .and(body_json(json!({
            "grant_scope": ["openid", "offline"],
            "grant_access_token_audience": [],
            "remember": true,
            "remember_for": 3600,
            "session": {}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "redirect_to": "http://hydra/next" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    let app = test_app(test_config(&server.uri(), &[]));

    let response = send(
        &app,
        json_request(
            "/api/hydra/consent",
            json!({ "consent_challenge": "cc-1", "grant_scope": ["openid", "offline"] }),
        ),
    )
    .await;
    assert_eq!(json_body(response).await["redirect_to"], "http://hydra/next");
}

#[tokio::test]
async fn test_accept_logout_and_upstream_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/admin/oauth2/auth/requests/logout/accept"))
        .and(query_param("logout_challenge", "ok"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "redirect_to": "http://app/" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/admin/oauth2/auth/requests/logout/accept"))
        .and(query_param("logout_challenge", "gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let app = test_app(test_config(&server.uri(), &[]));

    let response = send(
        &app,
        json_request("/api/hydra/logout", json!({ "logout_challenge": "ok" })),
    )
    .await;
    assert_eq!(json_body(response).await["redirect_to"], "http://app/");

    let response = send(
        &app,
        json_request("/api/hydra/logout", json!({ "logout_challenge": "gone" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        json_body(response).await["error"],
        "Failed to accept logout request"
    );
}
