#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request};
use axum::response::Response;
use axum::Router;
use axum_extra::extract::cookie::Cookie;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::Value;
use session_bff::{config::Config, web::create_router, AppState};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_KID: &str = "test-key";
pub const RSA_PRIVATE_KEY: &str = include_str!("../fixtures/test_rsa_key.pem");
pub const RSA_MODULUS: &str = include_str!("../fixtures/test_rsa_modulus.txt");

/// Configuration pointing both Hydra ports at one mock server
pub fn test_config(hydra: &str, vars: &[(&str, &str)]) -> Config {
    let mut map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    map.entry("HYDRA_PUBLIC_URL".to_string())
        .or_insert_with(|| hydra.to_string());
    map.entry("HYDRA_ADMIN_URL".to_string())
        .or_insert_with(|| hydra.to_string());
    Config::from_lookup(|name| map.get(name).cloned()).unwrap()
}

pub fn test_app(config: Config) -> Router {
    create_router(Arc::new(AppState::new(config).unwrap()))
}

pub fn request(method: Method, uri: &str, cookies: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if !cookies.is_empty() {
        let header_value = cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        builder = builder.header(header::COOKIE, header_value);
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// `Set-Cookie` headers keyed by cookie name
pub fn set_cookies(response: &Response) -> HashMap<String, Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| {
            let cookie = Cookie::parse_encoded(value.to_str().unwrap().to_string()).unwrap();
            (cookie.name().to_string(), cookie)
        })
        .collect()
}

pub fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie.value().is_empty() && cookie.max_age() == Some(time::Duration::ZERO)
}

pub fn location(response: &Response) -> String {
    response.headers()[header::LOCATION]
        .to_str()
        .unwrap()
        .to_string()
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    url::Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

pub fn now_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// A JWT whose signature is not valid; fine for decode-only paths
pub fn unsigned_id_token(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

/// RS256 token signed with the fixture key
pub fn signed_id_token(claims: Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(TEST_KID.to_string());
    let key = EncodingKey::from_rsa_pem(RSA_PRIVATE_KEY.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, &claims, &key).unwrap()
}

/// JWKS document publishing the fixture key
pub fn jwks_document() -> Value {
    serde_json::json!({
        "keys": [{
            "kty": "RSA",
            "use": "sig",
            "alg": "RS256",
            "kid": TEST_KID,
            "n": RSA_MODULUS.trim(),
            "e": "AQAB"
        }]
    })
}
