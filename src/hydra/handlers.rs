use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::admin::{AdminError, ChallengeKind, REMEMBER_FOR_SECS};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginChallengeQuery {
    pub login_challenge: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ConsentChallengeQuery {
    pub consent_challenge: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogoutChallengeQuery {
    pub logout_challenge: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptLoginBody {
    pub login_challenge: Option<String>,
    pub subject: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptConsentBody {
    pub consent_challenge: Option<String>,
    #[serde(default)]
    pub grant_scope: Vec<String>,
    #[serde(default)]
    pub grant_access_token_audience: Vec<String>,
    pub session: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct AcceptLogoutBody {
    pub logout_challenge: Option<String>,
}

fn required(value: Option<String>, name: &'static str) -> Result<String, AdminError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(AdminError::MissingParameter(name))
}

async fn fetch(state: &AppState, kind: ChallengeKind, challenge: Option<String>) -> Response {
    let challenge = match required(challenge, kind.challenge_param()) {
        Ok(challenge) => challenge,
        Err(e) => return e.into_response(),
    };
    match state.hydra_admin.get_request(kind, &challenge).await {
        Ok(request) => Json(request).into_response(),
        Err(e) => e.into_response(),
    }
}

fn redirect_to(result: Result<String, AdminError>) -> Response {
    match result {
        Ok(redirect_to) => Json(json!({ "redirect_to": redirect_to })).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_login_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginChallengeQuery>,
) -> Response {
    fetch(&state, ChallengeKind::Login, query.login_challenge).await
}

/// Accept login for the given subject (the Kratos identity id)
pub async fn accept_login_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AcceptLoginBody>,
) -> Response {
    let challenge = match required(body.login_challenge, "login_challenge") {
        Ok(challenge) => challenge,
        Err(e) => return e.into_response(),
    };
    let subject = match required(body.subject, "subject") {
        Ok(subject) => subject,
        Err(e) => return e.into_response(),
    };

    let accept = json!({
        "subject": subject,
        "remember": true,
        "remember_for": REMEMBER_FOR_SECS,
    });
    redirect_to(
        state
            .hydra_admin
            .accept(ChallengeKind::Login, &challenge, Some(accept))
            .await,
    )
}

pub async fn get_consent_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConsentChallengeQuery>,
) -> Response {
    fetch(&state, ChallengeKind::Consent, query.consent_challenge).await
}

/// Accept consent, granting the requested scopes and audiences
pub async fn accept_consent_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AcceptConsentBody>,
) -> Response {
    let challenge = match required(body.consent_challenge, "consent_challenge") {
        Ok(challenge) => challenge,
        Err(e) => return e.into_response(),
    };

    let accept = json!({
        "grant_scope": body.grant_scope,
        "grant_access_token_audience": body.grant_access_token_audience,
        "remember": true,
        "remember_for": REMEMBER_FOR_SECS,
        "session": body.session.unwrap_or_else(|| json!({})),
    });
    redirect_to(
        state
            .hydra_admin
            .accept(ChallengeKind::Consent, &challenge, Some(accept))
            .await,
    )
}

pub async fn get_logout_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogoutChallengeQuery>,
) -> Response {
    fetch(&state, ChallengeKind::Logout, query.logout_challenge).await
}

pub async fn accept_logout_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AcceptLogoutBody>,
) -> Response {
    let challenge = match required(body.logout_challenge, "logout_challenge") {
        Ok(challenge) => challenge,
        Err(e) => return e.into_response(),
    };
    redirect_to(
        state
            .hydra_admin
            .accept(ChallengeKind::Logout, &challenge, None)
            .await,
    )
}
