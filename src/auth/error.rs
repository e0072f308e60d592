//! Error taxonomy for the authentication endpoints
//!
//! Browser-facing flows (the callback) turn failures into login-page
//! redirects; API-style endpoints answer with an `{"error": ...}` body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure talking to the provider's token or revocation endpoint
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The provider answered and refused (non-2xx or an OAuth error body)
    #[error("{endpoint} endpoint rejected the request (status {status:?})")]
    Rejected {
        endpoint: &'static str,
        status: Option<u16>,
    },
    /// No usable answer: connect failure, timeout, TLS error
    #[error("{endpoint} endpoint unreachable: {reason}")]
    Transport {
        endpoint: &'static str,
        reason: String,
    },
}

impl UpstreamError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, UpstreamError::Rejected { .. })
    }
}

/// Errors surfaced by the JSON authentication endpoints
#[derive(Debug, Error)]
pub enum AuthError {
    /// A required request parameter is missing; there is no safe redirect target
    #[error("{0}")]
    ClientInput(&'static str),
    /// Never names the specific check that failed
    #[error("Security validation failed")]
    SecurityValidation,
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: &'static str,
    },
    /// Expired or missing credentials; the caller should re-authenticate
    #[error("{0}")]
    ExpiredCredential(&'static str),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::ClientInput(_) => StatusCode::BAD_REQUEST,
            AuthError::SecurityValidation => StatusCode::UNAUTHORIZED,
            AuthError::Upstream { status, .. } => *status,
            AuthError::ExpiredCredential(_) => StatusCode::UNAUTHORIZED,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthError::ClientInput("Missing authorization code")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::ExpiredCredential("No refresh token available")
                .into_response()
                .status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Upstream {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Token refresh failed",
            }
            .into_response()
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_upstream_error_classification() {
        let rejected = UpstreamError::Rejected {
            endpoint: "token",
            status: Some(400),
        };
        let transport = UpstreamError::Transport {
            endpoint: "token",
            reason: "connection refused".to_string(),
        };
        assert!(rejected.is_rejection());
        assert!(!transport.is_rejection());
        assert!(transport.to_string().contains("connection refused"));
    }
}
