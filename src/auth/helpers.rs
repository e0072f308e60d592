//! Pure helper functions for authentication
//!
//! Stateless URL builders shared by the handlers; nothing here performs I/O.

use url::Url;

// =============================================================================
// Redirect safety
// =============================================================================

/// Resolve a post-login `return_to` against the app URL.
///
/// Honoured only when the resolved URL has exactly the app's origin; the
/// result is path + query so the browser stays on this origin. Anything else,
/// including parse failures, lands on `/`.
pub fn safe_redirect_target(app_url: &Url, return_to: Option<&str>) -> String {
    let Some(return_to) = return_to.filter(|r| !r.trim().is_empty()) else {
        return "/".to_string();
    };

    let resolved = match app_url.join(return_to) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(
                event = "return_to_unparseable",
                error = %e,
                "Ignoring unparseable returnTo"
            );
            return "/".to_string();
        }
    };

    if resolved.origin() != app_url.origin() {
        tracing::warn!(
            event = "return_to_rejected",
            target_host = ?resolved.host_str(),
            "Rejected returnTo outside the app origin"
        );
        return "/".to_string();
    }

    match resolved.query() {
        Some(query) => format!("{}?{}", resolved.path(), query),
        None => resolved.path().to_string(),
    }
}

// =============================================================================
// URL Builders
// =============================================================================

/// Build the login-page URL carrying a callback failure
///
/// Values are percent-encoded (spaces as `%20`).
pub fn build_login_error_url(login_path: &str, error: &str, description: &str) -> String {
    format!(
        "{}?error={}&error_description={}",
        login_path,
        urlencoding::encode(error),
        urlencoding::encode(description)
    )
}

/// Where the browser goes after local logout: the provider's end-session
/// endpoint, or the app root when provider logout is disabled.
pub fn build_logout_url(end_session_url: Option<&str>) -> String {
    end_session_url
        .filter(|u| !u.is_empty())
        .unwrap_or("/")
        .to_string()
}

// =============================================================================
// Tests
// =============================================================================
