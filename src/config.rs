use std::env;
use url::Url;

/// Development client secret. Accepted outside production only.
pub const DEV_CLIENT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

/// How `/auth/session` establishes trust in the `oauth_id_token` cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionVerification {
    /// Decode claims only; the httpOnly same-origin cookie store is the trust boundary
    DecodeOnly,
    /// Verify the signature against the provider JWKS and check `iss`/`aud`
    Jwks,
}

#[derive(Debug, Clone)]
pub struct Config {
    // Environment configuration
    pub environment: Environment,

    // Server configuration
    pub server_host: String,
    pub server_port: u16,

    // Public origin of this BFF; `return_to` targets must share it
    pub app_url: Url,
    pub redirect_uri: String,

    // Hydra configuration
    pub hydra_public_url: String, // Browser-facing + token/revoke/JWKS endpoints
    pub hydra_admin_url: String,  // Admin API (login/consent/logout challenges)
    pub issuer: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: String,

    // Cookie configuration (None = host-only cookie, Some = domain cookie)
    pub cookie_secure: bool,
    pub cookie_domain: Option<String>,

    // Where failed callbacks send the browser
    pub login_page_path: String,

    // Provider end-session URL returned by logout (None = app root)
    pub end_session_url: Option<String>,

    pub session_verification: SessionVerification,

    // HTTP client timeout configuration (in seconds)
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,

    // JWKS cache configuration (in seconds)
    pub jwks_cache_ttl_secs: u64,
}

/// Read an optional variable, falling back to a development default.
///
/// Defaults keep a bare `cargo run` usable against a local Hydra; each one is
/// logged so a misconfigured deployment is visible. `secret` suppresses the
/// default value in the log line.
fn var_or<F>(lookup: &F, name: &str, default: &str, secret: bool) -> String
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).filter(|v| !v.is_empty()) {
        Some(value) => value,
        None => {
            if secret {
                tracing::warn!(var = name, "Not set, using development default");
            } else {
                tracing::warn!(var = name, default = default, "Not set, using development default");
            }
            default.to_string()
        }
    }
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(name)
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables using std::env::var
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Parse environment type
        let environment = match lookup("ENVIRONMENT")
            .unwrap_or_else(|| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        let app_url_raw = var_or(&lookup, "APP_URL", "http://localhost:3000", false);
        let app_url = Url::parse(&app_url_raw)
            .map_err(|e| anyhow::anyhow!("APP_URL is not a valid URL: {}", e))?;
        let app_base = app_url.as_str().trim_end_matches('/').to_string();

        let redirect_uri = lookup("REDIRECT_URI")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{}/auth/callback", app_base));
        Url::parse(&redirect_uri)
            .map_err(|e| anyhow::anyhow!("REDIRECT_URI is not a valid URL: {}", e))?;

        // Normalize by trimming trailing slashes to prevent double-slash issues
        let hydra_public_url = var_or(&lookup, "HYDRA_PUBLIC_URL", "http://localhost:5444", false)
            .trim_end_matches('/')
            .to_string();
        Url::parse(&hydra_public_url)
            .map_err(|e| anyhow::anyhow!("HYDRA_PUBLIC_URL is not a valid URL: {}", e))?;

        let hydra_admin_url = var_or(&lookup, "HYDRA_ADMIN_URL", "http://localhost:5445", false)
            .trim_end_matches('/')
            .to_string();
        Url::parse(&hydra_admin_url)
            .map_err(|e| anyhow::anyhow!("HYDRA_ADMIN_URL is not a valid URL: {}", e))?;

        // Hydra publishes its issuer with a trailing slash
        let issuer = lookup("OIDC_ISSUER")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{}/", hydra_public_url));

        let client_id = var_or(&lookup, "OAUTH_CLIENT_ID", "frontend-app", false);
        let client_secret = var_or(&lookup, "OAUTH_CLIENT_SECRET", DEV_CLIENT_SECRET, true);
        let scope = lookup("OAUTH_SCOPE")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "openid profile email offline".to_string());

        if environment == Environment::Production && client_secret == DEV_CLIENT_SECRET {
            return Err(anyhow::anyhow!(
                "OAUTH_CLIENT_SECRET must be set in production (development default refused)"
            ));
        }

        let server_host = lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let server_port = parse_or(&lookup, "SERVER_PORT", 3000u16);

        // COOKIE_SECURE overrides the environment-derived default, e.g. behind a TLS proxy
        let cookie_secure = match lookup("COOKIE_SECURE") {
            Some(v) => v == "true" || v == "1",
            None => environment == Environment::Production,
        };

        // Cookie domain: if not set or empty, use host-only cookies (no Domain attribute)
        let cookie_domain = lookup("COOKIE_DOMAIN").filter(|s| !s.is_empty());

        let login_page_path = lookup("LOGIN_PAGE_PATH")
            .filter(|s| s.starts_with('/'))
            .unwrap_or_else(|| "/auth/login".to_string());

        // Empty END_SESSION_URL disables the provider hop (logout lands on "/")
        let end_session_url = match lookup("END_SESSION_URL") {
            Some(v) if v.is_empty() => None,
            Some(v) => Some(v),
            None => Some(format!(
                "{}/oauth2/sessions/logout?return_to={}",
                hydra_public_url,
                urlencoding::encode(&app_base)
            )),
        };

        let session_verification = match lookup("SESSION_VERIFICATION")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "decode" | "decode-only" => SessionVerification::DecodeOnly,
            _ => SessionVerification::Jwks,
        };

        let http_connect_timeout_secs = parse_or(&lookup, "HTTP_CONNECT_TIMEOUT_SECS", 5u64);
        let http_request_timeout_secs = parse_or(&lookup, "HTTP_REQUEST_TIMEOUT_SECS", 10u64);
        let jwks_cache_ttl_secs = parse_or(&lookup, "JWKS_CACHE_TTL_SECS", 3600u64);

        Ok(Config {
            environment,
            server_host,
            server_port,
            app_url,
            redirect_uri,
            hydra_public_url,
            hydra_admin_url,
            issuer,
            client_id,
            client_secret,
            scope,
            cookie_secure,
            cookie_domain,
            login_page_path,
            end_session_url,
            session_verification,
            http_connect_timeout_secs,
            http_request_timeout_secs,
            jwks_cache_ttl_secs,
        })
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    pub fn authorization_endpoint(&self) -> String {
        format!("{}/oauth2/auth", self.hydra_public_url)
    }

    pub fn token_endpoint(&self) -> String {
        format!("{}/oauth2/token", self.hydra_public_url)
    }

    pub fn revocation_endpoint(&self) -> String {
        format!("{}/oauth2/revoke", self.hydra_public_url)
    }

    pub fn jwks_uri(&self) -> String {
        format!("{}/.well-known/jwks.json", self.hydra_public_url)
    }

    /// Scopes requested at authorization time, split on whitespace
    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(str::to_string).collect()
    }

    /// Get bind address for server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}
