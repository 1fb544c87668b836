use std::env;
use std::time::Duration;

/// Scopes requested from the provider on every login.
pub const SPOTIFY_SCOPES: &[&str] = &[
    "playlist-read-private",
    "user-library-read",
    "user-read-email",
    "user-read-private",
    "playlist-modify-public",
    "playlist-modify-private",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_redirect_uri: String,
    /// Base URL of the accounts service (authorize + token endpoints)
    pub spotify_accounts_url: String,
    /// Base URL of the Web API, including the version segment
    pub spotify_api_url: String,
    pub session_secret: String,
    /// Where the browser lands after the OAuth callback
    pub frontend_url: String,
    pub server_host: String,
    pub server_port: u16,
    /// Allowed CORS origins (comma-separated). Use "*" for any origin (development only).
    pub cors_origins: Vec<String>,
    pub http_timeout: Duration,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup so it can be
    /// validated without touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, anyhow::Error> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| anyhow::anyhow!("{} environment variable must be set", key))
        };

        let session_secret = required("SESSION_SECRET")?;
        if session_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "SESSION_SECRET must be at least 32 characters long. \
                Generate one with: openssl rand -base64 32"
            ));
        }

        let spotify_redirect_uri = required("SPOTIFY_REDIRECT_URI")?;
        if !spotify_redirect_uri.starts_with("http://") && !spotify_redirect_uri.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "SPOTIFY_REDIRECT_URI must be an absolute http(s) URL, got {}",
                spotify_redirect_uri
            ));
        }

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173,http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let server_port = match lookup("SERVER_PORT") {
            Some(port) => port
                .parse()
                .map_err(|_| anyhow::anyhow!("SERVER_PORT must be a port number, got {}", port))?,
            None => 3600,
        };

        let timeout_secs: u64 = match lookup("HTTP_TIMEOUT_SECS") {
            Some(secs) => secs
                .parse()
                .map_err(|_| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a number of seconds, got {}", secs))?,
            None => 30,
        };

        Ok(Config {
            spotify_client_id: required("SPOTIFY_CLIENT_ID")?,
            spotify_client_secret: required("SPOTIFY_CLIENT_SECRET")?,
            spotify_redirect_uri,
            spotify_accounts_url: trim_url(
                lookup("SPOTIFY_ACCOUNTS_URL")
                    .unwrap_or_else(|| "https://accounts.spotify.com".to_string()),
            ),
            spotify_api_url: trim_url(
                lookup("SPOTIFY_API_URL").unwrap_or_else(|| "https://api.spotify.com/v1".to_string()),
            ),
            session_secret,
            frontend_url: trim_url(
                lookup("FRONTEND_URL").unwrap_or_else(|| "http://localhost:5173".to_string()),
            ),
            server_host: lookup("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            server_port,
            cors_origins,
            http_timeout: Duration::from_secs(timeout_secs),
            cookie_secure: lookup("COOKIE_SECURE")
                .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        })
    }

    pub fn scope(&self) -> String {
        SPOTIFY_SCOPES.join(" ")
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
