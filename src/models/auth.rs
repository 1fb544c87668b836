use crate::models::TokenResponse;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

/// Provider credentials held by one relay session.
#[derive(Clone, Serialize)]
pub struct TokenPair {
    #[serde(skip)]
    pub access_token: String,
    #[serde(skip)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
}

impl TokenPair {
    /// Builds a pair from a token endpoint response. A refresh response that
    /// omits `refresh_token` keeps `previous_refresh`.
    pub fn from_response(response: TokenResponse, previous_refresh: Option<String>) -> Self {
        let lifetime = response.expires_in.unwrap_or(3600).max(0);
        TokenPair {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .filter(|t| !t.is_empty())
                .or(previous_refresh),
            expires_at: Utc::now() + Duration::seconds(lifetime),
            scope: response.scope,
        }
    }

    pub fn expires_within(&self, margin: Duration) -> bool {
        self.expires_at - margin <= Utc::now()
    }
}

// Tokens never reach logs.
impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
