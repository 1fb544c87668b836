use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::{TokenPair, TokenResponse};
use crate::services::spotify::ensure_success;
use async_trait::async_trait;
use reqwest::{Client, Url};

/// The provider's accounts service: authorize URL and token endpoint.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    fn authorize_url(&self, state: &str) -> Result<String>;

    async fn exchange_code(&self, code: &str) -> Result<TokenPair>;

    /// Trades a refresh token for a fresh access token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse>;
}

/// Refreshes `current`, keeping its refresh token when the provider does not
/// rotate it. Without a refresh token no request is made.
pub async fn refresh_pair(endpoint: &dyn TokenEndpoint, current: &TokenPair) -> Result<TokenPair> {
    let refresh_token = current
        .refresh_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or(AppError::NotAuthenticated)?;

    let response = endpoint.refresh(refresh_token).await?;
    Ok(TokenPair::from_response(
        response,
        current.refresh_token.clone(),
    ))
}

pub struct SpotifyOAuth {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scope: String,
    accounts_url: String,
    client: Client,
}

impl SpotifyOAuth {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            client_id: config.spotify_client_id.clone(),
            client_secret: config.spotify_client_secret.clone(),
            redirect_uri: config.spotify_redirect_uri.clone(),
            scope: config.scope(),
            accounts_url: config.spotify_accounts_url.clone(),
            client,
        }
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let url = format!("{}/api/token", self.accounts_url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;

        // The accounts service answers bad codes and revoked refresh tokens with 400
        let response = ensure_success(response).await.map_err(|e| match e {
            AppError::ExternalApi { status: 400, message } => AppError::Auth(message),
            other => other,
        })?;

        Ok(response.json::<TokenResponse>().await?)
    }
}

#[async_trait]
impl TokenEndpoint for SpotifyOAuth {
    fn authorize_url(&self, state: &str) -> Result<String> {
        let mut url = Url::parse(&format!("{}/authorize", self.accounts_url))
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid accounts URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scope)
            .append_pair("state", state);

        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenPair> {
        tracing::debug!("Exchanging authorization code");

        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.redirect_uri),
            ])
            .await?;

        Ok(TokenPair::from_response(response, None))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        tracing::debug!("Refreshing access token");

        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }
}
