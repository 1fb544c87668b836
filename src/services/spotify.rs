use crate::error::{AppError, Result};
use crate::models::spotify::{
    AddTracksBody, CreatePlaylistBody, Paging, PlaylistObject, RemoveTracksBody, SavedTrackObject,
    SearchResponse, SnapshotResponse, TrackUriObject,
};
use crate::models::UserProfile;
use crate::services::session::AuthContext;
use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Web API operations the relay depends on. Every call takes the caller's
/// [`AuthContext`]; the client itself holds no credentials.
#[async_trait]
pub trait SpotifyApi: Send + Sync {
    async fn current_user(&self, ctx: &AuthContext) -> Result<UserProfile>;

    async fn saved_tracks(
        &self,
        ctx: &AuthContext,
        offset: u32,
        limit: u32,
    ) -> Result<Paging<SavedTrackObject>>;

    async fn user_playlists(
        &self,
        ctx: &AuthContext,
        offset: u32,
        limit: u32,
    ) -> Result<Paging<PlaylistObject>>;

    async fn create_playlist(
        &self,
        ctx: &AuthContext,
        user_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<PlaylistObject>;

    /// Inserts `uris` at `position`; returns the new snapshot id.
    async fn add_tracks(
        &self,
        ctx: &AuthContext,
        playlist_id: &str,
        uris: &[String],
        position: usize,
    ) -> Result<String>;

    /// Removes every occurrence of `uris`; returns the new snapshot id.
    async fn remove_tracks(
        &self,
        ctx: &AuthContext,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<String>;

    async fn unfollow_playlist(&self, ctx: &AuthContext, playlist_id: &str) -> Result<()>;

    /// Catalogue search. `types` is the provider's comma-separated type list.
    async fn search(
        &self,
        ctx: &AuthContext,
        query: &str,
        types: &str,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResponse>;
}

#[derive(Debug, Clone)]
pub struct SpotifyClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorDetail {
    // Web API: {"error": {"status": 404, "message": "..."}}
    Object { message: String },
    // Accounts service: {"error": "invalid_grant", "error_description": "..."}
    Code(String),
}

#[derive(Debug, Deserialize)]
struct AccountsErrorBody {
    #[serde(default)]
    error_description: Option<String>,
}

impl SpotifyClient {
    pub fn new(base_url: String, client: Client) -> Self {
        Self { base_url, client }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid Spotify API URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Spotify API URL cannot be a base")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &AuthContext,
        url: Url,
        query: &[(&str, String)],
    ) -> Result<T> {
        tracing::debug!("GET {}", url.path());

        let response = self
            .client
            .get(url)
            .bearer_auth(&ctx.access_token)
            .query(query)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl SpotifyApi for SpotifyClient {
    async fn current_user(&self, ctx: &AuthContext) -> Result<UserProfile> {
        let url = self.endpoint(&["me"])?;
        self.get_json(ctx, url, &[]).await
    }

    async fn saved_tracks(
        &self,
        ctx: &AuthContext,
        offset: u32,
        limit: u32,
    ) -> Result<Paging<SavedTrackObject>> {
        let url = self.endpoint(&["me", "tracks"])?;
        self.get_json(
            ctx,
            url,
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )
        .await
    }

    async fn user_playlists(
        &self,
        ctx: &AuthContext,
        offset: u32,
        limit: u32,
    ) -> Result<Paging<PlaylistObject>> {
        let url = self.endpoint(&["me", "playlists"])?;
        self.get_json(
            ctx,
            url,
            &[("limit", limit.to_string()), ("offset", offset.to_string())],
        )
        .await
    }

    async fn create_playlist(
        &self,
        ctx: &AuthContext,
        user_id: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<PlaylistObject> {
        let url = self.endpoint(&["users", user_id, "playlists"])?;
        tracing::debug!("Creating playlist '{}' for user {}", name, user_id);

        let response = self
            .client
            .post(url)
            .bearer_auth(&ctx.access_token)
            .json(&CreatePlaylistBody {
                name,
                description,
                public,
            })
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<PlaylistObject>().await?)
    }

    async fn add_tracks(
        &self,
        ctx: &AuthContext,
        playlist_id: &str,
        uris: &[String],
        position: usize,
    ) -> Result<String> {
        let url = self.endpoint(&["playlists", playlist_id, "tracks"])?;
        tracing::debug!(
            "Adding {} tracks to playlist {} at position {}",
            uris.len(),
            playlist_id,
            position
        );

        let response = self
            .client
            .post(url)
            .bearer_auth(&ctx.access_token)
            .json(&AddTracksBody { uris, position })
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<SnapshotResponse>().await?.snapshot_id)
    }

    async fn remove_tracks(
        &self,
        ctx: &AuthContext,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<String> {
        let url = self.endpoint(&["playlists", playlist_id, "tracks"])?;
        tracing::debug!("Removing {} tracks from playlist {}", uris.len(), playlist_id);

        let body = RemoveTracksBody {
            tracks: uris.iter().map(|uri| TrackUriObject { uri }).collect(),
        };
        let response = self
            .client
            .delete(url)
            .bearer_auth(&ctx.access_token)
            .json(&body)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        Ok(response.json::<SnapshotResponse>().await?.snapshot_id)
    }

    async fn search(
        &self,
        ctx: &AuthContext,
        query: &str,
        types: &str,
        limit: u32,
        offset: u32,
    ) -> Result<SearchResponse> {
        let url = self.endpoint(&["search"])?;
        self.get_json(
            ctx,
            url,
            &[
                ("q", query.to_string()),
                ("type", types.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
            ],
        )
        .await
    }

    async fn unfollow_playlist(&self, ctx: &AuthContext, playlist_id: &str) -> Result<()> {
        let url = self.endpoint(&["playlists", playlist_id, "followers"])?;

        let response = self
            .client
            .delete(url)
            .bearer_auth(&ctx.access_token)
            .send()
            .await?;

        ensure_success(response).await?;
        Ok(())
    }
}

/// Maps a non-2xx provider response onto the error taxonomy.
pub(crate) async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string()
    });

    tracing::warn!("Spotify API error: {} - {}", status, message);

    Err(match status {
        StatusCode::TOO_MANY_REQUESTS => AppError::RateLimited { retry_after },
        StatusCode::UNAUTHORIZED => AppError::Auth(message),
        _ => AppError::ExternalApi {
            status: status.as_u16(),
            message,
        },
    })
}

fn error_message(body: &str) -> Option<String> {
    let parsed: ApiErrorBody = serde_json::from_str(body).ok()?;
    match parsed.error {
        ApiErrorDetail::Object { message } => Some(message),
        ApiErrorDetail::Code(code) => {
            let description = serde_json::from_str::<AccountsErrorBody>(body)
                .ok()
                .and_then(|b| b.error_description);
            Some(match description {
                Some(description) => format!("{}: {}", code, description),
                None => code,
            })
        }
    }
}
