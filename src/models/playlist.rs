use crate::models::spotify::PlaylistObject;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Playlist as reported back to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistRef {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub public: bool,
    pub url: Option<String>,
    pub owner_id: Option<String>,
    pub tracks_total: Option<u32>,
}

impl From<PlaylistObject> for PlaylistRef {
    fn from(playlist: PlaylistObject) -> Self {
        PlaylistRef {
            url: playlist.external_urls.get("spotify").cloned(),
            id: playlist.id,
            name: playlist.name,
            description: playlist.description.filter(|d| !d.is_empty()),
            public: playlist.public.unwrap_or(false),
            owner_id: playlist.owner.map(|owner| owner.id),
            tracks_total: playlist.tracks.map(|tracks| tracks.total),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePlaylistRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 300))]
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddTracksRequest {
    #[validate(length(min = 1))]
    pub uris: Vec<String>,
}

impl AddTracksRequest {
    /// Every entry must be a provider track or episode URI.
    pub fn check_uris(&self) -> Result<(), String> {
        check_playable(&self.uris)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RemoveTracksRequest {
    #[validate(length(min = 1))]
    pub uris: Vec<String>,
}

impl RemoveTracksRequest {
    pub fn check_uris(&self) -> Result<(), String> {
        check_playable(&self.uris)
    }
}

fn check_playable(uris: &[String]) -> Result<(), String> {
    match uris.iter().find(|uri| !is_playable_uri(uri)) {
        Some(bad) => Err(format!("Not a Spotify track URI: {}", bad)),
        None => Ok(()),
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BulkDeleteRequest {
    #[serde(alias = "playlistIds")]
    #[validate(length(min = 1, max = 50))]
    pub playlist_ids: Vec<String>,
}

pub fn is_playable_uri(uri: &str) -> bool {
    let id = uri
        .strip_prefix("spotify:track:")
        .or_else(|| uri.strip_prefix("spotify:episode:"));
    matches!(id, Some(id) if !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric()))
}

/// Outcome of a fully successful batched insertion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub chunks: usize,
    pub tracks_added: usize,
    pub snapshot_id: Option<String>,
}

/// Outcome of a fully successful batched removal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReport {
    pub chunks: usize,
    pub tracks_removed: usize,
    pub snapshot_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkDeleteReport {
    pub deleted: Vec<String>,
    pub failed: Vec<BulkDeleteFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteFailure {
    pub playlist_id: String,
    pub error: String,
}
