use crate::models::spotify::{ArtistObject, TrackObject};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistRef {
    pub id: Option<String>,
    pub name: String,
}

impl From<ArtistObject> for ArtistRef {
    fn from(artist: ArtistObject) -> Self {
        ArtistRef {
            id: artist.id,
            name: artist.name,
        }
    }
}

/// Simplified projection of a liked track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub id: String,
    /// `spotify:track:<id>`
    pub uri: String,
    pub name: String,
    pub artists: Vec<ArtistRef>,
    pub image: Option<String>,
}

impl TrackSummary {
    /// Returns `None` for tracks without an id (local files, removed content).
    pub fn from_track(track: TrackObject) -> Option<Self> {
        let id = track.id.filter(|id| !id.is_empty())?;
        let uri = track_uri(&id);
        let image = track
            .album
            .and_then(|album| album.images.into_iter().next())
            .map(|image| image.url);

        Some(TrackSummary {
            uri,
            id,
            name: track.name,
            artists: track.artists.into_iter().map(ArtistRef::from).collect(),
            image,
        })
    }
}

pub fn track_uri(id: &str) -> String {
    format!("spotify:track:{}", id)
}
