use crate::api::middleware::RequireSession;
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{ArtistRef, TrackSummary, UserProfile};
use crate::services::library::{collect_liked_tracks, LIKED_PAGE_SIZE};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn library_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/info", get(profile))
        .route("/liked-songs", get(liked_page))
        .route("/fetch", get(profile))
        .route("/liked", get(all_liked))
        .route("/tracks/search", get(search))
        .route("/artist", get(artist_lookup))
}

/// Largest page the provider serves for search results
const SEARCH_PAGE_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    #[default]
    Track,
    Artist,
}

impl SearchType {
    fn as_str(self) -> &'static str {
        match self {
            SearchType::Track => "track",
            SearchType::Artist => "artist",
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(default, rename = "type")]
    search_type: SearchType,
    #[serde(default = "default_search_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

fn default_search_limit() -> u32 {
    20
}

#[derive(Debug, Serialize)]
struct SearchResults {
    tracks: Vec<TrackSummary>,
    artists: Vec<ArtistRef>,
    total: Option<u32>,
    limit: u32,
    offset: u32,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    LIKED_PAGE_SIZE
}

#[derive(Debug, Serialize)]
struct LikedPageResponse {
    items: Vec<TrackSummary>,
    total: Option<u32>,
    limit: u32,
    offset: u32,
    next_offset: Option<u32>,
}

async fn profile(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
) -> Result<Json<UserProfile>> {
    let profile = state.spotify.current_user(&ctx).await?;
    Ok(Json(profile))
}

/// One page of liked songs, for paginated views.
async fn liked_page(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
    Query(params): Query<PageParams>,
) -> Result<Json<LikedPageResponse>> {
    let limit = params.limit.clamp(1, LIKED_PAGE_SIZE);
    let page = state.spotify.saved_tracks(&ctx, params.offset, limit).await?;

    let received = page.items.len() as u32;
    let next_offset = (received > 0 && page.next.is_some()).then(|| params.offset + received);

    Ok(Json(LikedPageResponse {
        items: page
            .items
            .into_iter()
            .filter_map(|item| item.track)
            .filter_map(TrackSummary::from_track)
            .collect(),
        total: page.total,
        limit,
        offset: params.offset,
        next_offset,
    }))
}

/// Every liked song in one response.
async fn all_liked(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
) -> Result<Json<Vec<TrackSummary>>> {
    let tokens = state.sessions.tokens(ctx.session_id);
    let collection = collect_liked_tracks(state.spotify.as_ref(), &tokens).await?;
    Ok(Json(collection.tracks))
}

async fn search(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>> {
    let query = params.q.trim();
    if query.is_empty() {
        return Err(AppError::Validation("Search query must not be empty".to_string()));
    }
    let limit = params.limit.clamp(1, SEARCH_PAGE_LIMIT);

    let response = state
        .spotify
        .search(&ctx, query, params.search_type.as_str(), limit, params.offset)
        .await?;

    let (tracks, track_total) = match response.tracks {
        Some(page) => (
            page.items
                .into_iter()
                .filter_map(TrackSummary::from_track)
                .collect(),
            page.total,
        ),
        None => (Vec::new(), None),
    };
    let (artists, artist_total) = match response.artists {
        Some(page) => (
            page.items.into_iter().map(ArtistRef::from).collect(),
            page.total,
        ),
        None => (Vec::new(), None),
    };

    Ok(Json(SearchResults {
        tracks,
        artists,
        total: match params.search_type {
            SearchType::Track => track_total,
            SearchType::Artist => artist_total,
        },
        limit,
        offset: params.offset,
    }))
}

#[derive(Debug, Deserialize)]
struct ArtistParams {
    #[serde(default)]
    q: String,
}

/// Best artist match for `q`.
async fn artist_lookup(
    State(state): State<Arc<AppState>>,
    session: RequireSession,
    Query(params): Query<ArtistParams>,
) -> Result<Json<SearchResults>> {
    let params = SearchParams {
        q: params.q,
        search_type: SearchType::Artist,
        limit: 1,
        offset: 0,
    };
    search(State(state), session, Query(params)).await
}
