use crate::api::library::PageParams;
use crate::api::middleware::RequireSession;
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    AddTracksRequest, BatchReport, BulkDeleteReport, BulkDeleteRequest, CreatePlaylistRequest,
    PlaylistRef, RemovalReport, RemoveTracksRequest,
};
use crate::services::playlists::{
    add_tracks_batched, create_playlist, remove_tracks_batched, unfollow_playlists,
    PLAYLIST_PAGE_LIMIT,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

pub fn playlist_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/playlists", get(list_playlists).post(create))
        .route("/playlists/bulk-delete", post(bulk_unfollow))
        .route("/playlists/:id", delete(unfollow))
        .route("/playlists/:id/tracks", post(add_tracks).delete(remove_tracks))
        .route("/playlist", post(create))
        .route("/addsong", get(add_tracks_legacy))
}

#[derive(Debug, Serialize)]
struct PlaylistPage {
    items: Vec<PlaylistRef>,
    total: Option<u32>,
    limit: u32,
    offset: u32,
}

#[derive(Debug, Deserialize)]
struct AddSongParams {
    playlist_id: String,
    /// Comma-separated track URIs
    uris: String,
}

async fn list_playlists(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
    Query(params): Query<PageParams>,
) -> Result<Json<PlaylistPage>> {
    let limit = params.limit.clamp(1, PLAYLIST_PAGE_LIMIT);
    let page = state.spotify.user_playlists(&ctx, params.offset, limit).await?;

    Ok(Json(PlaylistPage {
        items: page.items.into_iter().map(PlaylistRef::from).collect(),
        total: page.total,
        limit,
        offset: params.offset,
    }))
}

async fn create(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
    Json(req): Json<CreatePlaylistRequest>,
) -> Result<(StatusCode, Json<PlaylistRef>)> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let profile = state.spotify.current_user(&ctx).await?;
    let playlist = create_playlist(state.spotify.as_ref(), &ctx, &profile.id, &req).await?;

    Ok((StatusCode::CREATED, Json(playlist)))
}

async fn unfollow(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
    Path(playlist_id): Path<String>,
) -> Result<StatusCode> {
    state.spotify.unfollow_playlist(&ctx, &playlist_id).await?;
    tracing::info!("Unfollowed playlist {}", playlist_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn add_tracks(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
    Path(playlist_id): Path<String>,
    Json(req): Json<AddTracksRequest>,
) -> Result<Json<BatchReport>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    req.check_uris().map_err(AppError::Validation)?;

    let tokens = state.sessions.tokens(ctx.session_id);
    let report =
        add_tracks_batched(state.spotify.as_ref(), &tokens, &playlist_id, &req.uris).await?;
    Ok(Json(report))
}

async fn remove_tracks(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
    Path(playlist_id): Path<String>,
    Json(req): Json<RemoveTracksRequest>,
) -> Result<Json<RemovalReport>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    req.check_uris().map_err(AppError::Validation)?;

    let tokens = state.sessions.tokens(ctx.session_id);
    let report =
        remove_tracks_batched(state.spotify.as_ref(), &tokens, &playlist_id, &req.uris).await?;
    Ok(Json(report))
}

/// Unfollows several playlists; partial success is reported, not an error.
async fn bulk_unfollow(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
    Json(req): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteReport>> {
    req.validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let tokens = state.sessions.tokens(ctx.session_id);
    let report = unfollow_playlists(state.spotify.as_ref(), &tokens, &req.playlist_ids).await;
    Ok(Json(report))
}

async fn add_tracks_legacy(
    State(state): State<Arc<AppState>>,
    session: RequireSession,
    Query(params): Query<AddSongParams>,
) -> Result<Json<BatchReport>> {
    let req = AddTracksRequest {
        uris: params
            .uris
            .split(',')
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect(),
    };
    add_tracks(State(state), session, Path(params.playlist_id), Json(req)).await
}
