use crate::api::middleware::RequireSession;
use crate::api::AppState;
use crate::error::Result;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

pub fn dashboard_routes() -> Router<Arc<AppState>> {
    Router::new().route("/playlist-manager/dashboard", get(dashboard))
}

#[derive(Debug, Serialize)]
struct Dashboard {
    summary: DashboardSummary,
    analytics: DashboardAnalytics,
}

#[derive(Debug, Serialize)]
struct DashboardSummary {
    total_playlists: Option<u32>,
    total_liked_songs: Option<u32>,
    pending_operations: usize,
}

#[derive(Debug, Serialize)]
struct DashboardAnalytics {
    playlists: PlaylistAnalytics,
}

#[derive(Debug, Serialize)]
struct PlaylistAnalytics {
    /// Playlists this relay created through completed operations
    app_created_playlists: usize,
}

async fn dashboard(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
) -> Result<Json<Dashboard>> {
    // one-item pages; only the totals are read
    let (playlists, liked) = tokio::try_join!(
        state.spotify.user_playlists(&ctx, 0, 1),
        state.spotify.saved_tracks(&ctx, 0, 1)
    )?;
    let counts = state.operations.counts(ctx.session_id).await;

    Ok(Json(Dashboard {
        summary: DashboardSummary {
            total_playlists: playlists.total,
            total_liked_songs: liked.total,
            pending_operations: counts.active,
        },
        analytics: DashboardAnalytics {
            playlists: PlaylistAnalytics {
                app_created_playlists: counts.completed_liked_to_playlist,
            },
        },
    }))
}
