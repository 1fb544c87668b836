use crate::error::{AppError, Result};
use crate::models::{
    BatchReport, BulkDeleteFailure, BulkDeleteReport, CreatePlaylistRequest, PlaylistRef,
    RemovalReport,
};
use crate::services::session::{AuthContext, TokenSource};
use crate::services::spotify::SpotifyApi;
use std::ops::ControlFlow;

/// The provider accepts at most this many URIs per insertion request.
pub const MAX_TRACKS_PER_REQUEST: usize = 100;

/// Largest page the provider serves for playlist listings
pub const PLAYLIST_PAGE_LIMIT: u32 = 50;

pub async fn create_playlist(
    api: &dyn SpotifyApi,
    ctx: &AuthContext,
    user_id: &str,
    req: &CreatePlaylistRequest,
) -> Result<PlaylistRef> {
    let playlist = api
        .create_playlist(
            ctx,
            user_id,
            &req.name,
            req.description.as_deref().unwrap_or_default(),
            req.public,
        )
        .await?;

    tracing::info!("Created playlist '{}' ({})", playlist.name, playlist.id);
    Ok(playlist.into())
}

/// Position of every insertion request for `len` URIs.
pub fn chunk_positions(len: usize) -> Vec<usize> {
    (0..len).step_by(MAX_TRACKS_PER_REQUEST).collect()
}

pub async fn add_tracks_batched(
    api: &dyn SpotifyApi,
    tokens: &dyn TokenSource,
    playlist_id: &str,
    uris: &[String],
) -> Result<BatchReport> {
    add_tracks_batched_with(api, tokens, playlist_id, uris, |_| ControlFlow::Continue(())).await
}

/// Inserts `uris` in order, one chunk at a time, each chunk at the running
/// offset. `after_chunk` sees the report so far after every committed chunk
/// and may stop the insertion early.
///
/// The first failing chunk ends the insertion. If earlier chunks were already
/// committed the result is [`AppError::PartialBatchFailure`]; otherwise the
/// chunk's own error is returned.
pub async fn add_tracks_batched_with<F>(
    api: &dyn SpotifyApi,
    tokens: &dyn TokenSource,
    playlist_id: &str,
    uris: &[String],
    mut after_chunk: F,
) -> Result<BatchReport>
where
    F: FnMut(&BatchReport) -> ControlFlow<()> + Send,
{
    let positions = chunk_positions(uris.len());
    let total_chunks = positions.len();
    let mut report = BatchReport::default();

    for (index, (position, chunk)) in positions
        .into_iter()
        .zip(uris.chunks(MAX_TRACKS_PER_REQUEST))
        .enumerate()
    {
        let inserted = match tokens.current().await {
            Ok(ctx) => api.add_tracks(&ctx, playlist_id, chunk, position).await,
            Err(e) => Err(e),
        };

        match inserted {
            Ok(snapshot_id) => {
                report.chunks += 1;
                report.tracks_added += chunk.len();
                report.snapshot_id = Some(snapshot_id);
            }
            Err(e) => {
                return Err(chunk_failure(
                    e,
                    playlist_id,
                    index,
                    total_chunks,
                    report.tracks_added,
                ))
            }
        }

        if after_chunk(&report).is_break() && report.chunks < total_chunks {
            tracing::info!(
                "Insertion into {} stopped after {} of {} chunks",
                playlist_id,
                report.chunks,
                total_chunks
            );
            break;
        }
    }

    Ok(report)
}

/// Removes every occurrence of `uris` from the playlist, one chunk at a
/// time. Failures follow the same rules as insertion.
pub async fn remove_tracks_batched(
    api: &dyn SpotifyApi,
    tokens: &dyn TokenSource,
    playlist_id: &str,
    uris: &[String],
) -> Result<RemovalReport> {
    let total_chunks = uris.len().div_ceil(MAX_TRACKS_PER_REQUEST);
    let mut report = RemovalReport::default();

    for (index, chunk) in uris.chunks(MAX_TRACKS_PER_REQUEST).enumerate() {
        let removed = match tokens.current().await {
            Ok(ctx) => api.remove_tracks(&ctx, playlist_id, chunk).await,
            Err(e) => Err(e),
        };

        match removed {
            Ok(snapshot_id) => {
                report.chunks += 1;
                report.tracks_removed += chunk.len();
                report.snapshot_id = Some(snapshot_id);
            }
            Err(e) => {
                return Err(chunk_failure(
                    e,
                    playlist_id,
                    index,
                    total_chunks,
                    report.tracks_removed,
                ))
            }
        }
    }

    tracing::info!(
        "Removed {} tracks from playlist {}",
        report.tracks_removed,
        playlist_id
    );
    Ok(report)
}

fn chunk_failure(
    error: AppError,
    playlist_id: &str,
    index: usize,
    total_chunks: usize,
    committed_tracks: usize,
) -> AppError {
    if index == 0 {
        tracing::error!("First chunk for playlist {} failed: {}", playlist_id, error);
        return error;
    }

    tracing::error!(
        "Chunk {} of {} for playlist {} failed: {}",
        index + 1,
        total_chunks,
        playlist_id,
        error
    );
    AppError::PartialBatchFailure {
        committed_chunks: index,
        total_chunks,
        committed_tracks,
        source: Box::new(error),
    }
}

/// Unfollows each playlist in turn. One failure does not stop the rest.
pub async fn unfollow_playlists(
    api: &dyn SpotifyApi,
    tokens: &dyn TokenSource,
    playlist_ids: &[String],
) -> BulkDeleteReport {
    let mut report = BulkDeleteReport::default();

    for playlist_id in playlist_ids {
        let result = match tokens.current().await {
            Ok(ctx) => api.unfollow_playlist(&ctx, playlist_id).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => report.deleted.push(playlist_id.clone()),
            Err(e) => {
                tracing::warn!("Failed to unfollow playlist {}: {}", playlist_id, e);
                report.failed.push(BulkDeleteFailure {
                    playlist_id: playlist_id.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        "Bulk unfollow: {} deleted, {} failed",
        report.deleted.len(),
        report.failed.len()
    );
    report
}
