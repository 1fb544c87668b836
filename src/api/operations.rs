use crate::api::middleware::{RequireSession, SessionId};
use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    LikedToPlaylistOptions, Operation, OperationStatus, OperationType, PipelineReport,
};
use crate::services::operations::OperationFilter;
use crate::services::pipeline::CancelFlag;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;
use validator::Validate;

pub fn operation_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/operations", get(list_operations))
        .route("/operations/liked-to-playlist", post(start_liked_to_playlist))
        .route("/operations/:id", get(get_operation))
        .route("/operations/:id/cancel", post(cancel_operation))
        .route("/operations/:id/events", get(operation_events))
        .route("/feat_1", get(run_liked_to_playlist))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    status: Option<OperationStatus>,
    operation_type: Option<OperationType>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Serialize)]
struct OperationList {
    operations: Vec<Operation>,
    total: usize,
    limit: usize,
    offset: usize,
}

#[derive(Debug, Serialize)]
struct PipelineResponse {
    message: String,
    report: PipelineReport,
}

fn validated(options: Option<Json<LikedToPlaylistOptions>>) -> Result<LikedToPlaylistOptions> {
    let options = options.map(|Json(o)| o).unwrap_or_default();
    options
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(options)
}

async fn start_liked_to_playlist(
    State(state): State<Arc<AppState>>,
    SessionId(session_id): SessionId,
    options: Option<Json<LikedToPlaylistOptions>>,
) -> Result<(StatusCode, Json<Operation>)> {
    let options = validated(options)?;
    let operation = state
        .operations
        .start_liked_to_playlist(session_id, options)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(operation)))
}

/// Runs the pipeline inside the request and answers with its report.
async fn run_liked_to_playlist(
    State(state): State<Arc<AppState>>,
    RequireSession(ctx): RequireSession,
) -> Result<Json<PipelineResponse>> {
    let report = state
        .pipeline
        .run(
            ctx.session_id,
            LikedToPlaylistOptions::default(),
            None,
            CancelFlag::default(),
        )
        .await?;

    Ok(Json(PipelineResponse {
        message: format!("Added {} liked songs to the playlist", report.tracks_added),
        report,
    }))
}

async fn list_operations(
    State(state): State<Arc<AppState>>,
    SessionId(session_id): SessionId,
    Query(params): Query<ListParams>,
) -> Json<OperationList> {
    let filter = OperationFilter {
        status: params.status,
        operation_type: params.operation_type,
        limit: params.limit.clamp(1, 100),
        offset: params.offset,
    };
    let (operations, total) = state.operations.list(session_id, &filter).await;

    Json(OperationList {
        operations,
        total,
        limit: filter.limit,
        offset: filter.offset,
    })
}

async fn get_operation(
    State(state): State<Arc<AppState>>,
    SessionId(session_id): SessionId,
    Path(id): Path<Uuid>,
) -> Result<Json<Operation>> {
    Ok(Json(state.operations.get(session_id, id).await?))
}

async fn cancel_operation(
    State(state): State<Arc<AppState>>,
    SessionId(session_id): SessionId,
    Path(id): Path<Uuid>,
) -> Result<Json<Operation>> {
    Ok(Json(state.operations.cancel(session_id, id).await?))
}

/// SSE stream of progress for one operation: a snapshot first, then every
/// event until the operation finishes.
async fn operation_events(
    State(state): State<Arc<AppState>>,
    SessionId(session_id): SessionId,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let (snapshot, mut rx) = state.operations.subscribe(session_id, id).await?;

    let stream = async_stream::stream! {
        match Event::default().event("snapshot").json_data(&snapshot) {
            Ok(event) => yield Ok(event),
            Err(e) => tracing::warn!("Failed to encode snapshot of operation {}: {}", id, e),
        }

        let mut finished = snapshot.status.is_terminal();
        while !finished {
            match rx.recv().await {
                Ok(event) => {
                    finished = event.is_terminal();
                    match Event::default().json_data(&event) {
                        Ok(sse) => yield Ok(sse),
                        Err(e) => tracing::warn!("Dropped event for operation {}: {}", id, e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("SSE subscriber for {} skipped {} events", id, skipped);
                }
                Err(RecvError::Closed) => finished = true,
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
