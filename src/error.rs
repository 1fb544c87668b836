use crate::models::PipelineReport;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// No usable provider credentials are held for this session.
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Rate limited by Spotify")]
    RateLimited { retry_after: Option<u64> },

    #[error("Batch insertion stopped after {committed_chunks} of {total_chunks} chunks: {source}")]
    PartialBatchFailure {
        committed_chunks: usize,
        total_chunks: usize,
        committed_tracks: usize,
        #[source]
        source: Box<AppError>,
    },

    #[error("Operation failed: {source}")]
    PipelineFailed {
        report: Box<PipelineReport>,
        #[source]
        source: Box<AppError>,
    },

    #[error("Operation cancelled")]
    Cancelled { report: Box<PipelineReport> },

    #[error("Spotify API error ({status}): {message}")]
    ExternalApi { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::NotAuthenticated | AppError::Auth(_) | AppError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::PartialBatchFailure { .. } => StatusCode::BAD_GATEWAY,
            AppError::PipelineFailed { source, .. } => source.status(),
            AppError::Cancelled { .. } => StatusCode::CONFLICT,
            AppError::ExternalApi { status: 404, .. } => StatusCode::NOT_FOUND,
            AppError::ExternalApi { .. } => StatusCode::BAD_GATEWAY,
            AppError::Transport(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            AppError::Transport(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable kind, exposed to the browser as `kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotAuthenticated => "not_authenticated",
            AppError::Auth(_) => "auth_error",
            AppError::Unauthorized => "unauthorized",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::PartialBatchFailure { .. } => "partial_batch_failure",
            AppError::PipelineFailed { .. } => "pipeline_failed",
            AppError::Cancelled { .. } => "cancelled",
            AppError::ExternalApi { .. } => "external_api_error",
            AppError::Transport(_) => "transport_error",
            AppError::NotFound(_) => "not_found",
            AppError::Validation(_) => "validation_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();

        let body = match &self {
            AppError::RateLimited { retry_after } => json!({
                "error": self.to_string(),
                "kind": kind,
                "retry_after": retry_after,
            }),
            AppError::PartialBatchFailure {
                committed_chunks,
                total_chunks,
                committed_tracks,
                source,
            } => json!({
                "error": self.to_string(),
                "kind": kind,
                "committed_chunks": committed_chunks,
                "total_chunks": total_chunks,
                "committed_tracks": committed_tracks,
                "cause": source.to_string(),
            }),
            AppError::PipelineFailed { report, source } => json!({
                "error": self.to_string(),
                "kind": kind,
                "cause_kind": source.kind(),
                "report": report,
            }),
            AppError::Cancelled { report } => json!({
                "error": self.to_string(),
                "kind": kind,
                "report": report,
            }),
            AppError::Transport(e) => {
                tracing::error!("Transport error: {:?}", e);
                json!({ "error": "Could not reach Spotify", "kind": kind })
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                json!({ "error": "Internal server error", "kind": kind })
            }
            AppError::NotFound(msg) | AppError::Validation(msg) => json!({
                "error": msg,
                "kind": kind,
            }),
            _ => json!({ "error": self.to_string(), "kind": kind }),
        };

        let mut response = (status, Json(body)).into_response();

        if let AppError::RateLimited {
            retry_after: Some(secs),
        } = &self
        {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
