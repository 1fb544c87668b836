use crate::models::PlaylistRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }

    /// Legal transitions of the operation state machine.
    pub fn can_transition_to(self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (InProgress, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    LikedToPlaylist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    RefreshToken,
    FetchProfile,
    CreatePlaylist,
    EnumerateLiked,
    InsertTracks,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 5] = [
        PipelineStep::RefreshToken,
        PipelineStep::FetchProfile,
        PipelineStep::CreatePlaylist,
        PipelineStep::EnumerateLiked,
        PipelineStep::InsertTracks,
    ];
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStep::RefreshToken => "refresh token",
            PipelineStep::FetchProfile => "fetch profile",
            PipelineStep::CreatePlaylist => "create playlist",
            PipelineStep::EnumerateLiked => "enumerate liked tracks",
            PipelineStep::InsertTracks => "insert tracks",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Interrupted by a cancellation request while running
    Cancelled,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub step: PipelineStep,
    pub status: StepStatus,
    pub detail: Option<String>,
}

/// Undo action recorded for an external side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Compensation {
    UnfollowPlaylist { playlist_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationOutcome {
    pub compensation: Compensation,
    /// False when the compensation was only reported, not executed
    pub executed: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub playlist: Option<PlaylistRef>,
    pub tracks_found: usize,
    pub tracks_added: usize,
    pub steps: Vec<StepResult>,
    pub compensations: Vec<CompensationOutcome>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationProgress {
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
}

impl OperationProgress {
    pub fn new(current: usize, total: usize) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((current.min(total) * 100) / total) as u8
        };
        Self {
            current,
            total,
            percentage,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: Uuid,
    #[serde(skip)]
    pub session_id: Uuid,
    pub operation_type: OperationType,
    pub status: OperationStatus,
    pub progress: OperationProgress,
    pub current_step: Option<PipelineStep>,
    pub report: Option<PipelineReport>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Body of `POST /operations/liked-to-playlist`. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LikedToPlaylistOptions {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    #[validate(length(max = 300))]
    pub description: Option<String>,
    #[serde(default)]
    pub public: bool,
    /// Undo external side effects when the run fails or is cancelled
    #[serde(default)]
    pub rollback_on_failure: bool,
}

/// Progress update emitted while an operation runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OperationEvent {
    #[serde(rename = "started")]
    Started { message: String },
    #[serde(rename = "step_started")]
    StepStarted { step: PipelineStep, message: String },
    #[serde(rename = "progress")]
    Progress {
        step: PipelineStep,
        current: usize,
        total: usize,
        message: String,
    },
    #[serde(rename = "step_finished")]
    StepFinished { result: StepResult },
    #[serde(rename = "completed")]
    Completed { report: PipelineReport },
    #[serde(rename = "failed")]
    Failed {
        message: String,
        report: Option<PipelineReport>,
    },
    #[serde(rename = "cancelled")]
    Cancelled { report: Option<PipelineReport> },
}

impl OperationEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationEvent::Completed { .. }
                | OperationEvent::Failed { .. }
                | OperationEvent::Cancelled { .. }
        )
    }
}
