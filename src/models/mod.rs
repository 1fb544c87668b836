pub mod auth;
pub mod operation;
pub mod playlist;
pub mod spotify;
pub mod track;

pub use auth::TokenPair;
pub use operation::{
    Compensation, CompensationOutcome, LikedToPlaylistOptions, Operation, OperationEvent, OperationProgress,
    OperationStatus, OperationType, PipelineReport, PipelineStep, StepResult, StepStatus,
};
pub use playlist::{
    AddTracksRequest, BatchReport, BulkDeleteFailure, BulkDeleteReport, BulkDeleteRequest,
    CreatePlaylistRequest, PlaylistRef, RemovalReport, RemoveTracksRequest,
};
pub use spotify::{TokenResponse, UserProfile};
pub use track::{ArtistRef, TrackSummary};
