use crate::error::{AppError, Result};
use crate::models::{
    LikedToPlaylistOptions, Operation, OperationEvent, OperationProgress, OperationStatus,
    OperationType, PipelineReport,
};
use crate::services::pipeline::{CancelFlag, Pipeline};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use uuid::Uuid;

/// Finished operations kept for listing before the oldest are evicted
const MAX_RETAINED_OPERATIONS: usize = 200;

struct OperationEntry {
    operation: Operation,
    cancel: CancelFlag,
    events: broadcast::Sender<OperationEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct OperationFilter {
    pub status: Option<OperationStatus>,
    pub operation_type: Option<OperationType>,
    pub limit: usize,
    pub offset: usize,
}

/// Per-session tallies for the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    /// Pending or in progress
    pub active: usize,
    pub completed_liked_to_playlist: usize,
}

/// Tracks background pipeline runs per session.
pub struct OperationManager {
    entries: RwLock<HashMap<Uuid, OperationEntry>>,
    pipeline: Arc<Pipeline>,
}

impl OperationManager {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            pipeline,
        }
    }

    pub async fn start_liked_to_playlist(
        self: &Arc<Self>,
        session_id: Uuid,
        options: LikedToPlaylistOptions,
    ) -> Result<Operation> {
        let now = Utc::now();
        let operation = Operation {
            id: Uuid::new_v4(),
            session_id,
            operation_type: OperationType::LikedToPlaylist,
            status: OperationStatus::Pending,
            progress: OperationProgress::default(),
            current_step: None,
            report: None,
            error: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        let id = operation.id;
        let cancel = CancelFlag::default();
        let (events, _) = broadcast::channel(64);

        {
            let mut entries = self.entries.write().await;
            entries.insert(
                id,
                OperationEntry {
                    operation: operation.clone(),
                    cancel: cancel.clone(),
                    events,
                },
            );
            evict_finished(&mut entries);
        }

        tracing::info!("Operation {} queued for session {}", id, session_id);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.execute(id, session_id, options, cancel).await;
        });

        Ok(operation)
    }

    async fn execute(
        &self,
        id: Uuid,
        session_id: Uuid,
        options: LikedToPlaylistOptions,
        cancel: CancelFlag,
    ) {
        if !self.transition(id, OperationStatus::InProgress).await {
            // cancelled before it started
            self.finish(id, Err(AppError::Cancelled { report: Box::default() }))
                .await;
            return;
        }

        let (progress_tx, mut progress_rx) = mpsc::channel::<OperationEvent>(32);

        let run = self.pipeline.run(session_id, options, Some(progress_tx), cancel);
        let forward = async {
            while let Some(event) = progress_rx.recv().await {
                self.record_event(id, event).await;
            }
        };

        let (result, ()) = tokio::join!(run, forward);
        self.finish(id, result).await;
    }

    async fn transition(&self, id: Uuid, next: OperationStatus) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&id) else {
            return false;
        };
        if entry.cancel.is_cancelled() || !entry.operation.status.can_transition_to(next) {
            return false;
        }
        entry.operation.status = next;
        entry.operation.updated_at = Utc::now();
        true
    }

    async fn record_event(&self, id: Uuid, event: OperationEvent) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&id) else {
            return;
        };

        match &event {
            OperationEvent::StepStarted { step, .. } => {
                entry.operation.current_step = Some(*step);
                entry.operation.progress = OperationProgress::default();
            }
            OperationEvent::Progress {
                step,
                current,
                total,
                ..
            } => {
                entry.operation.current_step = Some(*step);
                entry.operation.progress = OperationProgress::new(*current, *total);
            }
            _ => {}
        }
        entry.operation.updated_at = Utc::now();

        // no subscribers is fine
        let _ = entry.events.send(event);
    }

    /// Applies the final result and notifies subscribers under the same lock,
    /// so a subscriber never sees a terminal event before the terminal status.
    async fn finish(&self, id: Uuid, result: Result<PipelineReport>) {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(&id) else {
            return;
        };

        let now = Utc::now();
        let op = &mut entry.operation;
        let event = match result {
            Ok(report) => {
                op.status = OperationStatus::Completed;
                op.progress = OperationProgress::new(report.tracks_added, report.tracks_added);
                op.progress.percentage = 100;
                op.report = Some(report.clone());
                tracing::info!("Operation {} completed", id);
                OperationEvent::Completed { report }
            }
            Err(AppError::Cancelled { report }) => {
                op.status = OperationStatus::Cancelled;
                op.report = Some((*report).clone());
                tracing::info!("Operation {} cancelled", id);
                OperationEvent::Cancelled {
                    report: Some(*report),
                }
            }
            Err(AppError::PipelineFailed { report, source }) => {
                op.status = OperationStatus::Failed;
                op.error = Some(source.to_string());
                op.report = Some((*report).clone());
                tracing::warn!("Operation {} failed: {}", id, source);
                OperationEvent::Failed {
                    message: source.to_string(),
                    report: Some(*report),
                }
            }
            Err(e) => {
                op.status = OperationStatus::Failed;
                op.error = Some(e.to_string());
                tracing::warn!("Operation {} failed: {}", id, e);
                OperationEvent::Failed {
                    message: e.to_string(),
                    report: None,
                }
            }
        };
        op.current_step = None;
        op.updated_at = now;
        op.completed_at = Some(now);

        let _ = entry.events.send(event);
    }

    pub async fn list(&self, session_id: Uuid, filter: &OperationFilter) -> (Vec<Operation>, usize) {
        let entries = self.entries.read().await;
        let mut matching: Vec<Operation> = entries
            .values()
            .map(|e| &e.operation)
            .filter(|op| op.session_id == session_id)
            .filter(|op| filter.status.map_or(true, |s| op.status == s))
            .filter(|op| filter.operation_type.map_or(true, |t| op.operation_type == t))
            .cloned()
            .collect();
        drop(entries);

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len();
        let page = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect();
        (page, total)
    }

    pub async fn counts(&self, session_id: Uuid) -> OperationCounts {
        let entries = self.entries.read().await;
        entries
            .values()
            .map(|e| &e.operation)
            .filter(|op| op.session_id == session_id)
            .fold(OperationCounts::default(), |mut counts, op| {
                if !op.status.is_terminal() {
                    counts.active += 1;
                }
                if op.status == OperationStatus::Completed
                    && op.operation_type == OperationType::LikedToPlaylist
                {
                    counts.completed_liked_to_playlist += 1;
                }
                counts
            })
    }

    pub async fn get(&self, session_id: Uuid, id: Uuid) -> Result<Operation> {
        self.entries
            .read()
            .await
            .get(&id)
            .filter(|e| e.operation.session_id == session_id)
            .map(|e| e.operation.clone())
            .ok_or_else(|| AppError::NotFound("Operation not found".to_string()))
    }

    pub async fn cancel(&self, session_id: Uuid, id: Uuid) -> Result<Operation> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(&id)
            .filter(|e| e.operation.session_id == session_id)
            .ok_or_else(|| AppError::NotFound("Operation not found".to_string()))?;

        if entry.operation.status.is_terminal() {
            return Err(AppError::Validation(format!(
                "Operation already {}",
                entry.operation.status.as_str()
            )));
        }

        entry.cancel.cancel();
        tracing::info!("Cancellation requested for operation {}", id);
        Ok(entry.operation.clone())
    }

    /// Current snapshot plus a receiver for every later event.
    pub async fn subscribe(
        &self,
        session_id: Uuid,
        id: Uuid,
    ) -> Result<(Operation, broadcast::Receiver<OperationEvent>)> {
        let entries = self.entries.read().await;
        let entry = entries
            .get(&id)
            .filter(|e| e.operation.session_id == session_id)
            .ok_or_else(|| AppError::NotFound("Operation not found".to_string()))?;
        Ok((entry.operation.clone(), entry.events.subscribe()))
    }
}

fn evict_finished(entries: &mut HashMap<Uuid, OperationEntry>) {
    if entries.len() <= MAX_RETAINED_OPERATIONS {
        return;
    }

    let mut finished: Vec<(Uuid, chrono::DateTime<Utc>)> = entries
        .values()
        .filter(|e| e.operation.status.is_terminal())
        .map(|e| (e.operation.id, e.operation.created_at))
        .collect();
    finished.sort_by_key(|(_, created)| *created);

    let excess = entries.len() - MAX_RETAINED_OPERATIONS;
    for (id, _) in finished.into_iter().take(excess) {
        entries.remove(&id);
    }
}
