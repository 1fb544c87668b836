//! The "convert my liked songs into a playlist" pipeline.
//!
//! Stages run strictly in order: refresh token, fetch profile, create
//! playlist, enumerate liked tracks, insert tracks. Every external side
//! effect records a compensation so a failed or cancelled run can report
//! (or undo) what it left behind.
//!
//! Credentials are read from the session before every provider call, so a
//! token that expires during a long enumeration is refreshed in place.

use crate::error::{AppError, Result};
use crate::models::{
    Compensation, CompensationOutcome, CreatePlaylistRequest, LikedToPlaylistOptions,
    OperationEvent, PipelineReport, PipelineStep, StepResult, StepStatus,
};
use crate::services::library::liked_pages;
use crate::services::playlists::{add_tracks_batched_with, create_playlist};
use crate::services::session::{SessionService, TokenSource};
use crate::services::spotify::SpotifyApi;
use futures::StreamExt;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Cooperative cancellation, checked between stages and between chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Pipeline {
    sessions: Arc<SessionService>,
    spotify: Arc<dyn SpotifyApi>,
}

/// State of a single run.
struct Run<'a> {
    session_id: Uuid,
    spotify: &'a dyn SpotifyApi,
    tokens: &'a dyn TokenSource,
    events: Option<mpsc::Sender<OperationEvent>>,
    cancel: CancelFlag,
    rollback: bool,
    report: PipelineReport,
    compensations: Vec<Compensation>,
}

impl Pipeline {
    pub fn new(sessions: Arc<SessionService>, spotify: Arc<dyn SpotifyApi>) -> Self {
        Self { sessions, spotify }
    }

    pub async fn run(
        &self,
        session_id: Uuid,
        options: LikedToPlaylistOptions,
        events: Option<mpsc::Sender<OperationEvent>>,
        cancel: CancelFlag,
    ) -> Result<PipelineReport> {
        let tokens = self.sessions.tokens(session_id);
        let mut run = Run {
            session_id,
            spotify: self.spotify.as_ref(),
            tokens: &tokens,
            events,
            cancel,
            rollback: options.rollback_on_failure,
            report: PipelineReport::default(),
            compensations: Vec::new(),
        };

        run.emit(OperationEvent::Started {
            message: "Converting liked songs into a playlist".to_string(),
        })
        .await;

        // refresh token
        run.checkpoint().await?;
        run.step_started(PipelineStep::RefreshToken).await;
        match self.sessions.refresh(session_id).await {
            Ok(_) => {
                run.step_finished(PipelineStep::RefreshToken, StepStatus::Succeeded, None)
                    .await;
            }
            Err(AppError::NotAuthenticated) => {
                // No refresh token held: proceed only while the access token is valid
                match run.tokens.current().await {
                    Ok(_) => {
                        run.step_finished(
                            PipelineStep::RefreshToken,
                            StepStatus::Skipped,
                            Some("No refresh token held; current access token still valid".to_string()),
                        )
                        .await;
                    }
                    Err(e) => return Err(run.fail(PipelineStep::RefreshToken, e).await),
                }
            }
            Err(e) => return Err(run.fail(PipelineStep::RefreshToken, e).await),
        }

        // fetch profile
        run.checkpoint().await?;
        run.step_started(PipelineStep::FetchProfile).await;
        let profile = match run.tokens.current().await {
            Ok(ctx) => run.spotify.current_user(&ctx).await,
            Err(e) => Err(e),
        };
        let profile = match profile {
            Ok(profile) => profile,
            Err(e) => return Err(run.fail(PipelineStep::FetchProfile, e).await),
        };
        run.step_finished(
            PipelineStep::FetchProfile,
            StepStatus::Succeeded,
            Some(format!("Signed in as {}", profile.name())),
        )
        .await;

        // create playlist
        run.checkpoint().await?;
        run.step_started(PipelineStep::CreatePlaylist).await;
        let request = CreatePlaylistRequest {
            name: options
                .name
                .clone()
                .unwrap_or_else(|| format!("{}'s Liked", profile.name())),
            description: Some(
                options
                    .description
                    .clone()
                    .unwrap_or_else(|| "Collection of all the liked songs".to_string()),
            ),
            public: options.public,
        };
        let created = match run.tokens.current().await {
            Ok(ctx) => create_playlist(run.spotify, &ctx, &profile.id, &request).await,
            Err(e) => Err(e),
        };
        let playlist = match created {
            Ok(playlist) => playlist,
            Err(e) => return Err(run.fail(PipelineStep::CreatePlaylist, e).await),
        };
        run.compensations.push(Compensation::UnfollowPlaylist {
            playlist_id: playlist.id.clone(),
        });
        run.report.playlist = Some(playlist.clone());
        run.step_finished(
            PipelineStep::CreatePlaylist,
            StepStatus::Succeeded,
            Some(format!("Created playlist '{}'", playlist.name)),
        )
        .await;

        // enumerate liked tracks
        run.checkpoint().await?;
        run.step_started(PipelineStep::EnumerateLiked).await;
        let mut uris = Vec::new();
        {
            let mut pages = Box::pin(liked_pages(run.spotify, run.tokens));
            while let Some(page) = pages.next().await {
                let page = match page {
                    Ok(page) => page,
                    Err(e) => return Err(run.fail(PipelineStep::EnumerateLiked, e).await),
                };
                uris.extend(page.tracks.into_iter().map(|t| t.uri));
                let fetched = page.offset as usize + page.received;
                let total = page.total.map(|t| t as usize).unwrap_or(fetched).max(fetched);
                run.emit(OperationEvent::Progress {
                    step: PipelineStep::EnumerateLiked,
                    current: fetched,
                    total,
                    message: format!("Fetched {} of {} liked songs", fetched, total),
                })
                .await;

                if run.cancel.is_cancelled() {
                    run.step_finished(
                        PipelineStep::EnumerateLiked,
                        StepStatus::Cancelled,
                        Some(format!(
                            "Cancelled after fetching {} of {} liked songs",
                            fetched, total
                        )),
                    )
                    .await;
                    return Err(run.cancelled().await);
                }
            }
        }
        run.report.tracks_found = uris.len();
        run.step_finished(
            PipelineStep::EnumerateLiked,
            StepStatus::Succeeded,
            Some(format!("Found {} liked songs", uris.len())),
        )
        .await;

        // insert tracks
        run.checkpoint().await?;
        run.step_started(PipelineStep::InsertTracks).await;
        if uris.is_empty() {
            run.step_finished(
                PipelineStep::InsertTracks,
                StepStatus::Skipped,
                Some("No liked songs to add".to_string()),
            )
            .await;
        } else {
            let total = uris.len();
            let cancel = run.cancel.clone();
            let progress_tx = run.events.clone();
            let inserted =
                add_tracks_batched_with(run.spotify, run.tokens, &playlist.id, &uris, |batch| {
                    if let Some(tx) = &progress_tx {
                        // try_send: a slow consumer only loses intermediate progress
                        let _ = tx.try_send(OperationEvent::Progress {
                            step: PipelineStep::InsertTracks,
                            current: batch.tracks_added,
                            total,
                            message: format!("Added {} of {} songs", batch.tracks_added, total),
                        });
                    }
                    if cancel.is_cancelled() {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                })
                .await;

            match inserted {
                Ok(batch) => {
                    run.report.tracks_added = batch.tracks_added;
                    if batch.tracks_added < total {
                        run.step_finished(
                            PipelineStep::InsertTracks,
                            StepStatus::Cancelled,
                            Some(format!(
                                "Cancelled after adding {} of {} songs",
                                batch.tracks_added, total
                            )),
                        )
                        .await;
                        return Err(run.cancelled().await);
                    }
                }
                Err(e) => {
                    if let AppError::PartialBatchFailure {
                        committed_tracks, ..
                    } = &e
                    {
                        run.report.tracks_added = *committed_tracks;
                    }
                    return Err(run.fail(PipelineStep::InsertTracks, e).await);
                }
            }

            run.step_finished(
                PipelineStep::InsertTracks,
                StepStatus::Succeeded,
                Some(format!("Added {} songs", run.report.tracks_added)),
            )
            .await;
        }

        tracing::info!(
            "Pipeline for session {} finished: {} of {} tracks added to {}",
            session_id,
            run.report.tracks_added,
            run.report.tracks_found,
            playlist.id
        );
        Ok(run.report)
    }
}

impl Run<'_> {
    async fn emit(&self, event: OperationEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    async fn step_started(&self, step: PipelineStep) {
        self.emit(OperationEvent::StepStarted {
            step,
            message: format!("Starting: {}", step),
        })
        .await;
    }

    async fn step_finished(&mut self, step: PipelineStep, status: StepStatus, detail: Option<String>) {
        let result = StepResult {
            step,
            status,
            detail,
        };
        self.report.steps.push(result.clone());
        self.emit(OperationEvent::StepFinished { result }).await;
    }

    /// Stops the run if cancellation was requested.
    async fn checkpoint(&mut self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled().await);
        }
        Ok(())
    }

    async fn cancelled(&mut self) -> AppError {
        tracing::info!("Pipeline for session {} cancelled", self.session_id);
        self.skip_remaining();
        self.compensate().await;
        AppError::Cancelled {
            report: Box::new(self.report.clone()),
        }
    }

    async fn fail(&mut self, step: PipelineStep, error: AppError) -> AppError {
        tracing::error!("Pipeline step '{}' failed: {}", step, error);
        self.step_finished(step, StepStatus::Failed, Some(error.to_string()))
            .await;
        self.skip_remaining();
        self.compensate().await;
        AppError::PipelineFailed {
            report: Box::new(self.report.clone()),
            source: Box::new(error),
        }
    }

    fn skip_remaining(&mut self) {
        let done: Vec<PipelineStep> = self.report.steps.iter().map(|s| s.step).collect();
        for step in PipelineStep::ALL {
            if !done.contains(&step) {
                self.report.steps.push(StepResult {
                    step,
                    status: StepStatus::Skipped,
                    detail: None,
                });
            }
        }
    }

    /// Reports every recorded compensation, executing them newest first when
    /// rollback was requested.
    async fn compensate(&mut self) {
        while let Some(compensation) = self.compensations.pop() {
            if !self.rollback {
                self.report.compensations.push(CompensationOutcome {
                    compensation,
                    executed: false,
                    error: None,
                });
                continue;
            }

            let result = match self.tokens.current().await {
                Ok(ctx) => match &compensation {
                    Compensation::UnfollowPlaylist { playlist_id } => {
                        self.spotify.unfollow_playlist(&ctx, playlist_id).await
                    }
                },
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                tracing::error!("Compensation {:?} failed: {}", compensation, e);
            }
            self.report.compensations.push(CompensationOutcome {
                compensation,
                executed: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
            });
        }
    }
}
