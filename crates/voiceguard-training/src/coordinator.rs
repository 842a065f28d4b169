//! The training loop and the publish cycle that follows each improvement.
//!
//! A publish cycle walks [`PublishStep`] in order: resolve the repository,
//! lock it (private), upload the checkpoint, announce the reference on the
//! ledger, unlock it (public). A failed cycle is logged and training goes on.

use crate::checkpoint::{current_is_better, CheckpointStore};
use crate::config::{EpochLimit, TrainingConfig, VisibilityRestore};
use crate::error::{TrainingError, TrainingResult};
use crate::hub::{HubClient, Visibility};
use crate::layout::CheckpointLayout;
use crate::ledger::{LedgerAnnouncer, LedgerClient, RetryPolicy};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::publisher::{ArtifactPublisher, PublicationReference};
use crate::trainer::Trainer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStep {
    Persist,
    Resolve,
    Lock,
    Upload,
    Announce,
    Unlock,
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Persist => "persist",
            Self::Resolve => "resolve",
            Self::Lock => "lock",
            Self::Upload => "upload",
            Self::Announce => "announce",
            Self::Unlock => "unlock",
        };
        f.write_str(name)
    }
}

/// A publish cycle that stopped at `step`.
#[derive(Debug)]
pub struct CycleFailure {
    pub step: PublishStep,
    pub error: TrainingError,
}

impl fmt::Display for CycleFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.step, self.error)
    }
}

fn at(step: PublishStep) -> impl FnOnce(TrainingError) -> CycleFailure {
    move |error| CycleFailure { step, error }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub epochs: u64,
    pub checkpoints_saved: u64,
    pub published: Vec<PublicationReference>,
    pub aborted_cycles: u64,
    pub cancelled: bool,
}

/// Written to `state_dir` while a repository is private on our account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PendingPublish {
    repository_id: String,
    locked_at: DateTime<Utc>,
}

pub struct TrainingCoordinator {
    config: TrainingConfig,
    layout: CheckpointLayout,
    trainer: Arc<dyn Trainer>,
    store: CheckpointStore,
    publisher: ArtifactPublisher,
    announcer: LedgerAnnouncer,
    progress: Arc<dyn ProgressSink>,
}

impl TrainingCoordinator {
    pub fn new(
        config: TrainingConfig,
        trainer: Arc<dyn Trainer>,
        hub: Arc<dyn HubClient>,
        ledger: Arc<dyn LedgerClient>,
        progress: Arc<dyn ProgressSink>,
    ) -> TrainingResult<Self> {
        config.validate()?;
        let layout = CheckpointLayout::new(config.save_path.clone(), config.state_dir.clone());
        let store = CheckpointStore::open(&layout)?;
        if let Some(loss) = store.best_loss() {
            info!(loss, "Resuming from existing checkpoint");
        }
        let announcer = LedgerAnnouncer::new(ledger, RetryPolicy::from(&config.retry));

        Ok(Self {
            config,
            layout,
            trainer,
            store,
            publisher: ArtifactPublisher::new(hub),
            announcer,
            progress,
        })
    }

    #[must_use]
    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Whether an epoch ending at `loss` should replace the canonical checkpoint.
    #[must_use]
    pub fn is_improvement(&self, loss: Option<f64>) -> bool {
        if !self.config.track_loss {
            return true;
        }
        match loss {
            Some(loss) => current_is_better(loss, self.store.best_loss()),
            None => {
                warn!(trainer = self.trainer.id(), "Loss tracking is on but the trainer reported no loss");
                false
            }
        }
    }

    /// Train until the epoch limit is reached or `cancel` fires.
    ///
    /// In continuous mode every improvement is persisted and published; a
    /// finite run only persists. Errors from the trainer end the run, publish
    /// failures do not.
    pub async fn run(&mut self, cancel: &CancellationToken) -> TrainingResult<RunSummary> {
        self.layout.ensure_dirs()?;
        self.trainer.prepare().await?;

        let limit = self.config.num_epochs;
        info!(
            trainer = self.trainer.id(),
            device = %self.config.device,
            threads = self.config.device.effective_threads(),
            gpu = ?self.config.device.primary_gpu(),
            epochs = i64::from(limit),
            "Training started"
        );
        self.progress.on_event(ProgressEvent::Started {
            trainer: self.trainer.id().to_string(),
            device: self.config.device.to_string(),
        });

        let mut summary = RunSummary::default();
        let mut epoch: u64 = 1;
        loop {
            if let EpochLimit::Finite(max) = limit
                && epoch > max
            {
                break;
            }
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let report = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    summary.cancelled = true;
                    break;
                }
                report = self.trainer.train_epoch(epoch) => report?,
            };
            summary.epochs = epoch;

            let improved = self.is_improvement(report.loss);
            match report.loss {
                Some(loss) => info!(epoch, loss, improved, "Epoch finished"),
                None => info!(epoch, batches = report.batches, "Epoch finished"),
            }
            self.progress.on_event(ProgressEvent::EpochFinished { epoch, loss: report.loss, improved });

            if improved {
                match self.persist(epoch, report.loss) {
                    Ok(()) => summary.checkpoints_saved += 1,
                    Err(failure) => {
                        self.abort_cycle(epoch, &failure);
                        summary.aborted_cycles += 1;
                        epoch += 1;
                        continue;
                    }
                }

                if limit == EpochLimit::Continuous {
                    match self.publish_cycle(epoch, cancel).await {
                        Ok(reference) => summary.published.push(reference),
                        Err(CycleFailure { error: TrainingError::Cancelled, .. }) => {
                            summary.cancelled = true;
                            break;
                        }
                        Err(failure) => {
                            self.abort_cycle(epoch, &failure);
                            summary.aborted_cycles += 1;
                        }
                    }
                }
            }

            epoch += 1;
        }

        info!(
            epochs = summary.epochs,
            published = summary.published.len(),
            aborted = summary.aborted_cycles,
            cancelled = summary.cancelled,
            "Training stopped"
        );
        self.progress.on_event(ProgressEvent::Stopped { epochs: summary.epochs });
        Ok(summary)
    }

    fn persist(&mut self, epoch: u64, loss: Option<f64>) -> Result<(), CycleFailure> {
        let checkpoint = self
            .store
            .save(self.trainer.model_state(), self.trainer.preprocessor(), loss)
            .map_err(at(PublishStep::Persist))?;
        self.progress.on_event(ProgressEvent::CheckpointSaved { epoch, path: checkpoint.path.clone() });
        Ok(())
    }

    fn abort_cycle(&self, epoch: u64, failure: &CycleFailure) {
        error!(epoch, step = %failure.step, error = %failure.error, "Publish cycle aborted");
        self.progress.on_event(ProgressEvent::CycleAborted {
            epoch,
            step: failure.step,
            error: failure.error.to_string(),
        });
    }

    /// Publish the canonical checkpoint and announce it.
    ///
    /// The repository stays private from the lock until the ledger accepts the
    /// reference. On failure it is made public again only under
    /// [`VisibilityRestore::Always`]; otherwise the pending marker is left in
    /// `state_dir` for [`Self::recover_visibility`].
    pub async fn publish_cycle(
        &self,
        epoch: u64,
        cancel: &CancellationToken,
    ) -> Result<PublicationReference, CycleFailure> {
        let hub = &self.config.hub;
        let name = hub.require_repo_name().map_err(at(PublishStep::Resolve))?;
        let repo_id = self
            .publisher
            .ensure_repository(hub.owner.as_deref(), name)
            .await
            .map_err(at(PublishStep::Resolve))?;

        self.write_pending(&repo_id).map_err(at(PublishStep::Lock))?;
        if let Err(e) = self.publisher.set_visibility(&repo_id, Visibility::Private).await {
            self.clear_pending().map_err(at(PublishStep::Lock))?;
            return Err(CycleFailure { step: PublishStep::Lock, error: e });
        }

        match self.upload_and_announce(epoch, &repo_id, cancel).await {
            Ok(reference) => {
                self.publisher
                    .set_visibility(&repo_id, Visibility::Public)
                    .await
                    .map_err(at(PublishStep::Unlock))?;
                self.clear_pending().map_err(at(PublishStep::Unlock))?;
                Ok(reference)
            }
            Err(failure) => {
                self.after_failed_cycle(&repo_id).await;
                Err(failure)
            }
        }
    }

    async fn upload_and_announce(
        &self,
        epoch: u64,
        repo_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PublicationReference, CycleFailure> {
        let reference = self
            .publisher
            .publish(self.store.destination(), repo_id)
            .await
            .map_err(at(PublishStep::Upload))?;
        self.progress.on_event(ProgressEvent::Published { epoch, reference: reference.clone() });

        let receipt = self
            .announcer
            .announce(&reference, cancel)
            .await
            .map_err(|e| CycleFailure { step: PublishStep::Announce, error: e.into() })?;
        self.progress.on_event(ProgressEvent::Announced {
            epoch,
            reference: reference.clone(),
            attempts: receipt.attempts,
        });
        Ok(reference)
    }

    async fn after_failed_cycle(&self, repo_id: &str) {
        if self.config.visibility_restore != VisibilityRestore::Always {
            warn!(repo_id = %repo_id, "Repository left private after failed publish cycle");
            return;
        }
        match self.publisher.set_visibility(repo_id, Visibility::Public).await {
            Ok(()) => {
                if let Err(e) = self.clear_pending() {
                    warn!(error = %e, "Failed to clear pending publish marker");
                }
            }
            Err(e) => warn!(repo_id = %repo_id, error = %e, "Failed to restore repository visibility"),
        }
    }

    /// Make public a repository left private by an interrupted or failed cycle.
    ///
    /// Returns the repository that was restored, if a pending marker existed.
    pub async fn recover_visibility(&self) -> TrainingResult<Option<String>> {
        recover_visibility(&self.layout, &self.publisher).await
    }

    fn write_pending(&self, repo_id: &str) -> TrainingResult<()> {
        write_pending(&self.layout, repo_id)
    }

    fn clear_pending(&self) -> TrainingResult<()> {
        clear_pending(&self.layout)
    }
}

/// Restore public visibility of the repository named by the pending marker
/// under `layout.state_dir()`, then remove the marker.
pub async fn recover_visibility(
    layout: &CheckpointLayout,
    publisher: &ArtifactPublisher,
) -> TrainingResult<Option<String>> {
    let Some(pending) = read_pending(layout)? else {
        return Ok(None);
    };
    info!(
        repo_id = %pending.repository_id,
        locked_at = %pending.locked_at,
        "Restoring visibility of repository left private"
    );
    publisher.set_visibility(&pending.repository_id, Visibility::Public).await?;
    clear_pending(layout)?;
    Ok(Some(pending.repository_id))
}

fn read_pending(layout: &CheckpointLayout) -> TrainingResult<Option<PendingPublish>> {
    let path = layout.pending_publish_path();
    if !path.is_file() {
        return Ok(None);
    }
    let bytes = std::fs::read(&path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
}

fn write_pending(layout: &CheckpointLayout, repo_id: &str) -> TrainingResult<()> {
    let pending = PendingPublish { repository_id: repo_id.to_string(), locked_at: Utc::now() };
    std::fs::create_dir_all(layout.state_dir())?;
    std::fs::write(layout.pending_publish_path(), serde_json::to_vec_pretty(&pending)?)?;
    Ok(())
}

fn clear_pending(layout: &CheckpointLayout) -> TrainingResult<()> {
    match std::fs::remove_file(layout.pending_publish_path()) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
