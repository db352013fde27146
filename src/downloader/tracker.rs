//! Part state tracker: turns fetch callbacks into part state transitions.
//!
//! Callbacks are correlated through an in-memory `TaskId -> (JobId, PartId)` index, then the
//! job is loaded from the store by part id. Every accepted transition is persisted with a
//! conditional update before it is merged into the aggregator snapshot, so terminal states
//! are never left. Correlation and relocation errors are logged and contained here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::Database;
use crate::error::{DownloadError, Result};
use crate::fetch::{FetchListener, FetchTask};
use crate::types::{DownloadJob, JobId, PartId, PartState, TaskId};
use crate::utils;

use super::progress::ProgressAggregator;

/// Accept a progress fraction only if it is a finite number within [0, 1]
pub(crate) fn accept_fraction(fraction: f64) -> Option<f64> {
    (fraction.is_finite() && (0.0..=1.0).contains(&fraction)).then_some(fraction)
}

pub(crate) struct PartTracker {
    db: Arc<Database>,
    aggregator: ProgressAggregator,
    tasks: Mutex<HashMap<TaskId, (JobId, PartId)>>,
}

impl PartTracker {
    pub(crate) fn new(db: Arc<Database>, aggregator: ProgressAggregator) -> Self {
        Self {
            db,
            aggregator,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Register a task before it is submitted
    pub(crate) async fn register(&self, task: &FetchTask) {
        self.tasks
            .lock()
            .await
            .insert(task.id, (task.job_id, task.part_id));
    }

    /// Number of registered, not yet terminated tasks
    pub(crate) async fn active_tasks(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub(crate) async fn handle_progress(
        &self,
        task_id: TaskId,
        written: u64,
        expected: Option<u64>,
    ) -> Result<()> {
        let (job, part_id) = self.resolve(task_id).await?;

        let Some(fraction) = expected
            .map(|total| written as f64 / total as f64)
            .and_then(accept_fraction)
        else {
            tracing::trace!(
                task_id = %task_id,
                written,
                ?expected,
                "discarding invalid progress"
            );
            return Ok(());
        };

        self.apply(job, part_id, PartState::InProgress { progress: fraction })
            .await?;
        Ok(())
    }

    pub(crate) async fn handle_finished(&self, task_id: TaskId, temp_path: &Path) -> Result<()> {
        let resolved = self.resolve(task_id).await;
        self.tasks.lock().await.remove(&task_id);
        let (job, part_id) = resolved?;

        let Some(part) = job.part(part_id) else {
            return Err(DownloadError::PartNotFound {
                job_id: job.id,
                part_id,
            }
            .into());
        };
        if part.state.is_done() {
            tracing::debug!(
                part_id = %part_id,
                "part already terminal, ignoring finished callback"
            );
            return Ok(());
        }
        let destination = part.destination.clone();

        if destination.as_os_str().is_empty() || destination.parent().is_none() {
            let error = DownloadError::DestinationUndefined { part_id };
            let state = PartState::Failed {
                reason: error.to_string(),
            };
            self.apply(job, part_id, state).await?;
            return Err(error.into());
        }

        let state = match utils::relocate_file(temp_path, &destination).await {
            Ok(()) => {
                tracing::debug!(part_id = %part_id, path = ?destination, "part relocated");
                PartState::Succeeded
            }
            Err(e) => {
                tracing::warn!(
                    part_id = %part_id,
                    path = ?destination,
                    error = %e,
                    "failed to relocate fetched file"
                );
                // Failed parts are not retried
                if let Err(e) = tokio::fs::remove_file(temp_path).await
                    && e.kind() != std::io::ErrorKind::NotFound
                {
                    tracing::debug!(path = ?temp_path, error = %e, "failed to remove temp file");
                }
                PartState::Failed {
                    reason: format!("failed to move file to {}: {}", destination.display(), e),
                }
            }
        };

        self.apply(job, part_id, state).await?;
        Ok(())
    }

    pub(crate) async fn handle_failed(&self, task_id: TaskId, error: String) -> Result<()> {
        let resolved = self.resolve(task_id).await;
        self.tasks.lock().await.remove(&task_id);
        let (job, part_id) = resolved?;

        tracing::warn!(
            job_id = %job.id,
            part_id = %part_id,
            error = %error,
            "part fetch failed"
        );
        let state = PartState::Failed {
            reason: DownloadError::FailedDownload { reason: error }.to_string(),
        };

        self.apply(job, part_id, state).await?;
        Ok(())
    }

    /// task handle -> (job, part) -> persisted job
    async fn resolve(&self, task_id: TaskId) -> Result<(DownloadJob, PartId)> {
        let (job_id, part_id) = self
            .tasks
            .lock()
            .await
            .get(&task_id)
            .copied()
            .ok_or(DownloadError::NoTaskHandle { task_id })?;

        let job = self
            .db
            .get_job_by_part_id(part_id)
            .await?
            .ok_or(DownloadError::ItemNotFound { part_id })?;

        if job.id != job_id || job.part(part_id).is_none() {
            return Err(DownloadError::PartNotFound { job_id, part_id }.into());
        }

        Ok((job, part_id))
    }

    /// Persist a transition and merge it into the snapshot
    ///
    /// Returns `false` when the part was already terminal and the transition was dropped.
    async fn apply(
        &self,
        mut job: DownloadJob,
        part_id: PartId,
        state: PartState,
    ) -> Result<bool> {
        if !self.db.update_part_state(part_id, &state).await? {
            tracing::debug!(
                part_id = %part_id,
                ?state,
                "part already terminal, ignoring update"
            );
            return Ok(false);
        }

        if let Some(part) = job.part_mut(part_id) {
            part.state = state.clone();
        }

        self.aggregator.update_part(job, part_id, state).await;
        Ok(true)
    }
}

#[async_trait::async_trait]
impl FetchListener for PartTracker {
    async fn on_progress(&self, task_id: TaskId, written: u64, expected: Option<u64>) {
        if let Err(e) = self.handle_progress(task_id, written, expected).await {
            tracing::warn!(task_id = %task_id, error = %e, "dropping progress callback");
        }
    }

    async fn on_finished(&self, task_id: TaskId, temp_path: PathBuf) {
        if let Err(e) = self.handle_finished(task_id, &temp_path).await {
            tracing::warn!(task_id = %task_id, error = %e, "dropping finished callback");
        }
    }

    async fn on_failed(&self, task_id: TaskId, error: String) {
        if let Err(e) = self.handle_failed(task_id, error).await {
            tracing::warn!(task_id = %task_id, error = %e, "dropping failure callback");
        }
    }
}
