//! Turns a fully done job into a local media record.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::db::Database;
use crate::error::{DownloadError, Result};
use crate::metadata::{MediaItem, MetadataService};
use crate::types::{
    DownloadJob, Event, LocalFile, LocalMediaProgress, LocalMediaRecord, PartState,
};
use crate::utils;

use super::progress::JobFinalizer;

pub(crate) struct CompletionAssembler {
    db: Arc<Database>,
    metadata: Arc<dyn MetadataService>,
    event_tx: broadcast::Sender<Event>,
}

impl CompletionAssembler {
    pub(crate) fn new(
        db: Arc<Database>,
        metadata: Arc<dyn MetadataService>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            db,
            metadata,
            event_tx,
        }
    }

    /// Finalize a job whose parts are all terminal
    ///
    /// Successful jobs get a local record (and local progress) plus a `JobComplete` event.
    /// Failed jobs only get logged. The persisted job is deleted either way.
    pub(crate) async fn finalize_job(&self, job: DownloadJob) {
        if job.is_successful() {
            self.complete(&job).await;
        } else {
            let failed = job.parts.iter().filter(|p| p.state.is_failed()).count();
            tracing::warn!(
                job_id = %job.id,
                library_item_id = %job.library_item_id,
                failed_parts = failed,
                "download job failed, no local record created"
            );
        }

        match self.db.delete_job(job.id).await {
            Ok(_) => tracing::debug!(job_id = %job.id, "removed finished job from store"),
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "failed to delete finished job");
            }
        }
    }

    async fn complete(&self, job: &DownloadJob) {
        let assembled = match self
            .metadata
            .get_item(&job.server, &job.library_item_id, job.episode_id.as_deref())
            .await
        {
            Ok(Some(item)) => self.assemble(job, &item).await,
            Ok(None) => Err(DownloadError::RemoteItemNotFound {
                item_id: job.library_item_id.clone(),
            }
            .into()),
            Err(e) => Err(e),
        };

        let event = match assembled {
            Ok((record, progress)) => {
                tracing::info!(
                    job_id = %job.id,
                    local_media_item_id = %record.id,
                    files = record.files.len(),
                    has_cover = record.cover_path.is_some(),
                    "download job complete"
                );
                Event::JobComplete {
                    job_id: job.id,
                    library_item_id: job.library_item_id.clone(),
                    local_media_item: Some(record),
                    local_progress: progress,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job.id,
                    error = %e,
                    "failed to assemble local media record"
                );
                Event::JobComplete {
                    job_id: job.id,
                    library_item_id: job.library_item_id.clone(),
                    local_media_item: None,
                    local_progress: None,
                    error: Some(e.to_string()),
                }
            }
        };

        self.event_tx.send(event).ok();
    }

    /// Build and persist the local record and local progress
    async fn assemble(
        &self,
        job: &DownloadJob,
        item: &MediaItem,
    ) -> Result<(LocalMediaRecord, Option<LocalMediaProgress>)> {
        let mut files = Vec::new();
        for part in job.parts.iter().filter(|p| !p.kind.is_cover()) {
            if part.state != PartState::Succeeded {
                continue;
            }
            let size_bytes = tokio::fs::metadata(&part.destination).await?.len();
            files.push(LocalFile {
                id: part.id.to_string(),
                filename: part.filename.clone(),
                mime_type: utils::mime_type_for(&part.destination).to_string(),
                path: part.destination.clone(),
                size_bytes,
            });
        }

        let cover_path = job
            .cover_part()
            .filter(|p| p.state == PartState::Succeeded)
            .map(|p| p.destination.clone());

        let title = job
            .episode_id
            .as_deref()
            .and_then(|id| item.episode(id))
            .map(|e| e.title.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| item.title.clone());

        let record = LocalMediaRecord {
            id: LocalMediaRecord::id_for(&job.library_item_id, job.episode_id.as_deref()),
            library_item_id: job.library_item_id.clone(),
            episode_id: job.episode_id.clone(),
            server_address: job.server.address.clone(),
            media_type: item.media_type.clone(),
            title,
            base_path: job.base_path.clone(),
            files,
            cover_path,
            created_at: chrono::Utc::now(),
        };
        self.db.save_local_media_item(&record).await?;

        let progress = match &item.user_progress {
            Some(remote) => {
                let progress = LocalMediaProgress {
                    id: record.id.clone(),
                    local_media_item_id: record.id.clone(),
                    library_item_id: job.library_item_id.clone(),
                    episode_id: job.episode_id.clone(),
                    server_address: job.server.address.clone(),
                    duration: remote.duration,
                    progress: remote.progress.clamp(0.0, 1.0),
                    current_time: remote.current_time,
                    is_finished: remote.is_finished,
                    last_update: remote.last_update,
                    started_at: remote.started_at,
                    finished_at: remote.finished_at,
                };
                self.db.save_local_progress(&progress).await?;
                Some(progress)
            }
            None => None,
        };

        Ok((record, progress))
    }
}

#[async_trait::async_trait]
impl JobFinalizer for CompletionAssembler {
    async fn finalize(&self, job: DownloadJob) {
        self.finalize_job(job).await;
    }
}
