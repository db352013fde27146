//! Startup recovery and shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;
use crate::types::{Event, PartState};

use super::MediaDownloader;

/// How long shutdown waits for the progress loop and finalizations to drain
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

impl MediaDownloader {
    /// Resume jobs persisted by a previous session
    ///
    /// Fetches that were in flight did not survive the restart: their parts are reset to
    /// pending and fetched again from scratch. Jobs whose parts are all terminal are handed
    /// straight to the aggregator so they are finalized exactly once.
    ///
    /// Returns the number of jobs restored.
    pub(crate) async fn restore_jobs(&self) -> Result<usize> {
        let jobs = self.db.list_jobs().await?;
        if jobs.is_empty() {
            return Ok(0);
        }

        let mut restored = 0;
        for mut job in jobs {
            if job.is_done() {
                tracing::info!(job_id = %job.id, "restoring finished job for finalization");
                self.aggregator.track(job).await;
                restored += 1;
                continue;
            }

            let reset = self.db.reset_unfinished_parts(job.id).await?;
            for part in job.parts.iter_mut().filter(|p| !p.state.is_done()) {
                part.state = PartState::Pending;
            }

            tracing::info!(
                job_id = %job.id,
                library_item_id = %job.library_item_id,
                resubmitted = reset,
                "restoring unfinished download job"
            );

            for part in job.parts.iter().filter(|p| !p.state.is_done()) {
                self.submit_part(&job, part).await;
            }
            restored += 1;
        }

        Ok(restored)
    }

    /// Gracefully shut down the downloader
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new downloads
    /// 2. Waits (bounded) for the progress loop and pending finalizations to drain
    /// 3. Emits [`Event::Shutdown`]
    /// 4. Closes database connections
    ///
    /// Fetches still in flight are abandoned; their jobs are restored on the next start.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_with_timeout(SHUTDOWN_DRAIN_TIMEOUT).await
    }

    pub(crate) async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // 1. Stop accepting new downloads
        self.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new downloads");

        // 2. Let the notifier drain
        let active_tasks = self.tracker.active_tasks().await;
        if active_tasks > 0 {
            tracing::warn!(active_tasks, "Fetches still in flight, they resume on next start");
        }
        if self.aggregator.wait_idle(timeout).await {
            tracing::info!("Progress notifier drained");
        } else {
            tracing::warn!("Timeout waiting for progress notifier, proceeding with shutdown");
        }

        // 3. Emit shutdown event
        self.emit_event(Event::Shutdown);

        // 4. Close database connections
        self.pool.close();
        self.db.close().await;

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
