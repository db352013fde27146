//! Core downloader implementation split into focused submodules.
//!
//! The `MediaDownloader` struct and its methods are organized by domain:
//! - [`start`] - Job creation and the start-request boundary
//! - [`tracker`] - Fetch callback correlation and part state transitions
//! - [`progress`] - Throttled progress notifications and finalization hand-off
//! - [`completion`] - Local media record assembly
//! - [`lifecycle`] - Startup recovery and shutdown coordination

mod completion;
mod lifecycle;
mod progress;
mod start;
mod tracker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use start::COVER_FILENAME;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::fetch::{FetchPool, HttpTransport, Transport};
use crate::metadata::{HttpMetadataService, MetadataService};
use crate::types::{DownloadJob, Event, JobId, LocalMediaProgress, LocalMediaRecord};

use completion::CompletionAssembler;
use progress::ProgressAggregator;
use tracker::PartTracker;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct MediaDownloader {
    /// Database instance for persistence (wrapped in Arc for sharing across tasks)
    /// Public for integration tests to query job state
    pub db: Arc<Database>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Remote metadata service (trait object for pluggable implementations)
    pub(crate) metadata: Arc<dyn MetadataService>,
    /// Bounded fetch pool
    pub(crate) pool: Arc<FetchPool>,
    /// Correlates fetch callbacks to parts
    pub(crate) tracker: Arc<PartTracker>,
    /// Snapshot map and notification loop
    pub(crate) aggregator: ProgressAggregator,
    /// Flag to indicate whether new downloads are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl MediaDownloader {
    /// Create a new MediaDownloader instance
    ///
    /// This initializes all core components:
    /// - Validates the configuration
    /// - Opens/creates the SQLite database and runs migrations
    /// - Creates the HTTP metadata client and the HTTP transport
    /// - Sets up the event broadcast channel
    /// - Restores jobs left over from a previous session
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let metadata: Arc<dyn MetadataService> =
            Arc::new(HttpMetadataService::new(config.server.request_timeout)?);
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(config.server.request_timeout)?);

        Self::with_services(config, metadata, transport).await
    }

    /// Create a MediaDownloader with custom metadata and transport implementations
    ///
    /// Same as [`new`](Self::new) but lets the caller substitute the remote collaborators,
    /// e.g. for tests or for embedding an existing HTTP stack.
    pub async fn with_services(
        config: Config,
        metadata: Arc<dyn MetadataService>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        // Ensure download and temp directories exist
        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;
        tokio::fs::create_dir_all(&config.download.temp_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create temp directory '{}': {}",
                        config.download.temp_dir.display(),
                        e
                    ),
                ))
            })?;

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);

        // Create broadcast channel with buffer size of 1000 events
        // This allows multiple subscribers to receive all events independently
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let assembler = Arc::new(CompletionAssembler::new(
            Arc::clone(&db),
            Arc::clone(&metadata),
            event_tx.clone(),
        ));
        let aggregator = ProgressAggregator::new(
            event_tx.clone(),
            assembler,
            config.download.progress_interval,
        );
        let tracker = Arc::new(PartTracker::new(Arc::clone(&db), aggregator.clone()));
        let pool = Arc::new(FetchPool::new(
            transport,
            tracker.clone(),
            config.download.max_concurrent_fetches,
        ));

        let downloader = Self {
            db,
            event_tx,
            config: Arc::new(config),
            metadata,
            pool,
            tracker,
            aggregator,
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        // Restore any unfinished jobs from database (from previous session)
        let restored = downloader.restore_jobs().await?;
        if restored > 0 {
            tracing::info!(restored, "Restored download jobs from previous session");
        }

        Ok(downloader)
    }

    /// Subscribe to download events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// Events are buffered, but if a subscriber falls behind by more than 1000 events,
    /// it will receive a `RecvError::Lagged` error.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use shelf_dl::{MediaDownloader, Config};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let mut config = Config::default();
    ///     config.server.address = "https://abs.example.com".to_string();
    ///     let downloader = MediaDownloader::new(config).await?;
    ///
    ///     let mut events = downloader.subscribe();
    ///     tokio::spawn(async move {
    ///         while let Ok(event) = events.recv().await {
    ///             println!("Event: {:?}", event);
    ///         }
    ///     });
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the current configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Get a persisted (unfinished) job by ID
    pub async fn get_job(&self, id: JobId) -> Result<Option<DownloadJob>> {
        self.db.get_job(id).await
    }

    /// List all persisted (unfinished) jobs
    pub async fn list_jobs(&self) -> Result<Vec<DownloadJob>> {
        self.db.list_jobs().await
    }

    /// Get a local media record by its local id
    pub async fn get_local_media_item(&self, id: &str) -> Result<Option<LocalMediaRecord>> {
        self.db.get_local_media_item(id).await
    }

    /// List all local media records
    pub async fn list_local_media_items(&self) -> Result<Vec<LocalMediaRecord>> {
        self.db.list_local_media_items().await
    }

    /// Get local listening progress by its local id
    pub async fn get_local_progress(&self, id: &str) -> Result<Option<LocalMediaProgress>> {
        self.db.get_local_progress(id).await
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped (ok() converts Err to None).
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
