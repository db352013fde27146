//! Error types for shelf-dl
//!
//! This module provides the error handling for the library:
//! - [`DownloadError`] carries the download taxonomy (validation, correlation and relocation failures)
//! - [`DatabaseError`] covers the record store
//! - [`Error`] is the top-level error returned by every fallible operation
//!
//! Every variant maps to a stable machine-readable code via [`Error::error_code`], which the
//! start-request boundary reports back to callers.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::{JobId, PartId, TaskId};

/// Result type alias for shelf-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for shelf-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "server.address")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Download-related error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The remote server answered with a non-success status
    #[error("server returned status {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shutdown in progress - not accepting new downloads
    #[error("shutdown in progress: not accepting new downloads")]
    ShuttingDown,

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Download orchestration errors
///
/// The first group is raised while starting a job and is returned to the caller.
/// The correlation group is raised while processing fetch callbacks; those are logged
/// and contained, never surfaced to whoever started the download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The selected track set is empty
    #[error("no audio tracks to download")]
    NoTracks,

    /// A track has no usable filename
    #[error("audio track {index} has no usable filename")]
    NoMetadata {
        /// Index of the offending track
        index: u32,
    },

    /// An episode was requested for an item that is not a podcast
    #[error("item {item_id} is not a podcast")]
    NotPodcast {
        /// The remote item id
        item_id: String,
    },

    /// The requested episode does not exist on the item
    #[error("episode {episode_id} not found")]
    EpisodeNotFound {
        /// The requested episode id
        episode_id: String,
    },

    /// The item declares a media type this library cannot download
    #[error("unknown media type {media_type}")]
    UnknownMediaType {
        /// The media type reported by the server
        media_type: String,
    },

    /// The local storage directory could not be created
    #[error("failed to create directory {path}: {reason}")]
    FailedDirectory {
        /// Directory that could not be created
        path: PathBuf,
        /// Underlying reason
        reason: String,
    },

    /// A fetch ended in a transport-level failure
    #[error("download failed: {reason}")]
    FailedDownload {
        /// Reason reported by the transport
        reason: String,
    },

    /// A callback arrived for a task handle that is not registered
    #[error("no part registered for task {task_id}")]
    NoTaskHandle {
        /// The unknown task handle
        task_id: TaskId,
    },

    /// No persisted job owns the correlated part
    #[error("no download job found for part {part_id}")]
    ItemNotFound {
        /// Part used for the lookup
        part_id: PartId,
    },

    /// The job was found but does not contain the part
    #[error("part {part_id} not found in job {job_id}")]
    PartNotFound {
        /// Job that was searched
        job_id: JobId,
        /// The missing part
        part_id: PartId,
    },

    /// A finished part has no usable destination path
    #[error("part {part_id} has no destination")]
    DestinationUndefined {
        /// The part without a destination
        part_id: PartId,
    },

    /// The remote metadata service does not know the item
    #[error("remote item {item_id} not found")]
    RemoteItemNotFound {
        /// The remote item id
        item_id: String,
    },

    /// A job for the same item and episode is already persisted
    #[error("download already started for {item_id}")]
    AlreadyDownloading {
        /// The remote item id
        item_id: String,
        /// The episode id, for podcast downloads
        episode_id: Option<String>,
    },
}

impl Error {
    /// Machine-readable error code
    ///
    /// Codes are stable and safe to match on from the UI layer.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Database(_) => "database_error",
            Error::Download(e) => e.error_code(),
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Server { .. } => "server_error",
            Error::Serialization(_) => "serialization_error",
            Error::ShuttingDown => "shutting_down",
            Error::Other(_) => "internal_error",
        }
    }
}

impl DownloadError {
    /// Machine-readable error code for this kind
    pub fn error_code(&self) -> &'static str {
        match self {
            DownloadError::NoTracks => "no_tracks",
            DownloadError::NoMetadata { .. } => "no_metadata",
            DownloadError::NotPodcast { .. } => "not_podcast",
            DownloadError::EpisodeNotFound { .. } => "episode_not_found",
            DownloadError::UnknownMediaType { .. } => "unknown_media_type",
            DownloadError::FailedDirectory { .. } => "failed_directory",
            DownloadError::FailedDownload { .. } => "failed_download",
            DownloadError::NoTaskHandle { .. } => "no_task_handle",
            DownloadError::ItemNotFound { .. } => "item_not_found",
            DownloadError::PartNotFound { .. } => "part_not_found",
            DownloadError::DestinationUndefined { .. } => "destination_undefined",
            DownloadError::RemoteItemNotFound { .. } => "remote_item_not_found",
            DownloadError::AlreadyDownloading { .. } => "already_downloading",
        }
    }
}
