//! Database layer for shelf-dl
//!
//! Handles SQLite persistence for in-flight download jobs and for finished local records.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] - Database lifecycle, schema migrations
//! - [`jobs`] - Download job and part state
//! - [`local_media`] - Local media records and local progress

use sqlx::{FromRow, sqlite::SqlitePool};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::types::{
    DownloadJob, DownloadPart, JobId, MediaKind, PartId, PartKind, PartState, RemoteSource,
    ServerIdentity,
};

mod jobs;
mod local_media;
mod migrations;

/// Part kind codes stored in `download_parts.kind`
pub mod part_kind {
    /// Audio track
    pub const AUDIO: i32 = 0;
    /// Cover image
    pub const COVER: i32 = 1;
}

/// Download job record from database
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    /// Job identifier
    pub id: JobId,
    /// Remote media item id
    pub library_item_id: String,
    /// Remote episode id
    pub episode_id: Option<String>,
    /// Media kind wire name
    pub media_type: String,
    /// Display title
    pub title: String,
    /// Server base address
    pub server_address: String,
    /// Server token
    pub server_token: String,
    /// Local base directory
    pub base_path: String,
    /// Unix timestamp when the job was created
    pub created_at: i64,
}

/// Download part record from database
#[derive(Debug, Clone, FromRow)]
pub struct PartRow {
    /// Part identifier
    pub id: PartId,
    /// Owning job
    pub job_id: JobId,
    /// Position within the job
    pub position: i64,
    /// Local filename
    pub filename: String,
    /// Final local path
    pub destination: String,
    /// Kind code (see [`part_kind`])
    pub kind: i32,
    /// Track metadata as JSON (audio parts only)
    pub track_json: Option<String>,
    /// Source URL
    pub source_url: String,
    /// Source token
    pub source_token: Option<String>,
    /// State code (see [`PartState::to_i32`])
    pub state: i32,
    /// Progress fraction
    pub progress: f64,
    /// Failure reason
    pub error_message: Option<String>,
}

impl PartRow {
    fn into_part(self) -> Result<DownloadPart> {
        let kind = match (self.kind, self.track_json) {
            (part_kind::COVER, _) => PartKind::Cover,
            (_, Some(json)) => PartKind::Audio {
                track: serde_json::from_str(&json)?,
            },
            (_, None) => {
                return Err(Error::Other(format!(
                    "audio part {} has no track metadata",
                    self.id
                )));
            }
        };

        Ok(DownloadPart {
            id: self.id,
            filename: self.filename,
            destination: PathBuf::from(self.destination),
            kind,
            source: RemoteSource {
                url: self.source_url,
                token: self.source_token,
            },
            state: PartState::from_i32(self.state, self.progress, self.error_message),
        })
    }
}

impl JobRow {
    fn into_job(self, parts: Vec<PartRow>) -> Result<DownloadJob> {
        let parts = parts
            .into_iter()
            .map(PartRow::into_part)
            .collect::<Result<Vec<_>>>()?;

        Ok(DownloadJob {
            id: self.id,
            library_item_id: self.library_item_id,
            episode_id: self.episode_id,
            media_type: MediaKind::from(self.media_type),
            title: self.title,
            server: ServerIdentity {
                address: self.server_address,
                token: self.server_token,
            },
            base_path: PathBuf::from(self.base_path),
            parts,
            created_at: chrono::DateTime::from_timestamp(self.created_at, 0)
                .unwrap_or_else(chrono::Utc::now),
        })
    }
}

/// Database handle for shelf-dl
pub struct Database {
    pool: SqlitePool,
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;
