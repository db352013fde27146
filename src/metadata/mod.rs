//! Remote metadata service
//!
//! The server is the authority on what a media item contains. [`MetadataService`] is the
//! seam the downloader talks through; [`HttpMetadataService`] is the production implementation.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{MediaKind, ServerIdentity};

mod http;

pub use http::HttpMetadataService;

/// File-level metadata of a track
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Stable filename on the server
    pub filename: String,
    /// Extension including the dot
    #[serde(default)]
    pub ext: Option<String>,
    /// Size in bytes
    #[serde(default)]
    pub size: Option<u64>,
}

/// One audio track of a book or episode
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTrack {
    /// Position in playback order
    pub index: u32,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Server-relative path of the file (e.g. "/api/items/li_1/file/123")
    pub content_url: String,
    /// Mime type reported by the server
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: f64,
    /// File metadata; a track without it cannot be downloaded
    #[serde(default)]
    pub metadata: Option<FileMetadata>,
}

impl AudioTrack {
    /// Usable filename, if the track carries one
    pub fn filename(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .map(|m| m.filename.as_str())
            .filter(|name| crate::utils::is_plain_filename(name))
    }

    #[cfg(test)]
    pub(crate) fn for_test(index: u32, filename: &str) -> Self {
        Self {
            index,
            title: format!("Track {}", index + 1),
            content_url: format!("/api/items/li_test/file/{index}"),
            mime_type: None,
            duration: 60.0,
            metadata: Some(FileMetadata {
                filename: filename.to_string(),
                ext: None,
                size: None,
            }),
        }
    }
}

/// One podcast episode
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodcastEpisode {
    /// Remote episode id
    pub id: String,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// The episode's single audio track
    #[serde(default)]
    pub audio_track: Option<AudioTrack>,
}

/// Listening progress of the token's user on the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaProgress {
    /// Remote progress id
    pub id: String,
    /// Remote media item id
    pub library_item_id: String,
    /// Remote episode id
    #[serde(default)]
    pub episode_id: Option<String>,
    /// Total duration in seconds
    #[serde(default)]
    pub duration: f64,
    /// Fraction listened
    #[serde(default)]
    pub progress: f64,
    /// Playback position in seconds
    #[serde(default)]
    pub current_time: f64,
    /// Whether the item was finished
    #[serde(default)]
    pub is_finished: bool,
    /// Last update (unix millis)
    #[serde(default)]
    pub last_update: i64,
    /// When listening started (unix millis)
    #[serde(default)]
    pub started_at: i64,
    /// When the item was finished (unix millis)
    #[serde(default)]
    pub finished_at: Option<i64>,
}

/// A media item as reported by the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    /// Remote media item id
    pub id: String,
    /// Book, podcast, or something else
    pub media_type: MediaKind,
    /// Display title
    #[serde(default)]
    pub title: String,
    /// Ordered audio tracks (books)
    #[serde(default)]
    pub tracks: Vec<AudioTrack>,
    /// Episodes (podcasts)
    #[serde(default)]
    pub episodes: Vec<PodcastEpisode>,
    /// Server-side cover path; empty or absent means no cover
    #[serde(default)]
    pub cover_path: Option<String>,
    /// User progress, when requested and present
    #[serde(default)]
    pub user_progress: Option<MediaProgress>,
}

impl MediaItem {
    /// Whether the item declares a cover
    pub fn has_cover(&self) -> bool {
        self.cover_path.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Find an episode by id
    pub fn episode(&self, episode_id: &str) -> Option<&PodcastEpisode> {
        self.episodes.iter().find(|e| e.id == episode_id)
    }
}

/// Abstraction over the remote metadata service, enabling testability.
#[async_trait::async_trait]
pub trait MetadataService: Send + Sync {
    /// Fetch an item together with the user's progress
    ///
    /// Returns `Ok(None)` when the server does not know the item.
    async fn get_item(
        &self,
        server: &ServerIdentity,
        item_id: &str,
        episode_id: Option<&str>,
    ) -> Result<Option<MediaItem>>;
}
