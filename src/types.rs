//! Core types for shelf-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::Error;
use crate::metadata::AudioTrack;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }

        // Stored as the uuid's BLOB representation
        impl sqlx::Type<sqlx::Sqlite> for $name {
            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <Uuid as sqlx::Type<sqlx::Sqlite>>::type_info()
            }

            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <Uuid as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for $name {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let id = <Uuid as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(Self(id))
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a download job
    JobId
}

uuid_id! {
    /// Unique identifier for a download part; doubles as the fetch correlation key
    PartId
}

/// Handle of an in-flight fetch task
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Server a job was created against (address + token), captured at creation time
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerIdentity {
    /// Base address without trailing slash
    pub address: String,
    /// Pre-issued API token (never included in notifications)
    #[serde(skip_serializing, default)]
    pub token: String,
}

/// Kind of media item
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MediaKind {
    /// Audiobook with an ordered list of tracks
    Book,
    /// Podcast; downloads target a single episode
    Podcast,
    /// Anything else the server may report
    Other(String),
}

impl MediaKind {
    /// Wire name of this kind
    pub fn as_str(&self) -> &str {
        match self {
            MediaKind::Book => "book",
            MediaKind::Podcast => "podcast",
            MediaKind::Other(kind) => kind,
        }
    }
}

impl From<String> for MediaKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "book" => MediaKind::Book,
            "podcast" => MediaKind::Podcast,
            _ => MediaKind::Other(kind),
        }
    }
}

impl From<MediaKind> for String {
    fn from(kind: MediaKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a single part
///
/// `Succeeded` is entered only after the fetched file has been relocated to its
/// destination, so a succeeded part is always completed, moved and not failed.
/// Terminal states are never left.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PartState {
    /// Submitted, no progress reported yet
    Pending,
    /// Fetch in flight
    InProgress {
        /// Fraction in [0, 1]
        progress: f64,
    },
    /// Fetched and relocated to its destination
    Succeeded,
    /// Transport failure or relocation failure
    Failed {
        /// Human-readable reason
        reason: String,
    },
}

impl PartState {
    /// Convert integer state code to PartState
    ///
    /// `progress` and `reason` come from the sibling columns of the stored row.
    pub fn from_i32(state: i32, progress: f64, reason: Option<String>) -> Self {
        match state {
            0 => PartState::Pending,
            1 => PartState::InProgress { progress },
            2 => PartState::Succeeded,
            _ => PartState::Failed {
                reason: reason.unwrap_or_else(|| "unknown state".to_string()),
            },
        }
    }

    /// Convert PartState to integer state code
    pub fn to_i32(&self) -> i32 {
        match self {
            PartState::Pending => 0,
            PartState::InProgress { .. } => 1,
            PartState::Succeeded => 2,
            PartState::Failed { .. } => 3,
        }
    }

    /// Progress fraction; terminal states report 1.0
    pub fn progress(&self) -> f64 {
        match self {
            PartState::Pending => 0.0,
            PartState::InProgress { progress } => *progress,
            PartState::Succeeded | PartState::Failed { .. } => 1.0,
        }
    }

    /// Whether the part reached a terminal state, successful or not
    pub fn is_done(&self) -> bool {
        matches!(self, PartState::Succeeded | PartState::Failed { .. })
    }

    /// Terminal and unsuccessful
    pub fn is_failed(&self) -> bool {
        matches!(self, PartState::Failed { .. })
    }

    /// File relocated to its destination
    pub fn is_moved(&self) -> bool {
        matches!(self, PartState::Succeeded)
    }

    /// Failure reason, if failed
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            PartState::Failed { reason } => Some(reason),
            _ => None,
        }
    }
}

/// What a part fetches
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PartKind {
    /// One audio track of a book or episode
    Audio {
        /// Track metadata as reported by the server
        track: AudioTrack,
    },
    /// The item's cover image; failures are tolerated
    Cover,
}

impl PartKind {
    /// Whether this is the cover part
    pub fn is_cover(&self) -> bool {
        matches!(self, PartKind::Cover)
    }
}

/// Where a part is fetched from
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteSource {
    /// Absolute URL
    pub url: String,
    /// Bearer token attached to the request (never included in notifications)
    #[serde(skip_serializing, default)]
    pub token: Option<String>,
}

/// One fetchable unit of a job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadPart {
    /// Part identifier
    pub id: PartId,
    /// Local filename
    pub filename: String,
    /// Final local path
    pub destination: PathBuf,
    /// Audio track or cover
    #[serde(flatten)]
    pub kind: PartKind,
    /// Remote source
    pub source: RemoteSource,
    /// Current state
    #[serde(flatten)]
    pub state: PartState,
}

/// One orchestrated download for a media item (and, for podcasts, one episode)
///
/// The part list is fixed once the job is persisted; parts are only mutated in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadJob {
    /// Job identifier
    pub id: JobId,
    /// Remote media item id
    pub library_item_id: String,
    /// Remote episode id (podcasts only)
    pub episode_id: Option<String>,
    /// Kind of media item
    pub media_type: MediaKind,
    /// Display title of the item or episode
    pub title: String,
    /// Server the job was created against
    pub server: ServerIdentity,
    /// Local directory holding the item's files
    pub base_path: PathBuf,
    /// Ordered parts (tracks in playback order, cover last)
    pub parts: Vec<DownloadPart>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl DownloadJob {
    /// Every part reached a terminal state
    pub fn is_done(&self) -> bool {
        self.parts.iter().all(|p| p.state.is_done())
    }

    /// Every non-cover part succeeded (cover failures are tolerated)
    pub fn is_successful(&self) -> bool {
        self.parts
            .iter()
            .filter(|p| !p.kind.is_cover())
            .all(|p| p.state == PartState::Succeeded)
    }

    /// Mean progress over all parts, in [0, 1]
    pub fn progress(&self) -> f64 {
        if self.parts.is_empty() {
            return 0.0;
        }
        self.parts.iter().map(|p| p.state.progress()).sum::<f64>() / self.parts.len() as f64
    }

    /// Look up a part by id
    pub fn part(&self, id: PartId) -> Option<&DownloadPart> {
        self.parts.iter().find(|p| p.id == id)
    }

    /// Look up a part by id for in-place mutation
    pub fn part_mut(&mut self, id: PartId) -> Option<&mut DownloadPart> {
        self.parts.iter_mut().find(|p| p.id == id)
    }

    /// The cover part, if the item has one
    pub fn cover_part(&self) -> Option<&DownloadPart> {
        self.parts.iter().find(|p| p.kind.is_cover())
    }
}

/// A playable file of a local media record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalFile {
    /// Identifier (the id of the part that produced it)
    pub id: String,
    /// Filename within the record's base directory
    pub filename: String,
    /// Mime type inferred from the extension
    pub mime_type: String,
    /// Absolute path on disk
    pub path: PathBuf,
    /// Size in bytes at assembly time
    pub size_bytes: u64,
}

/// Durable, locally playable result of a successful job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalMediaRecord {
    /// Local id, derived from the remote item and episode ids
    pub id: String,
    /// Remote media item id
    pub library_item_id: String,
    /// Remote episode id (podcasts only)
    pub episode_id: Option<String>,
    /// Address of the server the media came from
    pub server_address: String,
    /// Kind of media item
    pub media_type: MediaKind,
    /// Display title
    pub title: String,
    /// Local base directory
    pub base_path: PathBuf,
    /// Playable audio files in playback order
    pub files: Vec<LocalFile>,
    /// Local cover image, kept apart from the playable files
    pub cover_path: Option<PathBuf>,
    /// When the record was assembled
    pub created_at: DateTime<Utc>,
}

impl LocalMediaRecord {
    /// Local id for a remote item (and episode)
    pub fn id_for(library_item_id: &str, episode_id: Option<&str>) -> String {
        match episode_id {
            Some(episode_id) => format!("local_{library_item_id}-{episode_id}"),
            None => format!("local_{library_item_id}"),
        }
    }
}

/// Local listening progress derived from the server's user progress
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalMediaProgress {
    /// Local id; equals the owning record's id
    pub id: String,
    /// Owning local media record
    pub local_media_item_id: String,
    /// Remote media item id
    pub library_item_id: String,
    /// Remote episode id (podcasts only)
    pub episode_id: Option<String>,
    /// Address of the server the progress came from
    pub server_address: String,
    /// Total duration in seconds
    pub duration: f64,
    /// Fraction listened, in [0, 1]
    pub progress: f64,
    /// Playback position in seconds
    pub current_time: f64,
    /// Whether the item was finished
    pub is_finished: bool,
    /// Last update on the server (unix millis)
    pub last_update: i64,
    /// When listening started (unix millis)
    pub started_at: i64,
    /// When the item was finished (unix millis)
    pub finished_at: Option<i64>,
}

/// Event emitted during the download lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job persisted and its fetches submitted
    JobQueued {
        /// Job ID
        job_id: JobId,
        /// Remote media item id
        library_item_id: String,
        /// Remote episode id
        #[serde(skip_serializing_if = "Option::is_none")]
        episode_id: Option<String>,
        /// Number of parts
        parts: usize,
    },

    /// Throttled snapshot of a job and all of its parts
    JobProgress {
        /// Full job snapshot
        job: DownloadJob,
    },

    /// Emitted once per successfully finished job
    JobComplete {
        /// Job ID
        job_id: JobId,
        /// Remote media item id
        library_item_id: String,
        /// Assembled record (absent when the metadata re-fetch failed)
        #[serde(skip_serializing_if = "Option::is_none")]
        local_media_item: Option<LocalMediaRecord>,
        /// Derived local progress, when the server had user progress
        #[serde(skip_serializing_if = "Option::is_none")]
        local_progress: Option<LocalMediaProgress>,
        /// Error indicator when assembly could not complete
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Graceful shutdown initiated
    Shutdown,
}

/// Start request from the UI layer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartRequest {
    /// Remote media item id
    pub media_item_id: String,
    /// Remote episode id (podcasts only)
    #[serde(default)]
    pub episode_id: Option<String>,
}

/// Start response; serializes as `{}` on success
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    /// Error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-readable error code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl StartResponse {
    /// Successful start
    pub fn ok() -> Self {
        Self::default()
    }

    /// Whether the start succeeded
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl From<&Error> for StartResponse {
    fn from(error: &Error) -> Self {
        Self {
            error: Some(error.to_string()),
            code: Some(error.error_code().to_string()),
        }
    }
}
