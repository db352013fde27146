//! Configuration types for shelf-dl

use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

use crate::error::{Error, Result};
use crate::types::ServerIdentity;

/// Download behavior configuration (directories, concurrency, notification cadence)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Root download directory; one sub-directory per media item (default: "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Directory for in-flight fetches before relocation (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Maximum concurrent in-flight fetches across all jobs (default: 5)
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    /// Interval between progress notification passes (default: 200ms)
    #[serde(default = "default_progress_interval", with = "millis_serde")]
    pub progress_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            progress_interval: default_progress_interval(),
        }
    }
}

/// Remote server the media items are downloaded from
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base address of the server (e.g., "https://abs.example.com")
    #[serde(default)]
    pub address: String,

    /// Pre-issued API token attached to every request
    #[serde(default)]
    pub token: String,

    /// Timeout for metadata requests (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            token: String::new(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    /// Identity captured by each job at creation time
    pub fn identity(&self) -> ServerIdentity {
        ServerIdentity {
            address: self.address.trim_end_matches('/').to_string(),
            token: self.token.clone(),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./shelf-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Main configuration for MediaDownloader
///
/// Fields are organized into sub-configs:
/// - [`download`](DownloadConfig) - directories, concurrency, notification cadence
/// - [`server`](ServerConfig) - remote server address and token
/// - [`persistence`](PersistenceConfig) - record store location
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// Remote server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Record store settings
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Config {
    /// Download directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Temporary directory
    pub fn temp_dir(&self) -> &PathBuf {
        &self.download.temp_dir
    }

    /// Check settings that would otherwise fail late, on the first request
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = url::Url::parse(&self.server.address) {
            return Err(Error::Config {
                message: format!("invalid server address '{}': {}", self.server.address, e),
                key: Some("server.address".to_string()),
            });
        }

        if self.download.max_concurrent_fetches == 0 {
            return Err(Error::Config {
                message: "max_concurrent_fetches must be at least 1".to_string(),
                key: Some("download.max_concurrent_fetches".to_string()),
            });
        }

        if self.download.progress_interval.is_zero() {
            return Err(Error::Config {
                message: "progress_interval must be greater than zero".to_string(),
                key: Some("download.progress_interval".to_string()),
            });
        }

        Ok(())
    }
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_max_concurrent_fetches() -> usize {
    5
}

fn default_progress_interval() -> Duration {
    Duration::from_millis(200)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./shelf-dl.db")
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper (seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
