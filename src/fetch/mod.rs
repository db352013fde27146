//! Network fetch layer
//!
//! A [`FetchTask`] is one HTTP GET streamed to a temp file. Tasks run on a bounded
//! [`FetchPool`]; every task reports byte progress through a [`ProgressSink`] and ends in
//! exactly one terminal callback on the [`FetchListener`].
//!
//! - [`pool`] - Bounded worker pool
//! - [`http`] - Streaming reqwest [`Transport`]

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{JobId, PartId, TaskId};

mod http;
mod pool;

pub use http::HttpTransport;
pub use pool::FetchPool;

/// One submitted fetch, carrying its correlation keys
#[derive(Clone, Debug, PartialEq)]
pub struct FetchTask {
    /// Handle the callbacks are correlated by
    pub id: TaskId,
    /// Owning job
    pub job_id: JobId,
    /// Part the fetched file belongs to
    pub part_id: PartId,
    /// Absolute source URL
    pub url: String,
    /// Bearer token attached to the request
    pub token: Option<String>,
    /// Where the transport writes the body
    pub temp_path: PathBuf,
}

/// Receives fetch callbacks
///
/// Callbacks for different tasks are arbitrarily interleaved. Each task produces any number
/// of `on_progress` calls followed by exactly one of `on_finished` / `on_failed`.
#[async_trait::async_trait]
pub trait FetchListener: Send + Sync {
    /// Bytes written so far; `expected` is the advertised total, when known
    async fn on_progress(&self, task_id: TaskId, written: u64, expected: Option<u64>);

    /// The body was fully written to `temp_path`
    async fn on_finished(&self, task_id: TaskId, temp_path: PathBuf);

    /// The transport gave up
    async fn on_failed(&self, task_id: TaskId, error: String);
}

/// Progress reporter handed to a [`Transport`] for one task
#[derive(Clone)]
pub struct ProgressSink {
    task_id: TaskId,
    listener: Arc<dyn FetchListener>,
}

impl ProgressSink {
    /// Create a sink reporting for `task_id`
    pub fn new(task_id: TaskId, listener: Arc<dyn FetchListener>) -> Self {
        Self { task_id, listener }
    }

    /// Report bytes written so far
    pub async fn report(&self, written: u64, expected: Option<u64>) {
        self.listener
            .on_progress(self.task_id, written, expected)
            .await;
    }
}

/// Abstraction over the byte transport, enabling testability.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Stream `task.url` into `task.temp_path`, returning the written path
    async fn fetch(&self, task: &FetchTask, progress: &ProgressSink) -> Result<PathBuf>;
}
