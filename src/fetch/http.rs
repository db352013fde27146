//! Streaming HTTP implementation of [`Transport`].

use std::path::PathBuf;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

use super::{FetchTask, ProgressSink, Transport};

/// Minimum gap between two progress reports for one task
const PROGRESS_REPORT_INTERVAL: Duration = Duration::from_millis(100);

/// Production [`Transport`] streaming response bodies to disk with reqwest
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with the given connect timeout
    ///
    /// Bodies are streamed without an overall timeout; large tracks may take a while.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn stream_to_file(&self, task: &FetchTask, progress: &ProgressSink) -> Result<()> {
        let mut request = self.client.get(&task.url);
        if let Some(token) = &task.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Server {
                status: status.as_u16(),
                message: status.to_string(),
            });
        }

        let expected = response.content_length();
        let mut stream = response.bytes_stream();
        let mut file = tokio::fs::File::create(&task.temp_path).await?;

        let mut written: u64 = 0;
        let mut last_report = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if last_report.elapsed() >= PROGRESS_REPORT_INTERVAL {
                progress.report(written, expected).await;
                last_report = Instant::now();
            }
        }

        file.flush().await?;
        progress.report(written, expected).await;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, task: &FetchTask, progress: &ProgressSink) -> Result<PathBuf> {
        if let Some(parent) = task.temp_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        match self.stream_to_file(task, progress).await {
            Ok(()) => Ok(task.temp_path.clone()),
            Err(e) => {
                // Partial bodies are never resumed
                let _ = tokio::fs::remove_file(&task.temp_path).await;
                Err(e)
            }
        }
    }
}
