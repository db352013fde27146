//! Shared test helpers for creating MediaDownloader instances in tests.

use crate::config::Config;
use crate::downloader::MediaDownloader;
use crate::error::{Error, Result};
use crate::fetch::{FetchTask, ProgressSink, Transport};
use crate::metadata::{AudioTrack, MediaItem, MediaProgress, MetadataService, PodcastEpisode};
use crate::types::{Event, MediaKind, ServerIdentity};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::tempdir;
use tokio::sync::{Mutex, broadcast};

pub(crate) const TEST_SERVER: &str = "http://abs.test";
pub(crate) const TEST_TOKEN: &str = "tok-test";

/// In-memory metadata service
#[derive(Default)]
pub(crate) struct MockMetadata {
    items: Mutex<HashMap<String, MediaItem>>,
    pub(crate) calls: AtomicUsize,
}

impl MockMetadata {
    pub(crate) async fn insert(&self, item: MediaItem) {
        self.items.lock().await.insert(item.id.clone(), item);
    }

    pub(crate) async fn remove(&self, item_id: &str) {
        self.items.lock().await.remove(item_id);
    }
}

#[async_trait::async_trait]
impl MetadataService for MockMetadata {
    async fn get_item(
        &self,
        _server: &ServerIdentity,
        item_id: &str,
        _episode_id: Option<&str>,
    ) -> Result<Option<MediaItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.items.lock().await.get(item_id).cloned())
    }
}

/// Transport that writes a fixed body, failing for URLs containing any configured marker
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    failing: Mutex<HashSet<String>>,
}

impl ScriptedTransport {
    pub(crate) async fn fail_urls_containing(&self, marker: &str) {
        self.failing.lock().await.insert(marker.to_string());
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, task: &FetchTask, progress: &ProgressSink) -> Result<PathBuf> {
        let fails = self
            .failing
            .lock()
            .await
            .iter()
            .any(|marker| task.url.contains(marker.as_str()));
        if fails {
            return Err(Error::Other("connection reset by peer".to_string()));
        }

        let body = format!("body of {}", task.url).into_bytes();
        let total = body.len() as u64;
        if let Some(parent) = task.temp_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        progress.report(total / 2, Some(total)).await;
        tokio::fs::write(&task.temp_path, &body).await?;
        progress.report(total, Some(total)).await;
        Ok(task.temp_path.clone())
    }
}

/// Transport that records tasks and never completes them
///
/// Tests drive the tracker by hand with the recorded task handles.
#[derive(Default)]
pub(crate) struct ParkedTransport {
    tasks: Mutex<Vec<FetchTask>>,
}

impl ParkedTransport {
    /// Tasks handed to the transport so far
    pub(crate) async fn tasks_received(&self) -> Vec<FetchTask> {
        self.tasks.lock().await.clone()
    }

    /// Wait until `count` tasks were handed to the transport
    pub(crate) async fn wait_for_tasks(&self, count: usize) -> Vec<FetchTask> {
        for _ in 0..200 {
            {
                let tasks = self.tasks.lock().await;
                if tasks.len() >= count {
                    return tasks.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("transport never received {count} tasks");
    }
}

#[async_trait::async_trait]
impl Transport for ParkedTransport {
    async fn fetch(&self, task: &FetchTask, _progress: &ProgressSink) -> Result<PathBuf> {
        self.tasks.lock().await.push(task.clone());
        std::future::pending::<()>().await;
        Ok(task.temp_path.clone())
    }
}

/// Test configuration rooted in `root`
pub(crate) fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = root.join("test.db");
    config.download.download_dir = root.join("downloads");
    config.download.temp_dir = root.join("temp");
    config.download.progress_interval = Duration::from_millis(20);
    config.server.address = TEST_SERVER.to_string();
    config.server.token = TEST_TOKEN.to_string();
    config
}

/// Helper to create a test MediaDownloader with the given transport.
/// Returns the downloader, its metadata mock and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader_with(
    transport: Arc<dyn Transport>,
) -> (MediaDownloader, Arc<MockMetadata>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let metadata = Arc::new(MockMetadata::default());

    let downloader = MediaDownloader::with_services(
        test_config(temp_dir.path()),
        metadata.clone(),
        transport,
    )
    .await
    .unwrap();

    (downloader, metadata, temp_dir)
}

/// Helper to create a test MediaDownloader whose fetches never complete on their own.
pub(crate) async fn create_parked_downloader() -> (
    MediaDownloader,
    Arc<MockMetadata>,
    Arc<ParkedTransport>,
    tempfile::TempDir,
) {
    let transport = Arc::new(ParkedTransport::default());
    let (downloader, metadata, temp_dir) = create_test_downloader_with(transport.clone()).await;
    (downloader, metadata, transport, temp_dir)
}

pub(crate) fn track(item_id: &str, index: u32, filename: &str) -> AudioTrack {
    let mut track = AudioTrack::for_test(index, filename);
    track.content_url = format!("/api/items/{item_id}/file/{index}");
    track
}

/// Book with `tracks` tracks named `chapterN.mp3`
pub(crate) fn book_item(item_id: &str, tracks: u32, cover: bool) -> MediaItem {
    MediaItem {
        id: item_id.to_string(),
        media_type: MediaKind::Book,
        title: format!("Book {item_id}"),
        tracks: (0..tracks)
            .map(|i| track(item_id, i, &format!("chapter{}.mp3", i + 1)))
            .collect(),
        episodes: vec![],
        cover_path: cover.then(|| format!("/metadata/items/{item_id}/cover.jpg")),
        user_progress: None,
    }
}

/// Podcast with one episode per id
pub(crate) fn podcast_item(item_id: &str, episode_ids: &[&str]) -> MediaItem {
    MediaItem {
        id: item_id.to_string(),
        media_type: MediaKind::Podcast,
        title: format!("Podcast {item_id}"),
        tracks: vec![],
        episodes: episode_ids
            .iter()
            .enumerate()
            .map(|(i, id)| PodcastEpisode {
                id: id.to_string(),
                title: format!("Episode {id}"),
                audio_track: Some(track(item_id, i as u32, &format!("{id}.mp3"))),
            })
            .collect(),
        cover_path: None,
        user_progress: None,
    }
}

pub(crate) fn user_progress(item_id: &str, current_time: f64) -> MediaProgress {
    MediaProgress {
        id: format!("progress-{item_id}"),
        library_item_id: item_id.to_string(),
        episode_id: None,
        duration: 600.0,
        progress: current_time / 600.0,
        current_time,
        is_finished: false,
        last_update: 1_700_000_000_000,
        started_at: 1_690_000_000_000,
        finished_at: None,
    }
}

/// Receive events until one matches, or panic after `timeout`
pub(crate) async fn wait_for_event<F>(
    rx: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut matches: F,
) -> Event
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Wait until the persisted job disappears from the store
pub(crate) async fn wait_for_job_removal(downloader: &MediaDownloader, job_id: crate::types::JobId) {
    for _ in 0..200 {
        if downloader.get_job(job_id).await.unwrap().is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} was never removed from the store");
}
