//! Download job manager.
//!
//! A start request is validated against the server's metadata, persisted as a job, and only
//! then are its fetches submitted.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::Ordering;

use crate::error::{DownloadError, Error, Result};
use crate::fetch::FetchTask;
use crate::metadata::{AudioTrack, MediaItem};
use crate::types::{
    DownloadJob, DownloadPart, Event, JobId, MediaKind, PartId, PartKind, PartState,
    RemoteSource, ServerIdentity, StartRequest, StartResponse,
};
use crate::utils;

use super::MediaDownloader;

/// Filename of the cover part within an item's directory
pub const COVER_FILENAME: &str = "cover.jpg";

impl MediaDownloader {
    /// Start downloading a media item, or one episode of a podcast
    ///
    /// Fetches the item from the server, validates the request, creates the item's
    /// directory, persists the job and only then submits one fetch per part. Returns the
    /// persisted job; progress and completion arrive as [`Event`]s.
    ///
    /// # Errors
    ///
    /// - [`Error::ShuttingDown`] after [`shutdown`](Self::shutdown) was called
    /// - [`DownloadError::AlreadyDownloading`] if a job for the same item and episode exists
    /// - [`DownloadError::RemoteItemNotFound`] if the server does not know the item
    /// - [`DownloadError::NotPodcast`], [`DownloadError::EpisodeNotFound`],
    ///   [`DownloadError::UnknownMediaType`], [`DownloadError::NoTracks`] or
    ///   [`DownloadError::NoMetadata`] if the item cannot be downloaded as requested
    /// - [`DownloadError::FailedDirectory`] if the local directory cannot be created
    pub async fn start_download(
        &self,
        item_id: &str,
        episode_id: Option<&str>,
    ) -> Result<DownloadJob> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        if let Some(existing) = self.db.find_job_for_item(item_id, episode_id).await? {
            tracing::debug!(
                job_id = %existing,
                item_id,
                ?episode_id,
                "download already in progress"
            );
            return Err(DownloadError::AlreadyDownloading {
                item_id: item_id.to_string(),
                episode_id: episode_id.map(str::to_string),
            }
            .into());
        }

        let server = self.config.server.identity();
        let item = self
            .metadata
            .get_item(&server, item_id, episode_id)
            .await?
            .ok_or_else(|| DownloadError::RemoteItemNotFound {
                item_id: item_id.to_string(),
            })?;

        let (tracks, title) = select_tracks(&item, episode_id)?;
        let filenames = unique_filenames(&tracks, item.has_cover())?;

        let base_path = self
            .config
            .download_dir()
            .join(utils::sanitize_component(item_id));
        tokio::fs::create_dir_all(&base_path)
            .await
            .map_err(|e| DownloadError::FailedDirectory {
                path: base_path.clone(),
                reason: e.to_string(),
            })?;

        let mut parts: Vec<DownloadPart> = tracks
            .into_iter()
            .zip(filenames)
            .map(|(track, filename)| audio_part(&server, &base_path, track, filename))
            .collect();
        if item.has_cover() {
            parts.push(cover_part(&server, &base_path, item_id));
        }

        let job = DownloadJob {
            id: JobId::new(),
            library_item_id: item_id.to_string(),
            episode_id: episode_id.map(str::to_string),
            media_type: item.media_type.clone(),
            title,
            server,
            base_path,
            parts,
            created_at: chrono::Utc::now(),
        };

        // Persisted before any fetch so a restart can recover the job
        self.db.insert_job(&job).await?;

        tracing::info!(
            job_id = %job.id,
            item_id,
            ?episode_id,
            parts = job.parts.len(),
            "download job created"
        );
        self.emit_event(Event::JobQueued {
            job_id: job.id,
            library_item_id: job.library_item_id.clone(),
            episode_id: job.episode_id.clone(),
            parts: job.parts.len(),
        });

        for part in &job.parts {
            self.submit_part(&job, part).await;
        }

        Ok(job)
    }

    /// Start-request boundary for the UI layer
    ///
    /// Never fails: errors are reported in the response payload.
    pub async fn handle_start_request(&self, request: StartRequest) -> StartResponse {
        match self
            .start_download(&request.media_item_id, request.episode_id.as_deref())
            .await
        {
            Ok(_) => StartResponse::ok(),
            Err(e) => {
                tracing::warn!(
                    media_item_id = %request.media_item_id,
                    episode_id = ?request.episode_id,
                    error = %e,
                    "start request rejected"
                );
                StartResponse::from(&e)
            }
        }
    }

    /// Register a part's fetch with the tracker and hand it to the pool
    pub(crate) async fn submit_part(&self, job: &DownloadJob, part: &DownloadPart) {
        let task = FetchTask {
            id: self.pool.next_task_id(),
            job_id: job.id,
            part_id: part.id,
            url: part.source.url.clone(),
            token: part.source.token.clone(),
            temp_path: self.config.temp_dir().join(format!("{}.part", part.id)),
        };

        self.tracker.register(&task).await;
        self.pool.submit(task);
    }
}

/// Pick the tracks to download and the job title
fn select_tracks<'a>(
    item: &'a MediaItem,
    episode_id: Option<&str>,
) -> Result<(Vec<&'a AudioTrack>, String)> {
    let (tracks, title): (Vec<&AudioTrack>, String) = match episode_id {
        Some(episode_id) => {
            if item.media_type != MediaKind::Podcast {
                return Err(DownloadError::NotPodcast {
                    item_id: item.id.clone(),
                }
                .into());
            }
            let episode = item
                .episode(episode_id)
                .ok_or_else(|| DownloadError::EpisodeNotFound {
                    episode_id: episode_id.to_string(),
                })?;
            let title = if episode.title.is_empty() {
                item.title.clone()
            } else {
                episode.title.clone()
            };
            (episode.audio_track.iter().collect(), title)
        }
        None => match &item.media_type {
            MediaKind::Book => (item.tracks.iter().collect(), item.title.clone()),
            // Podcasts are downloaded one episode at a time
            MediaKind::Podcast => (Vec::new(), item.title.clone()),
            MediaKind::Other(kind) => {
                return Err(DownloadError::UnknownMediaType {
                    media_type: kind.clone(),
                }
                .into());
            }
        },
    };

    if tracks.is_empty() {
        return Err(DownloadError::NoTracks.into());
    }

    Ok((tracks, title))
}

/// Local filename of every track, in track order
///
/// Every part lands in the same directory, so two tracks sharing a filename (or a track named
/// like the cover) would overwrite each other. The later track is rejected.
fn unique_filenames(tracks: &[&AudioTrack], has_cover: bool) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    if has_cover {
        seen.insert(COVER_FILENAME.to_string());
    }

    let mut filenames = Vec::with_capacity(tracks.len());
    for track in tracks {
        let filename = track
            .filename()
            .ok_or(DownloadError::NoMetadata { index: track.index })?;
        if !seen.insert(filename.to_string()) {
            tracing::warn!(
                index = track.index,
                filename,
                "track filename collides with another part"
            );
            return Err(DownloadError::NoMetadata { index: track.index }.into());
        }
        filenames.push(filename.to_string());
    }

    Ok(filenames)
}

fn source_url(server: &ServerIdentity, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        format!("{}{}", server.address, path)
    }
}

fn audio_part(
    server: &ServerIdentity,
    base_path: &Path,
    track: &AudioTrack,
    filename: String,
) -> DownloadPart {
    DownloadPart {
        id: PartId::new(),
        destination: base_path.join(&filename),
        filename,
        kind: PartKind::Audio {
            track: track.clone(),
        },
        source: RemoteSource {
            url: source_url(server, &track.content_url),
            token: Some(server.token.clone()),
        },
        state: PartState::Pending,
    }
}

fn cover_part(server: &ServerIdentity, base_path: &Path, item_id: &str) -> DownloadPart {
    DownloadPart {
        id: PartId::new(),
        filename: COVER_FILENAME.to_string(),
        destination: base_path.join(COVER_FILENAME),
        kind: PartKind::Cover,
        source: RemoteSource {
            url: source_url(server, &format!("/api/items/{item_id}/cover")),
            token: Some(server.token.clone()),
        },
        state: PartState::Pending,
    }
}
