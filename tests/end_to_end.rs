//! End-to-end download of a book against a mock server
//!
//! Drives the production metadata client and HTTP transport through `MediaDownloader::new`.

mod common;

use std::time::Duration;

use common::{
    BOOK_ID, COVER_BYTES, collect_events_until, config_for, mount_book, track_body,
};
use shelf_dl::{COVER_FILENAME, DownloadError, Error, Event, MediaDownloader, StartRequest};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const COMPLETION_TIMEOUT: Duration = Duration::from_secs(15);

#[tokio::test]
async fn downloads_book_with_cover_into_local_record() {
    let server = MockServer::start().await;
    mount_book(&server, 2).await;
    let temp_dir = tempfile::tempdir().unwrap();

    let downloader = MediaDownloader::new(config_for(temp_dir.path(), &server.uri()))
        .await
        .unwrap();
    let mut events = downloader.subscribe();

    let job = downloader.start_download(BOOK_ID, None).await.unwrap();
    assert_eq!(job.parts.len(), 3);

    let events = collect_events_until(&mut events, COMPLETION_TIMEOUT, |e| {
        matches!(e, Event::JobComplete { .. })
    })
    .await;

    // Progress snapshots are emitted while the job runs
    let last_snapshot = events
        .iter()
        .filter_map(|e| match e {
            Event::JobProgress { job } => Some(job),
            _ => None,
        })
        .last()
        .expect("at least one progress snapshot");
    assert!(last_snapshot.is_done());

    let Some(Event::JobComplete {
        library_item_id,
        local_media_item,
        local_progress,
        error,
        ..
    }) = events.last()
    else {
        panic!("job never completed: {events:?}");
    };
    assert_eq!(library_item_id, BOOK_ID);
    assert_eq!(error, &None);

    let record = local_media_item.as_ref().unwrap();
    assert_eq!(record.title, "The Left Hand of Darkness");
    assert_eq!(record.files.len(), 2);
    for (i, file) in record.files.iter().enumerate() {
        assert_eq!(file.filename, format!("Chapter {:02}.mp3", i + 1));
        assert_eq!(file.mime_type, "audio/mpeg");
        assert_eq!(std::fs::read(&file.path).unwrap(), track_body(i));
        assert_eq!(file.size_bytes, track_body(i).len() as u64);
    }

    let cover_path = record.cover_path.as_ref().unwrap();
    assert!(cover_path.ends_with(COVER_FILENAME));
    assert_eq!(std::fs::read(cover_path).unwrap(), COVER_BYTES);

    let progress = local_progress.as_ref().unwrap();
    assert_eq!(progress.local_media_item_id, record.id);
    assert_eq!(progress.current_time, 1200.0);

    // The finished job is gone; the record and progress are durable
    for _ in 0..100 {
        if downloader.list_jobs().await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(downloader.list_jobs().await.unwrap().is_empty());
    assert_eq!(
        downloader.get_local_media_item(&record.id).await.unwrap().as_ref(),
        Some(record)
    );
    assert!(downloader.get_local_progress(&record.id).await.unwrap().is_some());

    // No temp files are left behind
    let leftovers = std::fs::read_dir(temp_dir.path().join("temp"))
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(leftovers, 0);

    downloader.shutdown().await.unwrap();
}

#[tokio::test]
async fn unknown_item_is_rejected_at_start() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/items/li_missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let temp_dir = tempfile::tempdir().unwrap();

    let downloader = MediaDownloader::new(config_for(temp_dir.path(), &server.uri()))
        .await
        .unwrap();

    let result = downloader.start_download("li_missing", None).await;
    assert!(matches!(
        result,
        Err(Error::Download(DownloadError::RemoteItemNotFound { .. }))
    ));

    let response = downloader
        .handle_start_request(StartRequest {
            media_item_id: "li_missing".to_string(),
            episode_id: None,
        })
        .await;
    assert_eq!(response.code.as_deref(), Some("remote_item_not_found"));
    assert!(downloader.list_jobs().await.unwrap().is_empty());
}
