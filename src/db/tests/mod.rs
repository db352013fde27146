use std::path::PathBuf;

use crate::metadata::AudioTrack;
use crate::types::{
    DownloadJob, DownloadPart, JobId, MediaKind, PartId, PartKind, PartState, RemoteSource,
    ServerIdentity,
};

mod migrations;

/// Book job with `tracks` audio parts followed by a cover part
fn sample_job(item_id: &str, tracks: u32) -> DownloadJob {
    let base_path = PathBuf::from("/media").join(item_id);
    let mut parts: Vec<DownloadPart> = (0..tracks)
        .map(|i| {
            let filename = format!("track{}.mp3", i + 1);
            DownloadPart {
                id: PartId::new(),
                destination: base_path.join(&filename),
                filename: filename.clone(),
                kind: PartKind::Audio {
                    track: AudioTrack::for_test(i, &filename),
                },
                source: RemoteSource {
                    url: format!("http://abs.local/api/items/{item_id}/file/{i}"),
                    token: Some("tok".to_string()),
                },
                state: PartState::Pending,
            }
        })
        .collect();

    parts.push(DownloadPart {
        id: PartId::new(),
        filename: "cover.jpg".to_string(),
        destination: base_path.join("cover.jpg"),
        kind: PartKind::Cover,
        source: RemoteSource {
            url: format!("http://abs.local/api/items/{item_id}/cover"),
            token: Some("tok".to_string()),
        },
        state: PartState::Pending,
    });

    DownloadJob {
        id: JobId::new(),
        library_item_id: item_id.to_string(),
        episode_id: None,
        media_type: MediaKind::Book,
        title: format!("Title of {item_id}"),
        server: ServerIdentity {
            address: "http://abs.local".to_string(),
            token: "tok".to_string(),
        },
        base_path,
        parts,
        // Stored with second precision
        created_at: chrono::DateTime::from_timestamp(chrono::Utc::now().timestamp(), 0).unwrap(),
    }
}
