//! Server fixtures for a book served by a wiremock instance

use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Token the mock server expects on every request
pub const TEST_TOKEN: &str = "e2e-token";

/// Remote id of the fixture book
pub const BOOK_ID: &str = "li_e2e_book";

/// Bytes of the fake cover image
pub const COVER_BYTES: &[u8] = b"\xFF\xD8\xFF\xE0 not really a jpeg";

/// Body served for track `index`
pub fn track_body(index: usize) -> Vec<u8> {
    format!("ID3 chapter {} audio payload", index + 1)
        .repeat(64)
        .into_bytes()
}

/// Item JSON the server returns for the fixture book
pub fn book_json(tracks: usize) -> Value {
    let tracks: Vec<Value> = (0..tracks)
        .map(|i| {
            json!({
                "index": i,
                "title": format!("Chapter {}", i + 1),
                "contentUrl": format!("/api/items/{BOOK_ID}/file/{i}"),
                "mimeType": "audio/mpeg",
                "duration": 1200.0,
                "metadata": {
                    "filename": format!("Chapter {:02}.mp3", i + 1),
                    "ext": ".mp3",
                    "size": track_body(i).len()
                }
            })
        })
        .collect();

    json!({
        "id": BOOK_ID,
        "mediaType": "book",
        "title": "The Left Hand of Darkness",
        "tracks": tracks,
        "coverPath": format!("/metadata/items/{BOOK_ID}/cover.jpg"),
        "userProgress": {
            "id": "prog_1",
            "libraryItemId": BOOK_ID,
            "duration": 2400.0,
            "progress": 0.5,
            "currentTime": 1200.0,
            "isFinished": false,
            "lastUpdate": 1_700_000_000_000_i64,
            "startedAt": 1_690_000_000_000_i64
        }
    })
}

/// Mount the item endpoint, every track file, and the cover
pub async fn mount_book(server: &MockServer, tracks: usize) {
    let auth = format!("Bearer {TEST_TOKEN}");

    Mock::given(method("GET"))
        .and(path(format!("/api/items/{BOOK_ID}")))
        .and(header("Authorization", auth.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(book_json(tracks)))
        .mount(server)
        .await;

    for i in 0..tracks {
        Mock::given(method("GET"))
            .and(path(format!("/api/items/{BOOK_ID}/file/{i}")))
            .and(header("Authorization", auth.as_str()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(track_body(i))
                    .insert_header("Content-Type", "audio/mpeg"),
            )
            .expect(1)
            .mount(server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path(format!("/api/items/{BOOK_ID}/cover")))
        .and(header("Authorization", auth.as_str()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(COVER_BYTES)
                .insert_header("Content-Type", "image/jpeg"),
        )
        .expect(1)
        .mount(server)
        .await;
}
