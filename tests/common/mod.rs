//! Common test utilities for shelf-dl integration tests

#[allow(dead_code)]
pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::*;

use std::path::Path;
use std::time::Duration;

use shelf_dl::{Config, Event};
use tokio::sync::broadcast;

/// Configuration rooted in `root`, pointed at `server_uri`
pub fn config_for(root: &Path, server_uri: &str) -> Config {
    let mut config = Config::default();
    config.persistence.database_path = root.join("shelf.db");
    config.download.download_dir = root.join("downloads");
    config.download.temp_dir = root.join("temp");
    config.download.progress_interval = Duration::from_millis(50);
    config.server.address = server_uri.to_string();
    config.server.token = TEST_TOKEN.to_string();
    config
}

/// Collect events until `done` returns true or `timeout` elapses
pub async fn collect_events_until<F>(
    rx: &mut broadcast::Receiver<Event>,
    timeout: Duration,
    mut done: F,
) -> Vec<Event>
where
    F: FnMut(&Event) -> bool,
{
    let mut events = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let stop = done(&event);
                    events.push(event);
                    if stop {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
    .await;
    events
}
