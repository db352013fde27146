//! HTTP implementation of [`MetadataService`].

use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::ServerIdentity;

use super::{MediaItem, MetadataService};

/// Production [`MetadataService`] that queries the server's item endpoint.
pub struct HttpMetadataService {
    client: reqwest::Client,
}

impl HttpMetadataService {
    /// Create a client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn item_url(server: &ServerIdentity, item_id: &str, episode_id: Option<&str>) -> Result<url::Url> {
        let base = format!("{}/api/items/{}", server.address, item_id);
        let mut url = url::Url::parse(&base).map_err(|e| Error::Config {
            message: format!("invalid server address '{}': {}", server.address, e),
            key: Some("server.address".to_string()),
        })?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("expanded", "1");
            query.append_pair("include", "progress");
            if let Some(episode_id) = episode_id {
                query.append_pair("episode", episode_id);
            }
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl MetadataService for HttpMetadataService {
    async fn get_item(
        &self,
        server: &ServerIdentity,
        item_id: &str,
        episode_id: Option<&str>,
    ) -> Result<Option<MediaItem>> {
        let url = Self::item_url(server, item_id, episode_id)?;
        tracing::debug!(item_id, ?episode_id, "fetching item metadata");

        let response = self
            .client
            .get(url)
            .bearer_auth(&server.token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(item_id, "server does not know item");
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(Error::Server {
                status: status.as_u16(),
                message,
            });
        }

        let item = response.json::<MediaItem>().await?;
        Ok(Some(item))
    }
}
