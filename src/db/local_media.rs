//! Local media records and local listening progress.
//!
//! Both are stored as JSON payloads keyed by their local id; saving an existing id
//! replaces the previous payload.

use crate::error::DatabaseError;
use crate::types::{LocalMediaProgress, LocalMediaRecord};
use crate::{Error, Result};

use super::Database;

impl Database {
    /// Insert or replace a local media record
    pub async fn save_local_media_item(&self, record: &LocalMediaRecord) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let payload = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT INTO local_media_items (id, library_item_id, episode_id, payload, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                library_item_id = excluded.library_item_id,
                episode_id = excluded.episode_id,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.library_item_id)
        .bind(&record.episode_id)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to save local media item: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a local media record by its local id
    pub async fn get_local_media_item(&self, id: &str) -> Result<Option<LocalMediaRecord>> {
        let payload =
            sqlx::query_scalar::<_, String>("SELECT payload FROM local_media_items WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to get local media item: {}",
                        e
                    )))
                })?;

        payload
            .map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    /// List all local media records
    pub async fn list_local_media_items(&self) -> Result<Vec<LocalMediaRecord>> {
        let payloads = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM local_media_items ORDER BY updated_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list local media items: {}",
                e
            )))
        })?;

        payloads
            .iter()
            .map(|json| serde_json::from_str(json).map_err(Error::from))
            .collect()
    }

    /// Insert or replace local listening progress
    pub async fn save_local_progress(&self, progress: &LocalMediaProgress) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let payload = serde_json::to_string(progress)?;

        sqlx::query(
            r#"
            INSERT INTO local_media_progress (id, local_media_item_id, payload, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                local_media_item_id = excluded.local_media_item_id,
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&progress.id)
        .bind(&progress.local_media_item_id)
        .bind(payload)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to save local progress: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get local listening progress by its local id
    pub async fn get_local_progress(&self, id: &str) -> Result<Option<LocalMediaProgress>> {
        let payload =
            sqlx::query_scalar::<_, String>("SELECT payload FROM local_media_progress WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to get local progress: {}",
                        e
                    )))
                })?;

        payload
            .map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }
}
