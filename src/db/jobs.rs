//! Download job and part persistence.

use crate::error::{DatabaseError, DownloadError};
use crate::types::{DownloadJob, JobId, PartId, PartKind, PartState};
use crate::{Error, Result};

use super::{Database, JobRow, PartRow, part_kind};

impl Database {
    /// Persist a job together with all of its parts
    ///
    /// The job row and the part rows are written in one transaction, so a job is never
    /// visible without its parts. A second job for the same item and episode is rejected
    /// with [`DownloadError::AlreadyDownloading`].
    pub async fn insert_job(&self, job: &DownloadJob) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to begin transaction: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            INSERT INTO download_jobs (
                id, library_item_id, episode_id, media_type, title,
                server_address, server_token, base_path, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id)
        .bind(&job.library_item_id)
        .bind(&job.episode_id)
        .bind(job.media_type.as_str())
        .bind(&job.title)
        .bind(&job.server.address)
        .bind(&job.server.token)
        .bind(job.base_path.to_string_lossy().into_owned())
        .bind(job.created_at.timestamp())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .is_some_and(|db_err| db_err.is_unique_violation());
            if duplicate {
                Error::Download(DownloadError::AlreadyDownloading {
                    item_id: job.library_item_id.clone(),
                    episode_id: job.episode_id.clone(),
                })
            } else {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert download job: {}",
                    e
                )))
            }
        })?;

        for (position, part) in job.parts.iter().enumerate() {
            let (kind, track_json) = match &part.kind {
                PartKind::Audio { track } => {
                    (part_kind::AUDIO, Some(serde_json::to_string(track)?))
                }
                PartKind::Cover => (part_kind::COVER, None),
            };

            sqlx::query(
                r#"
                INSERT INTO download_parts (
                    id, job_id, position, filename, destination, kind, track_json,
                    source_url, source_token, state, progress, error_message
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(part.id)
            .bind(job.id)
            .bind(position as i64)
            .bind(&part.filename)
            .bind(part.destination.to_string_lossy().into_owned())
            .bind(kind)
            .bind(track_json)
            .bind(&part.source.url)
            .bind(&part.source.token)
            .bind(part.state.to_i32())
            .bind(part.state.progress())
            .bind(part.state.failure_reason())
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert download part: {}",
                    e
                )))
            })?;
        }

        tx.commit().await.map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to commit download job: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a job and its parts by ID
    pub async fn get_job(&self, id: JobId) -> Result<Option<DownloadJob>> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT
                id, library_item_id, episode_id, media_type, title,
                server_address, server_token, base_path, created_at
            FROM download_jobs
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download job: {}",
                e
            )))
        })?;

        match row {
            Some(row) => {
                let parts = self.get_parts(row.id).await?;
                Ok(Some(row.into_job(parts)?))
            }
            None => Ok(None),
        }
    }

    /// Get the job owning a part
    pub async fn get_job_by_part_id(&self, part_id: PartId) -> Result<Option<DownloadJob>> {
        let job_id: Option<JobId> =
            sqlx::query_scalar::<_, JobId>("SELECT job_id FROM download_parts WHERE id = ?")
                .bind(part_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to look up part owner: {}",
                        e
                    )))
                })?;

        match job_id {
            Some(job_id) => self.get_job(job_id).await,
            None => Ok(None),
        }
    }

    /// List all persisted jobs, oldest first
    pub async fn list_jobs(&self) -> Result<Vec<DownloadJob>> {
        let rows = sqlx::query_as::<_, JobRow>(
            r#"
            SELECT
                id, library_item_id, episode_id, media_type, title,
                server_address, server_token, base_path, created_at
            FROM download_jobs
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list download jobs: {}",
                e
            )))
        })?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let parts = self.get_parts(row.id).await?;
            jobs.push(row.into_job(parts)?);
        }

        Ok(jobs)
    }

    /// Find an in-flight job for the same item (and episode)
    ///
    /// Returns the ID of the job if one exists.
    pub async fn find_job_for_item(
        &self,
        library_item_id: &str,
        episode_id: Option<&str>,
    ) -> Result<Option<JobId>> {
        // `IS` treats two NULL episode ids as equal
        let id = sqlx::query_scalar::<_, JobId>(
            "SELECT id FROM download_jobs WHERE library_item_id = ? AND episode_id IS ? LIMIT 1",
        )
        .bind(library_item_id)
        .bind(episode_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find job for item: {}",
                e
            )))
        })?;

        Ok(id)
    }

    /// Update the stored state of a part
    ///
    /// Terminal parts are never overwritten. Returns `true` if the row changed, `false` if
    /// the part is unknown or already terminal.
    pub async fn update_part_state(&self, part_id: PartId, state: &PartState) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE download_parts
            SET state = ?, progress = ?, error_message = ?
            WHERE id = ? AND state NOT IN (2, 3)
            "#,
        )
        .bind(state.to_i32())
        .bind(state.progress())
        .bind(state.failure_reason())
        .bind(part_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update part state: {}",
                e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            UPDATE download_jobs SET updated_at = ?
            WHERE id = (SELECT job_id FROM download_parts WHERE id = ?)
            "#,
        )
        .bind(now)
        .bind(part_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to touch download job: {}",
                e
            )))
        })?;

        Ok(true)
    }

    /// Reset every non-terminal part of a job back to pending
    ///
    /// Used on startup: in-flight fetches did not survive the restart and are fetched again.
    pub async fn reset_unfinished_parts(&self, job_id: JobId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE download_parts
            SET state = 0, progress = 0.0, error_message = NULL
            WHERE job_id = ? AND state NOT IN (2, 3)
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to reset unfinished parts: {}",
                e
            )))
        })?;

        Ok(result.rows_affected())
    }

    /// Delete a job; its parts are removed by cascade
    pub async fn delete_job(&self, id: JobId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM download_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete download job: {}",
                    e
                )))
            })?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_parts(&self, job_id: JobId) -> Result<Vec<PartRow>> {
        let rows = sqlx::query_as::<_, PartRow>(
            r#"
            SELECT
                id, job_id, position, filename, destination, kind, track_json,
                source_url, source_token, state, progress, error_message
            FROM download_parts
            WHERE job_id = ?
            ORDER BY position ASC
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get download parts: {}",
                e
            )))
        })?;

        Ok(rows)
    }
}
