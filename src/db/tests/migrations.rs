use crate::db::*;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_database_creation() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path();

    let db = Database::new(db_path).await.unwrap();

    // Verify tables exist
    let mut conn = db.pool.acquire().await.unwrap();

    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&mut *conn)
            .await
            .unwrap();

    assert!(tables.contains(&"download_jobs".to_string()));
    assert!(tables.contains(&"download_parts".to_string()));
    assert!(tables.contains(&"local_media_items".to_string()));
    assert!(tables.contains(&"local_media_progress".to_string()));
    assert!(tables.contains(&"schema_version".to_string()));

    drop(conn);
    db.close().await;
}

#[tokio::test]
async fn test_reopening_database_keeps_data_and_version() {
    let temp_file = NamedTempFile::new().unwrap();
    let db_path = temp_file.path();

    let job = super::sample_job("li_1", 1);
    {
        let db = Database::new(db_path).await.unwrap();
        db.insert_job(&job).await.unwrap();
        db.close().await;
    }

    // Second open must not re-run v1 (which would fail on CREATE TABLE)
    let db = Database::new(db_path).await.unwrap();
    assert!(db.get_job(job.id).await.unwrap().is_some());

    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(versions, vec![1]);

    db.close().await;
}

#[tokio::test]
async fn test_database_in_missing_directory_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("state").join("shelf.db");

    let db = Database::new(&db_path).await.unwrap();
    assert!(db_path.exists());

    db.close().await;
}
