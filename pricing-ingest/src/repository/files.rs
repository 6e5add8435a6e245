//! Uploaded file records and their status transitions

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::ingest::types::{FileIngestionState, FileStatus};

const FILE_COLUMNS: &str = "id, filename, file_size, storage_key, status, records_processed,
    records_rejected, processing_started_at, processing_completed_at, parameter_names,
    validation_error, created_at";

fn file_from_row(row: &SqliteRow) -> Result<FileIngestionState> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let parameter_names: Option<String> = row.try_get("parameter_names")?;

    Ok(FileIngestionState {
        id: Uuid::parse_str(&id).with_context(|| format!("Invalid file id '{}'", id))?,
        filename: row.try_get("filename")?,
        file_size: row.try_get("file_size")?,
        storage_key: row.try_get("storage_key")?,
        status: status.parse()?,
        records_processed: row.try_get("records_processed")?,
        records_rejected: row.try_get("records_rejected")?,
        processing_started_at: row.try_get("processing_started_at")?,
        processing_completed_at: row.try_get("processing_completed_at")?,
        parameter_names: parameter_names
            .map(|json| serde_json::from_str(&json))
            .transpose()
            .context("Invalid parameter_names JSON")?,
        validation_error: row.try_get("validation_error")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Register a newly uploaded file
pub async fn insert_file(pool: &SqlitePool, file: &FileIngestionState) -> Result<()> {
    sqlx::query(
        "INSERT INTO files (id, filename, original_name, file_size, storage_key, status,
                            records_processed, records_rejected, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(file.id.to_string())
    .bind(&file.filename)
    .bind(&file.filename)
    .bind(file.file_size)
    .bind(&file.storage_key)
    .bind(file.status.as_str())
    .bind(file.records_processed)
    .bind(file.records_rejected)
    .bind(file.created_at)
    .bind(file.created_at)
    .execute(pool)
    .await
    .context("Failed to insert file record")?;

    Ok(())
}

pub async fn get_file(pool: &SqlitePool, id: Uuid) -> Result<Option<FileIngestionState>> {
    let row = sqlx::query(&format!("SELECT {} FROM files WHERE id = ?", FILE_COLUMNS))
        .bind(id.to_string())
        .fetch_optional(pool)
        .await
        .context("Failed to get file")?;

    row.as_ref().map(file_from_row).transpose()
}

/// All files, newest first
pub async fn list_files(pool: &SqlitePool) -> Result<Vec<FileIngestionState>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM files ORDER BY created_at DESC",
        FILE_COLUMNS
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list files")?;

    rows.iter().map(file_from_row).collect()
}

/// Header validation failed: the file goes straight to FAILED
pub async fn mark_validation_failed(pool: &SqlitePool, id: Uuid, reason: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE files
         SET status = ?, processing_started_at = ?, processing_completed_at = ?,
             updated_at = ?, validation_error = ?
         WHERE id = ?",
    )
    .bind(FileStatus::Failed.as_str())
    .bind(now)
    .bind(now)
    .bind(now)
    .bind(reason)
    .bind(id.to_string())
    .execute(pool)
    .await
    .context("Failed to mark file as failed validation")?;

    Ok(())
}

/// Header validated: store the parameter snapshot and reset counters
pub async fn mark_processing(
    pool: &SqlitePool,
    id: Uuid,
    parameter_names: &[String],
) -> Result<DateTime<Utc>> {
    let now = Utc::now();
    let names = serde_json::to_string(parameter_names).context("Failed to encode parameter names")?;

    sqlx::query(
        "UPDATE files
         SET status = ?, processing_started_at = ?, processing_completed_at = NULL,
             updated_at = ?, parameter_names = ?, validation_error = NULL,
             records_processed = 0, records_rejected = 0
         WHERE id = ?",
    )
    .bind(FileStatus::Processing.as_str())
    .bind(now)
    .bind(now)
    .bind(names)
    .bind(id.to_string())
    .execute(pool)
    .await
    .context("Failed to mark file as processing")?;

    Ok(now)
}

/// Write the final status and aggregate counts of a processing run
pub async fn complete_processing(
    pool: &SqlitePool,
    id: Uuid,
    status: FileStatus,
    records_processed: i64,
    records_rejected: i64,
) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE files
         SET status = ?, records_processed = ?, records_rejected = ?,
             processing_completed_at = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(status.as_str())
    .bind(records_processed)
    .bind(records_rejected)
    .bind(now)
    .bind(now)
    .bind(id.to_string())
    .execute(pool)
    .await
    .context("Failed to update file status")?;

    Ok(())
}

/// A processing run aborted: FAILED with zero counts and the error kept
pub async fn fail_processing(pool: &SqlitePool, id: Uuid, error: &str) -> Result<()> {
    let now = Utc::now();
    sqlx::query(
        "UPDATE files
         SET status = ?, records_processed = 0, records_rejected = 0,
             processing_completed_at = ?, updated_at = ?, validation_error = ?
         WHERE id = ?",
    )
    .bind(FileStatus::Failed.as_str())
    .bind(now)
    .bind(now)
    .bind(error)
    .bind(id.to_string())
    .execute(pool)
    .await
    .context("Failed to mark file as failed")?;

    Ok(())
}

/// Remove a file record together with its rejection logs
pub async fn delete_file(pool: &SqlitePool, id: Uuid) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to start transaction")?;

    sqlx::query("DELETE FROM rejection_logs WHERE file_id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to delete rejection logs")?;

    sqlx::query("DELETE FROM files WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to delete file record")?;

    tx.commit().await.context("Failed to commit transaction")?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn pending_file(filename: &str) -> FileIngestionState {
    let id = Uuid::new_v4();
    FileIngestionState {
        id,
        filename: filename.to_string(),
        file_size: 1024,
        storage_key: format!("uploads/{}-{}", id, filename),
        status: FileStatus::Pending,
        records_processed: 0,
        records_rejected: 0,
        processing_started_at: None,
        processing_completed_at: None,
        parameter_names: None,
        validation_error: None,
        created_at: Utc::now(),
    }
}
