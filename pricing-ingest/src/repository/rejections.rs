//! Rejection log storage

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::ingest::types::RejectionLogEntry;

pub async fn insert_rejection(pool: &SqlitePool, entry: &RejectionLogEntry) -> Result<()> {
    let rejected_data =
        serde_json::to_string(&entry.rejected_data).context("Failed to encode rejected data")?;

    sqlx::query(
        "INSERT INTO rejection_logs (id, file_id, row_number, reason_code, reason_description,
                                     rejected_data, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(entry.id.to_string())
    .bind(entry.file_id.to_string())
    .bind(entry.row_number as i64)
    .bind(entry.reason_code.as_str())
    .bind(&entry.reason_description)
    .bind(rejected_data)
    .bind(entry.created_at)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to store rejection log for row {}", entry.row_number))?;

    Ok(())
}

/// Rejections of one file ordered by sheet row
pub async fn rejections_for_file(pool: &SqlitePool, file_id: Uuid) -> Result<Vec<RejectionLogEntry>> {
    let rows = sqlx::query(
        "SELECT id, file_id, row_number, reason_code, reason_description, rejected_data, created_at
         FROM rejection_logs
         WHERE file_id = ?
         ORDER BY row_number",
    )
    .bind(file_id.to_string())
    .fetch_all(pool)
    .await
    .context("Failed to load rejection logs")?;

    rows.iter()
        .map(|row| -> Result<RejectionLogEntry> {
            let id: String = row.try_get("id")?;
            let file_id: String = row.try_get("file_id")?;
            let row_number: i64 = row.try_get("row_number")?;
            let reason_code: String = row.try_get("reason_code")?;
            let rejected_data: String = row.try_get("rejected_data")?;

            Ok(RejectionLogEntry {
                id: Uuid::parse_str(&id)?,
                file_id: Uuid::parse_str(&file_id)?,
                row_number: u32::try_from(row_number).context("Invalid row number")?,
                reason_code: reason_code.parse()?,
                reason_description: row.try_get("reason_description")?,
                rejected_data: serde_json::from_str(&rejected_data)
                    .context("Invalid rejected data JSON")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect()
}
