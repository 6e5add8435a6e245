//! Persistent ingestion state: files, rejection logs, products

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ingest::values::StructuredProductValues;

/// Lifecycle status of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "PENDING",
            FileStatus::Processing => "PROCESSING",
            FileStatus::Completed => "COMPLETED",
            FileStatus::CompletedWithErrors => "COMPLETED_WITH_ERRORS",
            FileStatus::Failed => "FAILED",
        }
    }

    /// Terminal states never transition again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FileStatus::Completed | FileStatus::CompletedWithErrors | FileStatus::Failed
        )
    }

    /// Only pending or failed files may be deleted
    pub fn is_deletable(&self) -> bool {
        matches!(self, FileStatus::Pending | FileStatus::Failed)
    }

    /// Final status of a processing run from its row counts
    pub fn from_counts(total: u64, succeeded: u64, failed: u64) -> Self {
        if total == 0 || succeeded == 0 {
            FileStatus::Failed
        } else if failed == 0 {
            FileStatus::Completed
        } else {
            FileStatus::CompletedWithErrors
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(FileStatus::Pending),
            "PROCESSING" => Ok(FileStatus::Processing),
            "COMPLETED" => Ok(FileStatus::Completed),
            "COMPLETED_WITH_ERRORS" => Ok(FileStatus::CompletedWithErrors),
            "FAILED" => Ok(FileStatus::Failed),
            other => anyhow::bail!("Unknown file status '{}'", other),
        }
    }
}

/// Machine-readable reason a row was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    ValidationError,
    DatabaseError,
    ProcessingError,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::ValidationError => "VALIDATION_ERROR",
            RejectionReason::DatabaseError => "DATABASE_ERROR",
            RejectionReason::ProcessingError => "PROCESSING_ERROR",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RejectionReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VALIDATION_ERROR" => Ok(RejectionReason::ValidationError),
            "DATABASE_ERROR" => Ok(RejectionReason::DatabaseError),
            "PROCESSING_ERROR" => Ok(RejectionReason::ProcessingError),
            other => anyhow::bail!("Unknown rejection reason '{}'", other),
        }
    }
}

/// Stored state of one uploaded submission
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIngestionState {
    pub id: Uuid,
    pub filename: String,
    pub file_size: i64,
    pub storage_key: String,
    pub status: FileStatus,
    pub records_processed: i64,
    pub records_rejected: i64,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    /// Normalized parameter names captured when the header was validated
    pub parameter_names: Option<Vec<String>>,
    pub validation_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FileIngestionState {
    /// Rows stored as products
    pub fn success_count(&self) -> i64 {
        self.records_processed - self.records_rejected
    }
}

/// Append-only record of one rejected row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionLogEntry {
    pub id: Uuid,
    pub file_id: Uuid,
    pub row_number: u32,
    pub reason_code: RejectionReason,
    pub reason_description: String,
    pub rejected_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A persisted product produced by ingestion
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRecord {
    pub id: Uuid,
    pub source_file_id: Option<Uuid>,
    pub price_record_name: String,
    pub effective_date: NaiveDate,
    /// `None` means the product never expires
    pub expiry_date: Option<NaiveDate>,
    /// Parameter id to normalized value
    pub parameters: std::collections::BTreeMap<String, String>,
    pub values: StructuredProductValues,
}

/// File state together with its rejection logs
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResults {
    #[serde(flatten)]
    pub file: FileIngestionState,
    pub success_count: i64,
    pub rejection_logs: Vec<RejectionLogEntry>,
}
