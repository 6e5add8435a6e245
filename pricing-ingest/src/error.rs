//! Error taxonomy for the ingestion pipeline
//!
//! Row-scoped problems are not errors here: they become rejection log
//! entries. Only failures that stop a whole file surface as `IngestError`.

use thiserror::Error;
use uuid::Uuid;

use crate::ingest::types::FileStatus;

pub type Result<T> = std::result::Result<T, IngestError>;

/// The workbook bytes could not be read
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Failed to parse Excel file: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("Failed to parse Excel file: Excel file does not contain any worksheets")]
    NoWorksheet,
}

/// Header problems found by structure validation, reported together
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}", problems.join(" "))]
pub struct StructuralError {
    pub problems: Vec<String>,
}

impl StructuralError {
    pub fn new(problems: Vec<String>) -> Self {
        Self { problems }
    }

    /// Combined reason stored on the file record
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("File not found: {0}")]
    FileNotFound(Uuid),

    #[error("File is already being processed")]
    AlreadyProcessing,

    #[error("File validation previously failed: {reason}")]
    PreviouslyFailed { reason: String },

    #[error("File cannot be processed in status {status}")]
    NotProcessable { status: FileStatus },

    #[error("Cannot delete file: only files with PENDING or FAILED status can be deleted (status is {status})")]
    NotDeletable { status: FileStatus },

    #[error("Invalid file type '{content_type}'. Only Excel files (.xlsx, .xls) are allowed.")]
    UnsupportedContentType { content_type: String },

    #[error("File is {size} bytes, larger than the {limit} byte upload limit")]
    FileTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("File validation failed: {0}")]
    Structural(#[from] StructuralError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for IngestError {
    fn from(err: sqlx::Error) -> Self {
        IngestError::Other(anyhow::Error::new(err).context("Database operation failed"))
    }
}
