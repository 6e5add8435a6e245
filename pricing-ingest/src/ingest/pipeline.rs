//! Ingestion orchestrator
//!
//! A file moves `PENDING -> PROCESSING -> {COMPLETED, COMPLETED_WITH_ERRORS,
//! FAILED}`, or straight from `PENDING` to `FAILED` when its header is
//! rejected. Rows are processed one at a time, each valid row in its own
//! transaction; a bad row becomes a rejection log entry and never stops the
//! batch.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use futures::FutureExt;
use log::{debug, error, info, warn};
use serde::Serialize;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::catalog::{CatalogSnapshot, ParameterCatalog};
use super::excel::Workbook;
use super::types::{
    CellValue, FileIngestionState, FileStatus, ParsedRecord, ProcessingResults, ProductRecord,
    RejectionLogEntry, RejectionReason,
};
use super::validate::{validate_file_structure, validate_record, ValidatedRecord, ValidationOutcome};
use super::values;
use crate::config::IngestConfig;
use crate::error::{IngestError, Result};
use crate::repository::{files, products, rejections};
use crate::storage::ObjectStore;

/// MIME types accepted on upload
pub const ACCEPTED_CONTENT_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
];

/// Outcome of one processing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSummary {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub status: FileStatus,
}

/// Result of one data row
#[derive(Debug, PartialEq)]
enum RowOutcome {
    Stored,
    Rejected(RejectionReason, String),
}

/// Composition root for the ingestion pipeline
#[derive(Clone)]
pub struct IngestionService {
    pool: SqlitePool,
    objects: Arc<dyn ObjectStore>,
    catalog: Arc<ParameterCatalog>,
    max_upload_bytes: usize,
}

impl IngestionService {
    pub fn new(
        pool: SqlitePool,
        objects: Arc<dyn ObjectStore>,
        catalog: Arc<ParameterCatalog>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            pool,
            objects,
            catalog,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn catalog(&self) -> &Arc<ParameterCatalog> {
        &self.catalog
    }

    /// Store an uploaded workbook and register it as PENDING
    pub async fn upload_file(
        &self,
        bytes: &[u8],
        original_name: &str,
        content_type: &str,
    ) -> Result<FileIngestionState> {
        if !ACCEPTED_CONTENT_TYPES.contains(&content_type) {
            return Err(IngestError::UnsupportedContentType {
                content_type: content_type.to_string(),
            });
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(IngestError::FileTooLarge {
                size: bytes.len(),
                limit: self.max_upload_bytes,
            });
        }

        let filename = Path::new(original_name)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "upload.xlsx".to_string());

        let id = Uuid::new_v4();
        let file = FileIngestionState {
            id,
            storage_key: format!("uploads/{}-{}", id, filename),
            filename,
            file_size: i64::try_from(bytes.len()).context("File size out of range")?,
            status: FileStatus::Pending,
            records_processed: 0,
            records_rejected: 0,
            processing_started_at: None,
            processing_completed_at: None,
            parameter_names: None,
            validation_error: None,
            created_at: Utc::now(),
        };

        self.objects
            .put(bytes, &file.storage_key, content_type)
            .await
            .context("Failed to store uploaded file")?;

        if let Err(e) = files::insert_file(&self.pool, &file).await {
            if let Err(cleanup) = self.objects.delete(&file.storage_key).await {
                warn!("Failed to remove orphaned upload {}: {}", file.storage_key, cleanup);
            }
            return Err(e.into());
        }

        info!("Uploaded {} as {} ({} bytes)", file.filename, file.id, file.file_size);
        Ok(file)
    }

    /// Validate a file's header and start processing its rows in the background
    ///
    /// Returns once the file is PROCESSING; the handle resolves when the run
    /// reaches a terminal status.
    pub async fn start_processing(
        &self,
        file_id: Uuid,
    ) -> Result<JoinHandle<Result<ProcessingSummary>>> {
        let file = self.require_file(file_id).await?;

        match file.status {
            FileStatus::Pending => {}
            FileStatus::Processing => return Err(IngestError::AlreadyProcessing),
            FileStatus::Failed if file.validation_error.is_some() => {
                return Err(IngestError::PreviouslyFailed {
                    reason: file.validation_error.unwrap_or_default(),
                });
            }
            status => return Err(IngestError::NotProcessable { status }),
        }

        let catalog = match self.catalog.initialize().await {
            Ok(catalog) => catalog,
            Err(e) => {
                let e = e.context("Failed to load parameter catalog");
                return Err(self.abort_start(file_id, e).await);
            }
        };

        let bytes = match self.objects.get(&file.storage_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let e = e.context(format!("Failed to download {}", file.storage_key));
                return Err(self.abort_start(file_id, e).await);
            }
        };

        let workbook = match Workbook::from_bytes(&bytes) {
            Ok(workbook) => workbook,
            Err(e) => {
                files::mark_validation_failed(&self.pool, file_id, &e.to_string()).await?;
                return Err(e.into());
            }
        };

        let structure = match validate_file_structure(&workbook, &catalog) {
            Ok(structure) => structure,
            Err(e) => {
                warn!("File {} failed structure validation: {}", file_id, e);
                files::mark_validation_failed(&self.pool, file_id, &e.reason()).await?;
                return Err(e.into());
            }
        };

        files::mark_processing(&self.pool, file_id, &structure.normalized_parameter_names).await?;
        info!("File {} validated, processing started", file_id);

        let records = workbook.records();
        let header = structure.normalized_parameter_names;
        let service = self.clone();

        Ok(tokio::spawn(async move {
            service.run(file_id, records, header, catalog).await
        }))
    }

    /// A file that could not be started ends FAILED with zero counts
    async fn abort_start(&self, file_id: Uuid, err: anyhow::Error) -> IngestError {
        error!("Error starting file {}: {:#}", file_id, err);
        if let Err(update) = files::fail_processing(&self.pool, file_id, &format!("{:#}", err)).await {
            error!("Error updating file status for {}: {:#}", file_id, update);
        }
        err.into()
    }

    /// Background run: any escaping error leaves the file FAILED with zero counts
    async fn run(
        &self,
        file_id: Uuid,
        records: Vec<ParsedRecord>,
        header: Vec<String>,
        catalog: Arc<CatalogSnapshot>,
    ) -> Result<ProcessingSummary> {
        match self.process_records(file_id, &records, &header, &catalog).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                error!("Error processing file {}: {:#}", file_id, e);
                if let Err(update) = files::fail_processing(&self.pool, file_id, &e.to_string()).await {
                    error!("Error updating file status for {}: {:#}", file_id, update);
                }
                Err(e.into())
            }
        }
    }

    async fn process_records(
        &self,
        file_id: Uuid,
        records: &[ParsedRecord],
        header: &[String],
        catalog: &CatalogSnapshot,
    ) -> anyhow::Result<ProcessingSummary> {
        info!("Parsed {} records from file {}", records.len(), file_id);

        let outcomes = process_rows(records, |record| {
            self.process_record(file_id, record, header, catalog)
        })
        .await;

        let mut succeeded = 0u64;
        let mut pending_rejections = Vec::new();

        for (record, outcome) in records.iter().zip(outcomes) {
            match outcome {
                RowOutcome::Stored => succeeded += 1,
                RowOutcome::Rejected(reason_code, reason_description) => {
                    pending_rejections.push(RejectionLogEntry {
                        id: Uuid::new_v4(),
                        file_id,
                        row_number: record.row_number,
                        reason_code,
                        reason_description,
                        rejected_data: record.to_json(),
                        created_at: Utc::now(),
                    });
                }
            }
        }

        // Rejection logs are written after every row transaction has finished
        for entry in &pending_rejections {
            if let Err(e) = rejections::insert_rejection(&self.pool, entry).await {
                error!("Failed to store rejection log for row {}: {:#}", entry.row_number, e);
            }
        }

        let total = records.len() as u64;
        let failed = pending_rejections.len() as u64;
        let status = FileStatus::from_counts(total, succeeded, failed);

        info!(
            "Processing complete for {}: total={} success={} failure={} status={}",
            file_id, total, succeeded, failed, status
        );

        files::complete_processing(&self.pool, file_id, status, total as i64, failed as i64).await?;

        Ok(ProcessingSummary {
            total,
            succeeded,
            failed,
            status,
        })
    }

    async fn process_record(
        &self,
        file_id: Uuid,
        record: &ParsedRecord,
        header: &[String],
        catalog: &CatalogSnapshot,
    ) -> RowOutcome {
        let validated = match validate_record(record, catalog, Some(header)) {
            ValidationOutcome::Valid(validated) => validated,
            ValidationOutcome::Invalid { reason } => {
                debug!("Row {} rejected: {}", record.row_number, reason);
                return RowOutcome::Rejected(RejectionReason::ValidationError, reason);
            }
        };

        match self.store_valid_record(file_id, record, validated).await {
            Ok(()) => RowOutcome::Stored,
            Err(e) => {
                error!("Error storing valid record at row {}: {:#}", record.row_number, e);
                RowOutcome::Rejected(
                    RejectionReason::DatabaseError,
                    format!("Error storing valid record: {:#}", e),
                )
            }
        }
    }

    async fn store_valid_record(
        &self,
        file_id: Uuid,
        record: &ParsedRecord,
        validated: ValidatedRecord,
    ) -> anyhow::Result<()> {
        let metadata = &record.metadata;

        let effective_date = metadata
            .effective_date
            .as_ref()
            .ok_or_else(|| anyhow!("EffectiveDate is missing"))
            .and_then(|v| parse_date(v).context("Invalid EffectiveDate"))?;
        let expiry_date = metadata
            .expiry_date
            .as_ref()
            .filter(|v| !v.is_blank())
            .map(|v| parse_date(v).context("Invalid ExpiryDate"))
            .transpose()?;
        let price_record_name = metadata
            .price_record_name
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();

        let product = ProductRecord {
            id: Uuid::new_v4(),
            source_file_id: Some(file_id),
            price_record_name,
            effective_date,
            expiry_date,
            parameters: validated.parameters,
            values: values::structure(&validated.values),
        };

        products::store_product(&self.pool, &product).await
    }

    /// File state with its rejection logs ordered by row
    pub async fn get_processing_results(&self, file_id: Uuid) -> Result<ProcessingResults> {
        let file = self.require_file(file_id).await?;
        let rejection_logs = rejections::rejections_for_file(&self.pool, file_id).await?;

        Ok(ProcessingResults {
            success_count: file.success_count(),
            file,
            rejection_logs,
        })
    }

    /// All files, newest first
    pub async fn list_files(&self) -> Result<Vec<FileIngestionState>> {
        Ok(files::list_files(&self.pool).await?)
    }

    /// Remove a PENDING or FAILED file with its stored bytes and rejection logs
    pub async fn delete_file(&self, file_id: Uuid) -> Result<()> {
        let file = self.require_file(file_id).await?;
        if !file.status.is_deletable() {
            return Err(IngestError::NotDeletable {
                status: file.status,
            });
        }

        self.objects
            .delete(&file.storage_key)
            .await
            .with_context(|| format!("Failed to delete {}", file.storage_key))?;
        files::delete_file(&self.pool, file_id).await?;

        info!("Deleted file {}", file_id);
        Ok(())
    }

    async fn require_file(&self, file_id: Uuid) -> Result<FileIngestionState> {
        files::get_file(&self.pool, file_id)
            .await?
            .ok_or(IngestError::FileNotFound(file_id))
    }
}

/// Run rows in order; a panicking row becomes a PROCESSING_ERROR and the rest still run
async fn process_rows<'a, F, Fut>(records: &'a [ParsedRecord], mut process: F) -> Vec<RowOutcome>
where
    F: FnMut(&'a ParsedRecord) -> Fut,
    Fut: Future<Output = RowOutcome>,
{
    let mut outcomes = Vec::with_capacity(records.len());
    for record in records {
        let outcome = AssertUnwindSafe(process(record))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic.as_ref());
                error!("Error processing record at row {}: {}", record.row_number, message);
                RowOutcome::Rejected(
                    RejectionReason::ProcessingError,
                    format!("Internal processing error: {}", message),
                )
            });
        outcomes.push(outcome);
    }
    outcomes
}

/// Parse a metadata date: `YYYY-MM-DD`, or the date part of an ISO timestamp
fn parse_date(value: &CellValue) -> anyhow::Result<NaiveDate> {
    let CellValue::Text(text) = value else {
        bail!("'{}' is not a date", value);
    };
    let text = text.trim();

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(text) {
        return Ok(datetime.date_naive());
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(datetime.date());
    }

    bail!("'{}' is not a date", text)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::catalog::ParameterCatalog;
    use crate::ingest::excel::fixtures::{Cell, SheetFixture};
    use crate::repository::{catalog as catalog_repo, test_pool, SqliteCatalogSource};
    use crate::storage::MemoryObjectStore;

    const XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

    async fn service() -> IngestionService {
        let pool = test_pool().await;
        catalog_repo::upsert_parameter(&pool, "PBM", "Pharmacy Benefits Manager", false, true)
            .await
            .unwrap();
        catalog_repo::add_controlled_value(
            &pool,
            "PBM",
            "Acme PBM",
            None,
            Utc::now() - chrono::Duration::days(1),
            None,
        )
        .await
        .unwrap();

        let catalog = Arc::new(ParameterCatalog::new(Arc::new(SqliteCatalogSource::new(
            pool.clone(),
        ))));
        IngestionService::new(
            pool,
            Arc::new(MemoryObjectStore::new()),
            catalog,
            &IngestConfig::default(),
        )
    }

    fn sheet() -> SheetFixture {
        SheetFixture::new()
            .field("Metadata_EffectiveDate")
            .field("Metadata_ExpiryDate")
            .field("Metadata_PriceRecordName")
            .field("Parameter_Pharmacy Benefits Manager")
            .column("Retail", "Brand", "ProductValue_Discount")
    }

    fn row(effective: Cell, pbm: &str) -> Vec<Cell> {
        vec![effective, "".into(), "Q1".into(), pbm.into(), "15%".into()]
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(parse_date(&"2024-03-01".into()).unwrap(), expected);
        assert_eq!(parse_date(&"2024-03-01T10:30:00Z".into()).unwrap(), expected);
        assert_eq!(parse_date(&"2024-03-01T10:30:00".into()).unwrap(), expected);
        assert!(parse_date(&"next tuesday".into()).is_err());
        assert!(parse_date(&CellValue::Number(45352.0)).is_err());
    }

    #[tokio::test]
    async fn test_upload_rejects_wrong_type_and_size() {
        let svc = service().await;
        let err = svc.upload_file(b"csv", "prices.csv", "text/csv").await.unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedContentType { .. }));

        let big = vec![0u8; IngestConfig::default().max_upload_bytes + 1];
        let err = svc.upload_file(&big, "prices.xlsx", XLSX).await.unwrap_err();
        assert!(matches!(err, IngestError::FileTooLarge { .. }));
        assert!(svc.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_creates_pending_file() {
        let svc = service().await;
        let file = svc
            .upload_file(&sheet().to_bytes(), "../q1/prices.xlsx", XLSX)
            .await
            .unwrap();

        assert_eq!(file.status, FileStatus::Pending);
        assert_eq!(file.filename, "prices.xlsx");
        assert_eq!(file.storage_key, format!("uploads/{}-prices.xlsx", file.id));
    }

    #[tokio::test]
    async fn test_mixed_rows_complete_with_errors() {
        let svc = service().await;
        let bytes = sheet()
            .row(row(Cell::Date(2024, 1, 1), "Acme PBM"))
            .row(row(Cell::Date(2024, 2, 1), "Unknown PBM"))
            .row(row("not a date".into(), "Acme PBM"))
            .to_bytes();
        let file = svc.upload_file(&bytes, "prices.xlsx", XLSX).await.unwrap();

        let summary = svc.start_processing(file.id).await.unwrap().await.unwrap().unwrap();
        assert_eq!(summary.status, FileStatus::CompletedWithErrors);
        assert_eq!((summary.total, summary.succeeded, summary.failed), (3, 1, 2));

        let results = svc.get_processing_results(file.id).await.unwrap();
        assert_eq!(results.success_count, 1);
        assert_eq!(results.file.records_rejected, 2);
        let codes: Vec<(u32, RejectionReason)> = results
            .rejection_logs
            .iter()
            .map(|l| (l.row_number, l.reason_code))
            .collect();
        assert_eq!(
            codes,
            vec![
                (5, RejectionReason::ValidationError),
                (6, RejectionReason::DatabaseError)
            ]
        );
        assert!(results.rejection_logs[1]
            .reason_description
            .contains("Invalid EffectiveDate"));
    }

    #[tokio::test]
    async fn test_status_guards() {
        let svc = service().await;
        let file = svc
            .upload_file(&sheet().to_bytes(), "prices.xlsx", XLSX)
            .await
            .unwrap();

        files::mark_processing(&svc.pool, file.id, &[]).await.unwrap();
        assert!(matches!(
            svc.start_processing(file.id).await.unwrap_err(),
            IngestError::AlreadyProcessing
        ));
        assert!(matches!(
            svc.delete_file(file.id).await.unwrap_err(),
            IngestError::NotDeletable { .. }
        ));

        files::complete_processing(&svc.pool, file.id, FileStatus::Completed, 1, 0)
            .await
            .unwrap();
        assert!(matches!(
            svc.start_processing(file.id).await.unwrap_err(),
            IngestError::NotProcessable { .. }
        ));

        assert!(matches!(
            svc.start_processing(Uuid::new_v4()).await.unwrap_err(),
            IngestError::FileNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_structure_failure_marks_file_failed() {
        let svc = service().await;
        let bytes = SheetFixture::new()
            .field("Metadata_EffectiveDate")
            .column("Retail", "Brand", "ProductValue_Discount")
            .to_bytes();
        let file = svc.upload_file(&bytes, "prices.xlsx", XLSX).await.unwrap();

        let err = svc.start_processing(file.id).await.unwrap_err();
        assert!(matches!(err, IngestError::Structural(_)));

        let stored = svc.get_processing_results(file.id).await.unwrap().file;
        assert_eq!(stored.status, FileStatus::Failed);
        let reason = stored.validation_error.unwrap();
        assert!(reason.contains("No parameter fields found."));
        assert!(reason.contains("Missing required parameters: Pharmacy Benefits Manager"));

        assert!(matches!(
            svc.start_processing(file.id).await.unwrap_err(),
            IngestError::PreviouslyFailed { .. }
        ));

        svc.delete_file(file.id).await.unwrap();
        assert!(svc.list_files().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_workbook_fails_file() {
        let svc = service().await;
        let file = svc
            .upload_file(b"not really a workbook", "prices.xlsx", XLSX)
            .await
            .unwrap();

        let err = svc.start_processing(file.id).await.unwrap_err();
        assert!(matches!(err, IngestError::Parse(_)));
        let stored = svc.get_processing_results(file.id).await.unwrap().file;
        assert_eq!(stored.status, FileStatus::Failed);
    }

    #[tokio::test]
    async fn test_missing_object_fails_file() {
        let svc = service().await;
        let bytes = sheet().row(row(Cell::Date(2024, 1, 1), "Acme PBM")).to_bytes();
        let file = svc.upload_file(&bytes, "prices.xlsx", XLSX).await.unwrap();
        svc.objects.delete(&file.storage_key).await.unwrap();

        let err = svc.start_processing(file.id).await.unwrap_err();
        assert!(matches!(err, IngestError::Other(_)));

        let stored = svc.get_processing_results(file.id).await.unwrap().file;
        assert_eq!(stored.status, FileStatus::Failed);
        assert_eq!((stored.records_processed, stored.records_rejected), (0, 0));
        assert!(stored
            .validation_error
            .unwrap()
            .starts_with(&format!("Failed to download {}", file.storage_key)));
    }

    struct UnavailableCatalog;

    #[async_trait::async_trait]
    impl crate::ingest::catalog::CatalogSource for UnavailableCatalog {
        async fn load_parameters(
            &self,
        ) -> anyhow::Result<Vec<crate::ingest::catalog::CatalogParameter>> {
            bail!("catalog database unreachable")
        }

        async fn load_controlled_values(
            &self,
        ) -> anyhow::Result<Vec<crate::ingest::catalog::ControlledValue>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_catalog_load_failure_fails_file() {
        let svc = IngestionService::new(
            test_pool().await,
            Arc::new(MemoryObjectStore::new()),
            Arc::new(ParameterCatalog::new(Arc::new(UnavailableCatalog))),
            &IngestConfig::default(),
        );
        let file = svc
            .upload_file(&sheet().to_bytes(), "prices.xlsx", XLSX)
            .await
            .unwrap();

        let err = svc.start_processing(file.id).await.unwrap_err();
        assert!(matches!(err, IngestError::Other(_)));

        let stored = svc.get_processing_results(file.id).await.unwrap().file;
        assert_eq!(stored.status, FileStatus::Failed);
        assert_eq!((stored.records_processed, stored.records_rejected), (0, 0));
        assert_eq!(
            stored.validation_error.as_deref(),
            Some("Failed to load parameter catalog: catalog database unreachable")
        );
        assert!(matches!(
            svc.start_processing(file.id).await.unwrap_err(),
            IngestError::PreviouslyFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_panicking_row_does_not_stop_later_rows() {
        let records = vec![
            ParsedRecord::new(4),
            ParsedRecord::new(5),
            ParsedRecord::new(6),
        ];

        let outcomes = process_rows(&records, |record| {
            let row_number = record.row_number;
            async move {
                if row_number == 5 {
                    panic!("row exploded");
                }
                RowOutcome::Stored
            }
        })
        .await;

        assert_eq!(
            outcomes,
            vec![
                RowOutcome::Stored,
                RowOutcome::Rejected(
                    RejectionReason::ProcessingError,
                    "Internal processing error: row exploded".to_string()
                ),
                RowOutcome::Stored,
            ]
        );
    }

    #[tokio::test]
    async fn test_rejection_log_write_failure_keeps_counts() {
        let svc = service().await;
        sqlx::query(
            "CREATE TRIGGER block_rejections BEFORE INSERT ON rejection_logs
             BEGIN SELECT RAISE(ABORT, 'rejection log unavailable'); END",
        )
        .execute(&svc.pool)
        .await
        .unwrap();

        let bytes = sheet()
            .row(row(Cell::Date(2024, 1, 1), "Acme PBM"))
            .row(row(Cell::Date(2024, 2, 1), "Unknown PBM"))
            .to_bytes();
        let file = svc.upload_file(&bytes, "prices.xlsx", XLSX).await.unwrap();

        let summary = svc.start_processing(file.id).await.unwrap().await.unwrap().unwrap();
        assert_eq!(summary.status, FileStatus::CompletedWithErrors);
        assert_eq!((summary.total, summary.succeeded, summary.failed), (2, 1, 1));

        let results = svc.get_processing_results(file.id).await.unwrap();
        assert_eq!(results.file.status, FileStatus::CompletedWithErrors);
        assert_eq!(
            (results.file.records_processed, results.file.records_rejected),
            (2, 1)
        );
        assert!(results.rejection_logs.is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_leaves_file_failed_with_zero_counts() {
        let svc = service().await;
        sqlx::query(
            "CREATE TRIGGER block_completion BEFORE UPDATE OF status ON files
             WHEN NEW.status = 'COMPLETED'
             BEGIN SELECT RAISE(ABORT, 'status update rejected'); END",
        )
        .execute(&svc.pool)
        .await
        .unwrap();

        let bytes = sheet().row(row(Cell::Date(2024, 1, 1), "Acme PBM")).to_bytes();
        let file = svc.upload_file(&bytes, "prices.xlsx", XLSX).await.unwrap();

        let run = svc.start_processing(file.id).await.unwrap().await.unwrap();
        assert!(run.is_err());

        let stored = svc.get_processing_results(file.id).await.unwrap().file;
        assert_eq!(stored.status, FileStatus::Failed);
        assert_eq!((stored.records_processed, stored.records_rejected), (0, 0));
        assert_eq!(
            stored.validation_error.as_deref(),
            Some("Failed to update file status")
        );
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
