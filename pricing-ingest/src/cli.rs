//! Command handlers

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::*;
use uuid::Uuid;

use pricing_ingest::ingest::catalog::ParameterCatalog;
use pricing_ingest::ingest::excel::write_template;
use pricing_ingest::ingest::types::{FileIngestionState, FileStatus};
use pricing_ingest::repository::{self, SqliteCatalogSource};
use pricing_ingest::storage::LocalObjectStore;
use pricing_ingest::{IngestConfig, IngestionService};

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_CONTENT_TYPE: &str = "application/vnd.ms-excel";

pub struct App {
    service: IngestionService,
}

impl App {
    pub async fn connect(config: &IngestConfig) -> Result<Self> {
        let pool = repository::connect(&config.database_url).await?;
        let objects = Arc::new(LocalObjectStore::new(&config.storage_dir));
        let catalog = Arc::new(ParameterCatalog::new(Arc::new(SqliteCatalogSource::new(
            pool.clone(),
        ))));

        Ok(Self {
            service: IngestionService::new(pool, objects, catalog, config),
        })
    }

    pub async fn upload(&self, path: &Path, content_type: Option<&str>) -> Result<()> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = content_type.unwrap_or_else(|| guess_content_type(path));

        let file = self.service.upload_file(&bytes, &name, content_type).await?;

        println!("{} {}", "Uploaded".green().bold(), file.filename);
        println!("  id:     {}", file.id.to_string().cyan());
        println!("  status: {}", paint_status(file.status));
        Ok(())
    }

    pub async fn process(&self, file_id: Uuid) -> Result<()> {
        let handle = self.service.start_processing(file_id).await?;
        println!(
            "{} {}",
            "File validation passed and processing started:".green(),
            file_id
        );

        let summary = handle.await.context("Processing task panicked")??;

        println!();
        println!("Status:   {}", paint_status(summary.status));
        println!("Records:  {}", summary.total);
        println!("Stored:   {}", summary.succeeded.to_string().green());
        println!("Rejected: {}", summary.failed.to_string().red());
        Ok(())
    }

    pub async fn results(&self, file_id: Uuid, json: bool) -> Result<()> {
        let results = self.service.get_processing_results(file_id).await?;

        if json {
            println!("{}", serde_json::to_string_pretty(&results)?);
            return Ok(());
        }

        print_file(&results.file);
        if !results.file.status.is_terminal() {
            println!("  {}", "Processing has not finished yet".dimmed());
        }
        if let Some(reason) = &results.file.validation_error {
            println!("  {} {}", "error:".red().bold(), reason);
        }

        if results.rejection_logs.is_empty() {
            return Ok(());
        }

        println!();
        println!("{}", "Rejections".bold());
        for log in &results.rejection_logs {
            println!(
                "  row {:>5}  {:<16} {}",
                log.row_number,
                log.reason_code.as_str().yellow(),
                log.reason_description
            );
        }
        Ok(())
    }

    pub async fn list(&self) -> Result<()> {
        let files = self.service.list_files().await?;
        if files.is_empty() {
            println!("{}", "No files uploaded".dimmed());
            return Ok(());
        }

        for file in &files {
            print_file(file);
        }
        Ok(())
    }

    pub async fn delete(&self, file_id: Uuid) -> Result<()> {
        self.service.delete_file(file_id).await?;
        println!("{} {}", "Deleted".green().bold(), file_id);
        Ok(())
    }

    pub async fn catalog(&self) -> Result<()> {
        let snapshot = self.service.catalog().initialize().await?;

        println!(
            "{} parameters, {} controlled values",
            snapshot.parameter_count().to_string().bold(),
            snapshot.value_count().to_string().bold()
        );
        for param in snapshot.parameters() {
            let kind = if param.allows_free_text {
                "free text".dimmed().to_string()
            } else {
                format!("{} values", snapshot.controlled_value_count(&param.id))
            };
            let scope = if param.is_pbm_specific { " (PBM-specific)" } else { "" };
            println!("  {:<32} {:<12} {}{}", param.name.cyan(), param.id, kind, scope);
        }
        Ok(())
    }

    pub async fn template(&self, output: &Path) -> Result<()> {
        let snapshot = self.service.catalog().initialize().await?;
        let bytes = write_template(&snapshot)?;
        tokio::fs::write(output, bytes)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;

        println!("{} {}", "Template written to".green(), output.display());
        Ok(())
    }
}

fn guess_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("xlsx") => XLSX_CONTENT_TYPE,
        Some("xls") => XLS_CONTENT_TYPE,
        _ => "application/octet-stream",
    }
}

fn paint_status(status: FileStatus) -> ColoredString {
    match status {
        FileStatus::Pending => status.as_str().normal(),
        FileStatus::Processing => status.as_str().blue(),
        FileStatus::Completed => status.as_str().green(),
        FileStatus::CompletedWithErrors => status.as_str().yellow(),
        FileStatus::Failed => status.as_str().red(),
    }
}

fn print_file(file: &FileIngestionState) {
    println!(
        "{}  {:<22} {:<30} {} rows, {} stored, {} rejected",
        file.id.to_string().cyan(),
        paint_status(file.status),
        file.filename,
        file.records_processed,
        file.success_count(),
        file.records_rejected
    );
}
