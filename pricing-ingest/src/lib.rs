//! Pricing submission ingestion and validation

pub mod config;
pub mod error;
pub mod ingest;
pub mod repository;
pub mod storage;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use ingest::IngestionService;
