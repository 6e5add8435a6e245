//! Spreadsheet pricing ingestion
//!
//! Parse a submission workbook, check its header against the parameter
//! catalog, validate each row, and store accepted rows as products while
//! logging rejected ones.

pub mod catalog;
pub mod excel;
pub mod pipeline;
pub mod types;
pub mod validate;
pub mod values;

pub use pipeline::{IngestionService, ProcessingSummary, ACCEPTED_CONTENT_TYPES};
