//! Header and row validation against the parameter catalog

mod record;
mod structure;

pub use record::{validate_record, ValidatedRecord, ValidationOutcome, DECREMENTED_RATE, PHARMACY_BENEFITS_MANAGER};
pub use structure::{validate_file_structure, FileStructure};
