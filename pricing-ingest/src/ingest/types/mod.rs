//! Core types shared by the ingestion pipeline

mod file;
mod record;
mod value;

pub use file::*;
pub use record::*;
pub use value::*;
