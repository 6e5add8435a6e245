//! Header checks run before any row is processed

use log::debug;

use crate::error::StructuralError;
use crate::ingest::catalog::CatalogSnapshot;
use crate::ingest::excel::{ColumnKind, Workbook};
use crate::ingest::types::normalize_name;

const REQUIRED_METADATA: &[&str] = &[
    "METADATA_EFFECTIVEDATE",
    "METADATA_EXPIRYDATE",
    "METADATA_PRICERECORDNAME",
];

/// Header layout of a workbook that passed structure validation
#[derive(Debug, Clone, PartialEq)]
pub struct FileStructure {
    /// Parameter names with prefix stripped and normalized, in column order
    pub normalized_parameter_names: Vec<String>,
    pub metadata_fields: Vec<String>,
    pub parameter_fields: Vec<String>,
    pub product_value_fields: Vec<String>,
}

/// Check prefixes, required metadata columns and catalog coverage
///
/// Every problem is collected so the reason lists all of them at once.
pub fn validate_file_structure(
    workbook: &Workbook,
    catalog: &CatalogSnapshot,
) -> Result<FileStructure, StructuralError> {
    let mut structure = FileStructure {
        normalized_parameter_names: Vec::new(),
        metadata_fields: Vec::new(),
        parameter_fields: Vec::new(),
        product_value_fields: Vec::new(),
    };
    let mut metadata_keys = Vec::new();

    debug!("Validating header fields: {:?}", workbook.field_headers());

    for column in workbook.columns() {
        match &column.kind {
            Some(ColumnKind::Metadata { key }) => {
                structure.metadata_fields.push(column.header.clone());
                metadata_keys.push(format!("METADATA_{}", key));
            }
            Some(ColumnKind::Parameter { name }) => {
                structure.parameter_fields.push(column.header.clone());
                structure.normalized_parameter_names.push(normalize_name(name));
            }
            Some(ColumnKind::ProductValue { .. }) => {
                structure.product_value_fields.push(column.header.clone());
            }
            None => debug!("Ignoring column without prefix: {}", column.header),
        }
    }

    let mut problems = Vec::new();

    if structure.metadata_fields.is_empty() {
        problems.push(
            "No metadata fields found. Excel file must contain columns with \"Metadata_\" prefix."
                .to_string(),
        );
    }
    if structure.parameter_fields.is_empty() {
        problems.push(
            "No parameter fields found. Excel file must contain columns with \"Parameter_\" prefix."
                .to_string(),
        );
    }
    if structure.product_value_fields.is_empty() {
        problems.push(
            "No product value fields found. Excel file must contain columns with \"ProductValue_\" prefix."
                .to_string(),
        );
    }

    let missing_metadata: Vec<&str> = REQUIRED_METADATA
        .iter()
        .copied()
        .filter(|required| !metadata_keys.iter().any(|k| k == required))
        .collect();
    if !missing_metadata.is_empty() {
        problems.push(format!(
            "Missing required metadata fields: {}",
            missing_metadata.join(", ")
        ));
    }

    // Every active catalog parameter needs a column, even if unused by this file
    let missing_parameters: Vec<&str> = catalog
        .parameters()
        .filter(|p| {
            let normalized = normalize_name(&p.name);
            !structure.normalized_parameter_names.contains(&normalized)
        })
        .map(|p| p.name.as_str())
        .collect();
    if !missing_parameters.is_empty() {
        problems.push(format!(
            "Missing required parameters: {}",
            missing_parameters.join(", ")
        ));
    }

    if problems.is_empty() {
        Ok(structure)
    } else {
        Err(StructuralError::new(problems))
    }
}
