//! Per-row validation against the parameter catalog
//!
//! Checks run in a fixed order and the first failure wins: record shape,
//! required metadata, PBM presence, then each parameter value. The PBM value
//! found in step three scopes the controlled-value lookups in step four.

use std::collections::BTreeMap;

use log::warn;

use crate::ingest::catalog::CatalogSnapshot;
use crate::ingest::types::{normalize_name, CellValue, ParsedRecord};

/// Normalized name of the PBM discriminator parameter
pub const PHARMACY_BENEFITS_MANAGER: &str = "PHARMACYBENEFITSMANAGER";

/// Normalized name of the parameter whose bare numbers become percentages
pub const DECREMENTED_RATE: &str = "DECREMENTEDRATE";

/// A row that passed validation, ready to be structured and stored
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    /// Parameter id to normalized value
    pub parameters: BTreeMap<String, String>,
    /// Flat structured-key values, untouched
    pub values: BTreeMap<String, CellValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Valid(ValidatedRecord),
    Invalid { reason: String },
}

impl ValidationOutcome {
    fn invalid(reason: impl Into<String>) -> Self {
        ValidationOutcome::Invalid {
            reason: reason.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }
}

/// Validate one parsed row
///
/// `header_parameters` is the normalized parameter-name snapshot stored when
/// the file header was validated; parameters outside it are skipped.
pub fn validate_record(
    record: &ParsedRecord,
    catalog: &CatalogSnapshot,
    header_parameters: Option<&[String]>,
) -> ValidationOutcome {
    if record.metadata.is_empty() || record.parameters.is_empty() || record.values.is_empty() {
        return ValidationOutcome::invalid(
            "Invalid record structure. Record must contain metadata, parameters, and values objects.",
        );
    }

    if !is_present(record.metadata.effective_date.as_ref()) {
        return ValidationOutcome::invalid("Missing required metadata field: EffectiveDate");
    }
    // Expiry date may be empty: the product never expires
    if !is_present(record.metadata.price_record_name.as_ref()) {
        return ValidationOutcome::invalid("Missing required metadata field: PriceRecordName");
    }

    let Some(pbm) = record
        .parameter(PHARMACY_BENEFITS_MANAGER)
        .filter(|v| !v.is_blank())
        .map(|v| v.to_string())
    else {
        return ValidationOutcome::invalid("Missing required parameter: PharmacyBenefitsManager");
    };

    let mut parameters = BTreeMap::new();

    for (name, value) in &record.parameters {
        if value.is_blank() {
            continue;
        }

        let normalized_name = normalize_name(name);

        if let Some(header) = header_parameters {
            if !header.contains(&normalized_name) {
                warn!("Parameter not in validated header: {}", name);
                continue;
            }
        }

        let Some(definition) = catalog.parameter(&normalized_name) else {
            warn!("Unknown parameter in record: {}", name);
            continue;
        };

        let normalized_value = if normalized_name == DECREMENTED_RATE {
            as_percentage(value)
        } else {
            value.to_string()
        };

        parameters.insert(definition.id.clone(), normalized_value.clone());

        if catalog.is_free_text_field(&definition.id) {
            continue;
        }

        let scope = definition.is_pbm_specific.then_some(pbm.as_str());
        if !catalog.is_valid_value(&definition.id, &normalized_value, scope) {
            let valid_values = catalog.get_valid_values(&definition.id, scope).join(", ");
            let reason = match scope {
                Some(pbm) => format!(
                    "Invalid value \"{}\" for parameter {} with PBM {}. Valid values are: {}",
                    normalized_value, definition.name, pbm, valid_values
                ),
                None => format!(
                    "Invalid value \"{}\" for parameter {}. Valid values are: {}",
                    normalized_value, definition.name, valid_values
                ),
            };
            return ValidationOutcome::Invalid { reason };
        }
    }

    ValidationOutcome::Valid(ValidatedRecord {
        parameters,
        values: record.values.clone(),
    })
}

fn is_present(value: Option<&CellValue>) -> bool {
    value.is_some_and(|v| !v.is_blank())
}

/// Numbers and bare numeric text gain a trailing `%`
fn as_percentage(value: &CellValue) -> String {
    match value {
        CellValue::Number(_) => format!("{}%", value),
        CellValue::Text(s) => {
            let trimmed = s.trim();
            let numeric = trimmed.parse::<f64>().is_ok_and(f64::is_finite);
            if numeric && !trimmed.contains('%') {
                format!("{}%", trimmed)
            } else {
                s.clone()
            }
        }
        CellValue::Bool(_) => value.to_string(),
    }
}
