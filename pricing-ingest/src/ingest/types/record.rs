//! Parsed submission rows

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use super::CellValue;

/// Normalized metadata keys
pub mod metadata_keys {
    pub const EFFECTIVE_DATE: &str = "EFFECTIVEDATE";
    pub const EXPIRY_DATE: &str = "EXPIRYDATE";
    pub const PRICE_RECORD_NAME: &str = "PRICERECORDNAME";
}

/// Normalize a header or parameter name: upper-case with all whitespace removed
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Metadata bucket of a parsed row
///
/// The three well-known fields are typed; any other `Metadata_*` column lands
/// in `extra` under its normalized name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordMetadata {
    pub effective_date: Option<CellValue>,
    pub expiry_date: Option<CellValue>,
    pub price_record_name: Option<CellValue>,
    pub extra: BTreeMap<String, CellValue>,
}

impl RecordMetadata {
    /// Store a value under its normalized metadata key
    pub fn insert(&mut self, key: &str, value: CellValue) {
        match key {
            metadata_keys::EFFECTIVE_DATE => self.effective_date = Some(value),
            metadata_keys::EXPIRY_DATE => self.expiry_date = Some(value),
            metadata_keys::PRICE_RECORD_NAME => self.price_record_name = Some(value),
            other => {
                self.extra.insert(other.to_string(), value);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.effective_date.is_none()
            && self.expiry_date.is_none()
            && self.price_record_name.is_none()
            && self.extra.is_empty()
    }

    fn entries(&self) -> Vec<(&str, &CellValue)> {
        let mut entries = Vec::new();
        if let Some(v) = &self.effective_date {
            entries.push((metadata_keys::EFFECTIVE_DATE, v));
        }
        if let Some(v) = &self.expiry_date {
            entries.push((metadata_keys::EXPIRY_DATE, v));
        }
        if let Some(v) = &self.price_record_name {
            entries.push((metadata_keys::PRICE_RECORD_NAME, v));
        }
        entries.extend(self.extra.iter().map(|(k, v)| (k.as_str(), v)));
        entries
    }
}

impl Serialize for RecordMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let entries = self.entries();
        let mut map = serializer.serialize_map(Some(entries.len()))?;
        for (key, value) in entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One data row of a submission workbook
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedRecord {
    /// 1-based sheet row this record was read from
    #[serde(skip)]
    pub row_number: u32,
    pub metadata: RecordMetadata,
    /// Parameter name (prefix stripped, case preserved) to raw value, in column order
    #[serde(serialize_with = "serialize_pairs")]
    pub parameters: Vec<(String, CellValue)>,
    /// Structured `Category|Subcategory|FieldType` key to value
    pub values: BTreeMap<String, CellValue>,
}

impl ParsedRecord {
    pub fn new(row_number: u32) -> Self {
        Self {
            row_number,
            ..Default::default()
        }
    }

    /// True if at least one bucket holds a value
    pub fn has_data(&self) -> bool {
        !self.metadata.is_empty() || !self.parameters.is_empty() || !self.values.is_empty()
    }

    /// Find a parameter by normalized name
    pub fn parameter(&self, normalized: &str) -> Option<&CellValue> {
        self.parameters
            .iter()
            .find(|(name, _)| normalize_name(name) == normalized)
            .map(|(_, value)| value)
    }

    /// JSON payload stored with a rejection
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn serialize_pairs<S: Serializer>(
    pairs: &[(String, CellValue)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(pairs.iter().map(|(k, v)| (k, v)))
}
