//! Typed cell values read from a submission workbook

use calamine::Data;
use serde::{Deserialize, Serialize};

/// A populated cell value
///
/// Empty cells never produce a `CellValue`; the parser drops them before a
/// record is assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Numeric cell, or numeric text coerced in a product-value column
    Number(f64),
    /// Boolean cell
    Bool(bool),
    /// Text cell (dates are rendered as `YYYY-MM-DD`)
    Text(String),
}

impl CellValue {
    /// Convert a raw calamine cell into a value, `None` for blank cells
    pub fn from_data(data: &Data) -> Option<Self> {
        match data {
            Data::Empty | Data::Error(_) => None,
            Data::String(s) => {
                if s.trim().is_empty() {
                    None
                } else {
                    Some(CellValue::Text(s.clone()))
                }
            }
            Data::Int(i) => Some(CellValue::Number(*i as f64)),
            Data::Float(f) => Some(CellValue::Number(*f)),
            Data::Bool(b) => Some(CellValue::Bool(*b)),
            Data::DateTime(dt) => dt
                .as_datetime()
                .map(|d| CellValue::Text(d.format("%Y-%m-%d").to_string())),
            Data::DateTimeIso(s) => {
                // ISO timestamps keep only their calendar date
                let date = s.split('T').next().unwrap_or(s);
                Some(CellValue::Text(date.to_string()))
            }
            Data::DurationIso(s) => Some(CellValue::Text(s.clone())),
        }
    }

    /// Coerce numeric-looking text to a number; `"12.5%"` becomes `0.125`
    pub fn coerce_numeric(self) -> Self {
        match self {
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if let Some(number) = trimmed.strip_suffix('%') {
                    match number.trim().parse::<f64>() {
                        Ok(f) => CellValue::Number(f / 100.0),
                        Err(_) => CellValue::Text(s),
                    }
                } else {
                    match trimmed.parse::<f64>() {
                        Ok(f) => CellValue::Number(f),
                        Err(_) => CellValue::Text(s),
                    }
                }
            }
            other => other,
        }
    }

    /// True for text consisting only of whitespace
    pub fn is_blank(&self) -> bool {
        matches!(self, CellValue::Text(s) if s.trim().is_empty())
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Number(n) => {
                // Whole numbers print without a fractional part
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}
