//! Read pricing submissions from Excel format

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Range, Reader, Xlsx};
use log::{debug, warn};

use super::{prefixes, rows};
use crate::error::ParseError;
use crate::ingest::types::{normalize_name, CellValue, ParsedRecord};

/// What a header column feeds in each parsed record
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnKind {
    /// Normalized metadata key, e.g. `EFFECTIVEDATE`
    Metadata { key: String },
    /// Parameter name with its original casing
    Parameter { name: String },
    /// Product value addressed by the composite header
    ProductValue {
        category: String,
        subcategory: String,
        field_type: String,
    },
}

/// One populated cell of the field header row
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderColumn {
    /// 0-based absolute column index
    pub index: u32,
    /// Field header text, trimmed
    pub header: String,
    /// `None` when the header carries no recognized prefix
    pub kind: Option<ColumnKind>,
}

/// First worksheet of a submission with its header rows resolved
#[derive(Debug)]
pub struct Workbook {
    sheet_name: String,
    columns: Vec<HeaderColumn>,
    range: Range<Data>,
}

impl Workbook {
    /// Load a workbook from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut xlsx: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;

        let sheet_name = xlsx
            .sheet_names()
            .first()
            .cloned()
            .ok_or(ParseError::NoWorksheet)?;

        let range = xlsx.worksheet_range(&sheet_name)?;

        // Merged header cells only carry their text in the top-left cell
        let mut merged_headers: HashMap<(u32, u32), String> = HashMap::new();
        match xlsx.load_merged_regions() {
            Ok(()) => {
                for (_, _, dims) in xlsx.merged_regions_by_sheet(&sheet_name) {
                    if dims.start.0 > rows::SUBCATEGORY {
                        continue;
                    }
                    let Some(text) = range.get_value(dims.start).and_then(header_text) else {
                        continue;
                    };
                    for row in dims.start.0..=dims.end.0.min(rows::SUBCATEGORY) {
                        for col in dims.start.1..=dims.end.1 {
                            merged_headers.insert((row, col), text.clone());
                        }
                    }
                }
            }
            Err(e) => warn!("Could not read merged cells of sheet {}: {}", sheet_name, e),
        }

        let columns = resolve_columns(&range, &merged_headers);

        Ok(Self {
            sheet_name,
            columns,
            range,
        })
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Populated field-header columns, in column order
    pub fn columns(&self) -> &[HeaderColumn] {
        &self.columns
    }

    /// Field header texts (row 3), in column order
    pub fn field_headers(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.header.as_str()).collect()
    }

    /// Parse every data row into records, skipping fully blank rows
    pub fn records(&self) -> Vec<ParsedRecord> {
        let Some((last_row, _)) = self.range.end() else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for row in rows::FIRST_DATA..=last_row {
            let row_number = row + 1; // 1-based for rejection logs
            let mut record = ParsedRecord::new(row_number);

            for column in &self.columns {
                let Some(kind) = &column.kind else {
                    continue;
                };
                let Some(value) = self
                    .range
                    .get_value((row, column.index))
                    .and_then(CellValue::from_data)
                else {
                    continue;
                };

                match kind {
                    ColumnKind::Metadata { key } => record.metadata.insert(key, value),
                    ColumnKind::Parameter { name } => record.parameters.push((name.clone(), value)),
                    ColumnKind::ProductValue {
                        category,
                        subcategory,
                        field_type,
                    } => {
                        let key = format!("{}|{}|{}", category, subcategory, field_type);
                        let value = value.coerce_numeric();
                        debug!("Row {} - added product value: {} = {}", row_number, key, value);
                        record.values.insert(key, value);
                    }
                }
            }

            if record.has_data() {
                records.push(record);
            }
        }

        records
    }
}

/// Parse a submission buffer into records
pub fn parse(bytes: &[u8]) -> Result<Vec<ParsedRecord>, ParseError> {
    Ok(Workbook::from_bytes(bytes)?.records())
}

fn resolve_columns(
    range: &Range<Data>,
    merged_headers: &HashMap<(u32, u32), String>,
) -> Vec<HeaderColumn> {
    let Some((_, last_col)) = range.end() else {
        return Vec::new();
    };

    let header_at = |row: u32, col: u32| -> String {
        range
            .get_value((row, col))
            .and_then(header_text)
            .or_else(|| merged_headers.get(&(row, col)).cloned())
            .unwrap_or_default()
    };

    let mut columns = Vec::new();
    for col in 0..=last_col {
        let header = header_at(rows::FIELD, col);
        if header.is_empty() {
            continue;
        }

        let upper = header.to_uppercase();
        let kind = if let Some(rest) = strip_prefix(&header, &upper, prefixes::METADATA) {
            Some(ColumnKind::Metadata {
                key: normalize_name(rest),
            })
        } else if let Some(rest) = strip_prefix(&header, &upper, prefixes::PARAMETER) {
            Some(ColumnKind::Parameter {
                name: rest.to_string(),
            })
        } else if let Some(rest) = strip_prefix(&header, &upper, prefixes::PRODUCT_VALUE) {
            let category = header_at(rows::CATEGORY, col);
            let subcategory = header_at(rows::SUBCATEGORY, col);
            let field_type = rest.to_uppercase();
            debug!(
                "Mapped ProductValue column {}: {} > {} > {}",
                col, category, subcategory, field_type
            );
            Some(ColumnKind::ProductValue {
                category,
                subcategory,
                field_type,
            })
        } else {
            None
        };

        columns.push(HeaderColumn {
            index: col,
            header,
            kind,
        });
    }

    columns
}

/// Strip a prefix matched case-insensitively, returning the original-case remainder
fn strip_prefix<'a>(header: &'a str, upper: &str, prefix: &str) -> Option<&'a str> {
    if upper.starts_with(prefix) && header.is_char_boundary(prefix.len()) {
        Some(&header[prefix.len()..])
    } else {
        None
    }
}

fn header_text(data: &Data) -> Option<String> {
    CellValue::from_data(data)
        .map(|v| v.to_string().trim().to_string())
        .filter(|s| !s.is_empty())
}
