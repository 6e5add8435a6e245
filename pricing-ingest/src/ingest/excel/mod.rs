//! Excel I/O for pricing submissions

mod reader;
mod template;

pub use reader::{parse, ColumnKind, HeaderColumn, Workbook};
pub use template::{template_columns, write_template};

/// Header rows (0-based): category, subcategory, field identity
pub mod rows {
    pub const CATEGORY: u32 = 0;
    pub const SUBCATEGORY: u32 = 1;
    pub const FIELD: u32 = 2;
    pub const FIRST_DATA: u32 = 3;
}

/// Recognized field header prefixes (matched case-insensitively)
pub mod prefixes {
    pub const METADATA: &str = "METADATA_";
    pub const PARAMETER: &str = "PARAMETER_";
    pub const PRODUCT_VALUE: &str = "PRODUCTVALUE_";
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! In-memory workbook builder for tests

    use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};

    use crate::ingest::types::CellValue;

    /// A cell to write into a fixture sheet
    #[derive(Debug, Clone)]
    pub enum Cell {
        Empty,
        Value(CellValue),
        Date(u16, u8, u8),
    }

    impl From<&str> for Cell {
        fn from(value: &str) -> Self {
            if value.is_empty() {
                Cell::Empty
            } else {
                Cell::Value(CellValue::from(value))
            }
        }
    }

    impl From<f64> for Cell {
        fn from(value: f64) -> Self {
            Cell::Value(CellValue::Number(value))
        }
    }

    /// Three header rows plus data rows
    #[derive(Debug, Default)]
    pub struct SheetFixture {
        columns: Vec<(String, String, String)>,
        rows: Vec<Vec<Cell>>,
    }

    impl SheetFixture {
        pub fn new() -> Self {
            Self::default()
        }

        /// Column with only a field header (row 3)
        pub fn field(self, header: &str) -> Self {
            self.column("", "", header)
        }

        pub fn column(mut self, category: &str, subcategory: &str, header: &str) -> Self {
            self.columns
                .push((category.to_string(), subcategory.to_string(), header.to_string()));
            self
        }

        pub fn row(mut self, cells: Vec<Cell>) -> Self {
            self.rows.push(cells);
            self
        }

        pub fn to_bytes(&self) -> Vec<u8> {
            let mut workbook = Workbook::new();
            let worksheet = workbook.add_worksheet();
            let date_format = Format::new().set_num_format("yyyy-mm-dd");

            for (col, (category, subcategory, header)) in self.columns.iter().enumerate() {
                let col = col as u16;
                for (row, text) in [(0u32, category), (1, subcategory), (2, header)] {
                    if !text.is_empty() {
                        worksheet.write_string(row, col, text).unwrap();
                    }
                }
            }

            for (row_idx, cells) in self.rows.iter().enumerate() {
                let row = (row_idx + 3) as u32;
                for (col, cell) in cells.iter().enumerate() {
                    let col = col as u16;
                    match cell {
                        Cell::Empty => {}
                        Cell::Value(CellValue::Number(n)) => {
                            worksheet.write_number(row, col, *n).unwrap();
                        }
                        Cell::Value(CellValue::Bool(b)) => {
                            worksheet.write_boolean(row, col, *b).unwrap();
                        }
                        Cell::Value(CellValue::Text(s)) => {
                            worksheet.write_string(row, col, s).unwrap();
                        }
                        Cell::Date(y, m, d) => {
                            let date = ExcelDateTime::from_ymd(*y, *m, *d).unwrap();
                            worksheet
                                .write_datetime_with_format(row, col, &date, &date_format)
                                .unwrap();
                        }
                    }
                }
            }

            workbook.save_to_buffer().unwrap()
        }
    }
}
