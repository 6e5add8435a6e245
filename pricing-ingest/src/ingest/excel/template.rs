//! Blank submission template for the current catalog

use anyhow::{Context, Result};
use rust_xlsxwriter::*;

use super::rows;
use crate::ingest::catalog::CatalogSnapshot;
use crate::ingest::values::Leaf;

/// Header text of one template column: (category, subcategory, field)
pub type TemplateColumn = (String, String, String);

const METADATA_COLUMNS: &[&str] = &[
    "Metadata_EffectiveDate",
    "Metadata_ExpiryDate",
    "Metadata_PriceRecordName",
];

/// Columns a complete submission needs, in sheet order
///
/// Metadata first, then one parameter column per active catalog parameter,
/// then every product-value leaf of the pricing schema.
pub fn template_columns(catalog: &CatalogSnapshot) -> Vec<TemplateColumn> {
    let mut columns: Vec<TemplateColumn> = METADATA_COLUMNS
        .iter()
        .map(|field| (String::new(), String::new(), field.to_string()))
        .collect();

    columns.extend(
        catalog
            .parameters()
            .map(|p| (String::new(), String::new(), format!("Parameter_{}", p.name))),
    );

    columns.extend(Leaf::all().into_iter().map(|leaf| {
        let (category, subcategory, field) = leaf.headers();
        (
            category.to_string(),
            subcategory.to_string(),
            format!("ProductValue_{}", field),
        )
    }));

    columns
}

/// Render the template workbook to bytes
pub fn write_template(catalog: &CatalogSnapshot) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Pricing")?;

    let group_format = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0x4472C4))
        .set_font_color(Color::White);
    let field_format = Format::new().set_bold().set_border_bottom(FormatBorder::Thin);

    for (index, (category, subcategory, field)) in template_columns(catalog).iter().enumerate() {
        let col = u16::try_from(index).context("Template has too many columns")?;

        if !category.is_empty() {
            sheet.write_string_with_format(rows::CATEGORY, col, category, &group_format)?;
        }
        if !subcategory.is_empty() {
            sheet.write_string_with_format(rows::SUBCATEGORY, col, subcategory, &group_format)?;
        }
        sheet.write_string_with_format(rows::FIELD, col, field, &field_format)?;
        sheet.set_column_width(col, (field.len().max(category.len()) + 2) as f64)?;
    }

    sheet.set_freeze_panes(rows::FIRST_DATA, 0)?;

    workbook
        .save_to_buffer()
        .context("Failed to render submission template")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::catalog::CatalogParameter;
    use crate::ingest::excel::{ColumnKind, Workbook as SubmissionWorkbook};

    fn catalog() -> CatalogSnapshot {
        CatalogSnapshot::build(
            vec![
                CatalogParameter {
                    id: "P1".into(),
                    name: "Pharmacy Benefits Manager".into(),
                    is_pbm_specific: false,
                },
                CatalogParameter {
                    id: "P2".into(),
                    name: "Decremented Rate".into(),
                    is_pbm_specific: false,
                },
            ],
            vec![],
        )
    }

    #[test]
    fn test_columns_cover_metadata_parameters_and_schema() {
        let columns = template_columns(&catalog());
        assert_eq!(columns.len(), 3 + 2 + Leaf::all().len());
        assert_eq!(columns[3].2, "Parameter_Pharmacy Benefits Manager");
        assert!(columns.contains(&(
            "Retail 90".to_string(),
            "Generic".to_string(),
            "ProductValue_Rebate".to_string()
        )));
    }

    #[test]
    fn test_template_reads_back_as_submission_header() {
        let bytes = write_template(&catalog()).unwrap();
        let workbook = SubmissionWorkbook::from_bytes(&bytes).unwrap();

        assert_eq!(workbook.columns().len(), template_columns(&catalog()).len());
        assert!(workbook.records().is_empty());

        let product_keys: Vec<String> = workbook
            .columns()
            .iter()
            .filter_map(|c| match &c.kind {
                Some(ColumnKind::ProductValue {
                    category,
                    subcategory,
                    field_type,
                }) => Some(format!("{}|{}|{}", category, subcategory, field_type)),
                _ => None,
            })
            .collect();
        let expected: Vec<String> = Leaf::all().iter().map(Leaf::key).collect();
        assert_eq!(product_keys, expected);
    }
}
