//! Product rows written by ingestion

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::ingest::types::ProductRecord;

/// Insert a product header and its structured values on one connection
///
/// Run inside a transaction so both rows land or neither does.
pub async fn insert_product(conn: &mut SqliteConnection, product: &ProductRecord) -> Result<()> {
    let now = Utc::now();
    let parameters =
        serde_json::to_string(&product.parameters).context("Failed to encode parameters")?;
    let values = serde_json::to_string(&product.values).context("Failed to encode product values")?;

    sqlx::query(
        "INSERT INTO products (id, source_file_id, price_record_name, effective_date,
                               expiry_date, parameters, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(product.id.to_string())
    .bind(product.source_file_id.map(|id| id.to_string()))
    .bind(&product.price_record_name)
    .bind(product.effective_date)
    .bind(product.expiry_date)
    .bind(parameters)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("Failed to insert product")?;

    sqlx::query(
        r#"INSERT INTO product_values (id, product_id, "values", created_at, updated_at)
           VALUES (?, ?, ?, ?, ?)"#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(product.id.to_string())
    .bind(values)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await
    .context("Failed to insert product values")?;

    Ok(())
}

/// Store one product in its own transaction
pub async fn store_product(pool: &SqlitePool, product: &ProductRecord) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to start transaction")?;
    insert_product(&mut tx, product).await?;
    tx.commit().await.context("Failed to commit transaction")?;
    Ok(())
}

/// Products created from one uploaded file
pub async fn products_for_file(pool: &SqlitePool, file_id: Uuid) -> Result<Vec<ProductRecord>> {
    let rows = sqlx::query(
        r#"SELECT p.id, p.source_file_id, p.price_record_name, p.effective_date,
                  p.expiry_date, p.parameters, v."values" AS product_values
           FROM products p
           JOIN product_values v ON v.product_id = p.id
           WHERE p.source_file_id = ?
           ORDER BY p.created_at, p.rowid"#,
    )
    .bind(file_id.to_string())
    .fetch_all(pool)
    .await
    .context("Failed to load products")?;

    rows.iter()
        .map(|row| -> Result<ProductRecord> {
            let id: String = row.try_get("id")?;
            let source: Option<String> = row.try_get("source_file_id")?;
            let parameters: String = row.try_get("parameters")?;
            let values: String = row.try_get("product_values")?;

            Ok(ProductRecord {
                id: Uuid::parse_str(&id)?,
                source_file_id: source.as_deref().map(Uuid::parse_str).transpose()?,
                price_record_name: row.try_get("price_record_name")?,
                effective_date: row.try_get("effective_date")?,
                expiry_date: row.try_get("expiry_date")?,
                parameters: serde_json::from_str(&parameters)
                    .context("Invalid product parameters JSON")?,
                values: serde_json::from_str(&values).context("Invalid product values JSON")?,
            })
        })
        .collect()
}

/// Number of products created from one file
pub async fn count_for_file(pool: &SqlitePool, file_id: Uuid) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products WHERE source_file_id = ?")
        .bind(file_id.to_string())
        .fetch_one(pool)
        .await
        .context("Failed to count products")?;

    Ok(count)
}
