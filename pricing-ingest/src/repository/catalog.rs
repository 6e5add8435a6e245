//! Parameter catalog queries

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::ingest::catalog::{CatalogParameter, CatalogSource, ControlledValue};

/// Timestamp format SQLite's `datetime()` understands
const SQLITE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// All active parameters, in insertion order
pub async fn active_parameters(pool: &SqlitePool) -> Result<Vec<CatalogParameter>> {
    let rows = sqlx::query(
        "SELECT parameter_id, name, is_pbm_specific FROM parameters
         WHERE is_active = 1
         ORDER BY rowid",
    )
    .fetch_all(pool)
    .await
    .context("Failed to load active parameters")?;

    rows.iter()
        .map(|row| -> Result<CatalogParameter> {
            Ok(CatalogParameter {
                id: row.try_get("parameter_id")?,
                name: row.try_get("name")?,
                is_pbm_specific: row.try_get("is_pbm_specific")?,
            })
        })
        .collect()
}

/// Controlled values of active parameters effective at `at`
pub async fn effective_values(pool: &SqlitePool, at: DateTime<Utc>) -> Result<Vec<ControlledValue>> {
    let at = at.format(SQLITE_TIMESTAMP).to_string();

    let rows = sqlx::query(
        "SELECT pv.parameter_id, pv.value, pv.pbm_id
         FROM parameter_valid_values pv
         JOIN parameters p ON pv.parameter_id = p.parameter_id
         WHERE p.is_active = 1
           AND datetime(pv.effective_from) <= datetime(?)
           AND (pv.effective_to IS NULL OR datetime(pv.effective_to) > datetime(?))
         ORDER BY pv.id",
    )
    .bind(&at)
    .bind(&at)
    .fetch_all(pool)
    .await
    .context("Failed to load controlled values")?;

    rows.iter()
        .map(|row| -> Result<ControlledValue> {
            Ok(ControlledValue {
                parameter_id: row.try_get("parameter_id")?,
                value: row.try_get("value")?,
                pbm_id: row.try_get("pbm_id")?,
            })
        })
        .collect()
}

/// Insert or update a catalog parameter
pub async fn upsert_parameter(
    pool: &SqlitePool,
    parameter_id: &str,
    name: &str,
    is_pbm_specific: bool,
    is_active: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO parameters (parameter_id, name, is_pbm_specific, is_active)
         VALUES (?, ?, ?, ?)
         ON CONFLICT(parameter_id)
         DO UPDATE SET name = excluded.name,
                       is_pbm_specific = excluded.is_pbm_specific,
                       is_active = excluded.is_active",
    )
    .bind(parameter_id)
    .bind(name)
    .bind(is_pbm_specific)
    .bind(is_active)
    .execute(pool)
    .await
    .with_context(|| format!("Failed to save parameter {}", parameter_id))?;

    Ok(())
}

/// Add a controlled value; `pbm_id: None` makes it valid for every PBM
pub async fn add_controlled_value(
    pool: &SqlitePool,
    parameter_id: &str,
    value: &str,
    pbm_id: Option<&str>,
    effective_from: DateTime<Utc>,
    effective_to: Option<DateTime<Utc>>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO parameter_valid_values (parameter_id, value, pbm_id, effective_from, effective_to)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(parameter_id)
    .bind(value)
    .bind(pbm_id)
    .bind(effective_from.format(SQLITE_TIMESTAMP).to_string())
    .bind(effective_to.map(|t| t.format(SQLITE_TIMESTAMP).to_string()))
    .execute(pool)
    .await
    .with_context(|| format!("Failed to add value '{}' for parameter {}", value, parameter_id))?;

    Ok(())
}

/// Catalog source reading the `parameters` tables
#[derive(Debug, Clone)]
pub struct SqliteCatalogSource {
    pool: SqlitePool,
}

impl SqliteCatalogSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogSource for SqliteCatalogSource {
    async fn load_parameters(&self) -> Result<Vec<CatalogParameter>> {
        active_parameters(&self.pool).await
    }

    async fn load_controlled_values(&self) -> Result<Vec<ControlledValue>> {
        effective_values(&self.pool, Utc::now()).await
    }
}
