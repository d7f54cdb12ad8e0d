//! Schema Snapshot Store
//!
//! Durable last-known structure of every tracked table, keyed by `schema.table`.
//! Think of this as the baseline the next ALTER is diffed against.

use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::introspection::{TableDescription, TableStructure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Point-in-time structure of one table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSnapshot {
    /// Fully qualified (`schema.table`)
    pub table_name: String,
    pub columns: TableStructure,
    pub raw_definition: String,
    pub updated_at: DateTime<Utc>,
}

impl TableSnapshot {
    pub fn capture(table_name: impl Into<String>, description: &TableDescription) -> Self {
        Self {
            table_name: table_name.into(),
            columns: description.structure.clone(),
            raw_definition: description.definition.clone(),
            updated_at: Utc::now(),
        }
    }
}

/// get/upsert/delete/list over snapshots; no transactional guarantees beyond single statements
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn get(&self, table_name: &str) -> AppResult<Option<TableSnapshot>>;

    async fn upsert(&self, snapshot: &TableSnapshot) -> AppResult<()>;

    /// Returns whether a row was removed
    async fn delete(&self, table_name: &str) -> AppResult<bool>;

    async fn list_names(&self) -> AppResult<Vec<String>>;
}

/// Snapshot store backed by a PostgreSQL table
pub struct PgSnapshotStore {
    pool: Pool,
    table: String,
}

impl PgSnapshotStore {
    /// `table` must be a validated plain identifier
    pub fn new(pool: Pool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the backing table if it does not exist
    pub async fn ensure_schema(&self) -> AppResult<()> {
        let client = self.pool.get().await.map_err(AppError::persistence)?;
        client
            .batch_execute(&queries::create_snapshot_table(&self.table))
            .await
            .map_err(AppError::persistence)?;
        info!("✅ Snapshot table {} ready", self.table);
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepository for PgSnapshotStore {
    async fn get(&self, table_name: &str) -> AppResult<Option<TableSnapshot>> {
        let client = self.pool.get().await.map_err(AppError::persistence)?;
        let row = client
            .query_opt(queries::get_snapshot(&self.table).as_str(), &[&table_name])
            .await
            .map_err(AppError::persistence)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let columns_data: serde_json::Value = row.get("columns_data");
        let columns: TableStructure = serde_json::from_value(columns_data)
            .map_err(|e| AppError::Persistence(format!("Corrupt columns_data for {}: {}", table_name, e)))?;

        Ok(Some(TableSnapshot {
            table_name: row.get("table_name"),
            columns,
            raw_definition: row.get("raw_sql"),
            updated_at: row.get("updated_at"),
        }))
    }

    async fn upsert(&self, snapshot: &TableSnapshot) -> AppResult<()> {
        let columns_data = serde_json::to_value(&snapshot.columns)?;
        let client = self.pool.get().await.map_err(AppError::persistence)?;
        client
            .execute(
                queries::upsert_snapshot(&self.table).as_str(),
                &[
                    &snapshot.table_name,
                    &columns_data,
                    &snapshot.raw_definition,
                    &snapshot.updated_at,
                ],
            )
            .await
            .map_err(AppError::persistence)?;

        debug!(
            "Saved snapshot for {} ({} columns)",
            snapshot.table_name,
            snapshot.columns.len()
        );
        Ok(())
    }

    async fn delete(&self, table_name: &str) -> AppResult<bool> {
        let client = self.pool.get().await.map_err(AppError::persistence)?;
        let removed = client
            .execute(queries::delete_snapshot(&self.table).as_str(), &[&table_name])
            .await
            .map_err(AppError::persistence)?;
        Ok(removed > 0)
    }

    async fn list_names(&self) -> AppResult<Vec<String>> {
        let client = self.pool.get().await.map_err(AppError::persistence)?;
        let rows = client
            .query(queries::list_snapshot_names(&self.table).as_str(), &[])
            .await
            .map_err(AppError::persistence)?;
        Ok(rows.iter().map(|row| row.get("table_name")).collect())
    }
}
