//! Schema Introspection Module
//!
//! Reads a table's live structure from the PostgreSQL catalog. Produces two things:
//! a structural description used for diffing and snapshots, and a reconstructed
//! `CREATE TABLE` style text that is only ever shown to humans.

use crate::db::queries;
use crate::error::{AppError, AppResult};
use crate::events::NormalizedSubject;
use async_trait::async_trait;
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Column attributes that participate in snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ColumnInfo {
    pub fn new(data_type: impl Into<String>, nullable: bool, default: Option<String>) -> Self {
        Self {
            data_type: data_type.into(),
            nullable,
            default,
        }
    }
}

/// Column name -> attributes; declaration order is not significant
pub type TableStructure = BTreeMap<String, ColumnInfo>;

/// One catalog column row, kept in declaration order for rendering
#[derive(Debug, Clone)]
pub struct ColumnDefinition {
    pub name: String,
    pub info: ColumnInfo,
}

/// Result of describing one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub structure: TableStructure,
    pub definition: String,
    /// False when the table was not found in the catalog
    pub exists: bool,
}

impl TableDescription {
    /// The table is gone (typically a DROP racing the lookup)
    pub fn missing(subject: &NormalizedSubject) -> Self {
        Self {
            structure: TableStructure::new(),
            definition: format!(
                "-- Table {} no longer exists; no definition available.",
                subject.qualified()
            ),
            exists: false,
        }
    }

    /// Stand-in used when the catalog could not be queried
    pub fn unavailable(subject: &NormalizedSubject, reason: &str) -> Self {
        Self {
            structure: TableStructure::new(),
            definition: format!(
                "-- Definition of {} is unavailable: {}",
                subject.qualified(),
                reason
            ),
            exists: false,
        }
    }
}

/// Catalog access needed by the relay
#[async_trait]
pub trait Introspector: Send + Sync {
    /// Describe one table. Missing tables are not an error.
    async fn describe(&self, subject: &NormalizedSubject) -> AppResult<TableDescription>;

    /// Names of the live base tables in `schema`
    async fn list_tables(&self, schema: &str) -> AppResult<Vec<String>>;
}

/// Schema introspector for PostgreSQL
pub struct PostgresIntrospector {
    pool: Pool,
}

impl PostgresIntrospector {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Introspector for PostgresIntrospector {
    async fn describe(&self, subject: &NormalizedSubject) -> AppResult<TableDescription> {
        let client = self.pool.get().await.map_err(AppError::introspection)?;
        let params: [&(dyn tokio_postgres::types::ToSql + Sync); 2] = [&subject.schema, &subject.table];

        let present: bool = client
            .query_one(queries::TABLE_EXISTS, &params)
            .await
            .map_err(AppError::introspection)?
            .get("present");
        if !present {
            debug!("{} not found in catalog", subject.qualified());
            return Ok(TableDescription::missing(subject));
        }

        let columns: Vec<ColumnDefinition> = client
            .query(queries::GET_COLUMNS, &params)
            .await
            .map_err(AppError::introspection)?
            .iter()
            .map(|row| ColumnDefinition {
                name: row.get("column_name"),
                info: ColumnInfo {
                    data_type: row.get("data_type"),
                    nullable: row.get("nullable"),
                    default: row.get("column_default"),
                },
            })
            .collect();

        let constraints: Vec<(String, String)> = client
            .query(queries::GET_CONSTRAINTS, &params)
            .await
            .map_err(AppError::introspection)?
            .iter()
            .map(|row| (row.get("constraint_name"), row.get("definition")))
            .collect();

        let indexes: Vec<String> = client
            .query(queries::GET_INDEXES, &params)
            .await
            .map_err(AppError::introspection)?
            .iter()
            .map(|row| row.get("definition"))
            .collect();

        let triggers: Vec<String> = client
            .query(queries::GET_TRIGGERS, &params)
            .await
            .map_err(AppError::introspection)?
            .iter()
            .map(|row| row.get("definition"))
            .collect();

        debug!(
            "Introspected {}: {} columns, {} constraints, {} indexes, {} triggers",
            subject.qualified(),
            columns.len(),
            constraints.len(),
            indexes.len(),
            triggers.len()
        );

        let definition = render_definition(subject, &columns, &constraints, &indexes, &triggers);
        let structure = columns
            .into_iter()
            .map(|column| (column.name, column.info))
            .collect();

        Ok(TableDescription {
            structure,
            definition,
            exists: true,
        })
    }

    async fn list_tables(&self, schema: &str) -> AppResult<Vec<String>> {
        let client = self.pool.get().await.map_err(AppError::introspection)?;
        let rows = client
            .query(queries::LIST_TABLES, &[&schema])
            .await
            .map_err(AppError::introspection)?;
        Ok(rows.iter().map(|row| row.get("table_name")).collect())
    }
}

/// Quote an identifier unless it is already a plain lower-case name
pub fn quote_ident(name: &str) -> String {
    let plain = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$');
    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Build the display-only definition text
pub fn render_definition(
    subject: &NormalizedSubject,
    columns: &[ColumnDefinition],
    constraints: &[(String, String)],
    indexes: &[String],
    triggers: &[String],
) -> String {
    let mut body: Vec<String> = columns
        .iter()
        .map(|column| {
            let mut def = format!("    {} {}", quote_ident(&column.name), column.info.data_type);
            if !column.info.nullable {
                def.push_str(" NOT NULL");
            }
            if let Some(default) = &column.info.default {
                def.push_str(&format!(" DEFAULT {}", default));
            }
            def
        })
        .collect();

    body.extend(
        constraints
            .iter()
            .map(|(name, definition)| format!("    CONSTRAINT {} {}", quote_ident(name), definition)),
    );

    let mut out = format!(
        "CREATE TABLE {}.{} (\n{}\n);",
        quote_ident(&subject.schema),
        quote_ident(&subject.table),
        body.join(",\n")
    );

    for statement in indexes.iter().chain(triggers) {
        out.push_str("\n\n");
        out.push_str(statement.trim_end_matches(';'));
        out.push(';');
    }

    out
}
