//! Wire payloads delivered by the change source and their normalized subjects.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The single schema the relay tracks without a prefix
pub const DEFAULT_SCHEMA: &str = "public";

/// Which logical stream a notification arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// DDL notifications from the event trigger
    Schema,
    /// Row inserts from per-table triggers
    Row,
}

/// Tracked table DDL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Alter,
    Drop,
}

impl Operation {
    /// Map a PostgreSQL command tag to a tracked operation
    pub fn from_command_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "CREATE TABLE" => Some(Operation::Create),
            "ALTER TABLE" => Some(Operation::Alter),
            "DROP TABLE" => Some(Operation::Drop),
            _ => None,
        }
    }

    pub fn command_tag(&self) -> &'static str {
        match self {
            Operation::Create => "CREATE TABLE",
            Operation::Alter => "ALTER TABLE",
            Operation::Drop => "DROP TABLE",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_tag())
    }
}

/// Payload published on the schema channel
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaEvent {
    #[serde(default)]
    pub command_tag: String,
    #[serde(default)]
    pub object_identity: Option<String>,
    #[serde(default)]
    pub object_name: Option<String>,
    #[serde(default)]
    pub object_type: Option<String>,
}

impl SchemaEvent {
    /// `object_identity` wins over `object_name`; blank values count as absent
    pub fn subject_identifier(&self) -> Option<&str> {
        [self.object_identity.as_deref(), self.object_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

/// Payload published on the row channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RowEvent {
    pub table: String,
    #[serde(default)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// One notification, decoded
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    Schema(SchemaEvent),
    Row(RowEvent),
}

impl ChangeEvent {
    pub fn parse(kind: ChannelKind, payload: &str) -> Result<Self, AppError> {
        Ok(match kind {
            ChannelKind::Schema => ChangeEvent::Schema(serde_json::from_str(payload)?),
            ChannelKind::Row => ChangeEvent::Row(serde_json::from_str(payload)?),
        })
    }
}

/// Canonical `schema.table` identity of a change subject.
///
/// Quote characters, trailing array notation and surrounding whitespace are removed; a missing
/// schema means [`DEFAULT_SCHEMA`]. `Display` omits the default schema so that normalizing
/// the displayed form again yields the same string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedSubject {
    pub schema: String,
    pub table: String,
}

impl NormalizedSubject {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }

    /// Returns `None` when nothing is left after cleaning.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut cleaned: String = raw.chars().filter(|c| *c != '"').collect();
        loop {
            let trimmed = cleaned.trim();
            match trimmed.strip_suffix("[]") {
                Some(rest) => cleaned = rest.to_string(),
                None => {
                    cleaned = trimmed.to_string();
                    break;
                }
            }
        }

        let (schema, table) = match cleaned.split_once('.') {
            Some((schema, table)) => (schema.trim(), table.trim()),
            None => (DEFAULT_SCHEMA, cleaned.as_str()),
        };
        if table.is_empty() {
            return None;
        }
        let schema = if schema.is_empty() { DEFAULT_SCHEMA } else { schema };

        Some(Self::new(schema, table))
    }

    /// Snapshot store key
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }

    pub fn is_default_schema(&self) -> bool {
        self.schema == DEFAULT_SCHEMA
    }
}

impl fmt::Display for NormalizedSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // A dotted table name would re-parse as schema.table
        if self.is_default_schema() && !self.table.contains('.') {
            f.write_str(&self.table)
        } else {
            write!(f, "{}.{}", self.schema, self.table)
        }
    }
}

/// String form of [`NormalizedSubject::parse`]; empty when nothing remains.
pub fn normalize(raw: &str) -> String {
    NormalizedSubject::parse(raw)
        .map(|s| s.to_string())
        .unwrap_or_default()
}
