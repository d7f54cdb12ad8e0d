//! Schema Diff Engine
//!
//! Compares two structural descriptions of the same table. Entries are grouped by change
//! kind (added, removed, type changed) and ordered by column name within each group.

use crate::introspection::TableStructure;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shown when nothing at column level differs
pub const NO_CHANGE_PLACEHOLDER: &str = "No column-level change detected";

/// A single diff entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEntry {
    Added { column: String, data_type: String },
    Removed { column: String },
    TypeChanged { column: String, from: String, to: String },
    /// Informational placeholder when nothing changed
    NoChange,
}

impl fmt::Display for ChangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeEntry::Added { column, data_type } => {
                write!(f, "➕ Added column `{}` ({})", column, data_type)
            }
            ChangeEntry::Removed { column } => write!(f, "➖ Removed column `{}`", column),
            ChangeEntry::TypeChanged { column, from, to } => {
                write!(f, "🔄 Changed type of `{}`: {} → {}", column, from, to)
            }
            ChangeEntry::NoChange => write!(f, "ℹ️ {}", NO_CHANGE_PLACEHOLDER),
        }
    }
}

/// The diff engine that compares table structures
pub struct DiffEngine;

impl DiffEngine {
    /// Never returns an empty list
    pub fn diff(old: &TableStructure, new: &TableStructure) -> Vec<ChangeEntry> {
        let mut changes = Vec::new();

        for (column, info) in new {
            if !old.contains_key(column) {
                changes.push(ChangeEntry::Added {
                    column: column.clone(),
                    data_type: info.data_type.clone(),
                });
            }
        }

        for column in old.keys() {
            if !new.contains_key(column) {
                changes.push(ChangeEntry::Removed {
                    column: column.clone(),
                });
            }
        }

        for (column, before) in old {
            if let Some(after) = new.get(column) {
                if before.data_type != after.data_type {
                    changes.push(ChangeEntry::TypeChanged {
                        column: column.clone(),
                        from: before.data_type.clone(),
                        to: after.data_type.clone(),
                    });
                }
            }
        }

        if changes.is_empty() {
            changes.push(ChangeEntry::NoChange);
        }
        changes
    }

    /// One entry per line, ready to embed in a message
    pub fn render(changes: &[ChangeEntry]) -> String {
        changes
            .iter()
            .map(|c| format!("• {}", c))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
