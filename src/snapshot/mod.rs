//! Schema Snapshot Module
//!
//! Detecting what changed in a table. This module provides:
//! - Durable per-table snapshots (the baseline for the next ALTER)
//! - The column diff engine (comparing two structures)

pub mod diff;
pub mod store;

pub use diff::{ChangeEntry, DiffEngine, NO_CHANGE_PLACEHOLDER};
pub use store::{PgSnapshotStore, SnapshotRepository, TableSnapshot};
