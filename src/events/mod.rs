//! Change Event Module
//!
//! Everything between the raw notification payload and an actionable decision:
//! - Wire payload parsing (schema channel and row channel)
//! - Subject normalization
//! - Classification and noise filtering
//! - Cooldown-based deduplication

pub mod classifier;
pub mod dedup;
pub mod event;

pub use classifier::{Action, Classifier, IgnoreReason};
pub use dedup::DedupCache;
pub use event::{
    ChangeEvent, ChannelKind, NormalizedSubject, Operation, RowEvent, SchemaEvent, DEFAULT_SCHEMA,
};
