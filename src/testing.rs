//! In-memory stand-ins for the database and Slack, shared by unit tests.

use crate::error::{AppError, AppResult};
use crate::events::NormalizedSubject;
use crate::introspection::{
    render_definition, ColumnDefinition, ColumnInfo, Introspector, TableDescription, TableStructure,
};
use crate::notify::{DetailOpener, DetailView, MessageSink, OutboundMessage};
use crate::snapshot::{SnapshotRepository, TableSnapshot};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

pub fn structure(columns: &[(&str, &str)]) -> TableStructure {
    columns
        .iter()
        .map(|(name, ty)| (name.to_string(), ColumnInfo::new(*ty, true, None)))
        .collect()
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<BTreeMap<String, TableSnapshot>>,
    pub fail: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn keys(&self) -> Vec<String> {
        self.snapshots.lock().unwrap().keys().cloned().collect()
    }

    pub fn snapshot(&self, name: &str) -> Option<TableSnapshot> {
        self.snapshots.lock().unwrap().get(name).cloned()
    }

    pub fn seed(&self, name: &str, columns: TableStructure) {
        let snapshot = TableSnapshot {
            table_name: name.to_string(),
            columns,
            raw_definition: String::new(),
            updated_at: chrono::Utc::now(),
        };
        self.snapshots.lock().unwrap().insert(name.to_string(), snapshot);
    }

    fn check(&self) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Persistence("store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepository for MemorySnapshotStore {
    async fn get(&self, table_name: &str) -> AppResult<Option<TableSnapshot>> {
        self.check()?;
        Ok(self.snapshot(table_name))
    }

    async fn upsert(&self, snapshot: &TableSnapshot) -> AppResult<()> {
        self.check()?;
        self.snapshots
            .lock()
            .unwrap()
            .insert(snapshot.table_name.clone(), snapshot.clone());
        Ok(())
    }

    async fn delete(&self, table_name: &str) -> AppResult<bool> {
        self.check()?;
        Ok(self.snapshots.lock().unwrap().remove(table_name).is_some())
    }

    async fn list_names(&self) -> AppResult<Vec<String>> {
        self.check()?;
        Ok(self.keys())
    }
}

/// Catalog keyed by `schema.table`
#[derive(Default)]
pub struct FakeIntrospector {
    tables: Mutex<BTreeMap<String, TableStructure>>,
    pub fail: AtomicBool,
}

impl FakeIntrospector {
    pub fn set_table(&self, qualified: &str, columns: TableStructure) {
        self.tables.lock().unwrap().insert(qualified.to_string(), columns);
    }

    pub fn drop_table(&self, qualified: &str) {
        self.tables.lock().unwrap().remove(qualified);
    }
}

#[async_trait]
impl Introspector for FakeIntrospector {
    async fn describe(&self, subject: &NormalizedSubject) -> AppResult<TableDescription> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Introspection("catalog unreachable".to_string()));
        }
        let Some(structure) = self.tables.lock().unwrap().get(&subject.qualified()).cloned() else {
            return Ok(TableDescription::missing(subject));
        };
        let columns: Vec<ColumnDefinition> = structure
            .iter()
            .map(|(name, info)| ColumnDefinition {
                name: name.clone(),
                info: info.clone(),
            })
            .collect();
        Ok(TableDescription {
            definition: render_definition(subject, &columns, &[], &[], &[]),
            structure,
            exists: true,
        })
    }

    async fn list_tables(&self, schema: &str) -> AppResult<Vec<String>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Introspection("catalog unreachable".to_string()));
        }
        let prefix = format!("{}.", schema);
        Ok(self
            .tables
            .lock()
            .unwrap()
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }
}

/// Records every message and opened view
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<OutboundMessage>>,
    opened: Mutex<Vec<(String, DetailView)>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn opened(&self) -> Vec<(String, DetailView)> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn send(&self, message: &OutboundMessage) -> AppResult<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Sink("channel_not_found".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

#[async_trait]
impl DetailOpener for RecordingSink {
    async fn open_detail(&self, trigger_id: &str, view: &DetailView) -> AppResult<()> {
        self.opened
            .lock()
            .unwrap()
            .push((trigger_id.to_string(), view.clone()));
        Ok(())
    }
}
