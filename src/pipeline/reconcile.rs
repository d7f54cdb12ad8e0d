//! Snapshot reconciliation
//!
//! Brings the snapshot store in line with the live tables of the default schema: stale
//! snapshots are deleted and every live table gets a fresh one. Runs at startup and,
//! when configured, on a fixed interval.

use crate::error::AppResult;
use crate::events::{NormalizedSubject, DEFAULT_SCHEMA};
use crate::introspection::Introspector;
use crate::snapshot::{SnapshotRepository, TableSnapshot};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct Reconciler {
    introspector: Arc<dyn Introspector>,
    snapshots: Arc<dyn SnapshotRepository>,
    /// Never snapshotted itself
    snapshot_table: String,
}

impl Reconciler {
    pub fn new(
        introspector: Arc<dyn Introspector>,
        snapshots: Arc<dyn SnapshotRepository>,
        snapshot_table: impl Into<String>,
    ) -> Self {
        Self {
            introspector,
            snapshots,
            snapshot_table: snapshot_table.into(),
        }
    }

    /// Returns the number of snapshots written
    pub async fn reconcile(&self) -> AppResult<usize> {
        let live: BTreeMap<String, NormalizedSubject> = self
            .introspector
            .list_tables(DEFAULT_SCHEMA)
            .await?
            .into_iter()
            .filter(|table| table != &self.snapshot_table)
            .map(|table| {
                let subject = NormalizedSubject::new(DEFAULT_SCHEMA, table);
                (subject.qualified(), subject)
            })
            .collect();

        for name in self.snapshots.list_names().await? {
            if !live.contains_key(&name) {
                self.snapshots.delete(&name).await?;
                info!("🧹 Removed stale snapshot {}", name);
            }
        }

        let mut written = 0;
        for (name, subject) in &live {
            match self.introspector.describe(subject).await {
                Ok(description) if description.exists => {
                    self.snapshots
                        .upsert(&TableSnapshot::capture(name.clone(), &description))
                        .await?;
                    written += 1;
                }
                Ok(_) => {
                    debug!("{} vanished during reconciliation", name);
                    self.snapshots.delete(name).await?;
                }
                Err(e) => warn!("Skipping {} during reconciliation: {}", name, e),
            }
        }

        Ok(written)
    }

    /// Reconcile every `interval`; the first run happens one interval from now
    pub fn spawn_periodic(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.reconcile().await {
                    Ok(count) => info!("🔄 Periodic reconcile refreshed {} snapshots", count),
                    Err(e) => error!("Periodic reconcile failed: {}", e),
                }
            }
        })
    }
}
