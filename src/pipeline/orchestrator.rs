//! Schema change orchestration
//!
//! Turns one accepted (operation, subject) pair into snapshot bookkeeping and one message:
//!
//! - **CREATE**: settle, describe, store the first snapshot, announce with a schema button
//! - **ALTER**: load the baseline, describe, diff, store the new snapshot, announce the diff
//! - **DROP**: forget the snapshot, announce without a button

use crate::error::AppResult;
use crate::events::{NormalizedSubject, Operation};
use crate::introspection::{Introspector, TableDescription};
use crate::notify::{Affordance, MessageSink, OutboundMessage};
use crate::snapshot::{DiffEngine, SnapshotRepository, TableSnapshot};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const NO_BASELINE_NOTE: &str = "ℹ️ No previous snapshot was recorded; the current structure is now the baseline.";
const NO_STRUCTURE_NOTE: &str =
    "ℹ️ No previous snapshot was recorded and the current structure could not be read; no baseline was stored.";
const NO_CURRENT_NOTE: &str = "ℹ️ Current structure could not be read; diff skipped.";

pub struct SchemaOrchestrator {
    introspector: Arc<dyn Introspector>,
    snapshots: Arc<dyn SnapshotRepository>,
    sink: Arc<dyn MessageSink>,
    alerts_channel: String,
    create_settle_delay: Duration,
}

impl SchemaOrchestrator {
    pub fn new(
        introspector: Arc<dyn Introspector>,
        snapshots: Arc<dyn SnapshotRepository>,
        sink: Arc<dyn MessageSink>,
        alerts_channel: impl Into<String>,
        create_settle_delay: Duration,
    ) -> Self {
        Self {
            introspector,
            snapshots,
            sink,
            alerts_channel: alerts_channel.into(),
            create_settle_delay,
        }
    }

    /// Persistence failures abort the message for this event; delivery failures do not
    pub async fn handle(&self, operation: Operation, subject: &NormalizedSubject) -> AppResult<()> {
        match operation {
            Operation::Create => self.on_create(subject).await,
            Operation::Alter => self.on_alter(subject).await,
            Operation::Drop => self.on_drop(subject).await,
        }
    }

    async fn on_create(&self, subject: &NormalizedSubject) -> AppResult<()> {
        if !self.create_settle_delay.is_zero() {
            tokio::time::sleep(self.create_settle_delay).await;
        }

        let description = self.describe(subject).await;
        self.record(subject, &description).await?;

        let text = format!(
            "🆕 *Table Created*\n• *Table:* `{}`\n• *Action:* `{}`",
            subject,
            Operation::Create.command_tag()
        );
        let message = OutboundMessage::new(&self.alerts_channel, text)
            .with_affordance(Affordance::view_schema(subject.qualified()));
        self.deliver(message).await;
        Ok(())
    }

    async fn on_alter(&self, subject: &NormalizedSubject) -> AppResult<()> {
        let previous = self.snapshots.get(&subject.qualified()).await?;
        let description = self.describe(subject).await;

        let changes = match (&previous, description.exists) {
            (Some(previous), true) => {
                DiffEngine::render(&DiffEngine::diff(&previous.columns, &description.structure))
            }
            (None, true) => NO_BASELINE_NOTE.to_string(),
            (None, false) => NO_STRUCTURE_NOTE.to_string(),
            (Some(_), false) => NO_CURRENT_NOTE.to_string(),
        };

        self.record(subject, &description).await?;

        let text = format!(
            "📝 *Schema Change Detected*\n• *Table:* `{}`\n• *Action:* `{}`\n\n*Changes:*\n{}",
            subject,
            Operation::Alter.command_tag(),
            changes
        );
        let message = OutboundMessage::new(&self.alerts_channel, text)
            .with_affordance(Affordance::view_schema(subject.qualified()));
        self.deliver(message).await;
        Ok(())
    }

    async fn on_drop(&self, subject: &NormalizedSubject) -> AppResult<()> {
        if !self.snapshots.delete(&subject.qualified()).await? {
            debug!("No snapshot held for dropped table {}", subject.qualified());
        }

        let text = format!(
            "🗑️ *Table Deleted*\n• *Table:* `{}`\n• *Action:* `{}`",
            subject,
            Operation::Drop.command_tag()
        );
        self.deliver(OutboundMessage::new(&self.alerts_channel, text)).await;
        Ok(())
    }

    /// Introspection failures degrade to a placeholder description
    async fn describe(&self, subject: &NormalizedSubject) -> TableDescription {
        match self.introspector.describe(subject).await {
            Ok(description) => description,
            Err(e) => {
                warn!("⚠️ Could not describe {}: {}", subject.qualified(), e);
                TableDescription::unavailable(subject, &e.to_string())
            }
        }
    }

    /// Only real descriptions replace the stored baseline
    async fn record(&self, subject: &NormalizedSubject, description: &TableDescription) -> AppResult<()> {
        if !description.exists {
            warn!("Snapshot for {} left untouched: structure unavailable", subject.qualified());
            return Ok(());
        }
        self.snapshots
            .upsert(&TableSnapshot::capture(subject.qualified(), description))
            .await
    }

    async fn deliver(&self, message: OutboundMessage) {
        match self.sink.send(&message).await {
            Ok(()) => info!("📣 Sent schema alert to #{}", message.channel),
            Err(e) => warn!("Slack Error (schema): {}", e),
        }
    }
}
