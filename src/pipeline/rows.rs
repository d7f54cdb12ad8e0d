//! Row insert notifications for configured tables.

use crate::config::MonitoredTables;
use crate::events::RowEvent;
use crate::notify::{Affordance, MessageSink, OutboundMessage};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shown when the display column is absent or null
const MISSING_DISPLAY_VALUE: &str = "N/A";

pub struct RowNotifier {
    rules: Arc<MonitoredTables>,
    sink: Arc<dyn MessageSink>,
}

impl RowNotifier {
    pub fn new(rules: Arc<MonitoredTables>, sink: Arc<dyn MessageSink>) -> Self {
        Self { rules, sink }
    }

    /// Build the message for `event`, or `None` when its table is not monitored
    pub fn compose(&self, event: &RowEvent) -> Option<OutboundMessage> {
        let rule = self.rules.get(&event.table)?;

        let item = match event.data.get(&rule.display_column) {
            None | Some(Value::Null) => MISSING_DISPLAY_VALUE.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        let text = format!(
            "✨ *{}*\n• *Item:* `{}`\n• *Table:* `{}`",
            rule.label, item, event.table
        );
        let message = OutboundMessage::new(&rule.channel, text);

        let affordance = match serde_json::to_string(event) {
            Ok(json) => Affordance::view_row(json),
            Err(e) => {
                warn!("Could not serialize row from {}: {}", event.table, e);
                return Some(message);
            }
        };
        if !affordance.fits() {
            warn!(
                "Row from {} too large for a detail button ({} chars); sending without it",
                event.table,
                affordance.value.chars().count()
            );
            return Some(message);
        }
        Some(message.with_affordance(affordance))
    }

    pub async fn handle(&self, event: &RowEvent) {
        let Some(message) = self.compose(event) else {
            debug!("Ignoring row from unmonitored table {}", event.table);
            return;
        };

        match self.sink.send(&message).await {
            Ok(()) => info!("📣 Sent row alert for {} to #{}", event.table, message.channel),
            Err(e) => warn!("Slack Error (data): {}", e),
        }
    }
}
