//! Notification listener
//!
//! Holds one dedicated connection subscribed to the schema and row channels. Notifications
//! are pulled off the connection by a driver task and handled strictly in arrival order.
//! Any connectivity failure, including a handler that panics, tears the session down and
//! the listener reconnects after a fixed backoff.

use super::orchestrator::SchemaOrchestrator;
use super::rows::RowNotifier;
use crate::config::RelayConfig;
use crate::db::make_tls;
use crate::error::{AppError, AppResult};
use crate::events::{Action, ChangeEvent, ChannelKind, Classifier};
use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_postgres::{AsyncMessage, Client, Connection, NoTls};
use tracing::{debug, error, info, warn};

/// A notification lifted off the wire: channel name and raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingNotification {
    pub channel: String,
    pub payload: String,
}

impl PendingNotification {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// Consumes notifications in arrival order
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn dispatch(&self, channel: &str, payload: &str);
}

/// Routes one notification to the schema or row path
pub struct EventDispatcher {
    schema_channel: String,
    row_channel: String,
    classifier: Classifier,
    orchestrator: SchemaOrchestrator,
    rows: RowNotifier,
}

impl EventDispatcher {
    pub fn new(
        relay: &RelayConfig,
        classifier: Classifier,
        orchestrator: SchemaOrchestrator,
        rows: RowNotifier,
    ) -> Self {
        Self {
            schema_channel: relay.schema_channel.clone(),
            row_channel: relay.row_channel.clone(),
            classifier,
            orchestrator,
            rows,
        }
    }

    fn channel_kind(&self, channel: &str) -> Option<ChannelKind> {
        if channel == self.schema_channel {
            Some(ChannelKind::Schema)
        } else if channel == self.row_channel {
            Some(ChannelKind::Row)
        } else {
            None
        }
    }
}

#[async_trait]
impl NotificationHandler for EventDispatcher {
    /// Malformed payloads are logged and dropped
    async fn dispatch(&self, channel: &str, payload: &str) {
        let Some(kind) = self.channel_kind(channel) else {
            warn!("Notification on unexpected channel '{}'", channel);
            return;
        };

        let event = match ChangeEvent::parse(kind, payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Discarding malformed payload on '{}': {}", channel, e);
                return;
            }
        };

        match event {
            ChangeEvent::Schema(event) => match self.classifier.classify(&event) {
                Action::Ignore(reason) => {
                    debug!("Ignoring {} {:?}: {:?}", event.command_tag, event.subject_identifier(), reason);
                }
                Action::Process { subject, operation } => {
                    info!("🔔 {} on {}", operation, subject.qualified());
                    if let Err(e) = self.orchestrator.handle(operation, &subject).await {
                        error!("❌ Failed to process {} on {}: {}", operation, subject.qualified(), e);
                    }
                }
            },
            ChangeEvent::Row(row) => self.rows.handle(&row).await,
        }
    }
}

pub struct ChangeListener {
    dispatcher: Arc<dyn NotificationHandler>,
    config: RelayConfig,
}

impl ChangeListener {
    pub fn new(dispatcher: Arc<dyn NotificationHandler>, config: RelayConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Listen until the process exits
    pub async fn run(self) {
        loop {
            match self.session().await {
                Ok(()) => warn!("🔌 Notification stream ended"),
                Err(e) => warn!("🔌 Connection lost: {}", e),
            }
            info!("Reconnecting in {:?}...", self.config.reconnect_backoff);
            tokio::time::sleep(self.config.reconnect_backoff).await;
        }
    }

    /// One connect / subscribe / consume cycle
    async fn session(&self) -> AppResult<()> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (client, driver) = self.connect(tx).await?;

        let result = self.consume(|| client.is_closed(), &mut rx).await;
        driver.abort();
        result
    }

    async fn connect(&self, tx: mpsc::UnboundedSender<PendingNotification>) -> AppResult<(Client, JoinHandle<()>)> {
        let url = &self.config.listen_url;
        let (client, driver) = if self.config.listen_use_tls {
            let (client, connection) = tokio_postgres::connect(url, make_tls()).await?;
            (client, spawn_driver(connection, tx))
        } else {
            let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
            (client, spawn_driver(connection, tx))
        };

        client
            .batch_execute(&format!(
                "LISTEN {}; LISTEN {};",
                self.config.schema_channel, self.config.row_channel
            ))
            .await?;
        info!(
            "🚀 Listening for '{}' and '{}'",
            self.config.schema_channel, self.config.row_channel
        );
        Ok((client, driver))
    }

    /// Waits up to one poll interval, then drains everything already buffered in order
    async fn consume<F>(&self, is_closed: F, rx: &mut mpsc::UnboundedReceiver<PendingNotification>) -> AppResult<()>
    where
        F: Fn() -> bool,
    {
        loop {
            let first = match tokio::time::timeout(self.config.poll_interval, rx.recv()).await {
                Ok(Some(notification)) => notification,
                Ok(None) => {
                    return Err(AppError::Connectivity("notification stream closed".to_string()));
                }
                Err(_) if is_closed() => {
                    return Err(AppError::Connectivity("connection closed".to_string()));
                }
                Err(_) => continue,
            };

            self.handle(first).await?;
            while let Ok(notification) = rx.try_recv() {
                self.handle(notification).await?;
            }
        }
    }

    /// Runs the dispatch on its own task so a panic surfaces as an error instead of
    /// unwinding through the loop
    async fn handle(&self, notification: PendingNotification) -> AppResult<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            dispatcher
                .dispatch(&notification.channel, &notification.payload)
                .await
        })
        .await
        .map_err(|e| AppError::Connectivity(format!("event handler aborted: {}", e)))
    }
}

/// Drive the connection, forwarding notifications until it fails or the receiver goes away
fn spawn_driver<S, T>(
    mut connection: Connection<S, T>,
    tx: mpsc::UnboundedSender<PendingNotification>,
) -> JoinHandle<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut messages = stream::poll_fn(move |cx| connection.poll_message(cx));
        while let Some(message) = messages.next().await {
            match message {
                Ok(AsyncMessage::Notification(notification)) => {
                    let pending = PendingNotification::new(notification.channel(), notification.payload());
                    if tx.send(pending).is_err() {
                        break;
                    }
                }
                Ok(AsyncMessage::Notice(notice)) => debug!("Server notice: {}", notice.message()),
                Ok(_) => {}
                Err(e) => {
                    warn!("Listener connection error: {}", e);
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MonitoredTableRule, MonitoredTables};
    use crate::events::DedupCache;
    use crate::testing::{structure, FakeIntrospector, MemorySnapshotStore, RecordingSink};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records payloads; panics on `"boom"`
    #[derive(Default)]
    struct ScriptedHandler {
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedHandler {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl NotificationHandler for ScriptedHandler {
        async fn dispatch(&self, _channel: &str, payload: &str) {
            if payload == "boom" {
                panic!("handler failure");
            }
            self.seen.lock().unwrap().push(payload.to_string());
        }
    }

    fn listener(handler: Arc<ScriptedHandler>) -> ChangeListener {
        let config = RelayConfig {
            poll_interval: Duration::from_millis(10),
            ..RelayConfig::default()
        };
        ChangeListener::new(handler, config)
    }

    fn queue(payloads: &[&str]) -> (mpsc::UnboundedSender<PendingNotification>, mpsc::UnboundedReceiver<PendingNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        for payload in payloads {
            tx.send(PendingNotification::new("schema_changes", *payload)).unwrap();
        }
        (tx, rx)
    }

    #[tokio::test]
    async fn test_buffered_notifications_drain_in_order() {
        let handler = Arc::new(ScriptedHandler::default());
        let (tx, mut rx) = queue(&["first", "second", "third"]);
        drop(tx);

        let result = listener(handler.clone()).consume(|| false, &mut rx).await;

        assert_eq!(handler.seen(), vec!["first", "second", "third"]);
        assert!(matches!(result, Err(AppError::Connectivity(msg)) if msg.contains("stream closed")));
    }

    #[tokio::test]
    async fn test_panicking_handler_ends_session_with_connectivity_error() {
        let handler = Arc::new(ScriptedHandler::default());
        let (_tx, mut rx) = queue(&["before", "boom", "after"]);

        let result = listener(handler.clone()).consume(|| false, &mut rx).await;

        assert!(matches!(result, Err(AppError::Connectivity(msg)) if msg.contains("event handler aborted")));
        assert_eq!(handler.seen(), vec!["before"]);

        // The next session picks up where the failed one stopped
        let result = listener(handler.clone()).consume(|| true, &mut rx).await;
        assert!(result.is_err());
        assert_eq!(handler.seen(), vec!["before", "after"]);
    }

    #[tokio::test]
    async fn test_closed_sender_ends_session() {
        let handler = Arc::new(ScriptedHandler::default());
        let (tx, mut rx) = queue(&[]);
        drop(tx);

        let result = listener(handler.clone()).consume(|| false, &mut rx).await;

        assert!(matches!(result, Err(AppError::Connectivity(msg)) if msg.contains("stream closed")));
        assert!(handler.seen().is_empty());
    }

    #[tokio::test]
    async fn test_closed_connection_detected_while_idle() {
        let handler = Arc::new(ScriptedHandler::default());
        let (_tx, mut rx) = queue(&[]);
        let closed = AtomicBool::new(false);

        let listener = listener(handler);
        let consume = listener.consume(|| closed.swap(true, Ordering::SeqCst), &mut rx);
        let result = tokio::time::timeout(Duration::from_secs(5), consume).await.unwrap();

        assert!(matches!(result, Err(AppError::Connectivity(msg)) if msg == "connection closed"));
    }

    struct Harness {
        introspector: Arc<FakeIntrospector>,
        snapshots: Arc<MemorySnapshotStore>,
        sink: Arc<RecordingSink>,
        dispatcher: EventDispatcher,
    }

    fn harness(cooldown: Duration) -> Harness {
        let relay = RelayConfig::default();
        let introspector = Arc::new(FakeIntrospector::default());
        let snapshots = Arc::new(MemorySnapshotStore::default());
        let sink = Arc::new(RecordingSink::default());

        let mut rules = MonitoredTables::new();
        rules.insert(
            "leads".to_string(),
            MonitoredTableRule {
                channel: "sales".to_string(),
                display_column: "email".to_string(),
                label: "New Lead".to_string(),
            },
        );

        let dispatcher = EventDispatcher::new(
            &relay,
            Classifier::new(Arc::new(DedupCache::new(cooldown))),
            SchemaOrchestrator::new(
                introspector.clone(),
                snapshots.clone(),
                sink.clone(),
                "alerts",
                Duration::ZERO,
            ),
            RowNotifier::new(Arc::new(rules), sink.clone()),
        );
        Harness {
            introspector,
            snapshots,
            sink,
            dispatcher,
        }
    }

    #[tokio::test]
    async fn test_create_then_drop() {
        let h = harness(Duration::ZERO);
        h.introspector
            .set_table("public.Orders", structure(&[("id", "integer")]));

        h.dispatcher
            .dispatch(
                "schema_changes",
                r#"{"command_tag":"CREATE TABLE","object_identity":"public.\"Orders\"","object_type":"table"}"#,
            )
            .await;
        assert_eq!(h.snapshots.keys(), vec!["public.Orders"]);

        h.introspector.drop_table("public.Orders");
        h.dispatcher
            .dispatch(
                "schema_changes",
                r#"{"command_tag":"DROP TABLE","object_identity":"public.\"Orders\"","object_type":"table"}"#,
            )
            .await;

        assert!(h.snapshots.keys().is_empty());
        let sent = h.sink.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].text.contains("Table Created"));
        assert!(sent[1].text.contains("Table Deleted"));
    }

    #[tokio::test]
    async fn test_noise_and_duplicates_are_dropped() {
        let h = harness(Duration::from_secs(5));
        h.introspector
            .set_table("public.orders", structure(&[("id", "integer")]));

        let alter = r#"{"command_tag":"ALTER TABLE","object_identity":"public.orders","object_type":"table"}"#;
        h.dispatcher.dispatch("schema_changes", alter).await;
        h.dispatcher.dispatch("schema_changes", alter).await;
        h.dispatcher
            .dispatch(
                "schema_changes",
                r#"{"command_tag":"CREATE INDEX","object_identity":"public.orders_idx","object_type":"index"}"#,
            )
            .await;
        h.dispatcher
            .dispatch(
                "schema_changes",
                r#"{"command_tag":"ALTER TABLE","object_identity":"public.orders_pkey","object_type":"table"}"#,
            )
            .await;

        assert_eq!(h.sink.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_and_foreign_payloads_are_ignored() {
        let h = harness(Duration::from_secs(5));
        h.dispatcher.dispatch("schema_changes", "not json").await;
        h.dispatcher.dispatch("somewhere_else", "{}").await;
        assert!(h.sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_row_notification_routes_to_row_channel() {
        let h = harness(Duration::from_secs(5));
        h.dispatcher
            .dispatch(
                "table_data_updates",
                r#"{"table":"leads","data":{"id":1,"email":"x@y.z"}}"#,
            )
            .await;

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, "sales");
    }
}
