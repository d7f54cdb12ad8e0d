//! Schema Relay - PostgreSQL schema change notifications for Slack
//!
//! Listens for DDL and row-insert notifications published by database triggers, keeps a
//! snapshot of every table's structure, and posts a message for each created, altered or
//! dropped table (with a column diff for alterations) and for inserts into monitored tables.
//!
//! - Listener: one LISTEN connection with automatic reconnect
//! - Snapshots: stored in the same database, reconciled at startup
//! - Interactivity: "View full" buttons answered on `POST /slack/interactions`

mod actions;
mod config;
mod db;
mod error;
mod events;
mod introspection;
mod notify;
mod pipeline;
mod routes;
mod snapshot;
mod state;
#[cfg(test)]
mod testing;

use crate::actions::ActionRegistry;
use crate::config::Settings;
use crate::events::{Classifier, DedupCache};
use crate::introspection::{Introspector, PostgresIntrospector};
use crate::notify::SlackClient;
use crate::pipeline::{ChangeListener, EventDispatcher, Reconciler, RowNotifier, SchemaOrchestrator};
use crate::routes::create_router;
use crate::snapshot::PgSnapshotStore;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting Schema Relay...");

    let settings = Settings::load()?;
    info!("📋 Configuration loaded successfully");

    let pool = match db::create_pool(&settings.database).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("❌ FATAL: Failed to initialize database pool: {}", e);
            error!("DATABASE_URL must be set in .env and database must be accessible");
            return Err(e.into());
        }
    };

    let snapshots = Arc::new(PgSnapshotStore::new(pool.clone(), &settings.relay.snapshot_table));
    if let Err(e) = snapshots.ensure_schema().await {
        warn!("⚠️  Warning creating snapshot table {}: {}", snapshots.table(), e);
    }

    if settings.relay.install_triggers {
        if let Err(e) = db::install_triggers(&pool, &settings.relay, &settings.monitored_tables).await {
            warn!("⚠️  Could not install notification triggers: {}", e);
        }
    }

    let introspector: Arc<dyn Introspector> = Arc::new(PostgresIntrospector::new(pool.clone()));
    let slack = Arc::new(SlackClient::new(&settings.slack)?);

    let reconciler = Arc::new(Reconciler::new(
        introspector.clone(),
        snapshots.clone(),
        &settings.relay.snapshot_table,
    ));
    match reconciler.reconcile().await {
        Ok(count) => info!("🔄 Startup reconcile refreshed {} snapshots", count),
        Err(e) => error!("❌ Startup reconcile failed: {}", e),
    }
    if let Some(interval) = settings.relay.reconcile_interval {
        info!("🔄 Reconciling every {:?}", interval);
        reconciler.spawn_periodic(interval);
    }

    let dispatcher = Arc::new(EventDispatcher::new(
        &settings.relay,
        Classifier::new(Arc::new(DedupCache::new(settings.relay.dedup_cooldown))),
        SchemaOrchestrator::new(
            introspector.clone(),
            snapshots.clone(),
            slack.clone(),
            &settings.slack.alerts_channel,
            settings.relay.create_settle_delay,
        ),
        RowNotifier::new(Arc::new(settings.monitored_tables.clone()), slack.clone()),
    ));
    info!(
        "👀 Watching schema changes -> #{}, {} monitored table(s)",
        settings.slack.alerts_channel,
        settings.monitored_tables.len()
    );
    tokio::spawn(ChangeListener::new(dispatcher, settings.relay.clone()).run());

    if settings.slack.signing_secret.is_none() {
        warn!("⚠️  SLACK_SIGNING_SECRET not set, interaction requests are not verified");
    }
    let state = Arc::new(AppState::new(
        ActionRegistry::standard(introspector),
        slack,
        settings.slack.signing_secret.clone(),
    ));
    let app = create_router(state);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));
    info!("🌐 Server listening on http://{}", addr);
    info!("   GET  /health              - Liveness check");
    info!("   POST /slack/interactions  - Slack button callbacks");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Relay shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schema_relay=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
