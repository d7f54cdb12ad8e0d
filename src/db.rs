//! Database connection management
//!
//! Pooled connections for introspection and the snapshot store, plus the optional
//! installer for the notification triggers.

pub mod queries;

use crate::config::{DatabaseConfig, MonitoredTables, RelayConfig};
use crate::error::{AppError, AppResult};
use crate::introspection::quote_ident;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, info, warn};

/// TLS connector trusting the platform's native roots
pub fn make_tls() -> MakeRustlsConnect {
    let certs = rustls_native_certs::load_native_certs();
    for e in &certs.errors {
        warn!("Skipping unreadable native certificate: {}", e);
    }
    let mut root_store = rustls::RootCertStore::empty();
    for cert in certs.certs {
        root_store.add(cert).ok();
    }

    let tls_config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    MakeRustlsConnect::new(tls_config)
}

/// Create a pool and verify it can reach the server
pub async fn create_pool(config: &DatabaseConfig) -> AppResult<Pool> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_pool_size));

    let pool = if config.use_tls {
        cfg.create_pool(Some(Runtime::Tokio1), make_tls())
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
    }
    .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))?;

    let client = pool.get().await?;
    client.query_one("SELECT 1 as ok", &[]).await?;
    drop(client);

    info!(
        "✅ Database connection successful ({}:{}/{}, TLS: {})",
        config.host, config.port, config.database, config.use_tls
    );
    Ok(pool)
}

/// Install the event triggers feeding the schema channel and, for every monitored table,
/// a row trigger feeding the row channel. Idempotent.
pub async fn install_triggers(pool: &Pool, relay: &RelayConfig, monitored: &MonitoredTables) -> AppResult<()> {
    let client = pool.get().await?;

    client
        .batch_execute(&queries::install_schema_triggers(&relay.schema_channel))
        .await?;
    info!("✅ Schema event triggers publishing on '{}'", relay.schema_channel);

    if monitored.is_empty() {
        return Ok(());
    }

    client
        .batch_execute(&queries::install_row_notify_function(&relay.row_channel))
        .await?;

    for table in monitored.keys() {
        match client
            .batch_execute(&queries::install_row_trigger(&quote_ident(table)))
            .await
        {
            Ok(()) => debug!("Row trigger installed on {}", table),
            Err(e) => warn!("⚠️  Could not install row trigger on {}: {}", table, e),
        }
    }
    info!(
        "✅ Row triggers publishing on '{}' for {} table(s)",
        relay.row_channel,
        monitored.len()
    );
    Ok(())
}
