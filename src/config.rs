//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.
//! Everything is read once at startup; nothing is reloadable at runtime.

use once_cell::sync::Lazy;
use percent_encoding::percent_decode_str;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_$]*$").expect("static identifier pattern"));

/// Server configuration (interactive callbacks + health)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Railway/Docker
            port: 3000,
        }
    }
}

/// Snapshot store / introspection database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: usize,
    pub use_tls: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            max_pool_size: 10,
            use_tls: false,
        }
    }
}

/// Slack credentials and destinations
#[derive(Debug, Clone)]
pub struct SlackConfig {
    pub bot_token: String,
    pub signing_secret: Option<String>,
    /// Channel receiving schema alerts
    pub alerts_channel: String,
    pub api_base: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            signing_secret: None,
            alerts_channel: "supabase-schema-updates".to_string(),
            api_base: "https://slack.com/api".to_string(),
        }
    }
}

/// Listener and engine tuning
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Connection string used for LISTEN
    pub listen_url: String,
    pub listen_use_tls: bool,
    pub schema_channel: String,
    pub row_channel: String,
    pub snapshot_table: String,
    pub dedup_cooldown: Duration,
    pub create_settle_delay: Duration,
    pub poll_interval: Duration,
    pub reconnect_backoff: Duration,
    pub reconcile_interval: Option<Duration>,
    pub install_triggers: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_url: String::new(),
            listen_use_tls: false,
            schema_channel: "schema_changes".to_string(),
            row_channel: "table_data_updates".to_string(),
            snapshot_table: "schema_snapshots".to_string(),
            dedup_cooldown: Duration::from_secs(5),
            create_settle_delay: Duration::from_millis(500),
            poll_interval: Duration::from_secs(1),
            reconnect_backoff: Duration::from_secs(5),
            reconcile_interval: None,
            install_triggers: false,
        }
    }
}

/// Row-level alert rule for one table
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonitoredTableRule {
    /// Destination Slack channel
    pub channel: String,
    /// Column surfaced as the item's display value
    pub display_column: String,
    /// Message headline
    pub label: String,
}

/// Table name -> rule
pub type MonitoredTables = HashMap<String, MonitoredTableRule>;

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub relay: RelayConfig,
    pub monitored_tables: MonitoredTables,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();

        let server = ServerConfig {
            host: std::env::var("HOST")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or_else(|| ServerConfig::default().port),
        };

        let database_url = std::env::var("DATABASE_URL")
            .or_else(|_| std::env::var("POSTGRES_URL"))
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let database = Self::parse_database_url(&database_url)?;

        let listen_url = std::env::var("LISTEN_DATABASE_URL").unwrap_or_else(|_| database_url.clone());

        let bot_token = std::env::var("SLACK_BOT_TOKEN")
            .map_err(|_| ConfigError::MissingVar("SLACK_BOT_TOKEN".to_string()))?;
        let slack_defaults = SlackConfig::default();
        let slack = SlackConfig {
            bot_token,
            signing_secret: std::env::var("SLACK_SIGNING_SECRET").ok().filter(|s| !s.is_empty()),
            alerts_channel: std::env::var("SLACK_CHANNEL").unwrap_or(slack_defaults.alerts_channel),
            api_base: std::env::var("SLACK_API_BASE").unwrap_or(slack_defaults.api_base),
        };

        let defaults = RelayConfig::default();
        let relay = RelayConfig {
            listen_use_tls: Self::wants_tls(&listen_url),
            listen_url,
            schema_channel: identifier_var("SCHEMA_CHANNEL", defaults.schema_channel)?,
            row_channel: identifier_var("ROW_CHANNEL", defaults.row_channel)?,
            snapshot_table: identifier_var("SNAPSHOT_TABLE", defaults.snapshot_table)?,
            dedup_cooldown: secs_var("DEDUP_COOLDOWN_SECS").unwrap_or(defaults.dedup_cooldown),
            create_settle_delay: std::env::var("CREATE_SETTLE_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.create_settle_delay),
            poll_interval: secs_var("POLL_INTERVAL_SECS").unwrap_or(defaults.poll_interval),
            reconnect_backoff: defaults.reconnect_backoff,
            reconcile_interval: secs_var("RECONCILE_INTERVAL_SECS").filter(|d| !d.is_zero()),
            install_triggers: std::env::var("INSTALL_TRIGGERS")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        };

        let monitored_tables = if let Ok(inline) = std::env::var("MONITORED_TABLES") {
            parse_monitored_tables(&inline)?
        } else if let Ok(path) = std::env::var("MONITORED_TABLES_FILE") {
            let raw = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ParseError(format!("{}: {}", path, e)))?;
            parse_monitored_tables(&raw)?
        } else {
            MonitoredTables::new()
        };

        Ok(Self {
            server,
            database,
            slack,
            relay,
            monitored_tables,
        })
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    fn parse_database_url(url: &str) -> Result<DatabaseConfig, ConfigError> {
        match url::Url::parse(url) {
            Ok(parsed) => {
                let host = parsed.host_str()
                    .ok_or_else(|| ConfigError::InvalidValue("Missing host in DATABASE_URL".to_string()))?
                    .to_string();

                let port = parsed.port().unwrap_or(5432);

                // Url keeps userinfo percent-encoded
                let user = if parsed.username().is_empty() {
                    "postgres".to_string()
                } else {
                    decode_userinfo(parsed.username())?
                };
                let password = match parsed.password() {
                    Some(p) => decode_userinfo(p)?,
                    None => String::new(),
                };

                let database = parsed.path()
                    .trim_start_matches('/')
                    .to_string();
                if database.is_empty() {
                    return Err(ConfigError::InvalidValue(
                        "Missing database name in DATABASE_URL".to_string(),
                    ));
                }

                Ok(DatabaseConfig {
                    use_tls: Self::wants_tls(url),
                    host,
                    port,
                    user,
                    password,
                    database,
                    max_pool_size: std::env::var("DB_MAX_CONNECTIONS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(10),
                })
            }
            Err(_) => Err(ConfigError::InvalidValue(
                "Invalid DATABASE_URL format (expected postgresql://...)".to_string()
            ))
        }
    }

    /// Managed hosts (Neon, Supabase) require TLS
    fn wants_tls(url: &str) -> bool {
        url.contains("sslmode=require")
            || url.contains("neon.tech")
            || url.contains("supabase.co")
            || url.contains("supabase.com")
    }
}

fn decode_userinfo(raw: &str) -> Result<String, ConfigError> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| ConfigError::InvalidValue("DATABASE_URL credentials are not valid UTF-8".to_string()))
}

/// Parse the `MONITORED_TABLES` JSON object: `{"Client": {"channel": ..., "display_column": ..., "label": ...}}`
pub fn parse_monitored_tables(raw: &str) -> Result<MonitoredTables, ConfigError> {
    let rules: MonitoredTables = serde_json::from_str(raw)
        .map_err(|e| ConfigError::ParseError(format!("MONITORED_TABLES: {}", e)))?;

    for (table, rule) in &rules {
        if rule.channel.trim().is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "Monitored table {} has an empty channel",
                table
            )));
        }
    }
    Ok(rules)
}

/// PostgreSQL identifiers must start with a letter or underscore
/// and contain only letters, digits, underscores, and dollar signs
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

fn identifier_var(key: &str, default: String) -> Result<String, ConfigError> {
    let value = std::env::var(key).unwrap_or(default);
    if !is_valid_identifier(&value) {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be a plain identifier, got {:?}",
            key, value
        )));
    }
    Ok(value)
}

fn secs_var(key: &str) -> Option<Duration> {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
}
