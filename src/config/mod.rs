//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, MigrateArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "taskflow";
const ENV_PREFIX: &str = "TASKFLOW";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_NOTIFICATIONS_PORT: u16 = 3001;
const DEFAULT_TASKS_PORT: u16 = 3002;
const DEFAULT_USERS_PORT: u16 = 3003;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_TASKS_TTL_SECS: u64 = 60;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const MAX_CACHE_TTL_SECS: u64 = 365 * 24 * 60 * 60;
pub const DEFAULT_CHANNEL: &str = "task-updates";
const DEFAULT_BROADCAST_CAPACITY: usize = 256;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;
const REDIS_SCHEMES: [&str; 4] = ["redis://", "rediss://", "redis+unix://", "unix://"];

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub pubsub: PubSubSettings,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub tasks_addr: SocketAddr,
    pub users_addr: SocketAddr,
    pub notifications_addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    /// Redis URL; the in-process backend is used when absent.
    pub url: Option<String>,
    pub tasks_ttl: Duration,
    pub default_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct PubSubSettings {
    /// Redis URL; the in-process bus is used when absent.
    pub url: Option<String>,
    pub channel: String,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub broadcast_capacity: NonZeroUsize,
    pub reconnect_delay: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        Some(command) => {
            if let Some(args) = command.serve_args() {
                raw.apply_serve_overrides(&args.overrides);
            }
        }
        None => {}
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    pubsub: RawPubSubSettings,
    notifications: RawNotificationSettings,
}

impl RawSettings {
    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.tasks_port {
            self.server.tasks_port = Some(port);
        }
        if let Some(port) = overrides.users_port {
            self.server.users_port = Some(port);
        }
        if let Some(port) = overrides.notifications_port {
            self.server.notifications_port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(url) = overrides.cache_url.as_ref() {
            self.cache.url = Some(url.clone());
        }
        if let Some(ttl) = overrides.cache_tasks_ttl_seconds {
            self.cache.tasks_ttl_seconds = Some(ttl);
        }
        if let Some(url) = overrides.pubsub_url.as_ref() {
            self.pubsub.url = Some(url.clone());
        }
        if let Some(channel) = overrides.pubsub_channel.as_ref() {
            self.pubsub.channel = Some(channel.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            pubsub,
            notifications,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            pubsub: build_pubsub_settings(pubsub)?,
            notifications: build_notification_settings(notifications)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let tasks_addr = listener_addr(
        &host,
        server.tasks_port.unwrap_or(DEFAULT_TASKS_PORT),
        "server.tasks_port",
    )?;
    let users_addr = listener_addr(
        &host,
        server.users_port.unwrap_or(DEFAULT_USERS_PORT),
        "server.users_port",
    )?;
    let notifications_addr = listener_addr(
        &host,
        server
            .notifications_port
            .unwrap_or(DEFAULT_NOTIFICATIONS_PORT),
        "server.notifications_port",
    )?;

    Ok(ServerSettings {
        tasks_addr,
        users_addr,
        notifications_addr,
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(non_blank);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let url = cache.url.and_then(non_blank);
    if let Some(url) = url.as_deref() {
        validate_redis_url(url, "cache.url")?;
    }

    let tasks_ttl = cache_ttl(
        cache.tasks_ttl_seconds.unwrap_or(DEFAULT_TASKS_TTL_SECS),
        "cache.tasks_ttl_seconds",
    )?;
    let default_ttl = cache_ttl(
        cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS),
        "cache.default_ttl_seconds",
    )?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        url,
        tasks_ttl,
        default_ttl,
    })
}

fn build_pubsub_settings(pubsub: RawPubSubSettings) -> Result<PubSubSettings, LoadError> {
    let url = pubsub.url.and_then(non_blank);
    if let Some(url) = url.as_deref() {
        validate_redis_url(url, "pubsub.url")?;
    }

    let channel = match pubsub.channel {
        Some(channel) => non_blank(channel)
            .ok_or_else(|| LoadError::invalid("pubsub.channel", "must not be empty"))?,
        None => DEFAULT_CHANNEL.to_string(),
    };

    Ok(PubSubSettings { url, channel })
}

fn build_notification_settings(
    notifications: RawNotificationSettings,
) -> Result<NotificationSettings, LoadError> {
    let capacity = notifications
        .broadcast_capacity
        .unwrap_or(DEFAULT_BROADCAST_CAPACITY);
    let broadcast_capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
        LoadError::invalid(
            "notifications.broadcast_capacity",
            "must be greater than zero",
        )
    })?;

    let delay_ms = notifications
        .reconnect_delay_ms
        .unwrap_or(DEFAULT_RECONNECT_DELAY_MS);
    if delay_ms == 0 {
        return Err(LoadError::invalid(
            "notifications.reconnect_delay_ms",
            "must be greater than zero",
        ));
    }

    Ok(NotificationSettings {
        broadcast_capacity,
        reconnect_delay: Duration::from_millis(delay_ms),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    tasks_port: Option<u16>,
    users_port: Option<u16>,
    notifications_port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    url: Option<String>,
    tasks_ttl_seconds: Option<u64>,
    default_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPubSubSettings {
    url: Option<String>,
    channel: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawNotificationSettings {
    broadcast_capacity: Option<usize>,
    reconnect_delay_ms: Option<u64>,
}

fn listener_addr(host: &str, port: u16, key: &'static str) -> Result<SocketAddr, LoadError> {
    if port == 0 {
        return Err(LoadError::invalid(key, "port must be greater than zero"));
    }
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| LoadError::invalid(key, format!("invalid address `{candidate}`: {err}")))
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_secs(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(value))
}

fn cache_ttl(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value > MAX_CACHE_TTL_SECS {
        return Err(LoadError::invalid(
            key,
            format!("must be at most {MAX_CACHE_TTL_SECS} seconds"),
        ));
    }
    non_zero_secs(value, key)
}

fn validate_redis_url(url: &str, key: &'static str) -> Result<(), LoadError> {
    if REDIS_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
        Ok(())
    } else {
        Err(LoadError::invalid(
            key,
            format!("`{url}` is not a redis:// or rediss:// URL"),
        ))
    }
}
