//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use uuid::Uuid;

use crate::application::books::PublishFailurePolicy;
use crate::cache::CacheBackend;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "shelfmark";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const MAX_CACHE_TTL_SECS: u64 = 30 * 24 * 60 * 60;
const DEFAULT_CACHE_MEMORY_CAPACITY: usize = 1024;
const DEFAULT_SLOW_OPERATION_MS: u64 = 500;
const DEFAULT_PUBLISH_TIMEOUT_SECS: u64 = 10;
const DEFAULT_COVERS_DIR: &str = "covers";
const DEFAULT_COVERS_BASE_URL: &str = "/covers";
const DEFAULT_MAX_COVER_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_TOKEN_LIFETIME_MINUTES: u64 = 60;
const DEFAULT_TOKEN_ISSUER: &str = "shelfmark";
const MIN_TOKEN_SECRET_LEN: usize = 32;
const DEFAULT_PASSWORD_HASH_COST: u32 = 12;
const PASSWORD_HASH_COST_RANGE: std::ops::RangeInclusive<u32> = 4..=31;

/// Command-line arguments for the shelfmark binary.
#[derive(Debug, Parser)]
#[command(name = "shelfmark", version, about = "Book catalog service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SHELFMARK_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL; omit to keep data in memory.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the cache backend (memory|redis).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the redis connection URL.
    #[arg(long = "cache-redis-url", value_name = "URL")]
    pub cache_redis_url: Option<String>,

    /// Override the default lifetime of cached query results.
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS")]
    pub cache_default_ttl_seconds: Option<u64>,

    /// Override the threshold above which operations are logged as slow.
    #[arg(long = "pipeline-slow-threshold-ms", value_name = "MILLIS")]
    pub pipeline_slow_threshold_ms: Option<u64>,

    /// Override the webhook base URL for change notifications.
    #[arg(long = "messaging-webhook-url", value_name = "URL")]
    pub messaging_webhook_url: Option<String>,

    /// Override the covers directory.
    #[arg(long = "storage-covers-directory", value_name = "PATH")]
    pub storage_covers_directory: Option<PathBuf>,

    /// Override the maximum cover size in bytes.
    #[arg(long = "storage-max-cover-bytes", value_name = "BYTES")]
    pub storage_max_cover_bytes: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub pipeline: PipelineSettings,
    pub messaging: MessagingSettings,
    pub storage: StorageSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
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
    /// `None` keeps all data in process memory.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub default_ttl: Duration,
    pub memory_capacity: NonZeroUsize,
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub slow_operation_threshold: Duration,
}

#[derive(Debug, Clone)]
pub struct MessagingSettings {
    /// `None` writes notifications to the log only.
    pub webhook_url: Option<String>,
    pub timeout: Duration,
    pub on_publish_failure: PublishFailurePolicy,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub covers_directory: PathBuf,
    pub public_base_url: String,
    pub max_cover_bytes: NonZeroU64,
}

#[derive(Clone)]
pub struct AuthSettings {
    pub token_secret: String,
    /// Set when no secret was configured and one was generated for this process.
    pub ephemeral_secret: bool,
    pub token_lifetime: Duration,
    pub issuer: String,
    /// bcrypt work factor for stored password hashes.
    pub password_hash_cost: u32,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("token_secret", &"<redacted>")
            .field("ephemeral_secret", &self.ephemeral_secret)
            .field("token_lifetime", &self.token_lifetime)
            .field("issuer", &self.issuer)
            .field("password_hash_cost", &self.password_hash_cost)
            .finish()
    }
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

    builder = builder.add_source(Environment::with_prefix("SHELFMARK").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    pipeline: RawPipelineSettings,
    messaging: RawMessagingSettings,
    storage: RawStorageSettings,
    auth: RawAuthSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
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
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(ttl) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_seconds = Some(ttl);
        }
        if let Some(threshold) = overrides.pipeline_slow_threshold_ms {
            self.pipeline.slow_threshold_ms = Some(threshold);
        }
        if let Some(url) = overrides.messaging_webhook_url.as_ref() {
            self.messaging.webhook_url = Some(url.clone());
        }
        if let Some(directory) = overrides.storage_covers_directory.as_ref() {
            self.storage.covers_directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.storage_max_cover_bytes {
            self.storage.max_cover_bytes = Some(limit);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
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
            pipeline,
            messaging,
            storage,
            auth,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            pipeline: build_pipeline_settings(pipeline)?,
            messaging: build_messaging_settings(messaging)?,
            storage: build_storage_settings(storage)?,
            auth: build_auth_settings(auth)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
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
    let url = non_blank(database.url);
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
    let backend = match cache.backend.as_deref().map(str::trim) {
        None | Some("") | Some("memory") => CacheBackend::Memory,
        Some("redis") => CacheBackend::Redis,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("unknown backend `{other}` (expected memory or redis)"),
            ));
        }
    };

    let redis_url = non_blank(cache.redis_url);
    if backend == CacheBackend::Redis && redis_url.is_none() {
        return Err(LoadError::invalid(
            "cache.redis_url",
            "required when cache.backend is redis",
        ));
    }

    let ttl_secs = cache.default_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.default_ttl_seconds",
            "must be greater than zero",
        ));
    }
    if ttl_secs > MAX_CACHE_TTL_SECS {
        return Err(LoadError::invalid(
            "cache.default_ttl_seconds",
            format!("must be at most {MAX_CACHE_TTL_SECS} seconds (30 days)"),
        ));
    }

    let memory_capacity = NonZeroUsize::new(
        cache
            .memory_capacity
            .unwrap_or(DEFAULT_CACHE_MEMORY_CAPACITY),
    )
    .ok_or_else(|| LoadError::invalid("cache.memory_capacity", "must be greater than zero"))?;

    Ok(CacheSettings {
        backend,
        default_ttl: Duration::from_secs(ttl_secs),
        memory_capacity,
        redis_url,
    })
}

fn build_pipeline_settings(pipeline: RawPipelineSettings) -> Result<PipelineSettings, LoadError> {
    let threshold_ms = pipeline
        .slow_threshold_ms
        .unwrap_or(DEFAULT_SLOW_OPERATION_MS);
    if threshold_ms == 0 {
        return Err(LoadError::invalid(
            "pipeline.slow_threshold_ms",
            "must be greater than zero",
        ));
    }

    Ok(PipelineSettings {
        slow_operation_threshold: Duration::from_millis(threshold_ms),
    })
}

fn build_messaging_settings(
    messaging: RawMessagingSettings,
) -> Result<MessagingSettings, LoadError> {
    let webhook_url = non_blank(messaging.webhook_url);
    if let Some(url) = webhook_url.as_deref() {
        url::Url::parse(url).map_err(|err| {
            LoadError::invalid("messaging.webhook_url", format!("invalid URL: {err}"))
        })?;
    }

    let timeout_secs = messaging
        .timeout_seconds
        .unwrap_or(DEFAULT_PUBLISH_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "messaging.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let on_publish_failure = match messaging.on_publish_failure.as_deref().map(str::trim) {
        None | Some("") | Some("fail") => PublishFailurePolicy::Fail,
        Some("warn") => PublishFailurePolicy::Warn,
        Some(other) => {
            return Err(LoadError::invalid(
                "messaging.on_publish_failure",
                format!("unknown policy `{other}` (expected fail or warn)"),
            ));
        }
    };

    Ok(MessagingSettings {
        webhook_url,
        timeout: Duration::from_secs(timeout_secs),
        on_publish_failure,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let covers_directory = storage
        .covers_directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_COVERS_DIR));
    if covers_directory.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "storage.covers_directory",
            "path must not be empty",
        ));
    }

    let public_base_url =
        non_blank(storage.public_base_url).unwrap_or_else(|| DEFAULT_COVERS_BASE_URL.to_string());

    let max_cover_bytes_value = storage.max_cover_bytes.unwrap_or(DEFAULT_MAX_COVER_BYTES);
    let max_cover_bytes = NonZeroU64::new(max_cover_bytes_value).ok_or_else(|| {
        LoadError::invalid("storage.max_cover_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_cover_bytes_value).map_err(|_| {
        LoadError::invalid(
            "storage.max_cover_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(StorageSettings {
        covers_directory,
        public_base_url,
        max_cover_bytes,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let (token_secret, ephemeral_secret) = match non_blank(auth.token_secret) {
        Some(secret) if secret.len() < MIN_TOKEN_SECRET_LEN => {
            return Err(LoadError::invalid(
                "auth.token_secret",
                format!("must be at least {MIN_TOKEN_SECRET_LEN} bytes"),
            ));
        }
        Some(secret) => (secret, false),
        None => (
            format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
            true,
        ),
    };

    let lifetime_minutes = auth
        .token_lifetime_minutes
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_MINUTES);
    if lifetime_minutes == 0 {
        return Err(LoadError::invalid(
            "auth.token_lifetime_minutes",
            "must be greater than zero",
        ));
    }

    let password_hash_cost = auth
        .password_hash_cost
        .unwrap_or(DEFAULT_PASSWORD_HASH_COST);
    if !PASSWORD_HASH_COST_RANGE.contains(&password_hash_cost) {
        return Err(LoadError::invalid(
            "auth.password_hash_cost",
            format!(
                "must be between {} and {}",
                PASSWORD_HASH_COST_RANGE.start(),
                PASSWORD_HASH_COST_RANGE.end()
            ),
        ));
    }

    Ok(AuthSettings {
        token_secret,
        ephemeral_secret,
        token_lifetime: Duration::from_secs(lifetime_minutes * 60),
        issuer: non_blank(auth.issuer).unwrap_or_else(|| DEFAULT_TOKEN_ISSUER.to_string()),
        password_hash_cost,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
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
    backend: Option<String>,
    redis_url: Option<String>,
    default_ttl_seconds: Option<u64>,
    memory_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPipelineSettings {
    slow_threshold_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMessagingSettings {
    webhook_url: Option<String>,
    timeout_seconds: Option<u64>,
    on_publish_failure: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    covers_directory: Option<PathBuf>,
    public_base_url: Option<String>,
    max_cover_bytes: Option<u64>,
}

#[derive(Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    token_secret: Option<String>,
    token_lifetime_minutes: Option<u64>,
    issuer: Option<String>,
    password_hash_cost: Option<u32>,
}

impl std::fmt::Debug for RawAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawAuthSettings")
            .field("token_secret", &self.token_secret.as_ref().map(|_| "<redacted>"))
            .field("token_lifetime_minutes", &self.token_lifetime_minutes)
            .field("issuer", &self.issuer)
            .field("password_hash_cost", &self.password_hash_cost)
            .finish()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
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

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
