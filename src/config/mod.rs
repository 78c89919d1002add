//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::listing::ListingConfig;

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, MigrateArgs, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "review-service";
const ENV_PREFIX: &str = "REVIEW";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_REDIS_TIMEOUT_MS: u64 = 500;
const DEFAULT_SEARCH_URL: &str = "http://127.0.0.1:9200";
const DEFAULT_SEARCH_INDEX: &str = "review";
const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_LISTING_CACHE_TTL_SECS: u64 = 60;
const DEFAULT_LISTING_PAGE_SIZE: u32 = 10;
const DEFAULT_LISTING_MAX_PAGE_SIZE: u32 = 50;
const DEFAULT_LISTING_MEMORY_ENTRIES: usize = 10_000;
const DEFAULT_NODE_ID: u16 = 1;
pub const MAX_NODE_ID: u16 = 1023;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub search: SearchSettings,
    pub listing: ListingSettings,
    pub ids: IdSettings,
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
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RedisSettings {
    pub url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub url: String,
    pub index: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Redis,
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(CacheBackend::Redis),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(format!("unknown cache backend `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListingSettings {
    pub cache_ttl: NonZeroU64,
    pub default_page_size: NonZeroU32,
    pub max_page_size: NonZeroU32,
    pub cache_backend: CacheBackend,
    /// Page capacity of the in-process cache backend.
    pub memory_entries: NonZeroUsize,
}

impl From<&ListingSettings> for ListingConfig {
    fn from(settings: &ListingSettings) -> Self {
        ListingConfig {
            cache_ttl: Duration::from_secs(settings.cache_ttl.get()),
            default_page_size: settings.default_page_size.get(),
            max_page_size: settings.max_page_size.get(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdSettings {
    pub node_id: u16,
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
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
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
    redis: RawRedisSettings,
    search: RawSearchSettings,
    listing: RawListingSettings,
    ids: RawIdSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);
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
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.redis_url.as_ref() {
            self.redis.url = Some(url.clone());
        }
        if let Some(url) = overrides.search_url.as_ref() {
            self.search.url = Some(url.clone());
        }
        if let Some(index) = overrides.search_index.as_ref() {
            self.search.index = Some(index.clone());
        }
        if let Some(backend) = overrides.listing_cache_backend.as_ref() {
            self.listing.cache_backend = Some(backend.clone());
        }
        if let Some(ttl) = overrides.listing_cache_ttl_seconds {
            self.listing.cache_ttl_seconds = Some(ttl);
        }
        if let Some(node_id) = overrides.ids_node_id {
            self.ids.node_id = Some(node_id);
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
            redis,
            search,
            listing,
            ids,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            redis: build_redis_settings(redis)?,
            search: build_search_settings(search)?,
            listing: build_listing_settings(listing)?,
            ids: build_id_settings(ids)?,
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
    let addr =
        parse_socket_addr(&host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

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
    let acquire_secs = database
        .acquire_timeout_seconds
        .unwrap_or(DEFAULT_DB_ACQUIRE_TIMEOUT_SECS);
    if acquire_secs == 0 {
        return Err(LoadError::invalid(
            "database.acquire_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(DatabaseSettings {
        url,
        max_connections,
        acquire_timeout: Duration::from_secs(acquire_secs),
    })
}

fn build_redis_settings(redis: RawRedisSettings) -> Result<RedisSettings, LoadError> {
    let url = non_blank(redis.url).unwrap_or_else(|| DEFAULT_REDIS_URL.to_string());
    if !url.starts_with("redis://") && !url.starts_with("rediss://") {
        return Err(LoadError::invalid(
            "redis.url",
            format!("`{url}` is not a redis:// or rediss:// URL"),
        ));
    }
    let timeout_ms = redis.timeout_ms.unwrap_or(DEFAULT_REDIS_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "redis.timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(RedisSettings {
        url,
        timeout: Duration::from_millis(timeout_ms),
    })
}

fn build_search_settings(search: RawSearchSettings) -> Result<SearchSettings, LoadError> {
    let url = non_blank(search.url).unwrap_or_else(|| DEFAULT_SEARCH_URL.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(LoadError::invalid(
            "search.url",
            format!("`{url}` is not an http(s) URL"),
        ));
    }
    let index = non_blank(search.index).unwrap_or_else(|| DEFAULT_SEARCH_INDEX.to_string());
    if index.contains('/') {
        return Err(LoadError::invalid(
            "search.index",
            "index name must not contain `/`",
        ));
    }
    let timeout_ms = search.timeout_ms.unwrap_or(DEFAULT_SEARCH_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "search.timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(SearchSettings {
        url: url.trim_end_matches('/').to_string(),
        index,
        timeout: Duration::from_millis(timeout_ms),
    })
}

fn build_listing_settings(listing: RawListingSettings) -> Result<ListingSettings, LoadError> {
    let cache_ttl = NonZeroU64::new(
        listing
            .cache_ttl_seconds
            .unwrap_or(DEFAULT_LISTING_CACHE_TTL_SECS),
    )
    .ok_or_else(|| LoadError::invalid("listing.cache_ttl_seconds", "must be greater than zero"))?;

    let default_page_size = non_zero_u32(
        listing
            .default_page_size
            .unwrap_or(DEFAULT_LISTING_PAGE_SIZE)
            .into(),
        "listing.default_page_size",
    )?;
    let max_page_size = non_zero_u32(
        listing
            .max_page_size
            .unwrap_or(DEFAULT_LISTING_MAX_PAGE_SIZE)
            .into(),
        "listing.max_page_size",
    )?;
    if default_page_size > max_page_size {
        return Err(LoadError::invalid(
            "listing.default_page_size",
            format!("must not exceed listing.max_page_size ({max_page_size})"),
        ));
    }

    let cache_backend = match listing.cache_backend {
        Some(value) => CacheBackend::from_str(&value)
            .map_err(|reason| LoadError::invalid("listing.cache_backend", reason))?,
        None => CacheBackend::Redis,
    };

    let memory_entries = NonZeroUsize::new(
        listing
            .memory_entries
            .unwrap_or(DEFAULT_LISTING_MEMORY_ENTRIES),
    )
    .ok_or_else(|| LoadError::invalid("listing.memory_entries", "must be greater than zero"))?;

    Ok(ListingSettings {
        cache_ttl,
        default_page_size,
        max_page_size,
        cache_backend,
        memory_entries,
    })
}

fn build_id_settings(ids: RawIdSettings) -> Result<IdSettings, LoadError> {
    let node_id = ids.node_id.unwrap_or(DEFAULT_NODE_ID);
    if node_id > MAX_NODE_ID {
        return Err(LoadError::invalid(
            "ids.node_id",
            format!("must be between 0 and {MAX_NODE_ID}"),
        ));
    }
    Ok(IdSettings { node_id })
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
    acquire_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRedisSettings {
    url: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSearchSettings {
    url: Option<String>,
    index: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawListingSettings {
    cache_ttl_seconds: Option<u64>,
    default_page_size: Option<u32>,
    max_page_size: Option<u32>,
    cache_backend: Option<String>,
    memory_entries: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdSettings {
    node_id: Option<u16>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}
