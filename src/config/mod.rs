//! Runtime settings for the server, the migrator and the groups tool.

mod cli;

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{
    CliArgs, Command, CreateGroupArgs, DatabaseOverride, GroupsArgs, GroupsCommand, MigrateArgs,
    ServeArgs, ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "quillfeed";
const ENV_PREFIX: &str = "QUILLFEED";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_UPLOAD_DIR: &str = "media";
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_CACHE_TTL_SECS: u64 = 20;
const DEFAULT_CACHE_MAX_ENTRIES: u64 = 256;
const DEFAULT_FEED_PAGE_SIZE: u64 = 10;
const DEFAULT_SESSION_COOKIE: &str = "quillfeed_session";
const DEFAULT_SESSION_TTL_HOURS: u64 = 24 * 14;

/// Validated settings; every field has a default.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub uploads: UploadSettings,
    pub cache: CacheSettings,
    pub feed: FeedSettings,
    pub sessions: SessionSettings,
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
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub directory: PathBuf,
    pub max_request_bytes: NonZeroU64,
}

impl UploadSettings {
    /// Loading rejects limits that overflow `usize`.
    pub fn max_request_bytes_usize(&self) -> usize {
        usize::try_from(self.max_request_bytes.get()).unwrap_or(usize::MAX)
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub index_ttl_seconds: NonZeroU32,
    pub max_entries: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub page_size: NonZeroU32,
    pub orphans: u32,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub ttl: Duration,
    pub secure_cookie: bool,
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

/// Merge `config/default`, `quillfeed.*`, an explicit `--config-file`, then
/// `QUILLFEED__*` variables, and finally the subcommand's flags.
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
        Some(Command::Groups(args)) => raw.apply_database_override(&args.database),
        None => {}
    }

    Settings::from_raw(raw)
}

/// Parse process arguments and resolve settings from them.
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
    uploads: RawUploadSettings,
    cache: RawCacheSettings,
    feed: RawFeedSettings,
    sessions: RawSessionSettings,
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
        if let Some(directory) = overrides.uploads_directory.as_ref() {
            self.uploads.directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(ttl) = overrides.cache_index_ttl_seconds {
            self.cache.index_ttl_seconds = Some(ttl);
        }
        if let Some(max) = overrides.cache_max_entries {
            self.cache.max_entries = Some(max);
        }
        if let Some(size) = overrides.feed_page_size {
            self.feed.page_size = Some(size);
        }
        if let Some(secure) = overrides.sessions_secure_cookie {
            self.sessions.secure_cookie = Some(secure);
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
        Ok(Self {
            server: raw.server.try_into()?,
            logging: raw.logging.try_into()?,
            database: raw.database.try_into()?,
            uploads: raw.uploads.try_into()?,
            cache: raw.cache.try_into()?,
            feed: raw.feed.try_into()?,
            sessions: raw.sessions.try_into()?,
        })
    }
}

impl TryFrom<RawServerSettings> for ServerSettings {
    type Error = LoadError;

    fn try_from(raw: RawServerSettings) -> Result<Self, Self::Error> {
        let port = match raw.port.unwrap_or(DEFAULT_PORT) {
            0 => return Err(LoadError::invalid("server.port", "cannot listen on port 0")),
            port => port,
        };
        let host = raw.host.as_deref().unwrap_or(DEFAULT_HOST);
        let addr =
            parse_socket_addr(host, port).map_err(|reason| LoadError::invalid("server.addr", reason))?;

        let grace = raw
            .graceful_shutdown_seconds
            .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
        if grace == 0 {
            return Err(LoadError::invalid(
                "server.graceful_shutdown_seconds",
                "shutdown grace period cannot be zero",
            ));
        }

        Ok(Self {
            addr,
            graceful_shutdown: Duration::from_secs(grace),
        })
    }
}

impl TryFrom<RawLoggingSettings> for LoggingSettings {
    type Error = LoadError;

    fn try_from(raw: RawLoggingSettings) -> Result<Self, Self::Error> {
        let level = raw
            .level
            .as_deref()
            .map(LevelFilter::from_str)
            .transpose()
            .map_err(|err| LoadError::invalid("logging.level", format!("unknown level: {err}")))?
            .unwrap_or(LevelFilter::INFO);
        let format = match raw.json {
            Some(true) => LogFormat::Json,
            _ => LogFormat::Compact,
        };
        Ok(Self { level, format })
    }
}

impl TryFrom<RawDatabaseSettings> for DatabaseSettings {
    type Error = LoadError;

    fn try_from(raw: RawDatabaseSettings) -> Result<Self, Self::Error> {
        // Blank URLs (e.g. an empty env var) count as unset.
        let url = raw
            .url
            .map(|url| url.trim().to_owned())
            .filter(|url| !url.is_empty());
        let pool_size = raw.max_connections.unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
        Ok(Self {
            url,
            max_connections: non_zero_u32(u64::from(pool_size), "database.max_connections")?,
        })
    }
}

impl TryFrom<RawUploadSettings> for UploadSettings {
    type Error = LoadError;

    fn try_from(raw: RawUploadSettings) -> Result<Self, Self::Error> {
        let directory = raw
            .directory
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));
        if directory.as_os_str().is_empty() {
            return Err(LoadError::invalid(
                "uploads.directory",
                "an upload directory is required",
            ));
        }

        let limit = raw
            .max_request_bytes
            .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
        if usize::try_from(limit).is_err() {
            return Err(LoadError::invalid(
                "uploads.max_request_bytes",
                "limit does not fit in memory on this platform",
            ));
        }
        let max_request_bytes = NonZeroU64::new(limit)
            .ok_or_else(|| LoadError::invalid("uploads.max_request_bytes", "limit cannot be zero"))?;

        Ok(Self {
            directory,
            max_request_bytes,
        })
    }
}

impl TryFrom<RawCacheSettings> for CacheSettings {
    type Error = LoadError;

    fn try_from(raw: RawCacheSettings) -> Result<Self, Self::Error> {
        let ttl = raw.index_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
        let entries = raw.max_entries.unwrap_or(DEFAULT_CACHE_MAX_ENTRIES);
        Ok(Self {
            enabled: raw.enabled.unwrap_or(true),
            index_ttl_seconds: non_zero_u32(ttl, "cache.index_ttl_seconds")?,
            max_entries: non_zero_u32(entries, "cache.max_entries")?,
        })
    }
}

impl TryFrom<RawFeedSettings> for FeedSettings {
    type Error = LoadError;

    fn try_from(raw: RawFeedSettings) -> Result<Self, Self::Error> {
        let page_size = non_zero_u32(
            raw.page_size.unwrap_or(DEFAULT_FEED_PAGE_SIZE),
            "feed.page_size",
        )?;
        let orphans = raw.orphans.unwrap_or_default();
        if orphans >= page_size.get() {
            return Err(LoadError::invalid(
                "feed.orphans",
                format!("{orphans} orphans would swallow a whole page of {page_size}"),
            ));
        }
        Ok(Self { page_size, orphans })
    }
}

impl TryFrom<RawSessionSettings> for SessionSettings {
    type Error = LoadError;

    fn try_from(raw: RawSessionSettings) -> Result<Self, Self::Error> {
        let cookie_name = match raw.cookie_name.as_deref().map(str::trim) {
            Some(name) => name.to_owned(),
            None => DEFAULT_SESSION_COOKIE.to_owned(),
        };
        if !is_cookie_token(&cookie_name) {
            return Err(LoadError::invalid(
                "sessions.cookie_name",
                format!("`{cookie_name}` is not a valid cookie name (use letters, digits, `_`, `-`)"),
            ));
        }

        let hours = non_zero_u32(
            raw.ttl_hours.unwrap_or(DEFAULT_SESSION_TTL_HOURS),
            "sessions.ttl_hours",
        )?;

        Ok(Self {
            cookie_name,
            ttl: Duration::from_secs(u64::from(hours.get()) * 60 * 60),
            secure_cookie: raw.secure_cookie.unwrap_or_default(),
        })
    }
}

fn is_cookie_token(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-'))
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
struct RawUploadSettings {
    directory: Option<PathBuf>,
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    index_ttl_seconds: Option<u64>,
    max_entries: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFeedSettings {
    page_size: Option<u64>,
    orphans: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSessionSettings {
    cookie_name: Option<String>,
    ttl_hours: Option<u64>,
    secure_cookie: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    SocketAddr::from_str(&format!("{host}:{port}"))
        .map_err(|err| format!("`{host}` with port {port} is not a socket address: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let narrowed = u32::try_from(value)
        .map_err(|_| LoadError::invalid(key, format!("{value} is larger than {}", u32::MAX)))?;
    NonZeroU32::new(narrowed).ok_or_else(|| LoadError::invalid(key, "zero is not allowed here"))
}
