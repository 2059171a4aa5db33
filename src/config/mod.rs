//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, CommonOverrides, ServeArgs, ServeOverrides, WorkerArgs};

use std::{net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::auth::DEFAULT_TOKEN_TTL_SECS;
use crate::application::users::DEFAULT_BCRYPT_COST;
use crate::cache::DEFAULT_TTL_SECS;
use crate::messaging::FailurePolicy;
use crate::notifications::{DEFAULT_API_BASE, DEFAULT_CHANNEL, SlackSettings};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "itsm";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_BROKER_URL: &str = "amqp://localhost:5672";
const DEFAULT_BROKER_USER: &str = "guest";
const DEFAULT_BROKER_PASSWORD: &str = "guest";
const DEFAULT_CONSUMER_TAG: &str = "itsm-worker";
const DEFAULT_PREFETCH: u16 = 1;
const DEFAULT_ALLOWED_ORIGINS: [&str; 3] = [
    "http://localhost:3001",
    "http://localhost:3002",
    "http://localhost:3000",
];

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub messaging: MessagingSettings,
    pub slack: SlackSettings,
    pub auth: AuthSettings,
    pub cors: CorsSettings,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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
    pub redis_url: Option<Url>,
    pub default_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct MessagingSettings {
    /// Broker URL with credentials applied.
    pub url: Url,
    pub failure_policy: FailurePolicy,
    pub consumer_tag: String,
    pub prefetch: u16,
}

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub secret_key: Option<String>,
    pub token_ttl: Duration,
    pub bcrypt_cost: u32,
}

#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    pub fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
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

    builder = builder.add_source(Environment::with_prefix("ITSM").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Worker(args)) => {
            raw.apply_common_overrides(&args.overrides);
            if let Some(policy) = args.failure_policy.as_ref() {
                raw.messaging.failure_policy = Some(policy.clone());
            }
        }
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
    cache: RawCacheSettings,
    messaging: RawMessagingSettings,
    slack: RawSlackSettings,
    auth: RawAuthSettings,
    cors: RawCorsSettings,
}

impl RawSettings {
    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.format = Some(if json { "json" } else { "compact" }.to_string());
        }
        if let Some(url) = overrides.messaging_url.as_ref() {
            self.messaging.url = Some(url.clone());
        }
        if let Some(token) = overrides.slack_bot_token.as_ref() {
            self.slack.bot_token = Some(token.clone());
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_common_overrides(&overrides.common);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
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
        if let Some(url) = overrides.cache_redis_url.as_ref() {
            self.cache.redis_url = Some(url.clone());
        }
        if let Some(secret) = overrides.auth_secret_key.as_ref() {
            self.auth.secret_key = Some(secret.clone());
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
            messaging,
            slack,
            auth,
            cors,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            messaging: build_messaging_settings(messaging)?,
            slack: build_slack_settings(slack)?,
            auth: build_auth_settings(auth)?,
            cors: build_cors_settings(cors),
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

    let format = match logging.format.as_deref().map(str::trim) {
        None | Some("") | Some("compact") => LogFormat::Compact,
        Some("json") => LogFormat::Json,
        Some(other) => {
            return Err(LoadError::invalid(
                "logging.format",
                format!("expected `compact` or `json`, got `{other}`"),
            ));
        }
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url: non_blank(database.url),
        max_connections: non_zero_u32(max_connections.into(), "database.max_connections")?,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let redis_url = non_blank(cache.redis_url)
        .map(|value| parse_url(&value, "cache.redis_url"))
        .transpose()?;

    let ttl_secs = cache.default_ttl_seconds.unwrap_or(DEFAULT_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "cache.default_ttl_seconds",
            "must be greater than zero",
        ));
    }

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        redis_url,
        default_ttl: Duration::from_secs(ttl_secs),
    })
}

fn build_messaging_settings(
    messaging: RawMessagingSettings,
) -> Result<MessagingSettings, LoadError> {
    let raw_url = non_blank(messaging.url).unwrap_or_else(|| DEFAULT_BROKER_URL.to_string());
    let user = non_blank(messaging.user).unwrap_or_else(|| DEFAULT_BROKER_USER.to_string());
    let password =
        non_blank(messaging.password).unwrap_or_else(|| DEFAULT_BROKER_PASSWORD.to_string());
    let url = with_credentials(parse_url(&raw_url, "messaging.url")?, &user, &password)?;

    let failure_policy = match non_blank(messaging.failure_policy) {
        Some(value) => value
            .parse()
            .map_err(|reason: String| LoadError::invalid("messaging.failure_policy", reason))?,
        None => FailurePolicy::default(),
    };

    let prefetch = messaging.prefetch.unwrap_or(DEFAULT_PREFETCH);
    if prefetch == 0 {
        return Err(LoadError::invalid(
            "messaging.prefetch",
            "must be greater than zero",
        ));
    }

    Ok(MessagingSettings {
        url,
        failure_policy,
        consumer_tag: non_blank(messaging.consumer_tag)
            .unwrap_or_else(|| DEFAULT_CONSUMER_TAG.to_string()),
        prefetch,
    })
}

/// Fills in broker credentials when the URL carries none.
fn with_credentials(mut url: Url, user: &str, password: &str) -> Result<Url, LoadError> {
    if !url.username().is_empty() {
        return Ok(url);
    }
    url.set_username(user)
        .and_then(|()| url.set_password(Some(password)))
        .map_err(|()| LoadError::invalid("messaging.url", "URL cannot carry credentials"))?;
    Ok(url)
}

fn build_slack_settings(slack: RawSlackSettings) -> Result<SlackSettings, LoadError> {
    let api_base = non_blank(slack.api_base_url).unwrap_or_else(|| DEFAULT_API_BASE.to_string());
    let mut api_base_url = parse_url(&api_base, "slack.api_base_url")?;
    // `Url::join` replaces the last segment unless the base ends with a slash.
    if !api_base_url.path().ends_with('/') {
        let path = format!("{}/", api_base_url.path());
        api_base_url.set_path(&path);
    }

    Ok(SlackSettings {
        bot_token: non_blank(slack.bot_token),
        default_channel: non_blank(slack.default_channel)
            .unwrap_or_else(|| DEFAULT_CHANNEL.to_string()),
        api_base_url,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let ttl_secs = auth.token_ttl_seconds.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "auth.token_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let bcrypt_cost = auth.bcrypt_cost.unwrap_or(DEFAULT_BCRYPT_COST);
    if !(4..=31).contains(&bcrypt_cost) {
        return Err(LoadError::invalid(
            "auth.bcrypt_cost",
            "must be between 4 and 31",
        ));
    }

    Ok(AuthSettings {
        secret_key: non_blank(auth.secret_key),
        token_ttl: Duration::from_secs(ttl_secs),
        bcrypt_cost,
    })
}

fn build_cors_settings(cors: RawCorsSettings) -> CorsSettings {
    let allowed_origins = match cors.allowed_origins {
        Some(origins) if !origins.is_empty() => origins,
        _ => DEFAULT_ALLOWED_ORIGINS
            .iter()
            .map(|origin| origin.to_string())
            .collect(),
    };
    CorsSettings { allowed_origins }
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
    format: Option<String>,
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
    redis_url: Option<String>,
    default_ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMessagingSettings {
    url: Option<String>,
    user: Option<String>,
    password: Option<String>,
    failure_policy: Option<String>,
    consumer_tag: Option<String>,
    prefetch: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSlackSettings {
    bot_token: Option<String>,
    default_channel: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    secret_key: Option<String>,
    token_ttl_seconds: Option<u64>,
    bcrypt_cost: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCorsSettings {
    allowed_origins: Option<Vec<String>>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    Url::parse(value).map_err(|err| LoadError::invalid(key, format!("invalid URL `{value}`: {err}")))
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
