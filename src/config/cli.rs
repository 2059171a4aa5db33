use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

use crate::messaging::QueueName;

/// Command-line arguments for the ITSM binary.
#[derive(Debug, Parser)]
#[command(name = "itsm", version, about = "ITSM service catalogue API and notification worker")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "ITSM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API.
    Serve(Box<ServeArgs>),
    /// Consume a queue and deliver notifications.
    Worker(WorkerArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,

    /// Keep users and services in process memory instead of Postgres.
    #[arg(long = "in-memory", action = clap::ArgAction::SetTrue)]
    pub in_memory: bool,
}

#[derive(Debug, Args, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,

    /// Queue to consume.
    #[arg(long, default_value_t = QueueName::NotificationSend)]
    pub queue: QueueName,

    /// Override what happens to messages whose processing failed (drop|requeue).
    #[arg(long = "failure-policy", value_name = "POLICY")]
    pub failure_policy: Option<String>,
}

/// Overrides shared by every subcommand.
#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
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

    /// Override the broker URL.
    #[arg(long = "messaging-url", value_name = "URL")]
    pub messaging_url: Option<String>,

    /// Override the Slack bot token.
    #[arg(long = "slack-bot-token", env = "SLACK_BOT_TOKEN", value_name = "TOKEN", hide_env_values = true)]
    pub slack_bot_token: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", env = "PORT", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the database connection URL.
    #[arg(long = "database-url", env = "DATABASE_URL", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Toggle the response cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the Redis URL backing the response cache.
    #[arg(long = "cache-redis-url", env = "REDIS_URL", value_name = "URL")]
    pub cache_redis_url: Option<String>,

    /// Override the token signing secret.
    #[arg(long = "auth-secret-key", env = "SECRET_KEY", value_name = "SECRET", hide_env_values = true)]
    pub auth_secret_key: Option<String>,
}
