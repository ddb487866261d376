use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the taskflow binary.
#[derive(Debug, Parser)]
#[command(name = "taskflow", version, about = "Task tracking services")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TASKFLOW_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the tasks, users and notification services in one process.
    Serve(Box<ServeArgs>),
    /// Run only the tasks service.
    Tasks(Box<ServeArgs>),
    /// Run only the users service.
    Users(Box<ServeArgs>),
    /// Run only the notification service.
    Notifications(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
}

impl Command {
    /// Serve overrides carried by the listener-running commands.
    pub fn serve_args(&self) -> Option<&ServeArgs> {
        match self {
            Self::Serve(args) | Self::Tasks(args) | Self::Users(args) | Self::Notifications(args) => {
                Some(args)
            }
            Self::Migrate(_) => None,
        }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host shared by all services.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the tasks service port.
    #[arg(long = "tasks-port", value_name = "PORT")]
    pub tasks_port: Option<u16>,

    /// Override the users service port.
    #[arg(long = "users-port", value_name = "PORT")]
    pub users_port: Option<u16>,

    /// Override the notification service port.
    #[arg(long = "notifications-port", value_name = "PORT")]
    pub notifications_port: Option<u16>,

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

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Toggle the read-through cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the cache Redis URL.
    #[arg(long = "cache-url", value_name = "URL")]
    pub cache_url: Option<String>,

    /// Override the expiry applied to the cached task list.
    #[arg(long = "cache-tasks-ttl-seconds", value_name = "SECONDS")]
    pub cache_tasks_ttl_seconds: Option<u64>,

    /// Override the pub/sub Redis URL.
    #[arg(long = "pubsub-url", value_name = "URL")]
    pub pubsub_url: Option<String>,

    /// Override the change-event channel name.
    #[arg(long = "pubsub-channel", value_name = "NAME")]
    pub pubsub_channel: Option<String>,
}
