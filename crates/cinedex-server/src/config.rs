use std::time::Duration;

use cinedex_app::state::AppConfig;
use cinedex_dal::PoolConfig;
pub use clap::Parser;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, clap::Parser)]
#[command(version, about = "Movie catalog REST service")]
pub struct ServerConfig {
    #[arg(
        short,
        long,
        default_value_t = 8080,
        env = "CINEDEX_LISTEN_PORT",
        help = "Port to listen on"
    )]
    pub port: u16,
    #[arg(
        short,
        long,
        default_value = "127.0.0.1",
        env = "CINEDEX_LISTEN_ADDRESS",
        help = "Address to listen on"
    )]
    pub listen_address: String,

    #[arg(
        long,
        default_value = "development",
        env = "CINEDEX_ENV",
        value_parser = ["development", "staging", "production"],
        help = "Deployment environment, reported by health check"
    )]
    pub env: String,

    #[arg(
        long,
        env = "CINEDEX_DATABASE_URL",
        default_value = "sqlite://cinedex.db",
        help = "Database URL e.g. sqlite://movies.db, the file is created if missing"
    )]
    pub database_url: String,

    #[arg(
        long,
        env = "CINEDEX_DB_MAX_CONNECTIONS",
        default_value_t = 25,
        help = "Maximum number of open database connections"
    )]
    pub db_max_connections: u32,

    #[arg(
        long,
        env = "CINEDEX_DB_MIN_CONNECTIONS",
        default_value_t = 0,
        help = "Number of idle connections kept open"
    )]
    pub db_min_connections: u32,

    #[arg(
        long,
        env = "CINEDEX_DB_IDLE_TIMEOUT",
        default_value = "15m",
        help = "Idle connection is closed after this time (e.g. 15m, 1h)",
        value_parser = humantime::parse_duration
    )]
    pub db_idle_timeout: Duration,

    #[arg(
        long,
        env = "CINEDEX_DB_ACQUIRE_TIMEOUT",
        default_value = "5s",
        help = "Maximum wait for a pooled connection",
        value_parser = humantime::parse_duration
    )]
    pub db_acquire_timeout: Duration,

    #[arg(
        long,
        env = "CINEDEX_QUERY_TIMEOUT",
        default_value = "3s",
        help = "Deadline for each database operation",
        value_parser = humantime::parse_duration
    )]
    pub query_timeout: Duration,

    #[arg(
        long,
        env = "CINEDEX_LOG_FORMAT",
        value_enum,
        default_value_t = LogFormat::Pretty,
        help = "Log output format"
    )]
    pub log_format: LogFormat,

    #[arg(long, env = "CINEDEX_NO_CORS", help = "Disable CORS")]
    pub no_cors: bool,
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        ServerConfig::try_parse().map_err(|e| e.into())
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.db_max_connections,
            min_connections: self.db_min_connections,
            idle_timeout: Some(self.db_idle_timeout),
            acquire_timeout: self.db_acquire_timeout,
        }
    }
}

impl From<&ServerConfig> for AppConfig {
    fn from(config: &ServerConfig) -> Self {
        AppConfig {
            environment: config.env.clone(),
            query_timeout: config.query_timeout,
            ..Default::default()
        }
    }
}
