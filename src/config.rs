use std::net::SocketAddr;

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use time::UtcOffset;

use crate::ledger::{LedgerOptions, ReopenPolicy};
use caja_core::Actor;

#[derive(Parser, Debug)]
#[command(name = "caja", about = "Caja - daily cash register ledger")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "caja.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Storage backend (overrides config file)
    #[arg(short, long, value_enum)]
    pub storage: Option<StorageBackend>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// When true, all API endpoints (except /health and /metrics) require authentication.
    #[serde(default)]
    pub enabled: bool,

    /// Static API keys. Each key maps to a cashier or administrator.
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiKeyEntry {
    pub name: String,
    /// Recorded as the actor id. Defaults to `name`.
    #[serde(default)]
    pub user_id: Option<String>,
    pub key: String,
    #[serde(default = "default_role")]
    pub role: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// SQLite database file.
    #[serde(default = "default_sqlite_path")]
    pub path: String,

    /// PostgreSQL connection string.
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default)]
    pub allow_historical_reopen: bool,

    /// Offset used to decide which calendar day "today" is.
    #[serde(default)]
    pub utc_offset_hours: i8,

    #[serde(default = "default_system_actor_name")]
    pub system_actor_name: String,
}

fn default_role() -> String {
    "cashier".to_string()
}

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_log_level(),
        json: false,
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sqlite_path() -> String {
    "caja.db".to_string()
}

fn default_system_actor_name() -> String {
    "auto-close".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Memory,
            path: default_sqlite_path(),
            url: None,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            allow_historical_reopen: false,
            utc_offset_hours: 0,
            system_actor_name: default_system_actor_name(),
        }
    }
}

impl LedgerConfig {
    pub fn options(&self) -> LedgerOptions {
        LedgerOptions {
            reopen_policy: if self.allow_historical_reopen {
                ReopenPolicy::AnyDate
            } else {
                ReopenPolicy::CurrentDayOnly
            },
            system_actor: Actor::system(self.system_actor_name.as_str()),
        }
    }

    pub fn utc_offset(&self) -> UtcOffset {
        UtcOffset::from_hms(self.utc_offset_hours, 0, 0).unwrap_or_else(|_| {
            tracing::warn!(hours = self.utc_offset_hours, "Invalid UTC offset, using UTC");
            UtcOffset::UTC
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            logging: default_logging(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Config::default()
            }),
            Err(_) => Config::default(),
        };

        // CLI overrides
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(ref level) = cli.log_level {
            config.logging.level = level.clone();
        }
        if let Some(backend) = cli.storage {
            config.storage.backend = backend;
        }

        config
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.ledger.options().reopen_policy, ReopenPolicy::CurrentDayOnly);
        assert!(config.ledger.options().system_actor.is_system());
    }

    #[test]
    fn full_file_is_read() {
        let config = Config::parse(
            r#"
            [server]
            port = 8080

            [auth]
            enabled = true
            api_keys = [
                { name = "Ana", user_id = "u-1", key = "k1", role = "admin" },
                { name = "Luis", key = "k2" },
            ]

            [storage]
            backend = "sqlite"
            path = "/tmp/caja.db"

            [ledger]
            allow_historical_reopen = true
            utc_offset_hours = -3
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.api_keys[1].role, "cashier");
        assert_eq!(config.auth.api_keys[0].user_id.as_deref(), Some("u-1"));
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.ledger.options().reopen_policy, ReopenPolicy::AnyDate);
        assert_eq!(config.ledger.utc_offset().whole_hours(), -3);
    }
}
