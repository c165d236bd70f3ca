use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use serde::Deserialize;

use crate::engine::EngineOptions;

#[derive(Parser, Debug)]
#[command(name = "balance-engine", about = "Balance Engine - trial balances and valued account reports")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "balance-engine.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// SQLite database path; selects the sqlite backend (overrides config file)
    #[arg(short, long)]
    pub database: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub valuation: ValuationConfig,

    #[serde(default)]
    pub reports: ReportsConfig,
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

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Volatile store. The HTTP surface cannot post vouchers, so a server
    /// on this backend only ever serves empty charts; use it in tests.
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageKind,

    #[serde(default = "default_database_path")]
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ValuationConfig {
    #[serde(default = "default_base_currency")]
    pub base_currency: String,

    #[serde(default = "default_dollar_currency")]
    pub dollar_currency: String,

    #[serde(default = "default_rate_type")]
    pub default_rate_type: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    /// Re-check currency totals of every assembled report.
    #[serde(default = "default_true")]
    pub verify_integrity: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageKind::Sqlite,
            path: default_database_path(),
        }
    }
}

impl Default for ValuationConfig {
    fn default() -> Self {
        ValuationConfig {
            base_currency: default_base_currency(),
            dollar_currency: default_dollar_currency(),
            default_rate_type: default_rate_type(),
        }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        ReportsConfig {
            verify_integrity: true,
        }
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

fn default_database_path() -> String {
    "balance-engine.db".to_string()
}

fn default_base_currency() -> String {
    "MXN".to_string()
}

fn default_dollar_currency() -> String {
    "USD".to_string()
}

fn default_rate_type() -> String {
    "FIX".to_string()
}

fn default_true() -> bool {
    true
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
        if let Some(ref path) = cli.database {
            config.storage.backend = StorageKind::Sqlite;
            config.storage.path = path.clone();
        }

        config
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.host, self.server.port).parse()
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            base_currency: Arc::from(self.valuation.base_currency.as_str()),
            dollar_currency: Arc::from(self.valuation.dollar_currency.as_str()),
            default_rate_type: Arc::from(self.valuation.default_rate_type.as_str()),
            verify_integrity: self.reports.verify_integrity,
        }
    }
}
