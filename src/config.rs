use std::net::SocketAddr;

use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug)]
#[command(name = "coindb", about = "CoinDB - Player balance database for game servers")]
pub struct CliArgs {
    /// Path to config file
    #[arg(short, long, default_value = "coindb.toml")]
    pub config: String,

    /// Port to listen on (overrides config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (overrides config file)
    #[arg(short, long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub currency: CurrencyConfig,

    #[serde(default)]
    pub auth: AuthConfig,
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

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sqlite,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// SQLite database file, or ":memory:".
    #[serde(default = "default_sqlite_path")]
    pub path: String,

    /// PostgreSQL connection string, used when backend = "postgres".
    #[serde(default = "default_postgres_connection")]
    pub connection: String,

    #[serde(default = "default_table")]
    pub table: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CurrencyConfig {
    #[serde(default = "default_currency_name")]
    pub name: String,

    #[serde(default = "default_currency_symbol")]
    pub symbol: String,

    /// Thousands separator used when formatting amounts for display.
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Balance given to newly created accounts.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: u64,

    /// Upper bound applied to increments and sets. No cap when absent.
    #[serde(default)]
    pub cap: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthConfig {
    /// When true, all API endpoints (except /health) require authentication.
    #[serde(default)]
    pub enabled: bool,

    /// Static API keys. Each key has a name (for audit) and a role.
    #[serde(default)]
    pub api_keys: Vec<ApiKeyEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiKeyEntry {
    pub name: String,
    pub key: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "reader".to_string()
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

fn default_backend() -> BackendKind {
    BackendKind::Sqlite
}

fn default_sqlite_path() -> String {
    "coindb.sqlite".to_string()
}

fn default_postgres_connection() -> String {
    "host=localhost user=postgres".to_string()
}

fn default_table() -> String {
    "players".to_string()
}

fn default_currency_name() -> String {
    "Coins".to_string()
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_separator() -> String {
    ",".to_string()
}

fn default_starting_balance() -> u64 {
    1000
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: default_backend(),
            path: default_sqlite_path(),
            connection: default_postgres_connection(),
            table: default_table(),
        }
    }
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        CurrencyConfig {
            name: default_currency_name(),
            symbol: default_currency_symbol(),
            separator: default_separator(),
            starting_balance: default_starting_balance(),
            cap: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            logging: default_logging(),
            storage: StorageConfig::default(),
            currency: CurrencyConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    pub fn load(cli: &CliArgs) -> Self {
        let mut config = match std::fs::read_to_string(&cli.config) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
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

        config
    }

    pub fn listen_addr(&self) -> SocketAddr {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .expect("Invalid listen address")
    }
}
