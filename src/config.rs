//! Configuration handling for the app server.
//!
//! Process-level settings (bind address, logging) come from CLI arguments with
//! environment fallbacks. Database settings come from environment variables only,
//! read once through [`EnvNames`] when the connection manager is built.

use clap::Parser;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";
pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

// Database connection defaults
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_PASSWORD: &str = "";
pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_DATABASE: &str = "app";
pub const DEFAULT_DRIVER: &str = "aiomysql";

// Pool configuration defaults
pub const DEFAULT_ECHO: bool = false;
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_MAX_OVERFLOW: u32 = 10;
pub const DEFAULT_POOL_RECYCLE_SECS: u64 = 1800;
pub const DEFAULT_POOL_PRE_PING: bool = true;
pub const DEFAULT_TEST_ON_STARTUP: bool = true;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

// Fixed pool variable names
pub const ENV_SQL_ECHO: &str = "SQL_ECHO";
pub const ENV_SQL_POOL_SIZE: &str = "SQL_POOL_SIZE";
pub const ENV_SQL_MAX_OVERFLOW: &str = "SQL_MAX_OVERFLOW";
pub const ENV_SQL_POOL_RECYCLE: &str = "SQL_POOL_RECYCLE";
pub const ENV_SQL_TEST_ON_STARTUP: &str = "SQL_TEST_ON_STARTUP";
pub const ENV_SQL_CONNECT_TIMEOUT: &str = "SQL_CONNECT_TIMEOUT";

/// Names of the environment variables holding the connection settings.
///
/// Pool tuning variables (`SQL_*`) are not renameable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvNames {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: String,
    pub database: String,
    /// "aiomysql" or "asyncmy"; only shows up in the connection URI
    pub driver: String,
}

impl Default for EnvNames {
    fn default() -> Self {
        Self {
            user: "MYSQL_USER".to_string(),
            password: "MYSQL_PASSWORD".to_string(),
            host: "MYSQL_HOST".to_string(),
            port: "MYSQL_PORT".to_string(),
            database: "MYSQL_DATABASE".to_string(),
            driver: "MYSQL_DRIVER".to_string(),
        }
    }
}

impl EnvNames {
    /// Use a common prefix instead of `MYSQL`, e.g. `REPLICA` gives `REPLICA_USER`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            user: format!("{prefix}_USER"),
            password: format!("{prefix}_PASSWORD"),
            host: format!("{prefix}_HOST"),
            port: format!("{prefix}_PORT"),
            database: format!("{prefix}_DATABASE"),
            driver: format!("{prefix}_DRIVER"),
        }
    }
}

/// Read a string variable, falling back to `default` when unset.
pub(crate) fn env_string<F>(lookup: &F, key: &str, default: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).unwrap_or_else(|| default.to_string())
}

/// Read a numeric variable. Unset or unparseable values fall back to `default`.
pub(crate) fn env_number<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy,
{
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!(variable = %key, value = %raw, "Unparseable number, using default");
                default
            }
        },
        None => default,
    }
}

/// Read an integer flag: any non-zero integer is on, `0` is off.
///
/// `true`/`false` are accepted too. Anything else falls back to `default`.
pub(crate) fn env_flag<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    let value = raw.trim();
    if let Ok(n) = value.parse::<i64>() {
        return n != 0;
    }
    if value.eq_ignore_ascii_case("true") {
        true
    } else if value.eq_ignore_ascii_case("false") {
        false
    } else {
        warn!(variable = %key, value = %raw, "Unparseable flag, using default");
        default
    }
}

/// Configuration for the app server process.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "simple-app-server",
    about = "Small JSON web API hosting a managed MySQL connection",
    version,
    author
)]
pub struct Config {
    /// HTTP host to bind to
    #[arg(long = "host", default_value = DEFAULT_HTTP_HOST, env = "APP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to
    #[arg(long = "port", default_value_t = DEFAULT_HTTP_PORT, env = "APP_PORT")]
    pub http_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "APP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "APP_JSON_LOGS")]
    pub json_logs: bool,

    /// Create all registered tables after a successful startup
    #[arg(long, env = "APP_CREATE_SCHEMAS")]
    pub create_schemas: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
            create_schemas: false,
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
