//! Connection-related data models.
//!
//! [`ConnectionConfig`] is the immutable description of a MySQL endpoint plus the
//! pool tuning passed through to sqlx.

use crate::config::{self, EnvNames};
use serde::Serialize;
use std::time::Duration;
use url::{Url, form_urlencoded};

/// Configuration for the managed database connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub user: String,
    /// Contains sensitive data - never log
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Driver identifier used in the URI scheme, e.g. "aiomysql"
    pub driver: String,
    /// Log every statement
    pub echo: bool,
    /// Connections kept for steady-state load
    pub pool_size: u32,
    /// Extra connections allowed on top of `pool_size` under burst
    pub max_overflow: u32,
    /// Connections older than this are closed and replaced
    pub pool_recycle_secs: u64,
    /// Test a connection before handing it out
    pub pool_pre_ping: bool,
    pub connect_timeout_secs: u64,
    /// Run a liveness check as part of startup
    pub test_on_startup: bool,
}

impl ConnectionConfig {
    /// Create a configuration for the given endpoint with default pool settings.
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            host: host.into(),
            port,
            database: database.into(),
            driver: config::DEFAULT_DRIVER.to_string(),
            echo: config::DEFAULT_ECHO,
            pool_size: config::DEFAULT_POOL_SIZE,
            max_overflow: config::DEFAULT_MAX_OVERFLOW,
            pool_recycle_secs: config::DEFAULT_POOL_RECYCLE_SECS,
            pool_pre_ping: config::DEFAULT_POOL_PRE_PING,
            connect_timeout_secs: config::DEFAULT_CONNECT_TIMEOUT_SECS,
            test_on_startup: config::DEFAULT_TEST_ON_STARTUP,
        }
    }

    /// Read the configuration from the process environment.
    ///
    /// Never fails: anything missing or malformed falls back to its default.
    pub fn from_env(names: &EnvNames) -> Self {
        Self::from_env_lookup(names, |key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_env_lookup<F>(names: &EnvNames, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            user: config::env_string(&lookup, &names.user, config::DEFAULT_USER),
            password: config::env_string(&lookup, &names.password, config::DEFAULT_PASSWORD),
            host: config::env_string(&lookup, &names.host, config::DEFAULT_HOST),
            port: config::env_number(&lookup, &names.port, config::DEFAULT_PORT),
            database: config::env_string(&lookup, &names.database, config::DEFAULT_DATABASE),
            driver: config::env_string(&lookup, &names.driver, config::DEFAULT_DRIVER),
            echo: config::env_flag(&lookup, config::ENV_SQL_ECHO, config::DEFAULT_ECHO),
            pool_size: config::env_number(
                &lookup,
                config::ENV_SQL_POOL_SIZE,
                config::DEFAULT_POOL_SIZE,
            ),
            max_overflow: config::env_number(
                &lookup,
                config::ENV_SQL_MAX_OVERFLOW,
                config::DEFAULT_MAX_OVERFLOW,
            ),
            pool_recycle_secs: config::env_number(
                &lookup,
                config::ENV_SQL_POOL_RECYCLE,
                config::DEFAULT_POOL_RECYCLE_SECS,
            ),
            pool_pre_ping: config::DEFAULT_POOL_PRE_PING,
            connect_timeout_secs: config::env_number(
                &lookup,
                config::ENV_SQL_CONNECT_TIMEOUT,
                config::DEFAULT_CONNECT_TIMEOUT_SECS,
            ),
            test_on_startup: config::env_flag(
                &lookup,
                config::ENV_SQL_TEST_ON_STARTUP,
                config::DEFAULT_TEST_ON_STARTUP,
            ),
        }
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_pool_size(mut self, pool_size: u32, max_overflow: u32) -> Self {
        self.pool_size = pool_size;
        self.max_overflow = max_overflow;
        self
    }

    pub fn with_pool_recycle_secs(mut self, secs: u64) -> Self {
        self.pool_recycle_secs = secs;
        self
    }

    pub fn with_pool_pre_ping(mut self, pre_ping: bool) -> Self {
        self.pool_pre_ping = pre_ping;
        self
    }

    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_test_on_startup(mut self, test_on_startup: bool) -> Self {
        self.test_on_startup = test_on_startup;
        self
    }

    /// Build the connection URI.
    ///
    /// The password is form-urlencoded, so `p@ss/word` becomes `p%40ss%2Fword`.
    pub fn url(&self) -> String {
        let password: String = form_urlencoded::byte_serialize(self.password.as_bytes()).collect();
        self.format_url(&password)
    }

    /// Get a display-safe version of the URI (password masked).
    pub fn masked_url(&self) -> String {
        let password = if self.password.is_empty() { "" } else { "****" };
        self.format_url(password)
    }

    fn format_url(&self, password: &str) -> String {
        format!(
            "mysql+{}://{}:{}@{}:{}/{}",
            self.driver, self.user, password, self.host, self.port, self.database
        )
    }

    /// Upper bound on connections borrowed at once.
    pub fn max_connections(&self) -> u32 {
        self.pool_size.saturating_add(self.max_overflow).max(1)
    }

    pub fn pool_recycle(&self) -> Duration {
        Duration::from_secs(self.pool_recycle_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Safe-to-log summary of this configuration.
    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            url: self.masked_url(),
            driver: self.driver.clone(),
            pool_size: self.pool_size,
            max_overflow: self.max_overflow,
            test_on_startup: self.test_on_startup,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::new(
            config::DEFAULT_USER,
            config::DEFAULT_PASSWORD,
            config::DEFAULT_HOST,
            config::DEFAULT_PORT,
            config::DEFAULT_DATABASE,
        )
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("user", &self.user)
            .field("password", &"****")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("driver", &self.driver)
            .field("echo", &self.echo)
            .field("pool_size", &self.pool_size)
            .field("max_overflow", &self.max_overflow)
            .field("pool_recycle_secs", &self.pool_recycle_secs)
            .field("pool_pre_ping", &self.pool_pre_ping)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("test_on_startup", &self.test_on_startup)
            .finish()
    }
}

/// Connection details that are safe to log or serialize (no secrets exposed).
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSummary {
    pub url: String,
    pub driver: String,
    pub pool_size: u32,
    pub max_overflow: u32,
    pub test_on_startup: bool,
}

/// Extract and decode the password from a URI produced by [`ConnectionConfig::url`].
pub fn decode_url_password(uri: &str) -> Option<String> {
    let url = Url::parse(uri).ok()?;
    let encoded = url.password().unwrap_or_default();
    Some(
        form_urlencoded::parse(encoded.as_bytes())
            .next()
            .map(|(decoded, _)| decoded.into_owned())
            .unwrap_or_default(),
    )
}
