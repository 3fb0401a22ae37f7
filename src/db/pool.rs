//! Connection lifecycle management.
//!
//! [`ConnectionManager`] owns at most one MySQL pool. The pool is created lazily
//! from the stored [`ConnectionConfig`] and torn down on shutdown. The hosting
//! process calls [`startup`](ConnectionManager::startup) once before serving
//! traffic and [`shutdown`](ConnectionManager::shutdown) once after draining it.

use crate::db::schema::TableRegistry;
use crate::db::session::Session;
use crate::error::{DbError, DbResult, is_operational};
use crate::models::ConnectionConfig;
use futures_util::future::BoxFuture;
use sqlx::ConnectOptions;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Where a manager is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No pool has been created yet
    Uninitialized,
    /// A pool exists but has not been checked
    Connected,
    /// A pool exists and answered a liveness check
    Verified,
    /// The pool was closed; `connect()` creates a fresh one
    Disposed,
}

impl LifecycleState {
    /// Check if a pool currently exists.
    pub fn has_pool(&self) -> bool {
        matches!(self, Self::Connected | Self::Verified)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Connected => write!(f, "connected"),
            Self::Verified => write!(f, "verified"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

#[derive(Debug)]
struct PoolSlot {
    pool: Option<MySqlPool>,
    state: LifecycleState,
    /// Number of pools created over the manager's lifetime
    generation: u64,
}

#[derive(Debug)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    registry: TableRegistry,
    slot: RwLock<PoolSlot>,
    open_sessions: Arc<AtomicUsize>,
}

impl ConnectionManager {
    /// Create a manager. No network connection is opened.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_registry(config, TableRegistry::default())
    }

    /// Create a manager that creates the given tables in [`create_all`](Self::create_all).
    pub fn with_registry(config: ConnectionConfig, registry: TableRegistry) -> Self {
        Self {
            config,
            registry,
            slot: RwLock::new(PoolSlot {
                pool: None,
                state: LifecycleState::Uninitialized,
                generation: 0,
            }),
            open_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a manager from the `MYSQL_*` / `SQL_*` environment variables.
    pub fn from_env() -> Self {
        Self::new(ConnectionConfig::from_env(&Default::default()))
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn registry(&self) -> &TableRegistry {
        &self.registry
    }

    pub fn url(&self) -> String {
        self.config.url()
    }

    /// Create the pool if none exists. Idempotent.
    ///
    /// The pool connects lazily, so this never touches the network; connection
    /// errors surface on first use.
    pub async fn connect(&self) {
        self.install_pool().await;
    }

    /// Connect and, if `test_on_startup` is set, verify the server answers.
    ///
    /// A failed check closes the pool again before returning, so a failed
    /// startup never leaves a pool behind.
    pub async fn startup(&self) -> DbResult<()> {
        self.connect().await;

        if !self.config.test_on_startup {
            info!(url = %self.config.masked_url(), "Database connected (startup check disabled)");
            return Ok(());
        }

        match self.ping().await {
            Ok(true) => {
                info!(url = %self.config.masked_url(), "Database startup check passed");
                Ok(())
            }
            Ok(false) => {
                self.disconnect().await;
                Err(DbError::startup(&self.config.host, self.config.port))
            }
            Err(e) => {
                self.disconnect().await;
                Err(e)
            }
        }
    }

    /// Run `SELECT 1` on a pooled connection.
    ///
    /// Returns `Ok(false)` for connectivity failures (see [`is_operational`]);
    /// any other driver error is returned as-is.
    pub async fn ping(&self) -> DbResult<bool> {
        let pool = self.ensure_pool().await;

        let result = match pool.acquire().await {
            Ok(mut conn) => sqlx::query("SELECT 1").execute(&mut *conn).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(_) => {
                let mut slot = self.slot.write().await;
                if slot.state == LifecycleState::Connected {
                    slot.state = LifecycleState::Verified;
                }
                debug!("Ping succeeded");
                Ok(true)
            }
            Err(e) if is_operational(&e) => {
                warn!(error = %e, host = %self.config.host, port = self.config.port, "Ping failed");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Close the pool if one exists. Idempotent.
    pub async fn disconnect(&self) {
        let pool = {
            let mut slot = self.slot.write().await;
            let pool = slot.pool.take();
            if pool.is_some() {
                slot.state = LifecycleState::Disposed;
            }
            pool
        }; // Lock released here

        match pool {
            Some(pool) => {
                info!(url = %self.config.masked_url(), "Closing connection pool");
                pool.close().await;
                info!("Connection pool closed");
            }
            None => debug!("Disconnect requested with no pool, nothing to do"),
        }
    }

    /// Alias for [`disconnect`](Self::disconnect), called by the host on shutdown.
    pub async fn shutdown(&self) {
        self.disconnect().await;
    }

    /// Acquire a session bound to one pooled connection, connecting if needed.
    ///
    /// The connection is returned to the pool when the session is dropped.
    pub async fn session(&self) -> DbResult<Session> {
        let pool = self.ensure_pool().await;
        let conn = pool.acquire().await?;
        Ok(Session::new(conn, Arc::clone(&self.open_sessions)))
    }

    /// Run `work` with a fresh session and close the session afterwards,
    /// whether `work` succeeds or fails.
    ///
    /// ```ignore
    /// let count = manager
    ///     .with_session(|s| Box::pin(async move { s.fetch_scalar_i64("SELECT COUNT(*) FROM users").await }))
    ///     .await?;
    /// ```
    pub async fn with_session<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T, E>>,
        E: From<DbError>,
    {
        let mut session = self.session().await.map_err(E::from)?;
        let result = work(&mut session).await;
        session.close();
        result
    }

    /// Create every registered table in one transaction.
    ///
    /// Requires an existing pool; this does not connect on its own.
    pub async fn create_all(&self) -> DbResult<()> {
        let pool = self
            .slot
            .read()
            .await
            .pool
            .clone()
            .ok_or_else(|| DbError::precondition("Call connect() first."))?;

        let mut tx = pool.begin().await?;
        for table in self.registry.tables() {
            let ddl = table.create_statement();
            debug!(table = %table.name, "Creating table");
            sqlx::raw_sql(&ddl).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!(tables = self.registry.len(), "Created registered tables");
        Ok(())
    }

    pub async fn state(&self) -> LifecycleState {
        self.slot.read().await.state
    }

    pub async fn is_connected(&self) -> bool {
        self.slot.read().await.pool.is_some()
    }

    /// Number of pools created so far.
    pub async fn pool_generation(&self) -> u64 {
        self.slot.read().await.generation
    }

    /// Number of sessions currently open.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::Acquire)
    }

    /// Return the current pool, creating it first if there is none.
    async fn ensure_pool(&self) -> MySqlPool {
        if let Some(pool) = self.slot.read().await.pool.clone() {
            return pool;
        }
        self.install_pool().await
    }

    async fn install_pool(&self) -> MySqlPool {
        let mut slot = self.slot.write().await;
        if let Some(pool) = &slot.pool {
            debug!("Connection pool already exists");
            return pool.clone();
        }

        let pool = self.create_pool();
        slot.pool = Some(pool.clone());
        slot.state = LifecycleState::Connected;
        slot.generation += 1;

        info!(
            url = %self.config.masked_url(),
            max_connections = self.config.max_connections(),
            pool_recycle_secs = self.config.pool_recycle_secs,
            generation = slot.generation,
            "Created connection pool"
        );
        pool
    }

    /// Build a lazy pool from the stored configuration.
    fn create_pool(&self) -> MySqlPool {
        let config = &self.config;

        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .database(&config.database)
            .charset("utf8mb4");
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        if !config.echo {
            options = options.disable_statement_logging();
        }

        MySqlPoolOptions::new()
            .min_connections(0)
            .max_connections(config.max_connections())
            .max_lifetime(config.pool_recycle())
            .test_before_acquire(config.pool_pre_ping)
            .acquire_timeout(config.connect_timeout())
            .connect_lazy_with(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::{ColumnDefinition, TableDefinition};

    /// Nothing listens on port 1, so every connection attempt is refused.
    fn unreachable_config() -> ConnectionConfig {
        ConnectionConfig::new("root", "", "127.0.0.1", 1, "app").with_connect_timeout_secs(1)
    }

    #[tokio::test]
    async fn test_new_opens_nothing() {
        let manager = ConnectionManager::new(unreachable_config());
        assert_eq!(manager.state().await, LifecycleState::Uninitialized);
        assert!(!manager.is_connected().await);
        assert_eq!(manager.pool_generation().await, 0);
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let manager = ConnectionManager::new(unreachable_config());
        manager.connect().await;
        manager.connect().await;
        assert!(manager.is_connected().await);
        assert_eq!(manager.pool_generation().await, 1);
        assert_eq!(manager.state().await, LifecycleState::Connected);
        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let manager = ConnectionManager::new(unreachable_config());
        manager.disconnect().await;
        assert_eq!(manager.state().await, LifecycleState::Uninitialized);

        manager.connect().await;
        manager.disconnect().await;
        manager.disconnect().await;
        manager.shutdown().await;
        assert_eq!(manager.state().await, LifecycleState::Disposed);
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_ping_unreachable_returns_false() {
        let manager = ConnectionManager::new(unreachable_config());
        let alive = manager.ping().await.unwrap();
        assert!(!alive);
        // ping connects lazily
        assert!(manager.is_connected().await);
        assert_eq!(manager.state().await, LifecycleState::Connected);
        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_failed_startup_rolls_back_and_allows_reconnect() {
        let manager = ConnectionManager::new(unreachable_config());

        let result = manager.startup().await;
        assert!(matches!(result, Err(DbError::Startup { port: 1, .. })));
        assert!(!manager.is_connected().await);
        assert_eq!(manager.state().await, LifecycleState::Disposed);

        manager.connect().await;
        assert!(manager.is_connected().await);
        assert_eq!(manager.pool_generation().await, 2);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_startup_without_check_only_connects() {
        let manager =
            ConnectionManager::new(unreachable_config().with_test_on_startup(false));
        manager.startup().await.unwrap();
        assert_eq!(manager.state().await, LifecycleState::Connected);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_create_all_requires_connect() {
        let registry = TableRegistry::new()
            .with_table(TableDefinition::new("items").column(ColumnDefinition::new("id", "INT")));
        let manager = ConnectionManager::with_registry(unreachable_config(), registry);

        let result = manager.create_all().await;
        assert!(matches!(result, Err(DbError::Precondition { .. })));
        // Must not connect as a side effect
        assert!(!manager.is_connected().await);
    }

    #[tokio::test]
    async fn test_create_all_propagates_driver_errors() {
        let manager = ConnectionManager::new(unreachable_config());
        manager.connect().await;
        let result = manager.create_all().await;
        assert!(matches!(result, Err(DbError::Sqlx(_))));
        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_session_acquire_failure_leaves_no_open_session() {
        let manager = ConnectionManager::new(unreachable_config());
        let result = manager.session().await;
        assert!(matches!(&result, Err(DbError::Sqlx(e)) if is_operational(e)));
        assert_eq!(manager.open_sessions(), 0);
        manager.disconnect().await;
    }

    #[tokio::test]
    async fn test_with_session_reports_acquire_failure() {
        let manager = ConnectionManager::new(unreachable_config());
        let result: DbResult<i64> = manager
            .with_session(|s| Box::pin(async move { s.fetch_scalar_i64("SELECT 1").await }))
            .await;
        assert!(result.is_err());
        assert_eq!(manager.open_sessions(), 0);
        manager.disconnect().await;
    }

    #[test]
    fn test_lifecycle_state_display() {
        assert_eq!(LifecycleState::Verified.to_string(), "verified");
        assert!(LifecycleState::Connected.has_pool());
        assert!(!LifecycleState::Disposed.has_pool());
    }
}
