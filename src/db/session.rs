//! Scoped database sessions.
//!
//! A [`Session`] owns exactly one connection borrowed from the manager's pool.
//! The connection goes back to the pool when the session is dropped, so a
//! session is released on every exit path, including early returns and panics.

use crate::error::DbResult;
use sqlx::mysql::{MySql, MySqlConnection};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, Transaction};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use uuid::Uuid;

/// A unit of work bound to one pooled connection.
pub struct Session {
    id: Uuid,
    conn: PoolConnection<MySql>,
    open_sessions: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(conn: PoolConnection<MySql>, open_sessions: Arc<AtomicUsize>) -> Self {
        let id = Uuid::new_v4();
        let open = open_sessions.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(session_id = %id, open_sessions = open, "Session opened");
        Self {
            id,
            conn,
            open_sessions,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let result = sqlx::query(sql).execute(&mut *self.conn).await?;
        Ok(result.rows_affected())
    }

    /// Fetch a single integer value, e.g. `SELECT COUNT(*) FROM t`.
    pub async fn fetch_scalar_i64(&mut self, sql: &str) -> DbResult<i64> {
        let value = sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(value)
    }

    /// Start a transaction on this session's connection.
    ///
    /// The transaction rolls back if dropped without `commit()`.
    pub async fn begin(&mut self) -> DbResult<Transaction<'_, MySql>> {
        Ok(self.conn.begin().await?)
    }

    /// Raw access to the underlying connection for sqlx queries.
    pub fn connection(&mut self) -> &mut MySqlConnection {
        &mut self.conn
    }

    /// Release the session, returning its connection to the pool.
    pub fn close(self) {}
}

impl Drop for Session {
    fn drop(&mut self) {
        let open = self
            .open_sessions
            .fetch_sub(1, Ordering::AcqRel)
            .saturating_sub(1);
        debug!(session_id = %self.id, open_sessions = open, "Session closed");
    }
}
