//! Error types for the connection manager.
//!
//! Only the lifecycle failures the manager itself detects get their own variant.
//! Everything the MySQL driver reports is passed through untouched as
//! [`DbError::Sqlx`], so callers can still match on the driver's error kinds.

use sqlx::mysql::MySqlDatabaseError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database startup ping failed: cannot reach MySQL server at {host}:{port}")]
    Startup { host: String, port: u16 },

    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Create a startup error for the given endpoint.
    pub fn startup(host: impl Into<String>, port: u16) -> Self {
        Self::Startup {
            host: host.into(),
            port,
        }
    }

    /// Create a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Get a suggestion for this error, if one applies.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Startup { .. } => {
                Some("Check that the MySQL server is running and the MYSQL_* variables are correct")
            }
            Self::Precondition { .. } => Some("Call connect() or startup() first"),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Startup { .. } => true,
            Self::Sqlx(err) => is_transport_failure(err),
            _ => false,
        }
    }
}

/// MySQL server errors that classify as programming, data, integrity or
/// not-supported failures rather than operational ones.
const PROGRAMMING_ERRORS: &[u16] = &[
    1007, 1064, 1102, 1103, 1110, 1111, 1112, 1113, 1146, 1149, 1166, 1179,
];
const DATA_ERRORS: &[u16] = &[1171, 1230, 1263, 1264, 1265, 1366, 1367, 1406, 1441];
const INTEGRITY_ERRORS: &[u16] = &[1048, 1062, 1215, 1216, 1217, 1451, 1452];
const NOT_SUPPORTED_ERRORS: &[u16] = &[1196, 1235, 1286, 1289];

/// Whether a MySQL server error number is operational.
///
/// Operational covers access denied (1044, 1045), too many connections (1040),
/// unknown database (1049), lock timeouts and every other server error from
/// 1000 up that is not a programming, data, integrity or not-supported error.
/// Numbers below 1000 are internal errors.
pub fn is_operational_code(number: u16) -> bool {
    number >= 1000
        && ![
            PROGRAMMING_ERRORS,
            DATA_ERRORS,
            INTEGRITY_ERRORS,
            NOT_SUPPORTED_ERRORS,
        ]
        .iter()
        .any(|codes| codes.contains(&number))
}

/// Whether a driver error happened below the server: the connection could not
/// be made or was lost.
pub fn is_transport_failure(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// Whether a driver error is an operational failure.
///
/// These are the failures a liveness check reports as "not alive" rather than
/// propagating: transport failures plus server errors that
/// [`is_operational_code`] accepts (bad credentials, unknown database).
/// Syntax, data and constraint errors are not operational.
pub fn is_operational(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .is_some_and(|e| is_operational_code(e.number())),
        other => is_transport_failure(other),
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
