//! Simple App Server Library
//!
//! A small JSON web API hosting a managed MySQL connection: a lazily created
//! pool with startup verification, liveness checks, scoped sessions and
//! schema creation.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use config::Config;
pub use db::ConnectionManager;
pub use error::DbError;
pub use models::ConnectionConfig;
