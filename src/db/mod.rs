//! Database layer.
//!
//! This module provides the managed MySQL connection:
//! - Pool lifecycle (connect, startup check, shutdown)
//! - Scoped sessions over pooled connections
//! - Table registry for schema creation

pub mod pool;
pub mod schema;
pub mod session;

pub use pool::{ConnectionManager, LifecycleState};
pub use schema::{ColumnDefinition, TableDefinition, TableRegistry};
pub use session::Session;
