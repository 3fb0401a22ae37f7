//! Data models for the app server.

pub mod connection;

pub use connection::{ConnectionConfig, ConnectionSummary, decode_url_password};
