//! Database access for the SQL runner.
//!
//! This crate provides a single-connection MySQL session using sqlx. Tables
//! are addressed through the `#_` prefix placeholder.

mod config;
mod connection;
mod session;
mod value;

pub use config::{ConnectionConfig, Dsn, DEFAULT_HOST, DEFAULT_PORT, SESSION_CHARSET};
pub use connection::{Backend, InMemoryBackend, MySqlBackend};
pub use session::{apply_prefix, Session, PREFIX_PLACEHOLDER};
pub use value::{FetchMode, QueryResult, Row, Value};
