//! Database session: one connection, prefix-aware statement execution.

use crate::config::ConnectionConfig;
use crate::connection::{Backend, MySqlBackend};
use crate::value::{FetchMode, QueryResult};
use error::DatabaseError;

/// Placeholder replaced by the configured table prefix, e.g. `#_surveys`.
pub const PREFIX_PLACEHOLDER: &str = "#_";

/// Replace every occurrence of [`PREFIX_PLACEHOLDER`] in `sql` with `prefix`.
pub fn apply_prefix(sql: &str, prefix: &str) -> String {
    sql.replace(PREFIX_PLACEHOLDER, prefix)
}

/// Owns at most one open connection for the lifetime of a run.
///
/// A session starts disconnected. Statements can only run after
/// [`Session::connect`] (or [`Session::attach`]) succeeded. The connection is
/// released by [`Session::close`], or when the session is dropped.
pub struct Session<B: Backend = MySqlBackend> {
    config: ConnectionConfig,
    backend: Option<B>,
}

impl<B: Backend> Session<B> {
    /// Create a disconnected session.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            backend: None,
        }
    }

    /// Use an already open backend as this session's connection.
    pub fn attach(&mut self, backend: B) {
        if self.backend.is_some() {
            tracing::warn!("Replacing an open connection");
        }
        self.backend = Some(backend);
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.backend.is_some()
    }

    pub fn backend(&self) -> Option<&B> {
        self.backend.as_ref()
    }

    /// Run one statement and return all of its rows.
    ///
    /// `#_` is replaced by the table prefix before the statement is sent. The
    /// statement text is sent as-is otherwise: no values are bound.
    pub async fn execute(&mut self, sql: &str, mode: FetchMode) -> Result<QueryResult, DatabaseError> {
        let backend = self.backend.as_mut().ok_or(DatabaseError::NotConnected)?;
        let sql = apply_prefix(sql, self.config.table_prefix());
        tracing::debug!("Executing statement: {}", sql);

        let timeout = self.config.statement_timeout();
        let result = match tokio::time::timeout(timeout, backend.fetch_all(&sql, mode)).await {
            Ok(result) => result,
            Err(_) => Err(DatabaseError::Timeout {
                operation: "statement",
                secs: timeout.as_secs(),
            }),
        };

        match &result {
            Ok(rows) => tracing::info!("Statement returned {} row(s)", rows.len()),
            Err(e) => tracing::error!(code = e.code(), "Statement failed: {}", e),
        }
        result
    }

    /// Release the connection. Closing a disconnected session does nothing.
    pub async fn close(&mut self) -> Result<(), DatabaseError> {
        match self.backend.take() {
            Some(backend) => backend.close().await,
            None => Ok(()),
        }
    }
}

impl Session<MySqlBackend> {
    /// Open the MySQL connection described by the session's config.
    pub async fn connect(&mut self) -> Result<(), DatabaseError> {
        if self.is_connected() {
            return Ok(());
        }
        let backend = MySqlBackend::connect(&self.config).await?;
        self.backend = Some(backend);
        Ok(())
    }
}
