//! Common error types for the SQL runner.
//!
//! Every failure mode is fatal: nothing here is retried.

use thiserror::Error;

/// Application-level errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Errors raised while locating or reading the host application's config.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("File {path} not found")]
    NotFound { path: String },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("Missing configuration field: {field}")]
    MissingField { field: String },
}

/// Database-related errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid DSN: {0}")]
    InvalidDsn(String),

    #[error("Unsupported database driver: {0}")]
    UnsupportedDriver(String),

    #[error("Connection failed for {dsn}, login {username}: {message}")]
    ConnectionFailed {
        dsn: String,
        username: String,
        message: String,
    },

    #[error("The database should be initialized first, call connect() before executing statements")]
    NotConnected,

    #[error("Invalid SQL statement: {sql}: {message}")]
    StatementFailed { sql: String, message: String },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: &'static str, secs: u64 },

    #[error("Failed to close connection: {0}")]
    CloseFailed(String),
}

impl DatabaseError {
    /// Stable code for programmatic handling and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            DatabaseError::InvalidDsn(_) => "DB_INVALID_DSN",
            DatabaseError::UnsupportedDriver(_) => "DB_UNSUPPORTED_DRIVER",
            DatabaseError::ConnectionFailed { .. } => "DB_CONNECTION_FAILED",
            DatabaseError::NotConnected => "DB_NOT_CONNECTED",
            DatabaseError::StatementFailed { .. } => "DB_STATEMENT_FAILED",
            DatabaseError::Timeout { .. } => "DB_TIMEOUT",
            DatabaseError::CloseFailed(_) => "DB_CLOSE_FAILED",
        }
    }
}

impl ConfigError {
    /// Stable code for programmatic handling and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::NotFound { .. } => "CONFIG_NOT_FOUND",
            ConfigError::Read { .. } => "CONFIG_READ_FAILED",
            ConfigError::Parse { .. } => "CONFIG_PARSE_FAILED",
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD",
        }
    }
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.code(),
            AppError::Database(e) => e.code(),
        }
    }
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;
