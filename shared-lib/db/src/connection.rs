//! Database connection management.

use std::collections::HashMap;

use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, MySql, Row as _, TypeInfo, ValueRef};

use crate::config::ConnectionConfig;
use crate::value::{FetchMode, QueryResult, Row, Value};
use error::DatabaseError;

/// A live connection able to run a statement and return all its rows.
#[allow(async_fn_in_trait)]
pub trait Backend: Send {
    /// Execute `sql` verbatim and materialize every row.
    async fn fetch_all(&mut self, sql: &str, mode: FetchMode) -> Result<QueryResult, DatabaseError>;

    /// Release the connection.
    async fn close(self) -> Result<(), DatabaseError>
    where
        Self: Sized;
}

/// A single MySQL connection.
pub struct MySqlBackend {
    conn: MySqlConnection,
}

impl MySqlBackend {
    /// Open one connection using the DSN and credentials of `config`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, DatabaseError> {
        let options = config.connect_options()?;
        let dsn = config.redacted_dsn();
        tracing::info!("Connecting to database: {}", dsn);

        let connecting = MySqlConnection::connect_with(&options);
        let conn = tokio::time::timeout(config.connect_timeout(), connecting)
            .await
            .map_err(|_| {
                tracing::error!("Connection to {} timed out", dsn);
                DatabaseError::Timeout {
                    operation: "connect",
                    secs: config.connect_timeout().as_secs(),
                }
            })?
            .map_err(|e| {
                tracing::error!("Failed to connect to {} as {}: {}", dsn, config.username(), e);
                DatabaseError::ConnectionFailed {
                    dsn: dsn.clone(),
                    username: config.username().to_string(),
                    message: e.to_string(),
                }
            })?;

        tracing::info!("Database connection established");
        Ok(Self { conn })
    }
}

impl Backend for MySqlBackend {
    async fn fetch_all(&mut self, sql: &str, mode: FetchMode) -> Result<QueryResult, DatabaseError> {
        let statement_failed = |message: String| DatabaseError::StatementFailed {
            sql: sql.to_string(),
            message,
        };

        let rows = sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| statement_failed(e.to_string()))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();

        let mut shaped = Vec::with_capacity(rows.len());
        for row in &rows {
            let cells = (0..row.len())
                .map(|index| decode_cell(row, index))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| statement_failed(e.to_string()))?;
            shaped.push(Row::from_cells(&columns, cells, mode));
        }

        Ok(QueryResult::new(columns, shaped))
    }

    async fn close(self) -> Result<(), DatabaseError> {
        self.conn
            .close()
            .await
            .map_err(|e| DatabaseError::CloseFailed(e.to_string()))?;
        tracing::info!("Database connection closed");
        Ok(())
    }
}

fn try_decode<'r, T>(row: &'r MySqlRow, index: usize) -> Option<T>
where
    T: sqlx::Decode<'r, MySql> + sqlx::Type<MySql>,
{
    row.try_get::<T, _>(index).ok()
}

/// How a column's values are decoded, by MySQL type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Signed,
    Unsigned,
    Float,
    Date,
    Time,
    DateTime,
    /// Strings, blobs, decimals and anything else sent as bytes
    Textual,
}

impl ColumnKind {
    fn of(type_name: &str) -> Self {
        match type_name {
            "BOOLEAN" | "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => ColumnKind::Signed,
            name if name.ends_with("UNSIGNED") || name == "YEAR" || name == "BIT" => {
                ColumnKind::Unsigned
            }
            "FLOAT" | "DOUBLE" => ColumnKind::Float,
            "DATE" => ColumnKind::Date,
            "TIME" => ColumnKind::Time,
            "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
            _ => ColumnKind::Textual,
        }
    }
}

/// Decode one cell according to its column type.
///
/// Only textual columns fall back to their raw bytes; a numeric or temporal
/// value that cannot be decoded is an error.
fn decode_cell(row: &MySqlRow, index: usize) -> Result<Value, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let column = row.column(index);
    let type_name = column.type_info().name();
    let decoded = match ColumnKind::of(type_name) {
        ColumnKind::Signed => try_decode::<i64>(row, index).map(Value::Int),
        ColumnKind::Unsigned => try_decode::<u64>(row, index).map(Value::UInt),
        ColumnKind::Float => try_decode::<f64>(row, index)
            .or_else(|| try_decode::<f32>(row, index).map(f64::from))
            .map(Value::Float),
        ColumnKind::Date => try_decode::<chrono::NaiveDate>(row, index).map(Value::Date),
        ColumnKind::Time => try_decode::<chrono::NaiveTime>(row, index).map(Value::Time),
        ColumnKind::DateTime => try_decode::<chrono::NaiveDateTime>(row, index).map(Value::DateTime),
        ColumnKind::Textual => {
            if let Some(text) = try_decode::<String>(row, index) {
                return Ok(Value::Text(text));
            }
            let bytes: Vec<u8> = row.try_get_unchecked(index)?;
            return Ok(match String::from_utf8(bytes) {
                Ok(text) => Value::Text(text),
                Err(e) => Value::Bytes(e.into_bytes()),
            });
        }
    };

    decoded.ok_or_else(|| {
        sqlx::Error::Decode(
            format!("cannot decode {} value in column '{}'", type_name, column.name()).into(),
        )
    })
}

/// In-memory backend for testing and development.
///
/// Answers only the statements it was primed with; anything else fails the
/// way a rejected statement would.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    results: HashMap<String, (Vec<String>, Vec<Vec<Value>>)>,
    executed: Vec<String>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prime the backend with the rows returned for `sql`.
    pub fn with_result(
        mut self,
        sql: impl Into<String>,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        self.results.insert(sql.into(), (columns, rows));
        self
    }

    /// Prime `SHOW TABLES` for a database named `database`.
    pub fn with_tables<I, S>(self, database: &str, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows = tables
            .into_iter()
            .map(|t| vec![Value::Text(t.into())])
            .collect();
        self.with_result("SHOW TABLES", vec![format!("Tables_in_{}", database)], rows)
    }

    /// Every statement received, in order.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }
}

impl Backend for InMemoryBackend {
    async fn fetch_all(&mut self, sql: &str, mode: FetchMode) -> Result<QueryResult, DatabaseError> {
        self.executed.push(sql.to_string());

        let (columns, rows) = self.results.get(sql).ok_or_else(|| DatabaseError::StatementFailed {
            sql: sql.to_string(),
            message: "You have an error in your SQL syntax".to_string(),
        })?;

        let rows = rows
            .iter()
            .map(|cells| Row::from_cells(columns, cells.clone(), mode))
            .collect();
        Ok(QueryResult::new(columns.clone(), rows))
    }

    async fn close(self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_show_tables() {
        let mut backend = InMemoryBackend::new().with_tables("lime", ["lime_surveys", "lime_users"]);
        let result = backend.fetch_all("SHOW TABLES", FetchMode::Numeric).await.unwrap();

        assert_eq!(result.columns, vec!["Tables_in_lime".to_string()]);
        assert_eq!(
            result.rows,
            vec![
                Row::Numeric(vec!["lime_surveys".into()]),
                Row::Numeric(vec!["lime_users".into()]),
            ]
        );
        assert_eq!(backend.executed(), ["SHOW TABLES"]);
    }

    #[tokio::test]
    async fn test_in_memory_unknown_statement_fails() {
        let mut backend = InMemoryBackend::new();
        let err = backend
            .fetch_all("SELEC 1", FetchMode::Associative)
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::StatementFailed { sql, .. } if sql == "SELEC 1"));
    }

    #[tokio::test]
    async fn test_connect_rejects_non_mysql_dsn_before_io() {
        let config = ConnectionConfig::new("sqlite:/tmp/lime.db", "u", "p", "lime_");
        let err = MySqlBackend::connect(&config).await.err().unwrap();
        assert!(matches!(err, DatabaseError::UnsupportedDriver(_)));
    }

    #[test]
    fn test_column_kinds() {
        assert_eq!(ColumnKind::of("BOOLEAN"), ColumnKind::Signed);
        assert_eq!(ColumnKind::of("BIGINT"), ColumnKind::Signed);
        assert_eq!(ColumnKind::of("INT UNSIGNED"), ColumnKind::Unsigned);
        assert_eq!(ColumnKind::of("YEAR"), ColumnKind::Unsigned);
        assert_eq!(ColumnKind::of("DOUBLE"), ColumnKind::Float);
        assert_eq!(ColumnKind::of("TIME"), ColumnKind::Time);
        assert_eq!(ColumnKind::of("TIMESTAMP"), ColumnKind::DateTime);
    }

    #[test]
    fn test_only_textual_columns_fall_back_to_bytes() {
        for name in ["VARCHAR", "TEXT", "DECIMAL", "BLOB", "VARBINARY", "ENUM", "JSON"] {
            assert_eq!(ColumnKind::of(name), ColumnKind::Textual, "{}", name);
        }
        for name in ["TIME", "DATE", "DATETIME", "FLOAT", "SMALLINT", "BIGINT UNSIGNED"] {
            assert_ne!(ColumnKind::of(name), ColumnKind::Textual, "{}", name);
        }
    }
}
