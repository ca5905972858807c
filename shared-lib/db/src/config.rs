//! Connection configuration.

use std::fmt;
use std::time::Duration;

use sqlx::mysql::MySqlConnectOptions;

use error::DatabaseError;

/// Default MySQL host when the DSN has none.
pub const DEFAULT_HOST: &str = "localhost";
/// Default MySQL port when the DSN has none.
pub const DEFAULT_PORT: u16 = 3306;
/// Session character set negotiated on connect.
pub const SESSION_CHARSET: &str = "utf8mb4";

/// Connection parameters read from the host application's configuration.
#[derive(Clone)]
pub struct ConnectionConfig {
    dsn: String,
    username: String,
    password: String,
    table_prefix: String,
    connect_timeout_secs: u64,
    statement_timeout_secs: u64,
}

impl ConnectionConfig {
    /// Create a new connection configuration.
    pub fn new(
        dsn: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        table_prefix: impl Into<String>,
    ) -> Self {
        Self {
            dsn: dsn.into(),
            username: username.into(),
            password: password.into(),
            table_prefix: table_prefix.into(),
            connect_timeout_secs: 30,
            statement_timeout_secs: 300,
        }
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Set the statement execution timeout.
    pub fn with_statement_timeout(mut self, secs: u64) -> Self {
        self.statement_timeout_secs = secs;
        self
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn table_prefix(&self) -> &str {
        &self.table_prefix
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_secs(self.statement_timeout_secs)
    }

    /// The DSN with any embedded password value masked, for diagnostics.
    pub fn redacted_dsn(&self) -> String {
        let Some((driver, rest)) = self.dsn.split_once(':') else {
            return self.dsn.clone();
        };
        let segments: Vec<String> = rest
            .split(';')
            .map(|segment| match segment.split_once('=') {
                Some((key, _)) if is_secret_key(key) => format!("{}=***", key),
                _ => segment.to_string(),
            })
            .collect();
        format!("{}:{}", driver, segments.join(";"))
    }

    /// Build sqlx connect options from the DSN and credentials.
    pub fn connect_options(&self) -> Result<MySqlConnectOptions, DatabaseError> {
        let dsn = Dsn::parse(&self.dsn)?;
        if let Some(charset) = dsn.charset.as_deref().filter(|c| !is_utf8_charset(c)) {
            tracing::warn!("Ignoring DSN charset {}, using {}", charset, SESSION_CHARSET);
        }

        let mut options = MySqlConnectOptions::new()
            .username(&self.username)
            .password(&self.password)
            .charset(SESSION_CHARSET);

        options = match &dsn.unix_socket {
            Some(socket) => options.socket(socket),
            None => options
                .host(dsn.host.as_deref().unwrap_or(DEFAULT_HOST))
                .port(dsn.port.unwrap_or(DEFAULT_PORT)),
        };

        if let Some(database) = &dsn.database {
            options = options.database(database);
        }

        Ok(options)
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("dsn", &self.redacted_dsn())
            .field("username", &self.username)
            .field("password", &"***")
            .field("table_prefix", &self.table_prefix)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("statement_timeout_secs", &self.statement_timeout_secs)
            .finish()
    }
}

fn is_utf8_charset(charset: &str) -> bool {
    matches!(charset.to_ascii_lowercase().as_str(), "utf8" | "utf8mb3" | "utf8mb4")
}

fn is_secret_key(key: &str) -> bool {
    matches!(key.trim().to_ascii_lowercase().as_str(), "password" | "pwd")
}

/// A parsed PDO-style data source name, e.g.
/// `mysql:host=localhost;port=3306;dbname=limesurvey;`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dsn {
    pub driver: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub unix_socket: Option<String>,
    pub charset: Option<String>,
}

impl Dsn {
    /// Parse a DSN. Only the `mysql` driver is accepted.
    pub fn parse(input: &str) -> Result<Self, DatabaseError> {
        let (driver, rest) = input
            .trim()
            .split_once(':')
            .ok_or_else(|| DatabaseError::InvalidDsn(format!("missing driver prefix in '{}'", input)))?;

        if driver != "mysql" {
            return Err(DatabaseError::UnsupportedDriver(driver.to_string()));
        }

        let mut dsn = Dsn {
            driver: driver.to_string(),
            ..Default::default()
        };

        for segment in rest.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let (key, value) = segment.split_once('=').ok_or_else(|| {
                DatabaseError::InvalidDsn(format!("segment '{}' is not key=value", segment))
            })?;
            let value = value.trim().to_string();

            match key.trim() {
                "host" => dsn.host = Some(value),
                "port" => {
                    let port = value.parse().map_err(|_| {
                        DatabaseError::InvalidDsn(format!("invalid port '{}'", value))
                    })?;
                    dsn.port = Some(port);
                }
                "dbname" => dsn.database = Some(value),
                "unix_socket" => dsn.unix_socket = Some(value),
                "charset" => dsn.charset = Some(value),
                other => tracing::debug!("Ignoring DSN attribute: {}", other),
            }
        }

        Ok(dsn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_limesurvey_dsn() {
        let dsn = Dsn::parse("mysql:host=localhost;port=3306;dbname=limesurvey;").unwrap();
        assert_eq!(dsn.driver, "mysql");
        assert_eq!(dsn.host.as_deref(), Some("localhost"));
        assert_eq!(dsn.port, Some(3306));
        assert_eq!(dsn.database.as_deref(), Some("limesurvey"));
        assert!(dsn.unix_socket.is_none());
    }

    #[test]
    fn test_parse_unix_socket_dsn() {
        let dsn = Dsn::parse("mysql:unix_socket=/var/run/mysqld/mysqld.sock;dbname=lime").unwrap();
        assert_eq!(dsn.unix_socket.as_deref(), Some("/var/run/mysqld/mysqld.sock"));
        assert_eq!(dsn.database.as_deref(), Some("lime"));
        assert!(dsn.host.is_none());
    }

    #[test]
    fn test_parse_rejects_other_drivers() {
        let err = Dsn::parse("pgsql:host=localhost;dbname=lime").unwrap_err();
        assert!(matches!(err, DatabaseError::UnsupportedDriver(d) if d == "pgsql"));
    }

    #[test]
    fn test_parse_rejects_bad_port() {
        let err = Dsn::parse("mysql:host=db;port=abc").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidDsn(_)));
    }

    #[test]
    fn test_parse_rejects_missing_prefix() {
        assert!(matches!(
            Dsn::parse("host=localhost").unwrap_err(),
            DatabaseError::InvalidDsn(_)
        ));
    }

    #[test]
    fn test_accessors_return_values_unchanged() {
        let config = ConnectionConfig::new("mysql:host=db;dbname=lime", "lime", "s3cret", "lime_");
        assert_eq!(config.dsn(), "mysql:host=db;dbname=lime");
        assert_eq!(config.username(), "lime");
        assert_eq!(config.password(), "s3cret");
        assert_eq!(config.table_prefix(), "lime_");
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert_eq!(config.statement_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_timeout_builders() {
        let config = ConnectionConfig::new("mysql:host=db", "u", "p", "")
            .with_connect_timeout(5)
            .with_statement_timeout(60);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.statement_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = ConnectionConfig::new("mysql:host=db;password=hunter2", "lime", "s3cret", "lime_");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("hunter2"));
        assert_eq!(config.redacted_dsn(), "mysql:host=db;password=***");
    }

    #[test]
    fn test_connect_options_from_dsn() {
        let config = ConnectionConfig::new("mysql:host=db.local;port=3307;dbname=lime", "u", "p", "");
        let options = config.connect_options().unwrap();
        assert_eq!(options.get_host(), "db.local");
        assert_eq!(options.get_port(), 3307);
        assert_eq!(options.get_database(), Some("lime"));
        assert_eq!(options.get_charset(), SESSION_CHARSET);
    }

    #[test]
    fn test_dsn_charset_does_not_override_utf8() {
        let config = ConnectionConfig::new("mysql:host=db;dbname=lime;charset=latin1", "u", "p", "");
        assert_eq!(Dsn::parse(config.dsn()).unwrap().charset.as_deref(), Some("latin1"));
        assert!(!is_utf8_charset("latin1"));
        assert!(is_utf8_charset("UTF8MB4"));
        assert_eq!(config.connect_options().unwrap().get_charset(), SESSION_CHARSET);
    }
}
