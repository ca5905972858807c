//! Host application configuration
//!
//! The runner lives in the root folder of a LimeSurvey installation and reads
//! the database settings from LimeSurvey's own `application/config/config.php`.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use crate::php;
use db::ConnectionConfig;
use error::ConfigError;

/// The database component of the host configuration.
///
/// Keys absent or `null` in the PHP array deserialize to `None`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DbComponent {
    connection_string: Option<Scalar>,
    username: Option<Scalar>,
    password: Option<Scalar>,
    table_prefix: Option<Scalar>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl Scalar {
    /// String conversion as PHP applies it.
    fn into_string(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Number(n) => n.to_string(),
            Scalar::Bool(true) => "1".to_string(),
            Scalar::Bool(false) => String::new(),
        }
    }
}

/// Path of the running program as it was invoked.
///
/// The invoked path is kept when it names a location so a symlinked runner
/// resolves against the installation it is linked into; otherwise the
/// resolved executable path is used.
pub fn entry_point() -> std::io::Result<PathBuf> {
    match std::env::args_os().next().map(PathBuf::from) {
        Some(invoked) if invoked.components().count() > 1 => Ok(invoked),
        _ => std::env::current_exe(),
    }
}

/// Root folder of the installation: the directory holding the entry point.
pub fn install_root(entry_point: &Path) -> PathBuf {
    match entry_point.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `<root>/application/config/config.php`
pub fn config_path(root: &Path) -> PathBuf {
    root.join("application").join("config").join("config.php")
}

/// Locate the host config next to `entry_point` and read its connection settings.
pub fn load_connection_config(entry_point: &Path) -> Result<ConnectionConfig, ConfigError> {
    let path = config_path(&install_root(entry_point));
    read_connection_config(&path)
}

/// Read connection settings from a host config file.
pub fn read_connection_config(path: &Path) -> Result<ConnectionConfig, ConfigError> {
    let shown = path.display().to_string();
    if !path.is_file() {
        return Err(ConfigError::NotFound { path: shown });
    }

    tracing::info!("Loading configuration from {}", shown);
    let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: shown.clone(),
        source,
    })?;

    let value = php::parse_returned_value(&source).map_err(|e| ConfigError::Parse {
        path: shown.clone(),
        message: e.to_string(),
    })?;

    connection_config_from_value(&value).map_err(|e| match e {
        ConfigError::Parse { message, .. } => ConfigError::Parse {
            path: shown,
            message,
        },
        other => other,
    })
}

/// Extract `components.db.{connectionString, username, password, tablePrefix}`.
pub fn connection_config_from_value(value: &Value) -> Result<ConnectionConfig, ConfigError> {
    let db = value
        .pointer("/components/db")
        .filter(|db| db.is_object())
        .ok_or_else(|| missing("components.db"))?;

    let component = DbComponent::deserialize(db).map_err(|e| ConfigError::Parse {
        path: String::new(),
        message: format!("components.db: {}", e),
    })?;

    let connection_string = required(component.connection_string, "connectionString")?;
    let username = required(component.username, "username")?;
    let password = required(component.password, "password")?;
    let table_prefix = required(component.table_prefix, "tablePrefix")?;

    Ok(ConnectionConfig::new(connection_string, username, password, table_prefix))
}

fn required(field: Option<Scalar>, name: &str) -> Result<String, ConfigError> {
    field
        .map(Scalar::into_string)
        .ok_or_else(|| missing(&format!("components.db.{}", name)))
}

fn missing(field: &str) -> ConfigError {
    ConfigError::MissingField {
        field: field.to_string(),
    }
}
