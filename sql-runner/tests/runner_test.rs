//! Integration tests for config discovery and the table listing action
//!
//! A LimeSurvey installation layout is created in a temporary directory; the
//! database side is served by the in-memory backend.

use std::fs;
use std::path::{Path, PathBuf};

use db::{ConnectionConfig, FetchMode, InMemoryBackend, Session};
use error::{AppError, ConfigError, DatabaseError};
use sql_runner::{load_connection_config, process};

const CONFIG_PHP: &str = r#"<?php if (!defined('BASEPATH')) exit('No direct script access allowed');
return array(
	'components' => array(
		'db' => array(
			'connectionString' => 'mysql:host=localhost;port=3306;dbname=limesurvey;',
			'emulatePrepare' => true,
			'username' => 'limeuser',
			'password' => 'limepass',
			'charset' => 'utf8mb4',
			'tablePrefix' => 'lime_',
		),
	),
	'config' => array(
		'debug' => 0,
	),
);
"#;

/// Create `<root>/application/config/config.php` and return the runner's path.
fn install(root: &Path, config: &str) -> PathBuf {
    let dir = root.join("application").join("config");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("config.php"), config).unwrap();
    root.join("sql-runner")
}

#[test]
fn test_load_config_from_installation() {
    let root = tempfile::tempdir().unwrap();
    let entry_point = install(root.path(), CONFIG_PHP);

    let config = load_connection_config(&entry_point).unwrap();
    assert_eq!(config.dsn(), "mysql:host=localhost;port=3306;dbname=limesurvey;");
    assert_eq!(config.username(), "limeuser");
    assert_eq!(config.password(), "limepass");
    assert_eq!(config.table_prefix(), "lime_");
}

#[test]
fn test_missing_config_is_reported_with_path() {
    let root = tempfile::tempdir().unwrap();
    let entry_point = root.path().join("sql-runner");

    let err = load_connection_config(&entry_point).unwrap_err();
    match err {
        ConfigError::NotFound { path } => {
            assert!(path.ends_with("config.php"), "unexpected path {}", path);
            assert!(path.starts_with(&root.path().display().to_string()));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_run_fails_before_connecting_without_config() {
    let root = tempfile::tempdir().unwrap();
    let err = sql_runner::run(&root.path().join("sql-runner")).await.unwrap_err();
    assert!(matches!(err, AppError::Config(ConfigError::NotFound { .. })));
}

#[tokio::test]
async fn test_run_stops_when_connection_is_refused() {
    let root = tempfile::tempdir().unwrap();
    let config = CONFIG_PHP
        .replace(
            "mysql:host=localhost;port=3306;dbname=limesurvey;",
            "mysql:host=127.0.0.1;port=1;dbname=limesurvey;password=dsnsecret",
        );
    let entry_point = install(root.path(), &config);

    let err = sql_runner::run(&entry_point).await.unwrap_err();
    let message = err.to_string();
    match err {
        AppError::Database(DatabaseError::ConnectionFailed { dsn, username, .. }) => {
            assert_eq!(dsn, "mysql:host=127.0.0.1;port=1;dbname=limesurvey;password=***");
            assert_eq!(username, "limeuser");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(!message.contains("limepass"), "password leaked: {}", message);
    assert!(!message.contains("dsnsecret"), "password leaked: {}", message);
}

#[test]
fn test_unparsable_config() {
    let root = tempfile::tempdir().unwrap();
    let entry_point = install(root.path(), "<?php return array('components' => ");

    let err = load_connection_config(&entry_point).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[tokio::test]
async fn test_list_tables_with_loaded_prefix() {
    let root = tempfile::tempdir().unwrap();
    let config = load_connection_config(&install(root.path(), CONFIG_PHP)).unwrap();

    let mut session = Session::new(config);
    session.attach(
        InMemoryBackend::new()
            .with_tables("limesurvey", ["lime_surveys", "lime_users"])
            .with_result(
                "SELECT COUNT(sid) AS Count FROM `lime_surveys`",
                vec!["Count".to_string()],
                vec![vec![db::Value::Int(3)]],
            ),
    );

    let html = process(&mut session).await.unwrap();
    assert!(html.contains("<li>lime_surveys</li><li>lime_users</li>"));

    let count = session
        .execute("SELECT COUNT(sid) AS Count FROM `#_surveys`", FetchMode::Associative)
        .await
        .unwrap();
    assert_eq!(count.rows[0].get_by_name("Count"), Some(&db::Value::Int(3)));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_unconnected_session_does_no_io() {
    let config = ConnectionConfig::new("mysql:host=203.0.113.1;dbname=lime", "u", "p", "lime_");
    let mut session: Session = Session::new(config);
    let err = process(&mut session).await.unwrap_err();
    assert!(matches!(err, error::DatabaseError::NotConnected));
}
