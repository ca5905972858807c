//! LimeSurvey SQL runner
//!
//! Connects to the LimeSurvey database with the credentials from the
//! installation's own config.php and runs the statements in [`report`].

pub mod host_config;
pub mod php;
pub mod report;

use std::path::Path;

use db::Session;

pub use host_config::{config_path, entry_point, install_root, load_connection_config};
pub use report::{list_tables, process, render_table_list};

/// Load the config next to `entry_point`, connect, run the business action
/// and close the connection.
pub async fn run(entry_point: &Path) -> error::Result<String> {
    let config = load_connection_config(entry_point)?;
    let mut session = Session::new(config);
    session.connect().await?;

    let output = process(&mut session).await;

    if let Err(e) = session.close().await {
        tracing::warn!("{}", e);
    }
    Ok(output?)
}
