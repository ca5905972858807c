use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; stdout carries only the rendered output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sql_runner=info,db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let entry_point = sql_runner::entry_point().context("Failed to locate the running program")?;
    tracing::info!("Starting SQL runner v{}", env!("CARGO_PKG_VERSION"));

    let output = sql_runner::run(&entry_point).await.map_err(|e| {
        tracing::error!(code = e.code(), "{}", e);
        e
    })?;

    println!("{}", output);
    Ok(())
}
