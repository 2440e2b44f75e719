//! GKDB Ingest - survey data ingestion tool

use anyhow::{Context, Result};
use clap::Parser;
use gkdb_common::logging::{init_logging, LogConfig, LogLevel};
use gkdb_ingest::session::{Connector, DryRunConnector};
use gkdb_ingest::Cli;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[cfg(feature = "cassandra")]
fn connector(cli: &Cli) -> Result<Arc<dyn Connector>> {
    use gkdb_ingest::config::DatabaseConfig;
    use gkdb_ingest::session::CassandraConnector;

    if cli.dry_run {
        return Ok(Arc::new(DryRunConnector::new()));
    }
    let config = DatabaseConfig::load(&cli.config_file)
        .with_context(|| format!("loading {}", cli.config_file.display()))?;
    Ok(Arc::new(CassandraConnector::new(config)))
}

#[cfg(not(feature = "cassandra"))]
fn connector(cli: &Cli) -> Result<Arc<dyn Connector>> {
    if cli.dry_run {
        return Ok(Arc::new(DryRunConnector::new()));
    }
    anyhow::bail!("built without the `cassandra` feature; rerun with --dry-run")
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("gkdb-ingest".to_string())
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    init_logging(&log_config)?;

    let options = cli.options().context("invalid options")?;
    let files = cli.files().context("resolving input files")?;
    let connector = connector(&cli)?;

    let report = gkdb_ingest::run(&options, files, connector).await?;

    if report.is_success() {
        info!("Ingestion complete");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(failures = report.worker_failures(), "Ingestion finished with failed workers");
        Ok(ExitCode::FAILURE)
    }
}
