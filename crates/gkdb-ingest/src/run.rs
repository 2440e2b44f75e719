//! One complete ingestion run

use crate::config::IngestOptions;
use crate::error::Result;
use crate::foreign_key::ForeignKeyTable;
use crate::scheduler::{IngestStage, IngestSummary, StageReport};
use crate::session::Connector;
use gkdb_common::logging::run_timestamp;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of [`run`]
#[derive(Debug)]
pub struct RunReport {
    pub ingest: StageReport<IngestSummary>,
    pub summary: IngestSummary,
}

impl RunReport {
    /// Ingest or insert workers that failed, panicked or timed out
    pub fn worker_failures(&self) -> usize {
        self.ingest.failures() + self.summary.insert_workers_failed
    }

    /// Every worker of both stages completed; failed bundles and unreadable
    /// files do not count against this
    pub fn is_success(&self) -> bool {
        self.worker_failures() == 0
    }
}

/// Load the reference table, ingest `files` and report totals
pub async fn run(
    options: &IngestOptions,
    files: Vec<PathBuf>,
    connector: Arc<dyn Connector>,
) -> Result<RunReport> {
    options.validate()?;

    let fk_table = match &options.fk_table {
        Some(path) => Some(Arc::new(ForeignKeyTable::load(path, &options.fk_field)?)),
        None => None,
    };

    let timestamp = run_timestamp();
    info!(
        files = files.len(),
        table = %options.table,
        ingest_workers = options.ingest_workers,
        insert_workers = options.insert_workers,
        run = %timestamp,
        "Starting ingestion"
    );

    let stage = IngestStage::new(options, fk_table, connector, timestamp);
    let ingest = stage.run(files).await;

    let mut summary = IngestSummary::default();
    for worker in ingest.completed() {
        summary.merge(worker);
    }

    let report = RunReport { ingest, summary };
    info!(
        files = summary.files_ingested,
        files_failed = summary.files_failed,
        records = summary.records_read,
        rows_inserted = summary.load.rows_inserted,
        rows_failed = summary.load.rows_failed,
        "Ingestion finished"
    );
    if !report.is_success() {
        warn!(failures = report.worker_failures(), "Some workers did not complete");
    }
    Ok(report)
}
