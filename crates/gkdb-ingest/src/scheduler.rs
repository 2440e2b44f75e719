//! Two-level worker fan-out
//!
//! [`fan_out`] splits a list of work items into contiguous partitions and
//! runs one tokio task per partition. Every worker logs into its own file
//! through a scoped `tracing` dispatcher, may run under a deadline, and ends
//! as a [`WorkerOutcome`]; a failing worker never cancels its siblings.
//!
//! Two stages are built on it:
//!
//! ```text
//! IngestStage (files)                 InsertStage (records of one file)
//!   worker 0: a.dat, b.dat     ──►      worker 0.0.0: rows 0..n/2
//!                                       worker 0.0.1: rows n/2..n
//!   worker 1: c.dat            ──►      ...
//! ```

use crate::coercion::Coercer;
use crate::config::{IngestOptions, WorkerLogSettings};
use crate::error::{IngestError, Result};
use crate::foreign_key::ForeignKeyTable;
use crate::loader::{BatchLoader, LoadStats};
use crate::partition::split_list;
use crate::pipeline::FilePipeline;
use crate::record::Record;
use crate::session::Connector;
use futures::FutureExt;
use gkdb_common::logging::{LogLevel, WorkerLogSink};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn};

/// How the workers of one stage are run and where they log
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub name: &'static str,
    pub workers: usize,
    pub log: WorkerLogSettings,
    pub log_level: LogLevel,
    pub run_timestamp: String,
    /// Parent worker label; nested workers are labelled `<parent>.<index>`
    pub parent_label: Option<String>,
    pub timeout: Option<Duration>,
}

impl StageConfig {
    pub fn new(name: &'static str, workers: usize, log: WorkerLogSettings, run_timestamp: impl Into<String>) -> Self {
        Self {
            name,
            workers,
            log,
            log_level: LogLevel::Info,
            run_timestamp: run_timestamp.into(),
            parent_label: None,
            timeout: None,
        }
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_parent_label(mut self, label: impl Into<String>) -> Self {
        self.parent_label = Some(label.into());
        self
    }

    pub fn worker_label(&self, index: usize) -> String {
        match &self.parent_label {
            Some(parent) => format!("{}.{}", parent, index),
            None => index.to_string(),
        }
    }
}

/// How a worker ended
#[derive(Debug)]
pub enum WorkerOutcome<T> {
    Completed(T),
    Failed(IngestError),
    TimedOut,
}

/// One worker's partition size, log file and outcome
#[derive(Debug)]
pub struct WorkerReport<T> {
    pub index: usize,
    pub label: String,
    pub items: usize,
    pub log_path: Option<PathBuf>,
    pub outcome: WorkerOutcome<T>,
}

impl<T> WorkerReport<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self.outcome, WorkerOutcome::Completed(_))
    }
}

/// Reports of every worker of one stage run, ordered by worker index
#[derive(Debug)]
pub struct StageReport<T> {
    pub stage: &'static str,
    pub workers: Vec<WorkerReport<T>>,
}

impl<T> StageReport<T> {
    /// Workers that failed, panicked or timed out
    pub fn failures(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_completed()).count()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    pub fn completed(&self) -> impl Iterator<Item = &T> {
        self.workers.iter().filter_map(|w| match &w.outcome {
            WorkerOutcome::Completed(value) => Some(value),
            _ => None,
        })
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn supervise<T, Fut>(index: usize, timeout: Option<Duration>, work: Fut) -> WorkerOutcome<T>
where
    Fut: Future<Output = Result<T>>,
{
    let guarded = AssertUnwindSafe(work).catch_unwind();
    let caught = match timeout {
        Some(limit) => match tokio::time::timeout(limit, guarded).await {
            Ok(caught) => caught,
            Err(_) => {
                let e = IngestError::WorkerTimeout(index, limit.as_secs());
                error!(worker = index, kind = e.kind(), "{}", e);
                return WorkerOutcome::TimedOut;
            },
        },
        None => guarded.await,
    };

    match caught {
        Ok(Ok(value)) => WorkerOutcome::Completed(value),
        Ok(Err(e)) => {
            error!(worker = index, kind = e.kind(), "Worker failed: {}", e);
            WorkerOutcome::Failed(e)
        },
        Err(payload) => {
            let e = IngestError::WorkerPanic(index, panic_message(payload));
            error!(worker = index, "{}", e);
            WorkerOutcome::Failed(e)
        },
    }
}

/// Partition `items` over the stage's workers, run them, and wait for all
///
/// `worker` receives the worker label and its partition. The future it
/// returns runs with the worker's log file as the default subscriber; when
/// the log file cannot be created the worker logs to the caller's
/// subscriber instead.
pub async fn fan_out<I, T, F, Fut>(config: &StageConfig, items: Vec<I>, worker: F) -> StageReport<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(String, Vec<I>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let partitions = split_list(items, config.workers);
    info!(stage = config.name, workers = partitions.len(), "Starting workers");

    let mut tasks = JoinSet::new();
    for (index, partition) in partitions.into_iter().enumerate() {
        let label = config.worker_label(index);
        let items = partition.len();
        let sink = match WorkerLogSink::create(
            &config.log.location,
            &config.log.prefix,
            &config.run_timestamp,
            &label,
            config.log_level,
        ) {
            Ok(sink) => Some(sink),
            Err(e) => {
                warn!(stage = config.name, worker = %label, "No worker log file: {}", e);
                None
            },
        };
        let log_path = sink.as_ref().map(|s| s.path().to_path_buf());

        let work = worker(label.clone(), partition);
        let timeout = config.timeout;
        let stage = config.name;
        let worker_label = label.clone();
        let run = async move {
            info!(stage, worker = %worker_label, items, "Worker started");
            let outcome = supervise(index, timeout, work).await;
            info!(stage, worker = %worker_label, "Process complete.");
            outcome
        };

        tasks.spawn(async move {
            let outcome = match &sink {
                Some(sink) => run.with_subscriber(sink.dispatch()).await,
                None => run.await,
            };
            if let Some(sink) = sink {
                // Dropping the sink blocks until its file is flushed.
                if let Err(e) = tokio::task::spawn_blocking(move || drop(sink)).await {
                    warn!(worker = %label, "Closing worker log failed: {}", e);
                }
            }
            WorkerReport {
                index,
                label,
                items,
                log_path,
                outcome,
            }
        });
    }

    let mut workers = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => workers.push(report),
            Err(e) => error!(stage = config.name, "Worker task lost: {}", e),
        }
    }
    workers.sort_by_key(|w| w.index);

    let report = StageReport {
        stage: config.name,
        workers,
    };
    info!(
        stage = config.name,
        workers = report.workers.len(),
        failures = report.failures(),
        "Stage finished"
    );
    report
}

/// Spreads one file's records over insert workers, one session each
#[derive(Clone)]
pub struct InsertStage {
    connector: Arc<dyn Connector>,
    loader: Arc<BatchLoader>,
    workers: usize,
    log: WorkerLogSettings,
    log_level: LogLevel,
    timeout: Option<Duration>,
    run_timestamp: String,
}

impl InsertStage {
    pub fn new(options: &IngestOptions, connector: Arc<dyn Connector>, run_timestamp: impl Into<String>) -> Self {
        let loader = BatchLoader::new(options.table.clone())
            .with_bundle_size(options.bundle_size)
            .with_types(options.combined_types())
            .with_coercer(Coercer::new(options.null_marker.clone()))
            .with_policy(options.error_policy);

        Self {
            connector,
            loader: Arc::new(loader),
            workers: options.insert_workers,
            log: options.insert_log.clone(),
            log_level: options.worker_log_level,
            timeout: options.insert_timeout,
            run_timestamp: run_timestamp.into(),
        }
    }

    /// Load `records`; `parent_label` names the caller in worker log files
    pub async fn run(&self, records: Vec<Record>, parent_label: Option<String>) -> StageReport<LoadStats> {
        let mut config = StageConfig::new("insert", self.workers, self.log.clone(), self.run_timestamp.clone())
            .with_log_level(self.log_level)
            .with_timeout(self.timeout);
        if let Some(parent) = parent_label {
            config = config.with_parent_label(parent);
        }

        fan_out(&config, records, |_label, partition| {
            insert_worker(Arc::clone(&self.connector), Arc::clone(&self.loader), partition)
        })
        .await
    }
}

async fn insert_worker(
    connector: Arc<dyn Connector>,
    loader: Arc<BatchLoader>,
    records: Vec<Record>,
) -> Result<LoadStats> {
    let session = connector.connect().await?;
    let loaded = loader.load(session.as_ref(), &records).await;
    let closed = session.shutdown().await;

    let stats = loaded?;
    closed?;
    info!(
        rows = stats.rows_inserted,
        failed = stats.rows_failed,
        table = loader.table(),
        "Connection Closed - exiting"
    );
    Ok(stats)
}

/// Totals of one ingest worker, or of a whole run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub files_ingested: usize,
    pub files_failed: usize,
    pub records_read: usize,
    pub insert_workers_failed: usize,
    pub load: LoadStats,
}

impl IngestSummary {
    pub fn merge(&mut self, other: &IngestSummary) {
        self.files_ingested += other.files_ingested;
        self.files_failed += other.files_failed;
        self.records_read += other.records_read;
        self.insert_workers_failed += other.insert_workers_failed;
        self.load.merge(&other.load);
    }

    fn absorb(&mut self, report: &StageReport<LoadStats>) {
        self.insert_workers_failed += report.failures();
        for stats in report.completed() {
            self.load.merge(stats);
        }
    }
}

/// Spreads input files over ingest workers
///
/// Each ingest worker prepares its files one at a time and hands each
/// file's records to the insert stage.
#[derive(Clone)]
pub struct IngestStage {
    pipeline: Arc<FilePipeline>,
    insert: Arc<InsertStage>,
    workers: usize,
    log: WorkerLogSettings,
    log_level: LogLevel,
    timeout: Option<Duration>,
    run_timestamp: String,
}

impl IngestStage {
    pub fn new(
        options: &IngestOptions,
        fk_table: Option<Arc<ForeignKeyTable>>,
        connector: Arc<dyn Connector>,
        run_timestamp: impl Into<String>,
    ) -> Self {
        let run_timestamp = run_timestamp.into();
        Self {
            pipeline: Arc::new(FilePipeline::new(options, fk_table)),
            insert: Arc::new(InsertStage::new(options, connector, run_timestamp.clone())),
            workers: options.ingest_workers,
            log: options.ingest_log.clone(),
            log_level: options.worker_log_level,
            timeout: options.ingest_timeout,
            run_timestamp,
        }
    }

    pub async fn run(&self, files: Vec<PathBuf>) -> StageReport<IngestSummary> {
        let config = StageConfig::new("ingest", self.workers, self.log.clone(), self.run_timestamp.clone())
            .with_log_level(self.log_level)
            .with_timeout(self.timeout);

        fan_out(&config, files, |label, partition| {
            ingest_worker(label, Arc::clone(&self.pipeline), Arc::clone(&self.insert), partition)
        })
        .await
    }
}

async fn ingest_worker(
    label: String,
    pipeline: Arc<FilePipeline>,
    insert: Arc<InsertStage>,
    files: Vec<PathBuf>,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    for (sequence, file) in files.into_iter().enumerate() {
        info!("Ingesting {}", file.display());

        let reader = Arc::clone(&pipeline);
        let path = file.clone();
        let dispatch = tracing::dispatcher::get_default(|current| current.clone());
        let read = tokio::task::spawn_blocking(move || {
            tracing::dispatcher::with_default(&dispatch, || reader.process_file(&path))
        });
        let records = match read.await {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                error!(file = %file.display(), kind = e.kind(), "Skipping file: {}", e);
                summary.files_failed += 1;
                continue;
            },
            Err(e) => {
                error!(file = %file.display(), "Reader task failed: {}", e);
                summary.files_failed += 1;
                continue;
            },
        };

        summary.files_ingested += 1;
        summary.records_read += records.len();
        if records.is_empty() {
            continue;
        }

        info!("Parallel Processing...");
        let report = insert.run(records, Some(format!("{}.{}", label, sequence))).await;
        summary.absorb(&report);
        info!("Done Parallel Processing");
    }

    Ok(summary)
}
