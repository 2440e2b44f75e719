//! GKDB Ingest Library
//!
//! Parallel, batched loading of astronomical survey data into a
//! Cassandra/ScyllaDB keyspace.
//!
//! # Pipeline
//!
//! - **Read**: delimited text tables (optionally gzipped) or Avro alert
//!   packets ([`source`])
//! - **Trim**: keep an explicit column list ([`pipeline`])
//! - **Join**: append columns from a reference table ([`foreign_key`])
//! - **Annotate**: add HTM trixel columns from RA/Dec ([`spatial`], [`htm`])
//! - **Load**: coerce values and insert multi-row bundles ([`coercion`],
//!   [`statement`], [`loader`], [`session`])
//!
//! Files are spread over ingest workers and each file's records over insert
//! workers ([`scheduler`]); every worker logs to its own file.
//!
//! # Example
//!
//! ```no_run
//! use gkdb_ingest::config::IngestOptions;
//! use gkdb_ingest::session::DryRunConnector;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let options = IngestOptions::new("atlas_detections")
//!         .with_bundle_size(100)
//!         .with_workers(2, 4);
//!     let report = gkdb_ingest::run(
//!         &options,
//!         vec!["02a59000o0001c.dph".into()],
//!         Arc::new(DryRunConnector::new()),
//!     )
//!     .await?;
//!     println!("{} rows", report.summary.load.rows_inserted);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod cli;
pub mod coercion;
pub mod config;
pub mod error;
pub mod foreign_key;
pub mod htm;
pub mod loader;
pub mod partition;
pub mod pipeline;
pub mod record;
pub mod run;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod spatial;
pub mod statement;

pub use cli::Cli;
pub use error::{IngestError, Result};
pub use record::{FieldValue, Record};
pub use run::{run, RunReport};
