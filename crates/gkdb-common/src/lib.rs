//! GKDB Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling and logging for the GKDB ingestion tools.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Logging**: Process-wide `tracing` setup plus per-worker log sinks
//!
//! # Example
//!
//! ```no_run
//! use gkdb_common::logging::{run_timestamp, WorkerLogSink, LogLevel};
//!
//! fn open_worker_log() -> gkdb_common::Result<()> {
//!     let sink = WorkerLogSink::create("/tmp/", "ingester", &run_timestamp(), "0", LogLevel::Info)?;
//!     tracing::dispatcher::with_default(&sink.dispatch(), || {
//!         tracing::info!("worker started");
//!     });
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
