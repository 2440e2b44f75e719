//! Error types for GKDB ingestion
//!
//! Errors fall into three groups: configuration problems that stop work
//! before it starts, per-file or per-bundle failures that the pipeline logs
//! and moves past, and worker-level failures reported by the scheduler.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    /// Invalid option, type list, delimiter, or table definition
    #[error("Configuration error: {0}")]
    Config(String),

    /// Record width and declared type list disagree
    #[error("Keys & Types mismatch: {keys} columns but {types} types")]
    TypeMismatch { keys: usize, types: usize },

    /// A field could not be converted to its declared type
    #[error("Cannot convert column '{column}' value {value:?} to {target}")]
    Coercion {
        column: String,
        value: String,
        target: String,
    },

    /// A record lacks a column required by the statement or column list
    #[error("Missing column '{0}' in record")]
    MissingColumn(String),

    /// Unreadable or malformed input file
    #[error("Source error in '{path}': {message}")]
    Source { path: String, message: String },

    /// Alert packet is structurally invalid
    #[error("Packet error: {0}")]
    Packet(String),

    /// RA/Dec missing or not numeric
    #[error("Invalid coordinate in column '{column}': {value}")]
    Coordinate { column: String, value: String },

    /// Database session failure (connect, execute, shutdown)
    #[error("Session error: {0}")]
    Session(String),

    /// Worker did not finish before its deadline
    #[error("Worker {0} exceeded its deadline of {1}s")]
    WorkerTimeout(usize, u64),

    /// Worker task panicked or was cancelled
    #[error("Worker {0} aborted: {1}")]
    WorkerPanic(usize, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Avro error: {0}")]
    Avro(#[from] apache_avro::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Common(#[from] gkdb_common::CommonError),
}

impl IngestError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    pub fn source(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Source {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Short variant name, logged alongside the message for failed bundles
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "Config",
            Self::TypeMismatch { .. } => "TypeMismatch",
            Self::Coercion { .. } => "Coercion",
            Self::MissingColumn(_) => "MissingColumn",
            Self::Source { .. } => "Source",
            Self::Packet(_) => "Packet",
            Self::Coordinate { .. } => "Coordinate",
            Self::Session(_) => "Session",
            Self::WorkerTimeout(..) => "WorkerTimeout",
            Self::WorkerPanic(..) => "WorkerPanic",
            Self::Io(_) => "Io",
            Self::Csv(_) => "Csv",
            Self::Avro(_) => "Avro",
            Self::Yaml(_) => "Yaml",
            Self::Common(_) => "Common",
        }
    }
}
