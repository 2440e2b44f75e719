//! Database connection settings and ingestion options

use crate::coercion::{TypeSpec, DEFAULT_NULL_MARKER};
use crate::error::{IngestError, Result};
use crate::foreign_key::JoinKeySource;
use crate::loader::ErrorPolicy;
use crate::source::Delimiter;
use gkdb_common::logging::LogLevel;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One contact point or several
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum HostList {
    One(String),
    Many(Vec<String>),
}

/// Connection settings from the `cassandra.local` section of the config file
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    pub keyspace: String,

    pub hostname: HostList,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    cassandra: CassandraSection,
}

#[derive(Debug, Deserialize)]
struct CassandraSection {
    local: DatabaseConfig,
}

impl DatabaseConfig {
    /// Parse the YAML document
    pub fn from_yaml(text: &str) -> Result<Self> {
        let file: ConfigFile = serde_yaml::from_str(text)?;
        Ok(file.cassandra.local)
    }

    /// Read the YAML file and apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            IngestError::config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)?.merge_env()
    }

    /// Environment variables:
    /// - `GKDB_CASSANDRA_USERNAME`, `GKDB_CASSANDRA_PASSWORD`
    /// - `GKDB_CASSANDRA_KEYSPACE`
    /// - `GKDB_CASSANDRA_HOSTS`: comma-separated contact points
    pub fn merge_env(mut self) -> Result<Self> {
        if let Ok(username) = std::env::var("GKDB_CASSANDRA_USERNAME") {
            self.username = Some(username);
        }

        if let Ok(password) = std::env::var("GKDB_CASSANDRA_PASSWORD") {
            self.password = Some(password);
        }

        if let Ok(keyspace) = std::env::var("GKDB_CASSANDRA_KEYSPACE") {
            self.keyspace = keyspace;
        }

        if let Ok(hosts) = std::env::var("GKDB_CASSANDRA_HOSTS") {
            self.hostname = HostList::Many(
                hosts
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }

        if self.hosts().is_empty() {
            return Err(IngestError::config("No database hosts configured"));
        }
        Ok(self)
    }

    pub fn hosts(&self) -> Vec<String> {
        match &self.hostname {
            HostList::One(host) => vec![host.clone()],
            HostList::Many(hosts) => hosts.clone(),
        }
    }
}

/// Location and file name prefix of one stage's worker logs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerLogSettings {
    pub location: String,
    pub prefix: String,
}

impl WorkerLogSettings {
    pub fn new(location: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            prefix: prefix.into(),
        }
    }
}

/// Everything one ingestion run needs besides its inputs and database
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Target table
    pub table: String,

    /// Field separator of text inputs
    pub delimiter: Delimiter,

    /// Rows per insert statement
    pub bundle_size: usize,

    /// Insert workers per file
    pub insert_workers: usize,

    /// Ingest (file) workers
    pub ingest_workers: usize,

    pub insert_log: WorkerLogSettings,
    pub ingest_log: WorkerLogSettings,

    /// Level of the per-worker log files
    pub worker_log_level: LogLevel,

    /// Keep only these columns, in this order
    pub columns: Option<Vec<String>>,

    /// Types of the input columns, in order
    pub types: Option<TypeSpec>,

    /// Skip the `htm10`/`htm13`/`htm16` columns
    pub skip_htm: bool,

    /// Attach the integer `htm16` id to packet detections
    pub packet_htm16: bool,

    /// Text that reads as Null
    pub null_marker: String,

    /// Tab-separated reference table joined onto every record
    pub fk_table: Option<PathBuf>,

    /// Key column of the reference table
    pub fk_field: String,

    /// Reference columns to append (all when unset)
    pub fk_columns: Option<Vec<String>>,

    /// Types of the appended reference columns
    pub fk_types: Option<TypeSpec>,

    pub join_key: JoinKeySource,

    pub ra_column: String,
    pub dec_column: String,

    pub error_policy: ErrorPolicy,

    /// Deadline for each ingest worker
    pub ingest_timeout: Option<Duration>,

    /// Deadline for each insert worker
    pub insert_timeout: Option<Duration>,
}

impl IngestOptions {
    /// Options with the command-line defaults for `table`
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            delimiter: Delimiter::Whitespace,
            bundle_size: 1,
            insert_workers: 1,
            ingest_workers: 1,
            insert_log: WorkerLogSettings::new("/tmp/", "inserter"),
            ingest_log: WorkerLogSettings::new("/tmp/", "ingester"),
            worker_log_level: LogLevel::Info,
            columns: None,
            types: None,
            skip_htm: false,
            packet_htm16: true,
            null_marker: DEFAULT_NULL_MARKER.to_string(),
            fk_table: None,
            fk_field: "expname".to_string(),
            fk_columns: None,
            fk_types: None,
            join_key: JoinKeySource::Filename,
            ra_column: "ra".to_string(),
            dec_column: "dec".to_string(),
            error_policy: ErrorPolicy::SkipAndLog,
            ingest_timeout: None,
            insert_timeout: None,
        }
    }

    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_bundle_size(mut self, size: usize) -> Self {
        self.bundle_size = size;
        self
    }

    /// Set the ingest and insert worker counts
    pub fn with_workers(mut self, ingest: usize, insert: usize) -> Self {
        self.ingest_workers = ingest;
        self.insert_workers = insert;
        self
    }

    pub fn with_insert_log(mut self, settings: WorkerLogSettings) -> Self {
        self.insert_log = settings;
        self
    }

    pub fn with_ingest_log(mut self, settings: WorkerLogSettings) -> Self {
        self.ingest_log = settings;
        self
    }

    /// Put both stages' worker logs under `location`
    pub fn with_log_location(mut self, location: impl Into<String>) -> Self {
        let location = location.into();
        self.insert_log.location = location.clone();
        self.ingest_log.location = location;
        self
    }

    pub fn with_worker_log_level(mut self, level: LogLevel) -> Self {
        self.worker_log_level = level;
        self
    }

    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn with_types(mut self, types: TypeSpec) -> Self {
        self.types = Some(types);
        self
    }

    pub fn with_skip_htm(mut self, skip: bool) -> Self {
        self.skip_htm = skip;
        self
    }

    pub fn with_packet_htm16(mut self, enabled: bool) -> Self {
        self.packet_htm16 = enabled;
        self
    }

    pub fn with_null_marker(mut self, marker: impl Into<String>) -> Self {
        self.null_marker = marker.into();
        self
    }

    /// Join `path` on `key_field`
    pub fn with_fk_table(mut self, path: impl Into<PathBuf>, key_field: impl Into<String>) -> Self {
        self.fk_table = Some(path.into());
        self.fk_field = key_field.into();
        self
    }

    pub fn with_fk_columns(mut self, columns: Vec<String>, types: Option<TypeSpec>) -> Self {
        self.fk_columns = Some(columns);
        self.fk_types = types;
        self
    }

    pub fn with_join_key(mut self, source: JoinKeySource) -> Self {
        self.join_key = source;
        self
    }

    pub fn with_coordinate_columns(mut self, ra: impl Into<String>, dec: impl Into<String>) -> Self {
        self.ra_column = ra.into();
        self.dec_column = dec.into();
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    pub fn with_ingest_timeout(mut self, timeout: Duration) -> Self {
        self.ingest_timeout = Some(timeout);
        self
    }

    pub fn with_insert_timeout(mut self, timeout: Duration) -> Self {
        self.insert_timeout = Some(timeout);
        self
    }

    /// Type list of a loaded record: input types, reference types, then
    /// the three HTM columns unless skipped
    pub fn combined_types(&self) -> Option<TypeSpec> {
        TypeSpec::combined(self.types.as_ref(), self.fk_types.as_ref(), !self.skip_htm)
    }

    /// Reject option combinations that cannot work
    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() {
            return Err(IngestError::config("A target table is required"));
        }
        if self.bundle_size == 0 {
            return Err(IngestError::config("Bundle size must be at least 1"));
        }
        if self.ingest_workers == 0 || self.insert_workers == 0 {
            return Err(IngestError::config("Worker counts must be at least 1"));
        }
        if let (Some(columns), Some(types)) = (&self.columns, &self.types) {
            if columns.len() != types.len() {
                return Err(IngestError::TypeMismatch {
                    keys: columns.len(),
                    types: types.len(),
                });
            }
        }
        if let (Some(columns), Some(types)) = (&self.fk_columns, &self.fk_types) {
            if columns.len() != types.len() {
                return Err(IngestError::TypeMismatch {
                    keys: columns.len(),
                    types: types.len(),
                });
            }
        }
        if self.fk_types.is_some() && self.fk_columns.is_none() {
            return Err(IngestError::config(
                "Foreign key column types need an explicit foreign key column list",
            ));
        }
        Ok(())
    }
}

/// Split a comma-separated list, dropping blanks
pub fn split_list_option(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
