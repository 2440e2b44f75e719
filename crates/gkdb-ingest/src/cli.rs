//! Command-line interface

use crate::coercion::TypeSpec;
use crate::config::{split_list_option, IngestOptions, WorkerLogSettings};
use crate::error::Result;
use crate::foreign_key::JoinKeySource;
use crate::loader::ErrorPolicy;
use crate::source::{expand_file_lists, Delimiter};
use clap::Parser;
use gkdb_common::logging::LogLevel;
use std::path::PathBuf;
use std::time::Duration;

/// Ingest survey tables and alert packets into a Cassandra keyspace
#[derive(Parser, Debug)]
#[command(name = "gkdb-ingest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Database configuration file (YAML, `cassandra.local` section)
    pub config_file: PathBuf,

    /// Input files, or lists of input files with --fileoffiles
    #[arg(required = true)]
    pub input_files: Vec<PathBuf>,

    /// Treat each input file as a list of input files, one per line
    #[arg(long = "fileoffiles")]
    pub file_of_files: bool,

    /// Target table
    #[arg(long)]
    pub table: String,

    /// Field delimiter of text inputs (\s for whitespace, \t for tab)
    #[arg(long = "table-delimiter", default_value = "\\s")]
    pub table_delimiter: String,

    /// Rows per INSERT statement
    #[arg(long = "bundlesize", default_value_t = 1)]
    pub bundle_size: usize,

    /// Insert workers per file
    #[arg(long = "nprocesses", default_value_t = 1)]
    pub insert_workers: usize,

    /// File (ingest) workers
    #[arg(long = "nfileprocesses", default_value_t = 1)]
    pub ingest_workers: usize,

    /// Directory of the insert worker logs
    #[arg(long = "loglocation-insert", default_value = "/tmp/")]
    pub insert_log_location: String,

    /// File name prefix of the insert worker logs
    #[arg(long = "logprefix-insert", default_value = "inserter")]
    pub insert_log_prefix: String,

    /// Directory of the ingest worker logs
    #[arg(long = "loglocation-ingest", default_value = "/tmp/")]
    pub ingest_log_location: String,

    /// File name prefix of the ingest worker logs
    #[arg(long = "logprefix-ingest", default_value = "ingester")]
    pub ingest_log_prefix: String,

    /// Columns to keep, comma separated, in table order
    #[arg(long)]
    pub columns: Option<String>,

    /// Column types (str,int,float,bool), comma separated
    #[arg(long)]
    pub types: Option<String>,

    /// Do not add htm10/htm13/htm16 columns
    #[arg(long = "skiphtm")]
    pub skip_htm: bool,

    /// Do not add the integer htm16 id to packet detections
    #[arg(long = "no-packet-htm")]
    pub no_packet_htm: bool,

    /// Text that reads as NULL
    #[arg(long = "null-value", default_value = "\\N")]
    pub null_value: String,

    /// Tab-separated foreign key table joined onto every record
    #[arg(long = "fktable")]
    pub fk_table: Option<PathBuf>,

    /// Foreign key columns to append, comma separated
    #[arg(long = "fktablecols")]
    pub fk_table_cols: Option<String>,

    /// Types of the foreign key columns, comma separated
    #[arg(long = "fktablecoltypes")]
    pub fk_table_col_types: Option<String>,

    /// Key column of the foreign key table
    #[arg(long = "fkfield", default_value = "expname")]
    pub fk_field: String,

    /// Join key of each record: `filename` or the name of a record field
    #[arg(long = "fkfrominputdata", default_value = "filename")]
    pub fk_from_input_data: String,

    /// Right ascension column
    #[arg(long = "racol", default_value = "ra")]
    pub ra_column: String,

    /// Declination column
    #[arg(long = "deccol", default_value = "dec")]
    pub dec_column: String,

    /// What to do when a bundle fails: skip or abort
    #[arg(long = "on-error", default_value = "skip")]
    pub on_error: String,

    /// Deadline of each ingest worker, in seconds
    #[arg(long = "ingest-timeout")]
    pub ingest_timeout: Option<u64>,

    /// Deadline of each insert worker, in seconds
    #[arg(long = "insert-timeout")]
    pub insert_timeout: Option<u64>,

    /// Log statements instead of executing them
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Options for this invocation, validated
    pub fn options(&self) -> Result<IngestOptions> {
        let mut options = IngestOptions::new(self.table.clone())
            .with_delimiter(self.table_delimiter.parse::<Delimiter>()?)
            .with_bundle_size(self.bundle_size)
            .with_workers(self.ingest_workers, self.insert_workers)
            .with_insert_log(WorkerLogSettings::new(
                self.insert_log_location.clone(),
                self.insert_log_prefix.clone(),
            ))
            .with_ingest_log(WorkerLogSettings::new(
                self.ingest_log_location.clone(),
                self.ingest_log_prefix.clone(),
            ))
            .with_worker_log_level(if self.verbose { LogLevel::Debug } else { LogLevel::Info })
            .with_skip_htm(self.skip_htm)
            .with_packet_htm16(!self.no_packet_htm)
            .with_null_marker(self.null_value.clone())
            .with_join_key(JoinKeySource::parse(&self.fk_from_input_data))
            .with_coordinate_columns(self.ra_column.clone(), self.dec_column.clone())
            .with_error_policy(self.on_error.parse::<ErrorPolicy>()?);

        if let Some(columns) = &self.columns {
            options = options.with_columns(split_list_option(columns));
        }
        if let Some(types) = &self.types {
            options = options.with_types(TypeSpec::parse(types)?);
        }
        if let Some(path) = &self.fk_table {
            options = options.with_fk_table(path.clone(), self.fk_field.clone());
        }
        if let Some(columns) = &self.fk_table_cols {
            let types = self
                .fk_table_col_types
                .as_deref()
                .map(TypeSpec::parse)
                .transpose()?;
            options = options.with_fk_columns(split_list_option(columns), types);
        } else if let Some(types) = &self.fk_table_col_types {
            options.fk_types = Some(TypeSpec::parse(types)?);
        }
        if let Some(seconds) = self.ingest_timeout {
            options = options.with_ingest_timeout(Duration::from_secs(seconds));
        }
        if let Some(seconds) = self.insert_timeout {
            options = options.with_insert_timeout(Duration::from_secs(seconds));
        }

        options.validate()?;
        Ok(options)
    }

    /// Input files, with lists expanded when --fileoffiles is set
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        if self.file_of_files {
            expand_file_lists(&self.input_files)
        } else {
            Ok(self.input_files.clone())
        }
    }
}
