//! Foreign-key reference table and record join
//!
//! The reference table is a tab-separated file loaded once per run and
//! shared read-only between workers. Each record is matched on a join key
//! taken either from its source file name or from one of its own fields.

use crate::error::{IngestError, Result};
use crate::record::{FieldValue, Record};
use crate::source::{open_input, read_delimited, Delimiter};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a record's join key comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinKeySource {
    /// File basename up to its first `.`
    Filename,
    /// Value of the named field
    Field(String),
}

impl JoinKeySource {
    /// `filename` selects [`JoinKeySource::Filename`]; anything else names a field
    pub fn parse(value: &str) -> Self {
        if value == "filename" {
            JoinKeySource::Filename
        } else {
            JoinKeySource::Field(value.to_string())
        }
    }
}

/// Text form of a key value; floats keep their decimal point (`100.0`)
/// so they match keys read from text
fn join_key(value: &FieldValue) -> String {
    match value {
        FieldValue::Float(x) => format!("{:?}", x),
        other => other.to_string(),
    }
}

/// Join key derived from a file path: `/data/02a59000o0001c.dph.gz` → `02a59000o0001c`
pub fn filename_key(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}

/// Reference rows keyed by one of their fields
#[derive(Debug, Clone, Default)]
pub struct ForeignKeyTable {
    key_field: String,
    rows: HashMap<String, Record>,
}

impl ForeignKeyTable {
    /// Load a tab-separated table with a header row
    pub fn load(path: &Path, key_field: &str) -> Result<Self> {
        let reader = open_input(path)?;
        let records = read_delimited(reader, Delimiter::TAB, &path.display().to_string())?;

        if let Some(first) = records.first() {
            if !first.contains_key(key_field) {
                return Err(IngestError::config(format!(
                    "Foreign key table {} has no column '{}'",
                    path.display(),
                    key_field
                )));
            }
        }

        let table = Self::from_records(records, key_field);
        info!(path = %path.display(), rows = table.len(), "Loaded foreign key table");
        Ok(table)
    }

    /// Index `records` by `key_field`; later rows replace earlier ones
    pub fn from_records(records: Vec<Record>, key_field: &str) -> Self {
        let mut rows = HashMap::with_capacity(records.len());
        for record in records {
            match record.get(key_field) {
                Some(key) if !key.is_null() => {
                    rows.insert(join_key(key), record);
                },
                _ => warn!("Foreign key row without '{}' ignored", key_field),
            }
        }
        Self {
            key_field: key_field.to_string(),
            rows,
        }
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn get(&self, key: &str) -> Option<&Record> {
        self.rows.get(key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Appends reference columns to records whose join key matches
#[derive(Debug, Clone)]
pub struct ForeignKeyJoiner {
    table: Arc<ForeignKeyTable>,
    key_source: JoinKeySource,
    columns: Option<Vec<String>>,
}

impl ForeignKeyJoiner {
    /// `columns` restricts which reference fields are appended, in that order
    pub fn new(
        table: Arc<ForeignKeyTable>,
        key_source: JoinKeySource,
        columns: Option<Vec<String>>,
    ) -> Self {
        Self {
            table,
            key_source,
            columns,
        }
    }

    fn append(&self, record: &mut Record, reference: &Record) {
        match &self.columns {
            Some(columns) => {
                for column in columns {
                    if let Some(value) = reference.get(column) {
                        record.insert(column.clone(), value.clone());
                    }
                }
            },
            None => {
                for (column, value) in reference {
                    record.insert(column.clone(), value.clone());
                }
            },
        }
    }

    fn field_key(record: &Record, field: &str) -> Option<String> {
        record.get(field).filter(|v| !v.is_null()).map(join_key)
    }

    /// Join every record read from `source_file`; returns how many matched
    ///
    /// Unmatched records are left as they are.
    pub fn join_all(&self, records: &mut [Record], source_file: &Path) -> usize {
        let mut matched = 0;
        match &self.key_source {
            JoinKeySource::Filename => {
                let key = filename_key(source_file);
                if let Some(reference) = self.table.get(&key) {
                    for record in records.iter_mut() {
                        self.append(record, reference);
                    }
                    matched = records.len();
                }
            },
            JoinKeySource::Field(field) => {
                for record in records.iter_mut() {
                    let reference = Self::field_key(record, field).and_then(|k| self.table.get(&k));
                    if let Some(reference) = reference {
                        self.append(record, reference);
                        matched += 1;
                    }
                }
            },
        }

        debug!(
            file = %source_file.display(),
            matched,
            total = records.len(),
            "Joined foreign key columns"
        );
        matched
    }
}
