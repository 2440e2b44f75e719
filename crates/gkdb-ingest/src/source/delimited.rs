//! Delimited text tables with a header row

use crate::error::{IngestError, Result};
use crate::record::{FieldValue, Record};
use std::io::{BufRead, BufReader, Read};
use std::str::FromStr;
use tracing::warn;

/// Field separator of a text table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Delimiter {
    /// Any run of spaces or tabs
    #[default]
    Whitespace,
    /// A single byte such as `\t` or `,`
    Byte(u8),
}

impl Delimiter {
    pub const TAB: Delimiter = Delimiter::Byte(b'\t');
}

impl FromStr for Delimiter {
    type Err = IngestError;

    /// Accepts the escapes `\s` and `\t` as well as literal characters
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "\\s" | " " => Ok(Delimiter::Whitespace),
            "\\t" | "\t" => Ok(Delimiter::TAB),
            other if other.len() == 1 && other.is_ascii() => Ok(Delimiter::Byte(other.as_bytes()[0])),
            other => Err(IngestError::config(format!(
                "Unsupported delimiter '{}': use \\s, \\t or a single ASCII character",
                other
            ))),
        }
    }
}

fn header_names<'a>(fields: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut names: Vec<String> = fields.map(|f| f.trim().to_string()).collect();
    if let Some(first) = names.first_mut() {
        *first = first.trim_start_matches('#').trim().to_string();
    }
    if names.first().is_some_and(String::is_empty) {
        names.remove(0);
    }
    names
}

fn to_record(header: &[String], fields: Vec<String>) -> Record {
    header
        .iter()
        .cloned()
        .zip(fields.into_iter().map(FieldValue::Text))
        .collect()
}

/// Read a table whose first non-empty line names the columns
///
/// A leading `#` on the header is dropped. Rows whose width differs from the
/// header are logged and skipped. Values are kept as text.
pub fn read_delimited<R: Read>(reader: R, delimiter: Delimiter, source: &str) -> Result<Vec<Record>> {
    match delimiter {
        Delimiter::Whitespace => read_whitespace(reader, source),
        Delimiter::Byte(byte) => read_separated(reader, byte, source),
    }
}

fn read_whitespace<R: Read>(reader: R, source: &str) -> Result<Vec<Record>> {
    let mut header: Option<Vec<String>> = None;
    let mut records = Vec::new();

    for (line_no, line) in BufReader::new(reader).lines().enumerate() {
        let line = line.map_err(|e| IngestError::source(source, e.to_string()))?;
        if line.trim().is_empty() {
            continue;
        }

        let Some(columns) = &header else {
            header = Some(header_names(line.split_whitespace()));
            continue;
        };

        let fields: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if fields.len() != columns.len() {
            warn!(
                line = line_no + 1,
                "Skipping row with {} fields, header has {}",
                fields.len(),
                columns.len()
            );
            continue;
        }
        records.push(to_record(columns, fields));
    }

    Ok(records)
}

fn read_separated<R: Read>(reader: R, delimiter: u8, source: &str) -> Result<Vec<Record>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut header: Option<Vec<String>> = None;
    let mut records = Vec::new();

    for row in csv_reader.records() {
        let row = row.map_err(|e| IngestError::source(source, e.to_string()))?;
        if row.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        let Some(columns) = &header else {
            header = Some(header_names(row.iter()));
            continue;
        };

        if row.len() != columns.len() {
            let line = row.position().map(|p| p.line()).unwrap_or_default();
            warn!(
                line,
                "Skipping row with {} fields, header has {}",
                row.len(),
                columns.len()
            );
            continue;
        }
        records.push(to_record(columns, row.iter().map(str::to_string).collect()));
    }

    Ok(records)
}
