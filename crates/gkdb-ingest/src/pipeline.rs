//! Per-file record preparation: read, trim, join, annotate

use crate::config::IngestOptions;
use crate::error::{IngestError, Result};
use crate::foreign_key::{ForeignKeyJoiner, ForeignKeyTable};
use crate::record::Record;
use crate::source::{read_records, ReaderOptions};
use crate::spatial::SpatialAnnotator;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Reduce each record to exactly `columns`, in that order
pub fn trim_columns(records: Vec<Record>, columns: &[String]) -> Result<Vec<Record>> {
    records
        .into_iter()
        .map(|mut record| {
            columns
                .iter()
                .map(|column| {
                    record
                        .shift_remove(column)
                        .map(|value| (column.clone(), value))
                        .ok_or_else(|| IngestError::MissingColumn(column.clone()))
                })
                .collect::<Result<Record>>()
        })
        .collect()
}

/// Turns one input file into records ready for loading
#[derive(Debug, Clone)]
pub struct FilePipeline {
    reader: ReaderOptions,
    columns: Option<Vec<String>>,
    joiner: Option<ForeignKeyJoiner>,
    annotator: Option<SpatialAnnotator>,
}

impl FilePipeline {
    /// An empty reference table disables the join
    pub fn new(options: &IngestOptions, fk_table: Option<Arc<ForeignKeyTable>>) -> Self {
        let reader = ReaderOptions::new(options.table.clone())
            .with_delimiter(options.delimiter)
            .with_packet_htm16(options.packet_htm16);

        let joiner = fk_table.filter(|t| !t.is_empty()).map(|table| {
            ForeignKeyJoiner::new(table, options.join_key.clone(), options.fk_columns.clone())
        });

        let annotator = (!options.skip_htm)
            .then(|| SpatialAnnotator::new(options.ra_column.clone(), options.dec_column.clone()));

        Self {
            reader,
            columns: options.columns.clone(),
            joiner,
            annotator,
        }
    }

    /// Read and prepare every record of `path`
    pub fn process_file(&self, path: &Path) -> Result<Vec<Record>> {
        let mut records = read_records(path, &self.reader)?;
        debug!(file = %path.display(), records = records.len(), "Read input file");

        if let Some(columns) = &self.columns {
            records = trim_columns(records, columns)?;
        }

        if let Some(joiner) = &self.joiner {
            joiner.join_all(&mut records, path);
        }

        if let Some(annotator) = &self.annotator {
            annotator.annotate(&mut records)?;
        }

        Ok(records)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::{text_record, FieldValue};
    use crate::source::Delimiter;
    use tempfile::TempDir;

    #[test]
    fn test_trim_columns_reorders() {
        let records = vec![text_record([("mag", "18"), ("ra", "1"), ("dec", "2")])];
        let trimmed = trim_columns(records, &["ra".into(), "dec".into()]).unwrap();
        let keys: Vec<&str> = trimmed[0].keys().map(String::as_str).collect();
        assert_eq!(keys, ["ra", "dec"]);
    }

    #[test]
    fn test_trim_columns_missing() {
        let records = vec![text_record([("ra", "1")])];
        let err = trim_columns(records, &["ra".into(), "dec".into()]).unwrap_err();
        assert!(matches!(err, IngestError::MissingColumn(c) if c == "dec"));
    }

    #[test]
    fn test_full_pipeline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exp1.dat");
        std::fs::write(&path, "#ra\tdec\tmag\tflags\n288.70392\t9.99498\t18.1\t0\n").unwrap();

        let fk = Arc::new(ForeignKeyTable::from_records(
            vec![text_record([("expname", "exp1"), ("mjd", "100.0")])],
            "expname",
        ));
        let options = IngestOptions::new("atlas_detections")
            .with_delimiter(Delimiter::TAB)
            .with_columns(vec!["ra".into(), "dec".into(), "mag".into()])
            .with_fk_columns(vec!["mjd".into()], None);

        let records = FilePipeline::new(&options, Some(fk)).process_file(&path).unwrap();
        assert_eq!(records.len(), 1);

        let keys: Vec<&str> = records[0].keys().map(String::as_str).collect();
        assert_eq!(keys, ["ra", "dec", "mag", "mjd", "htm10", "htm13", "htm16"]);
        assert_eq!(records[0]["mjd"], FieldValue::from("100.0"));
        assert_eq!(records[0]["htm10"], FieldValue::from("N02323033011"));
    }

    #[test]
    fn test_skip_htm_and_empty_fk_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exp1.dat");
        std::fs::write(&path, "ra dec\n1.0 2.0\n").unwrap();

        let options = IngestOptions::new("t").with_skip_htm(true);
        let pipeline = FilePipeline::new(&options, Some(Arc::new(ForeignKeyTable::default())));
        let records = pipeline.process_file(&path).unwrap();
        assert_eq!(records[0].len(), 2);
    }
}
