//! Batched loading of records into one table

use crate::coercion::{Coercer, TypeSpec};
use crate::error::{IngestError, Result};
use crate::partition::bundles;
use crate::record::Record;
use crate::session::Session;
use crate::statement::InsertStatement;
use std::str::FromStr;
use tracing::{debug, error, info};

/// What a loader does when a bundle fails to insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log the failure and continue with the next bundle
    #[default]
    SkipAndLog,
    /// Stop the worker at the first failed bundle
    Abort,
}

impl FromStr for ErrorPolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "skip" | "skip-and-log" => Ok(ErrorPolicy::SkipAndLog),
            "abort" | "abort-on-error" => Ok(ErrorPolicy::Abort),
            _ => Err(IngestError::config(format!(
                "Unknown error policy '{}', expected skip or abort",
                s
            ))),
        }
    }
}

/// Bundle and row counts of one or more loads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub bundles: usize,
    pub bundles_failed: usize,
    pub rows_inserted: usize,
    pub rows_failed: usize,
}

impl LoadStats {
    pub fn merge(&mut self, other: &LoadStats) {
        self.bundles += other.bundles;
        self.bundles_failed += other.bundles_failed;
        self.rows_inserted += other.rows_inserted;
        self.rows_failed += other.rows_failed;
    }
}

/// Inserts records into a table in bundles of multi-row statements
#[derive(Debug, Clone)]
pub struct BatchLoader {
    table: String,
    bundle_size: usize,
    types: Option<TypeSpec>,
    coercer: Coercer,
    policy: ErrorPolicy,
}

impl BatchLoader {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            bundle_size: 1,
            types: None,
            coercer: Coercer::default(),
            policy: ErrorPolicy::default(),
        }
    }

    pub fn with_bundle_size(mut self, size: usize) -> Self {
        self.bundle_size = size.max(1);
        self
    }

    /// Coerce every value to these types (one per column, in record order)
    pub fn with_types(mut self, types: Option<TypeSpec>) -> Self {
        self.types = types;
        self
    }

    pub fn with_coercer(mut self, coercer: Coercer) -> Self {
        self.coercer = coercer;
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Insert `records` through `session`
    ///
    /// Columns are taken from the first record. A type list whose length
    /// differs from the column count executes nothing: every bundle counts as
    /// failed, and under [`ErrorPolicy::Abort`] the mismatch is returned.
    pub async fn load(&self, session: &dyn Session, records: &[Record]) -> Result<LoadStats> {
        let mut stats = LoadStats::default();

        let Some(first) = records.first() else {
            info!("No data");
            return Ok(stats);
        };

        let columns: Vec<String> = first.keys().cloned().collect();
        if let Some(types) = &self.types {
            if types.len() != columns.len() {
                let e = IngestError::TypeMismatch {
                    keys: columns.len(),
                    types: types.len(),
                };
                error!(rows = records.len(), kind = e.kind(), "Keys & Types mismatch: {}", e);
                if self.policy == ErrorPolicy::Abort {
                    return Err(e);
                }
                let count = bundles(records, self.bundle_size).len();
                stats.bundles = count;
                stats.bundles_failed = count;
                stats.rows_failed = records.len();
                return Ok(stats);
            }
        }

        for (index, bundle) in bundles(records, self.bundle_size).enumerate() {
            stats.bundles += 1;
            match self.insert_bundle(session, &columns, bundle).await {
                Ok(()) => {
                    stats.rows_inserted += bundle.len();
                    debug!(bundle = index, rows = bundle.len(), "Inserted bundle");
                },
                Err(e) => {
                    stats.bundles_failed += 1;
                    stats.rows_failed += bundle.len();
                    error!(
                        bundle = index,
                        rows = bundle.len(),
                        kind = e.kind(),
                        "An exception of type {} occurred: {}",
                        e.kind(),
                        e
                    );
                    if self.policy == ErrorPolicy::Abort {
                        return Err(e);
                    }
                },
            }
        }

        Ok(stats)
    }

    async fn insert_bundle(
        &self,
        session: &dyn Session,
        columns: &[String],
        bundle: &[Record],
    ) -> Result<()> {
        let statement = InsertStatement::build(
            &self.table,
            columns,
            bundle,
            self.types.as_ref(),
            &self.coercer,
        )?;
        session.execute(&statement.text, &statement.values).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::{text_record, FieldValue};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records executed statements; fails any statement whose values contain `fail_on`
    #[derive(Default)]
    struct RecordingSession {
        executed: Mutex<Vec<(String, Vec<FieldValue>)>>,
        fail_on: Option<FieldValue>,
    }

    #[async_trait]
    impl Session for RecordingSession {
        async fn execute(&self, statement: &str, values: &[FieldValue]) -> Result<()> {
            if let Some(bad) = &self.fail_on {
                if values.contains(bad) {
                    return Err(IngestError::session("write timeout"));
                }
            }
            self.executed
                .lock()
                .unwrap()
                .push((statement.to_string(), values.to_vec()));
            Ok(())
        }

        async fn shutdown(&self) -> Result<()> {
            Ok(())
        }
    }

    fn rows(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| text_record([("a", i.to_string().as_str()), ("b", "1.5")]))
            .collect()
    }

    #[tokio::test]
    async fn test_bundling_scenario() {
        let session = RecordingSession::default();
        let loader = BatchLoader::new("t")
            .with_bundle_size(2)
            .with_types(Some(TypeSpec::parse("int,float").unwrap()));

        let stats = loader.load(&session, &rows(5)).await.unwrap();
        assert_eq!(stats.bundles, 3);
        assert_eq!(stats.rows_inserted, 5);

        let executed = session.executed.lock().unwrap();
        let texts: Vec<&str> = executed.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(
            texts,
            [
                "INSERT INTO t (a,b) VALUES (?,?),(?,?);",
                "INSERT INTO t (a,b) VALUES (?,?),(?,?);",
                "INSERT INTO t (a,b) VALUES (?,?);",
            ]
        );
        assert_eq!(executed[2].1, vec![FieldValue::Int(4), FieldValue::Float(1.5)]);
    }

    #[tokio::test]
    async fn test_empty_input_executes_nothing() {
        let session = RecordingSession::default();
        let stats = BatchLoader::new("t").load(&session, &[]).await.unwrap();
        assert_eq!(stats, LoadStats::default());
        assert!(session.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_skipped_and_counted() {
        let session = RecordingSession::default();
        let loader = BatchLoader::new("t")
            .with_bundle_size(2)
            .with_types(Some(TypeSpec::parse("int").unwrap()));

        let stats = loader.load(&session, &rows(3)).await.unwrap();
        assert_eq!(stats.bundles, 2);
        assert_eq!(stats.bundles_failed, 2);
        assert_eq!(stats.rows_failed, 3);
        assert_eq!(stats.rows_inserted, 0);
        assert!(session.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_type_mismatch_aborts_under_abort_policy() {
        let session = RecordingSession::default();
        let loader = BatchLoader::new("t")
            .with_types(Some(TypeSpec::parse("int").unwrap()))
            .with_policy(ErrorPolicy::Abort);

        let err = loader.load(&session, &rows(3)).await.unwrap_err();
        assert!(matches!(err, IngestError::TypeMismatch { keys: 2, types: 1 }));
        assert!(session.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_skip_policy_continues_after_failure() {
        let session = RecordingSession {
            fail_on: Some(FieldValue::from("2")),
            ..Default::default()
        };
        let loader = BatchLoader::new("t").with_bundle_size(2);

        let stats = loader.load(&session, &rows(5)).await.unwrap();
        assert_eq!(stats.bundles, 3);
        assert_eq!(stats.bundles_failed, 1);
        assert_eq!(stats.rows_inserted, 3);
        assert_eq!(stats.rows_failed, 2);
        assert_eq!(session.executed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_at_failure() {
        let session = RecordingSession {
            fail_on: Some(FieldValue::from("2")),
            ..Default::default()
        };
        let loader = BatchLoader::new("t")
            .with_bundle_size(2)
            .with_policy(ErrorPolicy::Abort);

        let err = loader.load(&session, &rows(5)).await.unwrap_err();
        assert!(matches!(err, IngestError::Session(_)));
        assert_eq!(session.executed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_coercion_failure_is_a_bundle_failure() {
        let session = RecordingSession::default();
        let mut records = rows(2);
        records[1].insert("a".into(), FieldValue::from("abc"));
        let loader = BatchLoader::new("t").with_types(Some(TypeSpec::parse("int,float").unwrap()));

        let stats = loader.load(&session, &records).await.unwrap();
        assert_eq!(stats.bundles_failed, 1);
        assert_eq!(stats.rows_inserted, 1);
    }

    #[test]
    fn test_error_policy_parse() {
        assert_eq!("skip".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::SkipAndLog);
        assert_eq!("ABORT".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Abort);
        assert!("retry".parse::<ErrorPolicy>().is_err());
    }
}
