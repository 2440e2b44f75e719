//! End-to-end tests for file ingestion
//!
//! These tests run the full two-stage pipeline against an in-memory
//! connector that records every statement:
//! - Foreign key join by file name
//! - Typed loading and bundling
//! - Skip and abort error policies
//! - Per-worker log files
//! - Worker deadlines

use async_trait::async_trait;
use gkdb_ingest::coercion::TypeSpec;
use gkdb_ingest::config::IngestOptions;
use gkdb_ingest::loader::ErrorPolicy;
use gkdb_ingest::session::{Connector, Session};
use gkdb_ingest::source::Delimiter;
use gkdb_ingest::{run, FieldValue, IngestError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type Executed = Arc<Mutex<Vec<(String, Vec<FieldValue>)>>>;

/// Connector whose sessions record statements, optionally failing some
#[derive(Default)]
struct RecordingConnector {
    executed: Executed,
    fail_on: Option<FieldValue>,
    delay: Option<Duration>,
}

struct RecordingSession {
    executed: Executed,
    fail_on: Option<FieldValue>,
    delay: Option<Duration>,
}

#[async_trait]
impl Connector for RecordingConnector {
    async fn connect(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(RecordingSession {
            executed: Arc::clone(&self.executed),
            fail_on: self.fail_on.clone(),
            delay: self.delay,
        }))
    }
}

#[async_trait]
impl Session for RecordingSession {
    async fn execute(&self, statement: &str, values: &[FieldValue]) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(bad) = &self.fail_on {
            if values.contains(bad) {
                return Err(IngestError::session("Unavailable: not enough replicas"));
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

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn log_location(dir: &TempDir) -> String {
    let logs = dir.path().join("logs");
    std::fs::create_dir_all(&logs).unwrap();
    format!("{}/", logs.display())
}

const DETECTIONS: &str = "#ra dec mag\n288.70392 9.99498 18.1\n10.0 -5.0 19.2\n11.0 -6.0 \\N\n";

// ============================================================================
// Join and bundling
// ============================================================================

#[tokio::test]
async fn test_join_by_filename() {
    let dir = TempDir::new().unwrap();
    let exp1 = write(dir.path(), "exp1.dat", DETECTIONS);
    let exp2 = write(dir.path(), "exp2.dat", DETECTIONS);
    let fk = write(dir.path(), "exposures.tsv", "expname\tmjd\nexp1\t100.0\n");

    let options = IngestOptions::new("atlas_detections")
        .with_bundle_size(2)
        .with_workers(2, 2)
        .with_log_location(log_location(&dir))
        .with_fk_table(&fk, "expname")
        .with_fk_columns(vec!["mjd".to_string()], None);

    let connector = Arc::new(RecordingConnector::default());
    let executed = Arc::clone(&connector.executed);
    let report = run(&options, vec![exp1, exp2], connector).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.summary.files_ingested, 2);
    assert_eq!(report.summary.records_read, 6);
    assert_eq!(report.summary.load.rows_inserted, 6);

    let executed = executed.lock().unwrap();
    let joined = executed
        .iter()
        .filter(|(text, _)| text.starts_with("INSERT INTO atlas_detections (ra,dec,mag,mjd,htm10,htm13,htm16)"))
        .count();
    let plain = executed
        .iter()
        .filter(|(text, _)| text.starts_with("INSERT INTO atlas_detections (ra,dec,mag,htm10,htm13,htm16)"))
        .count();
    // Three records per file over two insert workers: bundles of 2 and 1
    assert_eq!(joined, 2);
    assert_eq!(plain, 2);
}

#[tokio::test]
async fn test_typed_join_miss_does_not_fail_the_run() {
    let dir = TempDir::new().unwrap();
    let exp1 = write(dir.path(), "exp1.dat", DETECTIONS);
    let exp2 = write(dir.path(), "exp2.dat", DETECTIONS);
    let fk = write(dir.path(), "exposures.tsv", "expname\tmjd\nexp1\t100.0\n");

    let options = IngestOptions::new("atlas_detections")
        .with_bundle_size(10)
        .with_log_location(log_location(&dir))
        .with_types(TypeSpec::parse("float,float,float").unwrap())
        .with_fk_table(&fk, "expname")
        .with_fk_columns(vec!["mjd".to_string()], Some(TypeSpec::parse("float").unwrap()));

    let connector = Arc::new(RecordingConnector::default());
    let executed = Arc::clone(&connector.executed);
    let report = run(&options, vec![exp1, exp2], connector).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.summary.insert_workers_failed, 0);
    assert_eq!(report.summary.files_ingested, 2);
    assert_eq!(report.summary.load.rows_inserted, 3);
    assert_eq!(report.summary.load.rows_failed, 3);
    assert_eq!(report.summary.load.bundles_failed, 1);

    let executed = executed.lock().unwrap();
    assert_eq!(executed.len(), 1);
    assert!(executed[0]
        .0
        .starts_with("INSERT INTO atlas_detections (ra,dec,mag,mjd,htm10,htm13,htm16)"));
    assert_eq!(executed[0].1[3], FieldValue::Float(100.0));
}

#[tokio::test]
async fn test_typed_load() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "02a59000o0001c.dph", DETECTIONS);

    let options = IngestOptions::new("atlas_detections")
        .with_bundle_size(10)
        .with_log_location(log_location(&dir))
        .with_types(TypeSpec::parse("float,float,float").unwrap());

    let connector = Arc::new(RecordingConnector::default());
    let executed = Arc::clone(&connector.executed);
    let report = run(&options, vec![file], connector).await.unwrap();
    assert!(report.is_success());

    let executed = executed.lock().unwrap();
    assert_eq!(executed.len(), 1);
    let (text, values) = &executed[0];
    assert_eq!(
        text,
        "INSERT INTO atlas_detections (ra,dec,mag,htm10,htm13,htm16) VALUES (?,?,?,?,?,?),(?,?,?,?,?,?),(?,?,?,?,?,?);"
    );
    assert_eq!(values[0], FieldValue::Float(288.70392));
    assert_eq!(values[3], FieldValue::from("N02323033011"));
    assert_eq!(values[4], FieldValue::from("211"));
    assert_eq!(values[5], FieldValue::from("311"));
    assert_eq!(values[14], FieldValue::Null);
}

#[tokio::test]
async fn test_tab_delimited_with_column_trim() {
    let dir = TempDir::new().unwrap();
    let file = write(
        dir.path(),
        "ztf_summary.tsv.txt",
        "objectId\tra\tdec\tncand\nZTF1\t1.5\t2.5\t4\nZTF2\t3.5\t-4.5\t7\n",
    );

    let options = IngestOptions::new("objects")
        .with_delimiter(Delimiter::TAB)
        .with_bundle_size(5)
        .with_log_location(log_location(&dir))
        .with_columns(vec!["objectId".into(), "ncand".into()])
        .with_skip_htm(true)
        .with_types(TypeSpec::parse("str,int").unwrap());

    let connector = Arc::new(RecordingConnector::default());
    let executed = Arc::clone(&connector.executed);
    run(&options, vec![file], connector).await.unwrap();

    let executed = executed.lock().unwrap();
    assert_eq!(executed[0].0, "INSERT INTO objects (objectid,ncand) VALUES (?,?),(?,?);");
    assert_eq!(
        executed[0].1,
        vec![
            FieldValue::from("ZTF1"),
            FieldValue::Int(4),
            FieldValue::from("ZTF2"),
            FieldValue::Int(7)
        ]
    );
}

// ============================================================================
// Error handling
// ============================================================================

#[tokio::test]
async fn test_skip_policy_keeps_going() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "exp1.dat", DETECTIONS);

    let options = IngestOptions::new("atlas_detections")
        .with_skip_htm(true)
        .with_log_location(log_location(&dir));

    let connector = Arc::new(RecordingConnector {
        fail_on: Some(FieldValue::from("10.0")),
        ..Default::default()
    });
    let executed = Arc::clone(&connector.executed);
    let report = run(&options, vec![file], connector).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.summary.load.bundles, 3);
    assert_eq!(report.summary.load.bundles_failed, 1);
    assert_eq!(report.summary.load.rows_inserted, 2);
    assert_eq!(executed.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_abort_policy_fails_the_worker() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "exp1.dat", DETECTIONS);

    let options = IngestOptions::new("atlas_detections")
        .with_skip_htm(true)
        .with_error_policy(ErrorPolicy::Abort)
        .with_log_location(log_location(&dir));

    let connector = Arc::new(RecordingConnector {
        fail_on: Some(FieldValue::from("10.0")),
        ..Default::default()
    });
    let executed = Arc::clone(&connector.executed);
    let report = run(&options, vec![file], connector).await.unwrap();

    assert!(!report.is_success());
    assert_eq!(report.summary.insert_workers_failed, 1);
    assert_eq!(executed.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unreadable_file_is_skipped() {
    let dir = TempDir::new().unwrap();
    let good = write(dir.path(), "exp1.dat", DETECTIONS);
    let missing = dir.path().join("missing.dat");

    let options = IngestOptions::new("atlas_detections").with_log_location(log_location(&dir));
    let connector = Arc::new(RecordingConnector::default());
    let report = run(&options, vec![missing, good], connector).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.summary.files_failed, 1);
    assert_eq!(report.summary.files_ingested, 1);
    assert_eq!(report.summary.load.rows_inserted, 3);
}

#[tokio::test]
async fn test_packet_file_with_wrong_table() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "ztf_20240101.avro", "");

    let options = IngestOptions::new("atlas_detections").with_log_location(log_location(&dir));
    let report = run(&options, vec![file], Arc::new(RecordingConnector::default()))
        .await
        .unwrap();
    assert_eq!(report.summary.files_failed, 1);
}

#[tokio::test]
async fn test_missing_fk_table_fails_before_work() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "exp1.dat", DETECTIONS);

    let options = IngestOptions::new("atlas_detections")
        .with_log_location(log_location(&dir))
        .with_fk_table(dir.path().join("nope.tsv"), "expname");
    let connector = Arc::new(RecordingConnector::default());
    let executed = Arc::clone(&connector.executed);

    assert!(run(&options, vec![file], connector).await.is_err());
    assert!(executed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_insert_deadline() {
    let dir = TempDir::new().unwrap();
    let file = write(dir.path(), "exp1.dat", DETECTIONS);

    let options = IngestOptions::new("atlas_detections")
        .with_log_location(log_location(&dir))
        .with_insert_timeout(Duration::from_millis(100));
    let connector = Arc::new(RecordingConnector {
        delay: Some(Duration::from_secs(5)),
        ..Default::default()
    });

    let report = run(&options, vec![file], connector).await.unwrap();
    assert!(!report.is_success());
    assert_eq!(report.summary.insert_workers_failed, 1);
}

// ============================================================================
// Worker logs
// ============================================================================

#[tokio::test]
async fn test_worker_log_files() {
    let dir = TempDir::new().unwrap();
    let a = write(dir.path(), "exp1.dat", DETECTIONS);
    let b = write(dir.path(), "exp2.dat", DETECTIONS);
    let location = log_location(&dir);

    let options = IngestOptions::new("atlas_detections")
        .with_workers(2, 1)
        .with_log_location(location.clone());
    run(&options, vec![a, b], Arc::new(RecordingConnector::default()))
        .await
        .unwrap();

    let mut names: Vec<String> = std::fs::read_dir(&location)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let pid = std::process::id();
    let ingesters: Vec<&String> = names.iter().filter(|n| n.starts_with("ingester_")).collect();
    let inserters: Vec<&String> = names.iter().filter(|n| n.starts_with("inserter_")).collect();
    assert_eq!(ingesters.len(), 2);
    assert_eq!(inserters.len(), 2);
    assert!(ingesters[0].ends_with(&format!("_{}_0.log", pid)));
    assert!(inserters[0].ends_with(&format!("_{}_0.0.0.log", pid)));
    assert!(inserters[1].ends_with(&format!("_{}_1.0.0.log", pid)));

    let first = std::fs::read_to_string(format!("{}{}", location, ingesters[0])).unwrap();
    assert!(first.contains("exp1.dat"));
    assert!(!first.contains("exp2.dat"));
    assert!(first.contains("Done Parallel Processing"));

    let inserter = std::fs::read_to_string(format!("{}{}", location, inserters[0])).unwrap();
    assert!(inserter.contains("Connection Closed - exiting"));
    assert!(!inserter.contains("Ingesting"));
}
