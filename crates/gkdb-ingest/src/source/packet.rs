//! Transient alert packets (Avro object container files)
//!
//! Each alert carries one current detection (`candidate`) and a history of
//! earlier ones (`prv_candidates`). History entries without a `candid` are
//! upper limits from epochs where nothing was detected; they are kept apart
//! and reduced to a fixed set of fields.

use crate::error::{IngestError, Result};
use crate::htm;
use crate::record::{FieldValue, Record};
use apache_avro::types::Value;
use apache_avro::Reader;
use std::io::Read;
use tracing::debug;

/// Image stamps removed from every detection before loading
pub const IMAGE_FIELDS: [&str; 3] = ["cutoutDifference", "cutoutTemplate", "cutoutScience"];

/// Fields kept for non-detections, in output order
pub const NON_DETECTION_FIELDS: [&str; 9] = [
    "objectId",
    "jd",
    "fid",
    "diffmaglim",
    "nid",
    "field",
    "magzpsci",
    "magzpsciunc",
    "magzpscirms",
];

/// Level of the integer trixel id attached to detections
pub const PACKET_HTM_LEVEL: u32 = 16;

/// Which half of a packet file a table receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketStream {
    Candidates,
    NonCandidates,
}

impl PacketStream {
    /// Select by table name; `noncandidates` is checked first since it
    /// contains `candidates`
    pub fn for_table(table: &str) -> Result<Self> {
        if table.contains("noncandidates") {
            Ok(PacketStream::NonCandidates)
        } else if table.contains("candidates") {
            Ok(PacketStream::Candidates)
        } else {
            Err(IngestError::config(format!(
                "Table '{}' is neither a candidates nor a noncandidates table",
                table
            )))
        }
    }
}

/// Detections and non-detections of one packet file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PacketData {
    pub candidates: Vec<Record>,
    pub noncandidates: Vec<Record>,
}

impl PacketData {
    pub fn into_stream(self, stream: PacketStream) -> Vec<Record> {
        match stream {
            PacketStream::Candidates => self.candidates,
            PacketStream::NonCandidates => self.noncandidates,
        }
    }

    /// Split one alert into its detections and non-detections
    pub fn add_alert(&mut self, alert: Value) -> Result<()> {
        let mut fields = record_fields(alert)?;
        let object_id = fields
            .iter()
            .find(|(name, _)| name == "objectId")
            .and_then(|(_, v)| scalar(v))
            .unwrap_or(FieldValue::Null);

        let mut detections = Vec::new();
        if let Some(index) = fields.iter().position(|(name, _)| name == "candidate") {
            detections.push(fields.swap_remove(index).1);
        } else {
            return Err(IngestError::Packet("alert has no candidate".to_string()));
        }
        if let Some(index) = fields.iter().position(|(name, _)| name == "prv_candidates") {
            match unwrap_union(fields.swap_remove(index).1) {
                Value::Array(history) => detections.extend(history),
                Value::Null => {},
                other => {
                    return Err(IngestError::Packet(format!(
                        "prv_candidates is not an array: {:?}",
                        other
                    )))
                },
            }
        }

        for detection in detections {
            let mut record = to_record(detection)?;
            for image in IMAGE_FIELDS {
                record.shift_remove(image);
            }
            record.insert("objectId".to_string(), object_id.clone());

            let detected = record
                .get("candid")
                .is_some_and(|c| !c.is_null() && *c != FieldValue::Int(0));
            if detected {
                self.candidates.push(record);
            } else {
                self.noncandidates.push(non_detection(&record));
            }
        }
        Ok(())
    }

    /// Add an `htm16` integer id from each detection's `ra`/`dec`
    pub fn attach_htm16(&mut self) -> Result<()> {
        for record in &mut self.candidates {
            let coordinate = |column: &str| {
                record.get(column).and_then(FieldValue::as_f64).ok_or_else(|| {
                    IngestError::Coordinate {
                        column: column.to_string(),
                        value: record.get(column).map(|v| v.to_string()).unwrap_or_default(),
                    }
                })
            };
            let id = htm::id(coordinate("ra")?, coordinate("dec")?, PACKET_HTM_LEVEL)?;
            let id = i64::try_from(id)
                .map_err(|_| IngestError::config(format!("HTM id {} out of range", id)))?;
            record.insert("htm16".to_string(), FieldValue::Int(id));
        }
        Ok(())
    }
}

/// Read every alert in an Avro container
pub fn read_packets<R: Read>(reader: R, inline_htm16: bool) -> Result<PacketData> {
    let mut data = PacketData::default();
    for alert in Reader::new(reader)? {
        data.add_alert(alert?)?;
    }
    debug!(
        candidates = data.candidates.len(),
        noncandidates = data.noncandidates.len(),
        "Read packet file"
    );

    if inline_htm16 {
        data.attach_htm16()?;
    }
    Ok(data)
}

fn non_detection(record: &Record) -> Record {
    NON_DETECTION_FIELDS
        .iter()
        .map(|&name| {
            let value = record.get(name).cloned().unwrap_or(FieldValue::Null);
            (name.to_string(), value)
        })
        .collect()
}

fn unwrap_union(value: Value) -> Value {
    match value {
        Value::Union(_, inner) => unwrap_union(*inner),
        other => other,
    }
}

fn record_fields(value: Value) -> Result<Vec<(String, Value)>> {
    match unwrap_union(value) {
        Value::Record(fields) => Ok(fields),
        other => Err(IngestError::Packet(format!("expected a record, got {:?}", other))),
    }
}

fn to_record(value: Value) -> Result<Record> {
    Ok(record_fields(value)?
        .into_iter()
        .filter_map(|(name, value)| scalar(&value).map(|v| (name, v)))
        .collect())
}

/// Scalar view of an Avro value; nested and binary values have none
fn scalar(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Null => Some(FieldValue::Null),
        Value::Boolean(b) => Some(FieldValue::Bool(*b)),
        Value::Int(i) => Some(FieldValue::Int(i64::from(*i))),
        Value::Long(l) => Some(FieldValue::Int(*l)),
        Value::Float(f) => Some(FieldValue::Float(f64::from(*f))),
        Value::Double(d) => Some(FieldValue::Float(*d)),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        Value::Enum(_, symbol) => Some(FieldValue::Text(symbol.clone())),
        Value::Union(_, inner) => scalar(inner),
        _ => None,
    }
}
