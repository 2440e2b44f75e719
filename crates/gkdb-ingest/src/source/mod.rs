//! Input files: delimited text tables and alert packet containers
//!
//! Files whose name contains `.gz` are gunzipped on the fly. Files whose
//! name contains `avro` are read as alert packets; everything else is read
//! as a delimited table with a header row.

pub mod delimited;
pub mod packet;

pub use delimited::{read_delimited, Delimiter};
pub use packet::{read_packets, PacketData, PacketStream};

use crate::error::{IngestError, Result};
use crate::record::Record;
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

/// How a file's records are encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Delimited,
    Packet,
}

impl SourceFormat {
    pub fn detect(path: &Path) -> Self {
        if file_name(path).contains("avro") {
            SourceFormat::Packet
        } else {
            SourceFormat::Delimited
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Settings shared by every file read in a run
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub delimiter: Delimiter,
    /// Target table; selects the packet stream
    pub table: String,
    /// Attach an integer `htm16` id to packet detections
    pub packet_htm16: bool,
}

impl ReaderOptions {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            delimiter: Delimiter::default(),
            table: table.into(),
            packet_htm16: true,
        }
    }

    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_packet_htm16(mut self, enabled: bool) -> Self {
        self.packet_htm16 = enabled;
        self
    }
}

/// Open `path`, decompressing gzip input
pub fn open_input(path: &Path) -> Result<Box<dyn Read + Send>> {
    let file = File::open(path)
        .map_err(|e| IngestError::source(path.display().to_string(), e.to_string()))?;
    if file_name(path).contains(".gz") {
        Ok(Box::new(GzDecoder::new(BufReader::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Read every record of one input file
pub fn read_records(path: &Path, options: &ReaderOptions) -> Result<Vec<Record>> {
    let reader = open_input(path)?;
    let source = path.display().to_string();

    match SourceFormat::detect(path) {
        SourceFormat::Delimited => read_delimited(reader, options.delimiter, &source),
        SourceFormat::Packet => {
            let stream = PacketStream::for_table(&options.table)?;
            Ok(read_packets(reader, options.packet_htm16)?.into_stream(stream))
        },
    }
}

/// Expand lists of input files, one path per line; blank lines are ignored
pub fn expand_file_lists(lists: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for list in lists {
        let reader = open_input(list)?;
        for line in BufReader::new(reader).lines() {
            let line = line.map_err(|e| IngestError::source(list.display().to_string(), e.to_string()))?;
            let entry = line.trim();
            if !entry.is_empty() {
                files.push(PathBuf::from(entry));
            }
        }
    }
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_format_detection() {
        assert_eq!(SourceFormat::detect(Path::new("/d/ztf_public_20240101.avro")), SourceFormat::Packet);
        assert_eq!(SourceFormat::detect(Path::new("/d/avro_dump/exp1.dat")), SourceFormat::Delimited);
        assert_eq!(SourceFormat::detect(Path::new("exp1.dat.gz")), SourceFormat::Delimited);
    }

    #[test]
    fn test_read_gzipped_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("02a59000o0001c.dph.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"#RA Dec mag\n10.5 -3.25 18.0\n").unwrap();
        encoder.finish().unwrap();

        let records = read_records(&path, &ReaderOptions::new("atlas_detections")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["Dec"], FieldValue::from("-3.25"));
    }

    #[test]
    fn test_packet_file_needs_candidates_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alerts.avro");
        std::fs::write(&path, b"not avro").unwrap();

        let err = read_records(&path, &ReaderOptions::new("atlas_detections")).unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }

    #[test]
    fn test_missing_file_is_source_error() {
        let err = read_records(Path::new("/nonexistent/x.dat"), &ReaderOptions::new("t")).unwrap_err();
        assert!(matches!(err, IngestError::Source { .. }));
    }

    #[test]
    fn test_expand_file_lists() {
        let dir = TempDir::new().unwrap();
        let list = dir.path().join("files.txt");
        std::fs::write(&list, "/data/a.dat\n\n  /data/b.dat.gz \n").unwrap();

        let files = expand_file_lists(&[list]).unwrap();
        assert_eq!(files, vec![PathBuf::from("/data/a.dat"), PathBuf::from("/data/b.dat.gz")]);
    }
}
