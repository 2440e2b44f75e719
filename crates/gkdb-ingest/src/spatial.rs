//! Spatial annotation of records with HTM columns
//!
//! Only the level-16 name is computed. Because every coarser trixel name is
//! a prefix of the finer one, the 18-character name is stored across three
//! columns: `htm10` holds the full level-10 name and `htm13`/`htm16` hold the
//! three digits each that extend it to levels 13 and 16.
//!
//! ```text
//! ra, dec = 288.70392, 9.99498
//! htm10   = N02323033011
//! htm13   =             211
//! htm16   =                311
//! ```

use crate::error::{IngestError, Result};
use crate::htm;
use crate::record::{FieldValue, Record};

/// Level computed for every annotated record
pub const HTM_LEVEL: u32 = 16;

pub const COARSE_COLUMN: &str = "htm10";
pub const MEDIUM_COLUMN: &str = "htm13";
pub const FINE_COLUMN: &str = "htm16";

const COARSE_END: usize = 12;
const MEDIUM_END: usize = 15;
const FINE_END: usize = 18;

/// Split a level-16 name into its level-10 prefix and two 3-digit suffixes
pub fn split_name(name: &str) -> Result<(&str, &str, &str)> {
    if name.len() != FINE_END || !name.is_ascii() {
        return Err(IngestError::config(format!(
            "Expected an {}-character level-{} HTM name, got '{}'",
            FINE_END, HTM_LEVEL, name
        )));
    }
    Ok((
        &name[..COARSE_END],
        &name[COARSE_END..MEDIUM_END],
        &name[MEDIUM_END..FINE_END],
    ))
}

/// Adds `htm10`, `htm13` and `htm16` to records from their RA/Dec columns
#[derive(Debug, Clone)]
pub struct SpatialAnnotator {
    ra_column: String,
    dec_column: String,
}

impl SpatialAnnotator {
    pub fn new(ra_column: impl Into<String>, dec_column: impl Into<String>) -> Self {
        Self {
            ra_column: ra_column.into(),
            dec_column: dec_column.into(),
        }
    }

    fn coordinate(&self, record: &Record, column: &str) -> Result<f64> {
        let value = record
            .get(column)
            .ok_or_else(|| IngestError::MissingColumn(column.to_string()))?;
        value.as_f64().ok_or_else(|| IngestError::Coordinate {
            column: column.to_string(),
            value: value.to_string(),
        })
    }

    /// `(ra, dec)` of every record, in order
    pub fn coordinates(&self, records: &[Record]) -> Result<Vec<(f64, f64)>> {
        records
            .iter()
            .map(|r| {
                Ok((
                    self.coordinate(r, &self.ra_column)?,
                    self.coordinate(r, &self.dec_column)?,
                ))
            })
            .collect()
    }

    /// Annotate every record, or none if any coordinate is unusable
    pub fn annotate(&self, records: &mut [Record]) -> Result<()> {
        let coords = self.coordinates(records)?;
        let names = htm::name_bulk(HTM_LEVEL, &coords)?;

        for (record, name) in records.iter_mut().zip(&names) {
            let (coarse, medium, fine) = split_name(name)?;
            record.insert(COARSE_COLUMN.to_string(), FieldValue::from(coarse));
            record.insert(MEDIUM_COLUMN.to_string(), FieldValue::from(medium));
            record.insert(FINE_COLUMN.to_string(), FieldValue::from(fine));
        }

        Ok(())
    }
}
