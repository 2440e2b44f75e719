//! Type coercion from schemaless text to typed column values
//!
//! Delimited inputs carry no schema, while the column store rejects a string
//! where it expects a number. The declared [`TypeSpec`] is applied
//! positionally to each record before it is bound into a statement.

use std::fmt;
use std::str::FromStr;

use crate::error::{IngestError, Result};
use crate::record::{FieldValue, Record};

/// Literal treated as null regardless of the configured marker
pub const NULL_LITERAL: &str = "NULL";

/// Default null marker of delimited survey files
pub const DEFAULT_NULL_MARKER: &str = "\\N";

/// Declared column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Str,
    Int,
    Float,
    Bool,
}

impl FromStr for ColumnType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "str" => Ok(ColumnType::Str),
            "int" => Ok(ColumnType::Int),
            "float" => Ok(ColumnType::Float),
            "bool" => Ok(ColumnType::Bool),
            other => Err(IngestError::config(format!(
                "Unknown column type '{}' (expected str, int, float or bool)",
                other
            ))),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ColumnType::Str => "str",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::Bool => "bool",
        })
    }
}

/// Ordered column types aligned with a record's columns
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeSpec(Vec<ColumnType>);

impl TypeSpec {
    pub fn new(types: Vec<ColumnType>) -> Self {
        Self(types)
    }

    /// Parse a comma separated type list such as `str,float,int`
    pub fn parse(list: &str) -> Result<Self> {
        list.split(',')
            .map(ColumnType::from_str)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Insert-phase type list
    ///
    /// Foreign-key types are appended to the input types, followed by three
    /// `str` entries for the HTM columns when annotation is on. Without input
    /// types the records are passed through untyped.
    pub fn combined(
        input: Option<&TypeSpec>,
        foreign_key: Option<&TypeSpec>,
        with_htm: bool,
    ) -> Option<TypeSpec> {
        let mut types = input?.0.clone();
        if let Some(fk) = foreign_key {
            types.extend_from_slice(&fk.0);
        }
        if with_htm {
            types.extend([ColumnType::Str; 3]);
        }
        Some(Self(types))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn types(&self) -> &[ColumnType] {
        &self.0
    }
}

/// Returns the stripped value, or `marker` when the value is blank
pub fn null_value(value: &str, marker: &str) -> String {
    let stripped = value.trim();
    if stripped.is_empty() {
        marker.to_string()
    } else {
        stripped.to_string()
    }
}

/// `"true"`/`"false"` become `"1"`/`"0"` so numeric columns accept them
fn normalize_bool(value: &str) -> &str {
    match value {
        "true" => "1",
        "false" => "0",
        other => other,
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Applies a [`TypeSpec`] to records
#[derive(Debug, Clone)]
pub struct Coercer {
    null_marker: String,
}

impl Default for Coercer {
    fn default() -> Self {
        Self::new(DEFAULT_NULL_MARKER)
    }
}

impl Coercer {
    pub fn new(null_marker: impl Into<String>) -> Self {
        Self {
            null_marker: null_marker.into(),
        }
    }

    pub fn null_marker(&self) -> &str {
        &self.null_marker
    }

    /// True for blank text, the `NULL` literal, and the configured marker
    pub fn is_null(&self, raw: &str) -> bool {
        let stripped = raw.trim();
        stripped.is_empty() || stripped == NULL_LITERAL || stripped == self.null_marker
    }

    /// Convert one field to `target`
    pub fn coerce_value(
        &self,
        column: &str,
        value: &FieldValue,
        target: ColumnType,
    ) -> Result<FieldValue> {
        let fail = |shown: String| IngestError::Coercion {
            column: column.to_string(),
            value: shown,
            target: target.to_string(),
        };

        match value {
            FieldValue::Null => Ok(FieldValue::Null),
            FieldValue::Text(raw) => {
                if self.is_null(raw) {
                    return Ok(FieldValue::Null);
                }
                let stripped = normalize_bool(raw.trim());
                match target {
                    ColumnType::Str => Ok(FieldValue::Text(stripped.to_string())),
                    ColumnType::Int => stripped
                        .parse::<i64>()
                        .map(FieldValue::Int)
                        .map_err(|_| fail(raw.clone())),
                    ColumnType::Float => stripped
                        .parse::<f64>()
                        .map(FieldValue::Float)
                        .map_err(|_| fail(raw.clone())),
                    ColumnType::Bool => parse_bool(stripped)
                        .map(FieldValue::Bool)
                        .ok_or_else(|| fail(raw.clone())),
                }
            },
            FieldValue::Int(i) => Ok(match target {
                ColumnType::Str => FieldValue::Text(i.to_string()),
                ColumnType::Int => FieldValue::Int(*i),
                ColumnType::Float => FieldValue::Float(*i as f64),
                ColumnType::Bool => FieldValue::Bool(*i != 0),
            }),
            FieldValue::Float(x) => match target {
                ColumnType::Str => Ok(FieldValue::Text(x.to_string())),
                ColumnType::Float => Ok(FieldValue::Float(*x)),
                ColumnType::Int if x.is_finite() && x.fract() == 0.0 => {
                    Ok(FieldValue::Int(*x as i64))
                },
                ColumnType::Int | ColumnType::Bool => Err(fail(x.to_string())),
            },
            FieldValue::Bool(b) => Ok(match target {
                ColumnType::Str => FieldValue::Text(b.to_string()),
                ColumnType::Int => FieldValue::Int(i64::from(*b)),
                ColumnType::Float => FieldValue::Float(if *b { 1.0 } else { 0.0 }),
                ColumnType::Bool => FieldValue::Bool(*b),
            }),
        }
    }

    /// Coerce the values of `columns` (in order) from `record`
    ///
    /// Fails without partial output when the type list does not match the
    /// column count, a column is missing, or any cast fails.
    pub fn coerce_row(
        &self,
        record: &Record,
        columns: &[String],
        spec: &TypeSpec,
    ) -> Result<Vec<FieldValue>> {
        if columns.len() != spec.len() {
            return Err(IngestError::TypeMismatch {
                keys: columns.len(),
                types: spec.len(),
            });
        }

        columns
            .iter()
            .zip(spec.types())
            .map(|(column, ty)| {
                let value = record
                    .get(column)
                    .ok_or_else(|| IngestError::MissingColumn(column.clone()))?;
                self.coerce_value(column, value, *ty)
            })
            .collect()
    }
}
