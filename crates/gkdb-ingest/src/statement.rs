//! Multi-row insert statement construction

use crate::coercion::{Coercer, TypeSpec};
use crate::error::{IngestError, Result};
use crate::record::{FieldValue, Record};

/// Column name as written to the store: lowercase, hyphens removed
pub fn normalize_column(name: &str) -> String {
    name.to_lowercase().replace('-', "")
}

/// One bundle's `INSERT` text and its flattened positional values
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub text: String,
    pub values: Vec<FieldValue>,
}

impl InsertStatement {
    /// Build the statement for `rows`
    ///
    /// `columns` are the record keys in statement order. With a type list
    /// every value is coerced; without one values are bound as they are.
    pub fn build(
        table: &str,
        columns: &[String],
        rows: &[Record],
        types: Option<&TypeSpec>,
        coercer: &Coercer,
    ) -> Result<Self> {
        if columns.is_empty() {
            return Err(IngestError::config("Cannot insert records without columns"));
        }
        if let Some(column) = columns.iter().find(|c| c.contains('?')) {
            return Err(IngestError::config(format!(
                "Column '{}' contains a '?' and cannot be bound",
                column
            )));
        }

        let mut values = Vec::with_capacity(columns.len() * rows.len());
        for row in rows {
            match types {
                Some(spec) => values.extend(coercer.coerce_row(row, columns, spec)?),
                None => {
                    for column in columns {
                        let value = row
                            .get(column)
                            .ok_or_else(|| IngestError::MissingColumn(column.clone()))?;
                        values.push(value.clone());
                    }
                },
            }
        }

        Ok(Self {
            text: statement_text(table, columns, rows.len()),
            values,
        })
    }

}

/// `INSERT INTO <table> (<cols>) VALUES (?,..),(?,..);`
pub fn statement_text(table: &str, columns: &[String], rows: usize) -> String {
    let column_list = columns
        .iter()
        .map(|c| normalize_column(c))
        .collect::<Vec<_>>()
        .join(",");
    let row_placeholder = format!("({})", vec!["?"; columns.len()].join(","));
    let row_list = vec![row_placeholder.as_str(); rows].join(",");

    format!("INSERT INTO {} ({}) VALUES {};", table, column_list, row_list)
}

/// CQL literal for a value
pub fn cql_literal(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => "NULL".to_string(),
        FieldValue::Text(s) => format!("'{}'", s.replace('\'', "''")),
        FieldValue::Int(i) => i.to_string(),
        FieldValue::Float(x) if x.is_nan() => "NaN".to_string(),
        FieldValue::Float(x) if x.is_infinite() => {
            let sign = if *x > 0.0 { "" } else { "-" };
            format!("{}Infinity", sign)
        },
        FieldValue::Float(x) => format!("{:?}", x),
        FieldValue::Bool(b) => b.to_string(),
    }
}

/// Substitute `?` placeholders in `text` with literals, in order
///
/// Placeholders inside quoted identifiers or strings are not expected; the
/// statements built here contain only names and placeholders.
pub fn render_cql(text: &str, values: &[FieldValue]) -> Result<String> {
    let mut rendered = String::with_capacity(text.len() + values.len() * 8);
    let mut remaining = values.iter();

    for c in text.chars() {
        if c == '?' {
            let value = remaining.next().ok_or_else(|| {
                IngestError::config("Statement has more placeholders than values")
            })?;
            rendered.push_str(&cql_literal(value));
        } else {
            rendered.push(c);
        }
    }

    if remaining.next().is_some() {
        return Err(IngestError::config("Statement has more values than placeholders"));
    }
    Ok(rendered)
}
