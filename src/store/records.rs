//! Column-stable record batches exchanged between producers and storage.
//!
//! Generated entities are typed structs inside `producer::entities`; the
//! executor and the storage layer only ever see [`RecordBatch`] — a table
//! name, an ordered column list, and rows of [`Scalar`] values.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One database-bindable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
}

impl Scalar {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Scalar::Float(v) => Some(*v),
            Scalar::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Scalar::Date(d) => Some(*d),
            Scalar::Timestamp(ts) => Some(ts.date_naive()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<Option<String>> for Scalar {
    fn from(value: Option<String>) -> Self {
        value.map_or(Scalar::Null, Scalar::Text)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<Option<f64>> for Scalar {
    fn from(value: Option<f64>) -> Self {
        value.map_or(Scalar::Null, Scalar::Float)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<NaiveDate> for Scalar {
    fn from(value: NaiveDate) -> Self {
        Scalar::Date(value)
    }
}

impl From<Option<NaiveDate>> for Scalar {
    fn from(value: Option<NaiveDate>) -> Self {
        value.map_or(Scalar::Null, Scalar::Date)
    }
}

impl From<DateTime<Utc>> for Scalar {
    fn from(value: DateTime<Utc>) -> Self {
        Scalar::Timestamp(value)
    }
}

/// Materialized rows bound for (or loaded from) one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordBatch {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

impl RecordBatch {
    #[must_use]
    pub fn new(table: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            table: table.into(),
            columns: columns.iter().map(ToString::to_string).collect(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn from_rows(table: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Self {
        Self {
            table: table.into(),
            columns,
            rows,
        }
    }

    /// Append one row. Rows with the wrong arity are a programming error
    /// in the producing code, so this is debug-asserted rather than fallible.
    pub fn push_row(&mut self, row: Vec<Scalar>) {
        debug_assert_eq!(row.len(), self.columns.len());
        self.rows.push(row);
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<Scalar>] {
        &self.rows
    }

    #[must_use]
    pub fn record(&self, idx: usize) -> Record<'_> {
        Record {
            columns: &self.columns,
            values: &self.rows[idx],
        }
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    /// Borrowed view over a contiguous chunk of rows, for batched imports.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> RecordSlice<'_> {
        RecordSlice {
            table: &self.table,
            columns: &self.columns,
            rows: &self.rows[start..end],
        }
    }

    #[must_use]
    pub fn as_slice(&self) -> RecordSlice<'_> {
        self.slice(0, self.rows.len())
    }
}

/// Borrowed window over a [`RecordBatch`]; what `Storage::import_batch`
/// receives so chunking never clones rows.
#[derive(Debug, Clone, Copy)]
pub struct RecordSlice<'a> {
    pub table: &'a str,
    pub columns: &'a [String],
    pub rows: &'a [Vec<Scalar>],
}

impl RecordSlice<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One row viewed by column name, the shape producers consume their
/// dependencies through.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [Scalar],
}

impl<'a> Record<'a> {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&'a Scalar> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    #[must_use]
    pub fn text(&self, column: &str) -> Option<&'a str> {
        self.get(column).and_then(Scalar::as_text)
    }

    #[must_use]
    pub fn bool(&self, column: &str) -> Option<bool> {
        self.get(column).and_then(Scalar::as_bool)
    }

    #[must_use]
    pub fn date(&self, column: &str) -> Option<NaiveDate> {
        self.get(column).and_then(Scalar::as_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_batch() -> RecordBatch {
        let mut batch = RecordBatch::new("customer", &["customer_id", "credit_score", "is_vip"]);
        batch.push_row(vec![
            Scalar::from("C001"),
            Scalar::from(712_i64),
            Scalar::from(true),
        ]);
        batch.push_row(vec![
            Scalar::from("C002"),
            Scalar::from(640_i64),
            Scalar::from(false),
        ]);
        batch
    }

    #[test]
    fn record_lookup_by_column() {
        let batch = sample_batch();
        let record = batch.record(0);
        assert_eq!(record.text("customer_id"), Some("C001"));
        assert_eq!(record.get("credit_score").and_then(Scalar::as_int), Some(712));
        assert_eq!(record.bool("is_vip"), Some(true));
        assert_eq!(record.get("missing"), None);
    }

    #[test]
    fn slicing_preserves_table_and_columns() {
        let batch = sample_batch();
        let slice = batch.slice(1, 2);
        assert_eq!(slice.table, "customer");
        assert_eq!(slice.len(), 1);
        assert_eq!(slice.columns.len(), 3);
    }

    #[test]
    fn scalar_coercions() {
        assert_eq!(Scalar::Int(3).as_float(), Some(3.0));
        assert!(Scalar::Null.is_null());
        assert_eq!(Scalar::from(None::<f64>), Scalar::Null);
    }
}
