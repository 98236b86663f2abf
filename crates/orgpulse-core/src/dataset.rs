//! In-memory tabular dataset handed to the publish engine.
//!
//! A `Dataset` has a fixed, ordered column set and rows of scalar values.
//! It is immutable input from the engine's point of view: the report builders
//! produce it, the staging store serializes it, and the batch fallback walks
//! it row by row.

use chrono::NaiveDate;

use crate::sanitize::format_date;

/// Logical field types understood by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Double,
    Bool,
    Date,
}

impl FieldKind {
    /// The sink-side field type this kind publishes as.
    ///
    /// Booleans travel as their rendered strings, so they publish as a
    /// string field like text does.
    pub fn wire_type(&self) -> &'static str {
        match self {
            FieldKind::Text | FieldKind::Bool => "esriFieldTypeString",
            FieldKind::Integer => "esriFieldTypeInteger",
            FieldKind::Double => "esriFieldTypeDouble",
            FieldKind::Date => "esriFieldTypeDate",
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub kind: FieldKind,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Double)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Bool)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldKind::Date)
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Optional integer helper for record builders.
    pub fn opt_int(value: Option<i64>) -> Self {
        match value {
            Some(n) => Value::Int(n),
            None => Value::Null,
        }
    }

    /// Optional date helper for record builders.
    pub fn opt_date(value: Option<NaiveDate>) -> Self {
        match value {
            Some(d) => Value::Date(d),
            None => Value::Null,
        }
    }

    /// Render the value as it appears in a staging file cell.
    ///
    /// Dates become `YYYY/MM/DD`, nulls are empty, booleans use the
    /// capitalized form the sink round-trips cleanly.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(true) => "True".to_string(),
            Value::Bool(false) => "False".to_string(),
            Value::Date(d) => format_date(*d),
        }
    }

    /// Convert to the wire form used by the row-insert primitive.
    ///
    /// Numbers stay numeric; dates and booleans travel as their string
    /// renderings, matching what the bulk path writes.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Int(n) => serde_json::Value::from(*n),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Bool(_) | Value::Date(_) => serde_json::Value::String(self.render()),
        }
    }
}

/// An ordered collection of rows sharing one column set.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row. The row must be aligned with the column set.
    pub fn push_row(&mut self, row: Vec<Value>) {
        debug_assert_eq!(row.len(), self.columns.len(), "row/column arity mismatch");
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Value of a named column in a given row.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    /// Serialize the dataset in the staging-file form: a header row of
    /// column names followed by one record per row, cells rendered via
    /// [`Value::render`].
    pub fn to_csv(&self) -> Result<String, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.columns.iter().map(|c| c.name.as_str()))?;
        for row in &self.rows {
            writer.write_record(row.iter().map(Value::render))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> Dataset {
        let mut ds = Dataset::new(vec![
            Column::text("group_id"),
            Column::integer("member_count"),
            Column::boolean("is_empty"),
            Column::date("created"),
        ]);
        ds.push_row(vec![
            Value::Text("abc123".into()),
            Value::Int(7),
            Value::Bool(false),
            Value::Date(NaiveDate::from_ymd_opt(2024, 1, 28).unwrap()),
        ]);
        ds.push_row(vec![Value::Text("def456".into()), Value::Null, Value::Bool(true), Value::Null]);
        ds
    }

    #[test]
    fn csv_renders_dates_bools_and_nulls() {
        let csv = sample().to_csv().unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next().unwrap(), "group_id,member_count,is_empty,created");
        assert_eq!(lines.next().unwrap(), "abc123,7,False,2024/01/28");
        assert_eq!(lines.next().unwrap(), "def456,,True,");
    }

    #[test]
    fn value_lookup_by_column_name() {
        let ds = sample();
        assert_eq!(ds.value(0, "member_count"), Some(&Value::Int(7)));
        assert_eq!(ds.value(1, "member_count"), Some(&Value::Null));
        assert_eq!(ds.value(0, "missing"), None);
    }

    #[test]
    fn wire_form_keeps_numbers_numeric() {
        assert_eq!(Value::Int(3).to_wire(), serde_json::json!(3));
        assert_eq!(Value::Bool(true).to_wire(), serde_json::json!("True"));
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()).to_wire(),
            serde_json::json!("2024/03/01")
        );
        assert_eq!(Value::Null.to_wire(), serde_json::Value::Null);
    }
}
