// ABOUTME: Driver-neutral row and value types moved from source to target
// ABOUTME: Each driver converts its native values to and from these

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// A single column value, owned and independent of the driver that read it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Exact numeric kept in its textual form to avoid precision loss.
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    /// Time of day or interval as `[-]HH:MM:SS[.ffffff]`; hours may exceed 24.
    Time(String),
    Json(serde_json::Value),
    Uuid(uuid::Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Textual rendering used when a target column only accepts text.
    ///
    /// Returns `None` for `Null` and for byte strings that are not UTF-8.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
            Value::Int(v) => Some(v.to_string()),
            Value::UInt(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Decimal(s) | Value::Text(s) | Value::Time(s) => Some(s.clone()),
            Value::Bytes(b) => String::from_utf8(b.clone()).ok(),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Some(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.f%:z").to_string()),
            Value::Json(j) => Some(j.to_string()),
            Value::Uuid(u) => Some(u.to_string()),
        }
    }

    /// Short type label for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Decimal(_) => "decimal",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "date",
            Value::DateTime(_) => "datetime",
            Value::Timestamp(_) => "timestamp",
            Value::Time(_) => "time",
            Value::Json(_) => "json",
            Value::Uuid(_) => "uuid",
        }
    }
}

/// One fetched row: column names paired with values, in projection order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row by pairing `columns` with `values` positionally.
    pub fn from_parts(columns: &[String], values: Vec<Value>) -> Self {
        Self {
            fields: columns.iter().cloned().zip(values).collect(),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.fields.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Values ordered to match `columns`; missing columns become `Null`.
    pub fn values_for(&self, columns: &[String]) -> Vec<Value> {
        columns
            .iter()
            .map(|c| self.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }
}
