//! Materialized query results.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};

/// Shape of the rows returned by a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchMode {
    /// Rows keyed by column name.
    #[default]
    Associative,
    /// Rows as positional values in column order.
    Numeric,
}

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int(v) => write!(f, "{}", v),
            Value::UInt(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Bytes(v) => f.write_str(&String::from_utf8_lossy(v)),
            Value::Date(v) => write!(f, "{}", v.format("%Y-%m-%d")),
            Value::Time(v) => write!(f, "{}", v.format("%H:%M:%S")),
            Value::DateTime(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

/// One result row, shaped according to the [`FetchMode`] it was fetched with.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Associative(Vec<(String, Value)>),
    Numeric(Vec<Value>),
}

impl Row {
    /// Shape decoded cells into a row.
    ///
    /// In associative mode a repeated column name keeps the position of its
    /// first occurrence and the value of its last.
    pub fn from_cells(columns: &[String], cells: Vec<Value>, mode: FetchMode) -> Self {
        match mode {
            FetchMode::Numeric => Row::Numeric(cells),
            FetchMode::Associative => {
                let mut pairs: Vec<(String, Value)> = Vec::with_capacity(cells.len());
                for (name, value) in columns.iter().zip(cells) {
                    match pairs.iter_mut().find(|(existing, _)| existing == name) {
                        Some(slot) => slot.1 = value,
                        None => pairs.push((name.clone(), value)),
                    }
                }
                Row::Associative(pairs)
            }
        }
    }

    /// Value at a position.
    pub fn get(&self, index: usize) -> Option<&Value> {
        match self {
            Row::Numeric(values) => values.get(index),
            Row::Associative(pairs) => pairs.get(index).map(|(_, v)| v),
        }
    }

    /// Value by column name. Always `None` for numeric rows.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        match self {
            Row::Numeric(_) => None,
            Row::Associative(pairs) => pairs.iter().find(|(k, _)| k == name).map(|(_, v)| v),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Row::Numeric(values) => values.len(),
            Row::Associative(pairs) => pairs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Row::Numeric(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for value in values {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
            Row::Associative(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (name, value) in pairs {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
        }
    }
}

/// All rows produced by one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    /// Column names in result order; empty when the statement returned no rows
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_associative_row_keeps_column_order() {
        let row = Row::from_cells(
            &columns(&["sid", "active"]),
            vec![Value::Int(42), "Y".into()],
            FetchMode::Associative,
        );
        assert_eq!(row.get_by_name("sid"), Some(&Value::Int(42)));
        assert_eq!(row.get(1), Some(&Value::Text("Y".to_string())));
    }

    #[test]
    fn test_associative_duplicate_column_keeps_last_value() {
        let row = Row::from_cells(
            &columns(&["id", "name", "id"]),
            vec![Value::Int(1), "a".into(), Value::Int(2)],
            FetchMode::Associative,
        );
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(0), Some(&Value::Int(2)));
        assert_eq!(row.get_by_name("name"), Some(&Value::Text("a".to_string())));
    }

    #[test]
    fn test_numeric_row_has_no_names() {
        let row = Row::from_cells(&columns(&["Tables_in_lime"]), vec!["lime_users".into()], FetchMode::Numeric);
        assert_eq!(row.get(0).and_then(Value::as_str), Some("lime_users"));
        assert!(row.get_by_name("Tables_in_lime").is_none());
    }

    #[test]
    fn test_display_values() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::UInt(7).to_string(), "7");
        assert_eq!(Value::Bytes(b"lime".to_vec()).to_string(), "lime");
        let date = NaiveDate::from_ymd_opt(2018, 11, 6).unwrap();
        assert_eq!(Value::Date(date).to_string(), "2018-11-06");
    }

    #[test]
    fn test_serialize_rows() {
        let assoc = Row::from_cells(&columns(&["b", "a"]), vec![Value::Int(1), Value::Null], FetchMode::Associative);
        assert_eq!(serde_json::to_string(&assoc).unwrap(), r#"{"b":1,"a":null}"#);

        let numeric = Row::Numeric(vec!["lime_surveys".into()]);
        assert_eq!(serde_json::to_string(&numeric).unwrap(), r#"["lime_surveys"]"#);
    }
}
