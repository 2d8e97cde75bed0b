use std::fmt;

use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue};
use serde_json::Value;

/// A scalar bound to one `?` placeholder.
///
/// Record values arrive as JSON; this is the shape they take once they are handed to the store.
/// Type checking beyond that is left to the store itself.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&Value> for SqlValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => SqlValue::Integer(i),
                // u64 above i64::MAX and floats
                None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => SqlValue::Text(s.clone()),
            // nested structures are stored as their JSON text
            Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
        }
    }
}

impl From<Option<&Value>> for SqlValue {
    fn from(value: Option<&Value>) -> Self {
        value.map(SqlValue::from).unwrap_or(SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Null => ToSqlOutput::Owned(SqliteValue::Null),
            SqlValue::Integer(i) => ToSqlOutput::Owned(SqliteValue::Integer(*i)),
            SqlValue::Real(f) => ToSqlOutput::Owned(SqliteValue::Real(*f)),
            SqlValue::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Integer(i) => write!(f, "{}", i),
            SqlValue::Real(r) => write!(f, "{}", r),
            SqlValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_scalars() {
        assert_eq!(SqlValue::from(&json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from(&json!(42)), SqlValue::Integer(42));
        assert_eq!(SqlValue::from(&json!(-7)), SqlValue::Integer(-7));
        assert_eq!(SqlValue::from(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(SqlValue::from(&json!("x")), SqlValue::Text("x".to_string()));
        assert_eq!(SqlValue::from(&json!(true)), SqlValue::Integer(1));
        assert_eq!(SqlValue::from(&json!(false)), SqlValue::Integer(0));
    }

    #[test]
    fn test_large_unsigned_becomes_real() {
        assert_eq!(SqlValue::from(&json!(u64::MAX)), SqlValue::Real(u64::MAX as f64));
    }

    #[test]
    fn test_nested_values_are_json_text() {
        assert_eq!(SqlValue::from(&json!([1, 2])), SqlValue::Text("[1,2]".to_string()));
        assert_eq!(SqlValue::from(&json!({ "k": "v" })), SqlValue::Text("{\"k\":\"v\"}".to_string()));
    }

    #[test]
    fn test_absent_is_null() {
        assert!(SqlValue::from(None).is_null());
    }
}
