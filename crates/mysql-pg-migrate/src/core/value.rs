//! SQL value types exchanged between the source reader, the row transformer
//! and the target writer.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{MigrateError, Result};

/// A single typed column value.
///
/// Values reach PostgreSQL as text parameters with an explicit cast
/// (`$1::text::integer`), so every variant has a canonical text form, see
/// [`SqlValue::to_text`]. The same text form is used as the key in the
/// identifier mapping store.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// 16-bit signed integer (smallint, tinyint).
    I16(i16),

    /// 32-bit signed integer (int, mediumint).
    I32(i32),

    /// 64-bit signed integer (bigint, unsigned int).
    I64(i64),

    /// 32-bit floating point.
    F32(f32),

    /// 64-bit floating point.
    F64(f64),

    /// Exact numeric (decimal, numeric, unsigned bigint).
    Decimal(Decimal),

    /// Character data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// UUID value.
    Uuid(Uuid),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Canonical text form, `None` for NULL.
    ///
    /// Booleans render as `1`/`0`, which PostgreSQL accepts for `boolean`
    /// and for the integer types MySQL `TINYINT(1)` flags usually land in.
    /// Bytes use PostgreSQL hex escape format (`\x0a0b`).
    #[must_use]
    pub fn to_text(&self) -> Option<String> {
        let text = match self {
            SqlValue::Null => return None,
            SqlValue::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            SqlValue::I16(n) => n.to_string(),
            SqlValue::I32(n) => n.to_string(),
            SqlValue::I64(n) => n.to_string(),
            SqlValue::F32(n) => n.to_string(),
            SqlValue::F64(n) => n.to_string(),
            SqlValue::Decimal(d) => d.to_string(),
            SqlValue::Text(s) => s.clone(),
            SqlValue::Bytes(b) => format!("\\x{}", hex::encode(b)),
            SqlValue::Uuid(u) => u.to_string(),
            SqlValue::Date(d) => d.to_string(),
            SqlValue::Time(t) => t.to_string(),
            SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        };
        Some(text)
    }

    /// Convert a scalar YAML value (a configured column default) to a value.
    pub fn from_yaml(value: &serde_yaml::Value) -> Result<Self> {
        match value {
            serde_yaml::Value::Null => Ok(SqlValue::Null),
            serde_yaml::Value::Bool(b) => Ok(SqlValue::Bool(*b)),
            serde_yaml::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(SqlValue::I64(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(SqlValue::F64(f))
                } else {
                    Err(MigrateError::Config(format!("unsupported numeric default: {}", n)))
                }
            }
            serde_yaml::Value::String(s) => Ok(SqlValue::Text(s.clone())),
            other => Err(MigrateError::Config(format!(
                "column default must be a scalar, got {:?}",
                other
            ))),
        }
    }

    /// Implied default for a non-nullable PostgreSQL column of `data_type`.
    ///
    /// Numeric types default to zero, booleans to false, character and
    /// document types to the empty string, temporal types to the Unix epoch
    /// and bytea to an empty byte string. Unknown types fall back to the
    /// empty string.
    #[must_use]
    pub fn default_for_type(data_type: &str) -> Self {
        let base = base_type_name(data_type);
        match base.as_str() {
            "integer" | "int" | "int2" | "int4" | "int8" | "bigint" | "smallint" | "serial"
            | "serial4" | "serial8" | "bigserial" | "smallserial" | "numeric" | "decimal"
            | "real" | "float4" | "float8" | "double precision" | "money" => SqlValue::I32(0),
            "boolean" | "bool" => SqlValue::Bool(false),
            "date" => SqlValue::Date(epoch_date()),
            "timestamp" | "timestamptz" | "timestamp without time zone"
            | "timestamp with time zone" => SqlValue::DateTime(epoch_date().and_time(NaiveTime::MIN)),
            "time" | "timetz" | "time without time zone" | "time with time zone" => {
                SqlValue::Time(NaiveTime::MIN)
            }
            "interval" => SqlValue::Text("0".to_string()),
            "bytea" => SqlValue::Bytes(Vec::new()),
            _ => SqlValue::Text(String::new()),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => write!(f, "{}", text),
            None => write!(f, "NULL"),
        }
    }
}

/// Lowercased type name without length/precision modifiers or array suffix.
fn base_type_name(data_type: &str) -> String {
    let lower = data_type.trim().to_lowercase();
    let without_mods = match lower.find('(') {
        Some(idx) => {
            // "timestamp(3) with time zone" keeps its suffix
            let close = lower[idx..].find(')').map(|c| idx + c + 1).unwrap_or(lower.len());
            format!("{}{}", lower[..idx].trim_end(), &lower[close..])
        }
        None => lower,
    };
    without_mods.trim_end_matches("[]").trim().to_string()
}

fn epoch_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_text() {
        assert_eq!(SqlValue::I32(42).to_text().as_deref(), Some("42"));
        assert_eq!(SqlValue::Bytes(vec![0x0a, 0xff]).to_text().as_deref(), Some("\\x0aff"));
        assert_eq!(SqlValue::Null.to_text(), None);
        assert_eq!(SqlValue::Null.to_string(), "NULL");
    }

    #[test]
    fn test_bool_text_loads_into_integer_and_boolean_columns() {
        // TINYINT(1) flags arrive as booleans and often land in smallint
        // columns; PostgreSQL parses "1" and "0" for both targets.
        assert_eq!(SqlValue::Bool(true).to_text().as_deref(), Some("1"));
        assert_eq!(SqlValue::Bool(false).to_text().as_deref(), Some("0"));
        assert_eq!(
            SqlValue::default_for_type("boolean").to_text().as_deref(),
            Some("0")
        );
    }

    #[test]
    fn test_default_for_type() {
        assert_eq!(SqlValue::default_for_type("integer"), SqlValue::I32(0));
        assert_eq!(SqlValue::default_for_type("numeric(10,2)"), SqlValue::I32(0));
        assert_eq!(SqlValue::default_for_type("BOOLEAN"), SqlValue::Bool(false));
        assert_eq!(
            SqlValue::default_for_type("character varying(255)"),
            SqlValue::Text(String::new())
        );
        assert_eq!(
            SqlValue::default_for_type("date").to_text().as_deref(),
            Some("1970-01-01")
        );
        assert_eq!(
            SqlValue::default_for_type("timestamp(3) with time zone").to_text().as_deref(),
            Some("1970-01-01 00:00:00.000000")
        );
        assert_eq!(SqlValue::default_for_type("bytea"), SqlValue::Bytes(Vec::new()));
        assert_eq!(SqlValue::default_for_type("tsvector"), SqlValue::Text(String::new()));
    }

    #[test]
    fn test_from_yaml() {
        let v: serde_yaml::Value = serde_yaml::from_str("7").unwrap();
        assert_eq!(SqlValue::from_yaml(&v).unwrap(), SqlValue::I64(7));
        let v: serde_yaml::Value = serde_yaml::from_str("'n/a'").unwrap();
        assert_eq!(SqlValue::from_yaml(&v).unwrap(), SqlValue::Text("n/a".into()));
        let v: serde_yaml::Value = serde_yaml::from_str("[1, 2]").unwrap();
        assert!(SqlValue::from_yaml(&v).is_err());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(SqlValue::from(None::<i32>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("AL")), SqlValue::Text("AL".into()));
    }
}
