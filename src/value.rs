//! Interface for working with typed field values.
//!
//! This module provides [`Value`] which represents a single cast value of a Table
//! Schema field, or a single cell read back from a [`DataFrame`](crate::DataFrame).
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::{Map, Value as JsonValue};

/// Represents any value a Table Schema field can be cast to.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Number(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Datetime(NaiveDateTime),
    /// A stored timestamp in nanoseconds since the Unix Epoch, as read from a
    /// `Timestamp(Nanosecond)` column.
    Timestamp(i64),
    Geopoint { lon: f64, lat: f64 },
    Array(Vec<JsonValue>),
    Object(Map<String, JsonValue>),
}

impl Value {
    /// Converts a JSON value structurally: numbers that fit in `i64` become
    /// integers, all other numbers become floats.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::Boolean(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            },
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::Array(items),
            JsonValue::Object(members) => Value::Object(members),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the textual form used by object storage columns, or `None` for
    /// [`Value::Null`].
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            value => Some(value.to_string()),
        }
    }
}

/// Converts a value stored in a data frame to its canonical native form.
///
/// NaN, which frames use for missing numbers, becomes [`Value::Null`] and stored
/// timestamps become [`Value::Datetime`]. Every other value is returned unchanged,
/// so applying this function twice is the same as applying it once.
///
/// # Examples
///
/// ```rust
/// use tableschema_arrow::{Value, to_native_value};
///
/// assert_eq!(to_native_value(Value::Number(f64::NAN)), Value::Null);
/// assert_eq!(to_native_value(Value::Integer(3)), Value::Integer(3));
/// ```
pub fn to_native_value(value: Value) -> Value {
    match value {
        Value::Number(n) if n.is_nan() => Value::Null,
        Value::Timestamp(nanos) => {
            Value::Datetime(DateTime::from_timestamp_nanos(nanos).naive_utc())
        },
        value => value,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            Value::Time(time) => write!(f, "{}", time.format("%H:%M:%S%.f")),
            Value::Datetime(datetime) => {
                write!(f, "{}", datetime.format("%Y-%m-%dT%H:%M:%S%.f"))
            },
            Value::Timestamp(nanos) => {
                let datetime = DateTime::from_timestamp_nanos(*nanos).naive_utc();
                write!(f, "{}", datetime.format("%Y-%m-%dT%H:%M:%S%.f"))
            },
            Value::Geopoint { lon, lat } => write!(f, "{lon}, {lat}"),
            Value::Array(items) => {
                f.write_str(&serde_json::to_string(items).map_err(|_| fmt::Error)?)
            },
            Value::Object(members) => {
                f.write_str(&serde_json::to_string(members).map_err(|_| fmt::Error)?)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn same(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits(),
            (a, b) => a == b,
        }
    }

    #[test]
    fn nan_becomes_null() {
        assert_eq!(to_native_value(Value::Number(f64::NAN)), Value::Null);
        assert_eq!(to_native_value(Value::Number(1.5)), Value::Number(1.5));
    }

    #[test]
    fn timestamp_becomes_datetime() {
        let datetime = NaiveDate::from_ymd_opt(2017, 11, 16).unwrap()
            .and_hms_nano_opt(22, 31, 8, 123_456_789).unwrap();
        let nanos = datetime.and_utc().timestamp_nanos_opt().unwrap();

        assert_eq!(to_native_value(Value::Timestamp(nanos)), Value::Datetime(datetime));
    }

    #[test]
    fn idempotent() {
        let values = vec![
            Value::Null,
            Value::Number(f64::NAN),
            Value::Number(f64::INFINITY),
            Value::Integer(-4),
            Value::Boolean(false),
            Value::String("NaN".to_string()),
            Value::Timestamp(0),
            Value::Time(NaiveTime::from_hms_opt(1, 2, 3).unwrap()),
            Value::Geopoint { lon: 1.0, lat: 2.0 },
            Value::Array(vec![json!(1)]),
        ];

        for value in values {
            let once = to_native_value(value.clone());
            let twice = to_native_value(once.clone());
            assert!(same(&once, &twice), "{value:?} is not stable");
        }
    }

    #[test]
    fn text_form() {
        assert_eq!(Value::Null.to_text(), None);
        assert_eq!(Value::String("a".to_string()).to_text().unwrap(), "a");
        assert_eq!(
            Value::Date(NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()).to_text().unwrap(),
            "2020-01-02"
        );
        assert_eq!(
            Value::Time(NaiveTime::from_hms_opt(10, 0, 5).unwrap()).to_text().unwrap(),
            "10:00:05"
        );
        assert_eq!(Value::Geopoint { lon: 1.5, lat: -2.0 }.to_text().unwrap(), "1.5, -2");
        assert_eq!(
            Value::from_json(json!({"a": [1, 2]})).to_text().unwrap(),
            r#"{"a":[1,2]}"#
        );
    }

    #[test]
    fn from_json() {
        assert_eq!(Value::from_json(json!(null)), Value::Null);
        assert_eq!(Value::from_json(json!(3)), Value::Integer(3));
        assert_eq!(Value::from_json(json!(3.5)), Value::Number(3.5));
        assert_eq!(Value::from_json(json!([1])), Value::Array(vec![json!(1)]));
    }
}
