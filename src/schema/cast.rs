//! Casting raw JSON values to typed [`Value`]s according to a field descriptor.
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use serde_json::Value as JsonValue;

use crate::value::Value;
use crate::schema::{Field, FieldType};

const TRUE_VALUES: &[&str] = &["true", "True", "TRUE", "1"];
const FALSE_VALUES: &[&str] = &["false", "False", "FALSE", "0"];
const NULL_VALUES: &[&str] = &["null", "none", "nil", "-"];

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
const DEFAULT_TIME_FORMAT: &str = "%H:%M:%S";
const DEFAULT_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// Patterns tried in order for the "any" format.
const ANY_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d.%m.%Y", "%d %B %Y", "%B %d, %Y",
];
const ANY_TIME_FORMATS: &[&str] = &[
    "%H:%M:%S", "%H:%M:%S%.f", "%H:%M", "%I:%M %p", "%I:%M:%S %p",
];
const ANY_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M",
];

/// An error casting a raw value to the declared type of a field.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CastError {
    /// The schema has no field with this name.
    #[error("Field \"{0}\" not found in schema")]
    UnknownField(String),

    /// The value is not a native structured value but may be a serialized JSON
    /// literal of one.
    #[error("Value {value} of field \"{field}\" is not a native {field_type}")]
    InvalidObjectType { field: String, field_type: FieldType, value: JsonValue },

    /// The value can't be cast to the declared type.
    #[error("Value {value} of field \"{field}\" can't be cast to {field_type}")]
    InvalidValue { field: String, field_type: FieldType, value: JsonValue },

    /// The value was cast but violates one of the field constraints.
    #[error("Value {value} of field \"{field}\" violates constraint \"{constraint}\"")]
    ConstraintViolation { field: String, constraint: &'static str, value: JsonValue },

    /// A constraint in the field descriptor can't be evaluated.
    #[error("Invalid constraint \"{constraint}\" on field \"{field}\": {message}")]
    InvalidConstraint { field: String, constraint: &'static str, message: String },
}

/// Casts `raw` to the type of `field`, treating JSON null and any string in
/// `missing_values` as a missing value, then checks the field constraints.
pub fn cast_value(
    field: &Field,
    raw: &JsonValue,
    missing_values: &[String]
) -> Result<Value, CastError> {
    if is_missing(raw, missing_values) {
        if field.constraints().is_required() {
            return Err(CastError::ConstraintViolation {
                field: field.name().to_string(),
                constraint: "required",
                value: raw.clone(),
            });
        }
        return Ok(Value::Null);
    }

    let value = cast_type(field, raw)?;
    check_constraints(field, raw, &value)?;

    Ok(value)
}

fn is_missing(raw: &JsonValue, missing_values: &[String]) -> bool {
    match raw {
        JsonValue::Null => true,
        JsonValue::String(s) => missing_values.iter().any(|missing| missing == s),
        _ => false,
    }
}

/// Casts a non-missing value, without checking constraints.
fn cast_type(field: &Field, raw: &JsonValue) -> Result<Value, CastError> {
    let invalid = || CastError::InvalidValue {
        field: field.name().to_string(),
        field_type: field.field_type(),
        value: raw.clone(),
    };
    let invalid_object = || CastError::InvalidObjectType {
        field: field.name().to_string(),
        field_type: field.field_type(),
        value: raw.clone(),
    };

    match field.field_type() {
        FieldType::String => {
            raw.as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(invalid)
        },
        FieldType::Integer => {
            let integer = match raw {
                JsonValue::Number(n) => n.as_i64().or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                        .map(|f| f as i64)
                }),
                JsonValue::String(s) => s.trim().parse::<i64>().ok(),
                _ => None,
            };
            integer.map(Value::Integer).ok_or_else(invalid)
        },
        FieldType::Number => {
            let number = match raw {
                JsonValue::Number(n) => n.as_f64(),
                // Also accepts NaN, inf and infinity in any case.
                JsonValue::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            number.map(Value::Number).ok_or_else(invalid)
        },
        FieldType::Boolean => {
            match raw {
                JsonValue::Bool(b) => Ok(Value::Boolean(*b)),
                JsonValue::String(s) if TRUE_VALUES.contains(&s.as_str()) => {
                    Ok(Value::Boolean(true))
                },
                JsonValue::String(s) if FALSE_VALUES.contains(&s.as_str()) => {
                    Ok(Value::Boolean(false))
                },
                _ => Err(invalid()),
            }
        },
        FieldType::Null => {
            match raw {
                JsonValue::String(s)
                    if NULL_VALUES.contains(&s.to_ascii_lowercase().as_str()) => {
                    Ok(Value::Null)
                },
                _ => Err(invalid()),
            }
        },
        FieldType::Array => {
            match raw {
                JsonValue::Array(items) => Ok(Value::Array(items.clone())),
                JsonValue::String(_) => Err(invalid_object()),
                _ => Err(invalid()),
            }
        },
        FieldType::Object => {
            match raw {
                JsonValue::Object(members) => Ok(Value::Object(members.clone())),
                JsonValue::String(_) => Err(invalid_object()),
                _ => Err(invalid()),
            }
        },
        FieldType::Geojson => {
            match raw {
                JsonValue::Object(members) if members.contains_key("type") => {
                    Ok(Value::Object(members.clone()))
                },
                JsonValue::String(_) => Err(invalid_object()),
                _ => Err(invalid()),
            }
        },
        FieldType::Date => {
            let s = raw.as_str().ok_or_else(invalid)?;
            parse_date(s, field.format()).map(Value::Date).ok_or_else(invalid)
        },
        FieldType::Time => {
            let s = raw.as_str().ok_or_else(invalid)?;
            parse_time(s, field.format()).map(Value::Time).ok_or_else(invalid)
        },
        FieldType::Datetime => {
            let s = raw.as_str().ok_or_else(invalid)?;
            parse_datetime(s, field.format()).map(Value::Datetime).ok_or_else(invalid)
        },
        FieldType::Geopoint => {
            parse_geopoint(raw, field.format())
                .filter(|(lon, lat)| {
                    (-180.0..=180.0).contains(lon) && (-90.0..=90.0).contains(lat)
                })
                .map(|(lon, lat)| Value::Geopoint { lon, lat })
                .ok_or_else(invalid)
        },
        FieldType::Any => Ok(Value::from_json(raw.clone())),
    }
}

/// Strips the legacy `fmt:` prefix of explicit patterns.
fn pattern(format: &str) -> &str {
    format.strip_prefix("fmt:").unwrap_or(format)
}

fn parse_date(s: &str, format: Option<&str>) -> Option<NaiveDate> {
    match format {
        None | Some("default") => NaiveDate::parse_from_str(s, DEFAULT_DATE_FORMAT).ok(),
        Some("any") => ANY_DATE_FORMATS.iter()
            .find_map(|f| NaiveDate::parse_from_str(s, f).ok()),
        Some(format) => NaiveDate::parse_from_str(s, pattern(format)).ok(),
    }
}

fn parse_time(s: &str, format: Option<&str>) -> Option<NaiveTime> {
    match format {
        None | Some("default") => NaiveTime::parse_from_str(s, DEFAULT_TIME_FORMAT).ok(),
        Some("any") => ANY_TIME_FORMATS.iter()
            .find_map(|f| NaiveTime::parse_from_str(s, f).ok()),
        Some(format) => NaiveTime::parse_from_str(s, pattern(format)).ok(),
    }
}

fn parse_datetime(s: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    let rfc3339 = || DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc());

    match format {
        None | Some("default") => {
            NaiveDateTime::parse_from_str(s, DEFAULT_DATETIME_FORMAT).ok()
                .or_else(rfc3339)
        },
        Some("any") => rfc3339().or_else(|| {
            ANY_DATETIME_FORMATS.iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        }),
        Some(format) => NaiveDateTime::parse_from_str(s, pattern(format)).ok(),
    }
}

fn parse_geopoint(raw: &JsonValue, format: Option<&str>) -> Option<(f64, f64)> {
    match (format.unwrap_or("default"), raw) {
        ("default", JsonValue::String(s)) => {
            let (lon, lat) = s.split_once(',')?;
            Some((lon.trim().parse().ok()?, lat.trim().parse().ok()?))
        },
        ("array", JsonValue::Array(items)) if items.len() == 2 => {
            Some((items[0].as_f64()?, items[1].as_f64()?))
        },
        ("object", JsonValue::Object(members)) if members.len() == 2 => {
            Some((members.get("lon")?.as_f64()?, members.get("lat")?.as_f64()?))
        },
        _ => None,
    }
}

fn check_constraints(
    field: &Field,
    raw: &JsonValue,
    value: &Value
) -> Result<(), CastError> {
    let constraints = field.constraints();
    let violation = |constraint: &'static str| CastError::ConstraintViolation {
        field: field.name().to_string(),
        constraint,
        value: raw.clone(),
    };

    if let Some(allowed) = &constraints.r#enum {
        let found = allowed.iter()
            .any(|candidate| cast_type(field, candidate).ok().as_ref() == Some(value));
        if !found {
            return Err(violation("enum"));
        }
    }

    if let (Some(pattern), JsonValue::String(s)) = (&constraints.pattern, raw) {
        let re = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            CastError::InvalidConstraint {
                field: field.name().to_string(),
                constraint: "pattern",
                message: e.to_string(),
            }
        })?;
        if !re.is_match(s) {
            return Err(violation("pattern"));
        }
    }

    let length = match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        Value::Object(members) => Some(members.len()),
        _ => None,
    };
    if let Some(length) = length {
        if constraints.min_length.is_some_and(|min| length < min) {
            return Err(violation("minLength"));
        }
        if constraints.max_length.is_some_and(|max| length > max) {
            return Err(violation("maxLength"));
        }
    }

    let number = match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Number(n) => Some(*n),
        _ => None,
    };
    if let Some(number) = number {
        if constraints.minimum.is_some_and(|min| number < min) {
            return Err(violation("minimum"));
        }
        if constraints.maximum.is_some_and(|max| number > max) {
            return Err(violation("maximum"));
        }
    }

    Ok(())
}
