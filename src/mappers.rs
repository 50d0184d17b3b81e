//! Mapping rows typed by a Table Schema to a [`DataFrame`], and back.
//!
//! [`create_data_frame`] casts every raw value with the schema, stores the primary
//! key as the frame index and every other field as a data column.
//! [`restore_schema`] infers a schema from the storage types of a frame and
//! [`read_rows`] reads the stored values back as schema ordered rows.
use std::sync::Arc;
use std::collections::HashMap;

use arrow_array::{ArrayRef, NullArray};
use arrow_array::builder::{
    BooleanBuilder, Float64Builder, Int64Builder, ListBuilder, MapBuilder,
    StringBuilder, TimestampNanosecondBuilder,
};
use arrow_schema::{DataType as ArrowDataType, TimeUnit as ArrowTimeUnit};
use chrono::{NaiveDate, NaiveTime};
use serde_json::Value as JsonValue;
use tracing::{debug, trace};

use crate::{TableSchemaResult, TableSchemaError};
use crate::frame::{DataFrame, Index, array_value};
use crate::schema::{Schema, SchemaModel, Field, FieldType, CastError};
use crate::schema::arrow::{abstract_to_storage, storage_to_abstract};
use crate::value::{Value, to_native_value};

/// Creates a data frame from rows of raw values, positionally aligned with the
/// schema fields.
///
/// Missing values of `number` and `integer` fields are stored as NaN, and the
/// column of such a field is stored as `Float64` whatever its declared type.
///
/// # Errors
///
/// - [`TableSchemaError::Cast`] if a value can't be cast to its field type.
/// - [`TableSchemaError::InvalidLiteral`] if a value that is not a native array or
///   object can't be parsed as a JSON literal either.
/// - [`TableSchemaError::RowLength`] if a row does not have one value per field.
/// - [`TableSchemaError::InvalidValue`] if a cast value does not fit its storage
///   type, such as a missing value in an integer primary key.
pub fn create_data_frame<M, R>(model: &M, rows: R) -> TableSchemaResult<DataFrame>
where
    M: SchemaModel + ?Sized,
    R: IntoIterator,
    R::Item: AsRef<[JsonValue]>,
{
    let primary_key = match model.primary_key() {
        Some(name) => Some(model.get_field(name).ok_or_else(|| {
            TableSchemaError::Schema {
                message: format!("primary key \"{name}\" does not name a field")
            }
        })?),
        None => None,
    };

    debug!(
        fields = model.fields().len(),
        primary_key = primary_key.map(Field::name),
        "creating data frame"
    );

    let IndexAndData { index, data, overrides } = get_index_and_data(model, rows)?;

    let mut columns = Vec::new();
    for (position, (name, data_type)) in
        schema_to_dtypes(model, &overrides).into_iter().enumerate()
    {
        let values: Vec<&Value> = data.iter().map(|row| &row[position]).collect();
        columns.push((name.to_string(), build_array(name, &data_type, &values)?));
    }

    let mut frame = DataFrame::try_new(columns, data.len())?;

    if let Some(field) = primary_key {
        let data_type = abstract_to_storage(&field.field_type());
        let values: Vec<&Value> = index.iter().collect();
        let values = build_array(field.name(), &data_type, &values)?;
        frame = frame.with_index(Index::new(field.name(), values))?;
    }

    debug!(
        rows = frame.num_rows(),
        columns = frame.num_columns(),
        float_overrides = overrides.len(),
        "created data frame"
    );

    Ok(frame)
}

/// Infers a schema from the storage types of a data frame.
///
/// A named index becomes the first field and the primary key. Every data column
/// becomes a field, marked as required when it has no missing values.
///
/// # Errors
///
/// [`TableSchemaError::UnsupportedType`] if the index or a column has a
/// storage type other than `Int64`.
pub fn restore_schema(frame: &DataFrame) -> TableSchemaResult<Schema> {
    debug!(
        columns = frame.num_columns(),
        index = frame.index().map(Index::name),
        "restoring schema"
    );

    let mut fields = Vec::new();
    let mut primary_key = None;

    if let Some(index) = frame.index().filter(|index| !index.name().is_empty()) {
        let field_type = storage_to_abstract(index.data_type(), index.name())?;
        fields.push(Field::new(index.name(), field_type));
        primary_key = Some(index.name());
    }

    for (column, data_type) in frame.dtypes() {
        let field_type = storage_to_abstract(data_type, column)?;
        let mut field = Field::new(column, field_type);
        if frame.missing_count(column) == Some(0) {
            field = field.with_required(true);
        }
        fields.push(field);
    }

    let schema = Schema::new(fields);
    Ok(match primary_key {
        Some(name) => schema.with_primary_key(name),
        None => schema,
    })
}

/// Reads the rows of a data frame as native values in schema field order.
///
/// The index supplies the primary key field. Integer fields stored as `Float64`
/// are converted back to integers and every value is passed through
/// [`to_native_value`], so missing numbers come back as [`Value::Null`].
///
/// # Errors
///
/// [`TableSchemaError::Schema`] if a field has neither a column nor an index in
/// the frame.
pub fn read_rows<M>(model: &M, frame: &DataFrame) -> TableSchemaResult<Vec<Vec<Value>>>
where
    M: SchemaModel + ?Sized,
{
    let primary_key = model.primary_key();

    let sources = model.fields().iter()
        .map(|field| {
            let index = frame.index()
                .filter(|index| Some(index.name()) == primary_key)
                .filter(|index| index.name() == field.name())
                .map(Index::values);

            index.or_else(|| frame.column_by_name(field.name()))
                .map(|array| (field, array))
                .ok_or_else(|| TableSchemaError::Schema {
                    message: format!(
                        "field \"{}\" has no column in data frame", field.name()
                    )
                })
        })
        .collect::<TableSchemaResult<Vec<(&Field, &ArrayRef)>>>()?;

    debug!(rows = frame.num_rows(), fields = sources.len(), "reading rows");

    (0..frame.num_rows())
        .map(|row| {
            sources.iter()
                .map(|(field, array)| -> TableSchemaResult<Value> {
                    let value = array_value(array.as_ref(), row, field.name())?;
                    Ok(to_native_value(restore_value(field, value)))
                })
                .collect::<TableSchemaResult<Vec<Value>>>()
        })
        .collect()
}

/// Per-row cast results, split into primary key and data values.
#[derive(Default)]
struct IndexAndData {
    index: Vec<Value>,
    data: Vec<Vec<Value>>,
    /// Fields whose column must be stored as Float64 to hold NaN.
    overrides: HashMap<String, ArrowDataType>,
}

fn get_index_and_data<M, R>(model: &M, rows: R) -> TableSchemaResult<IndexAndData>
where
    M: SchemaModel + ?Sized,
    R: IntoIterator,
    R::Item: AsRef<[JsonValue]>,
{
    let fields = model.fields();
    let primary_key = model.primary_key();
    let mut result = IndexAndData::default();

    for (row_number, row) in rows.into_iter().enumerate() {
        let row = row.as_ref();
        if row.len() != fields.len() {
            return Err(TableSchemaError::RowLength {
                row: row_number,
                expected: fields.len(),
                found: row.len(),
            });
        }

        let mut row_data = Vec::with_capacity(fields.len());
        for (field, raw) in fields.iter().zip(row) {
            let mut value = cast_value(model, field, raw)?;

            let is_key = Some(field.name()) == primary_key;

            if value.is_null() && field.field_type().is_numeric() {
                // The index keeps its declared type, only data columns are overridden.
                if !is_key && !result.overrides.contains_key(field.name()) {
                    trace!(
                        field = field.name(),
                        row = row_number,
                        "missing number, storing column as Float64"
                    );
                    result.overrides.insert(field.name().to_string(), ArrowDataType::Float64);
                }
                value = Value::Number(f64::NAN);
            }

            if is_key {
                result.index.push(value);
            } else {
                row_data.push(value);
            }
        }
        result.data.push(row_data);
    }

    Ok(result)
}

/// Casts with the schema, decoding the value as a JSON literal when the schema
/// reports it is not a native structured value.
fn cast_value<M>(model: &M, field: &Field, raw: &JsonValue) -> TableSchemaResult<Value>
where
    M: SchemaModel + ?Sized,
{
    match model.cast(field.name(), raw) {
        Ok(value) => Ok(value),
        Err(CastError::InvalidObjectType { .. }) => {
            trace!(field = field.name(), "decoding value as a JSON literal");
            let literal = match raw {
                JsonValue::String(text) => serde_json::from_str(text)
                    .map_err(|source| TableSchemaError::InvalidLiteral { source })?,
                other => other.clone(),
            };
            Ok(Value::from_json(literal))
        },
        Err(e) => Err(e.into()),
    }
}

/// Returns the name and storage type of every data column, in schema order.
fn schema_to_dtypes<'a, M>(
    model: &'a M,
    overrides: &HashMap<String, ArrowDataType>
) -> Vec<(&'a str, ArrowDataType)>
where
    M: SchemaModel + ?Sized,
{
    model.fields().iter()
        .filter(|field| Some(field.name()) != model.primary_key())
        .map(|field| {
            let data_type = overrides.get(field.name())
                .cloned()
                .unwrap_or_else(|| abstract_to_storage(&field.field_type()));
            (field.name(), data_type)
        })
        .collect()
}

/// Builds the Arrow array of one column from its cast values.
fn build_array(
    column: &str,
    data_type: &ArrowDataType,
    values: &[&Value]
) -> TableSchemaResult<ArrayRef> {
    let invalid = |value: &Value| TableSchemaError::InvalidValue {
        column: column.to_string(),
        message: format!("{value:?} can't be stored as {data_type}"),
    };
    let encode = |item: &JsonValue| {
        serde_json::to_string(item)
            .map_err(|source| TableSchemaError::Serialization { source })
    };

    let array: ArrayRef = match data_type {
        ArrowDataType::Null => {
            if let Some(&value) = values.iter().find(|value| !value.is_null()) {
                return Err(invalid(value));
            }
            Arc::new(NullArray::new(values.len()))
        },
        ArrowDataType::Boolean => {
            let mut builder = BooleanBuilder::with_capacity(values.len());
            for &value in values {
                match value {
                    Value::Boolean(b) => builder.append_value(*b),
                    Value::Null => builder.append_null(),
                    other => return Err(invalid(other)),
                }
            }
            Arc::new(builder.finish())
        },
        ArrowDataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(values.len());
            for &value in values {
                match value {
                    Value::Integer(i) => builder.append_value(*i),
                    Value::Null => builder.append_null(),
                    other => return Err(invalid(other)),
                }
            }
            Arc::new(builder.finish())
        },
        ArrowDataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(values.len());
            for &value in values {
                match value {
                    Value::Number(n) => builder.append_value(*n),
                    Value::Integer(i) => builder.append_value(*i as f64),
                    Value::Null => builder.append_value(f64::NAN),
                    other => return Err(invalid(other)),
                }
            }
            Arc::new(builder.finish())
        },
        ArrowDataType::Utf8 => {
            let mut builder = StringBuilder::with_capacity(values.len(), 0);
            for &value in values {
                builder.append_option(value.to_text());
            }
            Arc::new(builder.finish())
        },
        ArrowDataType::Timestamp(ArrowTimeUnit::Nanosecond, None) => {
            let mut builder = TimestampNanosecondBuilder::with_capacity(values.len());
            for &value in values {
                match value {
                    Value::Datetime(datetime) => {
                        let nanos = datetime.and_utc()
                            .timestamp_nanos_opt()
                            .ok_or_else(|| invalid(value))?;
                        builder.append_value(nanos)
                    },
                    Value::Timestamp(nanos) => builder.append_value(*nanos),
                    Value::Null => builder.append_null(),
                    other => return Err(invalid(other)),
                }
            }
            Arc::new(builder.finish())
        },
        ArrowDataType::List(_) => {
            let mut builder = ListBuilder::new(StringBuilder::new());
            for &value in values {
                match value {
                    Value::Array(items) => {
                        for item in items {
                            builder.values().append_value(encode(item)?);
                        }
                        builder.append(true);
                    },
                    Value::Null => builder.append(false),
                    other => return Err(invalid(other)),
                }
            }
            Arc::new(builder.finish())
        },
        ArrowDataType::Map(..) => {
            let mut builder = MapBuilder::new(None, StringBuilder::new(), StringBuilder::new());
            for &value in values {
                match value {
                    Value::Object(members) => {
                        for (key, member) in members {
                            builder.keys().append_value(key);
                            builder.values().append_value(encode(member)?);
                        }
                        builder.append(true)?;
                    },
                    Value::Null => builder.append(false)?,
                    other => return Err(invalid(other)),
                }
            }
            Arc::new(builder.finish())
        },
        dt => {
            return Err(TableSchemaError::unsupported_column(column, dt))
        },
    };

    Ok(array)
}

/// Recovers the declared type of a stored value where storage lost it.
fn restore_value(field: &Field, value: Value) -> Value {
    match (field.field_type(), value) {
        (FieldType::Integer, Value::Number(n)) if !n.is_nan() => Value::Integer(n as i64),
        (FieldType::Date, Value::String(s)) => s.parse::<NaiveDate>()
            .map(Value::Date)
            .unwrap_or(Value::String(s)),
        (FieldType::Time, Value::String(s)) => s.parse::<NaiveTime>()
            .map(Value::Time)
            .unwrap_or(Value::String(s)),
        (FieldType::Geopoint, Value::String(s)) => {
            let point = s.split_once(',').and_then(|(lon, lat)| {
                Some(Value::Geopoint {
                    lon: lon.trim().parse().ok()?,
                    lat: lat.trim().parse().ok()?,
                })
            });
            point.unwrap_or(Value::String(s))
        },
        (FieldType::Geojson, Value::String(s)) => {
            match serde_json::from_str::<JsonValue>(&s) {
                Ok(JsonValue::Object(members)) => Value::Object(members),
                _ => Value::String(s),
            }
        },
        (_, value) => value,
    }
}

#[cfg(test)]
mod tests {
    use arrow_array::Array;
    use arrow_array::cast::AsArray;
    use arrow_array::types::{Float64Type, Int64Type};
    use serde_json::json;

    use super::*;
    use crate::schema::SchemaBuilder;

    fn create_schema() -> Schema {
        SchemaBuilder::new()
            .add_field("id", FieldType::Integer)
            .add_field("name", FieldType::String)
            .primary_key("id")
            .build()
            .unwrap()
    }

    #[test]
    fn index_and_columns() {
        let frame = create_data_frame(&create_schema(), vec![
            vec![json!(1), json!("a")],
            vec![json!(2), json!("b")],
        ]).unwrap();

        let index = frame.index().unwrap();
        assert_eq!(index.name(), "id");
        assert_eq!(index.data_type(), &ArrowDataType::Int64);
        assert_eq!(index.values().as_primitive::<Int64Type>().values().to_vec(), vec![1, 2]);

        assert_eq!(frame.column_names().collect::<Vec<_>>(), vec!["name"]);
        let names = frame.column_by_name("name").unwrap().as_string::<i32>();
        assert_eq!(names.iter().collect::<Vec<_>>(), vec![Some("a"), Some("b")]);
    }

    #[test]
    fn missing_integer_is_nan() {
        let schema = Schema::new(vec![
            Field::new("a", FieldType::Integer),
            Field::new("b", FieldType::Integer),
        ]);

        let frame = create_data_frame(&schema, vec![
            vec![json!(1), json!(10)],
            vec![json!(null), json!(20)],
            vec![json!(""), json!(30)],
        ]).unwrap();

        assert_eq!(
            frame.dtypes().collect::<Vec<_>>(),
            vec![("a", &ArrowDataType::Float64), ("b", &ArrowDataType::Int64)]
        );

        let a = frame.column_by_name("a").unwrap();
        assert_eq!(a.null_count(), 0);
        let a = a.as_primitive::<Float64Type>();
        assert_eq!(a.value(0), 1.0);
        assert!(a.value(1).is_nan());
        assert!(a.value(2).is_nan());
    }

    #[test]
    fn json_literal_fallback() {
        let schema = Schema::new(vec![
            Field::new("tags", FieldType::Array),
            Field::new("props", FieldType::Object),
        ]);

        let frame = create_data_frame(&schema, vec![
            vec![json!("[1, \"x\"]"), json!("{\"k\": true}")],
            vec![json!([2]), json!({"k": false})],
        ]).unwrap();

        assert_eq!(frame.value("tags", 0).unwrap(), Value::Array(vec![json!(1), json!("x")]));
        assert_eq!(frame.value("tags", 1).unwrap(), Value::Array(vec![json!(2)]));
        assert_eq!(
            frame.value("props", 0).unwrap(),
            Value::from_json(json!({"k": true}))
        );
    }

    #[test]
    fn invalid_json_literal() {
        let schema = Schema::new(vec![Field::new("tags", FieldType::Array)]);

        let result = create_data_frame(&schema, vec![vec![json!("[1,")]]);
        assert!(matches!(result, Err(TableSchemaError::InvalidLiteral { .. })));
    }

    #[test]
    fn literal_of_wrong_shape() {
        let schema = Schema::new(vec![Field::new("tags", FieldType::Array)]);

        let result = create_data_frame(&schema, vec![vec![json!("5")]]);
        assert!(matches!(result, Err(TableSchemaError::InvalidValue { .. })));
    }

    #[test]
    fn cast_errors_propagate() {
        let result = create_data_frame(&create_schema(), vec![vec![json!("x"), json!("a")]]);

        assert!(matches!(
            result,
            Err(TableSchemaError::Cast { source: CastError::InvalidValue { .. } })
        ));
    }

    #[test]
    fn row_length() {
        let result = create_data_frame(&create_schema(), vec![
            vec![json!(1), json!("a")],
            vec![json!(2)],
        ]);

        assert!(matches!(
            result,
            Err(TableSchemaError::RowLength { row: 1, expected: 2, found: 1 })
        ));
    }

    #[test]
    fn missing_integer_primary_key() {
        let result = create_data_frame(&create_schema(), vec![vec![json!(null), json!("a")]]);

        assert!(matches!(result, Err(TableSchemaError::InvalidValue { .. })));
    }

    #[test]
    fn missing_number_primary_key_is_nan() {
        let schema = Schema::new(vec![
            Field::new("id", FieldType::Number),
            Field::new("name", FieldType::String),
        ]).with_primary_key("id");
        let rows = vec![
            vec![json!(null), json!("a")],
            vec![json!(1.5), json!("b")],
        ];

        let IndexAndData { index, overrides, .. } =
            get_index_and_data(&schema, rows.clone()).unwrap();
        assert_eq!(index.len(), 2);
        assert!(overrides.is_empty());

        let frame = create_data_frame(&schema, rows).unwrap();
        assert_eq!(frame.index().unwrap().data_type(), &ArrowDataType::Float64);
        assert!(matches!(
            frame.index_value(0),
            Some(Ok(Value::Number(n))) if n.is_nan()
        ));
        assert_eq!(frame.index_value(1).unwrap().unwrap(), Value::Number(1.5));
    }

    #[test]
    fn storage_types() {
        let schema = Schema::new(vec![
            Field::new("flag", FieldType::Boolean),
            Field::new("day", FieldType::Date),
            Field::new("at", FieldType::Datetime),
            Field::new("nothing", FieldType::Null),
            Field::new("point", FieldType::Geopoint),
        ]);

        let frame = create_data_frame(&schema, vec![
            vec![json!(true), json!("2020-01-02"), json!("2020-01-02T03:04:05Z"), json!(""), json!("1, 2")],
            vec![json!(null), json!(null), json!(null), json!(null), json!(null)],
        ]).unwrap();

        assert_eq!(frame.dtypes().map(|(_, dt)| dt.clone()).collect::<Vec<_>>(), vec![
            ArrowDataType::Boolean,
            ArrowDataType::Utf8,
            ArrowDataType::Timestamp(ArrowTimeUnit::Nanosecond, None),
            ArrowDataType::Null,
            ArrowDataType::Utf8,
        ]);
        assert_eq!(frame.value("day", 0).unwrap(), Value::String("2020-01-02".to_string()));
        assert_eq!(frame.value("day", 1).unwrap(), Value::Null);
        assert_eq!(frame.missing_count("flag"), Some(1));
    }

    #[test]
    fn empty_rows() {
        let frame = create_data_frame(&create_schema(), Vec::<Vec<JsonValue>>::new()).unwrap();

        assert_eq!(frame.num_rows(), 0);
        assert!(frame.index().unwrap().is_empty());
        assert_eq!(frame.column_names().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn restore_from_integer_frame() {
        let schema = Schema::new(vec![
            Field::new("id", FieldType::Integer),
            Field::new("count", FieldType::Integer),
        ]).with_primary_key("id");
        let frame = create_data_frame(&schema, vec![
            vec![json!(1), json!(5)],
            vec![json!(2), json!(6)],
        ]).unwrap();

        let restored = restore_schema(&frame).unwrap();

        assert_eq!(serde_json::to_value(&restored).unwrap(), json!({
            "fields": [
                {"name": "id", "type": "integer"},
                {"name": "count", "type": "integer", "constraints": {"required": true}}
            ],
            "primaryKey": "id"
        }));
    }

    #[test]
    fn restore_float_column_fails() {
        let schema = Schema::new(vec![Field::new("score", FieldType::Number)]);
        let frame = create_data_frame(&schema, vec![vec![json!(1.5)]]).unwrap();

        assert!(matches!(
            restore_schema(&frame),
            Err(TableSchemaError::UnsupportedType { column: Some(column), .. }) if column == "score"
        ));
    }

    #[test]
    fn read_back() {
        let schema = Schema::new(vec![
            Field::new("name", FieldType::String),
            Field::new("id", FieldType::Integer),
            Field::new("count", FieldType::Integer),
            Field::new("day", FieldType::Date),
            Field::new("at", FieldType::Datetime),
        ]).with_primary_key("id");

        let frame = create_data_frame(&schema, vec![
            vec![json!("a"), json!(1), json!(3), json!("2020-01-02"), json!("2020-01-02T03:04:05Z")],
            vec![json!("b"), json!(2), json!(null), json!(null), json!(null)],
        ]).unwrap();

        let rows = read_rows(&schema, &frame).unwrap();
        let day = NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();

        assert_eq!(rows, vec![
            vec![
                Value::String("a".to_string()),
                Value::Integer(1),
                Value::Integer(3),
                Value::Date(day),
                Value::Datetime(day.and_hms_opt(3, 4, 5).unwrap()),
            ],
            vec![
                Value::String("b".to_string()),
                Value::Integer(2),
                Value::Null,
                Value::Null,
                Value::Null,
            ],
        ]);
    }

    #[test]
    fn read_back_missing_column() {
        let frame = create_data_frame(&create_schema(), vec![vec![json!(1), json!("a")]]).unwrap();
        let other = Schema::new(vec![Field::new("other", FieldType::String)]);

        assert!(matches!(read_rows(&other, &frame), Err(TableSchemaError::Schema { .. })));
    }
}
