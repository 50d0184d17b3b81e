//! Conversion between Table Schema field types and Arrow storage types.
//!
//! The forward direction covers every [`FieldType`]. Types without a natural Arrow
//! counterpart share the generic object storage, a `Utf8` column holding the
//! textual form of each value. The reverse direction maps only 64-bit integers;
//! any other storage type is reported as unsupported instead of guessed.
use std::sync::Arc;

use arrow_schema::{
    Field as ArrowField, Fields as ArrowFields,
    DataType as ArrowDataType, TimeUnit as ArrowTimeUnit,
};

use crate::{TableSchemaResult, TableSchemaError};
use crate::schema::FieldType;

/// Storage for values without a dedicated Arrow type.
pub const OBJECT_STORAGE: ArrowDataType = ArrowDataType::Utf8;

/// Storage for `array` fields: a list of JSON encoded items.
pub fn list_storage() -> ArrowDataType {
    ArrowDataType::List(Arc::new(ArrowField::new("item", ArrowDataType::Utf8, true)))
}

/// Storage for `object` fields: a map from member names to JSON encoded values.
pub fn map_storage() -> ArrowDataType {
    ArrowDataType::Map(
        Arc::new(ArrowField::new(
            "entries",
            ArrowDataType::Struct(ArrowFields::from(vec![
                ArrowField::new("keys", ArrowDataType::Utf8, false),
                ArrowField::new("values", ArrowDataType::Utf8, true),
            ])),
            false
        )),
        false
    )
}

impl From<&FieldType> for ArrowDataType {
    fn from(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::String
            | FieldType::Date
            | FieldType::Time
            | FieldType::Geopoint
            | FieldType::Geojson
            | FieldType::Any => OBJECT_STORAGE,
            FieldType::Number => ArrowDataType::Float64,
            FieldType::Integer => ArrowDataType::Int64,
            FieldType::Boolean => ArrowDataType::Boolean,
            FieldType::Datetime => {
                ArrowDataType::Timestamp(ArrowTimeUnit::Nanosecond, None)
            },
            // Placeholders for column construction only.
            FieldType::Null => ArrowDataType::Null,
            FieldType::Array => list_storage(),
            FieldType::Object => map_storage(),
        }
    }
}

/// Returns the Arrow storage type of columns holding `field_type` values.
pub fn abstract_to_storage(field_type: &FieldType) -> ArrowDataType {
    ArrowDataType::from(field_type)
}

/// Infers the field type of the column named `column` from its Arrow storage type.
///
/// # Errors
///
/// [`TableSchemaError::UnsupportedType`] naming the column is returned for every
/// storage type other than `Int64`.
pub fn storage_to_abstract(
    data_type: &ArrowDataType,
    column: &str
) -> TableSchemaResult<FieldType> {
    match data_type {
        ArrowDataType::Int64 => Ok(FieldType::Integer),
        // Float64 may hold integers with missing values, Utf8 any of six types.
        dt => Err(TableSchemaError::unsupported_column(column, dt)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_to_arrow() {
        assert_eq!(abstract_to_storage(&FieldType::Integer), ArrowDataType::Int64);
        assert_eq!(abstract_to_storage(&FieldType::Number), ArrowDataType::Float64);
        assert_eq!(abstract_to_storage(&FieldType::Boolean), ArrowDataType::Boolean);
        assert_eq!(
            abstract_to_storage(&FieldType::Datetime),
            ArrowDataType::Timestamp(ArrowTimeUnit::Nanosecond, None)
        );
        assert_eq!(abstract_to_storage(&FieldType::Null), ArrowDataType::Null);

        for field_type in [
            FieldType::String, FieldType::Date, FieldType::Time,
            FieldType::Geopoint, FieldType::Geojson, FieldType::Any,
        ] {
            assert_eq!(abstract_to_storage(&field_type), ArrowDataType::Utf8);
        }

        assert!(matches!(
            abstract_to_storage(&FieldType::Array),
            ArrowDataType::List(item) if item.data_type() == &ArrowDataType::Utf8
        ));
        assert!(matches!(
            abstract_to_storage(&FieldType::Object),
            ArrowDataType::Map(..)
        ));
    }

    #[test]
    fn arrow_to_field_type() {
        assert_eq!(
            storage_to_abstract(&ArrowDataType::Int64, "id").unwrap(),
            FieldType::Integer
        );

        for data_type in [
            ArrowDataType::Float64,
            ArrowDataType::Utf8,
            ArrowDataType::Int32,
            ArrowDataType::Boolean,
            ArrowDataType::Timestamp(ArrowTimeUnit::Nanosecond, None),
        ] {
            match storage_to_abstract(&data_type, "col") {
                Err(TableSchemaError::UnsupportedType { type_name, column }) => {
                    assert_eq!(column.as_deref(), Some("col"));
                    assert_eq!(type_name, data_type.to_string());
                },
                other => panic!("unexpected result {other:?}"),
            }
        }
    }
}
