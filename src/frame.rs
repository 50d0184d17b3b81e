//! An Arrow backed columnar table with an optional named index.
//!
//! A [`DataFrame`] holds its data columns in an Arrow [`RecordBatch`]. The index,
//! when present, is stored apart from the data columns: it has its own name and
//! type and does not appear in the batch schema.
use std::sync::Arc;

use arrow_array::{Array, ArrayRef, RecordBatch, RecordBatchOptions};
use arrow_array::cast::AsArray;
use arrow_array::types::{
    Float32Type, Float64Type, Int8Type, Int16Type, Int32Type, Int64Type,
    TimestampNanosecondType,
};
use arrow_schema::{
    Schema as ArrowSchema, Field as ArrowField,
    DataType as ArrowDataType, TimeUnit as ArrowTimeUnit,
};
use serde_json::{Map, Value as JsonValue};

use crate::{TableSchemaResult, TableSchemaError};
use crate::value::Value;

/// A named, typed column identifying the rows of a [`DataFrame`].
#[derive(Debug, Clone)]
pub struct Index {
    name: String,
    values: ArrayRef,
}

impl Index {
    pub fn new(name: &str, values: ArrayRef) -> Self {
        Self { name: name.to_string(), values }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &ArrayRef {
        &self.values
    }

    pub fn data_type(&self) -> &ArrowDataType {
        self.values.data_type()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A columnar table made of an Arrow `RecordBatch` and an optional index.
#[derive(Debug, Clone)]
pub struct DataFrame {
    index: Option<Index>,
    batch: RecordBatch,
}

impl DataFrame {
    /// Wraps an existing `RecordBatch` without an index.
    pub fn new(batch: RecordBatch) -> Self {
        Self { index: None, batch }
    }

    /// Creates a data frame from named columns of equal length.
    ///
    /// `num_rows` is required because a frame may have rows but no data columns,
    /// when the primary key is the only field.
    pub fn try_new(
        columns: Vec<(String, ArrayRef)>,
        num_rows: usize
    ) -> TableSchemaResult<Self> {
        let (fields, arrays): (Vec<ArrowField>, Vec<ArrayRef>) = columns.into_iter()
            .map(|(name, array)| {
                (ArrowField::new(name, array.data_type().clone(), true), array)
            })
            .unzip();

        let options = RecordBatchOptions::new().with_row_count(Some(num_rows));
        let batch = RecordBatch::try_new_with_options(
            Arc::new(ArrowSchema::new(fields)),
            arrays,
            &options
        )?;

        Ok(Self::new(batch))
    }

    /// Attaches an index, which must have one value per row.
    pub fn with_index(mut self, index: Index) -> TableSchemaResult<Self> {
        if index.len() != self.num_rows() {
            return Err(TableSchemaError::Schema {
                message: format!(
                    "index \"{}\" has {} values but the frame has {} rows",
                    index.name(), index.len(), self.num_rows()
                )
            });
        }
        self.index = Some(index);
        Ok(self)
    }

    pub fn index(&self) -> Option<&Index> {
        self.index.as_ref()
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    /// Returns the data column names in order, excluding the index.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.batch.schema_ref().fields().iter().map(|field| field.name().as_str())
    }

    /// Returns the name and storage type of every data column, in order.
    pub fn dtypes(&self) -> impl Iterator<Item = (&str, &ArrowDataType)> {
        self.batch.schema_ref().fields().iter()
            .map(|field| (field.name().as_str(), field.data_type()))
    }

    pub fn column_by_name(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// Returns the number of missing values in a data column: nulls, plus NaN
    /// in floating point columns.
    pub fn missing_count(&self, name: &str) -> Option<usize> {
        self.column_by_name(name).map(|array| missing_count(array.as_ref()))
    }

    /// Reads the cell of a data column at `row`.
    pub fn value(&self, column: &str, row: usize) -> TableSchemaResult<Value> {
        let array = self.column_by_name(column).ok_or_else(|| {
            TableSchemaError::Schema {
                message: format!("data frame has no column \"{column}\"")
            }
        })?;
        array_value(array.as_ref(), row, column)
    }

    /// Reads the index value at `row`, if the frame has an index.
    pub fn index_value(&self, row: usize) -> Option<TableSchemaResult<Value>> {
        self.index.as_ref()
            .map(|index| array_value(index.values().as_ref(), row, index.name()))
    }
}

pub(crate) fn missing_count(array: &dyn Array) -> usize {
    let nan = match array.data_type() {
        ArrowDataType::Float64 => array.as_primitive::<Float64Type>()
            .iter()
            .filter(|value| value.is_some_and(f64::is_nan))
            .count(),
        ArrowDataType::Float32 => array.as_primitive::<Float32Type>()
            .iter()
            .filter(|value| value.is_some_and(f32::is_nan))
            .count(),
        _ => 0,
    };

    array.null_count() + nan
}

/// Reads a single cell, decoding the JSON encoded items of list and map columns.
pub(crate) fn array_value(
    array: &dyn Array,
    row: usize,
    column: &str
) -> TableSchemaResult<Value> {
    if row >= array.len() {
        return Err(TableSchemaError::Schema {
            message: format!(
                "row {row} out of bounds for column \"{column}\" of length {}",
                array.len()
            )
        });
    }
    if array.is_null(row) {
        return Ok(Value::Null);
    }

    let unsupported = || TableSchemaError::unsupported_column(column, array.data_type());

    Ok(match array.data_type() {
        ArrowDataType::Null => Value::Null,
        ArrowDataType::Boolean => Value::Boolean(array.as_boolean().value(row)),
        ArrowDataType::Int8 => {
            Value::Integer(array.as_primitive::<Int8Type>().value(row).into())
        },
        ArrowDataType::Int16 => {
            Value::Integer(array.as_primitive::<Int16Type>().value(row).into())
        },
        ArrowDataType::Int32 => {
            Value::Integer(array.as_primitive::<Int32Type>().value(row).into())
        },
        ArrowDataType::Int64 => {
            Value::Integer(array.as_primitive::<Int64Type>().value(row))
        },
        ArrowDataType::Float32 => {
            Value::Number(array.as_primitive::<Float32Type>().value(row).into())
        },
        ArrowDataType::Float64 => {
            Value::Number(array.as_primitive::<Float64Type>().value(row))
        },
        ArrowDataType::Utf8 => {
            Value::String(array.as_string::<i32>().value(row).to_string())
        },
        ArrowDataType::LargeUtf8 => {
            Value::String(array.as_string::<i64>().value(row).to_string())
        },
        ArrowDataType::Timestamp(ArrowTimeUnit::Nanosecond, _) => {
            Value::Timestamp(array.as_primitive::<TimestampNanosecondType>().value(row))
        },
        ArrowDataType::List(item) if item.data_type() == &ArrowDataType::Utf8 => {
            let items = array.as_list::<i32>().value(row);
            let items = items.as_string::<i32>()
                .iter()
                .map(|item| decode_json(item, column))
                .collect::<TableSchemaResult<Vec<_>>>()?;
            Value::Array(items)
        },
        ArrowDataType::Map(..) => {
            let entries = array.as_map().value(row);
            let keys = entries.column(0).as_string_opt::<i32>().ok_or_else(unsupported)?;
            let values = entries.column(1).as_string_opt::<i32>().ok_or_else(unsupported)?;

            let mut members = Map::new();
            for (key, value) in keys.iter().zip(values.iter()) {
                let key = key.ok_or_else(unsupported)?;
                members.insert(key.to_string(), decode_json(value, column)?);
            }
            Value::Object(members)
        },
        _ => return Err(unsupported()),
    })
}

fn decode_json(text: Option<&str>, column: &str) -> TableSchemaResult<JsonValue> {
    match text {
        None => Ok(JsonValue::Null),
        Some(text) => serde_json::from_str(text).map_err(|source| {
            tracing::debug!(column, "stored item is not valid JSON");
            TableSchemaError::InvalidLiteral { source }
        }),
    }
}
