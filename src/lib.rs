//! Conversion between [Table Schema](https://specs.frictionlessdata.io/table-schema/)
//! typed rows and Apache Arrow columnar tables.
//!
//! A Table Schema describes tabular data as an ordered list of named, typed fields
//! with an optional primary key. This crate casts rows of raw JSON values according
//! to such a schema and stores them in a [`DataFrame`]: an Arrow `RecordBatch`
//! holding one column per field, plus an optional named index holding the primary
//! key. It can also go the other way and infer a [`Schema`] from an existing
//! [`DataFrame`].
//!
//! ## Creating a data frame from rows
//!
//! ```rust
//! use serde_json::json;
//! use tableschema_arrow::{create_data_frame, restore_schema, TableSchemaResult};
//! use tableschema_arrow::schema::Schema;
//!
//! fn main() -> TableSchemaResult<()> {
//!     let schema = Schema::decode(r#"{
//!         "fields": [
//!             {"name": "id", "type": "integer"},
//!             {"name": "name", "type": "string"}
//!         ],
//!         "primaryKey": "id"
//!     }"#)?;
//!
//!     let frame = create_data_frame(&schema, vec![
//!         vec![json!(1), json!("a")],
//!         vec![json!(2), json!("b")],
//!     ])?;
//!
//!     assert_eq!(frame.num_rows(), 2);
//!     assert_eq!(frame.index().unwrap().name(), "id");
//!     Ok(())
//! }
//! ```
//!
//! Schema inference from a frame is deliberately narrow: only 64-bit integer
//! columns can be mapped back to a Table Schema type, every other column type makes
//! [`restore_schema`] fail with [`TableSchemaError::UnsupportedType`].
use thiserror;
use serde_json;
use arrow_schema::{ArrowError, DataType as ArrowDataType};

pub mod schema;
pub mod value;
pub mod frame;
pub mod mappers;

pub use crate::frame::{DataFrame, Index};
pub use crate::mappers::{create_data_frame, restore_schema, read_rows};
pub use crate::schema::{Schema, SchemaModel, CastError};
pub use crate::value::{Value, to_native_value};

/// A result type returned by functions in this crate.
pub type TableSchemaResult<T> = Result<T, TableSchemaError>;

/// A conversion error.
#[derive(thiserror::Error, Debug)]
pub enum TableSchemaError {
    /// A field type name that is not one of the Table Schema types, or the
    /// Arrow type of a column that has no Table Schema counterpart.
    #[error("type \"{type_name}\" is not supported{}", in_column(.column))]
    UnsupportedType { type_name: String, column: Option<String> },

    /// A raw value could not be cast to the declared field type.
    #[error("{source}")]
    Cast {#[from] source: CastError},

    /// A value that was expected to be a serialized JSON literal could not be
    /// parsed.
    #[error("Invalid JSON literal: {source}")]
    InvalidLiteral { source: serde_json::Error },

    /// A cast value does not fit the storage type of its column.
    #[error("Invalid value for column \"{column}\": {message}")]
    InvalidValue { column: String, message: String },

    /// A row does not have exactly one value per schema field.
    #[error("Row {row} has {found} values, expected {expected}")]
    RowLength { row: usize, expected: usize, found: usize },

    /// An inconsistent schema or a schema that does not match a data frame.
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// Failed serializing or deserializing a schema descriptor.
    #[error("Error serializing schema descriptor: {source}")]
    Serialization { source: serde_json::Error },

    /// Apache Arrow error
    #[error("Error in Arrow library: {source}")]
    Arrow {#[from] source: ArrowError},
}

impl TableSchemaError {
    /// An unknown field type name.
    pub(crate) fn unsupported_type(type_name: &str) -> Self {
        TableSchemaError::UnsupportedType {
            type_name: type_name.to_string(),
            column: None,
        }
    }

    /// A column stored with an Arrow type that maps to no field type.
    pub(crate) fn unsupported_column(column: &str, data_type: &ArrowDataType) -> Self {
        TableSchemaError::UnsupportedType {
            type_name: data_type.to_string(),
            column: Some(column.to_string()),
        }
    }
}

fn in_column(column: &Option<String>) -> String {
    column.as_ref()
        .map(|column| format!(" in column \"{column}\""))
        .unwrap_or_default()
}
