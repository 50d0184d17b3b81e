//! Table Schema implementation.
//!
//! This module provides [`Schema`] which describes tabular data as an ordered list
//! of named fields represented by [`Field`], with an optional primary key naming one
//! of them.
//!
//! Each field has one of the Table Schema types, represented in this module by
//! [`FieldType`], and optional [`Constraints`]. Raw JSON values are cast to the
//! declared type with [`SchemaModel::cast`].
//!
//! ## Creating a schema
//!
//! ```rust
//! use tableschema_arrow::schema::{Schema, Field, FieldType};
//!
//! let schema = Schema::new(vec![
//!     Field::new("id", FieldType::Integer).with_required(true),
//!     Field::new("ts", FieldType::Datetime),
//! ]).with_primary_key("id");
//! ```
//!
//! ## Loading a schema descriptor
//!
//! ```rust
//! use tableschema_arrow::schema::{Schema, SchemaModel, FieldType};
//!
//! let schema = Schema::decode(r#"{
//!     "fields": [
//!         {"name": "id", "type": "integer"},
//!         {"name": "born", "type": "date", "format": "%d/%m/%Y"}
//!     ],
//!     "missingValues": ["", "NA"]
//! }"#).unwrap();
//!
//! assert_eq!(schema.get_field("born").unwrap().field_type(), FieldType::Date);
//! ```
mod schema;
pub mod cast;
pub mod arrow;

pub use self::schema::{
    Schema, SchemaBuilder, SchemaModel, Field, FieldType, Constraints
};

pub use self::cast::CastError;
