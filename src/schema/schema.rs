//! Implementation of Table Schema field types, fields and schemas.

use std::str::FromStr;

use serde::{Serialize, Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::{TableSchemaResult, TableSchemaError};
use crate::value::Value;
use crate::schema::cast::{self, CastError};

/// Missing value markers used when a descriptor does not declare `missingValues`.
const DEFAULT_MISSING_VALUES: &[&str] = &[""];

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[serde(try_from = "String", into = "String")]
/// An enum of the field types defined by Table Schema.
pub enum FieldType {
    /// Text, the default when a descriptor omits `type`.
    #[default]
    String,
    /// Any real number, including NaN and infinities.
    Number,
    /// A whole number.
    Integer,
    /// True or False
    Boolean,
    /// A field whose only valid value is null.
    Null,
    /// A JSON array.
    Array,
    /// A JSON object.
    Object,
    /// Calendar date without time.
    Date,
    /// Time of day without date.
    Time,
    /// Date and time of day.
    Datetime,
    /// A geographic point as longitude and latitude.
    Geopoint,
    /// A GeoJSON object.
    Geojson,
    /// Any value, cast structurally.
    Any,
}

impl FieldType {
    /// All field types, in declaration order.
    pub const ALL: [FieldType; 13] = [
        FieldType::String, FieldType::Number, FieldType::Integer,
        FieldType::Boolean, FieldType::Null, FieldType::Array,
        FieldType::Object, FieldType::Date, FieldType::Time,
        FieldType::Datetime, FieldType::Geopoint, FieldType::Geojson,
        FieldType::Any,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Integer => "integer",
            FieldType::Boolean => "boolean",
            FieldType::Null => "null",
            FieldType::Array => "array",
            FieldType::Object => "object",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Datetime => "datetime",
            FieldType::Geopoint => "geopoint",
            FieldType::Geojson => "geojson",
            FieldType::Any => "any",
        }
    }

    /// Numeric fields store missing values as NaN.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Number | FieldType::Integer)
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = TableSchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL.iter()
            .find(|field_type| field_type.as_str() == s)
            .copied()
            .ok_or_else(|| TableSchemaError::unsupported_type(s))
    }
}

impl TryFrom<String> for FieldType {
    type Error = TableSchemaError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<FieldType> for String {
    fn from(field_type: FieldType) -> Self {
        field_type.as_str().to_string()
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
#[serde(rename_all = "camelCase")]
/// Constraints restricting the valid values of a field.
pub struct Constraints {
    /// Values can not be missing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    /// Minimum length of strings, arrays and objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum length of strings, arrays and objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Inclusive lower bound of integers and numbers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Inclusive upper bound of integers and numbers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// A regular expression the whole raw string value must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// The exhaustive list of allowed values.
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<JsonValue>>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Constraints::default()
    }

    pub fn is_required(&self) -> bool {
        self.required.unwrap_or(false)
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
/// A Table Schema field.
pub struct Field {
    /// Field name, unique in the schema.
    pub name: String,
    /// Field type, `string` when not given.
    #[serde(default)]
    pub r#type: FieldType,
    /// Type specific format, such as a date pattern.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default, skip_serializing_if = "Constraints::is_empty")]
    pub constraints: Constraints,
}

impl Field {
    pub fn new(name: &str, r#type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            r#type,
            format: None,
            constraints: Constraints::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> FieldType {
        self.r#type
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn with_constraints(mut self, constraints: Constraints) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.constraints.required = Some(required);
        self
    }
}

/// The capabilities a schema must provide to drive the mappers.
///
/// [`Schema`] is the implementation provided by this crate. Other schema models
/// can plug their own casting rules in by implementing this trait.
pub trait SchemaModel {
    /// Returns the fields in declaration order.
    fn fields(&self) -> &[Field];

    /// Returns the name of the primary key field, if any.
    fn primary_key(&self) -> Option<&str>;

    /// Finds a field by its name.
    fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields().iter().find(|field| field.name() == name)
    }

    /// Casts a raw value to the declared type of the named field.
    ///
    /// Implementations return [`CastError::InvalidObjectType`] when the value is
    /// a serialized JSON literal rather than a native structured value. Callers
    /// may recover from it by decoding the literal.
    fn cast(&self, field_name: &str, value: &JsonValue) -> Result<Value, CastError>;
}

/// A Table Schema.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    fields: Vec<Field>,
    /// Name of the field identifying rows. Composite keys are not supported.
    #[serde(
        default,
        deserialize_with = "deserialize_primary_key",
        skip_serializing_if = "Option::is_none"
    )]
    primary_key: Option<String>,
    /// Raw string values treated as missing.
    #[serde(
        default = "default_missing_values",
        skip_serializing_if = "is_default_missing_values"
    )]
    missing_values: Vec<String>,
}

fn default_missing_values() -> Vec<String> {
    DEFAULT_MISSING_VALUES.iter().map(|s| s.to_string()).collect()
}

fn is_default_missing_values(values: &Vec<String>) -> bool {
    values.iter().map(String::as_str).eq(DEFAULT_MISSING_VALUES.iter().copied())
}

/// Serializable primary key, either a field name or a list of field names.
#[derive(Deserialize)]
#[serde(untagged)]
enum PrimaryKeyModel {
    Single(String),
    Composite(Vec<String>),
}

fn deserialize_primary_key<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<PrimaryKeyModel>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PrimaryKeyModel::Single(name)) => Ok(Some(name)),
        Some(PrimaryKeyModel::Composite(mut names)) => match names.len() {
            0 => Ok(None),
            1 => Ok(names.pop()),
            n => Err(serde::de::Error::custom(format!(
                "composite primary keys are not supported, got {n} fields"
            ))),
        },
    }
}

/// Serializable field, with its type kept as a name until the field is built.
#[derive(Deserialize)]
struct FieldModel {
    name: String,
    #[serde(default)]
    r#type: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    constraints: Constraints,
}

impl TryFrom<FieldModel> for Field {
    type Error = TableSchemaError;

    fn try_from(f: FieldModel) -> Result<Self, Self::Error> {
        let r#type = match f.r#type {
            Some(name) => name.parse()?,
            None => FieldType::default(),
        };

        Ok(Field {
            name: f.name,
            r#type,
            format: f.format,
            constraints: f.constraints,
        })
    }
}

/// Serializable schema descriptor, read before field types are resolved.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescriptorModel {
    fields: Vec<FieldModel>,
    #[serde(default, deserialize_with = "deserialize_primary_key")]
    primary_key: Option<String>,
    #[serde(default = "default_missing_values")]
    missing_values: Vec<String>,
}

impl TryFrom<DescriptorModel> for Schema {
    type Error = TableSchemaError;

    fn try_from(d: DescriptorModel) -> Result<Self, Self::Error> {
        let fields = d.fields.into_iter()
            .map(Field::try_from)
            .collect::<TableSchemaResult<Vec<_>>>()?;

        Ok(Schema {
            fields,
            primary_key: d.primary_key,
            missing_values: d.missing_values,
        })
    }
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self {
            fields,
            primary_key: None,
            missing_values: default_missing_values(),
        }
    }

    pub fn with_primary_key(mut self, name: &str) -> Self {
        self.primary_key = Some(name.to_string());
        self
    }

    pub fn with_missing_values(mut self, values: Vec<String>) -> Self {
        self.missing_values = values;
        self
    }

    pub fn missing_values(&self) -> &[String] {
        &self.missing_values
    }

    /// Returns the field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name())
    }

    /// Checks that field names are unique and that the primary key names a field.
    pub fn validate(&self) -> TableSchemaResult<()> {
        for (position, field) in self.fields.iter().enumerate() {
            if self.fields[..position].iter().any(|other| other.name == field.name) {
                return Err(TableSchemaError::Schema {
                    message: format!("duplicate field name \"{}\"", field.name)
                });
            }
        }

        if let Some(primary_key) = &self.primary_key {
            if self.get_field(primary_key).is_none() {
                return Err(TableSchemaError::Schema {
                    message: format!(
                        "primary key \"{primary_key}\" does not name a field"
                    )
                });
            }
        }

        Ok(())
    }

    /// Parses and validates a JSON schema descriptor.
    ///
    /// An unknown field type name fails with [`TableSchemaError::UnsupportedType`].
    pub fn decode(descriptor: &str) -> TableSchemaResult<Self> {
        let model: DescriptorModel = serde_json::from_str(descriptor)
            .map_err(|source| TableSchemaError::Serialization { source })?;
        let schema = Schema::try_from(model)?;
        schema.validate()?;
        Ok(schema)
    }

    pub fn encode(&self) -> TableSchemaResult<String> {
        serde_json::to_string(self)
            .map_err(|source| TableSchemaError::Serialization { source })
    }
}

impl SchemaModel for Schema {
    fn fields(&self) -> &[Field] {
        &self.fields
    }

    fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    fn cast(&self, field_name: &str, value: &JsonValue) -> Result<Value, CastError> {
        let field = self.get_field(field_name)
            .ok_or_else(|| CastError::UnknownField(field_name.to_string()))?;
        cast::cast_value(field, value, &self.missing_values)
    }
}

/// Provides an interface for building validated schemas field by field.
///
/// # Examples
///
/// ```rust
/// use tableschema_arrow::schema::{SchemaBuilder, FieldType};
///
/// let schema = SchemaBuilder::new()
///     .add_field("id", FieldType::Integer)
///     .add_field("name", FieldType::String)
///     .primary_key("id")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    fields: Vec<Field>,
    primary_key: Option<String>,
    missing_values: Option<Vec<String>>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(mut self, name: &str, r#type: FieldType) -> Self {
        self.fields.push(Field::new(name, r#type));
        self
    }

    pub fn add_fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn primary_key(mut self, name: &str) -> Self {
        self.primary_key = Some(name.to_string());
        self
    }

    pub fn missing_values(mut self, values: &[&str]) -> Self {
        self.missing_values = Some(values.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn build(self) -> TableSchemaResult<Schema> {
        let schema = Schema {
            fields: self.fields,
            primary_key: self.primary_key,
            missing_values: self.missing_values.unwrap_or_else(default_missing_values),
        };
        schema.validate()?;
        Ok(schema)
    }
}
