//! Feature records read from a layer.
//!
//! A feature is one row of a spatial table: an object identifier, a set of
//! attribute values and an optional geometry.

use crate::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Null/missing value
    Null,
    /// Text value
    String(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Real(f64),
    /// Boolean value
    Boolean(bool),
    /// Date value (ISO 8601 string)
    Date(String),
}

impl FieldValue {
    /// Returns true if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Returns the type name of this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::String(_) => "string",
            FieldValue::Integer(_) => "integer",
            FieldValue::Real(_) => "real",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Date(_) => "date",
        }
    }

    /// Attempts to get this value as a string.
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) | FieldValue::Date(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to get this value as an integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to get this value as a float (integers widen).
    pub fn as_real(&self) -> Option<f64> {
        match self {
            FieldValue::Real(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Attempts to get this value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The kind this value would be stored as.
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            FieldValue::Null => None,
            FieldValue::String(_) => Some(FieldKind::String),
            FieldValue::Integer(_) => Some(FieldKind::Integer),
            FieldValue::Real(_) => Some(FieldKind::Real),
            FieldValue::Boolean(_) => Some(FieldKind::Boolean),
            FieldValue::Date(_) => Some(FieldKind::Date),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("NULL"),
            FieldValue::String(s) | FieldValue::Date(s) => f.write_str(s),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Real(r) => write!(f, "{r}"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Integer(i64::from(i))
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Real(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(FieldValue::Null, Into::into)
    }
}

/// Declared storage type of an attribute field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Real,
    Boolean,
    Date,
}

impl FieldKind {
    /// Returns true if a value of kind `actual` may be stored in a field of this kind.
    ///
    /// Integers are accepted in real fields.
    pub fn accepts(&self, actual: FieldKind) -> bool {
        *self == actual || (*self == FieldKind::Real && actual == FieldKind::Integer)
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Real => "real",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
        };
        f.write_str(name)
    }
}

/// A field definition of a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefn {
    /// Field name
    pub name: String,
    /// Storage type
    pub kind: FieldKind,
    /// Whether null values are allowed
    pub nullable: bool,
}

impl FieldDefn {
    /// Creates a nullable field definition.
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
        }
    }

    /// Marks the field as not nullable.
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }
}

/// One feature of a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Object identifier (OBJECTID)
    pub fid: i64,
    /// Attribute values keyed by field name
    pub attributes: BTreeMap<String, FieldValue>,
    /// Geometry, if any
    pub geometry: Option<Geometry>,
}

impl Feature {
    /// Creates a feature without attributes.
    pub fn new(fid: i64, geometry: Option<Geometry>) -> Self {
        Self {
            fid,
            attributes: BTreeMap::new(),
            geometry,
        }
    }

    /// Sets an attribute value.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Looks up an attribute by name, ignoring case.
    ///
    /// A field that is absent from the record reads as `None`; a present
    /// null reads as `Some(&FieldValue::Null)`.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.attributes.get(name).or_else(|| {
            self.attributes
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }
}
