use crate::common::key::{DocumentKey, REFERENCE_MARKER};
use crate::error::{Error, Result};

use indexmap::IndexMap;
use serde::de::{self, DeserializeOwned, MapAccess, SeqAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{cmp, fmt};

/// Field name to value mapping held by a document, in insertion order.
pub type Fields = IndexMap<String, Value>;

/// A field value.
///
/// ```rust
/// use document_crud::common::{key::DocumentKey, value::Value};
///
/// let number = Value::from(999);
/// let name = Value::from("Hyatt");
/// let reference = Value::from(DocumentKey::new("sample", "json-1"));
/// assert_eq!(number.as_i64(), Some(999));
/// assert_eq!(name.as_str(), Some("Hyatt"));
/// assert!(reference.as_reference().is_some());
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Explicit null.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Ordered list of values.
    Array(Vec<Value>),
    /// Nested mapping.
    Map(Fields),
    /// Indirection to another document; resolving it takes a separate read.
    Reference(DocumentKey),
}

impl Value {
    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Map(_) => "map",
            Self::Reference(_) => "reference",
        }
    }

    /// Whether this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Any numeric value widened to a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::Double(value) => Some(*value),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// The list, if this is one.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(values) => Some(values),
            _ => None,
        }
    }

    /// The nested mapping, if this is one.
    pub fn as_map(&self) -> Option<&Fields> {
        match self {
            Self::Map(fields) => Some(fields),
            _ => None,
        }
    }

    /// The referenced document, if this is a reference.
    pub fn as_reference(&self) -> Option<&DocumentKey> {
        match self {
            Self::Reference(key) => Some(key),
            _ => None,
        }
    }

    /// Whether the value is an integer or a double.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Double(_))
    }

    /// Numeric sum, staying integral while both sides are integers and do not overflow.
    pub fn checked_add(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Self::Integer(left), Self::Integer(right)) => Some(match left.checked_add(*right) {
                Some(sum) => Self::Integer(sum),
                None => Self::Double(*left as f64 + *right as f64),
            }),
            _ => Some(Self::Double(self.as_f64()? + other.as_f64()?)),
        }
    }

    /// Ordering between comparable values: numbers with numbers, strings with strings,
    /// booleans with booleans. `None` for anything else.
    pub fn compare(&self, other: &Value) -> Option<cmp::Ordering> {
        match (self, other) {
            (Self::Integer(left), Self::Integer(right)) => Some(left.cmp(right)),
            (left, right) if left.is_numeric() && right.is_numeric() => {
                left.as_f64()?.partial_cmp(&right.as_f64()?)
            }
            (Self::String(left), Self::String(right)) => Some(left.cmp(right)),
            (Self::Bool(left), Self::Bool(right)) => Some(left.cmp(right)),
            (Self::Null, Self::Null) => Some(cmp::Ordering::Equal),
            _ => None,
        }
    }

    /// Equality as used by query filters: numbers compare by value across variants.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        if self.is_numeric() && other.is_numeric() {
            return self.compare(other) == Some(cmp::Ordering::Equal);
        }
        self == other
    }

    /// Convert a JSON value; `{"$ref": "collection/key"}` becomes a reference.
    pub fn from_json(json: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(json)?)
    }

    /// Convert into JSON; references become `{"$ref": "collection/key"}`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// Serialize any value that maps onto a document (a struct or a JSON object) into fields.
///
/// ```rust
/// use document_crud::common::value;
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Property {
///     property_id: i16,
///     name: String,
/// }
///
/// let fields = value::to_fields(&Property { property_id: 999, name: "Hyatt".to_string() }).unwrap();
/// assert_eq!(fields["property_id"].as_i64(), Some(999));
/// ```
pub fn to_fields<T: Serialize + ?Sized>(data: &T) -> Result<Fields> {
    match Value::from_json(serde_json::to_value(data)?)? {
        Value::Map(fields) => Ok(fields),
        other => Err(Error::InvalidArgument(format!(
            "a document must be a map of fields, got {}",
            other.type_name()
        ))),
    }
}

/// Deserialize fields into a typed value.
pub fn from_fields<T: DeserializeOwned>(fields: &Fields) -> Result<T> {
    let json = serde_json::to_value(fields)?;
    Ok(serde_json::from_value(json)?)
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(value) => serializer.serialize_bool(*value),
            Self::Integer(value) => serializer.serialize_i64(*value),
            Self::Double(value) => serializer.serialize_f64(*value),
            Self::String(value) => serializer.serialize_str(value),
            Self::Array(values) => values.serialize(serializer),
            Self::Map(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (name, value) in fields {
                    map.serialize_entry(name, value)?;
                }
                map.end()
            }
            Self::Reference(key) => key.serialize(serializer),
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a document field value")
    }

    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Value, E> {
        Ok(Value::Bool(value))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Value, E> {
        Ok(Value::Integer(value))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Value, E> {
        Ok(match i64::try_from(value) {
            Ok(value) => Value::Integer(value),
            Err(_) => Value::Double(value as f64),
        })
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Value, E> {
        Ok(Value::Double(value))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Value, E> {
        Ok(Value::String(value.to_string()))
    }

    fn visit_string<E: de::Error>(self, value: String) -> Result<Value, E> {
        Ok(Value::String(value))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
        Value::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
        let mut values = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(value) = seq.next_element()? {
            values.push(value);
        }
        Ok(Value::Array(values))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Value, A::Error> {
        let mut fields = Fields::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((name, value)) = map.next_entry::<String, Value>()? {
            fields.insert(name, value);
        }
        if fields.len() == 1 {
            let reference = fields
                .get(REFERENCE_MARKER)
                .and_then(Value::as_str)
                .and_then(|path| DocumentKey::parse(path).ok());
            if let Some(key) = reference {
                return Ok(Value::Reference(key));
            }
        }
        Ok(Value::Map(fields))
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Self::Array(values)
    }
}

impl From<Fields> for Value {
    fn from(fields: Fields) -> Self {
        Self::Map(fields)
    }
}

impl From<DocumentKey> for Value {
    fn from(key: DocumentKey) -> Self {
        Self::Reference(key)
    }
}
