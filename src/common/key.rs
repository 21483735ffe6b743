use crate::error::{Error, Result};

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;

/// Map key marking a serialized document reference.
pub const REFERENCE_MARKER: &str = "$ref";

/// Separator between the collection and the key of a document path.
const PATH_SEPARATOR: char = '/';

/// Identity of a document: the collection it lives in and its key.
///
/// Stored as a field value ([`crate::common::value::Value::Reference`]) the same type acts
/// as a reference to another document.
///
/// ```rust
/// use document_crud::common::key::DocumentKey;
///
/// let key = DocumentKey::new("sample", "json-1");
/// assert_eq!(key.to_string(), "sample/json-1");
/// assert_eq!(DocumentKey::parse("sample/json-1").unwrap(), key);
/// ```
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct DocumentKey {
    /// The collection (table) the document belongs to.
    pub collection: String,
    /// The document key, unique within its collection.
    pub key: String,
}

impl DocumentKey {
    /// Build a key without validating it; see [`DocumentKey::validate`].
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
        }
    }

    /// Parse a `collection/key` path.
    pub fn parse(path: &str) -> Result<Self> {
        let (collection, key) = path.split_once(PATH_SEPARATOR).ok_or_else(|| {
            Error::InvalidArgument(format!("document path `{path}` has no `/` separator"))
        })?;
        let document_key = Self::new(collection, key);
        document_key.validate()?;
        Ok(document_key)
    }

    /// Check that both components are non-empty and free of `/`.
    pub fn validate(&self) -> Result<()> {
        validate_component("collection", &self.collection)?;
        validate_component("key", &self.key)
    }
}

/// Check that a collection name is non-empty and free of `/`.
pub fn validate_collection(collection: &str) -> Result<()> {
    validate_component("collection", collection)
}

fn validate_component(name: &str, component: &str) -> Result<()> {
    if component.is_empty() {
        return Err(Error::InvalidArgument(format!("empty {name}")));
    }
    if component.contains(PATH_SEPARATOR) {
        return Err(Error::InvalidArgument(format!(
            "{name} `{component}` must not contain `{PATH_SEPARATOR}`"
        )));
    }
    Ok(())
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{PATH_SEPARATOR}{}", self.collection, self.key)
    }
}

#[derive(Serialize)]
struct SerializedReference {
    #[serde(rename = "$ref")]
    path: String,
}

#[derive(Deserialize)]
struct DeserializedReference {
    #[serde(rename = "$ref")]
    path: String,
}

impl Serialize for DocumentKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SerializedReference {
            path: self.to_string(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DocumentKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let reference = DeserializedReference::deserialize(deserializer)?;
        Self::parse(&reference.path).map_err(de::Error::custom)
    }
}
