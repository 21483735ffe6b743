use crate::common::{
    key::DocumentKey,
    path::FieldPath,
    precondition::UpdateTime,
    value::{self, Fields, Value},
};
use crate::error::{Error, Result};
use crate::reference;

use serde::de::DeserializeOwned;

/// A document as read from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct DocumentSnapshot {
    /// The document identity.
    pub key: DocumentKey,
    /// The document contents.
    pub fields: Fields,
    /// The last-modified marker at read time.
    pub update_time: UpdateTime,
}

impl DocumentSnapshot {
    /// Value at a dot-separated field path.
    pub fn field(&self, path: &FieldPath) -> Option<&Value> {
        path.get(&self.fields)
    }

    /// Value at a dot-separated field path, failing with `NotFound` when absent.
    pub fn data_at(&self, path: &str) -> Result<&Value> {
        let path = FieldPath::parse(path)?;
        self.field(&path)
            .ok_or_else(|| Error::NotFound(format!("field `{path}` in {}", self.key)))
    }

    /// The document referenced at a dot-separated field path.
    ///
    /// `NotFound` when the field is absent or holds anything but a reference.
    pub fn reference(&self, path: &str) -> Result<&DocumentKey> {
        reference::reference_at(&self.fields, path)
    }

    /// Deserialize the fields into a typed value.
    ///
    /// ```rust
    /// use document_crud::common::{key::DocumentKey, precondition::UpdateTime, value};
    /// use document_crud::read::snapshot::DocumentSnapshot;
    /// use serde::Deserialize;
    ///
    /// #[derive(Deserialize)]
    /// struct Property {
    ///     property_id: i64,
    /// }
    ///
    /// let snapshot = DocumentSnapshot {
    ///     key: DocumentKey::new("sample", "custom-struct"),
    ///     fields: value::to_fields(&serde_json::json!({"property_id": 999})).unwrap(),
    ///     update_time: UpdateTime::from_nanos(1),
    /// };
    /// let property: Property = snapshot.data_as().unwrap();
    /// assert_eq!(property.property_id, 999);
    /// ```
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T> {
        value::from_fields(&self.fields)
    }
}
