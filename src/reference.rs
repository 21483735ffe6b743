use crate::client::Client;
use crate::common::{key::DocumentKey, path::FieldPath, value::Fields};
use crate::error::{Error, Result};
use crate::read::snapshot::DocumentSnapshot;
use crate::store::DocumentStore;

/// Follows document references stored as field values.
///
/// A reference is a [`crate::common::value::Value::Reference`] naming another document;
/// resolving it costs exactly one extra read.
///
/// ```rust
/// use document_crud::{client::Client, common::{key::DocumentKey, value::{Fields, Value}}};
/// use document_crud::{config::ClientConfig, reference::ReferenceResolver, store::memory::MemoryStore};
///
/// # async fn example() -> document_crud::error::Result<()> {
/// let client = Client::new(MemoryStore::new(), ClientConfig::default());
/// let target = DocumentKey::new("sample", "json-1");
/// client.create(&target, Fields::from([("name".to_string(), Value::from("Hyatt"))])).await?;
/// let data = Fields::from([("ref".to_string(), Value::from(target))]);
/// let resolved = ReferenceResolver::new(&client).resolve(&data, "ref").await?;
/// assert_eq!(resolved.data_at("name")?.as_str(), Some("Hyatt"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ReferenceResolver<'c, S> {
    client: &'c Client<S>,
}

impl<'c, S: DocumentStore> ReferenceResolver<'c, S> {
    /// Resolve through `client`.
    pub fn new(client: &'c Client<S>) -> Self {
        Self { client }
    }

    /// The document referenced by `field` of `fields`.
    ///
    /// `NotFound` when the field is absent, is not a reference, or names a missing document.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "document_crud.resolve_reference", skip(self, fields), err)
    )]
    pub async fn resolve(&self, fields: &Fields, field: &str) -> Result<DocumentSnapshot> {
        let target = reference_at(fields, field)?;
        self.client.get(target).await
    }

    /// Read `key` and resolve the reference held in its `field`.
    pub async fn resolve_from(&self, key: &DocumentKey, field: &str) -> Result<DocumentSnapshot> {
        let source = self.client.get(key).await?;
        self.resolve(&source.fields, field).await
    }
}

/// The reference held at a dot-separated path; `NotFound` when absent or not a reference.
pub(crate) fn reference_at<'f>(fields: &'f Fields, field: &str) -> Result<&'f DocumentKey> {
    let path = FieldPath::parse(field)?;
    match path.get(fields) {
        Some(value) => value.as_reference().ok_or_else(|| {
            Error::NotFound(format!(
                "field `{path}` holds a {}, not a reference",
                value.type_name()
            ))
        }),
        None => Err(Error::NotFound(format!("reference field `{path}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::value::{self, Value};
    use crate::config::ClientConfig;
    use crate::store::memory::MemoryStore;

    use rstest::rstest;
    use serde_json::json;

    fn target() -> DocumentKey {
        DocumentKey::new("sample", "json-1")
    }

    async fn client() -> Client<MemoryStore> {
        let client = Client::new(MemoryStore::new(), ClientConfig::default());
        client
            .create(&target(), value::to_fields(&json!({"name": "Hyatt"})).unwrap())
            .await
            .unwrap();
        client
            .create(
                &DocumentKey::new("sample", "doc-ref"),
                Fields::from([("ref".to_string(), Value::from(target()))]),
            )
            .await
            .unwrap();
        client
    }

    #[tokio::test]
    async fn test_resolve_costs_one_round_trip() {
        let client = client().await;
        let source = client.get(&DocumentKey::new("sample", "doc-ref")).await.unwrap();
        let before = client.store().round_trips();
        let resolved = ReferenceResolver::new(&client)
            .resolve(&source.fields, "ref")
            .await
            .unwrap();
        assert_eq!(client.store().round_trips(), before + 1);
        assert_eq!(resolved.key, target());
        assert_eq!(resolved.data_at("name").unwrap(), &Value::from("Hyatt"));
    }

    #[tokio::test]
    async fn test_resolve_from() {
        let client = client().await;
        let resolved = ReferenceResolver::new(&client)
            .resolve_from(&DocumentKey::new("sample", "doc-ref"), "ref")
            .await
            .unwrap();
        assert_eq!(resolved.key, target());
    }

    #[tokio::test]
    async fn test_deleted_target_is_not_found() {
        let client = client().await;
        client.delete(&target()).await.unwrap();
        let error = ReferenceResolver::new(&client)
            .resolve_from(&DocumentKey::new("sample", "doc-ref"), "ref")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)), "{error}");
    }

    #[rstest]
    #[case::absent(json!({"name": "Hyatt"}))]
    #[case::not_a_reference(json!({"ref": "sample/json-1"}))]
    #[case::plain_map(json!({"ref": {"collection": "sample", "key": "json-1"}}))]
    fn test_field_without_reference(#[case] data: serde_json::Value) {
        let fields = value::to_fields(&data).unwrap();
        let error = reference_at(&fields, "ref").unwrap_err();
        assert!(matches!(error, Error::NotFound(_)), "{error}");
    }

    #[test]
    fn test_reference_from_json_marker() {
        let fields = value::to_fields(&json!({"ref": {"$ref": "sample/json-1"}})).unwrap();
        assert_eq!(reference_at(&fields, "ref").unwrap(), &target());
    }
}
