use crate::common::{
    key::{self, DocumentKey},
    precondition::Precondition,
    value::{self, Fields},
};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::read::{query::Query, snapshot::DocumentSnapshot};
use crate::store::{DocumentStore, ReadVersion};
use crate::transaction::Transaction;
use crate::write::{
    batch::WriteBatch,
    operation::{FieldUpdate, SetOptions, Write, WriteResult},
};

use serde::Serialize;
use std::{future::Future, sync::Arc};

/// Handle on a document store.
///
/// Owns the store and the configuration; components borrow it instead of reaching for a
/// process-wide client.
///
/// ```rust
/// use document_crud::{client::Client, common::{key::DocumentKey, value}, config::ClientConfig};
/// use document_crud::store::memory::MemoryStore;
///
/// # async fn example() -> document_crud::error::Result<()> {
/// let client = Client::new(MemoryStore::new(), ClientConfig::default());
/// let key = DocumentKey::new("sample", "json-1");
/// client.create(&key, value::to_fields(&serde_json::json!({"name": "Hyatt"}))?).await?;
/// let snapshot = client.get(&key).await?;
/// assert_eq!(snapshot.data_at("name")?.as_str(), Some("Hyatt"));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client<S> {
    store: Arc<S>,
    config: ClientConfig,
}

impl<S> Clone for Client<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: DocumentStore> Client<S> {
    /// Wrap a store.
    pub fn new(store: S, config: ClientConfig) -> Self {
        Self::from_shared(Arc::new(store), config)
    }

    /// Wrap a store shared with other owners.
    pub fn from_shared(store: Arc<S>, config: ClientConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn within_deadline<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.operation_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| Error::DeadlineExceeded(timeout))?,
            None => call.await,
        }
    }

    /// Read one document; `NotFound` if it does not exist.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "document_crud.get", skip_all, fields(key = %key), err)
    )]
    pub async fn get(&self, key: &DocumentKey) -> Result<DocumentSnapshot> {
        self.get_all(std::slice::from_ref(key))
            .await?
            .pop()
            .flatten()
            .ok_or_else(|| Error::document_not_found(key))
    }

    /// Read several documents in one round trip, in request order.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "document_crud.get_all",
            skip_all,
            fields(count = keys.len()),
            err
        )
    )]
    pub async fn get_all(&self, keys: &[DocumentKey]) -> Result<Vec<Option<DocumentSnapshot>>> {
        for key in keys {
            key.validate()?;
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        self.within_deadline(self.store.get_all(keys)).await
    }

    /// Documents matching a query.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "document_crud.query", skip(self), err)
    )]
    pub async fn query(&self, query: &Query) -> Result<Vec<DocumentSnapshot>> {
        key::validate_collection(&query.collection)?;
        self.within_deadline(self.store.query(query)).await
    }

    /// Create a document; `AlreadyExists` leaves the existing one untouched.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "document_crud.create", skip_all, fields(key = %key), err)
    )]
    pub async fn create(&self, key: &DocumentKey, fields: Fields) -> Result<WriteResult> {
        self.write(Write::create(key.clone(), fields)).await
    }

    /// Create a document from any serializable struct.
    pub async fn create_from<T: Serialize + ?Sized>(
        &self,
        key: &DocumentKey,
        data: &T,
    ) -> Result<WriteResult> {
        self.create(key, value::to_fields(data)?).await
    }

    /// Create or replace a document, fully or merging per `options`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "document_crud.set", skip_all, fields(key = %key), err)
    )]
    pub async fn set(
        &self,
        key: &DocumentKey,
        fields: Fields,
        options: SetOptions,
    ) -> Result<WriteResult> {
        self.write(Write::set(key.clone(), fields, options)).await
    }

    /// Update fields of an existing document, optionally under a precondition.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "document_crud.update", skip_all, fields(key = %key), err)
    )]
    pub async fn update(
        &self,
        key: &DocumentKey,
        updates: Vec<FieldUpdate>,
        precondition: Option<Precondition>,
    ) -> Result<WriteResult> {
        self.write(Write::update(key.clone(), updates, precondition))
            .await
    }

    /// Delete a document; deleting a missing document succeeds.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "document_crud.delete", skip_all, fields(key = %key), err)
    )]
    pub async fn delete(&self, key: &DocumentKey) -> Result<WriteResult> {
        self.write(Write::delete(key.clone(), None)).await
    }

    /// Delete several documents in one atomic batch.
    ///
    /// More keys than [`DocumentStore::max_commit_writes`] are rejected with `InvalidArgument`.
    pub async fn delete_all(&self, keys: &[DocumentKey]) -> Result<Vec<WriteResult>> {
        let mut batch = self.batch();
        for key in keys {
            batch.delete(key.clone());
        }
        batch.commit().await
    }

    /// Start an atomic batch of blind writes.
    pub fn batch(&self) -> WriteBatch<'_, S> {
        WriteBatch::new(self)
    }

    /// Start a transaction; commit it with [`Transaction::commit`].
    pub fn begin_transaction(&self) -> Transaction<'_, S> {
        Transaction::new(self)
    }

    async fn write(&self, write: Write) -> Result<WriteResult> {
        let key = write.key.clone();
        self.commit(vec![write], Vec::new())
            .await?
            .pop()
            .ok_or_else(|| Error::Internal(format!("commit of {key} returned no result")))
    }

    pub(crate) async fn commit(
        &self,
        writes: Vec<Write>,
        reads: Vec<ReadVersion>,
    ) -> Result<Vec<WriteResult>> {
        for write in &writes {
            write.validate()?;
        }
        if writes.is_empty() && reads.is_empty() {
            return Ok(Vec::new());
        }
        self.within_deadline(self.store.commit(writes, reads)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::query::FilterOperator;
    use crate::store::memory::MemoryStore;

    use serde_json::json;
    use std::time;

    fn fields(json: serde_json::Value) -> Fields {
        value::to_fields(&json).unwrap()
    }

    fn client() -> Client<MemoryStore> {
        Client::new(MemoryStore::new(), ClientConfig::default())
    }

    #[derive(Serialize)]
    struct Property {
        property_id: i16,
        name: String,
    }

    #[tokio::test]
    async fn test_create_on_existing_key_keeps_document() {
        let client = client();
        let key = DocumentKey::new("sample", "custom-struct");
        let property = Property {
            property_id: 999,
            name: "Hyatt".to_string(),
        };
        let created = client.create_from(&key, &property).await.unwrap();
        let error = client
            .create(&key, fields(json!({"name": "Intruder"})))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::AlreadyExists(_)), "{error}");
        let snapshot = client.get(&key).await.unwrap();
        assert_eq!(snapshot.fields, fields(json!({"property_id": 999, "name": "Hyatt"})));
        assert_eq!(snapshot.update_time, created.update_time);
    }

    #[tokio::test]
    async fn test_set_merge_and_replace() {
        let client = client();
        let key = DocumentKey::new("sample", "custom-struct");
        client
            .create(&key, fields(json!({"property_id": 999, "name": "Hyatt"})))
            .await
            .unwrap();
        client
            .set(&key, fields(json!({"name": "Updated Name"})), SetOptions::MergeAll)
            .await
            .unwrap();
        assert_eq!(
            client.get(&key).await.unwrap().fields,
            fields(json!({"property_id": 999, "name": "Updated Name"}))
        );
        client
            .set(&key, fields(json!({"Name": "Replaced doc"})), SetOptions::Overwrite)
            .await
            .unwrap();
        assert_eq!(
            client.get(&key).await.unwrap().fields,
            fields(json!({"Name": "Replaced doc"}))
        );
    }

    #[tokio::test]
    async fn test_stale_precondition_update_fails() {
        let client = client();
        let key = DocumentKey::new("sample", "custom-struct");
        client
            .create(&key, fields(json!({"name": "Hyatt"})))
            .await
            .unwrap();
        let stale = client.get(&key).await.unwrap().update_time;
        let update = || vec![FieldUpdate::assign("name", "Updated Name 1").unwrap()];
        client
            .update(&key, update(), Some(Precondition::LastUpdateTime(stale)))
            .await
            .unwrap();
        let error = client
            .update(&key, update(), Some(Precondition::LastUpdateTime(stale)))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::PreconditionFailed(_)), "{error}");
    }

    #[tokio::test]
    async fn test_update_missing_document() {
        let client = client();
        let error = client
            .update(
                &DocumentKey::new("sample", "ghost"),
                vec![FieldUpdate::assign("name", "x").unwrap()],
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)), "{error}");
    }

    #[tokio::test]
    async fn test_deleted_keys_are_not_found() {
        let client = client();
        let keys: Vec<_> = ["json-1", "json-2", "custom-struct", "doc-ref"]
            .into_iter()
            .map(|key| DocumentKey::new("sample", key))
            .collect();
        for key in &keys {
            client.create(key, fields(json!({"k": key.key}))).await.unwrap();
        }
        client.delete_all(&keys).await.unwrap();
        for key in &keys {
            let error = client.get(key).await.unwrap_err();
            assert!(matches!(error, Error::NotFound(_)), "{error}");
        }
        client.delete(&keys[0]).await.unwrap();
    }

    #[tokio::test]
    async fn test_query_filters_one_collection() {
        let client = client();
        for (collection, key, stars) in [
            ("sample", "json-1", 3),
            ("sample", "json-2", 5),
            ("sample", "json-3", 4),
            ("owners", "o-1", 5),
        ] {
            let data = fields(json!({"stars": stars}));
            client
                .create(&DocumentKey::new(collection, key), data)
                .await
                .unwrap();
        }
        let query = Query::new("sample")
            .filter("stars", FilterOperator::GreaterThanOrEqual, 4)
            .unwrap();
        let found: Vec<_> = client
            .query(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|snapshot| snapshot.key.key)
            .collect();
        assert_eq!(found, ["json-2", "json-3"]);
        assert_eq!(client.query(&query.limit(1)).await.unwrap().len(), 1);
        let error = client.query(&Query::new("")).await.unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)), "{error}");
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected_before_the_store() {
        let client = client();
        let error = client
            .get(&DocumentKey::new("sample", "a/b"))
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)), "{error}");
        assert_eq!(client.store().round_trips(), 0);
    }

    #[tokio::test]
    async fn test_operation_timeout() {
        let store = MemoryStore::new().with_latency(time::Duration::from_millis(200));
        let client = Client::new(
            store,
            ClientConfig {
                operation_timeout_ms: Some(10),
                ..Default::default()
            },
        );
        let key = DocumentKey::new("sample", "json-1");
        let error = client.create(&key, Fields::new()).await.unwrap_err();
        assert!(matches!(error, Error::DeadlineExceeded(_)), "{error}");
        assert!(error.is_retryable());
        assert!(client.store().is_empty());
    }
}
