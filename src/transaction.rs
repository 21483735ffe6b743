//! Optimistic read-modify-write transactions.
//!
//! A transaction records the version of every document it reads and buffers its writes.
//! On commit the store re-validates every recorded version together with the writes; if
//! any document changed in between, nothing is applied and `TransactionConflict` is
//! returned. Reads must come before writes.

use crate::client::Client;
use crate::common::{
    key::DocumentKey,
    precondition::{Precondition, UpdateTime},
    value::Fields,
};
use crate::error::{Error, Result};
use crate::read::{query::Query, snapshot::DocumentSnapshot};
use crate::store::{DocumentStore, ReadVersion};
use crate::write::operation::{FieldUpdate, SetOptions, Write, WriteResult};

use indexmap::IndexMap;
use std::{future::Future, pin::Pin};

/// Future returned by a [`Client::run_transaction`] body.
pub type TransactionFuture<'t, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 't>>;

/// A transaction in progress.
///
/// Dropping it without calling [`Transaction::commit`] discards the buffered writes.
#[derive(Debug)]
pub struct Transaction<'c, S> {
    client: &'c Client<S>,
    reads: IndexMap<DocumentKey, Option<UpdateTime>>,
    writes: Vec<Write>,
}

impl<'c, S: DocumentStore> Transaction<'c, S> {
    pub(crate) fn new(client: &'c Client<S>) -> Self {
        Self {
            client,
            reads: IndexMap::new(),
            writes: Vec::new(),
        }
    }

    fn ensure_reading(&self) -> Result<()> {
        if self.writes.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidArgument(
                "transactions must perform all reads before any write".to_string(),
            ))
        }
    }

    fn record(&mut self, key: &DocumentKey, update_time: Option<UpdateTime>) -> Result<()> {
        match self.reads.get(key) {
            Some(seen) if *seen != update_time => Err(Error::TransactionConflict(format!(
                "{key} changed between two reads of the same transaction"
            ))),
            Some(_) => Ok(()),
            None => {
                self.reads.insert(key.clone(), update_time);
                Ok(())
            }
        }
    }

    /// Read one document and record its version; `NotFound` still records the absence.
    pub async fn get(&mut self, key: &DocumentKey) -> Result<DocumentSnapshot> {
        self.get_all(std::slice::from_ref(key))
            .await?
            .pop()
            .flatten()
            .ok_or_else(|| Error::document_not_found(key))
    }

    /// Read several documents in one round trip and record their versions.
    pub async fn get_all(&mut self, keys: &[DocumentKey]) -> Result<Vec<Option<DocumentSnapshot>>> {
        self.ensure_reading()?;
        let snapshots = self.client.get_all(keys).await?;
        for (key, snapshot) in keys.iter().zip(&snapshots) {
            self.record(key, snapshot.as_ref().map(|snapshot| snapshot.update_time))?;
        }
        Ok(snapshots)
    }

    /// Run a query and record the version of every returned document.
    pub async fn query(&mut self, query: &Query) -> Result<Vec<DocumentSnapshot>> {
        self.ensure_reading()?;
        let snapshots = self.client.query(query).await?;
        for snapshot in &snapshots {
            self.record(&snapshot.key, Some(snapshot.update_time))?;
        }
        Ok(snapshots)
    }

    /// Buffer a create.
    pub fn create(&mut self, key: DocumentKey, fields: Fields) -> &mut Self {
        self.push(Write::create(key, fields))
    }

    /// Buffer a set.
    pub fn set(&mut self, key: DocumentKey, fields: Fields, options: SetOptions) -> &mut Self {
        self.push(Write::set(key, fields, options))
    }

    /// Buffer an update.
    pub fn update(
        &mut self,
        key: DocumentKey,
        updates: Vec<FieldUpdate>,
        precondition: Option<Precondition>,
    ) -> &mut Self {
        self.push(Write::update(key, updates, precondition))
    }

    /// Buffer a delete.
    pub fn delete(&mut self, key: DocumentKey) -> &mut Self {
        self.push(Write::delete(key, None))
    }

    /// Buffer an arbitrary write.
    pub fn push(&mut self, write: Write) -> &mut Self {
        self.writes.push(write);
        self
    }

    /// Number of documents read so far.
    pub fn read_count(&self) -> usize {
        self.reads.len()
    }

    /// Number of buffered writes.
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    /// Validate the recorded reads and apply the buffered writes atomically.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "document_crud.transaction_commit",
            skip_all,
            fields(reads = self.reads.len(), writes = self.writes.len()),
            err
        )
    )]
    pub async fn commit(self) -> Result<Vec<WriteResult>> {
        let reads = self
            .reads
            .into_iter()
            .map(|(key, update_time)| ReadVersion { key, update_time })
            .collect();
        self.client.commit(self.writes, reads).await
    }

    /// Discard the transaction.
    pub fn rollback(self) {}
}

impl<S: DocumentStore> Client<S> {
    /// Run `body` inside a transaction and commit it, retrying on conflicts.
    ///
    /// The body is re-run from scratch, against a fresh transaction, each time the commit
    /// (or one of its reads) fails with `TransactionConflict`, up to
    /// [`crate::config::ClientConfig::max_transaction_attempts`] times. Any other error
    /// returned by the body discards that transaction and is handed back unchanged.
    ///
    /// ```rust
    /// use document_crud::{client::Client, common::key::DocumentKey, config::ClientConfig};
    /// use document_crud::{error::Error, store::memory::MemoryStore, write::operation::FieldUpdate};
    ///
    /// # async fn example() -> document_crud::error::Result<()> {
    /// let client = Client::new(MemoryStore::new(), ClientConfig::default());
    /// let key = DocumentKey::new("counters", "visits");
    /// client.create(&key, Default::default()).await?;
    /// let visits = client
    ///     .run_transaction(|transaction| {
    ///         let key = key.clone();
    ///         Box::pin(async move {
    ///             let snapshot = transaction.get(&key).await?;
    ///             let visits = snapshot.data_at("n").ok().and_then(|n| n.as_i64()).unwrap_or(0) + 1;
    ///             transaction.update(key, vec![FieldUpdate::assign("n", visits)?], None);
    ///             Ok::<_, Error>(visits)
    ///         })
    ///     })
    ///     .await?;
    /// assert_eq!(visits, 1);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run_transaction<'c, T, F>(&'c self, mut body: F) -> Result<T>
    where
        F: for<'t> FnMut(&'t mut Transaction<'c, S>) -> TransactionFuture<'t, T>,
    {
        let attempts = self.config().max_transaction_attempts.max(1);
        let mut attempt = 1;
        loop {
            let mut transaction = self.begin_transaction();
            let outcome = match body(&mut transaction).await {
                Ok(value) => transaction.commit().await.map(|_| value),
                Err(error) => Err(error),
            };
            match outcome {
                Err(Error::TransactionConflict(_reason)) if attempt < attempts => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, reason = %_reason, "retrying conflicting transaction");
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::value;
    use crate::config::ClientConfig;
    use crate::read::query::FilterOperator;
    use crate::store::memory::MemoryStore;

    use serde_json::json;
    use std::sync::{Arc, atomic};

    fn fields(json: serde_json::Value) -> Fields {
        value::to_fields(&json).unwrap()
    }

    fn counter() -> DocumentKey {
        DocumentKey::new("counters", "visits")
    }

    async fn client_with_counter(n: i64) -> Client<MemoryStore> {
        let client = Client::new(MemoryStore::new(), ClientConfig::default());
        client.create(&counter(), fields(json!({"n": n}))).await.unwrap();
        client
    }

    async fn read_n(client: &Client<MemoryStore>) -> i64 {
        let snapshot = client.get(&counter()).await.unwrap();
        snapshot.data_at("n").unwrap().as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_interleaved_transactions_conflict() {
        let client = client_with_counter(5).await;
        let mut first = client.begin_transaction();
        let mut second = client.begin_transaction();
        first.get(&counter()).await.unwrap();
        second.get(&counter()).await.unwrap();
        first.update(counter(), vec![FieldUpdate::assign("n", 6).unwrap()], None);
        second.update(counter(), vec![FieldUpdate::assign("n", 6).unwrap()], None);
        first.commit().await.unwrap();
        let error = second.commit().await.unwrap_err();
        assert!(matches!(error, Error::TransactionConflict(_)), "{error}");
        assert_eq!(read_n(&client).await, 6);
    }

    #[tokio::test]
    async fn test_missing_read_is_recorded() {
        let client = Client::new(MemoryStore::new(), ClientConfig::default());
        let key = DocumentKey::new("sample", "json-1");
        let mut transaction = client.begin_transaction();
        let error = transaction.get(&key).await.unwrap_err();
        assert!(matches!(error, Error::NotFound(_)), "{error}");
        assert_eq!(transaction.read_count(), 1);
        client.create(&key, Fields::new()).await.unwrap();
        transaction.create(key, fields(json!({"a": 1})));
        let error = transaction.commit().await.unwrap_err();
        assert!(matches!(error, Error::TransactionConflict(_)), "{error}");
    }

    #[tokio::test]
    async fn test_query_results_are_validated_on_commit() {
        let client = Client::new(MemoryStore::new(), ClientConfig::default());
        let open = DocumentKey::new("sample", "json-1");
        let closed = DocumentKey::new("sample", "json-2");
        client
            .create(&open, fields(json!({"open": true, "n": 1})))
            .await
            .unwrap();
        client
            .create(&closed, fields(json!({"open": false})))
            .await
            .unwrap();
        let query = Query::new("sample")
            .filter("open", FilterOperator::Equals, true)
            .unwrap();
        let mut transaction = client.begin_transaction();
        let found = transaction.query(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].key, open);
        assert_eq!(transaction.read_count(), 1);
        client
            .update(&open, vec![FieldUpdate::increment("n", 1).unwrap()], None)
            .await
            .unwrap();
        transaction.update(
            open.clone(),
            vec![FieldUpdate::assign("n", 10).unwrap()],
            None,
        );
        let error = transaction.commit().await.unwrap_err();
        assert!(matches!(error, Error::TransactionConflict(_)), "{error}");
        let snapshot = client.get(&open).await.unwrap();
        assert_eq!(snapshot.data_at("n").unwrap().as_i64(), Some(2));
    }

    #[tokio::test]
    async fn test_read_after_write_is_rejected() {
        let client = client_with_counter(0).await;
        let mut transaction = client.begin_transaction();
        transaction.delete(counter());
        let error = transaction.get(&counter()).await.unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)), "{error}");
    }

    #[tokio::test]
    async fn test_changed_reread_conflicts() {
        let client = client_with_counter(0).await;
        let mut transaction = client.begin_transaction();
        transaction.get(&counter()).await.unwrap();
        client
            .update(&counter(), vec![FieldUpdate::increment("n", 1).unwrap()], None)
            .await
            .unwrap();
        let error = transaction.get(&counter()).await.unwrap_err();
        assert!(matches!(error, Error::TransactionConflict(_)), "{error}");
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let client = client_with_counter(0).await;
        let mut transaction = client.begin_transaction();
        transaction.get(&counter()).await.unwrap();
        transaction.delete(counter());
        transaction.rollback();
        assert_eq!(read_n(&client).await, 0);
    }

    #[tokio::test]
    async fn test_run_transaction_retries_conflicts() {
        let client = client_with_counter(5).await;
        let attempts = Arc::new(atomic::AtomicUsize::new(0));
        let n = client
            .run_transaction(|transaction| {
                let client = client.clone();
                let attempts = Arc::clone(&attempts);
                Box::pin(async move {
                    let attempt = attempts.fetch_add(1, atomic::Ordering::SeqCst);
                    let snapshot = transaction.get(&counter()).await?;
                    let n = snapshot.data_at("n")?.as_i64().unwrap_or_default() + 1;
                    if attempt == 0 {
                        client
                            .update(&counter(), vec![FieldUpdate::increment("n", 10)?], None)
                            .await?;
                    }
                    transaction.update(counter(), vec![FieldUpdate::assign("n", n)?], None);
                    Ok::<_, Error>(n)
                })
            })
            .await
            .unwrap();
        assert_eq!(attempts.load(atomic::Ordering::SeqCst), 2);
        assert_eq!(n, 16);
        assert_eq!(read_n(&client).await, 16);
    }

    #[tokio::test]
    async fn test_run_transaction_gives_up_after_max_attempts() {
        let client = client_with_counter(0).await;
        let attempts = Arc::new(atomic::AtomicUsize::new(0));
        let error = client
            .run_transaction(|transaction| {
                let client = client.clone();
                let attempts = Arc::clone(&attempts);
                Box::pin(async move {
                    attempts.fetch_add(1, atomic::Ordering::SeqCst);
                    transaction.get(&counter()).await?;
                    client
                        .update(&counter(), vec![FieldUpdate::increment("n", 1)?], None)
                        .await?;
                    transaction.delete(counter());
                    Ok::<_, Error>(())
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(error, Error::TransactionConflict(_)), "{error}");
        assert_eq!(
            attempts.load(atomic::Ordering::SeqCst),
            client.config().max_transaction_attempts
        );
        assert_eq!(read_n(&client).await, 5);
    }

    #[tokio::test]
    async fn test_body_error_aborts_only_the_transaction() {
        let client = client_with_counter(0).await;
        let error = client
            .run_transaction(|transaction| {
                Box::pin(async move {
                    transaction.get(&counter()).await?;
                    transaction.delete(counter());
                    Err::<(), _>(Error::InvalidArgument("bad input".to_string()))
                })
            })
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidArgument(_)), "{error}");
        assert_eq!(read_n(&client).await, 0);
        client.get(&counter()).await.unwrap();
    }
}
