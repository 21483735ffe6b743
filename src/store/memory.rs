use crate::common::{key::DocumentKey, precondition::UpdateTime, value::Fields};
use crate::error::{Error, Result};
use crate::read::{query::Query, snapshot::DocumentSnapshot};
use crate::store::{DocumentStore, ReadVersion};
use crate::write::{
    batch::MAX_BATCH_WRITES,
    operation::{Write, WriteResult},
};

use parking_lot::Mutex;
use std::{collections, sync::atomic, time};

#[derive(Clone, Debug)]
struct StoredDocument {
    fields: Fields,
    update_time: UpdateTime,
}

#[derive(Debug, Default)]
struct State {
    documents: collections::BTreeMap<DocumentKey, StoredDocument>,
    last_update_time: Option<UpdateTime>,
}

impl State {
    fn tick(&mut self) -> UpdateTime {
        let update_time = UpdateTime::after(self.last_update_time);
        self.last_update_time = Some(update_time);
        update_time
    }

    fn snapshot(&self, key: &DocumentKey) -> Option<DocumentSnapshot> {
        self.documents.get(key).map(|document| DocumentSnapshot {
            key: key.clone(),
            fields: document.fields.clone(),
            update_time: document.update_time,
        })
    }
}

/// In-process document store.
///
/// All documents live behind one mutex, so every commit is atomic and isolated. An optional
/// latency is awaited before each call to model a remote round trip.
///
/// ```rust
/// use document_crud::store::memory::MemoryStore;
/// use std::time::Duration;
///
/// let store = MemoryStore::new().with_latency(Duration::from_millis(2));
/// assert_eq!(store.round_trips(), 0);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    latency: Option<time::Duration>,
    max_commit_writes: Option<usize>,
    round_trips: atomic::AtomicUsize,
}

impl MemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait this long before serving each call.
    pub fn with_latency(mut self, latency: time::Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reject commits of more than `limit` writes.
    pub fn with_max_commit_writes(mut self, limit: usize) -> Self {
        self.max_commit_writes = Some(limit);
        self
    }

    /// Number of calls served so far.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(atomic::Ordering::SeqCst)
    }

    /// Number of stored documents across all collections.
    pub fn len(&self) -> usize {
        self.state.lock().documents.len()
    }

    /// Whether no document is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn round_trip(&self) {
        self.round_trips.fetch_add(1, atomic::Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl DocumentStore for MemoryStore {
    async fn get_all(&self, keys: &[DocumentKey]) -> Result<Vec<Option<DocumentSnapshot>>> {
        self.round_trip().await;
        let state = self.state.lock();
        Ok(keys.iter().map(|key| state.snapshot(key)).collect())
    }

    async fn query(&self, query: &Query) -> Result<Vec<DocumentSnapshot>> {
        self.round_trip().await;
        let state = self.state.lock();
        let matching = state
            .documents
            .iter()
            .filter(|(key, document)| {
                key.collection == query.collection && query.matches(&document.fields)
            })
            .map(|(key, document)| DocumentSnapshot {
                key: key.clone(),
                fields: document.fields.clone(),
                update_time: document.update_time,
            })
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(matching)
    }

    async fn commit(
        &self,
        writes: Vec<Write>,
        reads: Vec<ReadVersion>,
    ) -> Result<Vec<WriteResult>> {
        self.round_trip().await;
        let limit = self.max_commit_writes();
        if writes.len() > limit {
            return Err(Error::InvalidArgument(format!(
                "commit of {} writes exceeds the limit of {limit}",
                writes.len()
            )));
        }
        let mut state = self.state.lock();
        for read in &reads {
            let current = state.documents.get(&read.key).map(|document| document.update_time);
            if current != read.update_time {
                return Err(Error::TransactionConflict(format!(
                    "{} changed since it was read",
                    read.key
                )));
            }
        }
        let update_time = state.tick();
        let mut staged: collections::BTreeMap<DocumentKey, Option<StoredDocument>> =
            collections::BTreeMap::new();
        let mut results = Vec::with_capacity(writes.len());
        for write in &writes {
            let current = match staged.get(&write.key) {
                Some(staged) => staged.as_ref(),
                None => state.documents.get(&write.key),
            };
            write.check(current.map(|document| document.update_time))?;
            let next = write
                .apply(current.map(|document| &document.fields))
                .map(|fields| StoredDocument {
                    fields,
                    update_time,
                });
            staged.insert(write.key.clone(), next);
            results.push(WriteResult {
                key: write.key.clone(),
                update_time,
            });
        }
        for (key, document) in staged {
            match document {
                Some(document) => {
                    state.documents.insert(key, document);
                }
                None => {
                    state.documents.remove(&key);
                }
            }
        }
        Ok(results)
    }

    fn max_commit_writes(&self) -> usize {
        self.max_commit_writes.unwrap_or(MAX_BATCH_WRITES)
    }
}
