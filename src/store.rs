//! The document-store collaborator.
//!
//! A store exposes three primitives; every client operation (get, create, set, update,
//! delete, batches and transactions) is built on top of them:
//! - [`DocumentStore::get_all`] reads documents by key
//! - [`DocumentStore::query`] filters one collection
//! - [`DocumentStore::commit`] validates read versions and applies writes atomically

use crate::common::{key::DocumentKey, precondition::UpdateTime};
use crate::error::Result;
use crate::read::{query::Query, snapshot::DocumentSnapshot};
use crate::write::{
    batch::MAX_BATCH_WRITES,
    operation::{Write, WriteResult},
};

use std::future::Future;

/// Amazon DynamoDB backend.
pub mod dynamo;

/// In-process backend.
pub mod memory;

/// The version of a document observed by a transaction read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadVersion {
    /// The document read.
    pub key: DocumentKey,
    /// The marker seen, `None` if the document was missing.
    pub update_time: Option<UpdateTime>,
}

/// Remote document store primitives.
pub trait DocumentStore: Send + Sync {
    /// Read documents by key, in request order; `None` for missing documents.
    fn get_all(
        &self,
        keys: &[DocumentKey],
    ) -> impl Future<Output = Result<Vec<Option<DocumentSnapshot>>>> + Send;

    /// Documents of the query's collection matching all of its filters.
    fn query(&self, query: &Query) -> impl Future<Output = Result<Vec<DocumentSnapshot>>> + Send;

    /// Atomically commit writes.
    ///
    /// Fails with `TransactionConflict` and applies nothing if any of `reads` no longer
    /// matches the stored marker. Each write's preconditions are checked against the
    /// state left by the writes before it; the first failing check aborts the commit.
    /// All writes of a successful commit share one fresh update time.
    fn commit(
        &self,
        writes: Vec<Write>,
        reads: Vec<ReadVersion>,
    ) -> impl Future<Output = Result<Vec<WriteResult>>> + Send;

    /// Largest number of writes one commit accepts.
    fn max_commit_writes(&self) -> usize {
        MAX_BATCH_WRITES
    }
}
