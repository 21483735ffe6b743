use crate::client::Client;
use crate::common::{key::DocumentKey, precondition::Precondition, value::Fields};
use crate::error::{Error, Result};
use crate::store::DocumentStore;
use crate::write::operation::{FieldUpdate, SetOptions, Write, WriteResult};

/// Default limit on the writes committed by one batch; stores may lower it.
pub const MAX_BATCH_WRITES: usize = 500;

/// Blind writes committed together: all of them apply or none does.
///
/// ```rust,no_run
/// use document_crud::{client::Client, common::{key::DocumentKey, value::Fields}};
/// use document_crud::store::memory::MemoryStore;
/// use document_crud::write::operation::SetOptions;
///
/// # async fn example(client: &Client<MemoryStore>) -> document_crud::error::Result<()> {
/// let mut batch = client.batch();
/// batch
///     .set(DocumentKey::new("sample", "1"), Fields::new(), SetOptions::Overwrite)
///     .delete(DocumentKey::new("sample", "2"));
/// batch.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct WriteBatch<'c, S> {
    client: &'c Client<S>,
    writes: Vec<Write>,
}

impl<'c, S: DocumentStore> WriteBatch<'c, S> {
    pub(crate) fn new(client: &'c Client<S>) -> Self {
        Self {
            client,
            writes: Vec::new(),
        }
    }

    /// Queue a create.
    pub fn create(&mut self, key: DocumentKey, fields: Fields) -> &mut Self {
        self.push(Write::create(key, fields))
    }

    /// Queue a set.
    pub fn set(&mut self, key: DocumentKey, fields: Fields, options: SetOptions) -> &mut Self {
        self.push(Write::set(key, fields, options))
    }

    /// Queue an update.
    pub fn update(
        &mut self,
        key: DocumentKey,
        updates: Vec<FieldUpdate>,
        precondition: Option<Precondition>,
    ) -> &mut Self {
        self.push(Write::update(key, updates, precondition))
    }

    /// Queue a delete.
    pub fn delete(&mut self, key: DocumentKey) -> &mut Self {
        self.push(Write::delete(key, None))
    }

    /// Queue an arbitrary write.
    pub fn push(&mut self, write: Write) -> &mut Self {
        self.writes.push(write);
        self
    }

    /// Number of queued writes.
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Commit every queued write atomically.
    ///
    /// Batches larger than [`DocumentStore::max_commit_writes`] are rejected without a call.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "document_crud.batch_commit",
            skip_all,
            fields(writes = self.writes.len()),
            err
        )
    )]
    pub async fn commit(self) -> Result<Vec<WriteResult>> {
        let limit = self.client.store().max_commit_writes();
        if self.writes.len() > limit {
            return Err(Error::InvalidArgument(format!(
                "batch of {} writes exceeds the limit of {limit}",
                self.writes.len()
            )));
        }
        self.client.commit(self.writes, Vec::new()).await
    }
}
