//! Read-modify-write of a single field.
//!
//! Two forms are offered:
//! - [`OptimisticUpdater::update_field`] reads inside a transaction and commits the new value;
//!   a concurrent writer makes the commit fail with `TransactionConflict`
//! - [`OptimisticUpdater::update_field_with_precondition`] reads the document, then updates it
//!   under its last-modified marker; a concurrent writer makes it fail with `PreconditionFailed`
//!
//! Neither form retries: the caller decides, typically with [`crate::error::Error::is_retryable`].

use crate::client::Client;
use crate::common::{
    key::DocumentKey,
    path::FieldPath,
    precondition::{Precondition, UpdateTime},
    value::Value,
};
use crate::error::{Error, Result};
use crate::store::DocumentStore;
use crate::write::operation::{FieldUpdate, UpdateAction, WriteResult};

/// What a successful field update changed.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldUpdateOutcome {
    /// The value read, `Null` if the field was absent.
    pub previous: Value,
    /// The value written.
    pub value: Value,
    /// The document's marker after the write.
    pub update_time: UpdateTime,
}

/// Applies a function to one field of one document and commits the result conditionally.
#[derive(Debug)]
pub struct OptimisticUpdater<'c, S> {
    client: &'c Client<S>,
}

impl<'c, S: DocumentStore> OptimisticUpdater<'c, S> {
    /// Update through `client`.
    pub fn new(client: &'c Client<S>) -> Self {
        Self { client }
    }

    /// Read `field` in a transaction, compute its new value and commit only that field.
    ///
    /// A failing `compute` discards the transaction and its error is returned.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "document_crud.update_field",
            skip_all,
            fields(key = %key, field = field),
            err
        )
    )]
    pub async fn update_field<F>(
        &self,
        key: &DocumentKey,
        field: &str,
        compute: F,
    ) -> Result<FieldUpdateOutcome>
    where
        F: FnOnce(&Value) -> Result<Value>,
    {
        let path = FieldPath::parse(field)?;
        let mut transaction = self.client.begin_transaction();
        let snapshot = transaction.get(key).await?;
        let previous = snapshot.field(&path).cloned().unwrap_or_default();
        let value = compute(&previous)?;
        transaction.update(key.clone(), vec![assign(path, &value)], None);
        let result = single(key, transaction.commit().await?)?;
        Ok(FieldUpdateOutcome {
            previous,
            value,
            update_time: result.update_time,
        })
    }

    /// Read the document, compute the new value and update it under the marker just read.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "document_crud.update_field_with_precondition",
            skip_all,
            fields(key = %key, field = field),
            err
        )
    )]
    pub async fn update_field_with_precondition<F>(
        &self,
        key: &DocumentKey,
        field: &str,
        compute: F,
    ) -> Result<FieldUpdateOutcome>
    where
        F: FnOnce(&Value) -> Result<Value>,
    {
        let path = FieldPath::parse(field)?;
        let snapshot = self.client.get(key).await?;
        let previous = snapshot.field(&path).cloned().unwrap_or_default();
        let value = compute(&previous)?;
        let result = self
            .client
            .update(
                key,
                vec![assign(path, &value)],
                Some(Precondition::LastUpdateTime(snapshot.update_time)),
            )
            .await?;
        Ok(FieldUpdateOutcome {
            previous,
            value,
            update_time: result.update_time,
        })
    }

    /// Transactionally add `by` to the numeric `field`; an absent field counts as zero.
    pub async fn increment(
        &self,
        key: &DocumentKey,
        field: &str,
        by: impl Into<Value>,
    ) -> Result<FieldUpdateOutcome> {
        let by = by.into();
        self.update_field(key, field, |current| increment_by(current, &by))
            .await
    }
}

/// `current + by`, treating `Null` as zero.
///
/// ```rust
/// use document_crud::{common::value::Value, updater::increment_by};
///
/// assert_eq!(increment_by(&Value::Integer(5), &Value::Integer(1)).unwrap(), Value::Integer(6));
/// assert_eq!(increment_by(&Value::Null, &Value::Integer(1)).unwrap(), Value::Integer(1));
/// assert!(increment_by(&Value::from("five"), &Value::Integer(1)).is_err());
/// ```
pub fn increment_by(current: &Value, by: &Value) -> Result<Value> {
    if !by.is_numeric() {
        return Err(Error::InvalidArgument(format!(
            "cannot increment by a {}",
            by.type_name()
        )));
    }
    if current.is_null() {
        return Ok(by.clone());
    }
    current.checked_add(by).ok_or_else(|| {
        Error::InvalidArgument(format!("cannot increment a {}", current.type_name()))
    })
}

fn assign(path: FieldPath, value: &Value) -> FieldUpdate {
    FieldUpdate {
        path,
        action: UpdateAction::Assign(value.clone()),
    }
}

fn single(key: &DocumentKey, mut results: Vec<WriteResult>) -> Result<WriteResult> {
    results
        .pop()
        .ok_or_else(|| Error::Internal(format!("commit of {key} returned no result")))
}
