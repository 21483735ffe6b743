//! Documents stored in Amazon DynamoDB.
//!
//! Every collection maps onto a table named `table_prefix + collection`, whose string
//! partition key holds the document key. The last-modified marker lives in a numeric
//! attribute next to the document fields.
//!
//! Commits map onto the API as follows:
//! - One write and no reads becomes a conditional `PutItem`, `UpdateItem` or `DeleteItem`
//! - Anything else becomes a single `TransactWriteItems` call; reads not followed by a write of
//!   the same document become `ConditionCheck` items
//!
//! Nested update paths require their parent maps to exist already. A commit may touch a
//! document only once, and at most 100 documents in total.

mod expression;
mod item;
mod request;

use crate::common::{key::DocumentKey, precondition::UpdateTime};
use crate::config::DynamoStoreConfig;
use crate::error::{Error, Result};
use crate::read::{query::Query, snapshot::DocumentSnapshot};
use crate::store::{DocumentStore, ReadVersion};
use crate::write::operation::{Write, WriteResult};

use aws_sdk_dynamodb::{
    Client,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::{self, transact_write_items::TransactWriteItemsError},
    types,
};
use expression::ExpressionInput;
use indexmap::IndexMap;
use item::Item;
use parking_lot::Mutex;
use request::{RequestKind, WriteRequest, build_error};
use std::{collections, fmt, time};

/// Maximum number of items in one `TransactWriteItems` call.
pub const MAX_TRANSACTION_ITEMS: usize = 100;

/// Maximum number of keys in one `BatchGetItem` call.
pub const MAX_BATCH_GET_KEYS: usize = 100;

const MAX_UNPROCESSED_ROUNDS: u32 = 8;

/// Document store backed by DynamoDB tables.
///
/// ```rust,no_run
/// use document_crud::{client::Client, config::{ClientConfig, DynamoStoreConfig}};
/// use document_crud::store::dynamo::DynamoStore;
/// use aws_sdk_dynamodb::config::{BehaviorVersion, Config};
///
/// # fn example() {
/// # let sdk_config = Config::builder().behavior_version(BehaviorVersion::latest()).build();
/// # let sdk_client = aws_sdk_dynamodb::Client::from_conf(sdk_config);
/// let config = DynamoStoreConfig {
///     table_prefix: "qa-".to_string(),
///     ..Default::default()
/// };
/// let client = Client::new(DynamoStore::new(sdk_client, config), ClientConfig::default());
/// # }
/// ```
#[derive(Debug)]
pub struct DynamoStore {
    client: Client,
    config: DynamoStoreConfig,
    last_update_time: Mutex<Option<UpdateTime>>,
}

impl DynamoStore {
    /// Store documents through an SDK client.
    pub fn new(client: Client, config: DynamoStoreConfig) -> Self {
        Self {
            client,
            config,
            last_update_time: Mutex::new(None),
        }
    }

    /// The table mapping.
    pub fn config(&self) -> &DynamoStoreConfig {
        &self.config
    }

    fn tick(&self) -> UpdateTime {
        let mut last = self.last_update_time.lock();
        let update_time = UpdateTime::after(*last);
        *last = Some(update_time);
        update_time
    }

    async fn get_one(&self, key: &DocumentKey) -> Result<Option<DocumentSnapshot>> {
        let output = self
            .client
            .get_item()
            .table_name(self.config.table_name(&key.collection))
            .set_key(Some(item::key_attributes(key, &self.config)))
            .consistent_read(self.config.consistent_read)
            .send()
            .await
            .map_err(map_sdk_error)?;
        output
            .item
            .map(|found| item::from_item(&key.collection, found, &self.config))
            .transpose()
    }

    async fn get_batch(
        &self,
        keys: &[DocumentKey],
    ) -> Result<collections::HashMap<DocumentKey, DocumentSnapshot>> {
        let mut collections_by_table = collections::HashMap::new();
        let mut request_keys: collections::HashMap<String, Vec<Item>> =
            collections::HashMap::new();
        for key in keys {
            let table_name = self.config.table_name(&key.collection);
            collections_by_table.insert(table_name.clone(), key.collection.clone());
            request_keys
                .entry(table_name)
                .or_default()
                .push(item::key_attributes(key, &self.config));
        }
        let mut pending = collections::HashMap::with_capacity(request_keys.len());
        for (table_name, keys) in request_keys {
            let keys_and_attributes = types::KeysAndAttributes::builder()
                .set_keys(Some(keys))
                .consistent_read(self.config.consistent_read)
                .build()
                .map_err(build_error)?;
            pending.insert(table_name, keys_and_attributes);
        }
        let mut found = collections::HashMap::with_capacity(keys.len());
        let mut round = 0;
        while !pending.is_empty() {
            if round > 0 {
                if round > MAX_UNPROCESSED_ROUNDS {
                    return Err(Error::Transient(format!(
                        "keys of {} tables still unprocessed after {MAX_UNPROCESSED_ROUNDS} retries",
                        pending.len()
                    )));
                }
                tokio::time::sleep(time::Duration::from_millis(25 << round)).await;
            }
            round += 1;
            let output = self
                .client
                .batch_get_item()
                .set_request_items(Some(pending))
                .send()
                .await
                .map_err(map_sdk_error)?;
            for (table_name, items) in output.responses.unwrap_or_default() {
                let collection = collections_by_table.get(&table_name).ok_or_else(|| {
                    Error::Internal(format!("response for unrequested table {table_name}"))
                })?;
                for stored in items {
                    let snapshot = item::from_item(collection, stored, &self.config)?;
                    found.insert(snapshot.key.clone(), snapshot);
                }
            }
            pending = output.unprocessed_keys.unwrap_or_default();
        }
        Ok(found)
    }

    async fn write_one(&self, write: &Write) -> Result<WriteResult> {
        let update_time = self.tick();
        let request = WriteRequest::from_write(write, None, update_time, &self.config)?;
        let on_failure = types::ReturnValuesOnConditionCheckFailure::AllOld;
        let failed_item = match request.kind {
            RequestKind::Put { item } => self
                .client
                .put_item()
                .table_name(request.table_name)
                .set_item(Some(item))
                .set_condition_expression(request.condition_expression)
                .set_expression_attribute_names(request.expression_attribute_names)
                .set_expression_attribute_values(request.expression_attribute_values)
                .return_values_on_condition_check_failure(on_failure)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| match error.as_service_error() {
                    Some(operation::put_item::PutItemError::ConditionalCheckFailedException(
                        failure,
                    )) => Ok(failure.item().cloned()),
                    _ => Err(map_sdk_error(error)),
                }),
            RequestKind::Update {
                key,
                update_expression,
            } => self
                .client
                .update_item()
                .table_name(request.table_name)
                .set_key(Some(key))
                .update_expression(update_expression)
                .set_condition_expression(request.condition_expression)
                .set_expression_attribute_names(request.expression_attribute_names)
                .set_expression_attribute_values(request.expression_attribute_values)
                .return_values_on_condition_check_failure(on_failure)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| match error.as_service_error() {
                    Some(
                        operation::update_item::UpdateItemError::ConditionalCheckFailedException(
                            failure,
                        ),
                    ) => Ok(failure.item().cloned()),
                    _ => Err(map_sdk_error(error)),
                }),
            RequestKind::Delete { key } => self
                .client
                .delete_item()
                .table_name(request.table_name)
                .set_key(Some(key))
                .set_condition_expression(request.condition_expression)
                .set_expression_attribute_names(request.expression_attribute_names)
                .set_expression_attribute_values(request.expression_attribute_values)
                .return_values_on_condition_check_failure(on_failure)
                .send()
                .await
                .map(|_| ())
                .map_err(|error| match error.as_service_error() {
                    Some(
                        operation::delete_item::DeleteItemError::ConditionalCheckFailedException(
                            failure,
                        ),
                    ) => Ok(failure.item().cloned()),
                    _ => Err(map_sdk_error(error)),
                }),
            RequestKind::ConditionCheck { .. } => {
                return Err(Error::Internal(
                    "condition checks only run inside transactions".to_string(),
                ));
            }
        };
        match failed_item {
            Ok(()) => Ok(WriteResult {
                key: write.key.clone(),
                update_time,
            }),
            Err(Ok(current)) => {
                let actual = item::update_time_of(current.as_ref(), &self.config)?;
                Err(classify_condition_failure(
                    Some(write),
                    None,
                    &write.key,
                    actual,
                    false,
                ))
            }
            Err(Err(error)) => Err(error),
        }
    }

    async fn transact(
        &self,
        writes: Vec<Write>,
        reads: Vec<ReadVersion>,
    ) -> Result<Vec<WriteResult>> {
        let mut expected: IndexMap<DocumentKey, Option<UpdateTime>> = reads
            .into_iter()
            .map(|read| (read.key, read.update_time))
            .collect();
        let mut written = collections::HashSet::with_capacity(writes.len());
        for write in &writes {
            if !written.insert(&write.key) {
                return Err(Error::InvalidArgument(format!(
                    "{} is written more than once in one commit",
                    write.key
                )));
            }
        }
        let write_expectations: Vec<_> = writes
            .iter()
            .map(|write| expected.shift_remove(&write.key))
            .collect();
        let total = writes.len() + expected.len();
        if total > MAX_TRANSACTION_ITEMS {
            return Err(Error::InvalidArgument(format!(
                "commit touches {total} documents, more than {MAX_TRANSACTION_ITEMS}"
            )));
        }
        let update_time = self.tick();
        let mut transact_items = Vec::with_capacity(total);
        for (write, read) in writes.iter().zip(&write_expectations) {
            transact_items.push(
                WriteRequest::from_write(write, *read, update_time, &self.config)?
                    .into_transact_item()?,
            );
        }
        for (key, read) in &expected {
            let check = WriteRequest::condition_check(key, *read, &self.config);
            transact_items.push(check.into_transact_item()?);
        }
        let outcome = self
            .client
            .transact_write_items()
            .set_transact_items(Some(transact_items))
            .send()
            .await;
        if let Err(error) = outcome {
            let canceled = match error.as_service_error() {
                Some(TransactWriteItemsError::TransactionCanceledException(canceled)) => canceled,
                _ => return Err(map_sdk_error(error)),
            };
            for (index, reason) in canceled.cancellation_reasons().iter().enumerate() {
                let (write, key, read) = match writes.get(index) {
                    Some(write) => (Some(write), &write.key, write_expectations[index]),
                    None => match expected.get_index(index - writes.len()) {
                        Some((key, read)) => (None, key, Some(*read)),
                        None => continue,
                    },
                };
                match reason.code() {
                    None | Some("None") => continue,
                    Some("ConditionalCheckFailed") => {
                        let actual = item::update_time_of(reason.item(), &self.config)?;
                        return Err(classify_condition_failure(write, read, key, actual, true));
                    }
                    Some(code) => {
                        let message = format!("{key}: {}", reason.message().unwrap_or(code));
                        return Err(classify_error_code(Some(code), message));
                    }
                }
            }
            return Err(Error::TransactionConflict(
                DisplayErrorContext(&error).to_string(),
            ));
        }
        Ok(writes
            .into_iter()
            .map(|write| WriteResult {
                key: write.key,
                update_time,
            })
            .collect())
    }
}

impl DocumentStore for DynamoStore {
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "document_crud.dynamo.get_all",
            skip_all,
            fields(count = keys.len()),
            err
        )
    )]
    async fn get_all(&self, keys: &[DocumentKey]) -> Result<Vec<Option<DocumentSnapshot>>> {
        if let [key] = keys {
            return Ok(vec![self.get_one(key).await?]);
        }
        let mut unique: Vec<DocumentKey> = Vec::with_capacity(keys.len());
        let mut seen = collections::HashSet::with_capacity(keys.len());
        for key in keys {
            if seen.insert(key) {
                unique.push(key.clone());
            }
        }
        let mut found = collections::HashMap::with_capacity(unique.len());
        for chunk in unique.chunks(MAX_BATCH_GET_KEYS) {
            found.extend(self.get_batch(chunk).await?);
        }
        Ok(keys.iter().map(|key| found.get(key).cloned()).collect())
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "document_crud.dynamo.query",
            skip_all,
            fields(collection = %query.collection),
            err
        )
    )]
    async fn query(&self, query: &Query) -> Result<Vec<DocumentSnapshot>> {
        let mut input = ExpressionInput::default();
        let filter_expression = input.filters(&query.filters)?;
        let (names, values) = input.into_attributes();
        let mut paginator = self
            .client
            .scan()
            .table_name(self.config.table_name(&query.collection))
            .consistent_read(self.config.consistent_read)
            .set_filter_expression(filter_expression)
            .set_expression_attribute_names(names)
            .set_expression_attribute_values(values)
            .into_paginator()
            .send();
        let limit = query.limit.unwrap_or(usize::MAX);
        let mut snapshots = Vec::new();
        while snapshots.len() < limit {
            let Some(page) = paginator.next().await else {
                break;
            };
            let page = page.map_err(map_sdk_error)?;
            for stored in page.items.unwrap_or_default() {
                if snapshots.len() == limit {
                    break;
                }
                snapshots.push(item::from_item(&query.collection, stored, &self.config)?);
            }
        }
        Ok(snapshots)
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "document_crud.dynamo.commit",
            skip_all,
            fields(writes = writes.len(), reads = reads.len()),
            err
        )
    )]
    async fn commit(
        &self,
        writes: Vec<Write>,
        reads: Vec<ReadVersion>,
    ) -> Result<Vec<WriteResult>> {
        match writes.as_slice() {
            [write] if reads.is_empty() => Ok(vec![self.write_one(write).await?]),
            _ => self.transact(writes, reads).await,
        }
    }

    fn max_commit_writes(&self) -> usize {
        MAX_TRANSACTION_ITEMS
    }
}

/// Explain a failed condition using the item the store returned.
///
/// A document whose version moved since the transaction read it is a conflict; otherwise
/// the write's own preconditions tell which rule was broken. When neither explains the
/// failure the document changed while the request was in flight.
pub(crate) fn classify_condition_failure(
    write: Option<&Write>,
    read: Option<Option<UpdateTime>>,
    key: &DocumentKey,
    actual: Option<UpdateTime>,
    in_transaction: bool,
) -> Error {
    if let Some(read) = read {
        if read != actual {
            return Error::TransactionConflict(format!("{key} changed since it was read"));
        }
    }
    if let Some(Err(error)) = write.map(|write| write.check(actual)) {
        return error;
    }
    if in_transaction {
        Error::TransactionConflict(format!("{key} changed during commit"))
    } else {
        Error::PreconditionFailed(format!("{key} changed during the write"))
    }
}

/// Map a DynamoDB error code onto the crate's error kinds.
pub(crate) fn classify_error_code(code: Option<&str>, message: String) -> Error {
    match code {
        Some("ResourceNotFoundException") => Error::NotFound(message),
        Some("ValidationException" | "ValidationError" | "ItemCollectionSizeLimitExceeded") => {
            Error::InvalidArgument(message)
        }
        Some("TransactionConflictException" | "TransactionConflict") => {
            Error::TransactionConflict(message)
        }
        Some(
            "ProvisionedThroughputExceededException"
            | "ProvisionedThroughputExceeded"
            | "RequestLimitExceeded"
            | "ThrottlingException"
            | "ThrottlingError"
            | "InternalServerError"
            | "TransactionInProgressException",
        ) => Error::Transient(message),
        _ => Error::Internal(message),
    }
}

fn map_sdk_error<E, R>(error: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: fmt::Debug,
{
    let message = DisplayErrorContext(&error).to_string();
    match &error {
        SdkError::ServiceError(service) => classify_error_code(service.err().code(), message),
        SdkError::ConstructionFailure(_) => Error::InvalidArgument(message),
        _ => Error::Transient(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{precondition::Precondition, value::Fields};
    use crate::write::operation::{FieldUpdate, SetOptions};

    use rstest::rstest;

    fn key() -> DocumentKey {
        DocumentKey::new("sample", "custom-struct")
    }

    fn at(nanos: i64) -> Option<UpdateTime> {
        Some(UpdateTime::from_nanos(nanos))
    }

    fn kind(error: Error) -> &'static str {
        match error {
            Error::NotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::PreconditionFailed(_) => "precondition_failed",
            Error::TransactionConflict(_) => "transaction_conflict",
            Error::Transient(_) => "transient",
            Error::InvalidArgument(_) => "invalid_argument",
            Error::Internal(_) => "internal",
            _ => "other",
        }
    }

    #[rstest]
    #[case::create_on_existing(
        Some(Write::create(key(), Fields::new())),
        None,
        at(1),
        false,
        "already_exists"
    )]
    #[case::update_on_missing(
        Some(Write::update(key(), vec![FieldUpdate::remove("a").unwrap()], None)),
        None,
        None,
        false,
        "not_found"
    )]
    #[case::stale_precondition(
        Some(Write::delete(key(), Some(Precondition::LastUpdateTime(UpdateTime::from_nanos(1))))),
        None,
        at(2),
        false,
        "precondition_failed"
    )]
    #[case::moved_since_read(
        Some(Write::update(key(), vec![FieldUpdate::increment("n", 1).unwrap()], None)),
        Some(at(1)),
        at(2),
        true,
        "transaction_conflict"
    )]
    #[case::created_since_missing_read(
        Some(Write::create(key(), Fields::new())),
        Some(None),
        at(2),
        true,
        "transaction_conflict"
    )]
    #[case::condition_check(None, Some(at(1)), None, true, "transaction_conflict")]
    #[case::unexplained_single_write(
        Some(Write::set(key(), Fields::new(), SetOptions::MergeAll)),
        None,
        at(1),
        false,
        "precondition_failed"
    )]
    fn test_classify_condition_failure(
        #[case] write: Option<Write>,
        #[case] read: Option<Option<UpdateTime>>,
        #[case] actual: Option<UpdateTime>,
        #[case] in_transaction: bool,
        #[case] expected: &str,
    ) {
        let error =
            classify_condition_failure(write.as_ref(), read, &key(), actual, in_transaction);
        assert_eq!(kind(error), expected);
    }

    #[test]
    fn test_commit_limit_matches_transactions() {
        let sdk_config = aws_sdk_dynamodb::config::Config::builder()
            .behavior_version(aws_sdk_dynamodb::config::BehaviorVersion::latest())
            .build();
        let store = DynamoStore::new(Client::from_conf(sdk_config), DynamoStoreConfig::default());
        assert_eq!(store.max_commit_writes(), MAX_TRANSACTION_ITEMS);
    }

    #[rstest]
    #[case::missing_table(Some("ResourceNotFoundException"), "not_found")]
    #[case::validation(Some("ValidationException"), "invalid_argument")]
    #[case::throttled(Some("ProvisionedThroughputExceededException"), "transient")]
    #[case::request_limit(Some("RequestLimitExceeded"), "transient")]
    #[case::server(Some("InternalServerError"), "transient")]
    #[case::conflict(Some("TransactionConflictException"), "transaction_conflict")]
    #[case::cancellation_conflict(Some("TransactionConflict"), "transaction_conflict")]
    #[case::unknown(Some("AccessDeniedException"), "internal")]
    #[case::no_code(None, "internal")]
    fn test_classify_error_code(#[case] code: Option<&str>, #[case] expected: &str) {
        let error = classify_error_code(code, "message".to_string());
        assert_eq!(kind(error), expected);
    }
}
