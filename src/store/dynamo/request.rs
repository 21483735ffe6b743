use super::expression::{self, ExpressionInput};
use super::item::{self, Item};
use crate::common::{
    key::DocumentKey,
    path::FieldPath,
    precondition::{Precondition, UpdateTime},
    value::Value,
};
use crate::config::DynamoStoreConfig;
use crate::error::{Error, Result};
use crate::write::operation::{SetOptions, UpdateAction, Write, WriteOperation};

use aws_sdk_dynamodb::{error, types};
use std::collections;

/// State a document must be in for a request to apply.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Guard {
    Exists,
    Missing,
    UpdatedAt(UpdateTime),
}

impl Guard {
    fn from_precondition(precondition: Precondition) -> Self {
        match precondition {
            Precondition::Exists(true) => Self::Exists,
            Precondition::Exists(false) => Self::Missing,
            Precondition::LastUpdateTime(update_time) => Self::UpdatedAt(update_time),
        }
    }

    fn from_read(update_time: Option<UpdateTime>) -> Self {
        match update_time {
            Some(update_time) => Self::UpdatedAt(update_time),
            None => Self::Missing,
        }
    }

    fn expression(
        self,
        input: &mut ExpressionInput,
        config: &DynamoStoreConfig,
    ) -> String {
        match self {
            Self::Exists => format!(
                "attribute_exists({})",
                input.name(&config.key_attribute)
            ),
            Self::Missing => format!(
                "attribute_not_exists({})",
                input.name(&config.key_attribute)
            ),
            Self::UpdatedAt(update_time) => format!(
                "{} = {}",
                input.name(&config.update_time_attribute),
                input.attribute_value(item::update_time_value(update_time))
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum RequestKind {
    Put { item: Item },
    Update { key: Item, update_expression: String },
    Delete { key: Item },
    ConditionCheck { key: Item },
}

/// A single item request, ready for either a standalone call or a transaction.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct WriteRequest {
    pub(crate) table_name: String,
    pub(crate) kind: RequestKind,
    pub(crate) condition_expression: Option<String>,
    pub(crate) expression_attribute_names: Option<collections::HashMap<String, String>>,
    pub(crate) expression_attribute_values:
        Option<collections::HashMap<String, types::AttributeValue>>,
}

fn guards(write: &Write, expected: Option<Option<UpdateTime>>) -> Vec<Guard> {
    let mut guards = Vec::new();
    if matches!(write.operation, WriteOperation::Update(_)) {
        guards.push(Guard::Exists);
    }
    if let Some(precondition) = write.precondition {
        guards.push(Guard::from_precondition(precondition));
    }
    if let Some(update_time) = expected {
        guards.push(Guard::from_read(update_time));
    }
    guards.dedup();
    guards
}

fn check_path(path: &FieldPath, config: &DynamoStoreConfig) -> Result<()> {
    match path.segments().first() {
        Some(name) => item::check_field_name(name, config),
        None => Ok(()),
    }
}

fn condition(
    guards: &[Guard],
    input: &mut ExpressionInput,
    config: &DynamoStoreConfig,
) -> Option<String> {
    let expression = guards.iter().fold(String::new(), |expression, guard| {
        expression::join(expression, " AND ", guard.expression(input, config))
    });
    (!expression.is_empty()).then_some(expression)
}

#[derive(Default)]
struct UpdateClauses {
    set: Vec<String>,
    remove: Vec<String>,
}

impl UpdateClauses {
    fn assign(&mut self, target: String, value: String) {
        self.set.push(format!("{target} = {value}"));
    }

    fn into_expression(self) -> String {
        let mut clauses = Vec::with_capacity(2);
        if !self.set.is_empty() {
            clauses.push(format!("SET {}", self.set.join(", ")));
        }
        if !self.remove.is_empty() {
            clauses.push(format!("REMOVE {}", self.remove.join(", ")));
        }
        clauses.join(" ")
    }
}

impl WriteRequest {
    /// Translate a write; `expected` is the version a transaction read of the same document saw.
    pub(crate) fn from_write(
        write: &Write,
        expected: Option<Option<UpdateTime>>,
        update_time: UpdateTime,
        config: &DynamoStoreConfig,
    ) -> Result<Self> {
        let mut input = ExpressionInput::default();
        let key = item::key_attributes(&write.key, config);
        let kind = match &write.operation {
            WriteOperation::Set {
                fields,
                options: SetOptions::Overwrite,
            } => RequestKind::Put {
                item: item::to_item(&write.key, fields, update_time, config)?,
            },
            WriteOperation::Set {
                fields,
                options: SetOptions::MergeAll,
            } => {
                let mut clauses = UpdateClauses::default();
                for (name, value) in fields {
                    item::check_field_name(name, config)?;
                    let target = input.name(name);
                    let value = input.value(value)?;
                    clauses.assign(target, value);
                }
                Self::stamp(&mut clauses, &mut input, update_time, config);
                RequestKind::Update {
                    key,
                    update_expression: clauses.into_expression(),
                }
            }
            WriteOperation::Set {
                fields,
                options: SetOptions::Merge(paths),
            } => {
                let mut clauses = UpdateClauses::default();
                for path in paths {
                    check_path(path, config)?;
                    let value = path.get(fields).ok_or_else(|| {
                        Error::InvalidArgument(format!("merge path `{path}` is not in the data"))
                    })?;
                    let target = input.path(path);
                    let value = input.value(value)?;
                    clauses.assign(target, value);
                }
                Self::stamp(&mut clauses, &mut input, update_time, config);
                RequestKind::Update {
                    key,
                    update_expression: clauses.into_expression(),
                }
            }
            WriteOperation::Update(updates) => {
                let mut clauses = UpdateClauses::default();
                for update in updates {
                    check_path(&update.path, config)?;
                    let target = input.path(&update.path);
                    match &update.action {
                        UpdateAction::Assign(value) => {
                            let value = input.value(value)?;
                            clauses.assign(target, value);
                        }
                        UpdateAction::Increment(by) => {
                            let zero = input.value(&Value::Integer(0))?;
                            let by = input.value(by)?;
                            clauses.set.push(format!(
                                "{target} = if_not_exists({target}, {zero}) + {by}"
                            ));
                        }
                        UpdateAction::Remove => clauses.remove.push(target),
                    }
                }
                Self::stamp(&mut clauses, &mut input, update_time, config);
                RequestKind::Update {
                    key,
                    update_expression: clauses.into_expression(),
                }
            }
            WriteOperation::Delete => RequestKind::Delete { key },
        };
        let condition_expression = condition(&guards(write, expected), &mut input, config);
        Ok(Self::assemble(
            config.table_name(&write.key.collection),
            kind,
            condition_expression,
            input,
        ))
    }

    /// A check that a document read by a transaction still has the version it had.
    pub(crate) fn condition_check(
        key: &DocumentKey,
        expected: Option<UpdateTime>,
        config: &DynamoStoreConfig,
    ) -> Self {
        let mut input = ExpressionInput::default();
        let condition_expression = condition(&[Guard::from_read(expected)], &mut input, config);
        Self::assemble(
            config.table_name(&key.collection),
            RequestKind::ConditionCheck {
                key: item::key_attributes(key, config),
            },
            condition_expression,
            input,
        )
    }

    fn stamp(
        clauses: &mut UpdateClauses,
        input: &mut ExpressionInput,
        update_time: UpdateTime,
        config: &DynamoStoreConfig,
    ) {
        let target = input.name(&config.update_time_attribute);
        let value = input.attribute_value(item::update_time_value(update_time));
        clauses.assign(target, value);
    }

    fn assemble(
        table_name: String,
        kind: RequestKind,
        condition_expression: Option<String>,
        input: ExpressionInput,
    ) -> Self {
        let (expression_attribute_names, expression_attribute_values) = input.into_attributes();
        Self {
            table_name,
            kind,
            condition_expression,
            expression_attribute_names,
            expression_attribute_values,
        }
    }

    /// The request as one item of a `TransactWriteItems` call.
    pub(crate) fn into_transact_item(self) -> Result<types::TransactWriteItem> {
        let on_failure = types::ReturnValuesOnConditionCheckFailure::AllOld;
        let builder = types::TransactWriteItem::builder();
        let transact_item = match self.kind {
            RequestKind::Put { item } => builder.put(
                types::Put::builder()
                    .table_name(self.table_name)
                    .set_item(Some(item))
                    .set_condition_expression(self.condition_expression)
                    .set_expression_attribute_names(self.expression_attribute_names)
                    .set_expression_attribute_values(self.expression_attribute_values)
                    .return_values_on_condition_check_failure(on_failure)
                    .build()
                    .map_err(build_error)?,
            ),
            RequestKind::Update {
                key,
                update_expression,
            } => builder.update(
                types::Update::builder()
                    .table_name(self.table_name)
                    .set_key(Some(key))
                    .update_expression(update_expression)
                    .set_condition_expression(self.condition_expression)
                    .set_expression_attribute_names(self.expression_attribute_names)
                    .set_expression_attribute_values(self.expression_attribute_values)
                    .return_values_on_condition_check_failure(on_failure)
                    .build()
                    .map_err(build_error)?,
            ),
            RequestKind::Delete { key } => builder.delete(
                types::Delete::builder()
                    .table_name(self.table_name)
                    .set_key(Some(key))
                    .set_condition_expression(self.condition_expression)
                    .set_expression_attribute_names(self.expression_attribute_names)
                    .set_expression_attribute_values(self.expression_attribute_values)
                    .return_values_on_condition_check_failure(on_failure)
                    .build()
                    .map_err(build_error)?,
            ),
            RequestKind::ConditionCheck { key } => builder.condition_check(
                types::ConditionCheck::builder()
                    .table_name(self.table_name)
                    .set_key(Some(key))
                    .set_condition_expression(self.condition_expression)
                    .set_expression_attribute_names(self.expression_attribute_names)
                    .set_expression_attribute_values(self.expression_attribute_values)
                    .return_values_on_condition_check_failure(on_failure)
                    .build()
                    .map_err(build_error)?,
            ),
        };
        Ok(transact_item.build())
    }
}

pub(crate) fn build_error(error: error::BuildError) -> Error {
    Error::InvalidArgument(error.to_string())
}
