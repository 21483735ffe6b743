use crate::common::{
    key::DocumentKey,
    path::FieldPath,
    precondition::{Precondition, UpdateTime},
    value::{Fields, Value},
};
use crate::error::{Error, Result};

/// How a set write combines with an existing document.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SetOptions {
    /// Replace the whole document.
    #[default]
    Overwrite,
    /// Replace the top-level fields present in the data, keep the others.
    MergeAll,
    /// Copy only the listed paths from the data, keep everything else.
    Merge(Vec<FieldPath>),
}

/// Change applied to one field by an update.
///
/// ```rust
/// use document_crud::write::operation::UpdateAction;
///
/// let assign = UpdateAction::Assign("Updated Name".into());
/// let increment = UpdateAction::Increment(1.into());
/// let remove = UpdateAction::Remove;
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum UpdateAction {
    /// Store the value at the path.
    Assign(Value),
    /// Add to the numeric value at the path; a missing or non-numeric field becomes the operand.
    Increment(Value),
    /// Delete the field.
    Remove,
}

/// A field path together with the change applied to it.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldUpdate {
    /// The targeted field.
    pub path: FieldPath,
    /// The change.
    pub action: UpdateAction,
}

impl FieldUpdate {
    /// Assign a value to a dot-separated path.
    pub fn assign(path: &str, value: impl Into<Value>) -> Result<Self> {
        Ok(Self {
            path: FieldPath::parse(path)?,
            action: UpdateAction::Assign(value.into()),
        })
    }

    /// Increment the numeric value at a dot-separated path.
    pub fn increment(path: &str, by: impl Into<Value>) -> Result<Self> {
        Ok(Self {
            path: FieldPath::parse(path)?,
            action: UpdateAction::Increment(by.into()),
        })
    }

    /// Remove the field at a dot-separated path.
    pub fn remove(path: &str) -> Result<Self> {
        Ok(Self {
            path: FieldPath::parse(path)?,
            action: UpdateAction::Remove,
        })
    }

    fn apply(&self, fields: &mut Fields) {
        match &self.action {
            UpdateAction::Assign(value) => self.path.set(fields, value.clone()),
            UpdateAction::Increment(by) => {
                let sum = self
                    .path
                    .get(fields)
                    .and_then(|current| current.checked_add(by))
                    .unwrap_or_else(|| by.clone());
                self.path.set(fields, sum);
            }
            UpdateAction::Remove => {
                self.path.remove(fields);
            }
        }
    }
}

/// What a write does to its document.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOperation {
    /// Create or replace (fully or partially) the document.
    Set {
        /// The data written.
        fields: Fields,
        /// How the data combines with an existing document.
        options: SetOptions,
    },
    /// Change individual fields of an existing document.
    Update(Vec<FieldUpdate>),
    /// Remove the document; removing a missing document succeeds.
    Delete,
}

/// A single document mutation, the unit every store commits.
#[derive(Clone, Debug, PartialEq)]
pub struct Write {
    /// The document written.
    pub key: DocumentKey,
    /// The mutation.
    pub operation: WriteOperation,
    /// Optional condition the document must satisfy.
    pub precondition: Option<Precondition>,
}

impl Write {
    /// Create the document; fails with `AlreadyExists` if it is present.
    pub fn create(key: DocumentKey, fields: Fields) -> Self {
        Self {
            key,
            operation: WriteOperation::Set {
                fields,
                options: SetOptions::Overwrite,
            },
            precondition: Some(Precondition::Exists(false)),
        }
    }

    /// Create or replace the document.
    pub fn set(key: DocumentKey, fields: Fields, options: SetOptions) -> Self {
        Self {
            key,
            operation: WriteOperation::Set { fields, options },
            precondition: None,
        }
    }

    /// Update fields of an existing document.
    pub fn update(
        key: DocumentKey,
        updates: Vec<FieldUpdate>,
        precondition: Option<Precondition>,
    ) -> Self {
        Self {
            key,
            operation: WriteOperation::Update(updates),
            precondition,
        }
    }

    /// Delete the document.
    pub fn delete(key: DocumentKey, precondition: Option<Precondition>) -> Self {
        Self {
            key,
            operation: WriteOperation::Delete,
            precondition,
        }
    }

    /// Reject writes no store could apply.
    pub fn validate(&self) -> Result<()> {
        self.key.validate()?;
        match &self.operation {
            WriteOperation::Set {
                fields,
                options: SetOptions::Merge(paths),
            } => {
                if let Some(path) = paths.iter().find(|path| path.get(fields).is_none()) {
                    return Err(Error::InvalidArgument(format!(
                        "merge path `{path}` is not present in the data for {}",
                        self.key
                    )));
                }
            }
            WriteOperation::Update(updates) => {
                if updates.is_empty() {
                    return Err(Error::InvalidArgument(format!(
                        "update of {} changes no field",
                        self.key
                    )));
                }
                for update in updates {
                    if let UpdateAction::Increment(by) = &update.action {
                        if !by.is_numeric() {
                            return Err(Error::InvalidArgument(format!(
                                "increment of `{}` by a {}",
                                update.path,
                                by.type_name()
                            )));
                        }
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Check the implied and explicit preconditions against the live marker.
    pub fn check(&self, current: Option<UpdateTime>) -> Result<()> {
        if matches!(self.operation, WriteOperation::Update(_)) && current.is_none() {
            return Err(Error::document_not_found(&self.key));
        }
        match &self.precondition {
            Some(precondition) => precondition.check(&self.key, current),
            None => Ok(()),
        }
    }

    /// The document contents after this write; `None` when the document is gone.
    pub fn apply(&self, current: Option<&Fields>) -> Option<Fields> {
        match &self.operation {
            WriteOperation::Set {
                fields,
                options: SetOptions::Overwrite,
            } => Some(fields.clone()),
            WriteOperation::Set {
                fields,
                options: SetOptions::MergeAll,
            } => {
                let mut merged = current.cloned().unwrap_or_default();
                for (name, value) in fields {
                    merged.insert(name.clone(), value.clone());
                }
                Some(merged)
            }
            WriteOperation::Set {
                fields,
                options: SetOptions::Merge(paths),
            } => {
                let mut merged = current.cloned().unwrap_or_default();
                for path in paths {
                    if let Some(value) = path.get(fields) {
                        path.set(&mut merged, value.clone());
                    }
                }
                Some(merged)
            }
            WriteOperation::Update(updates) => {
                let mut updated = current.cloned().unwrap_or_default();
                for update in updates {
                    update.apply(&mut updated);
                }
                Some(updated)
            }
            WriteOperation::Delete => None,
        }
    }
}

/// Outcome of one committed write.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteResult {
    /// The written document.
    pub key: DocumentKey,
    /// The marker the commit assigned.
    pub update_time: UpdateTime,
}
