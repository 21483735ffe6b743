use crate::common::key::DocumentKey;
use crate::error::{Error, Result};

use chrono::{DateTime, Utc};
use std::fmt;

/// Server-assigned last-modified marker of a document.
///
/// Opaque to callers beyond equality and ordering; it strictly increases on every
/// successful write of the same document.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct UpdateTime(i64);

impl UpdateTime {
    /// Marker from nanoseconds since the Unix epoch.
    pub fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Nanoseconds since the Unix epoch.
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX))
    }

    /// The current time, or the nanosecond after `previous` if the clock has not moved past it.
    pub fn after(previous: Option<Self>) -> Self {
        let now = Self::now();
        match previous {
            Some(previous) if previous >= now => Self(previous.0.saturating_add(1)),
            _ => now,
        }
    }

    /// The marker as a UTC timestamp.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.0)
    }
}

impl fmt::Display for UpdateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

/// Condition a write is accepted under.
///
/// ```rust
/// use document_crud::common::precondition::{Precondition, UpdateTime};
///
/// let must_exist = Precondition::Exists(true);
/// let unchanged_since = Precondition::LastUpdateTime(UpdateTime::from_nanos(1));
/// ```
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Precondition {
    /// The document must (`true`) or must not (`false`) exist.
    Exists(bool),
    /// The document must exist with exactly this last-modified marker.
    LastUpdateTime(UpdateTime),
}

impl Precondition {
    /// Check against the document's live marker (`None` when missing).
    pub fn check(&self, key: &DocumentKey, current: Option<UpdateTime>) -> Result<()> {
        match (self, current) {
            (Self::Exists(true), None) => Err(Error::document_not_found(key)),
            (Self::Exists(false), Some(_)) => Err(Error::AlreadyExists(key.to_string())),
            (Self::LastUpdateTime(expected), None) => Err(Error::PreconditionFailed(format!(
                "{key} was expected at {expected} but does not exist"
            ))),
            (Self::LastUpdateTime(expected), Some(current)) if *expected != current => {
                Err(Error::PreconditionFailed(format!(
                    "{key} was expected at {expected} but is at {current}"
                )))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;

    const T1: UpdateTime = UpdateTime(1);
    const T2: UpdateTime = UpdateTime(2);

    #[rstest]
    #[case::exists_present(Precondition::Exists(true), Some(T1), None)]
    #[case::exists_missing(Precondition::Exists(true), None, Some("not_found"))]
    #[case::absent_missing(Precondition::Exists(false), None, None)]
    #[case::absent_present(Precondition::Exists(false), Some(T1), Some("already_exists"))]
    #[case::fresh(Precondition::LastUpdateTime(T1), Some(T1), None)]
    #[case::stale(Precondition::LastUpdateTime(T1), Some(T2), Some("precondition_failed"))]
    #[case::deleted(Precondition::LastUpdateTime(T1), None, Some("precondition_failed"))]
    fn test_check(
        #[case] precondition: Precondition,
        #[case] current: Option<UpdateTime>,
        #[case] expected: Option<&str>,
    ) {
        let key = DocumentKey::new("sample", "custom-struct");
        let actual = precondition.check(&key, current).err().map(|error| match error {
            Error::NotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::PreconditionFailed(_) => "precondition_failed",
            _ => "other",
        });
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_after_is_strictly_increasing() {
        let far_future = UpdateTime(i64::MAX - 1);
        assert_eq!(UpdateTime::after(Some(far_future)), UpdateTime(i64::MAX));
        let first = UpdateTime::after(None);
        let second = UpdateTime::after(Some(first));
        assert!(second > first);
    }
}
