//! Configuration for clients and stores.
//!
//! Plain structs with defaults; they deserialize from any serde format with missing
//! fields falling back to the defaults.

use serde::{Deserialize, Serialize};
use std::time;

/// Default number of attempts [`crate::client::Client::run_transaction`] makes.
pub const DEFAULT_MAX_TRANSACTION_ATTEMPTS: usize = 5;

/// Client behaviour.
///
/// ```rust
/// use document_crud::config::ClientConfig;
///
/// let config: ClientConfig = serde_json::from_str(r#"{"operation_timeout_ms": 2000}"#).unwrap();
/// assert_eq!(config.operation_timeout(), Some(std::time::Duration::from_secs(2)));
/// assert_eq!(config.max_transaction_attempts, 5);
/// ```
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Upper bound for every store call, in milliseconds; `None` waits indefinitely.
    pub operation_timeout_ms: Option<u64>,
    /// Attempts made by `run_transaction` before a conflict is returned to the caller.
    pub max_transaction_attempts: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: None,
            max_transaction_attempts: DEFAULT_MAX_TRANSACTION_ATTEMPTS,
        }
    }
}

impl ClientConfig {
    /// The per-call timeout.
    pub fn operation_timeout(&self) -> Option<time::Duration> {
        self.operation_timeout_ms.map(time::Duration::from_millis)
    }
}

/// How documents map onto DynamoDB tables and items.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct DynamoStoreConfig {
    /// Prefix prepended to a collection name to form its table name.
    pub table_prefix: String,
    /// String partition-key attribute holding the document key.
    pub key_attribute: String,
    /// Numeric attribute holding the last-modified marker.
    pub update_time_attribute: String,
    /// Use strongly consistent reads.
    pub consistent_read: bool,
}

impl Default for DynamoStoreConfig {
    fn default() -> Self {
        Self {
            table_prefix: String::new(),
            key_attribute: "id".to_string(),
            update_time_attribute: "_update_time".to_string(),
            consistent_read: true,
        }
    }
}

impl DynamoStoreConfig {
    /// Table backing a collection.
    pub fn table_name(&self, collection: &str) -> String {
        format!("{}{collection}", self.table_prefix)
    }
}
