//! Read-side types: document snapshots and field queries.
//!
//! Reads themselves are issued through [`crate::client::Client`] or inside a
//! [`crate::transaction::Transaction`].

/// Field filters over a collection.
pub mod query;

/// Documents as returned by the store.
pub mod snapshot;
