#![deny(missing_docs)]

//! # Document CRUD
//!
//! A typed document-store client with references, preconditions and optimistic transactions.
//!
//! ## Overview
//!
//! Documents live in named collections and are addressed by string keys. This library:
//! - Creates, reads, replaces, merges, updates and deletes documents from JSON or serde types
//! - Stores references to other documents as field values and resolves them on demand
//! - Guards writes with existence or last-modified preconditions
//! - Runs read-modify-write transactions that fail with a distinct, retryable conflict error
//! - Works against Amazon DynamoDB or an in-process store behind the same [`store::DocumentStore`] trait
//!
//! ## Quick Example
//!
//! The client owns its store; every component borrows it rather than reaching for a global:
//!
//! ```rust
//! use document_crud::{client::Client, common::{key::DocumentKey, value}, config::ClientConfig};
//! use document_crud::{store::memory::MemoryStore, updater::OptimisticUpdater};
//!
//! # async fn example() -> document_crud::error::Result<()> {
//! let client = Client::new(MemoryStore::new(), ClientConfig::default());
//! let key = DocumentKey::new("counters", "visits");
//! client.create(&key, value::to_fields(&serde_json::json!({"n": 5}))?).await?;
//!
//! // Read `n` in a transaction and commit `n + 1`; a concurrent writer makes this fail
//! // with `Error::TransactionConflict` and leaves the document untouched.
//! let outcome = OptimisticUpdater::new(&client).increment(&key, "n", 1).await?;
//! assert_eq!(outcome.value.as_i64(), Some(6));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`mod@client`] - The store handle and document operations
//! - [`mod@common`] - Keys, references, values, field paths and preconditions
//! - [`mod@read`] - Snapshots and queries
//! - [`mod@write`] - Write operations and atomic batches
//! - [`mod@transaction`] - Optimistic transactions
//! - [`mod@reference`] - Reference resolution
//! - [`mod@updater`] - Single-field read-modify-write
//! - [`mod@store`] - The store trait with DynamoDB and in-memory backends
//! - [`mod@workload`] - Seeded throughput workloads

/// The store handle and its document operations.
pub mod client;

/// Common types for keys, values, field paths and preconditions.
pub mod common;

/// Client and store configuration.
pub mod config;

/// Error kinds surfaced by every operation.
pub mod error;

/// Read-side types for snapshots and queries.
///
/// This module provides:
/// - Document snapshots with typed and path-based field access
/// - Field filters over a collection
pub mod read;

/// Resolution of document references.
pub mod reference;

/// Document stores.
pub mod store;

/// Optimistic read-modify-write transactions.
pub mod transaction;

/// Read-modify-write of a single field.
pub mod updater;

/// Throughput workloads.
pub mod workload;

/// Write-side types for mutations and batches.
///
/// This module provides operations for:
/// - Creating, replacing and merging documents
/// - Updating and removing individual fields
/// - Deleting documents
/// - Committing several writes atomically
pub mod write;
