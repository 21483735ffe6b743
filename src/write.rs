//! Write-side types.
//!
//! This module provides the unit of mutation every store commits and atomic batches:
//! - Creating, replacing and merging documents
//! - Updating individual fields, optionally under a precondition
//! - Deleting documents
//! - Committing several writes at once

/// Atomic batches of blind writes.
pub mod batch;

/// Write operations and their semantics.
pub mod operation;
