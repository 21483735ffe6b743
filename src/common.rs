//! Common types shared by reads, writes and stores.
//!
//! This module provides document identity and references, field values, field paths
//! and write preconditions.

/// Document identity and references.
pub mod key;

/// Dot-separated field paths into nested documents.
pub mod path;

/// Last-modified markers and write preconditions.
pub mod precondition;

/// Field values and conversions from JSON and serde types.
pub mod value;
