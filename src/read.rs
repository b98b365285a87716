//! Read operations for retrieving items of the configured table.
//!
//! This module provides operations for reading data:
//! - Getting individual items by primary key
//! - Querying items with key conditions, across pages
//! - Batch retrieving items by key
//! - Encoding continuation keys as opaque cursors

/// Batch get item operation for retrieving many items by key.
pub mod batch_get_item;

/// Options shared by reads by primary key.
pub mod common;

/// Opaque string cursors for caller-driven pagination.
pub mod cursor;

/// Get item operation for retrieving a single item by primary key.
pub mod get_item;

/// Query operation for retrieving items with key conditions.
pub mod query;
