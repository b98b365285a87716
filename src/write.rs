//! Write operations for modifying items of the configured table.
//!
//! This module provides operations for writing data:
//! - Putting new items or replacing existing ones
//! - Updating items from field maps and raw update expressions
//! - Deleting items by primary key
//! - Batch writing items in chunks
//! - Applying several writes atomically

/// Batch write item operation, chunked to the per-call request limit.
pub mod batch_write_item;

/// Options and helpers shared by write operations.
pub mod common;

/// Delete item operation for removing items.
pub mod delete_item;

/// Put item operation for creating or replacing items.
pub mod put_item;

/// Transact write items operation for all-or-nothing groups of writes.
pub mod transact_write_items;

/// Update item operation for modifying existing items.
pub mod update_item;
