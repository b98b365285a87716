//! Common utilities for DynamoDB operations.
//!
//! This module provides shared types used across read, write and transaction requests:
//! the table configuration, primary key building, expression building, optimistic locking
//! and attribute projection.

/// Structured update and condition expression building.
pub mod expression;

/// Primary key building for the configured key attribute names.
pub mod key;

/// Optimistic concurrency control on a version attribute.
pub mod lock;

/// Attribute projection for read operations.
pub mod selection;

use aws_sdk_dynamodb::types;
use std::collections;

/// An item as sent over the wire: attribute name to attribute value.
pub type Item = collections::HashMap<String, types::AttributeValue>;

/// Build a string attribute value.
pub fn string_value(value: impl Into<String>) -> types::AttributeValue {
    types::AttributeValue::S(value.into())
}

/// Build a number attribute value.
pub fn number_value(value: i64) -> types::AttributeValue {
    types::AttributeValue::N(value.to_string())
}

/// Build a boolean attribute value.
pub fn bool_value(value: bool) -> types::AttributeValue {
    types::AttributeValue::Bool(value)
}

/// Immutable table configuration shared by every request builder.
///
/// ```rust
/// use dynamodb_kit::common;
///
/// let table = common::Table::new("users", common::key::KeySchema::new("pk", "sk"));
/// assert_eq!(table.name, "users");
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Table {
    /// The name of the table.
    pub name: String,
    /// The partition and sort key attribute names.
    pub keys: key::KeySchema,
}

impl Table {
    /// Create a table configuration.
    pub fn new(name: impl Into<String>, keys: key::KeySchema) -> Self {
        Self {
            name: name.into(),
            keys,
        }
    }
}

/// A raw expression together with its placeholder bindings.
///
/// Used for caller supplied key conditions, filters, conditional writes and custom update
/// expressions. Placeholders are merged with the ones minted by the crate; binding the same
/// placeholder to something else is rejected.
///
/// ```rust
/// use dynamodb_kit::common;
///
/// let condition = common::Expression::new("#status = :status")
///     .name("#status", "status")
///     .value(":status", common::string_value("active"));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Expression {
    /// The expression text.
    pub expression: String,
    /// Attribute name placeholders (`#name` to attribute name).
    pub names: collections::HashMap<String, String>,
    /// Attribute value placeholders (`:value` to attribute value).
    pub values: Item,
}

impl Expression {
    /// Create an expression without bindings.
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            ..Default::default()
        }
    }

    /// Bind an attribute name placeholder.
    pub fn name(mut self, placeholder: impl Into<String>, name: impl Into<String>) -> Self {
        self.names.insert(placeholder.into(), name.into());
        self
    }

    /// Bind an attribute value placeholder.
    pub fn value(mut self, placeholder: impl Into<String>, value: types::AttributeValue) -> Self {
        self.values.insert(placeholder.into(), value);
        self
    }
}

/// Split `items` into contiguous chunks of at most `size` elements.
pub(crate) fn chunks<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(items.len().div_ceil(size));
    let mut items = items.into_iter().peekable();
    while items.peek().is_some() {
        chunks.push(items.by_ref().take(size).collect());
    }
    chunks
}

/// Placeholder token for an attribute name: anything outside `[A-Za-z0-9_]` becomes `_`.
pub(crate) fn placeholder_token(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}
