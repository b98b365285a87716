use crate::common;
use crate::error::{Error, Result};

use aws_sdk_dynamodb::types;

/// Names of the partition and sort key attributes of a table.
///
/// Every request builder goes through [`KeySchema::key_map`] so the key attribute names are
/// consistent across the whole client.
///
/// ```rust
/// use dynamodb_kit::common::{self, key};
///
/// let schema = key::KeySchema::new("pk", "sk");
/// let key = key::Key::new(common::string_value("users#1"), common::string_value("profile"));
/// let map = schema.key_map(key);
/// assert_eq!(map.len(), 2);
/// ```
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct KeySchema {
    /// The partition key attribute name.
    pub partition_key: String,
    /// The sort key attribute name.
    pub sort_key: String,
}

/// Primary key (partition value and sort value) of one item.
#[derive(Clone, Debug, PartialEq)]
pub struct Key {
    /// The partition key value.
    pub partition: types::AttributeValue,
    /// The sort key value.
    pub sort: types::AttributeValue,
}

impl Key {
    /// Create a key from its two components.
    pub fn new(partition: types::AttributeValue, sort: types::AttributeValue) -> Self {
        Self { partition, sort }
    }
}

/// A null key, rejected by [`KeySchema::validate`] until both parts are set.
impl Default for Key {
    fn default() -> Self {
        Self::new(
            types::AttributeValue::Null(true),
            types::AttributeValue::Null(true),
        )
    }
}

impl KeySchema {
    /// Create a key schema from the two key attribute names.
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }

    /// Build the key map holding exactly the two key attributes.
    pub fn key_map(&self, key: Key) -> common::Item {
        common::Item::from([
            (self.partition_key.clone(), key.partition),
            (self.sort_key.clone(), key.sort),
        ])
    }

    /// Check whether `name` is one of the key attributes.
    pub fn is_key(&self, name: &str) -> bool {
        name == self.partition_key || name == self.sort_key
    }

    /// Extract the key of an item, if it carries both key attributes.
    pub fn key_of(&self, item: &common::Item) -> Option<Key> {
        let partition = item.get(&self.partition_key)?.clone();
        let sort = item.get(&self.sort_key)?.clone();
        Some(Key { partition, sort })
    }

    /// Validate that both key attributes are present and neither null nor empty.
    ///
    /// The remote store rejects empty string and empty binary key values, so they are caught
    /// here before any request is sent.
    pub fn validate(&self, item: &common::Item) -> Result<()> {
        for name in [&self.partition_key, &self.sort_key] {
            let value = item
                .get(name)
                .ok_or_else(|| Error::MissingKey(name.clone()))?;
            if is_empty_value(value) {
                return Err(Error::EmptyKey(name.clone()));
            }
        }
        Ok(())
    }

    /// Build the key map of `key` after validating it.
    pub(crate) fn checked_key_map(&self, key: Key) -> Result<common::Item> {
        let keys = self.key_map(key);
        self.validate(&keys)?;
        Ok(keys)
    }
}

fn is_empty_value(value: &types::AttributeValue) -> bool {
    match value {
        types::AttributeValue::S(value) => value.is_empty(),
        types::AttributeValue::N(value) => value.is_empty(),
        types::AttributeValue::B(value) => value.clone().into_inner().is_empty(),
        types::AttributeValue::Null(_) => true,
        _ => false,
    }
}
