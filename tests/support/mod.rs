#![allow(dead_code)]

use dynamodb_kit::{Client, common, testing};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const TABLE: &str = "accounts";

pub fn table() -> common::Table {
    common::Table::new(TABLE, common::key::KeySchema::new("pk", "sk"))
}

pub fn transport() -> testing::MemoryTransport {
    testing::MemoryTransport::new().with_table(TABLE, table().keys)
}

pub fn client(transport: testing::MemoryTransport) -> (Client, Arc<testing::MemoryTransport>) {
    let transport = Arc::new(transport);
    (Client::new(transport.clone(), table()), transport)
}

pub fn key(partition: &str, sort: &str) -> common::key::Key {
    common::key::Key::new(common::string_value(partition), common::string_value(sort))
}

pub fn numbered_key(partition: &str, sort: i64) -> common::key::Key {
    common::key::Key::new(common::string_value(partition), common::number_value(sort))
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Entry {
    pub pk: String,
    pub sk: i64,
    pub label: String,
}

impl Entry {
    pub fn new(partition: &str, sort: i64) -> Self {
        Self {
            pk: partition.to_string(),
            sk: sort,
            label: format!("entry {sort}"),
        }
    }
}
