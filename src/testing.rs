//! In-process transport for tests and local development.
//!
//! [`MemoryTransport`] stores items per table in key order and evaluates key conditions,
//! filters, condition and update expressions, so every operation of the crate behaves as it
//! would against the remote store. Failures can be injected to exercise the partial-failure
//! paths of batch operations.

mod eval;

use crate::common::{self, key};
use crate::error::{Error, Result};
use crate::transport;

use async_trait::async_trait;
use aws_sdk_dynamodb::{operation, types};
use parking_lot::Mutex;
use std::{collections, sync::Arc, time::Duration};

const MAX_BATCH_GET_KEYS: usize = 100;
const MAX_BATCH_WRITE_REQUESTS: usize = 25;
const MAX_TRANSACT_ITEMS: usize = 100;

/// An error reported by the in-memory store, shaped like a service error.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ServiceError {
    /// The error code, e.g. `ValidationException`.
    pub code: String,
    /// The error message.
    pub message: String,
}

impl ServiceError {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::new("ValidationException", message)
    }

    fn throttled() -> Self {
        Self::new(
            "ProvisionedThroughputExceededException",
            "the level of configured provisioned throughput was exceeded",
        )
    }
}

impl From<ServiceError> for Error {
    fn from(err: ServiceError) -> Self {
        Self::Transport(Box::new(err))
    }
}

/// The remote operations, as counted by [`MemoryTransport::calls`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Operation {
    /// A get item call.
    GetItem,
    /// A put item call.
    PutItem,
    /// A delete item call.
    DeleteItem,
    /// An update item call.
    UpdateItem,
    /// One query page.
    Query,
    /// A batch get item call.
    BatchGetItem,
    /// A batch write item call.
    BatchWriteItem,
    /// A transact write items call.
    TransactWriteItems,
}

type Sorted = (eval::KeyPart, eval::KeyPart);

type WritePredicate = Arc<dyn Fn(&types::WriteRequest) -> bool + Send + Sync>;

#[derive(Debug)]
struct TableState {
    keys: key::KeySchema,
    indexes: collections::HashMap<String, key::KeySchema>,
    items: collections::BTreeMap<Sorted, common::Item>,
}

impl TableState {
    fn new(keys: key::KeySchema) -> Self {
        Self {
            keys,
            indexes: collections::HashMap::new(),
            items: collections::BTreeMap::new(),
        }
    }

    /// Position of the item identified by `key`, which must hold exactly the key attributes.
    fn position(&self, key: &common::Item) -> std::result::Result<Sorted, ServiceError> {
        if key.len() != 2 {
            return Err(ServiceError::validation(
                "the provided key element does not match the schema",
            ));
        }
        eval::item_key(&self.keys, key)
    }

    fn key_map(&self, item: &common::Item) -> common::Item {
        [&self.keys.partition_key, &self.keys.sort_key]
            .into_iter()
            .filter_map(|name| Some((name.clone(), item.get(name)?.clone())))
            .collect()
    }
}

#[derive(Debug, Default)]
struct State {
    tables: collections::HashMap<String, TableState>,
    calls: collections::HashMap<Operation, usize>,
    failing_batch_writes: collections::BTreeSet<usize>,
    unprocessed_gets: usize,
}

impl State {
    fn count(&mut self, operation: Operation) -> usize {
        let calls = self.calls.entry(operation).or_default();
        *calls += 1;
        *calls
    }

    fn table(&mut self, name: Option<&str>) -> std::result::Result<&mut TableState, ServiceError> {
        let name = name.unwrap_or_default();
        self.tables.get_mut(name).ok_or_else(|| {
            ServiceError::new(
                "ResourceNotFoundException",
                format!("requested resource not found: table `{name}`"),
            )
        })
    }
}

/// The store side of a conditional write.
struct Write<'a> {
    condition_expression: Option<&'a str>,
    names: Option<&'a collections::HashMap<String, String>>,
    values: Option<&'a common::Item>,
}

impl Write<'_> {
    fn check(&self, item: Option<&common::Item>) -> std::result::Result<bool, ServiceError> {
        let Some(expression) = self.condition_expression else {
            return Ok(true);
        };
        let empty_names = collections::HashMap::new();
        let empty_values = common::Item::new();
        eval::condition(
            expression,
            self.names.unwrap_or(&empty_names),
            self.values.unwrap_or(&empty_values),
            item,
        )
    }

    fn apply_update(
        &self,
        update_expression: &str,
        keys: &key::KeySchema,
        item: &mut common::Item,
    ) -> std::result::Result<(), ServiceError> {
        let empty_names = collections::HashMap::new();
        let empty_values = common::Item::new();
        eval::update(
            update_expression,
            self.names.unwrap_or(&empty_names),
            self.values.unwrap_or(&empty_values),
            keys,
            item,
        )
    }
}

/// The outcome of one staged write: the position and the new item, `None` for a deletion.
type Staged = (Sorted, Option<common::Item>);

/// In-memory implementation of [`Transport`](crate::transport::Transport).
///
/// Tables must be declared with [`MemoryTransport::with_table`] before use.
///
/// ```rust
/// use dynamodb_kit::{common, testing};
///
/// let transport = testing::MemoryTransport::new()
///     .with_table("users", common::key::KeySchema::new("pk", "sk"))
///     .with_page_size(10);
/// assert_eq!(transport.calls(testing::Operation::Query), 0);
/// ```
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<State>,
    page_size: Option<usize>,
    latency: Option<Duration>,
    unprocessed_writes: Option<WritePredicate>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("state", &self.state)
            .field("page_size", &self.page_size)
            .field("latency", &self.latency)
            .finish_non_exhaustive()
    }
}

impl MemoryTransport {
    /// Create a store without tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table.
    pub fn with_table(self, name: impl Into<String>, keys: key::KeySchema) -> Self {
        self.state
            .lock()
            .tables
            .insert(name.into(), TableState::new(keys));
        self
    }

    /// Declare a secondary index of a declared table; unknown tables are ignored.
    pub fn with_index(self, table: &str, index: impl Into<String>, keys: key::KeySchema) -> Self {
        if let Some(table) = self.state.lock().tables.get_mut(table) {
            table.indexes.insert(index.into(), keys);
        }
        self
    }

    /// Evaluate at most `page_size` items per query page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Wait `latency` before serving each call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Leave every batch write request matching `predicate` unprocessed.
    pub fn with_unprocessed_writes<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&types::WriteRequest) -> bool + Send + Sync + 'static,
    {
        self.unprocessed_writes = Some(Arc::new(predicate));
        self
    }

    /// Reject the `call`-th batch write call (counting from 1) with a throttling error.
    pub fn fail_batch_write_call(self, call: usize) -> Self {
        self.state.lock().failing_batch_writes.insert(call);
        self
    }

    /// Leave half of the keys of the next `calls` batch get calls unprocessed.
    pub fn unprocessed_gets(self, calls: usize) -> Self {
        self.state.lock().unprocessed_gets = calls;
        self
    }

    /// Number of calls served for `operation`.
    pub fn calls(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .calls
            .get(&operation)
            .copied()
            .unwrap_or_default()
    }

    /// Every item of a table, in key order.
    pub fn items(&self, table: &str) -> Vec<common::Item> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|table| table.items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Store an item directly, bypassing conditions.
    pub fn insert(&self, table: &str, item: common::Item) -> Result<()> {
        let mut state = self.state.lock();
        let table = state.table(Some(table))?;
        let position = eval::item_key(&table.keys, &item)?;
        table.items.insert(position, item);
        Ok(())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn check_condition(write: &Write<'_>, item: Option<&common::Item>) -> Result<()> {
    if write.check(item)? {
        Ok(())
    } else {
        Err(Error::ConditionalCheckFailed)
    }
}

fn validate_item(table: &TableState, item: &common::Item) -> std::result::Result<Sorted, ServiceError> {
    let position = eval::item_key(&table.keys, item)?;
    for (index, keys) in &table.indexes {
        for name in [&keys.partition_key, &keys.sort_key] {
            if let Some(value) = item.get(name) {
                if eval::KeyPart::from_value(value).is_err() {
                    return Err(ServiceError::validation(format!(
                        "invalid value for key attribute `{name}` of index `{index}`"
                    )));
                }
            }
        }
    }
    Ok(position)
}

fn stage_update(
    table: &TableState,
    key: &common::Item,
    update_expression: &str,
    write: &Write<'_>,
) -> std::result::Result<(Staged, Option<common::Item>), ServiceError> {
    let position = table.position(key)?;
    let current = table.items.get(&position).cloned();
    let mut item = current.clone().unwrap_or_else(|| key.clone());
    write.apply_update(update_expression, &table.keys, &mut item)?;
    validate_item(table, &item)?;
    Ok(((position, Some(item)), current))
}

/// The ordering of an item within a query: index key first, then table key.
fn query_order(
    table: &TableState,
    index: Option<&key::KeySchema>,
    item: &common::Item,
) -> Option<Vec<eval::KeyPart>> {
    let (partition, sort) = eval::item_key(&table.keys, item).ok()?;
    match index {
        Some(index) => {
            let (index_partition, index_sort) = eval::item_key(index, item).ok()?;
            Some(vec![index_partition, index_sort, partition, sort])
        }
        None => Some(vec![partition, sort]),
    }
}

#[async_trait]
impl transport::Transport for MemoryTransport {
    async fn get_item(
        &self,
        input: operation::get_item::GetItemInput,
    ) -> Result<operation::get_item::GetItemOutput> {
        self.delay().await;
        let mut state = self.state.lock();
        state.count(Operation::GetItem);
        let table = state.table(input.table_name.as_deref())?;
        let position = table.position(&input.key.unwrap_or_default())?;
        let item = match table.items.get(&position).cloned() {
            Some(item) => Some(match &input.projection_expression {
                Some(projection) => eval::project(
                    projection,
                    &input.expression_attribute_names.unwrap_or_default(),
                    item,
                )?,
                None => item,
            }),
            None => None,
        };
        Ok(operation::get_item::GetItemOutput::builder()
            .set_item(item)
            .build())
    }

    async fn put_item(
        &self,
        input: operation::put_item::PutItemInput,
    ) -> Result<operation::put_item::PutItemOutput> {
        self.delay().await;
        let mut state = self.state.lock();
        state.count(Operation::PutItem);
        let table = state.table(input.table_name.as_deref())?;
        let item = input.item.clone().unwrap_or_default();
        let position = validate_item(table, &item)?;
        let write = Write {
            condition_expression: input.condition_expression.as_deref(),
            names: input.expression_attribute_names.as_ref(),
            values: input.expression_attribute_values.as_ref(),
        };
        check_condition(&write, table.items.get(&position))?;
        table.items.insert(position, item);
        Ok(operation::put_item::PutItemOutput::builder().build())
    }

    async fn delete_item(
        &self,
        input: operation::delete_item::DeleteItemInput,
    ) -> Result<operation::delete_item::DeleteItemOutput> {
        self.delay().await;
        let mut state = self.state.lock();
        state.count(Operation::DeleteItem);
        let table = state.table(input.table_name.as_deref())?;
        let position = table.position(input.key.as_ref().unwrap_or(&common::Item::new()))?;
        let write = Write {
            condition_expression: input.condition_expression.as_deref(),
            names: input.expression_attribute_names.as_ref(),
            values: input.expression_attribute_values.as_ref(),
        };
        check_condition(&write, table.items.get(&position))?;
        table.items.remove(&position);
        Ok(operation::delete_item::DeleteItemOutput::builder().build())
    }

    async fn update_item(
        &self,
        input: operation::update_item::UpdateItemInput,
    ) -> Result<operation::update_item::UpdateItemOutput> {
        self.delay().await;
        let mut state = self.state.lock();
        state.count(Operation::UpdateItem);
        let table = state.table(input.table_name.as_deref())?;
        let write = Write {
            condition_expression: input.condition_expression.as_deref(),
            names: input.expression_attribute_names.as_ref(),
            values: input.expression_attribute_values.as_ref(),
        };
        let ((position, item), current) = stage_update(
            table,
            input.key.as_ref().unwrap_or(&common::Item::new()),
            input.update_expression.as_deref().unwrap_or_default(),
            &write,
        )?;
        check_condition(&write, current.as_ref())?;
        if let Some(item) = item {
            table.items.insert(position, item);
        }
        Ok(operation::update_item::UpdateItemOutput::builder().build())
    }

    async fn query(
        &self,
        input: operation::query::QueryInput,
    ) -> Result<operation::query::QueryOutput> {
        self.delay().await;
        let mut state = self.state.lock();
        state.count(Operation::Query);
        let table = &*state.table(input.table_name.as_deref())?;
        let index = match input.index_name.as_deref() {
            Some(name) => Some(table.indexes.get(name).ok_or_else(|| {
                ServiceError::validation(format!("the table does not have the index `{name}`"))
            })?),
            None => None,
        };
        let names = input.expression_attribute_names.clone().unwrap_or_default();
        let values = input.expression_attribute_values.clone().unwrap_or_default();
        let key_condition = input.key_condition_expression.as_deref().ok_or_else(|| {
            ServiceError::validation("a key condition expression is required")
        })?;

        let mut candidates = Vec::new();
        for item in table.items.values() {
            let Some(order) = query_order(table, index, item) else {
                continue;
            };
            if eval::condition(key_condition, &names, &values, Some(item))? {
                candidates.push((order, item));
            }
        }
        candidates.sort_by(|(left, _), (right, _)| left.cmp(right));
        if input.scan_index_forward == Some(false) {
            candidates.reverse();
        }
        if let Some(start) = &input.exclusive_start_key {
            let start = query_order(table, index, start)
                .ok_or_else(|| ServiceError::validation("the exclusive start key is invalid"))?;
            let forward = input.scan_index_forward != Some(false);
            candidates.retain(|(order, _)| {
                if forward {
                    *order > start
                } else {
                    *order < start
                }
            });
        }

        let limit = match input.limit {
            Some(limit) if limit < 1 => {
                return Err(ServiceError::validation("limit must be at least 1").into());
            }
            Some(limit) => usize::try_from(limit).unwrap_or(usize::MAX),
            None => usize::MAX,
        };
        let evaluated = limit.min(self.page_size.unwrap_or(usize::MAX));
        let more = candidates.len() > evaluated;
        candidates.truncate(evaluated);

        let last_evaluated_key = match candidates.last() {
            Some((_, item)) if more => {
                let mut last = table.key_map(item);
                if let Some(index) = index {
                    for name in [&index.partition_key, &index.sort_key] {
                        if let Some(value) = item.get(name) {
                            last.insert(name.clone(), value.clone());
                        }
                    }
                }
                Some(last)
            }
            _ => None,
        };
        let scanned_count = candidates.len();
        let mut items = Vec::with_capacity(scanned_count);
        for (_, item) in candidates {
            if let Some(filter) = &input.filter_expression {
                if !eval::condition(filter, &names, &values, Some(item))? {
                    continue;
                }
            }
            let item = match &input.projection_expression {
                Some(projection) => eval::project(projection, &names, item.clone())?,
                None => item.clone(),
            };
            items.push(item);
        }
        Ok(operation::query::QueryOutput::builder()
            .count(i32::try_from(items.len()).unwrap_or(i32::MAX))
            .scanned_count(i32::try_from(scanned_count).unwrap_or(i32::MAX))
            .set_items(Some(items))
            .set_last_evaluated_key(last_evaluated_key)
            .build())
    }

    async fn batch_get_item(
        &self,
        input: operation::batch_get_item::BatchGetItemInput,
    ) -> Result<operation::batch_get_item::BatchGetItemOutput> {
        self.delay().await;
        let mut state = self.state.lock();
        state.count(Operation::BatchGetItem);
        let request_items = input.request_items.unwrap_or_default();
        let total: usize = request_items.values().map(|request| request.keys.len()).sum();
        if total == 0 || total > MAX_BATCH_GET_KEYS {
            return Err(ServiceError::validation(format!(
                "a batch get must request between 1 and {MAX_BATCH_GET_KEYS} keys, got {total}"
            ))
            .into());
        }
        let throttle = state.unprocessed_gets > 0 && total > 1;
        if throttle {
            state.unprocessed_gets -= 1;
        }

        let mut responses = collections::HashMap::new();
        let mut unprocessed = collections::HashMap::new();
        for (name, request) in request_items {
            let table = state.table(Some(&name))?;
            let mut keys = request.keys.clone();
            let deferred = if throttle {
                keys.split_off(keys.len().div_ceil(2))
            } else {
                Vec::new()
            };
            let names = request.expression_attribute_names.clone().unwrap_or_default();
            let mut found = Vec::new();
            for key in &keys {
                let position = table.position(key)?;
                if let Some(item) = table.items.get(&position).cloned() {
                    found.push(match &request.projection_expression {
                        Some(projection) => eval::project(projection, &names, item)?,
                        None => item,
                    });
                }
            }
            responses.insert(name.clone(), found);
            if !deferred.is_empty() {
                let mut request = request;
                request.keys = deferred;
                unprocessed.insert(name, request);
            }
        }
        Ok(operation::batch_get_item::BatchGetItemOutput::builder()
            .set_responses(Some(responses))
            .set_unprocessed_keys(Some(unprocessed))
            .build())
    }

    async fn batch_write_item(
        &self,
        input: operation::batch_write_item::BatchWriteItemInput,
    ) -> Result<operation::batch_write_item::BatchWriteItemOutput> {
        self.delay().await;
        let mut state = self.state.lock();
        let call = state.count(Operation::BatchWriteItem);
        let request_items = input.request_items.unwrap_or_default();
        let total: usize = request_items.values().map(Vec::len).sum();
        if total == 0 || total > MAX_BATCH_WRITE_REQUESTS {
            return Err(ServiceError::validation(format!(
                "a batch write must hold between 1 and {MAX_BATCH_WRITE_REQUESTS} requests, got {total}"
            ))
            .into());
        }
        if state.failing_batch_writes.contains(&call) {
            return Err(ServiceError::throttled().into());
        }

        let mut unprocessed = collections::HashMap::new();
        for (name, requests) in request_items {
            let table = state.table(Some(&name))?;
            let mut staged = Vec::with_capacity(requests.len());
            let mut skipped = Vec::new();
            for request in requests {
                if self
                    .unprocessed_writes
                    .as_ref()
                    .is_some_and(|predicate| predicate(&request))
                {
                    skipped.push(request);
                    continue;
                }
                match (&request.put_request, &request.delete_request) {
                    (Some(put_request), None) => {
                        let position = validate_item(table, &put_request.item)?;
                        staged.push((position, Some(put_request.item.clone())));
                    }
                    (None, Some(delete_request)) => {
                        staged.push((table.position(&delete_request.key)?, None));
                    }
                    _ => {
                        return Err(ServiceError::validation(
                            "a write request must hold exactly one put or delete request",
                        )
                        .into());
                    }
                }
            }
            for (position, item) in staged {
                match item {
                    Some(item) => table.items.insert(position, item),
                    None => table.items.remove(&position),
                };
            }
            if !skipped.is_empty() {
                unprocessed.insert(name, skipped);
            }
        }
        Ok(operation::batch_write_item::BatchWriteItemOutput::builder()
            .set_unprocessed_items(Some(unprocessed))
            .build())
    }

    async fn transact_write_items(
        &self,
        input: operation::transact_write_items::TransactWriteItemsInput,
    ) -> Result<operation::transact_write_items::TransactWriteItemsOutput> {
        self.delay().await;
        let mut state = self.state.lock();
        state.count(Operation::TransactWriteItems);
        let transact_items = input.transact_items.unwrap_or_default();
        if transact_items.is_empty() || transact_items.len() > MAX_TRANSACT_ITEMS {
            return Err(ServiceError::validation(format!(
                "a transaction must hold between 1 and {MAX_TRANSACT_ITEMS} entries"
            ))
            .into());
        }

        let mut staged = Vec::with_capacity(transact_items.len());
        let mut reasons = Vec::with_capacity(transact_items.len());
        let mut touched = collections::BTreeSet::new();
        for transact_item in &transact_items {
            let (table_name, entry, passed) = match (
                &transact_item.put,
                &transact_item.delete,
                &transact_item.update,
            ) {
                (Some(put), None, None) => {
                    let table = state.table(Some(&put.table_name))?;
                    let position = validate_item(table, &put.item)?;
                    let write = Write {
                        condition_expression: put.condition_expression.as_deref(),
                        names: put.expression_attribute_names.as_ref(),
                        values: put.expression_attribute_values.as_ref(),
                    };
                    let passed = write.check(table.items.get(&position))?;
                    (&put.table_name, (position, Some(put.item.clone())), passed)
                }
                (None, Some(delete), None) => {
                    let table = state.table(Some(&delete.table_name))?;
                    let position = table.position(&delete.key)?;
                    let write = Write {
                        condition_expression: delete.condition_expression.as_deref(),
                        names: delete.expression_attribute_names.as_ref(),
                        values: delete.expression_attribute_values.as_ref(),
                    };
                    let passed = write.check(table.items.get(&position))?;
                    (&delete.table_name, (position, None), passed)
                }
                (None, None, Some(update)) => {
                    let table = state.table(Some(&update.table_name))?;
                    let write = Write {
                        condition_expression: update.condition_expression.as_deref(),
                        names: update.expression_attribute_names.as_ref(),
                        values: update.expression_attribute_values.as_ref(),
                    };
                    let (entry, current) =
                        stage_update(table, &update.key, &update.update_expression, &write)?;
                    let passed = write.check(current.as_ref())?;
                    (&update.table_name, entry, passed)
                }
                _ => {
                    return Err(ServiceError::validation(
                        "a transaction entry must hold exactly one put, delete or update",
                    )
                    .into());
                }
            };
            if !touched.insert((table_name.clone(), entry.0.clone())) {
                return Err(ServiceError::validation(
                    "transaction request cannot include multiple operations on one item",
                )
                .into());
            }
            reasons.push(if passed { "None" } else { "ConditionalCheckFailed" }.to_string());
            staged.push((table_name.clone(), entry));
        }

        if reasons.iter().any(|reason| reason != "None") {
            return Err(Error::TransactionCanceled { reasons });
        }
        for (table_name, (position, item)) in staged {
            let table = state.table(Some(&table_name))?;
            match item {
                Some(item) => table.items.insert(position, item),
                None => table.items.remove(&position),
            };
        }
        Ok(operation::transact_write_items::TransactWriteItemsOutput::builder().build())
    }
}
