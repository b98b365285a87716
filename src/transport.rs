//! The remote store as seen by the request builders.
//!
//! Every operation is one round trip carrying a fully assembled SDK input. The trait stays
//! as close as possible to [`aws_sdk_dynamodb::Client`] so that the real client is a thin
//! forwarding implementation, and an in-process implementation
//! (`testing::MemoryTransport`, behind the `testing` feature) can stand in for tests.

use crate::error::{Error, Result};

use async_trait::async_trait;
use aws_sdk_dynamodb::{Client, operation};

/// One request/response round trip per method.
///
/// Implementations must be safe to share between tasks. They report a failed condition as
/// [`Error::ConditionalCheckFailed`], a cancelled transaction as
/// [`Error::TransactionCanceled`] and anything else as [`Error::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read one item.
    async fn get_item(
        &self,
        input: operation::get_item::GetItemInput,
    ) -> Result<operation::get_item::GetItemOutput>;

    /// Write one whole item.
    async fn put_item(
        &self,
        input: operation::put_item::PutItemInput,
    ) -> Result<operation::put_item::PutItemOutput>;

    /// Delete one item.
    async fn delete_item(
        &self,
        input: operation::delete_item::DeleteItemInput,
    ) -> Result<operation::delete_item::DeleteItemOutput>;

    /// Update attributes of one item.
    async fn update_item(
        &self,
        input: operation::update_item::UpdateItemInput,
    ) -> Result<operation::update_item::UpdateItemOutput>;

    /// Read one page of a query.
    async fn query(
        &self,
        input: operation::query::QueryInput,
    ) -> Result<operation::query::QueryOutput>;

    /// Read up to 100 items by key.
    async fn batch_get_item(
        &self,
        input: operation::batch_get_item::BatchGetItemInput,
    ) -> Result<operation::batch_get_item::BatchGetItemOutput>;

    /// Put or delete up to 25 items.
    async fn batch_write_item(
        &self,
        input: operation::batch_write_item::BatchWriteItemInput,
    ) -> Result<operation::batch_write_item::BatchWriteItemOutput>;

    /// Apply up to 100 writes atomically.
    async fn transact_write_items(
        &self,
        input: operation::transact_write_items::TransactWriteItemsInput,
    ) -> Result<operation::transact_write_items::TransactWriteItemsOutput>;
}

#[async_trait]
impl Transport for Client {
    async fn get_item(
        &self,
        input: operation::get_item::GetItemInput,
    ) -> Result<operation::get_item::GetItemOutput> {
        Client::get_item(self)
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_consistent_read(input.consistent_read)
            .set_projection_expression(input.projection_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .send()
            .await
            .map_err(Error::from_sdk)
    }

    async fn put_item(
        &self,
        input: operation::put_item::PutItemInput,
    ) -> Result<operation::put_item::PutItemOutput> {
        Client::put_item(self)
            .set_table_name(input.table_name)
            .set_item(input.item)
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_return_values(input.return_values)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .send()
            .await
            .map_err(Error::from_sdk)
    }

    async fn delete_item(
        &self,
        input: operation::delete_item::DeleteItemInput,
    ) -> Result<operation::delete_item::DeleteItemOutput> {
        Client::delete_item(self)
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_return_values(input.return_values)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .send()
            .await
            .map_err(Error::from_sdk)
    }

    async fn update_item(
        &self,
        input: operation::update_item::UpdateItemInput,
    ) -> Result<operation::update_item::UpdateItemOutput> {
        Client::update_item(self)
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_update_expression(input.update_expression)
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_return_values(input.return_values)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .send()
            .await
            .map_err(Error::from_sdk)
    }

    async fn query(
        &self,
        input: operation::query::QueryInput,
    ) -> Result<operation::query::QueryOutput> {
        Client::query(self)
            .set_table_name(input.table_name)
            .set_index_name(input.index_name)
            .set_key_condition_expression(input.key_condition_expression)
            .set_filter_expression(input.filter_expression)
            .set_projection_expression(input.projection_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_scan_index_forward(input.scan_index_forward)
            .set_limit(input.limit)
            .set_consistent_read(input.consistent_read)
            .set_exclusive_start_key(input.exclusive_start_key)
            .set_select(input.select)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .send()
            .await
            .map_err(Error::from_sdk)
    }

    async fn batch_get_item(
        &self,
        input: operation::batch_get_item::BatchGetItemInput,
    ) -> Result<operation::batch_get_item::BatchGetItemOutput> {
        Client::batch_get_item(self)
            .set_request_items(input.request_items)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .send()
            .await
            .map_err(Error::from_sdk)
    }

    async fn batch_write_item(
        &self,
        input: operation::batch_write_item::BatchWriteItemInput,
    ) -> Result<operation::batch_write_item::BatchWriteItemOutput> {
        Client::batch_write_item(self)
            .set_request_items(input.request_items)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_return_item_collection_metrics(input.return_item_collection_metrics)
            .send()
            .await
            .map_err(Error::from_sdk)
    }

    async fn transact_write_items(
        &self,
        input: operation::transact_write_items::TransactWriteItemsInput,
    ) -> Result<operation::transact_write_items::TransactWriteItemsOutput> {
        Client::transact_write_items(self)
            .set_transact_items(input.transact_items)
            .set_client_request_token(input.client_request_token)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_return_item_collection_metrics(input.return_item_collection_metrics)
            .send()
            .await
            .map_err(Error::from_transact_sdk)
    }
}
