use crate::common::{self, key};
use crate::error::{Error, Result};
use crate::{transport, write};

use aws_sdk_dynamodb::{operation, types};
use serde::Serialize;
use serde_dynamo::to_item;

/// Maximum number of entries in one transaction.
pub const MAX_TRANSACT_ITEMS: usize = 100;

/// One entry of a transaction, shaped exactly like its single-item counterpart.
#[derive(Clone, Debug, PartialEq)]
pub enum TransactWriteItem {
    /// Put a whole item.
    PutItem(write::put_item::PutItem),
    /// Delete an item.
    DeleteItem(write::delete_item::DeleteItem),
    /// Update attributes of an item.
    UpdateItem(write::update_item::UpdateItem),
}

impl TransactWriteItem {
    /// Put entry for a record; the key attributes are added to it.
    pub fn put<T: Serialize>(
        key: key::Key,
        item: &T,
        options: write::common::WriteOptions,
    ) -> Result<Self> {
        let item = to_item(item)?;
        Ok(Self::PutItem(write::put_item::PutItem { key, item, options }))
    }

    /// Delete entry.
    pub fn delete(key: key::Key, options: write::common::WriteOptions) -> Self {
        Self::DeleteItem(write::delete_item::DeleteItem { key, options })
    }

    /// Update entry assigning every attribute of a record.
    pub fn update<T: Serialize>(
        key: key::Key,
        fields: &T,
        options: write::common::WriteOptions,
    ) -> Result<Self> {
        let update_item = write::update_item::UpdateItem::new(key)
            .fields(fields)?
            .options(options);
        Ok(Self::UpdateItem(update_item))
    }

    fn into_transact_item(self, table: &common::Table) -> Result<types::TransactWriteItem> {
        let builder = types::TransactWriteItem::builder();
        let builder = match self {
            Self::PutItem(put_item) => {
                let put_item = put_item.prepare(table)?;
                let put = types::Put::builder()
                    .table_name(put_item.table_name)
                    .set_item(Some(put_item.item));
                builder.put(crate::apply_write_expression!(put, put_item.rendered).build()?)
            }
            Self::DeleteItem(delete_item) => {
                let delete_item = delete_item.prepare(table)?;
                let delete = types::Delete::builder()
                    .table_name(delete_item.table_name)
                    .set_key(Some(delete_item.key));
                builder.delete(crate::apply_write_expression!(delete, delete_item.rendered).build()?)
            }
            Self::UpdateItem(update_item) => {
                let update_item = update_item.prepare(table)?;
                let update = types::Update::builder()
                    .table_name(update_item.table_name)
                    .set_key(Some(update_item.key))
                    .update_expression(update_item.update_expression);
                builder.update(crate::apply_write_expression!(update, update_item.rendered).build()?)
            }
        };
        Ok(builder.build())
    }
}

/// A put entry of [`transact_put_items`](crate::Client::transact_put_items).
#[derive(Clone, Debug, PartialEq)]
pub struct TransactPut<T> {
    /// The primary key of the item.
    pub key: key::Key,
    /// The record to write.
    pub item: T,
}

/// Transact write items operation.
///
/// All entries apply or none does. A failed condition on any entry cancels the whole
/// transaction with [`Error::TransactionCanceled`], whose reasons list one code per entry.
///
/// ```rust,no_run
/// use dynamodb_kit::{common, transport, write};
///
/// # async fn example(transport: &dyn transport::Transport) -> dynamodb_kit::Result<()> {
/// let table = common::Table::new("accounts", common::key::KeySchema::new("pk", "sk"));
/// let transaction = write::transact_write_items::TransactWriteItems {
///     entries: vec![
///         write::transact_write_items::TransactWriteItem::DeleteItem(
///             write::delete_item::DeleteItem {
///                 key: common::key::Key::new(
///                     common::string_value("accounts#1"),
///                     common::string_value("hold"),
///                 ),
///                 options: write::common::WriteOptions::default(),
///             },
///         ),
///     ],
/// };
/// transaction.send(transport, &table).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactWriteItems {
    /// The entries, applied atomically.
    pub entries: Vec<TransactWriteItem>,
}

impl TransactWriteItems {
    pub(crate) fn prepare(self, table: &common::Table) -> Result<Vec<types::TransactWriteItem>> {
        match self.entries.len() {
            0 => return Err(Error::EmptyTransaction),
            len if len > MAX_TRANSACT_ITEMS => return Err(Error::TooManyTransactItems(len)),
            _ => {}
        }
        self.entries
            .into_iter()
            .map(|entry| entry.into_transact_item(table))
            .collect()
    }

    /// Execute the transact write items operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_kit.transact_write_items",
            skip_all,
            fields(table = %table.name, entries = self.entries.len()),
            err
        )
    )]
    pub async fn send(
        self,
        transport: &dyn transport::Transport,
        table: &common::Table,
    ) -> Result<operation::transact_write_items::TransactWriteItemsOutput> {
        let transact_items = self.prepare(table)?;
        let input = operation::transact_write_items::TransactWriteItemsInput::builder()
            .set_transact_items(Some(transact_items))
            .build()?;
        transport.transact_write_items(input).await
    }
}
