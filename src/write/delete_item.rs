use crate::common::{self, expression, key};
use crate::error::Result;
use crate::{transport, write};

use aws_sdk_dynamodb::operation;

/// delete item request, fully resolved
#[derive(Debug, PartialEq)]
pub(crate) struct DeleteItemInput {
    pub(crate) key: common::Item,
    pub(crate) rendered: expression::RenderedExpression,
    pub(crate) table_name: String,
}

/// Delete item operation.
///
/// Deleting an item that does not exist succeeds and changes nothing, unless a condition
/// requires the item.
///
/// ```rust,no_run
/// use dynamodb_kit::{common, transport, write};
///
/// # async fn example(transport: &dyn transport::Transport) -> dynamodb_kit::Result<()> {
/// let table = common::Table::new("users", common::key::KeySchema::new("pk", "sk"));
/// let delete_item = write::delete_item::DeleteItem {
///     key: common::key::Key::new(
///         common::string_value("users#1"),
///         common::string_value("profile"),
///     ),
///     options: write::common::WriteOptions::default(),
/// };
/// delete_item.send(transport, &table).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DeleteItem {
    /// The primary key of the item to delete.
    pub key: key::Key,
    /// Condition and optimistic lock; the lock only contributes its condition.
    pub options: write::common::WriteOptions,
}

impl DeleteItem {
    pub(crate) fn prepare(self, table: &common::Table) -> Result<DeleteItemInput> {
        let key = table.keys.checked_key_map(self.key)?;
        let mut builder = expression::ExpressionBuilder::new();
        self.options.apply_to_delete(&mut builder)?;
        let operation = DeleteItemInput {
            key,
            rendered: builder.build(),
            table_name: table.name.clone(),
        };
        Ok(operation)
    }

    /// Execute the delete item operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.delete_item", skip(transport), err)
    )]
    pub async fn send(
        self,
        transport: &dyn transport::Transport,
        table: &common::Table,
    ) -> Result<operation::delete_item::DeleteItemOutput> {
        let delete_item = self.prepare(table)?;
        let builder = operation::delete_item::DeleteItemInput::builder()
            .table_name(delete_item.table_name)
            .set_key(Some(delete_item.key));
        let input = crate::apply_write_expression!(builder, delete_item.rendered).build()?;
        transport.delete_item(input).await
    }
}
