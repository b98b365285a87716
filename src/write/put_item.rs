use crate::common::{self, expression, key};
use crate::error::Result;
use crate::{transport, write};

use aws_sdk_dynamodb::operation;

/// put item request, fully resolved
#[derive(Debug, PartialEq)]
pub(crate) struct PutItemInput {
    pub(crate) item: common::Item,
    pub(crate) rendered: expression::RenderedExpression,
    pub(crate) table_name: String,
}

/// Put item operation.
///
/// The key attributes are added to `item`, replacing any attribute of the same name.
///
/// ```rust,no_run
/// use dynamodb_kit::{common, transport, write};
///
/// # async fn example(transport: &dyn transport::Transport) -> dynamodb_kit::Result<()> {
/// let table = common::Table::new("users", common::key::KeySchema::new("pk", "sk"));
/// let put_item = write::put_item::PutItem {
///     key: common::key::Key::new(
///         common::string_value("users#1"),
///         common::string_value("profile"),
///     ),
///     item: common::Item::from([("name".to_string(), common::string_value("A"))]),
///     options: write::common::WriteOptions::default(),
/// };
/// put_item.send(transport, &table).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct PutItem {
    /// The primary key of the item.
    pub key: key::Key,
    /// The attributes to write.
    pub item: common::Item,
    /// Condition and optimistic lock.
    pub options: write::common::WriteOptions,
}

impl PutItem {
    pub(crate) fn prepare(self, table: &common::Table) -> Result<PutItemInput> {
        let mut item = self.item;
        item.extend(table.keys.key_map(self.key));
        table.keys.validate(&item)?;
        let mut builder = expression::ExpressionBuilder::new();
        self.options.apply_to_put(&mut item, &mut builder)?;
        let operation = PutItemInput {
            item,
            rendered: builder.build(),
            table_name: table.name.clone(),
        };
        Ok(operation)
    }

    /// Execute the put item operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.put_item", skip(transport), err)
    )]
    pub async fn send(
        self,
        transport: &dyn transport::Transport,
        table: &common::Table,
    ) -> Result<operation::put_item::PutItemOutput> {
        let put_item = self.prepare(table)?;
        let builder = operation::put_item::PutItemInput::builder()
            .table_name(put_item.table_name)
            .set_item(Some(put_item.item));
        let input = crate::apply_write_expression!(builder, put_item.rendered).build()?;
        transport.put_item(input).await
    }
}
