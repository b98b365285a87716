use crate::common::{self, key};
use crate::error::Result;
use crate::{read, transport};

use aws_sdk_dynamodb::operation;

/// get item request, fully resolved
#[derive(Clone, Debug, Default, PartialEq)]
struct GetItemInput {
    key: common::Item,
    read_operation: read::common::ReadInput,
    table_name: String,
}

/// Get item operation.
///
/// A missing item is not an error: [`GetItem::send`] returns `None`.
///
/// ```rust,no_run
/// use dynamodb_kit::{common, read, transport};
///
/// # async fn example(transport: &dyn transport::Transport) -> dynamodb_kit::Result<()> {
/// let table = common::Table::new("users", common::key::KeySchema::new("pk", "sk"));
/// let get_item = read::get_item::GetItem {
///     key: common::key::Key::new(
///         common::string_value("users#1"),
///         common::string_value("profile"),
///     ),
///     options: read::common::ReadOptions {
///         consistent_read: true,
///         ..Default::default()
///     },
/// };
/// let item = get_item.send(transport, &table).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetItem {
    /// The primary key of the item to retrieve.
    pub key: key::Key,
    /// Consistency and projection.
    pub options: read::common::ReadOptions,
}

impl GetItem {
    fn prepare(self, table: &common::Table) -> Result<GetItemInput> {
        let key = table.keys.checked_key_map(self.key)?;
        let read_operation = (&self.options).try_into()?;
        let operation = GetItemInput {
            key,
            read_operation,
            table_name: table.name.clone(),
        };
        Ok(operation)
    }

    /// Execute the get item operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.get_item", skip(transport), err)
    )]
    pub async fn send(
        self,
        transport: &dyn transport::Transport,
        table: &common::Table,
    ) -> Result<Option<common::Item>> {
        let get_item = self.prepare(table)?;
        let builder = operation::get_item::GetItemInput::builder()
            .table_name(get_item.table_name)
            .set_key(Some(get_item.key));
        let input = crate::apply_read_options!(builder, get_item.read_operation).build()?;
        let output = transport.get_item(input).await?;
        Ok(output.item)
    }
}
