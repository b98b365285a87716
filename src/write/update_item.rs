use crate::common::{self, expression, key};
use crate::error::{Error, Result};
use crate::{transport, write};

use aws_sdk_dynamodb::{operation, types};
use indexmap::IndexMap;
use serde::Serialize;

/// update item request, fully resolved
#[derive(Debug, PartialEq)]
pub(crate) struct UpdateItemInput {
    pub(crate) key: common::Item,
    pub(crate) update_expression: String,
    pub(crate) rendered: expression::RenderedExpression,
    pub(crate) table_name: String,
}

/// Update item operation.
///
/// Field assignments, the raw expression and the optimistic lock are merged into one update
/// expression with a single clause per keyword: with fields `{name}`, the expression
/// `ADD #balance :val` and a lock on `version`, the request carries
/// `SET #name = :name, #version = :newVersion ADD #balance :val`.
///
/// ```rust,no_run
/// use dynamodb_kit::{common, transport, write};
/// use indexmap::IndexMap;
///
/// # async fn example(transport: &dyn transport::Transport) -> dynamodb_kit::Result<()> {
/// let table = common::Table::new("users", common::key::KeySchema::new("pk", "sk"));
/// let update_item = write::update_item::UpdateItem {
///     key: common::key::Key::new(
///         common::string_value("users#1"),
///         common::string_value("profile"),
///     ),
///     fields: Some(IndexMap::from([("name".to_string(), common::string_value("B"))])),
///     expression: None,
///     options: write::common::WriteOptions::default()
///         .lock(common::lock::OptimisticLock::new("version", 1)),
/// };
/// update_item.send(transport, &table).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdateItem {
    /// The primary key of the item to update.
    pub key: key::Key,
    /// Attributes to assign; key attributes are skipped.
    pub fields: Option<IndexMap<String, types::AttributeValue>>,
    /// Raw update expression, e.g. `ADD #balance :val`.
    pub expression: Option<common::Expression>,
    /// Condition and optimistic lock.
    pub options: write::common::WriteOptions,
}

impl UpdateItem {
    /// Start an update of the item with this key.
    pub fn new(key: key::Key) -> Self {
        Self {
            key,
            ..Default::default()
        }
    }

    /// Assign every attribute of a record.
    pub fn fields<T: Serialize>(mut self, fields: &T) -> Result<Self> {
        self.fields = Some(expression::flatten(fields)?);
        Ok(self)
    }

    /// Merge a raw update expression.
    pub fn expression(mut self, expression: common::Expression) -> Self {
        self.expression = Some(expression);
        self
    }

    /// Set the condition and optimistic lock.
    pub fn options(mut self, options: write::common::WriteOptions) -> Self {
        self.options = options;
        self
    }

    pub(crate) fn prepare(self, table: &common::Table) -> Result<UpdateItemInput> {
        let key = table.keys.checked_key_map(self.key)?;
        if self.fields.is_none() && self.expression.is_none() && self.options.lock.is_none() {
            return Err(Error::FieldsRequired);
        }
        let mut builder = expression::ExpressionBuilder::new();
        if let Some(mut fields) = self.fields {
            let locked = match &self.options.lock {
                Some(lock) => fields.shift_remove(&lock.field).is_some(),
                None => false,
            };
            if !(locked && fields.is_empty()) {
                builder.set_fields(fields, &table.keys)?;
            }
        }
        if let Some(expression) = &self.expression {
            builder.update_expression(expression)?;
        }
        self.options.apply_to_update(&mut builder)?;
        let rendered = builder.build();
        let update_expression = rendered
            .update_expression
            .clone()
            .ok_or(Error::EmptyUpdateExpression)?;
        let operation = UpdateItemInput {
            key,
            update_expression,
            rendered,
            table_name: table.name.clone(),
        };
        Ok(operation)
    }

    /// Execute the update item operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.update_item", skip(transport), err)
    )]
    pub async fn send(
        self,
        transport: &dyn transport::Transport,
        table: &common::Table,
    ) -> Result<operation::update_item::UpdateItemOutput> {
        let update_item = self.prepare(table)?;
        let builder = operation::update_item::UpdateItemInput::builder()
            .table_name(update_item.table_name)
            .set_key(Some(update_item.key))
            .update_expression(update_item.update_expression);
        let input = crate::apply_write_expression!(builder, update_item.rendered).build()?;
        transport.update_item(input).await
    }
}
