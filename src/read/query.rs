use crate::common::{self, expression, selection};
use crate::error::{Error, Result};
use crate::transport;

use aws_sdk_dynamodb::operation;

/// Options of a query.
///
/// ```rust
/// use dynamodb_kit::{common, read};
///
/// let options = read::query::QueryOptions {
///     filter: Some(
///         common::Expression::new("#status = :status")
///             .name("#status", "status")
///             .value(":status", common::string_value("active")),
///     ),
///     scan_index_forward: Some(false),
///     limit: Some(10),
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    /// Which attributes to retrieve; every attribute when `None`.
    pub selection: Option<selection::Selection>,
    /// Filter applied by the store after the key condition.
    pub filter: Option<common::Expression>,
    /// Secondary index to query instead of the table.
    pub index: Option<String>,
    /// Sort key order: ascending when `true` or `None`, descending when `false`.
    pub scan_index_forward: Option<bool>,
    /// Maximum number of items to return, across every page.
    pub limit: Option<u32>,
    /// Whether to use a strongly consistent read.
    pub consistent_read: bool,
    /// Continuation key to resume from; an empty map means no cursor.
    pub cursor: Option<common::Item>,
}

/// Items of a query with the key to resume from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryPage<T = common::Item> {
    /// The items, in sort key order.
    pub items: Vec<T>,
    /// The continuation key, `None` once the results are exhausted.
    pub cursor: Option<common::Item>,
}

/// Query operation.
///
/// [`Query::send`] follows continuation keys, one page at a time, until the limit is reached
/// or the store reports the end of the results. [`Query::send_page`] issues a single call for
/// caller-driven pagination.
///
/// ```rust,no_run
/// use dynamodb_kit::{common, read, transport};
///
/// # async fn example(transport: &dyn transport::Transport) -> dynamodb_kit::Result<()> {
/// let table = common::Table::new("users", common::key::KeySchema::new("pk", "sk"));
/// let query = read::query::Query {
///     condition: common::Expression::new("#pk = :pk")
///         .name("#pk", "pk")
///         .value(":pk", common::string_value("users#1")),
///     options: read::query::QueryOptions {
///         limit: Some(1),
///         ..Default::default()
///     },
/// };
/// let page = query.send(transport, &table).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    /// Key condition expression with its placeholders.
    pub condition: common::Expression,
    /// Projection, filter, index, order, limit, consistency and start cursor.
    pub options: QueryOptions,
}

impl Query {
    fn prepare(self, table: &common::Table) -> Result<(operation::query::QueryInput, Option<usize>)> {
        let limit = match self.options.limit {
            Some(limit) => match i32::try_from(limit) {
                Ok(wire) if wire > 0 => Some(wire),
                _ => return Err(Error::InvalidLimit(limit)),
            },
            None => None,
        };
        let key_condition = self.condition.expression.trim();
        if key_condition.is_empty() {
            return Err(Error::MalformedExpression(
                "empty key condition expression".to_string(),
            ));
        }
        let mut bindings = expression::Bindings::default();
        bindings.extend(&self.condition)?;
        let filter_expression = match &self.options.filter {
            Some(filter) => {
                bindings.extend(filter)?;
                Some(filter.expression.clone())
            }
            None => None,
        };
        let projection_expression = match &self.options.selection {
            Some(selection) => selection.render(&mut bindings),
            None => None,
        };
        let (expression_attribute_names, expression_attribute_values) = bindings.into_parts();
        let input = operation::query::QueryInput::builder()
            .table_name(table.name.clone())
            .set_index_name(self.options.index)
            .key_condition_expression(key_condition)
            .set_filter_expression(filter_expression)
            .set_projection_expression(projection_expression)
            .set_expression_attribute_names(expression_attribute_names)
            .set_expression_attribute_values(expression_attribute_values)
            .set_scan_index_forward(self.options.scan_index_forward)
            .set_consistent_read(self.options.consistent_read.then_some(true))
            .set_limit(limit)
            .set_exclusive_start_key(normalize_cursor(self.options.cursor))
            .build()?;
        Ok((input, limit.and_then(|limit| usize::try_from(limit).ok())))
    }

    /// Execute the query, following continuation keys.
    ///
    /// Dropping the returned future stops the pagination and discards the pages read so far.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.query", skip(transport), err)
    )]
    pub async fn send(
        self,
        transport: &dyn transport::Transport,
        table: &common::Table,
    ) -> Result<QueryPage> {
        let (mut input, limit) = self.prepare(table)?;
        let mut items = Vec::new();
        loop {
            let output = transport.query(input.clone()).await?;
            let cursor = normalize_cursor(output.last_evaluated_key);
            let Some(page) = output.items else {
                return Ok(QueryPage { items, cursor });
            };
            #[cfg(feature = "tracing")]
            tracing::debug!(items = page.len(), more = cursor.is_some(), "query page");
            items.extend(page);
            let remaining = match limit {
                Some(limit) if items.len() >= limit => return Ok(QueryPage { items, cursor }),
                Some(limit) => Some(limit - items.len()),
                None => None,
            };
            let Some(cursor) = cursor else {
                return Ok(QueryPage { items, cursor: None });
            };
            input.exclusive_start_key = Some(cursor);
            if let Some(remaining) = remaining {
                input.limit = i32::try_from(remaining).ok();
            }
        }
    }

    /// Execute a single query call.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.query_page", skip(transport), err)
    )]
    pub async fn send_page(
        self,
        transport: &dyn transport::Transport,
        table: &common::Table,
    ) -> Result<QueryPage> {
        let (input, _) = self.prepare(table)?;
        let output = transport.query(input).await?;
        Ok(QueryPage {
            items: output.items.unwrap_or_default(),
            cursor: normalize_cursor(output.last_evaluated_key),
        })
    }
}

fn normalize_cursor(cursor: Option<common::Item>) -> Option<common::Item> {
    cursor.filter(|cursor| !cursor.is_empty())
}
