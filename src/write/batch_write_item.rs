use crate::common::{self, key};
use crate::error::{Error, Result};
use crate::transport;

use aws_sdk_dynamodb::{operation, types};

/// Maximum number of requests in one batch write call.
pub const WRITE_CHUNK_SIZE: usize = 25;

/// A single request within a batch write operation.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchWriteItemRequest {
    /// Put a whole item; it must carry both key attributes.
    PutItem(common::Item),
    /// Delete the item with this key.
    DeleteItem(key::Key),
}

impl BatchWriteItemRequest {
    fn into_write_request(self, keys: &key::KeySchema) -> Result<types::WriteRequest> {
        let builder = match self {
            Self::PutItem(item) => {
                keys.validate(&item)?;
                let put_request = types::PutRequest::builder().set_item(Some(item)).build()?;
                types::WriteRequest::builder().put_request(put_request)
            }
            Self::DeleteItem(key) => {
                let key = keys.checked_key_map(key)?;
                let delete_request = types::DeleteRequest::builder().set_key(Some(key)).build()?;
                types::WriteRequest::builder().delete_request(delete_request)
            }
        };
        Ok(builder.build())
    }
}

/// Requests that were not applied by a batch write.
///
/// A chunk rejected by the transport fails as a whole and its error is kept in `errors`;
/// items the store reported as unprocessed fail individually. Nothing is retried.
#[derive(Debug, Default)]
pub struct BatchWriteOutcome {
    /// The requests that were not applied, in submission order per chunk.
    pub failed: Vec<types::WriteRequest>,
    /// One error per chunk rejected by the transport.
    pub errors: Vec<Error>,
}

impl BatchWriteOutcome {
    /// Whether every request was applied.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.errors.is_empty()
    }

    /// The keys of the failed delete requests.
    pub fn failed_keys(&self, keys: &key::KeySchema) -> Vec<key::Key> {
        self.failed
            .iter()
            .filter_map(|request| request.delete_request.as_ref())
            .filter_map(|delete_request| keys.key_of(&delete_request.key))
            .collect()
    }

    /// The attribute maps of every failed request: items for puts, keys for deletes.
    pub fn failed_items(&self) -> Vec<common::Item> {
        self.failed
            .iter()
            .filter_map(|request| match (&request.put_request, &request.delete_request) {
                (Some(put_request), _) => Some(put_request.item.clone()),
                (None, Some(delete_request)) => Some(delete_request.key.clone()),
                (None, None) => None,
            })
            .collect()
    }

    /// Turn any failure into [`Error::BatchWrite`].
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            return Ok(());
        }
        Err(Error::BatchWrite {
            failed: self.failed_items(),
            errors: self.errors,
        })
    }
}

/// Batch write item operation.
///
/// Requests are validated up front, then sent in chunks of [`WRITE_CHUNK_SIZE`], one chunk
/// at a time. Every chunk is submitted even if an earlier one failed.
///
/// ```rust,no_run
/// use dynamodb_kit::{common, transport, write};
///
/// # async fn example(transport: &dyn transport::Transport) -> dynamodb_kit::Result<()> {
/// let table = common::Table::new("users", common::key::KeySchema::new("pk", "sk"));
/// let batch_write = write::batch_write_item::BatchWriteItem {
///     requests: vec![write::batch_write_item::BatchWriteItemRequest::DeleteItem(
///         common::key::Key::new(
///             common::string_value("users#1"),
///             common::string_value("profile"),
///         ),
///     )],
/// };
/// let outcome = batch_write.send(transport, &table).await?;
/// assert!(outcome.is_success());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchWriteItem {
    /// The requests to apply.
    pub requests: Vec<BatchWriteItemRequest>,
}

impl BatchWriteItem {
    pub(crate) fn prepare(self, table: &common::Table) -> Result<Vec<Vec<types::WriteRequest>>> {
        let requests = self
            .requests
            .into_iter()
            .map(|request| request.into_write_request(&table.keys))
            .collect::<Result<Vec<_>>>()?;
        Ok(common::chunks(requests, WRITE_CHUNK_SIZE))
    }

    /// Execute the batch write item operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_kit.batch_write_item",
            skip_all,
            fields(table = %table.name, requests = self.requests.len()),
            err
        )
    )]
    pub async fn send(
        self,
        transport: &dyn transport::Transport,
        table: &common::Table,
    ) -> Result<BatchWriteOutcome> {
        let chunks = self.prepare(table)?;
        let mut outcome = BatchWriteOutcome::default();
        for chunk in chunks {
            let input = operation::batch_write_item::BatchWriteItemInput::builder()
                .request_items(table.name.clone(), chunk.clone())
                .build()?;
            match transport.batch_write_item(input).await {
                Ok(output) => {
                    let unprocessed = output
                        .unprocessed_items
                        .and_then(|mut unprocessed| unprocessed.remove(&table.name))
                        .unwrap_or_default();
                    #[cfg(feature = "tracing")]
                    if !unprocessed.is_empty() {
                        tracing::warn!(
                            unprocessed = unprocessed.len(),
                            "batch write left requests unprocessed"
                        );
                    }
                    outcome.failed.extend(unprocessed);
                }
                Err(err) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %err, requests = chunk.len(), "batch write chunk failed");
                    outcome.failed.extend(chunk);
                    outcome.errors.push(err);
                }
            }
        }
        Ok(outcome)
    }
}
