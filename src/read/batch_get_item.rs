use crate::common::{self, key};
use crate::error::Result;
use crate::{read, transport};

use aws_sdk_dynamodb::{operation, types};

/// Maximum number of keys in one batch get call.
pub const GET_CHUNK_SIZE: usize = 100;

/// Batch get item operation.
///
/// Keys are sent in chunks of [`GET_CHUNK_SIZE`]. Within a chunk, keys the store leaves
/// unprocessed are re-submitted until none remain. Items come back in no particular order and
/// missing keys are skipped.
///
/// ```rust,no_run
/// use dynamodb_kit::{common, read, transport};
///
/// # async fn example(transport: &dyn transport::Transport) -> dynamodb_kit::Result<()> {
/// let table = common::Table::new("users", common::key::KeySchema::new("pk", "sk"));
/// let batch_get = read::batch_get_item::BatchGetItem {
///     keys: vec![common::key::Key::new(
///         common::string_value("users#1"),
///         common::string_value("profile"),
///     )],
///     ..Default::default()
/// };
/// let items = batch_get.send(transport, &table).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetItem {
    /// The primary keys of the items to retrieve.
    pub keys: Vec<key::Key>,
    /// Consistency and projection, applied to every chunk.
    pub options: read::common::ReadOptions,
}

impl BatchGetItem {
    fn prepare(
        self,
        table: &common::Table,
    ) -> Result<(Vec<Vec<common::Item>>, read::common::ReadInput)> {
        let keys = self
            .keys
            .into_iter()
            .map(|key| table.keys.checked_key_map(key))
            .collect::<Result<Vec<_>>>()?;
        let read_operation = (&self.options).try_into()?;
        Ok((common::chunks(keys, GET_CHUNK_SIZE), read_operation))
    }

    /// Execute the batch get item operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_kit.batch_get_item",
            skip_all,
            fields(table = %table.name, keys = self.keys.len()),
            err
        )
    )]
    pub async fn send(
        self,
        transport: &dyn transport::Transport,
        table: &common::Table,
    ) -> Result<Vec<common::Item>> {
        let (chunks, read_operation) = self.prepare(table)?;
        let mut items = Vec::new();
        for chunk in chunks {
            let mut pending = chunk;
            while !pending.is_empty() {
                let builder = types::KeysAndAttributes::builder().set_keys(Some(pending));
                let keys_and_attributes =
                    crate::apply_read_options!(builder, read_operation.clone()).build()?;
                let input = operation::batch_get_item::BatchGetItemInput::builder()
                    .request_items(table.name.clone(), keys_and_attributes)
                    .build()?;
                let output = transport.batch_get_item(input).await?;
                items.extend(
                    output
                        .responses
                        .and_then(|mut responses| responses.remove(&table.name))
                        .unwrap_or_default(),
                );
                pending = output
                    .unprocessed_keys
                    .and_then(|mut unprocessed| unprocessed.remove(&table.name))
                    .map(|keys_and_attributes| keys_and_attributes.keys)
                    .unwrap_or_default();
                #[cfg(feature = "tracing")]
                if !pending.is_empty() {
                    tracing::debug!(unprocessed = pending.len(), "re-submitting unprocessed keys");
                }
            }
        }
        Ok(items)
    }
}
