//! Client facade over one table.
//!
//! [`Client`] wraps the request builders of [`read`](crate::read) and
//! [`write`](crate::write) with record (de)serialization through `serde_dynamo`, so callers
//! work with their own types instead of attribute maps.

use crate::common::{self, key};
use crate::error::{Error, Result};
use crate::{read, transport, write};

use aws_config::{BehaviorVersion, Region};
use serde::{Serialize, de::DeserializeOwned};
use serde_dynamo::{from_item, from_items, to_item};
use std::{fmt, sync::Arc};

/// Callback applied to the SDK configuration before the client is built.
///
/// This is the hook point for request middleware, e.g. pushing an interceptor.
pub type ConfigHook = Box<dyn FnOnce(&mut aws_sdk_dynamodb::config::Builder) + Send>;

const CREDENTIALS_PROVIDER: &str = "dynamodb-kit";

/// A non-production target reached with static credentials.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Endpoint {
    /// The endpoint URL, e.g. `http://localhost:8000`.
    pub url: String,
    /// The access key id.
    pub access_key_id: String,
    /// The secret access key.
    pub secret_access_key: String,
}

/// Options of [`Client::connect`].
///
/// ```rust
/// use dynamodb_kit::client;
///
/// let options = client::ClientOptions {
///     table_name: "users".to_string(),
///     region: Some("eu-west-1".to_string()),
///     endpoint: Some(client::Endpoint {
///         url: "http://localhost:8000".to_string(),
///         access_key_id: "local".to_string(),
///         secret_access_key: "local".to_string(),
///     }),
///     ..Default::default()
/// };
/// assert_eq!(options.partition_key_name, "pk");
/// ```
pub struct ClientOptions {
    /// The table every operation targets.
    pub table_name: String,
    /// The region; the default provider chain decides when `None`.
    pub region: Option<String>,
    /// The partition key attribute name.
    pub partition_key_name: String,
    /// The sort key attribute name.
    pub sort_key_name: String,
    /// Custom endpoint with static credentials.
    pub endpoint: Option<Endpoint>,
    /// Callbacks applied, in order, to the SDK configuration.
    pub config_hooks: Vec<ConfigHook>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            table_name: String::new(),
            region: None,
            partition_key_name: "pk".to_string(),
            sort_key_name: "sk".to_string(),
            endpoint: None,
            config_hooks: Vec::new(),
        }
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("table_name", &self.table_name)
            .field("region", &self.region)
            .field("partition_key_name", &self.partition_key_name)
            .field("sort_key_name", &self.sort_key_name)
            .field("endpoint", &self.endpoint.as_ref().map(|endpoint| &endpoint.url))
            .field("config_hooks", &self.config_hooks.len())
            .finish()
    }
}

impl ClientOptions {
    fn table(&self) -> Result<common::Table> {
        for (option, value) in [
            ("table name", &self.table_name),
            ("partition key name", &self.partition_key_name),
            ("sort key name", &self.sort_key_name),
        ] {
            if value.trim().is_empty() {
                return Err(Error::InvalidConfig(format!("empty {option}")));
            }
        }
        if self.partition_key_name == self.sort_key_name {
            return Err(Error::InvalidConfig(format!(
                "partition and sort key share the name `{}`",
                self.sort_key_name
            )));
        }
        Ok(common::Table::new(
            self.table_name.clone(),
            key::KeySchema::new(self.partition_key_name.clone(), self.sort_key_name.clone()),
        ))
    }
}

/// Typed operations on one table.
///
/// Cheap to clone and safe to share between tasks: the table configuration is immutable
/// and every call is independent.
///
/// ```no_run
/// use dynamodb_kit::{Client, common, transport};
/// use serde::{Deserialize, Serialize};
/// use std::sync::Arc;
///
/// #[derive(Debug, Deserialize, PartialEq, Serialize)]
/// struct User {
///     name: String,
/// }
///
/// # async fn example(transport: Arc<dyn transport::Transport>) -> dynamodb_kit::Result<()> {
/// let table = common::Table::new("users", common::key::KeySchema::new("pk", "sk"));
/// let client = Client::new(transport, table);
/// let key = common::key::Key::new(
///     common::string_value("users#1"),
///     common::string_value("profile"),
/// );
/// let user = User { name: "A".to_string() };
/// client.put_item(key.clone(), &user, Default::default()).await?;
/// let found: Option<User> = client.get_item(key, Default::default()).await?;
/// assert_eq!(found, Some(user));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    table: Arc<common::Table>,
    transport: Arc<dyn transport::Transport>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Build a client over any transport.
    pub fn new(transport: Arc<dyn transport::Transport>, table: common::Table) -> Self {
        Self {
            table: Arc::new(table),
            transport,
        }
    }

    /// Load the SDK configuration and build a client backed by [`aws_sdk_dynamodb::Client`].
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.connect", skip_all, fields(table = %options.table_name), err)
    )]
    pub async fn connect(options: ClientOptions) -> Result<Self> {
        let table = options.table()?;
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = options.region {
            loader = loader.region(Region::new(region));
        }
        if let Some(endpoint) = options.endpoint {
            let credentials = aws_sdk_dynamodb::config::Credentials::new(
                endpoint.access_key_id,
                endpoint.secret_access_key,
                None,
                None,
                CREDENTIALS_PROVIDER,
            );
            loader = loader
                .endpoint_url(endpoint.url)
                .credentials_provider(credentials);
        }
        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        for hook in options.config_hooks {
            hook(&mut builder);
        }
        let client = aws_sdk_dynamodb::Client::from_conf(builder.build());
        Ok(Self::new(Arc::new(client), table))
    }

    /// The table configuration.
    pub fn table(&self) -> &common::Table {
        &self.table
    }

    /// The underlying transport.
    pub fn transport(&self) -> &dyn transport::Transport {
        self.transport.as_ref()
    }

    /// The key map of an item, using the configured key attribute names.
    pub fn keys(
        &self,
        partition: aws_sdk_dynamodb::types::AttributeValue,
        sort: aws_sdk_dynamodb::types::AttributeValue,
    ) -> common::Item {
        self.table.keys.key_map(key::Key::new(partition, sort))
    }

    /// Read one record; `None` when no item has this key.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.client.get_item", skip(self), err)
    )]
    pub async fn get_item<T: DeserializeOwned>(
        &self,
        key: key::Key,
        options: read::common::ReadOptions,
    ) -> Result<Option<T>> {
        let get_item = read::get_item::GetItem { key, options };
        match get_item.send(self.transport(), &self.table).await? {
            Some(item) => Ok(Some(from_item(item)?)),
            None => Ok(None),
        }
    }

    /// Write one whole record under `key`.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.client.put_item", skip(self, item), err)
    )]
    pub async fn put_item<T: Serialize>(
        &self,
        key: key::Key,
        item: &T,
        options: write::common::WriteOptions,
    ) -> Result<()> {
        let put_item = write::put_item::PutItem {
            key,
            item: to_item(item)?,
            options,
        };
        put_item.send(self.transport(), &self.table).await?;
        Ok(())
    }

    /// Delete one item; deleting a missing item succeeds.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.client.delete_item", skip(self), err)
    )]
    pub async fn delete_item(
        &self,
        key: key::Key,
        options: write::common::WriteOptions,
    ) -> Result<()> {
        let delete_item = write::delete_item::DeleteItem { key, options };
        delete_item.send(self.transport(), &self.table).await?;
        Ok(())
    }

    /// Assign every attribute of `fields`, except the key attributes, to the item.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.client.update_item", skip(self, fields), err)
    )]
    pub async fn update_item<T: Serialize>(
        &self,
        key: key::Key,
        fields: &T,
        options: write::common::WriteOptions,
    ) -> Result<()> {
        let update_item = write::update_item::UpdateItem::new(key)
            .fields(fields)?
            .options(options);
        self.update_item_with(update_item).await
    }

    /// Send a fully configured update, e.g. one carrying a raw expression.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.client.update_item_with", skip_all, err)
    )]
    pub async fn update_item_with(&self, update_item: write::update_item::UpdateItem) -> Result<()> {
        update_item.send(self.transport(), &self.table).await?;
        Ok(())
    }

    /// Run a query to completion or to its limit, following continuation keys.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.client.query", skip(self), err)
    )]
    pub async fn query<T: DeserializeOwned>(
        &self,
        query: read::query::Query,
    ) -> Result<read::query::QueryPage<T>> {
        let page = query.send(self.transport(), &self.table).await?;
        Ok(read::query::QueryPage {
            items: from_items(page.items)?,
            cursor: page.cursor,
        })
    }

    /// Read a single page of a query.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_kit.client.query_page", skip(self), err)
    )]
    pub async fn query_page<T: DeserializeOwned>(
        &self,
        query: read::query::Query,
    ) -> Result<read::query::QueryPage<T>> {
        let page = query.send_page(self.transport(), &self.table).await?;
        Ok(read::query::QueryPage {
            items: from_items(page.items)?,
            cursor: page.cursor,
        })
    }

    /// Read many records by key, in no particular order; missing keys are skipped.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_kit.client.batch_get_items",
            skip_all,
            fields(keys = keys.len()),
            err
        )
    )]
    pub async fn batch_get_items<T: DeserializeOwned>(
        &self,
        keys: Vec<key::Key>,
        options: read::common::ReadOptions,
    ) -> Result<Vec<T>> {
        let batch_get = read::batch_get_item::BatchGetItem { keys, options };
        let items = batch_get.send(self.transport(), &self.table).await?;
        Ok(from_items(items)?)
    }

    /// Write many records; each must carry both key attributes.
    ///
    /// Every chunk is submitted. Any request left unwritten is reported through
    /// [`Error::BatchWrite`].
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_kit.client.batch_write_items",
            skip_all,
            fields(items = items.len()),
            err
        )
    )]
    pub async fn batch_write_items<T: Serialize>(&self, items: &[T]) -> Result<()> {
        let requests = items
            .iter()
            .map(|item| Ok(write::batch_write_item::BatchWriteItemRequest::PutItem(to_item(item)?)))
            .collect::<Result<Vec<_>>>()?;
        let batch_write = write::batch_write_item::BatchWriteItem { requests };
        batch_write
            .send(self.transport(), &self.table)
            .await?
            .into_result()
    }

    /// Delete many items, returning the keys that were not deleted.
    ///
    /// Keys of a chunk rejected by the transport and keys left unprocessed by the store are
    /// both returned; nothing is retried.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_kit.client.batch_delete_items",
            skip_all,
            fields(keys = keys.len()),
            err
        )
    )]
    pub async fn batch_delete_items(&self, keys: Vec<key::Key>) -> Result<Vec<key::Key>> {
        let requests = keys
            .into_iter()
            .map(write::batch_write_item::BatchWriteItemRequest::DeleteItem)
            .collect();
        let batch_write = write::batch_write_item::BatchWriteItem { requests };
        let outcome = batch_write.send(self.transport(), &self.table).await?;
        Ok(outcome.failed_keys(&self.table.keys))
    }

    /// Apply the entries atomically.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "dynamodb_kit.client.transact_write_items",
            skip_all,
            fields(entries = entries.len()),
            err
        )
    )]
    pub async fn transact_write_items(
        &self,
        entries: Vec<write::transact_write_items::TransactWriteItem>,
    ) -> Result<()> {
        let transaction = write::transact_write_items::TransactWriteItems { entries };
        transaction.send(self.transport(), &self.table).await?;
        Ok(())
    }

    /// Put every record atomically.
    pub async fn transact_put_items<T: Serialize>(
        &self,
        puts: &[write::transact_write_items::TransactPut<T>],
    ) -> Result<()> {
        let entries = puts
            .iter()
            .map(|put| {
                write::transact_write_items::TransactWriteItem::put(
                    put.key.clone(),
                    &put.item,
                    write::common::WriteOptions::default(),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        self.transact_write_items(entries).await
    }

    /// Delete every item atomically.
    pub async fn transact_delete_items(&self, keys: Vec<key::Key>) -> Result<()> {
        let entries = keys
            .into_iter()
            .map(|key| {
                write::transact_write_items::TransactWriteItem::delete(
                    key,
                    write::common::WriteOptions::default(),
                )
            })
            .collect();
        self.transact_write_items(entries).await
    }
}
