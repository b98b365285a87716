#![deny(missing_docs)]
#![deny(warnings)]

//! # DynamoDB Kit
//!
//! Typed item CRUD, batching, pagination, optimistic locking and transactions over a single
//! Amazon DynamoDB table.
//!
//! ## Overview
//!
//! The request builders of [`read`] and [`write`] assemble complete SDK requests:
//! - key maps built with the configured partition and sort key names
//! - update and condition expressions with collision-checked placeholders
//! - optimistic locking on a numeric version attribute
//! - batch reads and writes split to the per-call limits
//! - queries that follow continuation keys until a limit is reached
//!
//! Every request goes through the [`transport::Transport`] trait, implemented for
//! [`aws_sdk_dynamodb::Client`] and, with the `testing` feature, by `testing::MemoryTransport`.
//! [`Client`] ties the two together with serde records.
//!
//! ## Quick Example
//!
//! ```no_run
//! use dynamodb_kit::{Client, client, common, write};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize, Serialize)]
//! struct Account {
//!     owner: String,
//!     balance: i64,
//! }
//!
//! # async fn example() -> dynamodb_kit::Result<()> {
//! let client = Client::connect(client::ClientOptions {
//!     table_name: "accounts".to_string(),
//!     ..Default::default()
//! })
//! .await?;
//! let key = common::key::Key::new(
//!     common::string_value("accounts#1"),
//!     common::string_value("profile"),
//! );
//! let account: Option<Account> = client.get_item(key.clone(), Default::default()).await?;
//! if let Some(account) = account {
//!     // "SET #balance = :balance, #owner = :owner, #version = :newVersion"
//!     client
//!         .update_item(
//!             key,
//!             &account,
//!             write::common::WriteOptions::default().lock(common::lock::OptimisticLock::new("version", 1)),
//!         )
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `testing`: an in-memory transport evaluating expressions locally, with fault injection
//!   for batch and transaction paths.
//! - `tracing`: instrument every operation with [`tracing`](https://docs.rs/tracing) spans
//!   and log partial batch failures.

/// Client facade bound to one table.
pub mod client;

/// Table configuration, keys, expressions, optimistic locking and attribute selection.
pub mod common;

mod error;

/// Read operations: get, query, batch get and cursors.
pub mod read;

/// In-memory transport for tests and local development.
#[cfg(feature = "testing")]
pub mod testing;

/// The transport trait between request builders and the remote store.
pub mod transport;

/// Write operations: put, update, delete, batch write and transactions.
pub mod write;

pub use client::Client;
pub use error::{BoxError, Error, Result};
