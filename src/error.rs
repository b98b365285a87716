use crate::common;

use aws_sdk_dynamodb::{
    config::http::HttpResponse,
    error::{self, ProvideErrorMetadata, SdkError},
    operation::transact_write_items::TransactWriteItemsError,
};
use std::error::Error as StdError;

/// Boxed error raised by a [`Transport`](crate::transport::Transport) implementation.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailed";

/// Errors returned by every operation of this crate.
///
/// Validation errors are raised locally before any request is sent. Remote failures keep
/// conditional-check failures apart from every other transport error so that
/// read-modify-write loops can retry on conflict.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An update was requested without any fields or expression.
    #[error("fields required")]
    FieldsRequired,
    /// Every field of an update payload was a primary key attribute.
    #[error("no valid fields to update (only primary keys provided)")]
    NoUpdateFields,
    /// The update request rendered to an empty update expression.
    #[error("no update expression provided")]
    EmptyUpdateExpression,
    /// A key attribute is missing from a key or item.
    #[error("missing value for key attribute `{0}`")]
    MissingKey(String),
    /// A key attribute holds an empty or null value.
    #[error("empty value for key attribute `{0}`")]
    EmptyKey(String),
    /// A query limit of zero, or one that does not fit the wire type.
    #[error("invalid query limit {0}")]
    InvalidLimit(u32),
    /// A transaction was sent without entries.
    #[error("transaction has no entries")]
    EmptyTransaction,
    /// A transaction exceeded the per-call entry limit.
    #[error("transaction has {0} entries, at most {max} are allowed", max = crate::write::transact_write_items::MAX_TRANSACT_ITEMS)]
    TooManyTransactItems(usize),
    /// One placeholder was bound to two different names or values.
    #[error("placeholder `{placeholder}` is bound to both {existing} and {incoming}")]
    PlaceholderCollision {
        /// The placeholder token, e.g. `#version` or `:version`.
        placeholder: String,
        /// The binding already present.
        existing: String,
        /// The conflicting binding.
        incoming: String,
    },
    /// A raw expression could not be split into clauses.
    #[error("malformed expression: {0}")]
    MalformedExpression(String),
    /// The optimistic lock version cannot be incremented.
    #[error("version counter overflow")]
    VersionOverflow,
    /// A pagination cursor could not be encoded or decoded.
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
    /// Client options were rejected.
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
    /// Marshalling between records and attribute maps failed.
    #[error("serialization error: {0}")]
    Codec(#[from] serde_dynamo::Error),
    /// An SDK request could not be assembled.
    #[error("request builder error: {0}")]
    Build(#[from] error::BuildError),
    /// The remote store rejected a conditional write because its condition evaluated false.
    #[error("conditional check failed")]
    ConditionalCheckFailed,
    /// The remote store cancelled a transaction; one reason code per entry.
    #[error("transaction cancelled: [{}]", .reasons.join(", "))]
    TransactionCanceled {
        /// Cancellation reason codes in entry order (`None` for entries that passed).
        reasons: Vec<String>,
    },
    /// Some batch write requests were not applied.
    #[error("{} batch write requests failed", .failed.len())]
    BatchWrite {
        /// The items that were not written.
        failed: Vec<common::Item>,
        /// Transport errors raised by whole chunks.
        errors: Vec<Error>,
    },
    /// Any other failure of the underlying transport.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),
}

impl Error {
    /// Check whether this error is a conditional-check failure.
    ///
    /// True for a failed conditional put, update or delete and for a transaction cancelled
    /// because one of its conditions failed. Optimistic locking loops should re-read and retry
    /// on this condition only.
    pub fn is_conditional_check_failed(&self) -> bool {
        match self {
            Self::ConditionalCheckFailed => true,
            Self::TransactionCanceled { reasons } => reasons
                .iter()
                .any(|reason| reason == CONDITIONAL_CHECK_FAILED),
            _ => false,
        }
    }

    /// Check whether this error was detected locally, before any request was sent.
    pub fn is_validation_error(&self) -> bool {
        !matches!(
            self,
            Self::ConditionalCheckFailed
                | Self::TransactionCanceled { .. }
                | Self::BatchWrite { .. }
                | Self::Transport(_)
        )
    }

    /// Classify an SDK error, keeping conditional-check failures recognizable.
    pub(crate) fn from_sdk<E>(err: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
    {
        let conditional = err
            .as_service_error()
            .and_then(|service| service.code())
            .is_some_and(|code| code == "ConditionalCheckFailedException");
        if conditional {
            Self::ConditionalCheckFailed
        } else {
            Self::Transport(Box::new(err))
        }
    }

    pub(crate) fn from_transact_sdk(err: SdkError<TransactWriteItemsError, HttpResponse>) -> Self {
        if let Some(TransactWriteItemsError::TransactionCanceledException(canceled)) =
            err.as_service_error()
        {
            let reasons = canceled
                .cancellation_reasons
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(|reason| reason.code().unwrap_or("None").to_string())
                .collect();
            return Self::TransactionCanceled { reasons };
        }
        Self::from_sdk(err)
    }
}
