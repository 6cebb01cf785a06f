//! Error types for the WarpGrid host inventory.

use thiserror::Error;

/// Result type alias for inventory operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors raised by the inventory store and directory queries.
///
/// redb failures are flattened to strings: callers only report them. Record
/// codec failures keep the table and key so a corrupt row can be found.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open inventory database: {0}")]
    Open(String),

    #[error("inventory transaction failed: {0}")]
    Transaction(String),

    #[error("inventory table unavailable: {0}")]
    Table(String),

    #[error("inventory storage error: {0}")]
    Storage(String),

    #[error("failed to encode {table} record `{key}`")]
    Encode {
        table: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt {table} record `{key}`")]
    Decode {
        table: String,
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Host names form the prefix of composite keys and may not contain `:`.
    #[error("invalid host name `{0}`: `:` is reserved as the key separator")]
    InvalidHostName(String),

    #[error("aggregate not found: {0}")]
    AggregateNotFound(String),
}
