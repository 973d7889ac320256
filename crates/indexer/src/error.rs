//! Error taxonomy for the indexing pipeline.

use alloy::primitives::B256;
use thiserror::Error;

use crate::chain::ChainError;
use crate::transform::TransformerId;

/// Errors surfaced by the extraction and dispatch pipeline.
#[derive(Error, Debug)]
pub enum IndexerError {
    /// The log extractor was invoked with no registered contract addresses.
    #[error("no watched addresses configured in the log extractor")]
    NoWatchedAddresses,

    /// A remote chain call failed.
    #[error("chain gateway error: {0}")]
    ChainGateway(#[from] ChainError),

    /// A database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A storage key missed the lookup cache even after a loader refresh.
    #[error("storage key not found: {key}")]
    StorageKeyNotFound {
        /// The key that could not be resolved, raw form as received.
        key: B256,
    },

    /// The keys loader failed to produce a mapping.
    #[error("keys loader failed: {0}")]
    KeysLoader(#[source] anyhow::Error),

    /// A storage value failed to decode against its slot metadata.
    #[error("decode error: {0}")]
    Decode(#[from] chainsift_core::CoreError),

    /// A transformer's execute hook failed.
    #[error("transformer {id} failed: {source}")]
    Transformer {
        /// The failing transformer.
        id: TransformerId,
        /// The underlying failure.
        #[source]
        source: anyhow::Error,
    },

    /// A storage-diff source line could not be parsed.
    #[error("malformed storage diff row: {reason}")]
    DiffParse {
        /// Why the row was rejected.
        reason: String,
    },

    /// The supervisor exceeded its unexpected-error budget.
    #[error("unexpected error budget exhausted after {errors} errors")]
    ErrorBudgetExhausted {
        /// Number of unexpected errors observed.
        errors: i64,
    },
}

impl IndexerError {
    /// Whether this error counts against the supervisor's unexpected-error
    /// budget. `NoWatchedAddresses` is a configuration condition surfaced to
    /// the caller, not an operational fault.
    pub fn counts_against_budget(&self) -> bool {
        !matches!(self, IndexerError::NoWatchedAddresses)
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, IndexerError>;
