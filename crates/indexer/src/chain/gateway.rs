//! The chain gateway capability: everything the pipeline needs from a node.

use alloy::primitives::{Address, B256, U256};
use alloy::transports::TransportError;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::storage::StorageDiffInput;

/// Errors from remote chain access.
#[derive(Error, Debug)]
pub enum ChainError {
    /// The underlying RPC transport failed.
    #[error("rpc transport error: {0}")]
    Rpc(#[from] TransportError),

    /// The node has no header at the requested height.
    #[error("header not found for block {block_number}")]
    HeaderNotFound {
        /// The requested block number.
        block_number: i64,
    },

    /// A referenced transaction could not be fetched.
    #[error("transaction not found: {hash}")]
    TransactionNotFound {
        /// The requested transaction hash.
        hash: B256,
    },

    /// This gateway cannot stream storage diffs.
    #[error("storage diff subscription is not supported by this gateway")]
    DiffSubscriptionUnsupported,

    /// A response could not be interpreted.
    #[error("malformed node response: {0}")]
    MalformedResponse(String),
}

/// Identity of the node instance supplying chain data.
///
/// The fingerprint keys every header row so that datasets from different
/// nodes never bleed into each other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Opaque node fingerprint, stable across reconnects to the same node.
    pub fingerprint: String,
    /// Network id reported by the node.
    pub network_id: u64,
    /// Genesis block hash.
    pub genesis_hash: B256,
    /// Client version string.
    pub client_version: String,
}

/// A block header as fetched from the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    /// Block number.
    pub block_number: i64,
    /// Block hash.
    pub hash: B256,
    /// Block timestamp (unix seconds).
    pub timestamp: i64,
    /// Raw header encoding as returned by the node.
    pub raw: Vec<u8>,
}

/// A log as fetched from the node, before persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedLog {
    /// Emitting contract address.
    pub address: Address,
    /// Log topics, 0 to 4 entries.
    pub topics: Vec<B256>,
    /// ABI-encoded log payload.
    pub data: Vec<u8>,
    /// Hash of the transaction that emitted the log.
    pub tx_hash: Option<B256>,
    /// Index of that transaction within its block.
    pub tx_index: u64,
    /// Index of the log within the block.
    pub log_index: u64,
    /// Raw log encoding as returned by the node.
    pub raw: Vec<u8>,
}

/// A transaction as fetched from the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Transaction hash.
    pub hash: B256,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas price in wei.
    pub gas_price: u128,
    /// Call input data.
    pub input_data: Vec<u8>,
    /// Sender nonce.
    pub nonce: u64,
    /// Raw transaction encoding as returned by the node.
    pub raw: Vec<u8>,
    /// Sender address.
    pub tx_from: Address,
    /// Index within the block.
    pub tx_index: u64,
    /// Recipient address, absent for contract creation.
    pub tx_to: Option<Address>,
    /// Transferred value in wei.
    pub value: U256,
}

/// Abstract access to the remote chain node.
///
/// The pipeline consumes this capability set and never a concrete RPC
/// client; tests supply [`FakeGateway`](crate::chain::FakeGateway).
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Identity of the node supplying data.
    async fn node_info(&self) -> Result<NodeInfo, ChainError>;

    /// Current head block number.
    async fn head_block_number(&self) -> Result<i64, ChainError>;

    /// Fetch the header at a block number.
    async fn header_by_number(&self, block_number: i64) -> Result<RawHeader, ChainError>;

    /// Fetch logs matching an address/topic filter within one block.
    async fn logs(
        &self,
        addresses: &[Address],
        topics: &[B256],
        block_hash: B256,
    ) -> Result<Vec<FetchedLog>, ChainError>;

    /// Fetch transactions by hash.
    async fn transactions(
        &self,
        tx_hashes: &[B256],
    ) -> Result<Vec<TransactionRecord>, ChainError>;

    /// Subscribe to a stream of contract storage diffs.
    ///
    /// Optional capability; gateways without a streaming endpoint return
    /// [`ChainError::DiffSubscriptionUnsupported`].
    async fn subscribe_storage_diffs(
        &self,
    ) -> Result<mpsc::Receiver<StorageDiffInput>, ChainError> {
        Err(ChainError::DiffSubscriptionUnsupported)
    }
}
