//! Transformer capabilities: the pluggable consumers of persisted logs and
//! storage diffs.

use std::fmt;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;

use chainsift_core::{hash_contract_address, DecodedValue, SlotMetadata};

use crate::chain::FetchedLog;
use crate::storage::{HeaderRecord, StorageDiffInput};
use crate::storage_diffs::KeysLookup;

pub mod dispatcher;
pub mod recording;

pub use dispatcher::Dispatcher;

/// Stable identifier of a transformer, used as the ledger key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransformerId(String);

impl TransformerId {
    /// Create an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        TransformerId(id.into())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransformerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an event transformer watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventConfig {
    /// Contract addresses emitting the watched event.
    pub contract_addresses: Vec<Address>,

    /// Event signature topic.
    pub topic0: B256,

    /// First block the transformer cares about.
    pub starting_block: i64,
}

/// Consumer of a persisted log.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Turn one log into domain rows.
    async fn execute(&self, header: &HeaderRecord, log: &FetchedLog) -> anyhow::Result<()>;
}

/// Consumer of a decoded storage diff.
#[async_trait]
pub trait StorageHandler: Send + Sync {
    /// Turn one decoded slot mutation into domain rows.
    async fn execute(
        &self,
        diff_id: i64,
        diff: &StorageDiffInput,
        metadata: &SlotMetadata,
        decoded: &DecodedValue,
    ) -> anyhow::Result<()>;
}

/// An event transformer: a watch signature plus its handler.
pub struct EventTransformer {
    /// Ledger identifier.
    pub id: TransformerId,
    /// Watch signature.
    pub config: EventConfig,
    /// The domain consumer.
    pub handler: Box<dyn EventHandler>,
}

impl EventTransformer {
    /// Bundle a watch signature with its handler.
    pub fn new(id: TransformerId, config: EventConfig, handler: Box<dyn EventHandler>) -> Self {
        Self {
            id,
            config,
            handler,
        }
    }
}

/// A storage transformer: a contract address, its keys lookup, and a handler.
pub struct StorageTransformer {
    /// Ledger identifier.
    pub id: TransformerId,
    /// Watched contract address.
    pub contract_address: Address,
    /// `keccak256(contract_address)`, the form diffs arrive keyed by.
    pub hashed_contract_address: B256,
    /// Slot key resolution cache for this contract.
    pub keys_lookup: KeysLookup,
    /// The domain consumer.
    pub handler: Box<dyn StorageHandler>,
}

impl StorageTransformer {
    /// Bundle a contract with its keys lookup and handler; the hashed
    /// address is derived here.
    pub fn new(
        id: TransformerId,
        contract_address: Address,
        keys_lookup: KeysLookup,
        handler: Box<dyn StorageHandler>,
    ) -> Self {
        let hashed_contract_address = hash_contract_address(&contract_address);
        Self {
            id,
            contract_address,
            hashed_contract_address,
            keys_lookup,
            handler,
        }
    }
}

/// A registered transformer, event- or storage-flavored.
pub enum Transformer {
    /// Watches contract events by address and topic.
    Event(EventTransformer),
    /// Watches contract storage by hashed address.
    Storage(StorageTransformer),
}
