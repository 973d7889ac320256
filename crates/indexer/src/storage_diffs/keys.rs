//! Lazy slot-key resolution: mapping storage keys to their declared meaning.

use std::collections::HashMap;

use alloy::primitives::B256;
use async_trait::async_trait;
use tracing::debug;

use chainsift_core::{keccak256, SlotMetadata};

use crate::error::IndexerError;
use crate::storage::Storage;

/// Produces the full key-to-metadata mapping for one contract.
///
/// Loaders typically iterate domain state (e.g. every known vault) to derive
/// the mapping-slot hashes a contract can touch, so new keys appear between
/// loads.
#[async_trait]
pub trait KeysLoader: Send + Sync {
    /// Produce the complete current mapping.
    async fn load(&self) -> anyhow::Result<HashMap<B256, SlotMetadata>>;

    /// Hand the loader a storage handle for loaders that read domain state.
    fn set_storage(&mut self, storage: Storage) {
        let _ = storage;
    }
}

/// A loader over a fixed mapping, for static layouts and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticKeysLoader {
    mappings: HashMap<B256, SlotMetadata>,
}

impl StaticKeysLoader {
    /// A loader that always returns the given mapping.
    pub fn new(mappings: HashMap<B256, SlotMetadata>) -> Self {
        Self { mappings }
    }
}

#[async_trait]
impl KeysLoader for StaticKeysLoader {
    async fn load(&self) -> anyhow::Result<HashMap<B256, SlotMetadata>> {
        Ok(self.mappings.clone())
    }
}

/// In-memory cache from storage key to slot metadata.
///
/// Keys are resolvable in both their raw and keccak-hashed forms; the hashed
/// index is precomputed on load so hashed lookups stay O(1). A miss triggers
/// one loader refresh before failing, which is how newly minted domain
/// objects become resolvable without a restart.
pub struct KeysLookup {
    loader: Box<dyn KeysLoader>,
    mappings: HashMap<B256, SlotMetadata>,
    hashed_index: HashMap<B256, B256>,
    loaded: bool,
}

impl KeysLookup {
    /// A lookup over the given loader; nothing is loaded until first use.
    pub fn new(loader: Box<dyn KeysLoader>) -> Self {
        Self {
            loader,
            mappings: HashMap::new(),
            hashed_index: HashMap::new(),
            loaded: false,
        }
    }

    /// A lookup that resolves nothing, for tests and inert transformers.
    pub fn empty() -> Self {
        Self::new(Box::new(StaticKeysLoader::default()))
    }

    /// Forward a storage handle to the loader.
    pub fn set_storage(&mut self, storage: Storage) {
        self.loader.set_storage(storage);
    }

    /// Resolve a storage key, raw or hashed, to its metadata.
    ///
    /// A key matching both forms resolves to the raw entry. On a miss the
    /// loader is refreshed once and the match retried; a second miss is
    /// [`IndexerError::StorageKeyNotFound`].
    pub async fn lookup(&mut self, key: B256) -> Result<SlotMetadata, IndexerError> {
        if !self.loaded {
            self.refresh().await?;
        }
        if let Some(metadata) = self.resolve(key) {
            return Ok(metadata);
        }

        debug!(component = "keys_lookup", %key, "cache miss, refreshing");
        self.refresh().await?;
        self.resolve(key)
            .ok_or(IndexerError::StorageKeyNotFound { key })
    }

    fn resolve(&self, key: B256) -> Option<SlotMetadata> {
        if let Some(metadata) = self.mappings.get(&key) {
            return Some(metadata.clone());
        }
        self.hashed_index
            .get(&key)
            .and_then(|raw| self.mappings.get(raw))
            .cloned()
    }

    async fn refresh(&mut self) -> Result<(), IndexerError> {
        let mappings = self
            .loader
            .load()
            .await
            .map_err(IndexerError::KeysLoader)?;

        self.hashed_index = mappings
            .keys()
            .map(|raw| (keccak256(raw.as_slice()), *raw))
            .collect();
        self.mappings = mappings;
        self.loaded = true;
        Ok(())
    }
}
