//! Per-diff extraction: persist, resolve, decode, dispatch.

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use chainsift_core::decode;

use crate::error::{IndexerError, Result};
use crate::storage::{DiffOutcome, Storage, StorageDiffInput};
use crate::transform::StorageTransformer;

/// What happened to one diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffDisposition {
    /// Persisted, decoded, and handed to its transformer.
    Transformed,
    /// Already in the raw store; nothing else to do.
    Duplicate,
    /// Persisted, but no transformer watches this contract.
    Unwatched,
}

/// Result of draining the diff channel once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainOutcome {
    /// Diffs pulled from the channel.
    pub processed: usize,
    /// Diffs that failed (skipped, counted against the error budget).
    pub errors: usize,
}

/// Consumes raw storage diffs: persists each one, resolves its slot key,
/// decodes the value, and invokes the matching transformer.
///
/// Owns the storage transformers, whose keys caches are mutable; this is the
/// only task that touches them.
pub struct StorageDiffExtractor {
    storage: Storage,
    transformers: Vec<StorageTransformer>,
}

impl StorageDiffExtractor {
    /// An extractor over the registered storage transformers.
    pub fn new(storage: Storage, transformers: Vec<StorageTransformer>) -> Self {
        Self {
            storage,
            transformers,
        }
    }

    /// Whether any storage transformer is registered.
    pub fn has_transformers(&self) -> bool {
        !self.transformers.is_empty()
    }

    /// Process one diff end to end.
    ///
    /// A duplicate raw row short-circuits the whole pipeline for this diff:
    /// the duplicate signal is what guarantees the at-most-once transformer
    /// effect across stream replays.
    pub async fn process_diff(&mut self, diff: &StorageDiffInput) -> Result<DiffDisposition> {
        let diff_id = match self.storage.insert_diff(diff).await? {
            DiffOutcome::Duplicate(id) => {
                debug!(
                    component = "storage_diff_extractor",
                    diff_id = id,
                    block_number = diff.block_height,
                    "diff already processed"
                );
                return Ok(DiffDisposition::Duplicate);
            }
            DiffOutcome::Created(id) => id,
        };

        let Some(transformer) = self
            .transformers
            .iter_mut()
            .find(|t| t.hashed_contract_address == diff.hashed_address)
        else {
            return Ok(DiffDisposition::Unwatched);
        };

        let metadata = transformer.keys_lookup.lookup(diff.storage_key).await?;
        let decoded = decode(diff.storage_value, &metadata)?;

        transformer
            .handler
            .execute(diff_id, diff, &metadata, &decoded)
            .await
            .map_err(|source| IndexerError::Transformer {
                id: transformer.id.clone(),
                source,
            })?;

        Ok(DiffDisposition::Transformed)
    }

    /// Drain up to `limit` diffs from the channel.
    ///
    /// A failing diff is logged and skipped; the drain moves on to the next
    /// one. Cancellation is honored between diffs, never mid-diff.
    pub async fn drain(
        &mut self,
        diffs: &mut Receiver<StorageDiffInput>,
        limit: usize,
        cancel: &CancellationToken,
    ) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();
        while outcome.processed < limit && !cancel.is_cancelled() {
            let diff = match diffs.try_recv() {
                Ok(diff) => diff,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            outcome.processed += 1;

            if let Err(e) = self.process_diff(&diff).await {
                outcome.errors += 1;
                error!(
                    component = "storage_diff_extractor",
                    block_number = diff.block_height,
                    storage_key = %diff.storage_key,
                    error = %e,
                    "diff processing failed"
                );
            }
        }
        outcome
    }
}
