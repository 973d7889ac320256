//! Recording handlers for tests: they persist nothing and remember every
//! call so assertions can inspect what the pipeline delivered.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use chainsift_core::{DecodedValue, SlotMetadata};

use super::{EventHandler, StorageHandler};
use crate::chain::FetchedLog;
use crate::storage::{HeaderRecord, StorageDiffInput};

/// One delivered log, as seen by a recording event handler.
#[derive(Debug, Clone)]
pub struct DeliveredLog {
    /// Header the log belongs to.
    pub header_id: i64,
    /// The delivered log.
    pub log: FetchedLog,
}

/// Event handler that records deliveries.
#[derive(Clone, Default)]
pub struct RecordingEventHandler {
    calls: Arc<Mutex<Vec<DeliveredLog>>>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl RecordingEventHandler {
    /// A handler that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent execute call fail with the given message.
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    /// Deliveries observed so far.
    pub fn calls(&self) -> Vec<DeliveredLog> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for RecordingEventHandler {
    async fn execute(&self, header: &HeaderRecord, log: &FetchedLog) -> anyhow::Result<()> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            anyhow::bail!(message);
        }
        self.calls.lock().unwrap().push(DeliveredLog {
            header_id: header.id,
            log: log.clone(),
        });
        Ok(())
    }
}

/// One delivered diff, as seen by a recording storage handler.
#[derive(Debug, Clone)]
pub struct DeliveredDiff {
    /// Raw diff row id.
    pub diff_id: i64,
    /// The raw diff.
    pub diff: StorageDiffInput,
    /// Resolved slot metadata.
    pub metadata: SlotMetadata,
    /// Decoded value.
    pub decoded: DecodedValue,
}

/// Storage handler that records deliveries.
#[derive(Clone, Default)]
pub struct RecordingStorageHandler {
    calls: Arc<Mutex<Vec<DeliveredDiff>>>,
    fail_with: Arc<Mutex<Option<String>>>,
}

impl RecordingStorageHandler {
    /// A handler that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent execute call fail with the given message.
    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    /// Deliveries observed so far.
    pub fn calls(&self) -> Vec<DeliveredDiff> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageHandler for RecordingStorageHandler {
    async fn execute(
        &self,
        diff_id: i64,
        diff: &StorageDiffInput,
        metadata: &SlotMetadata,
        decoded: &DecodedValue,
    ) -> anyhow::Result<()> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            anyhow::bail!(message);
        }
        self.calls.lock().unwrap().push(DeliveredDiff {
            diff_id,
            diff: diff.clone(),
            metadata: metadata.clone(),
            decoded: decoded.clone(),
        });
        Ok(())
    }
}
