//! In-memory chain gateway for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::primitives::{Address, B256};
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::gateway::{
    ChainError, ChainGateway, FetchedLog, NodeInfo, RawHeader, TransactionRecord,
};
use crate::storage::StorageDiffInput;

/// A recorded log-filter call, for asserting what the pipeline asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilterCall {
    /// Addresses in the filter.
    pub addresses: Vec<Address>,
    /// Topics in the filter.
    pub topics: Vec<B256>,
    /// Block hash the filter was scoped to.
    pub block_hash: B256,
}

/// Canned chain gateway holding headers, logs, and transactions in memory.
pub struct FakeGateway {
    node: NodeInfo,
    head: Mutex<i64>,
    headers: Mutex<HashMap<i64, RawHeader>>,
    logs_by_block_hash: Mutex<HashMap<B256, Vec<FetchedLog>>>,
    transactions: Mutex<HashMap<B256, TransactionRecord>>,
    diffs: Mutex<Vec<StorageDiffInput>>,
    header_fetch_error: Mutex<Option<String>>,
    log_calls: Mutex<Vec<LogFilterCall>>,
}

impl FakeGateway {
    /// A gateway with the given fingerprint and an empty chain.
    pub fn new(fingerprint: &str) -> Self {
        Self {
            node: NodeInfo {
                fingerprint: fingerprint.to_string(),
                network_id: 1337,
                genesis_hash: B256::ZERO,
                client_version: "fake/v0.0.0".to_string(),
            },
            head: Mutex::new(0),
            headers: Mutex::new(HashMap::new()),
            logs_by_block_hash: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            diffs: Mutex::new(Vec::new()),
            header_fetch_error: Mutex::new(None),
            log_calls: Mutex::new(Vec::new()),
        }
    }

    /// Set the head block number.
    pub fn set_head(&self, head: i64) {
        *self.head.lock().unwrap() = head;
    }

    /// Install a header, bumping the head if the header is beyond it.
    pub fn put_header(&self, header: RawHeader) {
        let mut head = self.head.lock().unwrap();
        if header.block_number > *head {
            *head = header.block_number;
        }
        self.headers
            .lock()
            .unwrap()
            .insert(header.block_number, header);
    }

    /// Install logs returned for a block hash.
    pub fn put_logs(&self, block_hash: B256, logs: Vec<FetchedLog>) {
        self.logs_by_block_hash
            .lock()
            .unwrap()
            .insert(block_hash, logs);
    }

    /// Install a fetchable transaction.
    pub fn put_transaction(&self, tx: TransactionRecord) {
        self.transactions.lock().unwrap().insert(tx.hash, tx);
    }

    /// Preload diffs delivered by `subscribe_storage_diffs`.
    pub fn put_diffs(&self, diffs: Vec<StorageDiffInput>) {
        self.diffs.lock().unwrap().extend(diffs);
    }

    /// Make every header fetch fail with the given message.
    pub fn fail_header_fetches(&self, message: &str) {
        *self.header_fetch_error.lock().unwrap() = Some(message.to_string());
    }

    /// Log-filter calls observed so far.
    pub fn log_calls(&self) -> Vec<LogFilterCall> {
        self.log_calls.lock().unwrap().clone()
    }

    /// Build a header whose hash encodes the block number, for test setups.
    pub fn canned_header(block_number: i64, hash: B256) -> RawHeader {
        RawHeader {
            block_number,
            hash,
            timestamp: 1_500_000_000 + block_number * 15,
            raw: format!("{{\"number\":{}}}", block_number).into_bytes(),
        }
    }
}

#[async_trait]
impl ChainGateway for FakeGateway {
    async fn node_info(&self) -> Result<NodeInfo, ChainError> {
        Ok(self.node.clone())
    }

    async fn head_block_number(&self) -> Result<i64, ChainError> {
        Ok(*self.head.lock().unwrap())
    }

    async fn header_by_number(&self, block_number: i64) -> Result<RawHeader, ChainError> {
        if let Some(message) = self.header_fetch_error.lock().unwrap().clone() {
            return Err(ChainError::MalformedResponse(message));
        }
        self.headers
            .lock()
            .unwrap()
            .get(&block_number)
            .cloned()
            .ok_or(ChainError::HeaderNotFound { block_number })
    }

    async fn logs(
        &self,
        addresses: &[Address],
        topics: &[B256],
        block_hash: B256,
    ) -> Result<Vec<FetchedLog>, ChainError> {
        self.log_calls.lock().unwrap().push(LogFilterCall {
            addresses: addresses.to_vec(),
            topics: topics.to_vec(),
            block_hash,
        });
        let all = self
            .logs_by_block_hash
            .lock()
            .unwrap()
            .get(&block_hash)
            .cloned()
            .unwrap_or_default();
        // The node applies the filter server-side; mirror that here.
        Ok(all
            .into_iter()
            .filter(|log| {
                addresses.contains(&log.address)
                    && log.topics.first().is_some_and(|t| topics.contains(t))
            })
            .collect())
    }

    async fn transactions(
        &self,
        tx_hashes: &[B256],
    ) -> Result<Vec<TransactionRecord>, ChainError> {
        let known = self.transactions.lock().unwrap();
        tx_hashes
            .iter()
            .map(|hash| {
                known
                    .get(hash)
                    .cloned()
                    .ok_or(ChainError::TransactionNotFound { hash: *hash })
            })
            .collect()
    }

    async fn subscribe_storage_diffs(
        &self,
    ) -> Result<mpsc::Receiver<StorageDiffInput>, ChainError> {
        let diffs = self.diffs.lock().unwrap().clone();
        let (tx, rx) = mpsc::channel(diffs.len().max(1));
        for diff in diffs {
            tx.send(diff).await.expect("receiver held locally");
        }
        Ok(rx)
    }
}
