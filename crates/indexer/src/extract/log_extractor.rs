//! Log extraction: walking under-checked headers and persisting their
//! matching logs.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use tracing::{debug, info};

use crate::chain::ChainGateway;
use crate::error::{IndexerError, Result};
use crate::storage::Storage;
use crate::transform::{Dispatcher, EventConfig, TransformerId};

/// How hard to look for headers to (re)check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecheckMode {
    /// Only headers never checked before.
    MissingOnly,
    /// Headers checked fewer times than the cap; used after registering new
    /// transformers or bumping the cap.
    UpToCap(i64),
}

impl RecheckMode {
    fn max_check_count(&self) -> i64 {
        match self {
            RecheckMode::MissingOnly => 1,
            RecheckMode::UpToCap(cap) => *cap,
        }
    }
}

/// Result of one extraction pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogExtraction {
    /// No header is below its check-count threshold.
    NoMissingHeaders,
    /// At least one header was examined.
    Progressed {
        /// Headers checked this pass.
        headers_checked: usize,
        /// Transformer execute failures observed during delegation.
        transformer_failures: usize,
    },
}

/// Accumulates registered event configurations into the extractor's
/// aggregate watch state, then freezes it.
#[derive(Default)]
pub struct LogExtractorBuilder {
    addresses: BTreeSet<Address>,
    topics: BTreeSet<B256>,
    starting_block: Option<i64>,
    transformer_ids: Vec<TransformerId>,
}

impl LogExtractorBuilder {
    /// An empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event transformer's watch signature into the aggregate.
    ///
    /// Addresses and topics are deduplicated; the effective starting block
    /// is the minimum across every registered config.
    pub fn add_config(&mut self, id: TransformerId, config: &EventConfig) {
        self.addresses.extend(config.contract_addresses.iter().copied());
        self.topics.insert(config.topic0);
        self.starting_block = Some(match self.starting_block {
            Some(current) => current.min(config.starting_block),
            None => config.starting_block,
        });
        self.transformer_ids.push(id);
    }

    /// Freeze the aggregate into an extractor.
    pub fn build(
        self,
        gateway: Arc<dyn ChainGateway>,
        storage: Storage,
        node_fingerprint: String,
    ) -> LogExtractor {
        LogExtractor {
            gateway,
            storage,
            node_fingerprint,
            addresses: self.addresses.into_iter().collect(),
            topics: self.topics.into_iter().collect(),
            starting_block: self.starting_block.unwrap_or(0),
            transformer_ids: self.transformer_ids,
        }
    }
}

/// Walks headers whose check count is below the threshold, fetching and
/// persisting their matching logs and advancing the ledger.
pub struct LogExtractor {
    gateway: Arc<dyn ChainGateway>,
    storage: Storage,
    node_fingerprint: String,
    addresses: Vec<Address>,
    topics: Vec<B256>,
    starting_block: i64,
    transformer_ids: Vec<TransformerId>,
}

impl LogExtractor {
    /// The aggregate watched addresses.
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// The effective starting block (minimum across registered configs).
    pub fn starting_block(&self) -> i64 {
        self.starting_block
    }

    /// One extraction pass.
    ///
    /// Batches are capped by the ledger query; headers are processed in
    /// ascending `(block_number, id)` order. Per header, log and transaction
    /// persistence precede the ledger mark, so a crash in between replays
    /// as idempotent upserts. The first storage or gateway error aborts the
    /// pass before the mark, leaving the header retryable. Persisted logs
    /// are then delegated through the dispatcher; transformer failures are
    /// reported in the outcome but never abort the batch.
    pub async fn extract_logs(
        &self,
        mode: RecheckMode,
        dispatcher: &Dispatcher,
    ) -> Result<LogExtraction> {
        if self.addresses.is_empty() {
            return Err(IndexerError::NoWatchedAddresses);
        }

        let headers = self
            .storage
            .missing_headers(
                self.starting_block,
                -1,
                &self.transformer_ids,
                mode.max_check_count(),
                &self.node_fingerprint,
            )
            .await?;

        if headers.is_empty() {
            return Ok(LogExtraction::NoMissingHeaders);
        }

        let mut transformer_failures = 0;
        for header in &headers {
            let logs = self
                .gateway
                .logs(&self.addresses, &self.topics, header.hash)
                .await?;

            if !logs.is_empty() {
                let tx_hashes: Vec<B256> = logs
                    .iter()
                    .filter_map(|log| log.tx_hash)
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect();
                let transactions = self.gateway.transactions(&tx_hashes).await?;
                self.storage
                    .insert_transactions(header.id, &transactions)
                    .await?;
                self.storage.insert_logs(header.id, &logs).await?;
                debug!(
                    component = "log_extractor",
                    header_id = header.id,
                    block_number = header.block_number,
                    logs = logs.len(),
                    "logs persisted"
                );
            }

            for transformer_id in &self.transformer_ids {
                self.storage
                    .mark_header_checked(header.id, transformer_id)
                    .await?;
            }

            if !logs.is_empty() {
                transformer_failures += dispatcher.deliver_logs(header, &logs).await.len();
            }
        }

        info!(
            component = "log_extractor",
            headers_checked = headers.len(),
            transformer_failures,
            "extraction pass complete"
        );
        Ok(LogExtraction::Progressed {
            headers_checked: headers.len(),
            transformer_failures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{FakeGateway, FetchedLog, RawHeader, TransactionRecord};
    use crate::storage::test_support::setup_storage;
    use crate::transform::recording::RecordingEventHandler;
    use crate::transform::{EventTransformer, Transformer};
    use alloy::primitives::U256;

    const WATCHED: Address = Address::new([0x11; 20]);
    const TOPIC: B256 = B256::new([0xaa; 32]);

    fn event_config(starting_block: i64) -> EventConfig {
        EventConfig {
            contract_addresses: vec![WATCHED],
            topic0: TOPIC,
            starting_block,
        }
    }

    fn registered(
        configs: &[(&str, EventConfig)],
    ) -> (Dispatcher, LogExtractorBuilder, Vec<RecordingEventHandler>) {
        let mut transformers = Vec::new();
        let mut handlers = Vec::new();
        for (id, config) in configs {
            let handler = RecordingEventHandler::new();
            handlers.push(handler.clone());
            transformers.push(Transformer::Event(EventTransformer::new(
                TransformerId::new(*id),
                config.clone(),
                Box::new(handler.clone()),
            )));
        }
        let (dispatcher, _) = Dispatcher::register(transformers);
        let mut builder = LogExtractorBuilder::new();
        for (id, config) in dispatcher.event_configs() {
            builder.add_config(id.clone(), config);
        }
        (dispatcher, builder, handlers)
    }

    fn fetched_log(tx_hash: B256) -> FetchedLog {
        FetchedLog {
            address: WATCHED,
            topics: vec![TOPIC],
            data: vec![0x01],
            tx_hash: Some(tx_hash),
            tx_index: 0,
            log_index: 0,
            raw: vec![0x7b, 0x7d],
        }
    }

    fn transaction(hash: B256) -> TransactionRecord {
        TransactionRecord {
            hash,
            gas_limit: 21000,
            gas_price: 1,
            input_data: vec![],
            nonce: 0,
            raw: vec![],
            tx_from: Address::from([0x22; 20]),
            tx_index: 0,
            tx_to: None,
            value: U256::ZERO,
        }
    }

    #[test]
    fn test_builder_aggregates_configs() {
        let other = Address::from([0x33; 20]);
        let other_topic = B256::from([0xbb; 32]);
        let mut builder = LogExtractorBuilder::new();
        builder.add_config(TransformerId::new("a"), &event_config(500));
        builder.add_config(
            TransformerId::new("b"),
            &EventConfig {
                contract_addresses: vec![WATCHED, other],
                topic0: other_topic,
                starting_block: 100,
            },
        );

        assert_eq!(builder.addresses.len(), 2);
        assert_eq!(builder.topics.len(), 2);
        assert_eq!(builder.starting_block, Some(100));
        assert_eq!(builder.transformer_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_extract_without_addresses_fails() {
        let (storage, _temp_db) = setup_storage().await;
        let gateway = Arc::new(FakeGateway::new("node-a"));
        let (dispatcher, _) = Dispatcher::register(vec![]);
        let extractor =
            LogExtractorBuilder::new().build(gateway, storage.clone(), "node-a".to_string());

        let err = extractor
            .extract_logs(RecheckMode::MissingOnly, &dispatcher)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::NoWatchedAddresses));
        assert!(!err.counts_against_budget());
        storage.close().await;
    }

    #[tokio::test]
    async fn test_extract_persists_logs_and_marks_header() {
        let (storage, _temp_db) = setup_storage().await;
        let gateway = Arc::new(FakeGateway::new("node-a"));

        let block_hash = B256::from([0x05; 32]);
        let header = RawHeader {
            block_number: 5,
            hash: block_hash,
            timestamp: 1_500_000_005,
            raw: vec![0xc0],
        };
        let header_id = storage.upsert_header(&header, "node-a").await.unwrap();

        let tx_hash = B256::from([0xcc; 32]);
        gateway.put_logs(block_hash, vec![fetched_log(tx_hash)]);
        gateway.put_transaction(transaction(tx_hash));

        let (dispatcher, builder, handlers) = registered(&[("vault", event_config(0))]);
        let extractor = builder.build(gateway.clone(), storage.clone(), "node-a".to_string());

        let outcome = extractor
            .extract_logs(RecheckMode::MissingOnly, &dispatcher)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            LogExtraction::Progressed {
                headers_checked: 1,
                transformer_failures: 0
            }
        );

        let stored_logs = storage.logs_for_header(header_id).await.unwrap();
        assert_eq!(stored_logs.len(), 1);
        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.transaction_count, 1);
        assert_eq!(
            storage
                .check_count(header_id, &TransformerId::new("vault"))
                .await
                .unwrap(),
            1
        );
        assert_eq!(handlers[0].calls().len(), 1);

        // The header is checked; a second missing-only pass is a no-op.
        let outcome = extractor
            .extract_logs(RecheckMode::MissingOnly, &dispatcher)
            .await
            .unwrap();
        assert_eq!(outcome, LogExtraction::NoMissingHeaders);
        storage.close().await;
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_header_retryable() {
        let (storage, _temp_db) = setup_storage().await;
        let gateway = Arc::new(FakeGateway::new("node-a"));

        let block_hash = B256::from([0x05; 32]);
        let header = RawHeader {
            block_number: 5,
            hash: block_hash,
            timestamp: 1_500_000_005,
            raw: vec![0xc0],
        };
        let header_id = storage.upsert_header(&header, "node-a").await.unwrap();

        // A log references a transaction the gateway cannot serve.
        gateway.put_logs(block_hash, vec![fetched_log(B256::from([0xee; 32]))]);

        let (dispatcher, builder, _) = registered(&[("vault", event_config(0))]);
        let extractor = builder.build(gateway, storage.clone(), "node-a".to_string());

        let err = extractor
            .extract_logs(RecheckMode::MissingOnly, &dispatcher)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::ChainGateway(_)));

        // The mark never happened, so the header is still due.
        assert_eq!(
            storage
                .check_count(header_id, &TransformerId::new("vault"))
                .await
                .unwrap(),
            0
        );
        storage.close().await;
    }

    #[tokio::test]
    async fn test_transformer_failure_does_not_block_the_mark() {
        let (storage, _temp_db) = setup_storage().await;
        let gateway = Arc::new(FakeGateway::new("node-a"));

        let block_hash = B256::from([0x05; 32]);
        let header = RawHeader {
            block_number: 5,
            hash: block_hash,
            timestamp: 1_500_000_005,
            raw: vec![0xc0],
        };
        let header_id = storage.upsert_header(&header, "node-a").await.unwrap();

        let tx_hash = B256::from([0xcc; 32]);
        gateway.put_logs(block_hash, vec![fetched_log(tx_hash)]);
        gateway.put_transaction(transaction(tx_hash));

        let (dispatcher, builder, handlers) = registered(&[("vault", event_config(0))]);
        handlers[0].fail_with("domain write failed");
        let extractor = builder.build(gateway, storage.clone(), "node-a".to_string());

        let outcome = extractor
            .extract_logs(RecheckMode::MissingOnly, &dispatcher)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            LogExtraction::Progressed {
                headers_checked: 1,
                transformer_failures: 1
            }
        );
        assert_eq!(
            storage
                .check_count(header_id, &TransformerId::new("vault"))
                .await
                .unwrap(),
            1
        );
        storage.close().await;
    }
}
