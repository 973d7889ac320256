//! Routing of persisted artifacts to the transformers whose signatures match.

use tracing::error;

use super::{EventConfig, EventTransformer, StorageTransformer, Transformer, TransformerId};
use crate::chain::FetchedLog;
use crate::error::IndexerError;
use crate::storage::HeaderRecord;

/// Holds the frozen set of event transformers and routes logs to them.
///
/// Registration happens once at startup; storage transformers are split off
/// to the storage-diff task, which is the only place their mutable keys
/// caches are touched.
pub struct Dispatcher {
    event_transformers: Vec<EventTransformer>,
}

impl Dispatcher {
    /// Split a registration set into the log-routing dispatcher and the
    /// storage transformers owned by the diff pipeline.
    pub fn register(transformers: Vec<Transformer>) -> (Self, Vec<StorageTransformer>) {
        let mut event_transformers = Vec::new();
        let mut storage_transformers = Vec::new();
        for transformer in transformers {
            match transformer {
                Transformer::Event(event) => event_transformers.push(event),
                Transformer::Storage(storage) => storage_transformers.push(storage),
            }
        }
        (
            Self { event_transformers },
            storage_transformers,
        )
    }

    /// Whether any event transformer is registered.
    pub fn has_event_transformers(&self) -> bool {
        !self.event_transformers.is_empty()
    }

    /// The registered event configurations, for assembling the log
    /// extractor's aggregate watch state.
    pub fn event_configs(&self) -> impl Iterator<Item = (&TransformerId, &EventConfig)> {
        self.event_transformers
            .iter()
            .map(|t| (&t.id, &t.config))
    }

    /// Deliver a header's persisted logs to every matching event
    /// transformer.
    ///
    /// A log matches when the transformer watches its emitting address and
    /// its first topic equals the transformer's signature topic. Handler
    /// failures are collected and returned for error-budget accounting; they
    /// never abort the batch.
    pub async fn deliver_logs(
        &self,
        header: &HeaderRecord,
        logs: &[FetchedLog],
    ) -> Vec<IndexerError> {
        let mut failures = Vec::new();
        for transformer in &self.event_transformers {
            for log in logs {
                let watched = transformer.config.contract_addresses.contains(&log.address);
                let signature_matches = log
                    .topics
                    .first()
                    .is_some_and(|topic| *topic == transformer.config.topic0);
                if !watched || !signature_matches {
                    continue;
                }

                if let Err(source) = transformer.handler.execute(header, log).await {
                    error!(
                        component = "dispatcher",
                        transformer = %transformer.id,
                        header_id = header.id,
                        block_number = header.block_number,
                        error = %source,
                        "event transformer failed"
                    );
                    failures.push(IndexerError::Transformer {
                        id: transformer.id.clone(),
                        source,
                    });
                }
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::recording::RecordingEventHandler;
    use alloy::primitives::{Address, B256};

    fn header() -> HeaderRecord {
        HeaderRecord {
            id: 1,
            block_number: 100,
            hash: B256::from([0x01; 32]),
            block_timestamp: 1_500_000_100,
            raw: vec![0xc0],
            node_fingerprint: "node-a".to_string(),
        }
    }

    fn log(address: Address, topic0: B256) -> FetchedLog {
        FetchedLog {
            address,
            topics: vec![topic0],
            data: vec![],
            tx_hash: None,
            tx_index: 0,
            log_index: 0,
            raw: vec![],
        }
    }

    fn event_transformer(
        id: &str,
        address: Address,
        topic0: B256,
    ) -> (Transformer, RecordingEventHandler) {
        let handler = RecordingEventHandler::new();
        let transformer = Transformer::Event(EventTransformer::new(
            TransformerId::new(id),
            EventConfig {
                contract_addresses: vec![address],
                topic0,
                starting_block: 0,
            },
            Box::new(handler.clone()),
        ));
        (transformer, handler)
    }

    #[tokio::test]
    async fn test_deliver_logs_routes_by_address_and_topic() {
        let watched = Address::from([0x11; 20]);
        let other = Address::from([0x22; 20]);
        let topic_a = B256::from([0xaa; 32]);
        let topic_b = B256::from([0xbb; 32]);

        let (t1, h1) = event_transformer("a", watched, topic_a);
        let (t2, h2) = event_transformer("b", watched, topic_b);
        let (dispatcher, _) = Dispatcher::register(vec![t1, t2]);

        let logs = vec![
            log(watched, topic_a),
            log(watched, topic_b),
            log(other, topic_a),
        ];
        let failures = dispatcher.deliver_logs(&header(), &logs).await;

        assert!(failures.is_empty());
        assert_eq!(h1.calls().len(), 1);
        assert_eq!(h1.calls()[0].log.topics[0], topic_a);
        assert_eq!(h2.calls().len(), 1);
        assert_eq!(h2.calls()[0].log.topics[0], topic_b);
    }

    #[tokio::test]
    async fn test_handler_failure_does_not_abort_delivery() {
        let watched = Address::from([0x11; 20]);
        let topic = B256::from([0xaa; 32]);

        let (t1, h1) = event_transformer("failing", watched, topic);
        let (t2, h2) = event_transformer("healthy", watched, topic);
        h1.fail_with("boom");

        let (dispatcher, _) = Dispatcher::register(vec![t1, t2]);
        let failures = dispatcher
            .deliver_logs(&header(), &[log(watched, topic)])
            .await;

        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], IndexerError::Transformer { .. }));
        assert!(h1.calls().is_empty());
        assert_eq!(h2.calls().len(), 1);
    }
}
