//! Header back-fill and head-window validation.

use tracing::{debug, info};

use crate::chain::ChainGateway;
use crate::error::Result;
use crate::storage::Storage;

/// Back-fill headers missing between `starting_block` and the current head.
///
/// Fetch failures abort the pass and surface; already-ingested headers stay
/// put, so the operation is safe to retry. Returns the number of headers
/// ingested.
pub async fn sync_missing_headers(
    gateway: &dyn ChainGateway,
    storage: &Storage,
    node_fingerprint: &str,
    starting_block: i64,
) -> Result<usize> {
    let head = gateway.head_block_number().await?;
    let missing = storage
        .missing_block_numbers(starting_block, head, node_fingerprint)
        .await?;

    if missing.is_empty() {
        return Ok(0);
    }
    debug!(
        component = "header_sync",
        count = missing.len(),
        first = missing.first(),
        last = missing.last(),
        "back-filling missing headers"
    );

    for block_number in &missing {
        let header = gateway.header_by_number(*block_number).await?;
        storage.upsert_header(&header, node_fingerprint).await?;
    }

    info!(
        component = "header_sync",
        count = missing.len(),
        "headers ingested"
    );
    Ok(missing.len())
}

/// Re-fetch the most recent `window` headers and upsert them.
///
/// The upsert overwrites hash, timestamp, and raw on conflict, which is what
/// repairs a reorged hash near the head. Returns the number of headers
/// refreshed.
pub async fn validate_recent_headers(
    gateway: &dyn ChainGateway,
    storage: &Storage,
    node_fingerprint: &str,
    window: i64,
) -> Result<usize> {
    if window <= 0 {
        return Ok(0);
    }
    let head = gateway.head_block_number().await?;
    let start = (head - window + 1).max(0);

    let mut refreshed = 0;
    for block_number in start..=head {
        let header = gateway.header_by_number(block_number).await?;
        storage.upsert_header(&header, node_fingerprint).await?;
        refreshed += 1;
    }
    Ok(refreshed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FakeGateway;
    use crate::error::IndexerError;
    use crate::storage::test_support::setup_storage;
    use alloy::primitives::B256;

    fn hash(byte: u8) -> B256 {
        B256::from([byte; 32])
    }

    #[tokio::test]
    async fn test_sync_backfills_all_missing_headers() {
        let (storage, _temp_db) = setup_storage().await;
        let gateway = FakeGateway::new("node-a");
        for n in 0..=2 {
            gateway.put_header(FakeGateway::canned_header(n, hash(n as u8 + 1)));
        }

        let ingested = sync_missing_headers(&gateway, &storage, "node-a", 0)
            .await
            .unwrap();
        assert_eq!(ingested, 3);
        for n in 0..=2 {
            assert!(storage
                .header_by_number(n, "node-a")
                .await
                .unwrap()
                .is_some());
        }

        // Second pass finds nothing to do.
        let ingested = sync_missing_headers(&gateway, &storage, "node-a", 0)
            .await
            .unwrap();
        assert_eq!(ingested, 0);
        storage.close().await;
    }

    #[tokio::test]
    async fn test_sync_fetch_failure_keeps_prior_headers() {
        let (storage, _temp_db) = setup_storage().await;
        let gateway = FakeGateway::new("node-a");
        gateway.put_header(FakeGateway::canned_header(0, hash(0x01)));
        gateway.set_head(1); // block 1 unfetchable

        let err = sync_missing_headers(&gateway, &storage, "node-a", 0)
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::ChainGateway(_)));

        // Block 0 was ingested before the failure and survives.
        assert!(storage
            .header_by_number(0, "node-a")
            .await
            .unwrap()
            .is_some());
        storage.close().await;
    }

    #[tokio::test]
    async fn test_validation_window_repairs_reorged_hash() {
        let (storage, _temp_db) = setup_storage().await;
        let gateway = FakeGateway::new("node-a");
        for n in 48..=50 {
            gateway.put_header(FakeGateway::canned_header(n, hash(n as u8)));
        }

        sync_missing_headers(&gateway, &storage, "node-a", 48)
            .await
            .unwrap();

        // The node reorgs block 50 to a new hash.
        gateway.put_header(FakeGateway::canned_header(50, hash(0xf0)));
        let refreshed = validate_recent_headers(&gateway, &storage, "node-a", 3)
            .await
            .unwrap();
        assert_eq!(refreshed, 3);

        let stored = storage
            .header_by_number(50, "node-a")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.hash, hash(0xf0));
        storage.close().await;
    }
}
