//! Database record types for the storage layer.

use alloy::primitives::B256;

use crate::error::IndexerError;

/// A header row as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderRecord {
    /// Row id.
    pub id: i64,

    /// Block number.
    pub block_number: i64,

    /// Block hash. Mutated in place on reorg.
    pub hash: B256,

    /// Block timestamp (unix seconds).
    pub block_timestamp: i64,

    /// Raw header encoding as returned by the node.
    pub raw: Vec<u8>,

    /// Fingerprint of the node that supplied this header.
    pub node_fingerprint: String,
}

/// A log row as stored in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Row id.
    pub id: i64,

    /// Owning header row.
    pub header_id: i64,

    /// Emitting contract address (20 bytes).
    pub address: Vec<u8>,

    /// Concatenated 32-byte topics.
    pub topics: Vec<u8>,

    /// ABI-encoded payload.
    pub data: Vec<u8>,

    /// Index of the log within the block.
    pub log_index: i64,

    /// Index of the emitting transaction within the block.
    pub tx_index: i64,

    /// Raw log encoding.
    pub raw: Vec<u8>,
}

impl LogRecord {
    /// Split the stored topic blob back into 32-byte topics.
    pub fn topic_list(&self) -> Vec<B256> {
        self.topics
            .chunks_exact(32)
            .map(B256::from_slice)
            .collect()
    }
}

/// A raw contract storage slot observation, as received from a diff source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageDiffInput {
    /// keccak256 of the contract address.
    pub hashed_address: B256,

    /// Block height the mutation was observed at.
    pub block_height: i64,

    /// Hash of that block.
    pub block_hash: B256,

    /// Storage slot key, raw or keccak-hashed form.
    pub storage_key: B256,

    /// Storage slot value after the mutation.
    pub storage_value: B256,
}

impl StorageDiffInput {
    /// Parse one CSV row in source order:
    /// `hashed_address, block_hash, block_height, storage_key, storage_value`.
    ///
    /// Hex fields are 0x-prefixed and fixed width; the height is decimal.
    pub fn from_csv_row(fields: &[&str]) -> Result<Self, IndexerError> {
        if fields.len() != 5 {
            return Err(IndexerError::DiffParse {
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }

        let parse_b256 = |field: &str, name: &str| -> Result<B256, IndexerError> {
            field
                .trim()
                .parse()
                .map_err(|_| IndexerError::DiffParse {
                    reason: format!("invalid {}: '{}'", name, field.trim()),
                })
        };

        let block_height =
            fields[2]
                .trim()
                .parse::<i64>()
                .map_err(|_| IndexerError::DiffParse {
                    reason: format!("invalid block height: '{}'", fields[2].trim()),
                })?;

        Ok(StorageDiffInput {
            hashed_address: parse_b256(fields[0], "hashed address")?,
            block_hash: parse_b256(fields[1], "block hash")?,
            block_height,
            storage_key: parse_b256(fields[3], "storage key")?,
            storage_value: parse_b256(fields[4], "storage value")?,
        })
    }
}

/// Result of persisting a raw storage diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOutcome {
    /// The diff was new; carries the fresh row id.
    Created(i64),
    /// An identical diff already exists; carries the existing row id.
    Duplicate(i64),
}

impl DiffOutcome {
    /// The row id regardless of outcome.
    pub fn id(&self) -> i64 {
        match self {
            DiffOutcome::Created(id) | DiffOutcome::Duplicate(id) => *id,
        }
    }
}

/// Aggregate row counts, for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Total header rows.
    pub header_count: u64,
    /// Total log rows.
    pub log_count: u64,
    /// Total transaction rows.
    pub transaction_count: u64,
    /// Total raw storage diff rows.
    pub diff_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_row_parses() {
        let row = [
            "0x34a889dc5c27b1c0fa0e4b05f2e3e2f4e5a0eeee34a889dc5c27b1c0fa0e4b05",
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8",
            "100",
            "0x0000000000000000000000000000000000000000000000000000000000000002",
            "0x000000000000000000000000000000000000000000000000000000000000002a",
        ];
        let diff = StorageDiffInput::from_csv_row(&row).unwrap();
        assert_eq!(diff.block_height, 100);
        assert_eq!(diff.storage_value.0[31], 0x2a);
    }

    #[test]
    fn test_csv_row_rejects_wrong_arity() {
        let err = StorageDiffInput::from_csv_row(&["0xaa", "0xbb"]).unwrap_err();
        assert!(matches!(err, IndexerError::DiffParse { .. }));
    }

    #[test]
    fn test_csv_row_rejects_bad_height() {
        let row = [
            "0x34a889dc5c27b1c0fa0e4b05f2e3e2f4e5a0eeee34a889dc5c27b1c0fa0e4b05",
            "0x1c8aff950685c2ed4bc3174f3472287b56d9517b9c948127319a09a7a36deac8",
            "not-a-number",
            "0x0000000000000000000000000000000000000000000000000000000000000002",
            "0x000000000000000000000000000000000000000000000000000000000000002a",
        ];
        let err = StorageDiffInput::from_csv_row(&row).unwrap_err();
        assert!(matches!(err, IndexerError::DiffParse { .. }));
    }

    #[test]
    fn test_topic_blob_round_trip() {
        let record = LogRecord {
            id: 1,
            header_id: 1,
            address: vec![0x11; 20],
            topics: [[0xaa; 32], [0xbb; 32]].concat(),
            data: vec![],
            log_index: 0,
            tx_index: 0,
            raw: vec![],
        };
        let topics = record.topic_list();
        assert_eq!(topics, vec![B256::from([0xaa; 32]), B256::from([0xbb; 32])]);
    }
}
