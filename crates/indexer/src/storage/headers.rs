//! Header persistence, keyed by `(block_number, node_fingerprint)`.

use alloy::primitives::B256;
use sqlx::Row;

use super::{HeaderRecord, Storage};
use crate::chain::RawHeader;

impl Storage {
    /// Insert a header, or update it in place on a reorg.
    ///
    /// On conflict against `(block_number, node_fingerprint)` the hash,
    /// timestamp, and raw payload are overwritten with the new values; rows
    /// attached to the header id remain and are re-examined through the
    /// checked-header ledger.
    ///
    /// Returns the header row id.
    pub async fn upsert_header(
        &self,
        header: &RawHeader,
        node_fingerprint: &str,
    ) -> Result<i64, sqlx::Error> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO headers (block_number, hash, block_timestamp, raw, node_fingerprint)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(block_number, node_fingerprint)
            DO UPDATE SET
                hash = excluded.hash,
                block_timestamp = excluded.block_timestamp,
                raw = excluded.raw
            RETURNING id
            "#,
        )
        .bind(header.block_number)
        .bind(header.hash.as_slice())
        .bind(header.timestamp)
        .bind(header.raw.as_slice())
        .bind(node_fingerprint)
        .fetch_one(self.pool())
        .await?;

        Ok(id)
    }

    /// Get a header by block number under a node fingerprint.
    pub async fn header_by_number(
        &self,
        block_number: i64,
        node_fingerprint: &str,
    ) -> Result<Option<HeaderRecord>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT id, block_number, hash, block_timestamp, raw, node_fingerprint
            FROM headers
            WHERE block_number = ? AND node_fingerprint = ?
            "#,
        )
        .bind(block_number)
        .bind(node_fingerprint)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(row_to_header))
    }

    /// Block numbers in `[start, end]` with no header row under the given
    /// node fingerprint.
    pub async fn missing_block_numbers(
        &self,
        start: i64,
        end: i64,
        node_fingerprint: &str,
    ) -> Result<Vec<i64>, sqlx::Error> {
        if start > end {
            return Ok(Vec::new());
        }

        let numbers: Vec<i64> = sqlx::query_scalar(
            r#"
            WITH RECURSIVE span(block_number) AS (
                SELECT ?
                UNION ALL
                SELECT block_number + 1 FROM span WHERE block_number < ?
            )
            SELECT span.block_number
            FROM span
            LEFT JOIN (
                SELECT block_number FROM headers WHERE node_fingerprint = ?
            ) AS synced USING (block_number)
            WHERE synced.block_number IS NULL
            "#,
        )
        .bind(start)
        .bind(end)
        .bind(node_fingerprint)
        .fetch_all(self.pool())
        .await?;

        Ok(numbers)
    }
}

pub(super) fn row_to_header(row: sqlx::sqlite::SqliteRow) -> HeaderRecord {
    let hash_bytes: Vec<u8> = row.get("hash");
    HeaderRecord {
        id: row.get("id"),
        block_number: row.get("block_number"),
        hash: B256::from_slice(&hash_bytes),
        block_timestamp: row.get("block_timestamp"),
        raw: row.get("raw"),
        node_fingerprint: row.get("node_fingerprint"),
    }
}
