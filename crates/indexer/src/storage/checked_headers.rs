//! The checked-header ledger: per-transformer check counts for each header.

use super::headers::row_to_header;
use super::{HeaderRecord, Storage};
use crate::transform::TransformerId;

/// Hard cap on a missing-headers batch, so one extraction pass cannot starve
/// the rest of the round.
pub const MISSING_HEADERS_LIMIT: i64 = 100;

impl Storage {
    /// Record one completed check of a header for a transformer.
    ///
    /// Inserts the ledger row with count 1, or increments the existing
    /// count. Counts never decrease.
    pub async fn mark_header_checked(
        &self,
        header_id: i64,
        transformer_id: &TransformerId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO checked_headers (header_id, transformer_id, check_count)
            VALUES (?, ?, 1)
            ON CONFLICT(header_id, transformer_id)
            DO UPDATE SET check_count = check_count + 1
            "#,
        )
        .bind(header_id)
        .bind(transformer_id.as_str())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Current check count for a `(header, transformer)` pair; 0 if the
    /// header has never been checked for that transformer.
    pub async fn check_count(
        &self,
        header_id: i64,
        transformer_id: &TransformerId,
    ) -> Result<i64, sqlx::Error> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT check_count FROM checked_headers
            WHERE header_id = ? AND transformer_id = ?
            "#,
        )
        .bind(header_id)
        .bind(transformer_id.as_str())
        .fetch_optional(self.pool())
        .await?;
        Ok(count.unwrap_or(0))
    }

    /// Headers in `[start, end]` under the given node fingerprint for which
    /// at least one of the listed transformers has a check count below
    /// `max_check_count` (a missing ledger row counts as 0).
    ///
    /// `end = -1` means unbounded upward. Results are ordered by
    /// `(block_number, id)` ascending and capped at
    /// [`MISSING_HEADERS_LIMIT`] rows.
    pub async fn missing_headers(
        &self,
        start: i64,
        end: i64,
        transformer_ids: &[TransformerId],
        max_check_count: i64,
        node_fingerprint: &str,
    ) -> Result<Vec<HeaderRecord>, sqlx::Error> {
        if transformer_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids_json = serde_json::to_string(
            &transformer_ids
                .iter()
                .map(TransformerId::as_str)
                .collect::<Vec<_>>(),
        )
        .expect("transformer id list serializes");

        let rows = sqlx::query(
            r#"
            SELECT h.id, h.block_number, h.hash, h.block_timestamp, h.raw, h.node_fingerprint
            FROM headers h
            WHERE h.node_fingerprint = ?
              AND h.block_number >= ?
              AND (? = -1 OR h.block_number <= ?)
              AND EXISTS (
                  SELECT 1
                  FROM json_each(?) AS t
                  LEFT JOIN checked_headers ch
                    ON ch.header_id = h.id AND ch.transformer_id = t.value
                  WHERE COALESCE(ch.check_count, 0) < ?
              )
            ORDER BY h.block_number ASC, h.id ASC
            LIMIT ?
            "#,
        )
        .bind(node_fingerprint)
        .bind(start)
        .bind(end)
        .bind(end)
        .bind(ids_json)
        .bind(max_check_count)
        .bind(MISSING_HEADERS_LIMIT)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(row_to_header).collect())
    }
}
