//! Log and transaction persistence attached to headers.

use sqlx::Row;

use super::{LogRecord, Storage};
use crate::chain::{FetchedLog, TransactionRecord};

impl Storage {
    /// Persist fetched logs for a header.
    ///
    /// Conflicts on `(header_id, tx_index, log_index)` are ignored, so
    /// replaying a batch after a crash is a no-op.
    pub async fn insert_logs(
        &self,
        header_id: i64,
        logs: &[FetchedLog],
    ) -> Result<(), sqlx::Error> {
        for log in logs {
            let topics: Vec<u8> = log
                .topics
                .iter()
                .flat_map(|topic| topic.as_slice().to_vec())
                .collect();

            sqlx::query(
                r#"
                INSERT INTO logs (header_id, address, topics, data, log_index, tx_index, raw)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(header_id, tx_index, log_index) DO NOTHING
                "#,
            )
            .bind(header_id)
            .bind(log.address.as_slice())
            .bind(topics)
            .bind(log.data.as_slice())
            .bind(log.log_index as i64)
            .bind(log.tx_index as i64)
            .bind(log.raw.as_slice())
            .execute(self.pool())
            .await?;
        }
        Ok(())
    }

    /// Persist the transactions referenced by a header's logs.
    ///
    /// Re-inserting a `(header_id, hash)` pair overwrites every non-key
    /// field with the new values.
    pub async fn insert_transactions(
        &self,
        header_id: i64,
        transactions: &[TransactionRecord],
    ) -> Result<(), sqlx::Error> {
        for tx in transactions {
            sqlx::query(
                r#"
                INSERT INTO transactions
                    (header_id, hash, gas_limit, gas_price, input_data, nonce, raw,
                     tx_from, tx_index, tx_to, value)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(header_id, hash)
                DO UPDATE SET
                    gas_limit = excluded.gas_limit,
                    gas_price = excluded.gas_price,
                    input_data = excluded.input_data,
                    nonce = excluded.nonce,
                    raw = excluded.raw,
                    tx_from = excluded.tx_from,
                    tx_index = excluded.tx_index,
                    tx_to = excluded.tx_to,
                    value = excluded.value
                "#,
            )
            .bind(header_id)
            .bind(tx.hash.as_slice())
            .bind(tx.gas_limit as i64)
            .bind(tx.gas_price.to_string())
            .bind(tx.input_data.as_slice())
            .bind(tx.nonce as i64)
            .bind(tx.raw.as_slice())
            .bind(tx.tx_from.as_slice())
            .bind(tx.tx_index as i64)
            .bind(tx.tx_to.as_ref().map(|to| to.as_slice().to_vec()))
            .bind(tx.value.to_string())
            .execute(self.pool())
            .await?;
        }
        Ok(())
    }

    /// All logs persisted for a header, in `(tx_index, log_index)` order.
    pub async fn logs_for_header(&self, header_id: i64) -> Result<Vec<LogRecord>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, header_id, address, topics, data, log_index, tx_index, raw
            FROM logs
            WHERE header_id = ?
            ORDER BY tx_index ASC, log_index ASC
            "#,
        )
        .bind(header_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| LogRecord {
                id: row.get("id"),
                header_id: row.get("header_id"),
                address: row.get("address"),
                topics: row.get("topics"),
                data: row.get("data"),
                log_index: row.get("log_index"),
                tx_index: row.get("tx_index"),
                raw: row.get("raw"),
            })
            .collect())
    }
}
