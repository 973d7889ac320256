//! Raw storage diff persistence, deduplicated on the full tuple.

use super::{DiffOutcome, Storage, StorageDiffInput};

impl Storage {
    /// Persist a raw storage diff.
    ///
    /// The table is unique on the full
    /// `(hashed_address, block_height, block_hash, storage_key, storage_value)`
    /// tuple; an identical re-insert returns the existing row id with the
    /// duplicate signal, which is what makes stream replay after a restart
    /// safe.
    pub async fn insert_diff(
        &self,
        diff: &StorageDiffInput,
    ) -> Result<DiffOutcome, sqlx::Error> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO storage_diffs
                (hashed_address, block_height, block_hash, storage_key, storage_value)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT DO NOTHING
            RETURNING id
            "#,
        )
        .bind(diff.hashed_address.as_slice())
        .bind(diff.block_height)
        .bind(diff.block_hash.as_slice())
        .bind(diff.storage_key.as_slice())
        .bind(diff.storage_value.as_slice())
        .fetch_optional(self.pool())
        .await?;

        if let Some(id) = inserted {
            return Ok(DiffOutcome::Created(id));
        }

        let existing: i64 = sqlx::query_scalar(
            r#"
            SELECT id FROM storage_diffs
            WHERE hashed_address = ? AND block_height = ? AND block_hash = ?
              AND storage_key = ? AND storage_value = ?
            "#,
        )
        .bind(diff.hashed_address.as_slice())
        .bind(diff.block_height)
        .bind(diff.block_hash.as_slice())
        .bind(diff.storage_key.as_slice())
        .bind(diff.storage_value.as_slice())
        .fetch_one(self.pool())
        .await?;

        Ok(DiffOutcome::Duplicate(existing))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_storage;
    use super::*;
    use alloy::primitives::B256;

    fn diff(value: u8) -> StorageDiffInput {
        StorageDiffInput {
            hashed_address: B256::from([0x0a; 32]),
            block_height: 42,
            block_hash: B256::from([0x0b; 32]),
            storage_key: B256::from([0x0c; 32]),
            storage_value: B256::from([value; 32]),
        }
    }

    #[tokio::test]
    async fn test_insert_diff_signals_duplicate() {
        let (storage, _temp_db) = setup_storage().await;

        let first = storage.insert_diff(&diff(0x01)).await.unwrap();
        let DiffOutcome::Created(id) = first else {
            panic!("expected created outcome");
        };

        let second = storage.insert_diff(&diff(0x01)).await.unwrap();
        assert_eq!(second, DiffOutcome::Duplicate(id));

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.diff_count, 1);
        storage.close().await;
    }

    #[tokio::test]
    async fn test_different_value_is_a_new_diff() {
        let (storage, _temp_db) = setup_storage().await;

        storage.insert_diff(&diff(0x01)).await.unwrap();
        let outcome = storage.insert_diff(&diff(0x02)).await.unwrap();
        assert!(matches!(outcome, DiffOutcome::Created(_)));

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.diff_count, 2);
        storage.close().await;
    }
}
