//! Storage diff sources: a tailed CSV file or a node subscription.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chain::ChainGateway;
use crate::error::{IndexerError, Result};
use crate::storage::StorageDiffInput;

/// A source of raw storage diffs, feeding the extraction channel until
/// cancelled or exhausted.
#[async_trait]
pub trait StorageDiffFetcher: Send + Sync {
    /// Push diffs into `out` until the source ends or `cancel` fires.
    async fn run(
        &self,
        out: mpsc::Sender<StorageDiffInput>,
        cancel: CancellationToken,
    ) -> Result<()>;
}

/// Tails a line-oriented CSV file of storage diffs.
///
/// Rows arrive as
/// `hashed_address, block_hash, block_height, storage_key, storage_value`.
/// A malformed line is logged and skipped; the stream keeps going.
pub struct CsvTailFetcher {
    path: PathBuf,
    poll_interval: Duration,
}

impl CsvTailFetcher {
    /// Tail the file at `path`, polling for appended lines.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: Duration::from_millis(500),
        }
    }

    /// Override the poll interval used once the reader reaches EOF.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

#[async_trait]
impl StorageDiffFetcher for CsvTailFetcher {
    async fn run(
        &self,
        out: mpsc::Sender<StorageDiffInput>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let file = File::open(&self.path).await.map_err(|e| {
            IndexerError::DiffParse {
                reason: format!("cannot open {}: {}", self.path.display(), e),
            }
        })?;
        info!(path = %self.path.display(), "tailing storage diff file");

        let mut reader = BufReader::new(file);
        // Lines can land in the file mid-write; only a newline terminates a
        // row, so partial reads accumulate here until one arrives.
        let mut pending = String::new();

        loop {
            let mut chunk = String::new();
            let read = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                read = reader.read_line(&mut chunk) => read,
            };

            match read {
                Ok(0) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(()),
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Ok(_) => {
                    pending.push_str(&chunk);
                    if !pending.ends_with('\n') {
                        continue;
                    }
                    let line = pending.trim().to_string();
                    pending.clear();
                    if line.is_empty() {
                        continue;
                    }

                    let fields: Vec<&str> = line.split(',').collect();
                    match StorageDiffInput::from_csv_row(&fields) {
                        Ok(diff) => {
                            if out.send(diff).await.is_err() {
                                // Receiver gone; the pipeline is shutting down.
                                return Ok(());
                            }
                        }
                        Err(parse_err) => {
                            warn!(
                                component = "csv_tail_fetcher",
                                line = %line,
                                error = %parse_err,
                                "skipping malformed storage diff row"
                            );
                        }
                    }
                }
                Err(e) => {
                    return Err(IndexerError::DiffParse {
                        reason: format!("read error on {}: {}", self.path.display(), e),
                    });
                }
            }
        }
    }
}

/// Forwards the gateway's storage diff subscription into the channel.
pub struct SubscriptionFetcher {
    gateway: Arc<dyn ChainGateway>,
}

impl SubscriptionFetcher {
    /// Subscribe through the given gateway.
    pub fn new(gateway: Arc<dyn ChainGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl StorageDiffFetcher for SubscriptionFetcher {
    async fn run(
        &self,
        out: mpsc::Sender<StorageDiffInput>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut subscription = self.gateway.subscribe_storage_diffs().await?;
        info!("subscribed to node storage diffs");

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                received = subscription.recv() => received,
            };
            match received {
                Some(diff) => {
                    if out.send(diff).await.is_err() {
                        return Ok(());
                    }
                }
                // Subscription closed by the node side.
                None => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;
    use std::io::Write;

    fn csv_row(value_byte: u8) -> String {
        format!(
            "0x{},0x{},12,0x{},0x{}",
            hex::encode([0x0a; 32]),
            hex::encode([0x0b; 32]),
            hex::encode([0x0c; 32]),
            hex::encode([value_byte; 32]),
        )
    }

    #[tokio::test]
    async fn test_csv_tail_parses_rows_and_skips_malformed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", csv_row(0x01)).unwrap();
        writeln!(file, "not,a,valid,row").unwrap();
        writeln!(file, "{}", csv_row(0x02)).unwrap();
        file.flush().unwrap();

        let fetcher = CsvTailFetcher::new(file.path()).with_poll_interval(Duration::from_millis(10));
        let (out, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { fetcher.run(out, cancel).await }
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.storage_value, B256::from([0x01; 32]));
        let second = rx.recv().await.unwrap();
        assert_eq!(second.storage_value, B256::from([0x02; 32]));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_csv_tail_picks_up_appended_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", csv_row(0x01)).unwrap();
        file.flush().unwrap();

        let fetcher = CsvTailFetcher::new(file.path()).with_poll_interval(Duration::from_millis(10));
        let (out, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { fetcher.run(out, cancel).await }
        });

        assert_eq!(rx.recv().await.unwrap().storage_value, B256::from([0x01; 32]));

        // Append after the reader has hit EOF.
        writeln!(file, "{}", csv_row(0x02)).unwrap();
        file.flush().unwrap();
        assert_eq!(rx.recv().await.unwrap().storage_value, B256::from([0x02; 32]));

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_errors() {
        let fetcher = CsvTailFetcher::new("/nonexistent/diffs.csv");
        let (out, _rx) = mpsc::channel(1);
        let err = fetcher.run(out, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, IndexerError::DiffParse { .. }));
    }
}
