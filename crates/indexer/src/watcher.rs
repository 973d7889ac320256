//! The supervisor loop: one header-sync pass, one log-extraction pass, and
//! one storage-diff drain per round, under an unexpected-error budget.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::chain::ChainGateway;
use crate::error::{IndexerError, Result};
use crate::extract::{
    sync_missing_headers, validate_recent_headers, LogExtraction, LogExtractor, RecheckMode,
};
use crate::storage::{Storage, StorageDiffInput};
use crate::storage_diffs::StorageDiffExtractor;
use crate::transform::Dispatcher;

/// Tunables for the supervisor.
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    /// Delay between rounds when a round found no work.
    pub polling_interval: Duration,
    /// How many recent headers to re-fetch each round for reorg repair.
    pub validation_window: i64,
    /// Unexpected errors tolerated before the loop exits.
    pub max_unexpected_errors: i64,
    /// Check-count ceiling applied when rechecking headers.
    pub recheck_cap: i64,
    /// Whether the operator requested header rechecking at startup.
    pub recheck_headers: bool,
    /// First block the pipeline cares about.
    pub starting_block: i64,
    /// Most storage diffs drained per round.
    pub diff_drain_limit: usize,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_secs(7),
            validation_window: 15,
            max_unexpected_errors: 5,
            recheck_cap: 3,
            recheck_headers: false,
            starting_block: 0,
            diff_drain_limit: 500,
        }
    }
}

/// What one round accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The round moved data.
    Progressed,
    /// Nothing to do; the loop sleeps one interval.
    NoWork,
    /// At least one unexpected error occurred.
    Errored,
}

/// Accounting for one round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundReport {
    /// Whether any step moved data.
    pub progressed: bool,
    /// Unexpected errors observed this round.
    pub errors: i64,
}

impl RoundReport {
    /// Collapse the report into the round's outcome.
    pub fn outcome(&self) -> RoundOutcome {
        if self.errors > 0 {
            RoundOutcome::Errored
        } else if self.progressed {
            RoundOutcome::Progressed
        } else {
            RoundOutcome::NoWork
        }
    }
}

/// Drives rounds until cancelled or the error budget is spent.
pub struct Watcher {
    gateway: Arc<dyn ChainGateway>,
    storage: Storage,
    node_fingerprint: String,
    dispatcher: Dispatcher,
    log_extractor: Option<LogExtractor>,
    diff_extractor: StorageDiffExtractor,
    diff_rx: Option<Receiver<StorageDiffInput>>,
    settings: WatcherSettings,
}

impl Watcher {
    /// Assemble a supervisor over the registered pipeline components.
    ///
    /// `log_extractor` is `None` when no event transformer is registered;
    /// `diff_rx` is `None` when no diff source is configured.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        storage: Storage,
        node_fingerprint: String,
        dispatcher: Dispatcher,
        log_extractor: Option<LogExtractor>,
        diff_extractor: StorageDiffExtractor,
        diff_rx: Option<Receiver<StorageDiffInput>>,
        settings: WatcherSettings,
    ) -> Self {
        Self {
            gateway,
            storage,
            node_fingerprint,
            dispatcher,
            log_extractor,
            diff_extractor,
            diff_rx,
            settings,
        }
    }

    /// Run rounds until cancellation or budget exhaustion.
    ///
    /// A round that progressed is followed immediately by the next; an
    /// errored round, or an idle round outside recheck mode, sleeps one
    /// polling interval first.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            polling_interval = ?self.settings.polling_interval,
            max_unexpected_errors = self.settings.max_unexpected_errors,
            recheck_headers = self.settings.recheck_headers,
            "watcher starting"
        );

        let mut total_errors: i64 = 0;
        loop {
            if cancel.is_cancelled() {
                info!("watcher cancelled");
                return Ok(());
            }

            let report = self.round(&cancel).await?;
            total_errors += report.errors;
            if total_errors > self.settings.max_unexpected_errors {
                error!(
                    errors = total_errors,
                    cap = self.settings.max_unexpected_errors,
                    "error budget exhausted, stopping"
                );
                return Err(IndexerError::ErrorBudgetExhausted {
                    errors: total_errors,
                });
            }

            let wait = match report.outcome() {
                RoundOutcome::Progressed => false,
                RoundOutcome::Errored => true,
                // An operator-requested recheck runs back to back until the
                // cap is reached everywhere.
                RoundOutcome::NoWork => !self.settings.recheck_headers,
            };
            if wait {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("watcher cancelled");
                        return Ok(());
                    }
                    _ = tokio::time::sleep(self.settings.polling_interval) => {}
                }
            }
        }
    }

    /// Execute one round: header sync, log extraction, diff drain.
    ///
    /// Step failures are counted, logged, and do not prevent the remaining
    /// steps from running. Only conditions the caller must act on (an empty
    /// watch configuration) surface as `Err`.
    pub async fn round(&mut self, cancel: &CancellationToken) -> Result<RoundReport> {
        let mut report = RoundReport::default();

        match sync_missing_headers(
            self.gateway.as_ref(),
            &self.storage,
            &self.node_fingerprint,
            self.settings.starting_block,
        )
        .await
        {
            Ok(ingested) => report.progressed |= ingested > 0,
            Err(e) => {
                report.errors += 1;
                error!(component = "header_sync", error = %e, "header sync failed");
            }
        }

        if let Err(e) = validate_recent_headers(
            self.gateway.as_ref(),
            &self.storage,
            &self.node_fingerprint,
            self.settings.validation_window,
        )
        .await
        {
            report.errors += 1;
            error!(component = "header_sync", error = %e, "head validation failed");
        }

        if let Some(extractor) = &self.log_extractor {
            let mode = if self.settings.recheck_headers {
                RecheckMode::UpToCap(self.settings.recheck_cap)
            } else {
                RecheckMode::MissingOnly
            };
            match extractor.extract_logs(mode, &self.dispatcher).await {
                Ok(LogExtraction::Progressed {
                    transformer_failures,
                    ..
                }) => {
                    report.progressed = true;
                    report.errors += transformer_failures as i64;
                }
                Ok(LogExtraction::NoMissingHeaders) => {}
                Err(e @ IndexerError::NoWatchedAddresses) => {
                    warn!(component = "log_extractor", "no watched addresses");
                    return Err(e);
                }
                Err(e) => {
                    report.errors += 1;
                    error!(component = "log_extractor", error = %e, "log extraction failed");
                }
            }
        }

        if let Some(rx) = self.diff_rx.as_mut() {
            let drained = self
                .diff_extractor
                .drain(rx, self.settings.diff_drain_limit, cancel)
                .await;
            report.progressed |= drained.processed > 0;
            report.errors += drained.errors as i64;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::FakeGateway;
    use crate::storage::test_support::setup_storage;
    use alloy::primitives::B256;

    async fn bare_watcher(
        gateway: Arc<FakeGateway>,
        storage: Storage,
        settings: WatcherSettings,
    ) -> Watcher {
        let (dispatcher, storage_transformers) = Dispatcher::register(vec![]);
        Watcher::new(
            gateway,
            storage.clone(),
            "node-a".to_string(),
            dispatcher,
            None,
            StorageDiffExtractor::new(storage, storage_transformers),
            None,
            settings,
        )
    }

    #[tokio::test]
    async fn test_round_reports_header_progress_then_no_work() {
        let (storage, _temp_db) = setup_storage().await;
        let gateway = Arc::new(FakeGateway::new("node-a"));
        gateway.put_header(FakeGateway::canned_header(0, B256::from([0x01; 32])));

        let settings = WatcherSettings {
            validation_window: 1,
            ..WatcherSettings::default()
        };
        let mut watcher = bare_watcher(gateway, storage.clone(), settings).await;
        let cancel = CancellationToken::new();

        let report = watcher.round(&cancel).await.unwrap();
        assert_eq!(report.outcome(), RoundOutcome::Progressed);

        let report = watcher.round(&cancel).await.unwrap();
        assert_eq!(report.outcome(), RoundOutcome::NoWork);
        storage.close().await;
    }

    #[tokio::test]
    async fn test_run_exits_when_error_budget_exhausted() {
        let (storage, _temp_db) = setup_storage().await;
        let gateway = Arc::new(FakeGateway::new("node-a"));
        // Head is at 0 with no fetchable header: every round fails its sync.
        gateway.fail_header_fetches("node unreachable");

        let settings = WatcherSettings {
            polling_interval: Duration::from_millis(1),
            validation_window: 0,
            max_unexpected_errors: 2,
            ..WatcherSettings::default()
        };
        let watcher = bare_watcher(gateway, storage.clone(), settings).await;

        let err = watcher.run(CancellationToken::new()).await.unwrap_err();
        match err {
            IndexerError::ErrorBudgetExhausted { errors } => assert!(errors > 2),
            other => panic!("unexpected error: {}", other),
        }
        storage.close().await;
    }

    #[tokio::test]
    async fn test_run_honors_cancellation() {
        let (storage, _temp_db) = setup_storage().await;
        let gateway = Arc::new(FakeGateway::new("node-a"));
        gateway.put_header(FakeGateway::canned_header(0, B256::from([0x01; 32])));

        let settings = WatcherSettings {
            polling_interval: Duration::from_secs(60),
            validation_window: 1,
            ..WatcherSettings::default()
        };
        let watcher = bare_watcher(gateway, storage.clone(), settings).await;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        handle.await.unwrap().unwrap();
        storage.close().await;
    }
}
