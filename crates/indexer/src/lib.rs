//! # chainsift indexer
//!
//! The extract-transform-dispatch engine: consumes headers, logs, and
//! contract storage diffs from a chain node, persists canonical chain
//! metadata into SQLite, and delegates incremental processing to registered
//! transformers.
//!
//! The pipeline has three moving parts, driven by the [`watcher::Watcher`]:
//!
//! - header back-fill and head validation ([`extract::header_sync`])
//! - log extraction against the checked-header ledger
//!   ([`extract::log_extractor`])
//! - storage diff ingestion and decoding ([`storage_diffs`])
//!
//! Every write path is an idempotent upsert, so delivery is at-least-once
//! with exactly-once effects.

pub mod chain;
pub mod config;
pub mod error;
pub mod extract;
pub mod storage;
pub mod storage_diffs;
pub mod transform;
pub mod watcher;

pub use error::{IndexerError, Result};
