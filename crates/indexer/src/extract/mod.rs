//! Extraction pipelines: header back-fill and log extraction.

pub mod header_sync;
pub mod log_extractor;

pub use header_sync::{sync_missing_headers, validate_recent_headers};
pub use log_extractor::{LogExtraction, LogExtractor, LogExtractorBuilder, RecheckMode};
