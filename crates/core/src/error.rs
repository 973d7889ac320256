//! Error types for the core crate.

use thiserror::Error;

/// Core error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A packed slot layout declares more bits than a storage word holds.
    #[error("packed slot layout declares {declared} bits, exceeding the 256-bit word")]
    PackedWidthMismatch {
        /// Total bit width declared across all packed segments.
        declared: usize,
    },

    /// A packed slot layout contains a segment that is not a fixed-width integer.
    #[error("packed slot segment {index} has no fixed bit width ({value_type})")]
    InvalidPackedSegment {
        /// Position of the offending segment, counted from the low bits.
        index: usize,
        /// The declared type of the segment.
        value_type: String,
    },

    /// Metadata declares a packed slot but carries no segment layout.
    #[error("packed slot metadata for '{name}' has no segment layout")]
    MissingPackedLayout {
        /// Name of the slot.
        name: String,
    },

    /// A value was decoded against metadata of an incompatible type.
    #[error("cannot decode value type {0} here")]
    UnexpectedValueType(String),

    /// Invalid hex encoding.
    #[error("invalid hex encoding")]
    InvalidHex,
}

/// Result type alias for CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;
