//! Storage slot metadata: the declared meaning of a contract storage slot key.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The declared type of a storage slot value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// Full-word unsigned integer.
    Uint256,
    /// 128-bit unsigned integer.
    Uint128,
    /// 64-bit unsigned integer.
    Uint64,
    /// 48-bit unsigned integer (timestamps in many contract layouts).
    Uint48,
    /// 32-bit unsigned integer.
    Uint32,
    /// 20-byte account address stored in the low bytes of the word.
    Address,
    /// Opaque 32 bytes.
    Bytes32,
    /// A word holding several fields, laid out from the least-significant bits upward.
    PackedSlot,
}

impl ValueType {
    /// Bit width of the value, for fixed-width integer types.
    ///
    /// Returns `None` for `Address`, `Bytes32`, and `PackedSlot`, which are not
    /// eligible as packed-slot segments.
    pub const fn bit_width(&self) -> Option<usize> {
        match self {
            ValueType::Uint256 => Some(256),
            ValueType::Uint128 => Some(128),
            ValueType::Uint64 => Some(64),
            ValueType::Uint48 => Some(48),
            ValueType::Uint32 => Some(32),
            ValueType::Address | ValueType::Bytes32 | ValueType::PackedSlot => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueType::Uint256 => "uint256",
            ValueType::Uint128 => "uint128",
            ValueType::Uint64 => "uint64",
            ValueType::Uint48 => "uint48",
            ValueType::Uint32 => "uint32",
            ValueType::Address => "address",
            ValueType::Bytes32 => "bytes32",
            ValueType::PackedSlot => "packed_slot",
        };
        write!(f, "{}", s)
    }
}

/// What a mapping key contributing to a slot hash stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    /// An account address.
    Guy,
    /// A collateral type identifier.
    Ilk,
    /// An auction contract address.
    Flip,
    /// An auction bid identifier.
    Bid,
    /// A timestamp component.
    Timestamp,
}

/// The declared meaning of a storage slot: its name, the mapping keys that
/// produced it, and how to decode its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotMetadata {
    /// Human-readable slot name, e.g. `"ilk_rate"`.
    pub name: String,

    /// Mapping keys that contribute to the slot hash, by role.
    pub keys: BTreeMap<KeyRole, String>,

    /// How the 32-byte value decodes.
    pub value_type: ValueType,

    /// For `PackedSlot` values: segment types in declaration order, index 0
    /// occupying the least-significant bits.
    pub packed_types: Option<Vec<ValueType>>,
}

impl SlotMetadata {
    /// Metadata for a single-valued slot.
    pub fn new(
        name: impl Into<String>,
        keys: BTreeMap<KeyRole, String>,
        value_type: ValueType,
    ) -> Self {
        SlotMetadata {
            name: name.into(),
            keys,
            value_type,
            packed_types: None,
        }
    }

    /// Metadata for a packed slot, validating the segment layout once.
    ///
    /// Every segment must be a fixed-width integer type and the widths must fit
    /// in a 256-bit word. Layouts narrower than a full word are legal; the
    /// unused high bits are expected to be zero.
    pub fn packed(
        name: impl Into<String>,
        keys: BTreeMap<KeyRole, String>,
        packed_types: Vec<ValueType>,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        if packed_types.is_empty() {
            return Err(CoreError::MissingPackedLayout { name });
        }

        let mut declared = 0usize;
        for (index, segment) in packed_types.iter().enumerate() {
            let width = segment
                .bit_width()
                .ok_or_else(|| CoreError::InvalidPackedSegment {
                    index,
                    value_type: segment.to_string(),
                })?;
            declared += width;
        }
        if declared > 256 {
            return Err(CoreError::PackedWidthMismatch { declared });
        }

        Ok(SlotMetadata {
            name,
            keys,
            value_type: ValueType::PackedSlot,
            packed_types: Some(packed_types),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_widths() {
        assert_eq!(ValueType::Uint256.bit_width(), Some(256));
        assert_eq!(ValueType::Uint48.bit_width(), Some(48));
        assert_eq!(ValueType::Address.bit_width(), None);
        assert_eq!(ValueType::PackedSlot.bit_width(), None);
    }

    #[test]
    fn test_packed_layout_accepts_partial_word() {
        let metadata = SlotMetadata::packed(
            "ilk_duty_rho",
            BTreeMap::new(),
            vec![ValueType::Uint48, ValueType::Uint48],
        )
        .unwrap();
        assert_eq!(metadata.value_type, ValueType::PackedSlot);
        assert_eq!(metadata.packed_types.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_packed_layout_rejects_overflow() {
        let err = SlotMetadata::packed(
            "too_wide",
            BTreeMap::new(),
            vec![ValueType::Uint256, ValueType::Uint32],
        )
        .unwrap_err();
        assert_eq!(err, CoreError::PackedWidthMismatch { declared: 288 });
    }

    #[test]
    fn test_packed_layout_rejects_non_integer_segment() {
        let err = SlotMetadata::packed(
            "bad_segment",
            BTreeMap::new(),
            vec![ValueType::Uint48, ValueType::Address],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidPackedSegment { index: 1, .. }
        ));
    }

    #[test]
    fn test_packed_layout_rejects_empty() {
        let err = SlotMetadata::packed("empty", BTreeMap::new(), vec![]).unwrap_err();
        assert!(matches!(err, CoreError::MissingPackedLayout { .. }));
    }
}
