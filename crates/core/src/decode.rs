//! Decoding of raw 32-byte storage words into their declared values.

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, U256};

use crate::error::CoreError;
use crate::slot::{SlotMetadata, ValueType};

/// A decoded storage value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedValue {
    /// A single rendered value.
    Single(String),
    /// A packed slot: one rendered value per declared segment index,
    /// index 0 being the least-significant segment.
    Packed(BTreeMap<usize, String>),
}

/// Decode a 32-byte storage value according to its slot metadata.
///
/// Integer types render as decimal strings, addresses as EIP-55 checksummed
/// hex, `Bytes32` as `0x`-prefixed hex. `PackedSlot` values split into
/// segments starting from the least-significant bits.
pub fn decode(value: B256, metadata: &SlotMetadata) -> Result<DecodedValue, CoreError> {
    match metadata.value_type {
        ValueType::PackedSlot => {
            let layout =
                metadata
                    .packed_types
                    .as_deref()
                    .ok_or_else(|| CoreError::MissingPackedLayout {
                        name: metadata.name.clone(),
                    })?;
            decode_packed(value, layout).map(DecodedValue::Packed)
        }
        single => decode_single(value, single).map(DecodedValue::Single),
    }
}

fn decode_single(value: B256, value_type: ValueType) -> Result<String, CoreError> {
    match value_type {
        ValueType::Address => {
            let address = Address::from_slice(&value[12..]);
            Ok(address.to_checksum(None))
        }
        ValueType::Bytes32 => Ok(format!("{}", value)),
        ValueType::PackedSlot => Err(CoreError::UnexpectedValueType(value_type.to_string())),
        integer => {
            let width = integer
                .bit_width()
                .expect("integer value types have a fixed width");
            let word = U256::from_be_bytes(value.0);
            Ok(low_bits(word, width).to_string())
        }
    }
}

fn decode_packed(value: B256, layout: &[ValueType]) -> Result<BTreeMap<usize, String>, CoreError> {
    let mut declared = 0usize;
    for (index, segment) in layout.iter().enumerate() {
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

    let word = U256::from_be_bytes(value.0);
    let mut decoded = BTreeMap::new();
    let mut shift = 0usize;
    for (index, segment) in layout.iter().enumerate() {
        let width = segment.bit_width().expect("validated above");
        let bits = low_bits(word >> shift, width);
        decoded.insert(index, bits.to_string());
        shift += width;
    }
    Ok(decoded)
}

fn low_bits(word: U256, width: usize) -> U256 {
    if width >= 256 {
        return word;
    }
    let mask = (U256::from(1u8) << width) - U256::from(1u8);
    word & mask
}
