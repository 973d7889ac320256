//! # chainsift core
//!
//! Core building blocks shared by the chainsift indexing pipeline:
//!
//! - **Ethereum types**: re-exports of Alloy primitives (`Address`, `B256`, `U256`)
//! - **Slot metadata**: the declared meaning of a contract storage slot
//! - **Decoding**: turning a raw 32-byte storage word into its declared value(s)
//! - **Hashing**: keccak256 helpers matching the node's secure-trie layout

#![warn(missing_docs)]

pub mod decode;
pub mod error;
pub mod hashing;
pub mod slot;

pub use decode::{decode, DecodedValue};
pub use error::{CoreError, Result};
pub use hashing::{hash_contract_address, keccak256};
pub use slot::{KeyRole, SlotMetadata, ValueType};

// Re-export Alloy primitives for convenience
pub use alloy_primitives::{Address, B256, U256};
