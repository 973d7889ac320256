//! Hashing utilities matching the node's secure-trie layout.

use alloy_primitives::{keccak256 as alloy_keccak256, Address, B256};

/// Compute keccak256 of the input data.
///
/// Re-export of Alloy's keccak256 for convenience.
pub fn keccak256(data: impl AsRef<[u8]>) -> B256 {
    alloy_keccak256(data)
}

/// Hash a contract address to its 32-byte secure-trie form.
///
/// Storage diffs identify the contract by `keccak256(address)`, the same key
/// the node uses for the account in the state trie.
pub fn hash_contract_address(address: &Address) -> B256 {
    alloy_keccak256(address.as_slice())
}
