//! Verification of Merkle Patricia Trie proofs of the form returned by
//! eth_getProof, and the strict RLP encoding used to ship them.
pub mod codec;
pub mod eip1186;
#[cfg(any(test, feature = "test-utils"))]
pub mod fixture;
pub mod node;
pub mod path;
pub mod proof;
