//! Proof artifacts produced from RPC responses.
//!
//! Nothing in this module is trusted. Node lists and claimed values are
//! whatever the RPC node returned, until verified under a root obtained from
//! outside the RPC node.

use ethers::types::{Bytes, H160, H256, U256, U64};
use rlp_derive::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{EMPTY_TRIE_ROOT, KECCAK_EMPTY},
    key::StorageKey,
};

/// Account fields as committed to in the state trie leaf.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, RlpEncodable, RlpDecodable)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub nonce: U64,
    pub balance: U256,
    pub storage_hash: H256,
    pub code_hash: H256,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            nonce: U64::zero(),
            balance: U256::zero(),
            storage_hash: EMPTY_TRIE_ROOT,
            code_hash: KECCAK_EMPTY,
        }
    }
}

impl Account {
    /// An account that is absent from the state trie is indistinguishable
    /// from this one.
    pub fn is_empty(&self) -> bool {
        self.nonce.is_zero()
            && self.balance.is_zero()
            && self.storage_hash == EMPTY_TRIE_ROOT
            && self.code_hash == KECCAK_EMPTY
    }
}

/// Account proof for one address at one block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProofArtifact {
    pub block_hash: H256,
    pub address: H160,
    /// Trie nodes from the state root towards the account leaf.
    pub nodes: Vec<Bytes>,
    /// Account fields the RPC node claims are in the leaf.
    pub account: Account,
}

/// Storage proof for one balance mapping entry of a token contract.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProofArtifact {
    pub block_hash: H256,
    pub account_address: H160,
    pub slot_index: u8,
    pub slot_key: StorageKey,
    /// Trie nodes from the storage root towards the slot leaf.
    pub nodes: Vec<Bytes>,
    pub claimed_value: H256,
    /// Storage root the RPC node claims for the account.
    pub storage_root: H256,
}

/// Outcome of probing one slot index during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotGuess {
    pub slot_index: u8,
    pub observed_balance: U256,
    pub matched: bool,
}
