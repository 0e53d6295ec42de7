//! Fetches account and storage proofs and block headers.
//!
//! Everything returned here is still untrusted. The checks made are the ones
//! that catch a node answering a different question than the one asked.
use ethers::types::{H160, H256};
use log::debug;
use thiserror::Error;
use xchain_types::{
    artifact::{Account, AccountProofArtifact, StorageProofArtifact},
    constants::EMPTY_TRIE_ROOT,
    key::StorageKey,
    utils::{hex_encode, word_from_u256},
};

use crate::{
    header::BlockHeader,
    rpc::{BlockRef, EthApi, RpcError},
};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("RPC error {0}")]
    Rpc(#[from] RpcError),
    #[error("Proof is for address {returned}, requested {requested}")]
    AddressMismatch { requested: String, returned: String },
    #[error("Proof has no nodes for address {0}")]
    EmptyProof(String),
    #[error("Storage proof is for key {returned}, requested {requested}")]
    ProofKeyMismatch { requested: String, returned: String },
    #[error("Response to eth_getProof has no storage proof for key {0}")]
    MissingStorageProof(String),
    #[error("Block {0} not found")]
    BlockNotFound(String),
    #[error("Header fields hash to {computed}, requested block {requested}")]
    HeaderHashMismatch { requested: String, computed: String },
}

pub struct ProofFetcher<'a, A: EthApi> {
    api: &'a A,
}

impl<'a, A: EthApi> ProofFetcher<'a, A> {
    pub fn new(api: &'a A) -> Self {
        Self { api }
    }

    pub async fn fetch_account_proof(
        &self,
        block_hash: H256,
        address: H160,
    ) -> Result<AccountProofArtifact, FetchError> {
        let response = self
            .api
            .get_proof(address, vec![], BlockRef::Hash(block_hash))
            .await?;
        if response.address != address {
            return Err(FetchError::AddressMismatch {
                requested: hex_encode(address),
                returned: hex_encode(response.address),
            });
        }
        if response.account_proof.is_empty() {
            return Err(FetchError::EmptyProof(hex_encode(address)));
        }
        debug!(
            "Account proof for {} at {} has {} nodes",
            hex_encode(address),
            hex_encode(block_hash),
            response.account_proof.len()
        );
        Ok(AccountProofArtifact {
            block_hash,
            address,
            nodes: response.account_proof,
            account: Account {
                nonce: response.nonce,
                balance: response.balance,
                storage_hash: response.storage_hash,
                code_hash: response.code_hash,
            },
        })
    }

    /// Proof of `balances[holder]` for a mapping at `slot_index` of `address`.
    pub async fn fetch_storage_proof(
        &self,
        block_hash: H256,
        address: H160,
        slot_index: u8,
        holder: H160,
    ) -> Result<StorageProofArtifact, FetchError> {
        let slot_key = StorageKey::for_mapping(holder, slot_index);
        let response = self
            .api
            .get_proof(address, vec![slot_key.into()], BlockRef::Hash(block_hash))
            .await?;
        if response.address != address {
            return Err(FetchError::AddressMismatch {
                requested: hex_encode(address),
                returned: hex_encode(response.address),
            });
        }
        let entry = response
            .storage_proof
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::MissingStorageProof(hex_encode(slot_key.as_bytes())))?;
        // Nodes report the key as a quantity, so compare as 32 byte words.
        let returned_key = word_from_u256(entry.key);
        if returned_key != slot_key.0 {
            return Err(FetchError::ProofKeyMismatch {
                requested: hex_encode(slot_key.as_bytes()),
                returned: hex_encode(returned_key),
            });
        }
        // Only an empty storage trie has an empty proof.
        if entry.proof.is_empty() && response.storage_hash != EMPTY_TRIE_ROOT {
            return Err(FetchError::EmptyProof(hex_encode(address)));
        }
        Ok(StorageProofArtifact {
            block_hash,
            account_address: address,
            slot_index,
            slot_key,
            nodes: entry.proof,
            claimed_value: word_from_u256(entry.value),
            storage_root: response.storage_hash,
        })
    }

    /// Header of the block, checked to hash to the requested block hash.
    pub async fn fetch_block_header(&self, block_hash: H256) -> Result<BlockHeader, FetchError> {
        let header = self
            .api
            .get_block_by_hash(block_hash)
            .await?
            .ok_or_else(|| FetchError::BlockNotFound(hex_encode(block_hash)))?;
        let computed = header.hash();
        if computed != block_hash {
            return Err(FetchError::HeaderHashMismatch {
                requested: hex_encode(block_hash),
                computed: hex_encode(computed),
            });
        }
        Ok(header)
    }

    /// RLP serialized header of the block.
    pub async fn header_rlp(&self, block_hash: H256) -> Result<Vec<u8>, FetchError> {
        Ok(self.fetch_block_header(block_hash).await?.rlp_bytes())
    }
}
