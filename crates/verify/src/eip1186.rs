//! Verifies EIP-1186 style account and storage proofs.
//!
//! The account proof is checked against a block state root, the storage proof
//! against the storage root of the account.

use ethers::{
    types::{H256, U256},
    utils::keccak256,
};
use thiserror::Error;
use xchain_types::{
    artifact::{Account, AccountProofArtifact, StorageProofArtifact},
    utils::hex_encode,
};

use crate::proof::{ProofError, SingleProofPath, Verified};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Proof not valid for account {account}, ProofError {source}")]
    ProofError { source: ProofError, account: String },
    #[error("A valid exclusion proof exists, but the claimed account {0} is not empty")]
    ClaimedAccountNotEmpty(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error(
        "Proof not valid for account {account} storage key {storage_key}, ProofError {source}"
    )]
    ProofError {
        source: ProofError,
        account: String,
        storage_key: String,
    },
    #[error("A valid exclusion proof exists, but the claimed storage value {0} is not zero")]
    ClaimedStorageNotEmpty(String),
}

/// Leaf value of an account in the state trie: rlp([nonce, balance, storageHash, codeHash]).
pub fn account_leaf_value(account: &Account) -> Vec<u8> {
    rlp::encode(account).to_vec()
}

/// Leaf value of a storage slot: rlp of the word with leading zeros removed.
pub fn storage_leaf_value(value: U256) -> Vec<u8> {
    rlp::encode(&value).to_vec()
}

/// Verifies an account proof with respect to a trusted state root.
///
/// An exclusion proof is accepted only if the claimed account is empty.
pub fn verify_account_proof(
    state_root: H256,
    artifact: &AccountProofArtifact,
) -> Result<Verified, AccountError> {
    let account_proof = SingleProofPath {
        proof: artifact.nodes.clone(),
        root: state_root,
        path: keccak256(artifact.address.as_bytes()),
        claimed_value: account_leaf_value(&artifact.account),
    };
    let verified = account_proof
        .verify()
        .map_err(|source| AccountError::ProofError {
            source,
            account: hex_encode(artifact.address),
        })?;
    match verified {
        Verified::Exclusion if !artifact.account.is_empty() => Err(
            AccountError::ClaimedAccountNotEmpty(hex_encode(artifact.address)),
        ),
        verified => Ok(verified),
    }
}

/// Verifies a storage proof with respect to a trusted storage root.
///
/// An exclusion proof is accepted only if the claimed value is zero.
pub fn verify_storage_proof(
    storage_root: H256,
    artifact: &StorageProofArtifact,
) -> Result<Verified, StorageError> {
    let claimed_value = U256::from_big_endian(artifact.claimed_value.as_bytes());
    let storage_proof = SingleProofPath {
        proof: artifact.nodes.clone(),
        root: storage_root,
        path: keccak256(artifact.slot_key.as_bytes()),
        claimed_value: storage_leaf_value(claimed_value),
    };
    let verified = storage_proof
        .verify()
        .map_err(|source| StorageError::ProofError {
            source,
            account: hex_encode(artifact.account_address),
            storage_key: hex_encode(artifact.slot_key.as_bytes()),
        })?;
    match verified {
        Verified::Exclusion if !claimed_value.is_zero() => Err(
            StorageError::ClaimedStorageNotEmpty(hex_encode(artifact.claimed_value)),
        ),
        verified => Ok(verified),
    }
}
