//! Runs the whole pipeline for one eligibility request: token metadata, slot
//! discovery, header, account proof and storage proof, plus their encodings
//! for the external verifier.
use ethers::types::{Bytes, H160, H256};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xchain_types::{
    artifact::{AccountProofArtifact, SlotGuess, StorageProofArtifact},
    utils::hex_encode,
};
use xchain_verify::{
    codec::{CodecError, EncodedProof},
    eip1186::{verify_account_proof, verify_storage_proof, AccountError, StorageError},
    proof::Verified,
};

use crate::{
    discovery::{DiscoveryConfig, DiscoveryError, DiscoveryOutcome, SlotDiscovery},
    fetch::{FetchError, ProofFetcher},
    header::BlockHeader,
    rpc::{BlockRef, EthApi, RpcError},
    token::{TokenDetails, TokenError, TokenIntrospector},
};

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Endpoint serves chain {reported}, requested chain {requested}")]
    ChainMismatch { requested: u64, reported: u64 },
    #[error("Codec error {0}")]
    Codec(#[from] CodecError),
    #[error("Discovery error {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("Fetch error {0}")]
    Fetch(#[from] FetchError),
    #[error("RPC error {0}")]
    Rpc(#[from] RpcError),
    #[error("Token error {0}")]
    Token(#[from] TokenError),
    #[error("Account proof error {0}")]
    Account(#[from] AccountError),
    #[error("Storage proof error {0}")]
    Storage(#[from] StorageError),
    #[error("Storage proof is against root {storage}, the account commits to {account}")]
    StorageRootMismatch { storage: String, account: String },
    #[error("Proof of {0} shows absence, expected inclusion")]
    NotInclusion(&'static str),
}

/// Inbound request: prove `holder`'s balance of `token` at `block_hash` on `chain_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    pub chain_id: u64,
    pub block_hash: H256,
    pub token: H160,
    pub holder: H160,
}

/// Everything the external verifier needs for one request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofBundle {
    pub request: ProofRequest,
    pub token: TokenDetails,
    pub slot: SlotGuess,
    pub header: BlockHeader,
    pub header_rlp: Bytes,
    pub state_root: H256,
    pub account: AccountProofArtifact,
    pub storage: StorageProofArtifact,
    pub account_proof: EncodedProof,
    pub storage_proof: EncodedProof,
}

impl ProofBundle {
    /// Checks both proofs the way the external verifier will, taking the
    /// header state root as trusted.
    pub fn verify_locally(&self) -> Result<(), BundleError> {
        if verify_account_proof(self.state_root, &self.account)? != Verified::Inclusion {
            return Err(BundleError::NotInclusion("account"));
        }
        let account_storage_root = self.account.account.storage_hash;
        if self.storage.storage_root != account_storage_root {
            return Err(BundleError::StorageRootMismatch {
                storage: hex_encode(self.storage.storage_root),
                account: hex_encode(account_storage_root),
            });
        }
        if verify_storage_proof(account_storage_root, &self.storage)? != Verified::Inclusion {
            return Err(BundleError::NotInclusion("storage"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleOutcome {
    Ready(Box<ProofBundle>),
    /// Discovery did not find the balance; the holder cannot be proven eligible.
    Ineligible(DiscoveryOutcome),
}

pub async fn prove<A: EthApi>(
    api: &A,
    request: &ProofRequest,
    config: DiscoveryConfig,
) -> Result<BundleOutcome, BundleError> {
    let reported = api.chain_id().await?.as_u64();
    if reported != request.chain_id {
        return Err(BundleError::ChainMismatch {
            requested: request.chain_id,
            reported,
        });
    }
    let token = TokenIntrospector::new(api, request.chain_id)
        .describe(request.token)
        .await?;
    info!(
        "Proving {} balance of {} on chain {}",
        token.symbol,
        hex_encode(request.holder),
        request.chain_id
    );

    let fetcher = ProofFetcher::new(api);
    let header = fetcher.fetch_block_header(request.block_hash).await?;

    let outcome = SlotDiscovery::new(api, config)
        .discover_for_holder(
            request.token,
            request.holder,
            BlockRef::Hash(request.block_hash),
            request.chain_id,
        )
        .await?;
    let slot = match outcome {
        DiscoveryOutcome::Found(slot) => slot,
        other => return Ok(BundleOutcome::Ineligible(other)),
    };

    let account = fetcher
        .fetch_account_proof(request.block_hash, request.token)
        .await?;
    let storage = fetcher
        .fetch_storage_proof(
            request.block_hash,
            request.token,
            slot.slot_index,
            request.holder,
        )
        .await?;

    let bundle = ProofBundle {
        request: *request,
        token,
        slot,
        header_rlp: header.rlp_bytes().into(),
        state_root: header.state_root,
        header,
        account_proof: EncodedProof::from_nodes(&account.nodes)?,
        storage_proof: EncodedProof::from_nodes(&storage.nodes)?,
        account,
        storage,
    };
    Ok(BundleOutcome::Ready(Box::new(bundle)))
}
