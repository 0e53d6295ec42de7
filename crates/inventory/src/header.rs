//! Block header as returned by eth_getBlockByHash, and its RLP form.
//!
//! Fields added by later forks are optional. They are appended to the RLP
//! list in fork order, up to the first one that is absent.
use ethers::{
    types::{Bloom, Bytes, H160, H256, H64, U256, U64},
    utils::keccak256,
};
use rlp::{Encodable, RlpStream};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub parent_hash: H256,
    #[serde(rename = "sha3Uncles")]
    pub ommers_hash: H256,
    pub miner: H160,
    pub state_root: H256,
    pub transactions_root: H256,
    pub receipts_root: H256,
    pub logs_bloom: Bloom,
    pub difficulty: U256,
    pub number: U64,
    pub gas_limit: U256,
    pub gas_used: U256,
    pub timestamp: U256,
    pub extra_data: Bytes,
    pub mix_hash: H256,
    pub nonce: H64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_fee_per_gas: Option<U256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawals_root: Option<H256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_gas_used: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excess_blob_gas: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<H256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests_hash: Option<H256>,
    /// Hash reported by the node. Not trusted, see [`BlockHeader::hash`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<H256>,
}

impl BlockHeader {
    /// keccak256(rlp(header)), computed from the fields.
    pub fn hash(&self) -> H256 {
        H256(keccak256(self.rlp_bytes()))
    }

    pub fn rlp_bytes(&self) -> Vec<u8> {
        rlp::encode(self).to_vec()
    }
}

impl Encodable for BlockHeader {
    fn rlp_append(&self, s: &mut RlpStream) {
        s.begin_unbounded_list();
        s.append(&self.parent_hash);
        s.append(&self.ommers_hash);
        s.append(&self.miner);
        s.append(&self.state_root);
        s.append(&self.transactions_root);
        s.append(&self.receipts_root);
        s.append(&self.logs_bloom.as_bytes().to_vec());
        s.append(&self.difficulty);
        s.append(&self.number);
        s.append(&self.gas_limit);
        s.append(&self.gas_used);
        s.append(&self.timestamp);
        s.append(&self.extra_data.to_vec());
        s.append(&self.mix_hash);
        s.append(&self.nonce.as_bytes().to_vec());

        let fork_fields: [Option<Vec<u8>>; 6] = [
            self.base_fee_per_gas.map(|fee| rlp::encode(&fee).to_vec()),
            self.withdrawals_root.map(|root| rlp::encode(&root).to_vec()),
            self.blob_gas_used.map(|gas| rlp::encode(&gas).to_vec()),
            self.excess_blob_gas.map(|gas| rlp::encode(&gas).to_vec()),
            self.parent_beacon_block_root
                .map(|root| rlp::encode(&root).to_vec()),
            self.requests_hash.map(|hash| rlp::encode(&hash).to_vec()),
        ];
        for encoded in fork_fields.iter().map_while(Option::as_ref) {
            s.append_raw(encoded, 1);
        }
        s.finalize_unbounded_list();
    }
}
