use ethers::{
    types::{H160, H256, U256},
    utils::keccak256,
};
use serde::{Deserialize, Serialize};

/// Location of one entry of a `mapping(address => uint256)` in contract storage.
///
/// keccak256(leftPad32(holder) ++ leftPad32(slot)).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct StorageKey(pub H256);

impl StorageKey {
    pub fn for_mapping(holder: H160, slot: impl Into<U256>) -> Self {
        let slot: U256 = slot.into();
        let mut preimage = [0u8; 64];
        preimage[12..32].copy_from_slice(holder.as_bytes());
        slot.to_big_endian(&mut preimage[32..]);
        Self(H256(keccak256(preimage)))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl From<StorageKey> for H256 {
    fn from(key: StorageKey) -> Self {
        key.0
    }
}
