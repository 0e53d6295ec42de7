//! A single-block chain held in memory, answering JSON-RPC calls from real
//! tries so that served proofs verify against the served header.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    str::FromStr,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use ethers::{
    abi::{self, Token},
    types::{
        Bloom, Bytes, EIP1186ProofResponse, StorageProof, H160, H256, H64, U256, U64,
    },
    utils::id,
};
use serde::Deserialize;
use serde_json::{json, Value};
use xchain_inventory::{
    header::BlockHeader,
    rpc::{EthApi, RpcError},
};
use xchain_types::{artifact::Account, key::StorageKey};
use xchain_verify::fixture::MemoryTrie;

pub const POLYGON: u64 = 137;

pub fn token_address() -> H160 {
    H160::from_str("0x7ceb23fd6bc0add59e62ac25578270cff1b9f619").unwrap()
}

pub fn holder_address() -> H160 {
    H160::from_str("0x1111111254eeb25477b68fb85ed929f73a960582").unwrap()
}

pub fn five_tokens() -> U256 {
    U256::exp10(18) * 5
}

/// Ways the mock can misbehave.
#[derive(Debug, Clone, Copy, Default)]
pub struct Misbehaviour {
    /// eth_getProof reports a different storage key than requested.
    pub wrong_storage_key: bool,
    /// eth_getBlockByHash serves a header whose fields do not hash to the block hash.
    pub tampered_header: bool,
    /// eth_getStorageAt fails with a rate limit error for this slot index.
    pub storage_error_at: Option<u8>,
}

#[derive(Debug, Default)]
pub struct MockChainBuilder {
    chain_id: u64,
    /// (slot index, holder) -> balance word written to token storage.
    mapping_entries: Vec<(u8, H160, U256)>,
    /// Balance reported by balanceOf.
    balances: HashMap<H160, U256>,
    misbehaviour: Misbehaviour,
}

impl MockChainBuilder {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            ..Default::default()
        }
    }

    /// Writes `balance` under the mapping at `slot_index` and reports it from balanceOf.
    pub fn with_balance(mut self, slot_index: u8, holder: H160, balance: U256) -> Self {
        self.mapping_entries.push((slot_index, holder, balance));
        self.balances.insert(holder, balance);
        self
    }

    /// Writes a mapping entry without changing what balanceOf reports.
    pub fn with_storage(mut self, slot_index: u8, holder: H160, value: U256) -> Self {
        self.mapping_entries.push((slot_index, holder, value));
        self
    }

    /// Sets what balanceOf reports without writing storage.
    pub fn with_reported_balance(mut self, holder: H160, balance: U256) -> Self {
        self.balances.insert(holder, balance);
        self
    }

    pub fn misbehaving(mut self, misbehaviour: Misbehaviour) -> Self {
        self.misbehaviour = misbehaviour;
        self
    }

    pub fn build(self) -> MockChain {
        let mut storage_trie = MemoryTrie::default();
        let mut storage = HashMap::new();
        for (slot_index, holder, value) in &self.mapping_entries {
            let key = StorageKey::for_mapping(*holder, *slot_index);
            storage_trie.insert_storage(key, *value);
            storage.insert(key.0, *value);
        }
        // Unrelated storage so the trie has some depth.
        for filler in 0u64..24 {
            let key = StorageKey::for_mapping(H160::from_low_u64_be(0xf000 + filler), 0x1u8);
            let value = U256::from(filler + 1);
            storage_trie.insert_storage(key, value);
            storage.insert(key.0, value);
        }

        let token_account = Account {
            nonce: U64::one(),
            balance: U256::zero(),
            storage_hash: storage_trie.root(),
            code_hash: H256::repeat_byte(0xc0),
        };
        let mut state_trie = MemoryTrie::default();
        for filler in 1u64..48 {
            let account = Account {
                nonce: U64::from(filler),
                balance: U256::from(filler) * U256::exp10(15),
                ..Default::default()
            };
            state_trie.insert_account(H160::from_low_u64_be(filler), &account);
        }
        state_trie.insert_account(token_address(), &token_account);

        let mut header = BlockHeader {
            parent_hash: H256::repeat_byte(0x01),
            ommers_hash: H256::from_str(
                "0x1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347",
            )
            .unwrap(),
            miner: H160::zero(),
            state_root: state_trie.root(),
            transactions_root: H256::repeat_byte(0x02),
            receipts_root: H256::repeat_byte(0x03),
            logs_bloom: Bloom::zero(),
            difficulty: U256::from(2),
            number: U64::from(48_000_000u64),
            gas_limit: U256::from(30_000_000u64),
            gas_used: U256::from(12_345_678u64),
            timestamp: U256::from(1_690_000_000u64),
            extra_data: Bytes::from(vec![0xd8; 97]),
            mix_hash: H256::zero(),
            nonce: H64::zero(),
            base_fee_per_gas: Some(U256::from(30_000_000_000u64)),
            withdrawals_root: None,
            blob_gas_used: None,
            excess_blob_gas: None,
            parent_beacon_block_root: None,
            requests_hash: None,
            hash: None,
        };
        let block_hash = header.hash();
        header.hash = Some(block_hash);

        MockChain {
            chain_id: self.chain_id,
            block_hash,
            header,
            token_account,
            storage,
            storage_trie,
            state_trie,
            balances: self.balances,
            misbehaviour: self.misbehaviour,
            storage_reads: AtomicUsize::new(0),
        }
    }
}

pub struct MockChain {
    pub chain_id: u64,
    pub block_hash: H256,
    pub header: BlockHeader,
    pub token_account: Account,
    storage: HashMap<H256, U256>,
    storage_trie: MemoryTrie,
    state_trie: MemoryTrie,
    balances: HashMap<H160, U256>,
    misbehaviour: Misbehaviour,
    storage_reads: AtomicUsize,
}

#[derive(Deserialize)]
struct CallRequest {
    to: H160,
    data: Bytes,
}

fn bad_params(method: &str, e: impl ToString) -> RpcError {
    RpcError::Rpc {
        method: method.to_string(),
        code: -32602,
        message: e.to_string(),
    }
}

fn param<T: for<'de> Deserialize<'de>>(
    method: &str,
    params: &[Value],
    index: usize,
) -> Result<T, RpcError> {
    let value = params.get(index).cloned().unwrap_or(Value::Null);
    serde_json::from_value(value).map_err(|e| bad_params(method, e))
}

fn reverted(method: &str) -> RpcError {
    RpcError::Rpc {
        method: method.to_string(),
        code: 3,
        message: "execution reverted".to_string(),
    }
}

impl MockChain {
    pub fn storage_reads(&self) -> usize {
        self.storage_reads.load(Ordering::SeqCst)
    }

    /// Fails any state read not made against the served block.
    fn check_block(&self, method: &str, params: &[Value], index: usize) -> Result<(), RpcError> {
        let block: String = param(method, params, index)?;
        match block == "latest" || H256::from_str(&block).ok() == Some(self.block_hash) {
            true => Ok(()),
            false => Err(RpcError::Rpc {
                method: method.to_string(),
                code: -32000,
                message: format!("header not found {block}"),
            }),
        }
    }

    fn storage_at(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let address: H160 = param(method, params, 0)?;
        let key: H256 = param(method, params, 1)?;
        self.check_block(method, params, 2)?;
        self.storage_reads.fetch_add(1, Ordering::SeqCst);
        if let Some(slot_index) = self.misbehaviour.storage_error_at {
            let holder_key = StorageKey::for_mapping(holder_address(), slot_index);
            if key == holder_key.0 {
                return Err(RpcError::Rpc {
                    method: method.to_string(),
                    code: -32005,
                    message: "rate limit exceeded".to_string(),
                });
            }
        }
        let value = match address == token_address() {
            true => self.storage.get(&key).copied().unwrap_or_default(),
            false => U256::zero(),
        };
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        Ok(json!(H256(word)))
    }

    fn proof(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let address: H160 = param(method, params, 0)?;
        let keys: Vec<H256> = param(method, params, 1)?;
        self.check_block(method, params, 2)?;
        let is_token = address == token_address();
        let account = match is_token {
            true => self.token_account.clone(),
            false => Account::default(),
        };
        let storage_proof = keys
            .iter()
            .map(|key| {
                let value = match is_token {
                    true => self.storage.get(key).copied().unwrap_or_default(),
                    false => U256::zero(),
                };
                let proof = match is_token {
                    true => self.storage_trie.proof(key.as_bytes()),
                    false => vec![],
                };
                let reported_key = match self.misbehaviour.wrong_storage_key {
                    true => U256::from_big_endian(&[0xee; 32]),
                    false => U256::from_big_endian(key.as_bytes()),
                };
                StorageProof {
                    key: reported_key,
                    proof,
                    value,
                }
            })
            .collect();
        let response = EIP1186ProofResponse {
            address,
            balance: account.balance,
            code_hash: account.code_hash,
            nonce: account.nonce,
            storage_hash: account.storage_hash,
            account_proof: self.state_trie.proof(address.as_bytes()),
            storage_proof,
        };
        serde_json::to_value(response).map_err(|e| bad_params(method, e))
    }

    fn block_by_hash(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let hash: H256 = param(method, params, 0)?;
        if hash != self.block_hash {
            return Ok(Value::Null);
        }
        let mut header = self.header.clone();
        if self.misbehaviour.tampered_header {
            header.gas_used += U256::one();
        }
        serde_json::to_value(header).map_err(|e| bad_params(method, e))
    }

    fn eth_call(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let call: CallRequest = param(method, params, 0)?;
        self.check_block(method, params, 1)?;
        if call.to != token_address() || call.data.len() < 4 {
            return Err(reverted(method));
        }
        let (selector, args) = call.data.split_at(4);
        let output = if selector == id("name()") {
            abi::encode(&[Token::String("Wrapped Ether".to_string())])
        } else if selector == id("symbol()") {
            abi::encode(&[Token::String("WETH".to_string())])
        } else if selector == id("decimals()") {
            abi::encode(&[Token::Uint(U256::from(18))])
        } else if selector == id("totalSupply()") {
            abi::encode(&[Token::Uint(U256::exp10(24))])
        } else if selector == id("balanceOf(address)") && args.len() == 32 {
            let holder = H160::from_slice(&args[12..]);
            let balance = self.balances.get(&holder).copied().unwrap_or_default();
            abi::encode(&[Token::Uint(balance)])
        } else {
            return Err(reverted(method));
        };
        Ok(json!(Bytes::from(output)))
    }
}

#[async_trait]
impl EthApi for MockChain {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        match method {
            "eth_chainId" => Ok(json!(U64::from(self.chain_id))),
            "eth_gasPrice" => Ok(json!(U256::from(30_000_000_000u64))),
            "eth_maxPriorityFeePerGas" => Ok(json!(U256::from(1_500_000_000u64))),
            "eth_getTransactionCount" => {
                let address: H160 = param(method, &params, 0)?;
                self.check_block(method, &params, 1)?;
                let count = match address == token_address() {
                    true => self.token_account.nonce.as_u64(),
                    false => 0,
                };
                Ok(json!(U256::from(count)))
            }
            "eth_getStorageAt" => self.storage_at(method, &params),
            "eth_getProof" => self.proof(method, &params),
            "eth_getBlockByHash" => self.block_by_hash(method, &params),
            "eth_call" => self.eth_call(method, &params),
            other => Err(RpcError::Rpc {
                method: other.to_string(),
                code: -32601,
                message: "method not found".to_string(),
            }),
        }
    }
}
