//! JSON-RPC access to a chain.
//!
//! [`EthApi`] has one required method, the raw call. The typed wrappers
//! decode results strictly, so no loosely typed value leaves this module.
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use ethers::types::{Bytes, EIP1186ProofResponse, H160, H256, U256, U64};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use url::Url;
use xchain_types::chain::{ChainRegistry, RegistryError};

use crate::header::BlockHeader;

/// JSON-RPC error codes a node uses for transient conditions.
const RETRYABLE_CODES: [i64; 3] = [-32000, -32005, -32603];

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Transport error calling {method}: {source}")]
    Transport {
        method: String,
        source: reqwest::Error,
    },
    #[error("RPC error calling {method}: {code} {message}")]
    Rpc {
        method: String,
        code: i64,
        message: String,
    },
    #[error("Malformed response to {method}: {reason}")]
    MalformedResponse { method: String, reason: String },
}

impl RpcError {
    /// Whether repeating the call (possibly on another endpoint) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Rpc { code, .. } => RETRYABLE_CODES.contains(code),
            RpcError::MalformedResponse { .. } => false,
        }
    }

    /// Whether the node answered with a definite refusal, such as -32601
    /// for a method it does not implement.
    pub fn is_unsupported_method(&self) -> bool {
        match self {
            RpcError::Rpc { code, .. } => !RETRYABLE_CODES.contains(code),
            _ => false,
        }
    }

    fn malformed(method: &str, reason: impl ToString) -> Self {
        RpcError::MalformedResponse {
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Registry error {0}")]
    Registry(#[from] RegistryError),
    #[error("Reqwest error {0}")]
    Reqwest(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
pub(crate) struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<Value>,
    id: u64,
}

impl JsonRpcRequest {
    pub(crate) fn new(method: &str, params: Vec<Value>, id: u64) -> Self {
        JsonRpcRequest {
            jsonrpc: "2.0".to_owned(),
            method: method.to_owned(),
            params,
            id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

/// Reads a JSON-RPC response body. A missing result reads as null.
fn parse_response(method: &str, body: &[u8]) -> Result<Value, RpcError> {
    let response: JsonRpcResponse =
        serde_json::from_slice(body).map_err(|e| RpcError::malformed(method, e))?;
    match response.error {
        Some(error) => Err(RpcError::Rpc {
            method: method.to_string(),
            code: error.code,
            message: error.message,
        }),
        None => Ok(response.result),
    }
}

/// Decodes a result into its expected shape.
fn typed<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, RpcError> {
    serde_json::from_value(value).map_err(|e| RpcError::malformed(method, e))
}

/// Block a state read is made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRef {
    Hash(H256),
    Latest,
}

impl BlockRef {
    fn to_param(self) -> Value {
        match self {
            BlockRef::Hash(hash) => json!(hash),
            BlockRef::Latest => json!("latest"),
        }
    }
}

/// Current fee levels of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeData {
    pub gas_price: U256,
    /// Absent on chains without EIP-1559 fee markets.
    pub max_priority_fee_per_gas: Option<U256>,
}

#[async_trait]
pub trait EthApi: Send + Sync {
    /// Sends one JSON-RPC request and returns its result.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError>;

    async fn chain_id(&self) -> Result<U64, RpcError> {
        let method = "eth_chainId";
        typed(method, self.call(method, vec![]).await?)
    }

    /// Header of the block, or `None` if the node does not know the hash.
    async fn get_block_by_hash(&self, block_hash: H256) -> Result<Option<BlockHeader>, RpcError> {
        let method = "eth_getBlockByHash";
        let result = self.call(method, vec![json!(block_hash), json!(false)]).await?;
        typed(method, result)
    }

    async fn get_storage_at(
        &self,
        address: H160,
        key: H256,
        block: BlockRef,
    ) -> Result<H256, RpcError> {
        let method = "eth_getStorageAt";
        let params = vec![json!(address), json!(key), block.to_param()];
        typed(method, self.call(method, params).await?)
    }

    async fn get_proof(
        &self,
        address: H160,
        keys: Vec<H256>,
        block: BlockRef,
    ) -> Result<EIP1186ProofResponse, RpcError> {
        let method = "eth_getProof";
        let params = vec![json!(address), json!(keys), block.to_param()];
        typed(method, self.call(method, params).await?)
    }

    async fn get_transaction_count(
        &self,
        address: H160,
        block: BlockRef,
    ) -> Result<U256, RpcError> {
        let method = "eth_getTransactionCount";
        let params = vec![json!(address), block.to_param()];
        typed(method, self.call(method, params).await?)
    }

    /// Gas price, plus the priority fee where the node supports it. Only a
    /// node that rejects the priority fee method yields `None`.
    async fn get_fee_data(&self) -> Result<FeeData, RpcError> {
        let method = "eth_gasPrice";
        let gas_price = typed(method, self.call(method, vec![]).await?)?;
        let method = "eth_maxPriorityFeePerGas";
        let max_priority_fee_per_gas = match self.call(method, vec![]).await {
            Ok(value) => Some(typed(method, value)?),
            Err(e) if e.is_unsupported_method() => None,
            Err(e) => return Err(e),
        };
        Ok(FeeData {
            gas_price,
            max_priority_fee_per_gas,
        })
    }

    /// Read-only contract call.
    async fn eth_call(&self, to: H160, data: Bytes, block: BlockRef) -> Result<Bytes, RpcError> {
        let method = "eth_call";
        let params = vec![json!({ "to": to, "data": data }), block.to_param()];
        typed(method, self.call(method, params).await?)
    }
}

/// HTTP JSON-RPC client bound to one endpoint.
#[derive(Debug)]
pub struct RpcClient {
    client: Client,
    url: Url,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Every request made by the client is abandoned after `timeout`.
    pub fn new(url: Url, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    /// Client for a random endpoint of the chain.
    pub fn for_chain(
        registry: &ChainRegistry,
        chain_id: u64,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let url = registry.random_endpoint(chain_id)?.clone();
        Self::new(url, timeout)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl EthApi for RpcClient {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcError> {
        let transport = |source: reqwest::Error| RpcError::Transport {
            method: method.to_string(),
            source,
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, params, id);
        let body = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(transport)?
            .bytes()
            .await
            .map_err(transport)?;
        parse_response(method, &body)
    }
}
