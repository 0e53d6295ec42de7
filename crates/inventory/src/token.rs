//! Read-only ERC20 calls against a token contract.
use ethers::{
    abi::{self, ParamType, Token},
    types::{Bytes, H160, U256},
    utils::{format_units, id, ConversionError},
};
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xchain_types::utils::hex_encode;

use crate::rpc::{BlockRef, EthApi, RpcError};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Address {token} is not a token contract: {reason}")]
    NotATokenContract { token: String, reason: String },
    #[error("Call {function} on {token} reverted or returned undecodable data: {reason}")]
    CallReverted {
        token: String,
        function: &'static str,
        reason: String,
    },
    #[error("RPC error {0}")]
    Rpc(#[from] RpcError),
    #[error("Unit conversion error {0}")]
    Units(#[from] ConversionError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDetails {
    pub address: H160,
    pub chain_id: u64,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: U256,
}

/// Why a call did not produce a value.
enum CallFailure {
    /// Revert, JSON-RPC error or undecodable return data.
    Contract(String),
    /// The node could not be reached.
    Transport(RpcError),
}

pub struct TokenIntrospector<'a, A: EthApi> {
    api: &'a A,
    chain_id: u64,
}

impl<'a, A: EthApi> TokenIntrospector<'a, A> {
    pub fn new(api: &'a A, chain_id: u64) -> Self {
        Self { api, chain_id }
    }

    /// Reads name, symbol, decimals and totalSupply at the latest block.
    ///
    /// Any contract level failure means the address is not treated as a token.
    pub async fn describe(&self, token: H160) -> Result<TokenDetails, TokenError> {
        let not_token = |failure: CallFailure| match failure {
            CallFailure::Contract(reason) => TokenError::NotATokenContract {
                token: hex_encode(token),
                reason,
            },
            CallFailure::Transport(e) => TokenError::Rpc(e),
        };
        let name = self.read_text(token, "name()").await.map_err(not_token)?;
        let symbol = self.read_text(token, "symbol()").await.map_err(not_token)?;
        let decimals = self
            .read_uint(token, "decimals()", vec![], BlockRef::Latest)
            .await
            .map_err(not_token)?;
        let total_supply = self
            .read_uint(token, "totalSupply()", vec![], BlockRef::Latest)
            .await
            .map_err(not_token)?;
        if decimals > U256::from(u8::MAX) {
            return Err(not_token(CallFailure::Contract(format!(
                "decimals {decimals} out of range"
            ))));
        }
        Ok(TokenDetails {
            address: token,
            chain_id: self.chain_id,
            name,
            symbol,
            decimals: decimals.as_u32() as u8,
            total_supply,
        })
    }

    /// Whether the address answers the four token metadata calls.
    pub async fn is_token_contract(&self, token: H160) -> Result<bool, TokenError> {
        match self.describe(token).await {
            Ok(_) => Ok(true),
            Err(TokenError::NotATokenContract { reason, .. }) => {
                debug!("{} is not a token: {}", hex_encode(token), reason);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn balance_of(
        &self,
        token: H160,
        holder: H160,
        block: BlockRef,
    ) -> Result<U256, TokenError> {
        let function = "balanceOf(address)";
        self.read_uint(token, function, vec![Token::Address(holder)], block)
            .await
            .map_err(|failure| match failure {
                CallFailure::Contract(reason) => TokenError::CallReverted {
                    token: hex_encode(token),
                    function,
                    reason,
                },
                CallFailure::Transport(e) => TokenError::Rpc(e),
            })
    }

    async fn call(
        &self,
        token: H160,
        signature: &str,
        args: Vec<Token>,
        block: BlockRef,
    ) -> Result<Bytes, CallFailure> {
        let mut data = id(signature).to_vec();
        data.extend(abi::encode(&args));
        match self.api.eth_call(token, data.into(), block).await {
            Ok(output) => Ok(output),
            Err(e @ RpcError::Transport { .. }) => Err(CallFailure::Transport(e)),
            Err(e) => Err(CallFailure::Contract(e.to_string())),
        }
    }

    async fn read_uint(
        &self,
        token: H160,
        signature: &str,
        args: Vec<Token>,
        block: BlockRef,
    ) -> Result<U256, CallFailure> {
        let output = self.call(token, signature, args, block).await?;
        match abi::decode(&[ParamType::Uint(256)], &output) {
            Ok(tokens) => match tokens.as_slice() {
                [Token::Uint(value)] => Ok(*value),
                _ => Err(CallFailure::Contract(format!("{signature} returned {tokens:?}"))),
            },
            Err(e) => Err(CallFailure::Contract(format!("{signature}: {e}"))),
        }
    }

    /// Reads a string, accepting the bytes32 form some older tokens return.
    async fn read_text(&self, token: H160, signature: &str) -> Result<String, CallFailure> {
        let output = self.call(token, signature, vec![], BlockRef::Latest).await?;
        if let Ok(tokens) = abi::decode(&[ParamType::String], &output) {
            if let [Token::String(text)] = tokens.as_slice() {
                return Ok(text.clone());
            }
        }
        if output.len() == 32 {
            let trimmed: Vec<u8> = output.iter().copied().take_while(|b| *b != 0).collect();
            if let Ok(text) = String::from_utf8(trimmed) {
                return Ok(text);
            }
        }
        Err(CallFailure::Contract(format!(
            "{signature} returned undecodable data {}",
            hex_encode(&output)
        )))
    }
}

/// Human readable amount, e.g. 5000000000000000000 with 18 decimals -> "5.000000000000000000".
pub fn format_balance(balance: U256, decimals: u8) -> Result<String, TokenError> {
    Ok(format_units(balance, decimals as u32)?)
}
