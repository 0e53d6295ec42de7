//! Table of supported chains and the RPC endpoints used to reach them.
//!
//! The registry is built once (built-in table or a JSON file) and then passed
//! by reference. Lookups never mutate it.

use std::{collections::HashMap, fs, io, path::Path};

use log::{info, warn};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown chain {0}")]
    UnknownChain(u64),
    #[error("Chain {0} has no RPC endpoints")]
    NoEndpoints(u64),
    #[error("Chain {0} appears more than once in the chain table")]
    DuplicateChain(u64),
    #[error("IO error {0}")]
    IoError(#[from] io::Error),
    #[error("Serde json error {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

/// A chain the application can read state from.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub display_name: String,
    pub short_name: String,
    pub native_symbol: String,
    pub native_decimals: u8,
    pub rpc_endpoints: Vec<Url>,
}

#[derive(Clone, Debug)]
pub struct ChainRegistry {
    chains: HashMap<u64, ChainDescriptor>,
}

impl ChainRegistry {
    /// Builds a registry, rejecting repeated chain ids.
    pub fn new(descriptors: Vec<ChainDescriptor>) -> Result<Self, RegistryError> {
        let mut chains = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let id = descriptor.chain_id;
            if chains.insert(id, descriptor).is_some() {
                return Err(RegistryError::DuplicateChain(id));
            }
        }
        Ok(Self { chains })
    }

    /// Reads a JSON array of chain descriptors.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let descriptors: Vec<ChainDescriptor> = serde_json::from_str(json)?;
        Self::new(descriptors)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn lookup(&self, chain_id: u64) -> Result<&ChainDescriptor, RegistryError> {
        self.chains
            .get(&chain_id)
            .ok_or(RegistryError::UnknownChain(chain_id))
    }

    /// Picks one endpoint of the chain uniformly at random.
    pub fn random_endpoint(&self, chain_id: u64) -> Result<&Url, RegistryError> {
        let descriptor = self.lookup(chain_id)?;
        let endpoint = descriptor
            .rpc_endpoints
            .choose(&mut rand::thread_rng())
            .ok_or(RegistryError::NoEndpoints(chain_id))?;
        info!(
            "Using RPC endpoint {} for {} (chain {})",
            endpoint, descriptor.display_name, chain_id
        );
        Ok(endpoint)
    }

    /// Reverse lookup by display name, ignoring case.
    pub fn chain_id_by_name(&self, name: &str) -> Option<u64> {
        self.chains
            .values()
            .find(|descriptor| descriptor.display_name.eq_ignore_ascii_case(name))
            .map(|descriptor| descriptor.chain_id)
    }

    /// Chain ids in ascending order.
    pub fn chain_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.chains.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

fn builtin(
    chain_id: u64,
    display_name: &str,
    short_name: &str,
    native_symbol: &str,
    endpoints: &[&str],
) -> ChainDescriptor {
    ChainDescriptor {
        chain_id,
        display_name: display_name.to_string(),
        short_name: short_name.to_string(),
        native_symbol: native_symbol.to_string(),
        native_decimals: 18,
        rpc_endpoints: endpoints
            .iter()
            .filter_map(|endpoint| match Url::parse(endpoint) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Skipping endpoint {} for chain {}: {}", endpoint, chain_id, e);
                    None
                }
            })
            .collect(),
    }
}

impl Default for ChainRegistry {
    /// Public endpoints for the chains the voting application supports.
    fn default() -> Self {
        let chains = [
            builtin(
                1,
                "Ethereum",
                "eth",
                "ETH",
                &["https://cloudflare-eth.com", "https://rpc.ankr.com/eth"],
            ),
            builtin(
                10,
                "Optimism",
                "oeth",
                "ETH",
                &["https://mainnet.optimism.io", "https://rpc.ankr.com/optimism"],
            ),
            builtin(
                56,
                "BNB Smart Chain",
                "bnb",
                "BNB",
                &[
                    "https://bsc-dataseed.binance.org",
                    "https://bsc-dataseed1.defibit.io",
                ],
            ),
            builtin(
                137,
                "Polygon",
                "matic",
                "MATIC",
                &["https://polygon-rpc.com", "https://rpc.ankr.com/polygon"],
            ),
            builtin(
                42161,
                "Arbitrum One",
                "arb1",
                "ETH",
                &["https://arb1.arbitrum.io/rpc", "https://rpc.ankr.com/arbitrum"],
            ),
            builtin(
                80001,
                "Polygon Mumbai",
                "maticmum",
                "MATIC",
                &["https://rpc-mumbai.maticvigil.com"],
            ),
        ];
        Self {
            chains: chains
                .into_iter()
                .map(|descriptor| (descriptor.chain_id, descriptor))
                .collect(),
        }
    }
}
