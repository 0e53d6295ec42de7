//! For Command Line Interface for xchain_prover

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use ethers::types::{H160, H256};
use url::Url;
use xchain_types::constants::{DEFAULT_DISCOVERY_CONCURRENCY, DEFAULT_RPC_TIMEOUT_SECS};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct AppArgs {
    /// Chain the token lives on, e.g. 137 for Polygon
    #[clap(short, long)]
    pub chain_id: u64,
    /// 0x-prefixed hash of the block to prove the balance at
    #[clap(short, long)]
    pub block_hash: H256,
    /// ERC20 contract address
    #[clap(short, long)]
    pub token: H160,
    /// Address whose balance is proven
    #[clap(long)]
    pub holder: H160,
    /// JSON file of chain descriptors. The built-in table is used if absent
    #[clap(long)]
    pub chains: Option<PathBuf>,
    /// Node to use instead of a random endpoint from the chain table
    #[clap(short, long)]
    pub rpc: Option<Url>,
    /// Seconds before any single request is abandoned
    #[clap(long, default_value_t = DEFAULT_RPC_TIMEOUT_SECS)]
    pub timeout_secs: u64,
    /// Storage reads in flight during slot discovery
    #[clap(long, default_value_t = DEFAULT_DISCOVERY_CONCURRENCY)]
    pub concurrency: usize,
    /// Format of data written to stdout.
    #[clap(value_enum, long, default_value_t = OutputKind::HexString)]
    pub output: OutputKind,
}

/// Format of data written to stdout.
#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputKind {
    /// 0x-prefixed hex-strings of the encoded header and proofs
    HexString,
    /// The full proof bundle as JSON
    Json,
}
