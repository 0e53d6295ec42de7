use std::time::Duration;

use anyhow::{bail, Result};
use clap::Parser;
use log::info;
use xchain_inventory::{
    bundle::{prove, BundleOutcome, ProofBundle, ProofRequest},
    discovery::{DiscoveryConfig, DiscoveryOutcome},
    rpc::RpcClient,
    token::format_balance,
};
use xchain_types::chain::ChainRegistry;

use crate::cli::{AppArgs, OutputKind};

mod cli;

/// Prove a token balance at a historical block.
///
/// Finds the storage slot of the token's balance mapping, then fetches the
/// block header and the account and storage proofs that let a verifier on
/// another chain check the balance against the block hash alone.
///
/// Involves:
/// - eth_call for token metadata and balanceOf
/// - eth_getStorageAt for slot discovery
/// - eth_getBlockByHash for the header
/// - eth_getProof for the account and storage proofs
#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = AppArgs::parse();

    let registry = match &args.chains {
        Some(path) => ChainRegistry::from_path(path)?,
        None => ChainRegistry::default(),
    };
    let timeout = Duration::from_secs(args.timeout_secs);
    let client = match &args.rpc {
        Some(url) => RpcClient::new(url.clone(), timeout)?,
        None => RpcClient::for_chain(&registry, args.chain_id, timeout)?,
    };
    info!("Using endpoint {}", client.url());

    let request = ProofRequest {
        chain_id: args.chain_id,
        block_hash: args.block_hash,
        token: args.token,
        holder: args.holder,
    };
    let config = DiscoveryConfig {
        concurrency: args.concurrency,
    };
    let bundle = match prove(&client, &request, config).await? {
        BundleOutcome::Ready(bundle) => bundle,
        BundleOutcome::Ineligible(DiscoveryOutcome::ZeroBalance) => {
            bail!("Holder has zero balance at the block, nothing to prove")
        }
        BundleOutcome::Ineligible(DiscoveryOutcome::NoMatch { observed_balance }) => {
            bail!("Balance {observed_balance} not found in any candidate slot, holder is ineligible")
        }
        BundleOutcome::Ineligible(other) => bail!("Holder is ineligible: {other:?}"),
    };
    let verification = bundle.verify_locally();

    match args.output {
        OutputKind::HexString => print_hex(&bundle)?,
        OutputKind::Json => println!("{}", serde_json::to_string_pretty(&bundle)?),
    }
    match verification {
        Ok(()) => eprintln!("Local verification: passed"),
        Err(e) => bail!("Local verification failed: {e}"),
    }
    Ok(())
}

fn print_hex(bundle: &ProofBundle) -> Result<()> {
    let token = &bundle.token;
    println!(
        "token: {} ({}) {:#x} on chain {}",
        token.name, token.symbol, token.address, token.chain_id
    );
    println!(
        "balance: {} {}",
        format_balance(bundle.slot.observed_balance, token.decimals)?,
        token.symbol
    );
    println!("slot: {:#04x}", bundle.slot.slot_index);
    println!("state root: {:#x}", bundle.state_root);
    println!("header: 0x{}", hex::encode(&bundle.header_rlp));
    println!("account proof: 0x{}", hex::encode(bundle.account_proof.as_bytes()));
    println!("storage proof: 0x{}", hex::encode(bundle.storage_proof.as_bytes()));
    Ok(())
}
