//! Finds which storage slot of a token contract holds its balance mapping.
//!
//! Solidity stores `balances[holder]` for a mapping declared at slot `i` under
//! keccak256(leftPad32(holder) ++ leftPad32(i)). Given a holder's known
//! balance, candidate slots are read in priority order until one holds exactly
//! that balance.
use std::{iter::Copied, ops::RangeInclusive, slice::Iter};

use ethers::types::{H160, H256, U256};
use futures::{stream, StreamExt};
use log::{debug, info, warn};
use thiserror::Error;
use xchain_types::{
    artifact::SlotGuess,
    constants::{DEFAULT_DISCOVERY_CONCURRENCY, SLOT_SEARCH_SPACE, SLOT_SHORTLIST},
    key::StorageKey,
    utils::{hex_encode, word_from_u256},
};

use crate::{
    rpc::{BlockRef, EthApi, RpcError},
    token::{TokenError, TokenIntrospector},
};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Reading candidate slot {slot_index} failed: {source}")]
    StorageRead { slot_index: u8, source: RpcError },
    #[error("Token error {0}")]
    Token(#[from] TokenError),
}

/// Slot indices in the order they are tried: the shortlist, then every other
/// index from 0 to 255 ascending. Yields each of the 256 indices once.
#[derive(Debug, Clone)]
pub struct SlotCandidates {
    shortlist: Copied<Iter<'static, u8>>,
    sweep: RangeInclusive<u8>,
}

impl SlotCandidates {
    pub fn new() -> Self {
        Self {
            shortlist: SLOT_SHORTLIST.iter().copied(),
            sweep: 0..=u8::MAX,
        }
    }
}

impl Default for SlotCandidates {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for SlotCandidates {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        self.shortlist
            .next()
            .or_else(|| self.sweep.find(|slot| !SLOT_SHORTLIST.contains(slot)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryConfig {
    /// Storage reads in flight at once. 1 is strictly sequential.
    pub concurrency: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_DISCOVERY_CONCURRENCY,
        }
    }
}

/// Result of a discovery that started from the holder's on-chain balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Found(SlotGuess),
    /// No candidate slot holds the balance. The holder is ineligible by this method.
    NoMatch { observed_balance: U256 },
    /// A zero balance cannot be told apart from an unset slot, so no search was made.
    ZeroBalance,
}

/// A stored word matches only if it equals the balance and is not zero.
pub fn is_balance_match(word: H256, balance_word: H256) -> bool {
    word == balance_word && !word.is_zero()
}

pub struct SlotDiscovery<'a, A: EthApi> {
    api: &'a A,
    config: DiscoveryConfig,
}

impl<'a, A: EthApi> SlotDiscovery<'a, A> {
    pub fn new(api: &'a A, config: DiscoveryConfig) -> Self {
        Self { api, config }
    }

    /// Returns the first candidate slot, in priority order, whose mapping entry
    /// for `holder` equals `observed_balance`.
    ///
    /// Reads may overlap, but results are consumed in candidate order and the
    /// search stops at the first match, dropping reads still in flight.
    pub async fn discover(
        &self,
        token: H160,
        holder: H160,
        block: BlockRef,
        observed_balance: U256,
    ) -> Result<Option<SlotGuess>, DiscoveryError> {
        if observed_balance.is_zero() {
            warn!(
                "Holder {} has zero balance of {}, slot discovery skipped",
                hex_encode(holder),
                hex_encode(token)
            );
            return Ok(None);
        }
        let balance_word = word_from_u256(observed_balance);
        let mut reads = stream::iter(SlotCandidates::new())
            .map(|slot_index| async move {
                let key = StorageKey::for_mapping(holder, slot_index);
                self.api
                    .get_storage_at(token, key.into(), block)
                    .await
                    .map(|word| (slot_index, word))
                    .map_err(|source| DiscoveryError::StorageRead { slot_index, source })
            })
            .buffered(self.config.concurrency.max(1));

        while let Some(read) = reads.next().await {
            let (slot_index, word) = read?;
            if is_balance_match(word, balance_word) {
                info!(
                    "Balance mapping of {} found at slot {:#04x}",
                    hex_encode(token),
                    slot_index
                );
                return Ok(Some(SlotGuess {
                    slot_index,
                    observed_balance,
                    matched: true,
                }));
            }
            debug!("Slot {:#04x} holds {}", slot_index, hex_encode(word));
        }
        info!(
            "No candidate slot of {} holds balance {} for {}",
            hex_encode(token),
            observed_balance,
            hex_encode(holder)
        );
        Ok(None)
    }

    /// Reads the holder's balance at the block, then searches for it.
    pub async fn discover_for_holder(
        &self,
        token: H160,
        holder: H160,
        block: BlockRef,
        chain_id: u64,
    ) -> Result<DiscoveryOutcome, DiscoveryError> {
        let observed_balance = TokenIntrospector::new(self.api, chain_id)
            .balance_of(token, holder, block)
            .await?;
        if observed_balance.is_zero() {
            warn!(
                "Holder {} has zero balance of {}, eligibility cannot be proven",
                hex_encode(holder),
                hex_encode(token)
            );
            return Ok(DiscoveryOutcome::ZeroBalance);
        }
        Ok(
            match self.discover(token, holder, block, observed_balance).await? {
                Some(guess) => DiscoveryOutcome::Found(guess),
                None => DiscoveryOutcome::NoMatch { observed_balance },
            },
        )
    }
}
