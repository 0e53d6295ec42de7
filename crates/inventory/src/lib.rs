//! Gathers the data for a cross-chain token balance proof: the slot holding
//! the holder's balance, the account and storage proofs for it and the block
//! header they are anchored to.
pub mod bundle;
pub mod discovery;
pub mod fetch;
pub mod header;
pub mod rpc;
pub mod token;
