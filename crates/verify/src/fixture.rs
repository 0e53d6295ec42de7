//! In-memory Merkle Patricia Trie that produces honest roots and proofs.
//!
//! Only built for tests (or with the `test-utils` feature). The whole trie is
//! rebuilt from its leaves on every query.
use std::collections::BTreeMap;

use ethers::{
    types::{Bytes, H160, H256, U256},
    utils::keccak256,
};
use xchain_types::{artifact::Account, constants::EMPTY_TRIE_ROOT, key::StorageKey};

use crate::{
    codec::{encode, RlpItem},
    eip1186::{account_leaf_value, storage_leaf_value},
    path::{HexPrefixPath, PathTag},
};

#[derive(Debug, Clone, Default)]
pub struct MemoryTrie {
    /// keccak(key) -> leaf value.
    leaves: BTreeMap<[u8; 32], Vec<u8>>,
}

/// A leaf path as 64 nibbles, with its value.
type Entry<'a> = (Vec<u8>, &'a [u8]);

impl MemoryTrie {
    /// Stores `value` under keccak(key). An empty value removes the key.
    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) {
        let path = keccak256(key);
        match value.is_empty() {
            true => self.leaves.remove(&path),
            false => self.leaves.insert(path, value),
        };
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.leaves.get(&keccak256(key)).map(Vec::as_slice)
    }

    /// Stores an account the way the state trie does.
    pub fn insert_account(&mut self, address: H160, account: &Account) {
        self.insert(address.as_bytes(), account_leaf_value(account));
    }

    /// Stores a storage word the way a storage trie does. Zero removes the slot.
    pub fn insert_storage(&mut self, key: StorageKey, value: U256) {
        let leaf = match value.is_zero() {
            true => vec![],
            false => storage_leaf_value(value),
        };
        self.insert(key.as_bytes(), leaf);
    }

    pub fn root(&self) -> H256 {
        let entries = self.entries();
        if entries.is_empty() {
            return EMPTY_TRIE_ROOT;
        }
        H256(keccak256(encode(&build_node(&entries, 0))))
    }

    /// Nodes from the root towards `key`. For an absent key, the nodes up to
    /// where the path leaves the trie.
    pub fn proof(&self, key: &[u8]) -> Vec<Bytes> {
        let entries = self.entries();
        let mut nodes = vec![];
        if entries.is_empty() {
            return nodes;
        }
        let target: Vec<u8> = nibbles(&keccak256(key));
        collect_proof(&entries, 0, &target, true, &mut nodes);
        nodes
    }

    fn entries(&self) -> Vec<Entry<'_>> {
        self.leaves
            .iter()
            .map(|(path, value)| (nibbles(path), value.as_slice()))
            .collect()
    }
}

fn nibbles(bytes: &[u8; 32]) -> Vec<u8> {
    bytes.iter().flat_map(|byte| [byte >> 4, byte & 0x0f]).collect()
}

fn hex_prefix(tag: PathTag, nibbles: &[u8]) -> RlpItem {
    let path = HexPrefixPath {
        tag,
        nibbles: nibbles.to_vec(),
    };
    // Nibbles come from splitting bytes, so they are always in range.
    RlpItem::Bytes(path.encode().unwrap_or_default())
}

/// Length of the nibble run shared by all entries from `depth`.
///
/// Entries are sorted, so the first and last bound the shared prefix.
fn shared_prefix(entries: &[Entry<'_>], depth: usize) -> usize {
    match (entries.first(), entries.last()) {
        (Some((first, _)), Some((last, _))) => first[depth..]
            .iter()
            .zip(&last[depth..])
            .take_while(|(a, b)| a == b)
            .count(),
        _ => 0,
    }
}

/// Entries whose nibble at `depth` is `nibble`.
fn branch_group<'a>(entries: &[Entry<'a>], depth: usize, nibble: u8) -> Vec<Entry<'a>> {
    entries
        .iter()
        .filter(|(path, _)| path[depth] == nibble)
        .cloned()
        .collect()
}

fn build_node(entries: &[Entry<'_>], depth: usize) -> RlpItem {
    if let [(path, value)] = entries {
        return RlpItem::List(vec![
            hex_prefix(PathTag::Leaf, &path[depth..]),
            RlpItem::Bytes(value.to_vec()),
        ]);
    }
    let shared = shared_prefix(entries, depth);
    if shared > 0 {
        let path = &entries[0].0[depth..depth + shared];
        return RlpItem::List(vec![
            hex_prefix(PathTag::Extension, path),
            child_reference(build_node(entries, depth + shared)),
        ]);
    }
    let mut items: Vec<RlpItem> = (0..16u8)
        .map(|nibble| {
            let group = branch_group(entries, depth, nibble);
            match group.is_empty() {
                true => RlpItem::Bytes(vec![]),
                false => child_reference(build_node(&group, depth + 1)),
            }
        })
        .collect();
    items.push(RlpItem::Bytes(vec![]));
    RlpItem::List(items)
}

/// Nodes under 32 bytes are inlined, larger ones referenced by hash.
fn child_reference(node: RlpItem) -> RlpItem {
    let encoded = encode(&node);
    match encoded.len() < 32 {
        true => node,
        false => RlpItem::Bytes(keccak256(encoded).to_vec()),
    }
}

fn collect_proof(
    entries: &[Entry<'_>],
    depth: usize,
    target: &[u8],
    is_root: bool,
    nodes: &mut Vec<Bytes>,
) {
    let node = build_node(entries, depth);
    let encoded = encode(&node);
    if is_root || encoded.len() >= 32 {
        nodes.push(encoded.into());
    }
    if entries.len() == 1 {
        return;
    }
    let shared = shared_prefix(entries, depth);
    if shared > 0 {
        if target[depth..depth + shared] == entries[0].0[depth..depth + shared] {
            collect_proof(entries, depth + shared, target, false, nodes);
        }
        return;
    }
    let group = branch_group(entries, depth, target[depth]);
    if !group.is_empty() {
        collect_proof(&group, depth + 1, target, false, nodes);
    }
}
