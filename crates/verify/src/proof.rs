//! For verifying a Merkle Patricia Proof for arbitrary proof values.
//! E.g., Account, storage ...
use ethers::{
    types::{Bytes, H256},
    utils::keccak256,
};
use log::debug;
use thiserror::Error;
use xchain_types::{
    constants::{EMPTY_TRIE_ROOT, MAX_BYTES_PER_NODE, MAX_NODES_PER_PROOF},
    proof::DisplayProof,
    utils::hex_encode,
};

use crate::{
    codec::{decode, CodecError, RlpItem},
    node::{ChildRef, NodeError, NodeKind, Step},
    path::NibblePath,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("Node (index = {node_index}) has malformed encoding {source}")]
    CodecError {
        source: CodecError,
        node_index: usize,
    },
    #[error("Proof is empty and the root is not the empty trie root")]
    EmptyProof,
    #[error(
        "Hash of node {computed} does not match the expected hash in the parent node {expected}"
    )]
    IncorrectHash { computed: String, expected: String },
    #[error(
        "The claimed proof value ({claimed}) is different from the value in the proof ({expected})"
    )]
    IncorrectLeafValue { claimed: String, expected: String },
    #[error("Parent node references a child by hash but the proof has no more nodes")]
    MissingNode,
    #[error("Node (index = {node_index}) error {source}")]
    NodeError {
        source: NodeError,
        node_index: usize,
    },
    #[error("Node (index = {node_index}) is {size} bytes, over the limit")]
    NodeTooLarge { node_index: usize, size: usize },
    #[error("Proof has {0} nodes, over the limit")]
    TooManyNodes(usize),
    #[error("Walk ended at node {terminal_index} but the proof has {supplied} nodes")]
    UnusedNodes {
        terminal_index: usize,
        supplied: usize,
    },
}

/// A proof for some data in a Merkle Patricia Tree, such as an account, or a storage value.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct SingleProofPath {
    /// Merkle PATRICIA trie proof for a key/value.
    pub proof: Vec<Bytes>,
    /// Trusted root that the proof anchors to.
    pub root: H256,
    /// Anticipated trie path to traverse for the proof, keccak(key).
    pub path: [u8; 32],
    /// Claimed value to be proven. E.g., RLP(account), or RLP(storage_value)
    pub claimed_value: Vec<u8>,
}

impl SingleProofPath {
    pub fn verify(&self) -> Result<Verified, ProofError> {
        if self.proof.is_empty() {
            // Nothing to walk: only an empty trie has no nodes.
            return match self.root == EMPTY_TRIE_ROOT {
                true => Ok(Verified::Exclusion),
                false => Err(ProofError::EmptyProof),
            };
        }
        if self.proof.len() > MAX_NODES_PER_PROOF {
            return Err(ProofError::TooManyNodes(self.proof.len()));
        }
        let mut traversal = NibblePath::init(&self.path);
        let mut next = ChildRef::Hash(self.root);
        let mut remaining = self.proof.iter().enumerate();
        let mut node_index = 0;

        loop {
            let node = match next {
                ChildRef::Hash(expected) => {
                    let (index, rlp_node) = remaining.next().ok_or(ProofError::MissingNode)?;
                    node_index = index;
                    decode_hashed_node(&rlp_node.0, expected, node_index)?
                }
                ChildRef::Embedded(items) => items,
            };

            let step = NodeKind::deduce(&node)
                .and_then(|kind| kind.traverse_node(&node, &mut traversal))
                .map_err(|source| ProofError::NodeError { source, node_index })?;

            match step {
                Step::Descend(child) => next = child,
                Step::Terminal(proof_type) => {
                    if node_index + 1 != self.proof.len() {
                        return Err(ProofError::UnusedNodes {
                            terminal_index: node_index,
                            supplied: self.proof.len(),
                        });
                    }
                    return proof_type.get_verification_of_value(&self.claimed_value);
                }
            }
        }
    }
}

/// Checks the hash of a proof element and decodes it to its items.
fn decode_hashed_node(
    rlp_node: &[u8],
    expected: H256,
    node_index: usize,
) -> Result<Vec<RlpItem>, ProofError> {
    if rlp_node.len() > MAX_BYTES_PER_NODE {
        return Err(ProofError::NodeTooLarge {
            node_index,
            size: rlp_node.len(),
        });
    }
    node_hash_correct(rlp_node, expected)?;
    match decode(rlp_node).map_err(|source| ProofError::CodecError { source, node_index })? {
        RlpItem::List(items) => Ok(items),
        RlpItem::Bytes(_) => Err(ProofError::NodeError {
            source: NodeError::NodeNotList,
            node_index,
        }),
    }
}

/// The verification kind is returned to the caller.
///
/// An exclusion proof for a key does not contain information about the value
/// of that key. The caller can make an assessment if the value for an
/// exclusion proof is valid, depending on the context (storage or account).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verified {
    Inclusion,
    Exclusion,
}

/// Checks that the hash of one node is correct.
fn node_hash_correct(rlp_node: &[u8], parent_hash: H256) -> Result<(), ProofError> {
    let computed_hash = keccak256(rlp_node);
    if computed_hash != parent_hash.0 {
        let computed = hex_encode(computed_hash);
        let expected = hex_encode(parent_hash);
        return Err(ProofError::IncorrectHash { computed, expected });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProofType {
    /// Inclusion proof with leaf RLP bytes from the proof.
    Inclusion(Vec<u8>),
    /// Exclusion proof consisting of a terminal branch node.
    BranchExclusion,
    /// Exclusion proof consisting of a terminal extension node.
    ExtensionExclusion,
    /// Exclusion proof consisting of a terminal leaf node.
    LeafExclusion,
}

impl ProofType {
    /// For proofs that have been checked to the terminal node, checks that the proof
    /// supports the claimed value.
    ///
    /// ## Inclusion proof
    /// The claimed value must match the proof leaf value byte for byte.
    ///
    /// ## Exclusion proof
    /// The value for a non-existent key is not in the proof, and so the claimed
    /// value must be evaluated by the caller.
    fn get_verification_of_value(&self, claimed_rlp_value: &[u8]) -> Result<Verified, ProofError> {
        match self {
            ProofType::Inclusion(proof_leaf_rlp_bytes) => {
                match claimed_rlp_value == proof_leaf_rlp_bytes.as_slice() {
                    true => Ok(Verified::Inclusion),
                    false => Err(ProofError::IncorrectLeafValue {
                        claimed: hex_encode(claimed_rlp_value),
                        expected: hex_encode(proof_leaf_rlp_bytes),
                    }),
                }
            }
            ProofType::BranchExclusion
            | ProofType::ExtensionExclusion
            | ProofType::LeafExclusion => Ok(Verified::Exclusion),
        }
    }
}

/// Checks that `nodes` prove `key` holds exactly `claimed_value` under `root`.
///
/// The trie path is keccak256(key). Any malformed node, hash mismatch, path
/// mismatch, leftover node or differing value gives `false`, as does a valid
/// proof that the key is absent.
pub fn verify<T: AsRef<[u8]>>(root: H256, key: &[u8], claimed_value: &[u8], nodes: &[T]) -> bool {
    let single = SingleProofPath {
        proof: nodes
            .iter()
            .map(|node| Bytes::from(node.as_ref().to_vec()))
            .collect(),
        root,
        path: keccak256(key),
        claimed_value: claimed_value.to_vec(),
    };
    match single.verify() {
        Ok(Verified::Inclusion) => true,
        Ok(Verified::Exclusion) => {
            debug!("Proof shows key {} is absent", hex_encode(key));
            false
        }
        Err(e) => {
            debug!(
                "Rejected proof for key {}: {e}{}",
                hex_encode(key),
                DisplayProof::init(root, nodes)
            );
            false
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        codec::{encode, Malformation},
        fixture::MemoryTrie,
    };

    use super::*;

    // A 2-item merkle patricia trie node. RLP structure: list[integer, list[account]]
    const ACCOUNT_LEAF: &str = "f8669d33269ec9b8f075a4723d27c611ac1c52a464f3516b25e0105a0d1c2210b846f8440180a03836d7e3afb674e5180b7564e096f6f3e30308878a443fe59012ced093544b7fa02cfdfbdd943ec0153ed07b97f03eb765dc11cc79c6f750effcc2d126f93c4b31";

    fn populated_trie() -> MemoryTrie {
        let mut trie = MemoryTrie::default();
        for index in 0u32..40 {
            let key = index.to_be_bytes();
            trie.insert(&key, vec![0x80 + (index % 0x30) as u8; 1 + index as usize]);
        }
        trie
    }

    #[test]
    fn test_node_hash() {
        let node_rlp = hex::decode(ACCOUNT_LEAF).unwrap();
        let expected_hash = H256::from_slice(
            &hex::decode("de4a8735f0afe745a73341f09b2641b136c4c6ceb33a4c04f868b8c0ae0c572d")
                .unwrap(),
        );
        node_hash_correct(&node_rlp, expected_hash).unwrap();
        assert!(node_hash_correct(&node_rlp, H256::zero()).is_err());
    }

    #[test]
    fn keccak() {
        assert_eq!(
            hex::encode(keccak256([])),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
        assert_eq!(
            hex::encode(keccak256([0x00])),
            "bc36789e7a1e281436464229828f817d6612f7b477d66591ff96a9e064bcc98a"
        );
        assert_eq!(
            hex::encode(keccak256([0x01])),
            "5fe7f977e71dba2ea1a68e21057beebb9be2ac30c6410aa38d4f3fbe41dcffd2"
        );
    }

    #[test]
    fn test_valid_proofs_verify() {
        let trie = populated_trie();
        let root = trie.root();
        for index in 0u32..40 {
            let key = index.to_be_bytes();
            let value = trie.get(&key).unwrap().to_vec();
            let nodes = trie.proof(&key);
            assert!(!nodes.is_empty());
            assert!(verify(root, &key, &value, &nodes), "key {index}");
        }
    }

    #[test]
    fn test_single_leaf_trie() {
        let mut trie = MemoryTrie::default();
        trie.insert(b"only", vec![0x2a]);
        let nodes = trie.proof(b"only");
        assert_eq!(nodes.len(), 1);
        assert!(verify(trie.root(), b"only", &[0x2a], &nodes));
    }

    #[test]
    fn test_verify_is_deterministic() {
        let trie = populated_trie();
        let key = 7u32.to_be_bytes();
        let value = trie.get(&key).unwrap().to_vec();
        let nodes = trie.proof(&key);
        let first = verify(trie.root(), &key, &value, &nodes);
        let second = verify(trie.root(), &key, &value, &nodes);
        assert!(first && second);
    }

    #[test]
    fn test_different_value_rejected() {
        let trie = populated_trie();
        let key = 3u32.to_be_bytes();
        let mut value = trie.get(&key).unwrap().to_vec();
        let nodes = trie.proof(&key);
        value[0] ^= 0x01;
        assert!(!verify(trie.root(), &key, &value, &nodes));

        let single = SingleProofPath {
            proof: nodes,
            root: trie.root(),
            path: keccak256(key),
            claimed_value: value,
        };
        assert!(matches!(
            single.verify(),
            Err(ProofError::IncorrectLeafValue { .. })
        ));
    }

    #[test]
    fn test_any_flipped_byte_rejected() {
        let trie = populated_trie();
        let key = 11u32.to_be_bytes();
        let value = trie.get(&key).unwrap().to_vec();
        let nodes = trie.proof(&key);
        for node_index in 0..nodes.len() {
            for byte_index in 0..nodes[node_index].len() {
                let mut tampered: Vec<Vec<u8>> = nodes.iter().map(|node| node.to_vec()).collect();
                tampered[node_index][byte_index] ^= 0x01;
                assert!(
                    !verify(trie.root(), &key, &value, &tampered),
                    "node {node_index} byte {byte_index}"
                );
            }
        }
    }

    #[test]
    fn test_wrong_root_rejected() {
        let trie = populated_trie();
        let key = 5u32.to_be_bytes();
        let value = trie.get(&key).unwrap().to_vec();
        let nodes = trie.proof(&key);
        assert!(!verify(H256::repeat_byte(0x11), &key, &value, &nodes));
    }

    #[test]
    fn test_extra_node_rejected() {
        let trie = populated_trie();
        let key = 9u32.to_be_bytes();
        let value = trie.get(&key).unwrap().to_vec();
        let mut nodes = trie.proof(&key);
        let extra = nodes[0].clone();
        nodes.push(extra);
        let single = SingleProofPath {
            proof: nodes.clone(),
            root: trie.root(),
            path: keccak256(key),
            claimed_value: value.clone(),
        };
        assert!(matches!(
            single.verify(),
            Err(ProofError::UnusedNodes { .. })
        ));
        assert!(!verify(trie.root(), &key, &value, &nodes));
    }

    #[test]
    fn test_truncated_proof_rejected() {
        let trie = populated_trie();
        let key = 13u32.to_be_bytes();
        let value = trie.get(&key).unwrap().to_vec();
        let mut nodes = trie.proof(&key);
        assert!(nodes.len() > 1);
        nodes.pop();
        assert!(!verify(trie.root(), &key, &value, &nodes));
    }

    #[test]
    fn test_absent_key_is_exclusion() {
        let trie = populated_trie();
        let absent = 1000u32.to_be_bytes();
        let nodes = trie.proof(&absent);
        let single = SingleProofPath {
            proof: nodes.clone(),
            root: trie.root(),
            path: keccak256(absent),
            claimed_value: vec![],
        };
        assert_eq!(single.verify().unwrap(), Verified::Exclusion);
        assert!(!verify(trie.root(), &absent, &[0x01], &nodes));
    }

    #[test]
    fn test_empty_proof() {
        let nodes: Vec<Bytes> = vec![];
        let empty = SingleProofPath {
            proof: nodes.clone(),
            root: EMPTY_TRIE_ROOT,
            path: keccak256(b"key"),
            claimed_value: vec![],
        };
        assert_eq!(empty.verify().unwrap(), Verified::Exclusion);
        let non_empty_root = SingleProofPath {
            root: H256::repeat_byte(0x22),
            ..empty
        };
        assert_eq!(non_empty_root.verify(), Err(ProofError::EmptyProof));
        assert!(!verify(EMPTY_TRIE_ROOT, b"key", &[0x01], &nodes));
    }

    #[test]
    fn test_malformed_node_rejected() {
        // Trailing byte after an otherwise valid node, with a matching root.
        let mut node = encode(&RlpItem::List(vec![
            RlpItem::Bytes(vec![0x20]),
            RlpItem::Bytes(vec![0x01]),
        ]));
        node.push(0x00);
        let single = SingleProofPath {
            proof: vec![node.clone().into()],
            root: H256(keccak256(&node)),
            path: keccak256(b"key"),
            claimed_value: vec![0x01],
        };
        assert_eq!(
            single.verify(),
            Err(ProofError::CodecError {
                source: CodecError::MalformedEncoding(Malformation::TrailingBytes(1)),
                node_index: 0,
            })
        );
    }
}
