//! For processing a node in a Merkle PATRICIA Trie proof.
use ethers::types::H256;
use thiserror::Error;

use crate::{
    codec::{encode, RlpItem},
    path::{HexPrefixPath, NibblePath, PathError, PathNature, PathTag},
    proof::ProofType,
};

#[derive(Debug, Error, Eq, PartialEq)]
pub enum NodeError {
    #[error("Node is an RLP string, expected a list")]
    NodeNotList,
    #[error("Branch node (non-terminal) has value, expected none")]
    BranchNodeHasValue,
    #[error("Child reference must be empty, a 32 byte hash or an embedded node, got {0} bytes")]
    InvalidChildReference(usize),
    #[error("Embedded node encodes to {0} bytes, only nodes under 32 bytes are embedded")]
    EmbeddedNodeTooLarge(usize),
    #[error("Extension node has no next node")]
    ExtensionNodeNoNextNode,
    #[error("Node path item is a list, expected bytes")]
    PathNotBytes,
    #[error("Leaf value item is a list, expected bytes")]
    LeafValueNotBytes,
    #[error("Leaf node has no value")]
    LeafHasNoValue,
    #[error("Leaf node must complete the 32 byte path")]
    LeafHasIncompletePath,
    #[error("Node has invalid item count {0}, expected 2 or 17")]
    NodeHasInvalidItemCount(usize),
    #[error("Trie path error {0}")]
    PathError(#[from] PathError),
    #[error("Full 32 byte traversal should not end with an extension node")]
    TraversalEndsAtExtension,
}

/// Description of node in a merkle proof.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum NodeKind {
    Branch,
    Extension(HexPrefixPath),
    Leaf(HexPrefixPath),
}

/// Where the walk goes after a node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Step {
    /// Continue with the referenced child.
    Descend(ChildRef),
    /// The node ends the walk.
    Terminal(ProofType),
}

/// Reference from a parent to a child node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ChildRef {
    /// The next proof element must hash to this.
    Hash(H256),
    /// The child is inlined in the parent (encoding under 32 bytes).
    Embedded(Vec<RlpItem>),
}

impl ChildRef {
    /// Interprets a branch slot or extension child item. `None` is an empty slot.
    fn read(item: &RlpItem) -> Result<Option<Self>, NodeError> {
        match item {
            RlpItem::Bytes(bytes) if bytes.is_empty() => Ok(None),
            RlpItem::Bytes(bytes) if bytes.len() == 32 => {
                Ok(Some(ChildRef::Hash(H256::from_slice(bytes))))
            }
            RlpItem::Bytes(bytes) => Err(NodeError::InvalidChildReference(bytes.len())),
            RlpItem::List(items) => {
                let size = encode(item).len();
                if size >= 32 {
                    return Err(NodeError::EmbeddedNodeTooLarge(size));
                }
                Ok(Some(ChildRef::Embedded(items.clone())))
            }
        }
    }
}

impl NodeKind {
    pub fn deduce(node: &[RlpItem]) -> Result<NodeKind, NodeError> {
        match node.len() {
            17 => Ok(NodeKind::Branch),
            2 => {
                let encoded = node[0].as_bytes().ok_or(NodeError::PathNotBytes)?;
                let path = HexPrefixPath::decode(encoded)?;
                Ok(match path.tag {
                    PathTag::Extension => NodeKind::Extension(path),
                    PathTag::Leaf => NodeKind::Leaf(path),
                })
            }
            count => Err(NodeError::NodeHasInvalidItemCount(count)),
        }
    }

    /// Visits the relevant part of a node, progressing the traversal.
    ///
    /// Either names the child to visit next or, for the final node, the kind of
    /// proof the walk produced.
    pub fn traverse_node(
        &self,
        node: &[RlpItem],
        traversal: &mut NibblePath,
    ) -> Result<Step, NodeError> {
        match self {
            NodeKind::Branch => {
                // Keys are fixed length, so no value terminates at a branch.
                match node.get(16) {
                    Some(RlpItem::Bytes(value)) if value.is_empty() => {}
                    _ => return Err(NodeError::BranchNodeHasValue),
                }
                let nibble = traversal.visit_path_nibble()?;
                let item = node
                    .get(nibble as usize)
                    .ok_or(NodeError::NodeHasInvalidItemCount(node.len()))?;
                Ok(match ChildRef::read(item)? {
                    Some(child) => Step::Descend(child),
                    None => Step::Terminal(ProofType::BranchExclusion),
                })
            }
            NodeKind::Extension(path) => {
                match traversal.match_or_mismatch(&path.nibbles)? {
                    PathNature::SubPathMatches => {
                        let item = node.get(1).ok_or(NodeError::ExtensionNodeNoNextNode)?;
                        let child =
                            ChildRef::read(item)?.ok_or(NodeError::ExtensionNodeNoNextNode)?;
                        traversal.skip_nibbles(path.nibbles.len())?;
                        Ok(Step::Descend(child))
                    }
                    PathNature::SubPathDiverges(_) | PathNature::FullPathDiverges(_) => {
                        Ok(Step::Terminal(ProofType::ExtensionExclusion))
                    }
                    PathNature::FullPathMatches => Err(NodeError::TraversalEndsAtExtension),
                }
            }
            NodeKind::Leaf(path) => {
                let value = node
                    .get(1)
                    .ok_or(NodeError::LeafHasNoValue)?
                    .as_bytes()
                    .ok_or(NodeError::LeafValueNotBytes)?;
                if value.is_empty() {
                    return Err(NodeError::LeafHasNoValue);
                }
                match traversal.match_or_mismatch(&path.nibbles)? {
                    PathNature::SubPathMatches => Err(NodeError::LeafHasIncompletePath),
                    PathNature::FullPathMatches => {
                        Ok(Step::Terminal(ProofType::Inclusion(value.to_vec())))
                    }
                    PathNature::FullPathDiverges(_) | PathNature::SubPathDiverges(_) => {
                        // A leaf for another key sits where this key would be, so
                        // the trie cannot contain this key.
                        Ok(Step::Terminal(ProofType::LeafExclusion))
                    }
                }
            }
        }
    }
}
