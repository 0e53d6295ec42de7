use std::fmt::Display;

use ethers::types::H256;

use crate::utils::hex_encode;

/// A display helper type for proofs.
///
/// Shows the root the nodes are expected to hash up to, then each node as
/// 0x-prefixed hex. Used when logging rejected proofs.
pub struct DisplayProof<'a> {
    root: H256,
    nodes: Vec<&'a [u8]>,
}

impl<'a> DisplayProof<'a> {
    pub fn init<T: AsRef<[u8]>>(root: H256, nodes: &'a [T]) -> Self {
        Self {
            root,
            nodes: nodes.iter().map(|node| node.as_ref()).collect(),
        }
    }
}

impl Display for DisplayProof<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\n----begin proof (root {})----\n", hex_encode(self.root))?;
        for (index, node) in self.nodes.iter().enumerate() {
            write!(f, "\n{index}: {}\n", hex_encode(node))?;
        }
        write!(f, "\n----end proof----\n")?;
        Ok(())
    }
}
