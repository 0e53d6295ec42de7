//! For navigating a traversal path in a Merkle PATRICIA Trie proof.
//!
//! The path is the hash of the key, keccak(key), walked one nibble at a time
//! from the root. Extension and leaf nodes carry a run of nibbles in hex
//! prefix form: the first nibble flags leaf vs extension and odd vs even
//! length, and even length paths carry a zero padding nibble.
//!
//! A proof whose path diverges from the expected path for the key shows that
//! the key is not in the trie (exclusion proof).

use thiserror::Error;

/// Nibbles in a full traversal path (32 bytes).
pub const PATH_NIBBLES: usize = 64;

/// An error with the Merkle Patricia Trie path.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PathError {
    #[error("Extension node does not contain any path data")]
    ExtensionPathEmpty,
    #[error("Node path runs past the end of the 32 byte key path (at nibble {0})")]
    PathLongerThanKey(usize),
    #[error("Unable to decode invalid hex prefix flag nibble {0}")]
    InvalidPathPrefix(u8),
    #[error("Even length hex prefix path has non-zero padding nibble {0}")]
    NonZeroPadding(u8),
    #[error("Nibble must be in the range 0-15, got {0}")]
    InvalidNibble(u8),
    #[error("Attempted traversal to next node in path but path has no remaining nibbles")]
    NextNodeNotInPath,
    #[error("Encoded path does not contain a first byte")]
    PathEmpty,
}

/// The nibble sequence of a key hash, plus how far the traversal has got.
///
/// E.g., Path 5a1... follows node indices in this order: [5, 10, 1, ...]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NibblePath {
    nibbles: Vec<u8>,
    visiting_index: usize,
}

impl NibblePath {
    pub fn init(key_hash: &[u8; 32]) -> Self {
        Self {
            nibbles: key_hash.iter().flat_map(byte_to_nibbles).collect(),
            visiting_index: 0,
        }
    }

    /// Returns the nibble to follow at a branch and moves past it.
    pub fn visit_path_nibble(&mut self) -> Result<u8, PathError> {
        let nibble = *self
            .nibbles
            .get(self.visiting_index)
            .ok_or(PathError::NextNodeNotInPath)?;
        self.visiting_index += 1;
        Ok(nibble)
    }

    /// Compares a node path with the nibbles not yet visited.
    ///
    /// Does not move the traversal.
    pub fn match_or_mismatch(&self, segment: &[u8]) -> Result<PathNature, PathError> {
        let end = self.visiting_index + segment.len();
        if end > PATH_NIBBLES {
            return Err(PathError::PathLongerThanKey(end));
        }
        let expected = &self.nibbles[self.visiting_index..end];
        let divergence = expected
            .iter()
            .zip(segment)
            .position(|(expected, found)| expected != found)
            .map(|offset| self.visiting_index + offset);
        Ok(match (divergence, end == PATH_NIBBLES) {
            (None, true) => PathNature::FullPathMatches,
            (None, false) => PathNature::SubPathMatches,
            (Some(index), true) => PathNature::FullPathDiverges(index),
            (Some(index), false) => PathNature::SubPathDiverges(index),
        })
    }

    /// Moves past a node path that has already been checked to match.
    pub fn skip_nibbles(&mut self, count: usize) -> Result<(), PathError> {
        let end = self.visiting_index + count;
        if end > PATH_NIBBLES {
            return Err(PathError::PathLongerThanKey(end));
        }
        self.visiting_index = end;
        Ok(())
    }

    /// Returns the index of the nibble being visited next.
    pub fn visiting_index(&self) -> usize {
        self.visiting_index
    }

    /// Nibbles that have not yet been traversed.
    pub fn pending(&self) -> &[u8] {
        &self.nibbles[self.visiting_index..]
    }
}

/// How a terminal extension/leaf path relates to the expected key path.
///
/// This condition is necessary but not sufficient for the overall proof verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathNature {
    /// Paths match, not yet 32 bytes.
    SubPathMatches,
    /// Paths diverge, not yet 32 bytes. Contains index of first divergent nibble.
    SubPathDiverges(usize),
    /// 32 byte paths match.
    FullPathMatches,
    /// 32 byte paths diverge. Contains index of first divergent nibble.
    FullPathDiverges(usize),
}

/// Which kind of two-item node a hex prefix path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTag {
    Extension,
    Leaf,
}

/// A decoded hex prefix path: the node kind and its nibbles (one per u8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexPrefixPath {
    pub tag: PathTag,
    pub nibbles: Vec<u8>,
}

impl HexPrefixPath {
    /// Decodes a hex prefix path.
    ///
    /// E.g. from an encoded odd leaf path:
    ///
    /// `[0x3f, 0x1c, 0xb8]` -> Leaf, `[0xf, 0x1, 0xc, 0xb, 0x8]`
    pub fn decode(encoded: &[u8]) -> Result<Self, PathError> {
        let (first, rest) = encoded.split_first().ok_or(PathError::PathEmpty)?;
        let [flag, low] = byte_to_nibbles(first);
        let (tag, odd) = match flag {
            0 => (PathTag::Extension, false),
            1 => (PathTag::Extension, true),
            2 => (PathTag::Leaf, false),
            3 => (PathTag::Leaf, true),
            other => return Err(PathError::InvalidPathPrefix(other)),
        };
        let mut nibbles = Vec::with_capacity(rest.len() * 2 + 1);
        if odd {
            nibbles.push(low);
        } else if low != 0 {
            return Err(PathError::NonZeroPadding(low));
        }
        nibbles.extend(rest.iter().flat_map(byte_to_nibbles));
        if tag == PathTag::Extension && nibbles.is_empty() {
            return Err(PathError::ExtensionPathEmpty);
        }
        Ok(Self { tag, nibbles })
    }

    /// Encodes nibbles with the hex prefix for the node kind.
    ///
    /// E.g. into an encoded odd leaf path:
    ///
    /// `[0xf, 0x1, 0xc, 0xb, 0x8]` -> `[0x3f, 0x1c, 0xb8]`
    pub fn encode(&self) -> Result<Vec<u8>, PathError> {
        let flag = match self.tag {
            PathTag::Extension => 0x0,
            PathTag::Leaf => 0x2,
        };
        let mut encoded = Vec::with_capacity(self.nibbles.len() / 2 + 1);
        let pairs = match self.nibbles.len() % 2 {
            0 => {
                encoded.push(nibbles_to_byte(flag, 0)?);
                &self.nibbles[..]
            }
            _ => {
                encoded.push(nibbles_to_byte(flag + 1, self.nibbles[0])?);
                &self.nibbles[1..]
            }
        };
        for pair in pairs.chunks_exact(2) {
            encoded.push(nibbles_to_byte(pair[0], pair[1])?);
        }
        Ok(encoded)
    }
}

/// Represents byte as an array of nibbles: 0xbc -> [0xb, 0xc]
fn byte_to_nibbles(byte: &u8) -> [u8; 2] {
    [byte >> 4, byte & 0x0f]
}

/// Joins two nibbles into a byte: (0xb, 0xc) -> 0xbc
fn nibbles_to_byte(high: u8, low: u8) -> Result<u8, PathError> {
    for nibble in [high, low] {
        if nibble > 15 {
            return Err(PathError::InvalidNibble(nibble));
        }
    }
    Ok(high << 4 | low)
}

#[cfg(test)]
mod test {
    use xchain_types::utils::hex_decode;

    use super::*;

    fn key_path(hex: &str) -> NibblePath {
        let bytes: [u8; 32] = hex_decode(hex).unwrap().try_into().unwrap();
        NibblePath::init(&bytes)
    }

    #[test]
    fn test_decode_hex_prefix() {
        let even_extension = HexPrefixPath::decode(&hex::decode("00012345").unwrap()).unwrap();
        assert_eq!(even_extension.tag, PathTag::Extension);
        assert_eq!(even_extension.nibbles, vec![0x0, 0x1, 0x2, 0x3, 0x4, 0x5]);

        let odd_extension = HexPrefixPath::decode(&hex::decode("112345").unwrap()).unwrap();
        assert_eq!(odd_extension.tag, PathTag::Extension);
        assert_eq!(odd_extension.nibbles, vec![0x1, 0x2, 0x3, 0x4, 0x5]);

        let even_leaf = HexPrefixPath::decode(&hex::decode("200f1cb8").unwrap()).unwrap();
        assert_eq!(even_leaf.tag, PathTag::Leaf);
        assert_eq!(even_leaf.nibbles, vec![0x0, 0xf, 0x1, 0xc, 0xb, 0x8]);

        let odd_leaf = HexPrefixPath::decode(&hex::decode("3f1cb8").unwrap()).unwrap();
        assert_eq!(odd_leaf.tag, PathTag::Leaf);
        assert_eq!(odd_leaf.nibbles, vec![0xf, 0x1, 0xc, 0xb, 0x8]);
    }

    #[test]
    fn test_decode_rejects_bad_prefix() {
        assert_eq!(HexPrefixPath::decode(&[]), Err(PathError::PathEmpty));
        assert_eq!(
            HexPrefixPath::decode(&[0x41, 0x23]),
            Err(PathError::InvalidPathPrefix(4))
        );
        assert_eq!(
            HexPrefixPath::decode(&[0x25, 0x23]),
            Err(PathError::NonZeroPadding(5))
        );
        assert_eq!(
            HexPrefixPath::decode(&[0x00]),
            Err(PathError::ExtensionPathEmpty)
        );
        // A leaf directly below a branch at the last nibble has no path left.
        let empty_leaf = HexPrefixPath::decode(&[0x20]).unwrap();
        assert!(empty_leaf.nibbles.is_empty());
    }

    #[test]
    fn test_encode_hex_prefix() {
        let encode = |tag, nibbles: &[u8]| {
            HexPrefixPath {
                tag,
                nibbles: nibbles.to_vec(),
            }
            .encode()
            .unwrap()
        };
        assert_eq!(
            encode(PathTag::Extension, &[0x0, 0x1, 0x2, 0x3, 0x4, 0x5]),
            hex::decode("00012345").unwrap()
        );
        assert_eq!(
            encode(PathTag::Extension, &[0x1, 0x2, 0x3, 0x4, 0x5]),
            hex::decode("112345").unwrap()
        );
        assert_eq!(
            encode(PathTag::Leaf, &[0x0, 0xf, 0x1, 0xc, 0xb, 0x8]),
            hex::decode("200f1cb8").unwrap()
        );
        assert_eq!(
            encode(PathTag::Leaf, &[0xf, 0x1, 0xc, 0xb, 0x8]),
            hex::decode("3f1cb8").unwrap()
        );
        let invalid = HexPrefixPath {
            tag: PathTag::Leaf,
            nibbles: vec![0x10],
        };
        assert_eq!(invalid.encode(), Err(PathError::InvalidNibble(0x10)));
    }

    #[test]
    fn test_visit_path_nibble() {
        let mut path =
            key_path("0x735649db80be637d281db0cc5896b0ff9869d08379a80fdc38dd073bba633949");
        assert_eq!(path.visit_path_nibble().unwrap(), 0x7);
        assert_eq!(path.visit_path_nibble().unwrap(), 0x3);
        assert_eq!(path.visiting_index(), 2);
        path.skip_nibbles(62).unwrap();
        assert_eq!(path.visit_path_nibble(), Err(PathError::NextNodeNotInPath));
        assert!(path.pending().is_empty());
    }

    #[test]
    fn test_terminal_leaf_full_match() {
        // Account leaf below an extension that consumed nibble 0x7.
        let mut path =
            key_path("0x735649db80be637d281db0cc5896b0ff9869d08379a80fdc38dd073bba633949");
        path.visit_path_nibble().unwrap();
        let leaf = HexPrefixPath::decode(
            &hex_decode("0x335649db80be637d281db0cc5896b0ff9869d08379a80fdc38dd073bba633949")
                .unwrap(),
        )
        .unwrap();
        assert_eq!(
            path.match_or_mismatch(&leaf.nibbles).unwrap(),
            PathNature::FullPathMatches
        );
    }

    #[test]
    fn test_divergence_index() {
        let mut path =
            key_path("0xcf1652a03292400cdc9040b230c7c8b9584f9903c1f4e2809fca09daa8670c8f");
        path.visit_path_nibble().unwrap();
        // Extension [f, 1, 7]: diverges at absolute nibble 3.
        assert_eq!(
            path.match_or_mismatch(&[0xf, 0x1, 0x7]).unwrap(),
            PathNature::SubPathDiverges(3)
        );
        assert_eq!(
            path.match_or_mismatch(&[0xf, 0x1, 0x6]).unwrap(),
            PathNature::SubPathMatches
        );
        let mut full_leaf = path.pending().to_vec();
        assert_eq!(
            path.match_or_mismatch(&full_leaf).unwrap(),
            PathNature::FullPathMatches
        );
        full_leaf[60] ^= 0x1;
        assert_eq!(
            path.match_or_mismatch(&full_leaf).unwrap(),
            PathNature::FullPathDiverges(61)
        );
        full_leaf.push(0x0);
        assert_eq!(
            path.match_or_mismatch(&full_leaf),
            Err(PathError::PathLongerThanKey(65))
        );
    }
}
