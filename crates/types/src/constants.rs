//! Constants shared by discovery, fetching and verification.

use ethers::types::H256;

/// Slot indices tried before the full sweep, in this order. These are where
/// deployed governance tokens were observed to place their `balances` mapping:
/// 0x65 (Aragon), 0x01 (Compound), 0x33 (DAOhaus).
pub const SLOT_SHORTLIST: [u8; 3] = [0x65, 0x01, 0x33];

/// Number of distinct slot indices a discovery run may read. Set to 2**8.
pub const SLOT_SEARCH_SPACE: usize = 256;

/// Root of a trie with no entries: keccak256(rlp("")).
pub const EMPTY_TRIE_ROOT: H256 = H256([
    0x56, 0xe8, 0x1f, 0x17, 0x1b, 0xcc, 0x55, 0xa6, 0xff, 0x83, 0x45, 0xe6, 0x92, 0xc0, 0xf8, 0x6e,
    0x5b, 0x48, 0xe0, 0x1b, 0x99, 0x6c, 0xad, 0xc0, 0x01, 0x62, 0x2f, 0xb5, 0xe3, 0x63, 0xb4, 0x21,
]);

/// Code hash of an account without code: keccak256("").
pub const KECCAK_EMPTY: H256 = H256([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03, 0xc0,
    0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85, 0xa4, 0x70,
]);

/// Maximum number of nodes permitted in a merkle patricia proof. Set to 2**6.
pub const MAX_NODES_PER_PROOF: usize = 64;

/// Maximum number of bytes permitted for an RLP encoded trie node. Set to 2**15.
pub const MAX_BYTES_PER_NODE: usize = 32768;

/// Seconds before an RPC call is abandoned.
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 30;

/// Storage reads kept in flight during discovery.
pub const DEFAULT_DISCOVERY_CONCURRENCY: usize = 8;
