//! Strict RLP codec.
//!
//! Encoding goes through the `rlp` crate. Decoding accepts only the canonical
//! encoding of a value: every length must be the shortest possible, a single
//! byte below 0x80 must stand alone, and the input must be consumed exactly.
//! Proof nodes come from untrusted RPC responses, so anything else is
//! rejected rather than normalised.
use ethers::types::Bytes;
use rlp::{DecoderError, Encodable, PayloadInfo, Rlp, RlpStream};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Nesting limit for decoded lists. Trie nodes nest at most a few levels
/// (proof list, node, embedded node).
pub const MAX_NESTING_DEPTH: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed encoding: {0}")]
    MalformedEncoding(Malformation),
}

/// Why an encoding was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Malformation {
    #[error("input is empty")]
    Empty,
    #[error("declared length runs past the end of the input")]
    Truncated,
    #[error("{0} bytes follow the encoded item")]
    TrailingBytes(usize),
    #[error("single byte below 0x80 wrapped in a string prefix")]
    NonCanonicalSingleByte,
    #[error("long form length prefix used for a payload of {0} bytes")]
    NonCanonicalLongForm(usize),
    #[error("length of length has a leading zero byte")]
    LeadingZeroLength,
    #[error("lists nested deeper than {MAX_NESTING_DEPTH}")]
    TooDeep,
    #[error("expected a list, found a string")]
    ExpectedList,
    #[error("decoder error {0}")]
    Decoder(DecoderError),
}

impl From<Malformation> for CodecError {
    fn from(value: Malformation) -> Self {
        CodecError::MalformedEncoding(value)
    }
}

impl From<DecoderError> for CodecError {
    fn from(value: DecoderError) -> Self {
        let reason = match value {
            DecoderError::RlpIsTooShort | DecoderError::RlpInconsistentLengthAndData => {
                Malformation::Truncated
            }
            DecoderError::RlpDataLenWithZeroPrefix | DecoderError::RlpListLenWithZeroPrefix => {
                Malformation::LeadingZeroLength
            }
            other => Malformation::Decoder(other),
        };
        CodecError::MalformedEncoding(reason)
    }
}

/// A decoded RLP value: a byte string or a list of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
    Bytes(Vec<u8>),
    List(Vec<RlpItem>),
}

impl RlpItem {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RlpItem::Bytes(bytes) => Some(bytes),
            RlpItem::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[RlpItem]> {
        match self {
            RlpItem::Bytes(_) => None,
            RlpItem::List(items) => Some(items),
        }
    }
}

impl Encodable for RlpItem {
    fn rlp_append(&self, s: &mut RlpStream) {
        match self {
            RlpItem::Bytes(bytes) => s.encoder().encode_value(bytes),
            RlpItem::List(items) => {
                s.begin_list(items.len());
                for item in items {
                    s.append(item);
                }
            }
        }
    }
}

pub fn encode(item: &RlpItem) -> Vec<u8> {
    rlp::encode(item).to_vec()
}

/// Decodes exactly one canonical item that spans the whole input.
pub fn decode(bytes: &[u8]) -> Result<RlpItem, CodecError> {
    decode_item(bytes, 0)
}

/// Returns the raw encoding of each item of a top level list.
///
/// Every item is checked to be canonical.
pub fn split_list(bytes: &[u8]) -> Result<Vec<&[u8]>, CodecError> {
    let (info, is_list) = checked_header(bytes)?;
    exact_length(&info, bytes)?;
    if !is_list {
        return Err(Malformation::ExpectedList.into());
    }
    let items = list_items(&bytes[info.header_len..info.total()])?;
    for item in &items {
        decode_item(item, 1)?;
    }
    Ok(items)
}

fn decode_item(bytes: &[u8], depth: usize) -> Result<RlpItem, CodecError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(Malformation::TooDeep.into());
    }
    let (info, is_list) = checked_header(bytes)?;
    exact_length(&info, bytes)?;
    let payload = &bytes[info.header_len..info.total()];
    if !is_list {
        return Ok(RlpItem::Bytes(payload.to_vec()));
    }
    let mut items = vec![];
    for raw in list_items(payload)? {
        items.push(decode_item(raw, depth + 1)?);
    }
    Ok(RlpItem::List(items))
}

/// Splits a list payload into the raw encodings of its items.
fn list_items(mut payload: &[u8]) -> Result<Vec<&[u8]>, CodecError> {
    let mut items = vec![];
    while !payload.is_empty() {
        let (info, _) = checked_header(payload)?;
        let (item, rest) = payload.split_at(info.total());
        items.push(item);
        payload = rest;
    }
    Ok(items)
}

/// Reads the header of the first item and applies the canonical form rules.
///
/// The returned info never extends past the end of `bytes`.
fn checked_header(bytes: &[u8]) -> Result<(PayloadInfo, bool), CodecError> {
    let prefix = *bytes.first().ok_or(Malformation::Empty)?;
    let long_form = matches!(prefix, 0xb8..=0xbf | 0xf8..=0xff);
    if prefix == 0x81 && bytes.get(1).map_or(false, |byte| *byte < 0x80) {
        return Err(Malformation::NonCanonicalSingleByte.into());
    }
    if long_form && bytes.get(1) == Some(&0) {
        return Err(Malformation::LeadingZeroLength.into());
    }
    let info = Rlp::new(bytes).payload_info()?;
    if info.total() > bytes.len() {
        return Err(Malformation::Truncated.into());
    }
    if long_form && info.value_len <= 55 {
        return Err(Malformation::NonCanonicalLongForm(info.value_len).into());
    }
    Ok((info, prefix >= 0xc0))
}

fn exact_length(info: &PayloadInfo, bytes: &[u8]) -> Result<(), CodecError> {
    match bytes.len() - info.total() {
        0 => Ok(()),
        extra => Err(Malformation::TrailingBytes(extra).into()),
    }
}

/// RLP list whose items are the trie nodes of one proof, in root to leaf order.
///
/// Each node is itself an RLP list and is embedded as an item, not wrapped as
/// a byte string. This is the form handed to the external verifier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct EncodedProof(Bytes);

impl EncodedProof {
    /// Encodes a node list. Every node must be a canonical RLP list.
    pub fn from_nodes<T: AsRef<[u8]>>(nodes: &[T]) -> Result<Self, CodecError> {
        let mut stream = RlpStream::new_list(nodes.len());
        for node in nodes {
            let node = node.as_ref();
            if let RlpItem::Bytes(_) = decode(node)? {
                return Err(Malformation::ExpectedList.into());
            }
            stream.append_raw(node, 1);
        }
        Ok(Self(stream.out().to_vec().into()))
    }

    /// Wraps received bytes after checking they hold a list of node lists.
    pub fn from_encoded(bytes: Bytes) -> Result<Self, CodecError> {
        let proof = Self(bytes);
        proof.nodes()?;
        Ok(proof)
    }

    /// Raw encodings of the nodes, in the order they were encoded.
    pub fn nodes(&self) -> Result<Vec<Vec<u8>>, CodecError> {
        split_list(&self.0)?
            .into_iter()
            .map(|node| match node.first() {
                Some(prefix) if *prefix >= 0xc0 => Ok(node.to_vec()),
                _ => Err(Malformation::ExpectedList.into()),
            })
            .collect()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}
