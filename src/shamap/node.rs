use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::errors::{LedgerError, LedgerResult};
use crate::serializer::Serializer;
use crate::types::Hash256;

pub(crate) const BRANCH_FACTOR: usize = 16;

const LEAF_HASH_PREFIX: &[u8] = b"MLN\0";
const INNER_HASH_PREFIX: &[u8] = b"MIN\0";

const WIRE_LEAF: u8 = 0x00;
const WIRE_INNER: u8 = 0x01;

/// Child slot of an inner node. `Hash` is a persisted child that has not
/// been materialized yet; it is resolved through the map's node source on
/// first traversal.
#[derive(Clone, Default)]
pub(crate) enum Link {
    #[default]
    Empty,
    Node(Arc<Node>),
    Hash(Hash256),
}

impl Link {
    pub(crate) fn hash(&self) -> Hash256 {
        match self {
            Link::Empty => Hash256::ZERO,
            Link::Node(node) => node.hash(),
            Link::Hash(hash) => *hash,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, Link::Empty)
    }
}

pub(crate) enum NodeKind {
    Inner { children: [Link; BRANCH_FACTOR] },
    Leaf { key: Hash256, value: Vec<u8> },
}

/// Trie node. The hash is fixed at construction; nodes are immutable once
/// built, so subtrees can be shared between map snapshots. The flushed flag
/// is the only mutable state and only moves false -> true.
pub(crate) struct Node {
    hash: Hash256,
    flushed: AtomicBool,
    kind: NodeKind,
}

impl Node {
    pub(crate) fn leaf(key: Hash256, value: Vec<u8>) -> Self {
        let mut s = Serializer::with_capacity(LEAF_HASH_PREFIX.len() + value.len() + 32);
        s.add_raw(LEAF_HASH_PREFIX);
        s.add_raw(&value);
        s.add256(&key);
        Self {
            hash: s.sha512_half(),
            flushed: AtomicBool::new(false),
            kind: NodeKind::Leaf { key, value },
        }
    }

    pub(crate) fn inner(children: [Link; BRANCH_FACTOR]) -> Self {
        let mut s = Serializer::with_capacity(INNER_HASH_PREFIX.len() + BRANCH_FACTOR * 32);
        s.add_raw(INNER_HASH_PREFIX);
        for child in &children {
            s.add256(&child.hash());
        }
        Self {
            hash: s.sha512_half(),
            flushed: AtomicBool::new(false),
            kind: NodeKind::Inner { children },
        }
    }

    pub(crate) fn hash(&self) -> Hash256 {
        self.hash
    }

    pub(crate) fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub(crate) fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::Relaxed)
    }

    pub(crate) fn mark_flushed(&self) {
        self.flushed.store(true, Ordering::Relaxed);
    }

    /// Wire encoding used for the persisted blob store.
    ///
    /// Leaf:  0x00 | key (32) | value
    /// Inner: 0x01 | occupancy bitmap (u16 BE, bit i = slot i) | child hashes
    pub(crate) fn encode(&self) -> Vec<u8> {
        match &self.kind {
            NodeKind::Leaf { key, value } => {
                let mut s = Serializer::with_capacity(1 + 32 + value.len());
                s.add8(WIRE_LEAF);
                s.add256(key);
                s.add_raw(value);
                s.into_bytes()
            }
            NodeKind::Inner { children } => {
                let mut bitmap = 0u16;
                for (slot, child) in children.iter().enumerate() {
                    if !child.is_empty() {
                        bitmap |= 1 << slot;
                    }
                }
                let mut s = Serializer::with_capacity(1 + 2 + BRANCH_FACTOR * 32);
                s.add8(WIRE_INNER);
                s.add16(bitmap);
                for child in children {
                    if !child.is_empty() {
                        s.add256(&child.hash());
                    }
                }
                s.into_bytes()
            }
        }
    }

    /// Decode a node fetched from the blob store. The recomputed hash must
    /// match the hash the node was fetched under.
    pub(crate) fn decode(expected: &Hash256, data: &[u8]) -> LedgerResult<Arc<Self>> {
        let node = match data.split_first() {
            Some((&WIRE_LEAF, rest)) => {
                if rest.len() < 32 {
                    return Err(LedgerError::Codec("leaf node shorter than its key".into()));
                }
                let key = Hash256::from_slice(&rest[..32])?;
                Node::leaf(key, rest[32..].to_vec())
            }
            Some((&WIRE_INNER, rest)) => {
                if rest.len() < 2 {
                    return Err(LedgerError::Codec("inner node missing bitmap".into()));
                }
                let bitmap = u16::from_be_bytes(rest[..2].try_into().expect("2 bytes"));
                let hashes = &rest[2..];
                if hashes.len() != bitmap.count_ones() as usize * 32 {
                    return Err(LedgerError::Codec(
                        "inner node child hashes do not match bitmap".into(),
                    ));
                }
                let mut children: [Link; BRANCH_FACTOR] = Default::default();
                let mut offset = 0;
                for (slot, child) in children.iter_mut().enumerate() {
                    if bitmap & (1 << slot) != 0 {
                        *child = Link::Hash(Hash256::from_slice(&hashes[offset..offset + 32])?);
                        offset += 32;
                    }
                }
                Node::inner(children)
            }
            _ => return Err(LedgerError::Codec("unknown map node wire tag".into())),
        };
        if node.hash() != *expected {
            return Err(LedgerError::Codec(format!(
                "map node hash mismatch: expected {expected}, decoded {}",
                node.hash()
            )));
        }
        node.mark_flushed();
        Ok(Arc::new(node))
    }
}
