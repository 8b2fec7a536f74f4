//! Authenticated key/value map: a Merkle radix trie keyed by 256-bit hashes.
//!
//! The trie branches 16 ways on successive key nibbles. Nodes are immutable
//! and shared through `Arc`, so a mutation clones only the path from the root
//! to the touched leaf and a snapshot of the whole map is one root copy.
//! The root hash commits to the full key/value set and is independent of
//! insertion order.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{LedgerError, LedgerResult};
use crate::types::Hash256;

mod node;

use node::{Link, Node, NodeKind, BRANCH_FACTOR};

/// Persistence tag separating account-state nodes from transaction nodes in
/// the blob store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeType {
    Account,
    Transaction,
}

impl NodeType {
    pub fn as_u8(self) -> u8 {
        match self {
            NodeType::Account => 1,
            NodeType::Transaction => 2,
        }
    }

    pub fn from_u8(value: u8) -> LedgerResult<Self> {
        match value {
            1 => Ok(NodeType::Account),
            2 => Ok(NodeType::Transaction),
            other => Err(LedgerError::Codec(format!("unknown node type tag {other}"))),
        }
    }
}

/// Read side of the node blob store, used to materialize subtrees of a
/// rehydrated map on demand.
pub trait NodeSource: Send + Sync {
    fn fetch_node(&self, hash: &Hash256, node_type: NodeType) -> LedgerResult<Option<Vec<u8>>>;
}

/// Write side of the node blob store, used by `flush_dirty`.
pub trait NodeWriter {
    fn put_node(
        &self,
        hash: &Hash256,
        node_type: NodeType,
        ledger_seq: u32,
        body: &[u8],
    ) -> LedgerResult<()>;
}

/// Root handle checkpoint; restoring it rewinds the map to the state it had
/// when the checkpoint was taken. Cannot fail: nodes are immutable.
pub(crate) struct MapCheckpoint {
    root: Link,
}

#[derive(Clone, Copy)]
enum WriteMode {
    Add,
    Update,
}

struct MapInner {
    root: Link,
    source: Option<Arc<dyn NodeSource>>,
    resolved: HashMap<Hash256, Arc<Node>>,
}

pub struct ShaMap {
    node_type: NodeType,
    inner: Mutex<MapInner>,
}

impl ShaMap {
    /// Empty map.
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            inner: Mutex::new(MapInner {
                root: Link::Empty,
                source: None,
                resolved: HashMap::new(),
            }),
        }
    }

    /// Map rehydrated from a persisted root hash; contents are fetched from
    /// `source` as traversals reach them. A zero root is the empty map.
    /// Without a source the map stays header-only: any traversal past the
    /// root reports the node as missing.
    pub fn from_root(
        node_type: NodeType,
        root: Hash256,
        source: Option<Arc<dyn NodeSource>>,
    ) -> Self {
        let root = if root.is_zero() {
            Link::Empty
        } else {
            Link::Hash(root)
        };
        Self {
            node_type,
            inner: Mutex::new(MapInner {
                root,
                source,
                resolved: HashMap::new(),
            }),
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Structural-sharing copy: both maps start from the same root and
    /// diverge as either mutates.
    pub fn snapshot(&self) -> ShaMap {
        let inner = self.inner.lock();
        ShaMap {
            node_type: self.node_type,
            inner: Mutex::new(MapInner {
                root: inner.root.clone(),
                source: inner.source.clone(),
                resolved: inner.resolved.clone(),
            }),
        }
    }

    /// Deterministic commitment to the map contents; zero iff empty.
    pub fn root_hash(&self) -> Hash256 {
        self.inner.lock().root.hash()
    }

    /// Read a value without touching dirty state.
    pub fn peek(&self, key: &Hash256) -> LedgerResult<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let node_type = self.node_type;
        let mut link = inner.root.clone();
        let mut depth = 0;
        loop {
            let node = match &link {
                Link::Empty => return Ok(None),
                other => inner.resolve(other, node_type)?,
            };
            match node.kind() {
                NodeKind::Leaf { key: leaf_key, value } => {
                    return Ok((leaf_key == key).then(|| value.clone()));
                }
                NodeKind::Inner { children } => {
                    link = children[key.nibble(depth)].clone();
                    depth += 1;
                }
            }
        }
    }

    /// Insert a new entry; false if the key is already present.
    pub fn add(&self, key: Hash256, value: Vec<u8>) -> LedgerResult<bool> {
        let mut inner = self.inner.lock();
        let root = inner.root.clone();
        match inner.write_at(root, 0, &key, &value, WriteMode::Add, self.node_type)? {
            Some(new_root) => {
                inner.root = new_root;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Replace an existing entry; false if the key is absent.
    pub fn update(&self, key: Hash256, value: Vec<u8>) -> LedgerResult<bool> {
        let mut inner = self.inner.lock();
        let root = inner.root.clone();
        match inner.write_at(root, 0, &key, &value, WriteMode::Update, self.node_type)? {
            Some(new_root) => {
                inner.root = new_root;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Remove an entry; false if the key is absent.
    pub fn delete(&self, key: &Hash256) -> LedgerResult<bool> {
        let mut inner = self.inner.lock();
        let root = inner.root.clone();
        match inner.delete_at(root, 0, key, self.node_type)? {
            Some(new_root) => {
                inner.root = new_root;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write up to `batch_cap` unpersisted nodes to `writer`, children before
    /// parents so a stored inner node never references a missing child.
    /// Returns whether unpersisted nodes remain.
    pub fn flush_dirty(
        &self,
        batch_cap: usize,
        ledger_seq: u32,
        writer: &dyn NodeWriter,
    ) -> LedgerResult<bool> {
        let root = self.inner.lock().root.clone();
        let mut budget = batch_cap;
        let done = flush_link(&root, &mut budget, self.node_type, ledger_seq, writer)?;
        Ok(!done)
    }

    /// In-order traversal of all (key, value) entries.
    pub fn visit_leaves(
        &self,
        visit: &mut dyn FnMut(&Hash256, &[u8]),
    ) -> LedgerResult<()> {
        let mut inner = self.inner.lock();
        let root = inner.root.clone();
        inner.visit(root, self.node_type, visit)
    }

    pub(crate) fn checkpoint(&self) -> MapCheckpoint {
        MapCheckpoint {
            root: self.inner.lock().root.clone(),
        }
    }

    pub(crate) fn restore(&self, checkpoint: MapCheckpoint) {
        self.inner.lock().root = checkpoint.root;
    }
}

impl MapInner {
    fn resolve(&mut self, link: &Link, node_type: NodeType) -> LedgerResult<Arc<Node>> {
        match link {
            Link::Node(node) => Ok(node.clone()),
            Link::Hash(hash) => {
                if let Some(node) = self.resolved.get(hash) {
                    return Ok(node.clone());
                }
                let source = self.source.as_ref().ok_or_else(|| {
                    LedgerError::MissingNode(hash.to_hex())
                })?;
                let bytes = source
                    .fetch_node(hash, node_type)?
                    .ok_or_else(|| LedgerError::MissingNode(hash.to_hex()))?;
                let node = Node::decode(hash, &bytes)?;
                self.resolved.insert(*hash, node.clone());
                Ok(node)
            }
            Link::Empty => Err(LedgerError::Codec("resolve of empty map link".into())),
        }
    }

    fn write_at(
        &mut self,
        link: Link,
        depth: usize,
        key: &Hash256,
        value: &[u8],
        mode: WriteMode,
        node_type: NodeType,
    ) -> LedgerResult<Option<Link>> {
        match link {
            Link::Empty => Ok(match mode {
                WriteMode::Add => Some(Link::Node(Arc::new(Node::leaf(*key, value.to_vec())))),
                WriteMode::Update => None,
            }),
            other => {
                let node = self.resolve(&other, node_type)?;
                match node.kind() {
                    NodeKind::Leaf { key: leaf_key, .. } => match (mode, leaf_key == key) {
                        (WriteMode::Add, true) | (WriteMode::Update, false) => Ok(None),
                        (WriteMode::Update, true) => {
                            Ok(Some(Link::Node(Arc::new(Node::leaf(*key, value.to_vec())))))
                        }
                        (WriteMode::Add, false) => {
                            Ok(Some(fork(depth, node.clone(), *leaf_key, key, value)))
                        }
                    },
                    NodeKind::Inner { children } => {
                        let slot = key.nibble(depth);
                        let child = children[slot].clone();
                        let mut children = (*children).clone();
                        match self.write_at(child, depth + 1, key, value, mode, node_type)? {
                            Some(new_child) => {
                                children[slot] = new_child;
                                Ok(Some(Link::Node(Arc::new(Node::inner(children)))))
                            }
                            None => Ok(None),
                        }
                    }
                }
            }
        }
    }

    fn delete_at(
        &mut self,
        link: Link,
        depth: usize,
        key: &Hash256,
        node_type: NodeType,
    ) -> LedgerResult<Option<Link>> {
        match link {
            Link::Empty => Ok(None),
            other => {
                let node = self.resolve(&other, node_type)?;
                match node.kind() {
                    NodeKind::Leaf { key: leaf_key, .. } => {
                        Ok((leaf_key == key).then_some(Link::Empty))
                    }
                    NodeKind::Inner { children } => {
                        let slot = key.nibble(depth);
                        let child = children[slot].clone();
                        let Some(new_child) = self.delete_at(child, depth + 1, key, node_type)?
                        else {
                            return Ok(None);
                        };
                        let mut children = (*children).clone();
                        children[slot] = new_child;

                        let occupied: Vec<usize> = (0..BRANCH_FACTOR)
                            .filter(|slot| !children[*slot].is_empty())
                            .collect();
                        match occupied.as_slice() {
                            [] => Ok(Some(Link::Empty)),
                            [only] => {
                                // An inner node with a single leaf below it
                                // collapses, keeping the trie shape a pure
                                // function of the key set.
                                let only = children[*only].clone();
                                let child_node = self.resolve(&only, node_type)?;
                                if child_node.is_leaf() {
                                    Ok(Some(Link::Node(child_node)))
                                } else {
                                    Ok(Some(Link::Node(Arc::new(Node::inner(children)))))
                                }
                            }
                            _ => Ok(Some(Link::Node(Arc::new(Node::inner(children))))),
                        }
                    }
                }
            }
        }
    }

    fn visit(
        &mut self,
        link: Link,
        node_type: NodeType,
        visit: &mut dyn FnMut(&Hash256, &[u8]),
    ) -> LedgerResult<()> {
        match link {
            Link::Empty => Ok(()),
            other => {
                let node = self.resolve(&other, node_type)?;
                match node.kind() {
                    NodeKind::Leaf { key, value } => {
                        visit(key, value);
                        Ok(())
                    }
                    NodeKind::Inner { children } => {
                        for child in children {
                            self.visit(child.clone(), node_type, visit)?;
                        }
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Build the subtree replacing a leaf when a second key arrives that shares
/// its prefix through `depth - 1`.
fn fork(
    depth: usize,
    existing: Arc<Node>,
    existing_key: Hash256,
    key: &Hash256,
    value: &[u8],
) -> Link {
    let mut children: [Link; BRANCH_FACTOR] = Default::default();
    let existing_slot = existing_key.nibble(depth);
    let new_slot = key.nibble(depth);
    if existing_slot == new_slot {
        children[existing_slot] = fork(depth + 1, existing, existing_key, key, value);
    } else {
        children[existing_slot] = Link::Node(existing);
        children[new_slot] = Link::Node(Arc::new(Node::leaf(*key, value.to_vec())));
    }
    Link::Node(Arc::new(Node::inner(children)))
}

fn flush_link(
    link: &Link,
    budget: &mut usize,
    node_type: NodeType,
    ledger_seq: u32,
    writer: &dyn NodeWriter,
) -> LedgerResult<bool> {
    let Link::Node(node) = link else {
        // Empty slots have nothing to write; hash links are already on disk.
        return Ok(true);
    };
    if node.is_flushed() {
        return Ok(true);
    }
    if let NodeKind::Inner { children } = node.kind() {
        for child in children {
            if !flush_link(child, budget, node_type, ledger_seq, writer)? {
                return Ok(false);
            }
        }
    }
    if *budget == 0 {
        return Ok(false);
    }
    writer.put_node(&node.hash(), node_type, ledger_seq, &node.encode())?;
    *budget -= 1;
    node.mark_flushed();
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Default)]
    struct MemStore {
        nodes: Mutex<HashMap<Hash256, Vec<u8>>>,
    }

    impl NodeWriter for MemStore {
        fn put_node(
            &self,
            hash: &Hash256,
            _node_type: NodeType,
            _ledger_seq: u32,
            body: &[u8],
        ) -> LedgerResult<()> {
            self.nodes.lock().insert(*hash, body.to_vec());
            Ok(())
        }
    }

    impl NodeSource for MemStore {
        fn fetch_node(
            &self,
            hash: &Hash256,
            _node_type: NodeType,
        ) -> LedgerResult<Option<Vec<u8>>> {
            Ok(self.nodes.lock().get(hash).cloned())
        }
    }

    fn key(fill: u8) -> Hash256 {
        Hash256::from_bytes([fill; 32])
    }

    #[test]
    fn empty_map_has_zero_root() {
        let map = ShaMap::new(NodeType::Transaction);
        assert_eq!(map.root_hash(), Hash256::ZERO);
        assert_eq!(map.peek(&key(1)).unwrap(), None);
    }

    #[test]
    fn add_update_delete_contract() {
        let map = ShaMap::new(NodeType::Account);
        assert!(map.add(key(1), vec![1]).unwrap());
        assert!(!map.add(key(1), vec![2]).unwrap());
        assert_eq!(map.peek(&key(1)).unwrap(), Some(vec![1]));

        assert!(map.update(key(1), vec![9]).unwrap());
        assert!(!map.update(key(2), vec![9]).unwrap());
        assert_eq!(map.peek(&key(1)).unwrap(), Some(vec![9]));

        assert!(map.delete(&key(1)).unwrap());
        assert!(!map.delete(&key(1)).unwrap());
        assert_eq!(map.root_hash(), Hash256::ZERO);
    }

    #[test]
    fn root_changes_with_content() {
        let map = ShaMap::new(NodeType::Account);
        map.add(key(1), vec![1]).unwrap();
        let one = map.root_hash();
        map.add(key(2), vec![2]).unwrap();
        let two = map.root_hash();
        assert_ne!(one, two);
        map.update(key(2), vec![3]).unwrap();
        assert_ne!(map.root_hash(), two);
    }

    #[test]
    fn delete_restores_prior_root() {
        // Keys sharing a long prefix force deep forks; deleting must collapse
        // the chain back to the canonical shape.
        let mut a = [0u8; 32];
        a[0] = 0x10;
        let mut b = [0u8; 32];
        b[0] = 0x11;
        let mut c = [0u8; 32];
        c[0] = 0x1f;
        c[5] = 0x01;

        let map = ShaMap::new(NodeType::Transaction);
        map.add(Hash256::from_bytes(a), vec![1]).unwrap();
        map.add(Hash256::from_bytes(b), vec![2]).unwrap();
        let before = map.root_hash();
        map.add(Hash256::from_bytes(c), vec![3]).unwrap();
        map.delete(&Hash256::from_bytes(c)).unwrap();
        assert_eq!(map.root_hash(), before);

        // Removing down to one entry must collapse the fork chain to the
        // same root a fresh single-entry map produces.
        map.delete(&Hash256::from_bytes(b)).unwrap();
        let single = ShaMap::new(NodeType::Transaction);
        single.add(Hash256::from_bytes(a), vec![1]).unwrap();
        assert_eq!(map.root_hash(), single.root_hash());
    }

    #[test]
    fn snapshot_isolates_mutations() {
        let parent = ShaMap::new(NodeType::Account);
        parent.add(key(1), vec![1]).unwrap();
        parent.add(key(2), vec![2]).unwrap();
        let parent_root = parent.root_hash();

        let child = parent.snapshot();
        assert_eq!(child.root_hash(), parent_root);

        child.update(key(1), vec![10]).unwrap();
        child.add(key(3), vec![3]).unwrap();
        assert_eq!(parent.root_hash(), parent_root);
        assert_eq!(parent.peek(&key(1)).unwrap(), Some(vec![1]));
        assert_eq!(parent.peek(&key(3)).unwrap(), None);
        assert_eq!(child.peek(&key(1)).unwrap(), Some(vec![10]));
    }

    #[test]
    fn checkpoint_rewinds_mutations() {
        let map = ShaMap::new(NodeType::Account);
        map.add(key(1), vec![1]).unwrap();
        let root = map.root_hash();

        let checkpoint = map.checkpoint();
        map.add(key(2), vec![2]).unwrap();
        map.update(key(1), vec![3]).unwrap();
        assert_ne!(map.root_hash(), root);

        map.restore(checkpoint);
        assert_eq!(map.root_hash(), root);
        assert_eq!(map.peek(&key(1)).unwrap(), Some(vec![1]));
        assert_eq!(map.peek(&key(2)).unwrap(), None);
    }

    #[test]
    fn flush_then_rehydrate_lazily() {
        let store = Arc::new(MemStore::default());
        let map = ShaMap::new(NodeType::Account);
        for fill in 1u8..=40 {
            map.add(key(fill), vec![fill]).unwrap();
        }
        let root = map.root_hash();

        // Small batches: several rounds must be needed, then none remain.
        let mut rounds = 0;
        while map.flush_dirty(4, 7, store.as_ref()).unwrap() {
            rounds += 1;
            assert!(rounds < 1000, "flush failed to converge");
        }
        assert!(rounds >= 1);
        assert!(!map.flush_dirty(4, 7, store.as_ref()).unwrap());

        let reloaded = ShaMap::from_root(NodeType::Account, root, Some(store.clone()));
        assert_eq!(reloaded.root_hash(), root);
        for fill in 1u8..=40 {
            assert_eq!(reloaded.peek(&key(fill)).unwrap(), Some(vec![fill]));
        }
        assert_eq!(reloaded.peek(&key(41)).unwrap(), None);

        // A mutation on the reloaded map only dirties the touched path.
        reloaded.update(key(1), vec![99]).unwrap();
        assert_ne!(reloaded.root_hash(), root);
        while reloaded.flush_dirty(4, 8, store.as_ref()).unwrap() {}
        let again = ShaMap::from_root(NodeType::Account, reloaded.root_hash(), Some(store));
        assert_eq!(again.peek(&key(1)).unwrap(), Some(vec![99]));
    }

    #[test]
    fn missing_node_surfaces_as_error() {
        let store = Arc::new(MemStore::default());
        let map = ShaMap::from_root(NodeType::Account, key(0xaa), Some(store));
        assert!(matches!(
            map.peek(&key(1)),
            Err(LedgerError::MissingNode(_))
        ));
    }

    #[test]
    fn visit_leaves_sees_every_entry() {
        let map = ShaMap::new(NodeType::Transaction);
        for fill in 1u8..=10 {
            map.add(key(fill), vec![fill]).unwrap();
        }
        let mut seen = Vec::new();
        map.visit_leaves(&mut |key, value| seen.push((*key, value.to_vec())))
            .unwrap();
        assert_eq!(seen.len(), 10);
        for (key, value) in seen {
            assert_eq!(vec![key.as_bytes()[0]], value);
        }
    }

    proptest! {
        #[test]
        fn root_hash_is_order_insensitive(
            entries in prop::collection::btree_map(
                any::<[u8; 32]>(),
                prop::collection::vec(any::<u8>(), 0..24),
                1..32,
            ),
            seed in any::<u64>(),
        ) {
            let ordered: Vec<_> = entries.into_iter().collect();
            let mut shuffled = ordered.clone();
            // Deterministic Fisher-Yates driven by the seed.
            let mut state = seed | 1;
            for i in (1..shuffled.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let j = (state >> 33) as usize % (i + 1);
                shuffled.swap(i, j);
            }

            let a = ShaMap::new(NodeType::Account);
            for (key, value) in &ordered {
                prop_assert!(a.add(Hash256::from_bytes(*key), value.clone()).unwrap());
            }
            let b = ShaMap::new(NodeType::Account);
            for (key, value) in &shuffled {
                prop_assert!(b.add(Hash256::from_bytes(*key), value.clone()).unwrap());
            }
            prop_assert_eq!(a.root_hash(), b.root_hash());
        }
    }
}
