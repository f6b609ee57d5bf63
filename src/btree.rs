//! The copy-on-write tree engine.
//!
//! Every mutation rebuilds the nodes along the descent path into fresh
//! buffers, registers them with the page store and releases the pages
//! they replace. Nothing is ever modified in place, so a reader holding
//! the previous root keeps a consistent view of the previous tree.

use tracing::debug;

use crate::error::{Error, Result};
use crate::node::Node;
use crate::node_type::NodeType;
use crate::page_layout::{MAX_KEY_SIZE, MAX_VAL_SIZE};

/// The page store the tree runs against.
///
/// The store is the sole authority over page numbers: it maps live
/// numbers to page bytes, hands out fresh numbers for new pages and
/// recycles released ones. `get` and `new` are infallible by contract;
/// a store that stages pages in memory surfaces its I/O errors from
/// [`PageStore::commit`] instead, which is where the tree expects them.
pub trait PageStore {
    /// Returns a copy of the page registered under `ptr`, which must be
    /// a live page number.
    fn get(&self, ptr: u64) -> Node;

    /// Registers the contents of a new page and returns its number. A
    /// number referenced by a live node is never handed out again until
    /// it has been released with [`PageStore::del`].
    fn new(&mut self, node: Node) -> u64;

    /// Releases a page number for reuse. Must not be called on a number
    /// still reachable from a retained root.
    fn del(&mut self, ptr: u64);

    /// Atomically makes every page registered since the previous commit,
    /// together with the new root pointer, durable. On error nothing of
    /// the failed batch may become visible.
    fn commit(&mut self, root: u64) -> Result<()>;
}

/// A copy-on-write B-tree over an injected page store.
pub struct BTree<S: PageStore> {
    root: u64,
    store: S,
}

impl<S: PageStore> BTree<S> {
    /// Wraps a page store. `root` is 0 for an empty tree, otherwise the
    /// page number of the current root node.
    pub fn new(store: S, root: u64) -> BTree<S> {
        BTree { root, store }
    }

    /// The page number of the current root, 0 while the tree is empty.
    pub fn root(&self) -> u64 {
        self.root
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Inserts a key-value pair, or updates the value of an existing
    /// key, and commits the new tree version.
    ///
    /// Keys are capped at [`MAX_KEY_SIZE`] and values at
    /// [`MAX_VAL_SIZE`] bytes so that any single record fits a page; the
    /// zero-length key is reserved as the tree's internal sentinel.
    pub fn insert(&mut self, key: &[u8], val: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }
        if key.len() > MAX_KEY_SIZE {
            return Err(Error::KeyTooLong(key.len()));
        }
        if val.len() > MAX_VAL_SIZE {
            return Err(Error::ValueTooLong(val.len()));
        }

        if self.root == 0 {
            // First insert. The leaf root starts with a zero-length
            // sentinel key, which keeps the leftmost branch of every
            // lookup total: no real key can sort before it.
            let mut root = Node::new();
            root.set_header(NodeType::Leaf, 2);
            root.append_kv(0, 0, b"", b"");
            root.append_kv(1, 0, key, val);
            self.root = self.store.new(root);
            debug!(root = self.root, "bootstrapped tree root");
            return self.store.commit(self.root);
        }

        let node = self.tree_insert(self.store.get(self.root), key, val);
        let mut split = node.split3();
        self.store.del(self.root);
        self.root = if split.len() == 1 {
            self.store.new(split.remove(0))
        } else {
            // the root itself split, grow the tree by one level
            debug!(fanout = split.len(), "root split");
            let mut root = Node::new();
            root.set_header(NodeType::Internal, split.len() as u16);
            for (i, kid) in split.into_iter().enumerate() {
                let first = kid.get_key(0).to_vec();
                let ptr = self.store.new(kid);
                root.append_kv(i as u16, ptr, &first, b"");
            }
            self.store.new(root)
        };
        self.store.commit(self.root)
    }

    /// Copy-on-write insert into the subtree rooted at `node`. Returns
    /// the replacement node, built in a scratch buffer because it may
    /// exceed one page until the caller splits it.
    fn tree_insert(&mut self, node: Node, key: &[u8], val: &[u8]) -> Node {
        let mut new = Node::scratch();
        // node.get_key(idx) <= key, and the sentinel guarantees idx exists
        let idx = node.lookup_le(key);
        match node.node_type() {
            NodeType::Leaf => {
                if node.get_key(idx) == key {
                    new.leaf_update(&node, idx, key, val);
                } else {
                    new.leaf_insert(&node, idx + 1, key, val);
                }
            }
            NodeType::Internal => {
                // insert into the child, then splice the split results
                // back in place of its link
                let kptr = node.get_ptr(idx);
                let knode = self.tree_insert(self.store.get(kptr), key, val);
                let split = knode.split3();
                self.store.del(kptr);
                self.replace_kid_n(&mut new, &node, idx, split);
            }
        }
        new
    }

    /// Replaces the child link at `idx` with links to its 1..=3
    /// replacement children, promoting each child's first key as the
    /// separator. Internal entries carry no value.
    fn replace_kid_n(&mut self, new: &mut Node, old: &Node, idx: u16, kids: Vec<Node>) {
        let inc = kids.len() as u16;
        assert!(inc >= 1 && inc <= 3);
        new.set_header(NodeType::Internal, old.nkeys() + inc - 1);
        new.append_range(old, 0, 0, idx);
        for (i, kid) in kids.into_iter().enumerate() {
            let first = kid.get_key(0).to_vec();
            let ptr = self.store.new(kid);
            new.append_kv(idx + i as u16, ptr, &first, b"");
        }
        new.append_range(old, idx + inc, idx + 1, old.nkeys() - (idx + 1));
    }
}
