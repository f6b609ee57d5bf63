use std::cmp::Ordering;

use byteorder::{ByteOrder, LittleEndian};

use crate::node_type::NodeType;
use crate::page_layout::{
    KV_HEADER_SIZE, MAX_KEY_SIZE, MAX_VAL_SIZE, NODE_HEADER_SIZE, NODE_TYPE_OFFSET,
    NODE_TYPE_SIZE, NUM_KEYS_OFFSET, NUM_KEYS_SIZE, OFFSET_SIZE, PAGE_SIZE, PTR_SIZE,
};

/// A B-tree node, decoded in place from a page buffer.
///
/// All accessors are O(1) index arithmetic over the layout described in
/// the `page_layout` module. Indices are checked against `nkeys`; beyond
/// that the buffer is trusted, so a `Node` must only be built by the
/// mutators here or read back from a page store holding buffers this
/// module previously produced.
///
/// Nodes are never mutated once persisted. A mutation builds a fresh
/// buffer, usually a [`Node::scratch`] one of twice the page size, since
/// the intermediate result may overflow a single page until the splitter
/// cuts it down.
#[derive(Clone)]
pub struct Node {
    data: Vec<u8>,
}

impl Node {
    /// An empty page-sized node buffer.
    pub fn new() -> Node {
        Node {
            data: vec![0; PAGE_SIZE],
        }
    }

    /// An empty working buffer of twice the page size, allowing a node
    /// under construction to exceed one page until it is split.
    pub fn scratch() -> Node {
        Node {
            data: vec![0; 2 * PAGE_SIZE],
        }
    }

    /// Copies one page worth of stored bytes back into a node.
    pub fn from_bytes(bytes: &[u8]) -> Node {
        assert!(bytes.len() == PAGE_SIZE);
        Node {
            data: bytes.to_vec(),
        }
    }

    /// The underlying buffer, `nbytes()` of which are meaningful.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    // Fixed-size header.

    pub fn btype(&self) -> u16 {
        LittleEndian::read_u16(&self.data[NODE_TYPE_OFFSET..NODE_TYPE_OFFSET + NODE_TYPE_SIZE])
    }

    pub fn nkeys(&self) -> u16 {
        LittleEndian::read_u16(&self.data[NUM_KEYS_OFFSET..NUM_KEYS_OFFSET + NUM_KEYS_SIZE])
    }

    pub fn node_type(&self) -> NodeType {
        NodeType::from_tag(self.btype())
    }

    /// Writes the header. Resets the logical content of the node; the
    /// mutators below fill the arrays strictly left to right afterwards.
    pub fn set_header(&mut self, node_type: NodeType, nkeys: u16) {
        LittleEndian::write_u16(
            &mut self.data[NODE_TYPE_OFFSET..NODE_TYPE_OFFSET + NODE_TYPE_SIZE],
            u16::from(node_type),
        );
        LittleEndian::write_u16(
            &mut self.data[NUM_KEYS_OFFSET..NUM_KEYS_OFFSET + NUM_KEYS_SIZE],
            nkeys,
        );
    }

    // Child pointer array. Meaningful for internal nodes only; leaves
    // keep the slots zeroed.

    pub fn get_ptr(&self, idx: u16) -> u64 {
        assert!(idx < self.nkeys());
        let pos = NODE_HEADER_SIZE + PTR_SIZE * idx as usize;
        LittleEndian::read_u64(&self.data[pos..pos + PTR_SIZE])
    }

    pub fn set_ptr(&mut self, idx: u16, ptr: u64) {
        assert!(idx < self.nkeys());
        let pos = NODE_HEADER_SIZE + PTR_SIZE * idx as usize;
        LittleEndian::write_u64(&mut self.data[pos..pos + PTR_SIZE], ptr);
    }

    // Record offsets array, used to locate the nth record in O(1).
    // `offset[0]` is zero by convention and is not stored.

    pub fn get_offset(&self, idx: u16) -> u16 {
        if idx == 0 {
            return 0;
        }
        assert!(idx <= self.nkeys());
        let pos = self.offset_pos(idx);
        LittleEndian::read_u16(&self.data[pos..pos + OFFSET_SIZE])
    }

    pub fn set_offset(&mut self, idx: u16, offset: u16) {
        assert!(idx >= 1 && idx <= self.nkeys());
        let pos = self.offset_pos(idx);
        LittleEndian::write_u16(&mut self.data[pos..pos + OFFSET_SIZE], offset);
    }

    fn offset_pos(&self, idx: u16) -> usize {
        NODE_HEADER_SIZE + PTR_SIZE * self.nkeys() as usize + OFFSET_SIZE * (idx - 1) as usize
    }

    /// Absolute position of the nth record. `idx == nkeys` is valid and
    /// yields the end of the last record, i.e. the occupied node size.
    pub fn kv_pos(&self, idx: u16) -> usize {
        assert!(idx <= self.nkeys());
        NODE_HEADER_SIZE
            + (PTR_SIZE + OFFSET_SIZE) * self.nkeys() as usize
            + self.get_offset(idx) as usize
    }

    /// The nth key as a slice into the buffer.
    pub fn get_key(&self, idx: u16) -> &[u8] {
        assert!(idx < self.nkeys());
        let pos = self.kv_pos(idx);
        let klen = LittleEndian::read_u16(&self.data[pos..pos + 2]) as usize;
        &self.data[pos + KV_HEADER_SIZE..pos + KV_HEADER_SIZE + klen]
    }

    /// The nth value as a slice into the buffer. Empty for internal nodes.
    pub fn get_val(&self, idx: u16) -> &[u8] {
        assert!(idx < self.nkeys());
        let pos = self.kv_pos(idx);
        let klen = LittleEndian::read_u16(&self.data[pos..pos + 2]) as usize;
        let vlen = LittleEndian::read_u16(&self.data[pos + 2..pos + 4]) as usize;
        &self.data[pos + KV_HEADER_SIZE + klen..pos + KV_HEADER_SIZE + klen + vlen]
    }

    /// Occupied size in bytes: the end of the last record.
    pub fn nbytes(&self) -> usize {
        self.kv_pos(self.nkeys())
    }

    /// Writes pointer and record for slot `idx` and seals the offset of
    /// the slot after it. Slots `0..idx` must already be filled, appends
    /// are strictly left to right within a node.
    pub fn append_kv(&mut self, idx: u16, ptr: u64, key: &[u8], val: &[u8]) {
        assert!(key.len() <= MAX_KEY_SIZE);
        assert!(val.len() <= MAX_VAL_SIZE);
        self.set_ptr(idx, ptr);
        let pos = self.kv_pos(idx);
        LittleEndian::write_u16(&mut self.data[pos..pos + 2], key.len() as u16);
        LittleEndian::write_u16(&mut self.data[pos + 2..pos + 4], val.len() as u16);
        self.data[pos + KV_HEADER_SIZE..pos + KV_HEADER_SIZE + key.len()].copy_from_slice(key);
        self.data[pos + KV_HEADER_SIZE + key.len()..pos + KV_HEADER_SIZE + key.len() + val.len()]
            .copy_from_slice(val);
        let end = self.get_offset(idx) + (KV_HEADER_SIZE + key.len() + val.len()) as u16;
        self.set_offset(idx + 1, end);
    }

    /// Copies `n` consecutive records from `src`, pointers included.
    pub fn append_range(&mut self, src: &Node, dst_idx: u16, src_idx: u16, n: u16) {
        for i in 0..n {
            self.append_kv(
                dst_idx + i,
                src.get_ptr(src_idx + i),
                src.get_key(src_idx + i),
                src.get_val(src_idx + i),
            );
        }
    }

    /// Rebuilds `old` as a leaf with the new pair inserted at `idx`.
    pub fn leaf_insert(&mut self, old: &Node, idx: u16, key: &[u8], val: &[u8]) {
        self.set_header(NodeType::Leaf, old.nkeys() + 1);
        self.append_range(old, 0, 0, idx);
        self.append_kv(idx, 0, key, val);
        self.append_range(old, idx + 1, idx, old.nkeys() - idx);
    }

    /// Rebuilds `old` as a leaf with the value at `idx` replaced. Only
    /// taken on an exact key match, so the key bytes do not change.
    pub fn leaf_update(&mut self, old: &Node, idx: u16, key: &[u8], val: &[u8]) {
        self.set_header(NodeType::Leaf, old.nkeys());
        self.append_range(old, 0, 0, idx);
        self.append_kv(idx, 0, key, val);
        self.append_range(old, idx + 1, idx + 1, old.nkeys() - (idx + 1));
    }

    /// Finds the last index whose key is less than or equal to `key`,
    /// or 0 when every key is greater (or the node is empty). Keys are
    /// sorted and unique, so an exact match returns its own index and
    /// the result is also the child to descend into on internal nodes.
    pub fn lookup_le(&self, key: &[u8]) -> u16 {
        let nkeys = self.nkeys();
        if nkeys == 0 {
            return 0;
        }
        let (mut lo, mut hi) = (0, nkeys - 1);
        while lo <= hi {
            let mid = lo + (hi - lo) / 2;
            match self.get_key(mid).cmp(key) {
                Ordering::Equal => return mid,
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => {
                    if mid == 0 {
                        // every key is greater than the target
                        return 0;
                    }
                    hi = mid - 1;
                }
            }
        }
        hi
    }

    /// Splits an oversized node into two, filling `left` and `right`.
    /// On exit `1 <= nleft < old.nkeys()` and the right node fits one
    /// page. The left node may still be oversized when a large prefix of
    /// records cannot be cut anywhere that satisfies the right half, so
    /// `left` must be a scratch buffer and the caller has to re-check it.
    pub fn split2(left: &mut Node, right: &mut Node, old: &Node) {
        assert!(old.nkeys() >= 2);
        // bytes occupied by a node holding the first `nleft` records
        let left_bytes = |nleft: u16| {
            NODE_HEADER_SIZE
                + (PTR_SIZE + OFFSET_SIZE) * nleft as usize
                + old.get_offset(nleft) as usize
        };
        // the remaining records, re-headed as their own node
        let right_bytes = |nleft: u16| old.nbytes() - left_bytes(nleft) + NODE_HEADER_SIZE;

        let mut nleft = old.nkeys() / 2;
        while left_bytes(nleft) > PAGE_SIZE {
            nleft -= 1;
        }
        assert!(nleft >= 1);
        while right_bytes(nleft) > PAGE_SIZE {
            nleft += 1;
        }
        assert!(nleft < old.nkeys());
        let nright = old.nkeys() - nleft;

        left.set_header(old.node_type(), nleft);
        right.set_header(old.node_type(), nright);
        left.append_range(old, 0, 0, nleft);
        right.append_range(old, 0, nleft, nright);
        assert!(right.nbytes() <= PAGE_SIZE);
    }

    /// Splits a node that may exceed one page into 1, 2 or 3 nodes that
    /// all fit, in key order. A second two-way split of a still-oversized
    /// left half always fits, so the fan-out of a single mutation is
    /// bounded by three.
    pub fn split3(mut self) -> Vec<Node> {
        if self.nbytes() <= PAGE_SIZE {
            self.data.truncate(PAGE_SIZE);
            return vec![self];
        }
        let mut left = Node::scratch();
        let mut right = Node::new();
        Node::split2(&mut left, &mut right, &self);
        if left.nbytes() <= PAGE_SIZE {
            left.data.truncate(PAGE_SIZE);
            return vec![left, right];
        }
        let mut leftleft = Node::new();
        let mut middle = Node::new();
        Node::split2(&mut leftleft, &mut middle, &left);
        assert!(leftleft.nbytes() <= PAGE_SIZE);
        vec![leftleft, middle, right]
    }
}

impl Default for Node {
    fn default() -> Node {
        Node::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Collects the key-value pairs of a node in index order.
    fn pairs(node: &Node) -> Vec<(Vec<u8>, Vec<u8>)> {
        (0..node.nkeys())
            .map(|i| (node.get_key(i).to_vec(), node.get_val(i).to_vec()))
            .collect()
    }

    fn assert_pairs(node: &Node, expected: &[(&[u8], &[u8])]) {
        assert_eq!(node.nkeys() as usize, expected.len());
        for (i, (key, val)) in expected.iter().enumerate() {
            assert_eq!(node.get_key(i as u16), *key, "key mismatch at index {}", i);
            assert_eq!(node.get_val(i as u16), *val, "value mismatch at index {}", i);
        }
    }

    // A leaf with the pairs k1/v1, k2/v2, k3/v3.
    fn leaf3() -> Node {
        let mut node = Node::new();
        node.set_header(NodeType::Leaf, 3);
        node.append_kv(0, 0, b"k1", b"v1");
        node.append_kv(1, 0, b"k2", b"v2");
        node.append_kv(2, 0, b"k3", b"v3");
        node
    }

    #[test]
    fn three_pair_leaf_layout() {
        let node = leaf3();
        assert_eq!(node.btype(), u16::from(NodeType::Leaf));
        assert_eq!(node.nkeys(), 3);
        // header 4 + pointers 3*8 + offsets 3*2 + records 3*(4+2+2)
        assert_eq!(node.nbytes(), 58);
        assert!(node.nbytes() <= node.as_bytes().len());
        assert_pairs(&node, &[(b"k1", b"v1"), (b"k2", b"v2"), (b"k3", b"v3")]);
    }

    #[test]
    fn offsets_accumulate_record_ends() {
        let node = leaf3();
        assert_eq!(node.get_offset(0), 0);
        assert_eq!(node.get_offset(1), 8);
        assert_eq!(node.get_offset(2), 16);
        assert_eq!(node.get_offset(3), 24);
        assert_eq!(node.kv_pos(3), node.nbytes());
    }

    #[test]
    fn lookup_le_on_empty_node() {
        let mut node = Node::new();
        node.set_header(NodeType::Leaf, 0);
        assert_eq!(node.lookup_le(b"anything"), 0);
    }

    #[test]
    fn lookup_le_positions() {
        let node = leaf3();
        // exact matches return their own index
        assert_eq!(node.lookup_le(b"k1"), 0);
        assert_eq!(node.lookup_le(b"k2"), 1);
        assert_eq!(node.lookup_le(b"k3"), 2);
        // below the first key
        assert_eq!(node.lookup_le(b"k0"), 0);
        // strictly between neighbours
        assert_eq!(node.lookup_le(b"k1a"), 0);
        assert_eq!(node.lookup_le(b"k2z"), 1);
        // past the last key
        assert_eq!(node.lookup_le(b"k9"), 2);
    }

    #[test]
    fn leaf_insert_at_tail() {
        let old = leaf3();
        let mut node = Node::new();
        node.leaf_insert(&old, 3, b"k4", b"v4");
        assert_eq!(node.nkeys(), 4);
        assert_eq!(node.node_type(), NodeType::Leaf);
        assert_pairs(
            &node,
            &[(b"k1", b"v1"), (b"k2", b"v2"), (b"k3", b"v3"), (b"k4", b"v4")],
        );
    }

    #[test]
    fn leaf_insert_in_middle_keeps_order() {
        let old = leaf3();
        let mut node = Node::new();
        // lookup_le(b"k15") + 1 is the insertion slot
        let idx = old.lookup_le(b"k15") + 1;
        assert_eq!(idx, 1);
        node.leaf_insert(&old, idx, b"k15", b"v15");
        assert_pairs(
            &node,
            &[(b"k1", b"v1"), (b"k15", b"v15"), (b"k2", b"v2"), (b"k3", b"v3")],
        );
    }

    #[test]
    fn leaf_update_replaces_single_value() {
        let old = leaf3();
        let mut node = Node::new();
        node.leaf_update(&old, 1, b"k2", b"v2n");
        assert_eq!(node.nkeys(), 3);
        assert_pairs(&node, &[(b"k1", b"v1"), (b"k2", b"v2n"), (b"k3", b"v3")]);
    }

    #[test]
    fn append_range_preserves_pointers() {
        let mut old = Node::new();
        old.set_header(NodeType::Internal, 3);
        old.append_kv(0, 11, b"a", b"");
        old.append_kv(1, 22, b"m", b"");
        old.append_kv(2, 33, b"t", b"");

        let mut node = Node::new();
        node.set_header(NodeType::Internal, 3);
        node.append_range(&old, 0, 0, 3);
        for i in 0..3 {
            assert_eq!(node.get_ptr(i), old.get_ptr(i));
            assert_eq!(node.get_key(i), old.get_key(i));
            assert_eq!(node.get_val(i), b"");
        }
    }

    #[test]
    #[should_panic]
    fn append_kv_rejects_oversized_key() {
        let mut node = Node::new();
        node.set_header(NodeType::Leaf, 1);
        node.append_kv(0, 0, &vec![b'x'; MAX_KEY_SIZE + 1], b"v");
    }

    #[test]
    fn split2_two_fitting_halves() {
        // 70 records of 104 bytes each: 7984 occupied bytes in a
        // scratch buffer, evenly splittable.
        let mut old = Node::scratch();
        old.set_header(NodeType::Leaf, 70);
        for i in 0..70u16 {
            let key = format!("key{:03}", i);
            old.append_kv(i, 0, key.as_bytes(), &vec![b'v'; 94]);
        }
        assert!(old.nbytes() > PAGE_SIZE);

        let mut left = Node::scratch();
        let mut right = Node::new();
        Node::split2(&mut left, &mut right, &old);

        assert!(left.nkeys() >= 1);
        assert!(left.nkeys() < old.nkeys());
        assert_eq!(left.nkeys() + right.nkeys(), old.nkeys());
        assert!(left.nbytes() <= PAGE_SIZE);
        assert!(right.nbytes() <= PAGE_SIZE);

        let mut all = pairs(&left);
        all.extend(pairs(&right));
        assert_eq!(all, pairs(&old));
    }

    #[test]
    fn split3_returns_fitting_node_unchanged() {
        let split = leaf3().split3();
        assert_eq!(split.len(), 1);
        assert_eq!(split[0].as_bytes().len(), PAGE_SIZE);
        assert_pairs(&split[0], &[(b"k1", b"v1"), (b"k2", b"v2"), (b"k3", b"v3")]);
    }

    #[test]
    fn split3_two_way() {
        let mut old = Node::scratch();
        old.set_header(NodeType::Leaf, 70);
        for i in 0..70u16 {
            let key = format!("key{:03}", i);
            old.append_kv(i, 0, key.as_bytes(), &vec![b'v'; 94]);
        }
        let original = pairs(&old);

        let split = old.split3();
        assert_eq!(split.len(), 2);
        let mut all = Vec::new();
        for node in &split {
            assert!(node.nbytes() <= PAGE_SIZE);
            all.extend(pairs(node));
        }
        assert_eq!(all, original);
    }

    #[test]
    fn split3_three_way() {
        // Three 2506-byte records: no single cut point leaves both
        // halves within a page, forcing a second split of the left half.
        let mut old = Node::scratch();
        old.set_header(NodeType::Leaf, 3);
        old.append_kv(0, 0, b"k1", &vec![b'a'; 2500]);
        old.append_kv(1, 0, b"k2", &vec![b'b'; 2500]);
        old.append_kv(2, 0, b"k3", &vec![b'c'; 2500]);
        let original = pairs(&old);

        let split = old.split3();
        assert_eq!(split.len(), 3);
        let mut all = Vec::new();
        for node in &split {
            assert!(node.nbytes() <= PAGE_SIZE);
            all.extend(pairs(node));
        }
        assert_eq!(all, original);
    }
}
