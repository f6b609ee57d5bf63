use std::convert::From;

/// On-disk type tag of an internal node.
pub const BTYPE_INTERNAL: u16 = 1;
/// On-disk type tag of a leaf node.
pub const BTYPE_LEAF: u16 = 2;

// The two node kinds, as stored in the page header's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Internal nodes route lookups: each key is paired with the page
    /// number of the child subtree that starts at that key.
    Internal,

    /// Leaf nodes hold the actual key-value pairs.
    Leaf,
}

impl NodeType {
    /// Decodes the on-disk type tag. A buffer carrying any other tag is
    /// not a node, which is a contract violation of the caller.
    pub(crate) fn from_tag(tag: u16) -> NodeType {
        match tag {
            BTYPE_INTERNAL => NodeType::Internal,
            BTYPE_LEAF => NodeType::Leaf,
            other => panic!("unknown node type tag: {}", other),
        }
    }
}

// Converts a NodeType to its on-disk tag.
impl From<NodeType> for u16 {
    fn from(orig: NodeType) -> u16 {
        match orig {
            NodeType::Internal => BTYPE_INTERNAL,
            NodeType::Leaf => BTYPE_LEAF,
        }
    }
}
