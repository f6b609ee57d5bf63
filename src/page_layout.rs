//! On-page layout of a B-tree node.
//!
//! A node occupies a single page and is laid out as:
//!
//! | btype | nkeys |  pointers  |  offsets   | key-value records |
//! |  2B   |  2B   | nkeys x 8B | nkeys x 2B |        ...        |
//!
//! Every multi-byte field is little-endian. A key-value record is
//! `[klen:2B][vlen:2B][key][val]`; internal nodes store records with an
//! empty value. The offsets array holds, for each record, the byte offset
//! of its END relative to the start of the records region. `offset[0]` is
//! implicitly zero and never stored, so the array's slot `i` holds
//! `offset[i + 1]`.

/// A single page size.
/// Each page holds exactly one node of the tree.
pub const PAGE_SIZE: usize = 4096;

/// Maximum size of a single key, in bytes.
pub const MAX_KEY_SIZE: usize = 1000;

/// Maximum size of a single value, in bytes.
pub const MAX_VAL_SIZE: usize = 3000;

/// Node header layout (four bytes in total).
pub const NODE_TYPE_OFFSET: usize = 0;
pub const NODE_TYPE_SIZE: usize = 2;
pub const NUM_KEYS_OFFSET: usize = 2;
pub const NUM_KEYS_SIZE: usize = 2;
pub const NODE_HEADER_SIZE: usize = NODE_TYPE_SIZE + NUM_KEYS_SIZE;

/// A child page number in the pointer array.
pub const PTR_SIZE: usize = 8;

/// An entry in the record offsets array.
pub const OFFSET_SIZE: usize = 2;

/// The two u16 length prefixes in front of every key-value record.
pub const KV_HEADER_SIZE: usize = 4;

// The size ceilings are chosen so that a node holding a single record of
// maximum size still fits in one page.
const _: () = assert!(
    NODE_HEADER_SIZE + PTR_SIZE + OFFSET_SIZE + KV_HEADER_SIZE + MAX_KEY_SIZE + MAX_VAL_SIZE
        <= PAGE_SIZE,
    "a page cannot hold a record of maximum size"
);
