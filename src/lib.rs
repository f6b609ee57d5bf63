//! An embedded key-value store core built on a copy-on-write B-tree.
//!
//! Tree nodes are serialized into fixed-size pages and reached through
//! the [`PageStore`] callbacks, so the same engine runs against an
//! in-memory store in tests and against the memory-mapped, atomically
//! replaced index file provided by [`Pager`]. Updates never touch
//! existing pages; each insert builds the new version of the affected
//! path and commits it by swapping the root pointer.
//!
//! ```no_run
//! use cowkv::{BTree, Pager};
//!
//! # fn main() -> cowkv::Result<()> {
//! let pager = Pager::open("index.db")?;
//! let root = pager.root();
//! let mut tree = BTree::new(pager, root);
//! tree.insert(b"hello", b"world")?;
//! # Ok(())
//! # }
//! ```

mod btree;
mod error;
mod fs;
mod kv;
mod node;
mod node_type;
mod page_layout;
mod pager;

pub use crate::btree::{BTree, PageStore};
pub use crate::error::{Error, Result};
pub use crate::fs::save_data;
pub use crate::kv::{KeyValuePair, KvStore};
pub use crate::node::Node;
pub use crate::node_type::{NodeType, BTYPE_INTERNAL, BTYPE_LEAF};
pub use crate::page_layout::{MAX_KEY_SIZE, MAX_VAL_SIZE, PAGE_SIZE};
pub use crate::pager::Pager;
