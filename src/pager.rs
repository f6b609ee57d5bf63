//! The on-disk page store.
//!
//! The index lives in a single file of [`PAGE_SIZE`] pages. Page 0 is
//! the meta page, everything after it is a tree node:
//!
//! ```text
//! page 0:  | magic (16B) | root (8B) | page count (8B) | unused |
//! page 1.. | tree nodes |
//! ```
//!
//! Committed pages are read through a shared memory map. Pages
//! allocated by the tree are staged in memory until [`PageStore::commit`]
//! rewrites the whole file through an atomic replace and remaps it, so
//! a crash at any point leaves the previous version intact. Numbers
//! released against committed pages become reusable only after the
//! commit that made their release durable.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian};
use memmap::Mmap;
use tracing::debug;

use crate::btree::PageStore;
use crate::error::{Error, Result};
use crate::fs::save_data;
use crate::node::Node;
use crate::page_layout::PAGE_SIZE;

/// Identifies an index file and its format revision.
const MAGIC: &[u8; 16] = b"cowkv-b-tree-v01";
const META_ROOT_OFFSET: usize = 16;
const META_NPAGES_OFFSET: usize = 24;

pub struct Pager {
    path: PathBuf,
    /// Map of the committed file, `None` until the first commit.
    mmap: Option<Mmap>,
    root: u64,
    /// Pages in the committed file, including the meta page.
    flushed: u64,
    /// High-water mark for fresh page numbers.
    next: u64,
    /// Pages allocated since the last commit.
    staged: HashMap<u64, Node>,
    /// Committed pages released since the last commit. They move to
    /// `free` once the commit that records the release has succeeded.
    freed: Vec<u64>,
    /// Numbers available for reuse.
    free: Vec<u64>,
}

impl Pager {
    /// Opens the index file at `path`, creating an empty store if the
    /// file is missing or zero-length.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Pager> {
        let path = path.as_ref().to_path_buf();
        let (mmap, root, npages) = match File::open(&path) {
            Ok(file) => {
                let len = file.metadata()?.len();
                if len == 0 {
                    (None, 0, 1)
                } else {
                    // The file is only ever replaced by rename, never
                    // truncated in place, so the map stays valid for
                    // its lifetime.
                    let mmap = unsafe { Mmap::map(&file)? };
                    let (root, npages) = read_meta(&mmap)?;
                    (Some(mmap), root, npages)
                }
            }
            Err(ref err) if err.kind() == io::ErrorKind::NotFound => (None, 0, 1),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), root, npages, "opened index file");
        Ok(Pager {
            path,
            mmap,
            root,
            flushed: npages,
            next: npages,
            staged: HashMap::new(),
            freed: Vec::new(),
            free: Vec::new(),
        })
    }

    /// The committed root page number, 0 when the tree is empty.
    pub fn root(&self) -> u64 {
        self.root
    }
}

/// Validates the meta page and returns `(root, npages)`.
fn read_meta(data: &[u8]) -> Result<(u64, u64)> {
    if data.len() < PAGE_SIZE || data.len() % PAGE_SIZE != 0 {
        return Err(Error::Corrupt(format!(
            "file size {} is not a whole number of pages",
            data.len()
        )));
    }
    if &data[..MAGIC.len()] != MAGIC {
        return Err(Error::Corrupt("bad magic".to_string()));
    }
    let root = LittleEndian::read_u64(&data[META_ROOT_OFFSET..META_ROOT_OFFSET + 8]);
    let npages = LittleEndian::read_u64(&data[META_NPAGES_OFFSET..META_NPAGES_OFFSET + 8]);
    if npages < 1 || npages as usize * PAGE_SIZE > data.len() {
        return Err(Error::Corrupt(format!("page count {} out of range", npages)));
    }
    if root >= npages {
        return Err(Error::Corrupt(format!("root page {} out of range", root)));
    }
    Ok((root, npages))
}

impl PageStore for Pager {
    fn get(&self, ptr: u64) -> Node {
        if let Some(node) = self.staged.get(&ptr) {
            return node.clone();
        }
        assert!(ptr >= 1 && ptr < self.flushed, "page {} is not live", ptr);
        let at = ptr as usize * PAGE_SIZE;
        match &self.mmap {
            Some(mmap) => Node::from_bytes(&mmap[at..at + PAGE_SIZE]),
            None => panic!("page {} is not live", ptr),
        }
    }

    fn new(&mut self, node: Node) -> u64 {
        let ptr = match self.free.pop() {
            Some(ptr) => ptr,
            None => {
                let ptr = self.next;
                self.next += 1;
                ptr
            }
        };
        self.staged.insert(ptr, node);
        ptr
    }

    fn del(&mut self, ptr: u64) {
        assert!(ptr >= 1, "page 0 is reserved");
        if self.staged.remove(&ptr).is_some() {
            // never committed, the number can be handed out again
            self.free.push(ptr);
        } else {
            assert!(ptr < self.flushed, "page {} is not live", ptr);
            self.freed.push(ptr);
        }
    }

    fn commit(&mut self, root: u64) -> Result<()> {
        assert!(root < self.next, "root page {} was never allocated", root);
        let npages = self.next;
        let disk = self.mmap.as_deref().unwrap_or(&[]);

        let mut image = vec![0u8; npages as usize * PAGE_SIZE];
        image[..MAGIC.len()].copy_from_slice(MAGIC);
        LittleEndian::write_u64(&mut image[META_ROOT_OFFSET..META_ROOT_OFFSET + 8], root);
        LittleEndian::write_u64(&mut image[META_NPAGES_OFFSET..META_NPAGES_OFFSET + 8], npages);
        for ptr in 1..npages {
            let at = ptr as usize * PAGE_SIZE;
            if let Some(node) = self.staged.get(&ptr) {
                image[at..at + PAGE_SIZE].copy_from_slice(node.as_bytes());
            } else if ptr < self.flushed {
                image[at..at + PAGE_SIZE].copy_from_slice(&disk[at..at + PAGE_SIZE]);
            }
            // numbers allocated and released within this window stay zeroed
        }
        save_data(&self.path, &image)?;

        let file = File::open(&self.path)?;
        self.mmap = Some(unsafe { Mmap::map(&file)? });
        self.root = root;
        self.flushed = npages;
        self.staged.clear();
        self.free.append(&mut self.freed);
        debug!(root, npages, "committed index file");
        Ok(())
    }
}
