//! The store-facing contract.

use crate::error::Result;

/// A key and the value stored under it. Pairs compare by key first;
/// the tree never holds two pairs with the same key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct KeyValuePair {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValuePair {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> KeyValuePair {
        KeyValuePair { key, value }
    }
}

/// The key-value store contract.
///
/// The tree engine provides the insert path; a full store layers the
/// remaining operations on the same page structure. Opening and
/// closing are not part of the contract: a store exposes its own
/// constructor and releases its resources on drop.
pub trait KvStore {
    /// Returns the value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    /// Inserts `key` or updates its value. The new version is durable
    /// once this returns.
    fn set(&mut self, key: &[u8], val: &[u8]) -> Result<()>;

    /// Removes `key`, reporting whether it was present.
    fn del(&mut self, key: &[u8]) -> Result<bool>;

    /// Visits every pair whose key is strictly greater than `key`, in
    /// ascending key order.
    fn find_greater_than<'a>(&'a self, key: &[u8]) -> Box<dyn Iterator<Item = KeyValuePair> + 'a>;
}
