//! Keyspace interface and implementations.
//!
//! Provides a trait-based keyspace with the server-side semantics the session
//! layer talks to: glob matching as the store defines it and cursor-based
//! scanning where cursor `0` both starts and ends a full pass.

pub mod glob;
pub mod memory;

use thiserror::Error;

/// Errors that can occur in keyspace operations.
#[derive(Error, Debug)]
pub enum KVError {
    #[error("kv: storage error: {0}")]
    Storage(String),
}

/// Result type for keyspace operations.
pub type KVResult<T> = Result<T, KVError>;

/// One step of a cursor-based scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to resume from, `0` once the pass is complete.
    pub cursor: u64,
    /// Keys found in the visited slots that matched the pattern.
    pub keys: Vec<Vec<u8>>,
}

impl ScanPage {
    /// Returns true when the cursor has wrapped back to the start.
    pub fn is_complete(&self) -> bool {
        self.cursor == 0
    }
}

/// Keyspace trait.
///
/// Keys and values are binary-safe byte strings.
pub trait KVStore: Send + Sync {
    /// Get a value by key.
    fn get(&self, key: &[u8]) -> KVResult<Option<Vec<u8>>>;

    /// Set a key-value pair.
    fn set(&self, key: &[u8], value: &[u8]) -> KVResult<()>;

    /// Delete a key. Returns false if the key did not exist.
    fn delete(&self, key: &[u8]) -> KVResult<bool>;

    /// Visit up to `count` slots starting at `cursor` and return the keys
    /// among them that match `pattern` (all keys when `pattern` is `None`).
    ///
    /// A key present for the whole pass is returned exactly once, whatever
    /// else is inserted or deleted in between.
    fn scan(&self, cursor: u64, pattern: Option<&[u8]>, count: usize) -> KVResult<ScanPage>;

    /// Number of keys.
    fn len(&self) -> KVResult<usize>;

    /// Remove every key, returning how many were removed.
    fn flush(&self) -> KVResult<usize>;

    /// Batch set multiple key-value pairs.
    fn batch_set(&self, entries: &[(&[u8], &[u8])]) -> KVResult<()>;
}

pub use memory::MemoryStore;
