//! In-memory keyspace implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use crate::glob;
use crate::{KVError, KVResult, KVStore, ScanPage};

/// An in-memory keyspace.
///
/// Every key is assigned a slot number on insertion. Slots are never reused,
/// so a scan cursor (the next slot to visit) stays meaningful while keys come
/// and go.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    next_slot: u64,
    slots: BTreeMap<u64, Vec<u8>>,
    entries: HashMap<Vec<u8>, Entry>,
}

struct Entry {
    slot: u64,
    value: Vec<u8>,
}

impl Inner {
    fn insert(&mut self, key: &[u8], value: &[u8]) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.value = value.to_vec();
            return;
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        self.slots.insert(slot, key.to_vec());
        self.entries.insert(
            key.to_vec(),
            Entry {
                slot,
                value: value.to_vec(),
            },
        );
    }
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                // Slot 0 is the scan start sentinel.
                next_slot: 1,
                slots: BTreeMap::new(),
                entries: HashMap::new(),
            })),
        }
    }

    /// Create a store pre-populated with the given keys, each holding `value`.
    pub fn with_keys(keys: &[&str], value: &[u8]) -> Self {
        let store = Self::new();
        if let Ok(mut inner) = store.inner.lock() {
            for key in keys {
                inner.insert(key.as_bytes(), value);
            }
        }
        store
    }

    fn lock(&self) -> KVResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| KVError::Storage(e.to_string()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KVStore for MemoryStore {
    fn get(&self, key: &[u8]) -> KVResult<Option<Vec<u8>>> {
        let inner = self.lock()?;
        Ok(inner.entries.get(key).map(|e| e.value.clone()))
    }

    fn set(&self, key: &[u8], value: &[u8]) -> KVResult<()> {
        self.lock()?.insert(key, value);
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> KVResult<bool> {
        let mut inner = self.lock()?;
        match inner.entries.remove(key) {
            Some(entry) => {
                inner.slots.remove(&entry.slot);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn scan(&self, cursor: u64, pattern: Option<&[u8]>, count: usize) -> KVResult<ScanPage> {
        let inner = self.lock()?;

        let mut keys = Vec::new();
        let mut last = None;
        for (&slot, key) in inner.slots.range(cursor..).take(count.max(1)) {
            last = Some(slot);
            if pattern.is_none_or(|p| glob::matches(p, key)) {
                keys.push(key.clone());
            }
        }

        let next = match last {
            Some(slot) => inner
                .slots
                .range(slot + 1..)
                .next()
                .map(|(&s, _)| s)
                .unwrap_or(0),
            None => 0,
        };

        Ok(ScanPage { cursor: next, keys })
    }

    fn len(&self) -> KVResult<usize> {
        Ok(self.lock()?.entries.len())
    }

    fn flush(&self) -> KVResult<usize> {
        let mut inner = self.lock()?;
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.slots.clear();
        Ok(removed)
    }

    fn batch_set(&self, entries: &[(&[u8], &[u8])]) -> KVResult<()> {
        let mut inner = self.lock()?;
        for (key, value) in entries {
            inner.insert(key, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_pass(store: &MemoryStore, pattern: Option<&[u8]>, count: usize) -> (Vec<String>, usize) {
        let mut cursor = 0;
        let mut steps = 0;
        let mut found = Vec::new();
        loop {
            let page = store.scan(cursor, pattern, count).unwrap();
            steps += 1;
            found.extend(page.keys.iter().map(|k| String::from_utf8_lossy(k).to_string()));
            if page.is_complete() {
                break;
            }
            cursor = page.cursor;
        }
        (found, steps)
    }

    #[test]
    fn test_basic_operations() {
        let store = MemoryStore::new();

        store.set(b"key1", b"value1").unwrap();
        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));

        assert_eq!(store.get(b"nonexistent").unwrap(), None);

        assert!(store.delete(b"key1").unwrap());
        assert!(!store.delete(b"key1").unwrap());
        assert_eq!(store.get(b"key1").unwrap(), None);
    }

    #[test]
    fn test_overwrite_keeps_single_entry() {
        let store = MemoryStore::new();
        store.set(b"k", b"1").unwrap();
        store.set(b"k", b"2").unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get(b"k").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_scan_with_pattern() {
        let store = MemoryStore::with_keys(&["a1", "a2", "b1"], b"v");

        let (mut found, steps) = full_pass(&store, Some(b"a*".as_slice()), 1);
        found.sort();
        assert_eq!(found, vec!["a1", "a2"]);
        assert_eq!(steps, 3);

        let (found, steps) = full_pass(&store, Some(b"a*".as_slice()), 10);
        assert_eq!(found.len(), 2);
        assert_eq!(steps, 1);
    }

    #[test]
    fn test_scan_empty_store_completes_immediately() {
        let store = MemoryStore::new();
        let page = store.scan(0, None, 10).unwrap();
        assert!(page.is_complete());
        assert!(page.keys.is_empty());
    }

    #[test]
    fn test_scan_survives_deletes_mid_pass() {
        let store = MemoryStore::with_keys(&["k1", "k2", "k3", "k4"], b"v");

        let first = store.scan(0, None, 2).unwrap();
        assert_eq!(first.keys.len(), 2);
        assert!(!first.is_complete());

        // Remove an already-visited key; the remaining keys must still show up.
        store.delete(b"k1").unwrap();
        let second = store.scan(first.cursor, None, 2).unwrap();
        assert_eq!(second.keys, vec![b"k3".to_vec(), b"k4".to_vec()]);
        assert!(second.is_complete());
    }

    #[test]
    fn test_flush() {
        let store = MemoryStore::with_keys(&["x", "y"], b"v");
        assert_eq!(store.flush().unwrap(), 2);
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_batch_set() {
        let store = MemoryStore::new();
        store
            .batch_set(&[(b"key1", b"value1"), (b"key2", b"value2")])
            .unwrap();
        assert_eq!(store.get(b"key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(store.get(b"key2").unwrap(), Some(b"value2".to_vec()));
    }
}
