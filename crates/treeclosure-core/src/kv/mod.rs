//! Blob key-value stores backing the queue snapshot, scan status and the
//! continuation registry.

#[cfg(feature = "rocksdb")]
pub mod rocks;
pub mod sqlite;

use crate::error::Result;
use dashmap::DashMap;

#[cfg(feature = "rocksdb")]
pub use rocks::RocksKv;

pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Overwrites any previous value under `key`.
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
    /// Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;
}

/// Process-local store. Contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_kv_overwrites_and_deletes() {
        let kv = MemoryKv::new();
        assert!(kv.get("queue").unwrap().is_none());

        kv.set("queue", b"first").unwrap();
        kv.set("queue", b"second").unwrap();
        assert_eq!(kv.get("queue").unwrap().as_deref(), Some(&b"second"[..]));
        assert_eq!(kv.len(), 1);

        kv.delete("queue").unwrap();
        kv.delete("queue").unwrap();
        assert!(kv.is_empty());
    }
}
