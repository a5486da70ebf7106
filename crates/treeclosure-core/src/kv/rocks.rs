use super::KvStore;
use crate::error::{Error, Result};
use rocksdb::{Options, DB};
use std::path::Path;
use tracing::{debug, trace};

/// RocksDB-backed blob store, for keeping the queue snapshot out of the
/// relational database.
pub struct RocksKv {
    db: DB,
}

impl RocksKv {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut db_options = Options::default();
        db_options.create_if_missing(true);
        let db = DB::open(&db_options, path).map_err(|e| Error::Kv(e.to_string()))?;
        debug!("Using '{}' for the queue snapshot store", path.display());
        Ok(Self { db })
    }
}

impl KvStore for RocksKv {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| Error::Kv(e.to_string()))?;
        trace!("RocksDB get '{}': {}", key, value.is_some());
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db
            .put(key.as_bytes(), value)
            .map_err(|e| Error::Kv(e.to_string()))
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.db
            .delete(key.as_bytes())
            .map_err(|e| Error::Kv(e.to_string()))
    }
}
