//! Round cache persistence.
//!
//! `RedbStore` keeps the cache as a single JSON record in a redb table, so
//! each save is one atomic write transaction. redb holds an exclusive lock on
//! the file, which keeps a second local process from opening the same cache.

use crate::cache::RoundCache;
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

const CACHE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("round_cache");
const CACHE_KEY: &str = "current";

/// Store error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Underlying database failed
    #[error("database error: {0}")]
    Database(String),

    /// Stored record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Lock poisoned by a panicking writer
    #[error("store lock poisoned")]
    Poisoned,
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

fn db_err(err: impl Into<redb::Error>) -> StoreError {
    StoreError::Database(err.into().to_string())
}

/// Durable home of the round cache
pub trait CacheStore: Send + Sync {
    /// Load the committed cache, or an empty one if nothing was saved
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be read
    fn load(&self) -> Result<RoundCache, StoreError>;

    /// Atomically replace the committed cache
    ///
    /// # Errors
    ///
    /// Returns error if the write does not commit
    fn save(&self, cache: &RoundCache) -> Result<(), StoreError>;
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    cache: RwLock<RoundCache>,
    saves: RwLock<u64>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `cache`
    #[must_use]
    pub fn with_cache(cache: RoundCache) -> Self {
        Self {
            cache: RwLock::new(cache),
            saves: RwLock::new(0),
        }
    }

    /// Number of successful saves
    #[must_use]
    pub fn saves(&self) -> u64 {
        self.saves.read().map_or(0, |n| *n)
    }
}

impl CacheStore for MemoryStore {
    fn load(&self) -> Result<RoundCache, StoreError> {
        self.cache
            .read()
            .map(|cache| cache.clone())
            .map_err(|_| StoreError::Poisoned)
    }

    fn save(&self, cache: &RoundCache) -> Result<(), StoreError> {
        *self.cache.write().map_err(|_| StoreError::Poisoned)? = cache.clone();
        *self.saves.write().map_err(|_| StoreError::Poisoned)? += 1;
        Ok(())
    }
}

/// redb-backed store
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl RedbStore {
    /// Open or create the cache database at `path`
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be opened or is locked by another
    /// process
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let db = Database::create(&path).map_err(db_err)?;

        let txn = db.begin_write().map_err(db_err)?;
        {
            txn.open_table(CACHE_TABLE).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;

        debug!(path = %path.display(), "round cache opened");
        Ok(Self { db, path })
    }

    /// Database file path
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStore for RedbStore {
    fn load(&self) -> Result<RoundCache, StoreError> {
        let txn = self.db.begin_read().map_err(db_err)?;
        let table = txn.open_table(CACHE_TABLE).map_err(db_err)?;
        match table.get(CACHE_KEY).map_err(db_err)? {
            Some(record) => Ok(serde_json::from_slice(record.value())?),
            None => Ok(RoundCache::new()),
        }
    }

    fn save(&self, cache: &RoundCache) -> Result<(), StoreError> {
        let record = serde_json::to_vec(cache)?;
        let txn = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = txn.open_table(CACHE_TABLE).map_err(db_err)?;
            table.insert(CACHE_KEY, record.as_slice()).map_err(db_err)?;
        }
        txn.commit().map_err(db_err)?;
        debug!(round = cache.round, bytes = record.len(), "round cache saved");
        Ok(())
    }
}
