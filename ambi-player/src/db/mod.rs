//! Durable store collaborators
//!
//! The Queue and Cache Managers only see the [`QueueStore`] and
//! [`CacheStore`] traits. [`SqliteStore`] backs them in production and
//! [`MemoryStore`] in tests or when no database is configured.

pub mod cache_stats;
pub mod init;
pub mod memory;
pub mod queue;
pub mod settings;

use ambi_common::{CacheRecord, QueueEntry, TrackId};
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;

use crate::error::Result;

pub use memory::MemoryStore;

/// Persistent queue snapshot storage
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Read the full queue, ordered by position
    async fn load_queue(&self) -> Result<Vec<QueueEntry>>;

    /// Replace the stored queue with `entries`
    async fn save_queue(&self, entries: &[QueueEntry]) -> Result<()>;

    /// Insert or update one entry (keyed by track id)
    async fn upsert_entry(&self, entry: &QueueEntry) -> Result<()>;

    async fn remove_entry(&self, track_id: &TrackId) -> Result<()>;

    /// Flag exactly `track_id` as current, or clear the flag on all entries
    async fn set_current(&self, track_id: Option<&TrackId>) -> Result<()>;
}

/// Play history and cache state storage
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// All records, ascending by `last_played_at`
    async fn list_records(&self) -> Result<Vec<CacheRecord>>;

    async fn get_record(&self, track_id: &TrackId) -> Result<Option<CacheRecord>>;

    async fn upsert_record(&self, record: &CacheRecord) -> Result<()>;

    async fn delete_record(&self, track_id: &TrackId) -> Result<()>;
}

/// SQLite-backed implementation of both store traits
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an already initialized pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = init::init_database(path).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database with the full schema
    pub async fn in_memory() -> Result<Self> {
        let pool = init::init_memory_database().await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Milliseconds since the epoch as stored in INTEGER timestamp columns
pub(crate) fn to_millis(ts: chrono::DateTime<chrono::Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
