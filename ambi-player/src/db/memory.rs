//! In-memory store
//!
//! Used when no database is configured, and by tests. `set_failing(true)`
//! makes every call return [`Error::Persistence`] so callers' recovery paths
//! can be exercised.

use super::{CacheStore, QueueStore};
use crate::error::{Error, Result};
use ambi_common::{CacheRecord, QueueEntry, TrackId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct Tables {
    queue: Vec<QueueEntry>,
    records: HashMap<TrackId, CacheRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing: AtomicBool,
    full_saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated storage failure
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of successful `save_queue` calls
    pub fn full_saves(&self) -> usize {
        self.full_saves.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(Error::Persistence("store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn load_queue(&self) -> Result<Vec<QueueEntry>> {
        self.check()?;
        let mut queue = self.tables.lock().await.queue.clone();
        queue.sort_by(|a, b| a.position.cmp(&b.position));
        Ok(queue)
    }

    async fn save_queue(&self, entries: &[QueueEntry]) -> Result<()> {
        self.check()?;
        self.tables.lock().await.queue = entries.to_vec();
        self.full_saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert_entry(&self, entry: &QueueEntry) -> Result<()> {
        self.check()?;
        let mut tables = self.tables.lock().await;
        match tables
            .queue
            .iter_mut()
            .find(|e| e.track.id == entry.track.id)
        {
            Some(existing) => *existing = entry.clone(),
            None => tables.queue.push(entry.clone()),
        }
        Ok(())
    }

    async fn remove_entry(&self, track_id: &TrackId) -> Result<()> {
        self.check()?;
        self.tables
            .lock()
            .await
            .queue
            .retain(|e| &e.track.id != track_id);
        Ok(())
    }

    async fn set_current(&self, track_id: Option<&TrackId>) -> Result<()> {
        self.check()?;
        for entry in self.tables.lock().await.queue.iter_mut() {
            entry.is_current = Some(&entry.track.id) == track_id;
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn list_records(&self) -> Result<Vec<CacheRecord>> {
        self.check()?;
        let mut records: Vec<CacheRecord> =
            self.tables.lock().await.records.values().cloned().collect();
        records.sort_by(|a, b| {
            a.last_played_at
                .cmp(&b.last_played_at)
                .then_with(|| a.track_id.cmp(&b.track_id))
        });
        Ok(records)
    }

    async fn get_record(&self, track_id: &TrackId) -> Result<Option<CacheRecord>> {
        self.check()?;
        Ok(self.tables.lock().await.records.get(track_id).cloned())
    }

    async fn upsert_record(&self, record: &CacheRecord) -> Result<()> {
        self.check()?;
        self.tables
            .lock()
            .await
            .records
            .insert(record.track_id.clone(), record.clone());
        Ok(())
    }

    async fn delete_record(&self, track_id: &TrackId) -> Result<()> {
        self.check()?;
        self.tables.lock().await.records.remove(track_id);
        Ok(())
    }
}
