//! Cache accounting and eviction
//!
//! The in-memory index is authoritative for the running session; every
//! change is written through to the [`CacheStore`] and a failed write is only
//! logged. All operations that add or remove cached bytes run under one
//! writer lock, so concurrent passes can never jointly overshoot the budget.

use super::origin::{DownloadOutcome, MediaOrigin};
use crate::config::CacheConfig;
use crate::db::CacheStore;
use crate::error::{Error, Result};
use ambi_common::time::Clock;
use ambi_common::{AmbiEvent, CacheRecord, EventBus, MediaSource, Track, TrackId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Outcome of one prefetch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    pub downloaded: usize,
    pub failed: usize,
    pub limit_reached: bool,
}

pub struct CacheManager {
    index: RwLock<HashMap<TrackId, CacheRecord>>,
    store: Arc<dyn CacheStore>,
    origin: Arc<dyn MediaOrigin>,
    events: Arc<EventBus>,
    config: CacheConfig,
    clock: Clock,
    /// Serializes insert-after-download and eviction
    writer: Mutex<()>,
    /// Serializes write-through so the store always ends with the latest record
    persist: Mutex<()>,
    /// Tracks with live or loading playback, never evicted
    protected: std::sync::Mutex<HashSet<TrackId>>,
}

impl CacheManager {
    pub fn new(
        store: Arc<dyn CacheStore>,
        origin: Arc<dyn MediaOrigin>,
        events: Arc<EventBus>,
        config: CacheConfig,
        clock: Clock,
    ) -> Self {
        Self {
            index: RwLock::new(HashMap::new()),
            store,
            origin,
            events,
            config,
            clock,
            writer: Mutex::new(()),
            persist: Mutex::new(()),
            protected: std::sync::Mutex::new(HashSet::new()),
        }
    }

    /// Populate the index from the store
    ///
    /// A store failure is logged and leaves the index empty; history then
    /// rebuilds as tracks are played.
    pub async fn load(&self) {
        match self.store.list_records().await {
            Ok(records) => {
                let mut index = self.index.write().await;
                for record in records {
                    index.insert(record.track_id.clone(), record);
                }
                let usage: u64 = index
                    .values()
                    .filter(|r| r.is_cached)
                    .map(|r| r.file_size)
                    .sum();
                info!(
                    "Loaded {} cache records ({:.2}MB cached)",
                    index.len(),
                    usage as f64 / 1024.0 / 1024.0
                );
            }
            Err(e) => warn!("Failed to load cache records: {}", e),
        }
    }

    pub fn budget(&self) -> u64 {
        self.config.budget_bytes
    }

    /// Record a play: bump `play_count` and refresh `last_played_at`
    pub async fn track_play(&self, track: &Track) -> CacheRecord {
        let now = (self.clock)();
        let record = {
            let mut index = self.index.write().await;
            let record = index
                .entry(track.id.clone())
                .or_insert_with(|| CacheRecord::unseen(track.id.clone(), now));
            record.play_count += 1;
            record.last_played_at = now;
            record.clone()
        };
        debug!("Play #{} recorded for {}", record.play_count, track.id);
        self.persist_record(&track.id).await;
        record
    }

    pub async fn is_cached(&self, track_id: &TrackId) -> bool {
        self.index
            .read()
            .await
            .get(track_id)
            .is_some_and(|r| r.is_cached)
    }

    pub async fn get_stats(&self, track_id: &TrackId) -> Option<CacheRecord> {
        self.index.read().await.get(track_id).cloned()
    }

    /// Σ file_size over cached records
    pub async fn total_usage(&self) -> u64 {
        self.index
            .read()
            .await
            .values()
            .filter(|r| r.is_cached)
            .map(|r| r.file_size)
            .sum()
    }

    /// Where to play `track` from; an index lookup only
    pub async fn resolve(&self, track: &Track) -> MediaSource {
        if self.is_cached(&track.id).await {
            MediaSource::Local(self.origin.cached_path(&track.id))
        } else {
            MediaSource::Remote(self.origin.stream_locator(track))
        }
    }

    /// Exclude `track_id` from eviction until released
    ///
    /// A crossfade protects both the outgoing and the incoming track.
    pub fn protect(&self, track_id: TrackId) {
        self.lock_protected().insert(track_id);
    }

    pub fn release(&self, track_id: &TrackId) {
        self.lock_protected().remove(track_id);
    }

    pub fn release_all(&self) {
        self.lock_protected().clear();
    }

    pub fn is_protected(&self, track_id: &TrackId) -> bool {
        self.lock_protected().contains(track_id)
    }

    fn lock_protected(&self) -> std::sync::MutexGuard<'_, HashSet<TrackId>> {
        self.protected.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Evict LRU records until `required_bytes` more fit in the budget
    pub async fn ensure_space(&self, required_bytes: u64) -> Result<()> {
        let _writer = self.writer.lock().await;
        self.ensure_space_locked(required_bytes, &HashSet::new())
            .await
    }

    /// Drop a track's cached file and its history record
    pub async fn forget(&self, track_id: &TrackId) -> Result<()> {
        let _writer = self.writer.lock().await;
        if self.is_cached(track_id).await {
            self.evict_locked(track_id).await?;
        }
        self.index.write().await.remove(track_id);
        self.persist_record(track_id).await;
        Ok(())
    }

    /// Download upcoming tracks that are not cached yet
    ///
    /// Considers at most `prefetch_limit` entries after `current_index`
    /// (from the front when `None`). A failed candidate is skipped; an
    /// origin-reported limit ends the pass.
    pub async fn prefetch(&self, queue: &[Track], current_index: Option<usize>) -> PrefetchReport {
        let start = current_index.map_or(0, |i| i + 1);
        let upcoming = queue
            .iter()
            .skip(start)
            .take(self.config.prefetch_limit);

        let mut report = PrefetchReport::default();
        for track in upcoming {
            let _writer = self.writer.lock().await;
            if self.is_cached(&track.id).await {
                continue;
            }

            match self.prefetch_one(track).await {
                Ok(true) => report.downloaded += 1,
                Ok(false) => {
                    warn!("🛑 Cache limit reached, stopping prefetch");
                    report.limit_reached = true;
                    break;
                }
                Err(e) => {
                    warn!("Prefetch of {} skipped: {}", track.id, e);
                    report.failed += 1;
                }
            }
        }

        let usage_bytes = self.total_usage().await;
        if report.downloaded > 0 || report.failed > 0 || report.limit_reached {
            info!(
                "Prefetch pass done: {} downloaded, {} failed, {:.2}MB cached",
                report.downloaded,
                report.failed,
                usage_bytes as f64 / 1024.0 / 1024.0
            );
        }
        self.events.emit_lossy(AmbiEvent::PrefetchCompleted {
            downloaded: report.downloaded,
            failed: report.failed,
            limit_reached: report.limit_reached,
            usage_bytes,
            timestamp: (self.clock)(),
        });
        report
    }

    /// Cache one track (writer lock held); `Ok(false)` on origin limit
    async fn prefetch_one(&self, track: &Track) -> Result<bool> {
        let known_size = self
            .get_stats(&track.id)
            .await
            .map(|r| r.file_size)
            .filter(|size| *size > 0);
        let estimate = known_size.unwrap_or(self.config.default_estimate_bytes);

        let mut keep = HashSet::new();
        keep.insert(track.id.clone());
        self.ensure_space_locked(estimate, &keep).await?;

        let size = match self.origin.download_to_cache(track).await? {
            DownloadOutcome::LimitReached => return Ok(false),
            outcome => outcome.size().unwrap_or(estimate),
        };
        self.mark_cached(&track.id, size).await;

        // The real size may exceed the estimate.
        if self.total_usage().await > self.config.budget_bytes {
            if let Err(e) = self.ensure_space_locked(0, &keep).await {
                warn!("Budget still exceeded after caching {}: {}", track.id, e);
                self.evict_locked(&track.id).await?;
                return Err(Error::StorageQuota(format!(
                    "{} does not fit in the cache budget",
                    track.id
                )));
            }
        }
        Ok(true)
    }

    async fn mark_cached(&self, track_id: &TrackId, size: u64) {
        let now = (self.clock)();
        {
            let mut index = self.index.write().await;
            let record = index
                .entry(track_id.clone())
                .or_insert_with(|| CacheRecord::unseen(track_id.clone(), now));
            record.is_cached = true;
            record.file_size = size;
        }
        self.persist_record(track_id).await;
        self.events.emit_lossy(AmbiEvent::TrackCached {
            track_id: track_id.clone(),
            file_size: size,
            timestamp: now,
        });
    }

    /// Caller holds `writer`
    async fn ensure_space_locked(&self, required_bytes: u64, keep: &HashSet<TrackId>) -> Result<()> {
        let budget = self.config.budget_bytes;
        let protected = self.lock_protected().clone();
        let mut skipped: HashSet<TrackId> = HashSet::new();

        loop {
            let usage = self.total_usage().await;
            if usage.saturating_add(required_bytes) <= budget {
                return Ok(());
            }

            let candidate = {
                let index = self.index.read().await;
                index
                    .values()
                    .filter(|r| r.is_cached)
                    .filter(|r| !protected.contains(&r.track_id))
                    .filter(|r| !keep.contains(&r.track_id) && !skipped.contains(&r.track_id))
                    .min_by(|a, b| {
                        a.last_played_at
                            .cmp(&b.last_played_at)
                            .then_with(|| a.track_id.cmp(&b.track_id))
                    })
                    .map(|r| r.track_id.clone())
            };

            let Some(candidate) = candidate else {
                return Err(Error::StorageQuota(format!(
                    "cannot free {} bytes ({} of {} used)",
                    required_bytes, usage, budget
                )));
            };

            if let Err(e) = self.evict_locked(&candidate).await {
                warn!("Eviction of {} failed: {}", candidate, e);
                skipped.insert(candidate);
            }
        }
    }

    /// Caller holds `writer`
    async fn evict_locked(&self, track_id: &TrackId) -> Result<()> {
        self.origin.evict_from_cache(track_id).await?;

        let freed_bytes = {
            let mut index = self.index.write().await;
            match index.get_mut(track_id) {
                Some(record) if record.is_cached => {
                    record.is_cached = false;
                    record.file_size
                }
                _ => 0,
            }
        };
        info!(
            "🗑️ Evicted {} from cache ({:.2}MB)",
            track_id,
            freed_bytes as f64 / 1024.0 / 1024.0
        );
        self.persist_record(track_id).await;
        self.events.emit_lossy(AmbiEvent::TrackEvicted {
            track_id: track_id.clone(),
            freed_bytes,
            timestamp: (self.clock)(),
        });
        Ok(())
    }

    async fn persist_record(&self, track_id: &TrackId) {
        let _persist = self.persist.lock().await;
        let record = self.index.read().await.get(track_id).cloned();
        let result = match record {
            Some(record) => self.store.upsert_record(&record).await,
            None => self.store.delete_record(track_id).await,
        };
        if let Err(e) = result {
            warn!("Failed to persist cache record for {}: {}", track_id, e);
        }
    }
}
