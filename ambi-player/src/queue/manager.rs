//! Queue state and mutations
//!
//! Entries are kept sorted by [`PositionKey`]. Every mutation assigns at most
//! one new key (except full replace and renormalization), and the current
//! entry is tracked by track identity so it survives any reordering.

use super::writer::{spawn_writer, PersistOp};
use crate::db::QueueStore;
use crate::error::{Error, Result};
use ambi_common::{AmbiEvent, EventBus, PositionKey, QueueEntry, Rating, Track, TrackId};
use chrono::Utc;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

pub(crate) struct QueueState {
    pub(crate) entries: Vec<QueueEntry>,
    current: Option<TrackId>,
}

impl QueueState {
    fn index_of(&self, track_id: &TrackId) -> Option<usize> {
        self.entries.iter().position(|e| &e.track.id == track_id)
    }

    fn current_index(&self) -> Option<usize> {
        self.current.as_ref().and_then(|id| self.index_of(id))
    }

    fn key_at(&self, index: usize) -> Option<&PositionKey> {
        self.entries.get(index).map(|e| &e.position)
    }

    /// Insert keeping sort order; returns the index used
    fn insert_sorted(&mut self, entry: QueueEntry) -> usize {
        let index = self
            .entries
            .partition_point(|e| e.position < entry.position);
        self.entries.insert(index, entry);
        index
    }

    /// Re-space every key evenly, preserving order
    fn renormalize(&mut self) {
        let keys = PositionKey::evenly_spaced(self.entries.len());
        for (entry, key) in self.entries.iter_mut().zip(keys) {
            entry.position = key;
        }
    }

    fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            entries: self.entries.clone(),
            current: self.current.clone(),
        }
    }
}

/// Where the playback cursor sits in a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cursor {
    /// On the entry at this index
    At(usize),
    /// Between `index - 1` and `index` (the current entry was removed)
    Gap(usize),
    /// No current track
    Unset,
}

/// Point-in-time copy of the queue
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub entries: Vec<QueueEntry>,
    pub current: Option<TrackId>,
}

impl QueueSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
            .as_ref()
            .and_then(|id| self.index_of(id))
    }

    pub fn index_of(&self, track_id: &TrackId) -> Option<usize> {
        self.entries.iter().position(|e| &e.track.id == track_id)
    }

    /// Resolve the cursor for `track_id`, falling back to `key` when the
    /// track is no longer queued
    pub fn cursor(&self, track_id: Option<&TrackId>, key: Option<&PositionKey>) -> Cursor {
        if let Some(index) = track_id.and_then(|id| self.index_of(id)) {
            return Cursor::At(index);
        }
        match key {
            Some(key) => Cursor::Gap(self.entries.partition_point(|e| &e.position < key)),
            None => Cursor::Unset,
        }
    }

    pub fn tracks(&self) -> Vec<Track> {
        self.entries.iter().map(|e| e.track.clone()).collect()
    }

    pub fn track(&self, index: usize) -> Option<&Track> {
        self.entries.get(index).map(|e| &e.track)
    }
}

/// Ordered, persistent play queue
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct QueueManager {
    state: Arc<RwLock<QueueState>>,
    persist_tx: mpsc::UnboundedSender<PersistOp>,
    events: Arc<EventBus>,
}

impl QueueManager {
    /// Create an empty queue persisting to `store`
    ///
    /// Must be called inside a tokio runtime (spawns the writer task).
    pub fn new(store: Arc<dyn QueueStore>, events: Arc<EventBus>) -> Self {
        let state = Arc::new(RwLock::new(QueueState {
            entries: Vec::new(),
            current: None,
        }));
        let persist_tx = spawn_writer(store, Arc::clone(&state));
        Self {
            state,
            persist_tx,
            events,
        }
    }

    /// Create a queue and load its stored contents
    ///
    /// A store read failure is logged and leaves the queue empty.
    pub async fn load(store: Arc<dyn QueueStore>, events: Arc<EventBus>) -> Self {
        let stored = match store.load_queue().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to load persisted queue, starting empty: {}", e);
                Vec::new()
            }
        };
        let manager = Self::new(store, events);
        manager.restore_entries(stored).await;
        manager
    }

    async fn restore_entries(&self, mut stored: Vec<QueueEntry>) {
        stored.sort_by(|a, b| a.position.cmp(&b.position));

        let mut seen = HashSet::new();
        stored.retain(|e| seen.insert(e.track.id.clone()));

        let unique_keys = stored.windows(2).all(|w| w[0].position < w[1].position);
        let mut current = None;
        for entry in stored.iter_mut() {
            if entry.is_current && current.is_none() {
                current = Some(entry.track.id.clone());
            } else {
                entry.is_current = false;
            }
        }

        let mut state = self.state.write().await;
        state.entries = stored;
        state.current = current;
        if !unique_keys {
            warn!("Stored queue had colliding positions, renormalizing");
            state.renormalize();
            self.persist(PersistOp::Replace(state.entries.clone()));
        }
        info!(
            "Restored queue with {} entries (current: {:?})",
            state.entries.len(),
            state.current.as_ref().map(TrackId::as_str)
        );
        self.notify(&state);
    }

    fn persist(&self, op: PersistOp) {
        if self.persist_tx.send(op).is_err() {
            warn!("Queue writer has stopped; change kept in memory only");
        }
    }

    fn notify(&self, state: &QueueState) {
        self.events.emit_lossy(AmbiEvent::QueueChanged {
            len: state.entries.len(),
            current: state.current.clone(),
            timestamp: Utc::now(),
        });
    }

    /// Ordered sequence of entries
    pub async fn get_queue(&self) -> Vec<QueueEntry> {
        self.state.read().await.entries.clone()
    }

    pub async fn snapshot(&self) -> QueueSnapshot {
        self.state.read().await.snapshot()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.entries.is_empty()
    }

    pub async fn current(&self) -> Option<QueueEntry> {
        let state = self.state.read().await;
        state.current_index().map(|i| state.entries[i].clone())
    }

    pub async fn current_index(&self) -> Option<usize> {
        self.state.read().await.current_index()
    }

    pub async fn position_of(&self, track_id: &TrackId) -> Option<PositionKey> {
        let state = self.state.read().await;
        state.index_of(track_id).map(|i| state.entries[i].position.clone())
    }

    /// Atomically replace the queue with `tracks`
    ///
    /// Duplicate ids keep their first occurrence. The current flag is cleared.
    pub async fn set_queue(&self, tracks: Vec<Track>) {
        let mut seen = HashSet::new();
        let tracks: Vec<Track> = tracks
            .into_iter()
            .filter(|t| seen.insert(t.id.clone()))
            .collect();

        let now = Utc::now();
        let keys = PositionKey::evenly_spaced(tracks.len());
        let entries: Vec<QueueEntry> = tracks
            .into_iter()
            .zip(keys)
            .map(|(track, position)| QueueEntry {
                track,
                position,
                is_current: false,
                added_at: now,
            })
            .collect();

        let mut state = self.state.write().await;
        state.entries = entries;
        state.current = None;
        info!("Queue replaced ({} entries)", state.entries.len());
        self.persist(PersistOp::Replace(state.entries.clone()));
        self.notify(&state);
    }

    /// Flag exactly `track_id` as current
    pub async fn set_current(&self, track_id: &TrackId) -> Result<()> {
        let mut state = self.state.write().await;
        if state.index_of(track_id).is_none() {
            return Err(Error::NotFound(format!("track {} is not queued", track_id)));
        }
        if state.current.as_ref() == Some(track_id) {
            return Ok(());
        }

        for entry in state.entries.iter_mut() {
            entry.is_current = &entry.track.id == track_id;
        }
        state.current = Some(track_id.clone());
        debug!("Current queue entry: {}", track_id);
        self.persist(PersistOp::SetCurrent(Some(track_id.clone())));
        self.notify(&state);
        Ok(())
    }

    /// Clear the current flag
    pub async fn clear_current(&self) {
        let mut state = self.state.write().await;
        if state.current.is_none() {
            return;
        }
        for entry in state.entries.iter_mut() {
            entry.is_current = false;
        }
        state.current = None;
        self.persist(PersistOp::SetCurrent(None));
        self.notify(&state);
    }

    /// Move `track_id` so it sits between `before` and `after`
    ///
    /// With `before` set the entry lands immediately after it; otherwise
    /// immediately before `after`; with neither it moves to the end. Only the
    /// moved entry's key changes.
    pub async fn reorder(
        &self,
        track_id: &TrackId,
        before: Option<&TrackId>,
        after: Option<&TrackId>,
    ) -> Result<()> {
        if before == Some(track_id) || after == Some(track_id) {
            return Err(Error::InvalidInput(
                "an entry cannot be its own neighbor".to_string(),
            ));
        }

        let mut state = self.state.write().await;
        let index = state
            .index_of(track_id)
            .ok_or_else(|| Error::NotFound(format!("track {} is not queued", track_id)))?;
        let mut entry = state.entries.remove(index);

        let bounds = if let Some(before) = before {
            state.index_of(before).map(|i| (Some(i), Some(i + 1)))
        } else if let Some(after) = after {
            state.index_of(after).map(|i| (i.checked_sub(1), Some(i)))
        } else {
            Some((state.entries.len().checked_sub(1), None))
        };

        let Some((lo, hi)) = bounds else {
            state.insert_sorted(entry);
            return Err(Error::NotFound("neighbor is not queued".to_string()));
        };

        let key = PositionKey::between(
            lo.and_then(|i| state.key_at(i)),
            hi.and_then(|i| state.key_at(i)),
        );
        match key {
            Ok(key) => entry.position = key,
            Err(e) => {
                state.insert_sorted(entry);
                return Err(e.into());
            }
        }

        debug!("Moved {} to position {}", track_id, entry.position);
        self.place(&mut state, entry);
        Ok(())
    }

    /// Insert right after the current entry (or at the front when none)
    pub async fn insert_next(&self, track: Track) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(entry) = self.take_for_insert(&mut state, track) else {
            return Ok(());
        };
        let (lo, hi) = match state.current_index() {
            Some(i) => (Some(i), Some(i + 1)),
            None => (None, Some(0)),
        };
        self.insert_between(&mut state, entry, lo, hi)
    }

    /// Insert beyond the last entry
    pub async fn append(&self, track: Track) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(entry) = self.take_for_insert(&mut state, track) else {
            return Ok(());
        };
        let last = state.entries.len().checked_sub(1);
        self.insert_between(&mut state, entry, last, None)
    }

    /// Insert at a random position among the upcoming entries
    pub async fn insert_shuffled(&self, track: Track) -> Result<()> {
        let mut state = self.state.write().await;
        let Some(entry) = self.take_for_insert(&mut state, track) else {
            return Ok(());
        };
        let first_gap = state.current_index().map_or(0, |i| i + 1);
        let gap = rand::thread_rng().gen_range(first_gap..=state.entries.len());
        self.insert_between(&mut state, entry, gap.checked_sub(1), Some(gap))
    }

    /// Delete the entry; other keys are untouched
    ///
    /// Removing the current entry clears the current pointer.
    pub async fn remove(&self, track_id: &TrackId) -> bool {
        let mut state = self.state.write().await;
        let Some(index) = state.index_of(track_id) else {
            return false;
        };
        state.entries.remove(index);
        if state.current.as_ref() == Some(track_id) {
            state.current = None;
        }
        debug!("Removed {} from queue", track_id);
        self.persist(PersistOp::Remove(track_id.clone()));
        self.notify(&state);
        true
    }

    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.entries.clear();
        state.current = None;
        info!("Queue cleared");
        self.persist(PersistOp::Replace(Vec::new()));
        self.notify(&state);
    }

    /// Update the stored rating of a queued track
    pub async fn set_rating(&self, track_id: &TrackId, rating: Rating) -> Result<()> {
        let mut state = self.state.write().await;
        let index = state
            .index_of(track_id)
            .ok_or_else(|| Error::NotFound(format!("track {} is not queued", track_id)))?;
        state.entries[index].track.rating = rating;
        self.persist(PersistOp::Upsert(state.entries[index].clone()));
        self.notify(&state);
        Ok(())
    }

    /// Wait until every queued write has been attempted
    ///
    /// Returns false when the store is still behind the in-memory queue.
    pub async fn flush(&self) -> bool {
        let (tx, rx) = oneshot::channel();
        self.persist(PersistOp::Flush(tx));
        rx.await.unwrap_or(false)
    }

    /// Prepare an entry for `track`, lifting out an existing entry for the
    /// same id. `None` when `track` is the current entry, which stays put.
    fn take_for_insert(&self, state: &mut QueueState, track: Track) -> Option<QueueEntry> {
        if state.current.as_ref() == Some(&track.id) {
            if let Some(index) = state.current_index() {
                state.entries[index].track = track;
                self.persist(PersistOp::Upsert(state.entries[index].clone()));
                self.notify(state);
            }
            return None;
        }

        let added_at = match state.index_of(&track.id) {
            Some(index) => state.entries.remove(index).added_at,
            None => Utc::now(),
        };
        Some(QueueEntry {
            track,
            position: PositionKey::first(),
            is_current: false,
            added_at,
        })
    }

    fn insert_between(
        &self,
        state: &mut QueueState,
        mut entry: QueueEntry,
        lo: Option<usize>,
        hi: Option<usize>,
    ) -> Result<()> {
        let key = PositionKey::between(
            lo.and_then(|i| state.key_at(i)),
            hi.and_then(|i| state.key_at(i)),
        );
        match key {
            Ok(key) => entry.position = key,
            Err(e) => {
                // Lifted entries must not be lost; park it at the end.
                let tail = state.entries.last().map(|e| e.position.clone());
                entry.position = match tail {
                    Some(tail) => tail.after()?,
                    None => PositionKey::first(),
                };
                warn!("Position key error, appending {} instead: {}", entry.track.id, e);
            }
        }
        debug!("Queued {} at position {}", entry.track.id, entry.position);
        self.place(state, entry);
        Ok(())
    }

    /// Insert a keyed entry, renormalizing if its key grew too long
    fn place(&self, state: &mut QueueState, entry: QueueEntry) {
        let needs_renormalization = entry.position.needs_renormalization();
        let index = state.insert_sorted(entry);

        if needs_renormalization {
            info!(
                "Position keys exhausted, renormalizing {} entries",
                state.entries.len()
            );
            state.renormalize();
            self.persist(PersistOp::Replace(state.entries.clone()));
        } else {
            self.persist(PersistOp::Upsert(state.entries[index].clone()));
        }
        self.notify(state);
    }
}
