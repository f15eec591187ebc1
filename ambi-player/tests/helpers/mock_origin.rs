//! Scripted media origin

use ambi_common::{Track, TrackId};
use ambi_player::cache::{DownloadOutcome, MediaOrigin};
use ambi_player::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Default)]
pub struct MockOrigin {
    sizes: Mutex<HashMap<TrackId, u64>>,
    stuck: Mutex<HashSet<TrackId>>,
    /// Downloads allowed before `LimitReached` is reported
    limit: Mutex<Option<usize>>,
    downloads: Mutex<Vec<TrackId>>,
    evictions: Mutex<Vec<TrackId>>,
}

impl MockOrigin {
    pub fn with_size(self, id: &str, size: u64) -> Self {
        self.sizes.lock().unwrap().insert(TrackId::from(id), size);
        self
    }

    pub fn with_limit(self, downloads: usize) -> Self {
        *self.limit.lock().unwrap() = Some(downloads);
        self
    }

    /// Refuse to delete `id`
    pub fn stick(&self, id: &str) {
        self.stuck.lock().unwrap().insert(TrackId::from(id));
    }

    pub fn downloads(&self) -> Vec<TrackId> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn evictions(&self) -> Vec<TrackId> {
        self.evictions.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaOrigin for MockOrigin {
    async fn download_to_cache(&self, track: &Track) -> Result<DownloadOutcome> {
        if let Some(limit) = *self.limit.lock().unwrap() {
            if self.downloads.lock().unwrap().len() >= limit {
                return Ok(DownloadOutcome::LimitReached);
            }
        }
        let size = self
            .sizes
            .lock()
            .unwrap()
            .get(&track.id)
            .copied()
            .ok_or_else(|| Error::MediaLoad(format!("origin has no file for {}", track.id)))?;
        self.downloads.lock().unwrap().push(track.id.clone());
        Ok(DownloadOutcome::Stored { size })
    }

    async fn evict_from_cache(&self, track_id: &TrackId) -> Result<()> {
        if self.stuck.lock().unwrap().contains(track_id) {
            return Err(Error::Io(std::io::Error::other("file busy")));
        }
        self.evictions.lock().unwrap().push(track_id.clone());
        Ok(())
    }

    fn cached_path(&self, track_id: &TrackId) -> PathBuf {
        PathBuf::from(format!("/var/cache/ambi/{track_id}.cache"))
    }

    fn stream_locator(&self, track: &Track) -> String {
        format!("http://origin.test/stream?id={}", track.id)
    }
}
