//! Headless channel driven by the tokio clock
//!
//! Tracks a playhead against elapsed time instead of rendering samples, and
//! reports end-of-media when the playhead reaches the track duration. Used
//! for unattended runs and as the reference behavior for real outputs.

use super::channel::{AudioChannel, ChannelEvent};
use crate::error::{Error, Result};
use ambi_common::{ChannelId, MediaSource, Track, TrackId};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

struct Loaded {
    track_id: TrackId,
    duration: Option<Duration>,
    /// Set when the source cannot be opened
    failure: Option<String>,
}

#[derive(Default)]
struct Inner {
    id: Option<ChannelId>,
    events: Option<mpsc::UnboundedSender<ChannelEvent>>,
    loaded: Option<Loaded>,
    /// Playhead at the moment `started_at` was taken
    offset: Duration,
    started_at: Option<Instant>,
    volume: f32,
    /// Bumped on every pause/seek/reset/load so stale end timers are ignored
    generation: u64,
}

impl Inner {
    fn position(&self) -> Duration {
        let raw = match self.started_at {
            Some(started) => self.offset + started.elapsed(),
            None => self.offset,
        };
        match self.loaded.as_ref().and_then(|l| l.duration) {
            Some(duration) => raw.min(duration),
            None => raw,
        }
    }

    fn halt(&mut self) {
        self.offset = self.position();
        self.started_at = None;
        self.generation += 1;
    }
}

#[derive(Clone, Default)]
pub struct ClockChannel {
    inner: Arc<Mutex<Inner>>,
}

impl ClockChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Arm the end-of-media timer for the current generation
    fn schedule_end(&self, inner: &Inner) {
        let Some(duration) = inner.loaded.as_ref().and_then(|l| l.duration) else {
            return;
        };
        let remaining = duration.saturating_sub(inner.offset);
        let generation = inner.generation;
        let shared = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            let mut inner = shared.lock().unwrap_or_else(|e| e.into_inner());
            if inner.generation != generation || inner.started_at.is_none() {
                return;
            }
            inner.halt();
            if let (Some(id), Some(events)) = (inner.id, inner.events.as_ref()) {
                let _ = events.send(ChannelEvent::Ended { channel: id });
            }
        });
    }
}

#[async_trait]
impl AudioChannel for ClockChannel {
    fn attach(&self, id: ChannelId, events: mpsc::UnboundedSender<ChannelEvent>) {
        let mut inner = self.lock();
        inner.id = Some(id);
        inner.events = Some(events);
    }

    fn load(&self, track: &Track, source: &MediaSource) -> Result<()> {
        let failure = match source {
            MediaSource::Local(path) if !path.exists() => {
                Some(format!("cached file missing: {}", path.display()))
            }
            _ => None,
        };
        let mut inner = self.lock();
        inner.halt();
        inner.offset = Duration::ZERO;
        inner.loaded = Some(Loaded {
            track_id: track.id.clone(),
            duration: track.duration(),
            failure,
        });
        debug!(channel = ?inner.id, track = %track.id, source = %source, "Loaded source");
        Ok(())
    }

    async fn ready(&self) -> Result<()> {
        let inner = self.lock();
        match inner.loaded.as_ref() {
            None => Err(Error::MediaLoad("nothing loaded".to_string())),
            Some(Loaded {
                failure: Some(reason),
                track_id,
                ..
            }) => {
                warn!("Source for {} failed to load: {}", track_id, reason);
                Err(Error::MediaLoad(reason.clone()))
            }
            Some(_) => Ok(()),
        }
    }

    fn play(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.loaded.as_ref() {
            None => return Err(Error::MediaLoad("nothing loaded".to_string())),
            Some(Loaded {
                failure: Some(reason),
                ..
            }) => return Err(Error::MediaLoad(reason.clone())),
            Some(_) => {}
        }
        if inner.started_at.is_some() {
            return Ok(());
        }
        inner.generation += 1;
        inner.started_at = Some(Instant::now());
        self.schedule_end(&inner);
        Ok(())
    }

    fn pause(&self) {
        let mut inner = self.lock();
        if inner.started_at.is_some() {
            inner.halt();
        }
    }

    fn reset(&self) {
        let mut inner = self.lock();
        inner.halt();
        inner.offset = Duration::ZERO;
    }

    fn seek(&self, position: Duration) {
        let mut inner = self.lock();
        let playing = inner.started_at.is_some();
        inner.halt();
        inner.offset = match inner.loaded.as_ref().and_then(|l| l.duration) {
            Some(duration) => position.min(duration),
            None => position,
        };
        if playing {
            inner.started_at = Some(Instant::now());
            self.schedule_end(&inner);
        }
    }

    fn set_volume(&self, volume: f32) {
        self.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.lock().volume
    }

    fn position(&self) -> Duration {
        self.lock().position()
    }

    fn duration(&self) -> Option<Duration> {
        self.lock().loaded.as_ref().and_then(|l| l.duration)
    }

    fn is_playing(&self) -> bool {
        self.lock().started_at.is_some()
    }
}
