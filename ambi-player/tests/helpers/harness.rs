//! Engine wired to mock channels, a mock origin and in-memory stores

use super::{MockChannel, MockOrigin};
use ambi_common::{AmbiEvent, EventBus, Track, TrackId};
use ambi_player::cache::CacheManager;
use ambi_player::config::{CacheConfig, PlaybackConfig};
use ambi_player::db::settings::PlaybackPreferences;
use ambi_player::db::MemoryStore;
use ambi_player::playback::PlaybackEngine;
use ambi_player::queue::QueueManager;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

pub struct Harness {
    pub engine: PlaybackEngine,
    pub channels: [Arc<MockChannel>; 2],
    pub queue: QueueManager,
    pub cache: Arc<CacheManager>,
    pub origin: Arc<MockOrigin>,
    pub events: Arc<EventBus>,
    pub store: Arc<MemoryStore>,
    failing: Arc<Mutex<HashSet<TrackId>>>,
}

impl Harness {
    pub async fn new(tracks: Vec<Track>) -> Self {
        Self::build(tracks, PlaybackConfig::default(), Duration::ZERO).await
    }

    /// Engine whose channels take `ready_delay` to become ready
    pub async fn build(tracks: Vec<Track>, config: PlaybackConfig, ready_delay: Duration) -> Self {
        Self::build_with(
            tracks,
            config,
            ready_delay,
            MockOrigin::default(),
            CacheConfig::default(),
        )
        .await
    }

    /// Same as [`Harness::build`] with a scripted origin and cache budget
    pub async fn build_with(
        tracks: Vec<Track>,
        config: PlaybackConfig,
        ready_delay: Duration,
        origin: MockOrigin,
        cache_config: CacheConfig,
    ) -> Self {
        let events = Arc::new(EventBus::new(1024));
        let store = Arc::new(MemoryStore::new());
        let queue = QueueManager::new(store.clone(), Arc::clone(&events));
        queue.set_queue(tracks).await;

        let origin = Arc::new(origin);
        let cache = Arc::new(CacheManager::new(
            store.clone(),
            origin.clone(),
            Arc::clone(&events),
            cache_config,
            ambi_common::time::system_clock(),
        ));

        let failing = Arc::new(Mutex::new(HashSet::new()));
        let a = Arc::new(MockChannel::new(Arc::clone(&failing), ready_delay));
        let b = Arc::new(MockChannel::new(Arc::clone(&failing), ready_delay));

        let engine = PlaybackEngine::new(
            [a.clone(), b.clone()],
            queue.clone(),
            Arc::clone(&cache),
            None,
            Arc::clone(&events),
            config,
            PlaybackPreferences::default(),
        );
        engine.start().await.unwrap();

        Self {
            engine,
            channels: [a, b],
            queue,
            cache,
            origin,
            events,
            store,
            failing,
        }
    }

    /// Make `id` fail to load on either channel
    pub fn fail(&self, id: &str) {
        self.failing.lock().unwrap().insert(TrackId::from(id));
    }

    pub async fn active(&self) -> Arc<MockChannel> {
        let id = self.engine.status().await.active_channel;
        Arc::clone(&self.channels[id.index()])
    }

    pub async fn inactive(&self) -> Arc<MockChannel> {
        let id = self.engine.status().await.active_channel.other();
        Arc::clone(&self.channels[id.index()])
    }

    pub async fn current(&self) -> Option<TrackId> {
        self.engine.status().await.current.map(|t| t.id)
    }

    pub async fn queued(&self, id: &str) -> Track {
        let snapshot = self.queue.snapshot().await;
        let index = snapshot.index_of(&TrackId::from(id)).expect("track not queued");
        snapshot.track(index).cloned().unwrap()
    }

    /// Let any running ramp and background task finish
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_secs(6)).await;
    }

    /// Let spawned tasks observe pending channel events
    pub async fn yield_briefly(&self) {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub fn track(id: &str, duration_secs: f64) -> Track {
    Track::new(id, format!("Track {id}"), duration_secs)
}

/// Everything currently buffered on `rx`
pub fn drain(rx: &mut broadcast::Receiver<AmbiEvent>) -> Vec<AmbiEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
