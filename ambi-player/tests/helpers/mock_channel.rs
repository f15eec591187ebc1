//! Scripted audio channel
//!
//! The playhead only moves when a test sets it. Tracks listed in the shared
//! failure set fail to become ready.

use ambi_common::{ChannelId, MediaSource, Track, TrackId};
use ambi_player::playback::{AudioChannel, ChannelEvent};
use ambi_player::{Error, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct State {
    id: Option<ChannelId>,
    events: Option<mpsc::UnboundedSender<ChannelEvent>>,
    loaded: Option<Track>,
    source: Option<MediaSource>,
    playing: bool,
    position: Duration,
    volume: f32,
    loads: Vec<TrackId>,
}

pub struct MockChannel {
    state: Mutex<State>,
    failing: Arc<Mutex<HashSet<TrackId>>>,
    ready_delay: Duration,
}

impl MockChannel {
    pub fn new(failing: Arc<Mutex<HashSet<TrackId>>>, ready_delay: Duration) -> Self {
        Self {
            state: Mutex::new(State::default()),
            failing,
            ready_delay,
        }
    }

    pub fn set_position(&self, position: Duration) {
        self.state.lock().unwrap().position = position;
    }

    pub fn loaded(&self) -> Option<TrackId> {
        self.state.lock().unwrap().loaded.as_ref().map(|t| t.id.clone())
    }

    pub fn source(&self) -> Option<MediaSource> {
        self.state.lock().unwrap().source.clone()
    }

    /// Every track id this channel was asked to load, in order
    pub fn loads(&self) -> Vec<TrackId> {
        self.state.lock().unwrap().loads.clone()
    }

    pub fn emit_ended(&self) {
        let state = self.state.lock().unwrap();
        let id = state.id.expect("channel not attached");
        state
            .events
            .as_ref()
            .unwrap()
            .send(ChannelEvent::Ended { channel: id })
            .unwrap();
    }

    pub fn emit_error(&self, message: &str) {
        let state = self.state.lock().unwrap();
        let id = state.id.expect("channel not attached");
        state
            .events
            .as_ref()
            .unwrap()
            .send(ChannelEvent::Error {
                channel: id,
                message: message.to_string(),
            })
            .unwrap();
    }

    fn loaded_is_failing(&self) -> bool {
        let state = self.state.lock().unwrap();
        match &state.loaded {
            Some(track) => self.failing.lock().unwrap().contains(&track.id),
            None => true,
        }
    }
}

#[async_trait]
impl AudioChannel for MockChannel {
    fn attach(&self, id: ChannelId, events: mpsc::UnboundedSender<ChannelEvent>) {
        let mut state = self.state.lock().unwrap();
        state.id = Some(id);
        state.events = Some(events);
    }

    fn load(&self, track: &Track, source: &MediaSource) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.loaded = Some(track.clone());
        state.source = Some(source.clone());
        state.playing = false;
        state.position = Duration::ZERO;
        state.loads.push(track.id.clone());
        Ok(())
    }

    async fn ready(&self) -> Result<()> {
        if !self.ready_delay.is_zero() {
            tokio::time::sleep(self.ready_delay).await;
        }
        if self.loaded_is_failing() {
            return Err(Error::MediaLoad("scripted load failure".to_string()));
        }
        Ok(())
    }

    fn play(&self) -> Result<()> {
        if self.loaded_is_failing() {
            return Err(Error::MediaLoad("scripted play failure".to_string()));
        }
        self.state.lock().unwrap().playing = true;
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().unwrap().playing = false;
    }

    fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.playing = false;
        state.position = Duration::ZERO;
    }

    fn seek(&self, position: Duration) {
        self.state.lock().unwrap().position = position;
    }

    fn set_volume(&self, volume: f32) {
        self.state.lock().unwrap().volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.state.lock().unwrap().volume
    }

    fn position(&self) -> Duration {
        self.state.lock().unwrap().position
    }

    fn duration(&self) -> Option<Duration> {
        self.state
            .lock()
            .unwrap()
            .loaded
            .as_ref()
            .and_then(|t| t.duration())
    }

    fn is_playing(&self) -> bool {
        self.state.lock().unwrap().playing
    }
}
