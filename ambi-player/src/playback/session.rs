//! Mutable playback session
//!
//! Everything the engine needs to decide the next transition lives here,
//! behind one lock. The lock is never held across a load or any other await.

use ambi_common::{ChannelId, PlaybackState, PositionKey, RepeatMode, Track, TrackId};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Whether a crossfade ramp is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionState {
    #[default]
    Idle,
    Crossfading,
}

/// Handle on the running ramp task
pub(crate) struct ActiveRamp {
    pub(crate) generation: u64,
    pub(crate) outgoing: ChannelId,
    pub(crate) incoming: ChannelId,
    pub(crate) incoming_track: TrackId,
    /// Track still audible on `outgoing`; released from cache protection
    /// when the ramp ends
    pub(crate) outgoing_track: Option<TrackId>,
    pub(crate) handle: JoinHandle<()>,
}

pub(crate) struct PlaybackSession {
    pub(crate) active: ChannelId,
    pub(crate) current: Option<Track>,
    /// Queue key of `current` when it started; locates the cursor if the
    /// entry is removed while playing
    pub(crate) current_key: Option<PositionKey>,
    pub(crate) state: PlaybackState,
    pub(crate) target_volume: f32,
    pub(crate) shuffle: bool,
    pub(crate) repeat: RepeatMode,
    pub(crate) ramp: Option<ActiveRamp>,
    pub(crate) ramp_generation: u64,
    /// Current track restored but never started; first resume records the play
    pub(crate) primed: bool,
    /// Proactive advance already attempted for the current track
    pub(crate) advance_armed: bool,
    /// Tracks that failed mid-playback without one finishing in between
    pub(crate) consecutive_failures: usize,
    /// Pause received while a transition was in flight; the transition
    /// commits into Paused instead of Playing
    pub(crate) pause_requested: bool,
}

impl PlaybackSession {
    pub(crate) fn new(target_volume: f32, shuffle: bool, repeat: RepeatMode) -> Self {
        Self {
            active: ChannelId::A,
            current: None,
            current_key: None,
            state: PlaybackState::Idle,
            target_volume: target_volume.clamp(0.0, 1.0),
            shuffle,
            repeat,
            ramp: None,
            ramp_generation: 0,
            primed: false,
            advance_armed: false,
            consecutive_failures: 0,
            pause_requested: false,
        }
    }

    pub(crate) fn transition(&self) -> TransitionState {
        if self.ramp.is_some() {
            TransitionState::Crossfading
        } else {
            TransitionState::Idle
        }
    }

    pub(crate) fn current_id(&self) -> Option<&TrackId> {
        self.current.as_ref().map(|t| &t.id)
    }
}

/// Read-only view returned by `PlaybackEngine::status`
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    pub transition: TransitionState,
    pub active_channel: ChannelId,
    pub current: Option<Track>,
    pub position_secs: f64,
    pub duration_secs: Option<f64>,
    pub volume: f32,
    pub shuffle: bool,
    pub repeat: RepeatMode,
}

impl PlaybackStatus {
    pub fn position(&self) -> Duration {
        ambi_common::time::secs_to_duration(self.position_secs)
    }
}
