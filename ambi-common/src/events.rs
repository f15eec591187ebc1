//! Event types for the controller event system
//!
//! Provides the shared event definitions and the EventBus used to fan them out
//! to persistence, rating and logging collaborators.

use crate::models::{ChannelId, PlaybackState, Rating, RepeatMode, TrackId};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Controller event types
///
/// Emission is fire-and-forget: producers never wait for consumers and an
/// event with no subscriber is simply dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AmbiEvent {
    /// Player state machine moved
    PlaybackStateChanged {
        old_state: PlaybackState,
        new_state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A track started producing audio
    ///
    /// Triggers:
    /// - Cache: play history is recorded
    /// - Rating collaborator: correlate later skip/rating feedback by `play_id`
    TrackStarted {
        track_id: TrackId,
        /// Unique per start, so repeated plays of one track are distinguishable
        play_id: Uuid,
        channel: ChannelId,
        crossfade: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// User skipped away from a track
    ///
    /// `early_skip` is true when less than the configured fraction of the
    /// track had played.
    TrackSkipped {
        track_id: TrackId,
        early_skip: bool,
        elapsed_secs: f64,
        duration_secs: f64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Staff rated a track
    TrackRated {
        track_id: TrackId,
        rating: Rating,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A crossfade ramp finished or was finalized early
    CrossfadeCompleted {
        incoming: TrackId,
        channel: ChannelId,
        /// True when a newer transition cut this ramp short
        interrupted: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Queue content, order or current pointer changed
    QueueChanged {
        len: usize,
        current: Option<TrackId>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Target volume changed (0.0 to 1.0)
    VolumeChanged {
        volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Shuffle or repeat mode changed
    PlaybackModeChanged {
        shuffle: bool,
        repeat: RepeatMode,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track file is now in the local cache
    TrackCached {
        track_id: TrackId,
        file_size: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Track file was removed from the local cache
    TrackEvicted {
        track_id: TrackId,
        freed_bytes: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A prefetch pass finished
    PrefetchCompleted {
        downloaded: usize,
        failed: usize,
        limit_reached: bool,
        usage_bytes: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl AmbiEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            AmbiEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            AmbiEvent::TrackStarted { .. } => "TrackStarted",
            AmbiEvent::TrackSkipped { .. } => "TrackSkipped",
            AmbiEvent::TrackRated { .. } => "TrackRated",
            AmbiEvent::CrossfadeCompleted { .. } => "CrossfadeCompleted",
            AmbiEvent::QueueChanged { .. } => "QueueChanged",
            AmbiEvent::VolumeChanged { .. } => "VolumeChanged",
            AmbiEvent::PlaybackModeChanged { .. } => "PlaybackModeChanged",
            AmbiEvent::TrackCached { .. } => "TrackCached",
            AmbiEvent::TrackEvicted { .. } => "TrackEvicted",
            AmbiEvent::PrefetchCompleted { .. } => "PrefetchCompleted",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over a tokio broadcast channel. Slow subscribers lag and lose
/// the oldest events instead of applying back-pressure to the producer.
///
/// # Examples
///
/// ```
/// use ambi_common::events::{AmbiEvent, EventBus};
/// use ambi_common::models::TrackId;
///
/// let bus = EventBus::new(100);
/// let mut rx = bus.subscribe();
///
/// bus.emit_lossy(AmbiEvent::QueueChanged {
///     len: 3,
///     current: Some(TrackId::from("t1")),
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AmbiEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AmbiEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AmbiEvent,
    ) -> Result<usize, broadcast::error::SendError<AmbiEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AmbiEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
