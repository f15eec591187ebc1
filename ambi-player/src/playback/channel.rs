//! Output channel abstraction
//!
//! The engine drives two interchangeable channels. A channel plays exactly one
//! source at a time; loading a new source replaces whatever was there.
//! Channels report end-of-media and playback errors asynchronously through
//! the sender handed to [`AudioChannel::attach`].

use crate::error::Result;
use ambi_common::{ChannelId, MediaSource, Track};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;

/// Asynchronous notification from a channel
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The loaded source played to its end
    Ended { channel: ChannelId },
    /// The loaded source failed mid-playback
    Error { channel: ChannelId, message: String },
}

impl ChannelEvent {
    pub fn channel(&self) -> ChannelId {
        match self {
            ChannelEvent::Ended { channel } | ChannelEvent::Error { channel, .. } => *channel,
        }
    }
}

/// One of the two alternating audio outputs
///
/// Every method except [`ready`](AudioChannel::ready) returns immediately;
/// loading only begins in [`load`](AudioChannel::load) and readiness is
/// awaited separately so the caller can bound the wait.
#[async_trait]
pub trait AudioChannel: Send + Sync {
    /// Register where end-of-media and error events are delivered
    fn attach(&self, id: ChannelId, events: mpsc::UnboundedSender<ChannelEvent>);

    /// Start loading `source`, replacing the current source
    fn load(&self, track: &Track, source: &MediaSource) -> Result<()>;

    /// Resolve once the loaded source can start playing
    ///
    /// Returns `Error::MediaLoad` when the source turned out to be unreachable
    /// or corrupt.
    async fn ready(&self) -> Result<()>;

    fn play(&self) -> Result<()>;

    fn pause(&self);

    /// Stop and rewind to the start of the loaded source
    fn reset(&self);

    fn seek(&self, position: Duration);

    /// Set output volume, clamped to 0.0..=1.0
    fn set_volume(&self, volume: f32);

    fn volume(&self) -> f32;

    fn position(&self) -> Duration;

    /// Length of the loaded source, once known
    fn duration(&self) -> Option<Duration>;

    fn is_playing(&self) -> bool;
}
