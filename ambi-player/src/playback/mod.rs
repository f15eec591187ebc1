//! Playback Engine
//!
//! Two alternating channels, the crossfade ramp between them, and the
//! policy that picks what plays next.

pub mod channel;
pub mod clock_channel;
pub mod engine;
pub mod fader;
pub mod selection;
pub mod session;

pub use channel::{AudioChannel, ChannelEvent};
pub use clock_channel::ClockChannel;
pub use engine::{EnqueueMode, PlaybackEngine};
pub use fader::Fader;
pub use selection::SelectionPolicy;
pub use session::{PlaybackStatus, TransitionState};
