//! Playback engine
//!
//! **Module Structure:**
//! - `core.rs`: construction, lifecycle and direct channel controls
//! - `transitions.rs`: track starts, crossfade ramps, next/previous
//! - `queue.rs`: queue-facing operations (enqueue, replace, rate, restore)
//! - `monitor.rs`: channel event handling and proactive auto-advance

mod core;
mod monitor;
mod queue;
mod transitions;

pub use self::core::PlaybackEngine;
pub use self::queue::EnqueueMode;
