//! # Ambi Common Library
//!
//! Shared code for the ambient venue music controller including:
//! - Track, queue and cache record models
//! - Fractional position keys for the persistent queue
//! - Event types (AmbiEvent enum) and the EventBus
//! - Configuration file resolution
//! - Fade curve definitions and calculations

pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod models;
pub mod position_key;
pub mod time;

pub use error::{Error, Result};
pub use events::{AmbiEvent, EventBus};
pub use fade_curves::FadeCurve;
pub use models::{
    CacheRecord, ChannelId, MediaSource, PlaybackState, QueueEntry, Rating, RepeatMode, Track,
    TrackId,
};
pub use position_key::PositionKey;
