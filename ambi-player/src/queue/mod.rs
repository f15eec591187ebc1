//! Queue Manager
//!
//! Owns the ordered track list and the current pointer. Independent of
//! playback and cache; persistence happens off the caller's path through
//! [`writer`].

mod manager;
mod writer;

pub use manager::{Cursor, QueueManager, QueueSnapshot};
