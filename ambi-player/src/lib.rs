//! # Ambient Music Player Library (ambi-player)
//!
//! Unattended venue music controller: a two-channel crossfading playback
//! engine fed by a fractionally indexed queue, with a bounded LRU cache of
//! track files filled by a background prefetcher.
//!
//! **Architecture:** the Queue Manager and Cache Manager are independent
//! leaves behind async store traits; the Playback Engine sits on top and
//! talks to both.

pub mod cache;
pub mod config;
pub mod console;
pub mod db;
pub mod error;
pub mod playback;
pub mod queue;

pub use error::{Error, Result};
