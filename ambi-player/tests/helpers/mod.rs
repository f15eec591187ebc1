//! Test helper modules for ambi-player integration tests
//!
//! Provides reusable test infrastructure components:
//! - MockChannel: scripted channel with a hand-set playhead
//! - MockOrigin: origin with fixed file sizes and injectable failures
//! - Harness: engine wired to mocks and in-memory stores

#![allow(dead_code)]

pub mod harness;
pub mod mock_channel;
pub mod mock_origin;

pub use harness::{drain, track, Harness};
pub use mock_channel::MockChannel;
pub use mock_origin::MockOrigin;
