//! Cache Manager
//!
//! Bounded local cache of track files with LRU eviction, plus the
//! background prefetcher that fills it ahead of playback.

mod manager;
mod origin;
mod prefetch;

pub use manager::{CacheManager, PrefetchReport};
pub use origin::{DownloadOutcome, FolderOrigin, MediaOrigin};
pub use prefetch::PrefetchWorker;
