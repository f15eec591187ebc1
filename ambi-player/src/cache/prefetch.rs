//! Background prefetch worker
//!
//! Playback asks for a prefetch after every track start. Requests are
//! debounced and coalesced: only the latest queue snapshot is acted on once
//! the request stream has been quiet for the debounce window, so a burst of
//! skips costs one pass instead of many.

use super::manager::CacheManager;
use ambi_common::Track;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug)]
struct PrefetchRequest {
    tracks: Vec<Track>,
    current_index: Option<usize>,
}

/// Handle to the prefetch task; dropping every handle stops the task
#[derive(Clone)]
pub struct PrefetchWorker {
    tx: mpsc::UnboundedSender<PrefetchRequest>,
}

impl PrefetchWorker {
    /// Spawn the worker task
    pub fn spawn(cache: Arc<CacheManager>, debounce: Duration) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(cache, debounce, rx));
        (Self { tx }, handle)
    }

    /// Queue a prefetch of the entries after `current_index`
    ///
    /// Never blocks; superseded by any newer request within the debounce window.
    pub fn request(&self, tracks: Vec<Track>, current_index: Option<usize>) {
        let request = PrefetchRequest {
            tracks,
            current_index,
        };
        if self.tx.send(request).is_err() {
            warn!("Prefetch worker has stopped; request dropped");
        }
    }
}

async fn run(
    cache: Arc<CacheManager>,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<PrefetchRequest>,
) {
    while let Some(mut latest) = rx.recv().await {
        // Restart the quiet window on every newer request.
        loop {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(Some(newer)) => latest = newer,
                Ok(None) => {
                    debug!("Prefetch worker closed");
                    return;
                }
                Err(_) => break,
            }
        }

        debug!(
            "Running prefetch pass over {} entries (current: {:?})",
            latest.tracks.len(),
            latest.current_index
        );
        cache.prefetch(&latest.tracks, latest.current_index).await;
    }
    debug!("Prefetch worker closed");
}
