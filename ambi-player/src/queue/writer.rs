//! Background queue persistence
//!
//! Queue mutations enqueue a [`PersistOp`] and return immediately. A single
//! writer task applies them in order. When a write fails the writer turns
//! dirty and, on the next op, rewrites the full current snapshot instead,
//! so the store converges as soon as it is reachable again.

use super::manager::QueueState;
use crate::db::QueueStore;
use ambi_common::{QueueEntry, TrackId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub(crate) enum PersistOp {
    Replace(Vec<QueueEntry>),
    Upsert(QueueEntry),
    Remove(TrackId),
    SetCurrent(Option<TrackId>),
    Flush(oneshot::Sender<bool>),
}

pub(crate) fn spawn_writer(
    store: Arc<dyn QueueStore>,
    state: Arc<RwLock<QueueState>>,
) -> mpsc::UnboundedSender<PersistOp> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run(store, state, rx));
    tx
}

async fn run(
    store: Arc<dyn QueueStore>,
    state: Arc<RwLock<QueueState>>,
    mut rx: mpsc::UnboundedReceiver<PersistOp>,
) {
    let mut dirty = false;

    while let Some(op) = rx.recv().await {
        if let PersistOp::Flush(reply) = op {
            if dirty {
                dirty = !save_snapshot(store.as_ref(), &state).await;
            }
            let _ = reply.send(!dirty);
            continue;
        }

        if dirty {
            // The op itself is already reflected in the in-memory snapshot.
            dirty = !save_snapshot(store.as_ref(), &state).await;
            continue;
        }

        let result = match &op {
            PersistOp::Replace(entries) => store.save_queue(entries).await,
            PersistOp::Upsert(entry) => store.upsert_entry(entry).await,
            PersistOp::Remove(track_id) => store.remove_entry(track_id).await,
            PersistOp::SetCurrent(track_id) => store.set_current(track_id.as_ref()).await,
            PersistOp::Flush(_) => Ok(()),
        };

        if let Err(e) = result {
            warn!("Queue persistence failed, will rewrite full queue on next change: {}", e);
            dirty = true;
        }
    }

    debug!("Queue writer stopped");
}

/// Write the whole in-memory queue; true on success
async fn save_snapshot(store: &dyn QueueStore, state: &RwLock<QueueState>) -> bool {
    let entries = state.read().await.entries.clone();
    match store.save_queue(&entries).await {
        Ok(()) => {
            info!("Queue persistence recovered ({} entries rewritten)", entries.len());
            true
        }
        Err(e) => {
            warn!("Queue snapshot rewrite failed: {}", e);
            false
        }
    }
}
