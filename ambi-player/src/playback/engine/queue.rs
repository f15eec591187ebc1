//! Queue-facing engine operations
//!
//! Thin wrappers that mutate the queue and decide whether playback should
//! start or move as a result.

use super::core::PlaybackEngine;
use super::transitions::AdvanceReason;
use crate::error::{Error, Result};
use ambi_common::{AmbiEvent, PlaybackState, Rating, Track, TrackId};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Where an enqueued track lands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnqueueMode {
    /// Right after the current track
    Next,
    /// After the last entry
    #[default]
    Last,
    /// At a random spot among the upcoming entries
    Shuffle,
}

impl std::str::FromStr for EnqueueMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "next" => Ok(EnqueueMode::Next),
            "last" | "end" => Ok(EnqueueMode::Last),
            "shuffle" | "random" => Ok(EnqueueMode::Shuffle),
            other => Err(Error::InvalidInput(format!("unknown enqueue mode '{other}'"))),
        }
    }
}

impl PlaybackEngine {
    /// Queue `track`; when nothing is playing it starts right away
    pub async fn enqueue(&self, track: Track, mode: EnqueueMode) -> Result<()> {
        self.insert(track.clone(), mode).await?;
        if self.is_idle().await {
            self.play(track, false).await?;
        }
        Ok(())
    }

    /// Queue several tracks, keeping their relative order for `Next`/`Last`
    pub async fn enqueue_many(&self, tracks: Vec<Track>, mode: EnqueueMode) -> Result<()> {
        let Some(first) = tracks.first().cloned() else {
            return Ok(());
        };
        match mode {
            EnqueueMode::Next => {
                for track in tracks.into_iter().rev() {
                    self.queue.insert_next(track).await?;
                }
            }
            EnqueueMode::Last | EnqueueMode::Shuffle => {
                for track in tracks {
                    self.insert(track, mode).await?;
                }
            }
        }
        if self.is_idle().await {
            self.play(first, false).await?;
        }
        Ok(())
    }

    /// Replace the whole queue and play from `start` (or the first entry)
    pub async fn replace_queue(&self, tracks: Vec<Track>, start: Option<TrackId>) -> Result<()> {
        self.queue.set_queue(tracks).await;
        let snapshot = self.queue.snapshot().await;
        let start_index = match start {
            Some(id) => snapshot
                .index_of(&id)
                .ok_or_else(|| Error::NotFound(format!("track {id} is not in the new queue")))?,
            None => 0,
        };
        match snapshot.track(start_index).cloned() {
            Some(track) => self.play(track, true).await,
            None => {
                info!("Queue replaced with an empty list");
                self.stop().await
            }
        }
    }

    /// Record a staff rating; disliking the current track skips it
    pub async fn rate(&self, track_id: &TrackId, rating: Rating) -> Result<()> {
        if let Err(e) = self.queue.set_rating(track_id, rating).await {
            debug!("Rated track {} is not queued: {}", track_id, e);
        }
        let is_current = {
            let mut session = self.session.write().await;
            match session.current.as_mut() {
                Some(track) if &track.id == track_id => {
                    track.rating = rating;
                    true
                }
                _ => false,
            }
        };

        info!("Rated {} as {}", track_id, rating);
        self.events.emit_lossy(AmbiEvent::TrackRated {
            track_id: track_id.clone(),
            rating,
            timestamp: Utc::now(),
        });

        if is_current && rating == Rating::Dislike {
            let _guard = self.guard().await;
            let still_current = {
                let mut session = self.session.write().await;
                let still_current = session.current_id() == Some(track_id);
                if still_current {
                    session.consecutive_failures = 0;
                }
                still_current
            };
            if still_current {
                info!("👎 Current track disliked; skipping");
                self.advance(AdvanceReason::User, true).await?;
            } else {
                debug!("Disliked track {} already left the deck", track_id);
            }
        }
        Ok(())
    }

    /// Rate whatever is playing now
    pub async fn rate_current(&self, rating: Rating) -> Result<()> {
        let current = self.session.read().await.current_id().cloned();
        match current {
            Some(track_id) => self.rate(&track_id, rating).await,
            None => Err(Error::InvalidInput("no current track to rate".to_string())),
        }
    }

    /// Prepare the persisted current entry without starting audio
    ///
    /// With `autoplay` set the restored track is resumed immediately.
    pub async fn restore(&self) -> Result<()> {
        let guard = self.guard().await;
        let Some(entry) = self.queue.current().await else {
            info!("No current track to restore");
            return Ok(());
        };
        let track = entry.track;
        self.cache.protect(track.id.clone());
        let source = self.cache.resolve(&track).await;

        let active = self.session.read().await.active;
        let channel = self.channel(active);
        channel.reset();
        let prepared = match channel.load(&track, &source) {
            Ok(()) => {
                match tokio::time::timeout(self.config.ready_timeout(), channel.ready()).await {
                    Ok(Err(e)) => Err(e),
                    _ => Ok(()),
                }
            }
            Err(e) => Err(e),
        };
        if let Err(e) = prepared {
            warn!("⚠️ Could not prepare restored track {}: {}", track.id, e);
            channel.reset();
            self.cache.release(&track.id);
            return Ok(());
        }

        {
            let mut session = self.session.write().await;
            channel.set_volume(session.target_volume);
            info!("Restored {} \"{}\" (paused)", track.id, track.title);
            session.current = Some(track.clone());
            session.current_key = Some(entry.position);
            session.primed = true;
            session.advance_armed = false;
            self.set_state(&mut session, PlaybackState::Paused);
        }

        drop(guard);
        if self.config.autoplay {
            self.resume().await?;
        }
        Ok(())
    }

    async fn insert(&self, track: Track, mode: EnqueueMode) -> Result<()> {
        debug!("Enqueue {} ({:?})", track.id, mode);
        match mode {
            EnqueueMode::Next => self.queue.insert_next(track).await,
            EnqueueMode::Last => self.queue.append(track).await,
            EnqueueMode::Shuffle => self.queue.insert_shuffled(track).await,
        }
    }

    async fn is_idle(&self) -> bool {
        self.session.read().await.state == PlaybackState::Idle
    }
}
