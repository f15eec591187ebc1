//! Track transitions
//!
//! A transition resolves a playable candidate, prepares it on the inactive
//! channel and either crossfades into it or cuts over. All of it runs under
//! the transition guard; the session lock is only taken for short,
//! await-free sections.

use super::core::{coalesce, PlaybackEngine};
use crate::error::Result;
use crate::playback::channel::AudioChannel;
use crate::playback::selection::{self, SelectionPolicy};
use crate::playback::session::{ActiveRamp, PlaybackSession};
use crate::queue::{Cursor, QueueSnapshot};
use ambi_common::{
    AmbiEvent, ChannelId, MediaSource, PlaybackState, RepeatMode, Track, TrackId,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Why the engine is moving to another track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AdvanceReason {
    /// Staff pressed next
    User,
    /// The active track is inside its crossfade window
    Proactive,
    /// The active channel reached end-of-media
    EndOfMedia,
    /// The active channel failed mid-playback
    Failure,
}

impl PlaybackEngine {
    /// Play `track`, crossfading from the current one when it is audible
    ///
    /// A track that is not queued yet is inserted after the current entry.
    /// A disliked `track` is never played; the next playable candidate is
    /// chosen instead, and the engine goes Idle when there is none.
    pub async fn play(&self, track: Track, crossfade: bool) -> Result<()> {
        let _guard = self.guard().await;
        if self.queue.position_of(&track.id).await.is_none() {
            self.queue.insert_next(track.clone()).await?;
        }
        self.session.write().await.consecutive_failures = 0;
        self.play_locked(track, crossfade).await
    }

    /// Skip to the next track per the shuffle/repeat policy
    pub async fn next(&self, crossfade: bool) -> Result<()> {
        let result = async {
            let _guard = self.try_guard().await?;
            self.session.write().await.consecutive_failures = 0;
            self.advance(AdvanceReason::User, crossfade).await
        }
        .await;
        coalesce("next", result)
    }

    /// Restart the current track, or go back one playable entry
    pub async fn previous(&self) -> Result<()> {
        let result = async {
            let _guard = self.try_guard().await?;

            let restart = {
                let session = self.session.read().await;
                let channel = self.channel(session.active);
                if session.current.is_some()
                    && channel.position() > self.config.restart_threshold()
                {
                    channel.seek(Duration::ZERO);
                    true
                } else {
                    false
                }
            };
            if restart {
                info!("⏮ Restarted current track");
                return Ok(());
            }

            self.emit_skip().await;
            let snapshot = self.queue.snapshot().await;
            let tracks = snapshot.tracks();
            let (cursor, policy) = self.cursor_and_policy(&snapshot).await;
            match selection::previous_index(&tracks, cursor, policy) {
                Some(index) => self.play_locked(tracks[index].clone(), true).await,
                None => {
                    self.halt("no playable track before the current one").await;
                    Ok(())
                }
            }
        }
        .await;
        coalesce("previous", result)
    }

    /// Move past the current track; the caller holds the transition guard
    pub(super) async fn advance(&self, reason: AdvanceReason, crossfade: bool) -> Result<()> {
        if reason == AdvanceReason::User {
            self.emit_skip().await;
        }

        let snapshot = self.queue.snapshot().await;
        let tracks = snapshot.tracks();
        let (cursor, policy) = self.cursor_and_policy(&snapshot).await;
        let index = {
            let mut rng = rand::thread_rng();
            selection::next_index(&tracks, cursor, policy, &mut rng)
        };

        match index {
            Some(index) => {
                debug!("Advancing ({:?}) to queue index {}", reason, index);
                self.play_locked(tracks[index].clone(), crossfade).await
            }
            None if reason == AdvanceReason::Proactive => {
                debug!("Queue exhausted; letting the current track finish");
                Ok(())
            }
            None => {
                self.halt("queue exhausted").await;
                Ok(())
            }
        }
    }

    /// Start `track` or the first playable candidate after it
    ///
    /// Disliked candidates and candidates that fail to load are passed over
    /// like a finished track. The walk is bounded by the queue length.
    pub(super) async fn play_locked(&self, track: Track, crossfade: bool) -> Result<()> {
        let snapshot = self.queue.snapshot().await;
        let tracks = snapshot.tracks();
        let policy = {
            let session = self.session.read().await;
            fallthrough_policy(self.policy_of(&session))
        };

        let mut candidate = track;
        for _ in 0..=tracks.len() {
            if candidate.is_disliked() {
                debug!("Passing over disliked track {}", candidate.id);
            } else {
                match self.start_track(&candidate, crossfade).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!(
                            "⚠️ Could not start {} ({}): {}; treating as end of track",
                            candidate.id, candidate.title, e
                        );
                    }
                }
            }

            let cursor = snapshot.cursor(Some(&candidate.id), None);
            let next = {
                let mut rng = rand::thread_rng();
                selection::next_index(&tracks, cursor, policy, &mut rng)
            };
            match next {
                Some(index) => candidate = tracks[index].clone(),
                None => break,
            }
        }

        self.halt("no playable track in the queue").await;
        Ok(())
    }

    /// Prepare `track` on the inactive channel and switch to it
    async fn start_track(&self, track: &Track, crossfade: bool) -> Result<()> {
        // Held from before resolve until the track is no longer audible.
        self.cache.protect(track.id.clone());
        let source = self.cache.resolve(track).await;
        let key = self.queue.position_of(&track.id).await;

        let (outgoing_id, outgoing_track, fade) = {
            let mut session = self.session.write().await;
            self.finalize_ramp(&mut session);
            let outgoing_id = session.active;
            let outgoing_track = session.current_id().cloned();
            let outgoing = self.channel(outgoing_id);
            let fade = crossfade
                && !self.config.crossfade_duration().is_zero()
                && outgoing.is_playing();
            if !fade {
                outgoing.pause();
                outgoing.reset();
                self.release_unless(outgoing_track.as_ref(), &track.id);
                if !session.pause_requested {
                    self.set_state(&mut session, PlaybackState::Loading);
                }
            }
            (outgoing_id, outgoing_track, fade)
        };

        let incoming_id = outgoing_id.other();
        let incoming = self.channel(incoming_id);
        incoming.reset();
        incoming.set_volume(0.0);
        if let Err(e) = self.load_and_start(incoming, track, &source).await {
            incoming.reset();
            if !fade || outgoing_track.as_ref() != Some(&track.id) {
                self.cache.release(&track.id);
            }
            return Err(e);
        }

        let paused = {
            let mut session = self.session.write().await;
            session.active = incoming_id;
            session.current = Some(track.clone());
            session.current_key = key;
            session.advance_armed = false;
            let paused = std::mem::take(&mut session.pause_requested);
            if paused {
                incoming.pause();
                incoming.set_volume(session.target_volume);
                if fade {
                    let outgoing = self.channel(outgoing_id);
                    outgoing.pause();
                    outgoing.reset();
                    outgoing.set_volume(0.0);
                    self.release_unless(outgoing_track.as_ref(), &track.id);
                }
                session.primed = true;
                self.set_state(&mut session, PlaybackState::Paused);
                info!(
                    "⏸ {} \"{}\" ready on channel {} (paused)",
                    track.id, track.title, incoming_id
                );
            } else {
                session.primed = false;
                if fade {
                    self.begin_ramp(
                        &mut session,
                        outgoing_id,
                        incoming_id,
                        track.id.clone(),
                        outgoing_track,
                    );
                } else {
                    incoming.set_volume(session.target_volume);
                }
                self.set_state(&mut session, PlaybackState::Playing);
            }
            paused
        };

        if !paused {
            self.record_start(track, incoming_id, fade).await;
        }
        Ok(())
    }

    /// Drop eviction protection for a track leaving the deck
    fn release_unless(&self, leaving: Option<&TrackId>, staying: &TrackId) {
        if let Some(leaving) = leaving.filter(|id| *id != staying) {
            self.cache.release(leaving);
        }
    }

    /// Load, wait a bounded time for readiness, then start the channel
    async fn load_and_start(
        &self,
        channel: &Arc<dyn AudioChannel>,
        track: &Track,
        source: &MediaSource,
    ) -> Result<()> {
        channel.load(track, source)?;
        let timeout = self.config.ready_timeout();
        match tokio::time::timeout(timeout, channel.ready()).await {
            Ok(result) => result?,
            Err(_) => debug!(
                "{} not ready after {}ms; starting anyway",
                track.id,
                timeout.as_millis()
            ),
        }
        channel.play()
    }

    /// After-start bookkeeping: history, eviction protection, current
    /// flag, feedback event and prefetch
    pub(super) async fn record_start(&self, track: &Track, channel: ChannelId, crossfade: bool) {
        if let Err(e) = self.queue.set_current(&track.id).await {
            debug!("Started track {} is not queued: {}", track.id, e);
        }
        self.cache.protect(track.id.clone());

        let cache = Arc::clone(&self.cache);
        let played = track.clone();
        tokio::spawn(async move {
            cache.track_play(&played).await;
        });

        info!(
            "🎵 Now playing {} \"{}\" on channel {}{}",
            track.id,
            track.title,
            channel,
            if crossfade { " (crossfade)" } else { "" }
        );
        self.events.emit_lossy(AmbiEvent::TrackStarted {
            track_id: track.id.clone(),
            play_id: Uuid::new_v4(),
            channel,
            crossfade,
            timestamp: Utc::now(),
        });

        if let Some(prefetch) = &self.prefetch {
            let snapshot = self.queue.snapshot().await;
            prefetch.request(snapshot.tracks(), snapshot.current_index());
        }
    }

    fn begin_ramp(
        &self,
        session: &mut PlaybackSession,
        outgoing: ChannelId,
        incoming: ChannelId,
        incoming_track: TrackId,
        outgoing_track: Option<TrackId>,
    ) {
        session.ramp_generation += 1;
        let generation = session.ramp_generation;
        let target = session.target_volume;
        let engine = self.clone_handles();
        let track_id = incoming_track.clone();
        let handle = tokio::spawn(async move {
            engine
                .run_ramp(generation, outgoing, incoming, track_id, target)
                .await;
        });
        session.ramp = Some(ActiveRamp {
            generation,
            outgoing,
            incoming,
            incoming_track,
            outgoing_track,
            handle,
        });
    }

    /// Step both channel volumes to the end of the ramp, then settle
    async fn run_ramp(
        &self,
        generation: u64,
        outgoing: ChannelId,
        incoming: ChannelId,
        incoming_track: TrackId,
        target: f32,
    ) {
        let step = self.config.step_interval().max(Duration::from_millis(1));
        let mut ticker = tokio::time::interval(step);
        ticker.tick().await;

        for k in 1..=self.fader.steps() {
            ticker.tick().await;
            let session = self.session.read().await;
            if session.ramp_generation != generation {
                return;
            }
            let (out_volume, in_volume) = self.fader.volumes_at(k, target);
            self.channel(outgoing).set_volume(out_volume);
            self.channel(incoming).set_volume(in_volume);
        }

        let mut session = self.session.write().await;
        if session.ramp_generation != generation {
            return;
        }
        if let Some(ramp) = session.ramp.take() {
            self.release_unless(ramp.outgoing_track.as_ref(), &ramp.incoming_track);
        }
        let out = self.channel(outgoing);
        out.pause();
        out.reset();
        out.set_volume(0.0);
        self.channel(incoming).set_volume(session.target_volume);
        drop(session);

        debug!("Crossfade into {} complete", incoming_track);
        self.events.emit_lossy(AmbiEvent::CrossfadeCompleted {
            incoming: incoming_track,
            channel: incoming,
            interrupted: false,
            timestamp: Utc::now(),
        });
    }

    /// Cut a running ramp short and apply its end state
    pub(super) fn finalize_ramp(&self, session: &mut PlaybackSession) {
        let Some(ramp) = session.ramp.take() else {
            return;
        };
        session.ramp_generation += 1;
        ramp.handle.abort();

        let outgoing = self.channel(ramp.outgoing);
        outgoing.pause();
        outgoing.reset();
        outgoing.set_volume(0.0);
        self.channel(ramp.incoming).set_volume(session.target_volume);
        self.release_unless(ramp.outgoing_track.as_ref(), &ramp.incoming_track);

        debug!(
            "Crossfade into {} finalized early (ramp {})",
            ramp.incoming_track, ramp.generation
        );
        self.events.emit_lossy(AmbiEvent::CrossfadeCompleted {
            incoming: ramp.incoming_track,
            channel: ramp.incoming,
            interrupted: true,
            timestamp: Utc::now(),
        });
    }

    /// Silence both channels and rest at Idle, keeping the current track
    pub(super) async fn halt(&self, reason: &str) {
        let mut session = self.session.write().await;
        self.finalize_ramp(&mut session);
        for channel in self.channels.iter() {
            channel.pause();
            channel.reset();
        }
        self.cache.release_all();
        session.advance_armed = false;
        self.set_state(&mut session, PlaybackState::Idle);
        info!("⏹ Playback idle: {}", reason);
    }

    /// Emit skip feedback for the track being left
    async fn emit_skip(&self) {
        let session = self.session.read().await;
        if session.state == PlaybackState::Idle {
            return;
        }
        let Some(track) = session.current.as_ref() else {
            return;
        };
        let channel = self.channel(session.active);
        let elapsed_secs = channel.position().as_secs_f64();
        let duration_secs = channel
            .duration()
            .map(|d| d.as_secs_f64())
            .unwrap_or(track.duration_secs);
        let early_skip =
            duration_secs > 0.0 && elapsed_secs < duration_secs * self.config.early_skip_fraction;

        debug!(
            "Skip from {} at {:.1}s of {:.1}s (early={})",
            track.id, elapsed_secs, duration_secs, early_skip
        );
        self.events.emit_lossy(AmbiEvent::TrackSkipped {
            track_id: track.id.clone(),
            early_skip,
            elapsed_secs,
            duration_secs,
            timestamp: Utc::now(),
        });
    }

    async fn cursor_and_policy(&self, snapshot: &QueueSnapshot) -> (Cursor, SelectionPolicy) {
        let session = self.session.read().await;
        let cursor = snapshot.cursor(session.current_id(), session.current_key.as_ref());
        (cursor, self.policy_of(&session))
    }

    /// Begin playing from the queue while idle
    ///
    /// Replays the last current track when there is one, otherwise starts
    /// at the queue's current entry or its first playable track.
    pub(super) async fn start_from_queue(&self) -> Result<()> {
        let _guard = self.guard().await;
        let snapshot = self.queue.snapshot().await;
        let (remembered, policy) = {
            let session = self.session.read().await;
            (session.current.clone(), self.policy_of(&session))
        };
        let start = remembered
            .filter(|t| snapshot.index_of(&t.id).is_some())
            .or_else(|| {
                snapshot
                    .current_index()
                    .and_then(|index| snapshot.track(index).cloned())
            })
            .or_else(|| {
                let tracks = snapshot.tracks();
                let mut rng = rand::thread_rng();
                selection::next_index(&tracks, Cursor::Unset, policy, &mut rng)
                    .map(|index| tracks[index].clone())
            });

        match start {
            Some(track) => {
                self.session.write().await.consecutive_failures = 0;
                self.play_locked(track, false).await
            }
            None => {
                debug!("Nothing queued to play");
                Ok(())
            }
        }
    }
}

/// Walking past a skipped candidate must move on even in repeat-one
fn fallthrough_policy(policy: SelectionPolicy) -> SelectionPolicy {
    SelectionPolicy {
        repeat: match policy.repeat {
            RepeatMode::One => RepeatMode::None,
            other => other,
        },
        ..policy
    }
}
