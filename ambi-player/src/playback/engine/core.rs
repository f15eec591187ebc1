//! Engine construction, lifecycle and direct channel controls
//!
//! Pause, resume, seek and volume act on in-memory channel state only and
//! never wait behind a transition. A pause that arrives mid-transition is
//! recorded in the session and the transition commits into Paused.

use crate::cache::{CacheManager, PrefetchWorker};
use crate::config::PlaybackConfig;
use crate::db::settings::PlaybackPreferences;
use crate::error::{Error, Result};
use crate::playback::channel::{AudioChannel, ChannelEvent};
use crate::playback::fader::Fader;
use crate::playback::selection::SelectionPolicy;
use crate::playback::session::{PlaybackSession, PlaybackStatus};
use crate::queue::QueueManager;
use ambi_common::{AmbiEvent, ChannelId, EventBus, PlaybackState, RepeatMode};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, MutexGuard, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Playback engine - drives the two channels from the queue
///
/// Transitions (play, next, previous, auto-advance) are serialized by one
/// in-flight guard; a skip that finds the guard taken is coalesced into the
/// transition already running.
pub struct PlaybackEngine {
    /// The two alternating outputs, indexed by `ChannelId::index`
    pub(super) channels: Arc<[Arc<dyn AudioChannel>; 2]>,

    pub(super) session: Arc<RwLock<PlaybackSession>>,

    /// Held for the whole of a transition
    pub(super) transition_guard: Arc<Mutex<()>>,

    pub(super) queue: QueueManager,

    pub(super) cache: Arc<CacheManager>,

    /// Background prefetcher; `None` disables prefetch requests
    pub(super) prefetch: Option<PrefetchWorker>,

    pub(super) events: Arc<EventBus>,

    pub(super) config: Arc<PlaybackConfig>,

    pub(super) fader: Fader,

    /// Sender handed to both channels; kept so the engine can route its own
    /// playback failures through the same path
    pub(super) channel_event_tx: mpsc::UnboundedSender<ChannelEvent>,

    /// Taken by the channel event handler on start
    pub(super) channel_event_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<ChannelEvent>>>>,

    pub(super) running: Arc<AtomicBool>,

    pub(super) tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl PlaybackEngine {
    /// Create an engine over two channels
    ///
    /// Channel A starts as the active channel. Call [`start`](Self::start)
    /// to begin handling channel events and auto-advance.
    pub fn new(
        channels: [Arc<dyn AudioChannel>; 2],
        queue: QueueManager,
        cache: Arc<CacheManager>,
        prefetch: Option<PrefetchWorker>,
        events: Arc<EventBus>,
        config: PlaybackConfig,
        preferences: PlaybackPreferences,
    ) -> Self {
        let (channel_event_tx, channel_event_rx) = mpsc::unbounded_channel();
        for (channel, id) in channels.iter().zip([ChannelId::A, ChannelId::B]) {
            channel.attach(id, channel_event_tx.clone());
            channel.set_volume(0.0);
        }

        let session =
            PlaybackSession::new(preferences.volume, preferences.shuffle, preferences.repeat);
        channels[ChannelId::A.index()].set_volume(session.target_volume);

        info!(
            "Playback engine created (crossfade={:.1}s/{} steps, curve={}, volume={:.2})",
            config.crossfade_seconds, config.crossfade_steps, config.fade_curve, session.target_volume
        );

        Self {
            channels: Arc::new(channels),
            session: Arc::new(RwLock::new(session)),
            transition_guard: Arc::new(Mutex::new(())),
            queue,
            cache,
            prefetch,
            events,
            fader: Fader::new(config.fade_curve, config.crossfade_steps),
            config: Arc::new(config),
            channel_event_tx,
            channel_event_rx: Arc::new(Mutex::new(Some(channel_event_rx))),
            running: Arc::new(AtomicBool::new(false)),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Start the channel event handler and the auto-advance monitor
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::InvalidInput("engine already started".to_string()));
        }
        info!("Starting playback engine");

        let mut tasks = self.tasks.lock().await;

        let self_clone = self.clone_handles();
        tasks.push(tokio::spawn(async move {
            self_clone.channel_event_handler().await;
        }));

        let self_clone = self.clone_handles();
        tasks.push(tokio::spawn(async move {
            self_clone.position_monitor().await;
        }));

        Ok(())
    }

    /// Stop background tasks and silence both channels
    pub async fn shutdown(&self) {
        info!("Stopping playback engine");
        self.running.store(false, Ordering::SeqCst);

        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        let mut session = self.session.write().await;
        self.finalize_ramp(&mut session);
        for channel in self.channels.iter() {
            channel.pause();
        }
        info!("Playback engine stopped");
    }

    pub async fn pause(&self) -> Result<()> {
        let idle_guard = self.transition_guard.try_lock().ok();
        let mut session = self.session.write().await;
        if idle_guard.is_none() {
            session.pause_requested = true;
            self.finalize_ramp(&mut session);
            self.channel(session.active).pause();
            if matches!(session.state, PlaybackState::Playing | PlaybackState::Loading) {
                self.set_state(&mut session, PlaybackState::Paused);
            }
            info!("⏸ Paused (transition in flight)");
            return Ok(());
        }
        if session.state != PlaybackState::Playing {
            debug!("pause() ignored in state {}", session.state);
            return Ok(());
        }
        self.finalize_ramp(&mut session);
        self.channel(session.active).pause();
        self.set_state(&mut session, PlaybackState::Paused);
        info!("⏸ Paused");
        Ok(())
    }

    /// Resume a paused track, or start playing from the queue when idle
    pub async fn resume(&self) -> Result<()> {
        let mut session = self.session.write().await;
        match session.state {
            PlaybackState::Paused => {
                session.pause_requested = false;
                let active = session.active;
                let channel = self.channel(active);
                channel.set_volume(session.target_volume);
                if let Err(e) = channel.play() {
                    let message = e.to_string();
                    warn!("⚠️ Could not resume channel {}: {}", active, message);
                    let _ = self
                        .channel_event_tx
                        .send(ChannelEvent::Error { channel: active, message });
                    return Ok(());
                }
                let primed = std::mem::take(&mut session.primed);
                let current = session.current.clone();
                self.set_state(&mut session, PlaybackState::Playing);
                drop(session);

                info!("▶ Resumed");
                if let (true, Some(track)) = (primed, current) {
                    self.record_start(&track, active, false).await;
                }
                Ok(())
            }
            PlaybackState::Idle => {
                drop(session);
                self.start_from_queue().await
            }
            PlaybackState::Playing | PlaybackState::Loading => Ok(()),
        }
    }

    pub async fn toggle_play(&self) -> Result<()> {
        let state = self.session.read().await.state;
        match state {
            PlaybackState::Playing => self.pause().await,
            _ => self.resume().await,
        }
    }

    /// Move the playhead of the active channel, clamped to the track length
    pub async fn seek(&self, position: Duration) -> Result<()> {
        let mut session = self.session.write().await;
        if session.current.is_none() {
            return Err(Error::InvalidInput("nothing loaded to seek".to_string()));
        }
        let channel = self.channel(session.active);
        let position = match channel.duration() {
            Some(duration) => position.min(duration),
            None => position,
        };
        channel.seek(position);
        session.advance_armed = false;
        debug!("Seeked to {:.1}s", position.as_secs_f64());
        Ok(())
    }

    /// Stop playback entirely and clear the current track
    pub async fn stop(&self) -> Result<()> {
        let _guard = self.guard().await;
        self.halt("stopped by request").await;
        {
            let mut session = self.session.write().await;
            session.current = None;
            session.current_key = None;
            session.primed = false;
        }
        self.queue.clear_current().await;
        Ok(())
    }

    /// Set the target volume
    ///
    /// Applied to the active channel at once unless a ramp owns the channel
    /// volumes, in which case it lands when the ramp completes.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        if !volume.is_finite() {
            return Err(Error::InvalidInput(format!("volume must be a number, got {volume}")));
        }
        let volume = volume.clamp(0.0, 1.0);
        {
            let mut session = self.session.write().await;
            session.target_volume = volume;
            if session.ramp.is_none() {
                self.channel(session.active).set_volume(volume);
            }
        }
        debug!("Volume set to {:.2}", volume);
        self.events.emit_lossy(AmbiEvent::VolumeChanged {
            volume,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    pub async fn volume(&self) -> f32 {
        self.session.read().await.target_volume
    }

    pub async fn set_shuffle(&self, shuffle: bool) {
        let repeat = {
            let mut session = self.session.write().await;
            session.shuffle = shuffle;
            session.repeat
        };
        info!("Shuffle {}", if shuffle { "on" } else { "off" });
        self.emit_mode_changed(shuffle, repeat);
    }

    pub async fn set_repeat(&self, repeat: RepeatMode) {
        let shuffle = {
            let mut session = self.session.write().await;
            session.repeat = repeat;
            session.shuffle
        };
        info!("Repeat mode {}", repeat);
        self.emit_mode_changed(shuffle, repeat);
    }

    pub async fn status(&self) -> PlaybackStatus {
        let session = self.session.read().await;
        let channel = self.channel(session.active);
        let duration = channel
            .duration()
            .or_else(|| session.current.as_ref().and_then(|t| t.duration()));
        PlaybackStatus {
            state: session.state,
            transition: session.transition(),
            active_channel: session.active,
            current: session.current.clone(),
            position_secs: channel.position().as_secs_f64(),
            duration_secs: duration.map(|d| d.as_secs_f64()),
            volume: session.target_volume,
            shuffle: session.shuffle,
            repeat: session.repeat,
        }
    }

    pub fn queue(&self) -> &QueueManager {
        &self.queue
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub(super) fn channel(&self, id: ChannelId) -> &Arc<dyn AudioChannel> {
        &self.channels[id.index()]
    }

    pub(super) fn policy_of(&self, session: &PlaybackSession) -> SelectionPolicy {
        SelectionPolicy {
            shuffle: session.shuffle,
            repeat: session.repeat,
            shuffle_attempts: self.config.shuffle_attempts,
        }
    }

    /// Take the transition guard, waiting for the transition in flight
    ///
    /// Any pause request left over from an earlier transition has already
    /// taken effect and is dropped.
    pub(super) async fn guard(&self) -> MutexGuard<'_, ()> {
        let guard = self.transition_guard.lock().await;
        self.session.write().await.pause_requested = false;
        guard
    }

    /// Take the transition guard without waiting
    pub(super) async fn try_guard(&self) -> Result<MutexGuard<'_, ()>> {
        let guard = self
            .transition_guard
            .try_lock()
            .map_err(|_| Error::TransitionInFlight)?;
        self.session.write().await.pause_requested = false;
        Ok(guard)
    }

    pub(super) fn set_state(&self, session: &mut PlaybackSession, new_state: PlaybackState) {
        let old_state = session.state;
        if old_state == new_state {
            return;
        }
        session.state = new_state;
        debug!("Playback state {} -> {}", old_state, new_state);
        self.events.emit_lossy(AmbiEvent::PlaybackStateChanged {
            old_state,
            new_state,
            timestamp: Utc::now(),
        });
    }

    fn emit_mode_changed(&self, shuffle: bool, repeat: RepeatMode) {
        self.events.emit_lossy(AmbiEvent::PlaybackModeChanged {
            shuffle,
            repeat,
            timestamp: Utc::now(),
        });
    }

    /// Clone the engine's handles for background tasks
    pub(super) fn clone_handles(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            session: Arc::clone(&self.session),
            transition_guard: Arc::clone(&self.transition_guard),
            queue: self.queue.clone(),
            cache: Arc::clone(&self.cache),
            prefetch: self.prefetch.clone(),
            events: Arc::clone(&self.events),
            config: Arc::clone(&self.config),
            fader: self.fader,
            channel_event_tx: self.channel_event_tx.clone(),
            channel_event_rx: Arc::clone(&self.channel_event_rx),
            running: Arc::clone(&self.running),
            tasks: Arc::clone(&self.tasks),
        }
    }
}

/// Swallow a coalesced transition; everything else is the caller's
pub(super) fn coalesce(operation: &str, result: Result<()>) -> Result<()> {
    match result {
        Err(Error::TransitionInFlight) => {
            debug!("{} coalesced into the transition in flight", operation);
            Ok(())
        }
        other => other,
    }
}
