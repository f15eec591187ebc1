//! Channel event handling and proactive auto-advance

use super::core::{coalesce, PlaybackEngine};
use super::transitions::AdvanceReason;
use crate::playback::channel::ChannelEvent;
use ambi_common::{PlaybackState, TrackId};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

impl PlaybackEngine {
    /// Route end-of-media and playback errors from the channels
    pub(super) async fn channel_event_handler(&self) {
        let Some(mut rx) = self.channel_event_rx.lock().await.take() else {
            warn!("Channel event handler already running");
            return;
        };
        debug!("Channel event handler started");

        while let Some(event) = rx.recv().await {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }
            self.on_channel_event(event).await;
        }
        debug!("Channel event handler stopped");
    }

    pub(super) async fn on_channel_event(&self, event: ChannelEvent) {
        let relevant = {
            let session = self.session.read().await;
            event.channel() == session.active
                && matches!(session.state, PlaybackState::Playing | PlaybackState::Paused)
        };
        if !relevant {
            debug!("Ignoring {:?} from an inactive channel", event);
            return;
        }

        let reason = match &event {
            ChannelEvent::Ended { channel } => {
                debug!("Channel {} reached end of media", channel);
                self.session.write().await.consecutive_failures = 0;
                AdvanceReason::EndOfMedia
            }
            ChannelEvent::Error { channel, message } => {
                warn!("⚠️ Channel {} playback error: {}; advancing", channel, message);
                let failures = {
                    let mut session = self.session.write().await;
                    session.consecutive_failures += 1;
                    session.consecutive_failures
                };
                if failures >= self.queue.len().await.max(1) {
                    self.halt("every queued track failed to play").await;
                    return;
                }
                AdvanceReason::Failure
            }
        };

        let result = async {
            let _guard = self.try_guard().await?;
            self.advance(reason, false).await
        }
        .await;
        if let Err(e) = coalesce("auto-advance", result) {
            warn!("Auto-advance failed: {}", e);
        }
    }

    /// Watch the active channel and start the crossfade ahead of the end
    ///
    /// Armed once per track, and only for tracks longer than the crossfade
    /// window; shorter tracks rely on end-of-media.
    pub(super) async fn position_monitor(&self) {
        let crossfade = self.config.crossfade_duration();
        let window = crossfade + Duration::from_secs(1);
        let mut ticker = interval(self.config.position_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Auto-advance monitor started (window {:.1}s)", window.as_secs_f64());

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if crossfade.is_zero() {
                continue;
            }
            let Some(track_id) = self.due_for_advance(window).await else {
                continue;
            };

            let result = async {
                let _guard = self.try_guard().await?;
                {
                    // The track may have changed while the guard was free.
                    let mut session = self.session.write().await;
                    if session.current_id() != Some(&track_id) || session.advance_armed {
                        return Ok(());
                    }
                    session.advance_armed = true;
                }
                info!("Approaching end of {}; advancing with crossfade", track_id);
                self.advance(AdvanceReason::Proactive, true).await
            }
            .await;
            if let Err(e) = coalesce("auto-advance", result) {
                warn!("Auto-advance failed: {}", e);
            }
        }
    }

    /// The current track id when its remaining time fits the window
    async fn due_for_advance(&self, window: Duration) -> Option<TrackId> {
        let session = self.session.read().await;
        if session.state != PlaybackState::Playing || session.ramp.is_some() || session.advance_armed
        {
            return None;
        }
        let track = session.current.as_ref()?;
        let channel = self.channel(session.active);
        let duration = channel.duration().or_else(|| track.duration())?;
        if duration <= window {
            return None;
        }
        let remaining = duration.saturating_sub(channel.position());
        (remaining <= window).then(|| track.id.clone())
    }
}
