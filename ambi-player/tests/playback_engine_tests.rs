//! Playback engine integration tests
//!
//! Every test runs on paused tokio time, so 4 s crossfade ramps and ready
//! timeouts complete instantly and deterministically.

mod helpers;

use ambi_common::{AmbiEvent, PlaybackState, Rating, RepeatMode, TrackId};
use ambi_player::config::{CacheConfig, PlaybackConfig};
use ambi_player::playback::{AudioChannel, EnqueueMode, TransitionState};
use helpers::{drain, track, Harness, MockOrigin};
use std::time::Duration;

fn abc() -> Vec<ambi_common::Track> {
    vec![track("A", 180.0), track("B", 180.0), track("C", 180.0)]
}

fn id(s: &str) -> TrackId {
    TrackId::from(s)
}

#[tokio::test(start_paused = true)]
async fn test_next_moves_forward_and_stops_at_end() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();
    assert_eq!(h.current().await, Some(id("A")));

    h.engine.next(false).await.unwrap();
    assert_eq!(h.current().await, Some(id("B")));
    h.engine.next(false).await.unwrap();
    assert_eq!(h.current().await, Some(id("C")));

    h.engine.next(false).await.unwrap();
    let status = h.engine.status().await;
    assert_eq!(status.state, PlaybackState::Idle);
    assert!(!h.channels[0].is_playing());
    assert!(!h.channels[1].is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_repeat_all_wraps_to_first() {
    let h = Harness::new(abc()).await;
    h.engine.set_repeat(RepeatMode::All).await;
    h.engine.play(h.queued("C").await, false).await.unwrap();

    h.engine.next(false).await.unwrap();
    assert_eq!(h.current().await, Some(id("A")));
    assert_eq!(h.engine.status().await.state, PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_two_skips_from_first_reach_third() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("A").await, true).await.unwrap();
    h.engine.next(true).await.unwrap();
    h.engine.next(true).await.unwrap();

    assert_eq!(h.current().await, Some(id("C")));
    h.settle().await;
    assert_eq!(h.current().await, Some(id("C")));
    assert_eq!(h.active().await.loaded(), Some(id("C")));
}

#[tokio::test(start_paused = true)]
async fn test_completed_crossfade_lands_on_exact_volumes() {
    let h = Harness::new(abc()).await;
    let mut rx = h.events.subscribe();
    h.engine.play(h.queued("A").await, false).await.unwrap();
    let outgoing = h.active().await;
    assert!(outgoing.is_playing());

    h.engine.next(true).await.unwrap();
    let incoming = h.active().await;
    assert_eq!(incoming.loaded(), Some(id("B")));
    assert_eq!(h.engine.status().await.transition, TransitionState::Crossfading);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let target = h.engine.volume().await;
    assert!(outgoing.volume() > 0.0 && outgoing.volume() < target);
    assert!(incoming.volume() > 0.0 && incoming.volume() < target);

    h.settle().await;
    assert_eq!(outgoing.volume(), 0.0);
    assert_eq!(incoming.volume(), target);
    assert!(!outgoing.is_playing());
    assert!(incoming.is_playing());
    assert_eq!(h.engine.status().await.transition, TransitionState::Idle);

    let completed: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            AmbiEvent::CrossfadeCompleted {
                incoming,
                interrupted,
                ..
            } => Some((incoming, interrupted)),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![(id("B"), false)]);
}

#[tokio::test(start_paused = true)]
async fn test_new_transition_finalizes_running_ramp() {
    let h = Harness::new(abc()).await;
    let mut rx = h.events.subscribe();
    h.engine.play(h.queued("A").await, false).await.unwrap();
    h.engine.next(true).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    h.engine.next(true).await.unwrap();
    assert_eq!(h.current().await, Some(id("C")));

    h.settle().await;
    let target = h.engine.volume().await;
    assert_eq!(h.active().await.volume(), target);
    assert_eq!(h.inactive().await.volume(), 0.0);
    assert!(!h.inactive().await.is_playing());

    let completed: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            AmbiEvent::CrossfadeCompleted {
                incoming,
                interrupted,
                ..
            } => Some((incoming, interrupted)),
            _ => None,
        })
        .collect();
    assert_eq!(completed, vec![(id("B"), true), (id("C"), false)]);
}

#[tokio::test(start_paused = true)]
async fn test_volume_change_during_ramp_lands_at_completion() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();
    h.engine.next(true).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    h.engine.set_volume(0.4).await.unwrap();
    assert_ne!(h.active().await.volume(), 0.4);

    h.settle().await;
    assert_eq!(h.active().await.volume(), 0.4);
}

#[tokio::test(start_paused = true)]
async fn test_early_skip_signal() {
    let tracks = vec![track("A", 100.0), track("B", 100.0), track("C", 100.0)];
    let h = Harness::new(tracks).await;
    let mut rx = h.events.subscribe();
    h.engine.play(h.queued("A").await, false).await.unwrap();

    h.active().await.set_position(Duration::from_secs(20));
    h.engine.next(false).await.unwrap();
    h.active().await.set_position(Duration::from_secs(40));
    h.engine.next(false).await.unwrap();

    let skips: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            AmbiEvent::TrackSkipped {
                track_id,
                early_skip,
                ..
            } => Some((track_id, early_skip)),
            _ => None,
        })
        .collect();
    assert_eq!(skips, vec![(id("A"), true), (id("B"), false)]);
}

#[tokio::test(start_paused = true)]
async fn test_disliked_tracks_are_never_current() {
    let tracks = vec![
        track("A", 180.0),
        track("B", 180.0).with_rating(Rating::Dislike),
        track("C", 180.0),
    ];
    let h = Harness::new(tracks).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();

    h.engine.next(false).await.unwrap();
    assert_eq!(h.current().await, Some(id("C")));

    h.engine.previous().await.unwrap();
    assert_eq!(h.current().await, Some(id("A")));

    h.engine.play(h.queued("B").await, false).await.unwrap();
    assert_eq!(h.current().await, Some(id("C")));
    for channel in &h.channels {
        assert!(!channel.loads().contains(&id("B")));
    }
}

#[tokio::test(start_paused = true)]
async fn test_all_disliked_stops_at_idle() {
    let tracks = vec![
        track("A", 180.0).with_rating(Rating::Dislike),
        track("B", 180.0).with_rating(Rating::Dislike),
    ];
    let h = Harness::new(tracks).await;
    h.engine.play(h.queued("A").await, true).await.unwrap();

    let status = h.engine.status().await;
    assert_eq!(status.state, PlaybackState::Idle);
    assert!(status.current.is_none());
    assert!(h.channels[0].loads().is_empty());
    assert!(h.channels[1].loads().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_load_failure_is_treated_as_end_of_track() {
    let h = Harness::new(abc()).await;
    h.fail("B");
    h.engine.play(h.queued("A").await, false).await.unwrap();

    h.engine.next(true).await.unwrap();
    assert_eq!(h.current().await, Some(id("C")));
    assert_eq!(h.engine.status().await.state, PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_every_track_failing_stops_at_idle() {
    let h = Harness::new(abc()).await;
    h.engine.set_repeat(RepeatMode::All).await;
    for t in ["A", "B", "C"] {
        h.fail(t);
    }
    h.engine.play(h.queued("A").await, false).await.unwrap();
    assert_eq!(h.engine.status().await.state, PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_slow_source_starts_after_ready_timeout() {
    let config = PlaybackConfig::default();
    let h = Harness::build(abc(), config, Duration::from_secs(30)).await;
    let started = tokio::time::Instant::now();
    h.engine.play(h.queued("A").await, false).await.unwrap();

    let waited = started.elapsed();
    assert!(waited >= Duration::from_millis(800) && waited < Duration::from_secs(2));
    assert_eq!(h.current().await, Some(id("A")));
    assert!(h.active().await.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_skips_are_coalesced() {
    let h = Harness::build(abc(), PlaybackConfig::default(), Duration::from_millis(300)).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();

    let (first, second) = tokio::join!(h.engine.next(true), h.engine.next(true));
    first.unwrap();
    second.unwrap();
    assert_eq!(h.current().await, Some(id("B")));
}

#[tokio::test(start_paused = true)]
async fn test_end_of_media_advances_without_crossfade() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();
    h.active().await.pause();
    h.active().await.emit_ended();
    h.yield_briefly().await;

    assert_eq!(h.current().await, Some(id("B")));
    assert_eq!(h.engine.status().await.transition, TransitionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_end_of_last_track_goes_idle() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("C").await, false).await.unwrap();
    h.active().await.emit_ended();
    h.yield_briefly().await;

    assert_eq!(h.engine.status().await.state, PlaybackState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_playback_error_advances() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();
    h.active().await.emit_error("decoder gave up");
    h.yield_briefly().await;

    assert_eq!(h.current().await, Some(id("B")));
}

#[tokio::test(start_paused = true)]
async fn test_events_from_inactive_channel_are_ignored() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();
    h.inactive().await.emit_ended();
    h.yield_briefly().await;

    assert_eq!(h.current().await, Some(id("A")));
}

#[tokio::test(start_paused = true)]
async fn test_proactive_crossfade_near_end() {
    let tracks = vec![track("A", 100.0), track("B", 100.0)];
    let h = Harness::new(tracks).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();

    h.active().await.set_position(Duration::from_secs(90));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.current().await, Some(id("A")));

    h.active().await.set_position(Duration::from_secs(95));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(h.current().await, Some(id("B")));
    assert_eq!(h.engine.status().await.transition, TransitionState::Crossfading);
}

#[tokio::test(start_paused = true)]
async fn test_short_track_is_not_advanced_early() {
    let tracks = vec![track("A", 4.0), track("B", 100.0)];
    let h = Harness::new(tracks).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();
    h.active().await.set_position(Duration::from_secs(3));
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(h.current().await, Some(id("A")));
}

#[tokio::test(start_paused = true)]
async fn test_previous_restarts_after_threshold() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("B").await, false).await.unwrap();
    h.active().await.set_position(Duration::from_secs(10));

    h.engine.previous().await.unwrap();
    assert_eq!(h.current().await, Some(id("B")));
    assert_eq!(h.active().await.position(), Duration::ZERO);

    h.engine.previous().await.unwrap();
    assert_eq!(h.current().await, Some(id("A")));
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();

    h.engine.pause().await.unwrap();
    assert_eq!(h.engine.status().await.state, PlaybackState::Paused);
    assert!(!h.active().await.is_playing());

    h.engine.toggle_play().await.unwrap();
    assert_eq!(h.engine.status().await.state, PlaybackState::Playing);
    assert!(h.active().await.is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_disliking_current_track_skips_it() {
    let h = Harness::new(abc()).await;
    let mut rx = h.events.subscribe();
    h.engine.play(h.queued("A").await, false).await.unwrap();

    h.engine.rate_current(Rating::Dislike).await.unwrap();
    assert_eq!(h.current().await, Some(id("B")));
    assert!(h.queued("A").await.is_disliked());

    let rated = drain(&mut rx).into_iter().any(|e| {
        matches!(
            e,
            AmbiEvent::TrackRated { ref track_id, rating: Rating::Dislike, .. } if track_id == &id("A")
        )
    });
    assert!(rated);
}

#[tokio::test(start_paused = true)]
async fn test_enqueue_starts_playback_when_idle() {
    let h = Harness::new(Vec::new()).await;
    h.engine
        .enqueue(track("X", 180.0), EnqueueMode::Last)
        .await
        .unwrap();

    assert_eq!(h.current().await, Some(id("X")));
    assert_eq!(h.engine.status().await.state, PlaybackState::Playing);

    h.engine
        .enqueue_many(vec![track("Y", 180.0), track("Z", 180.0)], EnqueueMode::Next)
        .await
        .unwrap();
    let order: Vec<_> = h.queue.get_queue().await.into_iter().map(|e| e.track.id).collect();
    assert_eq!(order, vec![id("X"), id("Y"), id("Z")]);
    assert_eq!(h.current().await, Some(id("X")));
}

#[tokio::test(start_paused = true)]
async fn test_replace_queue_plays_requested_start() {
    let h = Harness::new(abc()).await;
    h.engine
        .replace_queue(vec![track("X", 180.0), track("Y", 180.0)], Some(id("Y")))
        .await
        .unwrap();

    assert_eq!(h.current().await, Some(id("Y")));
    assert_eq!(h.queue.len().await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_restore_prepares_without_playing() {
    let h = Harness::new(abc()).await;
    h.queue.set_current(&id("B")).await.unwrap();
    let mut rx = h.events.subscribe();

    h.engine.restore().await.unwrap();
    let status = h.engine.status().await;
    assert_eq!(status.state, PlaybackState::Paused);
    assert_eq!(h.active().await.loaded(), Some(id("B")));
    assert!(!h.active().await.is_playing());

    h.engine.resume().await.unwrap();
    assert!(h.active().await.is_playing());
    let started = drain(&mut rx)
        .into_iter()
        .any(|e| matches!(e, AmbiEvent::TrackStarted { ref track_id, .. } if track_id == &id("B")));
    assert!(started);
}

#[tokio::test(start_paused = true)]
async fn test_start_records_play_and_current_flag() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("B").await, false).await.unwrap();
    h.yield_briefly().await;

    let stats = h.cache.get_stats(&id("B")).await.unwrap();
    assert_eq!(stats.play_count, 1);
    assert!(!stats.is_cached);
    assert_eq!(h.queue.current().await.map(|e| e.track.id), Some(id("B")));
}

#[tokio::test(start_paused = true)]
async fn test_stop_clears_current() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();
    h.engine.next(true).await.unwrap();

    h.engine.stop().await.unwrap();
    let status = h.engine.status().await;
    assert_eq!(status.state, PlaybackState::Idle);
    assert!(status.current.is_none());
    assert!(h.queue.current().await.is_none());
    assert!(!h.channels[0].is_playing() && !h.channels[1].is_playing());
}

#[tokio::test(start_paused = true)]
async fn test_uncached_track_streams_from_origin() {
    let h = Harness::new(abc()).await;
    let mut rx = h.events.subscribe();
    h.engine.play(h.queued("A").await, false).await.unwrap();
    let source = h.active().await.source().unwrap();
    assert!(!source.is_local());
    assert!(source.to_string().contains("id=A"));

    let started = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, AmbiEvent::TrackStarted { .. }))
        .count();
    assert_eq!(started, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shuffle_never_lands_on_disliked_track() {
    let tracks = vec![
        track("A", 180.0),
        track("B", 180.0).with_rating(Rating::Dislike),
        track("C", 180.0),
        track("D", 180.0).with_rating(Rating::Dislike),
        track("E", 180.0),
    ];
    let h = Harness::new(tracks).await;
    h.engine.set_shuffle(true).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();

    for _ in 0..20 {
        h.engine.next(false).await.unwrap();
        let current = h.current().await.unwrap();
        assert!(
            [id("A"), id("C"), id("E")].contains(&current),
            "shuffle picked {current}"
        );
    }
    for channel in &h.channels {
        assert!(!channel.loads().contains(&id("B")));
        assert!(!channel.loads().contains(&id("D")));
    }
}

#[tokio::test(start_paused = true)]
async fn test_repeat_one_replays_current_on_next() {
    let h = Harness::new(abc()).await;
    h.engine.set_repeat(RepeatMode::One).await;
    h.engine.play(h.queued("B").await, false).await.unwrap();

    h.engine.next(false).await.unwrap();
    assert_eq!(h.current().await, Some(id("B")));
    assert_eq!(h.engine.status().await.state, PlaybackState::Playing);
    let loads_of_b = h
        .channels
        .iter()
        .flat_map(|c| c.loads())
        .filter(|t| t == &id("B"))
        .count();
    assert_eq!(loads_of_b, 2);
}

#[tokio::test(start_paused = true)]
async fn test_previous_from_first_wraps_under_repeat_all() {
    let h = Harness::new(abc()).await;
    h.engine.set_repeat(RepeatMode::All).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();

    h.engine.previous().await.unwrap();
    assert_eq!(h.current().await, Some(id("C")));
    assert_eq!(h.engine.status().await.state, PlaybackState::Playing);
}

#[tokio::test(start_paused = true)]
async fn test_previous_from_first_replays_it_without_repeat() {
    let h = Harness::new(abc()).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();

    h.engine.previous().await.unwrap();
    assert_eq!(h.current().await, Some(id("A")));
    assert_eq!(h.engine.status().await.state, PlaybackState::Playing);
    let loads_of_a = h
        .channels
        .iter()
        .flat_map(|c| c.loads())
        .filter(|t| t == &id("A"))
        .count();
    assert_eq!(loads_of_a, 2);
}

#[tokio::test(start_paused = true)]
async fn test_outgoing_track_is_not_evicted_during_crossfade() {
    const MB: u64 = 1024 * 1024;
    let origin = MockOrigin::default()
        .with_size("A", 40 * MB)
        .with_size("B", 40 * MB)
        .with_size("C", 40 * MB);
    let cache_config = CacheConfig {
        budget_bytes: 100 * MB,
        default_estimate_bytes: 40 * MB,
        ..CacheConfig::default()
    };
    let h = Harness::build_with(
        abc(),
        PlaybackConfig::default(),
        Duration::ZERO,
        origin,
        cache_config,
    )
    .await;
    let (a, b) = (h.queued("A").await, h.queued("B").await);
    let report = h.cache.prefetch(&[a.clone(), b], None).await;
    assert_eq!(report.downloaded, 2);

    h.engine.play(a, false).await.unwrap();
    let outgoing = h.active().await;
    h.engine.next(true).await.unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.engine.status().await.transition, TransitionState::Crossfading);

    assert!(h.cache.ensure_space(50 * MB).await.is_err());
    assert!(h.origin.evictions().is_empty());
    assert!(outgoing.is_playing());
    assert!(h.cache.is_cached(&id("A")).await);

    h.settle().await;
    assert!(!h.cache.is_protected(&id("A")));
    assert!(h.cache.is_protected(&id("B")));
    h.cache.ensure_space(50 * MB).await.unwrap();
    assert_eq!(h.origin.evictions(), vec![id("A")]);
}

#[tokio::test(start_paused = true)]
async fn test_pause_during_transition_is_kept() {
    let h = Harness::build(abc(), PlaybackConfig::default(), Duration::from_millis(300)).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();
    let mut rx = h.events.subscribe();

    let (skipped, paused) = tokio::join!(h.engine.next(true), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.engine.pause().await
    });
    skipped.unwrap();
    paused.unwrap();

    let status = h.engine.status().await;
    assert_eq!(status.state, PlaybackState::Paused);
    assert_eq!(h.current().await, Some(id("B")));
    assert!(!h.channels[0].is_playing() && !h.channels[1].is_playing());
    let started_early = drain(&mut rx)
        .into_iter()
        .any(|e| matches!(e, AmbiEvent::TrackStarted { .. }));
    assert!(!started_early);

    h.engine.resume().await.unwrap();
    assert_eq!(h.engine.status().await.state, PlaybackState::Playing);
    assert!(h.active().await.is_playing());
    assert!(!h.inactive().await.is_playing());
    let started = drain(&mut rx)
        .into_iter()
        .any(|e| matches!(e, AmbiEvent::TrackStarted { ref track_id, .. } if track_id == &id("B")));
    assert!(started);
}

#[tokio::test(start_paused = true)]
async fn test_dislike_during_transition_still_skips() {
    let h = Harness::build(abc(), PlaybackConfig::default(), Duration::from_millis(300)).await;
    h.engine.set_repeat(RepeatMode::One).await;
    h.engine.play(h.queued("A").await, false).await.unwrap();

    let (skipped, rated) = tokio::join!(h.engine.next(true), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.engine.rate_current(Rating::Dislike).await
    });
    skipped.unwrap();
    rated.unwrap();

    assert_eq!(h.current().await, Some(id("B")));
    assert!(h.queued("A").await.is_disliked());
    assert_eq!(h.engine.status().await.state, PlaybackState::Playing);
}
