//! Integration tests for the session controller against a scripted endpoint.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;

use common::*;
use sratim::config::PlayerConfig;
use sratim::playback::{PlayerEvent, SessionState, SurfaceFault};
use sratim_common::{buffered_end, Error, MediaRef, TimeRange, TrackKind, VideoCodecFamily};

fn buffered_to(end: f64) -> impl Fn(&sratim::playback::PlayerSnapshot) -> bool {
    move |s| buffered_end(&s.buffered).is_some_and(|e| e >= end - 1e-6)
}

fn error_kind(event: &PlayerEvent) -> Option<&str> {
    match event {
        PlayerEvent::Error { kind, .. } => Some(kind.as_str()),
        _ => None,
    }
}

#[tokio::test]
async fn start_streams_into_sink() {
    let mut t = TestPlayer::new();
    let id = t.player.start(feature_film(), 0.0).await.unwrap();

    let snapshot = t.player.snapshot();
    assert_eq!(snapshot.session, Some(id));
    assert_eq!(snapshot.state, SessionState::Streaming);
    assert_eq!(snapshot.duration, Some(5400.0));
    assert_eq!(snapshot.audio_track, Some(0));

    let feed = t.next_feed().await;
    assert_eq!(feed.request.media, feature_film());
    assert_eq!(feed.request.start_secs, 0.0);
    assert_eq!(feed.request.audio_track, Some(0));

    feed.push(init_segment());
    feed.push(fragment(1, 0, 2));
    feed.push(fragment(2, 2, 2));
    t.wait_for_snapshot(buffered_to(4.0)).await;

    let ops = t.ops();
    assert_eq!(ops[0], SinkOp::Reset);
    assert_matches!(&ops[1], SinkOp::Configure(mime) if mime.starts_with("video/mp4"));
    assert_eq!(ops[2], SinkOp::SetOffset(0.0));
    assert_eq!(t.appended().len(), 3);
    assert_eq!(
        t.player.snapshot().buffered,
        vec![TimeRange::new(0.0, 4.0)]
    );
}

#[tokio::test]
async fn start_emits_lifecycle_events() {
    let mut t = TestPlayer::new();
    let id = t.player.start(feature_film(), 42.0).await.unwrap();
    let _feed = t.next_feed().await;

    let event = t
        .wait_for_event(|e| matches!(e, PlayerEvent::DescriptorLoaded { .. }))
        .await;
    assert_matches!(event, PlayerEvent::DescriptorLoaded { session, descriptor } => {
        assert_eq!(session, id);
        assert_eq!(descriptor.title.as_deref(), Some("Spirited Away"));
    });

    let event = t
        .wait_for_event(|e| matches!(e, PlayerEvent::StreamOpened { .. }))
        .await;
    assert_matches!(event, PlayerEvent::StreamOpened { requested_start, actual_start, .. } => {
        assert_eq!(requested_start, 42.0);
        assert_eq!(actual_start, None);
    });

    let recent = t.player.recent_events(100);
    let states: Vec<SessionState> = recent
        .iter()
        .filter_map(|e| match e.payload {
            PlayerEvent::StateChanged { to, .. } => Some(to),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![SessionState::Initializing, SessionState::Streaming]
    );
}

#[tokio::test]
async fn seek_aligns_to_reported_keyframe() {
    let mut t = TestPlayer::new();
    t.endpoint
        .set_keyframes(|requested| Some((requested - 1.6).max(0.0)));

    let first = t.player.start(feature_film(), 0.0).await.unwrap();
    let old = t.next_feed().await;
    old.push(init_segment());
    old.push(fragment(1, 0, 2));
    t.wait_for_snapshot(buffered_to(2.0)).await;

    let second = t.player.seek(3600.0).await.unwrap();
    assert_ne!(first, second);
    wait_until("old fetch cancelled", || old.is_cancelled()).await;

    let feed = t.next_feed().await;
    assert_eq!(feed.request.start_secs, 3600.0);
    assert_eq!(feed.request.audio_track, Some(0));

    let event = t
        .wait_for_event(|e| matches!(e, PlayerEvent::StreamOpened { session, .. } if *session == second))
        .await;
    assert_matches!(event, PlayerEvent::StreamOpened { actual_start: Some(actual), .. } => {
        assert_close(actual, 3598.4);
    });

    feed.push(init_segment());
    feed.push(fragment(1, 0, 2));
    let snapshot = t.wait_for_snapshot(buffered_to(3600.4)).await;
    assert_eq!(snapshot.session, Some(second));
    assert_eq!(snapshot.position, 3600.0);
    assert_eq!(snapshot.buffered.len(), 1);
    assert_close(snapshot.buffered[0].start, 3598.4);

    // Old media is flushed before the new offset applies.
    let ops = t.ops();
    let removed = ops
        .iter()
        .position(|op| *op == SinkOp::Remove(TimeRange::everything()))
        .expect("flush remove");
    let offset = ops
        .iter()
        .position(|op| matches!(op, SinkOp::SetOffset(o) if (o - 3598.4).abs() < 1e-6))
        .expect("new offset");
    assert!(removed < offset);
}

#[tokio::test]
async fn seek_is_clamped_to_media_end() {
    let mut t = TestPlayer::new();
    t.player.start(feature_film(), 0.0).await.unwrap();
    let _old = t.next_feed().await;

    t.player.seek(99_999.0).await.unwrap();
    let feed = t.next_feed().await;
    assert_close(feed.request.start_secs, 5399.9);

    t.player.seek(-5.0).await.unwrap();
    let feed = t.next_feed().await;
    assert_eq!(feed.request.start_secs, 0.0);

    assert_matches!(
        t.player.seek(f64::NAN).await,
        Err(Error::InvalidInput(_))
    );
}

#[tokio::test]
async fn stale_chunks_are_never_appended() {
    let mut t = TestPlayer::new();
    t.player.start(feature_film(), 0.0).await.unwrap();
    let old = t.next_feed().await;
    old.push(init_segment());
    old.push(fragment(1, 0, 2));
    t.wait_for_snapshot(buffered_to(2.0)).await;

    // Pushed right before the seek: may still be in flight when the
    // session changes.
    let stale = fragment(99, 2, 2);
    old.push(stale.clone());
    old.push(fragment(100, 4, 2));
    t.player.seek(600.0).await.unwrap();

    let feed = t.next_feed().await;
    feed.push(init_segment());
    feed.push(fragment(1, 0, 2));
    t.wait_for_snapshot(buffered_to(602.0)).await;

    let ops = t.ops();
    let removed = ops
        .iter()
        .position(|op| *op == SinkOp::Remove(TimeRange::everything()))
        .expect("flush remove");
    assert!(ops[removed..]
        .iter()
        .all(|op| *op != SinkOp::Append(stale.clone())));
    assert!(t
        .player
        .snapshot()
        .buffered
        .iter()
        .all(|r| r.start >= 600.0));
}

#[tokio::test]
async fn audio_switch_restarts_at_position() {
    let mut t = TestPlayer::new();
    let first = t.player.start(feature_film(), 0.0).await.unwrap();
    let old = t.next_feed().await;

    t.player.report_position(12.5).await.unwrap();
    let second = t.player.switch_audio_track(1).await.unwrap();
    assert_ne!(first, second);

    let feed = t.next_feed().await;
    assert_eq!(feed.request.start_secs, 12.5);
    assert_eq!(feed.request.audio_track, Some(1));
    wait_until("old fetch cancelled", || old.is_cancelled()).await;

    // The descriptor is cached.
    assert_eq!(t.endpoint.describe_calls(), 1);

    let snapshot = t.player.snapshot();
    assert_eq!(snapshot.audio_track, Some(1));
    assert_eq!(snapshot.state, SessionState::Streaming);

    t.wait_for_event(|e| {
        matches!(e, PlayerEvent::StateChanged { to: SessionState::TrackSwitching, .. })
    })
    .await;
}

#[tokio::test]
async fn audio_switch_rejects_unknown_track() {
    let mut t = TestPlayer::new();
    let id = t.player.start(feature_film(), 0.0).await.unwrap();
    let _feed = t.next_feed().await;

    assert_matches!(
        t.player.switch_audio_track(7).await,
        Err(Error::InvalidTrack { kind: TrackKind::Audio, index: 7 })
    );

    let snapshot = t.player.snapshot();
    assert_eq!(snapshot.session, Some(id));
    assert_eq!(snapshot.state, SessionState::Streaming);
    assert_eq!(t.endpoint.requests().len(), 1);
}

#[tokio::test]
async fn start_with_audio_track_opens_one_stream() {
    let mut t = TestPlayer::new();
    let id = t
        .player
        .start_with_audio_track(feature_film(), 30.0, Some(1))
        .await
        .unwrap();

    let feed = t.next_feed().await;
    assert_eq!(feed.request.start_secs, 30.0);
    assert_eq!(feed.request.audio_track, Some(1));
    assert_eq!(t.endpoint.requests().len(), 1);

    let snapshot = t.player.snapshot();
    assert_eq!(snapshot.session, Some(id));
    assert_eq!(snapshot.audio_track, Some(1));

    assert_matches!(
        t.player
            .start_with_audio_track(feature_film(), 0.0, Some(4))
            .await,
        Err(Error::InvalidTrack { kind: TrackKind::Audio, index: 4 })
    );
    assert_eq!(t.endpoint.requests().len(), 1);
}

#[tokio::test]
async fn flow_pauses_at_ceiling_and_resumes() {
    let config = PlayerConfig {
        look_ahead_ceiling_secs: 10.0,
        fetch_channel_capacity: 2,
        ..test_config()
    };
    let mut t = TestPlayer::with_config(config, 64 * 1024 * 1024);
    t.player.start(feature_film(), 0.0).await.unwrap();
    let feed = t.next_feed().await;

    let total = 41;
    feed.push(init_segment());
    for i in 1..total {
        feed.push(fragment(i as u32, i as u64 - 1, 1));
    }

    let event = t
        .wait_for_event(|e| matches!(e, PlayerEvent::FlowPaused { .. }))
        .await;
    assert_matches!(event, PlayerEvent::FlowPaused { buffered_ahead, .. } => {
        assert!(buffered_ahead >= 10.0);
    });
    t.wait_for_snapshot(|s| s.fetch_paused).await;

    // Let in-flight chunks settle; pulls stop well short of the body.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let held = feed.pulled();
    assert!(held < total, "pulled {held} of {total} while paused");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(feed.pulled(), held);

    // Playing past the buffered content drops the look-ahead.
    t.player.report_position(30.0).await.unwrap();
    t.wait_for_event(|e| matches!(e, PlayerEvent::FlowResumed { .. }))
        .await;
    wait_until("fetch resumes pulling", || feed.pulled() > held).await;
}

#[tokio::test]
async fn recurring_decode_faults_are_unrecoverable() {
    let mut t = TestPlayer::new();
    let id = t.player.start(feature_film(), 0.0).await.unwrap();
    let _feed = t.next_feed().await;

    t.player
        .report_fault(SurfaceFault::Decode("corrupt slice".into()))
        .await
        .unwrap();
    let event = t
        .wait_for_event(|e| matches!(e, PlayerEvent::Recovering { .. }))
        .await;
    assert_matches!(event, PlayerEvent::Recovering { session, from, to } => {
        assert_eq!(session, id);
        assert_eq!(from, 0.0);
        assert_eq!(to, 2.0);
    });
    let restarted = t.next_feed().await;
    assert_eq!(restarted.request.start_secs, 2.0);

    t.player
        .report_fault(SurfaceFault::Decode("corrupt slice".into()))
        .await
        .unwrap();
    let event = t.wait_for_event(|e| error_kind(e).is_some()).await;
    assert_eq!(error_kind(&event), Some("playback_unrecoverable"));
    t.wait_for_snapshot(|s| s.state == SessionState::Error).await;
    wait_until("fetch cancelled", || restarted.is_cancelled()).await;
}

#[tokio::test]
async fn spaced_decode_faults_each_restart_once() {
    let mut t = TestPlayer::new();
    let id = t.player.start(feature_film(), 0.0).await.unwrap();
    let _feed = t.next_feed().await;
    tokio::time::pause();

    t.player
        .report_fault(SurfaceFault::Decode("corrupt slice".into()))
        .await
        .unwrap();
    let event = t
        .wait_for_event(|e| matches!(e, PlayerEvent::Recovering { .. }))
        .await;
    assert_matches!(event, PlayerEvent::Recovering { session, to, .. } => {
        assert_eq!(session, id);
        assert_eq!(to, 2.0);
    });
    let first = t.next_feed().await;
    assert_eq!(first.request.start_secs, 2.0);

    // Past the cool-down the next fault is a fresh one.
    tokio::time::advance(Duration::from_secs(6)).await;
    t.player
        .report_fault(SurfaceFault::Decode("corrupt slice".into()))
        .await
        .unwrap();
    let event = t
        .wait_for_event(|e| matches!(e, PlayerEvent::Recovering { .. }))
        .await;
    assert_matches!(event, PlayerEvent::Recovering { from, to, .. } => {
        assert_eq!(from, 2.0);
        assert_eq!(to, 4.0);
    });
    let second = t.next_feed().await;
    assert_eq!(second.request.start_secs, 4.0);
    wait_until("first restart cancelled", || first.is_cancelled()).await;

    let restarts = t
        .player
        .recent_events(100)
        .iter()
        .filter(|e| matches!(e.payload, PlayerEvent::Recovering { .. }))
        .count();
    assert_eq!(restarts, 2);
    assert_eq!(t.endpoint.requests().len(), 3);
    assert_eq!(t.player.snapshot().state, SessionState::Streaming);
}

#[tokio::test]
async fn network_fault_is_fatal() {
    let mut t = TestPlayer::new();
    t.player.start(feature_film(), 0.0).await.unwrap();
    let feed = t.next_feed().await;

    t.player
        .report_fault(SurfaceFault::Network("connection lost".into()))
        .await
        .unwrap();
    let event = t.wait_for_event(|e| error_kind(e).is_some()).await;
    assert_eq!(error_kind(&event), Some("playback_fault"));
    t.wait_for_snapshot(|s| s.state == SessionState::Error).await;
    wait_until("fetch cancelled", || feed.is_cancelled()).await;

    assert_matches!(t.player.seek(10.0).await, Err(Error::InvalidState(_)));
    assert_matches!(
        t.player.switch_subtitle_track(Some(0)).await,
        Err(Error::InvalidState(_))
    );

    // A new start recovers from the error state.
    t.player.start(feature_film(), 0.0).await.unwrap();
    assert_eq!(t.player.snapshot().state, SessionState::Streaming);
}

#[tokio::test]
async fn unsupported_codec_fails_start() {
    let mut t = TestPlayer::new();
    let media = MediaRef::new("Films/Baraka (1992)/Baraka.webm").with_library("films");
    t.endpoint
        .insert(media.clone(), descriptor_with_codec(VideoCodecFamily::Other));

    assert_matches!(
        t.player.start(media, 0.0).await,
        Err(Error::UnsupportedFormat(_))
    );
    let event = t.wait_for_event(|e| error_kind(e).is_some()).await;
    assert_eq!(error_kind(&event), Some("unsupported_format"));
    assert_eq!(t.player.snapshot().state, SessionState::Error);
    assert!(t.endpoint.requests().is_empty());
}

#[tokio::test]
async fn missing_metadata_fails_start() {
    let mut t = TestPlayer::new();
    let media = MediaRef::new("Films/Missing.mkv").with_library("films");

    assert_matches!(
        t.player.start(media, 0.0).await,
        Err(Error::MetadataUnavailable(_))
    );
    let event = t.wait_for_event(|e| error_kind(e).is_some()).await;
    assert_eq!(error_kind(&event), Some("metadata_unavailable"));
    assert!(t.endpoint.requests().is_empty());
}

#[tokio::test]
async fn stream_open_failure_fails_session() {
    let mut t = TestPlayer::new();
    t.endpoint.fail_open("stream returned 503 Service Unavailable");

    t.player.start(feature_film(), 0.0).await.unwrap();
    let event = t.wait_for_event(|e| error_kind(e).is_some()).await;
    assert_matches!(event, PlayerEvent::Error { kind, message, .. } => {
        assert_eq!(kind, "fetch_failed");
        assert!(message.contains("503"));
    });
    t.wait_for_snapshot(|s| s.state == SessionState::Error).await;
}

#[tokio::test]
async fn body_failure_fails_session() {
    let mut t = TestPlayer::new();
    t.player.start(feature_film(), 0.0).await.unwrap();
    let feed = t.next_feed().await;
    feed.push(init_segment());
    feed.push(fragment(1, 0, 2));
    t.wait_for_snapshot(buffered_to(2.0)).await;

    feed.fail("connection reset by peer");
    let event = t.wait_for_event(|e| error_kind(e).is_some()).await;
    assert_eq!(error_kind(&event), Some("fetch_failed"));
    let snapshot = t.wait_for_snapshot(|s| s.state == SessionState::Error).await;
    assert_eq!(snapshot.queued_chunks, 0);
    assert!(!snapshot.fetch_paused);
}

#[tokio::test]
async fn exhausted_stream_ends_then_seeks_again() {
    let mut t = TestPlayer::new();
    let id = t.player.start(feature_film(), 0.0).await.unwrap();
    let feed = t.next_feed().await;
    feed.push(init_segment());
    for i in 0..3 {
        feed.push(fragment(i + 1, u64::from(i) * 2, 2));
    }
    feed.finish();

    let event = t
        .wait_for_event(|e| matches!(e, PlayerEvent::Ended { .. }))
        .await;
    assert_matches!(event, PlayerEvent::Ended { session } if session == id);
    t.wait_for_snapshot(|s| s.state == SessionState::Ended).await;

    let ops = t.ops();
    assert_eq!(ops.last(), Some(&SinkOp::EndOfStream));
    assert_eq!(t.appended().len(), 4);

    // Seeking back from the end starts a new stream.
    let next = t.player.seek(1.0).await.unwrap();
    assert_ne!(next, id);
    let feed = t.next_feed().await;
    assert_eq!(feed.request.start_secs, 1.0);
    feed.push(init_segment());
    feed.push(fragment(1, 0, 2));
    let snapshot = t.wait_for_snapshot(buffered_to(3.0)).await;
    assert_eq!(snapshot.state, SessionState::Streaming);
    assert_eq!(snapshot.session, Some(next));
}

#[tokio::test]
async fn subtitle_switch_does_not_restart_stream() {
    let mut t = TestPlayer::new();
    t.endpoint
        .set_subtitle(0, webvtt("Welcome to the spirit world"), Duration::ZERO);
    let id = t.player.start(feature_film(), 0.0).await.unwrap();
    let _feed = t.next_feed().await;

    t.player.switch_subtitle_track(Some(0)).await.unwrap();
    let event = t
        .wait_for_event(|e| matches!(e, PlayerEvent::SubtitleTrack { .. }))
        .await;
    assert_matches!(event, PlayerEvent::SubtitleTrack { session, index: Some(0), text: Some(text) } => {
        assert_eq!(session, id);
        assert!(text.contains("spirit world"));
    });

    let snapshot = t.player.snapshot();
    assert_eq!(snapshot.session, Some(id));
    assert_eq!(snapshot.subtitle_track, Some(0));
    assert_eq!(t.endpoint.requests().len(), 1);
    assert!(t.feeds.try_recv().is_err());

    t.player.switch_subtitle_track(None).await.unwrap();
    t.wait_for_event(|e| {
        matches!(e, PlayerEvent::SubtitleTrack { index: None, text: None, .. })
    })
    .await;
    assert_eq!(t.player.snapshot().subtitle_track, None);

    assert_matches!(
        t.player.switch_subtitle_track(Some(5)).await,
        Err(Error::InvalidTrack { kind: TrackKind::Subtitle, index: 5 })
    );
}

#[tokio::test]
async fn superseded_subtitle_is_discarded() {
    let mut t = TestPlayer::new();
    t.endpoint
        .set_subtitle(0, webvtt("slow"), Duration::from_millis(300));
    t.endpoint
        .set_subtitle(1, webvtt("fast"), Duration::ZERO);
    t.player.start(feature_film(), 0.0).await.unwrap();
    let _feed = t.next_feed().await;

    t.player.switch_subtitle_track(Some(0)).await.unwrap();
    t.player.switch_subtitle_track(Some(1)).await.unwrap();
    t.wait_for_event(|e| matches!(e, PlayerEvent::SubtitleTrack { index: Some(1), .. }))
        .await;

    tokio::time::sleep(Duration::from_millis(400)).await;
    let late = t.player.recent_events(100).into_iter().any(|e| {
        matches!(e.payload, PlayerEvent::SubtitleTrack { index: Some(0), .. })
    });
    assert!(!late, "superseded subtitle text was delivered");
    assert_eq!(t.player.snapshot().subtitle_track, Some(1));
}

#[tokio::test]
async fn subtitle_failure_is_a_warning() {
    let mut t = TestPlayer::new();
    let id = t.player.start(feature_film(), 0.0).await.unwrap();
    let _feed = t.next_feed().await;

    t.player.switch_subtitle_track(Some(1)).await.unwrap();
    let event = t
        .wait_for_event(|e| matches!(e, PlayerEvent::Warning { .. }))
        .await;
    assert_matches!(event, PlayerEvent::Warning { session: Some(session), message } => {
        assert_eq!(session, id);
        assert!(message.contains("subtitle track 1"));
    });
    assert_eq!(t.player.snapshot().state, SessionState::Streaming);
}

#[tokio::test]
async fn start_replaces_previous_session() {
    let mut t = TestPlayer::new();
    let first = t.player.start(feature_film(), 0.0).await.unwrap();
    let old = t.next_feed().await;
    old.push(init_segment());
    old.push(fragment(1, 0, 2));
    t.wait_for_snapshot(buffered_to(2.0)).await;

    let second = t.player.start(feature_film(), 100.0).await.unwrap();
    assert_ne!(first, second);
    wait_until("old fetch cancelled", || old.is_cancelled()).await;

    let feed = t.next_feed().await;
    assert_eq!(feed.request.start_secs, 100.0);

    let resets = t.ops().iter().filter(|op| **op == SinkOp::Reset).count();
    assert_eq!(resets, 2);
    let snapshot = t.player.snapshot();
    assert_eq!(snapshot.session, Some(second));
    assert!(snapshot.buffered.is_empty());
}

#[tokio::test]
async fn full_sink_drops_chunk_with_warning() {
    let capacity = fragment(1, 0, 1).len() as u64 * 2 + 10;
    let mut t = TestPlayer::with_config(test_config(), capacity);
    t.player.start(feature_film(), 0.0).await.unwrap();
    let feed = t.next_feed().await;

    feed.push(init_segment());
    feed.push(fragment(1, 0, 1));
    feed.push(fragment(2, 1, 1));
    feed.push(fragment(3, 2, 1));

    let event = t
        .wait_for_event(|e| matches!(e, PlayerEvent::Warning { .. }))
        .await;
    assert_matches!(event, PlayerEvent::Warning { message, .. } => {
        assert!(message.contains("sink full"));
    });

    // Nothing is older than the retention window, so nothing was trimmed.
    let snapshot = t.player.snapshot();
    assert_eq!(snapshot.buffered, vec![TimeRange::new(0.0, 2.0)]);
    assert_eq!(snapshot.state, SessionState::Streaming);
    assert!(!t.ops().iter().any(|op| matches!(op, SinkOp::Remove(_))));
}

#[tokio::test]
async fn dropped_partial_fragment_does_not_fail_session() {
    let capacity = fragment(1, 0, 1).len() as u64 * 2 + 10;
    let mut t = TestPlayer::with_config(test_config(), capacity);
    t.player.start(feature_film(), 0.0).await.unwrap();
    let feed = t.next_feed().await;

    feed.push(init_segment());
    feed.push(fragment(1, 0, 1));
    feed.push(fragment(2, 1, 1));
    t.wait_for_snapshot(buffered_to(2.0)).await;

    // Body chunks need not line up with boxes: the first half of fragment 3
    // does not fit and is dropped.
    let third = fragment(3, 2, 1);
    let (head, tail) = (third.slice(..third.len() / 2), third.slice(third.len() / 2..));
    feed.push(head.clone());
    t.wait_for_event(|e| matches!(e, PlayerEvent::Warning { .. }))
        .await;
    assert!(t.ops().contains(&SinkOp::Discard(head)));

    // Once played content can be trimmed, the rest of the stream fits again.
    t.player.report_position(40.0).await.unwrap();
    feed.push(tail);
    feed.push(fragment(4, 3, 1));
    let snapshot = t
        .wait_for_snapshot(|s| s.buffered == vec![TimeRange::new(3.0, 4.0)])
        .await;
    assert_eq!(snapshot.state, SessionState::Streaming);
    assert!(t
        .player
        .recent_events(100)
        .iter()
        .all(|e| error_kind(&e.payload).is_none()));
}

#[tokio::test]
async fn commands_fail_after_shutdown() {
    let mut t = TestPlayer::new();
    t.player.start(feature_film(), 0.0).await.unwrap();
    let feed = t.next_feed().await;

    t.player.shutdown().await.unwrap();
    wait_until("fetch cancelled", || feed.is_cancelled()).await;

    assert_matches!(t.player.seek(5.0).await, Err(Error::InvalidState(_)));
    assert_matches!(
        t.player.report_position(1.0).await,
        Err(Error::InvalidState(_))
    );
}
