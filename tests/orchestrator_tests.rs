// End-to-end tests for VoiceInputOrchestrator against fake capture and
// channel collaborators, on tokio's paused clock.

mod common;

use common::{wait_for, FakeChannel, FakePlatform};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use station_voice::channel::{ChannelEvent, ClientMessage, EventKind, Route};
use station_voice::{
    AudioCaptureSession, CaptureConfig, DisplayTimings, RecognizedStations, VoiceInputCallbacks,
    VoiceInputError, VoiceInputOrchestrator, VoiceInputSnapshot, VoiceInputState,
};
use tokio::time::Instant;

struct Harness {
    orchestrator: VoiceInputOrchestrator,
    platform: Arc<FakePlatform>,
    channel: Arc<FakeChannel>,
    stations: Arc<Mutex<Vec<(String, String)>>>,
    routes: Arc<Mutex<Vec<Vec<Route>>>>,
}

fn harness_with(
    platform: Arc<FakePlatform>,
    channel: Arc<FakeChannel>,
    config: CaptureConfig,
) -> Harness {
    let stations = Arc::new(Mutex::new(Vec::new()));
    let routes = Arc::new(Mutex::new(Vec::new()));

    let callbacks = VoiceInputCallbacks {
        on_stations_recognized: Some({
            let stations = Arc::clone(&stations);
            Arc::new(move |origin: &str, destination: &str| {
                stations
                    .lock()
                    .unwrap()
                    .push((origin.to_string(), destination.to_string()));
            })
        }),
        on_route_calculated: Some({
            let routes = Arc::clone(&routes);
            Arc::new(move |calculated: &[Route]| {
                routes.lock().unwrap().push(calculated.to_vec());
            })
        }),
    };

    let capture_platform: Arc<FakePlatform> = Arc::clone(&platform);
    let capture = Arc::new(AudioCaptureSession::new(config, capture_platform));
    let shared_channel: Arc<FakeChannel> = Arc::clone(&channel);
    let orchestrator = VoiceInputOrchestrator::new(
        capture,
        shared_channel,
        DisplayTimings::default(),
        callbacks,
    );

    Harness {
        orchestrator,
        platform,
        channel,
        stations,
        routes,
    }
}

fn harness() -> Harness {
    harness_with(
        FakePlatform::new(),
        FakeChannel::new(true),
        CaptureConfig::default(),
    )
}

/// Start a cycle and wait until audio is being captured
async fn record(h: &Harness) -> tokio::sync::watch::Receiver<VoiceInputSnapshot> {
    let mut states = h.orchestrator.subscribe();
    let snapshot = h.orchestrator.start_recording().await;
    assert_eq!(snapshot.state, VoiceInputState::Requesting);
    wait_for(&mut states, VoiceInputState::Recording).await;

    // `recording` is published before the device is opened
    tokio::time::sleep(Duration::from_millis(10)).await;
    states
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_platform_fails_without_touching_the_channel() {
    let h = harness_with(
        FakePlatform::unsupported(),
        FakeChannel::new(true),
        CaptureConfig::default(),
    );
    assert!(!h.orchestrator.check_support());

    let snapshot = h.orchestrator.start_recording().await;

    assert_eq!(snapshot.state, VoiceInputState::Error);
    assert_eq!(
        snapshot.error_message,
        Some(VoiceInputError::UnsupportedPlatform.to_string())
    );
    assert_eq!(h.channel.connectivity_checks(), 0);
    assert!(h.channel.sent().is_empty());
    assert_eq!(h.platform.opened_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_channel_fails_without_asking_permission() {
    let h = harness_with(
        FakePlatform::new(),
        FakeChannel::new(false),
        CaptureConfig::default(),
    );

    let snapshot = h.orchestrator.start_recording().await;

    assert_eq!(snapshot.state, VoiceInputState::Error);
    assert_eq!(
        snapshot.error_message,
        Some(VoiceInputError::Connectivity.to_string())
    );
    assert_eq!(h.platform.opened_streams(), 0);

    // Error is shown for five seconds, then cleared
    let mut states = h.orchestrator.subscribe();
    let entered = Instant::now();
    let idle = wait_for(&mut states, VoiceInputState::Idle).await;
    assert_eq!(idle, VoiceInputSnapshot::default());
    assert!(entered.elapsed() >= Duration::from_millis(5000));
    assert!(entered.elapsed() < Duration::from_millis(5100));
}

#[tokio::test(start_paused = true)]
async fn test_successful_cycle_recognizes_stations() {
    let h = harness();
    let mut states = record(&h).await;

    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(h.orchestrator.snapshot().recording_duration_ms >= 1000);

    let snapshot = h.orchestrator.stop_recording().await;
    assert_eq!(snapshot.state, VoiceInputState::Processing);
    assert_eq!(h.platform.open_streams(), 0);

    let sent = h.channel.sent();
    assert_eq!(sent.len(), 1);
    let ClientMessage::VoiceInput {
        audio,
        format,
        sample_rate,
    } = &sent[0];
    assert!(!audio.is_empty());
    assert_eq!(format, "wav");
    assert_eq!(*sample_rate, 16000);

    h.channel.emit(ChannelEvent::TranscriptionStarted {
        message: "음성 인식 중...".into(),
    });
    wait_for(&mut states, VoiceInputState::Transcribing).await;

    h.channel.emit(ChannelEvent::TranscriptionComplete {
        transcribed_text: "사당역에서 강남역까지".into(),
        confidence: 0.93,
    });
    let recognizing = wait_for(&mut states, VoiceInputState::Recognizing).await;
    assert_eq!(
        recognizing.transcribed_text.as_deref(),
        Some("사당역에서 강남역까지")
    );
    assert_eq!(recognizing.confidence, Some(0.93));

    h.channel.emit(ChannelEvent::StationsRecognized {
        origin: "사당".into(),
        destination: "강남".into(),
    });
    let success = wait_for(&mut states, VoiceInputState::Success).await;
    let entered = Instant::now();
    assert_eq!(
        success.recognized_stations,
        Some(RecognizedStations {
            origin: "사당".into(),
            destination: "강남".into(),
        })
    );
    assert_eq!(
        *h.stations.lock().unwrap(),
        vec![("사당".to_string(), "강남".to_string())]
    );

    let idle = wait_for(&mut states, VoiceInputState::Idle).await;
    assert_eq!(idle, VoiceInputSnapshot::default());
    assert!(entered.elapsed() >= Duration::from_millis(3000));
    assert!(entered.elapsed() < Duration::from_millis(3100));
}

#[tokio::test(start_paused = true)]
async fn test_backend_error_mid_cycle_releases_the_device() {
    let h = harness();
    let mut states = record(&h).await;
    assert_eq!(h.platform.open_streams(), 1);

    h.channel.emit(ChannelEvent::Error {
        message: "인식 실패".into(),
    });
    let error = wait_for(&mut states, VoiceInputState::Error).await;
    let entered = Instant::now();
    assert_eq!(error.error_message.as_deref(), Some("인식 실패"));

    // Let the driver finish the effects of the transition it just published
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.platform.open_streams(), 0);
    assert!(h.channel.sent().is_empty());

    // Subscriptions survive the error
    for kind in EventKind::ALL {
        assert_eq!(h.channel.subscriber_count(kind), 1);
    }

    wait_for(&mut states, VoiceInputState::Idle).await;
    assert!(entered.elapsed() >= Duration::from_millis(5000));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_recording_sends_nothing() {
    let h = harness();
    record(&h).await;
    tokio::time::sleep(Duration::from_millis(700)).await;

    let snapshot = h.orchestrator.cancel_recording().await;

    assert_eq!(snapshot, VoiceInputSnapshot::default());
    assert_eq!(h.platform.open_streams(), 0);

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert!(h.channel.sent().is_empty());
    assert_eq!(h.orchestrator.snapshot(), VoiceInputSnapshot::default());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_safe_from_every_state() {
    let h = harness();

    h.orchestrator.cancel_recording().await;
    h.orchestrator.cancel_recording().await;
    assert_eq!(h.orchestrator.snapshot().state, VoiceInputState::Idle);

    let snapshot = h.orchestrator.start_recording().await;
    assert_eq!(snapshot.state, VoiceInputState::Requesting);
    let snapshot = h.orchestrator.cancel_recording().await;
    assert_eq!(snapshot.state, VoiceInputState::Idle);

    // The permission probe may still finish; it must not revive the cycle
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.orchestrator.snapshot().state, VoiceInputState::Idle);
    assert_eq!(h.platform.open_streams(), 0);
}

/// Record, stop, and drive the backend events until `target` is reached
async fn advance_to(h: &Harness, target: VoiceInputState) {
    let mut states = record(h).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    h.orchestrator.stop_recording().await;
    wait_for(&mut states, VoiceInputState::Processing).await;
    if target == VoiceInputState::Processing {
        return;
    }

    h.channel.emit(ChannelEvent::TranscriptionStarted {
        message: "working".to_string(),
    });
    wait_for(&mut states, VoiceInputState::Transcribing).await;
    if target == VoiceInputState::Transcribing {
        return;
    }

    h.channel.emit(ChannelEvent::StationsRecognized {
        origin: "사당".to_string(),
        destination: "강남".to_string(),
    });
    wait_for(&mut states, VoiceInputState::Success).await;
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_awaiting_the_backend_drops_late_events() {
    for target in [VoiceInputState::Processing, VoiceInputState::Transcribing] {
        let h = harness();
        advance_to(&h, target).await;
        assert_eq!(h.orchestrator.snapshot().state, target);

        let snapshot = h.orchestrator.cancel_recording().await;
        assert_eq!(snapshot, VoiceInputSnapshot::default());

        h.channel.emit(ChannelEvent::StationsRecognized {
            origin: "사당".to_string(),
            destination: "강남".to_string(),
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.orchestrator.snapshot(), VoiceInputSnapshot::default());
        assert!(h.stations.lock().unwrap().is_empty(), "from {}", target);
        assert_eq!(h.platform.open_streams(), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_from_success_clears_the_result_and_its_revert() {
    let h = harness();
    advance_to(&h, VoiceInputState::Success).await;
    assert_eq!(h.stations.lock().unwrap().len(), 1);

    let snapshot = h.orchestrator.cancel_recording().await;
    assert_eq!(snapshot, VoiceInputSnapshot::default());

    // A repeated recognition after the cancel is stale
    h.channel.emit(ChannelEvent::StationsRecognized {
        origin: "교대".to_string(),
        destination: "잠실".to_string(),
    });
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(h.orchestrator.snapshot(), VoiceInputSnapshot::default());
    assert_eq!(h.stations.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_is_reported() {
    let platform = FakePlatform::new();
    platform.deny_permission();
    let h = harness_with(platform, FakeChannel::new(true), CaptureConfig::default());
    let mut states = h.orchestrator.subscribe();

    h.orchestrator.start_recording().await;
    let error = wait_for(&mut states, VoiceInputState::Error).await;

    assert_eq!(
        error.error_message,
        Some(VoiceInputError::PermissionDenied.to_string())
    );
    assert_eq!(h.platform.open_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_duration_cap_stops_and_sends() {
    let config = CaptureConfig {
        max_duration_ms: 1000,
        ..CaptureConfig::default()
    };
    let h = harness_with(FakePlatform::new(), FakeChannel::new(true), config);
    let mut states = record(&h).await;

    let processing = wait_for(&mut states, VoiceInputState::Processing).await;
    assert!(processing.recording_duration_ms >= 900);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.channel.sent().len(), 1);
    assert_eq!(h.platform.open_streams(), 0);

    // A late stop from the user is a no-op
    let snapshot = h.orchestrator.stop_recording().await;
    assert_eq!(snapshot.state, VoiceInputState::Processing);
    assert_eq!(h.channel.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_silent_recording_ends_in_error() {
    let h = harness_with(
        FakePlatform::with_frame_samples(0),
        FakeChannel::new(true),
        CaptureConfig::default(),
    );
    record(&h).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    let snapshot = h.orchestrator.stop_recording().await;

    assert_eq!(snapshot.state, VoiceInputState::Error);
    assert!(snapshot
        .error_message
        .unwrap()
        .starts_with("no speech detected"));
    assert!(h.channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_connection_lost_before_send_is_an_error() {
    let h = harness();
    record(&h).await;
    tokio::time::sleep(Duration::from_millis(500)).await;

    h.channel.set_connected(false);
    let snapshot = h.orchestrator.stop_recording().await;

    assert_eq!(snapshot.state, VoiceInputState::Error);
    assert_eq!(
        snapshot.error_message,
        Some(VoiceInputError::Connectivity.to_string())
    );
    assert!(h.channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_stations_without_transcription_still_succeed() {
    let h = harness();
    let mut states = record(&h).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    h.orchestrator.stop_recording().await;

    h.channel.emit(ChannelEvent::StationsRecognized {
        origin: "서울".into(),
        destination: "부산".into(),
    });
    let success = wait_for(&mut states, VoiceInputState::Success).await;

    assert_eq!(success.transcribed_text, None);
    assert_eq!(h.stations.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_routes_are_forwarded_without_changing_state() {
    let h = harness();
    let routes = vec![serde_json::json!({"line": "2호선", "minutes": 14})];

    h.channel.emit(ChannelEvent::RouteCalculated {
        routes: routes.clone(),
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(*h.routes.lock().unwrap(), vec![routes]);
    assert_eq!(h.orchestrator.snapshot(), VoiceInputSnapshot::default());
}

#[tokio::test(start_paused = true)]
async fn test_stray_events_in_idle_are_ignored() {
    let h = harness();

    h.channel.emit(ChannelEvent::TranscriptionStarted {
        message: String::new(),
    });
    h.channel.emit(ChannelEvent::StationsRecognized {
        origin: "a".into(),
        destination: "b".into(),
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.orchestrator.snapshot().state, VoiceInputState::Idle);
    assert!(h.stations.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_new_cycle_cancels_pending_revert() {
    let h = harness();
    h.channel.set_connected(false);
    let snapshot = h.orchestrator.start_recording().await;
    assert_eq!(snapshot.state, VoiceInputState::Error);

    tokio::time::sleep(Duration::from_millis(4000)).await;
    h.channel.set_connected(true);
    let mut states = record(&h).await;

    // Past the first error's five second window the new cycle is still recording
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert_eq!(
        states.borrow_and_update().state,
        VoiceInputState::Recording
    );

    h.orchestrator.cancel_recording().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_clears_a_terminal_state() {
    let h = harness();
    h.channel.emit(ChannelEvent::Error {
        message: "boom".into(),
    });
    let mut states = h.orchestrator.subscribe();
    wait_for(&mut states, VoiceInputState::Error).await;

    let snapshot = h.orchestrator.reset_state().await;
    assert_eq!(snapshot, VoiceInputSnapshot::default());

    // The cancelled revert never fires into a later cycle
    let snapshot = h.orchestrator.start_recording().await;
    assert_eq!(snapshot.state, VoiceInputState::Requesting);
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(h.orchestrator.snapshot().state, VoiceInputState::Recording);

    h.orchestrator.cancel_recording().await;
}

#[tokio::test(start_paused = true)]
async fn test_dropping_an_orchestrator_removes_only_its_handlers() {
    let channel = FakeChannel::new(true);
    let first = harness_with(
        FakePlatform::new(),
        Arc::clone(&channel),
        CaptureConfig::default(),
    );
    let second = harness_with(
        FakePlatform::new(),
        Arc::clone(&channel),
        CaptureConfig::default(),
    );
    assert_eq!(channel.subscriber_count(EventKind::Error), 2);

    drop(first);
    assert_eq!(channel.subscriber_count(EventKind::Error), 1);

    let mut states = second.orchestrator.subscribe();
    channel.emit(ChannelEvent::Error {
        message: "still listening".into(),
    });
    let error = wait_for(&mut states, VoiceInputState::Error).await;
    assert_eq!(error.error_message.as_deref(), Some("still listening"));
}
