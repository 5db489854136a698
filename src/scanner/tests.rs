use super::*;
use crate::config::{CameraConfig, ScannerConfig};
use crate::error::{CameraError, ErrorKind, ScannerError};
use crate::events::{EventBus, KioskEvent};
use parking_lot::Mutex;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

fn create_test_scanner_config() -> ScannerConfig {
    ScannerConfig {
        facing: Facing::Back,
        scan_interval_ms: 100,
        start_delay_ms: 0,
        switch_delay_ms: 500,
        inversion: InversionMode::DontInvert,
    }
}

fn create_test_camera_config() -> CameraConfig {
    CameraConfig {
        ideal_resolution: (64, 48),
        min_resolution: (32, 24),
        ..CameraConfig::default()
    }
}

fn build_session(
    provider: &MockCameraProvider,
    decoder: ScriptedDecoder,
    scanner: ScannerConfig,
) -> (ScannerSession, Arc<Mutex<Vec<String>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);

    let session = ScannerSession::builder()
        .provider(Arc::new(provider.clone()))
        .decoder(Box::new(decoder))
        .scanner_config(scanner)
        .camera_config(create_test_camera_config())
        .on_scan(move |payload| sink.lock().push(payload))
        .build()
        .unwrap();

    (session, received)
}

#[tokio::test(start_paused = true)]
async fn test_payload_found_on_third_attempt() {
    let provider = MockCameraProvider::new();
    let (session, received) = build_session(
        &provider,
        ScriptedDecoder::found_on(3, "X"),
        create_test_scanner_config(),
    );

    session.start(Facing::Back).await.unwrap();
    assert_eq!(session.state(), ScanState::Running);
    assert!(session.is_decode_loop_active());

    sleep(Duration::from_secs(1)).await;

    assert_eq!(session.last_payload().as_deref(), Some("X"));
    assert_eq!(session.attempt_count(), 3);
    assert_eq!(session.state(), ScanState::Stopped);
    assert_eq!(*received.lock(), vec!["X".to_string()]);
    assert_eq!(provider.close_count(), 1);
    assert!(!session.is_decode_loop_active());
}

#[tokio::test(start_paused = true)]
async fn test_attempt_count_follows_ticks_and_freezes_when_stopped() {
    let provider = MockCameraProvider::new();
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );

    session.start(Facing::Back).await.unwrap();

    // Ticks fire at 0, 100 and 200 ms
    sleep(Duration::from_millis(250)).await;
    assert_eq!(session.attempt_count(), 3);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(session.attempt_count(), 4);

    session.stop();
    sleep(Duration::from_secs(1)).await;
    assert_eq!(session.attempt_count(), 4);
    assert_eq!(session.state(), ScanState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_callback_fires_once_per_session() {
    let provider = MockCameraProvider::new();
    let decoder = ScriptedDecoder::never().with_fallback(ScriptStep::Found("X".to_string()));
    let calls = decoder.call_counter();
    let (session, received) = build_session(&provider, decoder, create_test_scanner_config());

    session.start(Facing::Back).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(received.lock().len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A restart is a new session lifetime and may deliver again
    session.start(Facing::Back).await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert_eq!(received.lock().len(), 2);
    assert_eq!(provider.close_count(), 2);
}

#[tokio::test]
async fn test_stop_is_idempotent_from_idle() {
    let provider = MockCameraProvider::new();
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );

    assert_eq!(session.state(), ScanState::Idle);

    session.stop();
    assert_eq!(session.state(), ScanState::Stopped);

    session.stop();
    assert_eq!(session.state(), ScanState::Stopped);
    assert_eq!(provider.close_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_permission_denied_is_terminal() {
    let provider = MockCameraProvider::new();
    provider.fail_next_open(CameraError::PermissionDenied {
        device: "/dev/video0".to_string(),
    });
    let (session, received) = build_session(
        &provider,
        ScriptedDecoder::found_on(1, "X"),
        create_test_scanner_config(),
    );

    let err = session.start(Facing::Back).await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::PermissionDenied));
    assert_eq!(session.state(), ScanState::Stopped);
    assert_eq!(session.last_error(), Some(ErrorKind::PermissionDenied));
    assert!(!session.is_decode_loop_active());
    assert_eq!(session.attempt_count(), 0);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(session.attempt_count(), 0);
    assert!(received.lock().is_empty());
    assert_eq!(provider.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_busy_camera_is_reported_not_retried() {
    let provider = MockCameraProvider::new();
    provider.fail_next_open(CameraError::DeviceBusy {
        device: "/dev/video0".to_string(),
    });
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );

    let err = session.start(Facing::Back).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::DeviceBusy));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(provider.open_count(), 1);

    // An explicit start after the failure acquires normally
    session.start(Facing::Back).await.unwrap();
    assert_eq!(session.state(), ScanState::Running);
    assert_eq!(session.last_error(), None);
}

#[tokio::test(start_paused = true)]
async fn test_start_while_running_is_rejected() {
    let provider = MockCameraProvider::new();
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );

    session.start(Facing::Back).await.unwrap();
    let err = session.start(Facing::Front).await.unwrap_err();

    assert!(matches!(err, ScannerError::AlreadyActive));
    assert_eq!(session.facing(), Facing::Back);
    assert_eq!(provider.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_switch_facing_stops_then_starts_opposite() {
    let provider = MockCameraProvider::new();
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );

    session.start(Facing::Back).await.unwrap();

    let before = Instant::now();
    session.switch_facing().await.unwrap();

    assert!(before.elapsed() >= Duration::from_millis(500));
    assert_eq!(provider.requested_facings(), vec![Facing::Back, Facing::Front]);
    assert_eq!(provider.close_count(), 1);
    assert_eq!(session.facing(), Facing::Front);
    assert_eq!(session.state(), ScanState::Running);
}

#[tokio::test(start_paused = true)]
async fn test_switch_facing_twice_returns_to_back() {
    let provider = MockCameraProvider::new();
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );

    session.start(Facing::Back).await.unwrap();
    session.switch_facing().await.unwrap();
    session.switch_facing().await.unwrap();

    assert_eq!(session.facing(), Facing::Back);
    assert_eq!(
        provider.requested_facings(),
        vec![Facing::Back, Facing::Front, Facing::Back]
    );
    assert_eq!(provider.close_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_switch_gap_keeps_camera_released() {
    let provider = MockCameraProvider::new();
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );
    let session = Arc::new(session);

    session.start(Facing::Back).await.unwrap();

    let switching = Arc::clone(&session);
    let handle = tokio::spawn(async move { switching.switch_facing().await });

    sleep(Duration::from_millis(100)).await;
    session.stop();
    assert_eq!(session.state(), ScanState::Stopped);

    handle.await.unwrap().unwrap();

    assert_eq!(session.state(), ScanState::Stopped);
    assert_eq!(provider.open_count(), 1);
    assert_eq!(provider.close_count(), 1);
    assert_eq!(provider.requested_facings(), vec![Facing::Back]);
    assert!(!session.is_decode_loop_active());
}

#[tokio::test(start_paused = true)]
async fn test_decode_failures_do_not_stop_the_loop() {
    let provider = MockCameraProvider::new();
    let decoder = ScriptedDecoder::new(vec![
        ScriptStep::Fail("corrupt frame".to_string()),
        ScriptStep::Fail("bad finder pattern".to_string()),
        ScriptStep::Found("42".to_string()),
    ]);
    let (session, received) = build_session(&provider, decoder, create_test_scanner_config());

    session.start(Facing::Back).await.unwrap();
    sleep(Duration::from_secs(1)).await;

    assert_eq!(session.attempt_count(), 3);
    assert_eq!(*received.lock(), vec!["42".to_string()]);
    assert_eq!(session.last_error(), None);
}

#[tokio::test(start_paused = true)]
async fn test_restart_resets_counters() {
    let provider = MockCameraProvider::new();
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );

    session.start(Facing::Back).await.unwrap();
    sleep(Duration::from_millis(250)).await;
    session.stop();
    assert_eq!(session.attempt_count(), 3);

    session.start(Facing::Front).await.unwrap();
    assert_eq!(session.attempt_count(), 0);
    assert_eq!(session.state(), ScanState::Running);
    assert_eq!(provider.open_count(), 2);
    assert_eq!(provider.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_acquisition_releases_stream() {
    let provider = MockCameraProvider::new().with_ready_delay(Duration::from_millis(200));
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );
    let session = Arc::new(session);

    let starter = Arc::clone(&session);
    let handle = tokio::spawn(async move { starter.start(Facing::Back).await });

    sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state(), ScanState::Starting);
    session.stop();

    handle.await.unwrap().unwrap();

    assert_eq!(session.state(), ScanState::Stopped);
    assert!(!session.is_decode_loop_active());
    assert_eq!(provider.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_buffer_follows_stream_resolution() {
    let provider = MockCameraProvider::new().with_resolutions(vec![(64, 48), (80, 60)]);
    let decoder = ScriptedDecoder::never();
    let seen = decoder.seen_dimensions();
    let (session, _received) = build_session(&provider, decoder, create_test_scanner_config());

    session.start(Facing::Back).await.unwrap();
    sleep(Duration::from_millis(250)).await;
    session.stop();

    assert_eq!(*seen.lock(), vec![(64, 48), (80, 60), (80, 60)]);
}

#[tokio::test(start_paused = true)]
async fn test_start_delay_postpones_first_attempt() {
    let provider = MockCameraProvider::new();
    let mut scanner = create_test_scanner_config();
    scanner.start_delay_ms = 500;
    let (session, _received) = build_session(&provider, ScriptedDecoder::never(), scanner);

    session.start(Facing::Back).await.unwrap();

    sleep(Duration::from_millis(450)).await;
    assert_eq!(session.attempt_count(), 0);

    sleep(Duration::from_millis(100)).await;
    assert_eq!(session.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_undersized_stream_is_constraint_failure() {
    let provider = MockCameraProvider::new().with_resolutions(vec![(16, 12)]);
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );

    let err = session.start(Facing::Back).await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::ConstraintUnsatisfiable));
    assert_eq!(provider.close_count(), 1);
    assert_eq!(session.state(), ScanState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_constraints_carry_configured_resolution() {
    let provider = MockCameraProvider::new();
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );

    session.start(Facing::Front).await.unwrap();

    let constraints = provider.last_constraints().unwrap();
    assert_eq!(constraints.facing, Facing::Front);
    assert_eq!((constraints.ideal_width, constraints.ideal_height), (64, 48));
    assert_eq!((constraints.min_width, constraints.min_height), (32, 24));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_session_releases_camera() {
    let provider = MockCameraProvider::new();
    let (session, _received) = build_session(
        &provider,
        ScriptedDecoder::never(),
        create_test_scanner_config(),
    );

    session.start(Facing::Back).await.unwrap();
    drop(session);

    assert_eq!(provider.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_lifecycle_events_are_published() {
    let provider = MockCameraProvider::new();
    let bus = Arc::new(EventBus::new(16));
    let mut receiver = bus.subscribe();

    let session = ScannerSession::builder()
        .provider(Arc::new(provider.clone()))
        .decoder(Box::new(ScriptedDecoder::found_on(2, "7")))
        .scanner_config(create_test_scanner_config())
        .camera_config(create_test_camera_config())
        .event_bus(Arc::clone(&bus))
        .on_scan(|_| {})
        .build()
        .unwrap();

    session.start(Facing::Back).await.unwrap();
    sleep(Duration::from_secs(1)).await;

    let mut types = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        if let KioskEvent::PayloadDecoded { payload, attempts } = &event {
            assert_eq!(payload, "7");
            assert_eq!(*attempts, 2);
        }
        types.push(event.event_type());
    }

    assert_eq!(
        types,
        vec![
            "session_starting",
            "session_running",
            "payload_decoded",
            "session_stopped"
        ]
    );
}

#[tokio::test]
async fn test_builder_requires_provider() {
    let result = ScannerSession::builder().on_scan(|_| {}).build();

    match result {
        Err(crate::error::PointscanError::System { message }) => {
            assert!(message.contains("Camera provider must be specified"));
        }
        _ => panic!("Expected system error for missing provider"),
    }
}

#[test]
fn test_facing_opposite_round_trip() {
    assert_eq!(Facing::Back.opposite(), Facing::Front);
    assert_eq!(Facing::Back.opposite().opposite(), Facing::Back);
}
