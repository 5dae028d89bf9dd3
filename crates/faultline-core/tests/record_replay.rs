//! E2E record/replay tests.
//!
//! Records a live session through the full publish chain, persists it,
//! and replays it into a fresh bus, checking round-trip fidelity and
//! timing behavior.

use faultline_core::{
    DataGenerator, Profile, Recorder, RecorderHandle, Recording, ReplayOptions, Replayer,
    ScenarioEngine, ScenarioStep,
};
use faultline_proto::{Event, EventBus, EventSink};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn recorded_session() -> Recording {
    let bus = Arc::new(EventBus::new());
    let (recorder, handle) = Recorder::start("session", bus as Arc<dyn EventSink>);

    recorder.publish(
        Event::new("SessionStarted")
            .with_payload(json!({"mode": "paper"}))
            .with_source("runner"),
    );
    for i in 0..3 {
        recorder.publish(
            Event::new("PriceFetched")
                .with_payload(json!({"price": 100.0 + f64::from(i)}))
                .with_source("exchange"),
        );
    }
    recorder.publish(Event::new("SessionEnded").with_source("runner"));
    handle.stop();
    handle.snapshot()
}

#[test]
fn test_save_load_roundtrip_preserves_events() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");

    let recording = recorded_session();
    recording.save(&path).unwrap();

    let loaded = Recording::load(&path).unwrap();
    assert_eq!(loaded.events, recording.events);
    assert_eq!(loaded.session_name, recording.session_name);
    assert_eq!(loaded.duration_ms, recording.duration_ms);
    assert_eq!(loaded.total_events, 5);
}

#[tokio::test]
async fn test_replay_reproduces_session_into_fresh_bus() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    recorded_session().save(&path).unwrap();

    let replayer = Replayer::load(&path).unwrap();
    let bus = EventBus::new();
    let sub = bus.subscribe("*");

    let summary = replayer
        .replay(&bus, &ReplayOptions::new().with_speed(50.0))
        .await
        .unwrap();

    assert_eq!(summary.replayed, 5);
    assert_eq!(summary.skipped, 0);

    let events = sub.drain();
    let names: Vec<&str> = events.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "SessionStarted",
            "PriceFetched",
            "PriceFetched",
            "PriceFetched",
            "SessionEnded"
        ]
    );
    assert_eq!(events[1].payload["price"], 100.0);
    assert_eq!(events[3].payload["price"], 102.0);
}

#[tokio::test]
async fn test_replay_wall_clock_scales_with_speed() {
    // Synthesize known timing: 300ms of session.
    let recording = Recording {
        session_name: "timed".to_string(),
        start_time: chrono::Utc::now(),
        duration_ms: 300,
        total_events: 4,
        events: (0..4)
            .map(|i| faultline_core::RecordedEvent {
                offset_ms: i * 100,
                event_name: "Tick".to_string(),
                event_data: serde_json::Value::Null,
                source: String::new(),
            })
            .collect(),
    };

    let bus = EventBus::new();
    let start = std::time::Instant::now();
    Replayer::from_recording(recording)
        .replay(&bus, &ReplayOptions::new().with_speed(10.0))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    // 300ms at 10x is ~30ms; allow scheduler jitter either way.
    assert!(elapsed >= Duration::from_millis(25), "too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(200), "too slow: {elapsed:?}");
}

#[tokio::test]
async fn test_scenario_session_survives_record_replay_loop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scenario.json");

    // Run a scenario and persist what the recorder captured.
    let bus = Arc::new(EventBus::new());
    let generator = DataGenerator::new(Profile::SteadyGrowth { rate: 0.02 }, 50.0);
    let mut engine = ScenarioEngine::new("loop", bus as Arc<dyn EventSink>, generator);
    engine.run(vec![ScenarioStep::wait_cycles(6)]).await;

    let handle: RecorderHandle = engine.recorder();
    handle.stop();
    handle.save(&path).unwrap();

    // Replay into a fresh bus and compare the value series.
    let replayer = Replayer::load(&path).unwrap();
    assert_eq!(replayer.event_count(), 6);
    assert_eq!(replayer.event_summary()["DataGenerated"], 6);

    let fresh = EventBus::new();
    let sub = fresh.subscribe("DataGenerated");
    replayer
        .replay(&fresh, &ReplayOptions::new().with_speed(100.0))
        .await
        .unwrap();

    let replayed_values: Vec<f64> = sub
        .drain()
        .into_iter()
        .map(|e| e.payload["value"].as_f64().unwrap())
        .collect();
    let original_values: Vec<f64> = handle
        .history()
        .into_iter()
        .map(|e| e.event_data["value"].as_f64().unwrap())
        .collect();
    assert_eq!(replayed_values, original_values);
}

#[tokio::test]
async fn test_filtered_replay_only_delivers_matches() {
    let recording = recorded_session();
    let replayer = Replayer::from_recording(recording);

    let bus = EventBus::new();
    let sub = bus.subscribe("*");
    let summary = replayer
        .replay(
            &bus,
            &ReplayOptions::new()
                .with_speed(100.0)
                .with_filter(|name| name == "PriceFetched"),
        )
        .await
        .unwrap();

    assert_eq!(summary.replayed, 3);
    assert_eq!(summary.skipped, 2);
    assert!(sub.drain().iter().all(|e| e.name == "PriceFetched"));
}

#[tokio::test]
async fn test_derived_replayer_is_independent() {
    let replayer = Replayer::from_recording(recorded_session());
    let failures = replayer.filter_events(|name| name.contains("Session"));

    assert_eq!(failures.event_count(), 2);
    assert_eq!(replayer.event_count(), 5);

    let bus = EventBus::new();
    let sub = bus.subscribe("*");
    failures
        .replay(&bus, &ReplayOptions::new().with_speed(100.0))
        .await
        .unwrap();
    assert_eq!(sub.len(), 2);
}

#[test]
fn test_corrupt_file_reports_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.json");
    std::fs::write(&path, r#"{"session_name": "x", "events": "not-a-list"}"#).unwrap();

    let error = Replayer::load(&path).unwrap_err();
    assert!(error.to_string().contains("corrupt recording"));
}
