//! Integration tests for StateManager with state change events
//!
//! These tests verify that the StateManager correctly:
//! - Emits state change events on mutations
//! - Supports multiple subscribers
//! - Publishes status snapshots through the watch channel
//! - Handles concurrent access from multiple tasks
//! - Drops updates once sealed

use draftsync::models::{ChangeEvent, ChangeKind, ChangeSource};
use draftsync::{PerformanceRecorder, StateChange, StateManager};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{Duration, timeout};

fn new_state() -> Arc<StateManager> {
    Arc::new(StateManager::new(Arc::new(PerformanceRecorder::new(true))))
}

fn change(id: &str) -> ChangeEvent {
    ChangeEvent {
        id: id.to_string(),
        kind: ChangeKind::Theme,
        section_id: None,
        element_key: None,
        field: Some("accent".into()),
        old_value: Value::from("blue"),
        new_value: Value::from("red"),
        timestamp: 1_700_000_000_000,
        source: ChangeSource::User,
    }
}

#[tokio::test]
async fn test_state_change_events_emitted() {
    let state = new_state();
    let mut rx = state.subscribe();

    state.update(|s| s.is_dirty = true);

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed");

    assert_eq!(
        event,
        StateChange::DirtyChanged { is_dirty: true },
        "Expected DirtyChanged event"
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state = new_state();
    let mut rx1 = state.subscribe();
    let mut rx2 = state.subscribe();
    let mut rx3 = state.subscribe();

    state.update(|s| s.is_saving = true);

    for rx in [&mut rx1, &mut rx2, &mut rx3] {
        let event = timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("Timeout")
            .expect("Channel closed");
        assert_eq!(event, StateChange::SaveStarted);
    }
}

#[tokio::test]
async fn test_save_workflow_events() {
    let state = new_state();
    let mut rx = state.subscribe();

    state.update(|s| {
        s.queued_changes.push_back(change("c1"));
        s.is_dirty = true;
    });
    state.update(|s| s.is_saving = true);
    state.update(|s| {
        s.is_saving = false;
        s.last_saved = Some(1_700_000_000_500);
        s.local_version += 1;
        s.queued_changes.clear();
        s.is_dirty = false;
    });

    let mut events = Vec::new();
    while let Ok(Ok(event)) = timeout(Duration::from_millis(50), rx.recv()).await {
        events.push(event);
    }

    assert_eq!(
        events,
        vec![
            StateChange::QueueChanged { len: 1 },
            StateChange::DirtyChanged { is_dirty: true },
            StateChange::SaveStarted,
            StateChange::SaveSucceeded {
                last_saved: 1_700_000_000_500,
                local_version: 2
            },
            StateChange::QueueChanged { len: 0 },
            StateChange::DirtyChanged { is_dirty: false },
        ]
    );
}

#[tokio::test]
async fn test_failed_save_event_carries_retry_count() {
    let state = new_state();
    state.update(|s| s.is_saving = true);
    let mut rx = state.subscribe();

    state.update(|s| {
        s.is_saving = false;
        s.save_error = Some("Network error: offline".into());
        s.retry_count = 1;
    });

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout")
        .expect("Channel closed");

    match event {
        StateChange::SaveFailed { error, retry_count } => {
            assert_eq!(error, "Network error: offline");
            assert_eq!(retry_count, 1);
        }
        other => panic!("Expected SaveFailed, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_status_watch_tracks_latest_state() {
    let state = new_state();
    let mut status = state.watch_status();
    assert!(!status.borrow().is_dirty);

    state.update(|s| s.is_dirty = true);

    timeout(Duration::from_millis(100), status.changed())
        .await
        .expect("Timeout")
        .expect("Sender dropped");
    assert!(status.borrow_and_update().is_dirty);

    // Mutations that do not affect the status do not wake watchers
    state.update(|s| s.last_loaded = Some(5));
    assert!(!status.has_changed().unwrap());
}

#[tokio::test]
async fn test_concurrent_state_access() {
    let state = new_state();

    let mut handles = vec![];
    for i in 0..10 {
        let state_clone = state.clone();
        handles.push(tokio::spawn(async move {
            state_clone.update(|s| {
                s.queued_changes.push_back(change(&format!("c{i}")));
                s.edit_generation += 1;
            });
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let (len, generation) = state.read(|s| (s.queued_changes.len(), s.edit_generation));
    assert_eq!(len, 10);
    assert_eq!(generation, 10);
}

#[tokio::test]
async fn test_sealed_state_ignores_updates() {
    let state = new_state();
    let mut rx = state.subscribe();

    state.seal();
    let events = state.update(|s| s.is_dirty = true);

    assert!(events.is_empty());
    assert!(!state.snapshot().is_dirty);
    assert!(state.is_sealed());

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout")
        .expect("Channel closed");
    assert_eq!(event, StateChange::Disposed);
}

#[tokio::test]
async fn test_clearing_errors_emits_event() {
    let state = new_state();
    state.update(|s| {
        s.save_error = Some("boom".into());
        s.load_error = Some("bang".into());
    });
    let mut rx = state.subscribe();

    state.update(|s| {
        s.save_error = None;
        s.load_error = None;
    });

    let event = timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout")
        .expect("Channel closed");
    assert_eq!(event, StateChange::ErrorsCleared);
}
