// State management module
//
// This module provides the StateManager which wraps PersistenceState with thread-safe
// access using Arc<RwLock<T>>, emits change events, and publishes status snapshots.

use crate::metrics::{PerformanceMetrics, PerformanceRecorder};
use crate::models::PersistenceState;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::{broadcast, watch};

/// Change events emitted when persistence state is modified
///
/// Subscribers receive these instead of polling the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The document gained or lost unsaved edits
    DirtyChanged { is_dirty: bool },

    /// The change queue grew, shrank or rolled over
    QueueChanged { len: usize },

    SaveStarted,

    SaveSucceeded { last_saved: i64, local_version: u64 },

    SaveFailed { error: String, retry_count: u32 },

    LoadStarted,

    LoadFinished { success: bool },

    ConflictDetected { conflict_id: String },

    ConflictResolved { conflict_id: String },

    /// Save and load errors were cleared by the caller
    ErrorsCleared,

    /// The engine was disposed; no further events follow
    Disposed,
}

/// Read-only status published to observers.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceStatus {
    pub is_dirty: bool,
    pub is_saving: bool,
    pub last_saved: Option<i64>,
    pub save_error: Option<String>,
    pub metrics: PerformanceMetrics,
    pub has_active_conflicts: bool,
}

/// Thread-safe state manager with event emission
///
/// This is the only path through which [`PersistenceState`] is mutated:
/// - [`snapshot()`](Self::snapshot) and [`read()`](Self::read) for readers
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`subscribe()`](Self::subscribe) for discrete [`StateChange`] events
/// - [`watch_status()`](Self::watch_status) for the latest [`PersistenceStatus`]
///
/// Once [`seal()`](Self::seal)ed, updates are dropped, so late results from
/// in-flight requests cannot touch a disposed engine's state.
pub struct StateManager {
    state: Arc<RwLock<PersistenceState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,

    status_tx: Arc<watch::Sender<PersistenceStatus>>,

    metrics: Arc<PerformanceRecorder>,

    sealed: Arc<AtomicBool>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// The broadcast channel buffers 100 events per subscriber.
    pub fn new(metrics: Arc<PerformanceRecorder>) -> Self {
        let (state_tx, _) = broadcast::channel(100);
        let state = PersistenceState::default();
        let (status_tx, _) = watch::channel(build_status(&state, &metrics));

        Self {
            state: Arc::new(RwLock::new(state)),
            state_tx,
            status_tx: Arc::new(status_tx),
            metrics,
            sealed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Clone of the current state
    pub fn snapshot(&self) -> PersistenceState {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let dirty = state_manager.read(|state| state.is_dirty);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&PersistenceState) -> R,
    {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// 1. Captures the old state
    /// 2. Applies the update function
    /// 3. Detects what changed and emits events
    /// 4. Publishes a fresh status snapshot
    ///
    /// Returns the emitted events; empty when sealed.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut PersistenceState),
    {
        self.update_with(update_fn).1
    }

    /// Like [`update`](Self::update), but also hands back the closure's result.
    ///
    /// Returns `None` for the result when sealed; the closure is not run.
    pub fn update_with<F, R>(&self, update_fn: F) -> (Option<R>, Vec<StateChange>)
    where
        F: FnOnce(&mut PersistenceState) -> R,
    {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if self.is_sealed() {
            return (None, Vec::new());
        }

        let old_state = state.clone();
        let result = update_fn(&mut state);
        let changes = detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        let status = build_status(&state, &self.metrics);
        drop(state);
        self.publish(status);

        (Some(result), changes)
    }

    /// Republish status after a metrics-only change.
    pub fn refresh_status(&self) {
        let status = self.read(|state| build_status(state, &self.metrics));
        self.publish(status);
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Receiver that always holds the latest status
    pub fn watch_status(&self) -> watch::Receiver<PersistenceStatus> {
        self.status_tx.subscribe()
    }

    /// Refuse all further updates and notify subscribers.
    pub fn seal(&self) {
        let _guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        if !self.sealed.swap(true, Ordering::SeqCst) {
            let _ = self.state_tx.send(StateChange::Disposed);
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    fn publish(&self, status: PersistenceStatus) {
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

// Make StateManager cloneable for sharing across tasks
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
            status_tx: Arc::clone(&self.status_tx),
            metrics: Arc::clone(&self.metrics),
            sealed: Arc::clone(&self.sealed),
        }
    }
}

fn build_status(state: &PersistenceState, metrics: &PerformanceRecorder) -> PersistenceStatus {
    PersistenceStatus {
        is_dirty: state.is_dirty,
        is_saving: state.is_saving,
        last_saved: state.last_saved,
        save_error: state.save_error.clone(),
        metrics: metrics.snapshot(),
        has_active_conflicts: state.has_conflict(),
    }
}

/// Detect what changed between two states and generate events
fn detect_changes(old: &PersistenceState, new: &PersistenceState) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if old.is_loading != new.is_loading {
        if new.is_loading {
            changes.push(StateChange::LoadStarted);
        } else {
            changes.push(StateChange::LoadFinished {
                success: new.load_error.is_none(),
            });
        }
    }

    if !old.is_saving && new.is_saving {
        changes.push(StateChange::SaveStarted);
    }

    if new.last_saved != old.last_saved {
        if let Some(last_saved) = new.last_saved {
            changes.push(StateChange::SaveSucceeded {
                last_saved,
                local_version: new.local_version,
            });
        }
    }

    if old.is_saving && !new.is_saving {
        if let Some(error) = &new.save_error {
            changes.push(StateChange::SaveFailed {
                error: error.clone(),
                retry_count: new.retry_count,
            });
        }
    }

    let queue_changed = old.queued_changes.len() != new.queued_changes.len()
        || old.queued_changes.back().map(|c| &c.id) != new.queued_changes.back().map(|c| &c.id);
    if queue_changed {
        changes.push(StateChange::QueueChanged {
            len: new.queued_changes.len(),
        });
    }

    if old.is_dirty != new.is_dirty {
        changes.push(StateChange::DirtyChanged {
            is_dirty: new.is_dirty,
        });
    }

    for id in new.conflicts.keys() {
        if !old.conflicts.contains_key(id) {
            changes.push(StateChange::ConflictDetected {
                conflict_id: id.clone(),
            });
        }
    }
    for id in old.conflicts.keys() {
        if !new.conflicts.contains_key(id) {
            changes.push(StateChange::ConflictResolved {
                conflict_id: id.clone(),
            });
        }
    }

    let had_errors = old.save_error.is_some() || old.load_error.is_some();
    let has_errors = new.save_error.is_some() || new.load_error.is_some();
    if had_errors
        && !has_errors
        && old.last_saved == new.last_saved
        && old.last_loaded == new.last_loaded
    {
        changes.push(StateChange::ErrorsCleared);
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeEvent, ChangeKind, ChangeSource, ConflictRecord, RemoteDraft, ResolutionStrategy};
    use serde_json::Value;

    fn manager() -> StateManager {
        StateManager::new(Arc::new(PerformanceRecorder::new(true)))
    }

    fn change(id: &str) -> ChangeEvent {
        ChangeEvent {
            id: id.into(),
            kind: ChangeKind::Content,
            section_id: None,
            element_key: None,
            field: None,
            old_value: Value::Null,
            new_value: Value::from(1),
            timestamp: 1,
            source: ChangeSource::User,
        }
    }

    #[test]
    fn test_new_state_manager() {
        let manager = manager();
        let state = manager.snapshot();

        assert!(!state.is_dirty);
        assert!(!state.is_saving);
        assert!(state.queued_changes.is_empty());
    }

    #[test]
    fn test_update_with_change_detection() {
        let manager = manager();

        let changes = manager.update(|state| {
            state.queued_changes.push_back(change("c1"));
            state.is_dirty = true;
        });

        assert_eq!(
            changes,
            vec![
                StateChange::QueueChanged { len: 1 },
                StateChange::DirtyChanged { is_dirty: true },
            ]
        );
    }

    #[test]
    fn test_queue_rollover_detected_at_same_length() {
        let manager = manager();
        manager.update(|state| state.queued_changes.push_back(change("c1")));

        let changes = manager.update(|state| {
            state.queued_changes.pop_front();
            state.queued_changes.push_back(change("c2"));
        });
        assert_eq!(changes, vec![StateChange::QueueChanged { len: 1 }]);
    }

    #[test]
    fn test_save_lifecycle_events() {
        let manager = manager();
        manager.update(|state| state.is_dirty = true);

        let started = manager.update(|state| state.is_saving = true);
        assert_eq!(started, vec![StateChange::SaveStarted]);

        let failed = manager.update(|state| {
            state.is_saving = false;
            state.save_error = Some("offline".into());
            state.retry_count = 1;
        });
        assert_eq!(
            failed,
            vec![StateChange::SaveFailed {
                error: "offline".into(),
                retry_count: 1
            }]
        );

        manager.update(|state| state.is_saving = true);
        let succeeded = manager.update(|state| {
            state.is_saving = false;
            state.save_error = None;
            state.is_dirty = false;
            state.last_saved = Some(42);
            state.local_version = 2;
        });
        assert!(succeeded.contains(&StateChange::SaveSucceeded {
            last_saved: 42,
            local_version: 2
        }));
        assert!(succeeded.contains(&StateChange::DirtyChanged { is_dirty: false }));
        assert!(!succeeded.contains(&StateChange::ErrorsCleared));
    }

    #[test]
    fn test_conflict_events() {
        let manager = manager();
        let record = ConflictRecord {
            id: "conflict-1".into(),
            local_changes: Vec::new(),
            server_snapshot: RemoteDraft::default(),
            conflicted_fields: Vec::new(),
            detected_at: 0,
            resolution_strategy: ResolutionStrategy::Manual,
            resolved: false,
        };

        let detected = manager.update(|state| {
            state.conflicts.insert(record.id.clone(), record.clone());
        });
        assert_eq!(
            detected,
            vec![StateChange::ConflictDetected {
                conflict_id: "conflict-1".into()
            }]
        );

        let resolved = manager.update(|state| {
            state.conflicts.shift_remove("conflict-1");
        });
        assert_eq!(
            resolved,
            vec![StateChange::ConflictResolved {
                conflict_id: "conflict-1".into()
            }]
        );
    }

    #[test]
    fn test_errors_cleared() {
        let manager = manager();
        manager.update(|state| state.load_error = Some("not found".into()));

        let changes = manager.update(|state| {
            state.load_error = None;
            state.save_error = None;
        });
        assert_eq!(changes, vec![StateChange::ErrorsCleared]);
    }

    #[test]
    fn test_subscribe_to_changes() {
        let manager = manager();
        let mut rx = manager.subscribe();

        manager.update(|state| state.is_dirty = true);

        let event = rx.try_recv();
        assert!(matches!(event, Ok(StateChange::DirtyChanged { is_dirty: true })));
    }

    #[test]
    fn test_status_watch_follows_state() {
        let manager = manager();
        let mut status = manager.watch_status();
        assert!(!status.borrow().is_dirty);

        manager.update(|state| state.is_dirty = true);

        assert!(status.has_changed().unwrap());
        assert!(status.borrow_and_update().is_dirty);
    }

    #[test]
    fn test_status_not_republished_without_change() {
        let manager = manager();
        let mut status = manager.watch_status();
        status.borrow_and_update();

        manager.update(|state| state.edit_generation += 1);
        assert!(!status.has_changed().unwrap());
    }

    #[test]
    fn test_sealed_manager_ignores_updates() {
        let manager = manager();
        let mut rx = manager.subscribe();

        manager.seal();
        let (result, changes) = manager.update_with(|state| {
            state.is_dirty = true;
            7
        });

        assert_eq!(result, None);
        assert!(changes.is_empty());
        assert!(!manager.snapshot().is_dirty);
        assert!(matches!(rx.try_recv(), Ok(StateChange::Disposed)));
    }

    #[test]
    fn test_clone_shares_state() {
        let manager1 = manager();
        let manager2 = manager1.clone();

        manager1.update(|state| state.local_version = 10);

        assert_eq!(manager2.read(|state| state.local_version), 10);
    }
}
