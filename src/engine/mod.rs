//! The persistence engine.
//!
//! [`PersistenceManager`] composes the change tracker, save scheduler,
//! conflict detector/resolver, version history, load cache and metrics behind
//! one handle. It is cheap to clone; every clone drives the same engine.
//!
//! Save lifecycle: `Idle -> Dirty -> Saving -> (Idle | ConflictPending | Failed)`.
//! At most one save is in flight per engine: callers arriving while a save runs
//! await that save's result instead of starting another write.

mod conflicts;
mod load;
mod save;

use crate::error::PersistenceError;
use crate::metrics::{PerformanceMetrics, PerformanceRecorder};
use crate::models::{
    ChangeEvent, ChangeEventInput, ConflictRecord, DraftDocument, PersistenceConfig,
    PersistenceState,
};
use crate::services::{
    ChangeTracker, ConflictDetector, ConflictResolver, LoadCache, RemoteStore, SaveCallback,
    SaveScheduler, VersionHistory, VersionManager, VersionSnapshot, VersionSummary,
};
use crate::state::{PersistenceStatus, StateChange, StateManager};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};

pub(crate) use save::SaveOutcome;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Everything `export_data` hands out, in one serializable bundle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub document: DraftDocument,
    pub state: PersistenceState,
    pub conflicts: Vec<ConflictRecord>,
    pub version_history: VersionHistory,
    pub metrics: PerformanceMetrics,
    pub exported_at: i64,
}

/// Optimistic local-first persistence engine for one draft.
#[derive(Clone)]
pub struct PersistenceManager {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    config: PersistenceConfig,
    store: Arc<dyn RemoteStore>,
    handle: Handle,

    state: StateManager,
    metrics: Arc<PerformanceRecorder>,
    tracker: ChangeTracker,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    scheduler: SaveScheduler,
    versions: Mutex<VersionManager>,
    cache: Mutex<LoadCache>,

    /// Lock order: `in_flight`, then `document`, then the state lock.
    document: RwLock<DraftDocument>,

    /// Result channel of the save currently running, if any
    in_flight: Mutex<Option<watch::Receiver<Option<SaveOutcome>>>>,

    started: AtomicBool,
    disposed: AtomicBool,
}

impl PersistenceManager {
    /// Build an engine bound to the current tokio runtime.
    ///
    /// # Errors
    /// [`PersistenceError::InvalidConfig`] if `config` fails validation,
    /// [`PersistenceError::NoRuntime`] outside a tokio runtime.
    pub fn new(config: PersistenceConfig, store: Arc<dyn RemoteStore>) -> Result<Self, PersistenceError> {
        config.validate()?;
        let handle = Handle::try_current().map_err(|_| PersistenceError::NoRuntime)?;

        let metrics = Arc::new(PerformanceRecorder::new(config.performance_tracking));
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let callback: SaveCallback = Arc::new(move |trigger| {
                if let Some(inner) = weak.upgrade() {
                    let handle = inner.handle.clone();
                    handle.spawn(inner.run_scheduled(trigger));
                }
            });

            Inner {
                scheduler: SaveScheduler::new(
                    config.debounce(),
                    config.background_save_interval(),
                    handle.clone(),
                    callback,
                ),
                tracker: ChangeTracker::new(config.max_queue_size),
                detector: ConflictDetector::new(),
                resolver: ConflictResolver::new(),
                versions: Mutex::new(VersionManager::new(config.max_snapshots)),
                cache: Mutex::new(LoadCache::new(config.cache_ttl())),
                state: StateManager::new(Arc::clone(&metrics)),
                metrics,
                document: RwLock::new(DraftDocument::default()),
                in_flight: Mutex::new(None),
                started: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                store,
                handle,
                config,
            }
        });

        Ok(Self { inner })
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.inner.config
    }

    /// Start background saving. Safe to call more than once.
    pub fn start(&self) -> Result<(), PersistenceError> {
        self.inner.ensure_live()?;
        if !self.inner.started.swap(true, Ordering::SeqCst) {
            self.inner.scheduler.start_interval();
            tracing::info!(
                "Persistence engine started (debounce {}ms, background every {}ms)",
                self.inner.config.debounce_ms,
                self.inner.config.background_save_interval_ms
            );
        }
        Ok(())
    }

    /// Tear the engine down.
    ///
    /// Cancels every timer and freezes state. A save already on the wire is
    /// allowed to finish, but its result is discarded.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.scheduler.stop();
        self.inner.state.seal();
        tracing::info!("Persistence engine disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }

    /// Record an edit, apply it to the document and arm the debounce.
    ///
    /// Returns the stamped event, or `None` when the edit was insignificant
    /// or the engine is disposed.
    pub fn track_change(&self, input: ChangeEventInput) -> Option<ChangeEvent> {
        self.inner.track_change(input)
    }

    /// Mutate the document directly. Marks it dirty only if it changed.
    pub fn update_document<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut DraftDocument),
    {
        self.inner.update_document(f)
    }

    /// Replace the document with a known-clean copy (no save is scheduled).
    pub fn set_document(&self, document: DraftDocument) {
        self.inner.set_document(document);
    }

    pub fn document(&self) -> DraftDocument {
        read(&self.inner.document).clone()
    }

    /// Discard all queued changes and clear the dirty flag.
    pub fn clear_queue(&self) {
        self.inner.scheduler.cancel_pending();
        self.inner.state.update(|state| {
            state.queued_changes.clear();
            state.is_dirty = false;
            state.edit_generation += 1;
        });
    }

    pub fn clear_errors(&self) {
        self.inner.state.update(|state| {
            state.save_error = None;
            state.load_error = None;
            state.retry_count = 0;
        });
    }

    /// Step back in version history. Does not touch the document or the store.
    pub fn undo(&self) -> Option<VersionSnapshot> {
        lock(&self.inner.versions).undo().cloned()
    }

    /// Step forward in version history. Does not touch the document or the store.
    pub fn redo(&self) -> Option<VersionSnapshot> {
        lock(&self.inner.versions).redo().cloned()
    }

    pub fn can_undo(&self) -> bool {
        lock(&self.inner.versions).can_undo()
    }

    pub fn can_redo(&self) -> bool {
        lock(&self.inner.versions).can_redo()
    }

    pub fn get_version_history(&self) -> Vec<VersionSummary> {
        lock(&self.inner.versions).history_summary()
    }

    pub fn import_version_history(&self, history: VersionHistory) {
        lock(&self.inner.versions).import_history(history);
    }

    pub fn get_active_conflicts(&self) -> Vec<ConflictRecord> {
        self.inner
            .state
            .read(|state| state.conflicts.values().cloned().collect())
    }

    pub fn export_data(&self) -> ExportData {
        let document = self.document();
        let state = self.inner.state.snapshot();
        ExportData {
            document,
            conflicts: state.conflicts.values().cloned().collect(),
            state,
            version_history: lock(&self.inner.versions).export_history(),
            metrics: self.inner.metrics.snapshot(),
            exported_at: now_ms(),
        }
    }

    pub fn state(&self) -> PersistenceState {
        self.inner.state.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.inner.state.subscribe()
    }

    pub fn watch_status(&self) -> watch::Receiver<PersistenceStatus> {
        self.inner.state.watch_status()
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.inner.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.inner.metrics.reset();
        self.inner.state.refresh_status();
    }

    pub fn log_metrics(&self) {
        self.inner.metrics.log_summary();
    }
}

impl Inner {
    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<(), PersistenceError> {
        if self.is_disposed() {
            Err(PersistenceError::Disposed)
        } else {
            Ok(())
        }
    }

    fn track_change(&self, input: ChangeEventInput) -> Option<ChangeEvent> {
        if self.is_disposed() {
            tracing::debug!("Ignoring change on disposed engine");
            return None;
        }

        let event = self.tracker.record(input, now_ms())?;

        {
            let mut document = write(&self.document);
            if let Err(e) = document.apply_change(&event) {
                tracing::warn!("Could not apply change at {}: {}", event.path(), e);
            }

            self.state.update(|state| {
                self.tracker.enqueue(&mut state.queued_changes, event.clone());
                state.is_dirty = true;
                state.edit_generation += 1;
            });
        }

        tracing::trace!("Tracked {} change at {}", event.kind, event.path());
        self.after_edit();
        Some(event)
    }

    fn update_document<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut DraftDocument),
    {
        if self.is_disposed() {
            return false;
        }

        {
            let mut document = write(&self.document);
            let mut updated = document.clone();
            f(&mut updated);
            if updated == *document {
                return false;
            }
            *document = updated;

            self.state.update(|state| {
                state.is_dirty = true;
                state.edit_generation += 1;
            });
        }

        self.after_edit();
        true
    }

    fn set_document(&self, document: DraftDocument) {
        let mut current = write(&self.document);
        *current = document;
        self.state.update(|state| {
            state.queued_changes.clear();
            state.is_dirty = false;
            state.edit_generation += 1;
        });
    }

    fn after_edit(&self) {
        if self.config.enable_optimistic_updates {
            self.scheduler.request_debounced_save();
        }
    }
}
