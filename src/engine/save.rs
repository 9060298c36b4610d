use super::{Inner, PersistenceManager, lock, now_ms, read};
use crate::error::PersistenceError;
use crate::models::{
    ChangeEvent, ConflictRecord, DraftDocument, RemoteDraft, ResolutionStrategy, SavePayload,
    SaveResult, UNTITLED,
};
use crate::services::{SaveTrigger, SnapshotSource, StoreError};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

/// What a save produced: the result every caller sees, plus the typed error
/// manual callers get back.
#[derive(Debug, Clone)]
pub(crate) struct SaveOutcome {
    pub(crate) result: SaveResult,
    pub(crate) error: Option<PersistenceError>,
}

impl SaveOutcome {
    fn ok(result: SaveResult) -> Self {
        Self { result, error: None }
    }

    fn err(error: PersistenceError) -> Self {
        Self {
            result: SaveResult::failed(now_ms(), error.to_string()),
            error: Some(error),
        }
    }

    pub(crate) fn into_result(self) -> Result<SaveResult, PersistenceError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result),
        }
    }
}

/// Everything a save attempt sends, captured when the save is claimed.
struct SaveSnapshot {
    document: DraftDocument,
    changes: Vec<ChangeEvent>,
    local_version: u64,
    last_saved: Option<i64>,
    edit_generation: u64,
    known_remote_modified: Option<i64>,
}

enum SaveStart {
    /// A save is running (ours or one we joined); await its outcome
    Running(watch::Receiver<Option<SaveOutcome>>),
    /// Nothing was sent
    Skipped(SaveOutcome),
}

enum Skip {
    NotDirty { last_saved: Option<i64>, version: u64 },
    Conflict(Option<RemoteDraft>),
}

/// Build and validate the wire payload for one attempt.
///
/// Retries rebuild from the same snapshot, so a retried write carries the
/// same content as the original.
pub(crate) fn build_payload(
    document: &DraftDocument,
    changes: Vec<ChangeEvent>,
    local_version: u64,
    last_saved: Option<i64>,
) -> Result<SavePayload, PersistenceError> {
    if document.id.trim().is_empty() {
        return Err(PersistenceError::Validation("Draft id is required".into()));
    }

    match &document.content {
        Value::Object(_) | Value::Null => {}
        other => {
            return Err(PersistenceError::Validation(format!(
                "Draft content must be an object, got {}",
                json_type(other)
            )));
        }
    }

    let title = document
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();

    let payload = SavePayload {
        id: document.id.clone(),
        title,
        description: document.description.clone(),
        content: document.content.clone(),
        meta: document.meta.clone(),
        changes,
        local_version,
        last_saved,
        include_page_data: true,
    };

    // Fail here rather than inside the store if the payload cannot be encoded
    serde_json::to_vec(&payload)?;

    Ok(payload)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl PersistenceManager {
    /// Save now, unless the document is clean.
    ///
    /// Cancels the pending debounce unless a save is already running, in
    /// which case this awaits that save's result.
    ///
    /// # Errors
    /// Store and validation failures are returned in addition to being
    /// recorded as `save_error`. A detected conflict is not an error: it is
    /// reported through [`SaveResult::conflict_detected`].
    pub async fn save_manual(&self, description: Option<&str>) -> Result<SaveResult, PersistenceError> {
        self.inner
            .save_now(SaveTrigger::Manual, description.map(str::to_string))
            .await
            .into_result()
    }

    /// Like [`save_manual`](Self::save_manual), but always cancels the pending
    /// debounce first.
    pub async fn force_save(&self, description: Option<&str>) -> Result<SaveResult, PersistenceError> {
        self.inner.scheduler.cancel_pending();
        self.inner
            .save_now(SaveTrigger::Forced, description.map(str::to_string))
            .await
            .into_result()
    }
}

impl Inner {
    /// Entry point for every timer-driven save.
    pub(super) async fn run_scheduled(self: Arc<Self>, trigger: SaveTrigger) {
        if self.is_disposed() {
            return;
        }

        let ready = self
            .state
            .read(|s| s.is_dirty && !s.is_saving && !s.has_conflict());
        if !ready {
            tracing::debug!("Skipping {} save: nothing to do or a save is running", trigger);
            return;
        }

        // Failures are already folded into state
        let _ = self.save_now(trigger, None).await;
    }

    pub(super) async fn save_now(self: &Arc<Self>, trigger: SaveTrigger, description: Option<String>) -> SaveOutcome {
        match self.start_save(trigger, description) {
            SaveStart::Skipped(outcome) => outcome,
            SaveStart::Running(mut rx) => match rx.wait_for(Option::is_some).await {
                Ok(value) => value
                    .as_ref()
                    .cloned()
                    .unwrap_or_else(|| SaveOutcome::err(PersistenceError::Cancelled)),
                Err(_) => SaveOutcome::err(PersistenceError::Cancelled),
            },
        }
    }

    /// Claim the save slot, or join the save that holds it.
    fn start_save(self: &Arc<Self>, trigger: SaveTrigger, description: Option<String>) -> SaveStart {
        let mut slot = lock(&self.in_flight);
        if let Some(rx) = slot.as_ref() {
            tracing::debug!("{} save joined the save already in flight", trigger);
            return SaveStart::Running(rx.clone());
        }

        if self.is_disposed() {
            return SaveStart::Skipped(SaveOutcome::err(PersistenceError::Disposed));
        }

        // Held across the claim so the snapshot and the queue agree
        let document = read(&self.document);
        let (claim, _) = self.state.update_with(|s| {
            if !s.is_dirty {
                return Err(Skip::NotDirty {
                    last_saved: s.last_saved,
                    version: s.local_version,
                });
            }
            if trigger != SaveTrigger::Resolution && s.has_conflict() {
                let server = s.conflicts.values().next().map(|c| c.server_snapshot.clone());
                return Err(Skip::Conflict(server));
            }

            if trigger != SaveTrigger::Retry {
                s.retry_count = 0;
            }
            s.is_saving = true;

            Ok(SaveSnapshot {
                document: DraftDocument::clone(&document),
                changes: s.queued_changes.iter().cloned().collect(),
                local_version: s.local_version,
                last_saved: s.last_saved,
                edit_generation: s.edit_generation,
                known_remote_modified: s.known_remote_modified,
            })
        });
        drop(document);

        let snapshot = match claim {
            None => return SaveStart::Skipped(SaveOutcome::err(PersistenceError::Disposed)),
            Some(Err(Skip::NotDirty { last_saved, version })) => {
                tracing::debug!("{} save skipped: no unsaved changes", trigger);
                let result = SaveResult::unchanged(last_saved, version);
                return SaveStart::Skipped(SaveOutcome::ok(result));
            }
            Some(Err(Skip::Conflict(server))) => {
                tracing::debug!("{} save blocked by an open conflict", trigger);
                return SaveStart::Skipped(SaveOutcome::ok(SaveResult::conflict(now_ms(), server)));
            }
            Some(Ok(snapshot)) => snapshot,
        };

        // The save carries every queued change, so a pending debounce is stale
        self.scheduler.cancel_pending();

        let (tx, rx) = watch::channel(None);
        *slot = Some(rx.clone());
        drop(slot);

        let inner = Arc::clone(self);
        self.handle.spawn(async move {
            let outcome = inner.execute_save(trigger, description, snapshot).await;
            lock(&inner.in_flight).take();
            tx.send_replace(Some(outcome));
        });

        SaveStart::Running(rx)
    }

    async fn execute_save(&self, trigger: SaveTrigger, description: Option<String>, snapshot: SaveSnapshot) -> SaveOutcome {
        let payload = match build_payload(
            &snapshot.document,
            snapshot.changes.clone(),
            snapshot.local_version,
            snapshot.last_saved,
        ) {
            Ok(payload) => payload,
            Err(error) => {
                self.metrics.record_save_attempt();
                self.metrics.record_save_failure();
                return self.finish_failure(trigger, error);
            }
        };

        let check_conflicts = self.config.conflict_detection
            && trigger != SaveTrigger::Resolution
            && !snapshot.changes.is_empty();
        if check_conflicts {
            if let Some(server) = self.check_remote(&snapshot).await {
                return self.finish_conflict(&snapshot, server);
            }
        }

        self.metrics.record_save_attempt();
        let started = Instant::now();
        tracing::debug!(
            "Saving draft {} ({} trigger, {} change(s), v{})",
            payload.id,
            trigger,
            payload.changes.len(),
            payload.local_version
        );

        match self.with_timeout(self.store.save_draft(&payload)).await {
            Ok(ack) => {
                self.metrics.record_save_success(started.elapsed());
                self.finish_success(trigger, description, snapshot, ack.last_modified)
            }
            Err(error) => {
                self.metrics.record_save_failure();
                self.finish_failure(trigger, error.into())
            }
        }
    }

    /// Fetch the remote copy and decide whether it moved under us.
    ///
    /// A failed fetch means "proceed without detection".
    async fn check_remote(&self, snapshot: &SaveSnapshot) -> Option<RemoteDraft> {
        let server = match self.with_timeout(self.store.load_draft(&snapshot.document.id)).await {
            Ok(server) => server,
            Err(StoreError::NotFound(_)) => return None,
            Err(e) => {
                tracing::warn!("Conflict check failed, saving without it: {}", e);
                return None;
            }
        };

        // Our own last write, or the copy we loaded
        if snapshot.known_remote_modified == Some(server.last_modified) {
            return None;
        }

        if self.detector.detect(&snapshot.changes, server.last_modified) {
            Some(server)
        } else {
            None
        }
    }

    pub(super) async fn with_timeout<T>(&self, call: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        let limit = self.config.save_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(limit)),
        }
    }

    fn finish_conflict(&self, snapshot: &SaveSnapshot, server: RemoteDraft) -> SaveOutcome {
        let now = now_ms();
        let record = ConflictRecord {
            id: format!("conflict-{}", uuid::Uuid::new_v4()),
            local_changes: snapshot.changes.clone(),
            conflicted_fields: self.detector.analyze(&snapshot.document, &server),
            server_snapshot: server.clone(),
            detected_at: now,
            resolution_strategy: ResolutionStrategy::Manual,
            resolved: false,
        };

        if self.is_disposed() {
            return SaveOutcome::ok(SaveResult::conflict(now, Some(server)));
        }

        tracing::warn!(
            "Conflict on draft {}: server modified at {}, newest local change at {} ({} field(s) differ)",
            server.id,
            server.last_modified,
            snapshot.changes.iter().map(|c| c.timestamp).max().unwrap_or_default(),
            record.conflicted_fields.len()
        );

        self.metrics.record_conflict_detected();
        self.state.update(|s| {
            s.is_saving = false;
            s.conflicts.insert(record.id.clone(), record);
        });

        SaveOutcome::ok(SaveResult::conflict(now, Some(server)))
    }

    fn finish_success(
        &self,
        trigger: SaveTrigger,
        description: Option<String>,
        snapshot: SaveSnapshot,
        remote_modified: i64,
    ) -> SaveOutcome {
        let now = now_ms();

        if self.is_disposed() {
            tracing::debug!("Discarding save result: engine disposed");
            return SaveOutcome::ok(SaveResult::saved(now, snapshot.local_version + 1));
        }

        let sent: HashSet<&str> = snapshot.changes.iter().map(|c| c.id.as_str()).collect();
        let (applied, _) = self.state.update_with(|s| {
            s.is_saving = false;
            s.save_error = None;
            s.retry_count = 0;
            s.last_saved = Some(now);
            s.local_version += 1;
            s.known_remote_modified = Some(remote_modified);
            s.queued_changes.retain(|c| !sent.contains(c.id.as_str()));
            if s.edit_generation == snapshot.edit_generation {
                s.is_dirty = false;
            }
            (s.local_version, s.is_dirty)
        });
        let Some((version, still_dirty)) = applied else {
            return SaveOutcome::ok(SaveResult::saved(now, snapshot.local_version + 1));
        };

        tracing::info!(
            "Saved draft {} (v{}, {} change(s), {} trigger)",
            snapshot.document.id,
            version,
            snapshot.changes.len(),
            trigger
        );

        lock(&self.cache).invalidate(&snapshot.document.id);
        self.record_version(trigger, description, snapshot.document, version, now);

        if still_dirty && self.config.enable_optimistic_updates {
            tracing::debug!("Edits arrived during save; re-arming debounce");
            self.scheduler.request_debounced_save();
        }

        SaveOutcome::ok(SaveResult::saved(now, version))
    }

    /// Push a history snapshot for this save, if one is due.
    ///
    /// Caller-initiated saves always snapshot; automatic saves snapshot every
    /// `auto_snapshot_interval` successful saves.
    fn record_version(
        &self,
        trigger: SaveTrigger,
        description: Option<String>,
        document: DraftDocument,
        version: u64,
        now: i64,
    ) {
        if !self.config.enable_version_control {
            return;
        }

        let successful_saves = version.saturating_sub(1);
        let (source, description) = match trigger {
            SaveTrigger::Manual | SaveTrigger::Forced => (
                SnapshotSource::User,
                description.unwrap_or_else(|| format!("Manual save v{version}")),
            ),
            SaveTrigger::Resolution => (
                SnapshotSource::System,
                description.unwrap_or_else(|| "Conflict resolution".to_string()),
            ),
            SaveTrigger::Auto | SaveTrigger::Background | SaveTrigger::Retry => {
                let interval = self.config.auto_snapshot_interval;
                if interval == 0 || successful_saves % interval != 0 {
                    return;
                }
                (SnapshotSource::AutoSave, format!("Auto-save v{version}"))
            }
        };

        lock(&self.versions).push_snapshot(document, description, source, now);
    }

    fn finish_failure(&self, trigger: SaveTrigger, error: PersistenceError) -> SaveOutcome {
        let outcome = SaveOutcome::err(error.clone());

        if self.is_disposed() {
            tracing::debug!("Discarding failed save: engine disposed");
            return outcome;
        }

        let max_retries = self.config.retry_attempts;
        let (retry, _) = self.state.update_with(|s| {
            s.is_saving = false;
            s.save_error = Some(error.to_string());
            if error.is_retryable() && s.retry_count < max_retries {
                s.retry_count += 1;
                Some(s.retry_count)
            } else {
                None
            }
        });

        match retry.flatten() {
            Some(attempt) => {
                tracing::warn!(
                    "{} save failed: {}; retry {}/{} in {}ms",
                    trigger,
                    error,
                    attempt,
                    max_retries,
                    self.config.retry_delay_ms
                );
                self.scheduler.schedule_retry(self.config.retry_delay());
            }
            None => {
                tracing::error!("{} save failed: {}; changes kept for the next save", trigger, error);
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_defaults_title() {
        let doc = DraftDocument::new("d1").with_title("   ");
        let payload = build_payload(&doc, Vec::new(), 3, Some(10)).unwrap();

        assert_eq!(payload.title, UNTITLED);
        assert_eq!(payload.local_version, 3);
        assert_eq!(payload.last_saved, Some(10));
        assert!(payload.include_page_data);
    }

    #[test]
    fn test_payload_requires_id() {
        let doc = DraftDocument::new(" ");
        assert!(matches!(
            build_payload(&doc, Vec::new(), 1, None),
            Err(PersistenceError::Validation(_))
        ));
    }

    #[test]
    fn test_payload_rejects_non_object_content() {
        let doc = DraftDocument::new("d1").with_content(json!(["not", "a", "page"]));
        let err = build_payload(&doc, Vec::new(), 1, None).unwrap_err();
        assert_eq!(
            err,
            PersistenceError::Validation("Draft content must be an object, got array".into())
        );
    }

    #[test]
    fn test_outcome_into_result() {
        let ok = SaveOutcome::ok(SaveResult::saved(1, 2)).into_result();
        assert!(ok.is_ok());

        let err = SaveOutcome::err(PersistenceError::Disposed).into_result();
        assert_eq!(err, Err(PersistenceError::Disposed));
    }
}
