use super::{PersistenceManager, now_ms, write};
use crate::error::PersistenceError;
use crate::models::{ConflictRecord, DraftDocument, MergeResult, ResolutionStrategy};
use crate::services::SaveTrigger;
use indexmap::IndexMap;
use serde_json::Value;

impl PersistenceManager {
    /// Settle an open conflict.
    ///
    /// - `LatestWins` keeps the local document and queue, then force-saves
    ///   over the server copy.
    /// - `KeepRemote` adopts the server copy and drops the queued changes.
    ///   Nothing is written.
    /// - `AutoMerge` merges per field (see
    ///   [`ConflictResolver::merge`](crate::services::ConflictResolver::merge)),
    ///   applying `resolutions` as explicit picks, then force-saves the result.
    /// - `Manual` leaves the conflict open.
    ///
    /// The forced save's outcome, including any failure, is reported in
    /// [`MergeResult::save`]; the conflict stays resolved either way.
    ///
    /// # Errors
    /// [`PersistenceError::ConflictNotFound`] for an unknown id,
    /// [`PersistenceError::Serialization`] if the merged document is invalid.
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        strategy: ResolutionStrategy,
        resolutions: Option<IndexMap<String, Value>>,
    ) -> Result<MergeResult, PersistenceError> {
        self.inner.ensure_live()?;

        let record = self
            .inner
            .state
            .read(|s| s.conflicts.get(conflict_id).cloned())
            .ok_or_else(|| PersistenceError::ConflictNotFound(conflict_id.to_string()))?;

        tracing::info!("Resolving conflict {} with {}", conflict_id, strategy);

        let document = match strategy {
            ResolutionStrategy::Manual => {
                self.inner.state.update(|s| {
                    if let Some(open) = s.conflicts.get_mut(conflict_id) {
                        open.resolution_strategy = ResolutionStrategy::Manual;
                    }
                });
                return Ok(MergeResult {
                    conflict_id: conflict_id.to_string(),
                    strategy,
                    resolved: false,
                    document: None,
                    save: None,
                });
            }
            ResolutionStrategy::KeepRemote => {
                let remote = DraftDocument::from(record.server_snapshot.clone());
                self.settle(&record, Some(remote.clone()), false);
                return Ok(MergeResult {
                    conflict_id: conflict_id.to_string(),
                    strategy,
                    resolved: true,
                    document: Some(remote),
                    save: None,
                });
            }
            ResolutionStrategy::LatestWins => None,
            ResolutionStrategy::AutoMerge => {
                let local = self.document();
                let merged = self.inner.resolver.merge(
                    &local,
                    &record,
                    &resolutions.unwrap_or_default(),
                )?;
                Some(merged)
            }
        };

        self.settle(&record, document.clone(), true);

        let description = format!("Resolved conflict ({strategy})");
        let outcome = self
            .inner
            .save_now(SaveTrigger::Resolution, Some(description))
            .await;

        Ok(MergeResult {
            conflict_id: conflict_id.to_string(),
            strategy,
            resolved: true,
            document,
            save: Some(outcome.result),
        })
    }

    /// Remove the conflict and install its outcome.
    ///
    /// `dirty` leaves the document flagged for the forced save that follows;
    /// otherwise the queue is dropped along with the dirty flag.
    fn settle(&self, record: &ConflictRecord, document: Option<DraftDocument>, dirty: bool) {
        let inner = &self.inner;
        let mut current = write(&inner.document);
        if let Some(document) = document {
            *current = document;
        }

        inner.metrics.record_conflict_resolved();
        inner.state.update(|s| {
            s.conflicts.shift_remove(&record.id);
            s.known_remote_modified = Some(record.server_snapshot.last_modified);
            if dirty {
                s.is_dirty = true;
                s.edit_generation += 1;
            } else {
                s.queued_changes.clear();
                s.is_dirty = false;
                s.save_error = None;
                s.edit_generation += 1;
                s.last_loaded = Some(now_ms());
            }
        });
    }
}
