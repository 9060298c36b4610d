use crate::models::{ChangeEvent, DraftDocument, RemoteDraft};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

/// Coarse save lifecycle, derived from [`PersistenceState`].
///
/// `Idle -> Dirty -> Saving -> (Idle | ConflictPending | Failed)`; a failed
/// save with retries left returns to `Dirty` once the retry is scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SavePhase {
    Idle,
    Dirty,
    Saving,
    ConflictPending,
    Failed,
}

/// Live status of the persistence engine.
///
/// Single writer: only [`crate::engine::PersistenceManager`] mutates it,
/// through [`crate::state::StateManager::update`]. Readers get clones.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PersistenceState {
    pub is_dirty: bool,
    pub is_saving: bool,
    pub is_loading: bool,
    pub last_saved: Option<i64>,
    pub last_loaded: Option<i64>,
    pub save_error: Option<String>,
    pub load_error: Option<String>,
    pub retry_count: u32,
    pub queued_changes: VecDeque<ChangeEvent>,
    pub local_version: u64,

    /// Open conflicts keyed by id, in detection order
    pub conflicts: IndexMap<String, ConflictRecord>,

    /// Server last-modified stamp this client last observed, either from a
    /// load or from the acknowledgement of its own save
    pub known_remote_modified: Option<i64>,

    /// Bumped on every document edit; a save only clears `is_dirty` when no
    /// edit landed while it was in flight
    pub edit_generation: u64,
}

impl Default for PersistenceState {
    fn default() -> Self {
        Self {
            is_dirty: false,
            is_saving: false,
            is_loading: false,
            last_saved: None,
            last_loaded: None,
            save_error: None,
            load_error: None,
            retry_count: 0,
            queued_changes: VecDeque::new(),
            local_version: 1,
            conflicts: IndexMap::new(),
            known_remote_modified: None,
            edit_generation: 0,
        }
    }
}

impl PersistenceState {
    pub fn has_conflict(&self) -> bool {
        !self.conflicts.is_empty()
    }

    pub fn phase(&self) -> SavePhase {
        if self.is_saving {
            SavePhase::Saving
        } else if self.has_conflict() {
            SavePhase::ConflictPending
        } else if self.is_dirty && self.save_error.is_some() {
            SavePhase::Failed
        } else if self.is_dirty {
            SavePhase::Dirty
        } else {
            SavePhase::Idle
        }
    }

    /// Newest timestamp among the queued changes.
    pub fn last_local_change(&self) -> Option<i64> {
        self.queued_changes.iter().map(|c| c.timestamp).max()
    }
}

/// Outcome of one save attempt. Never mutated after it is returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveResult {
    pub success: bool,
    /// When the attempt finished. A save skipped because nothing changed
    /// reports the last real save instead, or `None` if there never was one.
    pub timestamp: Option<i64>,
    pub version: Option<u64>,
    pub error: Option<String>,
    pub conflict_detected: bool,
    pub server_data: Option<RemoteDraft>,
}

impl SaveResult {
    pub fn saved(timestamp: i64, version: u64) -> Self {
        Self {
            success: true,
            timestamp: Some(timestamp),
            version: Some(version),
            error: None,
            conflict_detected: false,
            server_data: None,
        }
    }

    /// Result of a save that had nothing to write.
    pub fn unchanged(last_saved: Option<i64>, version: u64) -> Self {
        Self {
            success: true,
            timestamp: last_saved,
            version: Some(version),
            error: None,
            conflict_detected: false,
            server_data: None,
        }
    }

    pub fn failed(timestamp: i64, error: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: Some(timestamp),
            version: None,
            error: Some(error.into()),
            conflict_detected: false,
            server_data: None,
        }
    }

    pub fn conflict(timestamp: i64, server_data: Option<RemoteDraft>) -> Self {
        Self {
            success: false,
            timestamp: Some(timestamp),
            version: None,
            error: Some("Conflict detected".to_string()),
            conflict_detected: true,
            server_data,
        }
    }
}

/// Outcome of one load attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    pub success: bool,
    pub data: Option<RemoteDraft>,
    pub error: Option<String>,
    pub from_cache: bool,
    pub timestamp: i64,
}

/// How an open conflict should be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    /// Keep the local document and queued changes, overwrite the server.
    LatestWins,
    /// Adopt the server snapshot and drop queued changes.
    KeepRemote,
    /// Combine server and local per field, honoring caller picks.
    AutoMerge,
    /// Leave the conflict open until the caller decides.
    Manual,
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LatestWins => "latest-wins",
            Self::KeepRemote => "keep-remote",
            Self::AutoMerge => "auto-merge",
            Self::Manual => "manual",
        };
        f.write_str(name)
    }
}

/// How a single field differs between the local and server documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldChangeKind {
    Modified,
    /// Present on the server only
    Added,
    /// Present locally only
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictField {
    pub path: String,
    pub local_value: Option<Value>,
    pub server_value: Option<Value>,
    pub kind: FieldChangeKind,
}

/// A detected divergence between the queued local edits and the server.
///
/// Exists only while unresolved; resolving is the only way to remove it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub id: String,
    pub local_changes: Vec<ChangeEvent>,
    pub server_snapshot: RemoteDraft,
    pub conflicted_fields: Vec<ConflictField>,
    pub detected_at: i64,
    pub resolution_strategy: ResolutionStrategy,
    pub resolved: bool,
}

/// What a call to resolve a conflict produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub conflict_id: String,
    pub strategy: ResolutionStrategy,
    pub resolved: bool,
    /// Document now held by the engine, when the strategy replaced it
    pub document: Option<DraftDocument>,
    /// Result of the forced save issued after resolving, if any
    pub save: Option<SaveResult>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeKind, ChangeSource};

    fn change(ts: i64) -> ChangeEvent {
        ChangeEvent {
            id: format!("c{ts}"),
            kind: ChangeKind::Content,
            section_id: None,
            element_key: None,
            field: None,
            old_value: Value::Null,
            new_value: Value::from(ts),
            timestamp: ts,
            source: ChangeSource::User,
        }
    }

    #[test]
    fn test_default_state_is_idle() {
        let state = PersistenceState::default();
        assert_eq!(state.phase(), SavePhase::Idle);
        assert_eq!(state.local_version, 1);
        assert!(!state.has_conflict());
    }

    #[test]
    fn test_phase_precedence() {
        let mut state = PersistenceState {
            is_dirty: true,
            ..PersistenceState::default()
        };
        assert_eq!(state.phase(), SavePhase::Dirty);

        state.save_error = Some("offline".into());
        assert_eq!(state.phase(), SavePhase::Failed);

        state.is_saving = true;
        assert_eq!(state.phase(), SavePhase::Saving);
    }

    #[test]
    fn test_last_local_change() {
        let mut state = PersistenceState::default();
        assert_eq!(state.last_local_change(), None);

        state.queued_changes.extend([change(3), change(9), change(5)]);
        assert_eq!(state.last_local_change(), Some(9));
    }

    #[test]
    fn test_strategy_display() {
        assert_eq!(ResolutionStrategy::LatestWins.to_string(), "latest-wins");
        assert_eq!(ResolutionStrategy::AutoMerge.to_string(), "auto-merge");
    }
}
