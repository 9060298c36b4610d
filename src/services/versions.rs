use crate::models::DraftDocument;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SnapshotSource {
    User,
    AutoSave,
    System,
}

/// An immutable copy of the document at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSnapshot {
    pub id: String,
    /// Monotonic per manager; never reused after eviction or undo
    pub version: u64,
    pub description: String,
    pub data: DraftDocument,
    pub created_at: i64,
    pub source: SnapshotSource,
    pub size: usize,
}

/// One line of [`VersionManager::history_summary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub id: String,
    pub version: u64,
    pub description: String,
    pub created_at: i64,
    pub source: SnapshotSource,
    pub size: usize,
    pub is_current: bool,
}

/// Serialized form used by export/import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionHistory {
    pub snapshots: Vec<VersionSnapshot>,
    pub cursor: usize,
    pub next_version: u64,
}

/// Bounded undo/redo stack of document snapshots.
///
/// `cursor` counts the snapshots at or before the current one, so it ranges
/// over `0..=len`: `snapshots[cursor - 1]` is current, everything after it is
/// redo history. Undo/redo never touch the remote store.
#[derive(Debug)]
pub struct VersionManager {
    snapshots: VecDeque<VersionSnapshot>,
    cursor: usize,
    max_snapshots: usize,
    next_version: u64,
}

impl VersionManager {
    pub fn new(max_snapshots: usize) -> Self {
        Self {
            snapshots: VecDeque::new(),
            cursor: 0,
            max_snapshots: max_snapshots.max(1),
            next_version: 1,
        }
    }

    /// Record `data` as the new current snapshot, dropping any redo entries.
    pub fn push_snapshot(
        &mut self,
        data: DraftDocument,
        description: impl Into<String>,
        source: SnapshotSource,
        created_at: i64,
    ) -> &VersionSnapshot {
        self.snapshots.truncate(self.cursor);

        let version = self.next_version;
        self.next_version += 1;

        let snapshot = VersionSnapshot {
            id: format!("snapshot-{}", uuid::Uuid::new_v4()),
            version,
            description: description.into(),
            size: data.size(),
            data,
            created_at,
            source,
        };
        tracing::debug!(
            "Version snapshot v{} ({:?}): {}",
            snapshot.version,
            snapshot.source,
            snapshot.description
        );
        self.snapshots.push_back(snapshot);

        while self.snapshots.len() > self.max_snapshots {
            self.snapshots.pop_front();
        }
        self.cursor = self.snapshots.len();

        &self.snapshots[self.cursor - 1]
    }

    /// Step back one snapshot. `None` at the start of history.
    pub fn undo(&mut self) -> Option<&VersionSnapshot> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        self.snapshots.get(self.cursor - 1)
    }

    /// Step forward one snapshot. `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Option<&VersionSnapshot> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        self.snapshots.get(self.cursor - 1)
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 1
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.snapshots.len()
    }

    pub fn current(&self) -> Option<&VersionSnapshot> {
        self.cursor
            .checked_sub(1)
            .and_then(|i| self.snapshots.get(i))
    }

    pub fn snapshot(&self, id: &str) -> Option<&VersionSnapshot> {
        self.snapshots.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn history_summary(&self) -> Vec<VersionSummary> {
        self.snapshots
            .iter()
            .enumerate()
            .map(|(i, s)| VersionSummary {
                id: s.id.clone(),
                version: s.version,
                description: s.description.clone(),
                created_at: s.created_at,
                source: s.source,
                size: s.size,
                is_current: i + 1 == self.cursor,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.cursor = 0;
    }

    pub fn export_history(&self) -> VersionHistory {
        VersionHistory {
            snapshots: self.snapshots.iter().cloned().collect(),
            cursor: self.cursor,
            next_version: self.next_version,
        }
    }

    /// Replace the history with an exported one.
    ///
    /// Oversized histories keep their newest entries; the cursor is clamped
    /// into range.
    pub fn import_history(&mut self, history: VersionHistory) {
        let mut snapshots: VecDeque<VersionSnapshot> = history.snapshots.into();
        let mut cursor = history.cursor.min(snapshots.len());

        while snapshots.len() > self.max_snapshots {
            snapshots.pop_front();
            cursor = cursor.saturating_sub(1);
        }

        let max_seen = snapshots.iter().map(|s| s.version).max().unwrap_or(0);
        self.next_version = history.next_version.max(max_seen + 1);
        self.snapshots = snapshots;
        self.cursor = cursor;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn doc(label: &str) -> DraftDocument {
        DraftDocument::new("d1").with_content(json!({ "label": label }))
    }

    fn label(snapshot: Option<&VersionSnapshot>) -> Option<String> {
        snapshot.map(|s| s.data.content["label"].as_str().unwrap_or_default().to_string())
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut versions = VersionManager::new(10);
        versions.push_snapshot(doc("A"), "A", SnapshotSource::User, 1);
        versions.push_snapshot(doc("B"), "B", SnapshotSource::User, 2);

        assert_eq!(label(versions.undo()), Some("A".into()));
        assert_eq!(label(versions.redo()), Some("B".into()));

        versions.undo();
        versions.push_snapshot(doc("C"), "C", SnapshotSource::User, 3);

        assert!(!versions.can_redo());
        assert!(versions.redo().is_none());
        assert_eq!(label(versions.current()), Some("C".into()));
        assert_eq!(label(versions.undo()), Some("A".into()));
    }

    #[test]
    fn test_undo_at_start_is_noop() {
        let mut versions = VersionManager::new(10);
        assert!(versions.undo().is_none());

        versions.push_snapshot(doc("A"), "A", SnapshotSource::User, 1);
        assert!(!versions.can_undo());
        assert!(versions.undo().is_none());
        assert_eq!(label(versions.current()), Some("A".into()));
    }

    #[test]
    fn test_eviction_drops_oldest() {
        let mut versions = VersionManager::new(2);
        for name in ["A", "B", "C"] {
            versions.push_snapshot(doc(name), name, SnapshotSource::AutoSave, 0);
        }

        let names: Vec<String> = versions
            .history_summary()
            .into_iter()
            .map(|s| s.description)
            .collect();
        assert_eq!(names, vec!["B", "C"]);
        assert_eq!(versions.current().map(|s| s.version), Some(3));
    }

    #[test]
    fn test_export_import() {
        let mut versions = VersionManager::new(5);
        versions.push_snapshot(doc("A"), "A", SnapshotSource::User, 1);
        versions.push_snapshot(doc("B"), "B", SnapshotSource::System, 2);
        versions.undo();

        let exported = serde_json::to_string(&versions.export_history()).unwrap();

        let mut restored = VersionManager::new(5);
        restored.import_history(serde_json::from_str(&exported).unwrap());

        assert_eq!(label(restored.current()), Some("A".into()));
        assert!(restored.can_redo());
        let next = restored.push_snapshot(doc("C"), "C", SnapshotSource::User, 3);
        assert_eq!(next.version, 3);
    }

    #[test]
    fn test_snapshot_lookup_and_clear() {
        let mut versions = VersionManager::new(5);
        let id = versions
            .push_snapshot(doc("A"), "A", SnapshotSource::User, 1)
            .id
            .clone();

        assert!(versions.snapshot(&id).is_some());
        versions.clear();
        assert!(versions.is_empty());
        assert!(versions.current().is_none());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Push,
        Undo,
        Redo,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![Just(Op::Push), Just(Op::Undo), Just(Op::Redo)]
    }

    proptest! {
        #[test]
        fn prop_cursor_stays_in_bounds(max in 1usize..8, ops in prop::collection::vec(op(), 0..60)) {
            let mut versions = VersionManager::new(max);

            for (i, op) in ops.iter().enumerate() {
                match op {
                    Op::Push => {
                        versions.push_snapshot(doc(&i.to_string()), "step", SnapshotSource::User, i as i64);
                    }
                    Op::Undo => {
                        versions.undo();
                    }
                    Op::Redo => {
                        versions.redo();
                    }
                }

                prop_assert!(versions.len() <= max);
                prop_assert!(versions.cursor <= versions.len());
                prop_assert_eq!(versions.current().is_some(), versions.cursor > 0);
                prop_assert_eq!(versions.can_redo(), versions.cursor < versions.len());
            }
        }
    }
}
