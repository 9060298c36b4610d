//! Conflict detection and merging.
//!
//! Detection is a last-writer-wins heuristic: it reports *that* the server
//! advanced past this client's newest pending edit, not which fields collided.
//! Field-level analysis ([`ConflictDetector::analyze`]) and merging
//! ([`ConflictResolver::merge`]) work on a JSON view of the draft.

use crate::models::path::{path_covers, paths_overlap, set_path};
use crate::models::{
    ChangeEvent, ConflictField, ConflictRecord, DraftDocument, FieldChangeKind, RemoteDraft,
};
use indexmap::IndexMap;
use serde_json::Value;

/// Decides whether the remote copy moved under the pending local edits.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// `true` iff the server was written strictly after the newest local change.
    ///
    /// An empty change list has a newest change time of 0, so any server copy
    /// with a positive stamp counts as newer.
    pub fn detect(&self, local_changes: &[ChangeEvent], server_last_modified: i64) -> bool {
        let last_local_change = local_changes
            .iter()
            .map(|c| c.timestamp)
            .max()
            .unwrap_or(0);

        server_last_modified > last_local_change
    }

    /// Every leaf where the local document and the server copy disagree.
    pub fn analyze(&self, local: &DraftDocument, server: &RemoteDraft) -> Vec<ConflictField> {
        let mut fields = Vec::new();
        let server = DraftDocument::from(server.clone());
        diff_values(&local.to_value(), &server.to_value(), "", &mut fields);
        fields
    }
}

/// Produces merged documents for resolved conflicts.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Field-level merge of the local document with the conflict's server copy.
    ///
    /// For each conflicted field, in order of precedence:
    /// 1. an explicit caller resolution for that path (or an ancestor) wins;
    /// 2. a field touched by a pending local change keeps the local value;
    /// 3. anything else takes the server value, including server-side
    ///    additions and deletions.
    pub fn merge(
        &self,
        local: &DraftDocument,
        record: &ConflictRecord,
        resolutions: &IndexMap<String, Value>,
    ) -> Result<DraftDocument, serde_json::Error> {
        let mut merged = local.to_value();

        for field in &record.conflicted_fields {
            if resolutions
                .keys()
                .any(|path| path_covers(path, &field.path))
            {
                continue;
            }

            let touched_locally = record
                .local_changes
                .iter()
                .any(|c| paths_overlap(&c.path(), &field.path));
            if touched_locally {
                continue;
            }

            set_path(&mut merged, &field.path, field.server_value.clone());
        }

        for (path, value) in resolutions {
            set_path(&mut merged, path, Some(value.clone()));
        }

        let mut document: DraftDocument = serde_json::from_value(merged)?;
        document.id = local.id.clone();
        Ok(document)
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn diff_values(local: &Value, server: &Value, path: &str, out: &mut Vec<ConflictField>) {
    match (local, server) {
        (Value::Object(l), Value::Object(s)) => {
            for (key, lv) in l {
                let child = join(path, key);
                match s.get(key) {
                    Some(sv) => diff_values(lv, sv, &child, out),
                    None => out.push(ConflictField {
                        path: child,
                        local_value: Some(lv.clone()),
                        server_value: None,
                        kind: FieldChangeKind::Deleted,
                    }),
                }
            }
            for (key, sv) in s {
                if !l.contains_key(key) {
                    out.push(ConflictField {
                        path: join(path, key),
                        local_value: None,
                        server_value: Some(sv.clone()),
                        kind: FieldChangeKind::Added,
                    });
                }
            }
        }
        _ if local != server => out.push(ConflictField {
            path: path.to_string(),
            local_value: Some(local.clone()),
            server_value: Some(server.clone()),
            kind: FieldChangeKind::Modified,
        }),
        _ => {}
    }
}
