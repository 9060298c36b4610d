use crate::models::ChangeEvent;
use crate::models::path::set_path;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Title used when a draft has none.
pub const UNTITLED: &str = "Untitled Project";

/// The live, editable draft owned by the engine.
///
/// `content` is opaque to the engine: whatever the page editor serializes.
/// `meta` carries free-form onboarding fields that travel with every save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftDocument {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl DraftDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// JSON view addressed by change and conflict paths:
    /// `{id, title, description, content, meta}`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("id".into(), Value::String(self.id.clone()));
        map.insert("title".into(), self.title.clone().map_or(Value::Null, Value::String));
        map.insert(
            "description".into(),
            self.description.clone().map_or(Value::Null, Value::String),
        );
        map.insert("content".into(), self.content.clone());
        map.insert("meta".into(), Value::Object(self.meta.clone()));
        Value::Object(map)
    }

    /// Apply a tracked edit's new value at the location it addresses.
    pub fn apply_change(&mut self, change: &ChangeEvent) -> Result<(), serde_json::Error> {
        let mut view = self.to_value();
        set_path(&mut view, &change.path(), Some(change.new_value.clone()));

        *self = serde_json::from_value(view)?;
        Ok(())
    }

    /// Serialized size in bytes, used for snapshot bookkeeping.
    pub fn size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

impl From<RemoteDraft> for DraftDocument {
    fn from(remote: RemoteDraft) -> Self {
        Self {
            id: remote.id,
            title: remote.title,
            description: remote.description,
            content: remote.content,
            meta: remote.meta,
        }
    }
}

/// A draft as returned by the remote store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDraft {
    #[serde(default, alias = "tokenId")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default)]
    pub meta: Map<String, Value>,
    /// Milliseconds since the Unix epoch of the last write the server accepted.
    #[serde(default, alias = "lastUpdated")]
    pub last_modified: i64,
}

/// Body of a "save draft" write.
///
/// Built once per save attempt from the document and the queued changes, so
/// a retried attempt re-sends a full, self-contained copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavePayload {
    #[serde(rename = "tokenId")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub content: Value,
    #[serde(default)]
    pub meta: Map<String, Value>,
    #[serde(default)]
    pub changes: Vec<ChangeEvent>,
    pub local_version: u64,
    #[serde(default)]
    pub last_saved: Option<i64>,
    pub include_page_data: bool,
}

/// Acknowledgement of an accepted save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveAck {
    /// Server-side last-modified stamp after the write.
    #[serde(default, alias = "lastUpdated")]
    pub last_modified: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_remote_draft_accepts_legacy_field_names() {
        let remote: RemoteDraft = serde_json::from_value(json!({
            "tokenId": "tok-1",
            "title": "Landing",
            "content": {"hero": {"headline": "Hi"}},
            "lastUpdated": 1700000000000i64
        }))
        .unwrap();

        assert_eq!(remote.id, "tok-1");
        assert_eq!(remote.last_modified, 1_700_000_000_000);
        assert_eq!(remote.meta.len(), 0);
    }

    #[test]
    fn test_document_from_remote() {
        let remote = RemoteDraft {
            id: "d1".into(),
            title: Some("T".into()),
            content: json!({"a": 1}),
            last_modified: 5,
            ..RemoteDraft::default()
        };
        let doc = DraftDocument::from(remote);
        assert_eq!(doc.id, "d1");
        assert_eq!(doc.content, json!({"a": 1}));
    }

    #[test]
    fn test_apply_change_writes_at_path() {
        let mut doc = DraftDocument::new("d1").with_content(json!({"hero": {"headline": "Old"}}));
        let change = ChangeEvent {
            id: "c1".into(),
            kind: crate::models::ChangeKind::Content,
            section_id: Some("hero".into()),
            element_key: Some("headline".into()),
            field: None,
            old_value: json!("Old"),
            new_value: json!("New"),
            timestamp: 1,
            source: crate::models::ChangeSource::User,
        };

        doc.apply_change(&change).unwrap();
        assert_eq!(doc.content, json!({"hero": {"headline": "New"}}));
        assert_eq!(doc.id, "d1");
    }

    #[test]
    fn test_document_size_nonzero() {
        let doc = DraftDocument::new("d1").with_content(json!({"x": "y"}));
        assert!(doc.size() > 0);
    }
}
