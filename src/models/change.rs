use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which part of the draft an edit touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Content,
    Layout,
    Theme,
    Meta,
}

impl ChangeKind {
    /// Wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Layout => "layout",
            Self::Theme => "theme",
            Self::Meta => "meta",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who produced an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    User,
    Ai,
    System,
}

/// A single recorded edit.
///
/// Immutable once created. The change queue owns it until a confirmed save
/// consumes it or the queue bound evicts it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default)]
    pub old_value: Value,
    #[serde(default)]
    pub new_value: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub source: ChangeSource,
}

impl ChangeEvent {
    /// Dot path of the document location this change touched.
    ///
    /// Layout and theme live inside the page content, so a theme change to
    /// `accent` addresses `content.theme.accent`; meta changes address
    /// `meta.<field>`. Missing segments are skipped, so a section-wide AI
    /// rewrite yields `content.<section>`.
    pub fn path(&self) -> String {
        let mut parts: Vec<&str> = match self.kind {
            ChangeKind::Content => vec!["content"],
            ChangeKind::Layout => vec!["content", "layout"],
            ChangeKind::Theme => vec!["content", "theme"],
            ChangeKind::Meta => vec!["meta"],
        };
        parts.extend(self.section_id.as_deref());
        parts.extend(self.element_key.as_deref());
        parts.extend(self.field.as_deref());
        parts.join(".")
    }
}

/// An edit as reported by a caller, before the tracker stamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEventInput {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub element_key: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub old_value: Value,
    #[serde(default)]
    pub new_value: Value,
    #[serde(default = "default_source")]
    pub source: ChangeSource,
}

fn default_source() -> ChangeSource {
    ChangeSource::User
}

impl ChangeEventInput {
    /// A user edit to one element of a section.
    pub fn content(
        section_id: impl Into<String>,
        element_key: impl Into<String>,
        old_value: impl Into<Value>,
        new_value: impl Into<Value>,
    ) -> Self {
        Self {
            kind: ChangeKind::Content,
            section_id: Some(section_id.into()),
            element_key: Some(element_key.into()),
            field: None,
            old_value: old_value.into(),
            new_value: new_value.into(),
            source: ChangeSource::User,
        }
    }

    pub fn layout(field: impl Into<String>, old_value: impl Into<Value>, new_value: impl Into<Value>) -> Self {
        Self::field_change(ChangeKind::Layout, field, old_value, new_value)
    }

    pub fn theme(field: impl Into<String>, old_value: impl Into<Value>, new_value: impl Into<Value>) -> Self {
        Self::field_change(ChangeKind::Theme, field, old_value, new_value)
    }

    pub fn meta(field: impl Into<String>, old_value: impl Into<Value>, new_value: impl Into<Value>) -> Self {
        Self::field_change(ChangeKind::Meta, field, old_value, new_value)
    }

    /// Generated content. There is no meaningful previous value, so
    /// `old_value` is always null.
    pub fn ai(kind: ChangeKind, section_id: Option<String>, data: impl Into<Value>) -> Self {
        Self {
            kind,
            section_id,
            element_key: None,
            field: None,
            old_value: Value::Null,
            new_value: data.into(),
            source: ChangeSource::Ai,
        }
    }

    pub fn with_source(mut self, source: ChangeSource) -> Self {
        self.source = source;
        self
    }

    fn field_change(
        kind: ChangeKind,
        field: impl Into<String>,
        old_value: impl Into<Value>,
        new_value: impl Into<Value>,
    ) -> Self {
        Self {
            kind,
            section_id: None,
            element_key: None,
            field: Some(field.into()),
            old_value: old_value.into(),
            new_value: new_value.into(),
            source: ChangeSource::User,
        }
    }
}
