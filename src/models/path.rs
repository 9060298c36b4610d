//! Dot-separated paths into a draft's JSON view (`content.hero.headline`).

use serde_json::{Map, Value};

/// `ancestor` equals `path` or is one of its dot-separated prefixes.
pub fn path_covers(ancestor: &str, path: &str) -> bool {
    path == ancestor
        || (path.starts_with(ancestor) && path.as_bytes().get(ancestor.len()) == Some(&b'.'))
}

/// One path is an ancestor of (or equal to) the other.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    path_covers(a, b) || path_covers(b, a)
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// `None` removes the leaf; removing under a missing or non-object parent is
/// a no-op.
pub fn set_path(root: &mut Value, path: &str, value: Option<Value>) {
    let segments: Vec<&str> = path.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            if value.is_none() {
                return;
            }
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        if value.is_none() {
            return;
        }
        *current = Value::Object(Map::new());
    }
    if let Value::Object(map) = current {
        match value {
            Some(v) => {
                map.insert(last.to_string(), v);
            }
            None => {
                map.remove(*last);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_covers_respects_segment_boundaries() {
        assert!(path_covers("content.hero", "content.hero.headline"));
        assert!(path_covers("content.hero", "content.hero"));
        assert!(!path_covers("content.her", "content.hero"));
        assert!(paths_overlap("content.hero.headline", "content.hero"));
    }

    #[test]
    fn test_set_path_creates_parents() {
        let mut root = json!({"content": null});
        set_path(&mut root, "content.hero.headline", Some(json!("Hi")));
        assert_eq!(root, json!({"content": {"hero": {"headline": "Hi"}}}));
    }

    #[test]
    fn test_remove_missing_path_is_noop() {
        let mut root = json!({"content": "plain"});
        set_path(&mut root, "content.hero.badge", None);
        assert_eq!(root, json!({"content": "plain"}));
    }
}
