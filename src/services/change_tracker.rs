use crate::models::{ChangeEvent, ChangeEventInput, ChangeKind};
use regex::Regex;
use serde_json::Value;
use std::collections::VecDeque;

/// Records discrete edits and decides which are worth saving.
///
/// The tracker holds no queue itself: the queue lives on
/// [`PersistenceState`](crate::models::PersistenceState) so it is observed and
/// cleared under the same lock as `is_dirty`.
pub struct ChangeTracker {
    max_queue_size: usize,

    /// Meta fields that only carry timestamp churn (`lastUpdated`,
    /// `updated_at`, `lastModified`, ...)
    churn_field_pattern: Regex,
}

impl ChangeTracker {
    pub fn new(max_queue_size: usize) -> Self {
        Self {
            max_queue_size: max_queue_size.max(1),
            churn_field_pattern: Regex::new(r"(?i)^(last_?updated|updated_?at|last_?modified|modified_?at|timestamp)$")
                .expect("Invalid churn field regex"),
        }
    }

    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Stamp an input with an id and timestamp.
    ///
    /// Returns `None` when the edit fails the significance filter.
    pub fn record(&self, input: ChangeEventInput, timestamp: i64) -> Option<ChangeEvent> {
        let event = ChangeEvent {
            id: format!("change-{}", uuid::Uuid::new_v4()),
            kind: input.kind,
            section_id: input.section_id,
            element_key: input.element_key,
            field: input.field,
            old_value: input.old_value,
            new_value: input.new_value,
            timestamp,
            source: input.source,
        };

        if self.is_significant(&event) {
            Some(event)
        } else {
            tracing::trace!("Ignoring insignificant change at {}", event.path());
            None
        }
    }

    /// Whether an edit carries information worth persisting.
    ///
    /// Rejects no-op writes, metadata timestamp churn, and writes of a blank
    /// string, whatever the previous value was.
    pub fn is_significant(&self, event: &ChangeEvent) -> bool {
        if event.old_value == event.new_value {
            return false;
        }

        if event.kind == ChangeKind::Meta
            && event
                .field
                .as_deref()
                .is_some_and(|f| self.churn_field_pattern.is_match(f))
        {
            return false;
        }

        if is_blank_string(&event.new_value) {
            return false;
        }

        true
    }

    /// Append to the queue, evicting the oldest entries past the bound.
    ///
    /// Returns how many entries were evicted.
    pub fn enqueue(&self, queue: &mut VecDeque<ChangeEvent>, event: ChangeEvent) -> usize {
        queue.push_back(event);

        let mut evicted = 0;
        while queue.len() > self.max_queue_size {
            queue.pop_front();
            evicted += 1;
        }

        if evicted > 0 {
            tracing::debug!(
                "Change queue full ({}), evicted {} oldest change(s)",
                self.max_queue_size,
                evicted
            );
        }

        evicted
    }
}

fn is_blank_string(value: &Value) -> bool {
    matches!(value, Value::String(s) if s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn tracker() -> ChangeTracker {
        ChangeTracker::new(3)
    }

    #[test]
    fn test_identical_values_ignored() {
        let input = ChangeEventInput::content("hero", "headline", "Same", "Same");
        assert!(tracker().record(input, 1).is_none());
    }

    #[test]
    fn test_timestamp_churn_ignored() {
        let t = tracker();
        assert!(t.record(ChangeEventInput::meta("lastUpdated", 1, 2), 1).is_none());
        assert!(t.record(ChangeEventInput::meta("updated_at", 1, 2), 1).is_none());
        assert!(t.record(ChangeEventInput::meta("title", "a", "b"), 1).is_some());
    }

    #[test]
    fn test_churn_field_name_only_filtered_for_meta() {
        let input = ChangeEventInput::layout("timestamp", 1, 2);
        assert!(tracker().record(input, 1).is_some());
    }

    #[test]
    fn test_blank_write_over_nothing_ignored() {
        let t = tracker();
        assert!(t.record(ChangeEventInput::content("s", "e", Value::Null, "   "), 1).is_none());
        assert!(t.record(ChangeEventInput::content("s", "e", "", " "), 1).is_none());
    }

    #[test]
    fn test_blank_write_over_content_ignored() {
        let t = tracker();
        assert!(t.record(ChangeEventInput::content("hero", "headline", "Old headline", ""), 1).is_none());
        assert!(t.record(ChangeEventInput::meta("title", "Launch", "  "), 1).is_none());
    }

    #[test]
    fn test_null_over_content_is_significant() {
        let input = ChangeEventInput::content("hero", "image", "hero.png", Value::Null);
        assert!(tracker().record(input, 1).is_some());
    }

    #[test]
    fn test_record_stamps_id_and_timestamp() {
        let event = tracker()
            .record(ChangeEventInput::theme("accent", json!("blue"), json!("red")), 42)
            .unwrap();
        assert!(event.id.starts_with("change-"));
        assert_eq!(event.timestamp, 42);
    }

    #[test]
    fn test_enqueue_evicts_oldest() {
        let t = tracker();
        let mut queue = VecDeque::new();

        let mut evicted = 0;
        for i in 1..=5 {
            let event = t
                .record(ChangeEventInput::content("s", "e", i - 1, i), i as i64)
                .unwrap();
            evicted += t.enqueue(&mut queue, event);
        }

        assert_eq!(evicted, 2);
        let kept: Vec<i64> = queue.iter().map(|c| c.timestamp).collect();
        assert_eq!(kept, vec![3, 4, 5]);
    }

    proptest! {
        #[test]
        fn prop_queue_keeps_newest_within_bound(max in 1usize..20, extra in 0usize..30) {
            let t = ChangeTracker::new(max);
            let mut queue = VecDeque::new();
            let total = max + extra;

            for i in 0..total {
                let event = t
                    .record(ChangeEventInput::content("s", "e", i as i64, i as i64 + 1), i as i64)
                    .unwrap();
                t.enqueue(&mut queue, event);
            }

            prop_assert_eq!(queue.len(), max);
            let first = queue.front().map(|c| c.timestamp);
            prop_assert_eq!(first, Some((total - max) as i64));
            prop_assert_eq!(queue.back().map(|c| c.timestamp), Some(total as i64 - 1));
        }
    }
}
