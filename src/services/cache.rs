use crate::models::RemoteDraft;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

struct CacheEntry {
    draft: RemoteDraft,
    inserted_at: Instant,
}

/// TTL cache of loaded drafts, keyed by draft id.
pub struct LoadCache {
    ttl: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl LoadCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Fresh entry for `id`, if any. Expired entries are dropped on lookup.
    pub fn get(&mut self, id: &str) -> Option<RemoteDraft> {
        let now = Instant::now();
        match self.entries.get(id) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                Some(entry.draft.clone())
            }
            Some(_) => {
                self.entries.remove(id);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, draft: RemoteDraft) {
        self.purge_expired();
        self.entries.insert(
            draft.id.clone(),
            CacheEntry {
                draft,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| now.duration_since(entry.inserted_at) < ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(id: &str) -> RemoteDraft {
        RemoteDraft {
            id: id.into(),
            last_modified: 1,
            ..RemoteDraft::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_after_ttl() {
        let mut cache = LoadCache::new(Duration::from_secs(10));
        cache.insert(draft("d1"));
        assert!(cache.get("d1").is_some());

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(cache.get("d1").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_purges_expired_entries() {
        let mut cache = LoadCache::new(Duration::from_secs(10));
        cache.insert(draft("old"));

        tokio::time::advance(Duration::from_secs(11)).await;
        cache.insert(draft("new"));

        assert_eq!(cache.len(), 1);
        assert!(cache.get("new").is_some());
    }

    #[test]
    fn test_invalidate() {
        let mut cache = LoadCache::new(Duration::from_secs(10));
        cache.insert(draft("d1"));
        cache.invalidate("d1");
        assert!(cache.get("d1").is_none());
    }
}
