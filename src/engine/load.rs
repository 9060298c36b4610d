use super::{Inner, PersistenceManager, lock, now_ms, write};
use crate::models::{DraftDocument, LoadResult, RemoteDraft};

impl PersistenceManager {
    /// Load a draft and make it the live document.
    ///
    /// With `use_cache`, a fresh cached copy short-circuits the network call.
    /// A successful load replaces the document and clears the change queue and
    /// dirty flag, so the freshly loaded copy is not re-flagged as edited.
    /// Failures are reported in the result and recorded as `load_error`.
    pub async fn load_from_server(&self, id: &str, use_cache: bool) -> LoadResult {
        self.inner.load(id, use_cache).await
    }
}

impl Inner {
    async fn load(&self, id: &str, use_cache: bool) -> LoadResult {
        if self.is_disposed() {
            return load_failed("Persistence engine has been disposed");
        }

        if id.trim().is_empty() {
            tracing::warn!("Loading a draft with an empty id");
        }

        self.metrics.record_load();

        if use_cache {
            let cached = lock(&self.cache).get(id);
            if let Some(draft) = cached {
                self.metrics.record_cache_hit();
                tracing::debug!("Loaded draft {} from cache", id);
                self.apply_loaded(&draft);
                self.state.refresh_status();
                return LoadResult {
                    success: true,
                    data: Some(draft),
                    error: None,
                    from_cache: true,
                    timestamp: now_ms(),
                };
            }
        }

        // Any load that reaches the store is a miss, including cache bypasses
        self.metrics.record_cache_miss();

        self.state.update(|s| {
            s.is_loading = true;
            s.load_error = None;
        });

        match self.with_timeout(self.store.load_draft(id)).await {
            Ok(draft) => {
                lock(&self.cache).insert(draft.clone());
                self.apply_loaded(&draft);
                tracing::info!("Loaded draft {} (server modified at {})", id, draft.last_modified);

                LoadResult {
                    success: true,
                    data: Some(draft),
                    error: None,
                    from_cache: false,
                    timestamp: now_ms(),
                }
            }
            Err(e) => {
                tracing::error!("Failed to load draft {}: {}", id, e);
                let message = e.to_string();
                self.state.update(|s| {
                    s.is_loading = false;
                    s.load_error = Some(message.clone());
                });
                load_failed(message)
            }
        }
    }

    fn apply_loaded(&self, draft: &RemoteDraft) {
        let mut document = write(&self.document);
        *document = DraftDocument::from(draft.clone());

        let now = now_ms();
        self.state.update(|s| {
            if !s.queued_changes.is_empty() {
                tracing::warn!(
                    "Load of draft {} replaced {} unsaved change(s)",
                    draft.id,
                    s.queued_changes.len()
                );
            }
            s.queued_changes.clear();
            s.is_dirty = false;
            s.is_loading = false;
            s.load_error = None;
            s.last_loaded = Some(now);
            s.known_remote_modified = Some(draft.last_modified);
            s.edit_generation += 1;
        });
    }
}

fn load_failed(error: impl Into<String>) -> LoadResult {
    LoadResult {
        success: false,
        data: None,
        error: Some(error.into()),
        from_cache: false,
        timestamp: now_ms(),
    }
}
