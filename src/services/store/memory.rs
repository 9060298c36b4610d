use super::{RemoteStore, StoreError};
use crate::models::{RemoteDraft, SaveAck, SavePayload};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-process draft store.
///
/// Used for offline sessions and for exercising the engine: every call can be
/// delayed, failures can be scripted per operation, and another writer can be
/// simulated with [`write_remote`](Self::write_remote).
#[derive(Debug, Default)]
pub struct InMemoryDraftStore {
    drafts: Mutex<HashMap<String, RemoteDraft>>,
    latency: Mutex<Duration>,
    scripted_save_failures: Mutex<VecDeque<StoreError>>,
    scripted_load_failures: Mutex<VecDeque<StoreError>>,
    accepted_saves: Mutex<Vec<SavePayload>>,
    save_attempts: AtomicUsize,
    load_attempts: AtomicUsize,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to every load and save.
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
        self
    }

    pub fn insert(&self, draft: RemoteDraft) {
        self.drafts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(draft.id.clone(), draft);
    }

    pub fn get(&self, id: &str) -> Option<RemoteDraft> {
        self.drafts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Simulate another session writing the draft at `last_modified`.
    pub fn write_remote<F>(&self, id: &str, last_modified: i64, f: F)
    where
        F: FnOnce(&mut RemoteDraft),
    {
        let mut drafts = self.drafts.lock().unwrap_or_else(|e| e.into_inner());
        let draft = drafts.entry(id.to_string()).or_insert_with(|| RemoteDraft {
            id: id.to_string(),
            ..RemoteDraft::default()
        });
        f(draft);
        draft.last_modified = last_modified;
    }

    /// The next `count` saves fail with `error`.
    pub fn fail_next_saves(&self, count: usize, error: StoreError) {
        let mut queue = self
            .scripted_save_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        queue.extend(std::iter::repeat_n(error, count));
    }

    /// The next `count` loads fail with `error`.
    pub fn fail_next_loads(&self, count: usize, error: StoreError) {
        let mut queue = self
            .scripted_load_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        queue.extend(std::iter::repeat_n(error, count));
    }

    /// Saves the store accepted, oldest first.
    pub fn accepted_saves(&self) -> Vec<SavePayload> {
        self.accepted_saves
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Save calls received, including failed ones.
    pub fn save_attempts(&self) -> usize {
        self.save_attempts.load(Ordering::SeqCst)
    }

    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

/// Monotonic millisecond stamp strictly after `previous`.
fn next_modified(previous: i64) -> i64 {
    chrono::Utc::now().timestamp_millis().max(previous + 1)
}

#[async_trait]
impl RemoteStore for InMemoryDraftStore {
    async fn load_draft(&self, id: &str) -> Result<RemoteDraft, StoreError> {
        self.load_attempts.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self
            .scripted_load_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return Err(error);
        }

        self.get(id).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save_draft(&self, payload: &SavePayload) -> Result<SaveAck, StoreError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(error) = self
            .scripted_save_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
        {
            return Err(error);
        }

        let last_modified = {
            let mut drafts = self.drafts.lock().unwrap_or_else(|e| e.into_inner());
            let previous = drafts.get(&payload.id).map_or(0, |d| d.last_modified);
            let last_modified = next_modified(previous);
            drafts.insert(
                payload.id.clone(),
                RemoteDraft {
                    id: payload.id.clone(),
                    title: Some(payload.title.clone()),
                    description: payload.description.clone(),
                    content: payload.content.clone(),
                    meta: payload.meta.clone(),
                    last_modified,
                },
            );
            last_modified
        };

        self.accepted_saves
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(payload.clone());

        Ok(SaveAck { last_modified })
    }
}
