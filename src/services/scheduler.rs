//! Save scheduling.
//!
//! [`SaveScheduler`] is the only thing in the crate that owns save timers: the
//! debounce ("fire after a quiet period"), the background interval ("fire at
//! most every N"), and the retry delay. Every timer ends in the same callback,
//! tagged with a [`SaveTrigger`]. The callback is expected to spawn the save
//! rather than run it inline, so cancelling a timer can never abort a save
//! that has already started.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Why a save was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveTrigger {
    /// Debounce expired after the last tracked change
    Auto,
    /// Periodic background save
    Background,
    /// Delayed re-attempt after a failed save
    Retry,
    /// `save_manual`
    Manual,
    /// `force_save`
    Forced,
    /// Save issued by resolving a conflict; skips conflict detection
    Resolution,
}

impl SaveTrigger {
    /// Whether the save came from a timer rather than a caller.
    pub fn is_automatic(self) -> bool {
        matches!(self, Self::Auto | Self::Background | Self::Retry)
    }
}

impl fmt::Display for SaveTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Auto => "auto",
            Self::Background => "background",
            Self::Retry => "retry",
            Self::Manual => "manual",
            Self::Forced => "forced",
            Self::Resolution => "resolution",
        };
        f.write_str(name)
    }
}

pub type SaveCallback = Arc<dyn Fn(SaveTrigger) + Send + Sync>;

struct Armed {
    generation: u64,
    task: JoinHandle<()>,
}

struct TimerInner {
    callback: SaveCallback,
    slot: Mutex<Option<Armed>>,
    generation: AtomicU64,
}

/// Single-slot debounce timer.
///
/// Each [`arm`](Self::arm) replaces the previous timer, so only the last
/// request within the window fires.
pub struct DebounceTimer {
    delay: Duration,
    handle: Handle,
    inner: Arc<TimerInner>,
}

impl DebounceTimer {
    pub fn new(delay: Duration, handle: Handle, callback: SaveCallback) -> Self {
        Self {
            delay,
            handle,
            inner: Arc::new(TimerInner {
                callback,
                slot: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// (Re)start the quiet-period timer.
    pub fn arm(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak: Weak<TimerInner> = Arc::downgrade(&self.inner);
        let delay = self.delay;

        let mut slot = self.inner.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.take() {
            previous.task.abort();
        }

        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };
            {
                let mut slot = inner.slot.lock().unwrap_or_else(|e| e.into_inner());
                match slot.as_ref() {
                    Some(armed) if armed.generation == generation => {
                        slot.take();
                    }
                    // Re-armed or cancelled while waking up
                    _ => return,
                }
            }

            tracing::debug!("Debounce elapsed after {:?}", delay);
            (inner.callback)(SaveTrigger::Auto);
        });

        *slot = Some(Armed { generation, task });
    }

    /// Drop the pending timer, if any. Returns whether one was pending.
    pub fn cancel(&self) -> bool {
        let mut slot = self.inner.slot.lock().unwrap_or_else(|e| e.into_inner());
        match slot.take() {
            Some(armed) => {
                armed.task.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel the pending timer and invoke the callback immediately.
    pub fn fire_now(&self, trigger: SaveTrigger) {
        self.cancel();
        (self.inner.callback)(trigger);
    }

    pub fn is_armed(&self) -> bool {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

/// The one scheduling authority for automatic saves.
pub struct SaveScheduler {
    debounce: DebounceTimer,
    background_interval: Option<Duration>,
    handle: Handle,
    callback: SaveCallback,
    interval_task: Mutex<Option<JoinHandle<()>>>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
}

impl SaveScheduler {
    pub fn new(
        debounce: Duration,
        background_interval: Option<Duration>,
        handle: Handle,
        callback: SaveCallback,
    ) -> Self {
        Self {
            debounce: DebounceTimer::new(debounce, handle.clone(), callback.clone()),
            background_interval,
            handle,
            callback,
            interval_task: Mutex::new(None),
            retry_task: Mutex::new(None),
        }
    }

    pub fn request_debounced_save(&self) {
        self.debounce.arm();
    }

    pub fn cancel_pending(&self) -> bool {
        self.debounce.cancel()
    }

    pub fn fire_now(&self, trigger: SaveTrigger) {
        self.debounce.fire_now(trigger);
    }

    pub fn has_pending(&self) -> bool {
        self.debounce.is_armed()
    }

    /// Start the background interval. No-op when disabled or already running.
    pub fn start_interval(&self) {
        let Some(period) = self.background_interval else {
            return;
        };

        let mut slot = self
            .interval_task
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }

        let callback = self.callback.clone();
        *slot = Some(self.handle.spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                callback(SaveTrigger::Background);
            }
        }));
        tracing::debug!("Background save every {:?}", period);
    }

    /// Re-invoke the callback with [`SaveTrigger::Retry`] after `delay`,
    /// replacing any retry already waiting.
    pub fn schedule_retry(&self, delay: Duration) {
        let callback = self.callback.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            callback(SaveTrigger::Retry);
        });

        let mut slot = self.retry_task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    /// Cancel every timer. An already-running save is unaffected.
    pub fn stop(&self) {
        self.debounce.cancel();
        for slot in [&self.interval_task, &self.retry_task] {
            if let Some(task) = slot.lock().unwrap_or_else(|e| e.into_inner()).take() {
                task.abort();
            }
        }
    }
}

impl Drop for SaveScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
