//! Services module - the building blocks the persistence engine composes.
//!
//! None of these hold the engine's shared state; they are driven by
//! [`crate::engine::PersistenceManager`] and can be tested on their own.
//!
//! # Components
//!
//! - [`ChangeTracker`]: stamps edits and applies the significance filter and
//!   queue bound
//! - [`SaveScheduler`] / [`DebounceTimer`]: debounce, background interval and
//!   retry timers, all funnelled into one save callback
//! - [`ConflictDetector`] / [`ConflictResolver`]: last-writer-wins detection,
//!   field-level diff and merge
//! - [`VersionManager`]: bounded undo/redo history
//! - [`LoadCache`]: TTL cache of loaded drafts
//! - [`store`]: the [`RemoteStore`] seam with HTTP and in-memory backends

pub mod cache;
pub mod change_tracker;
pub mod conflict;
pub mod scheduler;
pub mod store;
pub mod versions;

pub use cache::LoadCache;
pub use change_tracker::ChangeTracker;
pub use conflict::{ConflictDetector, ConflictResolver};
pub use scheduler::{DebounceTimer, SaveCallback, SaveScheduler, SaveTrigger};
pub use store::{HttpDraftStore, InMemoryDraftStore, RemoteStore, StoreError};
pub use versions::{SnapshotSource, VersionHistory, VersionManager, VersionSnapshot, VersionSummary};
