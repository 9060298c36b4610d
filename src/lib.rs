// draftsync - Optimistic local-first persistence for editable drafts
//
// This is the library crate containing the persistence engine and its building blocks.
// The binary crate (main.rs) drives the engine from the command line.

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use engine::{ExportData, PersistenceManager};
pub use error::PersistenceError;
pub use metrics::{PerformanceMetrics, PerformanceRecorder};
pub use models::{
    AppConfig, ChangeEvent, ChangeEventInput, ChangeKind, ChangeSource, ConflictRecord,
    DraftDocument, LoadResult, MergeResult, PersistenceConfig, PersistenceState, RemoteDraft,
    ResolutionStrategy, SaveResult,
};
pub use services::{HttpDraftStore, InMemoryDraftStore, RemoteStore, StoreError};
pub use state::{PersistenceStatus, StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
