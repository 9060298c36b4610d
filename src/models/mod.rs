//! Data models for the draftsync engine.
//!
//! This module contains the core data structures shared across the crate:
//! - [`ChangeEvent`] / [`ChangeEventInput`]: discrete edits recorded by the change tracker
//! - [`DraftDocument`], [`RemoteDraft`], [`SavePayload`]: the document and its wire shapes
//! - [`PersistenceState`]: the engine's live status, mutated only through
//!   [`StateManager`](crate::state::StateManager)
//! - [`SaveResult`], [`LoadResult`], [`ConflictRecord`], [`MergeResult`]: per-operation outcomes
//! - [`AppConfig`] / [`PersistenceConfig`]: configuration loaded from `draftsync.yaml`

pub mod change;
pub mod config;
pub mod document;
pub mod path;
pub mod persistence_state;

pub use change::{ChangeEvent, ChangeEventInput, ChangeKind, ChangeSource};
pub use config::{AppConfig, LoggingConfig, PersistenceConfig, RemoteConfig};
pub use document::{DraftDocument, RemoteDraft, SaveAck, SavePayload, UNTITLED};
pub use persistence_state::{
    ConflictField, ConflictRecord, FieldChangeKind, LoadResult, MergeResult, PersistenceState,
    ResolutionStrategy, SavePhase, SaveResult,
};
