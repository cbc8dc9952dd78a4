//! Core domain types for Vellum.
//!
//! This crate contains pure domain types with no IO, no async, and minimal
//! dependencies. Everything here can be used from any layer of the
//! application: the engine, the presentation bridge, and tests.

mod action;
mod file_state;
mod ids;
mod protocol;
mod token;

pub use action::{
    ActionError, ActionOutcome, ActionRequest, ActionStatus, BatchReport, FileAction, SkipReason,
};
pub use file_state::{DiskState, FileKind, FileStateSummary};
pub use ids::SessionId;
pub use protocol::{
    ConflictMode, ConflictReply, ConflictRequest, ContentSyncReport, FileResolution,
    FileSyncResult, TrackedFilesState,
};
pub use token::SnapshotToken;
