//! Shared infrastructure utilities for Vellum.
//!
//! This crate provides cross-cutting utilities that multiple Vellum crates
//! need but that don't belong in the domain-pure `vellum-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename)
//! - **`digest`**: Content hashing used for baselines and snapshot tokens
//! - **`paths`**: Lexical path normalization and resolution

pub mod atomic_write;
pub mod digest;
pub mod paths;

pub use atomic_write::{
    AtomicWriteOptions, FileSyncPolicy, atomic_write_new, atomic_write_with_options,
    recover_bak_file,
};
pub use digest::content_digest;
pub use paths::{normalize_path, resolve_against};
