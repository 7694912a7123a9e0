//! Error types for difftrack-sync.

use std::path::PathBuf;

use thiserror::Error;

use difftrack_core::{RepositoryKind, StorageError};

/// Errors surfaced to callers of activation and save.
///
/// Provider failures, per-repository status failures and single-source fetch
/// failures with a fallback never reach this type; they are logged where
/// they happen.
#[derive(Debug, Error)]
pub enum DiffError {
    /// The path is not under a tree of the supported kind.
    #[error("Diff view only supports `{supported}` repositories, but found `{found}` for {path}")]
    Configuration {
        path: PathBuf,
        supported: RepositoryKind,
        found: String,
    },

    /// No storage client can service the path.
    #[error("no storage client for file: {path}")]
    NoStorageClient { path: PathBuf },

    /// The working copy could not be inspected.
    #[error("stat for file: {path} - {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    /// Writing the working content failed.
    #[error("could not save file: {path} - {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    /// Save was requested with no active file.
    #[error("no active file to save")]
    NoActiveFile,

    /// The session was destroyed; it accepts no further operations.
    #[error("diff session has been destroyed")]
    Destroyed,
}
