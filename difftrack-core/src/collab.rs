//! Collaborator traits consumed by the engine.
//!
//! The engine never talks to a version-control backend, a filesystem or a UI
//! directly; it sees them only through these traits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{BackendError, StorageError};
use crate::events::Subscription;
use crate::types::{FileStat, Overlay, RepositoryKind, StatusCode};

/// Change-notification callback handed to collaborators.
pub type Callback = Box<dyn Fn() + Send + Sync>;

/// A repository's full path → raw status table.
pub type StatusTable = HashMap<PathBuf, StatusCode>;

// ---------------------------------------------------------------------------
// Version control
// ---------------------------------------------------------------------------

/// Source of a file's content at the baseline revision.
#[async_trait]
pub trait RevisionContentProvider: Send + Sync {
    /// `Ok(None)` when the file did not exist at the baseline revision.
    async fn content_at_baseline(&self, path: &Path) -> Result<Option<String>, BackendError>;
}

/// One version-controlled tree in the workspace.
#[async_trait]
pub trait Repository: RevisionContentProvider {
    fn kind(&self) -> RepositoryKind;

    fn root(&self) -> &Path;

    fn contains(&self, path: &Path) -> bool {
        path.starts_with(self.root())
    }

    /// Ask the backend to refresh statuses under `paths` and return them.
    async fn status_of(&self, paths: &[PathBuf]) -> Result<StatusTable, BackendError>;

    /// The backend's current cached status table for the whole tree.
    fn all_statuses(&self) -> Result<StatusTable, BackendError>;

    fn on_did_change_statuses(&self, callback: Callback) -> Subscription;
}

/// The workspace's set of version-controlled trees.
pub trait RepositoryRegistry: Send + Sync {
    fn repositories(&self) -> Vec<Arc<dyn Repository>>;

    /// Fires when the workspace's set of roots changes.
    fn on_did_change_paths(&self, callback: Callback) -> Subscription;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Reads and writes file bytes, local or remote.
#[async_trait]
pub trait StorageClient: Send + Sync {
    async fn read_file(&self, path: &Path) -> Result<String, StorageError>;

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), StorageError>;

    async fn stat(&self, path: &Path) -> Result<FileStat, StorageError>;

    /// Fires when the file at `path` changes. Clients without change
    /// notifications return an empty handle.
    fn watch(&self, _path: &Path, _callback: Callback) -> Result<Subscription, StorageError> {
        Ok(Subscription::empty())
    }
}

/// Picks the storage client able to service a path.
pub trait StorageResolver: Send + Sync {
    fn client_for(&self, path: &Path) -> Option<Arc<dyn StorageClient>>;
}

// ---------------------------------------------------------------------------
// Annotations and notifications
// ---------------------------------------------------------------------------

/// Produces opaque overlays for a file.
#[async_trait]
pub trait AnnotationProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn provide(&self, path: &Path) -> anyhow::Result<Vec<Overlay>>;
}

/// Surface for user-visible error messages.
pub trait Notifier: Send + Sync {
    fn notify_error(&self, message: &str);
}

/// Notifier that only writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_error(&self, message: &str) {
        tracing::error!(target: "difftrack::notify", "{message}");
    }
}
