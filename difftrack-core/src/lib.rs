//! difftrack core library: domain types, collaborator traits, event channels.
//!
//! Public API surface:
//! - [`types`]: status codes, change maps, diff state snapshots
//! - [`collab`]: traits for the repository registry, storage and providers
//! - [`events`]: typed observer channels with unsubscribe handles
//! - [`config`]: session configuration load / save
//! - [`error`]: [`ConfigError`], [`StorageError`], [`BackendError`]

pub mod collab;
pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use collab::{
    AnnotationProvider, Callback, LogNotifier, Notifier, Repository, RepositoryRegistry,
    RevisionContentProvider, StatusTable, StorageClient, StorageResolver,
};
pub use config::SessionConfig;
pub use error::{BackendError, ConfigError, StorageError};
pub use events::{Emitter, Subscription, SubscriptionGroup};
pub use types::{
    ChangeStatus, FileChangeMap, FileDiffState, FileStat, Overlay, RepositoryKind, StatusCode,
};
