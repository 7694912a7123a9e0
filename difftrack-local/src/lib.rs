//! # difftrack-local
//!
//! Local-filesystem collaborators for a `DiffSession`:
//!
//! - [`LocalStorage`] / [`LocalResolver`]: `tokio::fs` reads, atomic writes,
//!   `notify` file watches
//! - [`SnapshotRepository`]: a working tree diffed against a baseline copy
//! - [`StaticRegistry`]: a caller-managed set of trees
//! - [`ConflictMarkerProvider`]: annotates leftover merge markers
//! - [`logging`]: `tracing-subscriber` setup shared by binaries

mod error;
pub mod logging;
pub mod markers;
pub mod registry;
pub mod snapshot;
pub mod storage;
pub mod watch;

pub use error::LocalError;
pub use markers::ConflictMarkerProvider;
pub use registry::StaticRegistry;
pub use snapshot::{SnapshotRepository, SNAPSHOT_KIND};
pub use storage::{LocalResolver, LocalStorage};
pub use watch::PathWatch;
