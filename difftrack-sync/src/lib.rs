//! # difftrack-sync
//!
//! Diff-state synchronization engine.
//!
//! Build a [`DiffSession`] per workspace from its collaborators; it aggregates
//! repository statuses ([`StatusAggregator`]) and tracks the active file
//! ([`ActiveFileController`]), fetching content ([`ContentFetcher`]) and
//! annotations ([`AnnotationComposer`]) for it.

pub mod active;
pub mod annotate;
pub mod error;
pub mod fetch;
pub mod session;
pub mod status;

#[cfg(test)]
mod testing;

pub use active::{ActiveFileController, Phase};
pub use annotate::AnnotationComposer;
pub use error::DiffError;
pub use fetch::{ContentFetcher, FetchOutcome, FetchedContents};
pub use session::{Collaborators, DiffSession};
pub use status::StatusAggregator;
