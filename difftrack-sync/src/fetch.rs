//! Baseline and working-copy content retrieval.
//!
//! Fallback rules:
//! - baseline missing or unreadable → `""` (file added since the baseline)
//! - working copy missing or unreadable → `""` (file removed)
//! - path is a directory → [`FetchOutcome::NotApplicable`]
//! - no storage client, or `stat` fails for a reason other than not-found → error

use std::path::Path;
use std::sync::Arc;

use difftrack_core::{Repository, RepositoryKind, RepositoryRegistry, StorageError, StorageResolver};

use crate::error::DiffError;

/// Both sides of a file's diff.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchedContents {
    pub baseline: String,
    pub working: String,
}

/// Result of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Contents(FetchedContents),
    /// The path names a directory; there is nothing to diff.
    NotApplicable,
}

/// Retrieves baseline and working content for a path.
pub struct ContentFetcher {
    registry: Arc<dyn RepositoryRegistry>,
    storage: Arc<dyn StorageResolver>,
    supported_kind: RepositoryKind,
}

impl ContentFetcher {
    pub fn new(
        registry: Arc<dyn RepositoryRegistry>,
        storage: Arc<dyn StorageResolver>,
        supported_kind: RepositoryKind,
    ) -> Self {
        Self {
            registry,
            storage,
            supported_kind,
        }
    }

    pub fn storage(&self) -> &Arc<dyn StorageResolver> {
        &self.storage
    }

    /// The first registered tree containing `path`, which must be of the
    /// supported kind.
    pub fn repository_for_path(&self, path: &Path) -> Result<Arc<dyn Repository>, DiffError> {
        let repository = self
            .registry
            .repositories()
            .into_iter()
            .find(|repository| repository.contains(path));
        match repository {
            Some(repository) if repository.kind() == self.supported_kind => Ok(repository),
            Some(repository) => Err(DiffError::Configuration {
                path: path.to_path_buf(),
                supported: self.supported_kind.clone(),
                found: repository.kind().to_string(),
            }),
            None => Err(DiffError::Configuration {
                path: path.to_path_buf(),
                supported: self.supported_kind.clone(),
                found: "no repository".to_string(),
            }),
        }
    }

    /// Fetch both sides concurrently; resolves once both have settled.
    pub async fn fetch(&self, path: &Path) -> Result<FetchOutcome, DiffError> {
        let repository = self.repository_for_path(path)?;
        let client = self
            .storage
            .client_for(path)
            .ok_or_else(|| DiffError::NoStorageClient {
                path: path.to_path_buf(),
            })?;

        match client.stat(path).await {
            Ok(stat) if stat.is_file => {}
            Ok(_) | Err(StorageError::IsDirectory { .. }) => {
                // The change list already covers directories.
                tracing::info!(path = %path.display(), "diff activated with a non-file path");
                return Ok(FetchOutcome::NotApplicable);
            }
            Err(StorageError::NotFound { .. }) => {
                tracing::debug!(path = %path.display(), "working copy missing; diffing as removed");
            }
            Err(source) => {
                return Err(DiffError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        }

        let baseline = async {
            match repository.content_at_baseline(path).await {
                Ok(Some(contents)) => contents,
                Ok(None) => String::new(),
                Err(err) => {
                    tracing::debug!(
                        path = %path.display(),
                        error = %err,
                        "baseline unavailable; diffing as added",
                    );
                    String::new()
                }
            }
        };
        let working = async {
            match client.read_file(path).await {
                Ok(contents) => contents,
                Err(StorageError::NotFound { .. }) => String::new(),
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "working copy unreadable; diffing as removed",
                    );
                    String::new()
                }
            }
        };
        let (baseline, working) = tokio::join!(baseline, working);

        Ok(FetchOutcome::Contents(FetchedContents { baseline, working }))
    }
}
