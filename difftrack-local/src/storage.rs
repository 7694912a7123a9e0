//! Local-disk storage client.

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use difftrack_core::{
    Callback, FileStat, StorageClient, StorageError, StorageResolver, Subscription,
};

use crate::watch::PathWatch;

/// Reads, writes and watches files on the local filesystem.
#[derive(Debug, Default)]
pub struct LocalStorage;

impl LocalStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn read_file(&self, path: &Path) -> Result<String, StorageError> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))
    }

    /// Atomic write: contents go to a `.difftrack.tmp` sibling, then `rename`.
    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), StorageError> {
        let Some(name) = path.file_name() else {
            return Err(StorageError::from_io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            ));
        };
        let mut tmp_name = name.to_os_string();
        tmp_name.push(".difftrack.tmp");
        let tmp_path = path.with_file_name(tmp_name);

        tokio::fs::write(&tmp_path, contents)
            .await
            .map_err(|e| StorageError::from_io(&tmp_path, e))?;
        if let Err(err) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(StorageError::from_io(path, err));
        }
        tracing::debug!(path = %path.display(), bytes = contents.len(), "file saved");
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileStat, StorageError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::from_io(path, e))?;
        Ok(FileStat {
            is_file: metadata.is_file(),
            is_directory: metadata.is_dir(),
        })
    }

    fn watch(&self, path: &Path, callback: Callback) -> Result<Subscription, StorageError> {
        let watch = PathWatch::file(path, move || callback()).map_err(|err| {
            StorageError::from_io(path, io::Error::new(io::ErrorKind::Other, err))
        })?;
        Ok(Subscription::new(move || drop(watch)))
    }
}

/// Hands out [`LocalStorage`] for local paths; remote `scheme://` paths have
/// no client.
#[derive(Debug)]
pub struct LocalResolver {
    client: Arc<LocalStorage>,
}

impl LocalResolver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            client: LocalStorage::new(),
        })
    }
}

impl StorageResolver for LocalResolver {
    fn client_for(&self, path: &Path) -> Option<Arc<dyn StorageClient>> {
        if is_remote(path) {
            tracing::debug!(path = %path.display(), "no local client for remote path");
            return None;
        }
        Some(self.client.clone() as Arc<dyn StorageClient>)
    }
}

fn is_remote(path: &Path) -> bool {
    path.to_str()
        .and_then(|raw| raw.split_once("://"))
        .map(|(scheme, _)| {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        })
        .unwrap_or(false)
}
