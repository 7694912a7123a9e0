use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the local filesystem backend.
#[derive(Debug, Error)]
pub enum LocalError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("watching {path} requires a running tokio runtime")]
    NoRuntime { path: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> LocalError {
    LocalError::Io {
        path: path.into(),
        source,
    }
}
