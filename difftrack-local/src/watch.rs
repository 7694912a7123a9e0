//! Filesystem change watches backed by `notify`.
//!
//! Raw events are forwarded from the notify thread over an unbounded channel
//! to a tokio task, which filters them and invokes the callback. Dropping the
//! [`PathWatch`] drops the watcher, closing the channel and ending the task.

use std::fs;
use std::path::{Path, PathBuf};
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::{io_err, LocalError};

type Filter = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// A live watch. Events stop when dropped.
pub struct PathWatch {
    target: PathBuf,
    _watcher: RecommendedWatcher,
}

impl PathWatch {
    /// Watch a single file. Its parent directory is watched so that
    /// replace-by-rename saves are seen; only events naming the file fire.
    pub fn file<F>(path: &Path, callback: F) -> Result<Self, LocalError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let target = canonical_or_self(path)?;
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| LocalError::NotADirectory {
                path: target.clone(),
            })?;
        let file = target.clone();
        Self::start(
            target,
            &dir,
            RecursiveMode::NonRecursive,
            Box::new(move |changed: &Path| changed == file.as_path()),
            callback,
        )
    }

    /// Watch a directory tree. Events whose paths all satisfy `ignore` are
    /// dropped.
    pub fn tree<I, F>(root: &Path, ignore: I, callback: F) -> Result<Self, LocalError>
    where
        I: Fn(&Path) -> bool + Send + Sync + 'static,
        F: Fn() + Send + Sync + 'static,
    {
        let target = fs::canonicalize(root).map_err(|e| io_err(root, e))?;
        if !target.is_dir() {
            return Err(LocalError::NotADirectory { path: target });
        }
        let dir = target.clone();
        Self::start(
            target,
            &dir,
            RecursiveMode::Recursive,
            Box::new(move |changed: &Path| !ignore(changed)),
            callback,
        )
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    fn start<F>(
        target: PathBuf,
        dir: &Path,
        mode: RecursiveMode,
        wanted: Filter,
        callback: F,
    ) -> Result<Self, LocalError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| LocalError::NoRuntime {
            path: target.clone(),
        })?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
            let _ = event_tx.send(event);
        })?;
        watcher.watch(dir, mode)?;
        tracing::debug!(path = %target.display(), "watching for changes");

        let label = target.clone();
        handle.spawn(async move {
            while let Some(event) = event_rx.recv().await {
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(path = %label.display(), error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                if event.paths.iter().any(|changed| wanted(changed.as_path())) {
                    callback();
                }
            }
            tracing::trace!(path = %label.display(), "watch closed");
        });

        Ok(Self {
            target,
            _watcher: watcher,
        })
    }
}

/// Canonicalize the parent and re-attach the file name, so a file that does
/// not exist yet can still be watched.
fn canonical_or_self(path: &Path) -> Result<PathBuf, LocalError> {
    if let Ok(canonical) = fs::canonicalize(path) {
        return Ok(canonical);
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = fs::canonicalize(parent).map_err(|e| io_err(parent, e))?;
            Ok(parent.join(name))
        }
        _ => Ok(path.to_path_buf()),
    }
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
