//! A working tree compared against a baseline snapshot directory.
//!
//! The baseline is a plain copy of the tree at some earlier point. Statuses
//! are derived by comparing the two:
//!
//! | working | baseline | status |
//! |---------|----------|--------|
//! | present | absent   | `A`    |
//! | absent  | present  | `!`    |
//! | differs | differs  | `M`    |

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;

use difftrack_core::{
    BackendError, Callback, Emitter, Repository, RepositoryKind, RevisionContentProvider,
    StatusCode, StatusTable, Subscription,
};

use crate::error::{io_err, LocalError};
use crate::watch::PathWatch;

/// Kind reported by [`SnapshotRepository`].
pub const SNAPSHOT_KIND: &str = "snapshot";

const IGNORED_DIRS: &[&str] = &[".git", ".hg", ".jj", "target", "node_modules"];

pub struct SnapshotRepository {
    root: PathBuf,
    baseline: PathBuf,
    statuses: Mutex<StatusTable>,
    changes: Emitter<()>,
    watch: Mutex<Option<PathWatch>>,
}

impl SnapshotRepository {
    /// Open a tree and its baseline, and take an initial status scan.
    pub fn open(root: &Path, baseline: &Path) -> Result<Arc<Self>, LocalError> {
        let root = canonical_dir(root)?;
        let baseline = canonical_dir(baseline)?;
        let repository = Arc::new(Self {
            root,
            baseline,
            statuses: Mutex::new(StatusTable::new()),
            changes: Emitter::new("snapshot-statuses"),
            watch: Mutex::new(None),
        });
        repository.rescan()?;
        Ok(repository)
    }

    pub fn baseline(&self) -> &Path {
        &self.baseline
    }

    /// Recompute statuses. Subscribers are notified only when they changed.
    pub fn rescan(&self) -> Result<bool, LocalError> {
        let fresh = scan(&self.root, &self.baseline)?;
        let changed = {
            let mut statuses = self.statuses.lock();
            if *statuses == fresh {
                false
            } else {
                *statuses = fresh;
                true
            }
        };
        if changed {
            tracing::debug!(root = %self.root.display(), "snapshot statuses changed");
            self.changes.emit(&());
        }
        Ok(changed)
    }

    /// Rescan whenever something under the working tree changes.
    pub fn start_watching(self: &Arc<Self>) -> Result<(), LocalError> {
        let weak: Weak<SnapshotRepository> = Arc::downgrade(self);
        let root = self.root.clone();
        let baseline = self.baseline.clone();
        let watch = PathWatch::tree(
            &self.root,
            move |path| is_ignored(&root, &baseline, path),
            move || {
                let Some(repository) = weak.upgrade() else { return };
                tokio::task::spawn_blocking(move || {
                    if let Err(err) = repository.rescan() {
                        tracing::warn!(error = %err, "snapshot rescan failed");
                    }
                });
            },
        )?;
        *self.watch.lock() = Some(watch);
        Ok(())
    }

    pub fn stop_watching(&self) {
        self.watch.lock().take();
    }

    fn baseline_path(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root)
            .ok()
            .map(|relative| self.baseline.join(relative))
    }
}

#[async_trait]
impl RevisionContentProvider for SnapshotRepository {
    async fn content_at_baseline(&self, path: &Path) -> Result<Option<String>, BackendError> {
        let Some(snapshot) = self.baseline_path(path) else {
            return Ok(None);
        };
        match tokio::fs::read_to_string(&snapshot).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BackendError::Io {
                path: snapshot,
                source,
            }),
        }
    }
}

#[async_trait]
impl Repository for SnapshotRepository {
    fn kind(&self) -> RepositoryKind {
        RepositoryKind::from(SNAPSHOT_KIND)
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn status_of(&self, paths: &[PathBuf]) -> Result<StatusTable, BackendError> {
        let root = self.root.clone();
        let baseline = self.baseline.clone();
        let fresh = tokio::task::spawn_blocking(move || scan(&root, &baseline))
            .await
            .map_err(|err| BackendError::Unavailable(format!("status scan aborted: {err}")))?
            .map_err(|err| match err {
                LocalError::Io { path, source } => BackendError::Io { path, source },
                other => BackendError::Unavailable(other.to_string()),
            })?;

        let changed = {
            let mut statuses = self.statuses.lock();
            let changed = *statuses != fresh;
            *statuses = fresh.clone();
            changed
        };
        if changed {
            self.changes.emit(&());
        }

        Ok(fresh
            .into_iter()
            .filter(|(path, _)| paths.iter().any(|wanted| path.starts_with(wanted)))
            .collect())
    }

    fn all_statuses(&self) -> Result<StatusTable, BackendError> {
        Ok(self.statuses.lock().clone())
    }

    fn on_did_change_statuses(&self, callback: Callback) -> Subscription {
        self.changes.on(move |_| callback())
    }
}

fn canonical_dir(path: &Path) -> Result<PathBuf, LocalError> {
    let canonical = fs::canonicalize(path).map_err(|e| io_err(path, e))?;
    if !canonical.is_dir() {
        return Err(LocalError::NotADirectory { path: canonical });
    }
    Ok(canonical)
}

fn is_ignored(root: &Path, baseline: &Path, path: &Path) -> bool {
    if path.starts_with(baseline) {
        return true;
    }
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };
    relative.components().any(|component| {
        component
            .as_os_str()
            .to_str()
            .map(|name| IGNORED_DIRS.contains(&name))
            .unwrap_or(false)
    })
}

fn scan(root: &Path, baseline: &Path) -> Result<StatusTable, LocalError> {
    let working = collect_files(root, |dir| is_ignored(root, baseline, dir))?;
    let snapshot = collect_files(baseline, |_| false)?;

    let mut statuses = StatusTable::new();
    for (relative, path) in &working {
        let code = match snapshot.get(relative) {
            None => Some('A'),
            Some(previous) => differs(path, previous)?.then_some('M'),
        };
        if let Some(code) = code {
            statuses.insert(root.join(relative), StatusCode(code));
        }
    }
    for relative in snapshot.keys() {
        if !working.contains_key(relative) {
            statuses.insert(root.join(relative), StatusCode('!'));
        }
    }
    Ok(statuses)
}

fn differs(a: &Path, b: &Path) -> Result<bool, LocalError> {
    let left = fs::read(a).map_err(|e| io_err(a, e))?;
    let right = fs::read(b).map_err(|e| io_err(b, e))?;
    Ok(left != right)
}

/// Every regular file under `root`, keyed by path relative to `root`.
/// Directories matching `skip` are not descended into.
fn collect_files<S>(root: &Path, skip: S) -> Result<BTreeMap<PathBuf, PathBuf>, LocalError>
where
    S: Fn(&Path) -> bool,
{
    let mut files = BTreeMap::new();
    let mut dirs = vec![root.to_path_buf()];
    let mut cursor = 0;
    while cursor < dirs.len() {
        let current = dirs[cursor].clone();
        cursor += 1;
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(io_err(&current, err)),
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            let path = entry.path();
            let ty = entry.file_type().map_err(|e| io_err(&path, e))?;
            if ty.is_dir() {
                if !skip(&path) {
                    dirs.push(path);
                }
            } else if ty.is_file() {
                if let Ok(relative) = path.strip_prefix(root) {
                    files.insert(relative.to_path_buf(), path.clone());
                }
            }
        }
    }
    Ok(files)
}
