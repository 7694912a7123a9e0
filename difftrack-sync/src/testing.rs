//! In-memory collaborators for unit tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use difftrack_core::{
    AnnotationProvider, BackendError, Callback, Emitter, FileStat, Notifier, Overlay, Repository,
    RepositoryKind, RepositoryRegistry, RevisionContentProvider, StatusCode, StatusTable,
    StorageClient, StorageError, StorageResolver, Subscription,
};

pub(crate) fn overlay(tag: &str) -> Overlay {
    Overlay(serde_json::json!({ "tag": tag }))
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

pub(crate) struct MockRepository {
    kind: RepositoryKind,
    root: PathBuf,
    statuses: Mutex<StatusTable>,
    baseline: Mutex<HashMap<PathBuf, String>>,
    baseline_delay: Mutex<HashMap<PathBuf, Duration>>,
    fail_statuses: AtomicBool,
    fail_baseline: AtomicBool,
    primed: AtomicUsize,
    changes: Emitter<()>,
}

impl MockRepository {
    pub(crate) fn new(kind: &str, root: &str) -> Arc<Self> {
        Arc::new(Self {
            kind: RepositoryKind::from(kind),
            root: PathBuf::from(root),
            statuses: Mutex::new(StatusTable::new()),
            baseline: Mutex::new(HashMap::new()),
            baseline_delay: Mutex::new(HashMap::new()),
            fail_statuses: AtomicBool::new(false),
            fail_baseline: AtomicBool::new(false),
            primed: AtomicUsize::new(0),
            changes: Emitter::new("mock-repository"),
        })
    }

    /// Update a status without notifying.
    pub(crate) fn put_status(&self, path: &str, code: char) {
        self.statuses
            .lock()
            .insert(PathBuf::from(path), StatusCode(code));
    }

    /// Update a status and fire the change notification.
    pub(crate) fn set_status(&self, path: &str, code: char) {
        self.put_status(path, code);
        self.fire();
    }

    pub(crate) fn fire(&self) {
        self.changes.emit(&());
    }

    pub(crate) fn set_baseline(&self, path: &str, contents: &str) {
        self.baseline
            .lock()
            .insert(PathBuf::from(path), contents.to_string());
    }

    pub(crate) fn delay_baseline(&self, path: &str, delay: Duration) {
        self.baseline_delay.lock().insert(PathBuf::from(path), delay);
    }

    pub(crate) fn fail_statuses(&self, fail: bool) {
        self.fail_statuses.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_baseline(&self, fail: bool) {
        self.fail_baseline.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.changes.listener_count()
    }

    pub(crate) fn primed(&self) -> usize {
        self.primed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RevisionContentProvider for MockRepository {
    async fn content_at_baseline(&self, path: &Path) -> Result<Option<String>, BackendError> {
        let delay = self.baseline_delay.lock().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_baseline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("baseline store offline".to_string()));
        }
        Ok(self.baseline.lock().get(path).cloned())
    }
}

#[async_trait]
impl Repository for MockRepository {
    fn kind(&self) -> RepositoryKind {
        self.kind.clone()
    }

    fn root(&self) -> &Path {
        &self.root
    }

    async fn status_of(&self, _paths: &[PathBuf]) -> Result<StatusTable, BackendError> {
        self.primed.fetch_add(1, Ordering::SeqCst);
        self.all_statuses()
    }

    fn all_statuses(&self) -> Result<StatusTable, BackendError> {
        if self.fail_statuses.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("status daemon crashed".to_string()));
        }
        Ok(self.statuses.lock().clone())
    }

    fn on_did_change_statuses(&self, callback: Callback) -> Subscription {
        self.changes.on(move |_| callback())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub(crate) struct MockRegistry {
    repositories: Mutex<Vec<Arc<dyn Repository>>>,
    changes: Emitter<()>,
}

impl MockRegistry {
    pub(crate) fn new(repositories: Vec<Arc<dyn Repository>>) -> Arc<Self> {
        Arc::new(Self {
            repositories: Mutex::new(repositories),
            changes: Emitter::new("mock-registry"),
        })
    }

    /// Replace the set of trees and fire the paths-changed notification.
    pub(crate) fn set_repositories(&self, repositories: Vec<Arc<dyn Repository>>) {
        *self.repositories.lock() = repositories;
        self.changes.emit(&());
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.changes.listener_count()
    }
}

impl RepositoryRegistry for MockRegistry {
    fn repositories(&self) -> Vec<Arc<dyn Repository>> {
        self.repositories.lock().clone()
    }

    fn on_did_change_paths(&self, callback: Callback) -> Subscription {
        self.changes.on(move |_| callback())
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

pub(crate) struct MockStorage {
    files: Mutex<HashMap<PathBuf, String>>,
    directories: Mutex<HashSet<PathBuf>>,
    unreadable: Mutex<HashSet<PathBuf>>,
    read_delay: Mutex<HashMap<PathBuf, Duration>>,
    fail_writes: AtomicBool,
    writes: Mutex<Vec<(PathBuf, String)>>,
    watchers: Emitter<PathBuf>,
}

impl MockStorage {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            files: Mutex::new(HashMap::new()),
            directories: Mutex::new(HashSet::new()),
            unreadable: Mutex::new(HashSet::new()),
            read_delay: Mutex::new(HashMap::new()),
            fail_writes: AtomicBool::new(false),
            writes: Mutex::new(Vec::new()),
            watchers: Emitter::new("mock-storage"),
        })
    }

    pub(crate) fn put_file(&self, path: &str, contents: &str) {
        self.files
            .lock()
            .insert(PathBuf::from(path), contents.to_string());
    }

    pub(crate) fn put_directory(&self, path: &str) {
        self.directories.lock().insert(PathBuf::from(path));
    }

    /// `stat` fails with a permission error for this path.
    pub(crate) fn deny(&self, path: &str) {
        self.unreadable.lock().insert(PathBuf::from(path));
    }

    pub(crate) fn delay_read(&self, path: &str, delay: Duration) {
        self.read_delay.lock().insert(PathBuf::from(path), delay);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn writes(&self) -> Vec<(PathBuf, String)> {
        self.writes.lock().clone()
    }

    /// Simulate an external change to `path`.
    pub(crate) fn touch(&self, path: &str, contents: &str) {
        self.put_file(path, contents);
        self.watchers.emit(&PathBuf::from(path));
    }

    pub(crate) fn watcher_count(&self) -> usize {
        self.watchers.listener_count()
    }
}

#[async_trait]
impl StorageClient for MockStorage {
    async fn read_file(&self, path: &Path) -> Result<String, StorageError> {
        let delay = self.read_delay.lock().get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.files
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                path: path.to_path_buf(),
            })
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::from_io(
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, "read-only mount"),
            ));
        }
        self.files
            .lock()
            .insert(path.to_path_buf(), contents.to_string());
        self.writes
            .lock()
            .push((path.to_path_buf(), contents.to_string()));
        Ok(())
    }

    async fn stat(&self, path: &Path) -> Result<FileStat, StorageError> {
        if self.unreadable.lock().contains(path) {
            return Err(StorageError::from_io(
                path,
                io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
            ));
        }
        if self.directories.lock().contains(path) {
            return Ok(FileStat::directory());
        }
        if self.files.lock().contains_key(path) {
            return Ok(FileStat::file());
        }
        Err(StorageError::NotFound {
            path: path.to_path_buf(),
        })
    }

    fn watch(&self, path: &Path, callback: Callback) -> Result<Subscription, StorageError> {
        let watched = path.to_path_buf();
        Ok(self.watchers.on(move |changed| {
            if *changed == watched {
                callback();
            }
        }))
    }
}

pub(crate) struct MockResolver {
    client: Option<Arc<MockStorage>>,
}

impl MockResolver {
    pub(crate) fn new(storage: Arc<MockStorage>) -> Arc<Self> {
        Arc::new(Self {
            client: Some(storage),
        })
    }

    /// A resolver that services nothing.
    pub(crate) fn none() -> Arc<Self> {
        Arc::new(Self { client: None })
    }
}

impl StorageResolver for MockResolver {
    fn client_for(&self, _path: &Path) -> Option<Arc<dyn StorageClient>> {
        self.client
            .clone()
            .map(|client| client as Arc<dyn StorageClient>)
    }
}

// ---------------------------------------------------------------------------
// Providers and notifier
// ---------------------------------------------------------------------------

pub(crate) struct StaticProvider {
    name: String,
    overlays: Vec<Overlay>,
    delay: Option<Duration>,
}

impl StaticProvider {
    pub(crate) fn new(name: &str, tags: &[&str]) -> Arc<Self> {
        Self::delayed(name, tags, None)
    }

    pub(crate) fn delayed(name: &str, tags: &[&str], delay: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            overlays: tags.iter().map(|tag| overlay(tag)).collect(),
            delay,
        })
    }
}

#[async_trait]
impl AnnotationProvider for StaticProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn provide(&self, _path: &Path) -> anyhow::Result<Vec<Overlay>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.overlays.clone())
    }
}

pub(crate) struct FailingProvider;

#[async_trait]
impl AnnotationProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn provide(&self, path: &Path) -> anyhow::Result<Vec<Overlay>> {
        anyhow::bail!("lint server unreachable for {}", path.display())
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub(crate) fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify_error(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}
