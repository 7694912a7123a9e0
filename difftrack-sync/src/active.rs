//! Active-file state machine.
//!
//! ```text
//! Idle ──activate──▶ Activating(N) ──content(N)──▶ Ready ──annotations(N)──▶ Ready
//!   ▲                    │  ▲                         │
//!   └── (construction)   │  └──────── activate ───────┘
//!                        └── content(M ≠ N): discarded
//! ```
//!
//! Every activation takes a new generation number. Results carry the
//! generation they were fetched for and are applied only while it is still
//! current; in-flight fetches are never interrupted.
//!
//! Publication (generation check, state swap, dispatch) happens under one
//! re-entrant lock, so subscribers see states in generation order and may
//! call [`ActiveFileController::edit`] from inside a callback.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use difftrack_core::{Emitter, FileDiffState, Overlay, Subscription, SubscriptionGroup};

use crate::annotate::AnnotationComposer;
use crate::error::DiffError;
use crate::fetch::{ContentFetcher, FetchOutcome, FetchedContents};

/// Where the controller is in its activation cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No file has been activated.
    Idle,
    /// Content fetch in flight for the current generation.
    Activating,
    /// Content published; annotations pending or present.
    Ready,
}

/// Owns the active file's [`FileDiffState`].
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ActiveFileController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    fetcher: ContentFetcher,
    composer: AnnotationComposer,
    watch_active_file: bool,
    state: Mutex<ControllerState>,
    publish: ReentrantMutex<()>,
    updates: Emitter<Arc<FileDiffState>>,
    /// Fatal errors from watch-triggered reloads, which have no caller.
    reload_failures: Emitter<Arc<DiffError>>,
    /// Subscriptions scoped to the current activation.
    active_subscriptions: SubscriptionGroup,
}

struct ControllerState {
    generation: u64,
    phase: Phase,
    current: Arc<FileDiffState>,
    /// Working content was edited during the current generation.
    edited: bool,
    disposed: bool,
}

/// How a new generation starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Start {
    /// User activation: publish an empty state for the new path first.
    Activate,
    /// Reload of the file already active: keep the published state.
    Reload,
}

impl ActiveFileController {
    pub fn new(fetcher: ContentFetcher, composer: AnnotationComposer, watch_active_file: bool) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                fetcher,
                composer,
                watch_active_file,
                state: Mutex::new(ControllerState {
                    generation: 0,
                    phase: Phase::Idle,
                    current: Arc::new(FileDiffState::empty()),
                    edited: false,
                    disposed: false,
                }),
                publish: ReentrantMutex::new(()),
                updates: Emitter::new("active-file-updated"),
                reload_failures: Emitter::new("active-file-reload-failed"),
                active_subscriptions: SubscriptionGroup::new(),
            }),
        }
    }

    /// Make `path` the active file and load its diff state.
    ///
    /// Returns once content and annotations for this activation have been
    /// published, or as soon as a newer activation supersedes it. A fatal
    /// fetch error is returned only while this activation is still current;
    /// the published state is left as it was.
    pub async fn activate(&self, path: impl Into<PathBuf>) -> Result<(), DiffError> {
        let path = path.into();
        let generation = self.inner.start_activation(&path)?;
        ControllerInner::update(&self.inner, generation, &path).await
    }

    /// Replace the working content of the current state.
    pub fn edit(&self, new_contents: impl Into<String>) -> Result<(), DiffError> {
        self.inner.edit(new_contents.into())
    }

    pub fn current_state(&self) -> Arc<FileDiffState> {
        self.inner.state.lock().current.clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.state.lock().generation
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    pub fn on_update<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<FileDiffState>) + Send + Sync + 'static,
    {
        self.inner.updates.on(callback)
    }

    /// Receive fatal errors from reloads triggered by the active-file watch.
    pub fn on_reload_error<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<DiffError>) + Send + Sync + 'static,
    {
        self.inner.reload_failures.on(callback)
    }

    /// Stop publishing and drop activation-scoped subscriptions. Idempotent.
    pub fn dispose(&self) {
        let _publish = self.inner.publish.lock();
        {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
        }
        self.inner.active_subscriptions.dispose();
        self.inner.updates.clear();
        self.inner.reload_failures.clear();
    }
}

impl ControllerInner {
    /// Open an activation generation and move the change watch to `path`
    /// under a single `publish` hold, so the watch always follows the
    /// newest activation.
    fn start_activation(self: &Arc<Self>, path: &Path) -> Result<u64, DiffError> {
        let _publish = self.publish.lock();
        let generation = self
            .begin(path, Start::Activate)?
            .ok_or(DiffError::Destroyed)?;
        self.watch(path);
        Ok(generation)
    }

    /// Open a new generation. `Ok(None)` means a reload no longer applies
    /// because another file became active.
    fn begin(&self, path: &Path, start: Start) -> Result<Option<u64>, DiffError> {
        let _publish = self.publish.lock();
        let (generation, published) = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(DiffError::Destroyed);
            }
            if start == Start::Reload && state.current.file_path != path {
                return Ok(None);
            }
            state.generation += 1;
            state.phase = Phase::Activating;
            state.edited = false;
            let published = match start {
                Start::Activate => {
                    let fresh = Arc::new(FileDiffState::for_path(path));
                    state.current = fresh.clone();
                    Some(fresh)
                }
                Start::Reload => None,
            };
            (state.generation, published)
        };
        tracing::debug!(generation, path = %path.display(), ?start, "diff generation started");
        if let Some(published) = published {
            self.updates.emit(&published);
        }
        Ok(Some(generation))
    }

    async fn update(self: &Arc<Self>, generation: u64, path: &Path) -> Result<(), DiffError> {
        let contents = match self.fetcher.fetch(path).await {
            Ok(FetchOutcome::Contents(contents)) => contents,
            Ok(FetchOutcome::NotApplicable) => {
                self.settle(generation);
                return Ok(());
            }
            Err(err) => {
                if self.settle(generation) {
                    return Err(err);
                }
                tracing::debug!(generation, error = %err, "dropping error from superseded fetch");
                return Ok(());
            }
        };

        if !self.apply_contents(generation, path, contents) {
            tracing::debug!(generation, path = %path.display(), "discarding superseded content fetch");
            return Ok(());
        }

        let annotations = self.composer.compose(path).await;
        if !self.apply_annotations(generation, annotations) {
            tracing::debug!(generation, path = %path.display(), "discarding superseded annotations");
        }
        Ok(())
    }

    /// Leave `Activating` without publishing. Returns whether `generation`
    /// is still current.
    fn settle(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.disposed || state.generation != generation {
            return false;
        }
        state.phase = Phase::Ready;
        true
    }

    fn apply_contents(&self, generation: u64, path: &Path, contents: FetchedContents) -> bool {
        let _publish = self.publish.lock();
        let next = {
            let mut state = self.state.lock();
            if state.disposed || state.generation != generation {
                return false;
            }
            // A local edit made while the fetch was in flight wins.
            let new_contents = if state.edited {
                state.current.new_contents.clone()
            } else {
                contents.working
            };
            let next = Arc::new(FileDiffState {
                file_path: path.to_path_buf(),
                old_contents: contents.baseline,
                new_contents,
                annotations: None,
            });
            state.current = next.clone();
            state.phase = Phase::Ready;
            next
        };
        self.updates.emit(&next);
        true
    }

    fn apply_annotations(&self, generation: u64, annotations: Vec<Overlay>) -> bool {
        let _publish = self.publish.lock();
        let next = {
            let mut state = self.state.lock();
            if state.disposed || state.generation != generation {
                return false;
            }
            let next = Arc::new(FileDiffState {
                annotations: Some(annotations),
                ..(*state.current).clone()
            });
            state.current = next.clone();
            next
        };
        self.updates.emit(&next);
        true
    }

    fn edit(&self, new_contents: String) -> Result<(), DiffError> {
        let _publish = self.publish.lock();
        let next = {
            let mut state = self.state.lock();
            if state.disposed {
                return Err(DiffError::Destroyed);
            }
            let next = Arc::new(FileDiffState {
                new_contents,
                ..(*state.current).clone()
            });
            state.current = next.clone();
            state.edited = true;
            next
        };
        self.updates.emit(&next);
        Ok(())
    }

    /// Replace the activation-scoped subscriptions with a change watch on
    /// `path`, when enabled and a runtime is available to reload on.
    fn watch(self: &Arc<Self>, path: &Path) {
        self.active_subscriptions.dispose();
        if !self.watch_active_file {
            return;
        }
        let Some(client) = self.fetcher.storage().client_for(path) else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let weak: Weak<ControllerInner> = Arc::downgrade(self);
        let watched = path.to_path_buf();
        let callback = Box::new(move || {
            let Some(inner) = weak.upgrade() else { return };
            let path = watched.clone();
            handle.spawn(async move {
                if let Err(err) = ControllerInner::reload(&inner, &path).await {
                    tracing::warn!(path = %path.display(), error = %err, "active file reload failed");
                    inner.reload_failures.emit(&Arc::new(err));
                }
            });
        });
        match client.watch(path, callback) {
            Ok(subscription) => self.active_subscriptions.add(subscription),
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "active file cannot be watched");
            }
        }
    }

    async fn reload(self: &Arc<Self>, path: &Path) -> Result<(), DiffError> {
        let Some(generation) = self.begin(path, Start::Reload)? else {
            return Ok(());
        };
        tracing::debug!(generation, path = %path.display(), "active file changed; reloading");
        self.update(generation, path).await
    }
}
