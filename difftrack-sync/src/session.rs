//! Per-workspace diff session.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use difftrack_core::{
    AnnotationProvider, Emitter, FileChangeMap, FileDiffState, Notifier, RepositoryRegistry,
    SessionConfig, StorageResolver, Subscription, SubscriptionGroup,
};

use crate::active::ActiveFileController;
use crate::annotate::AnnotationComposer;
use crate::error::DiffError;
use crate::fetch::ContentFetcher;
use crate::status::StatusAggregator;

const USAGE_TARGET: &str = "difftrack::usage";
const ERROR_PREFIX: &str = "Diff View Internal Error - ";

/// Everything a session talks to.
pub struct Collaborators {
    pub registry: Arc<dyn RepositoryRegistry>,
    pub storage: Arc<dyn StorageResolver>,
    pub providers: Vec<Arc<dyn AnnotationProvider>>,
    pub notifier: Arc<dyn Notifier>,
}

/// Facade over status aggregation and the active file.
///
/// Cheap to clone; clones share one session. After [`destroy`](Self::destroy)
/// every operation returns [`DiffError::Destroyed`].
#[derive(Clone)]
pub struct DiffSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    aggregator: StatusAggregator,
    controller: ActiveFileController,
    storage: Arc<dyn StorageResolver>,
    notifier: Arc<dyn Notifier>,
    /// Workspace-level subscriptions (registry path changes).
    subscriptions: SubscriptionGroup,
    destroyed: AtomicBool,
    destroy_emitter: Emitter<()>,
}

impl DiffSession {
    /// Build a session and subscribe to the registry's current trees.
    pub fn new(collaborators: Collaborators, config: &SessionConfig) -> Self {
        let Collaborators {
            registry,
            storage,
            providers,
            notifier,
        } = collaborators;

        let aggregator = StatusAggregator::new(registry.clone(), config.supported_kind.clone());
        let fetcher = ContentFetcher::new(
            registry.clone(),
            storage.clone(),
            config.supported_kind.clone(),
        );
        let controller = ActiveFileController::new(
            fetcher,
            AnnotationComposer::new(providers),
            config.watch_active_file,
        );

        let inner = Arc::new(SessionInner {
            aggregator,
            controller,
            storage,
            notifier,
            subscriptions: SubscriptionGroup::new(),
            destroyed: AtomicBool::new(false),
            destroy_emitter: Emitter::new("destroyed"),
        });

        let weak: Weak<SessionInner> = Arc::downgrade(&inner);
        inner
            .subscriptions
            .add(registry.on_did_change_paths(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    tracing::debug!("workspace trees changed; resyncing statuses");
                    inner.aggregator.resync();
                }
            })));
        let notifier = inner.notifier.clone();
        inner
            .subscriptions
            .add(inner.controller.on_reload_error(move |err| {
                notify_error(notifier.as_ref(), err);
            }));
        inner.aggregator.resync();

        tracing::debug!(
            kind = %config.supported_kind,
            watch_active_file = config.watch_active_file,
            "diff session created",
        );
        Self { inner }
    }

    /// Make `path` the active file. Errors are reported through the
    /// notifier and returned.
    pub async fn activate_file(&self, path: impl Into<PathBuf>) -> Result<(), DiffError> {
        self.ensure_live()?;
        let path = path.into();
        tracing::info!(
            target: USAGE_TARGET,
            event = "diff-view-open-file",
            path = %path.display(),
        );
        let result = self.inner.controller.activate(path).await;
        self.reported(result)
    }

    /// Replace the active file's working content.
    pub fn set_new_contents(&self, text: impl Into<String>) -> Result<(), DiffError> {
        self.ensure_live()?;
        self.inner.controller.edit(text)
    }

    pub fn active_file_state(&self) -> Arc<FileDiffState> {
        self.inner.controller.current_state()
    }

    pub fn file_changes(&self) -> Arc<FileChangeMap> {
        self.inner.aggregator.current_status()
    }

    /// Write the active file's working content back to storage.
    pub async fn save_active_file(&self) -> Result<(), DiffError> {
        self.ensure_live()?;
        let state = self.inner.controller.current_state();
        tracing::info!(
            target: USAGE_TARGET,
            event = "diff-view-save-file",
            path = %state.file_path.display(),
        );
        let result = self.save(&state).await;
        self.reported(result)
    }

    pub fn on_did_change_status<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<FileChangeMap>) + Send + Sync + 'static,
    {
        self.inner.aggregator.on_status_changed(callback)
    }

    pub fn on_active_file_updates<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<FileDiffState>) + Send + Sync + 'static,
    {
        self.inner.controller.on_update(callback)
    }

    pub fn on_did_destroy<F>(&self, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.destroy_emitter.on(move |_| callback())
    }

    /// Tear the session down. Only the first call has any effect.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.subscriptions.dispose();
        self.inner.aggregator.dispose();
        self.inner.controller.dispose();
        tracing::debug!("diff session destroyed");
        self.inner.destroy_emitter.emit(&());
        self.inner.destroy_emitter.clear();
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    fn ensure_live(&self) -> Result<(), DiffError> {
        if self.is_destroyed() {
            return Err(DiffError::Destroyed);
        }
        Ok(())
    }

    async fn save(&self, state: &FileDiffState) -> Result<(), DiffError> {
        if !state.has_active_file() {
            return Err(DiffError::NoActiveFile);
        }
        let path = &state.file_path;
        let client = self
            .inner
            .storage
            .client_for(path)
            .ok_or_else(|| DiffError::NoStorageClient { path: path.clone() })?;
        client
            .write_file(path, &state.new_contents)
            .await
            .map_err(|source| DiffError::Save {
                path: path.clone(),
                source,
            })
    }

    fn reported<T>(&self, result: Result<T, DiffError>) -> Result<T, DiffError> {
        if let Err(err) = &result {
            notify_error(self.inner.notifier.as_ref(), err);
        }
        result
    }
}

fn notify_error(notifier: &dyn Notifier, err: &DiffError) {
    if !matches!(err, DiffError::Destroyed) {
        notifier.notify_error(&format!("{ERROR_PREFIX}{err}"));
    }
}
