//! Repository status aggregation.
//!
//! Every pass rebuilds the [`FileChangeMap`] from scratch out of each
//! subscribed repository's full status table; nothing is patched in place.
//! Overlapping paths resolve last-write-wins: repositories are applied in
//! order of their most recent status event, so the one that fired last is
//! applied last.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};

use difftrack_core::{
    ChangeStatus, Emitter, FileChangeMap, Repository, RepositoryKind, RepositoryRegistry,
    Subscription,
};

/// Aggregates per-repository statuses into one change map.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct StatusAggregator {
    inner: Arc<AggregatorInner>,
}

struct AggregatorInner {
    registry: Arc<dyn RepositoryRegistry>,
    supported_kind: RepositoryKind,
    state: Mutex<AggregatorState>,
    /// Serializes resync and rebuild passes; re-entrant so a subscriber may
    /// call back into the aggregator during dispatch.
    serial: ReentrantMutex<()>,
    changes: Emitter<Arc<FileChangeMap>>,
}

struct AggregatorState {
    subscriptions: Vec<RepositorySubscription>,
    file_changes: Arc<FileChangeMap>,
    /// Bumped on every resync; priming results from older passes are ignored.
    epoch: u64,
    next_token: u64,
    fire_seq: u64,
    disposed: bool,
}

struct RepositorySubscription {
    token: u64,
    repository: Arc<dyn Repository>,
    subscription: Subscription,
    /// `fire_seq` of this repository's latest status event, 0 if none yet.
    last_fired: u64,
}

impl StatusAggregator {
    /// Create an aggregator. Nothing is subscribed until [`resync`](Self::resync).
    pub fn new(registry: Arc<dyn RepositoryRegistry>, supported_kind: RepositoryKind) -> Self {
        Self {
            inner: Arc::new(AggregatorInner {
                registry,
                supported_kind,
                state: Mutex::new(AggregatorState {
                    subscriptions: Vec::new(),
                    file_changes: Arc::new(FileChangeMap::new()),
                    epoch: 0,
                    next_token: 0,
                    fire_seq: 0,
                    disposed: false,
                }),
                serial: ReentrantMutex::new(()),
                changes: Emitter::new("status-changed"),
            }),
        }
    }

    /// Drop every repository subscription and subscribe afresh to the
    /// registry's current trees of the supported kind, then rebuild.
    pub fn resync(&self) {
        self.inner.resync();
    }

    /// Latest aggregated map.
    pub fn current_status(&self) -> Arc<FileChangeMap> {
        self.inner.state.lock().file_changes.clone()
    }

    /// Receive the full map after every change.
    pub fn on_status_changed<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<FileChangeMap>) + Send + Sync + 'static,
    {
        self.inner.changes.on(callback)
    }

    /// Number of live repository subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.inner.state.lock().subscriptions.len()
    }

    /// Roots of the subscribed repositories, in registry order.
    pub fn subscribed_roots(&self) -> Vec<PathBuf> {
        self.inner
            .state
            .lock()
            .subscriptions
            .iter()
            .map(|entry| entry.repository.root().to_path_buf())
            .collect()
    }

    /// Dispose every subscription and clear the map. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl AggregatorInner {
    fn resync(self: &Arc<Self>) {
        let _serial = self.serial.lock();

        let (epoch, stale) = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.epoch += 1;
            (state.epoch, std::mem::take(&mut state.subscriptions))
        };
        for entry in &stale {
            entry.subscription.dispose();
        }

        let repositories: Vec<Arc<dyn Repository>> = self
            .registry
            .repositories()
            .into_iter()
            .filter(|repository| repository.kind() == self.supported_kind)
            .collect();

        let mut fresh = Vec::with_capacity(repositories.len());
        for repository in repositories {
            let token = {
                let mut state = self.state.lock();
                state.next_token += 1;
                state.next_token
            };
            let weak: Weak<AggregatorInner> = Arc::downgrade(self);
            let subscription = repository.on_did_change_statuses(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_status_event(token);
                }
            }));
            self.prime(&repository, epoch);
            // Trees that survive the resync keep their place in the
            // last-write-wins order.
            let last_fired = stale
                .iter()
                .find(|entry| Arc::ptr_eq(&entry.repository, &repository))
                .map_or(0, |entry| entry.last_fired);
            fresh.push(RepositorySubscription {
                token,
                repository,
                subscription,
                last_fired,
            });
        }

        tracing::debug!(
            epoch,
            repositories = fresh.len(),
            kind = %self.supported_kind,
            "resubscribed to repository status changes",
        );
        drop(stale);
        self.state.lock().subscriptions = fresh;
        self.rebuild();
    }

    /// Ask the backend for a fresh status snapshot of the whole tree, for
    /// trees nothing else has queried yet. Rebuilds on success unless a newer
    /// resync has happened meanwhile.
    fn prime(self: &Arc<Self>, repository: &Arc<dyn Repository>, epoch: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(
                root = %repository.root().display(),
                "no async runtime; skipping status priming",
            );
            return;
        };
        let repository = Arc::clone(repository);
        let weak = Arc::downgrade(self);
        handle.spawn(async move {
            let root = repository.root().to_path_buf();
            match repository.status_of(std::slice::from_ref(&root)).await {
                Ok(_) => {
                    let Some(inner) = weak.upgrade() else { return };
                    let current = inner.state.lock().epoch;
                    if current == epoch {
                        inner.rebuild();
                    }
                }
                Err(err) => {
                    tracing::warn!(root = %root.display(), error = %err, "status priming failed");
                }
            }
        });
    }

    fn handle_status_event(&self, token: u64) {
        let _serial = self.serial.lock();
        {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.fire_seq += 1;
            let seq = state.fire_seq;
            let Some(entry) = state
                .subscriptions
                .iter_mut()
                .find(|entry| entry.token == token)
            else {
                return;
            };
            entry.last_fired = seq;
        }
        self.rebuild();
    }

    fn rebuild(&self) {
        let _serial = self.serial.lock();

        let mut ordered: Vec<(u64, usize, Arc<dyn Repository>)> = {
            let state = self.state.lock();
            if state.disposed {
                return;
            }
            state
                .subscriptions
                .iter()
                .enumerate()
                .map(|(index, entry)| (entry.last_fired, index, Arc::clone(&entry.repository)))
                .collect()
        };
        ordered.sort_by_key(|(last_fired, index, _)| (*last_fired, *index));

        let mut file_changes = FileChangeMap::new();
        for (_, _, repository) in ordered {
            match repository.all_statuses() {
                Ok(table) => {
                    for (path, code) in table {
                        if let Some(status) = ChangeStatus::from_code(code) {
                            file_changes.insert(path, status);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        root = %repository.root().display(),
                        error = %err,
                        "excluding repository from status aggregation",
                    );
                }
            }
        }

        let file_changes = Arc::new(file_changes);
        {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.file_changes = Arc::clone(&file_changes);
        }
        tracing::debug!(changed = file_changes.len(), "file change map rebuilt");
        self.changes.emit(&file_changes);
    }

    fn dispose(&self) {
        let _serial = self.serial.lock();
        let stale = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.file_changes = Arc::new(FileChangeMap::new());
            std::mem::take(&mut state.subscriptions)
        };
        for entry in &stale {
            entry.subscription.dispose();
        }
        self.changes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::testing::{MockRegistry, MockRepository};

    fn hg(root: &str) -> Arc<MockRepository> {
        MockRepository::new("hg", root)
    }

    fn aggregator(repos: &[&Arc<MockRepository>]) -> (Arc<MockRegistry>, StatusAggregator) {
        let registry = MockRegistry::new(
            repos
                .iter()
                .map(|repo| Arc::clone(*repo) as Arc<dyn Repository>)
                .collect(),
        );
        let aggregator = StatusAggregator::new(registry.clone(), RepositoryKind::hg());
        (registry, aggregator)
    }

    #[test]
    fn resync_is_idempotent() {
        let one = hg("/one");
        let two = hg("/two");
        let (_registry, aggregator) = aggregator(&[&one, &two]);

        for _ in 0..5 {
            aggregator.resync();
        }

        assert_eq!(aggregator.subscription_count(), 2);
        assert_eq!(one.listener_count(), 1);
        assert_eq!(two.listener_count(), 1);
    }

    #[test]
    fn unsupported_kinds_are_skipped() {
        let hg_repo = hg("/hg");
        let git_repo = MockRepository::new("git", "/git");
        git_repo.put_status("/git/a.txt", 'M');
        let (_registry, aggregator) = aggregator(&[&hg_repo, &git_repo]);

        aggregator.resync();

        assert_eq!(aggregator.subscribed_roots(), vec![PathBuf::from("/hg")]);
        assert_eq!(git_repo.listener_count(), 0);
        assert!(aggregator.current_status().is_empty());
    }

    #[test]
    fn unknown_codes_are_filtered() {
        let repo = hg("/repo");
        repo.put_status("/repo/clean.txt", 'C');
        repo.put_status("/repo/new.txt", 'A');
        let (_registry, aggregator) = aggregator(&[&repo]);

        aggregator.resync();

        let changes = aggregator.current_status();
        assert_eq!(changes.len(), 1);
        assert_eq!(
            changes.get(&PathBuf::from("/repo/new.txt")),
            Some(&ChangeStatus::Added)
        );
    }

    #[test]
    fn status_event_emits_full_map() {
        let one = hg("/one");
        let two = hg("/two");
        one.put_status("/one/a.txt", 'M');
        let (_registry, aggregator) = aggregator(&[&one, &two]);
        aggregator.resync();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            aggregator.on_status_changed(move |map| seen.lock().push(Arc::clone(map)))
        };

        two.set_status("/two/b.txt", '?');

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].len(), 2, "map must carry both repositories");
        assert_eq!(
            seen[0].get(&PathBuf::from("/one/a.txt")),
            Some(&ChangeStatus::Modified)
        );
    }

    #[test]
    fn overlapping_paths_follow_last_repository_to_fire() {
        let outer = hg("/ws");
        let inner = hg("/ws/sub");
        let (_registry, aggregator) = aggregator(&[&outer, &inner]);
        aggregator.resync();

        inner.set_status("/ws/sub/f.txt", 'A');
        outer.set_status("/ws/sub/f.txt", 'M');
        assert_eq!(
            aggregator.current_status().get(&PathBuf::from("/ws/sub/f.txt")),
            Some(&ChangeStatus::Modified)
        );

        inner.set_status("/ws/sub/f.txt", '?');
        assert_eq!(
            aggregator.current_status().get(&PathBuf::from("/ws/sub/f.txt")),
            Some(&ChangeStatus::Untracked)
        );
    }

    #[test]
    fn resync_keeps_last_write_wins_order() {
        let outer = hg("/ws");
        let inner = hg("/ws/sub");
        let (registry, aggregator) = aggregator(&[&outer, &inner]);
        aggregator.resync();
        inner.set_status("/ws/sub/f.txt", 'A');
        outer.set_status("/ws/sub/f.txt", 'M');
        inner.set_status("/ws/sub/f.txt", '?');
        outer.set_status("/ws/sub/f.txt", 'R');
        let path = PathBuf::from("/ws/sub/f.txt");
        assert_eq!(aggregator.current_status().get(&path), Some(&ChangeStatus::Removed));

        let unrelated = hg("/elsewhere");
        registry.set_repositories(vec![
            outer.clone() as Arc<dyn Repository>,
            inner.clone(),
            unrelated.clone(),
        ]);
        aggregator.resync();

        assert_eq!(aggregator.subscription_count(), 3);
        assert_eq!(aggregator.current_status().get(&path), Some(&ChangeStatus::Removed));
    }

    #[test]
    fn failing_repository_is_excluded_not_fatal() {
        let good = hg("/good");
        let bad = hg("/bad");
        good.put_status("/good/a.txt", 'M');
        bad.put_status("/bad/b.txt", 'M');
        bad.fail_statuses(true);
        let (_registry, aggregator) = aggregator(&[&good, &bad]);

        aggregator.resync();

        let changes = aggregator.current_status();
        assert_eq!(changes.len(), 1);
        assert!(changes.contains_key(&PathBuf::from("/good/a.txt")));
        assert_eq!(aggregator.subscription_count(), 2);
    }

    #[test]
    fn removed_repository_leaves_no_stale_entries() {
        let one = hg("/one");
        let two = hg("/two");
        one.put_status("/one/a.txt", 'M');
        two.put_status("/two/b.txt", 'M');
        let (registry, aggregator) = aggregator(&[&one, &two]);
        aggregator.resync();
        assert_eq!(aggregator.current_status().len(), 2);

        registry.set_repositories(vec![one.clone() as Arc<dyn Repository>]);
        aggregator.resync();

        let changes = aggregator.current_status();
        assert_eq!(changes.len(), 1);
        assert!(!changes.contains_key(&PathBuf::from("/two/b.txt")));
        assert_eq!(two.listener_count(), 0);
    }

    #[test]
    fn dispose_silences_repository_events() {
        let repo = hg("/repo");
        let (_registry, aggregator) = aggregator(&[&repo]);
        aggregator.resync();

        let emitted = Arc::new(AtomicUsize::new(0));
        let _sub = {
            let emitted = emitted.clone();
            aggregator.on_status_changed(move |_| {
                emitted.fetch_add(1, Ordering::SeqCst);
            })
        };

        aggregator.dispose();
        aggregator.dispose();
        repo.set_status("/repo/a.txt", 'M');

        assert_eq!(emitted.load(Ordering::SeqCst), 0);
        assert_eq!(repo.listener_count(), 0);
        assert!(aggregator.current_status().is_empty());

        aggregator.resync();
        assert_eq!(aggregator.subscription_count(), 0, "resync after dispose is a no-op");
    }

    #[tokio::test]
    async fn resync_primes_each_repository() {
        let repo = hg("/repo");
        let (_registry, aggregator) = aggregator(&[&repo]);

        aggregator.resync();
        for _ in 0..10 {
            if repo.primed() > 0 {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(repo.primed(), 1);
    }

    #[test]
    fn subscriber_may_resync_during_dispatch() {
        let repo = hg("/repo");
        let (_registry, aggregator) = aggregator(&[&repo]);
        aggregator.resync();

        let _sub = {
            let handle = aggregator.clone();
            let armed = AtomicUsize::new(0);
            aggregator.on_status_changed(move |_| {
                if armed.fetch_add(1, Ordering::SeqCst) == 0 {
                    handle.resync();
                }
            })
        };

        repo.set_status("/repo/a.txt", 'M');
        assert_eq!(repo.listener_count(), 1);
        assert_eq!(aggregator.current_status().len(), 1);
    }
}
