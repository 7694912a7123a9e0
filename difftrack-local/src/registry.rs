//! Fixed, caller-managed set of trees.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use difftrack_core::{Callback, Emitter, Repository, RepositoryRegistry, Subscription};

pub struct StaticRegistry {
    repositories: Mutex<Vec<Arc<dyn Repository>>>,
    changes: Emitter<()>,
}

impl StaticRegistry {
    pub fn new(repositories: Vec<Arc<dyn Repository>>) -> Arc<Self> {
        Arc::new(Self {
            repositories: Mutex::new(repositories),
            changes: Emitter::new("workspace-paths"),
        })
    }

    pub fn add(&self, repository: Arc<dyn Repository>) {
        self.repositories.lock().push(repository);
        self.changes.emit(&());
    }

    /// Remove the tree rooted at `root`. Returns whether one was removed.
    pub fn remove(&self, root: &Path) -> bool {
        let removed = {
            let mut repositories = self.repositories.lock();
            let before = repositories.len();
            repositories.retain(|repository| repository.root() != root);
            repositories.len() != before
        };
        if removed {
            self.changes.emit(&());
        }
        removed
    }
}

impl RepositoryRegistry for StaticRegistry {
    fn repositories(&self) -> Vec<Arc<dyn Repository>> {
        self.repositories.lock().clone()
    }

    fn on_did_change_paths(&self, callback: Callback) -> Subscription {
        self.changes.on(move |_| callback())
    }
}
