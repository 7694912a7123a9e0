//! Parallel annotation composition.

use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;

use difftrack_core::{AnnotationProvider, Overlay};

/// Queries every provider for a path and flattens the results.
#[derive(Clone, Default)]
pub struct AnnotationComposer {
    providers: Vec<Arc<dyn AnnotationProvider>>,
}

impl AnnotationComposer {
    pub fn new(providers: Vec<Arc<dyn AnnotationProvider>>) -> Self {
        Self { providers }
    }

    /// Overlays from all providers, in provider registration order. A failing
    /// provider contributes nothing.
    pub async fn compose(&self, path: &Path) -> Vec<Overlay> {
        let queries = self.providers.iter().map(|provider| async move {
            match provider.provide(path).await {
                Ok(overlays) => overlays,
                Err(err) => {
                    tracing::warn!(
                        provider = provider.name(),
                        path = %path.display(),
                        error = %err,
                        "annotation provider failed",
                    );
                    Vec::new()
                }
            }
        });
        join_all(queries).await.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::testing::{overlay, FailingProvider, StaticProvider};

    #[tokio::test]
    async fn failing_provider_is_skipped_and_order_kept() {
        let composer = AnnotationComposer::new(vec![
            StaticProvider::new("p1", &["x"]) as Arc<dyn AnnotationProvider>,
            Arc::new(FailingProvider),
            StaticProvider::new("p3", &["y", "z"]),
        ]);

        let overlays = composer.compose(Path::new("/repo/a.txt")).await;
        assert_eq!(overlays, vec![overlay("x"), overlay("y"), overlay("z")]);
    }

    #[tokio::test(start_paused = true)]
    async fn order_follows_registration_not_completion() {
        let composer = AnnotationComposer::new(vec![
            StaticProvider::delayed("slow", &["first"], Some(Duration::from_millis(50)))
                as Arc<dyn AnnotationProvider>,
            StaticProvider::delayed("fast", &["second"], Some(Duration::from_millis(1))),
        ]);

        let started = tokio::time::Instant::now();
        let overlays = composer.compose(Path::new("/repo/a.txt")).await;
        assert_eq!(overlays, vec![overlay("first"), overlay("second")]);
        assert!(started.elapsed() < Duration::from_millis(51), "providers ran serially");
    }

    #[tokio::test]
    async fn no_providers_yield_nothing() {
        let composer = AnnotationComposer::default();
        assert!(composer.compose(Path::new("/repo/a.txt")).await.is_empty());
    }
}
