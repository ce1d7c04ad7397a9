//! Process-wide singleton storage.
//!
//! Per-request values live in [`ResolutionContext`](super::ResolutionContext).

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use super::inject::Resolved;
use super::key::DependencyKey;
use crate::error::ResolutionResult;

/// Singleton instances keyed by dependency identity.
///
/// Each identity gets a cell that is initialised at most once; concurrent
/// first resolutions wait for the one that got there first. A failed
/// construction leaves the cell empty so a later update can retry.
#[derive(Default)]
pub struct SingletonCache {
    cells: Mutex<HashMap<DependencyKey, Arc<OnceCell<Resolved>>>>,
}

impl SingletonCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the instance for `key`, constructing it with `init` if absent.
    pub async fn get_or_try_init<F, Fut>(&self, key: DependencyKey, init: F) -> ResolutionResult<Resolved>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ResolutionResult<Resolved>>,
    {
        let cell = Arc::clone(self.cells.lock().entry(key).or_default());
        cell.get_or_try_init(init).await.map(Arc::clone)
    }

    /// Returns the instance for `key` if it has been constructed.
    pub fn get(&self, key: &DependencyKey) -> Option<Resolved> {
        self.cells.lock().get(key)?.get().map(Arc::clone)
    }

    /// Number of constructed instances.
    pub fn len(&self) -> usize {
        self.cells
            .lock()
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolutionError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_constructs_once() {
        let cache = SingletonCache::new();
        let key = DependencyKey::of::<String>();

        let a = cache
            .get_or_try_init(key, || async { Ok(Arc::new(String::from("a")) as Resolved) })
            .await
            .unwrap();
        let b = cache
            .get_or_try_init(key, || async { Ok(Arc::new(String::from("b")) as Resolved) })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use() {
        let cache = Arc::new(SingletonCache::new());
        let built = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let built = Arc::clone(&built);
                tokio::spawn(async move {
                    cache
                        .get_or_try_init(DependencyKey::of::<u64>(), || async move {
                            built.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(Arc::new(7u64) as Resolved)
                        })
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut values = Vec::new();
        for task in tasks {
            values.push(task.await.unwrap());
        }

        assert_eq!(built.load(Ordering::SeqCst), 1);
        assert!(values.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn test_failure_allows_retry() {
        let cache = SingletonCache::new();
        let key = DependencyKey::of::<u8>();

        let err = assert_err!(
            cache
                .get_or_try_init(key, || async {
                    Err(ResolutionError::failure("u8", anyhow::anyhow!("boom")))
                })
                .await
        );
        assert!(matches!(err, ResolutionError::Failure { dependency: "u8", .. }));
        assert!(cache.get(&key).is_none());

        assert_ok!(
            cache
                .get_or_try_init(key, || async { Ok(Arc::new(1u8) as Resolved) })
                .await
        );
        assert!(cache.get(&key).is_some());
    }
}
