//! Read-through orchestration over a [`CacheBackend`].
//!
//! A lookup that hits returns the decoded value without calling the producer.
//! Anything else (absent key, backend error, undecodable bytes) is a miss: the
//! producer runs, its value is stored best-effort and returned. The cache
//! never turns a successful producer call into a failure.
//!
//! Concurrent misses on one key are not coalesced. Each caller runs the
//! producer and the last store wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::backend::{CacheBackend, CacheError};

pub(crate) const METRIC_CACHE_HIT: &str = "taskflow_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "taskflow_cache_miss_total";
pub(crate) const METRIC_CACHE_STORE_FAILED: &str = "taskflow_cache_store_failed_total";
pub(crate) const METRIC_CACHE_INVALIDATE_FAILED: &str = "taskflow_cache_invalidate_failed_total";

const SOURCE: &str = "cache::read_through";

#[derive(Clone)]
pub struct ReadThroughCache {
    backend: Option<Arc<dyn CacheBackend>>,
}

impl ReadThroughCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// A cache that always calls the producer and never stores anything.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// Returns the cached value for `key`, or runs `producer` and caches its
    /// result for `ttl`.
    ///
    /// Producer errors are returned untouched and nothing is stored.
    pub async fn fetch<T, E, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(backend) = self.backend.as_ref() else {
            return producer().await;
        };

        if let Some(value) = lookup::<T>(backend.as_ref(), key).await {
            counter!(METRIC_CACHE_HIT, "key" => key.to_string()).increment(1);
            debug!(target = SOURCE, key, "cache hit");
            return Ok(value);
        }

        counter!(METRIC_CACHE_MISS, "key" => key.to_string()).increment(1);
        debug!(target = SOURCE, key, "cache miss");

        let value = producer().await?;

        if let Err(err) = store(backend.as_ref(), key, &value, ttl).await {
            counter!(METRIC_CACHE_STORE_FAILED, "key" => key.to_string()).increment(1);
            warn!(
                target = SOURCE,
                key,
                error = %err,
                "failed to populate cache; serving producer value"
            );
        }

        Ok(value)
    }

    /// Deletes `key` so the next fetch recomputes it.
    ///
    /// Failures are counted and returned; callers decide whether to log them.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        let Some(backend) = self.backend.as_ref() else {
            return Ok(());
        };

        backend.delete(key).await.inspect_err(|_| {
            counter!(METRIC_CACHE_INVALIDATE_FAILED, "key" => key.to_string()).increment(1);
        })
    }
}

async fn lookup<T: DeserializeOwned>(backend: &dyn CacheBackend, key: &str) -> Option<T> {
    let bytes = match backend.get(key).await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(err) => {
            warn!(target = SOURCE, key, error = %err, "cache read failed; treating as miss");
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(
                target = SOURCE,
                key,
                error = %err,
                "cached value failed to decode; treating as miss"
            );
            None
        }
    }
}

async fn store<T: Serialize>(
    backend: &dyn CacheBackend,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let bytes = serde_json::to_vec(value)?;
    // Backends with second granularity would treat zero as "no expiry".
    let ttl = ttl.max(Duration::from_secs(1));
    backend.set_with_expiry(key, bytes, ttl).await
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cache::MemoryCacheBackend;

    const TTL: Duration = Duration::from_secs(60);

    fn cache() -> (Arc<MemoryCacheBackend>, ReadThroughCache) {
        let backend = Arc::new(MemoryCacheBackend::new());
        let cache = ReadThroughCache::new(backend.clone());
        (backend, cache)
    }

    #[tokio::test]
    async fn second_fetch_is_served_from_cache() {
        let (_, cache) = cache();
        let calls = AtomicUsize::new(0);

        let first: Vec<u32> = cache
            .fetch("k", TTL, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Infallible>(vec![1, 2, 3])
            })
            .await
            .expect("fetch");
        let second: Vec<u32> = cache
            .fetch("k", TTL, || async { Ok::<_, Infallible>(vec![9]) })
            .await
            .expect("fetch");

        assert_eq!(first, vec![1, 2, 3]);
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_each_run_the_producer() {
        let (backend, cache) = cache();
        let calls = AtomicUsize::new(0);
        let producer = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, Infallible>(1u32)
        };

        let (a, b) = tokio::join!(
            cache.fetch("k", TTL, producer),
            cache.fetch("k", TTL, producer),
        );

        assert_eq!(a.expect("fetch"), 1);
        assert_eq!(b.expect("fetch"), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(backend.contains("k"));
    }

    #[tokio::test]
    async fn empty_results_are_cached() {
        let (backend, cache) = cache();

        let value: Vec<u32> = cache
            .fetch("k", TTL, || async { Ok::<_, Infallible>(Vec::new()) })
            .await
            .expect("fetch");

        assert!(value.is_empty());
        assert_eq!(backend.peek("k"), Some(b"[]".to_vec()));
    }

    #[tokio::test]
    async fn undecodable_entry_is_a_miss_and_gets_overwritten() {
        let (backend, cache) = cache();
        backend.insert_raw("k", b"not json".to_vec(), TTL);

        let value: Vec<u32> = cache
            .fetch("k", TTL, || async { Ok::<_, Infallible>(vec![7]) })
            .await
            .expect("fetch");

        assert_eq!(value, vec![7]);
        assert_eq!(backend.peek("k"), Some(b"[7]".to_vec()));
    }

    #[tokio::test]
    async fn backend_failures_never_reach_the_caller() {
        let (backend, cache) = cache();
        backend.fail_reads(true);
        backend.fail_writes(true);

        let value: String = cache
            .fetch("k", TTL, || async { Ok::<_, Infallible>("fresh".to_string()) })
            .await
            .expect("fetch");

        assert_eq!(value, "fresh");
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn producer_errors_propagate_and_store_nothing() {
        let (backend, cache) = cache();

        let result: Result<Vec<u32>, &str> = cache.fetch("k", TTL, || async { Err("boom") }).await;

        assert_eq!(result, Err("boom"));
        assert!(!backend.contains("k"));
    }

    #[tokio::test]
    async fn invalidate_forces_recompute() {
        let (_, cache) = cache();

        let _: u32 = cache
            .fetch("k", TTL, || async { Ok::<_, Infallible>(1) })
            .await
            .expect("fetch");
        cache.invalidate("k").await.expect("invalidate");
        let value: u32 = cache
            .fetch("k", TTL, || async { Ok::<_, Infallible>(2) })
            .await
            .expect("fetch");

        assert_eq!(value, 2);
    }

    #[tokio::test]
    async fn zero_ttl_is_clamped() {
        let (backend, cache) = cache();

        let _: u32 = cache
            .fetch("k", Duration::ZERO, || async { Ok::<_, Infallible>(1) })
            .await
            .expect("fetch");

        assert!(backend.contains("k"));
    }

    #[tokio::test]
    async fn disabled_cache_always_calls_producer() {
        let cache = ReadThroughCache::disabled();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let _: u32 = cache
                .fetch("k", TTL, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(1)
                })
                .await
                .expect("fetch");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.invalidate("k").await.is_ok());
    }
}
