//! Memoizing repository wrapper
//!
//! [`CachedRepository`] sits between the orchestrator and a real repository:
//!
//! - lookups are memoized per (name, version spec, settings key) and fetches
//!   per [`ConfigHash`]; concurrent callers for one key share a single
//!   in-flight request
//! - transient (`Network`) failures are retried with bounded exponential
//!   backoff; exhaustion surfaces as [`RepositoryError::Fetch`]
//!
//! Failed requests are not memoized, so a later call tries again.

use backoff::ExponentialBackoffBuilder;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::defaults;
use crate::core::hash::ConfigHash;
use crate::core::requirement::VersionSpec;
use crate::core::settings::Settings;
use crate::error::RepositoryError;
use crate::registry::{ArtifactHandle, PackageMetadata, PackageRepository};

/// Bounded retry policy for transient repository failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_FETCH_RETRIES,
            base_delay: Duration::from_millis(defaults::FETCH_BACKOFF_BASE_MS),
            max_delay: Duration::from_millis(defaults::FETCH_BACKOFF_MAX_MS),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and base delay
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_millis(defaults::FETCH_BACKOFF_MAX_MS).max(base_delay),
        }
    }

    fn backoff(&self) -> backoff::ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.base_delay)
            .with_max_interval(self.max_delay)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

type LookupKey = (String, String, String);
type Slot<T> = Arc<OnceCell<T>>;

/// Memoizing, retrying wrapper around a repository
#[derive(Debug)]
pub struct CachedRepository<R> {
    inner: R,
    retry: RetryPolicy,
    lookups: Mutex<HashMap<LookupKey, Slot<PackageMetadata>>>,
    fetches: Mutex<HashMap<ConfigHash, Slot<PathBuf>>>,
}

impl<R: PackageRepository> CachedRepository<R> {
    /// Wrap `inner` with the default retry policy
    pub fn new(inner: R) -> Self {
        Self::with_retry(inner, RetryPolicy::default())
    }

    /// Wrap `inner` with a custom retry policy
    pub fn with_retry(inner: R, retry: RetryPolicy) -> Self {
        Self {
            inner,
            retry,
            lookups: Mutex::new(HashMap::new()),
            fetches: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped repository
    pub fn inner(&self) -> &R {
        &self.inner
    }

    fn slot<K, T>(map: &Mutex<HashMap<K, Slot<T>>>, key: K) -> Slot<T>
    where
        K: std::hash::Hash + Eq,
    {
        let mut guard = map.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.entry(key).or_default().clone()
    }

    /// Run `op` until it succeeds, fails permanently, or exhausts the budget
    async fn retrying<T, F, Fut>(&self, name: &str, mut op: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        let max_attempts = self.retry.max_attempts;
        let mut attempt = 0u32;

        backoff::future::retry(self.retry.backoff(), || {
            attempt += 1;
            let current = attempt;
            let name = name.to_string();
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(e) if e.is_transient() && current < max_attempts => {
                        tracing::warn!(
                            "Attempt {current}/{max_attempts} for '{name}' failed: {e}, retrying"
                        );
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) if e.is_transient() => {
                        Err(backoff::Error::permanent(RepositoryError::Fetch {
                            name,
                            attempts: current,
                            error: e.to_string(),
                        }))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
    }
}

impl<R: PackageRepository> PackageRepository for CachedRepository<R> {
    async fn lookup(
        &self,
        name: &str,
        spec: &VersionSpec,
        settings: &Settings,
    ) -> Result<PackageMetadata, RepositoryError> {
        let key = (name.to_string(), spec.to_string(), settings.key());
        let slot = Self::slot(&self.lookups, key);

        slot.get_or_try_init(|| async {
            tracing::debug!("Looking up {name}/{spec}");
            self.retrying(name, || self.inner.lookup(name, spec, settings))
                .await
        })
        .await
        .cloned()
    }

    async fn fetch(
        &self,
        artifact: &ArtifactHandle,
        config: &ConfigHash,
    ) -> Result<PathBuf, RepositoryError> {
        let slot = Self::slot(&self.fetches, config.clone());

        slot.get_or_try_init(|| async {
            tracing::info!(
                "Fetching {}/{} ({})",
                artifact.name,
                artifact.version,
                config.short()
            );
            self.retrying(&artifact.name, || self.inner.fetch(artifact, config))
                .await
        })
        .await
        .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::package::PackageDescriptor;
    use crate::registry::InMemoryRepository;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails with a network error a fixed number of times, then delegates
    struct FlakyRepository {
        inner: InMemoryRepository,
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyRepository {
        fn new(failures: u32) -> Self {
            Self {
                inner: InMemoryRepository::new().with_package(PackageDescriptor::new("fmt", "11.1.3")),
                failures_left: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
            }
        }

        fn fail_once(&self) -> Option<RepositoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Some(RepositoryError::Network {
                    name: "fmt".into(),
                    error: "connection reset".into(),
                });
            }
            None
        }
    }

    impl PackageRepository for FlakyRepository {
        async fn lookup(
            &self,
            name: &str,
            spec: &VersionSpec,
            settings: &Settings,
        ) -> Result<PackageMetadata, RepositoryError> {
            if let Some(e) = self.fail_once() {
                return Err(e);
            }
            self.inner.lookup(name, spec, settings).await
        }

        async fn fetch(
            &self,
            artifact: &ArtifactHandle,
            config: &ConfigHash,
        ) -> Result<PathBuf, RepositoryError> {
            if let Some(e) = self.fail_once() {
                return Err(e);
            }
            self.inner.fetch(artifact, config).await
        }
    }

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    fn exact(v: &str) -> VersionSpec {
        VersionSpec::Exact(v.to_string())
    }

    #[tokio::test]
    async fn test_lookup_is_memoized() {
        let repo = CachedRepository::new(
            InMemoryRepository::new().with_package(PackageDescriptor::new("fmt", "11.1.3")),
        );
        let settings = Settings::detect();
        for _ in 0..3 {
            repo.lookup("fmt", &exact("11.1.3"), &settings).await.unwrap();
        }
        assert_eq!(repo.inner().lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_lookups_collapse() {
        let repo = CachedRepository::new(
            InMemoryRepository::new()
                .with_package(PackageDescriptor::new("fmt", "11.1.3"))
                .with_latency(Duration::from_millis(50)),
        );
        let settings = Settings::detect();
        let spec = exact("11.1.3");

        let results = futures::future::join_all(
            (0..8).map(|_| repo.lookup("fmt", &spec, &settings)),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(repo.inner().lookup_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_fetches_collapse_per_config() {
        let repo = CachedRepository::new(
            InMemoryRepository::new()
                .with_package(PackageDescriptor::new("fmt", "11.1.3"))
                .with_latency(Duration::from_millis(20)),
        );
        let settings = Settings::detect();
        let handle = ArtifactHandle::new("fmt", "11.1.3", "mem://fmt/11.1.3");
        let shared = ConfigHash::compute("fmt", "11.1.3", &settings, &BTreeMap::new());
        let other = ConfigHash::compute(
            "fmt",
            "11.1.3",
            &settings,
            &BTreeMap::from([("shared".to_string(), "True".to_string())]),
        );

        let (a, b, c) = tokio::join!(
            repo.fetch(&handle, &shared),
            repo.fetch(&handle, &shared),
            repo.fetch(&handle, &other),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.is_ok());
        assert_eq!(repo.inner().fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let repo = CachedRepository::with_retry(FlakyRepository::new(2), fast_retry(3));
        let meta = repo
            .lookup("fmt", &exact("11.1.3"), &Settings::detect())
            .await
            .unwrap();
        assert_eq!(meta.resolved_version, "11.1.3");
        assert_eq!(repo.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_surfaces_fetch_error() {
        let repo = CachedRepository::with_retry(FlakyRepository::new(10), fast_retry(3));
        let handle = ArtifactHandle::new("fmt", "11.1.3", "mem://fmt/11.1.3");
        let hash = ConfigHash::compute("fmt", "11.1.3", &Settings::detect(), &BTreeMap::new());

        let err = repo.fetch(&handle, &hash).await.unwrap_err();
        assert_eq!(
            err,
            RepositoryError::Fetch {
                name: "fmt".into(),
                attempts: 3,
                error: "Network error for 'fmt': connection reset".into(),
            }
        );
        assert_eq!(repo.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let repo = CachedRepository::with_retry(FlakyRepository::new(0), fast_retry(5));
        let err = repo
            .lookup("fmt", &exact("1.0.0"), &Settings::detect())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
        assert_eq!(repo.inner().calls.load(Ordering::SeqCst), 1);
    }
}
