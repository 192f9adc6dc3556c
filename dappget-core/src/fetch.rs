use crate::catalog::DependencyMap;
use crate::sanitize::{sanitize_dependencies, sanitize_versions};
use crate::version::{PackageName, VersionId, VersionSpec};
use crate::{DappGetError, Result};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, WeakShared};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Source of package manifests. Implementations return the raw, untrusted
/// manifest fields; sanitizing them is the caller's job.
#[async_trait]
pub trait DependencyFetcher: Send + Sync {
    /// Lists the published versions of `name` that match `spec`.
    async fn fetch_versions(&self, name: &str, spec: &VersionSpec) -> Result<Value>;

    /// Returns the dependency map declared by `name@version`.
    async fn fetch_dependencies(&self, name: &str, version: &str) -> Result<Value>;
}

#[async_trait]
pub trait InstalledState: Send + Sync {
    async fn installed_versions(&self) -> Result<BTreeMap<PackageName, VersionId>>;
}

type FetchFuture<T> = BoxFuture<'static, Result<T>>;
type InflightEntries<T> = HashMap<(String, String), WeakShared<FetchFuture<T>>>;
type InflightMap<T> = Arc<Mutex<InflightEntries<T>>>;

/// Wraps a [`DependencyFetcher`] so concurrent requests for the same
/// `(name, version)` share one outstanding fetch, and every result comes back
/// sanitized. The map only holds weak handles: once every waiter is gone
/// (for instance an aborted aggregation) the fetch is dropped with them.
#[derive(Clone)]
pub struct CoalescingFetcher {
    inner: Arc<dyn DependencyFetcher>,
    versions: InflightMap<Vec<VersionId>>,
    dependencies: InflightMap<DependencyMap>,
}

impl CoalescingFetcher {
    pub fn new(inner: Arc<dyn DependencyFetcher>) -> Self {
        Self {
            inner,
            versions: Arc::default(),
            dependencies: Arc::default(),
        }
    }

    pub async fn versions(&self, name: &str, spec: &VersionSpec) -> Result<Vec<VersionId>> {
        let inner = Arc::clone(&self.inner);
        let owned_name = name.to_string();
        let owned_spec = spec.clone();

        let shared = coalesce(&self.versions, (name.to_string(), spec.to_string()), move || {
            async move {
                debug!(name = %owned_name, spec = %owned_spec, "listing versions");
                let raw = inner.fetch_versions(&owned_name, &owned_spec).await?;
                sanitize_versions(&raw).map_err(|err| err.for_package(&owned_name, owned_spec.as_str()))
            }
            .boxed()
        });

        shared.await
    }

    pub async fn dependencies(&self, name: &str, version: &str) -> Result<DependencyMap> {
        let inner = Arc::clone(&self.inner);
        let owned_name = name.to_string();
        let owned_version = version.to_string();

        let shared = coalesce(
            &self.dependencies,
            (name.to_string(), version.to_string()),
            move || {
                async move {
                    debug!(name = %owned_name, version = %owned_version, "fetching dependencies");
                    let raw = inner.fetch_dependencies(&owned_name, &owned_version).await?;
                    sanitize_dependencies(&raw)
                        .map_err(|err| err.for_package(&owned_name, &owned_version))
                }
                .boxed()
            },
        );

        shared.await
    }
}

fn coalesce<T, F>(map: &InflightMap<T>, key: (String, String), make: F) -> Shared<FetchFuture<T>>
where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> FetchFuture<T>,
{
    let mut inflight = lock(map);

    if let Some(existing) = inflight.get(&key).and_then(WeakShared::upgrade) {
        return existing;
    }

    let cleanup = Arc::clone(map);
    let cleanup_key = key.clone();
    let fetch = make();

    let shared = async move {
        let result = fetch.await;
        lock(&cleanup).remove(&cleanup_key);
        result
    }
    .boxed()
    .shared();

    if let Some(weak) = shared.downgrade() {
        inflight.insert(key, weak);
    }
    shared
}

fn lock<T>(map: &InflightMap<T>) -> MutexGuard<'_, InflightEntries<T>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// True for errors that mean "this release does not exist" rather than a
/// transport failure.
pub fn is_not_found(err: &DappGetError) -> bool {
    matches!(err, DappGetError::NotFound { .. })
}
