use crate::aggregate::aggregate;
use crate::catalog::VersionCatalog;
use crate::config::DappGetConfig;
use crate::diff::diff_against_installed;
use crate::fetch::{CoalescingFetcher, DependencyFetcher, InstalledState};
use crate::progress::{ProgressEvent, ProgressObserver, notify};
use crate::resolve::{Request, Resolution, StateDiff, resolve_with_limit};
use crate::{DappGetError, Result};
use futures::future::{AbortHandle, Abortable};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info};

/// Entry point for the install orchestration layer: aggregate, resolve and
/// diff one request at a time per package.
///
/// Calls for different packages run in parallel. A newer call for a package
/// aborts the aggregation of an older one still running and then waits for
/// it to release the package.
pub struct DappGet {
    fetcher: CoalescingFetcher,
    installed: Arc<dyn InstalledState>,
    config: DappGetConfig,
    observer: Option<ProgressObserver>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    inflight: Mutex<HashMap<String, (u64, AbortHandle)>>,
    tickets: AtomicU64,
}

impl DappGet {
    pub fn new(
        fetcher: Arc<dyn DependencyFetcher>,
        installed: Arc<dyn InstalledState>,
        config: DappGetConfig,
    ) -> Self {
        DappGet {
            fetcher: CoalescingFetcher::new(fetcher),
            installed,
            config,
            observer: None,
            locks: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            tickets: AtomicU64::new(0),
        }
    }

    pub fn with_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &DappGetConfig {
        &self.config
    }

    /// The packages that must be installed or upgraded to satisfy `request`.
    /// Empty when nothing needs to change.
    pub async fn update(&self, request: &Request) -> Result<StateDiff> {
        let (catalog, resolution) = self.run(request).await?;
        let diff = diff_against_installed(&resolution, &catalog);

        info!(request = %request, changes = diff.len(), "update computed");
        Ok(diff)
    }

    /// The full assignment for `request`, including unchanged packages.
    pub async fn resolve(&self, request: &Request) -> Result<Resolution> {
        let (_, resolution) = self.run(request).await?;
        Ok(resolution)
    }

    async fn run(&self, request: &Request) -> Result<(VersionCatalog, Resolution)> {
        request.version.validate(&request.name)?;

        let started = Instant::now();
        let (ticket, registration) = self.supersede(&request.name);

        let work = async {
            let lock = self.package_lock(&request.name);
            let _guard = lock.lock().await;

            let aggregation = async {
                let installed = self.installed.installed_versions().await?;
                aggregate(
                    request,
                    &self.fetcher,
                    &installed,
                    self.config.fetch_concurrency,
                    self.observer.as_ref(),
                )
                .await
            };

            let catalog = match Abortable::new(aggregation, registration).await {
                Ok(catalog) => catalog?,
                Err(_) => {
                    debug!(name = %request.name, "superseded");
                    return Err(DappGetError::Superseded {
                        name: request.name.clone(),
                    });
                }
            };

            notify(
                self.observer.as_ref(),
                ProgressEvent::Resolving {
                    name: request.name.clone(),
                },
            );

            let resolution = resolve_with_limit(&catalog, request, self.config.max_search_steps)?;

            notify(
                self.observer.as_ref(),
                ProgressEvent::Resolved {
                    packages: resolution.len(),
                },
            );

            Ok((catalog, resolution))
        };

        let outcome = tokio::time::timeout(self.config.timeout, work).await;
        self.release(&request.name, ticket);

        match outcome {
            Ok(result) => result,
            Err(_) => Err(DappGetError::Timeout {
                name: request.name.clone(),
                elapsed_ms: started.elapsed().as_millis(),
            }),
        }
    }

    /// Registers this call as the newest for `name`, aborting the previous one.
    fn supersede(&self, name: &str) -> (u64, futures::future::AbortRegistration) {
        let (handle, registration) = AbortHandle::new_pair();
        let ticket = self.tickets.fetch_add(1, Ordering::SeqCst);

        let previous = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(name.to_string(), (ticket, handle));

        if let Some((_, previous)) = previous {
            debug!(%name, "aborting older request");
            previous.abort();
        }

        (ticket, registration)
    }

    fn release(&self, name: &str, ticket: u64) {
        let mut inflight = self
            .inflight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if inflight.get(name).is_some_and(|(current, _)| *current == ticket) {
            inflight.remove(name);
        }
        drop(inflight);

        // Only the map still holds the lock once no call is waiting on it.
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if locks.get(name).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(name);
        }
    }

    fn package_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        Arc::clone(locks.entry(name.to_string()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryRegistry, StaticInstalledState};
    use crate::version::VersionSpec;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    fn installed(pairs: &[(&str, &str)]) -> Arc<StaticInstalledState> {
        Arc::new(StaticInstalledState::new(
            pairs
                .iter()
                .map(|(name, version)| (name.to_string(), version.to_string()))
                .collect(),
        ))
    }

    fn service(registry: Value, installed_pairs: &[(&str, &str)]) -> DappGet {
        DappGet::new(
            Arc::new(MemoryRegistry::from_value(registry).unwrap()),
            installed(installed_pairs),
            DappGetConfig::default(),
        )
    }

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn nothing_to_do_when_installed_matches() {
        let dappget = service(
            json!({
                "core.dnp.dappnode.eth": { "versions": {
                    "0.1.0": { "dependencies": { "dappmanager.dnp.dappnode.eth": "0.1.0" } }
                } },
                "dappmanager.dnp.dappnode.eth": { "versions": { "0.1.0": {} } }
            }),
            &[
                ("core.dnp.dappnode.eth", "0.1.0"),
                ("dappmanager.dnp.dappnode.eth", "0.1.0"),
            ],
        );

        let diff = dappget
            .update(&Request::new("core.dnp.dappnode.eth", "^0.1.0"))
            .await
            .unwrap();

        assert!(diff.is_empty(), "{diff:?}");
        assert!(dappget.locks.lock().unwrap().is_empty());
        assert!(dappget.inflight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cycles_terminate() {
        let dappget = service(
            json!({
                "a": { "versions": { "0.1.0": { "dependencies": { "b": "0.1.0" } } } },
                "b": { "versions": { "0.1.0": { "dependencies": { "c": "0.1.0" } } } },
                "c": { "versions": { "0.1.0": { "dependencies": { "a": "0.1.0" } } } }
            }),
            &[],
        );

        let resolution = dappget.resolve(&Request::new("a", "0.1.0")).await.unwrap();

        assert_eq!(
            resolution,
            map(&[("a", "0.1.0"), ("b", "0.1.0"), ("c", "0.1.0")])
        );
    }

    #[tokio::test]
    async fn upgrades_installed_dependant_never_requested() {
        let dappget = service(
            json!({
                "a": { "versions": { "0.2.0": { "dependencies": { "c": "0.2.0" } } } },
                "b": { "versions": {
                    "0.1.0": { "dependencies": { "c": "0.1.0" } },
                    "0.2.0": { "dependencies": { "c": "0.2.0" } }
                } },
                "c": { "versions": { "0.1.0": {}, "0.2.0": {} } }
            }),
            &[("b", "0.1.0"), ("c", "0.1.0")],
        );
        let request = Request::new("a", "0.2.0");

        let resolution = dappget.resolve(&request).await.unwrap();
        assert_eq!(
            resolution,
            map(&[("a", "0.2.0"), ("b", "0.2.0"), ("c", "0.2.0")])
        );

        let diff = dappget.update(&request).await.unwrap();
        assert_eq!(diff, resolution);
    }

    #[tokio::test]
    async fn disjoint_ranges_are_unsatisfiable() {
        let dappget = service(
            json!({
                "a": { "versions": { "1.0.0": { "dependencies": { "b": "^1.0.0", "c": "^1.0.0" } } } },
                "b": { "versions": { "1.0.0": {}, "2.0.0": {} } },
                "c": { "versions": { "1.0.0": { "dependencies": { "b": "^2.0.0" } } } }
            }),
            &[],
        );

        let err = dappget.update(&Request::new("a", "1.0.0")).await.unwrap_err();

        assert!(
            matches!(&err, DappGetError::Unsatisfiable { name, .. } if name == "b"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn new_install_of_pinned_release() {
        let pin = "/ipfs/QmPinnedRelease";
        let dappget = service(
            json!({
                "a": { "versions": { pin: { "dependencies": { "b": "latest" } } } },
                "b": { "versions": { "0.1.0": {}, "0.3.0": {} } }
            }),
            &[("b", "0.1.0")],
        );

        let diff = dappget.update(&Request::new("a", pin)).await.unwrap();

        // b stays on its installed release, which satisfies "*".
        assert_eq!(diff, map(&[("a", pin)]));
    }

    struct HangingFetcher {
        calls: AtomicUsize,
        started: Notify,
    }

    #[async_trait]
    impl DependencyFetcher for HangingFetcher {
        async fn fetch_versions(&self, _name: &str, _spec: &VersionSpec) -> Result<Value> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                self.started.notify_one();
                futures::future::pending::<()>().await;
            }
            Ok(json!(["1.0.0"]))
        }

        async fn fetch_dependencies(&self, _name: &str, _version: &str) -> Result<Value> {
            Ok(json!({}))
        }
    }

    fn hanging() -> Arc<HangingFetcher> {
        Arc::new(HangingFetcher {
            calls: AtomicUsize::new(0),
            started: Notify::new(),
        })
    }

    #[tokio::test]
    async fn deadline_turns_into_timeout() {
        let config = DappGetConfig {
            timeout: Duration::from_millis(50),
            ..DappGetConfig::default()
        };
        let dappget = DappGet::new(hanging(), installed(&[]), config);

        let err = dappget.update(&Request::new("a", "*")).await.unwrap_err();

        assert!(matches!(err, DappGetError::Timeout { ref name, .. } if name == "a"), "{err}");
    }

    #[tokio::test]
    async fn newer_request_supersedes_older() {
        let fetcher = hanging();
        let dappget = Arc::new(DappGet::new(
            fetcher.clone(),
            installed(&[]),
            DappGetConfig::default(),
        ));

        let first = tokio::spawn({
            let dappget = Arc::clone(&dappget);
            async move { dappget.update(&Request::new("a", "*")).await }
        });

        fetcher.started.notified().await;
        let second = dappget.update(&Request::new("a", "*")).await.unwrap();
        let first = first.await.unwrap();

        assert_eq!(second, map(&[("a", "1.0.0")]));
        assert!(matches!(first, Err(DappGetError::Superseded { .. })), "{first:?}");
        assert!(dappget.locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reports_progress_to_observer() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let dappget = service(json!({ "a": { "versions": { "1.0.0": {} } } }), &[])
            .with_observer(Arc::new(move |event: &ProgressEvent| {
                sink.lock().unwrap().push(event.clone());
            }));

        dappget.update(&Request::new("a", "*")).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(
            events.first(),
            Some(&ProgressEvent::Aggregating {
                name: "a".to_string(),
                spec: "*".to_string()
            })
        );
        assert_eq!(events.last(), Some(&ProgressEvent::Resolved { packages: 1 }));
    }
}
