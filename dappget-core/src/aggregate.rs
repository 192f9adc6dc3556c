use crate::catalog::{DependencyMap, VersionCatalog};
use crate::fetch::{CoalescingFetcher, is_not_found};
use crate::progress::{ProgressEvent, ProgressObserver, notify};
use crate::resolve::Request;
use crate::version::{PackageName, VersionId, VersionSpec, is_ipfs_pin, parse_semver};
use crate::Result;
use futures::{StreamExt, TryStreamExt, stream};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

type WorkItem = (PackageName, VersionSpec);

/// Breadth-first exploration of everything `request` can reach, plus any
/// installed package that depends on what was found.
///
/// Fetches within one level run concurrently (up to `concurrency`) but are
/// consumed in submission order, so the discovery order recorded in the
/// catalog does not depend on network timing.
pub async fn aggregate(
    request: &Request,
    fetcher: &CoalescingFetcher,
    installed: &BTreeMap<PackageName, VersionId>,
    concurrency: usize,
    observer: Option<&ProgressObserver>,
) -> Result<VersionCatalog> {
    let mut aggregator = Aggregator {
        fetcher,
        installed,
        concurrency: concurrency.max(1),
        observer,
        catalog: VersionCatalog::new(),
        listed: BTreeSet::new(),
        prefetched: BTreeMap::new(),
    };

    aggregator.listed.insert((request.name.clone(), request.version.clone()));
    let mut level = vec![(request.name.clone(), request.version.clone())];

    loop {
        while !level.is_empty() {
            level = aggregator.expand_level(level).await?;
        }

        for (name, spec) in aggregator.relevant_installed().await? {
            debug!(%name, %spec, "including installed dependant");
            aggregator.catalog.add_installed_seed(&name, spec.clone());
            if aggregator.listed.insert((name.clone(), spec.clone())) {
                level.push((name, spec));
            }
        }

        if level.is_empty() {
            break;
        }
    }

    let catalog = aggregator.catalog;

    notify(
        observer,
        ProgressEvent::Aggregated {
            packages: catalog.len(),
            versions: catalog.version_count(),
        },
    );

    Ok(catalog)
}

struct Aggregator<'a> {
    fetcher: &'a CoalescingFetcher,
    installed: &'a BTreeMap<PackageName, VersionId>,
    concurrency: usize,
    observer: Option<&'a ProgressObserver>,
    catalog: VersionCatalog,
    /// `(name, spec)` pairs whose versions were already listed.
    listed: BTreeSet<WorkItem>,
    /// Installed releases fetched while checking relevance, kept so the pair
    /// is never fetched a second time. `None` marks a release the registry
    /// does not publish.
    prefetched: BTreeMap<(PackageName, VersionId), Option<DependencyMap>>,
}

impl Aggregator<'_> {
    async fn expand_level(&mut self, level: Vec<WorkItem>) -> Result<Vec<WorkItem>> {
        for (name, spec) in &level {
            notify(
                self.observer,
                ProgressEvent::Aggregating {
                    name: name.clone(),
                    spec: spec.to_string(),
                },
            );
            self.catalog
                .add_package(name, self.installed.get(name).map(String::as_str));
        }

        let fetcher = self.fetcher;
        let listings: Vec<Vec<VersionId>> = stream::iter(level.clone())
            .map(|(name, spec)| {
                let fetcher = fetcher.clone();
                async move { fetcher.versions(&name, &spec).await }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut queued = BTreeSet::new();
        let mut to_fetch: Vec<(PackageName, VersionId, bool)> = Vec::new();

        for ((name, _), versions) in level.iter().zip(listings) {
            let installed = self.installed.get(name);

            for version in &versions {
                if !self.catalog.contains_version(name, version)
                    && queued.insert((name.clone(), version.clone()))
                {
                    to_fetch.push((name.clone(), version.clone(), true));
                }
            }

            // The installed release is a candidate even when the listing
            // does not include it.
            if let Some(version) = installed
                && !self.catalog.contains_version(name, version)
                && queued.insert((name.clone(), version.clone()))
            {
                to_fetch.push((name.clone(), version.clone(), false));
            }
        }

        let prefetched = &self.prefetched;
        let fetched: Vec<Option<DependencyMap>> = stream::iter(to_fetch.clone())
            .map(|(name, version, listed)| {
                let fetcher = fetcher.clone();
                let known = prefetched.get(&(name.clone(), version.clone())).cloned();

                async move {
                    match known {
                        Some(Some(deps)) => return Ok(Some(deps)),
                        Some(None) if !listed => return Ok(None),
                        _ => {}
                    }

                    match fetcher.dependencies(&name, &version).await {
                        Ok(deps) => Ok(Some(deps)),
                        Err(err) if !listed && is_not_found(&err) => Ok(None),
                        Err(err) => Err(err),
                    }
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        let mut next = Vec::new();

        for ((name, version, _), deps) in to_fetch.into_iter().zip(fetched) {
            let Some(deps) = deps else {
                warn!(%name, %version, "installed version has no published release");
                continue;
            };

            notify(
                self.observer,
                ProgressEvent::Fetched {
                    name: name.clone(),
                    version: version.clone(),
                },
            );

            for (dep_name, dep_spec) in &deps {
                if self.listed.insert((dep_name.clone(), dep_spec.clone())) {
                    next.push((dep_name.clone(), dep_spec.clone()));
                }
            }

            self.prefetched.remove(&(name.clone(), version.clone()));
            self.catalog.add_version(&name, &version, deps);
        }

        Ok(next)
    }

    /// Installed packages outside the catalog whose installed version depends
    /// on something inside it.
    async fn relevant_installed(&mut self) -> Result<Vec<WorkItem>> {
        let candidates: Vec<(PackageName, VersionId)> = self
            .installed
            .iter()
            .filter(|(name, _)| !self.catalog.contains(name))
            .map(|(name, version)| (name.clone(), version.clone()))
            .collect();

        let missing: Vec<(PackageName, VersionId)> = candidates
            .iter()
            .filter(|key| !self.prefetched.contains_key(*key))
            .cloned()
            .collect();

        let fetcher = self.fetcher;
        let fetched: Vec<Option<DependencyMap>> = stream::iter(missing.clone())
            .map(|(name, version)| {
                let fetcher = fetcher.clone();
                async move {
                    match fetcher.dependencies(&name, &version).await {
                        Ok(deps) => Ok(Some(deps)),
                        Err(err) if is_not_found(&err) => Ok(None),
                        Err(err) => Err(err),
                    }
                }
            })
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        self.prefetched.extend(missing.into_iter().zip(fetched));

        let mut relevant = Vec::new();

        for (name, version) in candidates {
            let depends_on_catalog = self
                .prefetched
                .get(&(name.clone(), version.clone()))
                .and_then(Option::as_ref)
                .is_some_and(|deps| deps.keys().any(|dep| self.catalog.contains(dep)));

            if depends_on_catalog {
                relevant.push((name, installed_seed_spec(&version)));
            }
        }

        Ok(relevant)
    }
}

/// An installed package may move forward but never backwards.
fn installed_seed_spec(version: &str) -> VersionSpec {
    if is_ipfs_pin(version) {
        VersionSpec::IpfsPin(version.to_string())
    } else if parse_semver(version).is_some() {
        VersionSpec::Range(format!(">={}", version))
    } else {
        VersionSpec::any()
    }
}
