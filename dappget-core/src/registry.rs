use crate::fetch::{DependencyFetcher, InstalledState};
use crate::version::{PackageName, VersionId, VersionSpec};
use crate::{DappGetError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

pub mod types;

pub use types::{RegistryPackage, RegistryVersion};

/// A registry held in memory, loaded from a JSON document keyed by package
/// name. Stands in for the IPFS/ENS backed release lookup.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    packages: BTreeMap<PackageName, RegistryPackage>,
    dependency_fetches: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new(packages: BTreeMap<PackageName, RegistryPackage>) -> Self {
        MemoryRegistry {
            packages,
            dependency_fetches: AtomicUsize::new(0),
        }
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let packages = serde_json::from_value(value).map_err(|err| DappGetError::ParseJson {
            path: "<memory>".into(),
            reason: err.to_string(),
        })?;
        Ok(Self::new(packages))
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(read_json(path)?))
    }

    /// Number of `fetch_dependencies` calls served so far.
    pub fn dependency_fetches(&self) -> usize {
        self.dependency_fetches.load(Ordering::SeqCst)
    }

    fn package(&self, name: &str, version: &str) -> Result<&RegistryPackage> {
        self.packages
            .get(name)
            .ok_or_else(|| DappGetError::NotFound {
                name: name.to_string(),
                version: version.to_string(),
            })
    }
}

#[async_trait]
impl DependencyFetcher for MemoryRegistry {
    async fn fetch_versions(&self, name: &str, spec: &VersionSpec) -> Result<Value> {
        let package = self.package(name, spec.as_str())?;

        if let VersionSpec::IpfsPin(pin) = spec {
            if !package.versions.contains_key(pin) {
                return Err(DappGetError::NotFound {
                    name: name.to_string(),
                    version: pin.clone(),
                });
            }
            return Ok(Value::from(vec![pin.clone()]));
        }

        let matcher = spec.compile();
        let versions: Vec<String> = package
            .versions
            .keys()
            .filter(|version| matcher.matches(version))
            .cloned()
            .collect();

        Ok(Value::from(versions))
    }

    async fn fetch_dependencies(&self, name: &str, version: &str) -> Result<Value> {
        self.dependency_fetches.fetch_add(1, Ordering::SeqCst);

        let release = self
            .package(name, version)?
            .versions
            .get(version)
            .ok_or_else(|| DappGetError::NotFound {
                name: name.to_string(),
                version: version.to_string(),
            })?;

        Ok(release.dependencies.clone())
    }
}

/// Installed versions read from a `{ "<name>": "<version>" }` document.
#[derive(Clone, Debug, Default)]
pub struct StaticInstalledState {
    versions: BTreeMap<PackageName, VersionId>,
}

impl StaticInstalledState {
    pub fn new(versions: BTreeMap<PackageName, VersionId>) -> Self {
        StaticInstalledState { versions }
    }

    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self::new(read_json(path)?))
    }

    pub fn versions(&self) -> &BTreeMap<PackageName, VersionId> {
        &self.versions
    }
}

#[async_trait]
impl InstalledState for StaticInstalledState {
    async fn installed_versions(&self) -> Result<BTreeMap<PackageName, VersionId>> {
        Ok(self.versions.clone())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).map_err(|source| DappGetError::ReadFile {
        path: path.to_path_buf(),
        reason: source.to_string(),
    })?;

    serde_json::from_str(&data).map_err(|source| DappGetError::ParseJson {
        path: path.to_path_buf(),
        reason: source.to_string(),
    })
}
