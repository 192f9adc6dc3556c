use crate::version::{PackageName, VersionId, VersionSpec};
use serde::Serialize;
use std::collections::BTreeMap;

pub type DependencyMap = BTreeMap<PackageName, VersionSpec>;

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PackageEntry {
    #[serde(rename = "installedVersion", skip_serializing_if = "Option::is_none")]
    pub installed_version: Option<VersionId>,
    pub versions: BTreeMap<VersionId, DependencyMap>,
}

/// A constraint the aggregator adds for an installed package that depends on
/// something in the catalog, so the resolver keeps it consistent too.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstalledSeed {
    pub name: PackageName,
    pub spec: VersionSpec,
}

/// Every package and version discovered while exploring one request.
/// Built by the aggregator and read-only afterwards.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct VersionCatalog {
    packages: BTreeMap<PackageName, PackageEntry>,
    #[serde(skip)]
    order: Vec<PackageName>,
    #[serde(skip)]
    installed_seeds: Vec<InstalledSeed>,
}

impl VersionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a package, recording its discovery position the first time.
    pub fn add_package(&mut self, name: &str, installed_version: Option<&str>) -> &mut PackageEntry {
        if !self.packages.contains_key(name) {
            self.order.push(name.to_string());
        }

        let entry = self.packages.entry(name.to_string()).or_default();
        if entry.installed_version.is_none() {
            entry.installed_version = installed_version.map(str::to_string);
        }
        entry
    }

    pub fn add_version(&mut self, name: &str, version: &str, dependencies: DependencyMap) {
        self.add_package(name, None)
            .versions
            .insert(version.to_string(), dependencies);
    }

    pub fn add_installed_seed(&mut self, name: &str, spec: VersionSpec) {
        self.installed_seeds.push(InstalledSeed {
            name: name.to_string(),
            spec,
        });
    }

    pub fn get(&self, name: &str) -> Option<&PackageEntry> {
        self.packages.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn contains_version(&self, name: &str, version: &str) -> bool {
        self.packages
            .get(name)
            .is_some_and(|entry| entry.versions.contains_key(version))
    }

    pub fn installed_version(&self, name: &str) -> Option<&str> {
        self.packages
            .get(name)
            .and_then(|entry| entry.installed_version.as_deref())
    }

    /// Package names in the order the aggregator discovered them.
    pub fn discovery_order(&self) -> &[PackageName] {
        &self.order
    }

    pub fn installed_seeds(&self) -> &[InstalledSeed] {
        &self.installed_seeds
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn version_count(&self) -> usize {
        self.packages.values().map(|entry| entry.versions.len()).sum()
    }
}
