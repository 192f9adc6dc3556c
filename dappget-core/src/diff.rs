use crate::catalog::VersionCatalog;
use crate::resolve::{Resolution, StateDiff};
use crate::version::should_update;

/// Keeps the packages that are new or would move forward. An empty diff
/// means the installed state already satisfies the request.
pub fn diff_against_installed(resolution: &Resolution, catalog: &VersionCatalog) -> StateDiff {
    resolution
        .iter()
        .filter(|(name, version)| match catalog.installed_version(name) {
            None => true,
            Some(installed) => should_update(installed, version),
        })
        .map(|(name, version)| (name.clone(), version.clone()))
        .collect()
}
