use crate::catalog::VersionCatalog;
use crate::{DappGetError, Result};
use tracing::{debug, warn};

pub mod search;
pub mod types;

pub use search::{Conflict, Outcome, Search};
pub use types::{Request, Resolution, StateDiff};

pub const DEFAULT_MAX_SEARCH_STEPS: usize = 100_000;

/// Picks one version per required package so that every dependency edge
/// between chosen versions holds. Pure and deterministic over `catalog`.
pub fn resolve(catalog: &VersionCatalog, request: &Request) -> Result<Resolution> {
    resolve_with_limit(catalog, request, DEFAULT_MAX_SEARCH_STEPS)
}

pub fn resolve_with_limit(
    catalog: &VersionCatalog,
    request: &Request,
    max_steps: usize,
) -> Result<Resolution> {
    request.version.validate(&request.name)?;

    match Search::new(catalog, request, max_steps).run() {
        Outcome::Solved(resolution) => {
            debug!(request = %request, packages = resolution.len(), "resolved");
            Ok(resolution)
        }
        Outcome::Unsatisfiable(conflict) => Err(unsatisfiable(conflict)),
        Outcome::Exhausted(conflict) => {
            warn!(request = %request, max_steps, "search step limit reached");
            Err(unsatisfiable(conflict))
        }
    }
}

fn unsatisfiable(conflict: Conflict) -> DappGetError {
    DappGetError::Unsatisfiable {
        name: conflict.name,
        constraints: conflict.constraints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DependencyMap;
    use crate::error::ConstraintOrigin;
    use crate::version::{VersionSpec, satisfies};

    fn deps(pairs: &[(&str, &str)]) -> DependencyMap {
        pairs
            .iter()
            .map(|(name, spec)| (name.to_string(), VersionSpec::from_raw(spec)))
            .collect()
    }

    fn resolution(pairs: &[(&str, &str)]) -> Resolution {
        pairs
            .iter()
            .map(|(name, version)| (name.to_string(), version.to_string()))
            .collect()
    }

    /// `(from, to)` edges between resolved packages that the resolution breaks.
    fn unsatisfied_edges(catalog: &VersionCatalog, resolution: &Resolution) -> Vec<(String, String)> {
        let mut broken = Vec::new();

        for (name, version) in resolution {
            let Some(deps) = catalog.get(name).and_then(|entry| entry.versions.get(version)) else {
                broken.push((name.clone(), name.clone()));
                continue;
            };

            for (dep, spec) in deps {
                let ok = resolution
                    .get(dep)
                    .is_some_and(|chosen| satisfies(spec, chosen));
                if !ok {
                    broken.push((name.clone(), dep.clone()));
                }
            }
        }

        broken
    }

    #[test]
    fn resolves_cycles() {
        let mut catalog = VersionCatalog::new();
        catalog.add_version("a", "0.1.0", deps(&[("b", "0.1.0")]));
        catalog.add_version("b", "0.1.0", deps(&[("c", "0.1.0")]));
        catalog.add_version("c", "0.1.0", deps(&[("a", "0.1.0")]));

        let result = resolve(&catalog, &Request::new("a", "0.1.0")).unwrap();

        assert_eq!(
            result,
            resolution(&[("a", "0.1.0"), ("b", "0.1.0"), ("c", "0.1.0")])
        );
    }

    #[test]
    fn prefers_installed_then_highest() {
        let mut catalog = VersionCatalog::new();
        catalog.add_version("a", "1.0.0", deps(&[("b", "^1.0.0")]));
        catalog.add_package("b", Some("1.1.0"));
        catalog.add_version("b", "1.0.0", deps(&[]));
        catalog.add_version("b", "1.1.0", deps(&[]));
        catalog.add_version("b", "1.2.0", deps(&[]));
        catalog.add_version("c", "2.0.0", deps(&[]));

        let result = resolve(&catalog, &Request::new("a", "*")).unwrap();
        assert_eq!(result, resolution(&[("a", "1.0.0"), ("b", "1.1.0")]));

        let mut fresh = VersionCatalog::new();
        fresh.add_version("b", "1.0.0", deps(&[]));
        fresh.add_version("b", "1.2.0", deps(&[]));
        fresh.add_version("b", "1.10.0", deps(&[]));

        let result = resolve(&fresh, &Request::new("b", "^1.0.0")).unwrap();
        assert_eq!(result, resolution(&[("b", "1.10.0")]));
    }

    #[test]
    fn forces_installed_dependant_to_upgrade() {
        let mut catalog = VersionCatalog::new();
        catalog.add_version("a", "0.2.0", deps(&[("c", "0.2.0")]));
        catalog.add_package("c", Some("0.1.0"));
        catalog.add_version("c", "0.1.0", deps(&[]));
        catalog.add_version("c", "0.2.0", deps(&[]));
        catalog.add_package("b", Some("0.1.0"));
        catalog.add_version("b", "0.1.0", deps(&[("c", "0.1.0")]));
        catalog.add_version("b", "0.2.0", deps(&[("c", "0.2.0")]));
        catalog.add_installed_seed("b", VersionSpec::from_raw(">=0.1.0"));

        let result = resolve(&catalog, &Request::new("a", "0.2.0")).unwrap();

        assert_eq!(
            result,
            resolution(&[("a", "0.2.0"), ("b", "0.2.0"), ("c", "0.2.0")])
        );
        assert!(unsatisfied_edges(&catalog, &result).is_empty());
    }

    #[test]
    fn backtracks_over_earlier_decisions() {
        // Highest b (2.0.0) needs c ^2, but d only works with c ^1.
        let mut catalog = VersionCatalog::new();
        catalog.add_version("a", "1.0.0", deps(&[("b", "*"), ("d", "1.0.0")]));
        catalog.add_version("b", "1.0.0", deps(&[("c", "^1.0.0")]));
        catalog.add_version("b", "2.0.0", deps(&[("c", "^2.0.0")]));
        catalog.add_version("d", "1.0.0", deps(&[("c", "^1.0.0")]));
        catalog.add_version("c", "1.0.0", deps(&[]));
        catalog.add_version("c", "2.0.0", deps(&[]));

        let result = resolve(&catalog, &Request::new("a", "1.0.0")).unwrap();

        assert_eq!(
            result,
            resolution(&[("a", "1.0.0"), ("b", "1.0.0"), ("c", "1.0.0"), ("d", "1.0.0")])
        );
    }

    #[test]
    fn reports_disjoint_ranges() {
        let mut catalog = VersionCatalog::new();
        catalog.add_version("a", "1.0.0", deps(&[("b", "^1.0.0"), ("c", "1.0.0")]));
        catalog.add_version("b", "1.0.0", deps(&[]));
        catalog.add_version("b", "2.0.0", deps(&[]));
        catalog.add_version("c", "1.0.0", deps(&[("b", "^2.0.0")]));

        let err = resolve(&catalog, &Request::new("a", "1.0.0")).unwrap_err();

        let DappGetError::Unsatisfiable { name, constraints } = err else {
            panic!("expected an unsatisfiable error");
        };
        assert_eq!(name, "b");
        let specs: Vec<&str> = constraints.iter().map(|c| c.spec.as_str()).collect();
        assert_eq!(specs, ["^1.0.0", "^2.0.0"]);
        assert_eq!(
            constraints[1].origin,
            ConstraintOrigin::Package {
                name: "c".to_string(),
                version: "1.0.0".to_string()
            }
        );
    }

    #[test]
    fn missing_request_version_is_unsatisfiable() {
        let mut catalog = VersionCatalog::new();
        catalog.add_version("a", "1.0.0", deps(&[]));

        let err = resolve(&catalog, &Request::new("a", "^2.0.0")).unwrap_err();
        assert!(
            matches!(&err, DappGetError::Unsatisfiable { name, constraints }
                if name == "a" && constraints[0].origin == ConstraintOrigin::Request),
            "{err}"
        );
    }

    #[test]
    fn invalid_request_range_is_rejected() {
        let catalog = VersionCatalog::new();
        let err = resolve(&catalog, &Request::new("a", "not a range")).unwrap_err();
        assert!(matches!(err, DappGetError::Semver { .. }));
    }

    #[test]
    fn pins_resolve_only_to_their_hash() {
        let pin = "/ipfs/Qm1111111111111111111111111111111111111111111111";
        let mut catalog = VersionCatalog::new();
        catalog.add_version("a", "1.0.0", deps(&[("b", pin)]));
        catalog.add_version("b", "9.0.0", deps(&[]));
        catalog.add_version("b", pin, deps(&[]));

        let result = resolve(&catalog, &Request::new("a", "1.0.0")).unwrap();
        assert_eq!(result.get("b").map(String::as_str), Some(pin));

        // Without a pin constraint the hash is never picked.
        let result = resolve(&catalog, &Request::new("b", "*")).unwrap();
        assert_eq!(result.get("b").map(String::as_str), Some("9.0.0"));
    }

    #[test]
    fn skips_packages_nothing_requires() {
        let mut catalog = VersionCatalog::new();
        catalog.add_version("a", "1.0.0", deps(&[("old", "1.0.0")]));
        catalog.add_version("a", "2.0.0", deps(&[]));
        catalog.add_version("old", "1.0.0", deps(&[]));

        let result = resolve(&catalog, &Request::new("a", "*")).unwrap();
        assert_eq!(result, resolution(&[("a", "2.0.0")]));
    }

    #[test]
    fn is_deterministic() {
        let mut catalog = VersionCatalog::new();
        catalog.add_version("a", "1.0.0", deps(&[("b", "*"), ("c", "*")]));
        for version in ["1.0.0", "1.1.0", "2.0.0"] {
            catalog.add_version("b", version, deps(&[("c", "^1.0.0")]));
            catalog.add_version("c", version, deps(&[]));
        }

        let request = Request::new("a", "1.0.0");
        let first = resolve(&catalog, &request).unwrap();
        for _ in 0..10 {
            assert_eq!(resolve(&catalog, &request).unwrap(), first);
        }
        assert!(unsatisfied_edges(&catalog, &first).is_empty());
    }

    #[test]
    fn step_limit_stops_the_search() {
        let mut catalog = VersionCatalog::new();
        catalog.add_version("a", "1.0.0", deps(&[("b", "*")]));
        for minor in 0..20 {
            catalog.add_version("b", &format!("1.{minor}.0"), deps(&[("z", "1.0.0")]));
        }
        catalog.add_version("z", "2.0.0", deps(&[]));

        let request = Request::new("a", "*");
        assert!(matches!(
            Search::new(&catalog, &request, 5).run(),
            Outcome::Exhausted(_)
        ));
        assert!(matches!(
            Search::new(&catalog, &request, DEFAULT_MAX_SEARCH_STEPS).run(),
            Outcome::Unsatisfiable(Conflict { ref name, .. }) if name == "z"
        ));

        let err = resolve_with_limit(&catalog, &request, 5).unwrap_err();
        assert!(matches!(err, DappGetError::Unsatisfiable { .. }));
    }
}
