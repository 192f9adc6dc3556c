use crate::catalog::VersionCatalog;
use crate::error::{ConflictingConstraint, ConstraintOrigin};
use crate::resolve::types::{Request, Resolution};
use crate::version::{SpecMatcher, VersionSpec, parse_semver};
use dappget_semver::Version;
use std::collections::BTreeMap;
use tracing::{debug, trace};

struct Edge<'a> {
    target: usize,
    spec: &'a VersionSpec,
    matcher: SpecMatcher,
}

struct Candidate<'a> {
    version: &'a str,
    semver: Option<Version>,
    edges: Vec<Edge<'a>>,
}

/// One decision variable per package name.
struct Variable<'a> {
    name: &'a str,
    installed: Option<&'a str>,
    candidates: Vec<Candidate<'a>>,
}

/// A constraint that does not come from a chosen version: the request itself
/// or an installed dependant pulled in by the aggregator.
struct Root {
    target: usize,
    spec: VersionSpec,
    matcher: SpecMatcher,
    origin: ConstraintOrigin,
}

#[derive(Clone, Copy, Debug)]
enum Active {
    Root(usize),
    Edge {
        from: usize,
        candidate: usize,
        edge: usize,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub name: String,
    pub constraints: Vec<ConflictingConstraint>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Solved(Resolution),
    Unsatisfiable(Conflict),
    /// The step budget ran out before the search finished.
    Exhausted(Conflict),
}

/// Backtracking search over an arena of variables. Chooses versions in a
/// fixed variable order (request first, then discovery order) and only for
/// packages that some active constraint requires.
pub struct Search<'a> {
    variables: Vec<Variable<'a>>,
    roots: Vec<Root>,
    /// Active constraints per variable, pushed and popped as a stack.
    constraints: Vec<Vec<Active>>,
    assignment: Vec<Option<usize>>,
    steps: usize,
    max_steps: usize,
    exhausted: bool,
    last_conflict: Option<(usize, Vec<Active>)>,
}

impl<'a> Search<'a> {
    pub fn new(catalog: &'a VersionCatalog, request: &'a Request, max_steps: usize) -> Self {
        let mut index: BTreeMap<&'a str, usize> = BTreeMap::new();
        let mut names: Vec<&'a str> = Vec::new();

        let mut intern = |name: &'a str, names: &mut Vec<&'a str>| -> usize {
            *index.entry(name).or_insert_with(|| {
                names.push(name);
                names.len() - 1
            })
        };

        intern(request.name.as_str(), &mut names);
        for name in catalog.discovery_order() {
            intern(name.as_str(), &mut names);
        }

        // Dependency targets missing from the catalog still get a variable,
        // with an empty domain.
        for name in catalog.discovery_order() {
            if let Some(entry) = catalog.get(name) {
                for deps in entry.versions.values() {
                    for dep in deps.keys() {
                        intern(dep.as_str(), &mut names);
                    }
                }
            }
        }
        for seed in catalog.installed_seeds() {
            intern(seed.name.as_str(), &mut names);
        }

        let lookup = |name: &str| index.get(name).copied();

        let variables: Vec<Variable<'a>> = names
            .iter()
            .map(|&name| {
                let entry = catalog.get(name);
                let candidates = entry
                    .map(|entry| {
                        entry
                            .versions
                            .iter()
                            .map(|(version, deps)| Candidate {
                                version: version.as_str(),
                                semver: parse_semver(version),
                                edges: deps
                                    .iter()
                                    .filter_map(|(dep, spec)| {
                                        Some(Edge {
                                            target: lookup(dep.as_str())?,
                                            spec,
                                            matcher: spec.compile(),
                                        })
                                    })
                                    .collect(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                Variable {
                    name,
                    installed: entry.and_then(|entry| entry.installed_version.as_deref()),
                    candidates,
                }
            })
            .collect();

        let mut roots = vec![Root {
            target: 0,
            spec: request.version.clone(),
            matcher: request.version.compile(),
            origin: ConstraintOrigin::Request,
        }];

        for seed in catalog.installed_seeds() {
            if let Some(target) = lookup(seed.name.as_str()) {
                roots.push(Root {
                    target,
                    spec: seed.spec.clone(),
                    matcher: seed.spec.compile(),
                    origin: ConstraintOrigin::Installed,
                });
            }
        }

        let mut constraints = vec![Vec::new(); variables.len()];
        for (idx, root) in roots.iter().enumerate() {
            constraints[root.target].push(Active::Root(idx));
        }

        Search {
            assignment: vec![None; variables.len()],
            variables,
            roots,
            constraints,
            steps: 0,
            max_steps,
            exhausted: false,
            last_conflict: None,
        }
    }

    pub fn run(mut self) -> Outcome {
        let solved = self.solve();
        debug!(steps = self.steps, solved, "search finished");

        if solved {
            let resolution = self
                .assignment
                .iter()
                .enumerate()
                .filter_map(|(var, chosen)| {
                    let variable = &self.variables[var];
                    chosen.map(|c| {
                        (
                            variable.name.to_string(),
                            variable.candidates[c].version.to_string(),
                        )
                    })
                })
                .collect();
            return Outcome::Solved(resolution);
        }

        let conflict = self.describe_conflict();
        if self.exhausted {
            Outcome::Exhausted(conflict)
        } else {
            Outcome::Unsatisfiable(conflict)
        }
    }

    fn solve(&mut self) -> bool {
        let Some(var) = self.next_variable() else {
            return true;
        };

        let domain = self.domain(var);
        if domain.is_empty() {
            self.last_conflict = Some((var, self.constraints[var].clone()));
            return false;
        }

        for candidate in domain {
            self.steps += 1;
            if self.steps > self.max_steps {
                self.exhausted = true;
                return false;
            }

            if !self.consistent(var, candidate) {
                continue;
            }

            trace!(
                name = self.variables[var].name,
                version = self.variables[var].candidates[candidate].version,
                "trying"
            );

            self.assign(var, candidate);
            if self.solve() {
                return true;
            }
            self.unassign(var, candidate);

            if self.exhausted {
                return false;
            }
        }

        false
    }

    fn next_variable(&self) -> Option<usize> {
        (0..self.variables.len())
            .find(|&var| self.assignment[var].is_none() && !self.constraints[var].is_empty())
    }

    fn matcher(&self, active: Active) -> &SpecMatcher {
        match active {
            Active::Root(idx) => &self.roots[idx].matcher,
            Active::Edge {
                from,
                candidate,
                edge,
            } => &self.variables[from].candidates[candidate].edges[edge].matcher,
        }
    }

    fn allowed(&self, var: usize, candidate: usize, extra: Option<Active>) -> bool {
        let version = self.variables[var].candidates[candidate].version;
        self.constraints[var]
            .iter()
            .copied()
            .chain(extra)
            .all(|active| self.matcher(active).matches(version))
    }

    /// Candidates satisfying every active constraint, best first: the
    /// installed version, then semver releases from highest to lowest, then
    /// content pins (which can only survive filtering under a pin constraint).
    fn domain(&self, var: usize) -> Vec<usize> {
        let variable = &self.variables[var];
        let allowed: Vec<usize> = (0..variable.candidates.len())
            .filter(|&c| self.allowed(var, c, None))
            .collect();

        let pinned = self.constraints[var]
            .iter()
            .any(|&active| matches!(self.matcher(active), SpecMatcher::Pin(_)));

        let mut semver: Vec<usize> = allowed
            .iter()
            .copied()
            .filter(|&c| variable.candidates[c].semver.is_some())
            .collect();
        semver.sort_by(|&a, &b| {
            variable.candidates[b]
                .semver
                .cmp(&variable.candidates[a].semver)
        });

        let pins = allowed
            .iter()
            .copied()
            .filter(|&c| pinned && variable.candidates[c].semver.is_none());

        let mut ordered: Vec<usize> = semver.into_iter().chain(pins).collect();

        if let Some(installed) = variable.installed
            && let Some(pos) = ordered
                .iter()
                .position(|&c| variable.candidates[c].version == installed)
        {
            let chosen = ordered.remove(pos);
            ordered.insert(0, chosen);
        }

        ordered
    }

    /// Checks every edge of `candidate` against already-decided targets and,
    /// for undecided ones, that some version would remain.
    fn consistent(&mut self, var: usize, candidate: usize) -> bool {
        let edges = &self.variables[var].candidates[candidate].edges;

        for (idx, edge) in edges.iter().enumerate() {
            let active = Active::Edge {
                from: var,
                candidate,
                edge: idx,
            };

            let satisfied = if edge.target == var {
                edge.matcher
                    .matches(self.variables[var].candidates[candidate].version)
            } else if let Some(decided) = self.assignment[edge.target] {
                edge.matcher
                    .matches(self.variables[edge.target].candidates[decided].version)
            } else {
                (0..self.variables[edge.target].candidates.len())
                    .any(|c| self.allowed(edge.target, c, Some(active)))
            };

            if !satisfied {
                let target = edge.target;
                let mut constraints = self.constraints[target].clone();
                constraints.push(active);
                trace!(
                    name = self.variables[var].name,
                    version = self.variables[var].candidates[candidate].version,
                    conflict = self.variables[target].name,
                    "rejected"
                );
                self.last_conflict = Some((target, constraints));
                return false;
            }
        }

        true
    }

    fn assign(&mut self, var: usize, candidate: usize) {
        self.assignment[var] = Some(candidate);

        let edges = &self.variables[var].candidates[candidate].edges;
        for (idx, edge) in edges.iter().enumerate() {
            self.constraints[edge.target].push(Active::Edge {
                from: var,
                candidate,
                edge: idx,
            });
        }
    }

    fn unassign(&mut self, var: usize, candidate: usize) {
        let edges = &self.variables[var].candidates[candidate].edges;
        for edge in edges.iter().rev() {
            self.constraints[edge.target].pop();
        }

        self.assignment[var] = None;
    }

    fn describe_conflict(&self) -> Conflict {
        let (var, actives) = match &self.last_conflict {
            Some((var, actives)) => (*var, actives.clone()),
            None => (0, self.constraints[0].clone()),
        };

        let constraints = actives
            .into_iter()
            .map(|active| match active {
                Active::Root(idx) => ConflictingConstraint {
                    spec: self.roots[idx].spec.to_string(),
                    origin: self.roots[idx].origin.clone(),
                },
                Active::Edge {
                    from,
                    candidate,
                    edge,
                } => {
                    let source = &self.variables[from];
                    let chosen = &source.candidates[candidate];
                    ConflictingConstraint {
                        spec: chosen.edges[edge].spec.to_string(),
                        origin: ConstraintOrigin::Package {
                            name: source.name.to_string(),
                            version: chosen.version.to_string(),
                        },
                    }
                }
            })
            .collect();

        Conflict {
            name: self.variables[var].name.to_string(),
            constraints,
        }
    }
}
