use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Where an active constraint on a package came from.
#[derive(Clone, Debug, PartialEq, Eq, Ord, PartialOrd)]
pub enum ConstraintOrigin {
    Request,
    Installed,
    Package { name: String, version: String },
}

impl fmt::Display for ConstraintOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintOrigin::Request => write!(f, "request"),
            ConstraintOrigin::Installed => write!(f, "installed"),
            ConstraintOrigin::Package { name, version } => write!(f, "{}@{}", name, version),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictingConstraint {
    pub spec: String,
    pub origin: ConstraintOrigin,
}

impl fmt::Display for ConflictingConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (from {})", self.spec, self.origin)
    }
}

#[derive(Error, Debug, Clone)]
pub enum DappGetError {
    #[error("Invalid manifest data for {subject}: {reason}")]
    Validation { subject: String, reason: String },

    #[error("Failed to fetch {name}@{version}: {reason}")]
    Fetch {
        name: String,
        version: String,
        reason: String,
    },

    #[error("No release found for {name}@{version}")]
    NotFound { name: String, version: String },

    #[error("Could not find a version of {name} compatible with: {}", join_constraints(.constraints))]
    Unsatisfiable {
        name: String,
        constraints: Vec<ConflictingConstraint>,
    },

    #[error("Aggregating dependencies of {name} timed out after {elapsed_ms}ms")]
    Timeout { name: String, elapsed_ms: u128 },

    #[error("Resolution of {name} was superseded by a newer request")]
    Superseded { name: String },

    #[error("Invalid semver range {value}: {reason}")]
    Semver { value: String, reason: String },

    #[error("Failed to read file {path:?}: {reason}")]
    ReadFile { path: PathBuf, reason: String },

    #[error("Failed to parse JSON in {path:?}: {reason}")]
    ParseJson { path: PathBuf, reason: String },
}

impl DappGetError {
    /// Re-labels a sanitizer failure with the package version it came from.
    pub fn for_package(self, name: &str, version: &str) -> Self {
        match self {
            DappGetError::Validation { subject, reason } => DappGetError::Validation {
                subject: format!("{}@{} ({})", name, version, subject),
                reason,
            },
            other => other,
        }
    }
}

fn join_constraints(constraints: &[ConflictingConstraint]) -> String {
    if constraints.is_empty() {
        return "no published version".to_string();
    }

    constraints
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsatisfiable_lists_every_constraint() {
        let err = DappGetError::Unsatisfiable {
            name: "c.dnp.dappnode.eth".to_string(),
            constraints: vec![
                ConflictingConstraint {
                    spec: "^1.0.0".to_string(),
                    origin: ConstraintOrigin::Package {
                        name: "a.dnp.dappnode.eth".to_string(),
                        version: "1.0.0".to_string(),
                    },
                },
                ConflictingConstraint {
                    spec: "^2.0.0".to_string(),
                    origin: ConstraintOrigin::Request,
                },
            ],
        };

        assert_eq!(
            err.to_string(),
            "Could not find a version of c.dnp.dappnode.eth compatible with: \
             ^1.0.0 (from a.dnp.dappnode.eth@1.0.0), ^2.0.0 (from request)"
        );
    }

    #[test]
    fn validation_errors_gain_package_context() {
        let err = DappGetError::Validation {
            subject: "dependencies".to_string(),
            reason: "expected an object".to_string(),
        }
        .for_package("a", "0.1.0");

        assert_eq!(
            err.to_string(),
            "Invalid manifest data for a@0.1.0 (dependencies): expected an object"
        );
    }
}
