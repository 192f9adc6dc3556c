use crate::version::{PackageName, VersionId, VersionSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Request {
    pub name: PackageName,
    #[serde(rename = "ver", default = "VersionSpec::any")]
    pub version: VersionSpec,
}

impl Request {
    pub fn new(name: &str, version: &str) -> Self {
        Request {
            name: name.trim().to_string(),
            version: VersionSpec::from_raw(version),
        }
    }

    /// Parses `name` or `name@version`.
    pub fn parse(spec: &str) -> Self {
        match spec.split_once('@') {
            Some((name, version)) => Request::new(name, version),
            None => Request::new(spec, "*"),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// One concrete version per package, consistent with every constraint.
pub type Resolution = BTreeMap<PackageName, VersionId>;

/// The part of a [`Resolution`] that differs from what is installed.
pub type StateDiff = BTreeMap<PackageName, VersionId>;
