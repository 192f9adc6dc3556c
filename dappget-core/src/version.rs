use crate::{DappGetError, Result};
use dappget_semver::{RangeSet, Version};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type PackageName = String;

/// A concrete release: either a semver string or an IPFS content path.
/// Two ids are equal iff their raw strings are equal.
pub type VersionId = String;

pub const IPFS_PREFIX: &str = "/ipfs/";

/// Stand-ins used by [`should_update`] for versions that are not semver.
const UNPARSEABLE_CURRENT: Version = Version::new(999, 9, 9);
const UNPARSEABLE_NEXT: Version = Version::new(9999, 9, 9);

/// The constraint one package places on another.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VersionSpec {
    Range(String),
    IpfsPin(String),
}

impl VersionSpec {
    pub fn any() -> Self {
        VersionSpec::Range("*".to_string())
    }

    /// Normalizes a raw manifest value. Anything mentioning `latest` (or
    /// empty) means "any version".
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();

        if trimmed.is_empty() || trimmed.contains("latest") {
            return VersionSpec::any();
        }

        if is_ipfs_pin(trimmed) {
            VersionSpec::IpfsPin(trimmed.to_string())
        } else {
            VersionSpec::Range(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            VersionSpec::Range(range) => range,
            VersionSpec::IpfsPin(pin) => pin,
        }
    }

    pub fn compile(&self) -> SpecMatcher {
        match self {
            VersionSpec::Range(range) => SpecMatcher::Range(RangeSet::parse(range).ok()),
            VersionSpec::IpfsPin(pin) => SpecMatcher::Pin(strip_ipfs_prefix(pin).to_string()),
        }
    }

    /// Fails when the range cannot be parsed at all.
    pub fn validate(&self, name: &str) -> Result<()> {
        if let VersionSpec::Range(range) = self {
            RangeSet::parse(range).map_err(|err| DappGetError::Semver {
                value: format!("{}@{}", name, range),
                reason: err.to_string(),
            })?;
        }
        Ok(())
    }
}

impl From<String> for VersionSpec {
    fn from(raw: String) -> Self {
        VersionSpec::from_raw(&raw)
    }
}

impl From<&str> for VersionSpec {
    fn from(raw: &str) -> Self {
        VersionSpec::from_raw(raw)
    }
}

impl From<VersionSpec> for String {
    fn from(spec: VersionSpec) -> Self {
        match spec {
            VersionSpec::Range(range) => range,
            VersionSpec::IpfsPin(pin) => pin,
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`VersionSpec`] with its range parsed once, for repeated matching.
#[derive(Clone, Debug)]
pub enum SpecMatcher {
    /// `None` when the range failed to parse; such a range matches nothing.
    Range(Option<RangeSet>),
    Pin(String),
}

impl SpecMatcher {
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            SpecMatcher::Pin(hash) => {
                parse_semver(candidate).is_none() && strip_ipfs_prefix(candidate) == hash
            }
            SpecMatcher::Range(range) => {
                if is_ipfs_pin(candidate) {
                    return false;
                }
                match (range, parse_semver(candidate)) {
                    (Some(range), Some(version)) => range.matches(&version),
                    _ => false,
                }
            }
        }
    }
}

pub fn is_ipfs_pin(version: &str) -> bool {
    version.starts_with(IPFS_PREFIX)
}

fn strip_ipfs_prefix(version: &str) -> &str {
    version.strip_prefix(IPFS_PREFIX).unwrap_or(version)
}

pub fn parse_semver(version: &str) -> Option<Version> {
    dappget_semver::parse_version(version)
}

pub fn satisfies(constraint: &VersionSpec, candidate: &str) -> bool {
    constraint.compile().matches(candidate)
}

/// Whether moving from `current` to `next` is an upgrade worth applying.
pub fn should_update(current: &str, next: &str) -> bool {
    if current == next {
        return false;
    }

    let current = parse_semver(current).unwrap_or(UNPARSEABLE_CURRENT);
    let next = parse_semver(next).unwrap_or(UNPARSEABLE_NEXT);

    current < next
}
