//! Boundary checks for manifest data fetched from the network. Nothing read
//! from a manifest reaches the aggregator without passing through here.

use crate::catalog::DependencyMap;
use crate::version::{VersionId, VersionSpec};
use crate::{DappGetError, Result};
use serde_json::Value;

pub fn sanitize_dependencies(raw: &Value) -> Result<DependencyMap> {
    let object = match raw {
        Value::Object(object) => object,
        Value::Null => return Err(invalid("dependencies", "missing dependency map")),
        other => {
            return Err(invalid(
                "dependencies",
                &format!("expected an object, got {}", kind(other)),
            ));
        }
    };

    let mut dependencies = DependencyMap::new();

    for (name, value) in object {
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid("dependencies", "empty dependency name"));
        }

        let Value::String(raw_spec) = value else {
            return Err(invalid(
                "dependencies",
                &format!("version of {} must be a string, got {}", name, kind(value)),
            ));
        };

        dependencies.insert(name.to_string(), VersionSpec::from_raw(raw_spec));
    }

    Ok(dependencies)
}

pub fn sanitize_versions(raw: &Value) -> Result<Vec<VersionId>> {
    let list = match raw {
        Value::Array(list) => list,
        Value::Null => return Err(invalid("versions", "missing version list")),
        other => {
            return Err(invalid(
                "versions",
                &format!("expected a list, got {}", kind(other)),
            ));
        }
    };

    let mut versions: Vec<VersionId> = Vec::with_capacity(list.len());

    for value in list {
        let Value::String(version) = value else {
            return Err(invalid(
                "versions",
                &format!("version must be a string, got {}", kind(value)),
            ));
        };

        let version = version.trim();
        if version.is_empty() {
            return Err(invalid("versions", "empty version"));
        }

        if !versions.iter().any(|v| v == version) {
            versions.push(version.to_string());
        }
    }

    Ok(versions)
}

fn invalid(subject: &str, reason: &str) -> DappGetError {
    DappGetError::Validation {
        subject: subject.to_string(),
        reason: reason.to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
