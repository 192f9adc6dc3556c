use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One package in a registry document:
/// `{ "versions": { "<version>": { "dependencies": { .. } } } }`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RegistryPackage {
    #[serde(default)]
    pub versions: BTreeMap<String, RegistryVersion>,
}

/// Manifest fields stay raw here; they are sanitized when fetched.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RegistryVersion {
    #[serde(default = "empty_dependencies")]
    pub dependencies: Value,
}

impl Default for RegistryVersion {
    fn default() -> Self {
        RegistryVersion {
            dependencies: empty_dependencies(),
        }
    }
}

fn empty_dependencies() -> Value {
    Value::Object(Default::default())
}
