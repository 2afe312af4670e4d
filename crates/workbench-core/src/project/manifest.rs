//! `package.json` manifest.
//!
//! Only `dependencies` (runtime) and `devDependencies` (development) are
//! interpreted; every other field round-trips untouched and in order.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub const MANIFEST_FILE: &str = "package.json";

const RUNTIME_GROUP: &str = "dependencies";
const DEV_GROUP: &str = "devDependencies";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("malformed manifest JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("manifest root is not a JSON object")]
    NotAnObject,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Manifest {
    doc: Map<String, Value>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self, ManifestError> {
        match serde_json::from_str::<Value>(text)? {
            Value::Object(doc) => Ok(Self { doc }),
            _ => Err(ManifestError::NotAnObject),
        }
    }

    /// Build a manifest holding only the two dependency groups.
    pub fn from_groups(runtime: &[(&str, &str)], dev: &[(&str, &str)]) -> Self {
        let mut manifest = Self::default();
        for (name, version) in runtime {
            manifest.set(RUNTIME_GROUP, name, version);
        }
        for (name, version) in dev {
            manifest.set(DEV_GROUP, name, version);
        }
        manifest
    }

    /// Runtime group. Non-string versions are skipped.
    pub fn dependencies(&self) -> BTreeMap<String, String> {
        self.group(RUNTIME_GROUP)
    }

    /// Development group. Non-string versions are skipped.
    pub fn dev_dependencies(&self) -> BTreeMap<String, String> {
        self.group(DEV_GROUP)
    }

    /// Union of both groups' keys.
    pub fn dependency_set(&self) -> BTreeSet<String> {
        self.group_keys(RUNTIME_GROUP)
            .chain(self.group_keys(DEV_GROUP))
            .collect()
    }

    /// Runtime entries overlaid with dev entries (dev wins on a shared key).
    pub fn merged_dependencies(&self) -> BTreeMap<String, String> {
        let mut merged = self.dependencies();
        merged.extend(self.dev_dependencies());
        merged
    }

    pub fn declares(&self, name: &str) -> bool {
        [RUNTIME_GROUP, DEV_GROUP].iter().any(|group| {
            self.doc
                .get(*group)
                .and_then(Value::as_object)
                .is_some_and(|obj| obj.contains_key(name))
        })
    }

    /// Add `name` to the runtime group. Declared names (either group) are left
    /// alone; returns whether an entry was added.
    pub fn add_runtime_dependency(&mut self, name: &str, version: &str) -> bool {
        if self.declares(name) {
            return false;
        }
        self.set(RUNTIME_GROUP, name, version);
        true
    }

    pub fn to_json_pretty(&self) -> String {
        let mut text = serde_json::to_string_pretty(&self.doc).unwrap_or_else(|_| "{}".to_string());
        text.push('\n');
        text
    }

    fn set(&mut self, group: &str, name: &str, version: &str) {
        let entry = self
            .doc
            .entry(group.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            tracing::warn!(group, "Replacing non-object dependency group");
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(obj) = entry {
            obj.insert(name.to_string(), Value::String(version.to_string()));
        }
    }

    fn group(&self, group: &str) -> BTreeMap<String, String> {
        self.doc
            .get(group)
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn group_keys<'a>(&'a self, group: &str) -> impl Iterator<Item = String> + 'a {
        self.doc
            .get(group)
            .and_then(Value::as_object)
            .into_iter()
            .flat_map(|obj| obj.keys().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_groups() {
        let m = Manifest::parse(
            r#"{
                "name": "app",
                "dependencies": {"react": "^18.2.0", "weird": 3},
                "devDependencies": {"vite": "^5.0.0"}
            }"#,
        )
        .unwrap();
        assert_eq!(m.dependencies().get("react").map(String::as_str), Some("^18.2.0"));
        assert!(!m.dependencies().contains_key("weird"));
        assert_eq!(m.dev_dependencies().len(), 1);
        let set: Vec<_> = m.dependency_set().into_iter().collect();
        assert_eq!(set, vec!["react", "vite", "weird"]);
    }

    #[test]
    fn test_parse_rejects_malformed_and_non_object() {
        assert!(matches!(Manifest::parse("{"), Err(ManifestError::Malformed(_))));
        assert!(matches!(Manifest::parse("[1,2]"), Err(ManifestError::NotAnObject)));
    }

    #[test]
    fn test_merged_dev_wins() {
        let m = Manifest::from_groups(&[("a", "1"), ("b", "1")], &[("b", "2")]);
        let merged = m.merged_dependencies();
        assert_eq!(merged.get("a").map(String::as_str), Some("1"));
        assert_eq!(merged.get("b").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_add_runtime_dependency_never_overwrites() {
        let mut m = Manifest::from_groups(&[("react", "^18")], &[("vitest", "^1")]);
        assert!(!m.add_runtime_dependency("react", "latest"));
        assert!(!m.add_runtime_dependency("vitest", "latest"));
        assert!(m.add_runtime_dependency("zustand", "latest"));
        assert_eq!(m.dependencies().get("react").map(String::as_str), Some("^18"));
        assert_eq!(m.dependencies().get("zustand").map(String::as_str), Some("latest"));
        assert!(!m.dependencies().contains_key("vitest"));
    }

    #[test]
    fn test_round_trip_preserves_field_order() {
        let text = "{\n  \"name\": \"app\",\n  \"version\": \"0.0.0\",\n  \"scripts\": {\n    \"dev\": \"vite\"\n  }\n}\n";
        let m = Manifest::parse(text).unwrap();
        assert_eq!(m.to_json_pretty(), text);
    }

    #[test]
    fn test_add_creates_missing_group() {
        let mut m = Manifest::parse(r#"{"name":"x"}"#).unwrap();
        assert!(m.add_runtime_dependency("lodash", "latest"));
        let reparsed = Manifest::parse(&m.to_json_pretty()).unwrap();
        assert_eq!(reparsed.dependency_set().len(), 1);
    }
}
