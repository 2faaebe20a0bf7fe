//! Environment configuration
//!
//! Environments are nested mappings (e.g. `api: { base_url: ... }`) loaded
//! through an [`EnvironmentProvider`]. The core never mutates them; a loaded
//! environment is flattened to dot-path keys (`api.base_url`) for the
//! lowest parameter tier and kept nested for `${env.a.b}` lookups.

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::definition::ParamMap;

#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("Environment not found: {0}")]
    NotFound(String),

    #[error("IO error reading environment {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML parse error in environment {name}: {error}")]
    Yaml {
        name: String,
        error: serde_yaml::Error,
    },

    #[error("Environment {0} must be a mapping")]
    NotAMapping(String),
}

/// Source of named environment configurations
pub trait EnvironmentProvider: Send + Sync {
    /// Load the nested configuration of an environment
    fn load(&self, name: &str) -> Result<Value, EnvironmentError>;
}

/// Environments held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironmentProvider {
    environments: HashMap<String, Value>,
}

impl StaticEnvironmentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_environment(mut self, name: impl Into<String>, config: Value) -> Self {
        self.environments.insert(name.into(), config);
        self
    }
}

impl EnvironmentProvider for StaticEnvironmentProvider {
    fn load(&self, name: &str) -> Result<Value, EnvironmentError> {
        self.environments
            .get(name)
            .cloned()
            .ok_or_else(|| EnvironmentError::NotFound(name.to_string()))
    }
}

/// Environments stored as `<dir>/<name>.yaml` (or `.yml`)
#[derive(Debug, Clone)]
pub struct YamlEnvironmentProvider {
    dir: PathBuf,
}

impl YamlEnvironmentProvider {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, name: &str) -> Option<PathBuf> {
        ["yaml", "yml"]
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", name, ext)))
            .find(|p| p.is_file())
    }
}

impl EnvironmentProvider for YamlEnvironmentProvider {
    fn load(&self, name: &str) -> Result<Value, EnvironmentError> {
        // Names are file stems, never paths
        if name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(EnvironmentError::NotFound(name.to_string()));
        }
        let path = self
            .path_for(name)
            .ok_or_else(|| EnvironmentError::NotFound(name.to_string()))?;
        let content = std::fs::read_to_string(&path).map_err(|source| EnvironmentError::Io {
            name: name.to_string(),
            source,
        })?;
        if content.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_yaml::from_str(&content).map_err(|error| EnvironmentError::Yaml {
            name: name.to_string(),
            error,
        })
    }
}

/// A loaded, read-only environment configuration
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    name: String,
    tree: Value,
    flat: ParamMap,
}

impl EnvironmentConfig {
    pub fn new(name: impl Into<String>, tree: Value) -> Result<Self, EnvironmentError> {
        let name = name.into();
        let tree = match tree {
            Value::Null => Value::Object(Default::default()),
            Value::Object(_) => tree,
            _ => return Err(EnvironmentError::NotAMapping(name)),
        };
        let flat = flatten(&tree);
        Ok(Self { name, tree, flat })
    }

    /// An environment with no values
    pub fn empty() -> Self {
        Self {
            name: String::new(),
            tree: Value::Object(Default::default()),
            flat: ParamMap::new(),
        }
    }

    pub fn load(name: &str, provider: &dyn EnvironmentProvider) -> Result<Self, EnvironmentError> {
        Self::new(name, provider.load(name)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Nested form as loaded
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// Leaf values keyed by dot-path
    pub fn flat(&self) -> &ParamMap {
        &self.flat
    }

    /// Dot-path lookup; intermediate paths return the nested mapping
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.flat.get(path) {
            return Some(value);
        }
        let mut current = &self.tree;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

/// Flatten nested mappings into dot-path keys; sequences are leaves
pub fn flatten(value: &Value) -> ParamMap {
    fn walk(prefix: &str, value: &Value, out: &mut ParamMap) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    walk(&path, child, out);
                }
            }
            _ if prefix.is_empty() => {}
            other => {
                out.insert(prefix.to_string(), other.clone());
            }
        }
    }

    let mut out = ParamMap::new();
    walk("", value, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_flatten_nested() {
        let flat = flatten(&json!({
            "api": { "base_url": "http://x", "auth": { "user": "u" } },
            "timeout": 60,
            "hosts": ["a", "b"]
        }));
        assert_eq!(flat.get("api.base_url"), Some(&json!("http://x")));
        assert_eq!(flat.get("api.auth.user"), Some(&json!("u")));
        assert_eq!(flat.get("timeout"), Some(&json!(60)));
        assert_eq!(flat.get("hosts"), Some(&json!(["a", "b"])));
        assert!(!flat.contains_key("api"));
    }

    #[test]
    fn test_lookup_leaf_and_branch() {
        let env = EnvironmentConfig::new("dev", json!({ "api": { "base_url": "http://x" } })).unwrap();
        assert_eq!(env.lookup("api.base_url"), Some(&json!("http://x")));
        assert_eq!(env.lookup("api"), Some(&json!({ "base_url": "http://x" })));
        assert_eq!(env.lookup("api.missing"), None);
    }

    #[test]
    fn test_non_mapping_rejected() {
        let err = EnvironmentConfig::new("bad", json!([1, 2])).unwrap_err();
        assert!(matches!(err, EnvironmentError::NotAMapping(_)));
    }

    #[test]
    fn test_static_provider() {
        let provider = StaticEnvironmentProvider::new().with_environment("qa", json!({ "a": 1 }));
        let env = EnvironmentConfig::load("qa", &provider).unwrap();
        assert_eq!(env.name(), "qa");
        assert!(matches!(
            provider.load("prod"),
            Err(EnvironmentError::NotFound(_))
        ));
    }

    #[test]
    fn test_yaml_provider() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("staging.yml"),
            "api:\n  base_url: https://staging.example.com\n",
        )
        .unwrap();

        let provider = YamlEnvironmentProvider::new(dir.path());
        let env = EnvironmentConfig::load("staging", &provider).unwrap();
        assert_eq!(
            env.flat().get("api.base_url"),
            Some(&json!("https://staging.example.com"))
        );
        assert!(matches!(
            provider.load("../staging"),
            Err(EnvironmentError::NotFound(_))
        ));
    }
}
