//! Engine configuration
//!
//! Loaded from an optional `orchestrator.yaml`:
//!
//! ```yaml
//! definitions: ./definitions
//! environments: ./environments
//! default_environment: staging
//! strict_variables: true
//! default_script_timeout: 30
//! max_parallel: 8
//!
//! http:
//!   base_url: https://staging.example.com
//!   timeout_ms: 10000
//!   headers:
//!     X-Test-Run: "true"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::HttpConfig;
use crate::context::resolver::UnresolvedPolicy;
use crate::definition::LoadError;

fn default_definitions() -> PathBuf {
    PathBuf::from("definitions")
}

fn default_environments() -> PathBuf {
    PathBuf::from("environments")
}

fn default_environment_name() -> String {
    "default".to_string()
}

fn default_strict() -> bool {
    true
}

fn default_max_parallel() -> usize {
    8
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_definitions")]
    pub definitions: PathBuf,

    #[serde(default = "default_environments")]
    pub environments: PathBuf,

    /// Used when neither the caller nor the test case names an environment
    #[serde(default = "default_environment_name")]
    pub default_environment: String,

    /// Unresolved `${...}` tokens fail the step (false leaves them in place)
    #[serde(default = "default_strict")]
    pub strict_variables: bool,

    /// Per-attempt timeout in seconds for scripts without their own
    #[serde(default)]
    pub default_script_timeout: Option<f64>,

    /// Upper bound on concurrently executing script bodies
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    #[serde(default)]
    pub http: HttpConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            definitions: default_definitions(),
            environments: default_environments(),
            default_environment: default_environment_name(),
            strict_variables: default_strict(),
            default_script_timeout: None,
            max_parallel: default_max_parallel(),
            http: HttpConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: EngineConfig = serde_yaml::from_str(&content).map_err(|e| LoadError::Yaml {
            file: path.display().to_string(),
            error: e,
        })?;
        Ok(config)
    }

    /// The subset of the configuration the engine itself uses
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            unresolved: if self.strict_variables {
                UnresolvedPolicy::Error
            } else {
                UnresolvedPolicy::Preserve
            },
            default_script_timeout: self
                .default_script_timeout
                .and_then(crate::definition::script::seconds),
            default_environment: self.default_environment.clone(),
            max_parallel: self.max_parallel.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub unresolved: UnresolvedPolicy,
    pub default_script_timeout: Option<Duration>,
    pub default_environment: String,
    pub max_parallel: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineConfig::default().settings()
    }
}
