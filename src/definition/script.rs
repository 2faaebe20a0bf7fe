//! Script definitions
//!
//! A script is the smallest executable unit: one request handed to the
//! script body executor, with its own parameter defaults, variables,
//! declared outputs and retry/timeout policy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use super::ParamMap;

/// A single script definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    /// Unique id used by components and test cases to reference this script
    pub id: String,

    /// Human-readable name (defaults to the id)
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Declared parameters with optional defaults
    #[serde(default)]
    pub parameters: Vec<ScriptParameter>,

    /// Script-level variables (override parameter defaults)
    #[serde(default)]
    pub variables: ParamMap,

    /// Names of variables propagated to the caller after a successful run
    #[serde(default)]
    pub output_variables: Vec<String>,

    /// Request template handed to the body executor once resolved
    #[serde(default)]
    pub request: Value,

    /// Timeout per attempt in seconds
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Additional attempts after a failed one
    #[serde(default)]
    pub retry_count: u32,

    /// Delay between attempts in seconds
    #[serde(default = "default_retry_interval")]
    pub retry_interval: f64,
}

/// A declared script parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptParameter {
    pub name: String,

    #[serde(default)]
    pub default: Option<Value>,

    /// Must be present after all tiers are merged
    #[serde(default)]
    pub required: bool,

    #[serde(default)]
    pub description: Option<String>,
}

pub(crate) fn default_retry_interval() -> f64 {
    1.0
}

impl Script {
    /// Create a script with no parameters and an empty request
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            parameters: Vec::new(),
            variables: ParamMap::new(),
            output_variables: Vec::new(),
            request: Value::Null,
            timeout: None,
            retry_count: 0,
            retry_interval: default_retry_interval(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Parameter defaults as a mapping (parameters without a default are omitted)
    pub fn parameter_defaults(&self) -> ParamMap {
        self.parameters
            .iter()
            .filter_map(|p| p.default.clone().map(|d| (p.name.clone(), d)))
            .collect()
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.and_then(seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        seconds(self.retry_interval).unwrap_or_default()
    }
}

/// Convert a seconds value from a definition into a duration
///
/// Negative, non-finite and out-of-range values are treated as absent.
pub(crate) fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_deserialize() {
        let yaml = r#"
id: login
name: Login
parameters:
  - name: username
    required: true
  - name: role
    default: tester
variables:
  path: /api/login
output_variables: [token]
request:
  method: POST
  url: "${env.api.base_url}${path}"
retry_count: 2
retry_interval: 0.5
"#;

        let script: Script = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(script.display_name(), "Login");
        assert_eq!(script.parameters.len(), 2);
        assert_eq!(script.output_variables, vec!["token"]);
        assert_eq!(script.retry_count, 2);
        assert_eq!(script.retry_delay(), Duration::from_millis(500));
        assert_eq!(
            script.required_parameters().collect::<Vec<_>>(),
            vec!["username"]
        );
    }

    #[test]
    fn test_parameter_defaults_skip_missing() {
        let yaml = r#"
id: s
parameters:
  - name: a
    default: 1
  - name: b
"#;
        let script: Script = serde_yaml::from_str(yaml).unwrap();
        let defaults = script.parameter_defaults();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults.get("a"), Some(&Value::from(1)));
    }

    #[test]
    fn test_defaults_when_omitted() {
        let script: Script = serde_yaml::from_str("id: bare").unwrap();
        assert_eq!(script.display_name(), "bare");
        assert_eq!(script.retry_count, 0);
        assert_eq!(script.retry_delay(), Duration::from_secs(1));
        assert!(script.timeout_duration().is_none());
    }

    #[test]
    fn test_negative_seconds_ignored() {
        assert_eq!(seconds(-1.0), None);
        assert_eq!(seconds(f64::NAN), None);
        assert_eq!(seconds(2.0), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_overflowing_seconds_ignored() {
        assert_eq!(seconds(1.0e30), None);
        assert_eq!(seconds(f64::INFINITY), None);

        let mut script = Script::new("s");
        script.timeout = Some(1.0e30);
        script.retry_interval = f64::MAX;
        assert_eq!(script.timeout_duration(), None);
        assert_eq!(script.retry_delay(), Duration::ZERO);
    }
}
