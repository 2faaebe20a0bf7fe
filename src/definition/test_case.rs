//! Test case definitions

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::component::default_enabled;
use super::script::{default_retry_interval, seconds};
use super::ParamMap;

/// A test case: the top-level execution unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Environment used when the caller does not name one
    #[serde(default)]
    pub environment: Option<String>,

    /// Test-case data tier
    #[serde(default)]
    pub test_data: ParamMap,

    #[serde(default)]
    pub scripts: Vec<TestCaseScriptRef>,

    #[serde(default)]
    pub components: Vec<TestCaseComponentRef>,

    #[serde(default)]
    pub timeout: Option<f64>,

    /// Re-runs of the whole test case after a failed run
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default = "default_retry_interval")]
    pub retry_interval: f64,

    #[serde(default)]
    pub continue_on_failure: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseScriptRef {
    pub script_id: String,

    #[serde(default)]
    pub execution_order: i64,

    #[serde(default)]
    pub parameters: ParamMap,

    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseComponentRef {
    pub component_id: String,

    #[serde(default)]
    pub execution_order: i64,

    #[serde(default)]
    pub parameters: ParamMap,

    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

/// A test-case step: either reference kind, merged into one order
#[derive(Debug, Clone, Copy)]
pub enum TestCaseStep<'a> {
    Script(&'a TestCaseScriptRef),
    Component(&'a TestCaseComponentRef),
}

impl TestCaseStep<'_> {
    pub fn execution_order(&self) -> i64 {
        match self {
            TestCaseStep::Script(s) => s.execution_order,
            TestCaseStep::Component(c) => c.execution_order,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            TestCaseStep::Script(s) => s.is_enabled,
            TestCaseStep::Component(c) => c.is_enabled,
        }
    }

    pub fn target_id(&self) -> &str {
        match self {
            TestCaseStep::Script(s) => &s.script_id,
            TestCaseStep::Component(c) => &c.component_id,
        }
    }

    pub fn overrides(&self) -> &ParamMap {
        match self {
            TestCaseStep::Script(s) => &s.parameters,
            TestCaseStep::Component(c) => &c.parameters,
        }
    }
}

impl TestCase {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            environment: None,
            test_data: ParamMap::new(),
            scripts: Vec::new(),
            components: Vec::new(),
            timeout: None,
            retry_count: 0,
            retry_interval: default_retry_interval(),
            continue_on_failure: false,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.and_then(seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        seconds(self.retry_interval).unwrap_or_default()
    }

    /// Script and component references merged and sorted by `execution_order`
    pub fn ordered_steps(&self) -> Vec<TestCaseStep<'_>> {
        let mut steps: Vec<TestCaseStep<'_>> = self
            .scripts
            .iter()
            .map(TestCaseStep::Script)
            .chain(self.components.iter().map(TestCaseStep::Component))
            .collect();
        steps.sort_by_key(|s| s.execution_order());
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merged_order() {
        let yaml = r#"
id: smoke
test_data:
  timeout: 30
scripts:
  - script_id: health
    execution_order: 3
  - script_id: login
    execution_order: 1
components:
  - component_id: checkout
    execution_order: 2
    parameters:
      currency: USD
"#;
        let tc: TestCase = serde_yaml::from_str(yaml).unwrap();
        let steps = tc.ordered_steps();
        let order: Vec<_> = steps.iter().map(|s| s.target_id()).collect();
        assert_eq!(order, vec!["login", "checkout", "health"]);
        assert!(!tc.continue_on_failure);
        assert_eq!(tc.display_name(), "smoke");
    }

    #[test]
    fn test_disabled_reference() {
        let yaml = r#"
id: tc
scripts:
  - script_id: a
    is_enabled: false
"#;
        let tc: TestCase = serde_yaml::from_str(yaml).unwrap();
        assert!(!tc.ordered_steps()[0].is_enabled());
    }
}
