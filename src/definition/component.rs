//! Component definitions
//!
//! A component groups scripts and nested components that share variables.
//! Steps are ordered by `execution_order`; in parallel mode steps sharing
//! an order value run concurrently.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::script::seconds;
use super::ParamMap;

/// How a component dispatches its steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
    Conditional,
}

/// A component definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub execution_mode: ExecutionMode,

    /// Variables visible to every step of the component
    #[serde(default)]
    pub shared_variables: ParamMap,

    #[serde(default)]
    pub scripts: Vec<ComponentScriptStep>,

    /// Nested component references
    #[serde(default)]
    pub components: Vec<NestedComponentStep>,

    /// Keep running remaining steps after a failed one
    #[serde(default)]
    pub continue_on_failure: bool,

    /// Timeout for the whole component in seconds
    #[serde(default)]
    pub timeout: Option<f64>,

    /// Restrict the outputs propagated to the caller (all outputs when empty)
    #[serde(default)]
    pub output_variables: Vec<String>,
}

/// A script reference inside a component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentScriptStep {
    pub script_id: String,

    #[serde(default)]
    pub execution_order: i64,

    /// Parameter overrides; may reference shared variables with `${...}`
    #[serde(default)]
    pub script_parameters: ParamMap,

    /// Boolean expression over the shared variables
    #[serde(default)]
    pub execution_condition: Option<String>,

    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

/// A nested component reference inside a component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedComponentStep {
    pub component_id: String,

    #[serde(default)]
    pub execution_order: i64,

    #[serde(default)]
    pub parameters: ParamMap,

    #[serde(default)]
    pub execution_condition: Option<String>,

    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

/// One dispatchable step of a component, in execution order
#[derive(Debug, Clone, Copy)]
pub enum ComponentStep<'a> {
    Script(&'a ComponentScriptStep),
    Component(&'a NestedComponentStep),
}

impl ComponentStep<'_> {
    pub fn execution_order(&self) -> i64 {
        match self {
            ComponentStep::Script(s) => s.execution_order,
            ComponentStep::Component(c) => c.execution_order,
        }
    }

    pub fn condition(&self) -> Option<&str> {
        match self {
            ComponentStep::Script(s) => s.execution_condition.as_deref(),
            ComponentStep::Component(c) => c.execution_condition.as_deref(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            ComponentStep::Script(s) => s.is_enabled,
            ComponentStep::Component(c) => c.is_enabled,
        }
    }

    /// Id of the referenced script or component
    pub fn target_id(&self) -> &str {
        match self {
            ComponentStep::Script(s) => &s.script_id,
            ComponentStep::Component(c) => &c.component_id,
        }
    }

    pub fn overrides(&self) -> &ParamMap {
        match self {
            ComponentStep::Script(s) => &s.script_parameters,
            ComponentStep::Component(c) => &c.parameters,
        }
    }
}

pub(crate) fn default_enabled() -> bool {
    true
}

impl Component {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            description: None,
            execution_mode: ExecutionMode::Sequential,
            shared_variables: ParamMap::new(),
            scripts: Vec::new(),
            components: Vec::new(),
            continue_on_failure: false,
            timeout: None,
            output_variables: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn timeout_duration(&self) -> Option<Duration> {
        self.timeout.and_then(seconds)
    }

    /// All steps sorted by `execution_order`
    ///
    /// The sort is stable, so steps sharing an order keep definition order
    /// with scripts ahead of nested components.
    pub fn ordered_steps(&self) -> Vec<ComponentStep<'_>> {
        let mut steps: Vec<ComponentStep<'_>> = self
            .scripts
            .iter()
            .map(ComponentStep::Script)
            .chain(self.components.iter().map(ComponentStep::Component))
            .collect();
        steps.sort_by_key(|s| s.execution_order());
        steps
    }

    /// Steps grouped by equal `execution_order`, ascending
    pub fn order_groups(&self) -> Vec<Vec<ComponentStep<'_>>> {
        let mut groups: Vec<Vec<ComponentStep<'_>>> = Vec::new();
        for step in self.ordered_steps() {
            match groups.last_mut() {
                Some(group)
                    if group
                        .first()
                        .is_some_and(|s| s.execution_order() == step.execution_order()) =>
                {
                    group.push(step)
                }
                _ => groups.push(vec![step]),
            }
        }
        groups
    }

    /// Ids of directly nested components
    pub fn nested_component_ids(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.component_id.as_str())
    }
}
