//! Execution contexts
//!
//! This module contains:
//! - `resolver` - `${...}` template interpolation
//! - `condition` - Parsed boolean execution conditions
//! - `environment` - Environment providers and dot-path flattening
//! - `layers` - Parameter priority tiers
//! - `base` - The shared execution context
//! - `script` / `component` / `test_case` - Per-level contexts
//!
//! Parent contexts never hand a live mapping to a child. A step is
//! *prepared* synchronously against the parent's current parameters (the
//! child receives a snapshot), the engine runs it, and the parent merges the
//! step's output variables back afterwards.

use crate::definition::{Component, DefinitionRepository, ParamMap, Script};
use crate::engine::error::StepError;
use crate::engine::result::{ExecutionHistory, StepKind};

pub mod base;
pub mod component;
pub mod condition;
pub mod environment;
pub mod layers;
pub mod resolver;
pub mod script;
pub mod test_case;

pub use base::ExecutionContext;
pub use component::ComponentExecutionContext;
pub use condition::{evaluate_condition, CompareOp, Condition, ConditionError, Operand};
pub use environment::{
    EnvironmentConfig, EnvironmentError, EnvironmentProvider, StaticEnvironmentProvider,
    YamlEnvironmentProvider,
};
pub use layers::{ParamLayers, Source, Tier};
pub use resolver::{ResolveError, Scope, UnresolvedPolicy, VariableResolver};
pub use script::ScriptExecutionContext;
pub use test_case::TestCaseExecutionContext;

/// A step ready for the engine
#[derive(Debug)]
pub enum PreparedStep<'d> {
    /// Disabled, or its condition was false
    Skip {
        kind: StepKind,
        id: String,
        name: String,
        reason: String,
    },
    /// Could not be prepared; reported as a failed step
    Reject {
        kind: StepKind,
        id: String,
        name: String,
        error: StepError,
    },
    Script {
        script: &'d Script,
        context: ScriptExecutionContext,
    },
    Component {
        component: &'d Component,
        context: ComponentExecutionContext,
    },
}

impl PreparedStep<'_> {
    /// Kind, id and display name of the step
    pub fn describe(&self) -> (StepKind, String, String) {
        match self {
            PreparedStep::Skip { kind, id, name, .. }
            | PreparedStep::Reject { kind, id, name, .. } => (*kind, id.clone(), name.clone()),
            PreparedStep::Script { script, .. } => (
                StepKind::Script,
                script.id.clone(),
                script.display_name().to_string(),
            ),
            PreparedStep::Component { component, .. } => (
                StepKind::Component,
                component.id.clone(),
                component.display_name().to_string(),
            ),
        }
    }
}

/// Call-site description of a step, independent of where it is declared
pub(crate) struct StepCall<'a> {
    pub kind: StepKind,
    pub target_id: &'a str,
    pub overrides: &'a ParamMap,
    pub condition: Option<&'a str>,
    pub is_enabled: bool,
}

/// Prepare a step against the parent's current parameters
pub(crate) fn prepare_step<'d>(
    parent: &ExecutionContext,
    repo: &'d dyn DefinitionRepository,
    call: StepCall<'_>,
    history: &ExecutionHistory,
) -> PreparedStep<'d> {
    let kind = call.kind;
    let id = call.target_id.to_string();

    enum Target<'d> {
        Script(&'d Script),
        Component(&'d Component),
    }

    let target = match kind {
        StepKind::Script => repo.script(&id).map(Target::Script),
        StepKind::Component => repo.component(&id).map(Target::Component),
    };
    let Some(target) = target else {
        return PreparedStep::Reject {
            kind,
            name: id.clone(),
            error: StepError::Execution(format!("{} not found: {}", kind, id)),
            id,
        };
    };
    let name = match &target {
        Target::Script(s) => s.display_name().to_string(),
        Target::Component(c) => c.display_name().to_string(),
    };

    if !call.is_enabled {
        return PreparedStep::Skip {
            kind,
            id,
            name,
            reason: "disabled".to_string(),
        };
    }

    if let Some(condition) = call.condition {
        match parent.evaluate_condition(condition) {
            Ok(true) => {}
            Ok(false) => {
                return PreparedStep::Skip {
                    kind,
                    id,
                    name,
                    reason: format!("condition not met: {}", condition),
                }
            }
            Err(err) => {
                return PreparedStep::Reject {
                    kind,
                    id,
                    name,
                    error: err.into(),
                }
            }
        }
    }

    let overrides = match parent.resolve_map(call.overrides) {
        Ok(values) => values,
        Err(err) => {
            return PreparedStep::Reject {
                kind,
                id,
                name,
                error: err.into(),
            }
        }
    };

    let environment = parent.environment().clone();
    match target {
        Target::Script(script) => PreparedStep::Script {
            script,
            context: ScriptExecutionContext::new(
                script,
                parent.snapshot(),
                environment,
                parent.resolver(),
            )
            .with_overrides(overrides),
        },
        Target::Component(component) => PreparedStep::Component {
            component,
            context: ComponentExecutionContext::new(
                component,
                parent.snapshot(),
                environment,
                parent.resolver(),
                history.clone(),
            )
            .with_overrides(overrides),
        },
    }
}
