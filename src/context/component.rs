//! Component execution context
//!
//! The component's `shared_variables` form the component tier; caller
//! overrides are laid over them. Each completed step's outputs are merged
//! back, so later steps of the same component see earlier results.

use std::sync::Arc;
use tracing::debug;

use super::base::ExecutionContext;
use super::environment::EnvironmentConfig;
use super::layers::{ParamLayers, Tier};
use super::resolver::VariableResolver;
use super::{prepare_step, PreparedStep, StepCall};
use crate::definition::{
    Component, ComponentScriptStep, ComponentStep, DefinitionRepository, NestedComponentStep,
    ParamMap,
};
use crate::engine::result::{ExecutionHistory, ExecutionResult, StepKind};
use crate::engine::ExecutionEngine;

#[derive(Debug, Clone)]
pub struct ComponentExecutionContext {
    base: ExecutionContext,
    component_id: String,
    declared_outputs: Vec<String>,
    /// Outputs of every successful step, in completion order
    outputs: ParamMap,
    history: ExecutionHistory,
}

impl ComponentExecutionContext {
    pub fn new(
        component: &Component,
        inherited: ParamLayers,
        environment: Arc<EnvironmentConfig>,
        resolver: VariableResolver,
        history: ExecutionHistory,
    ) -> Self {
        let layers = inherited.with_tier(Tier::ComponentShared, component.shared_variables.clone());
        Self {
            base: ExecutionContext::from_layers(layers, environment).with_resolver(resolver),
            component_id: component.id.clone(),
            declared_outputs: component.output_variables.clone(),
            outputs: ParamMap::new(),
            history,
        }
    }

    /// Context for running a component on its own, with `params` as runtime parameters
    pub fn standalone(
        component: &Component,
        environment: Arc<EnvironmentConfig>,
        resolver: VariableResolver,
        params: ParamMap,
        history: ExecutionHistory,
    ) -> Self {
        let inherited = ExecutionContext::new(environment.clone()).snapshot();
        let mut context = Self::new(component, inherited, environment, resolver, history);
        context.base.overlay_tier(Tier::Runtime, params);
        context
    }

    /// Apply already-resolved overrides from the call site
    pub fn with_overrides(mut self, values: ParamMap) -> Self {
        self.base.override_call(values);
        self
    }

    pub fn component_id(&self) -> &str {
        &self.component_id
    }

    pub fn base(&self) -> &ExecutionContext {
        &self.base
    }

    /// Everything visible to the component's steps right now
    pub fn shared_variables(&self) -> &ParamMap {
        self.base.params()
    }

    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    /// Prepare one step against the current shared variables
    pub fn prepare<'d>(
        &self,
        repo: &'d dyn DefinitionRepository,
        step: ComponentStep<'_>,
    ) -> PreparedStep<'d> {
        let kind = match step {
            ComponentStep::Script(_) => StepKind::Script,
            ComponentStep::Component(_) => StepKind::Component,
        };
        let call = StepCall {
            kind,
            target_id: step.target_id(),
            overrides: step.overrides(),
            condition: step.condition(),
            is_enabled: step.is_enabled(),
        };
        prepare_step(&self.base, repo, call, &self.history)
    }

    /// Prepare, run and merge back one step
    pub async fn execute_step(
        &mut self,
        engine: &ExecutionEngine,
        step: ComponentStep<'_>,
    ) -> ExecutionResult {
        let prepared = self.prepare(engine.definitions(), step);
        let result = engine.run_prepared(prepared, &self.history).await;
        if result.success {
            self.merge_outputs(&result.output_variables);
        }
        result
    }

    pub async fn execute_script(
        &mut self,
        engine: &ExecutionEngine,
        step: &ComponentScriptStep,
    ) -> ExecutionResult {
        self.execute_step(engine, ComponentStep::Script(step)).await
    }

    pub async fn execute_component(
        &mut self,
        engine: &ExecutionEngine,
        step: &NestedComponentStep,
    ) -> ExecutionResult {
        self.execute_step(engine, ComponentStep::Component(step)).await
    }

    /// The only mutation path once the component is running
    pub fn merge_outputs(&mut self, outputs: &ParamMap) {
        if outputs.is_empty() {
            return;
        }
        debug!(
            component = %self.component_id,
            keys = ?outputs.keys().collect::<Vec<_>>(),
            "Merging step outputs"
        );
        self.outputs
            .extend(outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.base.update_params(outputs);
    }

    /// Outputs propagated to the caller, filtered by the component's
    /// `output_variables` when it declares any
    pub fn output_variables(&self) -> ParamMap {
        if self.declared_outputs.is_empty() {
            return self.outputs.clone();
        }
        self.declared_outputs
            .iter()
            .filter_map(|name| {
                self.base
                    .get(name)
                    .map(|value| (name.clone(), value.clone()))
            })
            .collect()
    }
}
