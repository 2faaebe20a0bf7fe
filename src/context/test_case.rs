//! Test-case execution context
//!
//! Construction order: environment, then `test_data`, then runtime
//! parameters. Owns the execution history of the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::base::ExecutionContext;
use super::environment::EnvironmentConfig;
use super::layers::Tier;
use super::resolver::VariableResolver;
use super::{prepare_step, PreparedStep, StepCall};
use crate::definition::{
    DefinitionRepository, ParamMap, TestCase, TestCaseComponentRef, TestCaseScriptRef,
    TestCaseStep,
};
use crate::engine::result::{
    ExecutionHistory, ExecutionResult, ExecutionSummary, HistoryEntry, RunningExecution, StepKind,
};
use crate::engine::ExecutionEngine;

#[derive(Debug, Clone)]
pub struct TestCaseExecutionContext {
    base: ExecutionContext,
    test_case_id: String,
    history: ExecutionHistory,
    outputs: ParamMap,
    /// Sum of top-level step durations
    elapsed: Duration,
    /// Top-level step currently executing
    in_flight: Option<InFlight>,
}

#[derive(Debug, Clone)]
struct InFlight {
    kind: StepKind,
    id: String,
    name: String,
    started: Instant,
}

impl TestCaseExecutionContext {
    pub fn new(
        test_case: &TestCase,
        environment: Arc<EnvironmentConfig>,
        runtime: ParamMap,
        resolver: VariableResolver,
    ) -> Self {
        let mut base = ExecutionContext::new(environment).with_resolver(resolver);
        base.overlay_tier(Tier::TestCaseData, test_case.test_data.clone());
        base.overlay_tier(Tier::Runtime, runtime);

        Self {
            base,
            test_case_id: test_case.id.clone(),
            history: ExecutionHistory::new(),
            outputs: ParamMap::new(),
            elapsed: Duration::ZERO,
            in_flight: None,
        }
    }

    pub fn test_case_id(&self) -> &str {
        &self.test_case_id
    }

    pub fn base(&self) -> &ExecutionContext {
        &self.base
    }

    pub fn prepare<'d>(
        &self,
        repo: &'d dyn DefinitionRepository,
        step: TestCaseStep<'_>,
    ) -> PreparedStep<'d> {
        let kind = match step {
            TestCaseStep::Script(_) => StepKind::Script,
            TestCaseStep::Component(_) => StepKind::Component,
        };
        let call = StepCall {
            kind,
            target_id: step.target_id(),
            overrides: step.overrides(),
            condition: None,
            is_enabled: step.is_enabled(),
        };
        prepare_step(&self.base, repo, call, &self.history)
    }

    /// Prepare, run and merge back one top-level step
    pub async fn execute_step(
        &mut self,
        engine: &ExecutionEngine,
        step: TestCaseStep<'_>,
    ) -> ExecutionResult {
        let prepared = self.prepare(engine.definitions(), step);
        let (kind, id, name) = prepared.describe();
        self.in_flight = Some(InFlight {
            kind,
            id,
            name,
            started: Instant::now(),
        });
        let result = engine.run_prepared(prepared, &self.history).await;
        self.in_flight = None;
        self.elapsed += result.duration;
        if result.success {
            self.merge_outputs(&result.output_variables);
        }
        result
    }

    pub async fn execute_script(
        &mut self,
        engine: &ExecutionEngine,
        script_ref: &TestCaseScriptRef,
    ) -> ExecutionResult {
        self.execute_step(engine, TestCaseStep::Script(script_ref))
            .await
    }

    pub async fn execute_component(
        &mut self,
        engine: &ExecutionEngine,
        component_ref: &TestCaseComponentRef,
    ) -> ExecutionResult {
        self.execute_step(engine, TestCaseStep::Component(component_ref))
            .await
    }

    pub fn merge_outputs(&mut self, outputs: &ParamMap) {
        self.outputs
            .extend(outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.base.update_params(outputs);
    }

    /// Outputs accumulated over the run
    pub fn outputs(&self) -> &ParamMap {
        &self.outputs
    }

    /// Record the step cut off by the test-case timeout, if any
    pub fn record_interrupted(&mut self, message: &str) {
        let Some(step) = self.in_flight.take() else {
            return;
        };
        let result = RunningExecution::since(step.started).time_out(message);
        self.elapsed += result.duration;
        self.history.record(HistoryEntry {
            kind: step.kind,
            id: step.id,
            name: step.name,
            result,
        });
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.history.entries()
    }

    pub fn summary(&self) -> ExecutionSummary {
        ExecutionSummary::from_entries(&self.history.entries(), self.elapsed)
    }
}
