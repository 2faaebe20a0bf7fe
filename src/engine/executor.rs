//! Execution Engine - Walks the definition tree and runs it
//!
//! This is the orchestrator that:
//! 1. Validates the component graph of a test case before anything runs
//! 2. Loads the environment and builds the test-case context
//! 3. Runs top-level steps in `execution_order`
//! 4. Dispatches component steps sequentially, conditionally or in parallel groups
//! 5. Applies timeouts and retries to scripts, components and test cases
//! 6. Hands resolved scripts to the script body executor

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::bridge::{BodyOutcome, ScriptBodyExecutor, ScriptInvocation};
use crate::context::environment::{EnvironmentConfig, EnvironmentError, EnvironmentProvider};
use crate::context::resolver::VariableResolver;
use crate::context::{
    ComponentExecutionContext, PreparedStep, ScriptExecutionContext, TestCaseExecutionContext,
};
use crate::definition::{
    Component, ComponentStep, DefinitionRepository, ExecutionMode, ParamMap, Script, TestCase,
    TestCaseStep,
};
use crate::engine::config::EngineSettings;
use crate::engine::error::{EngineError, StepError};
use crate::engine::graph::ComponentGraph;
use crate::engine::result::{
    ExecutionHistory, ExecutionReport, ExecutionResult, ExecutionSummary, HistoryEntry,
    PendingExecution, StepKind,
};

/// Outcome of one script-body attempt
enum Attempt {
    Passed(BodyOutcome),
    Failed { output: Value, error: String },
    TimedOut(String),
}

/// Failures collected while running a list of steps
#[derive(Debug, Default)]
struct StepFailures {
    count: usize,
    first: Option<String>,
}

impl StepFailures {
    fn record(&mut self, kind: StepKind, id: &str, result: &ExecutionResult) {
        self.count += 1;
        if self.first.is_none() {
            let reason = result.error.as_deref().unwrap_or("failed");
            self.first = Some(format!("{} '{}': {}", kind, id, reason));
        }
    }

    fn message(&self) -> String {
        format!(
            "{} step(s) failed; first: {}",
            self.count,
            self.first.as_deref().unwrap_or("unknown")
        )
    }
}

/// The test-case orchestrator
///
/// Stateless between runs: every run builds its own contexts, so one engine
/// may execute several test cases concurrently.
pub struct ExecutionEngine {
    definitions: Arc<dyn DefinitionRepository>,
    environments: Arc<dyn EnvironmentProvider>,
    body: Arc<dyn ScriptBodyExecutor>,
    settings: EngineSettings,
    parallel_limit: Arc<Semaphore>,
}

impl ExecutionEngine {
    pub fn new(
        definitions: Arc<dyn DefinitionRepository>,
        environments: Arc<dyn EnvironmentProvider>,
        body: Arc<dyn ScriptBodyExecutor>,
    ) -> Self {
        Self::with_settings(definitions, environments, body, EngineSettings::default())
    }

    pub fn with_settings(
        definitions: Arc<dyn DefinitionRepository>,
        environments: Arc<dyn EnvironmentProvider>,
        body: Arc<dyn ScriptBodyExecutor>,
        settings: EngineSettings,
    ) -> Self {
        let parallel_limit = Arc::new(Semaphore::new(settings.max_parallel.max(1)));
        Self {
            definitions,
            environments,
            body,
            settings,
            parallel_limit,
        }
    }

    pub fn definitions(&self) -> &dyn DefinitionRepository {
        self.definitions.as_ref()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn resolver(&self) -> VariableResolver {
        VariableResolver::with_policy(self.settings.unresolved)
    }

    /// Load a named environment, or the configured default
    ///
    /// A missing default environment is not an error; the run proceeds with
    /// an empty one. A missing explicitly named environment is fatal.
    pub fn load_environment(&self, name: Option<&str>) -> Result<Arc<EnvironmentConfig>, EngineError> {
        let (name, explicit) = match name {
            Some(name) => (name, true),
            None => (self.settings.default_environment.as_str(), false),
        };
        match EnvironmentConfig::load(name, self.environments.as_ref()) {
            Ok(env) => Ok(Arc::new(env)),
            Err(EnvironmentError::NotFound(_)) if !explicit => {
                warn!("Default environment '{}' not found, using an empty one", name);
                Ok(Arc::new(EnvironmentConfig::empty()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Run a test case in its own (or the default) environment
    pub async fn execute_test_case(
        &self,
        test_case_id: &str,
        runtime_params: ParamMap,
    ) -> Result<ExecutionReport, EngineError> {
        self.execute_test_case_with_environment(test_case_id, None, runtime_params)
            .await
    }

    /// Run a test case; step failures are reported, only structural defects are errors
    #[instrument(skip(self, runtime_params))]
    pub async fn execute_test_case_with_environment(
        &self,
        test_case_id: &str,
        environment: Option<&str>,
        runtime_params: ParamMap,
    ) -> Result<ExecutionReport, EngineError> {
        let test_case = self
            .definitions
            .test_case(test_case_id)
            .ok_or_else(|| EngineError::TestCaseNotFound(test_case_id.to_string()))?;

        ComponentGraph::new(self.definitions()).check_test_case(test_case)?;

        let env_name = environment.or(test_case.environment.as_deref());
        let environment = self.load_environment(env_name)?;

        info!(
            "Starting test case: {} (environment: {})",
            test_case.display_name(),
            environment.name()
        );
        Ok(self
            .run_test_case(test_case, environment, runtime_params)
            .await)
    }

    async fn run_test_case(
        &self,
        test_case: &TestCase,
        environment: Arc<EnvironmentConfig>,
        runtime_params: ParamMap,
    ) -> ExecutionReport {
        let max_attempts = test_case.retry_count + 1;
        let mut attempt = 1;
        loop {
            let (result, context) = self
                .run_test_case_once(test_case, environment.clone(), runtime_params.clone())
                .await;

            if !result.is_failure() || attempt >= max_attempts {
                let summary = context.summary();
                info!("Test case {} finished: {} ({})", test_case.id, result.status, summary);
                return ExecutionReport {
                    id: test_case.id.clone(),
                    name: test_case.display_name().to_string(),
                    environment: environment.name().to_string(),
                    result: result.with_attempts(attempt),
                    history: context.history(),
                    summary,
                };
            }

            warn!(
                "Test case {} {} (attempt {}/{}), retrying in {:?}",
                test_case.id,
                result.status,
                attempt,
                max_attempts,
                test_case.retry_delay()
            );
            tokio::time::sleep(test_case.retry_delay()).await;
            attempt += 1;
        }
    }

    async fn run_test_case_once(
        &self,
        test_case: &TestCase,
        environment: Arc<EnvironmentConfig>,
        runtime_params: ParamMap,
    ) -> (ExecutionResult, TestCaseExecutionContext) {
        let mut context =
            TestCaseExecutionContext::new(test_case, environment, runtime_params, self.resolver());
        let running = PendingExecution::new().start();

        let steps = self.run_test_case_steps(test_case, &mut context);
        let failures = match test_case.timeout_duration() {
            Some(limit) => tokio::time::timeout(limit, steps).await.ok(),
            None => Some(steps.await),
        };

        let result = match failures {
            None => {
                warn!("Test case {} timed out", test_case.id);
                let message = format!(
                    "test case timed out after {:?}",
                    test_case.timeout_duration().unwrap_or_default()
                );
                context.record_interrupted(&message);
                running.time_out(message)
            }
            Some(failures) if failures.count == 0 => {
                let summary = serde_json::to_value(context.summary()).unwrap_or_default();
                running.succeed(summary, context.outputs().clone())
            }
            Some(failures) => running.fail(failures.message()),
        };
        (result, context)
    }

    async fn run_test_case_steps(
        &self,
        test_case: &TestCase,
        context: &mut TestCaseExecutionContext,
    ) -> StepFailures {
        let mut failures = StepFailures::default();
        for step in test_case.ordered_steps() {
            let result = context.execute_step(self, step).await;
            if result.is_failure() {
                let kind = match step {
                    TestCaseStep::Script(_) => StepKind::Script,
                    TestCaseStep::Component(_) => StepKind::Component,
                };
                failures.record(kind, step.target_id(), &result);
                if !test_case.continue_on_failure {
                    warn!("Halting test case {} after failed step", test_case.id);
                    break;
                }
            }
        }
        failures
    }

    /// Run a prepared step and append it to `history`
    pub async fn run_prepared(
        &self,
        prepared: PreparedStep<'_>,
        history: &ExecutionHistory,
    ) -> ExecutionResult {
        let (kind, id, name, result) = match prepared {
            PreparedStep::Skip {
                kind,
                id,
                name,
                reason,
            } => {
                info!("Skipping {} '{}': {}", kind, name, reason);
                (kind, id, name, PendingExecution::new().skip(reason))
            }
            PreparedStep::Reject {
                kind,
                id,
                name,
                error,
            } => {
                error!("{} '{}' failed before execution: {}", kind, name, error);
                (
                    kind,
                    id,
                    name,
                    PendingExecution::new().start().fail(error.to_string()),
                )
            }
            PreparedStep::Script { script, context } => {
                let result = self.execute_script(script, context).await;
                (
                    StepKind::Script,
                    script.id.clone(),
                    script.display_name().to_string(),
                    result,
                )
            }
            PreparedStep::Component { component, context } => {
                let result = self.execute_component(component, context).await;
                (
                    StepKind::Component,
                    component.id.clone(),
                    component.display_name().to_string(),
                    result,
                )
            }
        };

        history.record(HistoryEntry {
            kind,
            id,
            name,
            result: result.clone(),
        });
        result
    }

    /// Run one script with its timeout and retry policy
    ///
    /// Resolution and validation errors fail the script immediately; body
    /// failures and timeouts are retried up to `retry_count` times. The
    /// duration covers every attempt and the delays between them.
    #[instrument(skip(self, script, context), fields(script = %script.id))]
    pub async fn execute_script(
        &self,
        script: &Script,
        mut context: ScriptExecutionContext,
    ) -> ExecutionResult {
        let running = PendingExecution::new().start();
        let timeout = script
            .timeout_duration()
            .or(self.settings.default_script_timeout);
        let max_attempts = script.retry_count + 1;
        let mut last = Attempt::Failed {
            output: Value::Null,
            error: "script was not attempted".to_string(),
        };

        info!("Running script: {}", script.display_name());

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                warn!(
                    "Retrying script {} (attempt {}/{}) after {:?}",
                    script.id,
                    attempt,
                    max_attempts,
                    script.retry_delay()
                );
                tokio::time::sleep(script.retry_delay()).await;
            }

            let invocation = match context.prepare_invocation(script, attempt) {
                Ok(invocation) => invocation,
                Err(err) => {
                    error!("Script {} failed: {}", script.id, err);
                    return running.fail(err.to_string()).with_attempts(attempt);
                }
            };

            match self.invoke_body(&invocation, timeout).await {
                Attempt::Passed(outcome) => {
                    context.merge_outputs(&outcome.output_variables);
                    info!("Script {} succeeded (attempt {})", script.id, attempt);
                    return running
                        .succeed(outcome.output, context.output_variables())
                        .with_attempts(attempt);
                }
                other => last = other,
            }
        }

        let result = match last {
            Attempt::TimedOut(message) => {
                warn!("Script {} timed out: {}", script.id, message);
                running.time_out(message)
            }
            Attempt::Failed { output, error } => {
                error!("Script {} failed: {}", script.id, error);
                running.fail_with_output(output, error)
            }
            Attempt::Passed(outcome) => running.succeed(outcome.output, context.output_variables()),
        };
        result.with_attempts(max_attempts)
    }

    async fn invoke_body(&self, invocation: &ScriptInvocation, timeout: Option<Duration>) -> Attempt {
        // The semaphore is never closed; a failed acquire only drops the bound
        let _permit = self.parallel_limit.acquire().await.ok();

        let call = self.body.execute(invocation);
        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    return Attempt::TimedOut(format!(
                        "attempt {} timed out after {:?}",
                        invocation.attempt, limit
                    ))
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(outcome) if outcome.success => Attempt::Passed(outcome),
            Ok(outcome) => {
                let error = outcome
                    .error
                    .unwrap_or_else(|| "script body reported failure".to_string());
                debug!("Attempt {} failed: {}", invocation.attempt, error);
                Attempt::Failed {
                    output: outcome.output,
                    error,
                }
            }
            Err(err) => Attempt::Failed {
                output: Value::Null,
                error: StepError::from(err).to_string(),
            },
        }
    }

    /// Run one component with its timeout
    ///
    /// Nested steps record their own history entries as they finish, so a
    /// component timeout keeps everything recorded up to that point.
    pub fn execute_component<'a>(
        &'a self,
        component: &'a Component,
        mut context: ComponentExecutionContext,
    ) -> BoxFuture<'a, ExecutionResult> {
        let span = info_span!("component", component = %component.id);
        async move {
            let running = PendingExecution::new().start();
            info!(
                "Running component: {} (mode: {:?})",
                component.display_name(),
                component.execution_mode
            );

            let steps = self.run_component_steps(component, &mut context);
            let failures = match component.timeout_duration() {
                Some(limit) => match tokio::time::timeout(limit, steps).await {
                    Ok(failures) => failures,
                    Err(_) => {
                        warn!("Component {} timed out after {:?}", component.id, limit);
                        return running.time_out(format!("component timed out after {:?}", limit));
                    }
                },
                None => steps.await,
            };

            if failures.count == 0 {
                running.succeed(Value::Null, context.output_variables())
            } else {
                error!("Component {} failed: {}", component.id, failures.message());
                running.fail(failures.message())
            }
        }
        .instrument(span)
        .boxed()
    }

    async fn run_component_steps(
        &self,
        component: &Component,
        context: &mut ComponentExecutionContext,
    ) -> StepFailures {
        match component.execution_mode {
            ExecutionMode::Sequential | ExecutionMode::Conditional => {
                self.run_sequential(component, context).await
            }
            ExecutionMode::Parallel => self.run_parallel(component, context).await,
        }
    }

    async fn run_sequential(
        &self,
        component: &Component,
        context: &mut ComponentExecutionContext,
    ) -> StepFailures {
        let mut failures = StepFailures::default();
        for step in component.ordered_steps() {
            let result = context.execute_step(self, step).await;
            if result.is_failure() {
                failures.record(step_kind(&step), step.target_id(), &result);
                if !component.continue_on_failure {
                    warn!("Halting component {} after failed step", component.id);
                    break;
                }
            }
        }
        failures
    }

    /// Run each `execution_order` group concurrently
    ///
    /// Every step of a group is prepared against the same snapshot, and
    /// outputs are merged back only once the whole group has finished.
    async fn run_parallel(
        &self,
        component: &Component,
        context: &mut ComponentExecutionContext,
    ) -> StepFailures {
        let mut failures = StepFailures::default();
        let history = context.history().clone();

        for group in component.order_groups() {
            let prepared: Vec<PreparedStep<'_>> = group
                .iter()
                .map(|step| context.prepare(self.definitions(), *step))
                .collect();

            debug!(
                "Dispatching {} step(s) of component {} concurrently",
                prepared.len(),
                component.id
            );
            let results = join_all(
                prepared
                    .into_iter()
                    .map(|step| self.run_prepared(step, &history)),
            )
            .await;

            let mut group_failed = false;
            for (step, result) in group.iter().zip(&results) {
                if result.is_failure() {
                    group_failed = true;
                    failures.record(step_kind(step), step.target_id(), result);
                } else if result.success {
                    context.merge_outputs(&result.output_variables);
                }
            }

            if group_failed && !component.continue_on_failure {
                warn!("Halting component {} after failed group", component.id);
                break;
            }
        }
        failures
    }

    /// Run one script on its own, outside any test case
    pub async fn run_script(
        &self,
        script_id: &str,
        environment: Option<&str>,
        params: ParamMap,
    ) -> Result<ExecutionReport, EngineError> {
        let script = self
            .definitions
            .script(script_id)
            .ok_or_else(|| EngineError::ScriptNotFound {
                id: script_id.to_string(),
                referenced_by: "<standalone>".to_string(),
            })?;
        let environment = self.load_environment(environment)?;
        let history = ExecutionHistory::new();

        let context =
            ScriptExecutionContext::standalone(script, environment.clone(), self.resolver(), params);
        let prepared = PreparedStep::Script { script, context };
        let result = self.run_prepared(prepared, &history).await;

        Ok(standalone_report(
            &script.id,
            script.display_name(),
            &environment,
            result,
            history,
        ))
    }

    /// Run one component on its own, outside any test case
    pub async fn run_component(
        &self,
        component_id: &str,
        environment: Option<&str>,
        params: ParamMap,
    ) -> Result<ExecutionReport, EngineError> {
        ComponentGraph::new(self.definitions()).check_component(component_id, "<standalone>")?;
        let component = self
            .definitions
            .component(component_id)
            .ok_or_else(|| EngineError::ComponentNotFound {
                id: component_id.to_string(),
                referenced_by: "<standalone>".to_string(),
            })?;
        let environment = self.load_environment(environment)?;
        let history = ExecutionHistory::new();

        let context = ComponentExecutionContext::standalone(
            component,
            environment.clone(),
            self.resolver(),
            params,
            history.clone(),
        );
        let prepared = PreparedStep::Component { component, context };
        let result = self.run_prepared(prepared, &history).await;

        Ok(standalone_report(
            &component.id,
            component.display_name(),
            &environment,
            result,
            history,
        ))
    }
}

fn step_kind(step: &ComponentStep<'_>) -> StepKind {
    match step {
        ComponentStep::Script(_) => StepKind::Script,
        ComponentStep::Component(_) => StepKind::Component,
    }
}

fn standalone_report(
    id: &str,
    name: &str,
    environment: &EnvironmentConfig,
    result: ExecutionResult,
    history: ExecutionHistory,
) -> ExecutionReport {
    let history = history.entries();
    let summary = ExecutionSummary::from_entries(&history, result.duration);
    ExecutionReport {
        id: id.to_string(),
        name: name.to_string(),
        environment: environment.name().to_string(),
        result,
        history,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BridgeError;
    use crate::context::environment::StaticEnvironmentProvider;
    use crate::definition::{ComponentScriptStep, DefinitionSet};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then succeeds echoing the request
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ScriptBodyExecutor for Flaky {
        async fn execute(&self, invocation: &ScriptInvocation) -> Result<BodyOutcome, BridgeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Ok(BodyOutcome::failure(format!("failure {}", n + 1)))
            } else {
                Ok(BodyOutcome::success(invocation.request.clone())
                    .with_output_variable("echo", invocation.request.clone()))
            }
        }
    }

    fn engine(set: DefinitionSet, failures: u32) -> (ExecutionEngine, Arc<Flaky>) {
        let body = Arc::new(Flaky {
            failures,
            calls: AtomicU32::new(0),
        });
        let engine = ExecutionEngine::new(
            Arc::new(set),
            Arc::new(StaticEnvironmentProvider::new()),
            body.clone(),
        );
        (engine, body)
    }

    fn script(id: &str, retry_count: u32) -> Script {
        let mut s = Script::new(id);
        s.request = json!("${greeting:hi}");
        s.retry_count = retry_count;
        s.retry_interval = 0.0;
        s
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let set = DefinitionSet::new().with_script(script("s", 2));
        let (engine, body) = engine(set, 2);

        let report = engine.run_script("s", None, ParamMap::new()).await.unwrap();
        assert!(report.result.success);
        assert_eq!(report.result.attempts, 3);
        assert_eq!(body.calls.load(Ordering::SeqCst), 3);
        assert_eq!(report.result.output_variables.get("echo"), Some(&json!("hi")));
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_last_error() {
        let set = DefinitionSet::new().with_script(script("s", 1));
        let (engine, _) = engine(set, 5);

        let report = engine.run_script("s", None, ParamMap::new()).await.unwrap();
        assert!(!report.result.success);
        assert_eq!(report.result.error.as_deref(), Some("failure 2"));
        assert_eq!(report.history.len(), 1);
    }

    #[tokio::test]
    async fn test_resolution_error_is_not_retried() {
        let mut s = script("s", 3);
        s.request = json!("${missing}");
        let (engine, body) = engine(DefinitionSet::new().with_script(s), 0);

        let report = engine.run_script("s", None, ParamMap::new()).await.unwrap();
        assert!(!report.result.success);
        assert_eq!(body.calls.load(Ordering::SeqCst), 0);
        assert!(report.result.error.unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn test_explicit_environment_must_exist() {
        let (engine, _) = engine(DefinitionSet::new().with_script(script("s", 0)), 0);
        assert!(matches!(
            engine.run_script("s", Some("prod"), ParamMap::new()).await,
            Err(EngineError::Environment(_))
        ));
        // The default environment may be absent
        assert!(engine.run_script("s", None, ParamMap::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_component_outputs_flow_between_steps() {
        let mut first = Script::new("first");
        first.request = json!("token-1");
        let mut second = Script::new("second");
        second.request = json!("uses ${echo}");

        let mut component = Component::new("flow");
        for (order, id) in [(1, "first"), (2, "second")] {
            component.scripts.push(ComponentScriptStep {
                script_id: id.into(),
                execution_order: order,
                script_parameters: ParamMap::new(),
                execution_condition: None,
                is_enabled: true,
            });
        }
        let set = DefinitionSet::new()
            .with_script(first)
            .with_script(second)
            .with_component(component);
        let (engine, _) = engine(set, 0);

        let report = engine
            .run_component("flow", None, ParamMap::new())
            .await
            .unwrap();
        assert!(report.result.success);
        // Nested entries first, then the component
        let ids: Vec<_> = report.history.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "flow"]);
        assert_eq!(report.history[1].result.output, json!("uses token-1"));
    }
}
