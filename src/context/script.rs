//! Script execution context
//!
//! Built from the caller's snapshot plus the script's own tiers: parameter
//! defaults, then script variables. Caller overrides land in the caller's
//! tier and therefore win over both.

use std::sync::Arc;
use tracing::debug;

use super::base::ExecutionContext;
use super::environment::EnvironmentConfig;
use super::layers::{ParamLayers, Tier};
use super::resolver::{ResolveError, Scope, VariableResolver};
use crate::bridge::ScriptInvocation;
use crate::definition::{ParamMap, Script};
use crate::engine::error::StepError;

#[derive(Debug, Clone)]
pub struct ScriptExecutionContext {
    base: ExecutionContext,
    script_id: String,
    declared_outputs: Vec<String>,
    body_outputs: ParamMap,
}

impl ScriptExecutionContext {
    pub fn new(
        script: &Script,
        inherited: ParamLayers,
        environment: Arc<EnvironmentConfig>,
        resolver: VariableResolver,
    ) -> Self {
        let layers = inherited
            .with_tier(Tier::ScriptDefaults, script.parameter_defaults())
            .with_tier(Tier::ScriptVariables, script.variables.clone());

        Self {
            base: ExecutionContext::from_layers(layers, environment).with_resolver(resolver),
            script_id: script.id.clone(),
            declared_outputs: script.output_variables.clone(),
            body_outputs: ParamMap::new(),
        }
    }

    /// Context for running a script on its own, with `params` as runtime parameters
    pub fn standalone(
        script: &Script,
        environment: Arc<EnvironmentConfig>,
        resolver: VariableResolver,
        params: ParamMap,
    ) -> Self {
        let inherited = ExecutionContext::new(environment.clone()).snapshot();
        let mut context = Self::new(script, inherited, environment, resolver);
        context.base.overlay_tier(Tier::Runtime, params);
        context
    }

    /// Apply already-resolved overrides from the call site
    pub fn with_overrides(mut self, values: ParamMap) -> Self {
        self.base.override_call(values);
        self
    }

    pub fn script_id(&self) -> &str {
        &self.script_id
    }

    pub fn base(&self) -> &ExecutionContext {
        &self.base
    }

    /// Final parameter values: every merged value interpolated in one pass
    pub fn resolve_parameters(&self) -> Result<ParamMap, ResolveError> {
        self.base.resolve_map(self.base.params())
    }

    /// Validate and resolve everything the body executor needs
    ///
    /// Required parameters are checked before any interpolation, so a missing
    /// parameter is reported as such rather than as an unresolved token.
    pub fn prepare_invocation(
        &self,
        script: &Script,
        attempt: u32,
    ) -> Result<ScriptInvocation, StepError> {
        for name in script.required_parameters() {
            let present = self.base.get(name).is_some_and(|v| !v.is_null());
            if !present {
                return Err(StepError::MissingParameter {
                    script: script.id.clone(),
                    parameter: name.to_string(),
                });
            }
        }

        let params = self.resolve_parameters()?;
        let scope = Scope::new(&params).with_environment(self.base.environment());
        let request = self.base.resolver().resolve_in(&script.request, &scope)?;

        debug!(
            script = %script.id,
            attempt,
            params = ?params.keys().collect::<Vec<_>>(),
            "Resolved script parameters"
        );

        Ok(ScriptInvocation {
            script_id: script.id.clone(),
            script_name: script.display_name().to_string(),
            attempt,
            request,
            params,
        })
    }

    /// Record outputs reported by the script body
    pub fn merge_outputs(&mut self, outputs: &ParamMap) {
        self.body_outputs
            .extend(outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.base.update_params(outputs);
    }

    /// Values propagated to the caller
    ///
    /// The declared `output_variables` looked up in the final mapping, or
    /// every body output when the script declares none.
    pub fn output_variables(&self) -> ParamMap {
        if self.declared_outputs.is_empty() {
            return self.body_outputs.clone();
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::ScriptParameter;
    use serde_json::json;

    fn map(value: serde_json::Value) -> ParamMap {
        serde_json::from_value(value).unwrap()
    }

    fn script() -> Script {
        let mut script = Script::new("create-user");
        script.parameters = vec![
            ScriptParameter {
                name: "role".into(),
                default: Some(json!("viewer")),
                required: false,
                description: None,
            },
            ScriptParameter {
                name: "name".into(),
                default: None,
                required: true,
                description: None,
            },
        ];
        script.variables = map(json!({ "role": "editor", "path": "/users" }));
        script.request = json!({
            "method": "POST",
            "url": "${env.api.base_url}${path}",
            "body": { "name": "${name}", "role": "${role}" }
        });
        script
    }

    fn environment() -> Arc<EnvironmentConfig> {
        Arc::new(
            EnvironmentConfig::new("dev", json!({ "api": { "base_url": "http://api" } })).unwrap(),
        )
    }

    #[test]
    fn test_defaults_then_variables_then_overrides() {
        let script = script();
        let ctx = ScriptExecutionContext::standalone(
            &script,
            environment(),
            VariableResolver::new(),
            map(json!({ "name": "alice" })),
        );
        assert_eq!(ctx.base().get("role"), Some(&json!("editor")));

        // Call-site overrides outrank runtime parameters too
        let ctx = ctx.with_overrides(map(json!({ "role": "admin", "name": "bob" })));
        assert_eq!(ctx.base().get("role"), Some(&json!("admin")));
        assert_eq!(ctx.base().get("name"), Some(&json!("bob")));
    }

    #[test]
    fn test_prepare_invocation_resolves_request() {
        let script = script();
        let ctx = ScriptExecutionContext::standalone(
            &script,
            environment(),
            VariableResolver::new(),
            map(json!({ "name": "alice" })),
        );
        let invocation = ctx.prepare_invocation(&script, 1).unwrap();
        assert_eq!(invocation.attempt, 1);
        assert_eq!(invocation.request["url"], json!("http://api/users"));
        assert_eq!(
            invocation.request["body"],
            json!({ "name": "alice", "role": "editor" })
        );
    }

    #[test]
    fn test_missing_required_parameter() {
        let script = script();
        let ctx = ScriptExecutionContext::standalone(
            &script,
            environment(),
            VariableResolver::new(),
            ParamMap::new(),
        );
        match ctx.prepare_invocation(&script, 1) {
            Err(StepError::MissingParameter { parameter, .. }) => assert_eq!(parameter, "name"),
            other => panic!("expected missing parameter, got {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_token_is_step_error() {
        let mut script = script();
        script.request = json!({ "url": "/users/${user_id}" });
        let ctx = ScriptExecutionContext::standalone(
            &script,
            environment(),
            VariableResolver::new(),
            map(json!({ "name": "alice" })),
        );
        assert!(matches!(
            ctx.prepare_invocation(&script, 1),
            Err(StepError::Resolution(ResolveError::Unresolved(name))) if name == "user_id"
        ));
    }

    #[test]
    fn test_parameters_reference_other_tiers() {
        let mut script = Script::new("s");
        script.variables = map(json!({ "greeting": "hello ${name}" }));
        let ctx = ScriptExecutionContext::standalone(
            &script,
            environment(),
            VariableResolver::new(),
            map(json!({ "name": "bob" })),
        );
        let params = ctx.resolve_parameters().unwrap();
        assert_eq!(params.get("greeting"), Some(&json!("hello bob")));
    }

    #[test]
    fn test_output_variables_declared_subset() {
        let mut script = script();
        script.output_variables = vec!["user_id".into(), "absent".into()];
        let mut ctx = ScriptExecutionContext::standalone(
            &script,
            environment(),
            VariableResolver::new(),
            ParamMap::new(),
        );
        ctx.merge_outputs(&map(json!({ "user_id": 9, "internal": "x" })));

        let outputs = ctx.output_variables();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs.get("user_id"), Some(&json!(9)));
    }

    #[test]
    fn test_output_variables_default_to_body_outputs() {
        let script = Script::new("s");
        let mut ctx = ScriptExecutionContext::standalone(
            &script,
            environment(),
            VariableResolver::new(),
            map(json!({ "unrelated": 1 })),
        );
        ctx.merge_outputs(&map(json!({ "token": "abc" })));

        assert_eq!(ctx.output_variables(), map(json!({ "token": "abc" })));
    }
}
