//! Base execution context
//!
//! Holds the tiered parameters of one execution, their merged view, the
//! read-only environment and the resolver used to interpolate templates.

use serde_json::Value;
use std::sync::Arc;

use super::condition::{Condition, ConditionError};
use super::environment::{EnvironmentConfig, EnvironmentError, EnvironmentProvider};
use super::layers::{ParamLayers, Tier};
use super::resolver::{ResolveError, Scope, VariableResolver};
use crate::definition::ParamMap;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    layers: ParamLayers,
    /// Merged view of `layers`, rebuilt after every change
    params: ParamMap,
    environment: Arc<EnvironmentConfig>,
    resolver: VariableResolver,
}

impl ExecutionContext {
    /// Context whose lowest tier is the flattened environment
    pub fn new(environment: Arc<EnvironmentConfig>) -> Self {
        let layers = ParamLayers::new().with_tier(Tier::Environment, environment.flat().clone());
        Self::from_layers(layers, environment)
    }

    pub fn load(name: &str, provider: &dyn EnvironmentProvider) -> Result<Self, EnvironmentError> {
        let environment = EnvironmentConfig::load(name, provider)?;
        Ok(Self::new(Arc::new(environment)))
    }

    /// Context over layers copied from a parent
    pub fn from_layers(layers: ParamLayers, environment: Arc<EnvironmentConfig>) -> Self {
        let params = layers.merged();
        Self {
            layers,
            params,
            environment,
            resolver: VariableResolver::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: VariableResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.params.get(key).cloned().unwrap_or(default)
    }

    /// Set a value above every tier
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let mut values = ParamMap::new();
        values.insert(key.into(), value);
        self.update_params(&values);
    }

    /// Last-writer-wins merge above every tier
    pub fn update_params(&mut self, values: &ParamMap) {
        if values.is_empty() {
            return;
        }
        self.layers.merge_outputs(values);
        self.params
            .extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    pub(crate) fn overlay_tier(&mut self, tier: Tier, values: ParamMap) {
        self.layers.overlay(tier, values);
        self.params = self.layers.merged();
    }

    pub(crate) fn override_call(&mut self, values: ParamMap) {
        self.layers.override_call(values);
        self.params = self.layers.merged();
    }

    /// Interpolate a template against the merged parameters and the environment
    pub fn resolve_value(&self, template: &Value) -> Result<Value, ResolveError> {
        let scope = Scope::new(&self.params).with_environment(&self.environment);
        self.resolver.resolve_in(template, &scope)
    }

    pub fn resolve_map(&self, values: &ParamMap) -> Result<ParamMap, ResolveError> {
        let scope = Scope::new(&self.params).with_environment(&self.environment);
        self.resolver.resolve_map(values, &scope)
    }

    /// Evaluate an execution condition with the same names templates see
    pub fn evaluate_condition(&self, condition: &str) -> Result<bool, ConditionError> {
        let scope = Scope::new(&self.params).with_environment(&self.environment);
        Ok(Condition::parse(condition)?.evaluate_in(&scope))
    }

    pub fn params(&self) -> &ParamMap {
        &self.params
    }

    pub fn layers(&self) -> &ParamLayers {
        &self.layers
    }

    /// Read-only copy handed to child contexts
    pub fn snapshot(&self) -> ParamLayers {
        self.layers.clone()
    }

    pub fn environment(&self) -> &Arc<EnvironmentConfig> {
        &self.environment
    }

    pub fn resolver(&self) -> VariableResolver {
        self.resolver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::environment::StaticEnvironmentProvider;
    use serde_json::json;

    fn context() -> ExecutionContext {
        let provider = StaticEnvironmentProvider::new().with_environment(
            "dev",
            json!({ "api": { "base_url": "http://localhost:8080" }, "timeout": 60 }),
        );
        ExecutionContext::load("dev", &provider).unwrap()
    }

    #[test]
    fn test_environment_is_flattened_into_lowest_tier() {
        let ctx = context();
        assert_eq!(ctx.get("api.base_url"), Some(&json!("http://localhost:8080")));
        assert_eq!(ctx.get_or("missing", json!("fallback")), json!("fallback"));
    }

    #[test]
    fn test_set_and_update_params() {
        let mut ctx = context();
        ctx.set("timeout", json!(5));
        assert_eq!(ctx.get("timeout"), Some(&json!(5)));

        let mut values = ParamMap::new();
        values.insert("timeout".into(), json!(7));
        values.insert("user".into(), json!("bob"));
        ctx.update_params(&values);
        assert_eq!(ctx.get("timeout"), Some(&json!(7)));
        assert_eq!(ctx.get("user"), Some(&json!("bob")));
    }

    #[test]
    fn test_resolve_value_uses_params_and_environment() {
        let mut ctx = context();
        ctx.set("path", json!("users"));
        let resolved = ctx
            .resolve_value(&json!("${api.base_url}/${path}?t=${env.timeout}"))
            .unwrap();
        assert_eq!(resolved, json!("http://localhost:8080/users?t=60"));
    }

    #[test]
    fn test_tier_overlay_respects_priority() {
        let mut ctx = context();
        let mut runtime = ParamMap::new();
        runtime.insert("timeout".into(), json!(45));
        ctx.overlay_tier(Tier::Runtime, runtime);

        let mut test_data = ParamMap::new();
        test_data.insert("timeout".into(), json!(30));
        ctx.overlay_tier(Tier::TestCaseData, test_data);

        assert_eq!(ctx.get("timeout"), Some(&json!(45)));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut ctx = context();
        let snapshot = ctx.snapshot();
        ctx.set("late", json!(true));
        assert!(snapshot.merged().get("late").is_none());
    }

    #[test]
    fn test_evaluate_condition() {
        let ctx = context();
        assert!(ctx.evaluate_condition("timeout >= 60").unwrap());
        assert!(ctx.evaluate_condition("timeout ==").is_err());
    }
}
