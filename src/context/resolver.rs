//! Template variable resolution for `${...}` syntax
//!
//! Supports:
//! - `${name}` - lookup in the merged parameter mapping (dotted names may
//!   walk into nested values)
//! - `${name:default}` - literal fallback when the name is undefined
//! - `${env.a.b.c}` - dot-path lookup into the environment configuration
//! - built-ins: `${timestamp}`, `${date}`, `${datetime}`, `${uuid}`,
//!   `${random_int}`, `${random_string}`
//!
//! Resolution is a single pass: substituted values are never re-scanned.

use chrono::{DateTime, Local};
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use super::environment::EnvironmentConfig;
use crate::definition::ParamMap;

static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\$\{([^{}]*)\}").unwrap());

const RANDOM_STRING_LEN: usize = 8;
const RANDOM_INT_MAX: i64 = 999_999;

/// Errors that can occur during variable resolution
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ResolveError {
    #[error("Unresolved variable: {0}")]
    Unresolved(String),

    #[error("Empty variable token in: {0}")]
    EmptyToken(String),
}

/// What to do with a token that has no value and no default
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    /// Report [`ResolveError::Unresolved`]
    #[default]
    Error,
    /// Leave the raw `${...}` token in the output
    Preserve,
}

/// Names visible to one resolution: parameters plus the environment
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    params: &'a ParamMap,
    environment: Option<&'a EnvironmentConfig>,
}

impl<'a> Scope<'a> {
    pub fn new(params: &'a ParamMap) -> Self {
        Self {
            params,
            environment: None,
        }
    }

    pub fn with_environment(mut self, environment: &'a EnvironmentConfig) -> Self {
        self.environment = Some(environment);
        self
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<Value> {
        if let Some(value) = lookup_path(self.params, name) {
            return Some(value.clone());
        }
        let env = self.environment?;
        let path = name.strip_prefix("env.")?;
        env.lookup(path).cloned()
    }
}

/// Look up `name` as a flat key, then as a dot-path into nested values
pub fn lookup_path<'v>(params: &'v ParamMap, name: &str) -> Option<&'v Value> {
    if let Some(value) = params.get(name) {
        return Some(value);
    }
    let (head, rest) = name.split_once('.')?;
    let mut current = params.get(head)?;
    for segment in rest.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// One consistent "now" shared by every built-in of a resolution pass
struct Builtins {
    now: DateTime<Local>,
}

impl Builtins {
    fn capture() -> Self {
        Self { now: Local::now() }
    }

    fn get(&self, name: &str) -> Option<Value> {
        match name {
            "timestamp" => Some(Value::from(self.now.timestamp())),
            "date" => Some(Value::String(self.now.format("%Y-%m-%d").to_string())),
            "datetime" => Some(Value::String(
                self.now.format("%Y-%m-%d %H:%M:%S").to_string(),
            )),
            "uuid" => Some(Value::String(uuid::Uuid::new_v4().to_string())),
            "random_int" => Some(Value::from(
                rand::thread_rng().gen_range(0..=RANDOM_INT_MAX),
            )),
            "random_string" => Some(Value::String(
                rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(RANDOM_STRING_LEN)
                    .map(char::from)
                    .collect(),
            )),
            _ => None,
        }
    }
}

/// Interpolates `${...}` tokens in strings, mappings and sequences
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableResolver {
    policy: UnresolvedPolicy,
}

impl VariableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: UnresolvedPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> UnresolvedPolicy {
        self.policy
    }

    /// Resolve a template against a flat parameter mapping
    pub fn resolve(&self, template: &Value, params: &ParamMap) -> Result<Value, ResolveError> {
        self.resolve_in(template, &Scope::new(params))
    }

    /// Resolve a template against a full scope (parameters and environment)
    pub fn resolve_in(&self, template: &Value, scope: &Scope<'_>) -> Result<Value, ResolveError> {
        let builtins = Builtins::capture();
        self.resolve_value(template, scope, &builtins)
    }

    /// Resolve every value of a mapping; keys are left as-is
    pub fn resolve_map(&self, values: &ParamMap, scope: &Scope<'_>) -> Result<ParamMap, ResolveError> {
        let builtins = Builtins::capture();
        values
            .iter()
            .map(|(k, v)| Ok::<_, ResolveError>((k.clone(), self.resolve_value(v, scope, &builtins)?)))
            .collect()
    }

    /// Whether a string still contains a `${...}` token
    pub fn has_tokens(input: &str) -> bool {
        TOKEN_REGEX.is_match(input)
    }

    fn resolve_value(
        &self,
        template: &Value,
        scope: &Scope<'_>,
        builtins: &Builtins,
    ) -> Result<Value, ResolveError> {
        match template {
            Value::String(s) => self.resolve_str(s, scope, builtins),
            Value::Array(items) => items
                .iter()
                .map(|v| self.resolve_value(v, scope, builtins))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    resolved.insert(k.clone(), self.resolve_value(v, scope, builtins)?);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    fn resolve_str(
        &self,
        template: &str,
        scope: &Scope<'_>,
        builtins: &Builtins,
    ) -> Result<Value, ResolveError> {
        // A lone token keeps the referenced value's type
        if let Some(m) = TOKEN_REGEX.find(template) {
            if m.start() == 0 && m.end() == template.len() {
                return Ok(self
                    .resolve_token(m.as_str(), scope, builtins)?
                    .unwrap_or_else(|| Value::String(template.to_string())));
            }
        }

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for m in TOKEN_REGEX.find_iter(template) {
            out.push_str(&template[last..m.start()]);
            match self.resolve_token(m.as_str(), scope, builtins)? {
                Some(value) => out.push_str(&value_to_string(&value)),
                None => out.push_str(m.as_str()),
            }
            last = m.end();
        }
        out.push_str(&template[last..]);
        Ok(Value::String(out))
    }

    /// `Ok(None)` means the token is kept verbatim (preserve policy)
    fn resolve_token(
        &self,
        token: &str,
        scope: &Scope<'_>,
        builtins: &Builtins,
    ) -> Result<Option<Value>, ResolveError> {
        let inner = token[2..token.len() - 1].trim();
        let (name, default) = match inner.split_once(':') {
            Some((name, default)) => (name.trim(), Some(default.trim())),
            None => (inner, None),
        };

        if name.is_empty() {
            return match self.policy {
                UnresolvedPolicy::Error => Err(ResolveError::EmptyToken(token.to_string())),
                UnresolvedPolicy::Preserve => Ok(None),
            };
        }

        if let Some(value) = scope.lookup(name).or_else(|| builtins.get(name)) {
            return Ok(Some(value));
        }
        if let Some(default) = default {
            return Ok(Some(Value::String(default.to_string())));
        }

        match self.policy {
            UnresolvedPolicy::Error => Err(ResolveError::Unresolved(name.to_string())),
            UnresolvedPolicy::Preserve => {
                debug!(variable = name, "Leaving unresolved variable in place");
                Ok(None)
            }
        }
    }
}

/// Render a value for embedding inside a larger string
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
