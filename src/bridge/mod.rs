//! Script body execution
//!
//! The engine never runs a script itself. Once a script's parameters and
//! request are resolved it hands a [`ScriptInvocation`] to a
//! [`ScriptBodyExecutor`] and receives a [`BodyOutcome`]:
//! - `http`: executes the resolved request over HTTP with reqwest

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

pub mod http;

pub use http::{HttpConfig, HttpRequest, HttpScriptExecutor};

use crate::definition::ParamMap;

/// Common error type for script body executors
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// A fully resolved script, ready to execute
#[derive(Debug, Clone)]
pub struct ScriptInvocation {
    pub script_id: String,
    pub script_name: String,
    /// 1-based attempt number
    pub attempt: u32,
    /// The script's request template after interpolation
    pub request: Value,
    /// Final merged and resolved parameters
    pub params: ParamMap,
}

/// What a script body reports back
#[derive(Debug, Clone, Default)]
pub struct BodyOutcome {
    pub success: bool,
    pub output: Value,
    pub error: Option<String>,
    pub duration: Duration,
    pub output_variables: ParamMap,
}

impl BodyOutcome {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = output;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_output_variables(mut self, output_variables: ParamMap) -> Self {
        self.output_variables = output_variables;
        self
    }

    pub fn with_output_variable(mut self, name: impl Into<String>, value: Value) -> Self {
        self.output_variables.insert(name.into(), value);
        self
    }
}

/// Executes one attempt of a script body
///
/// Implementations may be slow or fail; timeouts and retries are applied by
/// the engine around each call.
#[async_trait]
pub trait ScriptBodyExecutor: Send + Sync {
    async fn execute(&self, invocation: &ScriptInvocation) -> Result<BodyOutcome, BridgeError>;
}
