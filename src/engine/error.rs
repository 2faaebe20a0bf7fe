//! Engine error types
//!
//! [`EngineError`] is fatal for a run: it covers structural defects found
//! before any script executes. [`StepError`] never escapes a run; it becomes
//! the `error` of a failed step result.

use crate::bridge::BridgeError;
use crate::context::condition::ConditionError;
use crate::context::environment::EnvironmentError;
use crate::context::resolver::ResolveError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Test case not found: {0}")]
    TestCaseNotFound(String),

    #[error("Script not found: {id} (referenced by {referenced_by})")]
    ScriptNotFound { id: String, referenced_by: String },

    #[error("Component not found: {id} (referenced by {referenced_by})")]
    ComponentNotFound { id: String, referenced_by: String },

    #[error("Cyclic component nesting: {}", .0.join(" -> "))]
    CyclicComponent(Vec<String>),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),
}

/// Step-level failures, reported as failed results
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolveError),

    #[error("Missing required parameter '{parameter}' for script {script}")]
    MissingParameter { script: String, parameter: String },

    #[error("Invalid execution condition: {0}")]
    Condition(#[from] ConditionError),

    #[error("Execution error: {0}")]
    Execution(String),
}

impl From<BridgeError> for StepError {
    fn from(err: BridgeError) -> Self {
        StepError::Execution(err.to_string())
    }
}
