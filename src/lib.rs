//! # Test-Case Orchestrator
//!
//! A layered test-orchestration engine. Scripts, components (script groups,
//! possibly nested) and test cases are declared in YAML; the engine resolves
//! their parameters across priority tiers, interpolates `${...}` templates and
//! runs the tree with retry, timeout and failure-continuation semantics.
//!
//! ## Features
//!
//! - **Tiered parameters** - Runtime > test-case data > component shared
//!   variables > script variables > script defaults > environment
//! - **Template variables** - `${name}`, `${name:default}`, `${env.a.b}` and
//!   built-ins such as `${uuid}` and `${timestamp}`
//! - **Execution modes** - Sequential, parallel (grouped by `execution_order`)
//!   and conditional components
//! - **Output propagation** - Step outputs become visible to later steps
//! - **Structural validation** - Missing references and component cycles are
//!   rejected before anything runs
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use testcase_orchestrator::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let definitions = DefinitionLoader::load_directory("definitions".as_ref())?;
//!     let engine = ExecutionEngine::new(
//!         Arc::new(definitions),
//!         Arc::new(YamlEnvironmentProvider::new("environments")),
//!         Arc::new(HttpScriptExecutor::new(HttpConfig::default())?),
//!     );
//!
//!     let report = engine.execute_test_case("checkout", ParamMap::new()).await?;
//!     println!("{}: {}", report.name, report.summary);
//!     Ok(())
//! }
//! ```

pub mod bridge;
pub mod context;
pub mod definition;
pub mod engine;

// Re-export main types
pub use bridge::{
    BodyOutcome, BridgeError, HttpConfig, HttpScriptExecutor, ScriptBodyExecutor, ScriptInvocation,
};
pub use context::{
    ComponentExecutionContext, Condition, EnvironmentConfig, EnvironmentError,
    EnvironmentProvider, ExecutionContext, ParamLayers, ResolveError, ScriptExecutionContext,
    StaticEnvironmentProvider, TestCaseExecutionContext, Tier, UnresolvedPolicy,
    VariableResolver, YamlEnvironmentProvider,
};
pub use definition::{
    Component, DefinitionLoader, DefinitionRepository, DefinitionSet, ExecutionMode, LoadError,
    ParamMap, Script, TestCase,
};
pub use engine::{
    validate_definitions, EngineConfig, EngineError, EngineSettings, ExecutionEngine,
    ExecutionReport, ExecutionResult, ExecutionStatus, ExecutionSummary, HistoryEntry, StepError,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{
        BodyOutcome, BridgeError, HttpConfig, HttpScriptExecutor, ScriptBodyExecutor,
        ScriptInvocation,
    };
    pub use crate::context::{
        EnvironmentConfig, EnvironmentProvider, StaticEnvironmentProvider, UnresolvedPolicy,
        VariableResolver, YamlEnvironmentProvider,
    };
    pub use crate::definition::{
        Component, DefinitionLoader, DefinitionRepository, DefinitionSet, ExecutionMode,
        LoadError, ParamMap, Script, TestCase,
    };
    pub use crate::engine::{
        validate_definitions, EngineConfig, EngineError, EngineSettings, ExecutionEngine,
        ExecutionReport, ExecutionResult, ExecutionStatus, ExecutionSummary, HistoryEntry,
        StepKind,
    };
}
