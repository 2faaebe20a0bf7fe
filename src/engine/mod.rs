//! Execution engine module
//!
//! This module contains:
//! - `executor` - The orchestrator running scripts, components and test cases
//! - `result` - Execution results, status transitions, history and summary
//! - `graph` - Component-graph validation (missing references, cycles)
//! - `error` - Fatal engine errors and step-level errors
//! - `config` - Engine configuration loaded from orchestrator.yaml

pub mod config;
pub mod error;
pub mod executor;
pub mod graph;
pub mod result;

pub use config::{EngineConfig, EngineSettings};
pub use error::{EngineError, StepError};
pub use executor::ExecutionEngine;
pub use graph::{validate_definitions, ComponentGraph};
pub use result::{
    ExecutionHistory, ExecutionReport, ExecutionResult, ExecutionStatus, ExecutionSummary,
    HistoryEntry, PendingExecution, RunningExecution, StepKind,
};
