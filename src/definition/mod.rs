//! Definition tree types
//!
//! This module contains the read-only input of the engine:
//! - `script` - Script definitions with parameters, outputs and retry policy
//! - `component` - Script groups, possibly nested, with an execution mode
//! - `test_case` - Top-level execution units referencing scripts and components
//! - `repository` - Repository trait and the in-memory definition arena
//! - `loader` - Load definitions from YAML files and directories

use serde_json::Value;
use std::collections::HashMap;

pub mod component;
pub mod loader;
pub mod repository;
pub mod script;
pub mod test_case;

/// A flat name → value mapping used for every parameter tier
pub type ParamMap = HashMap<String, Value>;

pub use component::{
    Component, ComponentScriptStep, ComponentStep, ExecutionMode, NestedComponentStep,
};
pub use loader::{DefinitionLoader, LoadError};
pub use repository::{DefinitionRepository, DefinitionSet, DuplicateDefinition};
pub use script::{Script, ScriptParameter};
pub use test_case::{TestCase, TestCaseComponentRef, TestCaseScriptRef, TestCaseStep};
