//! Definition repository
//!
//! The engine reads definitions through [`DefinitionRepository`]. The
//! in-memory [`DefinitionSet`] stores each kind in an arena keyed by id, so
//! nesting edges are plain ids rather than object references.

use std::collections::BTreeMap;

use super::{Component, Script, TestCase};

/// Read-only source of script, component and test-case definitions
pub trait DefinitionRepository: Send + Sync {
    fn script(&self, id: &str) -> Option<&Script>;

    fn component(&self, id: &str) -> Option<&Component>;

    fn test_case(&self, id: &str) -> Option<&TestCase>;
}

#[derive(Debug, thiserror::Error)]
#[error("Duplicate {kind} id: {id}")]
pub struct DuplicateDefinition {
    pub kind: &'static str,
    pub id: String,
}

/// In-memory arena of definitions indexed by id
#[derive(Debug, Clone, Default)]
pub struct DefinitionSet {
    scripts: BTreeMap<String, Script>,
    components: BTreeMap<String, Component>,
    test_cases: BTreeMap<String, TestCase>,
}

impl DefinitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a script
    pub fn with_script(mut self, script: Script) -> Self {
        self.scripts.insert(script.id.clone(), script);
        self
    }

    /// Add or replace a component
    pub fn with_component(mut self, component: Component) -> Self {
        self.components.insert(component.id.clone(), component);
        self
    }

    /// Add or replace a test case
    pub fn with_test_case(mut self, test_case: TestCase) -> Self {
        self.test_cases.insert(test_case.id.clone(), test_case);
        self
    }

    pub fn insert_script(&mut self, script: Script) -> Result<(), DuplicateDefinition> {
        if self.scripts.contains_key(&script.id) {
            return Err(DuplicateDefinition {
                kind: "script",
                id: script.id,
            });
        }
        self.scripts.insert(script.id.clone(), script);
        Ok(())
    }

    pub fn insert_component(&mut self, component: Component) -> Result<(), DuplicateDefinition> {
        if self.components.contains_key(&component.id) {
            return Err(DuplicateDefinition {
                kind: "component",
                id: component.id,
            });
        }
        self.components.insert(component.id.clone(), component);
        Ok(())
    }

    pub fn insert_test_case(&mut self, test_case: TestCase) -> Result<(), DuplicateDefinition> {
        if self.test_cases.contains_key(&test_case.id) {
            return Err(DuplicateDefinition {
                kind: "test case",
                id: test_case.id,
            });
        }
        self.test_cases.insert(test_case.id.clone(), test_case);
        Ok(())
    }

    /// Scripts in id order
    pub fn scripts(&self) -> impl Iterator<Item = &Script> {
        self.scripts.values()
    }

    /// Components in id order
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    /// Test cases in id order
    pub fn test_cases(&self) -> impl Iterator<Item = &TestCase> {
        self.test_cases.values()
    }

    pub fn len(&self) -> usize {
        self.scripts.len() + self.components.len() + self.test_cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DefinitionRepository for DefinitionSet {
    fn script(&self, id: &str) -> Option<&Script> {
        self.scripts.get(id)
    }

    fn component(&self, id: &str) -> Option<&Component> {
        self.components.get(id)
    }

    fn test_case(&self, id: &str) -> Option<&TestCase> {
        self.test_cases.get(id)
    }
}
