//! Definition-tree validation
//!
//! Components form a graph through their nested component references. Before
//! anything runs, every component reachable from a test case is walked depth
//! first: references must resolve and no component may contain itself,
//! directly or transitively.

use std::collections::HashSet;

use crate::definition::{DefinitionRepository, DefinitionSet, TestCase};
use crate::engine::error::EngineError;

pub struct ComponentGraph<'a> {
    repo: &'a dyn DefinitionRepository,
    visited: HashSet<String>,
    temp_visited: HashSet<String>,
    path: Vec<String>,
}

impl<'a> ComponentGraph<'a> {
    pub fn new(repo: &'a dyn DefinitionRepository) -> Self {
        Self {
            repo,
            visited: HashSet::new(),
            temp_visited: HashSet::new(),
            path: Vec::new(),
        }
    }

    /// Check a test case's references and every component below it
    pub fn check_test_case(&mut self, test_case: &TestCase) -> Result<(), EngineError> {
        for script_ref in &test_case.scripts {
            if self.repo.script(&script_ref.script_id).is_none() {
                return Err(EngineError::ScriptNotFound {
                    id: script_ref.script_id.clone(),
                    referenced_by: test_case.id.clone(),
                });
            }
        }
        for component_ref in &test_case.components {
            self.check_component(&component_ref.component_id, &test_case.id)?;
        }
        Ok(())
    }

    /// Check one component subtree
    pub fn check_component(&mut self, id: &str, referenced_by: &str) -> Result<(), EngineError> {
        if self.temp_visited.contains(id) {
            let start = self.path.iter().position(|p| p == id).unwrap_or(0);
            let mut cycle = self.path[start..].to_vec();
            cycle.push(id.to_string());
            return Err(EngineError::CyclicComponent(cycle));
        }
        if self.visited.contains(id) {
            return Ok(());
        }

        let component =
            self.repo
                .component(id)
                .ok_or_else(|| EngineError::ComponentNotFound {
                    id: id.to_string(),
                    referenced_by: referenced_by.to_string(),
                })?;

        for step in &component.scripts {
            if self.repo.script(&step.script_id).is_none() {
                return Err(EngineError::ScriptNotFound {
                    id: step.script_id.clone(),
                    referenced_by: id.to_string(),
                });
            }
        }

        self.temp_visited.insert(id.to_string());
        self.path.push(id.to_string());

        for nested in component.nested_component_ids() {
            self.check_component(nested, id)?;
        }

        self.path.pop();
        self.temp_visited.remove(id);
        self.visited.insert(id.to_string());
        Ok(())
    }
}

/// Validate a whole definition set, collecting every structural error
pub fn validate_definitions(set: &DefinitionSet) -> Vec<EngineError> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();
    let mut push = |err: EngineError| {
        if seen.insert(err.to_string()) {
            errors.push(err);
        }
    };

    for component in set.components() {
        if let Err(err) = ComponentGraph::new(set).check_component(&component.id, &component.id) {
            push(err);
        }
    }
    for test_case in set.test_cases() {
        if let Err(err) = ComponentGraph::new(set).check_test_case(test_case) {
            push(err);
        }
    }
    errors
}
