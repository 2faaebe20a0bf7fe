//! Parameter priority tiers
//!
//! Every context keeps its parameters split by tier and merges them on
//! demand. Tiers are ordered lowest to highest:
//!
//! | tier               | populated from                                  |
//! |--------------------|-------------------------------------------------|
//! | `Environment`      | flattened environment configuration             |
//! | `ScriptDefaults`   | script parameter defaults                       |
//! | `ScriptVariables`  | script-level `variables`                        |
//! | `ComponentShared`  | component `shared_variables`                    |
//! | `TestCaseData`     | test-case `test_data`                           |
//! | `Runtime`          | parameters supplied by the caller               |
//!
//! Above the tiers sit the call-site overrides a child received from its
//! caller (`script_parameters`, reference `parameters`), and above those the
//! output variables produced by completed steps.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::definition::ParamMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Environment,
    ScriptDefaults,
    ScriptVariables,
    ComponentShared,
    TestCaseData,
    Runtime,
}

impl Tier {
    pub const ALL: [Tier; 6] = [
        Tier::Environment,
        Tier::ScriptDefaults,
        Tier::ScriptVariables,
        Tier::ComponentShared,
        Tier::TestCaseData,
        Tier::Runtime,
    ];
}

/// Where a merged value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Tier(Tier),
    CallSite,
    Output,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamLayers {
    tiers: BTreeMap<Tier, ParamMap>,
    call_site: ParamMap,
    outputs: ParamMap,
}

impl ParamLayers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier(mut self, tier: Tier, values: ParamMap) -> Self {
        self.overlay(tier, values);
        self
    }

    /// Write values into a tier, replacing keys already present there
    pub fn overlay(&mut self, tier: Tier, values: ParamMap) {
        if values.is_empty() {
            return;
        }
        self.tiers.entry(tier).or_default().extend(values);
    }

    /// Apply overrides from the step's call site
    ///
    /// They outrank every inherited tier, replace inherited outputs of the
    /// same name, and replace overrides from an outer call site.
    pub fn override_call(&mut self, values: ParamMap) {
        for key in values.keys() {
            self.outputs.remove(key);
        }
        self.call_site.extend(values);
    }

    pub fn call_site(&self) -> &ParamMap {
        &self.call_site
    }

    pub fn set(&mut self, tier: Tier, key: impl Into<String>, value: Value) {
        self.tiers.entry(tier).or_default().insert(key.into(), value);
    }

    pub fn tier(&self, tier: Tier) -> Option<&ParamMap> {
        self.tiers.get(&tier)
    }

    pub fn outputs(&self) -> &ParamMap {
        &self.outputs
    }

    pub fn merge_outputs(&mut self, outputs: &ParamMap) {
        self.outputs
            .extend(outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Merge all tiers in ascending priority, then call-site overrides, then outputs
    pub fn merged(&self) -> ParamMap {
        let mut merged = ParamMap::new();
        for values in self.tiers.values() {
            merged.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged.extend(self.call_site.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.extend(self.outputs.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }

    /// The layer that wins for `key`
    pub fn source_of(&self, key: &str) -> Option<Source> {
        if self.outputs.contains_key(key) {
            return Some(Source::Output);
        }
        if self.call_site.contains_key(key) {
            return Some(Source::CallSite);
        }
        self.tiers
            .iter()
            .rev()
            .find(|(_, values)| values.contains_key(key))
            .map(|(tier, _)| Source::Tier(*tier))
    }
}
