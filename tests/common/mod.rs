#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use testcase_orchestrator::prelude::*;

/// What the scripted executor does for one call
#[derive(Debug, Clone)]
pub enum Reply {
    /// Succeed with these output variables; the output echoes the request
    Ok(Value),
    Fail(String),
    /// Sleep, then behave like the inner reply
    Delay(Duration, Box<Reply>),
}

impl Reply {
    pub fn ok(outputs: Value) -> Self {
        Reply::Ok(outputs)
    }

    pub fn fail(error: &str) -> Self {
        Reply::Fail(error.to_string())
    }

    pub fn slow(ms: u64, then: Reply) -> Self {
        Reply::Delay(Duration::from_millis(ms), Box::new(then))
    }
}

/// Script body executor driven by per-script reply queues
///
/// Once a script's queue is empty every further call succeeds with no
/// output variables. Every invocation is recorded.
#[derive(Default)]
pub struct ScriptedExecutor {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<ScriptInvocation>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, script_id: &str, reply: Reply) -> Self {
        self.replies
            .lock()
            .unwrap()
            .entry(script_id.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<ScriptInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, script_id: &str) -> Vec<ScriptInvocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.script_id == script_id)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Resolved parameters of the last call to `script_id`
    pub fn last_params(&self, script_id: &str) -> ParamMap {
        self.calls_for(script_id)
            .pop()
            .map(|c| c.params)
            .unwrap_or_default()
    }
}

#[async_trait]
impl ScriptBodyExecutor for ScriptedExecutor {
    async fn execute(&self, invocation: &ScriptInvocation) -> Result<BodyOutcome, BridgeError> {
        self.calls.lock().unwrap().push(invocation.clone());
        let mut reply = self
            .replies
            .lock()
            .unwrap()
            .get_mut(&invocation.script_id)
            .and_then(|queue| queue.pop_front())
            .unwrap_or(Reply::Ok(json!({})));

        loop {
            match reply {
                Reply::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    reply = *inner;
                }
                Reply::Ok(outputs) => {
                    let outputs: ParamMap = serde_json::from_value(outputs)?;
                    return Ok(BodyOutcome::success(invocation.request.clone())
                        .with_output_variables(outputs));
                }
                Reply::Fail(error) => return Ok(BodyOutcome::failure(error)),
            }
        }
    }
}

pub fn params(value: Value) -> ParamMap {
    serde_json::from_value(value).expect("params must be a JSON object")
}

pub fn definitions(yaml: &str) -> DefinitionSet {
    DefinitionLoader::from_yaml_str(yaml).expect("Failed to parse definitions")
}

/// `default` and `prod` environments
pub fn environments() -> StaticEnvironmentProvider {
    StaticEnvironmentProvider::new()
        .with_environment(
            "default",
            json!({
                "timeout": 60,
                "region": "eu-west-1",
                "api": { "host": "staging.local", "port": 8080 }
            }),
        )
        .with_environment(
            "prod",
            json!({
                "timeout": 10,
                "api": { "host": "prod.local", "port": 443 }
            }),
        )
}

pub fn engine(yaml: &str, executor: Arc<ScriptedExecutor>) -> ExecutionEngine {
    ExecutionEngine::new(
        Arc::new(definitions(yaml)),
        Arc::new(environments()),
        executor,
    )
}

pub fn engine_with_settings(
    yaml: &str,
    executor: Arc<ScriptedExecutor>,
    settings: EngineSettings,
) -> ExecutionEngine {
    ExecutionEngine::with_settings(
        Arc::new(definitions(yaml)),
        Arc::new(environments()),
        executor,
        settings,
    )
}

/// Ids of the history entries, in recording order
pub fn history_ids(report: &ExecutionReport) -> Vec<String> {
    report.history.iter().map(|e| e.id.clone()).collect()
}

pub fn entry<'r>(report: &'r ExecutionReport, id: &str) -> &'r HistoryEntry {
    report
        .history
        .iter()
        .find(|e| e.id == id)
        .unwrap_or_else(|| panic!("No history entry for {}", id))
}

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_file(dir: &Path, filename: &str, content: &str) {
    if let Some(parent) = dir.join(filename).parent() {
        fs::create_dir_all(parent).expect("Failed to create directory");
    }
    fs::write(dir.join(filename), content).expect("Failed to write file");
}

/// Two scripts chained through a sequential component and a test case
pub const LOGIN_FLOW: &str = r#"
scripts:
  - id: login
    parameters:
      - name: username
        required: true
      - name: password
        default: secret
    request:
      method: POST
      url: "http://${env.api.host}/login"
      body:
        user: "${username}"
        password: "${password}"
    output_variables: [token]

  - id: profile
    request:
      method: GET
      url: "/profile"
      headers:
        Authorization: "Bearer ${token}"

components:
  - id: auth
    scripts:
      - script_id: login
        execution_order: 1
      - script_id: profile
        execution_order: 2

test_cases:
  - id: smoke
    name: Smoke test
    test_data:
      username: qa
    components:
      - component_id: auth
"#;
