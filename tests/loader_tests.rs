mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use testcase_orchestrator::prelude::*;

const SCRIPTS: &str = r#"
scripts:
  - id: create_order
    name: Create order
    parameters:
      - name: sku
        required: true
      - name: quantity
        default: 1
    request:
      method: POST
      url: "${env.api.base_url}/orders"
      body:
        sku: "${sku}"
        quantity: "${quantity}"
      expect_status: 201
      extract:
        order_id: /id
    output_variables: [order_id]
    timeout: 5
    retry_count: 2
    retry_interval: 0.5
"#;

const CASES: &str = r#"
components:
  - id: checkout
    execution_mode: parallel
    shared_variables:
      sku: ABC-1
    continue_on_failure: true
    timeout: 30
    scripts:
      - script_id: create_order
        execution_order: 1
        script_parameters:
          quantity: 2
        execution_condition: "sku != null"

test_cases:
  - id: checkout_smoke
    name: Checkout smoke
    environment: staging
    test_data:
      customer: qa
    components:
      - component_id: checkout
    retry_count: 1
    retry_interval: 0
"#;

fn write_fixture(dir: &std::path::Path) {
    write_file(dir, "definitions/scripts.yaml", SCRIPTS);
    write_file(dir, "definitions/cases.yml", CASES);
    write_file(dir, "definitions/README.md", "not a definition");
    write_file(
        dir,
        "environments/staging.yaml",
        "api:\n  base_url: https://staging.example.com\n",
    );
}

#[test]
fn test_load_directory_parses_every_field() {
    let dir = create_test_dir();
    write_fixture(dir.path());

    let set = DefinitionLoader::load_directory(&dir.path().join("definitions")).unwrap();
    assert_eq!(set.len(), 3);

    let script = set.script("create_order").unwrap();
    assert_eq!(script.display_name(), "Create order");
    assert_eq!(script.required_parameters().collect::<Vec<_>>(), vec!["sku"]);
    assert_eq!(script.parameter_defaults(), params(json!({ "quantity": 1 })));
    assert_eq!(script.timeout_duration(), Some(Duration::from_secs(5)));
    assert_eq!(script.retry_delay(), Duration::from_millis(500));
    assert_eq!(script.request["extract"]["order_id"], json!("/id"));

    let component = set.component("checkout").unwrap();
    assert_eq!(component.execution_mode, ExecutionMode::Parallel);
    assert!(component.continue_on_failure);
    assert_eq!(
        component.scripts[0].execution_condition.as_deref(),
        Some("sku != null")
    );

    let test_case = set.test_case("checkout_smoke").unwrap();
    assert_eq!(test_case.environment.as_deref(), Some("staging"));
    assert_eq!(test_case.retry_count, 1);
    assert!(validate_definitions(&set).is_empty());
}

#[tokio::test]
async fn test_loaded_definitions_run_end_to_end() {
    let dir = create_test_dir();
    write_fixture(dir.path());

    let set = DefinitionLoader::load_directory(&dir.path().join("definitions")).unwrap();
    let executor = Arc::new(
        ScriptedExecutor::new().on("create_order", Reply::ok(json!({ "order_id": "o-17" }))),
    );
    let engine = ExecutionEngine::new(
        Arc::new(set),
        Arc::new(YamlEnvironmentProvider::new(dir.path().join("environments"))),
        executor.clone(),
    );

    let report = engine
        .execute_test_case("checkout_smoke", ParamMap::new())
        .await
        .unwrap();

    assert!(report.success());
    assert_eq!(report.environment, "staging");
    assert_eq!(report.result.output_variables.get("order_id"), Some(&json!("o-17")));

    let call = &executor.calls_for("create_order")[0];
    assert_eq!(call.request["url"], json!("https://staging.example.com/orders"));
    assert_eq!(call.request["body"], json!({ "sku": "ABC-1", "quantity": 2 }));
    assert_eq!(call.params.get("customer"), Some(&json!("qa")));
}

#[test]
fn test_duplicate_ids_across_files_are_rejected() {
    let dir = create_test_dir();
    write_file(dir.path(), "a.yaml", SCRIPTS);
    write_file(dir.path(), "b.yaml", SCRIPTS);

    assert!(matches!(
        DefinitionLoader::load_directory(dir.path()),
        Err(LoadError::Duplicate { .. })
    ));
}

#[test]
fn test_unknown_execution_mode_is_a_yaml_error() {
    let result = DefinitionLoader::from_yaml_str(
        r#"
components:
  - id: c
    execution_mode: random
"#,
    );
    assert!(matches!(result, Err(LoadError::Yaml { .. })));
}

#[test]
fn test_missing_environment_file() {
    let dir = create_test_dir();
    let provider = YamlEnvironmentProvider::new(dir.path());

    assert!(matches!(
        EnvironmentConfig::load("staging", &provider),
        Err(testcase_orchestrator::EnvironmentError::NotFound(_))
    ));
}

#[test]
fn test_engine_config_from_file() {
    let dir = create_test_dir();
    write_file(
        dir.path(),
        "orchestrator.yaml",
        r#"
definitions: ./defs
default_environment: staging
strict_variables: false
default_script_timeout: 12
max_parallel: 4
http:
  base_url: https://staging.example.com
"#,
    );

    let config = EngineConfig::load(dir.path().join("orchestrator.yaml")).unwrap();
    assert_eq!(config.definitions, std::path::PathBuf::from("./defs"));
    assert_eq!(config.http.base_url.as_deref(), Some("https://staging.example.com"));

    let settings = config.settings();
    assert_eq!(settings.default_environment, "staging");
    assert_eq!(settings.unresolved, UnresolvedPolicy::Preserve);
    assert_eq!(settings.default_script_timeout, Some(Duration::from_secs(12)));
    assert_eq!(settings.max_parallel, 4);
}
