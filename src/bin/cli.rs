use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde_json::Value;
use testcase_orchestrator::prelude::*;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "orchestrator.yaml";

#[derive(Parser)]
#[command(name = "testcase-orchestrator")]
#[command(about = "Run layered test cases built from scripts and components", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to orchestrator.yaml (default: ./orchestrator.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single test case
    Run {
        /// Id of the test case to run
        #[arg(value_name = "TEST_CASE_ID")]
        test_case: String,

        /// Definitions directory (overrides config)
        #[arg(short, long)]
        definitions: Option<PathBuf>,

        /// Environments directory (overrides config)
        #[arg(long)]
        environments: Option<PathBuf>,

        /// Environment name (overrides the test case's own)
        #[arg(long = "env")]
        env: Option<String>,

        /// Runtime parameter as key=value; values are parsed as YAML
        #[arg(short = 'p', long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check definitions for missing references and component cycles
    Validate {
        /// Definitions directory (overrides config)
        #[arg(short, long)]
        definitions: Option<PathBuf>,
    },

    /// List test cases, components and scripts
    List {
        /// Definitions directory (overrides config)
        #[arg(short, long)]
        definitions: Option<PathBuf>,
    },
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }
    let value = if value.is_empty() {
        Value::String(String::new())
    } else {
        serde_yaml::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
    };
    Ok((key.to_string(), value))
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "testcase_orchestrator=debug"
    } else {
        "testcase_orchestrator=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(success) => {
            if success {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Orchestrator failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run {
            test_case,
            definitions,
            environments,
            env,
            params,
            json,
        } => {
            run_test_case(
                config,
                &test_case,
                definitions,
                environments,
                env,
                params,
                json,
            )
            .await
        }
        Commands::Validate { definitions } => {
            validate(&definitions.unwrap_or(config.definitions))
        }
        Commands::List { definitions } => list(&definitions.unwrap_or(config.definitions)),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
            Ok(EngineConfig::load(DEFAULT_CONFIG_FILE)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn load_definitions(dir: &Path) -> anyhow::Result<DefinitionSet> {
    if !dir.is_dir() {
        anyhow::bail!("Definitions directory not found: {}", dir.display());
    }
    Ok(DefinitionLoader::load_directory(dir)?)
}

async fn run_test_case(
    config: EngineConfig,
    test_case: &str,
    definitions: Option<PathBuf>,
    environments: Option<PathBuf>,
    env: Option<String>,
    params: Vec<(String, Value)>,
    json: bool,
) -> anyhow::Result<bool> {
    let definitions = load_definitions(definitions.as_deref().unwrap_or(&config.definitions))?;
    let environments = environments.unwrap_or_else(|| config.environments.clone());
    let body = HttpScriptExecutor::new(config.http.clone())?;

    let engine = ExecutionEngine::with_settings(
        Arc::new(definitions),
        Arc::new(YamlEnvironmentProvider::new(environments)),
        Arc::new(body),
        config.settings(),
    );

    let runtime: ParamMap = params.into_iter().collect();
    let report = engine
        .execute_test_case_with_environment(test_case, env.as_deref(), runtime)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(report.success())
}

fn validate(dir: &Path) -> anyhow::Result<bool> {
    let definitions = load_definitions(dir)?;
    let errors = validate_definitions(&definitions);

    if errors.is_empty() {
        println!(
            "✓ {} definitions validated ({} test cases, {} components, {} scripts)",
            definitions.len(),
            definitions.test_cases().count(),
            definitions.components().count(),
            definitions.scripts().count()
        );
        return Ok(true);
    }

    for error in &errors {
        println!("✗ {}", error);
    }
    Ok(false)
}

fn list(dir: &Path) -> anyhow::Result<bool> {
    let definitions = load_definitions(dir)?;

    if definitions.is_empty() {
        println!("No definitions found in: {}", dir.display());
        return Ok(true);
    }

    println!("Test cases:");
    for test_case in definitions.test_cases() {
        println!(
            "  {} ({} steps)",
            test_case.id,
            test_case.scripts.len() + test_case.components.len()
        );
    }

    println!("\nComponents:");
    for component in definitions.components() {
        let mode = match component.execution_mode {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
            ExecutionMode::Conditional => "conditional",
        };
        println!(
            "  {} [{}] ({} steps)",
            component.id,
            mode,
            component.scripts.len() + component.components.len()
        );
    }

    println!("\nScripts:");
    for script in definitions.scripts() {
        println!("  {}", script.id);
    }

    Ok(true)
}

fn print_report(report: &ExecutionReport) {
    println!("\n=== Test Case Result ===\n");
    println!("Test case: {} ({})", report.name, report.id);
    println!("Environment: {}", report.environment);
    println!("Status: {}\n", report.result.status);

    for entry in &report.history {
        let marker = match entry.result.status {
            ExecutionStatus::Success => "✓",
            ExecutionStatus::Skipped => "-",
            _ => "✗",
        };
        println!(
            "  {} [{}] {} ({:.2}s)",
            marker,
            entry.kind,
            entry.name,
            entry.result.duration.as_secs_f64()
        );
        if let Some(err) = &entry.result.error {
            println!("      Error: {}", err);
        }
    }

    println!("\n{}", report.summary);
    if let Some(err) = &report.result.error {
        println!("Error: {}", err);
    }
}
