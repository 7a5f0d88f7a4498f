// peakstack-cli/src/main.rs
// ============================================================================
// Module: Peakstack CLI Entry Point
// Description: Command dispatcher for cluster lifecycle operations.
// Purpose: Map each subcommand onto exactly one lifecycle controller call.
// Dependencies: clap, peakstack-api, peakstack-core, peakstack-store-s3
// ============================================================================

//! ## Overview
//! The Peakstack CLI drives the lifecycle controller from the command
//! line: one subcommand per operation, YAML or JSON cluster documents,
//! text or JSON output, and exit code 1 on any lifecycle error. The
//! `serve` subcommand starts the HTTP surface over the same controller.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use peakstack_api::ApiConfig;
use peakstack_api::ApiController;
use peakstack_api::AppState;
use peakstack_api::StderrAuditSink;
use peakstack_api::error_response;
use peakstack_core::CancelSignal;
use peakstack_core::ClusterDescription;
use peakstack_core::ClusterName;
use peakstack_core::ConfigVersion;
use peakstack_core::ControllerSettings;
use peakstack_core::CreateOptions;
use peakstack_core::FindingLevel;
use peakstack_core::LifecycleError;
use peakstack_core::UpdateOptions;
use peakstack_core::ValidateOptions;
use peakstack_core::cluster_schema;
use peakstack_core::runtime::InMemoryFleetStatusStore;
use peakstack_core::runtime::InMemoryObjectStore;
use peakstack_core::runtime::InMemoryStackClient;
use peakstack_core::runtime::SharedComputeFacts;
use peakstack_core::runtime::SharedFleetStatusStore;
use peakstack_core::runtime::SharedObjectStore;
use peakstack_core::runtime::SharedStackClient;
use peakstack_core::runtime::StaticComputeFacts;
use peakstack_store_s3::S3ObjectStore;
use peakstack_store_s3::S3StoreConfig;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a cluster document file.
const MAX_DOCUMENT_BYTES: usize = 1024 * 1024;
/// Maximum size of a service configuration file.
const MAX_SERVICE_CONFIG_BYTES: usize = 64 * 1024;

// ============================================================================
// SECTION: Command Line
// ============================================================================

/// Peakstack cluster lifecycle CLI.
#[derive(Debug, Parser)]
#[command(name = "peakstack", version, about = "Provision and manage HPC clusters")]
struct Cli {
    /// Output format for command results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
    /// Path to the service configuration TOML.
    #[arg(long, global = true)]
    service_config: Option<PathBuf>,
    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Human-readable lines.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Validation failure threshold argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FailureLevelArg {
    /// Fail on any finding.
    Info,
    /// Fail on warnings and errors.
    Warning,
    /// Fail on errors only.
    Error,
}

impl From<FailureLevelArg> for FindingLevel {
    fn from(level: FailureLevelArg) -> Self {
        match level {
            FailureLevelArg::Info => Self::Info,
            FailureLevelArg::Warning => Self::Warning,
            FailureLevelArg::Error => Self::Error,
        }
    }
}

/// CLI subcommands; each maps onto one lifecycle controller call.
#[derive(Debug, Subcommand)]
enum Command {
    /// Creates a cluster from a declarative document.
    CreateCluster {
        /// Cluster name.
        #[arg(long)]
        name: String,
        /// Path to the cluster document (YAML or JSON).
        #[arg(long)]
        file: PathBuf,
        /// Skips fact-based and dry-run validators.
        #[arg(long)]
        suppress_validators: bool,
        /// Validation failure threshold.
        #[arg(long, value_enum)]
        validation_failure_level: Option<FailureLevelArg>,
        /// Disables automatic stack rollback on failure.
        #[arg(long)]
        disable_rollback: bool,
        /// Waits until the stack leaves its transitional status.
        #[arg(long)]
        wait: bool,
    },
    /// Updates a cluster towards a target document.
    UpdateCluster {
        /// Cluster name.
        #[arg(long)]
        name: String,
        /// Path to the target cluster document (YAML or JSON).
        #[arg(long)]
        file: PathBuf,
        /// Applies the update even when the policy verdict denies it.
        #[arg(long)]
        force: bool,
        /// Skips fact-based validators.
        #[arg(long)]
        suppress_validators: bool,
        /// Validation failure threshold.
        #[arg(long, value_enum)]
        validation_failure_level: Option<FailureLevelArg>,
        /// Waits until the stack leaves its transitional status.
        #[arg(long)]
        wait: bool,
    },
    /// Deletes a cluster.
    DeleteCluster {
        /// Cluster name.
        #[arg(long)]
        name: String,
        /// Marks log resources to outlive the stack.
        #[arg(long)]
        keep_logs: bool,
    },
    /// Starts the compute fleet.
    StartFleet {
        /// Cluster name.
        #[arg(long)]
        name: String,
    },
    /// Stops the compute fleet.
    StopFleet {
        /// Cluster name.
        #[arg(long)]
        name: String,
    },
    /// Describes one cluster.
    DescribeCluster {
        /// Cluster name.
        #[arg(long)]
        name: String,
    },
    /// Lists every cluster.
    ListClusters,
    /// Exports the persisted resolved document of a cluster version.
    ExportConfig {
        /// Cluster name.
        #[arg(long)]
        name: String,
        /// Configuration version token.
        #[arg(long)]
        version: String,
    },
    /// Serves the HTTP API over the same controller.
    Serve,
}

// ============================================================================
// SECTION: Service Configuration
// ============================================================================

/// Object-store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum StoreBackend {
    /// In-memory store for local runs and demos.
    #[default]
    Memory,
    /// S3-compatible object store.
    S3,
}

/// Store section of the service configuration.
#[derive(Debug, Clone, Default, Deserialize)]
struct StoreConfig {
    /// Backend selection.
    #[serde(default)]
    backend: StoreBackend,
    /// S3 connection settings; required for the S3 backend.
    #[serde(default)]
    s3: Option<S3StoreConfig>,
}

/// Service configuration for the CLI and the embedded API server.
#[derive(Debug, Clone, Default, Deserialize)]
struct ServiceConfig {
    /// Object-store settings.
    #[serde(default)]
    store: StoreConfig,
    /// API server settings for the `serve` subcommand.
    #[serde(default)]
    api: ApiConfig,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI-level errors outside the lifecycle controller.
#[derive(Debug, Error)]
enum CliError {
    /// A file could not be read or exceeded the size limit.
    #[error("cannot read '{path}': {message}")]
    Read {
        /// Offending path.
        path: String,
        /// Failure description.
        message: String,
    },
    /// A document or configuration could not be parsed.
    #[error("cannot parse '{path}': {message}")]
    Parse {
        /// Offending path.
        path: String,
        /// Failure description.
        message: String,
    },
    /// Collaborator construction failed.
    #[error("cannot initialize collaborators: {0}")]
    Init(String),
    /// Output could not be written.
    #[error("cannot write output: {0}")]
    Output(String),
    /// The API server failed.
    #[error("api server failed: {0}")]
    Serve(String),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            let _ = write_stderr_line(&format!("peakstack: {err}"));
            ExitCode::FAILURE
        }
    }
}

/// Executes the parsed command.
async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let config = load_service_config(cli.service_config.as_deref())?;
    let controller = Arc::new(build_controller(&config)?);

    let outcome: Result<Value, LifecycleError> = match cli.command {
        Command::CreateCluster {
            name,
            file,
            suppress_validators,
            validation_failure_level,
            disable_rollback,
            wait,
        } => {
            let (document, original) = load_document(&file)?;
            let options = CreateOptions {
                validate: ValidateOptions {
                    failure_level: validation_failure_level
                        .map(Into::into)
                        .unwrap_or_default(),
                    suppress_validators,
                },
                disable_rollback,
                original_text: Some(original),
            };
            let name = ClusterName::new(name);
            run_and_wait(&controller, controller.create(&name, &document, &options), &name, wait)
        }
        Command::UpdateCluster {
            name,
            file,
            force,
            suppress_validators,
            validation_failure_level,
            wait,
        } => {
            let (document, original) = load_document(&file)?;
            let options = UpdateOptions {
                validate: ValidateOptions {
                    failure_level: validation_failure_level
                        .map(Into::into)
                        .unwrap_or_default(),
                    suppress_validators,
                },
                force,
                original_text: Some(original),
            };
            let name = ClusterName::new(name);
            run_and_wait(&controller, controller.update(&name, &document, &options), &name, wait)
        }
        Command::DeleteCluster {
            name,
            keep_logs,
        } => controller
            .delete(&ClusterName::new(name), keep_logs)
            .map(|()| serde_json::json!({"status": "deleting"})),
        Command::StartFleet {
            name,
        } => controller
            .start(&ClusterName::new(name))
            .map(|()| serde_json::json!({"status": "starting"})),
        Command::StopFleet {
            name,
        } => controller
            .stop(&ClusterName::new(name))
            .map(|()| serde_json::json!({"status": "stopping"})),
        Command::DescribeCluster {
            name,
        } => controller.describe(&ClusterName::new(name)).map(describe_to_value),
        Command::ListClusters => controller.list().map(|clusters| {
            Value::Array(clusters.into_iter().map(describe_to_value).collect())
        }),
        Command::ExportConfig {
            name,
            version,
        } => controller.export_config(&ClusterName::new(name), &ConfigVersion::new(version)),
        Command::Serve => {
            let state = AppState::new(controller, Arc::new(StderrAuditSink));
            peakstack_api::serve(config.api, state)
                .await
                .map_err(|err| CliError::Serve(err.to_string()))?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    match outcome {
        Ok(value) => {
            emit_value(&value, cli.output)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            emit_lifecycle_error(&err, cli.output)?;
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Runs a mutating call, optionally waiting for the stack to stabilize.
fn run_and_wait(
    controller: &ApiController,
    result: Result<ClusterDescription, LifecycleError>,
    name: &ClusterName,
    wait: bool,
) -> Result<Value, LifecycleError> {
    let description = result?;
    if wait {
        let settled = controller.wait_for_stack(name, &CancelSignal::new())?;
        return Ok(describe_to_value(settled));
    }
    Ok(describe_to_value(description))
}

// ============================================================================
// SECTION: Collaborator Construction
// ============================================================================

/// Builds the controller over the configured collaborators.
fn build_controller(config: &ServiceConfig) -> Result<ApiController, CliError> {
    let registry =
        cluster_schema().map(Arc::new).map_err(|err| CliError::Init(err.to_string()))?;
    let store = match config.store.backend {
        StoreBackend::Memory => SharedObjectStore::from_store(InMemoryObjectStore::new()),
        StoreBackend::S3 => {
            let s3_config = config.store.s3.clone().unwrap_or_default();
            let store =
                S3ObjectStore::new(&s3_config).map_err(|err| CliError::Init(err.to_string()))?;
            SharedObjectStore::from_store(store)
        }
    };
    let settings = ControllerSettings {
        bucket: config.api.bucket.clone(),
        ..ControllerSettings::default()
    };
    Ok(ApiController::new(
        SharedStackClient::from_client(InMemoryStackClient::new()),
        store,
        SharedFleetStatusStore::from_store(InMemoryFleetStatusStore::new()),
        SharedComputeFacts::from_facts(StaticComputeFacts::with_defaults()),
        registry,
        settings,
    ))
}

// ============================================================================
// SECTION: File Loading
// ============================================================================

/// Reads a file with a size limit.
fn read_limited(path: &Path, max_bytes: usize) -> Result<String, CliError> {
    let content = std::fs::read_to_string(path).map_err(|err| CliError::Read {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    if content.len() > max_bytes {
        return Err(CliError::Read {
            path: path.display().to_string(),
            message: format!("file exceeds {max_bytes} bytes"),
        });
    }
    Ok(content)
}

/// Loads a cluster document as JSON, keeping the original text.
fn load_document(path: &Path) -> Result<(Value, String), CliError> {
    let content = read_limited(path, MAX_DOCUMENT_BYTES)?;
    let is_json = path.extension().and_then(|ext| ext.to_str()) == Some("json");
    let document: Value = if is_json {
        serde_json::from_str(&content).map_err(|err| CliError::Parse {
            path: path.display().to_string(),
            message: err.to_string(),
        })?
    } else {
        serde_yaml::from_str(&content).map_err(|err| CliError::Parse {
            path: path.display().to_string(),
            message: err.to_string(),
        })?
    };
    Ok((document, content))
}

/// Loads the service configuration, defaulting when no path is given.
fn load_service_config(path: Option<&Path>) -> Result<ServiceConfig, CliError> {
    let Some(path) = path else {
        return Ok(ServiceConfig::default());
    };
    let content = read_limited(path, MAX_SERVICE_CONFIG_BYTES)?;
    let config: ServiceConfig = toml::from_str(&content).map_err(|err| CliError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    config.api.validate().map_err(|err| CliError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    Ok(config)
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Converts a cluster description into its JSON rendering.
fn describe_to_value(description: ClusterDescription) -> Value {
    serde_json::to_value(&description).unwrap_or_default()
}

/// Emits a successful result in the selected format.
fn emit_value(value: &Value, format: OutputFormat) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let rendered = serde_json::to_string_pretty(value)
                .map_err(|err| CliError::Output(err.to_string()))?;
            write_stdout_line(&rendered).map_err(|err| CliError::Output(err.to_string()))
        }
        OutputFormat::Text => {
            for line in text_lines(value) {
                write_stdout_line(&line).map_err(|err| CliError::Output(err.to_string()))?;
            }
            Ok(())
        }
    }
}

/// Emits a lifecycle error with its findings or verdicts.
fn emit_lifecycle_error(err: &LifecycleError, format: OutputFormat) -> Result<(), CliError> {
    let (_, body) = error_response(err);
    match format {
        OutputFormat::Json => {
            let rendered = serde_json::to_string_pretty(&body)
                .map_err(|error| CliError::Output(error.to_string()))?;
            write_stderr_line(&rendered).map_err(|error| CliError::Output(error.to_string()))
        }
        OutputFormat::Text => {
            write_stderr_line(&format!("{}: {}", body.kind, body.message))
                .map_err(|error| CliError::Output(error.to_string()))?;
            for finding in body.findings.unwrap_or_default() {
                write_stderr_line(&format!("  {finding}"))
                    .map_err(|error| CliError::Output(error.to_string()))?;
            }
            for change in body.changes.unwrap_or_default() {
                let mut line = format!("  {} [{}]", change.location, change.policy);
                if let Some(reason) = change.fail_reason {
                    line.push_str(&format!(": {reason}"));
                }
                if let Some(action) = change.action_needed {
                    line.push_str(&format!(" ({action})"));
                }
                write_stderr_line(&line).map_err(|error| CliError::Output(error.to_string()))?;
            }
            Ok(())
        }
    }
}

/// Renders a JSON value as indented text lines.
fn text_lines(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => {
            let mut lines = Vec::new();
            for item in items {
                lines.extend(text_lines(item));
                lines.push(String::new());
            }
            lines.pop();
            lines
        }
        Value::Object(map) => map
            .iter()
            .map(|(key, item)| match item {
                Value::String(text) => format!("{key}: {text}"),
                other => format!("{key}: {other}"),
            })
            .collect(),
        other => vec![other.to_string()],
    }
}

/// Writes one line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes one line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
        reason = "Test-only assertions and helpers are permitted."
    )]

    use std::io::Write as _;

    use super::Cli;
    use super::Command;
    use super::ServiceConfig;
    use super::StoreBackend;
    use super::load_document;
    use super::load_service_config;
    use clap::Parser;

    #[test]
    fn create_command_parses_every_flag() {
        let cli = Cli::parse_from([
            "peakstack",
            "create-cluster",
            "--name",
            "hpc-alpha",
            "--file",
            "cluster.yaml",
            "--suppress-validators",
            "--validation-failure-level",
            "warning",
            "--disable-rollback",
            "--wait",
            "--output",
            "json",
        ]);
        match cli.command {
            Command::CreateCluster {
                name,
                suppress_validators,
                disable_rollback,
                wait,
                ..
            } => {
                assert_eq!(name, "hpc-alpha");
                assert!(suppress_validators);
                assert!(disable_rollback);
                assert!(wait);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn yaml_documents_load_as_json_values() {
        let mut file = tempfile::NamedTempFile::with_suffix(".yaml").expect("temp file");
        write!(
            file,
            "Region: us-east-1\nHeadNode:\n  InstanceType: c5.xlarge\n  SubnetId: subnet-head\n"
        )
        .expect("write yaml");
        let (document, original) = load_document(file.path()).expect("document loads");
        assert_eq!(document["Region"], serde_json::json!("us-east-1"));
        assert_eq!(document["HeadNode"]["InstanceType"], serde_json::json!("c5.xlarge"));
        assert!(original.contains("Region: us-east-1"));
    }

    #[test]
    fn service_config_defaults_to_the_memory_backend() {
        let config = load_service_config(None).expect("default config");
        assert_eq!(config.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn service_config_parses_the_s3_backend() {
        let parsed: ServiceConfig = toml::from_str(
            "[store]\nbackend = \"s3\"\n[store.s3]\nregion = \"us-east-1\"\n",
        )
        .expect("config parses");
        assert_eq!(parsed.store.backend, StoreBackend::S3);
        assert_eq!(
            parsed.store.s3.expect("s3 settings present").region.as_deref(),
            Some("us-east-1")
        );
    }
}
