//! CLI command implementations
//!
//! Every command loads and validates the config first. `serve` and
//! `explain` then connect the store (seed files and declared indexes)
//! before doing anything else.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::gatekeeper::{Gatekeeper, Operation};
use crate::http_server::{AppState, HttpServer, HttpServerConfig};
use crate::observability::{log_event, log_event_with_fields, Event};
use crate::store::{
    Document, DocumentStore, Explainable, LogicalQuery, StoreConfig, StoreHandle, Verbosity,
};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::{read_request, write_error, write_response};

/// Environment variable overriding `server.port`
pub const PORT_ENV: &str = "INDEXGATE_PORT";

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: HttpServerConfig,

    #[serde(default)]
    pub store: StoreConfig,
}

impl Config {
    /// Load configuration from file, apply environment overrides, validate
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        let path = path.display().to_string();
        log_event_with_fields(Event::ConfigLoaded, &[("path", path.as_str())]);
        Ok(config)
    }

    /// Applies `INDEXGATE_PORT` if set
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CliResult<()> {
        if let Some(raw) = lookup(PORT_ENV) {
            self.server.port = raw.trim().parse().map_err(|_| {
                CliError::config_error(format!("{} must be a port number, got '{}'", PORT_ENV, raw))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> CliResult<()> {
        self.server.validate().map_err(CliError::config_error)?;
        self.store.validate().map_err(CliError::config_error)?;
        Ok(())
    }
}

/// One query to explain, read from stdin
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExplainRequest {
    pub operation: String,
    pub collection: String,
    /// Filter, or the `$match` of an aggregation
    #[serde(default)]
    pub filter: Document,
    pub projection: Option<Document>,
    pub sort: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(&config, port),
        Command::Explain { config } => explain(&config),
        Command::CheckConfig { config } => check_config(&config),
    }
}

fn connect(config: &StoreConfig) -> CliResult<StoreHandle> {
    let handle = StoreHandle::disconnected();
    handle
        .connect(config)
        .map_err(|e| CliError::boot_failed(format!("Store connect failed: {}", e)))?;
    Ok(handle)
}

/// Serve the HTTP gateway until ctrl-c
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    log_event(Event::BootStart);

    let mut config = Config::load(config_path)?;
    if let Some(port) = port {
        config.server.port = port;
        config.validate()?;
    }

    let handle = connect(&config.store)?;
    let state = Arc::new(AppState::new(handle.clone()));
    let server = HttpServer::new(config.server.clone(), state);
    log_event(Event::BootComplete);

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("Failed to create tokio runtime: {}", e)))?;
    let result = rt.block_on(server.start());

    handle.close();
    log_event(Event::ShutdownComplete);
    result.map_err(|e| CliError::boot_failed(format!("HTTP server failed: {}", e)))
}

/// Read one request from stdin, print its verdict and plan
pub fn explain(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    let handle = connect(&config.store)?;
    let store = handle.store()?;

    let gatekeeper = Gatekeeper::default();
    let output = explain_output(store.as_ref(), &gatekeeper, read_request());

    handle.close();
    match output {
        Ok(data) => write_response(data),
        Err(e) => write_error(e.code_str(), e.message()),
    }
}

/// Explains one request read from stdin.
///
/// Request errors are logged here and reported on stdout by the caller;
/// config and store boot errors never reach this point, they fail the
/// command.
pub fn explain_output(
    store: &dyn DocumentStore,
    gatekeeper: &Gatekeeper,
    request: CliResult<Value>,
) -> CliResult<Value> {
    request
        .and_then(|request| explain_request(store, gatekeeper, request))
        .inspect_err(|e| {
            log_event_with_fields(
                Event::OperationFailed,
                &[("code", e.code_str()), ("detail", e.message())],
            );
        })
}

/// Verdict and execution plan for one request
pub fn explain_request(
    store: &dyn DocumentStore,
    gatekeeper: &Gatekeeper,
    request: Value,
) -> CliResult<Value> {
    let request: ExplainRequest = serde_json::from_value(request)?;
    let operation: Operation = request
        .operation
        .parse()
        .map_err(CliError::invalid_request)?;

    let (verdict, plan) = match operation {
        Operation::Aggregate => {
            let filter = Some(request.filter);
            let (pipeline, verdict) =
                gatekeeper.check_aggregation(store, &request.collection, filter)?;
            let plan = store.explain(Explainable::Aggregate(&pipeline), Verbosity::ExecutionStats)?;
            (verdict, plan)
        }
        Operation::UpdateOne | Operation::UpdateMany | Operation::ArrayUpdate => {
            let (query, verdict) =
                gatekeeper.check_update(store, operation, &request.collection, request.filter)?;
            let plan = store.explain(Explainable::Find(&query), Verbosity::ExecutionStats)?;
            (verdict, plan)
        }
        _ => {
            let mut query = LogicalQuery::new(&request.collection, request.filter);
            if let Some(projection) = request.projection {
                query = query.with_projection(projection);
            }
            if let Some(sort) = request.sort {
                query = query.with_sort(sort);
            }
            if let Some(skip) = request.skip {
                query = query.with_skip(skip);
            }
            if let Some(limit) = request.limit {
                query = query.with_limit(limit);
            }
            let verdict = gatekeeper.check(store, operation, Explainable::Find(&query))?;
            let plan = store.explain(Explainable::Find(&query), Verbosity::ExecutionStats)?;
            (verdict, plan)
        }
    };

    Ok(json!({
        "operation": operation.as_str(),
        "collection": request.collection,
        "verdict": verdict,
        "plan": plan,
    }))
}

/// Validate a config file without connecting anything
pub fn check_config(config_path: &Path) -> CliResult<()> {
    let config = Config::load(config_path)?;
    write_response(json!({
        "valid": true,
        "addr": config.server.socket_addr(),
        "database": config.store.database,
        "seed_files": config.store.seed.len(),
        "indexes": config.store.indexes.len(),
    }))
}
