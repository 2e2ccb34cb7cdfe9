//! CLI module for indexgate
//!
//! Provides command-line interface for:
//! - serve: connect the store and serve HTTP
//! - explain: one-shot verdict and plan for a query read from stdin
//! - check-config: validate a configuration file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{
    check_config, explain, explain_output, explain_request, run, run_command, serve, Config, ExplainRequest,
    PORT_ENV,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_request, write_error, write_response};
