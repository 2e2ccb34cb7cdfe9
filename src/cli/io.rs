//! JSON I/O handling for CLI
//!
//! - Input: single JSON object via stdin
//! - Output: single JSON object via stdout

use std::io::{self, Read, Write};

use serde_json::Value;

use super::errors::{CliError, CliResult};

/// Read one JSON request from stdin. The request may span lines.
pub fn read_request() -> CliResult<Value> {
    let mut input = String::new();
    io::stdin().lock().read_to_string(&mut input)?;
    parse_request(&input)
}

pub(crate) fn parse_request(input: &str) -> CliResult<Value> {
    if input.trim().is_empty() {
        return Err(CliError::io_error("Empty input"));
    }
    Ok(serde_json::from_str(input)?)
}

/// Write a success response to stdout
pub fn write_response(data: Value) -> CliResult<()> {
    write_line(&response_body(data))
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_line(&error_body(code, message))
}

fn response_body(data: Value) -> Value {
    serde_json::json!({
        "status": "ok",
        "data": data
    })
}

fn error_body(code: &str, message: &str) -> Value {
    serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    })
}

fn write_line(value: &Value) -> CliResult<()> {
    let mut stdout = io::stdout();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multiline_request() {
        let value = parse_request("{\n  \"operation\": \"filter\"\n}\n").unwrap();
        assert_eq!(value["operation"], "filter");
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(parse_request("  \n").is_err());
    }

    #[test]
    fn test_error_body_shape() {
        let body = error_body("INDEXGATE_CLI_INVALID_REQUEST", "bad operation");
        assert_eq!(
            body,
            serde_json::json!({
                "status": "error",
                "code": "INDEXGATE_CLI_INVALID_REQUEST",
                "message": "bad operation"
            })
        );
        assert_eq!(response_body(Value::Null)["status"], "ok");
    }
}
