//! MCP (Model Context Protocol) server: JSON-RPC 2.0 over stdio.
//!
//! Protocol flow:
//!   1. Client sends `initialize` → server returns capabilities
//!   2. Client sends `notifications/initialized`
//!   3. Client sends `tools/list` → server returns 4 tool definitions
//!   4. Client sends `tools/call` → server executes the tool
//!
//! One request per line, one response per line, on stdout. Logging goes to
//! stderr so the protocol stream stays clean. The scanner is an explicit
//! dependency handed to [`serve`], constructed once at startup.

use std::io::{BufRead, Write};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error};

use crate::scanner::{ScanOptions, Scanner};

const PROTOCOL_VERSION: &str = "2024-11-05";

/// Runs the MCP server until stdin closes.
pub async fn serve(scanner: Arc<Scanner>) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "failed to read request");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: Value = match serde_json::from_str(&line) {
            Ok(value) => value,
            Err(e) => {
                write_response(
                    &mut stdout,
                    error_response(Value::Null, -32700, &format!("Parse error: {e}")),
                )?;
                continue;
            }
        };

        let id = request.get("id").cloned().unwrap_or(Value::Null);
        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let params = request.get("params").cloned().unwrap_or_else(|| json!({}));

        debug!(method, "handling request");

        // Notifications carry no id and get no response.
        if method.starts_with("notifications/") {
            continue;
        }

        let response = match method {
            "initialize" => ok_response(id, initialize_result()),
            "ping" => ok_response(id, json!({})),
            "tools/list" => ok_response(id, json!({ "tools": tool_definitions() })),
            "tools/call" => handle_tool_call(&scanner, id, &params).await,
            _ => error_response(id, -32601, &format!("Method not found: {method}")),
        };

        write_response(&mut stdout, response)?;
    }

    Ok(())
}

fn write_response(stdout: &mut std::io::Stdout, response: Value) -> anyhow::Result<()> {
    writeln!(stdout, "{response}")?;
    stdout.flush()?;
    Ok(())
}

fn ok_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message }
    })
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": "supplyscan",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn tool_definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "supplyscan_status",
            "description": "Get scanner version, IOC database info, and supported lockfile formats",
            "inputSchema": {
                "type": "object",
                "properties": {},
                "required": []
            }
        }),
        json!({
            "name": "supplyscan_scan",
            "description": "Scan a project directory for supply chain compromises and known vulnerabilities",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path to the project directory to scan"
                    },
                    "recursive": {
                        "type": "boolean",
                        "description": "Scan subdirectories for lockfiles"
                    },
                    "include_dev": {
                        "type": "boolean",
                        "description": "Include dev dependencies in the scan"
                    }
                },
                "required": ["path"]
            }
        }),
        json!({
            "name": "supplyscan_check",
            "description": "Check a single package@version for supply chain compromises and vulnerabilities",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "package": {
                        "type": "string",
                        "description": "Package name to check"
                    },
                    "version": {
                        "type": "string",
                        "description": "Package version to check"
                    }
                },
                "required": ["package", "version"]
            }
        }),
        json!({
            "name": "supplyscan_refresh",
            "description": "Update the IOC database from upstream sources",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "force": {
                        "type": "boolean",
                        "description": "Force refresh even if cache is fresh"
                    }
                },
                "required": []
            }
        }),
    ]
}

async fn handle_tool_call(scanner: &Scanner, id: Value, params: &Value) -> Value {
    let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    let outcome = match name {
        "supplyscan_status" => run_status(scanner).await,
        "supplyscan_scan" => run_scan(scanner, &args).await,
        "supplyscan_check" => run_check(scanner, &args).await,
        "supplyscan_refresh" => run_refresh(scanner, &args).await,
        _ => Err(format!("Unknown tool: {name}")),
    };

    match outcome {
        Ok(document) => ok_response(id, tool_result(document, false)),
        Err(message) => ok_response(id, tool_result(json!({ "error": message }), true)),
    }
}

/// Wraps a result document as MCP tool output: serialised text plus the
/// structured form.
fn tool_result(document: Value, is_error: bool) -> Value {
    let text = serde_json::to_string_pretty(&document).unwrap_or_else(|_| document.to_string());
    json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": document,
        "isError": is_error
    })
}

async fn run_status(scanner: &Scanner) -> Result<Value, String> {
    let status = crate::model::StatusResponse::new(
        env!("CARGO_PKG_VERSION"),
        scanner.status().await,
    );
    serde_json::to_value(&status).map_err(|e| e.to_string())
}

async fn run_scan(scanner: &Scanner, args: &Value) -> Result<Value, String> {
    let path = args
        .get("path")
        .and_then(|p| p.as_str())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| "path is required".to_owned())?;

    let opts = ScanOptions {
        recursive: args
            .get("recursive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
        include_dev: args
            .get("include_dev")
            .and_then(|v| v.as_bool())
            .unwrap_or(false),
    };

    let result = scanner
        .scan(std::path::Path::new(path), &opts)
        .await
        .map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| e.to_string())
}

async fn run_check(scanner: &Scanner, args: &Value) -> Result<Value, String> {
    let package = args
        .get("package")
        .and_then(|p| p.as_str())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| "package is required".to_owned())?;
    let version = args
        .get("version")
        .and_then(|v| v.as_str())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| "version is required".to_owned())?;

    let result = scanner.check_package(package, version).await;
    serde_json::to_value(&result).map_err(|e| e.to_string())
}

async fn run_refresh(scanner: &Scanner, args: &Value) -> Result<Value, String> {
    let force = args.get("force").and_then(|v| v.as_bool()).unwrap_or(false);
    let result = scanner.refresh(force).await.map_err(|e| e.to_string())?;
    serde_json::to_value(&result).map_err(|e| e.to_string())
}
