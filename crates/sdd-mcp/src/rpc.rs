//! Newline-delimited JSON-RPC 2.0 over stdio. This process owns one closed
//! tool catalog and speaks directly to a single MCP peer; it is not a hub or
//! proxy, so there is no multiplexing or downstream-transport concern here.

use crate::catalog::get_tools;
use crate::dispatch::call_tool;
use crate::instructions::{prompt_body, INSTRUCTIONS, PROMPT_SDD_START, PROMPT_SDD_STATUS};
use crate::ToolContext;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, Write};

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

fn ok(id: Option<Value>, result: Value) -> JsonRpcResponse {
    JsonRpcResponse { jsonrpc: "2.0", result: Some(result), error: None, id }
}

fn err(id: Option<Value>, code: i64, message: impl Into<String>) -> JsonRpcResponse {
    JsonRpcResponse { jsonrpc: "2.0", result: None, error: Some(JsonRpcError { code, message: message.into() }), id }
}

fn handle_request(ctx: &mut ToolContext, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
    match req.method.as_str() {
        "initialize" => Some(ok(
            req.id,
            json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": {}, "prompts": {} },
                "serverInfo": { "name": "sdd-mcp", "version": env!("CARGO_PKG_VERSION") },
                "instructions": INSTRUCTIONS,
            }),
        )),
        "notifications/initialized" => None,
        "tools/list" | "list_tools" => Some(ok(req.id, json!({ "tools": get_tools() }))),
        "tools/call" | "call_tool" => {
            let params = req.params.unwrap_or(Value::Null);
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
            let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
            match call_tool(ctx, name, &arguments) {
                Ok(text) => Some(ok(req.id, json!({ "content": [{ "type": "text", "text": text }] }))),
                Err(e) => Some(err(req.id, -32603, e.to_string())),
            }
        }
        "prompts/list" | "list_prompts" => Some(ok(
            req.id,
            json!({
                "prompts": [
                    { "name": PROMPT_SDD_START, "description": "Decide how to begin or resume work on this project.",
                      "arguments": [
                          { "name": "project_name", "required": false },
                          { "name": "mode", "required": false },
                      ] },
                    { "name": PROMPT_SDD_STATUS, "description": "Summarize the current pipeline position." },
                ]
            }),
        )),
        "prompts/get" | "get_prompt" => {
            let params = req.params.unwrap_or(Value::Null);
            let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
            match prompt_body(name) {
                Some(body) => Some(ok(
                    req.id,
                    json!({ "messages": [{ "role": "user", "content": { "type": "text", "text": body } }] }),
                )),
                None => Some(err(req.id, -32602, format!("unknown prompt: {name}"))),
            }
        }
        "shutdown" => Some(ok(req.id, json!({}))),
        other => Some(err(req.id, -32601, format!("method not found: {other}"))),
    }
}

fn write_response<W: Write>(out: &mut W, response: &JsonRpcResponse) -> std::io::Result<()> {
    serde_json::to_writer(&mut *out, response)?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Reads one JSON-RPC request per line from `input` until EOF, writing one
/// response per line (skipping notifications) to `output`. Malformed lines
/// produce a parse-error response rather than terminating the loop.
pub fn run<R: BufRead, W: Write>(mut ctx: ToolContext, input: R, mut output: W) -> std::io::Result<()> {
    for line in input.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(req) => {
                if req.method == "shutdown" {
                    let resp = handle_request(&mut ctx, req);
                    if let Some(resp) = resp {
                        write_response(&mut output, &resp)?;
                    }
                    break;
                }
                handle_request(&mut ctx, req)
            }
            Err(e) => Some(err(None, -32700, format!("parse error: {e}"))),
        };
        if let Some(response) = response {
            write_response(&mut output, &response)?;
        }
    }
    Ok(())
}
