//! MCP (Model Context Protocol) server over stdio.
//!
//! JSON-RPC 2.0 over newline-delimited stdin/stdout, so an agent session can
//! compare and deduplicate traces without going through files.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use crate::config::{self, SiftConfig};
use crate::corpus::CorpusDeduplicator;
use crate::report;
use crate::scanner::PairwiseScanner;
use crate::similarity;
use crate::types::{LabelPolicy, TraceInput};

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Serialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

impl JsonRpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// MCP tool definitions
// ---------------------------------------------------------------------------

fn traces_schema() -> Value {
    serde_json::json!({
        "type": "array",
        "description": "Traces in arrival order",
        "items": {
            "type": "object",
            "properties": {
                "label": { "type": "string", "description": "Source label (defaults to the item index)" },
                "text": { "type": "string", "description": "Raw stack trace text" }
            },
            "required": ["text"]
        }
    })
}

fn tool_definitions() -> Value {
    serde_json::json!({
        "tools": [
            {
                "name": "trace_compare",
                "description": "Reduce two raw stack traces to segment chains and return their LCS similarity (0-100).",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "trace1": { "type": "string", "description": "First raw stack trace" },
                        "trace2": { "type": "string", "description": "Second raw stack trace" },
                        "align": { "type": "boolean", "description": "Include a prefix alignment", "default": false }
                    },
                    "required": ["trace1", "trace2"]
                }
            },
            {
                "name": "trace_dedup",
                "description": "Greedily build a corpus of mutually distinct traces: each trace is kept only if no earlier kept trace reaches the threshold.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "traces": traces_schema(),
                        "threshold": { "type": "number", "description": "Similarity cutoff in percent (default from config)" },
                        "minimum_lines": { "type": "integer", "description": "Skip traces shorter than this (default from config)" }
                    },
                    "required": ["traces"]
                }
            },
            {
                "name": "trace_scan",
                "description": "Score every pair of traces and report those at or above the threshold. Quadratic in the number of traces.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "traces": traces_schema(),
                        "threshold": { "type": "number", "description": "Similarity cutoff in percent (default from config)" },
                        "cross_label_only": { "type": "boolean", "description": "Skip pairs sharing a label (default from config)" }
                    },
                    "required": ["traces"]
                }
            },
            {
                "name": "trace_info",
                "description": "Show the effective tracesift configuration.",
                "inputSchema": {
                    "type": "object",
                    "properties": {},
                    "required": []
                }
            }
        ]
    })
}

// ---------------------------------------------------------------------------
// Tool handlers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct ToolTrace {
    #[serde(default)]
    label: Option<String>,
    text: String,
}

fn parse_traces(params: &Value) -> Result<Vec<TraceInput>, String> {
    let raw = params
        .get("traces")
        .cloned()
        .ok_or_else(|| "Missing required parameter: traces".to_string())?;
    let items: Vec<ToolTrace> =
        serde_json::from_value(raw).map_err(|e| format!("Invalid traces: {e}"))?;
    Ok(items
        .into_iter()
        .enumerate()
        .map(|(i, t)| TraceInput::new(t.label.unwrap_or_else(|| format!("#{i}")), t.text))
        .collect())
}

fn threshold_param(params: &Value, cfg: &SiftConfig) -> Result<f64, String> {
    match params.get("threshold") {
        None | Some(Value::Null) => Ok(cfg.threshold),
        Some(v) => {
            let t = v
                .as_f64()
                .ok_or_else(|| format!("threshold must be a number, got {v}"))?;
            config::validate_threshold(t).map_err(|e| e.to_string())
        }
    }
}

fn minimum_lines_param(params: &Value, cfg: &SiftConfig) -> Result<usize, String> {
    match params.get("minimum_lines") {
        None | Some(Value::Null) => Ok(cfg.minimum_lines),
        Some(v) => {
            let n = v
                .as_i64()
                .ok_or_else(|| format!("minimum_lines must be an integer, got {v}"))?;
            config::minimum_lines_from(n).map_err(|e| e.to_string())
        }
    }
}

fn label_policy_param(params: &Value, cfg: &SiftConfig) -> Result<LabelPolicy, String> {
    match params.get("cross_label_only") {
        None | Some(Value::Null) => Ok(cfg.label_policy()),
        Some(v) => v
            .as_bool()
            .map(LabelPolicy::from_cross_label_only)
            .ok_or_else(|| format!("cross_label_only must be a boolean, got {v}")),
    }
}

fn handle_trace_compare(params: &Value) -> Value {
    let trace1 = params.get("trace1").and_then(|v| v.as_str());
    let trace2 = params.get("trace2").and_then(|v| v.as_str());
    let (Some(trace1), Some(trace2)) = (trace1, trace2) else {
        return tool_error("Missing required parameters: trace1, trace2");
    };
    let want_align = params
        .get("align")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let cmp = similarity::compare(trace1, trace2);
    let alignment = want_align.then(|| similarity::align(&cmp.chain_a, &cmp.chain_b));

    serde_json::json!([{
        "type": "text",
        "text": format!(
            "Similarity: {} ({} vs {} segments)",
            report::format_similarity(cmp.similarity),
            cmp.chain_a.len(),
            cmp.chain_b.len()
        ),
        "isError": false,
        "_meta": {
            "similarity": cmp.similarity,
            "chain_a": cmp.chain_a,
            "chain_b": cmp.chain_b,
            "frames": [cmp.chain_a.frame_count(), cmp.chain_b.frame_count()],
            "alignment": alignment
        }
    }])
}

async fn handle_trace_dedup(params: &Value, cfg: &SiftConfig) -> Value {
    let traces = match parse_traces(params) {
        Ok(t) => t,
        Err(e) => return tool_error(&e),
    };
    let threshold = match threshold_param(params, cfg) {
        Ok(t) => t,
        Err(e) => return tool_error(&e),
    };
    let minimum_lines = match minimum_lines_param(params, cfg) {
        Ok(n) => n,
        Err(e) => return tool_error(&e),
    };

    let joined = tokio::task::spawn_blocking(move || {
        CorpusDeduplicator::process(threshold, minimum_lines, traces)
    })
    .await;
    let result = match joined {
        Ok(r) => r,
        Err(e) => return tool_error(&format!("Dedup task failed: {e}")),
    };

    let corpus: Vec<Value> = result
        .corpus
        .iter()
        .map(|t| {
            serde_json::json!({
                "label": t.label,
                "signature": t.fingerprint,
                "lines": t.line_count(),
                "text": t.text
            })
        })
        .collect();

    serde_json::json!([{
        "type": "text",
        "text": format!(
            "{} distinct, {} similar, {} skipped, {} excluded",
            result.distinct_count,
            result.similar_count,
            result.skipped_count,
            result.excluded_count
        ),
        "isError": false,
        "_meta": {
            "summary": result,
            "corpus": corpus
        }
    }])
}

async fn handle_trace_scan(params: &Value, cfg: &SiftConfig) -> Value {
    let traces = match parse_traces(params) {
        Ok(t) => t,
        Err(e) => return tool_error(&e),
    };
    let threshold = match threshold_param(params, cfg) {
        Ok(t) => t,
        Err(e) => return tool_error(&e),
    };
    let policy = match label_policy_param(params, cfg) {
        Ok(p) => p,
        Err(e) => return tool_error(&e),
    };
    let parallel = cfg.parallel;

    let joined = tokio::task::spawn_blocking(move || {
        PairwiseScanner::new(threshold, policy, parallel).scan(traces)
    })
    .await;
    let result = match joined {
        Ok(r) => r,
        Err(e) => return tool_error(&format!("Scan task failed: {e}")),
    };

    serde_json::json!([{
        "type": "text",
        "text": format!(
            "{} comparisons, {} at or above {}",
            result.total_comparisons,
            result.above_threshold_count,
            report::format_similarity(result.threshold)
        ),
        "isError": false,
        "_meta": result
    }])
}

fn handle_trace_info(cfg: &SiftConfig) -> Value {
    tool_result(&format!(
        "tracesift v{}\n\
         Threshold: {}\n\
         Minimum lines: {}\n\
         Scan policy: {}\n\
         Parallel scan: {}\n\
         Label by: {}",
        env!("CARGO_PKG_VERSION"),
        report::format_similarity(cfg.threshold),
        cfg.minimum_lines,
        cfg.label_policy(),
        cfg.parallel,
        cfg.input.label_by,
    ))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn tool_result(text: &str) -> Value {
    serde_json::json!([{
        "type": "text",
        "text": text,
        "isError": false
    }])
}

fn tool_error(text: &str) -> Value {
    serde_json::json!([{
        "type": "text",
        "text": text,
        "isError": true
    }])
}

// ---------------------------------------------------------------------------
// JSON-RPC dispatch
// ---------------------------------------------------------------------------

async fn dispatch(req: &JsonRpcRequest, cfg: &SiftConfig) -> Option<JsonRpcResponse> {
    match req.method.as_str() {
        "initialize" => {
            let id = req.id.clone().unwrap_or(Value::Null);
            Some(JsonRpcResponse::success(
                id,
                serde_json::json!({
                    "protocolVersion": "2025-06-18",
                    "capabilities": {
                        "tools": { "listChanged": false }
                    },
                    "serverInfo": {
                        "name": "tracesift",
                        "version": env!("CARGO_PKG_VERSION")
                    }
                }),
            ))
        }

        // Client notification, no response
        "notifications/initialized" => None,

        "tools/list" => {
            let id = req.id.clone().unwrap_or(Value::Null);
            Some(JsonRpcResponse::success(id, tool_definitions()))
        }

        "tools/call" => {
            let id = req.id.clone().unwrap_or(Value::Null);
            let params = req.params.as_ref();

            let tool_name = params
                .and_then(|p| p.get("name"))
                .and_then(|n| n.as_str())
                .unwrap_or("");

            let arguments = params
                .and_then(|p| p.get("arguments"))
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));

            tracing::debug!("tools/call {tool_name}");
            let content = match tool_name {
                "trace_compare" => handle_trace_compare(&arguments),
                "trace_dedup" => handle_trace_dedup(&arguments, cfg).await,
                "trace_scan" => handle_trace_scan(&arguments, cfg).await,
                "trace_info" => handle_trace_info(cfg),
                unknown => tool_error(&format!("Unknown tool: {unknown}")),
            };

            Some(JsonRpcResponse::success(
                id,
                serde_json::json!({ "content": content }),
            ))
        }

        // Unknown methods that carry an id get an error response
        _ => req.id.clone().map(|id| {
            JsonRpcResponse::error(id, -32601, format!("Method not found: {}", req.method))
        }),
    }
}

// ---------------------------------------------------------------------------
// Main serve loop
// ---------------------------------------------------------------------------

/// Run the MCP server, reading JSON-RPC from stdin and writing to stdout.
pub async fn serve(cfg: SiftConfig) -> Result<()> {
    tracing::info!("tracesift MCP server starting (stdio mode)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let resp = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
            Ok(req) => dispatch(&req, &cfg).await,
            Err(e) => {
                tracing::warn!("JSON parse error: {e}");
                Some(JsonRpcResponse::error(Value::Null, -32700, "Parse error"))
            }
        };

        if let Some(resp) = resp {
            let mut json = serde_json::to_string(&resp)?;
            json.push('\n');
            stdout.write_all(json.as_bytes()).await?;
            stdout.flush().await?;
        }
    }

    tracing::info!("tracesift MCP server shutting down");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
