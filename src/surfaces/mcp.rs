//! MCP surface: stdio JSON-RPC over a `jsonrpc-core` `IoHandler` dispatch
//! table, framed over newline-delimited stdio rather than HTTP, exposing the
//! `tools/list` + `tools/call` shape with one tool per Engine operation.

use crate::adapters::Direction;
use crate::engine::Engine;
use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::{RepoStateMode, StableId};
use jsonrpc_core::{Error as RpcError, IoHandler, Params, Value};
use serde_json::json;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

/// Curated subset surfaced as a quick-start "preset" list alongside the full
/// tool registry, for agent clients that want common workflows without
/// enumerating all 14 operations up front.
const PRESET_TOOLS: &[&str] = &["search_symbols", "get_symbol", "find_references", "analyze_impact", "get_call_graph"];

struct ToolDefinition {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

fn tool_registry() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_symbol",
            description: "Resolve a symbol by stable id.",
            input_schema: json!({"type": "object", "properties": {"stable_id": {"type": "string"}}, "required": ["stable_id"]}),
        },
        ToolDefinition {
            name: "search_symbols",
            description: "Search symbols by name or pattern.",
            input_schema: json!({"type": "object", "properties": {"query": {"type": "string"}, "limit": {"type": "integer"}}, "required": ["query"]}),
        },
        ToolDefinition {
            name: "find_references",
            description: "Find every reference to a symbol.",
            input_schema: json!({"type": "object", "properties": {"stable_id": {"type": "string"}, "include_tests": {"type": "boolean"}, "limit": {"type": "integer"}}, "required": ["stable_id"]}),
        },
        ToolDefinition {
            name: "get_call_graph",
            description: "Walk the call graph around a symbol.",
            input_schema: json!({"type": "object", "properties": {"stable_id": {"type": "string"}, "direction": {"type": "string", "enum": ["callers", "callees", "both"]}, "depth": {"type": "integer"}}, "required": ["stable_id"]}),
        },
        ToolDefinition {
            name: "analyze_impact",
            description: "Estimate the blast radius of changing a symbol.",
            input_schema: json!({"type": "object", "properties": {"stable_id": {"type": "string"}, "depth": {"type": "integer"}, "include_tests": {"type": "boolean"}}, "required": ["stable_id"]}),
        },
        ToolDefinition {
            name: "analyze_change_set",
            description: "Estimate the blast radius of a diff between two refs.",
            input_schema: json!({"type": "object", "properties": {"base": {"type": "string"}, "head": {"type": "string"}, "depth": {"type": "integer"}, "include_tests": {"type": "boolean"}, "strict": {"type": "boolean"}}, "required": ["base", "head"]}),
        },
        ToolDefinition {
            name: "summarize_pr",
            description: "Summarize a PR's diff: file stats, risk, suggested reviewers.",
            input_schema: json!({"type": "object", "properties": {"base": {"type": "string"}, "head": {"type": "string"}, "include_ownership": {"type": "boolean"}}, "required": ["base", "head"]}),
        },
        ToolDefinition {
            name: "list_entrypoints",
            description: "List detected entrypoints, ranked by fan-out.",
            input_schema: json!({"type": "object", "properties": {"module": {"type": "string"}, "limit": {"type": "integer"}}}),
        },
        ToolDefinition {
            name: "trace_usage",
            description: "Trace how a symbol is reached from a detected entrypoint.",
            input_schema: json!({"type": "object", "properties": {"stable_id": {"type": "string"}, "max_paths": {"type": "integer"}, "max_depth": {"type": "integer"}}, "required": ["stable_id"]}),
        },
        ToolDefinition {
            name: "find_dead_code",
            description: "Find symbols with no (or only self/test) references.",
            input_schema: json!({"type": "object", "properties": {"include_unexported": {"type": "boolean"}, "min_confidence": {"type": "number"}, "exclude_test_only": {"type": "boolean"}, "limit": {"type": "integer"}}}),
        },
        ToolDefinition {
            name: "justify_symbol",
            description: "Explain whether a symbol looks safe to remove.",
            input_schema: json!({"type": "object", "properties": {"stable_id": {"type": "string"}}, "required": ["stable_id"]}),
        },
        ToolDefinition {
            name: "get_ownership",
            description: "Show who owns a file: blame + commit history authorship.",
            input_schema: json!({"type": "object", "properties": {"path": {"type": "string"}, "include_blame": {"type": "boolean"}, "include_history": {"type": "boolean"}}, "required": ["path"]}),
        },
        ToolDefinition {
            name: "get_ownership_drift",
            description: "Flag files where CODEOWNERS has drifted from actual authorship.",
            input_schema: json!({"type": "object", "properties": {"scope": {"type": "string"}, "threshold": {"type": "number"}, "limit": {"type": "integer"}}}),
        },
        ToolDefinition {
            name: "get_status",
            description: "Report backend availability, index freshness, and cache occupancy.",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDefinition {
            name: "doctor",
            description: "Run environment/adapter health checks.",
            input_schema: json!({"type": "object", "properties": {}}),
        },
        ToolDefinition {
            name: "trigger_reindex",
            description: "Queue a reindex job: re-run adapter preparation and drop cached results for the repository's current state.",
            input_schema: json!({"type": "object", "properties": {}}),
        },
    ]
}

fn stable_id_arg(args: &Value, key: &str) -> Result<StableId, RpcError> {
    let raw = args.get(key).and_then(Value::as_str).ok_or_else(|| invalid_params(&format!("missing `{key}`")))?;
    StableId::new(raw).map_err(|e| invalid_params(&e.to_string()))
}

fn invalid_params(message: &str) -> RpcError {
    RpcError { code: jsonrpc_core::ErrorCode::InvalidParams, message: message.to_string(), data: None }
}

fn to_rpc_error(err: CkbError) -> RpcError {
    RpcError { code: jsonrpc_core::ErrorCode::ServerError(-32000), message: err.to_string(), data: Some(json!({"kind": err.kind().as_str()})) }
}

async fn bound_repo_state(engine: &Engine) -> Result<(RepoState, RepoStateMode), RpcError> {
    let repo_state = RepoState::compute(&engine.config().repo_path).map_err(to_rpc_error)?;
    engine.prepare_adapters(&repo_state).await;
    Ok((repo_state, RepoStateMode::Head))
}

/// Dispatch one `tools/call` invocation by tool name, returning its
/// `CompositeResult` (or ambient report) serialized to `Value`.
async fn call_tool(engine: &Arc<Engine>, name: &str, args: Value) -> Result<Value, RpcError> {
    use crate::engine::operations::*;

    if name == "trigger_reindex" {
        let repo_path = engine.config().repo_path.clone();
        let id = reindex::trigger_reindex(engine, &repo_path, RepoStateMode::Head).map_err(to_rpc_error)?;
        return Ok(json!({"jobId": id}));
    }

    let (repo_state, mode) = bound_repo_state(engine).await?;
    let result = match name {
        "get_symbol" => {
            let id = stable_id_arg(&args, "stable_id")?;
            json!(symbols::get_symbol(engine, &repo_state, mode, &id).await.map_err(to_rpc_error)?)
        }
        "search_symbols" => {
            let query = args.get("query").and_then(Value::as_str).ok_or_else(|| invalid_params("missing `query`"))?;
            let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(25) as usize;
            json!(symbols::search_symbols(engine, &repo_state, mode, query, limit).await.map_err(to_rpc_error)?)
        }
        "find_references" => {
            let id = stable_id_arg(&args, "stable_id")?;
            let include_tests = args.get("include_tests").and_then(Value::as_bool).unwrap_or(false);
            let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(200) as usize;
            json!(symbols::find_references(engine, &repo_state, mode, &id, include_tests, limit).await.map_err(to_rpc_error)?)
        }
        "get_call_graph" => {
            let id = stable_id_arg(&args, "stable_id")?;
            let direction = match args.get("direction").and_then(Value::as_str) {
                Some("callers") => Direction::Callers,
                Some("callees") => Direction::Callees,
                _ => Direction::Both,
            };
            let depth = args.get("depth").and_then(Value::as_u64).unwrap_or(1) as u8;
            json!(call_graph::get_call_graph(engine, &repo_state, mode, &id, direction, depth).await.map_err(to_rpc_error)?)
        }
        "analyze_impact" => {
            let id = stable_id_arg(&args, "stable_id")?;
            let depth = args.get("depth").and_then(Value::as_u64).unwrap_or(2) as u8;
            let include_tests = args.get("include_tests").and_then(Value::as_bool).unwrap_or(false);
            json!(impact::analyze_impact(engine, &repo_state, mode, &id, depth, include_tests).await.map_err(to_rpc_error)?)
        }
        "analyze_change_set" => {
            let base = args.get("base").and_then(Value::as_str).ok_or_else(|| invalid_params("missing `base`"))?;
            let head = args.get("head").and_then(Value::as_str).ok_or_else(|| invalid_params("missing `head`"))?;
            let depth = args.get("depth").and_then(Value::as_u64).unwrap_or(2) as u8;
            let include_tests = args.get("include_tests").and_then(Value::as_bool).unwrap_or(false);
            let strict = args.get("strict").and_then(Value::as_bool).unwrap_or(false);
            json!(impact::analyze_change_set(engine, &repo_state, mode, base, head, depth, include_tests, strict).await.map_err(to_rpc_error)?)
        }
        "summarize_pr" => {
            let base = args.get("base").and_then(Value::as_str).ok_or_else(|| invalid_params("missing `base`"))?;
            let head = args.get("head").and_then(Value::as_str).ok_or_else(|| invalid_params("missing `head`"))?;
            let include_ownership = args.get("include_ownership").and_then(Value::as_bool).unwrap_or(false);
            json!(impact::summarize_pr(engine, &repo_state, mode, base, head, include_ownership).await.map_err(to_rpc_error)?)
        }
        "list_entrypoints" => {
            let module = args.get("module").and_then(Value::as_str);
            let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize;
            json!(entrypoints::list_entrypoints(engine, &repo_state, mode, module, limit).await.map_err(to_rpc_error)?)
        }
        "trace_usage" => {
            let id = stable_id_arg(&args, "stable_id")?;
            let max_paths = args.get("max_paths").and_then(Value::as_u64).unwrap_or(5) as usize;
            let max_depth = args.get("max_depth").and_then(Value::as_u64).unwrap_or(5) as u8;
            json!(call_graph::trace_usage(engine, &repo_state, mode, &id, max_paths, max_depth).await.map_err(to_rpc_error)?)
        }
        "find_dead_code" => {
            let include_unexported = args.get("include_unexported").and_then(Value::as_bool).unwrap_or(false);
            let min_confidence = args.get("min_confidence").and_then(Value::as_f64).unwrap_or(0.5) as f32;
            let exclude_test_only = args.get("exclude_test_only").and_then(Value::as_bool).unwrap_or(false);
            let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(100) as usize;
            json!(dead_code::find_dead_code(engine, &repo_state, mode, include_unexported, min_confidence, &[], exclude_test_only, limit)
                .await
                .map_err(to_rpc_error)?)
        }
        "justify_symbol" => {
            let id = stable_id_arg(&args, "stable_id")?;
            json!(dead_code::justify_symbol(engine, &repo_state, mode, &id).await.map_err(to_rpc_error)?)
        }
        "get_ownership" => {
            let path = args.get("path").and_then(Value::as_str).ok_or_else(|| invalid_params("missing `path`"))?;
            let include_blame = args.get("include_blame").and_then(Value::as_bool).unwrap_or(false);
            let include_history = args.get("include_history").and_then(Value::as_bool).unwrap_or(false);
            json!(ownership::get_ownership(engine, &repo_state, mode, path, include_blame, include_history).await.map_err(to_rpc_error)?)
        }
        "get_ownership_drift" => {
            let scope = args.get("scope").and_then(Value::as_str);
            let threshold = args.get("threshold").and_then(Value::as_f64).unwrap_or(0.5) as f32;
            let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize;
            json!(ownership::get_ownership_drift(engine, &repo_state, mode, scope, threshold, limit).await.map_err(to_rpc_error)?)
        }
        "get_status" => json!(engine.get_status(&repo_state, mode)),
        "doctor" => json!(engine.doctor(&repo_state).await),
        other => return Err(invalid_params(&format!("unknown tool `{other}`"))),
    };
    Ok(result)
}

fn build_handler(engine: Arc<Engine>) -> IoHandler {
    let mut io = IoHandler::new();

    io.add_method("initialize", |_params: Params| async move {
        Ok(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "ckb-mcp", "version": env!("CARGO_PKG_VERSION")},
            "capabilities": {"tools": {}}
        }))
    });

    io.add_method("ping", |_params: Params| async move { Ok(json!({"status": "ok"})) });

    io.add_method("tools/list", |_params: Params| async move {
        let tools: Vec<Value> = tool_registry()
            .into_iter()
            .map(|t| json!({"name": t.name, "description": t.description, "inputSchema": t.input_schema}))
            .collect();
        Ok(json!({"tools": tools, "presets": PRESET_TOOLS}))
    });

    let call_engine = engine.clone();
    io.add_method("tools/call", move |params: Params| {
        let engine = call_engine.clone();
        async move {
            let value: Value = params.parse().map_err(|_| invalid_params("expected an object with `name` and `arguments`"))?;
            let name = value.get("name").and_then(Value::as_str).ok_or_else(|| invalid_params("missing `name`"))?.to_string();
            let args = value.get("arguments").cloned().unwrap_or(json!({}));
            let result = call_tool(&engine, &name, args).await?;
            Ok(json!({"content": [{"type": "text", "text": serde_json::to_string(&result).unwrap_or_default()}]}))
        }
    });

    io
}

/// Serve newline-delimited JSON-RPC over stdio: one request per line, one
/// response per line. Logging goes to stderr since stdout is the wire.
pub async fn serve_stdio(engine: Arc<Engine>) -> anyhow::Result<()> {
    let handler = build_handler(engine);
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Some(response) = handler.handle_request(&line).await else { continue };
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }
    Ok(())
}
