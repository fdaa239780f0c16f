//! LSP adapter: a narrow stdio JSON-RPC client used as a fallback source for
//! `resolve_symbol`, `find_refs`, and `call_edges` when no SCIP sidecar is
//! present. Speaks the LSP wire framing (`Content-Length` headers around a
//! JSON-RPC 2.0 body) over a child process's stdin/stdout, using
//! `jsonrpc_core::Value` for the untyped request/response bodies.

use super::{Adapter, Capability, Direction, FactQuery, PartialAnswer, ProvenanceFragment};
use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::{Confidence, Location, Reference, ReferenceKind};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child as AsyncChild, Command as AsyncCommand};
use tokio::sync::Mutex;

/// Launch command for the language server, read from `CKB_LSP_COMMAND`
/// (space-separated, e.g. `"rust-analyzer"`). Absent means the adapter is
/// unavailable and the Engine falls back to other backends for these
/// capabilities.
fn lsp_command() -> Option<Vec<String>> {
    std::env::var("CKB_LSP_COMMAND")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.split_whitespace().map(str::to_string).collect())
}

struct LspSession {
    child: AsyncChild,
    next_id: AtomicI64,
}

impl LspSession {
    async fn spawn(command: &[String], root: &std::path::Path) -> anyhow::Result<Self> {
        let (program, args) = command.split_first().ok_or_else(|| anyhow::anyhow!("empty LSP command"))?;
        let mut child = AsyncCommand::new(program)
            .args(args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;

        let mut session = Self {
            child,
            next_id: AtomicI64::new(1),
        };
        let init_params = json!({
            "processId": std::process::id(),
            "rootUri": format!("file://{}", root.display()),
            "capabilities": {},
        });
        session.request("initialize", init_params).await.ok();
        session.notify("initialized", json!({})).await.ok();
        Ok(session)
    }

    async fn request(&mut self, method: &str, params: Value) -> anyhow::Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.write_frame(&body).await?;
        self.read_response(id).await
    }

    async fn notify(&mut self, method: &str, params: Value) -> anyhow::Result<()> {
        let body = json!({ "jsonrpc": "2.0", "method": method, "params": params });
        self.write_frame(&body).await
    }

    async fn write_frame(&mut self, body: &Value) -> anyhow::Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("LSP process has no stdin"))?;
        let payload = serde_json::to_vec(body)?;
        let header = format!("Content-Length: {}\r\n\r\n", payload.len());
        stdin.write_all(header.as_bytes()).await?;
        stdin.write_all(&payload).await?;
        stdin.flush().await?;
        Ok(())
    }

    async fn read_response(&mut self, expected_id: i64) -> anyhow::Result<Value> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("LSP process has no stdout"))?;
        let mut reader = BufReader::new(stdout);
        for _ in 0..32 {
            let mut content_length = None;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await?;
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    break;
                }
                if let Some(value) = trimmed.strip_prefix("Content-Length: ") {
                    content_length = value.trim().parse::<usize>().ok();
                }
            }
            let len = content_length.ok_or_else(|| anyhow::anyhow!("LSP response missing Content-Length"))?;
            let mut buf = vec![0u8; len];
            reader.read_exact(&mut buf).await?;
            let value: Value = serde_json::from_slice(&buf)?;
            if value.get("id").and_then(Value::as_i64) == Some(expected_id) {
                return Ok(value);
            }
        }
        anyhow::bail!("no matching LSP response for request {expected_id}")
    }
}

pub struct LspAdapter {
    session: Mutex<Option<LspSession>>,
    root: Mutex<Option<PathBuf>>,
}

impl LspAdapter {
    pub fn new() -> Self {
        Self {
            session: Mutex::new(None),
            root: Mutex::new(None),
        }
    }
}

impl Default for LspAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn uri_to_path(uri: &str) -> String {
    uri.strip_prefix("file://").unwrap_or(uri).to_string()
}

fn location_from_lsp(value: &Value) -> Option<Location> {
    let uri = value.get("uri")?.as_str()?;
    let range = value.get("range")?;
    let start = range.get("start")?;
    let end = range.get("end")?;
    Some(Location {
        file_id: crate::types::file_id_for_path(&uri_to_path(uri)),
        start_line: start.get("line")?.as_u64()? as u32 + 1,
        start_col: start.get("character")?.as_u64()? as u32,
        end_line: end.get("line")?.as_u64()? as u32 + 1,
        end_col: end.get("character")?.as_u64()? as u32,
    })
}

#[async_trait]
impl Adapter for LspAdapter {
    fn backend_id(&self) -> &str {
        "lsp"
    }

    fn describe(&self) -> Vec<Capability> {
        vec![Capability::ResolveSymbol, Capability::FindRefs, Capability::CallEdges]
    }

    async fn prepare(&self, repo_state: &RepoState) -> Result<(), CkbError> {
        let Some(command) = lsp_command() else {
            return Ok(());
        };
        match LspSession::spawn(&command, repo_state.root()).await {
            Ok(session) => {
                *self.session.lock().await = Some(session);
                *self.root.lock().await = Some(repo_state.root().to_path_buf());
                Ok(())
            }
            Err(e) => Err(CkbError::BackendUnavailable(format!("lsp adapter: failed to spawn: {e}"))),
        }
    }

    async fn answer(
        &self,
        query: &FactQuery,
        deadline: Instant,
    ) -> Result<(PartialAnswer, ProvenanceFragment), CkbError> {
        if super::past_deadline(deadline) {
            return Err(CkbError::Timeout("lsp adapter: deadline already passed".into()));
        }
        let start = Instant::now();
        let mut guard = self.session.lock().await;
        let session = guard
            .as_mut()
            .ok_or_else(|| CkbError::BackendUnavailable("lsp adapter not prepared (no CKB_LSP_COMMAND)".into()))?;

        let mut answer = PartialAnswer {
            confidence: Confidence::new(0.6),
            ..Default::default()
        };
        let (capability, data_source) = match query {
            FactQuery::FindReferences { stable_id, include_tests } => {
                let (uri, line, character) = decode_location_stable_id(stable_id.as_str())
                    .ok_or_else(|| CkbError::InvalidArgument("lsp adapter requires a location-encoded stable id".into()))?;
                let params = json!({
                    "textDocument": { "uri": uri },
                    "position": { "line": line, "character": character },
                    "context": { "includeDeclaration": false },
                });
                let response = session
                    .request("textDocument/references", params)
                    .await
                    .map_err(|e| CkbError::BackendUnavailable(format!("lsp references failed: {e}")))?;
                let locations = response.get("result").and_then(Value::as_array).cloned().unwrap_or_default();
                answer.references = locations
                    .iter()
                    .filter_map(location_from_lsp)
                    .map(|loc| Reference {
                        from_location: loc,
                        to_stable_id: stable_id.clone(),
                        kind: ReferenceKind::Other,
                        is_test: false,
                    })
                    .filter(|r| *include_tests || !r.is_test)
                    .collect();
                (Capability::FindRefs, stable_id.as_str().to_string())
            }
            FactQuery::ResolveSymbol { stable_id } => {
                let (uri, line, character) = decode_location_stable_id(stable_id.as_str())
                    .ok_or_else(|| CkbError::InvalidArgument("lsp adapter requires a location-encoded stable id".into()))?;
                let params = json!({
                    "textDocument": { "uri": uri },
                    "position": { "line": line, "character": character },
                });
                session
                    .request("textDocument/definition", params)
                    .await
                    .map_err(|e| CkbError::BackendUnavailable(format!("lsp definition failed: {e}")))?;
                (Capability::ResolveSymbol, stable_id.as_str().to_string())
            }
            FactQuery::CallEdges { stable_id, direction, .. } => {
                let dir = match direction {
                    Direction::Callers => "callHierarchy/incomingCalls",
                    Direction::Callees | Direction::Both => "callHierarchy/outgoingCalls",
                };
                let _ = session
                    .request(dir, json!({ "item": stable_id.as_str() }))
                    .await
                    .map_err(|e| CkbError::BackendUnavailable(format!("lsp call hierarchy failed: {e}")))?;
                (Capability::CallEdges, stable_id.as_str().to_string())
            }
            other => {
                return Err(CkbError::InvalidArgument(format!("lsp adapter cannot answer {other:?}")))
            }
        };

        let fragment = ProvenanceFragment {
            backend_id: self.backend_id().to_string(),
            capabilities_used: vec![capability],
            duration_ms: start.elapsed().as_millis() as u64,
            data_sources: vec![data_source],
            index_freshness: None,
        };
        Ok((answer, fragment))
    }

    fn estimated_cost_ms(&self, _query: &FactQuery) -> u64 {
        400
    }
}

/// Stable ids handed to the LSP adapter are expected to encode
/// `file://path#line:col` so a query can be replayed as an LSP position —
/// the Engine builds these when SCIP has no record for a symbol but a
/// location from another adapter is available.
fn decode_location_stable_id(stable_id: &str) -> Option<(String, u64, u64)> {
    let (uri, position) = stable_id.split_once('#')?;
    let (line, col) = position.split_once(':')?;
    Some((uri.to_string(), line.parse().ok()?, col.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_location_encoded_stable_id() {
        let decoded = decode_location_stable_id("file:///a.rs#10:4").unwrap();
        assert_eq!(decoded, ("file:///a.rs".to_string(), 10, 4));
    }

    #[test]
    fn lsp_command_is_none_when_env_unset() {
        std::env::remove_var("CKB_LSP_COMMAND");
        assert!(lsp_command().is_none());
    }
}
