//! Telemetry adapter: best-effort `telemetry_usage`, reading
//! an optional local usage-aggregate file rather than reaching out to a live
//! telemetry backend.

use super::{Adapter, Capability, FactQuery, PartialAnswer, ProvenanceFragment};
use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::Confidence;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;

const USAGE_RELATIVE_PATH: &str = ".ckb/telemetry-usage.json";

#[derive(Debug, Default, Deserialize)]
struct UsageFile {
    #[serde(default)]
    calls_per_symbol: HashMap<String, u64>,
}

pub struct TelemetryAdapter {
    usage: RwLock<HashMap<String, u64>>,
}

impl TelemetryAdapter {
    pub fn new() -> Self {
        Self {
            usage: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for TelemetryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn usage_path(root: &std::path::Path) -> PathBuf {
    root.join(USAGE_RELATIVE_PATH)
}

#[async_trait]
impl Adapter for TelemetryAdapter {
    fn backend_id(&self) -> &str {
        "telemetry"
    }

    fn describe(&self) -> Vec<Capability> {
        vec![Capability::TelemetryUsage]
    }

    async fn prepare(&self, repo_state: &RepoState) -> Result<(), CkbError> {
        if std::env::var("CKB_TELEMETRY_ENABLE").ok().as_deref() != Some("true") {
            *self.usage.write() = HashMap::new();
            return Ok(());
        }
        let path = usage_path(repo_state.root());
        let usage = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str::<UsageFile>(&s).ok())
            .map(|f| f.calls_per_symbol)
            .unwrap_or_default();
        *self.usage.write() = usage;
        Ok(())
    }

    async fn answer(
        &self,
        query: &FactQuery,
        deadline: Instant,
    ) -> Result<(PartialAnswer, ProvenanceFragment), CkbError> {
        if super::past_deadline(deadline) {
            return Err(CkbError::Timeout("telemetry adapter: deadline already passed".into()));
        }
        let start = Instant::now();
        let FactQuery::TelemetryUsage { stable_id } = query else {
            return Err(CkbError::InvalidArgument(format!(
                "telemetry adapter cannot answer {query:?}"
            )));
        };
        let usage = self.usage.read();
        if usage.is_empty() {
            return Err(CkbError::BackendUnavailable(
                "telemetry adapter: no usage aggregate available".into(),
            ));
        }
        let mut answer = PartialAnswer {
            confidence: Confidence::new(0.5),
            ..Default::default()
        };
        let count = usage.get(stable_id.as_str()).copied().unwrap_or(0);
        answer.telemetry_usage.insert(stable_id.as_str().to_string(), count);

        let fragment = ProvenanceFragment {
            backend_id: self.backend_id().to_string(),
            capabilities_used: vec![Capability::TelemetryUsage],
            duration_ms: start.elapsed().as_millis() as u64,
            data_sources: vec![stable_id.as_str().to_string()],
            index_freshness: None,
        };
        Ok((answer, fragment))
    }

    fn estimated_cost_ms(&self, _query: &FactQuery) -> u64 {
        20
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_path_is_scoped_under_ckb_dir() {
        let root = std::path::Path::new("/repo");
        assert_eq!(usage_path(root), root.join(".ckb/telemetry-usage.json"));
    }
}
