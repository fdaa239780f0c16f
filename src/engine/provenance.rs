//! Provenance & the CompositeResult wire shape.

use crate::adapters::{Capability, IndexFreshness};
use crate::types::{RepoStateId, RepoStateMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendContribution {
    #[serde(rename = "backendId")]
    pub backend_id: String,
    pub capabilities: Vec<Capability>,
    #[serde(rename = "durationMs")]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completeness {
    pub score: f32,
    pub source: String,
    #[serde(rename = "isBestEffort")]
    pub is_best_effort: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Truncation {
    pub field: String,
    pub dropped: usize,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(rename = "repoStateId")]
    pub repo_state_id: String,
    #[serde(rename = "repoStateDirty")]
    pub repo_state_dirty: bool,
    #[serde(rename = "repoStateMode")]
    pub repo_state_mode: RepoStateMode,
    pub backends: Vec<BackendContribution>,
    pub completeness: Completeness,
    #[serde(rename = "indexFreshness")]
    pub index_freshness: Option<IndexFreshness>,
    pub warnings: Vec<String>,
    pub timeouts: Vec<String>,
    pub truncations: Vec<Truncation>,
    #[serde(rename = "queryDurationMs")]
    pub query_duration_ms: u64,
    #[serde(rename = "fromCache", default)]
    pub from_cache: bool,
}

/// Accumulates contributions/warnings/timeouts/truncations across a fan-out,
/// then seals into a `Provenance` record.
pub struct ProvenanceBuilder {
    repo_state_id: RepoStateId,
    repo_state_dirty: bool,
    repo_state_mode: RepoStateMode,
    backends: Vec<BackendContribution>,
    index_freshness: Option<IndexFreshness>,
    warnings: Vec<String>,
    timeouts: Vec<String>,
    truncations: Vec<Truncation>,
    required_total: usize,
    required_succeeded: usize,
    start: std::time::Instant,
}

impl ProvenanceBuilder {
    pub fn new(repo_state_id: RepoStateId, repo_state_dirty: bool, repo_state_mode: RepoStateMode) -> Self {
        Self {
            repo_state_id,
            repo_state_dirty,
            repo_state_mode,
            backends: Vec::new(),
            index_freshness: None,
            warnings: Vec::new(),
            timeouts: Vec::new(),
            truncations: Vec::new(),
            required_total: 0,
            required_succeeded: 0,
            start: std::time::Instant::now(),
        }
    }

    pub fn record_success(&mut self, backend_id: &str, capabilities: Vec<Capability>, duration_ms: u64, required: bool) {
        self.backends.push(BackendContribution {
            backend_id: backend_id.to_string(),
            capabilities,
            duration_ms,
        });
        if required {
            self.required_total += 1;
            self.required_succeeded += 1;
        }
    }

    pub fn record_timeout(&mut self, backend_id: &str, operation: &str, required: bool) {
        self.timeouts.push(format!("{backend_id} timed out on {operation}"));
        if required {
            self.required_total += 1;
        }
    }

    pub fn record_failure(&mut self, backend_id: &str, message: &str, required: bool) {
        self.warnings.push(format!("{backend_id}: {message}"));
        if required {
            self.required_total += 1;
        }
    }

    pub fn record_truncation(&mut self, field: impl Into<String>, dropped: usize, description: impl Into<String>) {
        if dropped > 0 {
            self.truncations.push(Truncation {
                field: field.into(),
                dropped,
                description: description.into(),
            });
        }
    }

    pub fn set_index_freshness(&mut self, freshness: Option<IndexFreshness>) {
        if freshness.is_some() {
            self.index_freshness = freshness;
        }
    }

    pub fn index_freshness(&self) -> Option<&IndexFreshness> {
        self.index_freshness.as_ref()
    }

    /// Weighted fraction of required adapters that returned cleanly
    ///; an operation with no required adapters is
    /// always complete.
    pub fn seal(self) -> Provenance {
        let score = if self.required_total == 0 {
            1.0
        } else {
            self.required_succeeded as f32 / self.required_total as f32
        };
        let is_best_effort = score < 1.0 || !self.timeouts.is_empty() || !self.warnings.is_empty();
        Provenance {
            repo_state_id: self.repo_state_id.to_string(),
            repo_state_dirty: self.repo_state_dirty,
            repo_state_mode: self.repo_state_mode,
            backends: self.backends,
            completeness: Completeness {
                score,
                source: "required_adapter_success_fraction".to_string(),
                is_best_effort,
            },
            index_freshness: self.index_freshness,
            warnings: self.warnings,
            timeouts: self.timeouts,
            truncations: self.truncations,
            query_duration_ms: self.start.elapsed().as_millis() as u64,
            from_cache: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drilldown {
    pub label: String,
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeResult<T> {
    #[serde(rename = "ckbVersion")]
    pub ckb_version: String,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    pub facts: T,
    pub drilldowns: Vec<Drilldown>,
    pub provenance: Provenance,
}

impl<T> CompositeResult<T> {
    pub fn new(facts: T, drilldowns: Vec<Drilldown>, provenance: Provenance) -> Self {
        Self {
            ckb_version: env!("CARGO_PKG_VERSION").to_string(),
            schema_version: 1,
            facts,
            drilldowns,
            provenance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_required_adapters_yields_full_completeness() {
        let builder = ProvenanceBuilder::new(RepoStateId::from_hash(1), false, RepoStateMode::Head);
        let provenance = builder.seal();
        assert_eq!(provenance.completeness.score, 1.0);
        assert!(!provenance.completeness.is_best_effort);
    }

    #[test]
    fn one_required_timeout_out_of_two_yields_half_score() {
        let mut builder = ProvenanceBuilder::new(RepoStateId::from_hash(1), false, RepoStateMode::Head);
        builder.record_success("scip", vec![Capability::FindRefs], 10, true);
        builder.record_timeout("lsp", "find_references", true);
        let provenance = builder.seal();
        assert_eq!(provenance.completeness.score, 0.5);
        assert!(provenance.completeness.is_best_effort);
    }
}
