//! Query Engine: the centerpiece. Fans a high-level
//! operation out to whichever Backend Adapters declare the capabilities it
//! needs, merges their partial answers, ranks and truncates under a token
//! budget, and seals a `CompositeResult` carrying full provenance.
//!
//! State machine per operation: `Parsed -> Budgeted -> Fanned-out -> Merged
//! -> Ranked -> Truncated -> Sealed`. This module implements the shared
//! fan-out/merge/seal machinery; `operations/` holds the 14 named queries
//! plus the ambient status/job operations built on top of it.

pub mod budget;
pub mod merge;
pub mod operations;
pub mod provenance;
pub mod ranking;

use crate::adapters::{Adapter, Capability, FactQuery, PartialAnswer};
use crate::cache::{Cache, CacheKey};
use crate::config::Config;
use crate::error::{CkbError, ErrorPayload};
use crate::fact_layer::FactLayer;
use crate::jobs::JobManager;
use crate::repo_state::RepoState;
use crate::storage::Store;
use crate::types::{RepoStateId, RepoStateMode};
use merge::ScoredAnswer;
use provenance::{CompositeResult, ProvenanceBuilder};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Default total query budget a fan-out's per-adapter timeouts are carved
/// from.
pub const DEFAULT_QUERY_BUDGET: Duration = Duration::from_secs(5);

/// Upper bound on concurrent in-flight adapter calls for one operation.
pub const MAX_FAN_OUT: usize = 8;

pub struct Engine {
    store: Arc<Store>,
    facts: FactLayer,
    adapters: Vec<Arc<dyn Adapter>>,
    cache: Cache,
    pub jobs: Arc<JobManager>,
    config: Config,
}

impl Engine {
    pub fn new(
        store: Arc<Store>,
        adapters: Vec<Arc<dyn Adapter>>,
        jobs: Arc<JobManager>,
        config: Config,
    ) -> Self {
        let cache = Cache::new(
            Duration::from_secs(config.cache.query_ttl_secs),
            Duration::from_secs(config.cache.negative_ttl_secs),
            config.cache.max_entries,
        );
        Self {
            facts: FactLayer::new(store.clone()),
            store,
            adapters,
            cache,
            jobs,
            config,
        }
    }

    pub fn facts(&self) -> &FactLayer {
        &self.facts
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Bind a fresh `RepoState` and run every capable adapter's `prepare`.
    /// Called once per query by default (tier=fast may skip this and read
    /// Storage only); errors from individual adapters are swallowed into
    /// `BackendUnavailable` at query time rather than failing here, so one
    /// broken adapter doesn't block every other one from preparing.
    pub async fn prepare_adapters(&self, repo_state: &RepoState) {
        for adapter in &self.adapters {
            if let Err(err) = adapter.prepare(repo_state).await {
                tracing::warn!(backend = adapter.backend_id(), error = %err, "adapter prepare failed");
            }
        }
    }

    pub fn adapters_iter(&self) -> impl Iterator<Item = &Arc<dyn Adapter>> {
        self.adapters.iter()
    }

    fn adapters_for(&self, capability: Capability) -> Vec<Arc<dyn Adapter>> {
        self.adapters
            .iter()
            .filter(|a| a.describe().contains(&capability))
            .cloned()
            .collect()
    }

    /// Fan a single `FactQuery` out to every adapter declaring `capability`,
    /// bounded by `MAX_FAN_OUT` concurrent calls and a shared deadline split
    /// proportionally by each adapter's declared cost. Required adapters (the sole provider of the
    /// capability) that fail make the whole operation fail; non-required
    /// failures degrade `completeness` instead.
    pub async fn fan_out(
        &self,
        capability: Capability,
        query: FactQuery,
        total_budget: Duration,
        provenance: &mut ProvenanceBuilder,
    ) -> Result<Vec<ScoredAnswer>, CkbError> {
        let capable = self.adapters_for(capability);
        if capable.is_empty() {
            return Ok(Vec::new());
        }
        let required = capable.len() == 1;
        let total_cost: u64 = capable.iter().map(|a| a.estimated_cost_ms(&query).max(1)).sum();
        let query_deadline = Instant::now() + total_budget;

        let permits = capable.len().min(MAX_FAN_OUT);
        let semaphore = Arc::new(Semaphore::new(permits));
        let mut join_set: JoinSet<(String, Result<(PartialAnswer, crate::adapters::ProvenanceFragment), CkbError>, bool)> =
            JoinSet::new();

        for adapter in capable {
            let semaphore = semaphore.clone();
            let query = query.clone();
            let cost = adapter.estimated_cost_ms(&query).max(1);
            let share = total_budget.mul_f64(cost as f64 / total_cost as f64).max(Duration::from_millis(10));
            let adapter_deadline = (Instant::now() + share).min(query_deadline);
            let backend_id = adapter.backend_id().to_string();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let remaining = adapter_deadline.saturating_duration_since(Instant::now());
                let outcome = tokio::time::timeout(remaining, adapter.answer(&query, adapter_deadline)).await;
                match outcome {
                    Ok(result) => (backend_id, result, false),
                    Err(_) => (
                        backend_id,
                        Err(CkbError::Timeout("adapter timed out".into())),
                        true,
                    ),
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let (backend_id, outcome, timed_out) = joined.map_err(|e| CkbError::Internal(format!("adapter task panicked: {e}")))?;
            match outcome {
                Ok((answer, fragment)) => {
                    provenance.record_success(&backend_id, fragment.capabilities_used.clone(), fragment.duration_ms, required);
                    provenance.set_index_freshness(fragment.index_freshness);
                    results.push(ScoredAnswer { backend_id, answer });
                }
                Err(_) if timed_out => {
                    provenance.record_timeout(&backend_id, &format!("{capability:?}"), required);
                    if required {
                        return Err(CkbError::Timeout(format!("{backend_id} timed out and is required")));
                    }
                }
                Err(err) => {
                    if required {
                        return Err(err);
                    }
                    provenance.record_failure(&backend_id, &err.message(), required);
                }
            }
        }
        Ok(results)
    }

    /// Resolve the current `RepoState` and its id for `mode`.
    pub fn repo_state_for(&self, repo_root: &std::path::Path, mode: RepoStateMode) -> Result<(RepoState, RepoStateId), CkbError> {
        let repo_state = RepoState::compute(repo_root)?;
        let id = repo_state.id(mode);
        Ok((repo_state, id))
    }

    pub(crate) fn new_provenance_builder(&self, repo_state: &RepoState, mode: RepoStateMode) -> ProvenanceBuilder {
        ProvenanceBuilder::new(repo_state.id(mode), repo_state.is_dirty(), mode)
    }

    /// Run `compute` behind the query cache, keyed by `(operation, args,
    /// repo_state_id)`. A hit skips `compute` entirely and rewrites the
    /// returned provenance's `query_duration_ms` to this call's own elapsed
    /// time, with `from_cache` set; a miss caches the freshly sealed result
    /// under its own provenance untouched.
    pub async fn run_cached<T, F, Fut>(
        &self,
        operation: &str,
        args: &impl Serialize,
        repo_state_id: RepoStateId,
        compute: F,
    ) -> Result<CompositeResult<T>, CkbError>
    where
        T: Serialize + DeserializeOwned + Clone,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<CompositeResult<T>, CkbError>>,
    {
        let start = Instant::now();
        let key = CacheKey::new(operation, args, repo_state_id);
        let outcome = self
            .cache
            .get_or_compute(key, || async { compute().await.map_err(|e| ErrorPayload::from(&e)) })
            .await
            .map_err(|e| CkbError::Internal(format!("cache codec error: {e}")))?;
        let was_hit = outcome.was_hit();
        let mut result = outcome.into_inner().map_err(CkbError::from)?;
        if was_hit {
            result.provenance.query_duration_ms = start.elapsed().as_millis() as u64;
            result.provenance.from_cache = true;
        }
        Ok(result)
    }

    /// `get_status`: backend availability, freshness, tier, cache stats.
    pub fn get_status(&self, repo_state: &RepoState, mode: RepoStateMode) -> operations::status::StatusReport {
        operations::status::build_status(self, repo_state, mode)
    }

    /// `doctor`: per-check pass/warn/fail records.
    pub async fn doctor(&self, repo_state: &RepoState) -> Vec<operations::status::DoctorCheck> {
        operations::status::run_doctor(self, repo_state).await
    }

    pub fn jobs_list(&self, status: Option<crate::storage::jobs::JobStatus>, kind: Option<&str>) -> Vec<crate::storage::jobs::Job> {
        let mut jobs = self.jobs.list(status, kind);
        jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        jobs
    }

    pub fn jobs_status(&self, id: uuid::Uuid) -> Option<crate::storage::jobs::Job> {
        self.jobs.status(id)
    }

    pub fn jobs_cancel(&self, id: uuid::Uuid) -> Result<(), CkbError> {
        self.jobs.cancel(id)
    }
}

