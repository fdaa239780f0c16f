//! Job table. Storage persists the records; the Job
//! Manager (`crate::jobs`) is the only writer.

use crate::error::CkbError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub kind: String,
    pub scope_description: String,
    pub status: JobStatus,
    pub progress: u8,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Truncated serialized result, kept for later retrieval by job id.
    pub result: Option<String>,
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<Job>,
}

#[derive(Default)]
pub struct JobTable {
    inner: DashMap<Uuid, Job>,
}

impl JobTable {
    pub(crate) async fn load(root: &Path) -> Result<Self, CkbError> {
        let snap: Snapshot = super::load_snapshot(root, "jobs").await?;
        let inner = DashMap::new();
        for job in snap.entries {
            inner.insert(job.id, job);
        }
        Ok(Self { inner })
    }

    pub(crate) async fn snapshot(&self, root: &Path) -> Result<(), CkbError> {
        let entries = self.inner.iter().map(|e| e.value().clone()).collect();
        super::save_snapshot(root, "jobs", &Snapshot { entries }).await
    }

    pub fn upsert(&self, job: Job) {
        self.inner.insert(job.id, job);
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.inner.get(&id).map(|e| e.value().clone())
    }

    /// Newest-first listing, optionally filtered by status or kind.
    pub fn list(&self, status: Option<JobStatus>, kind: Option<&str>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .inner
            .iter()
            .map(|e| e.value().clone())
            .filter(|j| status.map(|s| s == j.status).unwrap_or(true))
            .filter(|j| kind.map(|k| k == j.kind).unwrap_or(true))
            .collect();
        jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));
        jobs
    }
}
