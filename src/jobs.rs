//! Job Manager: a bounded worker pool for long-running
//! ingestion/refresh work, durable via `storage::jobs`, with cooperative
//! cancellation.

use crate::error::CkbError;
use crate::storage::jobs::{Job, JobStatus, JobTable};
use chrono::Utc;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use uuid::Uuid;

/// A minimal re-implementation of `tokio_util::sync::CancellationToken`'s
/// surface so this crate doesn't need to pull in `tokio-util` for one type;
/// cancellation is a single `Notify`-backed flag shared by clones.
mod cancellation_token {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Clone)]
    pub struct CancellationToken {
        cancelled: Arc<AtomicBool>,
        notify: Arc<Notify>,
    }

    impl CancellationToken {
        pub fn new() -> Self {
            Self {
                cancelled: Arc::new(AtomicBool::new(false)),
                notify: Arc::new(Notify::new()),
            }
        }

        pub fn cancel(&self) {
            self.cancelled.store(true, Ordering::SeqCst);
            self.notify.notify_waiters();
        }

        pub fn is_cancelled(&self) -> bool {
            self.cancelled.load(Ordering::SeqCst)
        }

        pub async fn cancelled(&self) {
            if self.is_cancelled() {
                return;
            }
            self.notify.notified().await;
        }
    }
}
pub use cancellation_token::CancellationToken;

pub struct JobManager {
    table: Arc<JobTable>,
    semaphore: Arc<Semaphore>,
    tokens: Arc<parking_lot::Mutex<HashMap<Uuid, CancellationToken>>>,
    queue_capacity: usize,
    in_flight: Arc<AtomicUsize>,
}

impl JobManager {
    /// `parallelism` bounds concurrent running jobs; the default is one
    /// worker per logical core, via `num_cpus`. The queue (jobs either
    /// running or waiting for a permit) is bounded at `parallelism * 4`; see
    /// `with_queue_capacity` to set it explicitly.
    pub fn new(table: Arc<JobTable>, parallelism: usize) -> Self {
        let parallelism = parallelism.max(1);
        Self::with_queue_capacity(table, parallelism, parallelism * 4)
    }

    pub fn with_default_parallelism(table: Arc<JobTable>) -> Self {
        Self::new(table, num_cpus::get().max(1))
    }

    /// Like `new`, but with an explicit bound on the number of jobs queued
    /// or running at once; `spawn` fails fast with `CkbError::Busy` once
    /// that bound is reached instead of waiting indefinitely.
    pub fn with_queue_capacity(table: Arc<JobTable>, parallelism: usize, queue_capacity: usize) -> Self {
        Self {
            table,
            semaphore: Arc::new(Semaphore::new(parallelism.max(1))),
            tokens: Arc::new(parking_lot::Mutex::new(HashMap::new())),
            queue_capacity: queue_capacity.max(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Enqueue `work` as a job of `kind` with a human-readable
    /// `scope_description`; returns the job id immediately while `work` runs
    /// on a spawned task bounded by the pool's semaphore. Fails fast with
    /// `CkbError::Busy` if the queue is already at capacity rather than
    /// waiting for a free slot.
    pub fn spawn<F, Fut>(&self, kind: impl Into<String>, scope_description: impl Into<String>, work: F) -> Result<Uuid, CkbError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<String, CkbError>> + Send + 'static,
    {
        loop {
            let current = self.in_flight.load(Ordering::SeqCst);
            if current >= self.queue_capacity {
                return Err(CkbError::Busy(format!("job queue is at capacity ({current}/{})", self.queue_capacity)));
            }
            if self
                .in_flight
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }

        let id = Uuid::new_v4();
        let job = Job {
            id,
            kind: kind.into(),
            scope_description: scope_description.into(),
            status: JobStatus::Queued,
            progress: 0,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error: None,
            result: None,
        };
        self.table.upsert(job);

        let token = CancellationToken::new();
        self.tokens.lock().insert(id, token.clone());

        let table = self.table.clone();
        let semaphore = self.semaphore.clone();
        let in_flight = self.in_flight.clone();
        tokio::spawn(async move {
            if let Ok(_permit) = semaphore.acquire_owned().await {
                if let Some(mut job) = table.get(id) {
                    job.status = JobStatus::Running;
                    job.started_at = Some(Utc::now());
                    table.upsert(job);
                }

                let outcome = work(token).await;

                if let Some(mut job) = table.get(id) {
                    job.finished_at = Some(Utc::now());
                    match outcome {
                        Ok(result) => {
                            job.status = JobStatus::Completed;
                            job.progress = 100;
                            job.result = Some(result.chars().take(4096).collect());
                        }
                        Err(err) => {
                            job.status = JobStatus::Failed;
                            job.error = Some(err.message());
                        }
                    }
                    table.upsert(job);
                }
            }
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(id)
    }

    pub fn status(&self, id: Uuid) -> Option<Job> {
        self.table.get(id)
    }

    pub fn list(&self, status: Option<JobStatus>, kind: Option<&str>) -> Vec<Job> {
        self.table.list(status, kind)
    }

    /// Cooperative cancel: flips the token and marks the job `Cancelled` if
    /// it hasn't already finished. The spawned task is responsible for
    /// polling `token.cancelled()` at safe points.
    pub fn cancel(&self, id: Uuid) -> Result<(), CkbError> {
        let token = self
            .tokens
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| CkbError::NotFound(format!("no job {id}")))?;
        token.cancel();
        if let Some(mut job) = self.table.get(id) {
            if matches!(job.status, JobStatus::Queued | JobStatus::Running) {
                job.status = JobStatus::Cancelled;
                job.finished_at = Some(Utc::now());
                self.table.upsert(job);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_job_completes_and_is_listable() {
        let tmp = tempfile::tempdir().unwrap();
        let table = Arc::new(JobTable::load(tmp.path()).await.unwrap());
        let manager = JobManager::new(table, 2);

        let id = manager.spawn("reindex", "full reindex", |_token| async { Ok("ok".to_string()) }).unwrap();
        for _ in 0..50 {
            if matches!(manager.status(id).map(|j| j.status), Some(JobStatus::Completed)) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let job = manager.status(id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(manager.list(Some(JobStatus::Completed), None).len(), 1);
    }

    #[tokio::test]
    async fn cancel_marks_queued_job_cancelled() {
        let tmp = tempfile::tempdir().unwrap();
        let table = Arc::new(JobTable::load(tmp.path()).await.unwrap());
        let manager = JobManager::new(table, 0);

        let id = manager
            .spawn("reindex", "full reindex", |token| async move {
                token.cancelled().await;
                Ok("cancelled-early".to_string())
            })
            .unwrap();
        manager.cancel(id).unwrap();
        let job = manager.status(id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn spawn_fails_busy_once_queue_capacity_is_reached() {
        let tmp = tempfile::tempdir().unwrap();
        let table = Arc::new(JobTable::load(tmp.path()).await.unwrap());
        let manager = JobManager::with_queue_capacity(table, 1, 1);

        let _first = manager
            .spawn("reindex", "full reindex", |token| async move {
                token.cancelled().await;
                Ok("done".to_string())
            })
            .unwrap();

        let second = manager.spawn("reindex", "full reindex", |_token| async { Ok("done".to_string()) });
        assert!(matches!(second, Err(CkbError::Busy(_))));
    }
}
