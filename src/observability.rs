//! Centralized logging/tracing infrastructure: layered `tracing-subscriber`
//! setup, structured `Operation` events, atomic counters, and a
//! `with_trace_id` span helper.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static QUERY_COUNTER: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNTER: AtomicU64 = AtomicU64::new(0);
static TIMEOUT_COUNTER: AtomicU64 = AtomicU64::new(0);
static CACHE_HIT_COUNTER: AtomicU64 = AtomicU64::new(0);
static CACHE_MISS_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize logging with the project default (warn-level, pretty format).
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with_format(LogLevel::Warn, LogFormat::Pretty)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "error" => LogLevel::Error,
            "info" => LogLevel::Info,
            "debug" => LogLevel::Debug,
            _ => LogLevel::Warn,
        }
    }

    fn filter_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "ckb=warn,error",
            LogLevel::Info => "ckb=info,warn",
            LogLevel::Debug => "ckb=debug,info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initialize logging with an explicit level/format, honoring `RUST_LOG` as
/// an override when set.
pub fn init_logging_with_format(level: LogLevel, format: LogFormat) -> anyhow::Result<()> {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.filter_str()))
    } else {
        EnvFilter::new(level.filter_str())
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true),
            )
            .try_init(),
    };

    match result {
        Ok(()) => {
            info!("ckb observability initialized");
            Ok(())
        }
        // Already initialized (common in tests): not an error.
        Err(_) => Ok(()),
    }
}

/// Structured event kinds emitted by the Engine and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    QueryFannedOut {
        operation: String,
        adapter_count: usize,
    },
    QueryMerged {
        operation: String,
        item_count: usize,
    },
    QuerySealed {
        operation: String,
        completeness: f32,
        duration_ms: u64,
    },
    AdapterTimeout {
        backend_id: String,
        operation: String,
    },
    AdapterFailed {
        backend_id: String,
        operation: String,
        message: String,
    },
    CacheHit {
        operation: String,
    },
    CacheMiss {
        operation: String,
    },
    JobStarted {
        job_id: Uuid,
        kind: String,
    },
    JobFinished {
        job_id: Uuid,
        status: String,
    },
}

impl Operation {
    fn counter_bump(&self) {
        match self {
            Operation::QuerySealed { .. } => {
                QUERY_COUNTER.fetch_add(1, Ordering::Relaxed);
            }
            Operation::AdapterTimeout { .. } => {
                TIMEOUT_COUNTER.fetch_add(1, Ordering::Relaxed);
            }
            Operation::AdapterFailed { .. } => {
                ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
            }
            Operation::CacheHit { .. } => {
                CACHE_HIT_COUNTER.fetch_add(1, Ordering::Relaxed);
            }
            Operation::CacheMiss { .. } => {
                CACHE_MISS_COUNTER.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }
}

/// Log a structured operation event and bump the matching counter.
#[instrument(skip(op), fields(ts = %Utc::now()))]
pub fn log_operation(op: &Operation) {
    op.counter_bump();
    tracing::debug!(?op, "operation");
}

/// Snapshot of the process-wide counters, used by `get_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySnapshot {
    pub queries_sealed: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

pub fn snapshot() -> ObservabilitySnapshot {
    ObservabilitySnapshot {
        queries_sealed: QUERY_COUNTER.load(Ordering::Relaxed),
        errors: ERROR_COUNTER.load(Ordering::Relaxed),
        timeouts: TIMEOUT_COUNTER.load(Ordering::Relaxed),
        cache_hits: CACHE_HIT_COUNTER.load(Ordering::Relaxed),
        cache_misses: CACHE_MISS_COUNTER.load(Ordering::Relaxed),
    }
}

/// Run `fut` inside a span carrying a fresh trace id, for correlating the
/// log lines one Engine operation produces across adapters.
pub async fn with_trace_id<F, T>(name: &'static str, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let trace_id = Uuid::new_v4();
    let span = tracing::info_span!("op", name, %trace_id);
    let _enter = span.enter();
    let start = Instant::now();
    let result = fut.await;
    tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "completed");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_case_insensitively() {
        matches!(LogLevel::parse("DEBUG"), LogLevel::Debug);
    }

    #[test]
    fn snapshot_reflects_counter_bumps() {
        let before = snapshot().cache_hits;
        log_operation(&Operation::CacheHit {
            operation: "get_symbol".into(),
        });
        assert_eq!(snapshot().cache_hits, before + 1);
    }
}
