//! Wide-result metric table: an
//! append-only accounting log used to decide when an operation needs a
//! future frontier-mode path.

use crate::error::CkbError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WideResultMetric {
    pub operation: String,
    pub available: usize,
    pub returned: usize,
    pub truncated: usize,
    pub bytes: usize,
    pub tokens: usize,
    pub wall_ms: u64,
}

#[derive(Default, Serialize, Deserialize)]
struct Snapshot {
    entries: Vec<WideResultMetric>,
}

#[derive(Default)]
pub struct MetricsTable {
    inner: RwLock<Vec<WideResultMetric>>,
}

const MAX_RETAINED: usize = 10_000;

impl MetricsTable {
    pub(crate) async fn load(root: &Path) -> Result<Self, CkbError> {
        let snap: Snapshot = super::load_snapshot(root, "metrics").await?;
        Ok(Self {
            inner: RwLock::new(snap.entries),
        })
    }

    pub(crate) async fn snapshot(&self, root: &Path) -> Result<(), CkbError> {
        let entries = self.inner.read().clone();
        super::save_snapshot(root, "metrics", &Snapshot { entries }).await
    }

    pub fn record(&self, metric: WideResultMetric) {
        let mut guard = self.inner.write();
        guard.push(metric);
        if guard.len() > MAX_RETAINED {
            let overflow = guard.len() - MAX_RETAINED;
            guard.drain(0..overflow);
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<WideResultMetric> {
        let guard = self.inner.read();
        guard.iter().rev().take(limit).cloned().collect()
    }

    /// Whether an operation's last recorded call was truncated — the signal
    /// that would drive a future frontier-mode selection.
    pub fn is_wide(&self, operation: &str) -> bool {
        self.inner
            .read()
            .iter()
            .rev()
            .find(|m| m.operation == operation)
            .map(|m| m.truncated > 0)
            .unwrap_or(false)
    }
}
