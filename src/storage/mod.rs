//! Storage: the embedded relational store holding the
//! merged symbol graph, references, call edges, file/module metadata,
//! telemetry, wide-result metrics, and job state.
//!
//! An in-memory index (`dashmap`/`parking_lot` rather than `RwLock<HashMap>`,
//! since every table here is read far more than it is written) backed by
//! periodic `bincode` + `zstd` snapshots under a data directory, rather than
//! a SQL engine. Storage exclusively owns every persistent entity.

pub mod commits;
pub mod files;
pub mod jobs;
pub mod metrics;
pub mod modules;
pub mod references;
pub mod symbols;

use crate::error::CkbError;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

/// The aggregate Storage handle. One instance is opened per process per
/// repository; the Engine singleton holds it.
pub struct Store {
    root: PathBuf,
    pub symbols: symbols::SymbolTable,
    pub references: references::ReferenceTable,
    pub files: files::FileTable,
    pub modules: modules::ModuleTable,
    pub commits: commits::CommitTable,
    pub jobs: jobs::JobTable,
    pub metrics: metrics::MetricsTable,
}

impl Store {
    /// Open (creating if absent) the store directory and load any snapshots.
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self, CkbError> {
        let root = data_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| CkbError::Internal(format!("failed to create store dir: {e}")))?;

        let symbols = symbols::SymbolTable::load(&root).await?;
        let references = references::ReferenceTable::load(&root).await?;
        let files = files::FileTable::load(&root).await?;
        let modules = modules::ModuleTable::load(&root).await?;
        let commits = commits::CommitTable::load(&root).await?;
        let jobs = jobs::JobTable::load(&root).await?;
        let metrics = metrics::MetricsTable::load(&root).await?;

        Ok(Self {
            root,
            symbols,
            references,
            files,
            modules,
            commits,
            jobs,
            metrics,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Force every table to snapshot to disk. Writes are serialized per
    /// table behind its own lock; there is a single logical writer per table.
    pub async fn sync(&self) -> Result<(), CkbError> {
        self.symbols.snapshot(&self.root).await?;
        self.references.snapshot(&self.root).await?;
        self.files.snapshot(&self.root).await?;
        self.modules.snapshot(&self.root).await?;
        self.commits.snapshot(&self.root).await?;
        self.jobs.snapshot(&self.root).await?;
        self.metrics.snapshot(&self.root).await?;
        Ok(())
    }
}

/// Shared snapshot helpers used by every table module: a `bincode`-encoded,
/// `zstd`-compressed blob at `<root>/<name>.bin.zst`.
pub(crate) async fn save_snapshot<T: Serialize + Sync>(
    root: &Path,
    name: &str,
    value: &T,
) -> Result<(), CkbError> {
    let encoded = bincode::serialize(value)
        .map_err(|e| CkbError::Internal(format!("snapshot encode failed for {name}: {e}")))?;
    let compressed = zstd::encode_all(encoded.as_slice(), 3)
        .map_err(|e| CkbError::Internal(format!("snapshot compress failed for {name}: {e}")))?;
    let path = root.join(format!("{name}.bin.zst"));
    tokio::fs::write(&path, compressed)
        .await
        .map_err(|e| CkbError::Internal(format!("snapshot write failed for {name}: {e}")))?;
    Ok(())
}

pub(crate) async fn load_snapshot<T: DeserializeOwned + Default>(
    root: &Path,
    name: &str,
) -> Result<T, CkbError> {
    let path = root.join(format!("{name}.bin.zst"));
    if !path.exists() {
        return Ok(T::default());
    }
    let compressed = tokio::fs::read(&path)
        .await
        .map_err(|e| CkbError::Internal(format!("snapshot read failed for {name}: {e}")))?;
    let decoded = zstd::decode_all(compressed.as_slice())
        .map_err(|e| CkbError::Internal(format!("snapshot decompress failed for {name}: {e}")))?;
    bincode::deserialize(&decoded)
        .map_err(|e| CkbError::Internal(format!("snapshot decode failed for {name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(tmp.path().join("store")).await.unwrap();
        assert!(store.root().exists());
    }

    #[tokio::test]
    async fn snapshot_roundtrips_empty_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(tmp.path().join("store")).await.unwrap();
        store.sync().await.unwrap();
        let reopened = Store::open(tmp.path().join("store")).await.unwrap();
        assert_eq!(reopened.symbols.len(), 0);
    }
}
