//! Repo Registry: a process-wide JSON document mapping human-chosen names
//! to repository paths, stored alongside the on-disk metadata conventions
//! `git::types::RepositoryMetadata` already follows.

use crate::error::CkbError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub path: PathBuf,
    pub added_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    repos: HashMap<String, RegistryEntry>,
}

pub struct Registry {
    path: PathBuf,
    document: RegistryDocument,
}

/// `~/.config/ckb/registry.json`, honoring `XDG_CONFIG_HOME`.
pub fn default_registry_path() -> PathBuf {
    let config_home = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            std::env::var("HOME")
                .map(|home| PathBuf::from(home).join(".config"))
                .unwrap_or_else(|_| PathBuf::from(".config"))
        });
    config_home.join("ckb").join("registry.json")
}

impl Registry {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CkbError> {
        let path = path.into();
        let document = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        Ok(Self { path, document })
    }

    pub fn open_default() -> Result<Self, CkbError> {
        Self::open(default_registry_path())
    }

    fn save(&self) -> Result<(), CkbError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CkbError::Internal(format!("failed to create registry dir: {e}")))?;
        }
        let encoded = serde_json::to_string_pretty(&self.document)
            .map_err(|e| CkbError::Internal(format!("failed to encode registry: {e}")))?;
        std::fs::write(&self.path, encoded)
            .map_err(|e| CkbError::Internal(format!("failed to write registry: {e}")))
    }

    pub fn add(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Result<(), CkbError> {
        let name = name.into();
        let is_first = self.document.repos.is_empty();
        self.document.repos.insert(
            name.clone(),
            RegistryEntry {
                path: path.into(),
                added_at: Utc::now(),
                last_used_at: None,
            },
        );
        if is_first {
            self.document.default = Some(name);
        }
        self.save()
    }

    pub fn remove(&mut self, name: &str) -> Result<(), CkbError> {
        self.document.repos.remove(name);
        if self.document.default.as_deref() == Some(name) {
            self.document.default = self.document.repos.keys().next().cloned();
        }
        self.save()
    }

    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.document.repos.get(name)
    }

    pub fn resolve(&self, name: Option<&str>) -> Option<&RegistryEntry> {
        match name {
            Some(name) => self.get(name),
            None => self.document.default.as_deref().and_then(|d| self.get(d)),
        }
    }

    pub fn set_default(&mut self, name: &str) -> Result<(), CkbError> {
        if !self.document.repos.contains_key(name) {
            return Err(CkbError::NotFound(format!("no registered repo named {name}")));
        }
        self.document.default = Some(name.to_string());
        self.save()
    }

    pub fn touch(&mut self, name: &str) -> Result<(), CkbError> {
        if let Some(entry) = self.document.repos.get_mut(name) {
            entry.last_used_at = Some(Utc::now());
        }
        self.save()
    }

    pub fn list(&self) -> Vec<(String, RegistryEntry)> {
        let mut entries: Vec<_> = self
            .document
            .repos
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_added_repo_becomes_default() {
        let tmp = tempfile::tempdir().unwrap();
        let mut registry = Registry::open(tmp.path().join("registry.json")).unwrap();
        registry.add("alpha", "/repos/alpha").unwrap();
        assert_eq!(registry.resolve(None).unwrap().path, PathBuf::from("/repos/alpha"));
    }

    #[test]
    fn removing_default_falls_back_to_another_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let mut registry = Registry::open(tmp.path().join("registry.json")).unwrap();
        registry.add("alpha", "/repos/alpha").unwrap();
        registry.add("beta", "/repos/beta").unwrap();
        registry.set_default("alpha").unwrap();
        registry.remove("alpha").unwrap();
        assert_eq!(registry.resolve(None).unwrap().path, PathBuf::from("/repos/beta"));
    }

    #[test]
    fn reopen_persists_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("registry.json");
        {
            let mut registry = Registry::open(&path).unwrap();
            registry.add("alpha", "/repos/alpha").unwrap();
        }
        let reopened = Registry::open(&path).unwrap();
        assert!(reopened.get("alpha").is_some());
    }
}
