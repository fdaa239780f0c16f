//! Core data model: Symbol, Reference, CallEdge, File, Module,
//! CommitTouch, plus small validated newtypes following a
//! validate-on-construct pattern for identifiers and paths.

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identity for a repository working-tree state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoStateId(u128);

impl RepoStateId {
    pub fn from_hash(hash: u128) -> Self {
        Self(hash)
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for RepoStateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// `head` ignores uncommitted edits (cacheable); `full` includes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepoStateMode {
    Head,
    Full,
}

impl fmt::Display for RepoStateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepoStateMode::Head => write!(f, "head"),
            RepoStateMode::Full => write!(f, "full"),
        }
    }
}

/// A canonical, per-language fully-qualified symbol identity. Opaque to the
/// Engine beyond equality/ordering; adapters own the encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StableId(String);

impl StableId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        ensure!(!id.is_empty(), "stable id cannot be empty");
        ensure!(id.len() < 4096, "stable id too long");
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A call-graph/trace depth clamped to the spec's bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depth(u8);

impl Depth {
    pub fn new(value: u8, max: u8) -> Result<Self> {
        ensure!(value >= 1, "depth must be >= 1");
        ensure!(value <= max, "depth must be <= {}", max);
        Ok(Self(value))
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

/// Token-budget target for one Engine operation, in approximate tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBudget(u32);

impl TokenBudget {
    pub fn new(tokens: u32) -> Self {
        Self(tokens.max(256))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self(8_000)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Variable,
    Constant,
    Field,
    Module,
    Macro,
    Other,
}

impl SymbolKind {
    /// Ranking priority used by `search_symbols` (type > function > method > …).
    pub fn priority(&self) -> u8 {
        match self {
            SymbolKind::Type => 7,
            SymbolKind::Interface => 6,
            SymbolKind::Class => 6,
            SymbolKind::Function => 5,
            SymbolKind::Method => 4,
            SymbolKind::Macro => 3,
            SymbolKind::Constant => 2,
            SymbolKind::Field => 2,
            SymbolKind::Variable => 1,
            SymbolKind::Module => 1,
            SymbolKind::Other => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Package,
    Protected,
    Unknown,
}

impl Visibility {
    /// Weight used by `search_symbols` ranking (public > package > private).
    pub fn weight(&self) -> u8 {
        match self {
            Visibility::Public => 3,
            Visibility::Package => 2,
            Visibility::Protected => 2,
            Visibility::Private => 1,
            Visibility::Unknown => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    Read,
    Write,
    Call,
    Import,
    Inherit,
    Implement,
    Other,
}

/// A source location relative to a `File`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file_id: String,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl Location {
    pub fn point(file_id: impl Into<String>, line: u32, col: u32) -> Self {
        Self {
            file_id: file_id.into(),
            start_line: line,
            start_col: col,
            end_line: line,
            end_col: col,
        }
    }
}

/// Confidence paired with the fact it qualifies, in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence(f32);

impl Confidence {
    pub fn new(value: f32) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    pub fn get(&self) -> f32 {
        self.0
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self(0.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub repo_state_id: RepoStateId,
    pub stable_id: StableId,
    pub name: String,
    pub kind: SymbolKind,
    pub signature: String,
    pub signature_normalized: String,
    pub module_id: String,
    pub location: Location,
    pub container_name: Option<String>,
    pub documentation: Option<String>,
    pub modifiers: Vec<String>,
    pub visibility: Visibility,
    pub visibility_confidence: Confidence,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reference {
    pub from_location: Location,
    pub to_stable_id: StableId,
    pub kind: ReferenceKind,
    pub is_test: bool,
}

impl Reference {
    /// Dedup key used when unioning references merged from multiple backends.
    pub fn dedup_key(&self) -> (Location, StableId, ReferenceKind) {
        (self.from_location.clone(), self.to_stable_id.clone(), self.kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEdge {
    pub reference: Reference,
    pub call_site_expr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub path: String,
    pub language: String,
    pub byte_size: u64,
    pub line_count: u32,
    pub last_modified_commit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub id: String,
    pub name: String,
    pub language: String,
    pub root_path: String,
    pub file_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitTouch {
    pub commit_id: String,
    pub author: String,
    pub time: chrono::DateTime<chrono::Utc>,
    pub file_id: String,
    pub additions: u32,
    pub deletions: u32,
}

/// File hash stable enough to serve as a `File::id`.
pub fn file_id_for_path(repo_relative_path: &str) -> String {
    format!("{:016x}", xxhash_rust::xxh3::xxh3_64(repo_relative_path.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_id_rejects_empty() {
        assert!(StableId::new("").is_err());
    }

    #[test]
    fn depth_clamps_to_spec_bounds() {
        assert!(Depth::new(5, 4).is_err());
        assert!(Depth::new(0, 4).is_err());
        assert!(Depth::new(4, 4).is_ok());
    }

    #[test]
    fn confidence_clamps_into_unit_interval() {
        assert_eq!(Confidence::new(1.5).get(), 1.0);
        assert_eq!(Confidence::new(-0.5).get(), 0.0);
    }

    #[test]
    fn file_id_is_stable() {
        assert_eq!(file_id_for_path("src/a.rs"), file_id_for_path("src/a.rs"));
        assert_ne!(file_id_for_path("src/a.rs"), file_id_for_path("src/b.rs"));
    }

    #[test]
    fn symbol_kind_priority_orders_type_above_variable() {
        assert!(SymbolKind::Type.priority() > SymbolKind::Variable.priority());
    }
}
