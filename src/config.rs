//! Config & Repo Registry, config half: layered
//! `flag > env > file > default` resolution producing one `Config` document
//! covering tier, backend toggles, cache TTLs, budgets, and privacy.

use crate::error::CkbError;
use crate::observability::{LogFormat, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Answer only from what's already merged into Storage; never block on
    /// a live adapter fetch.
    Fast,
    /// Allow bounded live adapter fan-out under the query deadline.
    Thorough,
}

impl Tier {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fast" => Some(Self::Fast),
            "thorough" => Some(Self::Thorough),
            _ => None,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Self::Thorough
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendToggles {
    pub scip: bool,
    pub lsp: bool,
    pub git: bool,
    pub tree_sitter: bool,
    pub telemetry: bool,
}

impl Default for BackendToggles {
    fn default() -> Self {
        Self {
            scip: true,
            lsp: true,
            git: true,
            tree_sitter: true,
            telemetry: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub query_ttl_secs: u64,
    pub view_ttl_secs: u64,
    pub negative_ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            query_ttl_secs: 300,
            view_ttl_secs: 60,
            negative_ttl_secs: 15,
            max_entries: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub max_modules: usize,
    pub max_symbols_per_module: usize,
    pub max_impact_items: usize,
    pub max_tokens: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_modules: 200,
            max_symbols_per_module: 500,
            max_impact_items: 500,
            max_tokens: 8_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4848,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrivacyConfig {
    /// When true, the telemetry adapter and any other network-reaching
    /// backend stays disabled regardless of its own toggle.
    pub privacy_mode: bool,
    pub telemetry_enable: bool,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub repo_path: PathBuf,
    pub tier: Tier,
    pub backends: BackendToggles,
    pub cache: CacheConfig,
    pub budgets: BudgetConfig,
    pub daemon: DaemonConfig,
    pub logging: LoggingConfig,
    pub privacy: PrivacyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repo_path: PathBuf::from("."),
            tier: Tier::default(),
            backends: BackendToggles::default(),
            cache: CacheConfig::default(),
            budgets: BudgetConfig::default(),
            daemon: DaemonConfig::default(),
            logging: LoggingConfig::default(),
            privacy: PrivacyConfig::default(),
        }
    }
}

/// Flag overrides an operator can apply on top of env/file/default, mirroring
/// whatever subset of `Config` a CLI invocation actually specified.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub repo_path: Option<PathBuf>,
    pub tier: Option<Tier>,
    pub log_level: Option<String>,
}

impl Config {
    /// `.ckb/config.toml` under `repo_root`, the on-disk layer.
    pub fn file_path(repo_root: &Path) -> PathBuf {
        repo_root.join(".ckb").join("config.toml")
    }

    fn from_file(repo_root: &Path) -> Config {
        let path = Self::file_path(repo_root);
        std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("CKB_REPO_PATH") {
            self.repo_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CKB_TIER") {
            if let Some(tier) = Tier::parse(&v) {
                self.tier = tier;
            }
        }
        if let Ok(v) = std::env::var("CKB_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Ok(v) = std::env::var("CKB_LOG_FORMAT") {
            self.logging.format = v;
        }
        if let Ok(v) = std::env::var("CKB_CACHE_QUERY_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.cache.query_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("CKB_CACHE_VIEW_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.cache.view_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("CKB_CACHE_NEGATIVE_TTL_SECS") {
            if let Ok(n) = v.parse() {
                self.cache.negative_ttl_secs = n;
            }
        }
        if let Ok(v) = std::env::var("CKB_CACHE_MAX_ENTRIES") {
            if let Ok(n) = v.parse() {
                self.cache.max_entries = n;
            }
        }
        if let Ok(v) = std::env::var("CKB_MAX_MODULES") {
            if let Ok(n) = v.parse() {
                self.budgets.max_modules = n;
            }
        }
        if let Ok(v) = std::env::var("CKB_MAX_SYMBOLS_PER_MODULE") {
            if let Ok(n) = v.parse() {
                self.budgets.max_symbols_per_module = n;
            }
        }
        if let Ok(v) = std::env::var("CKB_MAX_IMPACT_ITEMS") {
            if let Ok(n) = v.parse() {
                self.budgets.max_impact_items = n;
            }
        }
        if let Ok(v) = std::env::var("CKB_MAX_TOKENS") {
            if let Ok(n) = v.parse() {
                self.budgets.max_tokens = n;
            }
        }
        if let Ok(v) = std::env::var("CKB_BACKEND_SCIP") {
            self.backends.scip = v == "true";
        }
        if let Ok(v) = std::env::var("CKB_BACKEND_LSP") {
            self.backends.lsp = v == "true";
        }
        if let Ok(v) = std::env::var("CKB_BACKEND_GIT") {
            self.backends.git = v == "true";
        }
        if let Ok(v) = std::env::var("CKB_BACKEND_TREE_SITTER") {
            self.backends.tree_sitter = v == "true";
        }
        if let Ok(v) = std::env::var("CKB_BACKEND_TELEMETRY") {
            self.backends.telemetry = v == "true";
        }
        if let Ok(v) = std::env::var("CKB_DAEMON_HOST") {
            self.daemon.host = v;
        }
        if let Ok(v) = std::env::var("CKB_DAEMON_PORT") {
            if let Ok(n) = v.parse() {
                self.daemon.port = n;
            }
        }
        if let Ok(v) = std::env::var("CKB_TELEMETRY_ENABLE") {
            self.privacy.telemetry_enable = v == "true";
        }
        if let Ok(v) = std::env::var("CKB_PRIVACY_MODE") {
            self.privacy.privacy_mode = v == "true";
        }
        if let Ok(v) = std::env::var("CKB_AUTH_TOKEN") {
            self.privacy.auth_token = Some(v);
        }
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(repo_path) = &overrides.repo_path {
            self.repo_path = repo_path.clone();
        }
        if let Some(tier) = overrides.tier {
            self.tier = tier;
        }
        if let Some(level) = &overrides.log_level {
            self.logging.level = level.clone();
        }
        if self.privacy.privacy_mode {
            self.backends.telemetry = false;
            self.privacy.telemetry_enable = false;
        }
    }

    /// Resolve the layered config for `repo_root`: default, then file,
    /// then env, then explicit flag overrides.
    pub fn load(repo_root: &Path, overrides: ConfigOverrides) -> Result<Self, CkbError> {
        let mut config = Self::from_file(repo_root);
        if config.repo_path == PathBuf::from(".") {
            config.repo_path = repo_root.to_path_buf();
        }
        config.apply_env();
        config.apply_overrides(&overrides);
        Ok(config)
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::parse(&self.logging.level)
    }

    pub fn log_format(&self) -> LogFormat {
        LogFormat::parse(&self.logging.format)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.repo_path.join(".ckb").join("store")
    }
}

/// Resolve the active repository path. Priority: a `--repo-name` lookup in
/// the Repo Registry, an explicit `--repo` flag, `CKB_REPO_PATH`, the
/// registry's default entry, then the current working directory.
pub fn resolve_repo_path(flag: Option<&Path>, repo_name: Option<&str>) -> Result<PathBuf, CkbError> {
    if let Some(name) = repo_name {
        let registry = crate::registry::Registry::open_default()?;
        let entry = registry
            .get(name)
            .ok_or_else(|| CkbError::NotFound(format!("no registered repo named '{name}'")))?;
        return Ok(entry.path.clone());
    }
    if let Some(flag) = flag {
        return Ok(flag.to_path_buf());
    }
    if let Ok(v) = std::env::var("CKB_REPO_PATH") {
        return Ok(PathBuf::from(v));
    }
    if let Ok(registry) = crate::registry::Registry::open_default() {
        if let Some(entry) = registry.resolve(None) {
            return Ok(entry.path.clone());
        }
    }
    std::env::current_dir().map_err(|e| CkbError::Internal(format!("resolving current directory: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_thorough_tier_and_all_backends_on_except_telemetry() {
        let config = Config::default();
        assert_eq!(config.tier, Tier::Thorough);
        assert!(config.backends.git);
        assert!(!config.backends.telemetry);
    }

    #[test]
    fn privacy_mode_forces_telemetry_off() {
        let mut config = Config::default();
        config.privacy.privacy_mode = true;
        config.backends.telemetry = true;
        config.apply_overrides(&ConfigOverrides::default());
        assert!(!config.backends.telemetry);
    }

    #[test]
    fn env_override_changes_tier() {
        std::env::set_var("CKB_TIER", "fast");
        let mut config = Config::default();
        config.apply_env();
        std::env::remove_var("CKB_TIER");
        assert_eq!(config.tier, Tier::Fast);
    }

    #[test]
    fn explicit_flag_wins_over_env_repo_path() {
        std::env::set_var("CKB_REPO_PATH", "/from/env");
        let resolved = resolve_repo_path(Some(Path::new("/from/flag")), None).unwrap();
        std::env::remove_var("CKB_REPO_PATH");
        assert_eq!(resolved, PathBuf::from("/from/flag"));
    }

    #[test]
    fn unknown_repo_name_is_not_found() {
        std::env::set_var("XDG_CONFIG_HOME", std::env::temp_dir().join("ckb-config-test-missing-name"));
        let result = resolve_repo_path(None, Some("does-not-exist"));
        std::env::remove_var("XDG_CONFIG_HOME");
        assert!(result.is_err());
    }
}
