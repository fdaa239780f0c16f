//! `compare_api`.

use crate::adapters::{Capability, FactQuery};
use crate::engine::provenance::CompositeResult;
use crate::engine::{Engine, DEFAULT_QUERY_BUDGET};
use crate::error::CkbError;
use crate::repo_state::RepoState;
use crate::types::{RepoStateMode, Symbol, Visibility};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSeverity {
    Breaking,
    Warning,
    Additive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemverAdvice {
    Major,
    Minor,
    Patch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiChange {
    pub stable_id: String,
    pub severity: ChangeSeverity,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareApiFacts {
    pub changes: Vec<ApiChange>,
    pub semver_advice: SemverAdvice,
}

/// Diffs a caller-supplied base API snapshot against the symbols currently
/// resolvable at `repo_state`. Signature comparison uses
/// `signature_normalized`; exact cross-language normalization rules are
/// each adapter's own contract; this operation only requires that
/// equal-meaning signatures normalize equal within one adapter's output.
pub async fn compare_api(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    base_symbols: &[Symbol],
    include_minor: bool,
    ignore_private: bool,
) -> Result<CompositeResult<CompareApiFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let args = (base_symbols, include_minor, ignore_private);
    engine
        .run_cached("compare_api", &args, repo_state_id, || {
            compare_api_inner(engine, repo_state, mode, base_symbols, include_minor, ignore_private)
        })
        .await
}

async fn compare_api_inner(
    engine: &Engine,
    repo_state: &RepoState,
    mode: RepoStateMode,
    base_symbols: &[Symbol],
    include_minor: bool,
    ignore_private: bool,
) -> Result<CompositeResult<CompareApiFacts>, CkbError> {
    let repo_state_id = repo_state.id(mode);
    let mut provenance = engine.new_provenance_builder(repo_state, mode);

    let answers = engine
        .fan_out(Capability::ResolveSymbol, FactQuery::SearchSymbols { query: String::new(), limit: 100_000 }, DEFAULT_QUERY_BUDGET, &mut provenance)
        .await?;
    let target_symbols = crate::engine::merge::merge_symbols(&answers);
    let current: Vec<Symbol> = if target_symbols.is_empty() {
        engine.facts().store().symbols.all_for_repo_state(repo_state_id)
    } else {
        target_symbols
    };

    let (changes, semver_advice) = diff_symbols(base_symbols, &current, include_minor, ignore_private);

    let sealed = provenance.seal();
    Ok(CompositeResult::new(CompareApiFacts { changes, semver_advice }, Vec::new(), sealed))
}

/// Classify every base/current symbol pair into `Breaking`/`Warning`/
/// `Additive` changes and derive an overall semver recommendation. Kept
/// free of `Engine` so it can be exercised directly in tests.
fn diff_symbols(base_symbols: &[Symbol], current: &[Symbol], include_minor: bool, ignore_private: bool) -> (Vec<ApiChange>, SemverAdvice) {
    let base_by_id: HashMap<&str, &Symbol> = base_symbols.iter().map(|s| (s.stable_id.as_str(), s)).collect();
    let current_by_id: HashMap<&str, &Symbol> = current.iter().map(|s| (s.stable_id.as_str(), s)).collect();

    let mut changes = Vec::new();
    for (id, base_symbol) in &base_by_id {
        if ignore_private && base_symbol.visibility != Visibility::Public {
            continue;
        }
        match current_by_id.get(id) {
            None => changes.push(ApiChange {
                stable_id: id.to_string(),
                severity: ChangeSeverity::Breaking,
                old_value: Some(base_symbol.signature_normalized.clone()),
                new_value: None,
            }),
            Some(current_symbol) => {
                if current_symbol.signature_normalized != base_symbol.signature_normalized {
                    changes.push(ApiChange {
                        stable_id: id.to_string(),
                        severity: ChangeSeverity::Breaking,
                        old_value: Some(base_symbol.signature_normalized.clone()),
                        new_value: Some(current_symbol.signature_normalized.clone()),
                    });
                } else if current_symbol.documentation != base_symbol.documentation && include_minor {
                    changes.push(ApiChange {
                        stable_id: id.to_string(),
                        severity: ChangeSeverity::Warning,
                        old_value: base_symbol.documentation.clone(),
                        new_value: current_symbol.documentation.clone(),
                    });
                }
            }
        }
    }
    for (id, current_symbol) in &current_by_id {
        if ignore_private && current_symbol.visibility != Visibility::Public {
            continue;
        }
        if !base_by_id.contains_key(id) {
            changes.push(ApiChange {
                stable_id: id.to_string(),
                severity: ChangeSeverity::Additive,
                old_value: None,
                new_value: Some(current_symbol.signature_normalized.clone()),
            });
        }
    }

    changes.sort_by(|a, b| a.stable_id.cmp(&b.stable_id));
    let semver_advice = if changes.iter().any(|c| c.severity == ChangeSeverity::Breaking) {
        SemverAdvice::Major
    } else if changes.iter().any(|c| c.severity == ChangeSeverity::Additive) {
        SemverAdvice::Minor
    } else {
        SemverAdvice::Patch
    };
    (changes, semver_advice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Confidence, Location, RepoStateId, SymbolKind};

    fn symbol(id: &str, signature: &str, visibility: Visibility) -> Symbol {
        Symbol {
            repo_state_id: RepoStateId::from_hash(1),
            stable_id: crate::types::StableId::new(id).unwrap(),
            name: id.to_string(),
            kind: SymbolKind::Function,
            signature: signature.to_string(),
            signature_normalized: signature.to_string(),
            module_id: "m".to_string(),
            location: Location::point("src/lib.rs", 1, 0),
            container_name: None,
            documentation: None,
            modifiers: Vec::new(),
            visibility,
            visibility_confidence: Confidence::new(1.0),
        }
    }

    #[test]
    fn removed_public_symbol_is_breaking() {
        let base = vec![symbol("a::f", "fn f()", Visibility::Public)];
        let (changes, advice) = diff_symbols(&base, &[], false, false);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].severity, ChangeSeverity::Breaking);
        assert_eq!(advice, SemverAdvice::Major);
    }

    #[test]
    fn new_public_symbol_is_additive_when_no_breaking_changes() {
        let current = vec![symbol("a::g", "fn g()", Visibility::Public)];
        let (changes, advice) = diff_symbols(&[], &current, false, false);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].severity, ChangeSeverity::Additive);
        assert_eq!(advice, SemverAdvice::Minor);
    }

    #[test]
    fn changed_signature_is_breaking_even_with_new_symbols_present() {
        let base = vec![symbol("a::f", "fn f()", Visibility::Public)];
        let current = vec![symbol("a::f", "fn f(x: i32)", Visibility::Public), symbol("a::g", "fn g()", Visibility::Public)];
        let (changes, advice) = diff_symbols(&base, &current, false, false);
        assert_eq!(changes.len(), 2);
        assert_eq!(advice, SemverAdvice::Major);
    }

    #[test]
    fn ignore_private_skips_non_public_symbols_on_both_sides() {
        let base = vec![symbol("a::hidden", "fn hidden()", Visibility::Private)];
        let current = vec![symbol("a::hidden2", "fn hidden2()", Visibility::Private)];
        let (changes, advice) = diff_symbols(&base, &current, false, true);
        assert!(changes.is_empty());
        assert_eq!(advice, SemverAdvice::Patch);
    }

    #[test]
    fn unchanged_signature_with_no_doc_change_produces_no_change() {
        let base = vec![symbol("a::f", "fn f()", Visibility::Public)];
        let current = vec![symbol("a::f", "fn f()", Visibility::Public)];
        let (changes, advice) = diff_symbols(&base, &current, true, false);
        assert!(changes.is_empty());
        assert_eq!(advice, SemverAdvice::Patch);
    }
}
