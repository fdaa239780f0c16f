//! Benchmarks for the Query Engine's hot path: ranking, budget truncation,
//! and cross-backend merge, at symbol counts representative of a
//! medium-sized repository.

use ckb::engine::budget::truncate_to_budget;
use ckb::engine::merge::{merge_symbols, ScoredAnswer};
use ckb::engine::provenance::ProvenanceBuilder;
use ckb::engine::ranking::sort_by_rank_then_id;
use ckb::types::{Confidence, Location, RepoStateId, RepoStateMode, StableId, Symbol, SymbolKind, TokenBudget, Visibility};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn make_symbol(repo_state: RepoStateId, index: usize) -> Symbol {
    Symbol {
        repo_state_id: repo_state,
        stable_id: StableId::new(format!("bench::symbol_{index}")).unwrap(),
        name: format!("symbol_{index}"),
        kind: SymbolKind::Function,
        signature: format!("fn symbol_{index}()"),
        signature_normalized: format!("fn symbol_{index}()"),
        module_id: "bench".to_string(),
        location: Location::point(format!("src/bench_{}.rs", index % 50), (index % 400) as u32 + 1, 0),
        container_name: None,
        documentation: None,
        modifiers: Vec::new(),
        visibility: Visibility::Public,
        visibility_confidence: Confidence::new(0.9),
    }
}

fn bench_ranking(c: &mut Criterion) {
    let repo_state = RepoStateId::from_hash(1);
    let mut group = c.benchmark_group("sort_by_rank_then_id");
    for size in [100usize, 1_000, 10_000] {
        let symbols: Vec<Symbol> = (0..size).map(|i| make_symbol(repo_state, i)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &symbols, |b, symbols| {
            b.iter(|| {
                let mut items = symbols.clone();
                sort_by_rank_then_id(&mut items, |s| s.visibility.weight() as f32, |s| &s.stable_id);
                black_box(&items);
            });
        });
    }
    group.finish();
}

fn bench_truncate_to_budget(c: &mut Criterion) {
    let repo_state = RepoStateId::from_hash(1);
    let mut group = c.benchmark_group("truncate_to_budget");
    for size in [100usize, 1_000, 10_000] {
        let symbols: Vec<Symbol> = (0..size).map(|i| make_symbol(repo_state, i)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &symbols, |b, symbols| {
            b.iter(|| {
                let mut provenance = ProvenanceBuilder::new(repo_state, false, RepoStateMode::Head);
                let kept = truncate_to_budget(
                    symbols.clone(),
                    TokenBudget::new(20_000),
                    0,
                    |s| (s.signature.len() as u32 / 4).max(1),
                    "symbols",
                    &mut provenance,
                );
                black_box(kept);
            });
        });
    }
    group.finish();
}

fn bench_merge_symbols(c: &mut Criterion) {
    let repo_state = RepoStateId::from_hash(1);
    let mut group = c.benchmark_group("merge_symbols");
    for backend_count in [2usize, 4, 8] {
        let answers: Vec<ScoredAnswer> = (0..backend_count)
            .map(|backend_index| {
                let mut answer = ckb::adapters::PartialAnswer::default();
                answer.confidence = Confidence::new(0.5 + backend_index as f32 * 0.05);
                answer.symbols = (0..1_000).map(|i| make_symbol(repo_state, i)).collect();
                ScoredAnswer { backend_id: format!("backend-{backend_index}"), answer }
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(backend_count), &answers, |b, answers| {
            b.iter(|| black_box(merge_symbols(answers)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_ranking, bench_truncate_to_budget, bench_merge_symbols);
criterion_main!(benches);
