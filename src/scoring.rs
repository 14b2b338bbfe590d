//! Similarity scoring over preprocessed trace pairs (C6).
//!
//! A [`ScoringMethod`] wraps a pipeline of preprocessors plus a syscall-level
//! [`EqualityContext`](crate::equality::EqualityContext), and hands the
//! preprocessed pair to a [`ScoreStrategy`] for the actual comparison.
//! Between preprocessing and scoring it runs a parameter-mapping pass
//! (`map_parameters`) and installs the result as a [`ParameterMapScope`] so
//! that [`SyntheticMode::CompareByMap`] is active for the strategy's whole
//! call, mirroring `ScoringMethod.__call__` nesting `compare_by_map()` around
//! `self._score(...)`.
//!
//! Five strategies are provided: [`JaccardCoefficient`], [`Tfidf`],
//! [`NormalizedInformationContent`], [`MaximumCardinalityMatching`] and
//! [`TfidfMaximumWeightedMatching`]. The latter two share a bipartite
//! candidate graph (`candidate_edges`, built as a `petgraph::graph::UnGraph`)
//! solved by a hand-rolled O(n^3) assignment algorithm (`hungarian_assign`)
//! rather than `petgraph`'s own (unweighted) matching helpers, since we need
//! exact weighted bipartite matching with forbidden non-candidate pairs —
//! this is what replaces the networkx `max_weight_matching`/
//! `bipartite.maximum_matching` calls in the dependency swap ledger.

use crate::equality::{syscalls_equal, CtxSyscall, EqualityContext, EqualityScope, ParameterMapScope, SyntheticMode, SyntheticScope};
use crate::error::{CompareError, Result};
use crate::preprocessing::{PairPreprocessor, SinglePreprocessor};
use crate::trace::{ParameterId, ParameterKey, Syscall, Trace};
use petgraph::graph::UnGraph;
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

/// A mapped pair of executable parameter keys, ordered `(s1 key, s2 key)`.
pub type ParameterMapping = Vec<(ParameterKey, ParameterKey)>;

/// The result of comparing `s1` to `s2`: a similarity score plus whatever
/// parameter mapping was discovered along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringResult {
    pub score: f64,
    pub normalized_score: Option<f64>,
    pub mapping: ParameterMapping,
}

impl PartialOrd for ScoringResult {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.score.partial_cmp(&other.score)
    }
}

/// A comparison strategy, plugged into a [`ScoringMethod`].
pub trait ScoreStrategy {
    fn score(&self, s1: &Trace, s2: &Trace, all_traces: &[Trace]) -> Result<f64>;
}

/// Preprocessing pipeline plus equality context, orchestrating a single
/// comparison end to end.
pub struct ScoringMethod {
    single_preprocessors: Vec<Box<dyn SinglePreprocessor>>,
    pair_preprocessors: Vec<Box<dyn PairPreprocessor>>,
    equality: EqualityContext,
}

impl ScoringMethod {
    pub fn new(equality: EqualityContext) -> Self {
        ScoringMethod {
            single_preprocessors: Vec::new(),
            pair_preprocessors: Vec::new(),
            equality,
        }
    }

    pub fn with_single(mut self, preprocessor: impl SinglePreprocessor + 'static) -> Self {
        self.single_preprocessors.push(Box::new(preprocessor));
        self
    }

    pub fn with_pair(mut self, preprocessor: impl PairPreprocessor + 'static) -> Self {
        self.pair_preprocessors.push(Box::new(preprocessor));
        self
    }

    /// Runs preprocessing, then parameter mapping, then `strategy.score`,
    /// all under this method's equality context.
    ///
    /// Unlike the preprocessing pass over a whole corpus (handled once by
    /// `corpus.rs` ahead of any pairwise comparison), single preprocessors
    /// here only touch `s1`/`s2`: re-running a corpus-wide preprocessor like
    /// `StripGlobalSyscalls` on every pair compared would be both redundant
    /// and, since it mutably needs every other trace at once, awkward to
    /// borrow-check without cloning the corpus per call.
    pub fn compare(&mut self, strategy: &dyn ScoreStrategy, s1: &mut Trace, s2: &mut Trace, all_traces: &[Trace]) -> Result<ScoringResult> {
        let _ctx = EqualityScope::new(self.equality);

        for preprocessor in self.single_preprocessors.iter_mut() {
            preprocessor.preprocess(s1, &[]);
            preprocessor.preprocess(s2, &[]);
        }
        for preprocessor in self.pair_preprocessors.iter_mut() {
            preprocessor.preprocess(s1, s2);
        }

        if s1.trace_lines.is_empty() || s2.trace_lines.is_empty() {
            return Ok(ScoringResult {
                score: 1.0,
                normalized_score: None,
                mapping: Vec::new(),
            });
        }

        let id_mapping = map_parameters(s1, s2);
        let mut bidirectional = HashMap::with_capacity(id_mapping.len() * 2);
        for &(a, b) in &id_mapping {
            bidirectional.insert(a, b);
            bidirectional.insert(b, a);
        }
        let key_mapping: ParameterMapping = id_mapping
            .iter()
            .map(|&(a, b)| (s1.arena.get(a).key.clone(), s2.arena.get(b).key.clone()))
            .collect();

        let _synthetic = SyntheticScope::new(SyntheticMode::CompareByMap);
        let _map = ParameterMapScope::new(bidirectional);
        let score = strategy.score(s1, s2, all_traces)?;

        Ok(ScoringResult {
            score,
            normalized_score: None,
            mapping: key_mapping,
        })
    }
}

/// Finds a maximum-benefit mapping between `s1`'s and `s2`'s executable
/// parameters (C7's half shared with scoring: the part run inline before
/// every comparison, as opposed to the standalone search in `search/`).
///
/// Three passes, each under a different [`SyntheticMode`]:
/// 1. `CompareEqual` — find syscall pairs that match when synthetic values
///    compare by underlying value (i.e. ignoring which parameter produced
///    them).
/// 2. `CompareById` — drop any pair from that set that *also* matches by
///    parameter identity, since those pairs carry no information about how
///    parameters should map (they already compare equal either way).
/// 3. `CompareByMap` — for every candidate `(param1, param2)` pair drawn
///    from the remaining syscalls, tentatively install a one-off mapping
///    and measure how much of each matched syscall pair's equality it's
///    responsible for; the per-pair benefit is the fraction of the pair's
///    total executable-parameter occurrences contributed by `param1`/`param2`.
pub fn map_parameters(s1: &Trace, s2: &Trace) -> Vec<(ParameterId, ParameterId)> {
    let s1_syscalls: Vec<&Syscall> = s1.syscalls().filter(|s| s.has_executable_parameters()).collect();
    let s2_syscalls: Vec<&Syscall> = s2.syscalls().filter(|s| s.has_executable_parameters()).collect();

    let mut syscall_pairs: Vec<(&Syscall, &Syscall)> = {
        let _mode = SyntheticScope::new(SyntheticMode::CompareEqual);
        let mut pairs = Vec::new();
        for &a in &s1_syscalls {
            for &b in &s2_syscalls {
                if syscalls_equal(a, b) {
                    pairs.push((a, b));
                }
            }
        }
        pairs
    };

    syscall_pairs = {
        let _mode = SyntheticScope::new(SyntheticMode::CompareById);
        syscall_pairs.into_iter().filter(|&(a, b)| !syscalls_equal(a, b)).collect()
    };

    if syscall_pairs.is_empty() {
        return Vec::new();
    }

    let mut s1_parameters: Vec<ParameterId> = syscall_pairs
        .iter()
        .flat_map(|&(a, _)| a.executable_parameters.iter().copied())
        .collect();
    s1_parameters.sort_unstable();
    s1_parameters.dedup();
    let mut s2_parameters: Vec<ParameterId> = syscall_pairs
        .iter()
        .flat_map(|&(_, b)| b.executable_parameters.iter().copied())
        .collect();
    s2_parameters.sort_unstable();
    s2_parameters.dedup();

    let mut mapping_benefit: HashMap<(ParameterId, ParameterId), f64> = HashMap::new();
    {
        let _mode = SyntheticScope::new(SyntheticMode::CompareByMap);
        for &p1 in &s1_parameters {
            for &p2 in &s2_parameters {
                let mut one_off = HashMap::new();
                one_off.insert(p1, p2);
                one_off.insert(p2, p1);
                let _map = ParameterMapScope::new(one_off);

                for &(syscall1, syscall2) in &syscall_pairs {
                    let p1_count = syscall1.executable_parameters.iter().filter(|&&v| v == p1).count();
                    let p2_count = syscall2.executable_parameters.iter().filter(|&&v| v == p2).count();
                    if p1_count > 0 && p2_count > 0 && syscalls_equal(syscall1, syscall2) {
                        let s1_count = syscall1.executable_parameters.len();
                        let s2_count = syscall2.executable_parameters.len();
                        let benefit = (p1_count + p2_count) as f64 / (s1_count + s2_count) as f64;
                        *mapping_benefit.entry((p1, p2)).or_insert(0.0) += benefit;
                    }
                }
            }
        }
    }

    let weights: HashMap<(usize, usize), f64> = mapping_benefit
        .iter()
        .map(|(&(p1, p2), &w)| {
            let i = s1_parameters.iter().position(|&p| p == p1).unwrap();
            let j = s2_parameters.iter().position(|&p| p == p2).unwrap();
            ((i, j), w)
        })
        .collect();

    solve_bipartite(s1_parameters.len(), s2_parameters.len(), &weights)
        .into_iter()
        .map(|(i, j)| (s1_parameters[i], s2_parameters[j]))
        .collect()
}

/// Builds the candidate bipartite graph (s1 syscalls vs s2 syscalls, an
/// edge wherever they compare equal under the active equality context) as
/// a `petgraph` graph, then flattens it back to `(s1 index, s2 index)`
/// pairs for `hungarian_assign` to consume.
fn candidate_edges(s1: &[&Syscall], s2: &[&Syscall]) -> Vec<(usize, usize)> {
    let n1 = s1.len();
    let mut graph: UnGraph<(), ()> = UnGraph::with_capacity(n1 + s2.len(), 0);
    let s1_nodes: Vec<_> = (0..n1).map(|_| graph.add_node(())).collect();
    let s2_nodes: Vec<_> = (0..s2.len()).map(|_| graph.add_node(())).collect();
    for (i, &a) in s1.iter().enumerate() {
        for (j, &b) in s2.iter().enumerate() {
            if syscalls_equal(a, b) {
                graph.add_edge(s1_nodes[i], s2_nodes[j], ());
            }
        }
    }

    // Node indices are assigned in insertion order starting at 0, so the
    // s1/s2 side and original index fall straight out of the petgraph
    // `NodeIndex`, without needing to search `s1_nodes`/`s2_nodes`.
    graph
        .edge_references()
        .map(|e| (e.source().index(), e.target().index() - n1))
        .collect()
}

/// Maximum-weight bipartite matching restricted to `weights`' keys (pairs
/// absent from `weights` are not valid edges, not zero-weight ones). Solved
/// by padding to a square `(n1+n2) x (n1+n2)` cost matrix: real/real cells
/// cost `-weight` (or a large sentinel if there's no edge there), and every
/// cell touching a padding row or column costs zero, so any real node can
/// always be left unmatched for free. `hungarian_assign` then finds the
/// minimum-cost perfect matching of the padded square, and we keep only the
/// real/real assignments that used an actual edge.
fn solve_bipartite(n1: usize, n2: usize, weights: &HashMap<(usize, usize), f64>) -> Vec<(usize, usize)> {
    if n1 == 0 || n2 == 0 {
        return Vec::new();
    }
    const FORBIDDEN: f64 = 1e6;
    let n = n1 + n2;
    let mut cost = vec![vec![0.0f64; n]; n];
    for i in 0..n1 {
        for j in 0..n2 {
            cost[i][j] = match weights.get(&(i, j)) {
                Some(&w) => -w,
                None => FORBIDDEN,
            };
        }
    }

    let assignment = hungarian_assign(&cost);
    (0..n1)
        .filter_map(|i| {
            let j = assignment[i];
            if j < n2 && weights.contains_key(&(i, j)) {
                Some((i, j))
            } else {
                None
            }
        })
        .collect()
}

/// Minimum-cost perfect matching of a square cost matrix via the classic
/// O(n^3) potentials-based assignment algorithm. Returns `row -> col`.
fn hungarian_assign(cost: &[Vec<f64>]) -> Vec<usize> {
    let n = cost.len();
    let inf = f64::INFINITY;
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; n + 1];
    let mut p = vec![0usize; n + 1];
    let mut way = vec![0usize; n + 1];

    for i in 1..=n {
        p[0] = i;
        let mut j0 = 0usize;
        let mut minv = vec![inf; n + 1];
        let mut used = vec![false; n + 1];
        loop {
            used[j0] = true;
            let i0 = p[j0];
            let mut delta = inf;
            let mut j1 = 0usize;
            for j in 1..=n {
                if !used[j] {
                    let cur = cost[i0 - 1][j - 1] - u[i0] - v[j];
                    if cur < minv[j] {
                        minv[j] = cur;
                        way[j] = j0;
                    }
                    if minv[j] < delta {
                        delta = minv[j];
                        j1 = j;
                    }
                }
            }
            for j in 0..=n {
                if used[j] {
                    u[p[j]] += delta;
                    v[j] -= delta;
                } else {
                    minv[j] -= delta;
                }
            }
            j0 = j1;
            if p[j0] == 0 {
                break;
            }
        }
        while j0 != 0 {
            let j1 = way[j0];
            p[j0] = p[j1];
            j0 = j1;
        }
    }

    let mut result = vec![0usize; n];
    for j in 1..=n {
        if p[j] != 0 {
            result[p[j] - 1] = j - 1;
        }
    }
    result
}

fn normalized_term_frequencies<'a>(syscalls: impl Iterator<Item = &'a Syscall>) -> HashMap<CtxSyscall<'a>, f64> {
    let mut counts: HashMap<CtxSyscall<'a>, usize> = HashMap::new();
    for s in syscalls {
        *counts.entry(CtxSyscall(s)).or_insert(0) += 1;
    }
    let max = *counts.values().max().unwrap_or(&1) as f64;
    counts.into_iter().map(|(k, v)| (k, v as f64 / max)).collect()
}

fn document_frequency(syscall: &Syscall, all_traces: &[Trace]) -> usize {
    all_traces.iter().filter(|t| t.syscalls().any(|s| syscalls_equal(s, syscall))).count()
}

/// Intersection-over-union of the two traces' distinct syscalls.
#[derive(Debug, Default)]
pub struct JaccardCoefficient;

impl ScoreStrategy for JaccardCoefficient {
    fn score(&self, s1: &Trace, s2: &Trace, _all_traces: &[Trace]) -> Result<f64> {
        let s1_set: HashSet<CtxSyscall> = s1.syscalls().map(CtxSyscall).collect();
        let s2_set: HashSet<CtxSyscall> = s2.syscalls().map(CtxSyscall).collect();
        let union = s1_set.union(&s2_set).count();
        if union == 0 {
            return Ok(0.0);
        }
        Ok(s1_set.intersection(&s2_set).count() as f64 / union as f64)
    }
}

/// TF-IDF with the smaller trace's syscalls as query terms against the
/// larger, normalized by the number of distinct query terms.
#[derive(Debug, Default)]
pub struct Tfidf;

impl ScoreStrategy for Tfidf {
    fn score(&self, s1: &Trace, s2: &Trace, all_traces: &[Trace]) -> Result<f64> {
        // spec.md §7 "CorpusEmpty": IDF needs at least one corpus trace,
        // but an empty corpus is not fatal to the comparison — TF-IDF just
        // scores 0 rather than erroring.
        if all_traces.is_empty() {
            return Ok(0.0);
        }
        let s1_syscalls: Vec<&Syscall> = s1.syscalls().collect();
        let s2_syscalls: Vec<&Syscall> = s2.syscalls().collect();
        let (small, large) = if s1_syscalls.len() > s2_syscalls.len() {
            (s2_syscalls, s1_syscalls)
        } else {
            (s1_syscalls, s2_syscalls)
        };

        let small_set: HashSet<CtxSyscall> = small.iter().map(|&s| CtxSyscall(s)).collect();
        if small_set.is_empty() {
            return Ok(0.0);
        }
        let large_frequencies = normalized_term_frequencies(large.iter().copied());
        let num_documents = all_traces.len() as f64;

        let total: f64 = small_set
            .iter()
            .map(|ctx| {
                let tf = large_frequencies.get(ctx).copied().unwrap_or(0.0);
                let df = document_frequency(ctx.0, all_traces) as f64;
                tf * (num_documents / df).ln()
            })
            .sum();

        Ok(total / small_set.len() as f64)
    }
}

/// Sum of per-syscall information content (`-log(document frequency /
/// corpus size)`, normalized to a 0..1 scale) over the syscalls shared by
/// both traces, normalized by combined trace length. Document frequency is
/// computed with executable parameters compared by underlying value
/// (`SyntheticMode::CompareEqual`), so two structurally-identical
/// invocations count as the same syscall regardless of which parameter
/// produced a matched value.
#[derive(Debug, Default)]
pub struct NormalizedInformationContent;

impl NormalizedInformationContent {
    fn information_content<'a>(&self, all_traces: &'a [Trace]) -> Result<HashMap<CtxSyscall<'a>, f64>> {
        let total = all_traces.len();
        if total == 0 {
            // spec.md §7 "CorpusEmpty": NIC scores 0 on an empty corpus
            // rather than erroring; an empty weight table makes every
            // syscall's contribution below drop out, yielding score 0.0.
            return Ok(HashMap::new());
        }
        let mut counter: HashMap<CtxSyscall<'a>, usize> = HashMap::new();
        for trace in all_traces {
            let distinct: HashSet<CtxSyscall<'a>> = trace.syscalls().map(CtxSyscall).collect();
            for ctx in distinct {
                *counter.entry(ctx).or_insert(0) += 1;
            }
        }
        let total = total as f64;
        let base = 1.0 / total;
        Ok(counter.into_iter().map(|(k, v)| (k, (v as f64 / total).log(base))).collect())
    }
}

impl ScoreStrategy for NormalizedInformationContent {
    fn score(&self, s1: &Trace, s2: &Trace, all_traces: &[Trace]) -> Result<f64> {
        let _mode = SyntheticScope::new(SyntheticMode::CompareEqual);
        let weights = self.information_content(all_traces)?;

        let s1_counts = normalized_term_frequencies_raw(s1.syscalls());
        let s2_counts = normalized_term_frequencies_raw(s2.syscalls());

        let mut score = 0.0;
        for (ctx, &c1) in s1_counts.iter() {
            if let Some(&c2) = s2_counts.get(ctx) {
                if let Some(&w) = weights.get(ctx) {
                    score += c1.min(c2) as f64 * w;
                }
            }
        }

        let denom = s1.trace_lines.len() + s2.trace_lines.len();
        if denom == 0 {
            return Ok(0.0);
        }
        Ok(score * 2.0 / denom as f64)
    }
}

fn normalized_term_frequencies_raw<'a>(syscalls: impl Iterator<Item = &'a Syscall>) -> HashMap<CtxSyscall<'a>, usize> {
    let mut counts = HashMap::new();
    for s in syscalls {
        *counts.entry(CtxSyscall(s)).or_insert(0) += 1;
    }
    counts
}

/// Shared bipartite-matching machinery for [`MaximumCardinalityMatching`]
/// and [`TfidfMaximumWeightedMatching`]: build the candidate graph, ask the
/// strategy-specific `weigh` function for edge weights, solve, and divide
/// by the smaller trace's syscall count.
fn matching_score(
    s1: &Trace,
    s2: &Trace,
    all_traces: &[Trace],
    weigh: impl Fn(&[&Syscall], &[&Syscall], &[(usize, usize)], &[Trace]) -> HashMap<(usize, usize), f64>,
) -> f64 {
    let s1_syscalls: Vec<&Syscall> = s1.syscalls().collect();
    let s2_syscalls: Vec<&Syscall> = s2.syscalls().collect();
    let min_len = s1_syscalls.len().min(s2_syscalls.len());
    if min_len == 0 {
        return 0.0;
    }

    let edges = candidate_edges(&s1_syscalls, &s2_syscalls);
    let weights = weigh(&s1_syscalls, &s2_syscalls, &edges, all_traces);
    let matched = solve_bipartite(s1_syscalls.len(), s2_syscalls.len(), &weights);
    let total: f64 = matched.iter().map(|pair| weights.get(pair).copied().unwrap_or(0.0)).sum();
    total / min_len as f64
}

/// Maximum-cardinality bipartite matching between equal syscalls (each
/// candidate edge weighted uniformly), normalized by the smaller trace's
/// syscall count.
#[derive(Debug, Default)]
pub struct MaximumCardinalityMatching;

impl ScoreStrategy for MaximumCardinalityMatching {
    fn score(&self, s1: &Trace, s2: &Trace, all_traces: &[Trace]) -> Result<f64> {
        Ok(matching_score(s1, s2, all_traces, |_s1, _s2, edges, _all| {
            edges.iter().map(|&e| (e, 1.0)).collect()
        }))
    }
}

/// Maximum-weight bipartite matching between equal syscalls, weighted by a
/// cross term-frequency/inverse-document-frequency product: for a candidate
/// pair `(a from s1, b from s2)`, the weight is `tf(a in s2) * idf(a) *
/// tf(b in s1) * idf(b)`. An optional `tfidf_equality` overrides the
/// equality context used while computing weights (defaulting to whatever
/// the enclosing [`ScoringMethod`] already has active).
#[derive(Debug, Default)]
pub struct TfidfMaximumWeightedMatching {
    pub tfidf_equality: Option<EqualityContext>,
}

impl ScoreStrategy for TfidfMaximumWeightedMatching {
    fn score(&self, s1: &Trace, s2: &Trace, all_traces: &[Trace]) -> Result<f64> {
        if all_traces.is_empty() {
            return Err(CompareError::CorpusEmpty);
        }
        let _ctx = self.tfidf_equality.map(EqualityScope::new);
        Ok(matching_score(s1, s2, all_traces, |s1_syscalls, s2_syscalls, edges, all_traces| {
            if edges.is_empty() {
                return HashMap::new();
            }
            let s1_frequencies = normalized_term_frequencies(s1_syscalls.iter().copied());
            let s2_frequencies = normalized_term_frequencies(s2_syscalls.iter().copied());
            let num_documents = all_traces.len() as f64;

            let mut document_frequencies: HashMap<CtxSyscall, f64> = HashMap::new();
            for &(i, j) in edges {
                document_frequencies
                    .entry(CtxSyscall(s1_syscalls[i]))
                    .or_insert_with(|| document_frequency(s1_syscalls[i], all_traces) as f64);
                document_frequencies
                    .entry(CtxSyscall(s2_syscalls[j]))
                    .or_insert_with(|| document_frequency(s2_syscalls[j], all_traces) as f64);
            }

            edges
                .iter()
                .map(|&(i, j)| {
                    let a = CtxSyscall(s1_syscalls[i]);
                    let b = CtxSyscall(s2_syscalls[j]);
                    let a_tfidf = s2_frequencies.get(&a).copied().unwrap_or(0.0) * (num_documents / document_frequencies[&a]).ln();
                    let b_tfidf = s1_frequencies.get(&b).copied().unwrap_or(0.0) * (num_documents / document_frequencies[&b]).ln();
                    ((i, j), a_tfidf * b_tfidf)
                })
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equality::EqualityContext;
    use crate::preprocessing::SelectSyscalls;
    use crate::trace::{Argument, ExitCode, Literal, LiteralValue, TraceLine};

    fn syscall(name: &str, arg: Option<&str>) -> TraceLine {
        let mut s = Syscall::new(name);
        if let Some(a) = arg {
            s.arguments.push(Argument::Literal(Literal::new(LiteralValue::String {
                value: a.to_string(),
                truncated: false,
            })));
        }
        s.exit_code = Some(ExitCode::Number(0));
        TraceLine::Syscall(s)
    }

    fn trace_of(lines: Vec<TraceLine>) -> Trace {
        let mut t = Trace::new("linux", "t", serde_json::json!([]), "test");
        for l in lines {
            t.push(l);
        }
        t
    }

    #[test]
    fn jaccard_identical_traces_scores_one() {
        let t1 = trace_of(vec![syscall("read", None), syscall("write", None)]);
        let t2 = trace_of(vec![syscall("read", None), syscall("write", None)]);
        let _ctx = EqualityScope::new(EqualityContext::Strict);
        let score = JaccardCoefficient.score(&t1, &t2, &[]).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn jaccard_disjoint_traces_scores_zero() {
        let t1 = trace_of(vec![syscall("read", None)]);
        let t2 = trace_of(vec![syscall("write", None)]);
        let _ctx = EqualityScope::new(EqualityContext::Strict);
        let score = JaccardCoefficient.score(&t1, &t2, &[]).unwrap();
        assert!(score.abs() < 1e-9);
    }

    #[test]
    fn maximum_cardinality_matching_counts_shared_calls() {
        let t1 = trace_of(vec![syscall("read", None), syscall("write", None), syscall("close", None)]);
        let t2 = trace_of(vec![syscall("read", None), syscall("write", None)]);
        let _ctx = EqualityScope::new(EqualityContext::Strict);
        let score = MaximumCardinalityMatching.score(&t1, &t2, &[]).unwrap();
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn scoring_method_short_circuits_on_empty_preprocessed_trace() {
        let mut t1 = trace_of(vec![syscall("read", None)]);
        let mut t2 = trace_of(vec![syscall("write", None)]);
        let mut method = ScoringMethod::new(EqualityContext::Name).with_single(SelectSyscallsToNothing);
        let result = method.compare(&JaccardCoefficient, &mut t1, &mut t2, &[]).unwrap();
        assert_eq!(result.score, 1.0);
        assert!(result.mapping.is_empty());
    }

    struct SelectSyscallsToNothing;
    impl SinglePreprocessor for SelectSyscallsToNothing {
        fn preprocess(&mut self, trace: &mut Trace, _all_traces: &[Trace]) {
            trace.trace_lines.clear();
        }
    }

    #[test]
    fn information_content_rewards_rare_shared_syscalls() {
        let common = trace_of(vec![syscall("read", None)]);
        let rare_a = trace_of(vec![syscall("read", None), syscall("ioctl", None)]);
        let rare_b = trace_of(vec![syscall("read", None), syscall("ioctl", None)]);
        let corpus = vec![common.clone(), common, rare_a.clone(), rare_b.clone()];

        let _ctx = EqualityScope::new(EqualityContext::Strict);
        let score = NormalizedInformationContent.score(&rare_a, &rare_b, &corpus).unwrap();
        assert!(score > 0.0);
    }

    #[test]
    fn tfidf_on_an_empty_corpus_scores_zero_rather_than_erroring() {
        let t1 = trace_of(vec![syscall("read", None)]);
        let t2 = trace_of(vec![syscall("read", None)]);
        let _ctx = EqualityScope::new(EqualityContext::Strict);
        let score = Tfidf.score(&t1, &t2, &[]).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn normalized_information_content_on_an_empty_corpus_scores_zero_rather_than_erroring() {
        let t1 = trace_of(vec![syscall("read", None)]);
        let t2 = trace_of(vec![syscall("read", None)]);
        let _ctx = EqualityScope::new(EqualityContext::Strict);
        let score = NormalizedInformationContent.score(&t1, &t2, &[]).unwrap();
        assert_eq!(score, 0.0);
    }

    #[test]
    fn map_parameters_links_matching_argv_style_values() {
        let mut s1 = trace_of(vec![]);
        let mut s2 = trace_of(vec![]);
        let p1 = s1.arena.push(vec!["0".into()], "alice".into());
        let p2 = s2.arena.push(vec!["0".into()], "bob".into());

        let mut call1 = Syscall::new("openat");
        call1.arguments.push(Argument::Literal(Literal::new(LiteralValue::Synthetic(crate::trace::SyntheticValue {
            parameter: p1,
            template: crate::trace::SyntheticTemplate::Placeholder,
            original: Box::new(LiteralValue::String {
                value: "alice".into(),
                truncated: false,
            }),
        }))));
        call1.executable_parameters.push(p1);
        call1.exit_code = Some(ExitCode::Number(3));

        let mut call2 = call1.clone();
        if let Argument::Literal(lit) = &mut call2.arguments[0] {
            lit.value = LiteralValue::Synthetic(crate::trace::SyntheticValue {
                parameter: p2,
                template: crate::trace::SyntheticTemplate::Placeholder,
                original: Box::new(LiteralValue::String {
                    value: "bob".into(),
                    truncated: false,
                }),
            });
        }
        call2.executable_parameters = vec![p2];

        s1.push(TraceLine::Syscall(call1));
        s2.push(TraceLine::Syscall(call2));

        let _ctx = EqualityScope::new(EqualityContext::Strict);
        let mapping = map_parameters(&s1, &s2);
        assert_eq!(mapping, vec![(p1, p2)]);
    }
}
