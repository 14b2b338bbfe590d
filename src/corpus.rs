//! Corpus-level state: document-frequency memoization and parallel scoring
//! across a source trace and many candidate targets (spec.md §5 "Shared
//! resources").
//!
//! Grounded on the teacher's worker-pool idiom in `span_pool.rs` for the
//! pooled-resource shape, and on `tracer.rs`'s use of `std::thread::scope`
//! for bounded, borrow-checked fan-out; the lock-free work queue is
//! `crossbeam::queue::SegQueue`, already a dependency for the teacher's own
//! span export path (`ring_buffer.rs`).

use crate::canonical_form::{canonicalize, CanonicalForm};
use crate::equality::EqualityScope;
use crate::error::{CompareError, Result};
use crate::scoring::{ScoreStrategy, ScoringResult};
use crate::trace::{Syscall, Trace};
use crossbeam::queue::SegQueue;
use sha2::{Digest, Sha256};
use std::cell::RefCell;
use std::collections::HashMap;

/// A read-only collection of traces used for corpus-wide statistics
/// (document frequency, global-strip). Traces are not mutated after a
/// `Corpus` is built from them.
#[derive(Debug, Clone)]
pub struct Corpus {
    traces: Vec<Trace>,
    identity: String,
}

impl Corpus {
    pub fn new(traces: Vec<Trace>) -> Self {
        let mut hasher = Sha256::new();
        for trace in &traces {
            hasher.update(trace.key());
        }
        let identity = hex::encode(hasher.finalize());
        Corpus { traces, identity }
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Stable identity of this exact set of traces, used as the memoization
    /// key for corpus-wide statistics.
    pub fn identity(&self) -> &str {
        &self.identity
    }
}

/// Document frequency per canonical syscall, memoized by [`Corpus::identity`]
/// so repeated lookups against the same corpus don't re-scan it.
#[derive(Default)]
pub struct DocumentFrequencyCache {
    tables: RefCell<HashMap<String, HashMap<CanonicalForm, usize>>>,
}

impl DocumentFrequencyCache {
    pub fn new() -> Self {
        DocumentFrequencyCache::default()
    }

    fn build_table(corpus: &Corpus) -> HashMap<CanonicalForm, usize> {
        let mut table: HashMap<CanonicalForm, usize> = HashMap::new();
        for trace in corpus.traces() {
            let distinct: std::collections::HashSet<CanonicalForm> =
                trace.syscalls().map(canonicalize).collect();
            for form in distinct {
                *table.entry(form).or_insert(0) += 1;
            }
        }
        table
    }

    pub fn document_frequency(&self, corpus: &Corpus, syscall: &Syscall) -> Result<usize> {
        if corpus.is_empty() {
            return Err(CompareError::CorpusEmpty);
        }
        let mut tables = self.tables.borrow_mut();
        let table = tables
            .entry(corpus.identity().to_string())
            .or_insert_with(|| Self::build_table(corpus));
        Ok(*table.get(&canonicalize(syscall)).unwrap_or(&0))
    }
}

/// Scores `source` against every trace in `corpus` concurrently, one worker
/// thread per available core. Each worker gets its own equality-context
/// stack (spec.md §5's thread-local contexts are naturally per-thread) so
/// no synchronization is needed beyond the work queue and result
/// collection.
pub fn score_corpus_parallel(
    source: &Trace,
    corpus: &Corpus,
    strategy: &(dyn ScoreStrategy + Sync),
) -> Vec<(usize, Result<ScoringResult>)> {
    let queue: SegQueue<usize> = SegQueue::new();
    for i in 0..corpus.traces().len() {
        queue.push(i);
    }
    let results: SegQueue<(usize, Result<ScoringResult>)> = SegQueue::new();

    let worker_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    std::thread::scope(|scope| {
        for _ in 0..worker_count {
            scope.spawn(|| loop {
                let Some(index) = queue.pop() else { break };
                let target = &corpus.traces()[index];
                let _ctx = EqualityScope::new(crate::equality::EqualityContext::Canonical);
                let score = strategy
                    .score(source, target, corpus.traces())
                    .map(|score| ScoringResult { score, normalized_score: None, mapping: Vec::new() });
                results.push((index, score));
            });
        }
    });

    let mut out = Vec::with_capacity(results.len());
    while let Some(item) = results.pop() {
        out.push(item);
    }
    out.sort_by_key(|(index, _)| *index);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::JaccardCoefficient;

    fn trace(executable: &str) -> Trace {
        let mut t = Trace::new("linux", executable, serde_json::json!([]), "strace");
        let mut syscall = Syscall::new("open");
        syscall.exit_code = Some(crate::trace::ExitCode::Number(3));
        t.push(crate::trace::TraceLine::Syscall(syscall));
        t
    }

    #[test]
    fn document_frequency_counts_one_per_trace_containing_the_canonical_syscall() {
        let corpus = Corpus::new(vec![trace("a"), trace("b"), trace("c")]);
        let cache = DocumentFrequencyCache::new();
        let probe = trace("probe");
        let syscall = probe.syscalls().next().unwrap();
        assert_eq!(cache.document_frequency(&corpus, syscall).unwrap(), 3);
    }

    #[test]
    fn document_frequency_on_an_empty_corpus_is_an_error() {
        let corpus = Corpus::new(vec![]);
        let cache = DocumentFrequencyCache::new();
        let probe = trace("probe");
        let syscall = probe.syscalls().next().unwrap();
        assert!(matches!(
            cache.document_frequency(&corpus, syscall),
            Err(CompareError::CorpusEmpty)
        ));
    }

    #[test]
    fn score_corpus_parallel_covers_every_candidate_in_order() {
        let corpus = Corpus::new(vec![trace("a"), trace("b"), trace("c")]);
        let source = trace("source");
        let results = score_corpus_parallel(&source, &corpus, &JaccardCoefficient);
        assert_eq!(results.len(), 3);
        let indices: Vec<usize> = results.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        for (_, result) in &results {
            assert!(result.is_ok());
        }
    }
}
