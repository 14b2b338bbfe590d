//! Error kinds for the trace-comparison pipeline, as a `thiserror`-derived
//! enum.
//!
//! Grounded on `validation_engine.rs::ValidationError` (same shape: a
//! fielded variant per failure mode) but using `thiserror`'s derive rather
//! than a hand-rolled `Display` impl, matching the more common convention
//! used elsewhere in this crate (`dwarf.rs`, `tracer.rs`).

use thiserror::Error;

/// A parse failure at a specific position, with a context window and the
/// tokens expected at the failure site.
#[derive(Debug, Clone, Error)]
#[error("parse error at {line}:{column}: {message} (near: {context})")]
pub struct ParseError {
    pub line: usize,
    pub column: usize,
    pub message: String,
    /// Rendering of the five tokens preceding the offending one.
    pub context: String,
}

/// Top-level error type for the comparison pipeline.
#[derive(Debug, Error)]
pub enum CompareError {
    /// Fatal to the *trace*; callers skip it and continue corpus loading.
    #[error("failed to parse trace: {0}")]
    Parse(#[from] ParseError),

    /// Fatal to the *comparison*; abort and log with both traces' identities.
    #[error("invariant violated while comparing `{source}` and `{target}`: {message}")]
    InvariantViolation {
        source: String,
        target: String,
        message: String,
    },

    /// Non-fatal; the caller falls through to the default canonicalization
    /// rule for the offending syscall.
    #[error("syscall `{syscall}` did not have the argument shape canonicalization rule `{rule}` expected")]
    UnknownSyscallArgumentShape { syscall: String, rule: String },

    /// Migration search aborts with the best-so-far result; not retried.
    #[error("validator unavailable: {0}")]
    ValidatorUnavailable(String),

    /// IDF / information-content computations require at least one trace.
    #[error("corpus is empty")]
    CorpusEmpty,
}

pub type Result<T> = std::result::Result<T, CompareError>;
