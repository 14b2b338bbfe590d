//! The external validator interface (spec.md §6 "Validator interface", §9
//! "Generator-style validator").
//!
//! The source models this as a coroutine the caller `send`s candidate
//! target executables into, after supplying the source executable once at
//! startup. Per §9's redesign note this crate uses a plain blocking
//! request/response trait instead: a `validate` call that internally
//! carries the cached source state. §1 places the Docker-based validator
//! itself out of scope (it physically runs two executables and diffs their
//! filesystems); only its call-and-response *shape* is modeled here, so the
//! migration-search code path (`search::migration`) is exercisable and
//! testable without a real sandboxed executor, the same stub-seam idiom the
//! teacher uses for its own unimplemented external integration
//! (`validation_engine.rs`'s `ValidationError::TracingNotImplemented`).

use crate::error::{CompareError, Result};
use crate::trace::{hashable_arguments_representation, Trace};
use std::cell::RefCell;
use std::collections::HashMap;

/// Minimum observable post-execution state the validator reports per side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionMetadata {
    pub exit_code: Option<i64>,
}

/// The result of asking the validator whether two concrete executables
/// produced the same post-execution system state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationResult {
    pub score: f64,
    pub metadata_source: ExecutionMetadata,
    pub metadata_target: ExecutionMetadata,
}

/// A validator that has already been told the source executable and now
/// repeatedly scores candidate targets against it.
pub trait Validator {
    fn validate(&self, target: &Trace) -> Result<ValidationResult>;
}

/// Always returns a fixed score, standing in for the out-of-scope
/// Docker-based validator (spec.md §1) so the migration-search refinement
/// procedure has something to drive against in tests and examples.
#[derive(Debug, Clone, Copy)]
pub struct NullValidator {
    pub fixed_score: f64,
}

impl NullValidator {
    pub fn new(fixed_score: f64) -> Self {
        NullValidator { fixed_score }
    }
}

impl Validator for NullValidator {
    fn validate(&self, _target: &Trace) -> Result<ValidationResult> {
        Ok(ValidationResult {
            score: self.fixed_score,
            metadata_source: ExecutionMetadata::default(),
            metadata_target: ExecutionMetadata { exit_code: Some(0) },
        })
    }
}

/// Wraps any [`Validator`] with memoization by `(system, executable,
/// hashable-arguments)`, as required by spec.md §6: "Implementations must
/// memoize by `(system, executable, hashable(arguments))`." Grounded on the
/// teacher's `ValidationEngine` builder pattern (`validation_engine.rs`),
/// adapted from a one-shot report builder to a repeatedly-called cache.
pub struct MemoizingValidator<V> {
    inner: V,
    cache: RefCell<HashMap<(String, String, String), ValidationResult>>,
}

impl<V: Validator> MemoizingValidator<V> {
    pub fn new(inner: V) -> Self {
        MemoizingValidator {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    fn cache_key(target: &Trace) -> (String, String, String) {
        (
            target.system.clone(),
            target.executable.clone(),
            hashable_arguments_representation(&target.arguments),
        )
    }
}

impl<V: Validator> Validator for MemoizingValidator<V> {
    fn validate(&self, target: &Trace) -> Result<ValidationResult> {
        let key = Self::cache_key(target);
        if let Some(cached) = self.cache.borrow().get(&key) {
            return Ok(*cached);
        }
        let result = self.inner.validate(target)?;
        self.cache.borrow_mut().insert(key, result);
        Ok(result)
    }
}

/// Marks that the validator could not be reached; migration search aborts
/// with the best-so-far result rather than retrying (spec.md §7).
pub fn unavailable(reason: impl Into<String>) -> CompareError {
    CompareError::ValidatorUnavailable(reason.into())
}
