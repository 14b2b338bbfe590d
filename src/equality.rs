//! Equality contexts for [`Syscall`](crate::trace::Syscall) comparison (C4).
//!
//! `syscall_equality.py` monkey-patches `Syscall.__eq__`/`__hash__` for the
//! duration of a `with` block. Rust has no equivalent of rebinding a type's
//! trait impls at runtime, so the active context lives in a thread-local
//! stack instead: [`EqualityScope`] pushes a context on construction and
//! pops it on drop, and [`syscalls_equal`] / [`syscall_hash`] consult the
//! top of the stack. [`CtxSyscall`] wraps a `&Syscall` reference so it can
//! be dropped straight into a `HashSet` or `HashMap` key and pick up
//! whichever context is active when it's used.
//!
//! A second, independent stack tracks [`SyntheticMode`]: the three ways two
//! [`SyntheticValue`](crate::trace::SyntheticValue)s can compare during
//! parameter-mapping search (C7). Both stacks are active simultaneously in
//! practice (grounded on `comparison/__init__.py`'s `ScoringMethod.__call__`,
//! which nests a `syscall_equality()` context manager around an
//! `ExecutableParameter.compare_by_map()` one) — they are orthogonal axes,
//! not alternatives.

use crate::trace::{Argument, Bracketing, FileDescriptor, Literal, LiteralValue, ParameterId, Syscall};
use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Syscall-level equality context: Name, Strict, or Canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqualityContext {
    /// Only `name` participates.
    Name,
    /// All fields that affect observable behavior participate: name,
    /// arguments, exit code. `pid`/`notes`/`unfinished`/`resumed` are
    /// bookkeeping, not semantic content, and are excluded (grounded on
    /// `syscall_equality.py::StrictEquality` delegating to
    /// `Syscall.strict_equals`, which compares name/arguments/return value).
    Strict,
    /// Both sides are canonicalized (C3) first, then compared structurally.
    Canonical,
}

/// Sub-mode governing how two [`LiteralValue::Synthetic`] values compare,
/// independent of the syscall-level [`EqualityContext`]: this is an
/// orthogonal axis layered on top of Name/Strict/Canonical, not a fourth
/// alternative to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticMode {
    /// Two synthetic values are equal iff their underlying original values
    /// are equal (ignores identity).
    CompareEqual,
    /// Two synthetic values are equal iff they reference the same
    /// [`ParameterId`] (structural identity; the default).
    CompareById,
    /// Two synthetic values are equal iff an externally supplied mapping
    /// (installed via [`ParameterMapScope`]) sends the left side's parameter
    /// to the right side's parameter.
    CompareByMap,
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<EqualityContext>> = RefCell::new(vec![EqualityContext::Strict]);
    static SYNTHETIC_STACK: RefCell<Vec<SyntheticMode>> = RefCell::new(vec![SyntheticMode::CompareById]);
    static PARAMETER_MAP: RefCell<Option<HashMap<ParameterId, ParameterId>>> = RefCell::new(None);
}

fn active_context() -> EqualityContext {
    CONTEXT_STACK.with(|s| *s.borrow().last().expect("context stack never empty"))
}

fn active_synthetic_mode() -> SyntheticMode {
    SYNTHETIC_STACK.with(|s| *s.borrow().last().expect("synthetic stack never empty"))
}

/// RAII guard installing `ctx` as the active [`EqualityContext`] for its
/// lifetime. Nestable: dropping restores whatever was active before.
#[must_use]
pub struct EqualityScope;

impl EqualityScope {
    pub fn new(ctx: EqualityContext) -> Self {
        CONTEXT_STACK.with(|s| s.borrow_mut().push(ctx));
        EqualityScope
    }
}

impl Drop for EqualityScope {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

/// RAII guard installing `mode` as the active [`SyntheticMode`].
#[must_use]
pub struct SyntheticScope;

impl SyntheticScope {
    pub fn new(mode: SyntheticMode) -> Self {
        SYNTHETIC_STACK.with(|s| s.borrow_mut().push(mode));
        SyntheticScope
    }
}

impl Drop for SyntheticScope {
    fn drop(&mut self) {
        SYNTHETIC_STACK.with(|s| {
            s.borrow_mut().pop();
        });
    }
}

/// RAII guard installing the parameter-id mapping consulted by
/// [`SyntheticMode::CompareByMap`]. The mapping is directional: a synthetic
/// value on the left of a comparison maps via `map.get(&left.parameter)`,
/// which must equal the right side's parameter id.
#[must_use]
pub struct ParameterMapScope;

impl ParameterMapScope {
    pub fn new(map: HashMap<ParameterId, ParameterId>) -> Self {
        PARAMETER_MAP.with(|s| *s.borrow_mut() = Some(map));
        ParameterMapScope
    }
}

impl Drop for ParameterMapScope {
    fn drop(&mut self) {
        PARAMETER_MAP.with(|s| *s.borrow_mut() = None);
    }
}

fn synthetic_equal(a: &crate::trace::SyntheticValue, b: &crate::trace::SyntheticValue) -> bool {
    match active_synthetic_mode() {
        SyntheticMode::CompareById => a.parameter == b.parameter,
        SyntheticMode::CompareEqual => values_equal(&a.original, &b.original),
        SyntheticMode::CompareByMap => PARAMETER_MAP.with(|s| match s.borrow().as_ref() {
            Some(map) => map.get(&a.parameter) == Some(&b.parameter),
            None => a.parameter == b.parameter,
        }),
    }
}

fn synthetic_hash<H: Hasher>(s: &crate::trace::SyntheticValue, state: &mut H) {
    match active_synthetic_mode() {
        SyntheticMode::CompareById | SyntheticMode::CompareByMap => s.parameter.hash(state),
        SyntheticMode::CompareEqual => hash_value(&s.original, state),
    }
}

/// Structural value equality under the active [`EqualityContext`]'s rules
/// for synthetic values; used directly by [`LiteralValue::Collection`] and
/// [`LiteralValue::FunctionCall`] recursion, which are unaffected by the
/// outer Name/Strict/Canonical choice.
pub fn values_equal(a: &LiteralValue, b: &LiteralValue) -> bool {
    use LiteralValue::*;
    match (a, b) {
        (Hole, Hole) => true,
        (Synthetic(x), Synthetic(y)) => synthetic_equal(x, y),
        (Null, Null) => true,
        (Number { value: v1, .. }, Number { value: v2, .. }) => v1 == v2,
        (String { value: v1, .. }, String { value: v2, .. }) => v1 == v2,
        (Identifier(x), Identifier(y)) => x == y,
        (NumericExpression(x), NumericExpression(y)) => x == y,
        (BooleanExpression(x), BooleanExpression(y)) => x == y,
        (
            FunctionCall {
                identifier: i1,
                arguments: a1,
            },
            FunctionCall {
                identifier: i2,
                arguments: a2,
            },
        ) => i1 == i2 && a1.len() == a2.len() && a1.iter().zip(a2).all(|(x, y)| literals_equal(x, y)),
        (
            Collection {
                bracketing: b1,
                items: i1,
            },
            Collection {
                bracketing: b2,
                items: i2,
            },
        ) => b1 == b2 && i1.len() == i2.len() && i1.iter().zip(i2).all(|(x, y)| literals_equal(x, y)),
        (FileDescriptor(x), FileDescriptor(y)) => x == y,
        _ => false,
    }
}

pub fn literals_equal(a: &Literal, b: &Literal) -> bool {
    values_equal(&a.value, &b.value)
}

fn arguments_equal(a: &Argument, b: &Argument) -> bool {
    match (a, b) {
        (Argument::Omitted, Argument::Omitted) => true,
        (Argument::Literal(x), Argument::Literal(y)) => literals_equal(x, y),
        _ => false,
    }
}

fn hash_value<H: Hasher>(v: &LiteralValue, state: &mut H) {
    use LiteralValue::*;
    std::mem::discriminant(v).hash(state);
    match v {
        Hole | Null => {}
        Synthetic(s) => synthetic_hash(s, state),
        Number { value, .. } => value.hash(state),
        String { value, .. } => value.hash(state),
        Identifier(x) | NumericExpression(x) | BooleanExpression(x) => x.hash(state),
        FunctionCall {
            identifier,
            arguments,
        } => {
            identifier.hash(state);
            for a in arguments {
                hash_value(&a.value, state);
            }
        }
        Collection { bracketing, items } => {
            bracketing.hash(state);
            for i in items {
                hash_value(&i.value, state);
            }
        }
        FileDescriptor(fd) => fd.hash(state),
    }
}

fn hash_argument<H: Hasher>(a: &Argument, state: &mut H) {
    match a {
        Argument::Omitted => 0u8.hash(state),
        Argument::Literal(l) => hash_value(&l.value, state),
    }
}

fn strict_equal(a: &Syscall, b: &Syscall) -> bool {
    a.name == b.name
        && a.exit_code == b.exit_code
        && a.arguments.len() == b.arguments.len()
        && a.arguments
            .iter()
            .zip(&b.arguments)
            .all(|(x, y)| arguments_equal(x, y))
}

fn strict_hash<H: Hasher>(s: &Syscall, state: &mut H) {
    s.name.hash(state);
    s.exit_code.hash(state);
    for a in &s.arguments {
        hash_argument(a, state);
    }
}

/// Compare two syscalls under the active [`EqualityContext`].
pub fn syscalls_equal(a: &Syscall, b: &Syscall) -> bool {
    match active_context() {
        EqualityContext::Name => a.name == b.name,
        EqualityContext::Strict => strict_equal(a, b),
        EqualityContext::Canonical => {
            crate::canonical_form::canonicalize(a) == crate::canonical_form::canonicalize(b)
        }
    }
}

/// Hash a syscall under the active [`EqualityContext`], consistent with
/// [`syscalls_equal`].
pub fn syscall_hash<H: Hasher>(s: &Syscall, state: &mut H) {
    match active_context() {
        EqualityContext::Name => s.name.hash(state),
        EqualityContext::Strict => strict_hash(s, state),
        EqualityContext::Canonical => crate::canonical_form::canonicalize(s).hash(state),
    }
}

/// Wraps a `&Syscall` so it can be used directly as a `HashSet`/`HashMap` key
/// whose `Eq`/`Hash` defer to whichever [`EqualityContext`] is active at the
/// time of use (not at construction time).
#[derive(Debug, Clone, Copy)]
pub struct CtxSyscall<'a>(pub &'a Syscall);

impl PartialEq for CtxSyscall<'_> {
    fn eq(&self, other: &Self) -> bool {
        syscalls_equal(self.0, other.0)
    }
}

impl Eq for CtxSyscall<'_> {}

impl Hash for CtxSyscall<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        syscall_hash(self.0, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::Syscall;

    fn openat(path: &str) -> Syscall {
        let mut s = Syscall::new("openat");
        s.arguments.push(Argument::Literal(Literal::new(LiteralValue::String {
            value: path.to_string(),
            truncated: false,
        })));
        s
    }

    #[test]
    fn name_equality_ignores_arguments() {
        let _scope = EqualityScope::new(EqualityContext::Name);
        assert!(syscalls_equal(&openat("/a"), &openat("/b")));
    }

    #[test]
    fn strict_equality_is_reflexive_symmetric_and_sensitive_to_arguments() {
        let _scope = EqualityScope::new(EqualityContext::Strict);
        let a = openat("/a");
        let b = openat("/a");
        let c = openat("/b");
        assert!(syscalls_equal(&a, &a));
        assert!(syscalls_equal(&a, &b));
        assert!(syscalls_equal(&b, &a));
        assert!(!syscalls_equal(&a, &c));
    }

    #[test]
    fn strict_refines_name_equality() {
        // Anything strict-equal must also be name-equal (same name is
        // required by strict_equal's own check).
        let a = openat("/a");
        let b = openat("/a");
        let strict = {
            let _scope = EqualityScope::new(EqualityContext::Strict);
            syscalls_equal(&a, &b)
        };
        let name = {
            let _scope = EqualityScope::new(EqualityContext::Name);
            syscalls_equal(&a, &b)
        };
        assert!(!strict || name);
    }

    #[test]
    fn compare_by_map_respects_installed_mapping() {
        let mut trace = crate::trace::Trace::new("linux", "t", serde_json::json!([]), "test");
        let p1 = trace.arena.push(vec!["0".into()], "alice".into());
        let p2 = trace.arena.push(vec!["0".into()], "bob".into());
        let sv1 = crate::trace::SyntheticValue {
            parameter: p1,
            template: crate::trace::SyntheticTemplate::Placeholder,
            original: Box::new(LiteralValue::String {
                value: "alice".into(),
                truncated: false,
            }),
        };
        let sv2 = crate::trace::SyntheticValue {
            parameter: p2,
            template: crate::trace::SyntheticTemplate::Placeholder,
            original: Box::new(LiteralValue::String {
                value: "bob".into(),
                truncated: false,
            }),
        };

        let _synthetic = SyntheticScope::new(SyntheticMode::CompareByMap);
        assert!(!synthetic_equal(&sv1, &sv2));
        let mut map = HashMap::new();
        map.insert(p1, p2);
        let _mapping = ParameterMapScope::new(map);
        assert!(synthetic_equal(&sv1, &sv2));
    }

    #[test]
    fn hole_equals_hole_regardless_of_context() {
        for ctx in [EqualityContext::Name, EqualityContext::Strict] {
            let _scope = EqualityScope::new(ctx);
            assert!(values_equal(&LiteralValue::Hole, &LiteralValue::Hole));
        }
    }
}
