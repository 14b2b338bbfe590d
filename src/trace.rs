//! The in-memory trace model (C1).
//!
//! A [`Trace`] is an ordered sequence of [`TraceLine`]s produced by parsing a
//! tracer's textual output (`lexer`/`parser`), plus identifying fields
//! (`system`, `executable`, `arguments`) and a [`ParameterArena`] owning the
//! [`ExecutableParameter`] values extracted from those arguments.
//!
//! Synthetic values reference their parameter by [`ParameterId`], an index
//! into the owning trace's arena, rather than holding a direct reference
//! (see DESIGN.md, "Arena design for ExecutableParameter / SyntheticValue").

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Index of an [`ExecutableParameter`] within its owning trace's arena.
pub type ParameterId = usize;

/// A path into the arguments tree: list indices and/or mapping keys,
/// represented uniformly as a tuple of strings. `("",)` stands for a bare
/// scalar top-level argument.
pub type ParameterKey = Vec<String>;

/// A value extracted from the command-line/module arguments, keyed by its
/// path into the arguments tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableParameter {
    pub key: ParameterKey,
    /// The string rendering of the parameter value at the time it was
    /// extracted (used for matching against syscall literals).
    pub rendered: String,
}

/// Owns all [`ExecutableParameter`]s extracted from one trace's arguments.
///
/// Nothing is ever removed, so a [`ParameterId`] handed out by `push` stays
/// valid for the arena's whole lifetime, including across clones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterArena {
    parameters: Vec<ExecutableParameter>,
}

impl ParameterArena {
    pub fn push(&mut self, key: ParameterKey, rendered: String) -> ParameterId {
        self.parameters.push(ExecutableParameter { key, rendered });
        self.parameters.len() - 1
    }

    pub fn get(&self, id: ParameterId) -> &ExecutableParameter {
        &self.parameters[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParameterId, &ExecutableParameter)> {
        self.parameters.iter().enumerate()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn by_key(&self, key: &[String]) -> Option<ParameterId> {
        self.parameters.iter().position(|p| p.key == key)
    }
}

/// Template describing how to reconstruct a concrete value from a parameter
/// substituted at a [`SyntheticValue`]'s key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyntheticTemplate {
    /// The entire value is the parameter (numbers, or whole-string matches).
    Placeholder,
    /// A string template with `{0}` standing in for the parameter's text,
    /// e.g. `"/home/{0}/.bashrc"` for parameter `"alice"`.
    Pattern(String),
}

impl SyntheticTemplate {
    pub fn render(&self, parameter_text: &str) -> String {
        match self {
            SyntheticTemplate::Placeholder => parameter_text.to_string(),
            SyntheticTemplate::Pattern(pattern) => pattern.replace("{0}", parameter_text),
        }
    }
}

/// A value rewritten to reference an [`ExecutableParameter`], enabling
/// mapping search without losing the ability to reconstruct the original.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticValue {
    pub parameter: ParameterId,
    pub template: SyntheticTemplate,
    /// The original literal value, retained for reconstruction and debug
    /// display.
    pub original: Box<LiteralValue>,
}

/// The four-plus-one file descriptor shapes a tracer can report: a plain
/// path, a device node, an inode/socket, an IP socket, or a netlink socket.
/// Netlink sockets without a reported subprotocol/pid parse identically to
/// a generic inode/socket descriptor except for a `None` subprotocol.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileDescriptor {
    /// integer fd + resolved path
    Path { fd: i64, path: String },
    /// fd + device type/major/minor + path
    Device {
        fd: i64,
        device_type: String,
        major: i64,
        minor: i64,
        path: String,
    },
    /// fd + protocol + inode + optional peer inode + optional bound name
    Inode {
        fd: i64,
        protocol: String,
        inode: i64,
        reference: Option<i64>,
        bind: Option<String>,
    },
    /// fd + protocol + optional source addr + destination addr
    Ip {
        fd: i64,
        protocol: String,
        source: Option<String>,
        destination: String,
    },
    /// fd + protocol + optional subprotocol + pid
    Netlink {
        fd: i64,
        protocol: String,
        subprotocol: Option<String>,
        pid: i64,
    },
}

impl FileDescriptor {
    pub fn fd(&self) -> i64 {
        match self {
            FileDescriptor::Path { fd, .. }
            | FileDescriptor::Device { fd, .. }
            | FileDescriptor::Inode { fd, .. }
            | FileDescriptor::Ip { fd, .. }
            | FileDescriptor::Netlink { fd, .. } => *fd,
        }
    }

    /// The string primitive used for synthetic-value matching: the path for
    /// path/device-backed descriptors, the destination for IP sockets. Inode
    /// and netlink descriptors have no matchable string primitive.
    pub fn matchable_string(&self) -> Option<&str> {
        match self {
            FileDescriptor::Path { path, .. } => Some(path),
            FileDescriptor::Device { path, .. } => Some(path),
            FileDescriptor::Ip { destination, .. } => Some(destination),
            FileDescriptor::Inode { .. } | FileDescriptor::Netlink { .. } => None,
        }
    }
}

/// One of three bracketings a [`LiteralValue::Collection`] was parsed with.
/// Retained because downstream rendering depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bracketing {
    List,
    Struct,
    Paren,
}

/// The tagged union of literal value kinds an argument can hold.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralValue {
    Null,
    /// Integer value; base is preserved only as originally parsed, for
    /// round-trip display. Comparison is always on `value`.
    Number { value: i128, base: NumberBase },
    String { value: String, truncated: bool },
    Identifier(String),
    NumericExpression(String),
    BooleanExpression(String),
    FunctionCall {
        identifier: String,
        arguments: Vec<Literal>,
    },
    Collection {
        bracketing: Bracketing,
        items: Vec<Literal>,
    },
    FileDescriptor(FileDescriptor),
    /// A value observed to vary across runs; must not participate in
    /// comparison beyond "equal to every other hole at the same position".
    Hole,
    Synthetic(SyntheticValue),
}

impl std::hash::Hash for SyntheticValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Structural identity only; equality semantics under the active
        // synthetic-aware sub-mode are handled by `equality.rs`, not here.
        self.parameter.hash(state);
    }
}
impl PartialEq for SyntheticValue {
    fn eq(&self, other: &Self) -> bool {
        self.parameter == other.parameter
    }
}
impl Eq for SyntheticValue {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NumberBase {
    Octal,
    Decimal,
    Hex,
}

/// A literal wraps a [`LiteralValue`] and may carry an optional named
/// [`Identifier`](LiteralValue::Identifier) key (e.g. `flags=O_RDONLY`) and
/// an optional result-mapping destination (`lit => dest`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub value: LiteralValue,
    pub identifier: Option<String>,
    pub mapped_to: Option<Box<Literal>>,
}

impl Literal {
    pub fn new(value: LiteralValue) -> Self {
        Literal {
            value,
            identifier: None,
            mapped_to: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_mapping(mut self, dest: Literal) -> Self {
        self.mapped_to = Some(Box::new(dest));
        self
    }
}

/// A syscall argument is either the omitted-arguments sentinel (`...` alone
/// in an argument position) or a [`Literal`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Argument {
    Omitted,
    Literal(Literal),
}

/// A single syscall entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Syscall {
    pub name: String,
    pub arguments: Vec<Argument>,
    /// `Some(n)` for a numeric exit code, `None` if exit was `?` (only
    /// meaningful when `unfinished` is false).
    pub exit_code: Option<ExitCode>,
    pub notes: Option<String>,
    pub unfinished: bool,
    pub resumed: bool,
    pub pid: Option<i64>,
    /// Parameters referenced (directly or within nested collections) by
    /// synthetic values in this syscall's arguments. Populated by
    /// preprocessor 6; syscalls with no synthetic values have an empty set.
    pub executable_parameters: Vec<ParameterId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitCode {
    Number(i64),
    Unknown,
}

impl Syscall {
    pub fn new(name: impl Into<String>) -> Self {
        Syscall {
            name: name.into(),
            arguments: Vec::new(),
            exit_code: None,
            notes: None,
            unfinished: false,
            resumed: false,
            pid: None,
            executable_parameters: Vec::new(),
        }
    }

    pub fn has_executable_parameters(&self) -> bool {
        !self.executable_parameters.is_empty()
    }

    /// First argument value as an i64, if it is a plain (non-synthetic,
    /// non-hole) number. Used by preprocessors dispatching on fd/pid args.
    pub fn arg_number(&self, index: usize) -> Option<i64> {
        match self.arguments.get(index)? {
            Argument::Literal(Literal {
                value: LiteralValue::Number { value, .. },
                ..
            }) => Some(*value as i64),
            _ => None,
        }
    }

    pub fn arg_string(&self, index: usize) -> Option<&str> {
        match self.arguments.get(index)? {
            Argument::Literal(Literal {
                value: LiteralValue::String { value, .. },
                ..
            }) => Some(value),
            _ => None,
        }
    }
}

/// A signal event: name plus a structured payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub payload: Vec<Literal>,
}

/// Process exit, either a numeric status or the name of the killing signal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitStatement {
    Exited(i64),
    Killed(String),
}

/// One line of trace output: a syscall, a signal, or an exit statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TraceLine {
    Syscall(Syscall),
    Signal(Signal),
    Exit(ExitStatement),
}

impl TraceLine {
    pub fn as_syscall(&self) -> Option<&Syscall> {
        match self {
            TraceLine::Syscall(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_syscall_mut(&mut self) -> Option<&mut Syscall> {
        match self {
            TraceLine::Syscall(s) => Some(s),
            _ => None,
        }
    }
}

/// Identity of a trace's arguments shape: a list (command-line systems) or a
/// mapping of strings to JSON values (Ansible-like module invocations).
pub type Arguments = serde_json::Value;

/// An ordered sequence of trace lines plus identifying fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub trace_lines: Vec<TraceLine>,
    pub truncated: bool,
    pub system: String,
    pub executable: String,
    pub arguments: Arguments,
    pub collector: String,
    pub collector_assigned_id: Option<String>,
    pub arena: ParameterArena,
}

impl Trace {
    pub fn new(
        system: impl Into<String>,
        executable: impl Into<String>,
        arguments: Arguments,
        collector: impl Into<String>,
    ) -> Self {
        Trace {
            trace_lines: Vec::new(),
            truncated: false,
            system: system.into(),
            executable: executable.into(),
            arguments,
            collector: collector.into(),
            collector_assigned_id: None,
            arena: ParameterArena::default(),
        }
    }

    pub fn push(&mut self, line: TraceLine) {
        self.trace_lines.push(line);
    }

    pub fn syscalls(&self) -> impl Iterator<Item = &Syscall> {
        self.trace_lines.iter().filter_map(TraceLine::as_syscall)
    }

    pub fn syscalls_mut(&mut self) -> impl Iterator<Item = &mut Syscall> {
        self.trace_lines
            .iter_mut()
            .filter_map(TraceLine::as_syscall_mut)
    }

    /// A short human-readable identity, used in logging
    /// (`{system}:{executable}`).
    pub fn executable_repr(&self) -> String {
        format!("{}:{}", self.system, self.executable)
    }

    /// Stable key derived from `(system, executable, hash(arguments))`.
    pub fn key(&self) -> String {
        let args_hash = hashable_arguments_representation(&self.arguments);
        let mut hasher = Sha256::new();
        hasher.update(self.system.as_bytes());
        hasher.update(b"\0");
        hasher.update(self.executable.as_bytes());
        hasher.update(b"\0");
        hasher.update(args_hash.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Binary-blob round-trip via MessagePack.
    pub fn to_blob(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_blob(blob: &[u8]) -> Result<Trace, rmp_serde::decode::Error> {
        rmp_serde::from_slice(blob)
    }
}

/// A hashable, order-stable string representation of a JSON arguments
/// value, used to deduplicate migrations with structurally identical
/// arguments (grounded on `original_source/lib/strace/util.py`).
pub fn hashable_arguments_representation(value: &Arguments) -> String {
    fn stable(value: &Arguments) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let sorted: BTreeMap<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), stable(v)))
                    .collect();
                serde_json::to_value(sorted).expect("BTreeMap of Values serializes")
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(stable).collect())
            }
            other => other.clone(),
        }
    }
    stable(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_arena_ids_are_stable_across_clone() {
        let mut arena = ParameterArena::default();
        let id = arena.push(vec!["0".to_string()], "alice".to_string());
        let cloned = arena.clone();
        assert_eq!(cloned.get(id).rendered, "alice");
    }

    #[test]
    fn trace_key_is_deterministic() {
        let t1 = Trace::new("linux", "useradd", serde_json::json!(["alice"]), "test");
        let t2 = Trace::new("linux", "useradd", serde_json::json!(["alice"]), "test");
        assert_eq!(t1.key(), t2.key());
    }

    #[test]
    fn trace_key_ignores_object_key_order() {
        let t1 = Trace::new(
            "ansible",
            "user",
            serde_json::json!({"name": "alice", "state": "present"}),
            "test",
        );
        let t2 = Trace::new(
            "ansible",
            "user",
            serde_json::json!({"state": "present", "name": "alice"}),
            "test",
        );
        assert_eq!(t1.key(), t2.key());
    }

    #[test]
    fn blob_round_trips() {
        let mut trace = Trace::new("linux", "useradd", serde_json::json!(["alice"]), "test");
        trace.push(TraceLine::Syscall(Syscall::new("open")));
        let blob = trace.to_blob().unwrap();
        let restored = Trace::from_blob(&blob).unwrap();
        assert_eq!(restored.trace_lines.len(), 1);
        assert_eq!(restored.executable, "useradd");
    }

    #[test]
    fn file_descriptor_matchable_string() {
        let fd = FileDescriptor::Path {
            fd: 3,
            path: "/tmp/x".to_string(),
        };
        assert_eq!(fd.matchable_string(), Some("/tmp/x"));
        let fd = FileDescriptor::Inode {
            fd: 4,
            protocol: "TCP".to_string(),
            inode: 123,
            reference: None,
            bind: None,
        };
        assert_eq!(fd.matchable_string(), None);
    }

    #[test]
    fn synthetic_template_renders() {
        let placeholder = SyntheticTemplate::Placeholder;
        assert_eq!(placeholder.render("alice"), "alice");
        let pattern = SyntheticTemplate::Pattern("/home/{0}/.bashrc".to_string());
        assert_eq!(pattern.render("alice"), "/home/alice/.bashrc");
    }
}
