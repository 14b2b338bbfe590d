//! Trace preprocessors (C5).
//!
//! Each preprocessor normalizes away some source of noise that would
//! otherwise make semantically-identical traces compare unequal: kernel-
//! assigned file descriptors and PIDs, non-deterministic holes, and
//! command-line-parameter-derived literal values. Single preprocessors
//! operate on one trace (optionally consulting the full corpus); pair
//! preprocessors operate on two traces together. Ported from
//! `comparison/preprocessing.py`.
//!
//! Ordering constraints: [`SelectSyscalls`] must run before any
//! other single preprocessor (other rules assume syscall-only trace lines);
//! file-descriptor/PID-resolving preprocessors must run before
//! [`GenerateSyntheticValues`] (so synthetic-value matching sees resolved
//! paths, not raw fd integers); [`AnsibleStripLastWrite`] must run before
//! [`GenerateSyntheticValues`] (so the stripped write's JSON payload never
//! contributes executable-parameter matches).

use crate::trace::{
    Argument, Arguments, ExitCode, FileDescriptor, Literal, LiteralValue, ParameterId, Syscall,
    SyntheticTemplate, SyntheticValue, Trace, TraceLine,
};
use regex::Regex;
use std::collections::HashMap;

/// A preprocessor that normalizes a single trace in place, optionally using
/// information from the rest of the corpus.
pub trait SinglePreprocessor {
    fn preprocess(&mut self, trace: &mut Trace, all_traces: &[Trace]);
}

/// A preprocessor that normalizes a pair of traces together in place.
pub trait PairPreprocessor {
    fn preprocess(&mut self, a: &mut Trace, b: &mut Trace);
}

/// Drop every [`TraceLine`] that isn't a syscall.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectSyscalls;

impl SinglePreprocessor for SelectSyscalls {
    fn preprocess(&mut self, trace: &mut Trace, _all_traces: &[Trace]) {
        trace.trace_lines.retain(|l| matches!(l, TraceLine::Syscall(_)));
    }
}

fn argument_fd(arg: &Argument) -> Option<i64> {
    match arg {
        Argument::Literal(Literal {
            value: LiteralValue::Number { value, .. },
            ..
        }) => Some(*value as i64),
        Argument::Literal(Literal {
            value: LiteralValue::FileDescriptor(fd),
            ..
        }) => Some(fd.fd()),
        _ => None,
    }
}

fn set_literal_value(arg: &mut Argument, value: LiteralValue) {
    if let Argument::Literal(lit) = arg {
        lit.value = value;
    }
}

fn path_value(path: impl Into<String>) -> LiteralValue {
    LiteralValue::String {
        value: path.into(),
        truncated: false,
    }
}

fn exit_ok(s: &Syscall) -> Option<i64> {
    match s.exit_code {
        Some(ExitCode::Number(n)) if n >= 0 => Some(n),
        _ => None,
    }
}

/// Names whose first argument is a file descriptor that should be replaced
/// with its resolved path, with no other special handling (ported from
/// `ReplaceFileDescriptors._replace_first`'s alias list).
const REPLACE_FIRST_ARG: &[&str] = &[
    "connect", "faccessat", "fchdir", "fchmod", "fchmodat", "fchown", "fchown32", "fchownat",
    "fsync", "fdatasync", "getdents", "getdents64", "linkat", "lseek", "read", "readlinkat",
    "recv", "recvfrom", "recvmsg", "send", "sendto", "sendmsg", "fstat", "fstat64", "fstatat",
    "fstatat64", "newfstatat", "fstatfs", "fstatfs64", "unlinkat", "utimensat", "futimens",
    "write",
];

/// A per-pid fd→path table, with `CLONE_FILES` sharing modeled by
/// indirection: several pids may point at the same table slot, so a
/// mutation made while processing one pid's syscalls is visible to every
/// other pid sharing that slot, exactly as a real shared fd table would be.
/// A plain `HashMap<pid, HashMap<fd, path>>` can only ever hand out
/// independent clones, which is what made `CLONE_FILES` sharing dead code
/// before; this indirection is what makes it actually alias.
#[derive(Debug, Default)]
struct FdTables {
    tables: Vec<HashMap<i64, String>>,
    owner: HashMap<i64, usize>,
}

impl FdTables {
    fn slot_for(&mut self, pid: i64) -> usize {
        *self.owner.entry(pid).or_insert_with(|| {
            self.tables.push(HashMap::new());
            self.tables.len() - 1
        })
    }

    fn table_mut(&mut self, pid: i64) -> &mut HashMap<i64, String> {
        let slot = self.slot_for(pid);
        &mut self.tables[slot]
    }

    /// Give `child` the parent's table: the same slot (so later mutations
    /// are mutually visible) when `shared` is set, an independent copy
    /// otherwise.
    fn fork(&mut self, parent: i64, child: i64, shared: bool) {
        let parent_slot = self.slot_for(parent);
        if shared {
            self.owner.insert(child, parent_slot);
        } else {
            let copy = self.tables[parent_slot].clone();
            self.tables.push(copy);
            self.owner.insert(child, self.tables.len() - 1);
        }
    }

    fn drop_pid(&mut self, pid: i64) {
        self.owner.remove(&pid);
    }
}

/// Replace numeric file descriptor arguments with the path (or pipe/synthetic
/// name) they were resolved to when opened earlier in the trace, maintaining
/// one descriptor table per PID (shared across `clone(CLONE_FILES)` children,
/// copied otherwise).
#[derive(Debug, Default)]
pub struct ReplaceFileDescriptors;

impl SinglePreprocessor for ReplaceFileDescriptors {
    fn preprocess(&mut self, trace: &mut Trace, _all_traces: &[Trace]) {
        let mut tables = FdTables::default();
        for line in &mut trace.trace_lines {
            let TraceLine::Syscall(syscall) = line else {
                continue;
            };
            let pid = syscall.pid.unwrap_or(0);

            match syscall.name.as_str() {
                "clone" => {
                    let shares = syscall
                        .arg_number(1)
                        .map(|f| f & crate::canonical_form::flags::CLONE_FILES != 0)
                        .unwrap_or(false);
                    if let Some(child) = exit_ok(syscall) {
                        tables.fork(pid, child, shares);
                    }
                }
                "__clone2" | "clone3" | "fork" | "vfork" => {
                    if let Some(child) = exit_ok(syscall) {
                        tables.fork(pid, child, false);
                    }
                }
                "_exit" | "_Exit" | "exit_group" => {
                    tables.drop_pid(pid);
                }
                _ => {}
            }
            let table = tables.table_mut(pid);

            match syscall.name.as_str() {
                "close" => {
                    if let Some(fd) = argument_fd(&syscall.arguments[0]) {
                        if let Some(path) = table.get(&fd).cloned() {
                            set_literal_value(&mut syscall.arguments[0], path_value(path));
                            table.remove(&fd);
                        }
                    }
                }
                "dup" | "dup2" | "dup3" => {
                    if exit_ok(syscall).is_some() {
                        if let (Some(old_fd), Some(new_fd)) =
                            (argument_fd(&syscall.arguments[0]), exit_ok(syscall))
                        {
                            if let Some(path) = table.get(&old_fd).cloned() {
                                set_literal_value(&mut syscall.arguments[0], path_value(path.clone()));
                                table.insert(new_fd, path);
                            }
                        }
                    }
                }
                "fcntl" | "fcntl64" => {
                    if exit_ok(syscall).is_some() {
                        let cmd = syscall.arg_number(1);
                        if matches!(
                            cmd,
                            Some(c) if c == crate::canonical_form::flags::F_DUPFD
                                || c == crate::canonical_form::flags::F_DUPFD_CLOEXEC
                        ) {
                            if let (Some(old_fd), Some(new_fd)) =
                                (argument_fd(&syscall.arguments[0]), exit_ok(syscall))
                            {
                                if let Some(path) = table.get(&old_fd).cloned() {
                                    set_literal_value(&mut syscall.arguments[0], path_value(path.clone()));
                                    table.insert(new_fd, path);
                                }
                            }
                        }
                    }
                }
                "open" | "creat" => {
                    if let Some(new_fd) = exit_ok(syscall) {
                        if let Some(path) = syscall.arg_string(0).map(str::to_string) {
                            table.insert(new_fd, path);
                        }
                    }
                }
                "openat" => {
                    if let Some(new_fd) = exit_ok(syscall) {
                        let dir_fd = syscall.arg_number(0);
                        let path = syscall.arg_string(1).map(str::to_string);
                        if let Some(path) = path {
                            let resolved = match dir_fd {
                                Some(n) if n == crate::canonical_form::flags::AT_FDCWD => {
                                    path.clone()
                                }
                                Some(n) => match table.get(&n) {
                                    Some(dir) => format!("{dir}/{path}"),
                                    None => path.clone(),
                                },
                                None => path.clone(),
                            };
                            table.insert(new_fd, resolved);
                        }
                        if let Some(n) = dir_fd {
                            if let Some(dir_path) = table.get(&n).cloned() {
                                set_literal_value(&mut syscall.arguments[0], path_value(dir_path));
                            }
                        }
                    }
                }
                "pipe" | "pipe2" => {
                    if let Some(Argument::Literal(Literal {
                        value: LiteralValue::Collection { items, .. },
                        ..
                    })) = syscall.arguments.get_mut(0)
                    {
                        if items.len() == 2 {
                            if let LiteralValue::Number { value, .. } = items[0].value {
                                table.insert(value as i64, "pipe_read".to_string());
                            }
                            items[0].value = path_value("pipe_read");
                            if let LiteralValue::Number { value, .. } = items[1].value {
                                table.insert(value as i64, "pipe_write".to_string());
                            }
                            items[1].value = path_value("pipe_write");
                        }
                    }
                }
                "renameat" | "renameat2" => {
                    if let Some(fd) = argument_fd(&syscall.arguments[0]) {
                        if let Some(path) = table.get(&fd).cloned() {
                            set_literal_value(&mut syscall.arguments[0], path_value(path));
                        }
                    }
                    if let Some(fd) = argument_fd(&syscall.arguments[2]) {
                        if let Some(path) = table.get(&fd).cloned() {
                            set_literal_value(&mut syscall.arguments[2], path_value(path));
                        }
                    }
                }
                "select" | "pselect" | "pselect6" => {
                    for idx in 1..=3 {
                        if let Some(Argument::Literal(Literal {
                            value: LiteralValue::Collection { items, .. },
                            ..
                        })) = syscall.arguments.get_mut(idx)
                        {
                            for item in items.iter_mut() {
                                if let LiteralValue::Number { value, .. } = item.value {
                                    if let Some(path) = table.get(&(value as i64)).cloned() {
                                        item.value = path_value(path);
                                    }
                                }
                            }
                        }
                    }
                }
                name if REPLACE_FIRST_ARG.contains(&name) => {
                    if let Some(fd) = syscall.arguments.first().and_then(argument_fd) {
                        if let Some(path) = table.get(&fd).cloned() {
                            set_literal_value(&mut syscall.arguments[0], path_value(path));
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// Resolve an `openat(dir_fd, path, ...)` call's effective path, joining
/// `path` onto `dir_fd` when it isn't `AT_FDCWD` (mirrors
/// `canonical_form::get_full_path`, here working directly against a
/// [`Syscall`]'s arguments rather than already-extracted [`CanonicalValue`]s).
/// By the time this runs, [`ReplaceFileDescriptors`] has already rewritten
/// a *known* dir fd's argument into its resolved path string, so both
/// shapes (still-numeric `AT_FDCWD`/unresolved fd, or already-resolved
/// path) are handled.
fn resolve_openat_dir_path(syscall: &Syscall) -> Option<String> {
    let path = syscall.arg_string(1)?.to_string();
    if path.starts_with('/') {
        return Some(path);
    }
    match syscall.arg_number(0) {
        Some(n) if n == crate::canonical_form::flags::AT_FDCWD => Some(path),
        Some(_) => None, // unresolved fd (invariant 5: never invent a path)
        None => match syscall.arg_string(0) {
            Some(dir) if dir.ends_with('/') => Some(format!("{dir}{path}")),
            Some(dir) => Some(format!("{dir}/{path}")),
            None => Some(path),
        },
    }
}

/// Replace `/etc/*.<PID>` lock-file artifacts (and their matching write
/// payload) with a PID-independent `PID` placeholder.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplacePidInLockFiles;

impl SinglePreprocessor for ReplacePidInLockFiles {
    fn preprocess(&mut self, trace: &mut Trace, _all_traces: &[Trace]) {
        for line in &mut trace.trace_lines {
            let TraceLine::Syscall(syscall) = line else {
                continue;
            };
            let Some(pid) = syscall.pid else { continue };
            let suffix = format!(".{pid}");
            match syscall.name.as_str() {
                "link" | "stat" | "unlink" => {
                    if let Some(path) = syscall.arg_string(0) {
                        if path.starts_with("/etc/") && path.ends_with(&suffix) {
                            let replaced = format!("{}PID", &path[..path.len() - suffix.len() + 1]);
                            set_literal_value(&mut syscall.arguments[0], path_value(replaced));
                        }
                    }
                }
                "openat" => {
                    if let Some(resolved) = resolve_openat_dir_path(syscall) {
                        if resolved.starts_with("/etc/") && resolved.ends_with(&suffix) {
                            let replaced =
                                format!("{}PID", &resolved[..resolved.len() - suffix.len() + 1]);
                            set_literal_value(&mut syscall.arguments[1], path_value(replaced));
                        }
                    }
                }
                "write" => {
                    let expected = format!("{pid}\\0");
                    if syscall.arg_string(1) == Some(expected.as_str()) {
                        set_literal_value(&mut syscall.arguments[1], path_value("PID\\0"));
                    }
                }
                _ => {}
            }
        }
    }
}

/// Replace `/proc/<PID>` self-references with `/proc/self`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplacePidInProcfs;

impl SinglePreprocessor for ReplacePidInProcfs {
    fn preprocess(&mut self, trace: &mut Trace, _all_traces: &[Trace]) {
        for line in &mut trace.trace_lines {
            let TraceLine::Syscall(syscall) = line else {
                continue;
            };
            let Some(pid) = syscall.pid else { continue };
            let proc_pid = format!("/proc/{pid}");
            match syscall.name.as_str() {
                "open" | "stat" => {
                    if let Some(path) = syscall.arg_string(0) {
                        if let Some(rest) = path.strip_prefix(&proc_pid) {
                            let replaced = format!("/proc/self{rest}");
                            set_literal_value(&mut syscall.arguments[0], path_value(replaced));
                        }
                    }
                }
                "openat" => {
                    if let Some(path) = syscall.arg_string(1) {
                        if path.starts_with('/') {
                            if let Some(rest) = path.strip_prefix(&proc_pid) {
                                let replaced = format!("/proc/self{rest}");
                                set_literal_value(&mut syscall.arguments[1], path_value(replaced));
                            }
                        }
                    } else if let Some(dir) = syscall.arg_string(0) {
                        if let Some(rest) = dir.strip_prefix(&proc_pid) {
                            let replaced = format!("/proc/self{rest}");
                            set_literal_value(&mut syscall.arguments[0], path_value(replaced));
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// A mapping `syscall-name -> set of zero-based argument indices` whose
/// concrete values were observed to vary across repeated runs of the same
/// executable with identical inputs (produced offline; see spec.md §4.5
/// preprocessor 5 and §6 "Input: hole set").
pub type HoleSet = HashMap<String, std::collections::HashSet<usize>>;

/// Replace every argument at a hole-set position with [`LiteralValue::Hole`],
/// so it no longer participates in comparison beyond "equal to every other
/// hole at the same position" (spec.md Invariant 4).
#[derive(Debug, Clone, Default)]
pub struct PunchHoles {
    pub holes: HoleSet,
}

impl PunchHoles {
    pub fn new(holes: HoleSet) -> Self {
        PunchHoles { holes }
    }
}

impl SinglePreprocessor for PunchHoles {
    fn preprocess(&mut self, trace: &mut Trace, _all_traces: &[Trace]) {
        for line in &mut trace.trace_lines {
            let TraceLine::Syscall(syscall) = line else {
                continue;
            };
            let Some(indices) = self.holes.get(syscall.name.as_str()) else {
                continue;
            };
            for &index in indices {
                if let Some(Argument::Literal(lit)) = syscall.arguments.get_mut(index) {
                    lit.value = LiteralValue::Hole;
                }
            }
        }
    }
}

/// Strip the ansible-module JSON write to stdout that precedes exit, so it
/// can't pollute synthetic-value matching with argument substrings.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnsibleStripLastWrite;

impl SinglePreprocessor for AnsibleStripLastWrite {
    fn preprocess(&mut self, trace: &mut Trace, _all_traces: &[Trace]) {
        if trace.system != "ansible" {
            return;
        }
        if let Some(idx) = trace
            .trace_lines
            .iter()
            .rposition(|l| matches!(l, TraceLine::Syscall(s) if s.name == "write"))
        {
            trace.trace_lines.remove(idx);
        }
    }
}

fn is_fileglob_match(argument_str: &str, parameter_str: &str) -> bool {
    if !parameter_str.contains('*') {
        return false;
    }
    let escaped = regex::escape(parameter_str);
    let pattern = escaped.replace(r"\*\*", "[^.].*?").replace(r"\*", "[^.][^/]*");
    Regex::new(&format!("^{pattern}"))
        .map(|re| re.is_match(argument_str))
        .unwrap_or(false)
}

fn executable_parameter_matches(argument_str: &str, parameter_str: &str) -> bool {
    if parameter_str.is_empty() {
        return false;
    }
    is_fileglob_match(argument_str, parameter_str) || argument_str.contains(parameter_str)
}

enum PrimitiveType {
    Int,
    Str,
}

fn executable_parameter_template(
    kind: PrimitiveType,
    argument_str: &str,
    parameter_str: &str,
) -> SyntheticTemplate {
    match kind {
        PrimitiveType::Int => SyntheticTemplate::Placeholder,
        PrimitiveType::Str => {
            if is_fileglob_match(argument_str, parameter_str) {
                SyntheticTemplate::Placeholder
            } else {
                let escaped = argument_str.replace('{', "{{").replace('}', "}}");
                SyntheticTemplate::Pattern(escaped.replacen(parameter_str, "{0}", 1))
            }
        }
    }
}

fn find_match(
    value: &LiteralValue,
    arena: &crate::trace::ParameterArena,
) -> Option<(ParameterId, SyntheticTemplate)> {
    let (kind, primitive): (PrimitiveType, String) = match value {
        LiteralValue::Number { value, .. } => (PrimitiveType::Int, value.to_string()),
        LiteralValue::String { value, .. } => (PrimitiveType::Str, value.trim().to_string()),
        LiteralValue::FileDescriptor(FileDescriptor::Path { path, .. })
        | LiteralValue::FileDescriptor(FileDescriptor::Device { path, .. }) => {
            (PrimitiveType::Str, path.clone())
        }
        LiteralValue::FileDescriptor(FileDescriptor::Ip { destination, .. }) => {
            (PrimitiveType::Str, destination.clone())
        }
        _ => return None,
    };

    for (id, param) in arena.iter() {
        if param.rendered.is_empty() {
            continue;
        }
        if executable_parameter_matches(&primitive, &param.rendered) {
            let template = executable_parameter_template(kind, &primitive, &param.rendered);
            return Some((id, template));
        }
    }
    None
}

fn replace_values_literal(
    literal: &mut Literal,
    arena: &crate::trace::ParameterArena,
    used: &mut Vec<ParameterId>,
) {
    if let LiteralValue::Collection { items, .. } = &mut literal.value {
        for item in items {
            replace_values_literal(item, arena, used);
        }
        return;
    }
    if let Some((id, template)) = find_match(&literal.value, arena) {
        let original = std::mem::replace(&mut literal.value, LiteralValue::Null);
        literal.value = LiteralValue::Synthetic(SyntheticValue {
            parameter: id,
            template,
            original: Box::new(original),
        });
        used.push(id);
    }
}

/// Flatten a trace's arguments tree into the arena as [`ExecutableParameter`]
/// entries, recording each leaf's JSON-path key and rendered text.
fn populate_arena_from_arguments(trace: &mut Trace) {
    fn walk(value: &Arguments, key: &mut Vec<String>, arena: &mut crate::trace::ParameterArena) {
        match value {
            Arguments::Object(map) => {
                for (k, v) in map {
                    key.push(k.clone());
                    walk(v, key, arena);
                    key.pop();
                }
            }
            Arguments::Array(items) => {
                for (idx, v) in items.iter().enumerate() {
                    key.push(idx.to_string());
                    walk(v, key, arena);
                    key.pop();
                }
            }
            Arguments::Null => {}
            Arguments::Bool(b) => {
                arena.push(key.clone(), b.to_string());
            }
            Arguments::Number(n) => {
                arena.push(key.clone(), n.to_string());
            }
            Arguments::String(s) => {
                arena.push(key.clone(), s.clone());
            }
        }
    }
    if trace.arena.is_empty() {
        let mut key = Vec::new();
        let arguments = trace.arguments.clone();
        walk(&arguments, &mut key, &mut trace.arena);
    }
}

/// Replace syscall literal values matching an executable parameter (from the
/// module/command-line arguments) with [`LiteralValue::Synthetic`] values,
/// recording which parameters each syscall referenced.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenerateSyntheticValues;

impl SinglePreprocessor for GenerateSyntheticValues {
    fn preprocess(&mut self, trace: &mut Trace, _all_traces: &[Trace]) {
        populate_arena_from_arguments(trace);
        let arena = trace.arena.clone();
        for line in &mut trace.trace_lines {
            let TraceLine::Syscall(syscall) = line else {
                continue;
            };
            let mut used = Vec::new();
            for arg in &mut syscall.arguments {
                if let Argument::Literal(lit) = arg {
                    replace_values_literal(lit, &arena, &mut used);
                }
            }
            if !used.is_empty() {
                used.sort_unstable();
                used.dedup();
                syscall.executable_parameters = used;
            }
        }
    }
}

/// All [`ParameterId`]s referenced anywhere in the trace's syscalls.
pub fn trace_executable_parameters(trace: &Trace) -> Vec<ParameterId> {
    let mut ids: Vec<ParameterId> = trace
        .syscalls()
        .flat_map(|s| s.executable_parameters.iter().copied())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Strip syscalls that appear in every trace in the corpus (and carry no
/// executable parameters), under the active [`crate::equality::EqualityContext`].
#[derive(Debug, Default)]
pub struct StripGlobalSyscalls;

impl SinglePreprocessor for StripGlobalSyscalls {
    fn preprocess(&mut self, trace: &mut Trace, all_traces: &[Trace]) {
        if all_traces.is_empty() {
            return;
        }
        let globally_shared = shared_syscalls(all_traces.iter());
        retain_non_global(trace, &globally_shared);
    }
}

/// As [`StripGlobalSyscalls`], but "global" means shared across all traces
/// for the same `system`, not the whole corpus (SPEC_FULL.md supplement).
#[derive(Debug, Default)]
pub struct StripGlobalSyscallsBySystem;

impl SinglePreprocessor for StripGlobalSyscallsBySystem {
    fn preprocess(&mut self, trace: &mut Trace, all_traces: &[Trace]) {
        let same_system = all_traces.iter().filter(|t| t.system == trace.system);
        let globally_shared = shared_syscalls(same_system);
        retain_non_global(trace, &globally_shared);
    }
}

fn shared_syscalls<'a>(traces: impl Iterator<Item = &'a Trace>) -> Vec<Syscall> {
    let mut sets: Vec<Vec<&Syscall>> = traces.map(|t| t.syscalls().collect()).collect();
    if sets.is_empty() {
        return Vec::new();
    }
    let first = sets.remove(0);
    first
        .into_iter()
        .filter(|candidate| {
            sets.iter()
                .all(|set| set.iter().any(|s| crate::equality::syscalls_equal(s, candidate)))
        })
        .cloned()
        .collect()
}

fn retain_non_global(trace: &mut Trace, globals: &[Syscall]) {
    trace.trace_lines.retain(|line| match line {
        TraceLine::Syscall(s) if s.has_executable_parameters() => true,
        TraceLine::Syscall(s) => !globals.iter().any(|g| crate::equality::syscalls_equal(g, s)),
        _ => true,
    });
}

/// Drop a shared leading run of identical trace lines from both traces.
#[derive(Debug, Default, Clone, Copy)]
pub struct StripLeadingSyscalls;

impl PairPreprocessor for StripLeadingSyscalls {
    fn preprocess(&mut self, a: &mut Trace, b: &mut Trace) {
        let mut i = 0;
        while i < a.trace_lines.len()
            && i < b.trace_lines.len()
            && trace_lines_equal(&a.trace_lines[i], &b.trace_lines[i])
        {
            i += 1;
        }
        a.trace_lines.drain(0..i);
        b.trace_lines.drain(0..i);
    }
}

/// Drop a shared trailing run of identical trace lines from both traces.
#[derive(Debug, Default, Clone, Copy)]
pub struct StripTrailingSyscalls;

impl PairPreprocessor for StripTrailingSyscalls {
    fn preprocess(&mut self, a: &mut Trace, b: &mut Trace) {
        let mut count = 0;
        while count < a.trace_lines.len()
            && count < b.trace_lines.len()
            && trace_lines_equal(
                &a.trace_lines[a.trace_lines.len() - 1 - count],
                &b.trace_lines[b.trace_lines.len() - 1 - count],
            )
        {
            count += 1;
        }
        a.trace_lines.truncate(a.trace_lines.len() - count);
        b.trace_lines.truncate(b.trace_lines.len() - count);
    }
}

fn trace_lines_equal(a: &TraceLine, b: &TraceLine) -> bool {
    match (a, b) {
        (TraceLine::Syscall(x), TraceLine::Syscall(y)) => crate::equality::syscalls_equal(x, y),
        (a, b) => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equality::{EqualityContext, EqualityScope};
    use crate::trace::{NumberBase, Syscall};

    fn trace_with(lines: Vec<TraceLine>) -> Trace {
        let mut t = Trace::new("linux", "t", serde_json::json!([]), "test");
        for l in lines {
            t.push(l);
        }
        t
    }

    #[test]
    fn select_syscalls_drops_signals_and_exits() {
        let mut t = trace_with(vec![
            TraceLine::Syscall(Syscall::new("open")),
            TraceLine::Exit(crate::trace::ExitStatement::Exited(0)),
        ]);
        SelectSyscalls.preprocess(&mut t, &[]);
        assert_eq!(t.trace_lines.len(), 1);
    }

    #[test]
    fn ansible_strip_last_write_only_applies_to_ansible_system() {
        let mut t = Trace::new("linux", "t", serde_json::json!([]), "test");
        t.push(TraceLine::Syscall(Syscall::new("write")));
        AnsibleStripLastWrite.preprocess(&mut t, &[]);
        assert_eq!(t.trace_lines.len(), 1);

        let mut t2 = Trace::new("ansible", "user", serde_json::json!([]), "test");
        t2.push(TraceLine::Syscall(Syscall::new("open")));
        t2.push(TraceLine::Syscall(Syscall::new("write")));
        AnsibleStripLastWrite.preprocess(&mut t2, &[]);
        assert_eq!(t2.trace_lines.len(), 1);
    }

    #[test]
    fn replace_file_descriptors_resolves_open_then_read() {
        let mut open = Syscall::new("open");
        open.arguments.push(Argument::Literal(Literal::new(LiteralValue::String {
            value: "/tmp/x".into(),
            truncated: false,
        })));
        open.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: 0,
            base: NumberBase::Octal,
        })));
        open.exit_code = Some(ExitCode::Number(3));

        let mut read = Syscall::new("read");
        read.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: 3,
            base: NumberBase::Decimal,
        })));

        let mut t = trace_with(vec![TraceLine::Syscall(open), TraceLine::Syscall(read)]);
        ReplaceFileDescriptors.preprocess(&mut t, &[]);
        let lines: Vec<_> = t.syscalls().collect();
        assert_eq!(lines[1].arg_string(0), Some("/tmp/x"));
    }

    #[test]
    fn clone_files_shares_the_fd_table_with_the_child() {
        let mut clone_call = Syscall::new("clone");
        clone_call.pid = Some(100);
        clone_call.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: 0,
            base: NumberBase::Decimal,
        })));
        clone_call.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: crate::canonical_form::flags::CLONE_FILES as i128,
            base: NumberBase::Decimal,
        })));
        clone_call.exit_code = Some(ExitCode::Number(200));

        let mut open_in_child = Syscall::new("open");
        open_in_child.pid = Some(200);
        open_in_child.arguments.push(Argument::Literal(Literal::new(LiteralValue::String {
            value: "/tmp/shared".into(),
            truncated: false,
        })));
        open_in_child.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: 0,
            base: NumberBase::Octal,
        })));
        open_in_child.exit_code = Some(ExitCode::Number(3));

        let mut read_in_parent = Syscall::new("read");
        read_in_parent.pid = Some(100);
        read_in_parent.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: 3,
            base: NumberBase::Decimal,
        })));

        let mut t = trace_with(vec![
            TraceLine::Syscall(clone_call),
            TraceLine::Syscall(open_in_child),
            TraceLine::Syscall(read_in_parent),
        ]);
        ReplaceFileDescriptors.preprocess(&mut t, &[]);

        let lines: Vec<_> = t.syscalls().collect();
        assert_eq!(
            lines[2].arg_string(0),
            Some("/tmp/shared"),
            "fd 3 opened by the CLONE_FILES child must resolve in the parent's later read too"
        );
    }

    #[test]
    fn clone_without_clone_files_gives_the_child_an_independent_table() {
        let mut clone_call = Syscall::new("clone");
        clone_call.pid = Some(100);
        clone_call.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: 0,
            base: NumberBase::Decimal,
        })));
        clone_call.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: 0,
            base: NumberBase::Decimal,
        })));
        clone_call.exit_code = Some(ExitCode::Number(200));

        let mut open_in_child = Syscall::new("open");
        open_in_child.pid = Some(200);
        open_in_child.arguments.push(Argument::Literal(Literal::new(LiteralValue::String {
            value: "/tmp/private".into(),
            truncated: false,
        })));
        open_in_child.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: 0,
            base: NumberBase::Octal,
        })));
        open_in_child.exit_code = Some(ExitCode::Number(3));

        let mut read_in_parent = Syscall::new("read");
        read_in_parent.pid = Some(100);
        read_in_parent.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: 3,
            base: NumberBase::Decimal,
        })));

        let mut t = trace_with(vec![
            TraceLine::Syscall(clone_call),
            TraceLine::Syscall(open_in_child),
            TraceLine::Syscall(read_in_parent),
        ]);
        ReplaceFileDescriptors.preprocess(&mut t, &[]);

        let lines: Vec<_> = t.syscalls().collect();
        assert_eq!(lines[2].arg_number(0), Some(3), "fd 3 stays unresolved in the parent's own table");
    }

    #[test]
    fn replace_pid_in_lock_files_resolves_openat_relative_to_a_resolved_dirfd() {
        let mut openat = Syscall::new("openat");
        openat.pid = Some(651);
        openat.arguments.push(Argument::Literal(Literal::new(LiteralValue::String {
            value: "/etc".into(),
            truncated: false,
        })));
        openat.arguments.push(Argument::Literal(Literal::new(LiteralValue::String {
            value: "passwd.651".into(),
            truncated: false,
        })));

        let mut t = trace_with(vec![TraceLine::Syscall(openat)]);
        ReplacePidInLockFiles.preprocess(&mut t, &[]);

        let syscall = t.syscalls().next().unwrap();
        assert_eq!(syscall.arg_string(1), Some("/etc/passwd.PID"));
    }

    #[test]
    fn strip_leading_and_trailing_drops_shared_runs() {
        let _scope = EqualityScope::new(EqualityContext::Strict);
        let mut a = trace_with(vec![
            TraceLine::Syscall(Syscall::new("open")),
            TraceLine::Syscall(Syscall::new("read")),
            TraceLine::Syscall(Syscall::new("close")),
        ]);
        let mut b = trace_with(vec![
            TraceLine::Syscall(Syscall::new("open")),
            TraceLine::Syscall(Syscall::new("write")),
            TraceLine::Syscall(Syscall::new("close")),
        ]);
        StripLeadingSyscalls.preprocess(&mut a, &mut b);
        StripTrailingSyscalls.preprocess(&mut a, &mut b);
        assert_eq!(a.trace_lines.len(), 1);
        assert_eq!(b.trace_lines.len(), 1);
    }

    #[test]
    fn generate_synthetic_values_replaces_matching_argument() {
        let mut t = Trace::new("linux", "useradd", serde_json::json!(["alice"]), "test");
        let mut open = Syscall::new("open");
        open.arguments.push(Argument::Literal(Literal::new(LiteralValue::String {
            value: "/home/alice".into(),
            truncated: false,
        })));
        t.push(TraceLine::Syscall(open));
        GenerateSyntheticValues.preprocess(&mut t, &[]);
        let syscall = t.syscalls().next().unwrap();
        assert!(syscall.has_executable_parameters());
        assert!(matches!(
            syscall.arguments[0],
            Argument::Literal(Literal {
                value: LiteralValue::Synthetic(_),
                ..
            })
        ));
    }

    #[test]
    fn fileglob_match_supports_star_and_globstar() {
        assert!(is_fileglob_match("/home/alice/.bashrc", "/home/*/.bashrc"));
        assert!(!is_fileglob_match("literal", "literal"));
    }

    #[test]
    fn punch_holes_replaces_configured_argument_positions() {
        let mut openat = Syscall::new("openat");
        openat.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: -100,
            base: NumberBase::Decimal,
        })));
        openat.arguments.push(Argument::Literal(Literal::new(LiteralValue::String {
            value: "/tmp/x.12345".into(),
            truncated: false,
        })));
        let mut t = trace_with(vec![TraceLine::Syscall(openat)]);

        let mut holes = HoleSet::new();
        holes.insert("openat".to_string(), [1].into_iter().collect());
        PunchHoles::new(holes).preprocess(&mut t, &[]);

        let syscall = t.syscalls().next().unwrap();
        assert!(matches!(
            syscall.arguments[1],
            Argument::Literal(Literal {
                value: LiteralValue::Hole,
                ..
            })
        ));
        assert!(matches!(
            syscall.arguments[0],
            Argument::Literal(Literal {
                value: LiteralValue::Number { .. },
                ..
            })
        ));
    }

    #[test]
    fn punch_holes_is_idempotent() {
        let mut write = Syscall::new("write");
        write.arguments.push(Argument::Literal(Literal::new(LiteralValue::Number {
            value: 42,
            base: NumberBase::Decimal,
        })));
        let mut t = trace_with(vec![TraceLine::Syscall(write)]);
        let mut holes = HoleSet::new();
        holes.insert("write".to_string(), [0].into_iter().collect());
        let mut pp = PunchHoles::new(holes);
        pp.preprocess(&mut t, &[]);
        pp.preprocess(&mut t, &[]);
        let syscall = t.syscalls().next().unwrap();
        assert!(matches!(syscall.arguments[0], Argument::Literal(Literal { value: LiteralValue::Hole, .. })));
    }
}
