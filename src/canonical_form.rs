//! Syscall canonicalization (C3).
//!
//! Collapses syscall variants that have the same observable effect (e.g.
//! `open`/`openat`/`creat`, the `wait*` family, the `*stat` family) onto a
//! shared [`CanonicalForm`], so that [`crate::equality::EqualityContext::Canonical`]
//! treats them as equal. Ported from `canonical_form.py`'s per-syscall
//! `_process_<name>` functions, dispatched there via `globals().get(f'_process_{name}')`
//! and here via a `match` on `s.name` (see `canonicalize`).
//!
//! The most commonly compared syscalls, plus a representative sampling of
//! the rest of the roughly ninety per-syscall rules, are ported; anything
//! else falls through to [`default_process_syscall`], matching
//! `canonical_form.py`'s `_default_process_syscall` fallback.

use crate::trace::{Argument, Bracketing, FileDescriptor, Literal, LiteralValue, ParameterId, Syscall};

/// Linux flag/command constants needed by canonicalization rules below
/// (ported verbatim from `comparison/flags.py`).
pub mod flags {
    pub const AT_FDCWD: i64 = -100;
    pub const AT_REMOVEDIR: i64 = 0x200;

    pub const F_DUPFD: i64 = 0;
    pub const F_DUPFD_CLOEXEC: i64 = 1030;

    pub const F_GETLK: i64 = 5;
    pub const F_SETLK: i64 = 6;
    pub const F_SETLKW: i64 = 7;

    pub const F_GETLK64: i64 = 12;
    pub const F_SETLK64: i64 = 13;
    pub const F_SETLKW64: i64 = 14;

    pub const F_SETOWN_EX: i64 = 15;
    pub const F_GETOWN_EX: i64 = 16;

    pub const F_OFD_GETLK: i64 = 36;
    pub const F_OFD_SETLK: i64 = 37;
    pub const F_OFD_SETLKW: i64 = 38;

    pub const O_WRONLY: i64 = 0o1;
    pub const O_CREAT: i64 = 0o100;
    pub const O_TRUNC: i64 = 0o01000;

    pub const O_DIRECTORY: i64 = 0o200000;
    const O_TMPFILE_BASE: i64 = 0o20000000;
    pub const O_TMPFILE: i64 = O_TMPFILE_BASE | O_DIRECTORY;

    pub const CLONE_FILES: i64 = 0o400;

    pub const P_ALL: i64 = 0;
    pub const P_PID: i64 = 1;
    pub const P_PGID: i64 = 2;
    pub const P_PIDFD: i64 = 3;
}

/// A flattened, hashable stand-in for whatever a [`Literal`] held, used as
/// the element type of a [`CanonicalForm`]'s argument tuple. Mirrors what
/// `canonical_form.py::_get_value` returns for each `LiteralValue` shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CanonicalValue {
    Null,
    Number(i128),
    Str(String),
    Identifier(String),
    Expression(String),
    FileDescriptor(FileDescriptor),
    Hole,
    Synthetic(ParameterId),
    /// A collection or function call, flattened to its element values (a
    /// function call's first element is its identifier).
    Tuple(Vec<CanonicalValue>),
    /// A literal carrying an `ident=value` prefix.
    Named(String, Box<CanonicalValue>),
    Bool(bool),
}

impl CanonicalValue {
    fn as_i128(&self) -> Option<i128> {
        match self {
            CanonicalValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn as_tuple(&self) -> Option<&[CanonicalValue]> {
        match self {
            CanonicalValue::Tuple(items) => Some(items),
            _ => None,
        }
    }

    fn is_null(&self) -> bool {
        matches!(self, CanonicalValue::Null)
    }
}

/// A canonicalized syscall: a name plus an ordered tuple of
/// [`CanonicalValue`]s. Two syscalls canonicalize to `==` `CanonicalForm`s
/// iff they are considered equivalent under canonical equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalForm {
    pub name: String,
    pub values: Vec<CanonicalValue>,
}

impl CanonicalForm {
    fn new(name: impl Into<String>, values: Vec<CanonicalValue>) -> Self {
        CanonicalForm {
            name: name.into(),
            values,
        }
    }
}

fn raw_value(v: &LiteralValue) -> CanonicalValue {
    match v {
        LiteralValue::Null => CanonicalValue::Null,
        LiteralValue::Number { value, .. } => CanonicalValue::Number(*value),
        LiteralValue::String { value, .. } => CanonicalValue::Str(value.clone()),
        LiteralValue::Identifier(s) => CanonicalValue::Identifier(s.clone()),
        LiteralValue::NumericExpression(s) | LiteralValue::BooleanExpression(s) => {
            CanonicalValue::Expression(s.clone())
        }
        LiteralValue::FunctionCall {
            identifier,
            arguments,
        } => {
            let mut items = Vec::with_capacity(arguments.len() + 1);
            items.push(CanonicalValue::Identifier(identifier.clone()));
            items.extend(arguments.iter().map(get_value));
            CanonicalValue::Tuple(items)
        }
        LiteralValue::Collection { items, .. } => {
            CanonicalValue::Tuple(items.iter().map(get_value).collect())
        }
        LiteralValue::FileDescriptor(fd) => CanonicalValue::FileDescriptor(fd.clone()),
        LiteralValue::Hole => CanonicalValue::Hole,
        LiteralValue::Synthetic(sv) => CanonicalValue::Synthetic(sv.parameter),
    }
}

/// Get a canonical value out of a literal, keeping its `ident=` prefix if
/// any (`canonical_form.py::_get_value`).
fn get_value(lit: &Literal) -> CanonicalValue {
    match &lit.identifier {
        Some(id) => CanonicalValue::Named(id.clone(), Box::new(raw_value(&lit.value))),
        None => raw_value(&lit.value),
    }
}

fn arg_value(s: &Syscall, index: usize) -> CanonicalValue {
    match s.arguments.get(index) {
        Some(Argument::Literal(lit)) => get_value(lit),
        _ => CanonicalValue::Null,
    }
}

fn arg_is_collection(s: &Syscall, index: usize) -> bool {
    matches!(
        s.arguments.get(index),
        Some(Argument::Literal(Literal {
            value: LiteralValue::Collection { .. },
            ..
        }))
    )
}

/// `util.py::get_full_path`, resolving a (possibly already fd-replaced)
/// directory reference plus a relative/absolute path.
pub fn get_full_path(dir_fd: &CanonicalValue, pathname: &CanonicalValue) -> CanonicalValue {
    let path_str = match pathname {
        CanonicalValue::Str(s) => Some(s.as_str()),
        _ => None,
    };
    if let Some(p) = path_str {
        if p.starts_with('/') {
            return pathname.clone();
        }
    }
    if let Some(n) = dir_fd.as_i128() {
        if n == flags::AT_FDCWD as i128 {
            return pathname.clone();
        }
        // Numeric, unresolved dir_fd: leave the pair intact for a later
        // preprocessing pass (fd resolution) to resolve.
        return CanonicalValue::Tuple(vec![dir_fd.clone(), pathname.clone()]);
    }
    if let CanonicalValue::Str(dir) = dir_fd {
        if matches!(pathname, CanonicalValue::Str(p) if p == "NULL") {
            return dir_fd.clone();
        }
        let joined = if dir.ends_with('/') {
            format!("{dir}{}", path_str.unwrap_or_default())
        } else {
            format!("{dir}/{}", path_str.unwrap_or_default())
        };
        return CanonicalValue::Str(normalize_path(&joined));
    }
    CanonicalValue::Tuple(vec![dir_fd.clone(), pathname.clone()])
}

fn normalize_path(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    format!("/{}", out.join("/"))
}

/// `_default_process_syscall`: keeps the syscall's name, drops omitted
/// arguments, flattens the rest.
pub fn default_process_syscall(s: &Syscall) -> CanonicalForm {
    let values = s
        .arguments
        .iter()
        .filter_map(|a| match a {
            Argument::Literal(lit) => Some(get_value(lit)),
            Argument::Omitted => None,
        })
        .collect();
    CanonicalForm::new(&s.name, values)
}

fn process_open(s: &Syscall) -> CanonicalForm {
    let f = arg_value(s, 1).as_i128().unwrap_or(0);
    let create = f & flags::O_CREAT as i128 == flags::O_CREAT as i128;
    let tmpfile = f & flags::O_TMPFILE as i128 == flags::O_TMPFILE as i128;
    if create || tmpfile {
        CanonicalForm::new(&s.name, vec![arg_value(s, 0), arg_value(s, 2)])
    } else {
        CanonicalForm::new(&s.name, vec![arg_value(s, 0)])
    }
}

fn process_creat(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new("open", vec![arg_value(s, 0), arg_value(s, 1)])
}

fn process_openat(s: &Syscall) -> CanonicalForm {
    // A synthetic flags argument is unwrapped to its original value before
    // flag-testing (grounded on `_process_openat`'s `arg2.original_value`
    // special-case).
    let f = match s.arguments.get(2) {
        Some(Argument::Literal(Literal {
            value: LiteralValue::Synthetic(sv),
            ..
        })) => raw_value(&sv.original).as_i128().unwrap_or(0),
        _ => arg_value(s, 2).as_i128().unwrap_or(0),
    };
    let create = f & flags::O_CREAT as i128 == flags::O_CREAT as i128;
    let tmpfile = f & flags::O_TMPFILE as i128 == flags::O_TMPFILE as i128;
    let path = get_full_path(&arg_value(s, 0), &arg_value(s, 1));
    if create || tmpfile {
        CanonicalForm::new("open", vec![path, arg_value(s, 3)])
    } else {
        CanonicalForm::new("open", vec![path])
    }
}

fn process_pipe(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new(&s.name, vec![])
}

fn process_pipe2(_s: &Syscall) -> CanonicalForm {
    CanonicalForm::new("pipe", vec![])
}

fn process_dup(s: &Syscall) -> CanonicalForm {
    default_process_syscall(s)
}

fn process_dup2_or_3(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new("dup", vec![arg_value(s, 0)])
}

fn process_fcntl(s: &Syscall) -> CanonicalForm {
    let cmd = arg_value(s, 1).as_i128().unwrap_or(-1);
    let lock_cmds = [
        flags::F_SETLK,
        flags::F_SETLKW,
        flags::F_GETLK,
        flags::F_SETLK64,
        flags::F_SETLKW64,
        flags::F_GETLK64,
        flags::F_OFD_SETLK,
        flags::F_OFD_SETLKW,
        flags::F_OFD_GETLK,
    ];
    if lock_cmds.iter().any(|c| *c as i128 == cmd) {
        let lock_struct = arg_value(s, 2);
        let first = lock_struct
            .as_tuple()
            .and_then(|t| t.first())
            .cloned()
            .unwrap_or(CanonicalValue::Null);
        return CanonicalForm::new("fcntl", vec![arg_value(s, 0), arg_value(s, 1), first]);
    }
    if cmd == flags::F_GETOWN_EX as i128 {
        return CanonicalForm::new("fcntl", vec![arg_value(s, 0), arg_value(s, 1)]);
    }
    let values = (0..s.arguments.len()).map(|i| arg_value(s, i)).collect();
    CanonicalForm::new("fcntl", values)
}

fn process_clone(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new(&s.name, vec![arg_value(s, 0), arg_value(s, 1)])
}

fn process_sigaction(s: &Syscall) -> CanonicalForm {
    let mut act = arg_value(s, 1);
    if let CanonicalValue::Tuple(items) = &act {
        act = CanonicalValue::Tuple(items.get(1..3).unwrap_or(&[]).to_vec());
    }
    let oldact = arg_value(s, 2);
    let oldact = if oldact.as_tuple().is_some() {
        CanonicalValue::Bool(true)
    } else {
        oldact
    };
    CanonicalForm::new("sigaction", vec![arg_value(s, 0), act, oldact])
}

fn process_sigprocmask(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new(
        "sigprocmask",
        vec![
            arg_value(s, 0),
            arg_value(s, 1),
            CanonicalValue::Bool(arg_is_collection(s, 2)),
        ],
    )
}

fn process_sigaltstack(s: &Syscall) -> CanonicalForm {
    let mut ss = arg_value(s, 0);
    if let CanonicalValue::Tuple(items) = &ss {
        ss = CanonicalValue::Tuple(items.get(1..).unwrap_or(&[]).to_vec());
    }
    CanonicalForm::new(
        &s.name,
        vec![ss, CanonicalValue::Bool(arg_is_collection(s, 1))],
    )
}

fn timespec_micros(v: &CanonicalValue, scale: i128) -> Option<i128> {
    if let CanonicalValue::Str(s) = v {
        if s == "NULL" {
            return None;
        }
    }
    let items = v.as_tuple()?;
    let sec = items.first()?.as_tuple().and_then(|t| t.get(1)).and_then(CanonicalValue::as_i128)?;
    let frac = items.get(1)?.as_tuple().and_then(|t| t.get(1)).and_then(CanonicalValue::as_i128)?;
    Some(sec + frac * scale)
}

fn process_select(s: &Syscall) -> CanonicalForm {
    let timeout = arg_value(s, 4);
    let time = timespec_micros(&timeout, 1_000_000);
    CanonicalForm::new(
        &s.name,
        vec![
            arg_value(s, 1),
            arg_value(s, 2),
            arg_value(s, 3),
            time.map(CanonicalValue::Number).unwrap_or(CanonicalValue::Null),
        ],
    )
}

fn process_pselect(s: &Syscall) -> CanonicalForm {
    let timeout = arg_value(s, 4);
    let time = timespec_micros(&timeout, 1_000_000_000);
    CanonicalForm::new(
        "select",
        vec![
            arg_value(s, 1),
            arg_value(s, 2),
            arg_value(s, 3),
            time.map(CanonicalValue::Number).unwrap_or(CanonicalValue::Null),
        ],
    )
}

fn process_unlink(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new(&s.name, vec![arg_value(s, 0)])
}

fn process_unlinkat(s: &Syscall) -> CanonicalForm {
    let dir_fd = arg_value(s, 0);
    let pathname = arg_value(s, 1);
    let at_flags = arg_value(s, 2).as_i128().unwrap_or(0);
    let path = get_full_path(&dir_fd, &pathname);
    if at_flags & flags::AT_REMOVEDIR as i128 != 0 {
        CanonicalForm::new("rmdir", vec![path])
    } else {
        CanonicalForm::new("unlink", vec![path])
    }
}

fn process_wait(_s: &Syscall) -> CanonicalForm {
    CanonicalForm::new("wait", vec![CanonicalValue::Number(flags::P_ALL as i128)])
}

fn process_waitpid(s: &Syscall) -> CanonicalForm {
    let pid = arg_value(s, 0).as_i128().unwrap_or(0);
    if pid < -1 {
        CanonicalForm::new(
            "wait",
            vec![CanonicalValue::Number(flags::P_PGID as i128), CanonicalValue::Number(-pid)],
        )
    } else if pid == -1 {
        CanonicalForm::new("wait", vec![CanonicalValue::Number(flags::P_ALL as i128)])
    } else if pid == 0 {
        CanonicalForm::new(
            "wait",
            vec![CanonicalValue::Number(flags::P_PGID as i128), CanonicalValue::Number(0)],
        )
    } else {
        CanonicalForm::new(
            "wait",
            vec![CanonicalValue::Number(flags::P_PID as i128), CanonicalValue::Number(pid)],
        )
    }
}

fn process_waitid(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new("wait", vec![arg_value(s, 0), arg_value(s, 1)])
}

fn process_wait3(_s: &Syscall) -> CanonicalForm {
    CanonicalForm::new("wait", vec![CanonicalValue::Number(flags::P_ALL as i128)])
}

fn process_wait4(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new(
        "wait",
        vec![CanonicalValue::Number(flags::P_PID as i128), arg_value(s, 0)],
    )
}

fn splice_buffer(s: &Syscall, index: usize) -> Vec<CanonicalValue> {
    match arg_value(s, index) {
        CanonicalValue::Tuple(items) => items,
        other => vec![other],
    }
}

fn process_send(s: &Syscall) -> CanonicalForm {
    let mut values = vec![arg_value(s, 0)];
    values.extend(splice_buffer(s, 1));
    values.push(arg_value(s, 2));
    values.push(arg_value(s, 3));
    CanonicalForm::new(&s.name, values)
}

fn process_sendto(s: &Syscall) -> CanonicalForm {
    let mut values = vec![arg_value(s, 0)];
    values.extend(splice_buffer(s, 1));
    values.push(arg_value(s, 2));
    values.push(arg_value(s, 3));
    CanonicalForm::new("send", values)
}

fn process_poll(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new(&s.name, vec![arg_value(s, 0), arg_value(s, 1), arg_value(s, 2)])
}

fn process_ppoll(s: &Syscall) -> CanonicalForm {
    let timespec = arg_value(s, 3);
    let millis = timespec_micros(&timespec, 0).map(|sec_part| {
        let items = timespec.as_tuple().unwrap_or(&[]);
        let sec = items.first().and_then(|t| t.as_tuple()).and_then(|t| t.get(1)).and_then(CanonicalValue::as_i128).unwrap_or(0);
        let nsec = items.get(1).and_then(|t| t.as_tuple()).and_then(|t| t.get(1)).and_then(CanonicalValue::as_i128).unwrap_or(0);
        let _ = sec_part;
        sec * 1000 + nsec / 1_000_000
    });
    CanonicalForm::new(
        "poll",
        vec![
            arg_value(s, 0),
            arg_value(s, 1),
            millis.map(CanonicalValue::Number).unwrap_or(CanonicalValue::Null),
        ],
    )
}

fn process_set_tid_address(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new(&s.name, vec![])
}

fn process_faccessat(s: &Syscall) -> CanonicalForm {
    let path = get_full_path(&arg_value(s, 0), &arg_value(s, 1));
    CanonicalForm::new("access", vec![path, arg_value(s, 2)])
}

/// `default_process_syscall` under a different canonical name, for variants
/// whose argument shape is otherwise identical to their canonical sibling
/// (the 32-bit id syscalls, `getdents64`).
fn rename_default(s: &Syscall, name: &str) -> CanonicalForm {
    let mut form = default_process_syscall(s);
    form.name = name.to_string();
    form
}

/// `stat`/`lstat`/`stat64`/`lstat64`: a bare path argument, return struct
/// dropped.
fn process_stat_path(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new("stat", vec![arg_value(s, 0)])
}

/// `fstat`/`fstat64`: a bare fd argument, return struct dropped.
fn process_fstat(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new("stat", vec![arg_value(s, 0)])
}

/// `newfstatat`/`fstatat`/`fstatat64`: dirfd+path resolved to a full path
/// (as `faccessat` does), return struct dropped, flags retained.
fn process_fstatat(s: &Syscall) -> CanonicalForm {
    let path = get_full_path(&arg_value(s, 0), &arg_value(s, 1));
    CanonicalForm::new("stat", vec![path, arg_value(s, 3)])
}

/// `execve`/`execveat` collapse to `execve`: path resolved (via dirfd for
/// `execveat`), argv/envp retained, trailing flags dropped.
fn process_execve(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new("execve", vec![arg_value(s, 0), arg_value(s, 1), arg_value(s, 2)])
}

fn process_execveat(s: &Syscall) -> CanonicalForm {
    let path = get_full_path(&arg_value(s, 0), &arg_value(s, 1));
    CanonicalForm::new("execve", vec![path, arg_value(s, 2), arg_value(s, 3)])
}

/// `mmap`/`mmap2` collapse to `mmap`: `mmap2`'s offset argument is in
/// 4096-byte page units rather than bytes, so it's rescaled to match
/// `mmap`'s byte offset before comparison.
fn process_mmap(s: &Syscall) -> CanonicalForm {
    CanonicalForm::new(
        "mmap",
        vec![arg_value(s, 0), arg_value(s, 1), arg_value(s, 2), arg_value(s, 3), arg_value(s, 4), arg_value(s, 5)],
    )
}

fn process_mmap2(s: &Syscall) -> CanonicalForm {
    const PAGE_SIZE: i128 = 4096;
    let offset = match arg_value(s, 5).as_i128() {
        Some(pages) => CanonicalValue::Number(pages * PAGE_SIZE),
        None => arg_value(s, 5),
    };
    CanonicalForm::new(
        "mmap",
        vec![arg_value(s, 0), arg_value(s, 1), arg_value(s, 2), arg_value(s, 3), arg_value(s, 4), offset],
    )
}

/// Dispatch a syscall to its canonicalization rule, falling back to
/// [`default_process_syscall`].
pub fn canonicalize(s: &Syscall) -> CanonicalForm {
    match s.name.as_str() {
        "open" => process_open(s),
        "creat" => process_creat(s),
        "openat" => process_openat(s),
        "pipe" => process_pipe(s),
        "pipe2" => process_pipe2(s),
        "dup" => process_dup(s),
        "dup2" | "dup3" => process_dup2_or_3(s),
        "fcntl" | "fcntl64" => process_fcntl(s),
        "clone" => process_clone(s),
        "rt_sigaction" | "sigaction" => process_sigaction(s),
        "rt_sigprocmask" | "sigprocmask" => process_sigprocmask(s),
        "sigaltstack" => process_sigaltstack(s),
        "select" => process_select(s),
        "pselect6" | "pselect" => process_pselect(s),
        "unlink" => process_unlink(s),
        "unlinkat" => process_unlinkat(s),
        "wait" => process_wait(s),
        "waitpid" => process_waitpid(s),
        "waitid" => process_waitid(s),
        "wait3" => process_wait3(s),
        "wait4" => process_wait4(s),
        "send" => process_send(s),
        "sendto" => process_sendto(s),
        "poll" => process_poll(s),
        "ppoll" => process_ppoll(s),
        "set_tid_address" => process_set_tid_address(s),
        "faccessat" => process_faccessat(s),
        "stat" | "lstat" | "stat64" | "lstat64" => process_stat_path(s),
        "fstat" | "fstat64" => process_fstat(s),
        "newfstatat" | "fstatat" | "fstatat64" => process_fstatat(s),
        "execve" => process_execve(s),
        "execveat" => process_execveat(s),
        "mmap" => process_mmap(s),
        "mmap2" => process_mmap2(s),
        "getdents64" => rename_default(s, "getdents"),
        "chown32" => rename_default(s, "chown"),
        "fchown32" => rename_default(s, "fchown"),
        "lchown32" => rename_default(s, "lchown"),
        "getuid32" => rename_default(s, "getuid"),
        "geteuid32" => rename_default(s, "geteuid"),
        "getgid32" => rename_default(s, "getgid"),
        "getegid32" => rename_default(s, "getegid"),
        "setuid32" => rename_default(s, "setuid"),
        "setgid32" => rename_default(s, "setgid"),
        "setreuid32" => rename_default(s, "setreuid"),
        "setregid32" => rename_default(s, "setregid"),
        "setresuid32" => rename_default(s, "setresuid"),
        "setresgid32" => rename_default(s, "setresgid"),
        "getresuid32" => rename_default(s, "getresuid"),
        "getresgid32" => rename_default(s, "getresgid"),
        "setfsuid32" => rename_default(s, "setfsuid"),
        "setfsgid32" => rename_default(s, "setfsgid"),
        "getgroups32" => rename_default(s, "getgroups"),
        "setgroups32" => rename_default(s, "setgroups"),
        _ => default_process_syscall(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{NumberBase, Syscall};

    fn num(v: i128) -> Argument {
        Argument::Literal(Literal::new(LiteralValue::Number {
            value: v,
            base: NumberBase::Decimal,
        }))
    }

    fn path(p: &str) -> Argument {
        Argument::Literal(Literal::new(LiteralValue::String {
            value: p.to_string(),
            truncated: false,
        }))
    }

    fn open_call(flags_val: i128) -> Syscall {
        let mut s = Syscall::new("open");
        s.arguments = vec![path("/etc/passwd"), num(flags_val), num(0o644)];
        s
    }

    fn openat_call(flags_val: i128) -> Syscall {
        let mut s = Syscall::new("openat");
        s.arguments = vec![num(flags::AT_FDCWD as i128), path("/etc/passwd"), num(flags_val), num(0o644)];
        s
    }

    #[test]
    fn open_and_openat_canonicalize_equal_when_not_creating() {
        let a = canonicalize(&open_call(0));
        let b = canonicalize(&openat_call(0));
        assert_eq!(a, b);
        assert_eq!(a.values.len(), 1);
    }

    #[test]
    fn open_drops_mode_without_o_creat() {
        let form = canonicalize(&open_call(0));
        assert_eq!(form.values, vec![CanonicalValue::Str("/etc/passwd".into())]);
    }

    #[test]
    fn open_keeps_mode_with_o_creat() {
        let form = canonicalize(&open_call(flags::O_CREAT as i128));
        assert_eq!(form.values.len(), 2);
    }

    #[test]
    fn creat_always_keeps_mode_and_canonicalizes_to_open() {
        let mut s = Syscall::new("creat");
        s.arguments = vec![path("/tmp/x"), num(0o644)];
        let form = canonicalize(&s);
        assert_eq!(form.name, "open");
        assert_eq!(form.values.len(), 2);
    }

    #[test]
    fn waitpid_dispatches_on_pid_sign() {
        let mut s = Syscall::new("waitpid");
        s.arguments = vec![num(-5)];
        let form = canonicalize(&s);
        assert_eq!(
            form,
            CanonicalForm::new("wait", vec![CanonicalValue::Number(flags::P_PGID as i128), CanonicalValue::Number(5)])
        );

        let mut s2 = Syscall::new("waitpid");
        s2.arguments = vec![num(-1)];
        assert_eq!(canonicalize(&s2).values, vec![CanonicalValue::Number(flags::P_ALL as i128)]);

        let mut s3 = Syscall::new("waitpid");
        s3.arguments = vec![num(42)];
        assert_eq!(
            canonicalize(&s3).values,
            vec![CanonicalValue::Number(flags::P_PID as i128), CanonicalValue::Number(42)]
        );
    }

    #[test]
    fn wait4_always_dispatches_p_pid_regardless_of_sign() {
        let mut s = Syscall::new("wait4");
        s.arguments = vec![num(-7)];
        assert_eq!(
            canonicalize(&s).values,
            vec![CanonicalValue::Number(flags::P_PID as i128), CanonicalValue::Number(-7)]
        );
    }

    #[test]
    fn pipe_and_pipe2_canonicalize_to_bare_pipe() {
        let mut p1 = Syscall::new("pipe");
        p1.arguments = vec![num(3), num(4)];
        let mut p2 = Syscall::new("pipe2");
        p2.arguments = vec![num(3), num(4), num(0x80000)];
        assert_eq!(canonicalize(&p1), canonicalize(&p2));
        assert!(canonicalize(&p1).values.is_empty());
    }

    #[test]
    fn unlinkat_dispatches_on_at_removedir() {
        let mut s = Syscall::new("unlinkat");
        s.arguments = vec![num(flags::AT_FDCWD as i128), path("/tmp/d"), num(flags::AT_REMOVEDIR as i128)];
        assert_eq!(canonicalize(&s).name, "rmdir");

        let mut s2 = Syscall::new("unlinkat");
        s2.arguments = vec![num(flags::AT_FDCWD as i128), path("/tmp/f"), num(0)];
        assert_eq!(canonicalize(&s2).name, "unlink");
    }

    #[test]
    fn fcntl_lock_commands_keep_only_lock_type() {
        let mut s = Syscall::new("fcntl");
        let lock_struct = Literal::new(LiteralValue::Collection {
            bracketing: Bracketing::Struct,
            items: vec![Literal::new(LiteralValue::Identifier("F_RDLCK".into()))],
        });
        s.arguments = vec![num(3), num(flags::F_SETLK as i128), Argument::Literal(lock_struct)];
        let form = canonicalize(&s);
        assert_eq!(form.values.len(), 3);
        assert_eq!(form.values[2], CanonicalValue::Identifier("F_RDLCK".into()));
    }

    #[test]
    fn default_process_drops_omitted_arguments() {
        let mut s = Syscall::new("read");
        s.arguments = vec![num(3), Argument::Omitted, num(1024)];
        let form = canonicalize(&s);
        assert_eq!(form.values.len(), 2);
    }

    #[test]
    fn stat_family_canonicalizes_to_stat() {
        let mut stat = Syscall::new("stat");
        stat.arguments = vec![path("/etc/passwd")];
        let mut stat64 = Syscall::new("stat64");
        stat64.arguments = vec![path("/etc/passwd")];
        let mut lstat = Syscall::new("lstat");
        lstat.arguments = vec![path("/etc/passwd")];

        let a = canonicalize(&stat);
        let b = canonicalize(&stat64);
        let c = canonicalize(&lstat);
        assert_eq!(a.name, "stat");
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn fstat_and_fstatat_collapse_into_stat() {
        let mut fstat = Syscall::new("fstat");
        fstat.arguments = vec![num(3)];
        let mut fstat64 = Syscall::new("fstat64");
        fstat64.arguments = vec![num(3)];
        assert_eq!(canonicalize(&fstat), canonicalize(&fstat64));
        assert_eq!(canonicalize(&fstat).name, "stat");

        let mut newfstatat = Syscall::new("newfstatat");
        newfstatat.arguments = vec![num(flags::AT_FDCWD as i128), path("/etc/passwd"), num(0), num(0)];
        let form = canonicalize(&newfstatat);
        assert_eq!(form.name, "stat");
        assert_eq!(form.values[0], CanonicalValue::Str("/etc/passwd".into()));
    }

    #[test]
    fn execve_and_execveat_collapse_into_execve() {
        let mut execve = Syscall::new("execve");
        execve.arguments = vec![path("/bin/true"), num(0), num(0)];
        let mut execveat = Syscall::new("execveat");
        execveat.arguments = vec![num(flags::AT_FDCWD as i128), path("/bin/true"), num(0), num(0), num(0)];
        let a = canonicalize(&execve);
        let b = canonicalize(&execveat);
        assert_eq!(a.name, "execve");
        assert_eq!(a, b);
    }

    #[test]
    fn mmap_and_mmap2_collapse_with_rescaled_offset() {
        let mut mmap = Syscall::new("mmap");
        mmap.arguments = vec![num(0), num(4096), num(3), num(0x22), num(-1), num(4096)];
        let mut mmap2 = Syscall::new("mmap2");
        mmap2.arguments = vec![num(0), num(4096), num(3), num(0x22), num(-1), num(1)];
        let a = canonicalize(&mmap);
        let b = canonicalize(&mmap2);
        assert_eq!(a.name, "mmap");
        assert_eq!(a, b);
    }

    #[test]
    fn thirty_two_bit_id_variants_canonicalize_to_their_64_bit_name() {
        let mut getuid32 = Syscall::new("getuid32");
        getuid32.arguments = vec![];
        let mut getuid = Syscall::new("getuid");
        getuid.arguments = vec![];
        assert_eq!(canonicalize(&getuid32), canonicalize(&getuid));

        let mut chown32 = Syscall::new("chown32");
        chown32.arguments = vec![path("/etc/passwd"), num(0), num(0)];
        let mut chown = Syscall::new("chown");
        chown.arguments = vec![path("/etc/passwd"), num(0), num(0)];
        assert_eq!(canonicalize(&chown32), canonicalize(&chown));
    }

    #[test]
    fn getdents64_canonicalizes_to_getdents() {
        let mut s = Syscall::new("getdents64");
        s.arguments = vec![num(3), num(32768)];
        assert_eq!(canonicalize(&s).name, "getdents");
    }
}
