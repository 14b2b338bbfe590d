//! Recursive-descent parser producing the trace model (C2, half two).
//!
//! Grounded on `original_source/lib/strace/parser.py::StraceVisitorImpl`
//! for the AST shapes it builds (in particular: the top-level mapping
//! attached to a whole syscall vs. a per-argument `=>` result mapping, the
//! `IDENTIFIER` prefix on a literal being the argument's *name* rather than
//! its value, and the four/five file-descriptor constructor shapes) and on
//! `parser.py::_parse_input_stream`'s `BailErrorListener`/
//! `LexCancellationException` for the fail-fast policy: the first
//! recognition failure raises immediately with the five preceding tokens,
//! no partial-recovery attempt.

use std::collections::VecDeque;

use crate::error::ParseError;
use crate::lexer::{Lexer, SpannedToken, Token};
use crate::trace::{
    Argument, Bracketing, ExitCode, ExitStatement, FileDescriptor, Literal, LiteralValue, Signal,
    Syscall, TraceLine,
};

const DIAGNOSTIC_HISTORY: usize = 5;

/// Folds a `<unfinished ...>`/`<... resumed>` pair produced as two separate
/// trace lines (one per pid, since other syscalls and signals may be
/// interleaved between them) into a single [`Syscall`] carrying both flags
/// and the concatenated argument list, matching spec.md §4.4's "emit a
/// single Syscall with resumed=true/unfinished=true and merge the argument
/// lists textually as they appear."
fn merge_resumed_syscalls(lines: Vec<TraceLine>) -> Vec<TraceLine> {
    use std::collections::HashMap;
    let mut result: Vec<TraceLine> = Vec::with_capacity(lines.len());
    let mut pending: HashMap<Option<i64>, usize> = HashMap::new();
    for line in lines {
        match line {
            TraceLine::Syscall(mut syscall) if syscall.resumed => {
                if let Some(idx) = pending.remove(&syscall.pid) {
                    if let TraceLine::Syscall(prev) = &mut result[idx] {
                        prev.arguments.append(&mut syscall.arguments);
                        prev.exit_code = syscall.exit_code;
                        prev.notes = syscall.notes;
                        prev.resumed = true;
                        continue;
                    }
                }
                result.push(TraceLine::Syscall(syscall));
            }
            TraceLine::Syscall(syscall) if syscall.unfinished => {
                pending.insert(syscall.pid, result.len());
                result.push(TraceLine::Syscall(syscall));
            }
            other => result.push(other),
        }
    }
    result
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: SpannedToken,
    lookahead: Option<SpannedToken>,
    history: VecDeque<SpannedToken>,
}

/// Parses the full textual output of one tracer session into trace lines
/// plus the `TRUNCATED` flag.
pub fn parse(source: &str) -> Result<(Vec<TraceLine>, bool), ParseError> {
    let mut parser = Parser::new(source)?;
    parser.parse_strace()
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            lookahead: None,
            history: VecDeque::with_capacity(DIAGNOSTIC_HISTORY),
        })
    }

    fn bump(&mut self) -> Result<Token, ParseError> {
        let next = match self.lookahead.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        let old = std::mem::replace(&mut self.current, next);
        if self.history.len() == DIAGNOSTIC_HISTORY {
            self.history.pop_front();
        }
        let token = old.token.clone();
        self.history.push_back(old);
        Ok(token)
    }

    /// One token beyond `current`, without consuming either.
    fn peek2(&mut self) -> Result<&Token, ParseError> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.next_token()?);
        }
        Ok(&self.lookahead.as_ref().unwrap().token)
    }

    fn fail(&self, message: impl Into<String>) -> ParseError {
        let context = self
            .history
            .iter()
            .map(|t| format!("{:?}", t.token))
            .collect::<Vec<_>>()
            .join(", ");
        ParseError {
            line: self.current.line,
            column: self.current.column,
            message: message.into(),
            context,
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), ParseError> {
        if &self.current.token == expected {
            self.bump()?;
            Ok(())
        } else {
            Err(self.fail(format!(
                "expected {expected:?}, found {:?}",
                self.current.token
            )))
        }
    }

    fn skip_newlines(&mut self) -> Result<(), ParseError> {
        while self.current.token == Token::Newline {
            self.bump()?;
        }
        Ok(())
    }

    fn parse_strace(&mut self) -> Result<(Vec<TraceLine>, bool), ParseError> {
        let mut lines = Vec::new();
        let mut truncated = false;
        self.skip_newlines()?;
        loop {
            if self.current.token == Token::Eof {
                break;
            }
            if self.current.token == Token::Ident("TRUNCATED".to_string()) {
                self.bump()?;
                truncated = true;
                self.skip_newlines()?;
                continue;
            }
            lines.push(self.parse_trace_line()?);
            self.skip_newlines()?;
        }
        Ok((merge_resumed_syscalls(lines), truncated))
    }

    fn parse_trace_line(&mut self) -> Result<TraceLine, ParseError> {
        let pid = self.try_parse_pid()?;

        match &self.current.token {
            Token::PlusPlusPlus => {
                self.bump()?;
                let stmt = self.parse_exit_statement()?;
                self.expect(&Token::PlusPlusPlus)?;
                let _ = pid;
                Ok(TraceLine::Exit(stmt))
            }
            Token::MinusMinusMinus => {
                self.bump()?;
                let signal = self.parse_signal()?;
                self.expect(&Token::MinusMinusMinus)?;
                Ok(TraceLine::Signal(signal))
            }
            Token::ResumedMarker(_) | Token::Ident(_) => {
                let mut syscall = self.parse_syscall()?;
                syscall.pid = pid;
                Ok(TraceLine::Syscall(syscall))
            }
            other => Err(self.fail(format!("unexpected start of trace line: {other:?}"))),
        }
    }

    fn try_parse_pid(&mut self) -> Result<Option<i64>, ParseError> {
        if let Token::Number(value, _) = &self.current.token {
            let value = *value;
            self.bump()?;
            Ok(Some(value as i64))
        } else {
            Ok(None)
        }
    }

    fn parse_exit_statement(&mut self) -> Result<ExitStatement, ParseError> {
        match &self.current.token {
            Token::Ident(word) if word == "exited" => {
                self.bump()?;
                self.expect_word("with")?;
                let value = self.expect_number()?;
                Ok(ExitStatement::Exited(value as i64))
            }
            Token::Ident(word) if word == "killed" => {
                self.bump()?;
                self.expect_word("by")?;
                let name = self.expect_ident()?;
                Ok(ExitStatement::Killed(name))
            }
            other => Err(self.fail(format!("expected `exited with` or `killed by`, found {other:?}"))),
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<(), ParseError> {
        match &self.current.token {
            Token::Ident(found) if found == word => {
                self.bump()?;
                Ok(())
            }
            other => Err(self.fail(format!("expected `{word}`, found {other:?}"))),
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.current.token.clone() {
            Token::Ident(name) => {
                self.bump()?;
                Ok(name)
            }
            other => Err(self.fail(format!("expected identifier, found {other:?}"))),
        }
    }

    fn expect_number(&mut self) -> Result<i128, ParseError> {
        match &self.current.token {
            Token::Number(value, _) => {
                let value = *value;
                self.bump()?;
                Ok(value)
            }
            other => Err(self.fail(format!("expected number, found {other:?}"))),
        }
    }

    fn parse_signal(&mut self) -> Result<Signal, ParseError> {
        let name = self.expect_ident()?;
        let payload = if self.current.token == Token::LBrace {
            self.parse_brace_payload()?
        } else {
            Vec::new()
        };
        Ok(Signal { name, payload })
    }

    fn parse_brace_payload(&mut self) -> Result<Vec<Literal>, ParseError> {
        self.expect(&Token::LBrace)?;
        let mut items = Vec::new();
        while self.current.token != Token::RBrace {
            items.push(self.parse_literal()?);
            if self.current.token == Token::Comma {
                self.bump()?;
            } else {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(items)
    }

    fn parse_syscall(&mut self) -> Result<Syscall, ParseError> {
        let (name, already_open, mut syscall) = match self.current.token.clone() {
            Token::ResumedMarker(name) => {
                self.bump()?;
                let mut syscall = Syscall::new(name.clone());
                syscall.resumed = true;
                (name, true, syscall)
            }
            Token::Ident(name) => {
                self.bump()?;
                (name.clone(), false, Syscall::new(name))
            }
            other => return Err(self.fail(format!("expected syscall name, found {other:?}"))),
        };
        let _ = name;

        if !already_open {
            self.expect(&Token::LParen)?;
        }

        loop {
            if self.current.token == Token::RParen {
                self.bump()?;
                break;
            }
            if self.current.token == Token::UnfinishedMarker {
                self.bump()?;
                syscall.unfinished = true;
                return Ok(syscall);
            }
            syscall.arguments.push(self.parse_argument()?);
            if self.current.token == Token::Comma {
                self.bump()?;
            }
        }

        self.expect(&Token::Equals)?;
        match &self.current.token {
            Token::Question => {
                self.bump()?;
                syscall.exit_code = Some(ExitCode::Unknown);
            }
            Token::Number(value, _) => {
                let value = *value;
                self.bump()?;
                syscall.exit_code = Some(ExitCode::Number(value as i64));
            }
            other => return Err(self.fail(format!("expected exit code, found {other:?}"))),
        }
        syscall.notes = self.lexer.consume_rest_of_line();
        Ok(syscall)
    }

    fn parse_argument(&mut self) -> Result<Argument, ParseError> {
        if self.current.token == Token::Ellipsis {
            self.bump()?;
            return Ok(Argument::Omitted);
        }
        Ok(Argument::Literal(self.parse_literal()?))
    }

    /// A literal may be prefixed by `IDENTIFIER=` naming the argument
    /// (`flags=O_RDONLY`) and suffixed by `=> dest` naming a per-argument
    /// result mapping.
    fn parse_literal(&mut self) -> Result<Literal, ParseError> {
        let identifier = if matches!(self.current.token, Token::Ident(_))
            && matches!(self.peek2()?, Token::Equals)
        {
            let name = match self.bump()? {
                Token::Ident(name) => name,
                _ => unreachable!(),
            };
            self.bump()?; // =
            Some(name)
        } else {
            None
        };

        let value = self.parse_literal_value()?;
        let mut literal = Literal::new(value);
        if let Some(id) = identifier {
            literal = literal.with_identifier(id);
        }

        if self.current.token == Token::FatArrow {
            self.bump()?;
            let dest = self.parse_literal()?;
            literal = literal.with_mapping(dest);
        }

        Ok(literal)
    }

    fn parse_literal_value(&mut self) -> Result<LiteralValue, ParseError> {
        match self.current.token.clone() {
            Token::Ident(word) if word == "NULL" => {
                self.bump()?;
                Ok(LiteralValue::Null)
            }
            Token::Number(value, base) => {
                self.bump()?;
                // `N<...>` is a file-descriptor annotation on the integer
                // fd `N`, not two separate argument literals.
                if self.current.token == Token::Lt {
                    self.bump()?;
                    let fd = self.parse_file_descriptor(value as i64)?;
                    return Ok(LiteralValue::FileDescriptor(fd));
                }
                Ok(LiteralValue::Number { value, base })
            }
            Token::Str { value, truncated } => {
                self.bump()?;
                Ok(LiteralValue::String { value, truncated })
            }
            Token::LBracket => self.parse_collection(Bracketing::List, Token::RBracket),
            Token::LBrace => self.parse_collection(Bracketing::Struct, Token::RBrace),
            Token::LParen => self.parse_collection(Bracketing::Paren, Token::RParen),
            Token::Ident(name) => {
                self.bump()?;
                if self.current.token == Token::LParen {
                    self.bump()?;
                    let mut arguments = Vec::new();
                    while self.current.token != Token::RParen {
                        arguments.push(self.parse_literal()?);
                        if self.current.token == Token::Comma {
                            self.bump()?;
                        } else {
                            break;
                        }
                    }
                    self.expect(&Token::RParen)?;
                    return Ok(LiteralValue::FunctionCall {
                        identifier: name,
                        arguments,
                    });
                }
                Ok(LiteralValue::Identifier(name))
            }
            Token::Lt => {
                self.bump()?;
                let fd = self.parse_file_descriptor(0)?;
                Ok(LiteralValue::FileDescriptor(fd))
            }
            other => Err(self.fail(format!("expected a literal value, found {other:?}"))),
        }
    }

    fn parse_collection(
        &mut self,
        bracketing: Bracketing,
        close: Token,
    ) -> Result<LiteralValue, ParseError> {
        self.bump()?; // opening bracket already validated by caller match
        let mut items = Vec::new();
        while self.current.token != close {
            items.push(self.parse_literal()?);
            if self.current.token == Token::Comma {
                self.bump()?;
            } else {
                break;
            }
        }
        self.expect(&close)?;
        Ok(LiteralValue::Collection { bracketing, items })
    }

    /// Assembles one of the file-descriptor shapes from the atomic tokens
    /// the lexer produced inside fd-contents /
    /// device-contents / fd-info mode, mirroring
    /// `parser.py::visitFile_descriptor`'s dispatch on which grammar
    /// alternative matched.
    fn parse_file_descriptor(&mut self, fd: i64) -> Result<FileDescriptor, ParseError> {
        // Device form: `char MAJOR:MINOR /path` or `block MAJOR:MINOR /path`.
        if let Token::Ident(word) = &self.current.token {
            if word == "char" || word == "block" {
                let device_type = word.clone();
                self.bump()?;
                let major = self.expect_number()?;
                self.expect(&Token::Colon)?;
                let minor = self.expect_number()?;
                let path = self.expect_ident()?;
                self.expect(&Token::Gt)?;
                return Ok(FileDescriptor::Device {
                    fd,
                    device_type,
                    major: major as i64,
                    minor: minor as i64,
                    path,
                });
            }
        }

        // Socket forms: `PROTOCOL:[ ... ]`, disambiguated by protocol name
        // and the shape of what follows.
        if let Token::Ident(protocol) = self.current.token.clone() {
            if matches!(protocol.as_str(), "TCP" | "UDP" | "UNIX" | "socket") {
                self.bump()?;
                if self.current.token == Token::Colon {
                    self.bump()?; // already entered FdInfo by lexer on `:[`
                    return self.parse_socket_info(fd, protocol);
                }
                // Bare protocol word with no `:[` info (rare) — treat the
                // rest as a path so parsing can still terminate cleanly.
                while let Token::Ident(_) = &self.current.token {
                    self.bump()?;
                }
                self.expect(&Token::Gt)?;
                return Ok(FileDescriptor::Inode {
                    fd,
                    protocol,
                    inode: 0,
                    reference: None,
                    bind: None,
                });
            }
            if protocol == "NETLINK" {
                self.bump()?;
                self.expect(&Token::Colon)?;
                return self.parse_netlink_info(fd, protocol);
            }
        }

        // Default: plain path.
        let mut path = String::new();
        loop {
            match self.current.token.clone() {
                Token::Ident(part) => {
                    path.push_str(&part);
                    self.bump()?;
                }
                Token::Gt => break,
                other => return Err(self.fail(format!("expected path or `>`, found {other:?}"))),
            }
        }
        self.expect(&Token::Gt)?;
        Ok(FileDescriptor::Path { fd, path })
    }

    fn parse_socket_info(&mut self, fd: i64, protocol: String) -> Result<FileDescriptor, ParseError> {
        // Already inside `[...]`; lexer pushed FdInfo on `:[`.
        // IP form: one or two addresses separated by `->`.
        if let Token::Ident(_) = &self.current.token {
            let first = self.expect_ident()?;
            if self.current.token == Token::Arrow {
                self.bump()?;
                let second = self.expect_ident()?;
                self.expect(&Token::RBracket)?;
                self.expect(&Token::Gt)?;
                return Ok(FileDescriptor::Ip {
                    fd,
                    protocol,
                    source: Some(first),
                    destination: second,
                });
            }
            // Single inode number only.
            if let Ok(inode) = first.parse::<i64>() {
                let reference = if self.current.token == Token::Arrow {
                    self.bump()?;
                    Some(self.expect_number()? as i64)
                } else {
                    None
                };
                let bind = if self.current.token == Token::Comma {
                    self.bump()?;
                    Some(self.expect_ident()?)
                } else {
                    None
                };
                self.expect(&Token::RBracket)?;
                self.expect(&Token::Gt)?;
                return Ok(FileDescriptor::Inode {
                    fd,
                    protocol,
                    inode,
                    reference,
                    bind,
                });
            }
            self.expect(&Token::RBracket)?;
            self.expect(&Token::Gt)?;
            return Ok(FileDescriptor::Ip {
                fd,
                protocol,
                source: None,
                destination: first,
            });
        }
        if let Token::Number(value, _) = &self.current.token {
            let value = *value;
            self.bump()?;
            let reference = if self.current.token == Token::Arrow {
                self.bump()?;
                Some(self.expect_number()? as i64)
            } else {
                None
            };
            let bind = if self.current.token == Token::Comma {
                self.bump()?;
                Some(self.expect_ident()?)
            } else {
                None
            };
            self.expect(&Token::RBracket)?;
            self.expect(&Token::Gt)?;
            return Ok(FileDescriptor::Inode {
                fd,
                protocol,
                inode: value as i64,
                reference,
                bind,
            });
        }
        Err(self.fail("malformed socket info"))
    }

    fn parse_netlink_info(&mut self, fd: i64, protocol: String) -> Result<FileDescriptor, ParseError> {
        let inode = self.expect_number()? as i64;
        let subprotocol = if self.current.token == Token::Comma {
            self.bump()?;
            Some(self.expect_ident()?)
        } else {
            None
        };
        let pid = if self.current.token == Token::Comma {
            self.bump()?;
            self.expect_number()? as i64
        } else {
            0
        };
        let _ = inode;
        self.expect(&Token::RBracket)?;
        self.expect(&Token::Gt)?;
        Ok(FileDescriptor::Netlink {
            fd,
            protocol,
            subprotocol,
            pid,
        })
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{ExitCode, NumberBase};

    #[test]
    fn parses_simple_openat_call() {
        let (lines, truncated) =
            parse(r#"1234 openat(AT_FDCWD, "/tmp/x", O_RDONLY) = 3"#).unwrap();
        assert!(!truncated);
        assert_eq!(lines.len(), 1);
        let syscall = lines[0].as_syscall().unwrap();
        assert_eq!(syscall.name, "openat");
        assert_eq!(syscall.pid, Some(1234));
        assert_eq!(syscall.exit_code, Some(ExitCode::Number(3)));
        assert_eq!(syscall.arguments.len(), 3);
    }

    #[test]
    fn parses_unfinished_and_resumed_pair_as_one_merged_syscall() {
        let (lines, _) = parse(
            "1 read(3, <unfinished ...>\n1 <... read resumed>\"data\", 4) = 4",
        )
        .unwrap();
        assert_eq!(lines.len(), 1);
        let merged = lines[0].as_syscall().unwrap();
        assert!(merged.unfinished);
        assert!(merged.resumed);
        assert_eq!(merged.name, "read");
        assert_eq!(merged.pid, Some(1));
        assert_eq!(merged.exit_code, Some(ExitCode::Number(4)));
        // "3" from the unfinished half, "data"/4 from the resumed half.
        assert_eq!(merged.arguments.len(), 3);
    }

    #[test]
    fn unfinished_syscall_survives_an_interleaved_signal_before_resuming() {
        let (lines, _) = parse(
            "1 read(3, <unfinished ...>\n1 --- SIGCHLD {si_signo=SIGCHLD} ---\n1 <... read resumed>\"data\", 4) = 4",
        )
        .unwrap();
        assert_eq!(lines.len(), 2);
        let merged = lines[0].as_syscall().unwrap();
        assert!(merged.unfinished && merged.resumed);
        assert_eq!(merged.arguments.len(), 3);
        assert!(matches!(lines[1], TraceLine::Signal(_)));
    }

    #[test]
    fn parses_signal_and_exit_statement() {
        let (lines, _) = parse(
            "1 --- SIGCHLD {si_signo=SIGCHLD, si_pid=2} ---\n1 +++ exited with 0 +++",
        )
        .unwrap();
        assert_eq!(lines.len(), 2);
        match &lines[0] {
            TraceLine::Signal(sig) => assert_eq!(sig.name, "SIGCHLD"),
            other => panic!("expected signal, got {other:?}"),
        }
        match &lines[1] {
            TraceLine::Exit(ExitStatement::Exited(0)) => {}
            other => panic!("expected exited(0), got {other:?}"),
        }
    }

    #[test]
    fn parses_killed_by_exit_statement() {
        let (lines, _) = parse("1 +++ killed by SIGKILL +++").unwrap();
        match &lines[0] {
            TraceLine::Exit(ExitStatement::Killed(name)) => assert_eq!(name, "SIGKILL"),
            other => panic!("expected killed-by, got {other:?}"),
        }
    }

    #[test]
    fn parses_truncated_marker() {
        let (lines, truncated) = parse("1 close(3) = 0\nTRUNCATED").unwrap();
        assert_eq!(lines.len(), 1);
        assert!(truncated);
    }

    #[test]
    fn parses_omitted_arguments() {
        let (lines, _) = parse("1 waitpid(-5, ...) = 0").unwrap();
        let syscall = lines[0].as_syscall().unwrap();
        assert_eq!(syscall.arguments[1], Argument::Omitted);
    }

    #[test]
    fn parses_path_file_descriptor_argument() {
        let (lines, _) = parse(r#"1 write(3</tmp/x>, "data", 4) = 4"#).unwrap();
        let syscall = lines[0].as_syscall().unwrap();
        match &syscall.arguments[0] {
            Argument::Literal(Literal {
                value: LiteralValue::FileDescriptor(FileDescriptor::Path { path, .. }),
                ..
            }) => assert_eq!(path, "/tmp/x"),
            other => panic!("expected path fd, got {other:?}"),
        }
    }

    #[test]
    fn fails_fast_with_context_on_bad_input() {
        let err = parse("1 open(").unwrap_err();
        assert!(err.message.contains("expected"));
    }

    #[test]
    fn number_base_is_preserved() {
        let (lines, _) = parse("1 open(\"/tmp\", 0644) = 3").unwrap();
        let syscall = lines[0].as_syscall().unwrap();
        match &syscall.arguments[1] {
            Argument::Literal(Literal {
                value: LiteralValue::Number { value, base },
                ..
            }) => {
                assert_eq!(*value, 0o644);
                assert_eq!(*base, NumberBase::Octal);
            }
            other => panic!("expected number, got {other:?}"),
        }
    }
}
