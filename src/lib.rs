//! strace-compare - compares two kernel syscall trace recordings and finds
//! the parameter-mapping correspondences between them.
//!
//! One trace comes from a plain command-line invocation, the other from a
//! higher-level configuration-management action (e.g. an Ansible module
//! call) that is believed to produce the same effect. The pipeline parses
//! both traces (`lexer`/`parser`), normalizes them (`preprocessing`),
//! canonicalizes syscall shape and equality (`canonical_form`/`equality`),
//! scores similarity under several strategies (`scoring`), and, for
//! migration tooling, searches for and validates a concrete argument
//! mapping (`search`).

pub mod canonical_form; // Canonicalizer: syscall-shape normalization rules
pub mod cli;
pub mod config;
pub mod corpus;
pub mod equality; // Syscall/synthetic-value equality contexts
pub mod error;
pub mod lexer;
pub mod parser;
pub mod preprocessing;
pub mod scoring;
pub mod search;
pub mod trace;
pub mod validator;
