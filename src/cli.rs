//! CLI argument parsing for the `strace-compare` dev-harness binary.
//!
//! This is deliberately thin (SPEC_FULL.md §0): it exercises the library
//! against two trace files on disk and prints a `ScoringResult` as JSON. It
//! is not the full CLI front end described as out of scope in spec.md §1
//! (no Docker, no SSH to collectors, no database).

use crate::config::ScoringMethod;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "strace-compare")]
#[command(version)]
#[command(about = "Compare two syscall traces and print their similarity score", long_about = None)]
pub struct Cli {
    /// Path to the source trace (raw strace text)
    pub source: PathBuf,

    /// Path to the target trace (raw strace text)
    pub target: PathBuf,

    /// Scoring strategy to compare under
    #[arg(long, value_enum, default_value_t = ScoringMethodArg::Tfidf)]
    pub method: ScoringMethodArg,

    /// Optional `strace-compare.toml` configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ScoringMethodArg {
    Jaccard,
    Tfidf,
    NormalizedInformationContent,
    MaximumCardinalityMatching,
    TfidfMaximumWeightedMatching,
}

impl From<ScoringMethodArg> for ScoringMethod {
    fn from(arg: ScoringMethodArg) -> Self {
        match arg {
            ScoringMethodArg::Jaccard => ScoringMethod::Jaccard,
            ScoringMethodArg::Tfidf => ScoringMethod::Tfidf,
            ScoringMethodArg::NormalizedInformationContent => ScoringMethod::NormalizedInformationContent,
            ScoringMethodArg::MaximumCardinalityMatching => ScoringMethod::MaximumCardinalityMatching,
            ScoringMethodArg::TfidfMaximumWeightedMatching => ScoringMethod::TfidfMaximumWeightedMatching,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_and_target_paths() {
        let cli = Cli::parse_from(["strace-compare", "source.log", "target.log"]);
        assert_eq!(cli.source, PathBuf::from("source.log"));
        assert_eq!(cli.target, PathBuf::from("target.log"));
        assert_eq!(cli.method, ScoringMethodArg::Tfidf);
    }

    #[test]
    fn parses_an_explicit_method_and_config_path() {
        let cli = Cli::parse_from([
            "strace-compare",
            "source.log",
            "target.log",
            "--method",
            "jaccard",
            "--config",
            "strace-compare.toml",
        ]);
        assert_eq!(cli.method, ScoringMethodArg::Jaccard);
        assert_eq!(cli.config, Some(PathBuf::from("strace-compare.toml")));
    }
}
