//! TOML-loaded configuration for a comparison run.
//!
//! Grounded on `assertion_dsl.rs`'s `AssertionConfig::from_file`/`from_toml_str`
//! pattern (`toml::from_str` plus `anyhow::Context` for file-read errors).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The scoring strategy to run a comparison under, selectable from
/// `strace-compare.toml` rather than only from code.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    Jaccard,
    #[default]
    Tfidf,
    NormalizedInformationContent,
    MaximumCardinalityMatching,
    TfidfMaximumWeightedMatching,
}

/// Root configuration for `strace-compare.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
pub struct CompareConfig {
    /// Path to a hole-set file (spec.md §6 "Input: hole set"), a mapping of
    /// `syscall name -> argument indices` whose values vary run-to-run.
    pub hole_set_path: Option<PathBuf>,

    /// Directory of persisted traces used for corpus-wide IDF / global-strip
    /// statistics.
    pub corpus_dir: Option<PathBuf>,

    #[serde(default)]
    pub scoring_method: ScoringMethod,

    /// Seconds to wait for the external validator before giving up on a
    /// migration candidate.
    #[serde(default = "default_validator_timeout_secs")]
    pub validator_timeout_secs: u64,
}

fn default_validator_timeout_secs() -> u64 {
    30
}

impl CompareConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("failed to parse TOML")
    }

    pub fn validator_timeout(&self) -> Duration {
        Duration::from_secs(self.validator_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_tfidf_and_a_thirty_second_timeout() {
        let config = CompareConfig::from_toml_str("").unwrap();
        assert_eq!(config.scoring_method, ScoringMethod::Tfidf);
        assert_eq!(config.validator_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn parses_an_explicit_configuration() {
        let toml = r#"
            hole_set_path = "holes.json"
            corpus_dir = "corpus/"
            scoring_method = "jaccard"
            validator_timeout_secs = 120
        "#;
        let config = CompareConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.hole_set_path, Some(PathBuf::from("holes.json")));
        assert_eq!(config.scoring_method, ScoringMethod::Jaccard);
        assert_eq!(config.validator_timeout_secs, 120);
    }
}
