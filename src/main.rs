use anyhow::{Context, Result};
use clap::Parser;
use strace_compare::cli::Cli;
use strace_compare::config::{CompareConfig, ScoringMethod};
use strace_compare::equality::EqualityContext;
use strace_compare::parser::parse;
use strace_compare::scoring::{
    JaccardCoefficient, MaximumCardinalityMatching, NormalizedInformationContent, ScoreStrategy,
    ScoringMethod as ScoringPipeline, TfidfMaximumWeightedMatching, Tfidf,
};
use strace_compare::trace::Trace;
use std::fs;
use tracing_subscriber::EnvFilter;

fn load_trace(path: &std::path::Path, system: &str) -> Result<Trace> {
    let text = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let (lines, truncated) = parse(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    let mut trace = Trace::new(system, path.to_string_lossy(), serde_json::Value::Null, "strace");
    trace.truncated = truncated;
    for line in lines {
        trace.push(line);
    }
    Ok(trace)
}

fn strategy_for(method: ScoringMethod) -> Box<dyn ScoreStrategy> {
    match method {
        ScoringMethod::Jaccard => Box::new(JaccardCoefficient),
        ScoringMethod::Tfidf => Box::new(Tfidf),
        ScoringMethod::NormalizedInformationContent => Box::new(NormalizedInformationContent),
        ScoringMethod::MaximumCardinalityMatching => Box::new(MaximumCardinalityMatching),
        ScoringMethod::TfidfMaximumWeightedMatching => Box::new(TfidfMaximumWeightedMatching::default()),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Cli::parse();

    let config = match &args.config {
        Some(path) => CompareConfig::from_file(path)?,
        None => CompareConfig::default(),
    };
    let method: ScoringMethod = if args.config.is_some() {
        config.scoring_method
    } else {
        args.method.into()
    };

    let mut source = load_trace(&args.source, "cli")?;
    let mut target = load_trace(&args.target, "ansible")?;

    let strategy = strategy_for(method);
    let mut pipeline = ScoringPipeline::new(EqualityContext::Canonical);
    let result = pipeline.compare(strategy.as_ref(), &mut source, &mut target, &[])?;

    println!("{}", serde_json::to_string_pretty(&serde_json::json!({
        "score": result.score,
        "normalized_score": result.normalized_score,
        "mapping": result.mapping,
    }))?);

    Ok(())
}
