//! Migration search (C8), half two: the validator-driven refinement
//! procedure that walks a candidate target's argument tree looking for the
//! mapping that makes it behave the same as the source (spec.md §4.8).
//!
//! Grounded on `original_source/lib/strace/search.py`'s `search_for_migration`
//! / `refine_mapping` pass structure; the tree itself lives in
//! [`super::tree`].

use crate::error::Result;
use crate::search::mapping::map_parameters;
use crate::search::tree::{postorder_paths, Node, TreeWalker};
use crate::trace::{hashable_arguments_representation, ParameterKey, Trace};
use crate::validator::Validator;

/// `(source, original target, final mapping, migrated target, validated score)`
/// — spec.md §6's "Output: migration result", plus the score C8 ranks by.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    pub original_target: Trace,
    pub migrated_target: Trace,
    pub mapping: Vec<(ParameterKey, ParameterKey)>,
    pub score: f64,
}

fn rendered_target(source: &Trace, target: &Trace, walker: &TreeWalker) -> Trace {
    let mut rendered = target.clone();
    rendered.arguments = walker.root().to_value();
    let _ = source;
    rendered
}

fn validate(
    source: &Trace,
    target: &Trace,
    walker: &TreeWalker,
    validator: &dyn Validator,
) -> Result<f64> {
    let rendered = rendered_target(source, target, walker);
    Ok(validator.validate(&rendered)?.score)
}

fn mapped_keys(root: &Node) -> Vec<ParameterKey> {
    fn walk(node: &Node, out: &mut Vec<ParameterKey>) {
        match node {
            Node::List(items) => items.iter().for_each(|n| walk(n, out)),
            Node::Mapping(entries) => entries.iter().for_each(|(_, n)| walk(n, out)),
            Node::Value(_) => {}
            Node::Mapped { parameter_key, .. } => out.push(parameter_key.clone()),
        }
    }
    let mut out = Vec::new();
    walk(root, &mut out);
    out
}

/// Step 2: for every node, tentatively wrap it as a single-element list and
/// keep the change only if the validated score is unchanged. Normalizes
/// argument shape (a scalar source argument reappearing as a one-item list
/// in the target, or vice versa) without moving the score.
fn list_replacement_pass(
    source: &Trace,
    target: &Trace,
    walker: &mut TreeWalker,
    validator: &dyn Validator,
    v: f64,
) -> Result<()> {
    let paths = postorder_paths(walker.root(), false);
    for path in paths {
        walker.goto(&path);
        let Some(original) = walker.current().cloned() else {
            continue;
        };
        walker.replace(Node::List(vec![original.clone()]));
        let candidate = validate(source, target, walker, validator)?;
        if (candidate - v).abs() > f64::EPSILON {
            walker.goto(&path);
            walker.replace(original);
        }
    }
    Ok(())
}

/// Step 3: for every tree position (including one-past-the-end list
/// addresses) and every source parameter not already mapped somewhere in
/// the tree, try mapping it there; keep only if the score strictly improves.
fn mapping_growth_pass(
    source: &Trace,
    target: &Trace,
    walker: &mut TreeWalker,
    validator: &dyn Validator,
    v: &mut f64,
) -> Result<()> {
    let paths = postorder_paths(walker.root(), true);
    for path in paths {
        let already_used = mapped_keys(walker.root());
        for (_id, param) in source.arena.iter() {
            if already_used.contains(&param.key) {
                continue;
            }
            walker.goto(&path);
            let previous = walker.current().cloned();
            walker.map(param.key.clone(), serde_json::Value::String(param.rendered.clone()));
            let candidate = validate(source, target, walker, validator)?;
            if candidate > *v {
                *v = candidate;
                break;
            }
            walker.goto(&path);
            match previous {
                Some(node) => walker.replace(node),
                None => {
                    walker.remove();
                }
            }
        }
    }
    Ok(())
}

/// Step 4: for every node, try removing it; keep if the score strictly
/// improves (a target argument the source never produced, for instance).
fn removal_pass(
    source: &Trace,
    target: &Trace,
    walker: &mut TreeWalker,
    validator: &dyn Validator,
    v: &mut f64,
) -> Result<()> {
    // Deepest-first so a removed child doesn't invalidate its ancestors'
    // saved paths before they're visited.
    let paths = postorder_paths(walker.root(), false);
    for path in paths {
        if path.is_empty() {
            continue;
        }
        let saved_root = walker.root().clone();
        walker.goto(&path);
        if walker.remove().is_none() {
            continue;
        }
        let candidate = validate(source, target, walker, validator)?;
        if candidate > *v {
            *v = candidate;
        } else {
            *walker = TreeWalker::new(saved_root);
        }
    }
    Ok(())
}

/// Runs the full refinement procedure (spec.md §4.8 steps 1-5) against one
/// candidate target, starting from the mapping [`map_parameters`] already
/// found between `source` and `target`.
pub fn refine_mapping(source: &Trace, target: &Trace, validator: &dyn Validator) -> Result<MigrationResult> {
    let mut walker = TreeWalker::new(Node::from_value(&target.arguments));

    for (src_id, tgt_id) in map_parameters(source, target) {
        let src_param = source.arena.get(src_id);
        let tgt_param = target.arena.get(tgt_id);
        let keys: Vec<&str> = tgt_param.key.iter().map(String::as_str).collect();
        if walker.down_to_key(&keys) {
            walker.map(src_param.key.clone(), serde_json::Value::String(src_param.rendered.clone()));
        }
        walker.goto(&[]);
    }

    let mut v = validate(source, target, &walker, validator)?;

    list_replacement_pass(source, target, &mut walker, validator, v)?;
    mapping_growth_pass(source, target, &mut walker, validator, &mut v)?;
    removal_pass(source, target, &mut walker, validator, &mut v)?;

    let mapping = collect_mapping(walker.root());
    let migrated_target = rendered_target(source, target, &walker);

    Ok(MigrationResult {
        original_target: target.clone(),
        migrated_target,
        mapping,
        score: v,
    })
}

fn collect_mapping(root: &Node) -> Vec<(ParameterKey, ParameterKey)> {
    fn walk(node: &Node, path: &mut Vec<String>, out: &mut Vec<(ParameterKey, ParameterKey)>) {
        match node {
            Node::List(items) => {
                for (i, child) in items.iter().enumerate() {
                    path.push(i.to_string());
                    walk(child, path, out);
                    path.pop();
                }
            }
            Node::Mapping(entries) => {
                for (k, child) in entries {
                    path.push(k.clone());
                    walk(child, path, out);
                    path.pop();
                }
            }
            Node::Value(_) => {}
            Node::Mapped { parameter_key, .. } => out.push((parameter_key.clone(), path.clone())),
        }
    }
    let mut out = Vec::new();
    walk(root, &mut Vec::new(), &mut out);
    out
}

/// Refines the top-`k` scored candidates and keeps whichever ends with the
/// highest validated score, per spec.md §4.8's "Across candidates keep the
/// best-V winner."
pub fn search_for_migration(
    source: &Trace,
    ranked_candidates: &[(Trace, f64)],
    top_k: usize,
    validator: &dyn Validator,
) -> Result<Option<MigrationResult>> {
    let mut best: Option<MigrationResult> = None;
    for (candidate, _score) in ranked_candidates.iter().take(top_k) {
        let result = refine_mapping(source, candidate, validator)?;
        if best.as_ref().map(|b| result.score > b.score).unwrap_or(true) {
            best = Some(result);
        }
    }
    Ok(best)
}

/// Deduplicates a set of migration results by their migrated target's
/// argument shape, keeping the highest-scoring representative of each
/// distinct rendering.
pub fn get_unique_migrations(results: Vec<MigrationResult>) -> Vec<MigrationResult> {
    use std::collections::HashMap;
    let mut best_by_shape: HashMap<String, MigrationResult> = HashMap::new();
    for result in results {
        let shape = hashable_arguments_representation(&result.migrated_target.arguments);
        match best_by_shape.get(&shape) {
            Some(existing) if existing.score >= result.score => {}
            _ => {
                best_by_shape.insert(shape, result);
            }
        }
    }
    let mut out: Vec<MigrationResult> = best_by_shape.into_values().collect();
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out
}
