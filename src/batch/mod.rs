//! Batch planning.
//!
//! Turns resolved targets and rules into [`WorkUnit`]s: file paths are
//! batched per file group, rules are batched globally, and every file batch
//! is paired with every rule batch.

mod guard;

pub use guard::{check_request_quota, planned_request_count};

use std::collections::HashMap;

use tracing::debug;

use crate::model::{ResolvedFilePath, ResolvedTarget, Rule, WorkUnit};

/// Paths of one file group, reviewed together in one request.
pub type FileBatch = Vec<ResolvedFilePath>;

/// Rules sent together in one request.
pub type RuleBatch = Vec<Rule>;

/// Merge rule lists by code. A later rule with the same code replaces the
/// earlier one in place; rules with a blank code or description are dropped.
pub fn merge_rules<'a, I>(sources: I) -> Vec<Rule>
where
    I: IntoIterator<Item = &'a [Rule]>,
{
    let mut merged: Vec<Rule> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for rule in sources.into_iter().flatten() {
        if !rule.is_usable() {
            debug!(code = %rule.code, "Dropping rule with blank code or description");
            continue;
        }
        match positions.get(&rule.code) {
            Some(&position) => merged[position] = rule.clone(),
            None => {
                positions.insert(rule.code.clone(), merged.len());
                merged.push(rule.clone());
            }
        }
    }

    merged
}

/// Rules for a review: review-level rules, then each target's, then each
/// file group's, merged by code.
pub fn collect_rules(review_rules: &[Rule], targets: &[ResolvedTarget]) -> Vec<Rule> {
    let target_rules = targets.iter().map(|target| target.rules.as_slice());
    let group_rules = targets
        .iter()
        .flat_map(|target| target.groups.iter())
        .map(|group| group.rules.as_slice());

    merge_rules(
        std::iter::once(review_rules)
            .chain(target_rules)
            .chain(group_rules),
    )
}

/// Split every file group into batches of its configured size.
///
/// Paths are sorted within a group before slicing and never mixed across
/// groups. A group without a batch size, or with size 0, yields one batch.
pub fn plan_file_batches(targets: &[ResolvedTarget]) -> Vec<FileBatch> {
    let mut batches = Vec::new();

    for group in targets.iter().flat_map(|target| target.groups.iter()) {
        let mut paths = group.resolved_paths();
        if paths.is_empty() {
            continue;
        }
        paths.sort_by(|a, b| a.path.cmp(&b.path));

        match group.context.files_batch_size.filter(|size| *size > 0) {
            Some(size) => batches.extend(paths.chunks(size).map(|chunk| chunk.to_vec())),
            None => batches.push(paths),
        }
    }

    debug!(batches = batches.len(), "Planned file batches");
    batches
}

/// Split rules into batches of `batch_size`. No rules means no batches.
pub fn plan_rule_batches(rules: &[Rule], batch_size: Option<usize>) -> Vec<RuleBatch> {
    if rules.is_empty() {
        return Vec::new();
    }
    match batch_size.filter(|size| *size > 0) {
        Some(size) => rules.chunks(size).map(|chunk| chunk.to_vec()).collect(),
        None => vec![rules.to_vec()],
    }
}

/// Pair file batches with rule batches, file-major.
///
/// Without rule batches every file batch becomes one unit with no rules.
pub fn combine(file_batches: &[FileBatch], rule_batches: &[RuleBatch]) -> Vec<WorkUnit> {
    if rule_batches.is_empty() {
        return file_batches
            .iter()
            .map(|files| WorkUnit {
                files: files.clone(),
                rules: Vec::new(),
            })
            .collect();
    }

    file_batches
        .iter()
        .flat_map(|files| {
            rule_batches.iter().map(move |rules| WorkUnit {
                files: files.clone(),
                rules: rules.clone(),
            })
        })
        .collect()
}
