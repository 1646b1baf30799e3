//! Suppression Engine: marks diff nodes matched by user rules.
//!
//! Suppression hides impact, not evidence. Matched nodes stay in the tree
//! with the label of the rule that matched them, container severities are
//! recomputed, and the verdict is taken from the adjusted tree.

pub mod rules;

pub use rules::{MatchContext, RuleSpec, SuppressionRule, SuppressionSet};

use crate::diff::{DiffNode, DiffTree, Verdict};
use rayon::prelude::*;
use tracing::debug;

fn mark(node: &mut DiffNode, rules: &SuppressionSet, context: Option<MatchContext<'_>>) -> usize {
    let mut marked = 0;
    if node.suppressed_by.is_none() {
        if let Some(label) = rules.first_match(context, node) {
            node.suppressed_by = Some(label.to_string());
            marked += 1;
        }
    }
    for child in &mut node.children {
        marked += mark(child, rules, context);
    }
    marked
}

/// Apply `rules` to `tree`, returning the adjusted tree and its verdict.
pub fn apply(mut tree: DiffTree, rules: &SuppressionSet) -> (DiffTree, Verdict) {
    if rules.is_empty() {
        let verdict = tree.verdict();
        return (tree, verdict);
    }

    let mut marked: usize = tree
        .corpus_changes
        .iter_mut()
        .map(|node| mark(node, rules, None))
        .sum();
    marked += tree
        .declarations
        .par_iter_mut()
        .map(|decl| {
            let context = MatchContext {
                linkage_name: &decl.linkage_name,
                display_name: &decl.display_name,
            };
            mark(&mut decl.node, rules, Some(context))
        })
        .sum::<usize>();

    tree.refresh_severity();
    let verdict = tree.verdict();
    debug!(
        rules = rules.len(),
        origin = %rules.origin().display(),
        marked,
        verdict = %verdict,
        "applied suppressions"
    );
    (tree, verdict)
}
