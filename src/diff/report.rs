//! Human-readable rendering of a diff tree.

use super::{DiffNode, DiffTree, Severity};
use std::fmt::Write;

fn tag(node: &DiffNode, inherited_suppression: bool) -> &'static str {
    if node.is_suppressed() || inherited_suppression {
        "suppressed"
    } else {
        match node.severity {
            Severity::Breaking => "breaking",
            Severity::Informational => "informational",
        }
    }
}

fn subject_text(node: &DiffNode) -> String {
    match (&node.subject.old, &node.subject.new) {
        (Some(o), Some(n)) if o == n => o.clone(),
        (Some(o), Some(n)) => format!("{} -> {}", o, n),
        (Some(o), None) => o.clone(),
        (None, Some(n)) => n.clone(),
        (None, None) => String::new(),
    }
}

fn render_node(out: &mut String, node: &DiffNode, indent: usize, suppressed: bool) {
    let suppressed_here = suppressed || node.is_suppressed();
    let detail = node.kind.describe();
    let subject = subject_text(node);
    let _ = write!(
        out,
        "{:width$}[{}] {}",
        "",
        tag(node, suppressed),
        node.category(),
        width = indent
    );
    if !detail.is_empty() {
        let _ = write!(out, ": {}", detail);
    }
    if !subject.is_empty() {
        let _ = write!(out, " ({})", subject);
    }
    if let Some(rule) = &node.suppressed_by {
        let _ = write!(out, " by {}", rule);
    }
    out.push('\n');
    for child in &node.children {
        render_node(out, child, indent + 2, suppressed_here);
    }
}

/// Render `tree` as an indented text report.
pub fn render_text(tree: &DiffTree) -> String {
    let counts = tree.counts();
    let mut out = String::new();
    let _ = writeln!(out, "ABI comparison: {} -> {}", tree.old_origin, tree.new_origin);
    let _ = writeln!(
        out,
        "Verdict: {} ({} breaking, {} informational, {} suppressed)",
        tree.verdict(),
        counts.breaking,
        counts.informational,
        counts.suppressed
    );
    if tree.is_empty() {
        out.push_str("No changes.\n");
        return out;
    }
    if !tree.corpus_changes.is_empty() {
        out.push_str("\nLibrary:\n");
        for node in &tree.corpus_changes {
            render_node(&mut out, node, 2, false);
        }
    }
    if !tree.declarations.is_empty() {
        out.push_str("\nDeclarations:\n");
        for decl in &tree.declarations {
            if decl.display_name == decl.linkage_name {
                let _ = writeln!(out, "  {} {}", decl.kind, decl.linkage_name);
            } else {
                let _ = writeln!(
                    out,
                    "  {} {} [{}]",
                    decl.kind, decl.display_name, decl.linkage_name
                );
            }
            render_node(&mut out, &decl.node, 4, false);
        }
    }
    out
}
