//! Diff Engine: compares two corpora and classifies every difference.
//!
//! Declarations are matched by linkage name. Matched pairs are compared
//! structurally (see [`types::TypeComparator`]) on the rayon pool; each
//! worker keeps its own memo, and results are collected and ordered by
//! linkage name, so the tree does not depend on scheduling.

pub mod node;
pub mod report;
pub mod types;

pub use node::{ChangeCategory, ChangeKind, Counts, DiffNode, Severity, Subject, Verdict};
pub use types::{TypeComparator, Use};

use crate::config::DiffConfig;
use crate::corpus::{Corpus, DeclarationKind};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// All changes concerning one linkage name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeclarationDiff {
    pub linkage_name: String,
    /// Demangled spelling for reports.
    pub display_name: String,
    /// Kind in the old corpus, or the new one for additions.
    pub kind: DeclarationKind,
    pub node: DiffNode,
}

/// The result of comparing two corpora.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiffTree {
    pub old_origin: String,
    pub new_origin: String,
    /// Binary-level changes (soname, needed libraries, architecture).
    pub corpus_changes: Vec<DiffNode>,
    /// Sorted by linkage name.
    pub declarations: Vec<DeclarationDiff>,
}

impl DiffTree {
    /// Every top-level node, corpus changes first.
    pub fn roots(&self) -> impl Iterator<Item = &DiffNode> {
        self.corpus_changes
            .iter()
            .chain(self.declarations.iter().map(|d| &d.node))
    }

    pub fn counts(&self) -> Counts {
        let mut counts = Counts::default();
        for root in self.roots() {
            root.tally(&mut counts, false);
        }
        counts
    }

    /// Leaf changes that are breaking and not suppressed.
    pub fn breaking_count(&self) -> usize {
        self.counts().breaking
    }

    pub fn informational_count(&self) -> usize {
        self.counts().informational
    }

    pub fn suppressed_count(&self) -> usize {
        self.counts().suppressed
    }

    /// `Incompatible` iff at least one unsuppressed breaking change remains.
    pub fn verdict(&self) -> Verdict {
        if self
            .roots()
            .any(|n| n.effective_severity() == Severity::Breaking)
        {
            Verdict::Incompatible
        } else {
            Verdict::Compatible
        }
    }

    pub fn is_empty(&self) -> bool {
        self.corpus_changes.is_empty() && self.declarations.is_empty()
    }

    /// All nodes of one category, in tree order.
    pub fn find(&self, category: ChangeCategory) -> Vec<&DiffNode> {
        self.roots()
            .flat_map(|root| root.walk())
            .filter(|n| n.category() == category)
            .collect()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Recompute container severities after nodes were marked suppressed.
    pub fn refresh_severity(&mut self) {
        for node in &mut self.corpus_changes {
            node.refresh_severity();
        }
        for decl in &mut self.declarations {
            decl.node.refresh_severity();
        }
    }
}

/// Compare two corpora with the default configuration.
pub fn compare(old: &Corpus, new: &Corpus) -> DiffTree {
    compare_with(old, new, &DiffConfig::default())
}

pub fn compare_with(old: &Corpus, new: &Corpus, config: &DiffConfig) -> DiffTree {
    let corpus_changes = compare_metadata(old, new);

    let names: Vec<&String> = old
        .declarations()
        .keys()
        .chain(new.declarations().keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    debug!(
        old = %old.origin(),
        new = %new.origin(),
        names = names.len(),
        "comparing declarations"
    );

    let diff_one = |cmp: &mut TypeComparator, name: &&String| {
        compare_declaration(cmp, old, new, name, config)
    };
    let mut declarations: Vec<DeclarationDiff> = if config.parallel {
        names
            .par_iter()
            .map_init(
                || TypeComparator::new(old.environment(), new.environment(), config.max_depth),
                diff_one,
            )
            .flatten()
            .collect()
    } else {
        let mut cmp = TypeComparator::new(old.environment(), new.environment(), config.max_depth);
        names
            .iter()
            .filter_map(|name| diff_one(&mut cmp, name))
            .collect()
    };
    declarations.sort_by(|a, b| a.linkage_name.cmp(&b.linkage_name));

    let tree = DiffTree {
        old_origin: old.origin(),
        new_origin: new.origin(),
        corpus_changes,
        declarations,
    };
    info!(
        changed = tree.declarations.len(),
        breaking = tree.breaking_count(),
        verdict = %tree.verdict(),
        "comparison complete"
    );
    tree
}

fn display(linkage_name: &str, config: &DiffConfig) -> String {
    if config.demangle {
        crate::demangle::display_name(linkage_name)
    } else {
        linkage_name.to_string()
    }
}

fn compare_declaration(
    cmp: &mut TypeComparator<'_>,
    old: &Corpus,
    new: &Corpus,
    name: &str,
    config: &DiffConfig,
) -> Option<DeclarationDiff> {
    let (old_env, new_env) = (old.environment(), new.environment());
    let (decl, node) = match (old.declaration(name), new.declaration(name)) {
        (None, None) => return None,
        (Some(o), None) => (
            o,
            DiffNode::breaking(
                ChangeKind::Removed,
                Subject::text(Some(old_env.render(o.ty)), None),
            ),
        ),
        (None, Some(n)) => (
            n,
            DiffNode::informational(
                ChangeKind::Added,
                Subject::text(None, Some(new_env.render(n.ty))),
            ),
        ),
        (Some(o), Some(n)) if o.kind != n.kind => (
            o,
            DiffNode::breaking(
                ChangeKind::KindChanged {
                    old: o.kind,
                    new: n.kind,
                },
                Subject::text(Some(old_env.render(o.ty)), Some(new_env.render(n.ty))),
            ),
        ),
        (Some(o), Some(n)) => {
            let subject = Subject::text(Some(old_env.render(o.ty)), Some(new_env.render(n.ty)));
            let mut children = Vec::new();
            if o.symbol.version != n.symbol.version {
                children.push(DiffNode::breaking(
                    ChangeKind::SymbolVersionChanged {
                        old: o.symbol.version.clone(),
                        new: n.symbol.version.clone(),
                    },
                    subject.clone(),
                ));
            }
            if o.symbol.binding != n.symbol.binding {
                children.push(DiffNode::informational(
                    ChangeKind::SymbolBindingChanged {
                        old: o.symbol.binding,
                        new: n.symbol.binding,
                    },
                    subject.clone(),
                ));
            }
            children.extend(cmp.compare(o.ty, n.ty, Use::ByValue));
            if children.is_empty() {
                return None;
            }
            (
                o,
                DiffNode::container(ChangeKind::DeclarationChanged, subject, children),
            )
        }
    };
    Some(DeclarationDiff {
        linkage_name: decl.linkage_name.clone(),
        display_name: display(&decl.linkage_name, config),
        kind: decl.kind,
        node,
    })
}

fn compare_metadata(old: &Corpus, new: &Corpus) -> Vec<DiffNode> {
    let (om, nm) = (&old.metadata, &new.metadata);
    let mut changes = Vec::new();
    if om.soname != nm.soname {
        changes.push(DiffNode::breaking(
            ChangeKind::SonameChanged {
                old: om.soname.clone(),
                new: nm.soname.clone(),
            },
            Subject::text(om.soname.clone(), nm.soname.clone()),
        ));
    }
    if om.architecture != nm.architecture {
        warn!(
            old = ?om.architecture,
            new = ?nm.architecture,
            "comparing corpora built for different architectures"
        );
        changes.push(DiffNode::informational(
            ChangeKind::ArchitectureChanged {
                old: om.architecture.clone(),
                new: nm.architecture.clone(),
            },
            Subject::text(om.architecture.clone(), nm.architecture.clone()),
        ));
    }
    for name in om.needed.iter().filter(|n| !nm.needed.contains(n)) {
        changes.push(DiffNode::informational(
            ChangeKind::NeededLibraryRemoved { name: name.clone() },
            Subject::text(Some(name.clone()), None),
        ));
    }
    for name in nm.needed.iter().filter(|n| !om.needed.contains(n)) {
        changes.push(DiffNode::informational(
            ChangeKind::NeededLibraryAdded { name: name.clone() },
            Subject::text(None, Some(name.clone())),
        ));
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build;
    use crate::corpus::{SymbolBinding, SymbolInfo};
    use crate::facts::{InMemoryFacts, RawSymbol};
    use crate::ir::RecordKind;

    fn library(f: impl FnOnce(&mut InMemoryFacts)) -> Corpus {
        let mut facts = InMemoryFacts::new("libmath.so");
        f(&mut facts);
        build(&facts).unwrap()
    }

    fn add_int_int(facts: &mut InMemoryFacts) {
        let mut unit = facts.unit("math.c");
        let int = unit.base("int", 4);
        let sig = unit.function_type(Some(int), &[int, int], false);
        unit.function("Add", sig);
    }

    #[test]
    fn test_reflexive() {
        let corpus = library(add_int_int);
        let tree = compare(&corpus, &corpus);
        assert!(tree.is_empty());
        assert_eq!(tree.verdict(), Verdict::Compatible);
    }

    #[test]
    fn test_removed_and_added() {
        let old = library(add_int_int);
        let new = library(|facts| {
            let mut unit = facts.unit("math.c");
            let int = unit.base("int", 4);
            let sig = unit.function_type(Some(int), &[int, int], false);
            unit.function("Sum", sig);
        });
        let tree = compare(&old, &new);
        assert_eq!(tree.declarations.len(), 2);
        assert_eq!(tree.declarations[0].linkage_name, "Add");
        assert_eq!(tree.declarations[0].node.category(), ChangeCategory::Removed);
        assert_eq!(tree.declarations[1].node.category(), ChangeCategory::Added);
        assert_eq!(tree.verdict(), Verdict::Incompatible);
        assert_eq!(tree.breaking_count(), 1);
        assert_eq!(tree.informational_count(), 1);
    }

    #[test]
    fn test_kind_changed_skips_type_comparison() {
        let old = library(add_int_int);
        let new = library(|facts| {
            let mut unit = facts.unit("math.c");
            let double = unit.base("double", 8);
            unit.variable("Add", double);
        });
        let tree = compare(&old, &new);
        let node = &tree.declarations[0].node;
        assert_eq!(node.category(), ChangeCategory::KindChanged);
        assert!(node.children.is_empty());
        assert_eq!(tree.verdict(), Verdict::Incompatible);
    }

    #[test]
    fn test_symbol_binding_is_informational() {
        let old = library(add_int_int);
        let new = library(|facts| {
            add_int_int(facts);
        });
        let mut tree = compare(&old, &new);
        assert!(tree.is_empty());

        let weak = library(|facts| {
            let mut unit = facts.unit("math.c");
            let int = unit.base("int", 4);
            let sig = unit.function_type(Some(int), &[int, int], false);
            unit.symbol(RawSymbol {
                linkage_name: "Add".into(),
                name: None,
                kind: DeclarationKind::Function,
                type_id: sig,
                symbol: SymbolInfo {
                    binding: SymbolBinding::Weak,
                    ..SymbolInfo::default()
                },
            });
        });
        tree = compare(&old, &weak);
        assert_eq!(tree.find(ChangeCategory::SymbolBindingChanged).len(), 1);
        assert_eq!(tree.verdict(), Verdict::Compatible);
    }

    #[test]
    fn test_metadata_changes() {
        let old = library(|facts| {
            add_int_int(facts);
            facts.metadata_mut().soname = Some("libmath.so.1".into());
            facts.metadata_mut().needed = vec!["libc.so.6".into()];
        });
        let new = library(|facts| {
            add_int_int(facts);
            facts.metadata_mut().soname = Some("libmath.so.2".into());
            facts.metadata_mut().needed = vec!["libc.so.6".into(), "libm.so.6".into()];
        });
        let tree = compare(&old, &new);
        let cats: Vec<_> = tree.corpus_changes.iter().map(|n| n.category()).collect();
        assert_eq!(
            cats,
            vec![ChangeCategory::SonameChanged, ChangeCategory::NeededLibraryAdded]
        );
        assert_eq!(tree.verdict(), Verdict::Incompatible);
    }

    /// `f(struct A)` and `g(struct A*)`, where `A` and `B` point at each other
    /// and `B` ends with a member of type `tail`.
    fn mutual_records(tail: (&'static str, u64)) -> impl FnOnce(&mut InMemoryFacts) {
        move |facts| {
            let mut unit = facts.unit("pair.c");
            let a = unit.reserve();
            let b = unit.reserve();
            let pa = unit.pointer(Some(a));
            let pb = unit.pointer(Some(b));
            let tail = unit.base(tail.0, tail.1);
            unit.define_record(a, RecordKind::Struct, Some("A"), 8, &[("b", pb, 0)]);
            unit.define_record(b, RecordKind::Struct, Some("B"), 16, &[("a", pa, 0), ("y", tail, 8)]);
            let f = unit.function_type(None, &[a], false);
            unit.function("f", f);
            let g = unit.function_type(None, &[pa], false);
            unit.function("g", g);
        }
    }

    #[test]
    fn test_mutually_recursive_change_reported_for_every_entry() {
        let old = library(mutual_records(("int", 4)));
        let new = library(mutual_records(("long", 8)));
        let sequential = compare_with(
            &old,
            &new,
            &DiffConfig {
                parallel: false,
                ..DiffConfig::default()
            },
        );
        let changed: Vec<&str> = sequential
            .declarations
            .iter()
            .map(|d| d.linkage_name.as_str())
            .collect();
        assert_eq!(changed, vec!["f", "g"]);
        assert!(sequential
            .declarations
            .iter()
            .all(|d| d.node.severity == Severity::Breaking));
        assert_eq!(sequential, compare(&old, &new));
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let old = library(add_int_int);
        let new = library(|facts| {
            let mut unit = facts.unit("math.c");
            let int = unit.base("int", 4);
            let arr = unit.array(int, None);
            let sig = unit.function_type(Some(int), &[arr], false);
            unit.function("Add", sig);
        });
        let parallel = compare(&old, &new);
        let sequential = compare_with(
            &old,
            &new,
            &DiffConfig {
                parallel: false,
                ..DiffConfig::default()
            },
        );
        assert_eq!(parallel, sequential);
        assert_eq!(parallel.find(ChangeCategory::ParameterCountChanged).len(), 1);
        assert_eq!(parallel.find(ChangeCategory::ParameterTypeChanged).len(), 1);
        assert!(parallel.to_json().unwrap().contains("parameter-count-changed"));
    }
}
