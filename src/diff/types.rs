//! Structural comparison of two type graphs.
//!
//! The comparator walks an old and a new handle in lockstep. Pairs already
//! on the walk stack are assumed equal, which keeps self-referential records
//! finite. A finished pair is memoized per context only when its result did
//! not lean on such an assumption about a pair further up the stack; those
//! results are provisional and get recomputed from their next entry point.

use super::node::{ChangeCategory, ChangeKind, DiffNode, Severity, Subject};
use crate::ir::{Enumerator, Environment, Field, Type, TypeRef};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How the type being compared is reached from the declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Use {
    /// Parameter, return value, variable, field, or array element.
    ByValue,
    /// Only through a pointer or reference.
    BehindPointer,
}

type PairKey = (TypeRef, TypeRef, Use);

pub struct TypeComparator<'a> {
    old: &'a Environment,
    new: &'a Environment,
    max_depth: usize,
    memo: HashMap<PairKey, Vec<DiffNode>>,
    /// Pairs on the walk stack, with their stack position.
    in_progress: HashMap<PairKey, usize>,
    /// Shallowest stack position the current frame assumed equal.
    low_water: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FieldKey {
    Named(String),
    Anonymous(usize),
}

fn field_keys(fields: &[Field]) -> Vec<FieldKey> {
    let mut ordinal = 0;
    fields
        .iter()
        .map(|f| {
            if f.name.is_empty() {
                ordinal += 1;
                FieldKey::Anonymous(ordinal - 1)
            } else {
                FieldKey::Named(f.name.clone())
            }
        })
        .collect()
}

fn field_label(field: &Field, key: &FieldKey) -> String {
    match key {
        FieldKey::Named(_) => field.name.clone(),
        FieldKey::Anonymous(n) => format!("<anonymous {}>", n),
    }
}

impl<'a> TypeComparator<'a> {
    pub fn new(old: &'a Environment, new: &'a Environment, max_depth: usize) -> Self {
        Self {
            old,
            new,
            max_depth,
            memo: HashMap::new(),
            in_progress: HashMap::new(),
            low_water: usize::MAX,
        }
    }

    fn same_environment(&self) -> bool {
        std::ptr::eq(self.old, self.new)
    }

    fn subject(&self, old: TypeRef, new: TypeRef) -> Subject {
        Subject {
            old: Some(self.old.render(old)),
            new: Some(self.new.render(new)),
            old_type: Some(old),
            new_type: Some(new),
        }
    }

    /// Changes between `old` and `new`; empty when they are equivalent.
    pub fn compare(&mut self, old: TypeRef, new: TypeRef, usage: Use) -> Vec<DiffNode> {
        self.compare_at(old, new, usage, 0)
    }

    fn compare_at(&mut self, old: TypeRef, new: TypeRef, usage: Use, depth: usize) -> Vec<DiffNode> {
        if self.same_environment() && old == new {
            return Vec::new();
        }
        if depth > self.max_depth {
            // Depends on the entry depth, so nothing above may be memoized.
            self.low_water = 0;
            return vec![DiffNode::breaking(
                ChangeKind::Unresolvable {
                    reason: format!("type graph deeper than {} levels", self.max_depth),
                },
                self.subject(old, new),
            )];
        }
        let key = (old, new, usage);
        if let Some(done) = self.memo.get(&key) {
            return done.clone();
        }
        if let Some(&position) = self.in_progress.get(&key) {
            self.low_water = self.low_water.min(position);
            return Vec::new();
        }
        let position = self.in_progress.len();
        self.in_progress.insert(key, position);
        let outer = std::mem::replace(&mut self.low_water, usize::MAX);
        let changes = self.compare_qualified(old, new, usage, depth);
        self.in_progress.remove(&key);
        if self.low_water >= position {
            self.memo.insert(key, changes.clone());
        }
        self.low_water = outer.min(self.low_water);
        changes
    }

    fn compare_qualified(
        &mut self,
        old: TypeRef,
        new: TypeRef,
        usage: Use,
        depth: usize,
    ) -> Vec<DiffNode> {
        let (old_base, old_q) = self.old.strip_qualifiers(old);
        let (new_base, new_q) = self.new.strip_qualifiers(new);
        let mut changes = Vec::new();
        if old_q != new_q {
            changes.push(DiffNode::breaking(
                ChangeKind::QualifiersChanged {
                    old: old_q,
                    new: new_q,
                },
                self.subject(old, new),
            ));
        }
        if old_base != old || new_base != new {
            changes.extend(self.compare_at(old_base, new_base, usage, depth + 1));
        } else {
            changes.extend(self.compare_shapes(old, new, usage, depth));
        }
        changes
    }

    fn compare_shapes(&mut self, old: TypeRef, new: TypeRef, usage: Use, depth: usize) -> Vec<DiffNode> {
        let (old_ty, new_ty) = match (self.old.get(old), self.new.get(new)) {
            (Some(o), Some(n)) => (o, n),
            (o, _) => {
                let missing = if o.is_none() { old } else { new };
                return vec![DiffNode::breaking(
                    ChangeKind::Unresolvable {
                        reason: format!("type {} is not defined", missing),
                    },
                    self.subject(old, new),
                )];
            }
        };

        match (old_ty.as_ref(), new_ty.as_ref()) {
            (
                Type::Fundamental {
                    name: old_name,
                    size: old_size,
                },
                Type::Fundamental {
                    name: new_name,
                    size: new_size,
                },
            ) => {
                if old_name != new_name || old_size != new_size {
                    vec![DiffNode::breaking(
                        ChangeKind::FundamentalChanged,
                        self.subject(old, new),
                    )]
                } else {
                    Vec::new()
                }
            }
            (Type::Pointer { pointee: op }, Type::Pointer { pointee: np }) => {
                let inner = self.compare_at(*op, *np, Use::BehindPointer, depth + 1);
                self.wrap(ChangeKind::PointeeChanged, old, new, inner)
            }
            (
                Type::Array {
                    element: oe,
                    bound: ob,
                },
                Type::Array {
                    element: ne,
                    bound: nb,
                },
            ) => {
                let mut changes = Vec::new();
                if ob != nb {
                    changes.push(DiffNode::breaking(
                        ChangeKind::ArraySizeChanged { old: *ob, new: *nb },
                        self.subject(old, new),
                    ));
                }
                let inner = self.compare_at(*oe, *ne, Use::ByValue, depth + 1);
                changes.extend(self.wrap(ChangeKind::ElementTypeChanged, *oe, *ne, inner));
                changes
            }
            (Type::Record { .. }, Type::Record { .. }) => {
                self.compare_records(old, &old_ty, new, &new_ty, usage, depth)
            }
            (
                Type::Enum {
                    name: old_name,
                    underlying: ou,
                    enumerators: old_items,
                },
                Type::Enum {
                    name: new_name,
                    underlying: nu,
                    enumerators: new_items,
                },
            ) => {
                let mut changes = Vec::new();
                if old_name != new_name {
                    changes.push(DiffNode::informational(
                        ChangeKind::TypeNameChanged,
                        self.subject(old, new),
                    ));
                }
                let inner = self.compare_at(*ou, *nu, Use::ByValue, depth + 1);
                changes.extend(self.wrap(ChangeKind::UnderlyingTypeChanged, *ou, *nu, inner));
                changes.extend(self.compare_enumerators(old, new, old_items, new_items));
                changes
            }
            (
                Type::FunctionType {
                    return_type: oret,
                    params: old_params,
                    variadic: old_variadic,
                },
                Type::FunctionType {
                    return_type: nret,
                    params: new_params,
                    variadic: new_variadic,
                },
            ) => {
                let mut changes = Vec::new();
                let inner = self.compare_at(*oret, *nret, Use::ByValue, depth + 1);
                changes.extend(self.wrap(ChangeKind::ReturnTypeChanged, *oret, *nret, inner));
                if old_params.len() != new_params.len() {
                    changes.push(DiffNode::breaking(
                        ChangeKind::ParameterCountChanged {
                            old: old_params.len(),
                            new: new_params.len(),
                        },
                        self.subject(old, new),
                    ));
                }
                for (index, (op, np)) in old_params.iter().zip(new_params.iter()).enumerate() {
                    let inner = self.compare_at(*op, *np, Use::ByValue, depth + 1);
                    changes.extend(self.wrap(
                        ChangeKind::ParameterTypeChanged { index },
                        *op,
                        *np,
                        inner,
                    ));
                }
                if old_variadic != new_variadic {
                    changes.push(DiffNode::breaking(
                        ChangeKind::VariadicChanged {
                            old: *old_variadic,
                            new: *new_variadic,
                        },
                        self.subject(old, new),
                    ));
                }
                changes
            }
            _ => vec![DiffNode::breaking(
                ChangeKind::ShapeChanged,
                self.subject(old, new),
            )],
        }
    }

    /// Wrap non-empty `inner` changes in a container node.
    fn wrap(&self, kind: ChangeKind, old: TypeRef, new: TypeRef, inner: Vec<DiffNode>) -> Vec<DiffNode> {
        if inner.is_empty() {
            Vec::new()
        } else {
            vec![DiffNode::container(kind, self.subject(old, new), inner)]
        }
    }

    fn compare_records(
        &mut self,
        old: TypeRef,
        old_ty: &Arc<Type>,
        new: TypeRef,
        new_ty: &Arc<Type>,
        usage: Use,
        depth: usize,
    ) -> Vec<DiffNode> {
        let (
            Type::Record {
                kind: old_kind,
                name: old_name,
                size: old_size,
                fields: old_fields,
                declaration_only: old_opaque,
            },
            Type::Record {
                kind: new_kind,
                name: new_name,
                size: new_size,
                fields: new_fields,
                declaration_only: new_opaque,
            },
        ) = (old_ty.as_ref(), new_ty.as_ref())
        else {
            return Vec::new();
        };

        let subject = self.subject(old, new);
        let mut changes = Vec::new();
        if old_kind != new_kind {
            changes.push(DiffNode::breaking(
                ChangeKind::RecordKindChanged,
                subject.clone(),
            ));
        }
        if old_name != new_name {
            changes.push(DiffNode::informational(
                ChangeKind::TypeNameChanged,
                subject.clone(),
            ));
        }

        if *old_opaque || *new_opaque {
            if old_opaque != new_opaque {
                let severity = match usage {
                    Use::ByValue => Severity::Breaking,
                    Use::BehindPointer => Severity::Informational,
                };
                changes.push(DiffNode::leaf(
                    ChangeKind::RecordSizeChanged {
                        old: *old_size,
                        new: *new_size,
                    },
                    severity,
                    subject,
                ));
            }
            return changes;
        }

        let mut layout = self.compare_fields(&subject, old_fields, new_fields, depth);

        if old_size != new_size {
            let only_appended = layout
                .iter()
                .all(|n| n.category() == ChangeCategory::FieldAdded && n.severity == Severity::Informational);
            let severity = match usage {
                Use::BehindPointer if only_appended => Severity::Informational,
                _ => Severity::Breaking,
            };
            changes.push(DiffNode::leaf(
                ChangeKind::RecordSizeChanged {
                    old: *old_size,
                    new: *new_size,
                },
                severity,
                subject,
            ));
        }
        changes.append(&mut layout);
        changes
    }

    fn compare_fields(
        &mut self,
        subject: &Subject,
        old_fields: &[Field],
        new_fields: &[Field],
        depth: usize,
    ) -> Vec<DiffNode> {
        let old_keys = field_keys(old_fields);
        let new_keys = field_keys(new_fields);
        let new_index: HashMap<&FieldKey, usize> =
            new_keys.iter().enumerate().map(|(i, k)| (k, i)).collect();

        let mut changes = Vec::new();
        let mut new_matched = vec![false; new_fields.len()];
        let mut unmatched_old = Vec::new();
        let mut matched_positions = Vec::new();

        for (oi, key) in old_keys.iter().enumerate() {
            let Some(&ni) = new_index.get(key) else {
                unmatched_old.push(oi);
                continue;
            };
            new_matched[ni] = true;
            matched_positions.push(ni);
            let (of, nf) = (&old_fields[oi], &new_fields[ni]);
            let label = field_label(of, key);
            if of.offset_bits != nf.offset_bits {
                changes.push(DiffNode::breaking(
                    ChangeKind::FieldOffsetChanged {
                        name: label.clone(),
                        old_bits: of.offset_bits,
                        new_bits: nf.offset_bits,
                    },
                    subject.clone(),
                ));
            }
            let inner = self.compare_at(of.ty, nf.ty, Use::ByValue, depth + 1);
            changes.extend(self.wrap(ChangeKind::FieldTypeChanged { name: label }, of.ty, nf.ty, inner));
        }

        if matched_positions.windows(2).any(|w| w[0] > w[1]) {
            changes.push(DiffNode::breaking(
                ChangeKind::FieldsReordered,
                subject.clone(),
            ));
        }

        for oi in unmatched_old {
            let of = &old_fields[oi];
            let renamed = (0..new_fields.len()).find(|&ni| {
                !new_matched[ni] && new_fields[ni].offset_bits == of.offset_bits && {
                    let nf = &new_fields[ni];
                    self.compare_at(of.ty, nf.ty, Use::ByValue, depth + 1).is_empty()
                }
            });
            match renamed {
                Some(ni) => {
                    new_matched[ni] = true;
                    changes.push(DiffNode::informational(
                        ChangeKind::FieldRenamed {
                            old: field_label(of, &old_keys[oi]),
                            new: field_label(&new_fields[ni], &new_keys[ni]),
                        },
                        subject.clone(),
                    ));
                }
                None => changes.push(DiffNode::breaking(
                    ChangeKind::FieldRemoved {
                        name: field_label(of, &old_keys[oi]),
                    },
                    subject.clone(),
                )),
            }
        }

        let old_end = old_fields.iter().map(|f| f.offset_bits).max();
        for (ni, nf) in new_fields.iter().enumerate() {
            if new_matched[ni] {
                continue;
            }
            let appended = old_end.map_or(true, |end| nf.offset_bits > end);
            let severity = if appended {
                Severity::Informational
            } else {
                Severity::Breaking
            };
            changes.push(DiffNode::leaf(
                ChangeKind::FieldAdded {
                    name: field_label(nf, &new_keys[ni]),
                },
                severity,
                subject.clone(),
            ));
        }
        changes
    }

    fn compare_enumerators(
        &self,
        old: TypeRef,
        new: TypeRef,
        old_items: &[Enumerator],
        new_items: &[Enumerator],
    ) -> Vec<DiffNode> {
        let subject = self.subject(old, new);
        let new_values: HashMap<&str, i64> =
            new_items.iter().map(|e| (e.name.as_str(), e.value)).collect();
        let old_names: HashSet<&str> = old_items.iter().map(|e| e.name.as_str()).collect();

        let mut changes = Vec::new();
        for item in old_items {
            match new_values.get(item.name.as_str()) {
                None => changes.push(DiffNode::breaking(
                    ChangeKind::EnumeratorRemoved {
                        name: item.name.clone(),
                    },
                    subject.clone(),
                )),
                Some(&value) if value != item.value => changes.push(DiffNode::breaking(
                    ChangeKind::EnumeratorValueChanged {
                        name: item.name.clone(),
                        old: item.value,
                        new: value,
                    },
                    subject.clone(),
                )),
                Some(_) => {}
            }
        }
        for item in new_items {
            if !old_names.contains(item.name.as_str()) {
                changes.push(DiffNode::informational(
                    ChangeKind::EnumeratorAdded {
                        name: item.name.clone(),
                    },
                    subject.clone(),
                ));
            }
        }
        changes
    }
}
