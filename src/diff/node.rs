//! Nodes of the diff tree.

use crate::corpus::{DeclarationKind, SymbolBinding};
use crate::ir::{Qualifiers, TypeRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Impact of a change on existing callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Breaking,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Informational => write!(f, "informational"),
            Severity::Breaking => write!(f, "breaking"),
        }
    }
}

/// Outcome of a comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Compatible,
    Incompatible,
}

impl Verdict {
    /// Process exit code: 0 when compatible, 4 when not.
    pub fn exit_code(self) -> i32 {
        match self {
            Verdict::Compatible => crate::error::EXIT_COMPATIBLE,
            Verdict::Incompatible => crate::error::EXIT_INCOMPATIBLE,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Compatible => write!(f, "COMPATIBLE"),
            Verdict::Incompatible => write!(f, "INCOMPATIBLE"),
        }
    }
}

/// The payload-free name of a change, as used by suppression rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeCategory {
    Added,
    Removed,
    KindChanged,
    DeclarationChanged,
    Unresolvable,
    SymbolVersionChanged,
    SymbolBindingChanged,
    FundamentalChanged,
    ShapeChanged,
    QualifiersChanged,
    ArraySizeChanged,
    ElementTypeChanged,
    PointeeChanged,
    ParameterTypeChanged,
    ParameterCountChanged,
    ReturnTypeChanged,
    VariadicChanged,
    RecordKindChanged,
    TypeNameChanged,
    RecordSizeChanged,
    FieldAdded,
    FieldRemoved,
    FieldRenamed,
    FieldOffsetChanged,
    FieldTypeChanged,
    FieldsReordered,
    EnumeratorAdded,
    EnumeratorRemoved,
    EnumeratorValueChanged,
    UnderlyingTypeChanged,
    SonameChanged,
    NeededLibraryAdded,
    NeededLibraryRemoved,
    ArchitectureChanged,
}

impl ChangeCategory {
    pub const ALL: [ChangeCategory; 34] = [
        ChangeCategory::Added,
        ChangeCategory::Removed,
        ChangeCategory::KindChanged,
        ChangeCategory::DeclarationChanged,
        ChangeCategory::Unresolvable,
        ChangeCategory::SymbolVersionChanged,
        ChangeCategory::SymbolBindingChanged,
        ChangeCategory::FundamentalChanged,
        ChangeCategory::ShapeChanged,
        ChangeCategory::QualifiersChanged,
        ChangeCategory::ArraySizeChanged,
        ChangeCategory::ElementTypeChanged,
        ChangeCategory::PointeeChanged,
        ChangeCategory::ParameterTypeChanged,
        ChangeCategory::ParameterCountChanged,
        ChangeCategory::ReturnTypeChanged,
        ChangeCategory::VariadicChanged,
        ChangeCategory::RecordKindChanged,
        ChangeCategory::TypeNameChanged,
        ChangeCategory::RecordSizeChanged,
        ChangeCategory::FieldAdded,
        ChangeCategory::FieldRemoved,
        ChangeCategory::FieldRenamed,
        ChangeCategory::FieldOffsetChanged,
        ChangeCategory::FieldTypeChanged,
        ChangeCategory::FieldsReordered,
        ChangeCategory::EnumeratorAdded,
        ChangeCategory::EnumeratorRemoved,
        ChangeCategory::EnumeratorValueChanged,
        ChangeCategory::UnderlyingTypeChanged,
        ChangeCategory::SonameChanged,
        ChangeCategory::NeededLibraryAdded,
        ChangeCategory::NeededLibraryRemoved,
        ChangeCategory::ArchitectureChanged,
    ];

    /// Kebab-case name, e.g. `array-size-changed`.
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeCategory::Added => "added",
            ChangeCategory::Removed => "removed",
            ChangeCategory::KindChanged => "kind-changed",
            ChangeCategory::DeclarationChanged => "declaration-changed",
            ChangeCategory::Unresolvable => "unresolvable",
            ChangeCategory::SymbolVersionChanged => "symbol-version-changed",
            ChangeCategory::SymbolBindingChanged => "symbol-binding-changed",
            ChangeCategory::FundamentalChanged => "fundamental-changed",
            ChangeCategory::ShapeChanged => "shape-changed",
            ChangeCategory::QualifiersChanged => "qualifiers-changed",
            ChangeCategory::ArraySizeChanged => "array-size-changed",
            ChangeCategory::ElementTypeChanged => "element-type-changed",
            ChangeCategory::PointeeChanged => "pointee-changed",
            ChangeCategory::ParameterTypeChanged => "parameter-type-changed",
            ChangeCategory::ParameterCountChanged => "parameter-count-changed",
            ChangeCategory::ReturnTypeChanged => "return-type-changed",
            ChangeCategory::VariadicChanged => "variadic-changed",
            ChangeCategory::RecordKindChanged => "record-kind-changed",
            ChangeCategory::TypeNameChanged => "type-name-changed",
            ChangeCategory::RecordSizeChanged => "record-size-changed",
            ChangeCategory::FieldAdded => "field-added",
            ChangeCategory::FieldRemoved => "field-removed",
            ChangeCategory::FieldRenamed => "field-renamed",
            ChangeCategory::FieldOffsetChanged => "field-offset-changed",
            ChangeCategory::FieldTypeChanged => "field-type-changed",
            ChangeCategory::FieldsReordered => "fields-reordered",
            ChangeCategory::EnumeratorAdded => "enumerator-added",
            ChangeCategory::EnumeratorRemoved => "enumerator-removed",
            ChangeCategory::EnumeratorValueChanged => "enumerator-value-changed",
            ChangeCategory::UnderlyingTypeChanged => "underlying-type-changed",
            ChangeCategory::SonameChanged => "soname-changed",
            ChangeCategory::NeededLibraryAdded => "needed-library-added",
            ChangeCategory::NeededLibraryRemoved => "needed-library-removed",
            ChangeCategory::ArchitectureChanged => "architecture-changed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == name)
    }

    /// Containers carry no impact of their own; their children do.
    pub fn is_container(self) -> bool {
        matches!(
            self,
            ChangeCategory::DeclarationChanged
                | ChangeCategory::ElementTypeChanged
                | ChangeCategory::PointeeChanged
                | ChangeCategory::ParameterTypeChanged
                | ChangeCategory::ReturnTypeChanged
                | ChangeCategory::FieldTypeChanged
                | ChangeCategory::UnderlyingTypeChanged
        )
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What changed, with the details needed to report it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "kebab-case")]
pub enum ChangeKind {
    Added,
    Removed,
    KindChanged {
        old: DeclarationKind,
        new: DeclarationKind,
    },
    DeclarationChanged,
    Unresolvable {
        reason: String,
    },
    SymbolVersionChanged {
        old: Option<String>,
        new: Option<String>,
    },
    SymbolBindingChanged {
        old: SymbolBinding,
        new: SymbolBinding,
    },
    FundamentalChanged,
    ShapeChanged,
    QualifiersChanged {
        old: Qualifiers,
        new: Qualifiers,
    },
    ArraySizeChanged {
        old: Option<u64>,
        new: Option<u64>,
    },
    ElementTypeChanged,
    PointeeChanged,
    ParameterTypeChanged {
        index: usize,
    },
    ParameterCountChanged {
        old: usize,
        new: usize,
    },
    ReturnTypeChanged,
    VariadicChanged {
        old: bool,
        new: bool,
    },
    RecordKindChanged,
    TypeNameChanged,
    RecordSizeChanged {
        old: Option<u64>,
        new: Option<u64>,
    },
    FieldAdded {
        name: String,
    },
    FieldRemoved {
        name: String,
    },
    FieldRenamed {
        old: String,
        new: String,
    },
    FieldOffsetChanged {
        name: String,
        old_bits: u64,
        new_bits: u64,
    },
    FieldTypeChanged {
        name: String,
    },
    FieldsReordered,
    EnumeratorAdded {
        name: String,
    },
    EnumeratorRemoved {
        name: String,
    },
    EnumeratorValueChanged {
        name: String,
        old: i64,
        new: i64,
    },
    UnderlyingTypeChanged,
    SonameChanged {
        old: Option<String>,
        new: Option<String>,
    },
    NeededLibraryAdded {
        name: String,
    },
    NeededLibraryRemoved {
        name: String,
    },
    ArchitectureChanged {
        old: Option<String>,
        new: Option<String>,
    },
}

impl ChangeKind {
    pub fn category(&self) -> ChangeCategory {
        match self {
            ChangeKind::Added => ChangeCategory::Added,
            ChangeKind::Removed => ChangeCategory::Removed,
            ChangeKind::KindChanged { .. } => ChangeCategory::KindChanged,
            ChangeKind::DeclarationChanged => ChangeCategory::DeclarationChanged,
            ChangeKind::Unresolvable { .. } => ChangeCategory::Unresolvable,
            ChangeKind::SymbolVersionChanged { .. } => ChangeCategory::SymbolVersionChanged,
            ChangeKind::SymbolBindingChanged { .. } => ChangeCategory::SymbolBindingChanged,
            ChangeKind::FundamentalChanged => ChangeCategory::FundamentalChanged,
            ChangeKind::ShapeChanged => ChangeCategory::ShapeChanged,
            ChangeKind::QualifiersChanged { .. } => ChangeCategory::QualifiersChanged,
            ChangeKind::ArraySizeChanged { .. } => ChangeCategory::ArraySizeChanged,
            ChangeKind::ElementTypeChanged => ChangeCategory::ElementTypeChanged,
            ChangeKind::PointeeChanged => ChangeCategory::PointeeChanged,
            ChangeKind::ParameterTypeChanged { .. } => ChangeCategory::ParameterTypeChanged,
            ChangeKind::ParameterCountChanged { .. } => ChangeCategory::ParameterCountChanged,
            ChangeKind::ReturnTypeChanged => ChangeCategory::ReturnTypeChanged,
            ChangeKind::VariadicChanged { .. } => ChangeCategory::VariadicChanged,
            ChangeKind::RecordKindChanged => ChangeCategory::RecordKindChanged,
            ChangeKind::TypeNameChanged => ChangeCategory::TypeNameChanged,
            ChangeKind::RecordSizeChanged { .. } => ChangeCategory::RecordSizeChanged,
            ChangeKind::FieldAdded { .. } => ChangeCategory::FieldAdded,
            ChangeKind::FieldRemoved { .. } => ChangeCategory::FieldRemoved,
            ChangeKind::FieldRenamed { .. } => ChangeCategory::FieldRenamed,
            ChangeKind::FieldOffsetChanged { .. } => ChangeCategory::FieldOffsetChanged,
            ChangeKind::FieldTypeChanged { .. } => ChangeCategory::FieldTypeChanged,
            ChangeKind::FieldsReordered => ChangeCategory::FieldsReordered,
            ChangeKind::EnumeratorAdded { .. } => ChangeCategory::EnumeratorAdded,
            ChangeKind::EnumeratorRemoved { .. } => ChangeCategory::EnumeratorRemoved,
            ChangeKind::EnumeratorValueChanged { .. } => ChangeCategory::EnumeratorValueChanged,
            ChangeKind::UnderlyingTypeChanged => ChangeCategory::UnderlyingTypeChanged,
            ChangeKind::SonameChanged { .. } => ChangeCategory::SonameChanged,
            ChangeKind::NeededLibraryAdded { .. } => ChangeCategory::NeededLibraryAdded,
            ChangeKind::NeededLibraryRemoved { .. } => ChangeCategory::NeededLibraryRemoved,
            ChangeKind::ArchitectureChanged { .. } => ChangeCategory::ArchitectureChanged,
        }
    }

    /// One-line description used by the text report.
    pub fn describe(&self) -> String {
        fn opt(v: &Option<String>) -> &str {
            v.as_deref().unwrap_or("(none)")
        }
        fn bound(v: &Option<u64>) -> String {
            v.map(|n| n.to_string()).unwrap_or_else(|| "unknown".to_string())
        }
        match self {
            ChangeKind::KindChanged { old, new } => format!("{} became {}", old, new),
            ChangeKind::Unresolvable { reason } => reason.clone(),
            ChangeKind::SymbolVersionChanged { old, new } => {
                format!("version {} -> {}", opt(old), opt(new))
            }
            ChangeKind::SymbolBindingChanged { old, new } => {
                format!("binding {:?} -> {:?}", old, new).to_lowercase()
            }
            ChangeKind::QualifiersChanged { old, new } => format!("{} -> {}", old, new),
            ChangeKind::ArraySizeChanged { old, new } => {
                format!("[{}] -> [{}]", bound(old), bound(new))
            }
            ChangeKind::ParameterTypeChanged { index } => format!("parameter {}", index),
            ChangeKind::ParameterCountChanged { old, new } => {
                format!("{} -> {} parameters", old, new)
            }
            ChangeKind::VariadicChanged { old, new } => format!("variadic {} -> {}", old, new),
            ChangeKind::RecordSizeChanged { old, new } => {
                format!("{} -> {} bytes", bound(old), bound(new))
            }
            ChangeKind::FieldAdded { name }
            | ChangeKind::FieldRemoved { name }
            | ChangeKind::FieldTypeChanged { name }
            | ChangeKind::EnumeratorAdded { name }
            | ChangeKind::EnumeratorRemoved { name }
            | ChangeKind::NeededLibraryAdded { name }
            | ChangeKind::NeededLibraryRemoved { name } => format!("`{}`", name),
            ChangeKind::FieldRenamed { old, new } => format!("`{}` -> `{}`", old, new),
            ChangeKind::FieldOffsetChanged {
                name,
                old_bits,
                new_bits,
            } => format!("`{}` offset {} -> {} bits", name, old_bits, new_bits),
            ChangeKind::EnumeratorValueChanged { name, old, new } => {
                format!("`{}` {} -> {}", name, old, new)
            }
            ChangeKind::SonameChanged { old, new } | ChangeKind::ArchitectureChanged { old, new } => {
                format!("{} -> {}", opt(old), opt(new))
            }
            ChangeKind::Added
            | ChangeKind::Removed
            | ChangeKind::DeclarationChanged
            | ChangeKind::FundamentalChanged
            | ChangeKind::ShapeChanged
            | ChangeKind::ElementTypeChanged
            | ChangeKind::PointeeChanged
            | ChangeKind::ReturnTypeChanged
            | ChangeKind::RecordKindChanged
            | ChangeKind::TypeNameChanged
            | ChangeKind::FieldsReordered
            | ChangeKind::UnderlyingTypeChanged => String::new(),
        }
    }
}

/// The affected entity in the old and new corpus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// C-like spelling in the old corpus.
    pub old: Option<String>,
    /// C-like spelling in the new corpus.
    pub new: Option<String>,
    /// Handles into the respective environments.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub old_type: Option<TypeRef>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub new_type: Option<TypeRef>,
}

impl Subject {
    /// A subject without type handles (declarations and corpus metadata).
    pub fn text(old: Option<String>, new: Option<String>) -> Self {
        Self {
            old,
            new,
            ..Self::default()
        }
    }
}

/// One detected change. Containers derive their severity from children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffNode {
    #[serde(flatten)]
    pub kind: ChangeKind,
    pub severity: Severity,
    pub subject: Subject,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<DiffNode>,
    /// Label of the suppression rule that matched this node.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub suppressed_by: Option<String>,
}

impl DiffNode {
    pub fn leaf(kind: ChangeKind, severity: Severity, subject: Subject) -> Self {
        Self {
            kind,
            severity,
            subject,
            children: Vec::new(),
            suppressed_by: None,
        }
    }

    pub fn breaking(kind: ChangeKind, subject: Subject) -> Self {
        Self::leaf(kind, Severity::Breaking, subject)
    }

    pub fn informational(kind: ChangeKind, subject: Subject) -> Self {
        Self::leaf(kind, Severity::Informational, subject)
    }

    pub fn container(kind: ChangeKind, subject: Subject, children: Vec<DiffNode>) -> Self {
        let mut node = Self {
            kind,
            severity: Severity::Informational,
            subject,
            children,
            suppressed_by: None,
        };
        node.refresh_severity();
        node
    }

    pub fn category(&self) -> ChangeCategory {
        self.kind.category()
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed_by.is_some()
    }

    /// Severity for verdict purposes: suppressed nodes count as informational.
    pub fn effective_severity(&self) -> Severity {
        if self.is_suppressed() {
            Severity::Informational
        } else {
            self.severity
        }
    }

    /// Recompute container severities bottom-up from effective child severities.
    pub fn refresh_severity(&mut self) {
        if self.children.is_empty() {
            return;
        }
        let mut severity = Severity::Informational;
        for child in &mut self.children {
            child.refresh_severity();
            severity = severity.max(child.effective_severity());
        }
        self.severity = severity;
    }

    /// Depth-first walk over this node and its descendants.
    pub fn walk(&self) -> Vec<&DiffNode> {
        let mut out = vec![self];
        let mut i = 0;
        while i < out.len() {
            let node = out[i];
            out.extend(node.children.iter());
            i += 1;
        }
        out
    }

    pub(crate) fn tally(&self, counts: &mut Counts, suppressed: bool) {
        let suppressed = suppressed || self.is_suppressed();
        if self.children.is_empty() {
            if suppressed {
                counts.suppressed += 1;
                counts.informational += 1;
            } else if self.severity == Severity::Breaking {
                counts.breaking += 1;
            } else {
                counts.informational += 1;
            }
            return;
        }
        for child in &self.children {
            child.tally(counts, suppressed);
        }
    }
}

/// Leaf-change counts of a tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub breaking: usize,
    pub informational: usize,
    pub suppressed: usize,
}
