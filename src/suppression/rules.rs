//! Suppression rule files.
//!
//! ```json
//! { "rules": [
//!     { "label": "legacy-table",
//!       "linkage_name": "^legacy_",
//!       "change_kinds": ["array-size-changed"] } ] }
//! ```
//!
//! Every predicate present on a rule must match. Patterns are unanchored
//! regular expressions; write `^...$` for whole-name matches.

use crate::diff::{ChangeCategory, DiffNode};
use crate::error::ConfigError;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Minimum Jaro-Winkler score for a "did you mean" hint.
const HINT_MIN_SCORE: f64 = 0.8;

/// Entries stay untyped here so a bad rule is reported with its index.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleFile {
    rules: Vec<serde_json::Value>,
}

/// One rule as written in the file, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    pub label: Option<String>,
    pub linkage_name: Option<String>,
    pub type_name: Option<String>,
    pub change_kinds: Option<Vec<String>>,
}

/// A validated suppression rule.
#[derive(Debug, Clone)]
pub struct SuppressionRule {
    label: String,
    linkage_name: Option<Regex>,
    type_name: Option<Regex>,
    change_kinds: Option<HashSet<ChangeCategory>>,
}

/// Declaration a node belongs to; absent for corpus-level changes.
#[derive(Debug, Clone, Copy)]
pub struct MatchContext<'a> {
    pub linkage_name: &'a str,
    pub display_name: &'a str,
}

fn closest_category(name: &str) -> Option<&'static str> {
    let mut best: Option<(&'static str, f64)> = None;
    for category in ChangeCategory::ALL {
        let s = strsim::jaro_winkler(name, category.as_str());
        if s >= HINT_MIN_SCORE && best.map_or(true, |(_, bs)| s > bs) {
            best = Some((category.as_str(), s));
        }
    }
    best.map(|(c, _)| c)
}

impl SuppressionRule {
    /// Validate `spec`, the `index`-th rule of the file at `origin`.
    pub fn compile(spec: &RuleSpec, index: usize, origin: &Path) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidSuppressionRule {
            origin: origin.to_path_buf(),
            index,
            reason,
        };
        if spec.linkage_name.is_none() && spec.type_name.is_none() && spec.change_kinds.is_none() {
            return Err(invalid(
                "rule has no predicate (linkage_name, type_name, or change_kinds)".to_string(),
            ));
        }
        let pattern = |field: &str, value: &Option<String>| -> Result<Option<Regex>, ConfigError> {
            value
                .as_deref()
                .map(|p| Regex::new(p).map_err(|e| invalid(format!("invalid {} pattern: {}", field, e))))
                .transpose()
        };
        let linkage_name = pattern("linkage_name", &spec.linkage_name)?;
        let type_name = pattern("type_name", &spec.type_name)?;

        let change_kinds = match &spec.change_kinds {
            None => None,
            Some(kinds) if kinds.is_empty() => {
                return Err(invalid("change_kinds is empty".to_string()));
            }
            Some(kinds) => {
                let mut set = HashSet::new();
                for kind in kinds {
                    let Some(category) = ChangeCategory::from_name(kind) else {
                        let hint = closest_category(kind)
                            .map(|c| format!("; did you mean `{}`?", c))
                            .unwrap_or_default();
                        return Err(invalid(format!("unknown change kind `{}`{}", kind, hint)));
                    };
                    set.insert(category);
                }
                Some(set)
            }
        };

        Ok(Self {
            label: spec
                .label
                .clone()
                .unwrap_or_else(|| format!("rule #{}", index)),
            linkage_name,
            type_name,
            change_kinds,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether this rule suppresses `node`.
    pub fn matches(&self, context: Option<MatchContext<'_>>, node: &DiffNode) -> bool {
        if let Some(kinds) = &self.change_kinds {
            if !kinds.contains(&node.category()) {
                return false;
            }
        }
        if let Some(re) = &self.linkage_name {
            match context {
                Some(ctx) if re.is_match(ctx.linkage_name) || re.is_match(ctx.display_name) => {}
                _ => return false,
            }
        }
        if let Some(re) = &self.type_name {
            let subject = &node.subject;
            let hit = [&subject.old, &subject.new]
                .into_iter()
                .flatten()
                .any(|s| re.is_match(s));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// An ordered set of rules loaded from one origin.
#[derive(Debug, Clone)]
pub struct SuppressionSet {
    origin: PathBuf,
    rules: Vec<SuppressionRule>,
}

impl SuppressionSet {
    pub fn empty() -> Self {
        Self {
            origin: PathBuf::from("<none>"),
            rules: Vec::new(),
        }
    }

    /// Validate every rule; the first invalid one fails the whole set.
    pub fn from_specs(origin: &Path, specs: &[RuleSpec]) -> Result<Self, ConfigError> {
        let rules = specs
            .iter()
            .enumerate()
            .map(|(index, spec)| SuppressionRule::compile(spec, index, origin))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            origin: origin.to_path_buf(),
            rules,
        })
    }

    pub fn from_json_str(origin: &Path, text: &str) -> Result<Self, ConfigError> {
        let file: RuleFile = serde_json::from_str(text).map_err(|e| ConfigError::Malformed {
            origin: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        let specs = file
            .rules
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                serde_json::from_value::<RuleSpec>(entry).map_err(|e| {
                    ConfigError::InvalidSuppressionRule {
                        origin: origin.to_path_buf(),
                        index,
                        reason: e.to_string(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_specs(origin, &specs)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
            origin: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(path, &text)
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn rules(&self) -> &[SuppressionRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Label of the first rule matching `node`.
    pub fn first_match(&self, context: Option<MatchContext<'_>>, node: &DiffNode) -> Option<&str> {
        self.rules
            .iter()
            .find(|r| r.matches(context, node))
            .map(|r| r.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{ChangeKind, Subject};

    fn origin() -> &'static Path {
        Path::new("rules.json")
    }

    fn array_node() -> DiffNode {
        DiffNode::breaking(
            ChangeKind::ArraySizeChanged {
                old: Some(5),
                new: Some(2),
            },
            Subject::text(Some("int[5]".into()), Some("int[2]".into())),
        )
    }

    #[test]
    fn test_parse_and_match() {
        let set = SuppressionSet::from_json_str(
            origin(),
            r#"{ "rules": [ { "label": "tables", "linkage_name": "^legacy_", "change_kinds": ["array-size-changed"] } ] }"#,
        )
        .unwrap();
        assert_eq!(set.len(), 1);
        let ctx = MatchContext {
            linkage_name: "legacy_table",
            display_name: "legacy_table",
        };
        assert_eq!(set.first_match(Some(ctx), &array_node()), Some("tables"));
        let other = MatchContext {
            linkage_name: "table",
            display_name: "table",
        };
        assert_eq!(set.first_match(Some(other), &array_node()), None);
        assert_eq!(set.first_match(None, &array_node()), None);
    }

    #[test]
    fn test_type_pattern_matches_either_side() {
        let set = SuppressionSet::from_json_str(
            origin(),
            r#"{ "rules": [ { "type_name": "int\\[2\\]" } ] }"#,
        )
        .unwrap();
        assert_eq!(set.first_match(None, &array_node()), Some("rule #0"));
    }

    #[test]
    fn test_unknown_kind_has_hint() {
        let err = SuppressionSet::from_json_str(
            origin(),
            r#"{ "rules": [ { "label": "ok", "change_kinds": ["added"] }, { "change_kinds": ["array-size-change"] } ] }"#,
        )
        .unwrap_err();
        match err {
            ConfigError::InvalidSuppressionRule { index, reason, .. } => {
                assert_eq!(index, 1);
                assert!(reason.contains("did you mean `array-size-changed`"), "{}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_invalid_rules_rejected() {
        for text in [
            r#"{ "rules": [ {} ] }"#,
            r#"{ "rules": [ { "label": "only a label" } ] }"#,
            r#"{ "rules": [ { "linkage_name": "(" } ] }"#,
            r#"{ "rules": [ { "change_kinds": [] } ] }"#,
        ] {
            let err = SuppressionSet::from_json_str(origin(), text).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidSuppressionRule { index: 0, .. }),
                "{}: {:?}",
                text,
                err
            );
        }
    }

    #[test]
    fn test_malformed_file() {
        let err = SuppressionSet::from_json_str(origin(), "{ rules: ").unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
        let err = SuppressionSet::from_json_str(origin(), r#"{ "rules": {} }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
        let err = SuppressionSet::from_json_str(origin(), r#"{ "rules": [], "extra": 1 }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
    }

    #[test]
    fn test_badly_shaped_rule_names_its_index() {
        let text = r#"{ "rules": [
            { "label": "ok", "linkage_name": "^a" },
            { "kind": "x" } ] }"#;
        match SuppressionSet::from_json_str(origin(), text).unwrap_err() {
            ConfigError::InvalidSuppressionRule { index, reason, .. } => {
                assert_eq!(index, 1);
                assert!(reason.contains("kind"), "{}", reason);
            }
            other => panic!("unexpected {:?}", other),
        }

        let text = r#"{ "rules": [ { "change_kinds": "array-size-changed" } ] }"#;
        assert!(matches!(
            SuppressionSet::from_json_str(origin(), text).unwrap_err(),
            ConfigError::InvalidSuppressionRule { index: 0, .. }
        ));
    }

    #[test]
    fn test_unreadable_file_names_path() {
        let err = SuppressionSet::from_json_file("/nonexistent/rules.json").unwrap_err();
        assert!(err.to_string().starts_with("/nonexistent/rules.json"));
    }
}
