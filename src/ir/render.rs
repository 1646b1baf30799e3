//! C-like spelling of canonical types for reports and suppression matching.

use super::environment::Environment;
use super::types::{Type, TypeRef};

/// Deep enough for any real declarator; guards against malformed graphs.
const MAX_RENDER_DEPTH: usize = 64;

impl Environment {
    /// Render `handle` the way a C programmer would read it, e.g.
    /// `const char*`, `int[5]`, `struct node`, `double (double, double)`.
    pub fn render(&self, handle: TypeRef) -> String {
        self.render_depth(handle, 0)
    }

    fn render_depth(&self, handle: TypeRef, depth: usize) -> String {
        if depth > MAX_RENDER_DEPTH {
            return "...".to_string();
        }
        let Some(ty) = self.get(handle) else {
            return format!("<unresolved {}>", handle);
        };
        match ty.as_ref() {
            Type::Fundamental { name, .. } => name.clone(),
            Type::Qualified { base, qualifiers } => {
                let inner = self.render_depth(*base, depth + 1);
                let words = qualifiers.keywords().join(" ");
                match self.get(*base).as_deref() {
                    Some(Type::Pointer { .. }) => format!("{} {}", inner, words),
                    _ => format!("{} {}", words, inner),
                }
            }
            Type::Pointer { pointee } => format!("{}*", self.render_depth(*pointee, depth + 1)),
            Type::Array { element, bound } => {
                let inner = self.render_depth(*element, depth + 1);
                match bound {
                    Some(n) => format!("{}[{}]", inner, n),
                    None => format!("{}[]", inner),
                }
            }
            Type::Record {
                kind,
                name,
                declaration_only,
                ..
            } => {
                let label = name.as_deref().unwrap_or("{anonymous}");
                if *declaration_only {
                    format!("{} {} (incomplete)", kind.keyword(), label)
                } else {
                    format!("{} {}", kind.keyword(), label)
                }
            }
            Type::Enum { name, .. } => {
                format!("enum {}", name.as_deref().unwrap_or("{anonymous}"))
            }
            Type::FunctionType {
                return_type,
                params,
                variadic,
            } => {
                let mut args: Vec<String> = params
                    .iter()
                    .map(|p| self.render_depth(*p, depth + 1))
                    .collect();
                if *variadic {
                    args.push("...".to_string());
                }
                format!(
                    "{} ({})",
                    self.render_depth(*return_type, depth + 1),
                    args.join(", ")
                )
            }
        }
    }
}
