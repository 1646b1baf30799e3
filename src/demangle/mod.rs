//! Display names for linkage names.
//!
//! Reports show the demangled spelling next to the linkage name; matching,
//! archives, and suppression linkage patterns always use the linkage name
//! itself.

use once_cell::sync::Lazy;
use regex::Regex;

// Itanium (GCC/Clang) ABI: _Z..., anchored since we look at whole symbol names.
static RE_ITA_MANGLED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^_Z[a-zA-Z0-9_.$]+$").expect("valid itanium mangled regex"));
// MSVC: ?name@@... or ??0...
static RE_MSVC_MANGLED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\?\??[A-Za-z0-9_@$?]+@@[A-Za-z0-9_@$?]*$").expect("valid msvc mangled regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolFlavor {
    Rust,
    Itanium,
    Msvc,
    /// Plain C or otherwise unmangled.
    Unmangled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemangleResult {
    pub original: String,
    pub demangled: String,
    pub flavor: SymbolFlavor,
}

pub fn detect_flavor(s: &str) -> SymbolFlavor {
    if rustc_demangle::try_demangle(s).is_ok() {
        return SymbolFlavor::Rust;
    }
    if RE_ITA_MANGLED.is_match(s) {
        return SymbolFlavor::Itanium;
    }
    if RE_MSVC_MANGLED.is_match(s) {
        return SymbolFlavor::Msvc;
    }
    SymbolFlavor::Unmangled
}

/// Attempt to demangle a single symbol. Returns None when not recognized.
pub fn demangle_one(s: &str) -> Option<DemangleResult> {
    let (demangled, flavor) = match detect_flavor(s) {
        SymbolFlavor::Rust => (
            format!("{:#}", rustc_demangle::try_demangle(s).ok()?),
            SymbolFlavor::Rust,
        ),
        SymbolFlavor::Itanium => (
            cpp_demangle::Symbol::new(s).ok()?.to_string(),
            SymbolFlavor::Itanium,
        ),
        SymbolFlavor::Msvc => (
            msvc_demangler::demangle(s, msvc_demangler::DemangleFlags::COMPLETE).ok()?,
            SymbolFlavor::Msvc,
        ),
        SymbolFlavor::Unmangled => return None,
    };
    Some(DemangleResult {
        original: s.to_string(),
        demangled,
        flavor,
    })
}

/// Human-readable name for reports: demangled when possible, else unchanged.
pub fn display_name(linkage_name: &str) -> String {
    demangle_one(linkage_name)
        .map(|r| r.demangled)
        .unwrap_or_else(|| linkage_name.to_string())
}
