//! ELF-level facts: the exported symbol table, `DT_SONAME` and `DT_NEEDED`.

use crate::corpus::{SymbolBinding, SymbolInfo, SymbolVisibility};
use crate::error::ExtractionError;
use object::elf;
use object::read::elf::{Dyn, FileHeader, SectionHeader, Sym, SymbolTable, VersionTable};
use object::{Endianness, Object, SymbolIndex};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// What the ELF container says about a binary's interface.
#[derive(Debug, Clone, Default)]
pub struct ElfFacts {
    pub architecture: Option<String>,
    pub soname: Option<String>,
    pub needed: Vec<String>,
    /// Defined global/weak code and data symbols with default or protected visibility.
    pub exports: HashMap<String, SymbolInfo>,
    /// Whether any `.dynsym` or `.symtab` was present.
    pub has_symbol_table: bool,
}

impl ElfFacts {
    pub fn export(&self, linkage_name: &str) -> Option<&SymbolInfo> {
        self.exports.get(linkage_name)
    }
}

/// Read symbol and dynamic-section facts from an ELF image.
pub fn read_elf_facts(path: &Path, data: &[u8]) -> Result<ElfFacts, ExtractionError> {
    let file = object::File::parse(data).map_err(|e| ExtractionError::NotAnObject {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    if file.format() != object::BinaryFormat::Elf {
        return Err(ExtractionError::NotAnObject {
            path: path.to_path_buf(),
            reason: format!("{:?} images are not supported", file.format()),
        });
    }

    let parsed = if file.is_64() {
        parse_elf::<elf::FileHeader64<Endianness>>(data)
    } else {
        parse_elf::<elf::FileHeader32<Endianness>>(data)
    };
    let mut facts = parsed
        .map_err(|e| ExtractionError::malformed(path, format!("ELF structure: {}", e)))?;
    facts.architecture = Some(format!("{:?}", file.architecture()).to_lowercase());

    debug!(
        path = %path.display(),
        exports = facts.exports.len(),
        needed = facts.needed.len(),
        soname = facts.soname.as_deref().unwrap_or(""),
        "Read ELF symbol facts"
    );
    Ok(facts)
}

fn parse_elf<Elf: FileHeader<Endian = Endianness>>(data: &[u8]) -> object::read::Result<ElfFacts> {
    let header = Elf::parse(data)?;
    let endian = header.endian()?;
    let sections = header.sections(endian, data)?;
    let mut facts = ElfFacts::default();

    for section in sections.iter() {
        let Some((entries, link)) = section.dynamic(endian, data)? else {
            continue;
        };
        let strings = sections.strings(endian, data, link)?;
        for entry in entries {
            match entry.tag32(endian) {
                Some(elf::DT_SONAME) => {
                    facts.soname = Some(lossy(entry.string(endian, strings)?));
                }
                Some(elf::DT_NEEDED) => facts.needed.push(lossy(entry.string(endian, strings)?)),
                _ => {}
            }
        }
    }

    let versions = sections.versions(endian, data)?;
    let dynsym = sections.symbols(endian, data, elf::SHT_DYNSYM)?;
    let symtab = sections.symbols(endian, data, elf::SHT_SYMTAB)?;
    facts.has_symbol_table = !dynsym.is_empty() || !symtab.is_empty();

    // Dynamic entries first so versioned information is kept.
    collect_exports(&mut facts, endian, &dynsym, versions.as_ref())?;
    collect_exports(&mut facts, endian, &symtab, None)?;
    Ok(facts)
}

fn collect_exports<Elf: FileHeader<Endian = Endianness>>(
    facts: &mut ElfFacts,
    endian: Endianness,
    table: &SymbolTable<'_, Elf>,
    versions: Option<&VersionTable<'_, Elf>>,
) -> object::read::Result<()> {
    for (index, sym) in table.iter().enumerate() {
        if sym.is_undefined(endian) {
            continue;
        }
        if !matches!(
            sym.st_type(),
            elf::STT_FUNC | elf::STT_OBJECT | elf::STT_TLS | elf::STT_GNU_IFUNC
        ) {
            continue;
        }
        let binding = match sym.st_bind() {
            elf::STB_GLOBAL | elf::STB_GNU_UNIQUE => SymbolBinding::Global,
            elf::STB_WEAK => SymbolBinding::Weak,
            _ => continue,
        };
        let visibility = match sym.st_visibility() {
            elf::STV_DEFAULT => SymbolVisibility::Default,
            elf::STV_PROTECTED => SymbolVisibility::Protected,
            _ => continue,
        };
        let name = lossy(sym.name(endian, table.strings())?);
        if name.is_empty() {
            continue;
        }
        let version = match versions {
            Some(versions) => {
                let vindex = versions.version_index(endian, SymbolIndex(index));
                versions.version(vindex)?.map(|v| lossy(v.name()))
            }
            None => None,
        };
        facts.exports.entry(name).or_insert(SymbolInfo {
            binding,
            visibility,
            version,
        });
    }
    Ok(())
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
