//! Fact source backed by an ELF binary's DWARF debug information.
//!
//! Raw type ids are `.debug_info` offsets, so references between units
//! (`DW_FORM_ref_addr`) resolve against the same id space. Exported
//! functions and variables are the DWARF definitions whose linkage name is a
//! defined, visible symbol in the ELF symbol tables; for binaries without any
//! symbol table, `DW_AT_external` decides.

use super::elf::{read_elf_facts, ElfFacts};
use super::{FactSource, RawMember, RawSymbol, RawType, RawTypeId, RawUnit};
use crate::corpus::{CorpusMetadata, DeclarationKind, SymbolInfo};
use crate::error::ExtractionError;
use crate::io::{BinaryImage, IOLimits};
use crate::ir::{Enumerator, RecordKind};
use gimli::{
    AttributeValue, DebuggingInformationEntry, Dwarf, EndianArcSlice, EntriesTreeNode, Reader as _,
    RunTimeEndian, SectionId, Unit, UnitOffset,
};
use object::{Object, ObjectSection};
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

type Reader = EndianArcSlice<RunTimeEndian>;
type Die<'abbrev, 'unit> = DebuggingInformationEntry<'abbrev, 'unit, Reader>;

/// Follow at most this many `DW_AT_specification`/`DW_AT_abstract_origin` links.
const MAX_ORIGIN_HOPS: usize = 4;

/// Failure while walking DWARF; mapped to `ExtractionError` with the binary path.
#[derive(Debug)]
enum WalkError {
    Dwarf(gimli::Error),
    Malformed(String),
}

impl From<gimli::Error> for WalkError {
    fn from(e: gimli::Error) -> Self {
        WalkError::Dwarf(e)
    }
}

impl WalkError {
    fn into_extraction(self, path: &Path) -> ExtractionError {
        match self {
            WalkError::Dwarf(e) => ExtractionError::malformed(path, format!("DWARF: {}", e)),
            WalkError::Malformed(reason) => ExtractionError::malformed(path, reason),
        }
    }
}

/// An ELF binary opened for DWARF extraction.
pub struct DwarfFactSource {
    image: BinaryImage,
    has_debug_info: bool,
}

impl DwarfFactSource {
    /// Map `path` and check that it is an object file.
    pub fn open<P: AsRef<Path>>(path: P, limits: &IOLimits) -> Result<Self, ExtractionError> {
        let path = path.as_ref();
        let image = BinaryImage::open(path, limits).map_err(|source| ExtractionError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file = object::File::parse(image.data()).map_err(|e| ExtractionError::NotAnObject {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let has_debug_info = file
            .section_by_name(".debug_info")
            .map(|s| s.size() > 0)
            .unwrap_or(false);
        debug!(path = %path.display(), has_debug_info, "Opened binary for DWARF extraction");
        Ok(Self {
            image,
            has_debug_info,
        })
    }

    fn parse(&self) -> Result<object::File<'_>, ExtractionError> {
        object::File::parse(self.image.data()).map_err(|e| ExtractionError::NotAnObject {
            path: self.image.path().to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl FactSource for DwarfFactSource {
    fn origin(&self) -> &Path {
        self.image.path()
    }

    fn has_debug_info(&self) -> bool {
        self.has_debug_info
    }

    fn metadata(&self) -> Result<CorpusMetadata, ExtractionError> {
        let elf = read_elf_facts(self.origin(), self.image.data())?;
        Ok(CorpusMetadata {
            path: None,
            architecture: elf.architecture,
            soname: elf.soname,
            needed: elf.needed,
        })
    }

    fn translation_units(&self) -> Result<Vec<RawUnit>, ExtractionError> {
        let path = self.origin();
        if !self.has_debug_info {
            return Err(ExtractionError::NoDebugInfo {
                path: path.to_path_buf(),
            });
        }
        let file = self.parse()?;
        let elf = read_elf_facts(path, self.image.data())?;
        let units = read_units(&file, &elf).map_err(|e| e.into_extraction(path))?;
        info!(
            path = %path.display(),
            units = units.len(),
            symbols = units.iter().map(|u| u.symbols.len()).sum::<usize>(),
            "Read DWARF facts"
        );
        Ok(units)
    }
}

fn load_dwarf(file: &object::File<'_>, endian: RunTimeEndian) -> Result<Dwarf<Reader>, WalkError> {
    Dwarf::load(|id: SectionId| -> Result<Reader, WalkError> {
        let data: Arc<[u8]> = match file.section_by_name(id.name()) {
            Some(section) => match section.uncompressed_data() {
                Ok(Cow::Borrowed(bytes)) => Arc::from(bytes),
                Ok(Cow::Owned(bytes)) => bytes.into(),
                Err(e) => {
                    return Err(WalkError::Malformed(format!(
                        "cannot read {}: {}",
                        id.name(),
                        e
                    )))
                }
            },
            None => Arc::from(Vec::new()),
        };
        Ok(EndianArcSlice::new(data, endian))
    })
}

fn read_units(file: &object::File<'_>, elf: &ElfFacts) -> Result<Vec<RawUnit>, WalkError> {
    let endian = if file.is_little_endian() {
        RunTimeEndian::Little
    } else {
        RunTimeEndian::Big
    };
    let dwarf = load_dwarf(file, endian)?;
    let mut units = Vec::new();
    let mut exported = HashSet::new();
    let mut headers = dwarf.units();
    while let Some(header) = headers.next()? {
        let unit = dwarf.unit(header)?;
        let mut tree = unit.entries_tree(None)?;
        let root = tree.root()?;
        let root_entry = root.entry().clone();

        let mut walker = UnitWalker {
            dwarf: &dwarf,
            unit: &unit,
            elf,
            little_endian: matches!(endian, RunTimeEndian::Little),
            lower_bound: 0,
            nested_names: false,
            scope_names: Vec::new(),
            raw: RawUnit::default(),
            exported: &mut exported,
        };
        walker.raw.name = walker
            .string_attr(&root_entry, gimli::DW_AT_name)?
            .unwrap_or_else(|| format!("<unit {}>", units.len()));
        if let Some(AttributeValue::Language(lang)) = root_entry.attr_value(gimli::DW_AT_language)? {
            walker.raw.language = lang.static_string().map(str::to_string);
            if is_fortran(lang) {
                walker.lower_bound = 1;
            }
            walker.nested_names = is_cplusplus(lang);
        }
        walker.walk_children(root, Scope::Global)?;
        debug!(
            unit = %walker.raw.name,
            types = walker.raw.types.len(),
            symbols = walker.raw.symbols.len(),
            "Walked translation unit"
        );
        units.push(walker.raw);
    }
    Ok(units)
}

fn is_fortran(lang: gimli::DwLang) -> bool {
    matches!(
        lang,
        gimli::DW_LANG_Fortran77
            | gimli::DW_LANG_Fortran90
            | gimli::DW_LANG_Fortran95
            | gimli::DW_LANG_Fortran03
            | gimli::DW_LANG_Fortran08
    )
}

fn is_cplusplus(lang: gimli::DwLang) -> bool {
    matches!(
        lang,
        gimli::DW_LANG_C_plus_plus
            | gimli::DW_LANG_C_plus_plus_03
            | gimli::DW_LANG_C_plus_plus_11
            | gimli::DW_LANG_C_plus_plus_14
    )
}

/// Elements in `lower..=upper`, or `None` when the range is empty or its
/// size does not fit in 64 bits.
fn bound_count(lower: i64, upper: i64) -> Option<u64> {
    if upper < lower {
        return None;
    }
    (upper as i128 - lower as i128)
        .checked_add(1)
        .and_then(|n| u64::try_from(n).ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    /// Namespace or unit level: functions and variables here may be exported.
    Global,
    /// Inside a function or a class body: only types are recorded.
    Local,
}

/// Name, linkage, and type of a definition after following its origin links.
struct Identity {
    linkage_name: Option<String>,
    name: Option<String>,
    external: bool,
    ty: Option<RawTypeId>,
    origin: Option<UnitOffset>,
}

struct UnitWalker<'a> {
    dwarf: &'a Dwarf<Reader>,
    unit: &'a Unit<Reader>,
    elf: &'a ElfFacts,
    little_endian: bool,
    lower_bound: i64,
    /// Records open a name scope for their nested types (C++).
    nested_names: bool,
    /// Enclosing namespace and class names, outermost first.
    scope_names: Vec<String>,
    raw: RawUnit,
    /// Linkage names already emitted by any unit.
    exported: &'a mut HashSet<String>,
}

impl UnitWalker<'_> {
    fn walk_children(
        &mut self,
        node: EntriesTreeNode<'_, '_, '_, Reader>,
        scope: Scope,
    ) -> Result<(), WalkError> {
        let mut children = node.children();
        while let Some(child) = children.next()? {
            self.visit(child, scope)?;
        }
        Ok(())
    }

    fn visit(
        &mut self,
        node: EntriesTreeNode<'_, '_, '_, Reader>,
        scope: Scope,
    ) -> Result<(), WalkError> {
        let entry = node.entry().clone();
        let id = self.id_of(entry.offset());
        match entry.tag() {
            gimli::DW_TAG_base_type => {
                let name = self.string_attr(&entry, gimli::DW_AT_name)?.unwrap_or_default();
                let size = udata(&entry, gimli::DW_AT_byte_size)?.unwrap_or(0);
                self.raw.types.insert(id, RawType::Base { name, size });
            }
            gimli::DW_TAG_unspecified_type => {
                let name = self
                    .string_attr(&entry, gimli::DW_AT_name)?
                    .unwrap_or_else(|| "void".to_string());
                self.raw.types.insert(id, RawType::Unspecified { name });
            }
            gimli::DW_TAG_pointer_type | gimli::DW_TAG_ptr_to_member_type => {
                let target = self.type_ref(&entry)?;
                self.raw.types.insert(id, RawType::Pointer { target });
            }
            gimli::DW_TAG_reference_type | gimli::DW_TAG_rvalue_reference_type => {
                let ty = match self.type_ref(&entry)? {
                    Some(target) => RawType::Reference { target },
                    None => RawType::Pointer { target: None },
                };
                self.raw.types.insert(id, ty);
            }
            gimli::DW_TAG_const_type => {
                let target = self.type_ref(&entry)?;
                self.raw.types.insert(id, RawType::Const { target });
            }
            gimli::DW_TAG_volatile_type => {
                let target = self.type_ref(&entry)?;
                self.raw.types.insert(id, RawType::Volatile { target });
            }
            gimli::DW_TAG_restrict_type => {
                let target = self.type_ref(&entry)?;
                self.raw.types.insert(id, RawType::Restrict { target });
            }
            gimli::DW_TAG_typedef
            | gimli::DW_TAG_atomic_type
            | gimli::DW_TAG_immutable_type
            | gimli::DW_TAG_packed_type => {
                let name = self.string_attr(&entry, gimli::DW_AT_name)?.unwrap_or_default();
                let target = self.type_ref(&entry)?;
                self.raw.types.insert(id, RawType::Typedef { name, target });
            }
            gimli::DW_TAG_array_type => return self.record_array(id, &entry, node),
            gimli::DW_TAG_structure_type => {
                return self.record_aggregate(id, RecordKind::Struct, &entry, node)
            }
            gimli::DW_TAG_class_type => {
                return self.record_aggregate(id, RecordKind::Class, &entry, node)
            }
            gimli::DW_TAG_union_type => {
                return self.record_aggregate(id, RecordKind::Union, &entry, node)
            }
            gimli::DW_TAG_enumeration_type => return self.record_enumeration(id, &entry, node),
            gimli::DW_TAG_subroutine_type => {
                let (params, variadic) = self.parameters(node)?;
                let return_type = self.type_ref(&entry)?;
                self.raw.types.insert(
                    id,
                    RawType::Subroutine {
                        return_type,
                        params,
                        variadic,
                    },
                );
            }
            gimli::DW_TAG_subprogram => return self.record_subprogram(id, &entry, node, scope),
            gimli::DW_TAG_variable => {
                if scope == Scope::Global {
                    self.record_variable(&entry)?;
                }
            }
            gimli::DW_TAG_namespace => {
                let name = self
                    .string_attr(&entry, gimli::DW_AT_name)?
                    .unwrap_or_else(|| "(anonymous namespace)".to_string());
                self.scope_names.push(name);
                let walked = self.walk_children(node, scope);
                self.scope_names.pop();
                return walked;
            }
            gimli::DW_TAG_module => return self.walk_children(node, scope),
            _ => return self.walk_children(node, Scope::Local),
        }
        Ok(())
    }

    fn record_array(
        &mut self,
        id: RawTypeId,
        entry: &Die<'_, '_>,
        node: EntriesTreeNode<'_, '_, '_, Reader>,
    ) -> Result<(), WalkError> {
        let element = self
            .type_ref(entry)?
            .ok_or_else(|| WalkError::Malformed(format!("array {} has no element type", id.0)))?;

        let mut dims = Vec::new();
        let mut children = node.children();
        while let Some(child) = children.next()? {
            let sub = child.entry().clone();
            if sub.tag() == gimli::DW_TAG_subrange_type {
                dims.push((self.id_of(sub.offset()), self.subrange_count(&sub)?));
            } else {
                self.visit(child, Scope::Local)?;
            }
        }

        if dims.is_empty() {
            self.raw.types.insert(
                id,
                RawType::Array {
                    element,
                    count: None,
                },
            );
            return Ok(());
        }
        // `int a[2][3]` is an array of 2 arrays of 3; inner dimensions borrow
        // their subrange's offset as id.
        let mut inner = element;
        for (index, (sub_id, count)) in dims.iter().enumerate().rev() {
            let this = if index == 0 { id } else { *sub_id };
            self.raw.types.insert(
                this,
                RawType::Array {
                    element: inner,
                    count: *count,
                },
            );
            inner = this;
        }
        Ok(())
    }

    fn subrange_count(&self, entry: &Die<'_, '_>) -> Result<Option<u64>, WalkError> {
        if let Some(count) = udata(entry, gimli::DW_AT_count)? {
            return Ok(Some(count));
        }
        let lower = match entry.attr_value(gimli::DW_AT_lower_bound)? {
            Some(value) => signed(&value).unwrap_or(self.lower_bound),
            None => self.lower_bound,
        };
        let upper = match entry.attr_value(gimli::DW_AT_upper_bound)? {
            Some(AttributeValue::Sdata(v)) => v,
            Some(value) => match value.udata_value() {
                Some(v) if v == u64::MAX || v == u64::from(u32::MAX) => return Ok(None),
                Some(v) => v as i64,
                None => return Ok(None),
            },
            None => return Ok(None),
        };
        Ok(bound_count(lower, upper))
    }

    /// `name` prefixed with the enclosing scopes, `ns::outer::name`.
    fn qualified(&self, name: Option<String>) -> Option<String> {
        let name = name?;
        if self.scope_names.is_empty() {
            return Some(name);
        }
        Some(format!("{}::{}", self.scope_names.join("::"), name))
    }

    fn record_aggregate(
        &mut self,
        id: RawTypeId,
        kind: RecordKind,
        entry: &Die<'_, '_>,
        node: EntriesTreeNode<'_, '_, '_, Reader>,
    ) -> Result<(), WalkError> {
        let local_name = self.string_attr(entry, gimli::DW_AT_name)?;
        let name = self.qualified(local_name.clone());
        let size = udata(entry, gimli::DW_AT_byte_size)?;
        let declaration = flag(entry, gimli::DW_AT_declaration)?;

        let opened = match local_name {
            Some(local) if self.nested_names => {
                self.scope_names.push(local);
                true
            }
            _ => false,
        };
        let members = self.aggregate_members(id, node);
        if opened {
            self.scope_names.pop();
        }
        let members = members?;

        self.raw.types.insert(
            id,
            RawType::Record {
                kind,
                name,
                size: if declaration { None } else { size },
                members,
                declaration,
            },
        );
        Ok(())
    }

    fn aggregate_members(
        &mut self,
        id: RawTypeId,
        node: EntriesTreeNode<'_, '_, '_, Reader>,
    ) -> Result<Vec<RawMember>, WalkError> {
        let mut members = Vec::new();
        let mut bases = 0;
        let mut children = node.children();
        while let Some(child) = children.next()? {
            let member = child.entry().clone();
            match member.tag() {
                gimli::DW_TAG_member => {
                    // Static data members (DWARF 4 style) occupy no storage.
                    if flag(&member, gimli::DW_AT_external)? || flag(&member, gimli::DW_AT_declaration)? {
                        continue;
                    }
                    let ty = self.type_ref(&member)?.ok_or_else(|| {
                        WalkError::Malformed(format!("member of record {} has no type", id.0))
                    })?;
                    members.push(RawMember {
                        name: self.string_attr(&member, gimli::DW_AT_name)?,
                        ty,
                        offset_bits: self.member_offset_bits(&member)?,
                    });
                }
                gimli::DW_TAG_inheritance => {
                    let ty = self.type_ref(&member)?.ok_or_else(|| {
                        WalkError::Malformed(format!("base of record {} has no type", id.0))
                    })?;
                    members.push(RawMember {
                        name: Some(format!("<base {}>", bases)),
                        ty,
                        offset_bits: self.member_offset_bits(&member)?,
                    });
                    bases += 1;
                }
                gimli::DW_TAG_variable => {}
                _ => self.visit(child, Scope::Local)?,
            }
        }
        Ok(members)
    }

    fn member_offset_bits(&self, member: &Die<'_, '_>) -> Result<u64, WalkError> {
        if let Some(bits) = udata(member, gimli::DW_AT_data_bit_offset)? {
            return Ok(bits);
        }
        let bytes = match member.attr_value(gimli::DW_AT_data_member_location)? {
            None => 0,
            Some(AttributeValue::Exprloc(expr)) => {
                let mut reader = expr.0;
                let op = reader.read_u8()?;
                if op != gimli::DW_OP_plus_uconst.0 {
                    return Err(WalkError::Malformed(format!(
                        "unsupported member location opcode {:#x}",
                        op
                    )));
                }
                reader.read_uleb128()?
            }
            Some(value) => value.udata_value().ok_or_else(|| {
                WalkError::Malformed("member location is neither constant nor expression".into())
            })?,
        };
        let mut bits = bytes * 8;
        // DWARF 2/3 bit-fields count from the storage unit's most significant bit.
        if let (Some(bit_offset), Some(bit_size)) = (
            udata(member, gimli::DW_AT_bit_offset)?,
            udata(member, gimli::DW_AT_bit_size)?,
        ) {
            if self.little_endian {
                let storage = udata(member, gimli::DW_AT_byte_size)?.unwrap_or(0) * 8;
                bits += storage.saturating_sub(bit_offset + bit_size);
            } else {
                bits += bit_offset;
            }
        }
        Ok(bits)
    }

    fn record_enumeration(
        &mut self,
        id: RawTypeId,
        entry: &Die<'_, '_>,
        node: EntriesTreeNode<'_, '_, '_, Reader>,
    ) -> Result<(), WalkError> {
        let name = self.qualified(self.string_attr(entry, gimli::DW_AT_name)?);
        let size = udata(entry, gimli::DW_AT_byte_size)?.unwrap_or(4);
        let underlying = self.type_ref(entry)?;

        let mut enumerators = Vec::new();
        let mut children = node.children();
        while let Some(child) = children.next()? {
            let item = child.entry().clone();
            if item.tag() != gimli::DW_TAG_enumerator {
                self.visit(child, Scope::Local)?;
                continue;
            }
            let value = match item.attr_value(gimli::DW_AT_const_value)? {
                Some(AttributeValue::Sdata(v)) => v,
                Some(other) => other.udata_value().map(|v| v as i64).unwrap_or(0),
                None => 0,
            };
            enumerators.push(Enumerator {
                name: self.string_attr(&item, gimli::DW_AT_name)?.unwrap_or_default(),
                value,
            });
        }

        self.raw.types.insert(
            id,
            RawType::Enumeration {
                name,
                size,
                underlying,
                enumerators,
            },
        );
        Ok(())
    }

    /// Parameter types and variadic flag from a function DIE's children.
    fn parameters(
        &mut self,
        node: EntriesTreeNode<'_, '_, '_, Reader>,
    ) -> Result<(Vec<RawTypeId>, bool), WalkError> {
        let mut params = Vec::new();
        let mut variadic = false;
        let mut children = node.children();
        while let Some(child) = children.next()? {
            let param = child.entry().clone();
            match param.tag() {
                gimli::DW_TAG_formal_parameter => {
                    let ty = self.type_ref(&param)?.ok_or_else(|| {
                        WalkError::Malformed("formal parameter has no type".to_string())
                    })?;
                    params.push(ty);
                }
                gimli::DW_TAG_unspecified_parameters => variadic = true,
                _ => self.visit(child, Scope::Local)?,
            }
        }
        Ok((params, variadic))
    }

    fn origin_parameters(&mut self, origin: UnitOffset) -> Result<(Vec<RawTypeId>, bool), WalkError> {
        let unit = self.unit;
        let mut tree = unit.entries_tree(Some(origin))?;
        let root = tree.root()?;
        self.parameters(root)
    }

    fn record_subprogram(
        &mut self,
        id: RawTypeId,
        entry: &Die<'_, '_>,
        node: EntriesTreeNode<'_, '_, '_, Reader>,
        scope: Scope,
    ) -> Result<(), WalkError> {
        let (mut params, mut variadic) = self.parameters(node)?;
        if scope == Scope::Local || flag(entry, gimli::DW_AT_declaration)? {
            return Ok(());
        }
        // Abstract inline instances carry no code; their out-of-line copies do.
        let has_code = entry.attr_value(gimli::DW_AT_low_pc)?.is_some()
            || entry.attr_value(gimli::DW_AT_ranges)?.is_some();
        if !has_code {
            return Ok(());
        }

        let identity = self.identity(entry)?;
        let Some((linkage_name, symbol)) = self.exported_as(&identity) else {
            return Ok(());
        };
        if params.is_empty() && !variadic {
            if let Some(origin) = identity.origin {
                (params, variadic) = self.origin_parameters(origin)?;
            }
        }

        self.raw.types.insert(
            id,
            RawType::Subroutine {
                return_type: identity.ty,
                params,
                variadic,
            },
        );
        self.raw.symbols.push(RawSymbol {
            linkage_name,
            name: identity.name,
            kind: DeclarationKind::Function,
            type_id: id,
            symbol,
        });
        Ok(())
    }

    fn record_variable(&mut self, entry: &Die<'_, '_>) -> Result<(), WalkError> {
        if entry.attr_value(gimli::DW_AT_location)?.is_none() {
            return Ok(());
        }
        let identity = self.identity(entry)?;
        let Some(ty) = identity.ty else {
            return Err(WalkError::Malformed(format!(
                "variable `{}` has no type",
                identity.linkage_name.as_deref().unwrap_or("?")
            )));
        };
        let Some((linkage_name, symbol)) = self.exported_as(&identity) else {
            return Ok(());
        };
        self.raw.symbols.push(RawSymbol {
            linkage_name,
            name: identity.name,
            kind: DeclarationKind::Variable,
            type_id: ty,
            symbol,
        });
        Ok(())
    }

    /// Decide whether a definition is exported, claiming its linkage name.
    fn exported_as(&mut self, identity: &Identity) -> Option<(String, SymbolInfo)> {
        let linkage_name = identity.linkage_name.as_ref()?;
        let symbol = if self.elf.has_symbol_table {
            self.elf.export(linkage_name)?.clone()
        } else if identity.external {
            SymbolInfo::default()
        } else {
            return None;
        };
        if !self.exported.insert(linkage_name.clone()) {
            return None;
        }
        Some((linkage_name.clone(), symbol))
    }

    /// Collect identity attributes, filling gaps from specification and
    /// abstract-origin DIEs.
    fn identity(&self, entry: &Die<'_, '_>) -> Result<Identity, WalkError> {
        let mut identity = Identity {
            linkage_name: self.linkage_attr(entry)?,
            name: self.string_attr(entry, gimli::DW_AT_name)?,
            external: flag(entry, gimli::DW_AT_external)?,
            ty: self.type_ref(entry)?,
            origin: None,
        };

        let mut current = entry.clone();
        for _ in 0..MAX_ORIGIN_HOPS {
            let link = match current.attr_value(gimli::DW_AT_specification)? {
                Some(v) => Some(v),
                None => current.attr_value(gimli::DW_AT_abstract_origin)?,
            };
            let Some(AttributeValue::UnitRef(offset)) = link else {
                break;
            };
            let origin = self.unit.entry(offset)?;
            identity.origin.get_or_insert(offset);
            if identity.linkage_name.is_none() {
                identity.linkage_name = self.linkage_attr(&origin)?;
            }
            if identity.name.is_none() {
                identity.name = self.string_attr(&origin, gimli::DW_AT_name)?;
            }
            if identity.ty.is_none() {
                identity.ty = self.type_ref(&origin)?;
            }
            identity.external |= flag(&origin, gimli::DW_AT_external)?;
            current = origin;
        }

        // C symbols have no separate linkage name.
        if identity.linkage_name.is_none() {
            identity.linkage_name = identity.name.clone();
        }
        Ok(identity)
    }

    fn linkage_attr(&self, entry: &Die<'_, '_>) -> Result<Option<String>, WalkError> {
        match self.string_attr(entry, gimli::DW_AT_linkage_name)? {
            Some(name) => Ok(Some(name)),
            None => self.string_attr(entry, gimli::DW_AT_MIPS_linkage_name),
        }
    }

    fn id_of(&self, offset: UnitOffset) -> RawTypeId {
        match offset.to_debug_info_offset(&self.unit.header) {
            Some(global) => RawTypeId(global.0 as u64),
            None => RawTypeId(offset.0 as u64),
        }
    }

    fn type_ref(&self, entry: &Die<'_, '_>) -> Result<Option<RawTypeId>, WalkError> {
        match entry.attr_value(gimli::DW_AT_type)? {
            None => Ok(None),
            Some(AttributeValue::UnitRef(offset)) => Ok(Some(self.id_of(offset))),
            Some(AttributeValue::DebugInfoRef(offset)) => Ok(Some(RawTypeId(offset.0 as u64))),
            Some(other) => Err(WalkError::Malformed(format!(
                "unsupported type reference form {:?}",
                other
            ))),
        }
    }

    fn string_attr(
        &self,
        entry: &Die<'_, '_>,
        name: gimli::DwAt,
    ) -> Result<Option<String>, WalkError> {
        match entry.attr_value(name)? {
            Some(value) => {
                let s = self.dwarf.attr_string(self.unit, value)?;
                Ok(Some(s.to_string_lossy()?.into_owned()))
            }
            None => Ok(None),
        }
    }
}

fn udata(entry: &Die<'_, '_>, name: gimli::DwAt) -> Result<Option<u64>, WalkError> {
    Ok(entry.attr_value(name)?.and_then(|v| v.udata_value()))
}

fn flag(entry: &Die<'_, '_>, name: gimli::DwAt) -> Result<bool, WalkError> {
    Ok(matches!(entry.attr_value(name)?, Some(AttributeValue::Flag(true))))
}

fn signed(value: &AttributeValue<Reader>) -> Option<i64> {
    match value {
        AttributeValue::Sdata(v) => Some(*v),
        other => other.udata_value().map(|v| v as i64),
    }
}

/// Open `path` as a DWARF fact source with default limits.
pub fn open(path: impl Into<PathBuf>) -> Result<DwarfFactSource, ExtractionError> {
    DwarfFactSource::open(path.into(), &IOLimits::default())
}
