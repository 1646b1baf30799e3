//! Corpus builder: lowers raw facts into canonical types and declarations.
//!
//! Units are lowered in parallel against one shared `Environment`. Only
//! types reachable from an exported declaration are interned. Raw ids are
//! resolved against the unit first and then against every unit, so a
//! reference into another unit (`DW_FORM_ref_addr`) still resolves.
//!
//! Named records are keyed by their body's structural digest, so one tag
//! with two different bodies yields two records. A forward declaration
//! stands for the tag's body when exactly one body exists anywhere in the
//! binary, and stays opaque otherwise.

mod shape;

use crate::config::ExtractionConfig;
use crate::corpus::{Corpus, Declaration, DeclarationKind, TranslationUnit, UnitId};
use crate::error::ExtractionError;
use crate::facts::{FactSource, RawMember, RawType, RawTypeId, RawUnit};
use crate::ir::{Environment, Field, Qualifiers, Type, TypeRef};
use rayon::prelude::*;
use shape::RecordVariants;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds a `Corpus` from any `FactSource`.
#[derive(Debug, Clone, Default)]
pub struct CorpusBuilder {
    config: ExtractionConfig,
}

impl CorpusBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// Extract the corpus. No partial corpus is ever returned.
    pub fn build(&self, source: &dyn FactSource) -> Result<Corpus, ExtractionError> {
        let origin = source.origin();
        if !source.has_debug_info() {
            return Err(ExtractionError::NoDebugInfo {
                path: origin.to_path_buf(),
            });
        }

        let mut metadata = source.metadata()?;
        metadata.path = Some(origin.to_path_buf());
        let units = source.translation_units()?;
        info!(path = %origin.display(), units = units.len(), "Building corpus");

        let global: HashMap<RawTypeId, &RawType> = units
            .iter()
            .flat_map(|u| u.types.iter().map(|(id, ty)| (*id, ty)))
            .collect();
        let variants = RecordVariants::collect(&units, &global, self.config.parallel);
        let environment = Arc::new(Environment::new());

        let lower = |(index, unit): (usize, &RawUnit)| {
            UnitLowering::new(&environment, &global, &variants, origin, unit).run(UnitId(index))
        };
        let lowered: Vec<Vec<Declaration>> = if self.config.parallel {
            units
                .par_iter()
                .enumerate()
                .map(lower)
                .collect::<Result<_, _>>()?
        } else {
            units
                .iter()
                .enumerate()
                .map(lower)
                .collect::<Result<_, _>>()?
        };

        let sealed = environment.seal();
        if sealed > 0 {
            debug!(records = sealed, "Records without a body sealed as declaration-only");
        }

        // Lowest unit index wins for symbols emitted by several units.
        let mut declarations = BTreeMap::new();
        for decl in lowered.into_iter().flatten() {
            if let Some(existing) = declarations.get(&decl.linkage_name) {
                let existing: &Declaration = existing;
                debug!(
                    symbol = %decl.linkage_name,
                    kept = existing.defined_in.0,
                    dropped = decl.defined_in.0,
                    "Duplicate declaration across units"
                );
                continue;
            }
            declarations.insert(decl.linkage_name.clone(), decl);
        }

        let translation_units = units
            .iter()
            .map(|u| TranslationUnit {
                name: u.name.clone(),
                language: u.language.clone(),
            })
            .collect();
        let corpus = Corpus::from_parts(metadata, environment, translation_units, declarations);
        info!(
            path = %origin.display(),
            declarations = corpus.declarations().len(),
            types = corpus.environment().len(),
            "Corpus built"
        );
        Ok(corpus)
    }
}

/// Build a corpus with default settings.
pub fn build(source: &dyn FactSource) -> Result<Corpus, ExtractionError> {
    CorpusBuilder::new().build(source)
}

/// Per-unit lowering state: memo of raw id to canonical handle plus the ids
/// currently being lowered, which detects cycles not broken by a named record.
struct UnitLowering<'a> {
    env: &'a Environment,
    global: &'a HashMap<RawTypeId, &'a RawType>,
    variants: &'a RecordVariants,
    origin: &'a Path,
    unit: &'a RawUnit,
    memo: HashMap<RawTypeId, TypeRef>,
    /// Ids being lowered, with the `open_records` count at their first visit.
    in_progress: HashMap<RawTypeId, usize>,
    /// Named records whose members are being lowered right now.
    open_records: usize,
}

impl<'a> UnitLowering<'a> {
    fn new(
        env: &'a Environment,
        global: &'a HashMap<RawTypeId, &'a RawType>,
        variants: &'a RecordVariants,
        origin: &'a Path,
        unit: &'a RawUnit,
    ) -> Self {
        Self {
            env,
            global,
            variants,
            origin,
            unit,
            memo: HashMap::new(),
            in_progress: HashMap::new(),
            open_records: 0,
        }
    }

    fn run(mut self, unit_id: UnitId) -> Result<Vec<Declaration>, ExtractionError> {
        let unit = self.unit;
        let mut out = Vec::with_capacity(unit.symbols.len());
        for symbol in &unit.symbols {
            let ty = self
                .lower(symbol.type_id)
                .map_err(|e| e.with_symbol(&symbol.linkage_name))?;
            if symbol.kind == DeclarationKind::Function
                && !matches!(self.env.get(ty).as_deref(), Some(Type::FunctionType { .. }))
            {
                return Err(self
                    .malformed(format!("type {} of a function is not a subroutine", symbol.type_id.0))
                    .with_symbol(&symbol.linkage_name));
            }
            out.push(Declaration {
                linkage_name: symbol.linkage_name.clone(),
                name: symbol.name.clone(),
                kind: symbol.kind,
                ty,
                defined_in: unit_id,
                symbol: symbol.symbol.clone(),
            });
        }
        debug!(
            unit = %self.unit.name,
            declarations = out.len(),
            types = self.memo.len(),
            "Lowered translation unit"
        );
        Ok(out)
    }

    fn malformed(&self, reason: String) -> ExtractionError {
        ExtractionError::malformed(self.origin, format!("{}: {}", self.unit.name, reason))
    }

    fn lookup(&self, id: RawTypeId) -> Result<&'a RawType, ExtractionError> {
        if let Some(ty) = self.unit.types.get(&id) {
            return Ok(ty);
        }
        self.global
            .get(&id)
            .copied()
            .ok_or_else(|| self.malformed(format!("reference to nonexistent type id {}", id.0)))
    }

    fn lower_or_void(&mut self, id: Option<RawTypeId>) -> Result<TypeRef, ExtractionError> {
        match id {
            Some(id) => self.lower(id),
            None => Ok(self.env.void()),
        }
    }

    fn qualify(
        &mut self,
        target: Option<RawTypeId>,
        qualifiers: Qualifiers,
    ) -> Result<TypeRef, ExtractionError> {
        let base = self.lower_or_void(target)?;
        Ok(self.env.qualified(base, qualifiers))
    }

    fn lower(&mut self, id: RawTypeId) -> Result<TypeRef, ExtractionError> {
        if let Some(handle) = self.memo.get(&id) {
            return Ok(*handle);
        }
        let raw = self.lookup(id)?;
        // A revisit is only a cycle when no named record was entered since
        // the first visit; otherwise the record's reserved handle breaks it.
        let outer = match self.in_progress.insert(id, self.open_records) {
            Some(depth) if depth == self.open_records => {
                return Err(self.malformed(format!(
                    "type id {} refers to itself without a named record",
                    id.0
                )));
            }
            outer => outer,
        };

        let handle = match raw {
            RawType::Base { name, size } => self.env.fundamental(name, *size),
            RawType::Unspecified { name } => self.env.fundamental(name, 0),
            RawType::Pointer { target } => {
                let pointee = self.lower_or_void(*target)?;
                self.env.pointer_to(pointee)
            }
            RawType::Reference { target } => {
                let pointee = self.lower(*target)?;
                self.env.pointer_to(pointee)
            }
            RawType::Const { target } => self.qualify(*target, Qualifiers::CONST)?,
            RawType::Volatile { target } => self.qualify(*target, Qualifiers::VOLATILE)?,
            RawType::Restrict { target } => self.qualify(*target, Qualifiers::RESTRICT)?,
            RawType::Typedef { target, .. } => self.lower_or_void(*target)?,
            RawType::Array { element, count } => {
                let element = self.lower(*element)?;
                self.env.array_of(element, *count)
            }
            RawType::Record {
                kind,
                name: Some(name),
                declaration: true,
                ..
            } => match self.variants.unique_definition(*kind, name) {
                Some(definition) => self.lower(definition)?,
                None => {
                    if self.variants.variant_count(*kind, name) > 1 {
                        debug!(record = %name, "Declaration matches several bodies; left opaque");
                    }
                    self.env.reserve_record(*kind, name).handle()
                }
            },
            RawType::Record {
                kind,
                name: Some(name),
                size,
                members,
                ..
            } => {
                let variant = self.variants.fingerprint(id);
                let handle = self
                    .env
                    .reserve_record_variant(*kind, name, variant)
                    .handle();
                // Publish the handle before members so self-references resolve.
                self.memo.insert(id, handle);
                if !self.env.is_defined(handle) {
                    self.open_records += 1;
                    let fields = self.lower_fields(members);
                    self.open_records -= 1;
                    let body = Type::Record {
                        kind: *kind,
                        name: Some(name.clone()),
                        size: *size,
                        fields: fields?,
                        declaration_only: false,
                    };
                    if !self
                        .env
                        .define(handle, body)
                        .map_err(|e| self.malformed(e.to_string()))?
                    {
                        debug!(record = %name, "Record body already published by another unit");
                    }
                }
                handle
            }
            RawType::Record {
                kind,
                name: None,
                size,
                members,
                declaration,
            } => {
                let fields = self.lower_fields(members)?;
                self.env.intern(Type::Record {
                    kind: *kind,
                    name: None,
                    size: *size,
                    fields,
                    declaration_only: *declaration,
                })
            }
            RawType::Enumeration {
                name,
                size,
                underlying,
                enumerators,
            } => {
                let underlying = match underlying {
                    Some(u) => self.lower(*u)?,
                    None => {
                        let signed = enumerators.iter().any(|e| e.value < 0);
                        let spelling = if signed { "int" } else { "unsigned int" };
                        self.env.fundamental(spelling, *size)
                    }
                };
                self.env.intern(Type::Enum {
                    name: name.clone(),
                    underlying,
                    enumerators: enumerators.clone(),
                })
            }
            RawType::Subroutine {
                return_type,
                params,
                variadic,
            } => {
                let return_type = self.lower_or_void(*return_type)?;
                let params = params
                    .iter()
                    .map(|p| self.lower(*p))
                    .collect::<Result<Vec<_>, _>>()?;
                self.env.intern(Type::FunctionType {
                    return_type,
                    params,
                    variadic: *variadic,
                })
            }
        };

        match outer {
            Some(depth) => self.in_progress.insert(id, depth),
            None => self.in_progress.remove(&id),
        };
        self.memo.insert(id, handle);
        Ok(handle)
    }

    fn lower_fields(&mut self, members: &[RawMember]) -> Result<Vec<Field>, ExtractionError> {
        let mut fields = Vec::with_capacity(members.len());
        for member in members {
            fields.push(Field {
                name: member.name.clone().unwrap_or_default(),
                ty: self.lower(member.ty)?,
                offset_bits: member.offset_bits,
            });
        }
        Ok(fields)
    }
}
