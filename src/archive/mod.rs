//! Corpus serializer.
//!
//! `write` assigns every interned type a local integer id and emits a
//! versioned JSON archive; `read` checks the version before touching the
//! body, verifies the checksum, and re-interns every type into a fresh
//! `Environment`. Reading back a written corpus yields a structurally equal
//! corpus even though its handles may differ.

pub mod format;

use crate::corpus::{Corpus, Declaration, UnitId};
use crate::error::SerializationError;
use crate::ir::{Environment, Field, Qualifiers, Type, TypeRef};
use format::{Body, DeclarationRecord, Envelope, FieldRecord, Header, TypeRecord, TypeShape};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use format::{FORMAT_TAG, FORMAT_VERSION};

/// Default upper bound on archive size accepted by `read_from_path`.
pub const DEFAULT_MAX_ARCHIVE_SIZE: u64 = 256 * 1024 * 1024;

/// Nesting bound while restoring types; deeper graphs are rejected as corrupt.
const MAX_RESTORE_DEPTH: usize = 1024;

const STREAM_ORIGIN: &str = "<stream>";

/// Serialize `corpus` into `sink`.
pub fn write<W: Write>(corpus: &Corpus, sink: W) -> Result<(), SerializationError> {
    write_to(corpus, sink, Path::new(STREAM_ORIGIN))
}

/// Serialize `corpus` into a new file at `path`.
pub fn write_to_path<P: AsRef<Path>>(corpus: &Corpus, path: P) -> Result<(), SerializationError> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|source| SerializationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_to(corpus, BufWriter::new(file), path)?;
    info!(
        path = %path.display(),
        declarations = corpus.declarations().len(),
        "Wrote corpus archive"
    );
    Ok(())
}

fn write_to<W: Write>(corpus: &Corpus, mut sink: W, origin: &Path) -> Result<(), SerializationError> {
    let body = to_body(corpus, origin)?;
    let checksum = body
        .checksum()
        .map_err(|e| SerializationError::corrupt(origin, e.to_string()))?;
    let envelope = Envelope {
        format: FORMAT_TAG,
        version: FORMAT_VERSION,
        checksum,
        body: &body,
    };
    serde_json::to_writer_pretty(&mut sink, &envelope).map_err(|e| io_or_corrupt(origin, e))?;
    sink.write_all(b"\n")
        .and_then(|_| sink.flush())
        .map_err(|source| SerializationError::Io {
            path: origin.to_path_buf(),
            source,
        })
}

fn io_or_corrupt(origin: &Path, e: serde_json::Error) -> SerializationError {
    if e.is_io() {
        SerializationError::Io {
            path: origin.to_path_buf(),
            source: e.into(),
        }
    } else {
        SerializationError::corrupt(origin, e.to_string())
    }
}

fn to_body(corpus: &Corpus, origin: &Path) -> Result<Body, SerializationError> {
    let env = corpus.environment();
    let snapshot = env.types();
    let ids: HashMap<TypeRef, u32> = snapshot
        .iter()
        .enumerate()
        .map(|(i, (handle, _))| (*handle, i as u32))
        .collect();
    let id_of = |handle: TypeRef| {
        ids.get(&handle).copied().ok_or_else(|| {
            SerializationError::corrupt(
                origin,
                format!("corpus references undefined type {}", handle),
            )
        })
    };

    let mut types = Vec::with_capacity(snapshot.len());
    for (handle, ty) in &snapshot {
        let shape = match ty.as_ref() {
            Type::Fundamental { name, size } => TypeShape::Fundamental {
                name: name.clone(),
                size: *size,
            },
            Type::Qualified { base, qualifiers } => TypeShape::Qualified {
                base: id_of(*base)?,
                qualifiers: qualifiers.keywords().into_iter().map(str::to_string).collect(),
            },
            Type::Pointer { pointee } => TypeShape::Pointer {
                pointee: id_of(*pointee)?,
            },
            Type::Array { element, bound } => TypeShape::Array {
                element: id_of(*element)?,
                bound: *bound,
            },
            Type::Record {
                kind,
                name,
                size,
                fields,
                declaration_only,
            } => TypeShape::Record {
                record_kind: *kind,
                name: name.clone(),
                size: *size,
                fields: fields
                    .iter()
                    .map(|f| {
                        Ok(FieldRecord {
                            name: f.name.clone(),
                            ty: id_of(f.ty)?,
                            offset_bits: f.offset_bits,
                        })
                    })
                    .collect::<Result<_, SerializationError>>()?,
                declaration_only: *declaration_only,
            },
            Type::Enum {
                name,
                underlying,
                enumerators,
            } => TypeShape::Enum {
                name: name.clone(),
                underlying: id_of(*underlying)?,
                enumerators: enumerators.clone(),
            },
            Type::FunctionType {
                return_type,
                params,
                variadic,
            } => TypeShape::Function {
                return_type: id_of(*return_type)?,
                params: params.iter().map(|p| id_of(*p)).collect::<Result<_, _>>()?,
                variadic: *variadic,
            },
        };
        types.push(TypeRecord {
            id: id_of(*handle)?,
            shape,
        });
    }

    let declarations = corpus
        .declarations()
        .values()
        .map(|d| {
            Ok(DeclarationRecord {
                linkage_name: d.linkage_name.clone(),
                name: d.name.clone(),
                kind: d.kind,
                ty: id_of(d.ty)?,
                unit: d.defined_in.0,
                symbol: d.symbol.clone(),
            })
        })
        .collect::<Result<_, SerializationError>>()?;

    Ok(Body {
        corpus: corpus.metadata.clone(),
        translation_units: corpus.translation_units().to_vec(),
        types,
        declarations,
    })
}

/// Deserialize a corpus from `source`.
pub fn read<R: Read>(source: R) -> Result<Corpus, SerializationError> {
    read_from(source, Path::new(STREAM_ORIGIN))
}

/// Deserialize a corpus from `source`, naming `origin` in errors.
pub fn read_from<R: Read>(mut source: R, origin: &Path) -> Result<Corpus, SerializationError> {
    let mut bytes = Vec::new();
    source
        .read_to_end(&mut bytes)
        .map_err(|source| SerializationError::Io {
            path: origin.to_path_buf(),
            source,
        })?;
    from_slice(&bytes, origin)
}

/// Read the archive at `path`, refusing files above the default size bound.
pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Corpus, SerializationError> {
    read_from_path_with_limit(path, DEFAULT_MAX_ARCHIVE_SIZE)
}

pub fn read_from_path_with_limit<P: AsRef<Path>>(
    path: P,
    max_size: u64,
) -> Result<Corpus, SerializationError> {
    let path = path.as_ref();
    let io_err = |source| SerializationError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let size = file.metadata().map_err(io_err)?.len();
    if size > max_size {
        warn!(path = %path.display(), size, limit = max_size, "Archive is too large");
        return Err(SerializationError::corrupt(
            path,
            format!("archive is {} bytes, limit is {}", size, max_size),
        ));
    }
    let corpus = read_from(BufReader::new(file), path)?;
    info!(
        path = %path.display(),
        declarations = corpus.declarations().len(),
        types = corpus.environment().len(),
        "Read corpus archive"
    );
    Ok(corpus)
}

fn from_slice(bytes: &[u8], origin: &Path) -> Result<Corpus, SerializationError> {
    let mut document: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| SerializationError::corrupt(origin, format!("invalid JSON: {}", e)))?;

    let header: Header = serde_json::from_value(document.clone())
        .map_err(|e| SerializationError::corrupt(origin, format!("invalid header: {}", e)))?;
    if header.format.as_deref() != Some(FORMAT_TAG) {
        return Err(SerializationError::corrupt(
            origin,
            format!("not an {} archive", FORMAT_TAG),
        ));
    }
    match header.version {
        None => return Err(SerializationError::corrupt(origin, "missing version tag")),
        Some(FORMAT_VERSION) => {}
        Some(found) => {
            return Err(SerializationError::UnsupportedVersion {
                path: origin.to_path_buf(),
                found,
                supported: FORMAT_VERSION,
            })
        }
    }

    let checksum = document
        .get("checksum")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| SerializationError::corrupt(origin, "missing checksum"))?;
    let body_value = document
        .get_mut("body")
        .map(serde_json::Value::take)
        .ok_or_else(|| SerializationError::corrupt(origin, "missing body"))?;
    let body: Body = serde_json::from_value(body_value)
        .map_err(|e| SerializationError::corrupt(origin, format!("invalid body: {}", e)))?;
    let actual = body
        .checksum()
        .map_err(|e| SerializationError::corrupt(origin, e.to_string()))?;
    if !actual.eq_ignore_ascii_case(&checksum) {
        return Err(SerializationError::corrupt(
            origin,
            format!("checksum mismatch: recorded {}, computed {}", checksum, actual),
        ));
    }

    from_body(body, origin)
}

fn from_body(body: Body, origin: &Path) -> Result<Corpus, SerializationError> {
    let mut shapes = HashMap::with_capacity(body.types.len());
    for record in &body.types {
        if shapes.insert(record.id, &record.shape).is_some() {
            return Err(SerializationError::corrupt(
                origin,
                format!("duplicate type id {}", record.id),
            ));
        }
    }

    let environment = Arc::new(Environment::new());
    let mut restorer = Restorer {
        origin,
        env: &environment,
        shapes,
        memo: HashMap::new(),
        in_progress: HashMap::new(),
        open_records: 0,
    };
    for record in &body.types {
        restorer.restore(record.id, 0)?;
    }

    let mut declarations = BTreeMap::new();
    for record in &body.declarations {
        if record.unit >= body.translation_units.len() {
            return Err(SerializationError::corrupt(
                origin,
                format!(
                    "declaration `{}` names unit {} of {}",
                    record.linkage_name,
                    record.unit,
                    body.translation_units.len()
                ),
            ));
        }
        let ty = restorer.restore(record.ty, 0)?;
        let decl = Declaration {
            linkage_name: record.linkage_name.clone(),
            name: record.name.clone(),
            kind: record.kind,
            ty,
            defined_in: UnitId(record.unit),
            symbol: record.symbol.clone(),
        };
        if declarations.insert(record.linkage_name.clone(), decl).is_some() {
            return Err(SerializationError::corrupt(
                origin,
                format!("duplicate declaration `{}`", record.linkage_name),
            ));
        }
    }
    drop(restorer);
    environment.seal();

    debug!(
        origin = %origin.display(),
        types = environment.len(),
        declarations = declarations.len(),
        "Restored corpus"
    );
    Ok(Corpus::from_parts(
        body.corpus,
        environment,
        body.translation_units,
        declarations,
    ))
}

/// Re-interns archive types, following ids depth-first.
struct Restorer<'a> {
    origin: &'a Path,
    env: &'a Environment,
    shapes: HashMap<u32, &'a TypeShape>,
    memo: HashMap<u32, TypeRef>,
    /// Ids being restored, with the `open_records` count at their first visit.
    in_progress: HashMap<u32, usize>,
    /// Named records whose fields are being restored right now.
    open_records: usize,
}

impl Restorer<'_> {
    fn corrupt(&self, reason: String) -> SerializationError {
        SerializationError::corrupt(self.origin, reason)
    }

    fn restore(&mut self, id: u32, depth: usize) -> Result<TypeRef, SerializationError> {
        if let Some(handle) = self.memo.get(&id) {
            return Ok(*handle);
        }
        if depth > MAX_RESTORE_DEPTH {
            return Err(self.corrupt(format!("type {} is nested too deeply", id)));
        }
        let shape = *self
            .shapes
            .get(&id)
            .ok_or_else(|| self.corrupt(format!("dangling type id {}", id)))?;
        // Revisiting an id is only a cycle when no named record lies between.
        let outer = match self.in_progress.insert(id, self.open_records) {
            Some(open) if open == self.open_records => {
                return Err(self.corrupt(format!("type {} is its own component", id)));
            }
            outer => outer,
        };
        let next = depth + 1;

        let handle = match shape {
            TypeShape::Fundamental { name, size } => self.env.fundamental(name, *size),
            TypeShape::Qualified { base, qualifiers } => {
                let mut set = Qualifiers::empty();
                for word in qualifiers {
                    set |= Qualifiers::from_keyword(word)
                        .ok_or_else(|| self.corrupt(format!("unknown qualifier `{}`", word)))?;
                }
                let base = self.restore(*base, next)?;
                self.env.qualified(base, set)
            }
            TypeShape::Pointer { pointee } => {
                let pointee = self.restore(*pointee, next)?;
                self.env.pointer_to(pointee)
            }
            TypeShape::Array { element, bound } => {
                let element = self.restore(*element, next)?;
                self.env.array_of(element, *bound)
            }
            TypeShape::Record {
                record_kind,
                name: Some(name),
                size,
                fields,
                declaration_only,
            } => {
                // Each archive record keeps its own slot; one tag may carry
                // several distinct bodies.
                let handle = if *declaration_only {
                    self.env.reserve_record(*record_kind, name).handle()
                } else {
                    self.env.fresh_record(*record_kind, name)
                };
                self.memo.insert(id, handle);
                if !*declaration_only {
                    self.open_records += 1;
                    let fields = self.restore_fields(fields, next);
                    self.open_records -= 1;
                    let body = Type::Record {
                        kind: *record_kind,
                        name: Some(name.clone()),
                        size: *size,
                        fields: fields?,
                        declaration_only: false,
                    };
                    self.env
                        .define(handle, body)
                        .map_err(|e| self.corrupt(e.to_string()))?;
                }
                handle
            }
            TypeShape::Record {
                record_kind,
                name: None,
                size,
                fields,
                declaration_only,
            } => {
                let fields = self.restore_fields(fields, next)?;
                self.env.intern(Type::Record {
                    kind: *record_kind,
                    name: None,
                    size: *size,
                    fields,
                    declaration_only: *declaration_only,
                })
            }
            TypeShape::Enum {
                name,
                underlying,
                enumerators,
            } => {
                let underlying = self.restore(*underlying, next)?;
                self.env.intern(Type::Enum {
                    name: name.clone(),
                    underlying,
                    enumerators: enumerators.clone(),
                })
            }
            TypeShape::Function {
                return_type,
                params,
                variadic,
            } => {
                let return_type = self.restore(*return_type, next)?;
                let mut restored = Vec::with_capacity(params.len());
                for p in params {
                    restored.push(self.restore(*p, next)?);
                }
                self.env.intern(Type::FunctionType {
                    return_type,
                    params: restored,
                    variadic: *variadic,
                })
            }
        };

        match outer {
            Some(open) => self.in_progress.insert(id, open),
            None => self.in_progress.remove(&id),
        };
        self.memo.insert(id, handle);
        Ok(handle)
    }

    fn restore_fields(
        &mut self,
        fields: &[FieldRecord],
        depth: usize,
    ) -> Result<Vec<Field>, SerializationError> {
        let mut out = Vec::with_capacity(fields.len());
        for f in fields {
            out.push(Field {
                name: f.name.clone(),
                ty: self.restore(f.ty, depth)?,
                offset_bits: f.offset_bits,
            });
        }
        Ok(out)
    }
}

/// Archive path conventionally paired with a binary: `<binary>.abi.json`.
pub fn default_archive_path(binary: &Path) -> PathBuf {
    let mut name = binary.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".abi.json");
    binary.with_file_name(name)
}
