//! Per-dex derived state. Everything here is built at most once per
//! session behind a `OnceCell` and is read-only afterwards; concurrent
//! first-use requests collapse to a single build.

use std::collections::HashMap;

use log::debug;
use once_cell::sync::OnceCell;

use crate::file::{DexContainer, DexFile, InvokeKind};
use crate::walker;
use crate::Result;

/// Declared method: where it lives and whether it has code.
#[derive(Debug, Clone, Copy)]
pub struct MethodDef {
    pub class_def_idx: u32,
    pub access_flags: u32,
    pub code_off: u32,
    pub is_direct: bool,
}

/// Declared field.
#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub class_def_idx: u32,
    pub access_flags: u32,
    pub is_static: bool,
}

/// Member tables out of every class_data_item, indexed by dex-local
/// method/field id. Ids referring to classes outside this dex stay `None`.
#[derive(Debug, Default)]
pub struct MemberIndex {
    pub methods: Vec<Option<MethodDef>>,
    pub fields: Vec<Option<FieldDef>>,
    pub class_methods: Vec<Vec<u32>>,
    pub class_fields: Vec<Vec<u32>>,
}

/// Reverse indexes derived from one walk over every method body.
#[derive(Debug, Default)]
pub struct CodeIndex {
    /// method -> string ids used, source order, de-duplicated
    pub method_strings: Vec<Vec<u32>>,
    /// method -> static invoke targets, source order
    pub method_invokes: Vec<Vec<(InvokeKind, u32)>>,
    /// method -> fields read / written, source order
    pub method_field_reads: Vec<Vec<u32>>,
    pub method_field_writes: Vec<Vec<u32>>,

    /// string id -> methods using it, ascending
    pub string_methods: HashMap<u32, Vec<u32>>,
    /// callee -> callers, ascending
    pub method_callers: HashMap<u32, Vec<u32>>,
    /// field -> readers / writers, ascending
    pub field_readers: HashMap<u32, Vec<u32>>,
    pub field_writers: HashMap<u32, Vec<u32>>,
}

/// Lazily built caches for one dex image.
#[derive(Default)]
pub struct DexCache {
    strings: OnceCell<Vec<String>>,
    members: OnceCell<MemberIndex>,
    code: OnceCell<CodeIndex>,
    class_map: OnceCell<HashMap<String, u32>>,
}

impl DexCache {
    /// Decoded string pool, indexed by string id.
    pub fn strings<'a, C: DexContainer<'a>>(&self, dex: &DexFile<'a, C>) -> Result<&[String]> {
        self.strings
            .get_or_try_init(|| {
                let mut pool = Vec::with_capacity(dex.num_string_ids() as usize);
                for idx in 0..dex.num_string_ids() {
                    pool.push(dex.get_utf16_str_lossy_at(idx)?);
                }
                debug!("{}: decoded {} strings", dex.get_location(), pool.len());
                Ok(pool)
            })
            .map(|v| v.as_slice())
    }

    pub fn members<'a, C: DexContainer<'a>>(&self, dex: &DexFile<'a, C>) -> Result<&MemberIndex> {
        self.members.get_or_try_init(|| {
            let mut index = MemberIndex {
                methods: vec![None; dex.num_method_ids() as usize],
                fields: vec![None; dex.num_field_ids() as usize],
                class_methods: vec![Vec::new(); dex.num_class_defs() as usize],
                class_fields: vec![Vec::new(); dex.num_class_defs() as usize],
            };
            for (class_def_idx, class_def) in dex.get_class_defs().iter().enumerate() {
                let members = match dex.get_class_members(class_def.class_data_off)? {
                    Some(members) => members,
                    None => continue,
                };
                for field in &members.fields {
                    if let Some(slot) = index.fields.get_mut(field.field_idx as usize) {
                        *slot = Some(FieldDef {
                            class_def_idx: class_def_idx as u32,
                            access_flags: field.access_flags,
                            is_static: field.is_static,
                        });
                        index.class_fields[class_def_idx].push(field.field_idx);
                    }
                }
                for method in &members.methods {
                    if let Some(slot) = index.methods.get_mut(method.method_idx as usize) {
                        *slot = Some(MethodDef {
                            class_def_idx: class_def_idx as u32,
                            access_flags: method.access_flags,
                            code_off: method.code_off,
                            is_direct: method.is_direct,
                        });
                        index.class_methods[class_def_idx].push(method.method_idx);
                    }
                }
            }
            Ok(index)
        })
    }

    /// Code-derived reverse indexes; builds the member index first. One
    /// walk over every method body populates all tables atomically.
    pub fn code<'a, C: DexContainer<'a>>(&self, dex: &DexFile<'a, C>) -> Result<&CodeIndex> {
        let members = self.members(dex)?;
        self.code.get_or_try_init(|| {
            let num_methods = dex.num_method_ids() as usize;
            let mut index = CodeIndex {
                method_strings: vec![Vec::new(); num_methods],
                method_invokes: vec![Vec::new(); num_methods],
                method_field_reads: vec![Vec::new(); num_methods],
                method_field_writes: vec![Vec::new(); num_methods],
                ..CodeIndex::default()
            };

            for (method_idx, def) in members.methods.iter().enumerate() {
                let code_off = match def {
                    Some(def) if def.code_off != 0 => def.code_off,
                    _ => continue,
                };
                let accessor = dex.get_code_item_accessor(code_off)?;
                let refs = walker::collect_refs(&accessor)?;
                let method_idx = method_idx as u32;

                for &string_idx in &refs.strings {
                    index
                        .string_methods
                        .entry(string_idx)
                        .or_default()
                        .push(method_idx);
                }
                for &(_, callee) in &refs.invokes {
                    let callers = index.method_callers.entry(callee).or_default();
                    if callers.last() != Some(&method_idx) {
                        callers.push(method_idx);
                    }
                }
                for &field_idx in &refs.field_reads {
                    let readers = index.field_readers.entry(field_idx).or_default();
                    if readers.last() != Some(&method_idx) {
                        readers.push(method_idx);
                    }
                }
                for &field_idx in &refs.field_writes {
                    let writers = index.field_writers.entry(field_idx).or_default();
                    if writers.last() != Some(&method_idx) {
                        writers.push(method_idx);
                    }
                }

                index.method_strings[method_idx as usize] = refs.strings;
                index.method_invokes[method_idx as usize] = refs.invokes;
                index.method_field_reads[method_idx as usize] = refs.field_reads;
                index.method_field_writes[method_idx as usize] = refs.field_writes;
            }
            debug!(
                "{}: code index over {} strings, {} call targets",
                dex.get_location(),
                index.string_methods.len(),
                index.method_callers.len()
            );
            Ok(index)
        })
    }

    /// Type descriptor -> class def index.
    pub fn class_map<'a, C: DexContainer<'a>>(
        &self,
        dex: &DexFile<'a, C>,
    ) -> Result<&HashMap<String, u32>> {
        self.class_map.get_or_try_init(|| {
            let mut map = HashMap::with_capacity(dex.num_class_defs() as usize);
            for (idx, class_def) in dex.get_class_defs().iter().enumerate() {
                map.insert(dex.get_class_desc(class_def)?, idx as u32);
            }
            Ok(map)
        })
    }

    /// Eagerly builds every index.
    pub fn warm<'a, C: DexContainer<'a>>(&self, dex: &DexFile<'a, C>) -> Result<()> {
        self.strings(dex)?;
        self.members(dex)?;
        self.code(dex)?;
        self.class_map(dex)?;
        Ok(())
    }
}
