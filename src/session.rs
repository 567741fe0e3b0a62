//! The analysis session. A `DexKit` owns every loaded image and its
//! derived indexes; encoded ids handed out by one session are meaningless
//! in any other. One query at a time is the supported mode, although the
//! shared state is read-only after index publication.

use std::path::Path;
use std::sync::{Arc, Mutex};

use log::warn;
use once_cell::sync::OnceCell;
use rayon::ThreadPool;

use crate::error::DexKitError;
use crate::file::{
    AnnotationItem, DexContainer, DexFile, EncodedValue, FieldAccess,
};
use crate::index::DexCache;
use crate::loader::{self, DexImage};
use crate::results::{
    self, AnnotationElementMeta, AnnotationMeta, AnnotationValue, ClassMeta, FieldMeta,
    MethodMeta, UsingFieldMeta,
};
use crate::{dex_err, desc_names, EncodedId, EntityKind, Result, NO_INDEX, NO_INDEX16};

/// One loaded image plus its lazily built caches. A unit that fails to
/// parse is marked broken and skipped by scans; id lookups into it fail
/// with `IndexUnavailable`.
pub(crate) struct DexUnit {
    pub image: DexImage,
    pub cache: DexCache,
    broken: OnceCell<String>,
}

impl DexUnit {
    fn new(image: DexImage) -> Self {
        DexUnit {
            image,
            cache: DexCache::default(),
            broken: OnceCell::new(),
        }
    }

    pub fn usable(&self) -> bool {
        self.broken.get().is_none()
    }

    pub fn mark_broken(&self, err: &DexKitError) {
        warn!("{}: marked unusable: {}", self.image.location(), err);
        let _ = self.broken.set(err.to_string());
    }
}

struct PoolState {
    thread_num: Option<usize>,
    pool: Option<Arc<ThreadPool>>,
}

pub struct DexKit {
    pub(crate) units: Vec<DexUnit>,
    pool: Mutex<PoolState>,
}

impl DexKit {
    fn from_images(images: Vec<DexImage>) -> Result<DexKit> {
        if images.len() > u16::MAX as usize {
            return dex_err!(InvalidImage, "too many dex images: {}", images.len());
        }
        Ok(DexKit {
            units: images.into_iter().map(DexUnit::new).collect(),
            pool: Mutex::new(PoolState {
                thread_num: None,
                pool: None,
            }),
        })
    }

    /// Session over every `classes*.dex` entry of a zip archive.
    pub fn from_zip_path<P: AsRef<Path>>(path: P) -> Result<DexKit> {
        DexKit::from_images(loader::load_zip_path(path.as_ref())?)
    }

    /// Session over one standalone `.dex` file.
    pub fn from_dex_path<P: AsRef<Path>>(path: P) -> Result<DexKit> {
        DexKit::from_images(vec![DexImage::map_path(path.as_ref())?])
    }

    /// Session over raw in-memory dex buffers; each is copied into an
    /// owned mapping.
    pub fn from_bytes<B: AsRef<[u8]>>(buffers: &[B]) -> Result<DexKit> {
        DexKit::from_images(loader::load_bytes(buffers)?)
    }

    /// Adds the dex entries of another archive to the session.
    pub fn add_zip_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        for image in loader::load_zip_path(path.as_ref())? {
            self.push_image(image)?;
        }
        Ok(())
    }

    /// Adds one standalone `.dex` file to the session.
    pub fn add_dex_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.push_image(DexImage::map_path(path.as_ref())?)
    }

    /// Adds one raw image to the session.
    pub fn add_image(&mut self, bytes: &[u8]) -> Result<()> {
        let location = format!("[buffer {}]", self.units.len());
        self.push_image(DexImage::from_bytes(bytes, &location)?)
    }

    fn push_image(&mut self, image: DexImage) -> Result<()> {
        if self.units.len() >= u16::MAX as usize {
            return dex_err!(InvalidImage, "too many dex images: {}", self.units.len());
        }
        self.units.push(DexUnit::new(image));
        Ok(())
    }

    /// Worker pool width for the next query. Zero restores the hardware
    /// default.
    pub fn set_thread_num(&self, n: usize) {
        let mut state = self.pool.lock().expect("pool lock poisoned");
        state.thread_num = Some(n);
        state.pool = None;
    }

    pub(crate) fn pool(&self) -> Result<Arc<ThreadPool>> {
        let mut state = self.pool.lock().expect("pool lock poisoned");
        if let Some(pool) = &state.pool {
            return Ok(pool.clone());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(state.thread_num.unwrap_or(0))
            .build()
            .map(Arc::new)
            .map_err(|err| {
                DexKitError::IO(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("worker pool: {}", err),
                ))
            })?;
        state.pool = Some(pool.clone());
        Ok(pool)
    }

    pub fn get_dex_num(&self) -> usize {
        self.units.len()
    }

    /// Eagerly builds every index of every usable image, in parallel
    /// across dexes.
    pub fn init_full_cache(&self) -> Result<()> {
        use rayon::prelude::*;
        let pool = self.pool()?;
        pool.install(|| {
            self.units.par_iter().for_each(|unit| {
                if !unit.usable() {
                    return;
                }
                let result = unit.image.open().and_then(|dex| unit.cache.warm(&dex));
                if let Err(err) = result {
                    unit.mark_broken(&err);
                }
            });
        });
        Ok(())
    }

    /// Writes each owned image back out as `classes.dex`, `classes2.dex`,
    /// and so on under `dir`.
    pub fn export_dex_file<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        std::fs::create_dir_all(dir.as_ref())?;
        for (ordinal, unit) in self.units.iter().enumerate() {
            let name = match ordinal {
                0 => "classes.dex".to_string(),
                n => format!("classes{}.dex", n + 1),
            };
            std::fs::write(dir.as_ref().join(name), unit.image.data())?;
        }
        Ok(())
    }

    //------------------------------------------------------------------------------
    // unit plumbing
    //------------------------------------------------------------------------------
    pub(crate) fn unit(&self, dex: u16) -> Result<&DexUnit> {
        match self.units.get(dex as usize) {
            Some(unit) if unit.usable() => Ok(unit),
            Some(unit) => dex_err!(IndexUnavailable {
                dex,
                reason: unit
                    .broken
                    .get()
                    .cloned()
                    .unwrap_or_else(|| "unusable image".to_string()),
            }),
            None => dex_err!(IndexUnavailable {
                dex,
                reason: format!("only {} dex images loaded", self.units.len()),
            }),
        }
    }

    fn method_index(&self, id: EncodedId) -> Result<u32> {
        if id.kind() != Some(EntityKind::Method) {
            return dex_err!(QueryMalformed, "id {:#x} is not a method id", id.raw());
        }
        Ok(id.index())
    }

    fn field_index(&self, id: EncodedId) -> Result<u32> {
        if id.kind() != Some(EntityKind::Field) {
            return dex_err!(QueryMalformed, "id {:#x} is not a field id", id.raw());
        }
        Ok(id.index())
    }

    fn class_index(&self, id: EncodedId) -> Result<u32> {
        if id.kind() != Some(EntityKind::Class) {
            return dex_err!(QueryMalformed, "id {:#x} is not a class id", id.raw());
        }
        Ok(id.index())
    }

    /// Opens one unit's view for an id-based operation. A parse-level
    /// failure anywhere in the operation marks the unit unusable and
    /// surfaces as `IndexUnavailable`; query-level errors pass through
    /// untouched.
    fn with_unit<T>(
        &self,
        ordinal: u16,
        f: impl FnOnce(&DexUnit, &DexFile<'_, memmap2::Mmap>) -> Result<T>,
    ) -> Result<T> {
        let unit = self.unit(ordinal)?;
        let dex = match unit.image.open() {
            Ok(dex) => dex,
            Err(err) => {
                unit.mark_broken(&err);
                return dex_err!(IndexUnavailable {
                    dex: ordinal,
                    reason: err.to_string(),
                });
            }
        };
        match f(unit, &dex) {
            Err(err) if err.is_parse_error() => {
                unit.mark_broken(&err);
                dex_err!(IndexUnavailable {
                    dex: ordinal,
                    reason: err.to_string(),
                })
            }
            other => other,
        }
    }

    //------------------------------------------------------------------------------
    // descriptor lookups
    //------------------------------------------------------------------------------
    /// Class record by exact type descriptor, searching every dex in
    /// ordinal order.
    pub fn get_class_data(&self, descriptor: &str) -> Result<Option<ClassMeta>> {
        for (ordinal, unit) in self.units.iter().enumerate() {
            let found = self.in_unit(unit, |dex| {
                match unit.cache.class_map(dex)?.get(descriptor) {
                    Some(&class_def_idx) => {
                        Ok(Some(build_class_meta(ordinal as u16, dex, class_def_idx)?))
                    }
                    None => Ok(None),
                }
            });
            if let Some(meta) = found {
                return Ok(Some(meta));
            }
        }
        Ok(None)
    }

    /// Runs `f` against one unit's view, marking the unit unusable (and
    /// yielding `None`) when the image fails to parse mid-operation.
    fn in_unit<T>(
        &self,
        unit: &DexUnit,
        f: impl FnOnce(&DexFile<'_, memmap2::Mmap>) -> Result<Option<T>>,
    ) -> Option<T> {
        if !unit.usable() {
            return None;
        }
        let dex = match unit.image.open() {
            Ok(dex) => dex,
            Err(err) => {
                unit.mark_broken(&err);
                return None;
            }
        };
        match f(&dex) {
            Ok(found) => found,
            Err(err) => {
                unit.mark_broken(&err);
                None
            }
        }
    }

    /// Method record by full descriptor (`Lcls;->name(params)ret`).
    pub fn get_method_data(&self, descriptor: &str) -> Result<Option<MethodMeta>> {
        let (class_desc, name, params_raw, return_type) =
            match desc_names::split_method_descriptor(descriptor) {
                Some(parts) => parts,
                None => {
                    return dex_err!(QueryMalformed, "bad method descriptor {:?}", descriptor)
                }
            };
        for (ordinal, unit) in self.units.iter().enumerate() {
            let found = self.in_unit(unit, |dex| {
                let class_def_idx = match unit.cache.class_map(dex)?.get(class_desc) {
                    Some(&idx) => idx,
                    None => return Ok(None),
                };
                let members = unit.cache.members(dex)?;
                for &method_idx in &members.class_methods[class_def_idx as usize] {
                    let flags = members.methods[method_idx as usize]
                        .map(|def| def.access_flags)
                        .unwrap_or(0);
                    let meta = build_method_meta(ordinal as u16, dex, method_idx, flags)?;
                    if meta.name == name
                        && meta.return_type == return_type
                        && meta.param_types.concat() == params_raw
                    {
                        return Ok(Some(meta));
                    }
                }
                Ok(None)
            });
            if let Some(meta) = found {
                return Ok(Some(meta));
            }
        }
        Ok(None)
    }

    /// Field record by full descriptor (`Lcls;->name:type`).
    pub fn get_field_data(&self, descriptor: &str) -> Result<Option<FieldMeta>> {
        let (class_desc, name, type_desc) = match desc_names::split_field_descriptor(descriptor)
        {
            Some(parts) => parts,
            None => return dex_err!(QueryMalformed, "bad field descriptor {:?}", descriptor),
        };
        for (ordinal, unit) in self.units.iter().enumerate() {
            let found = self.in_unit(unit, |dex| {
                let class_def_idx = match unit.cache.class_map(dex)?.get(class_desc) {
                    Some(&idx) => idx,
                    None => return Ok(None),
                };
                let members = unit.cache.members(dex)?;
                for &field_idx in &members.class_fields[class_def_idx as usize] {
                    let flags = members.fields[field_idx as usize]
                        .map(|def| def.access_flags)
                        .unwrap_or(0);
                    let meta = build_field_meta(ordinal as u16, dex, field_idx, flags)?;
                    if meta.name == name && meta.type_descriptor == type_desc {
                        return Ok(Some(meta));
                    }
                }
                Ok(None)
            });
            if let Some(meta) = found {
                return Ok(Some(meta));
            }
        }
        Ok(None)
    }

    //------------------------------------------------------------------------------
    // id lookups
    //------------------------------------------------------------------------------
    pub fn get_class_by_ids(&self, ids: &[EncodedId]) -> Result<Vec<ClassMeta>> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let class_def_idx = self.class_index(id)?;
            out.push(self.with_unit(id.dex(), |_, dex| {
                build_class_meta(id.dex(), dex, class_def_idx)
            })?);
        }
        Ok(results::finish(out, |c| c.id))
    }

    pub fn get_method_by_ids(&self, ids: &[EncodedId]) -> Result<Vec<MethodMeta>> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let method_idx = self.method_index(id)?;
            out.push(self.with_unit(id.dex(), |unit, dex| {
                let flags = self.method_access_flags(unit, dex, method_idx)?;
                build_method_meta(id.dex(), dex, method_idx, flags)
            })?);
        }
        Ok(results::finish(out, |m| m.id))
    }

    pub fn get_field_by_ids(&self, ids: &[EncodedId]) -> Result<Vec<FieldMeta>> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            let field_idx = self.field_index(id)?;
            out.push(self.with_unit(id.dex(), |unit, dex| {
                let flags = self.field_access_flags(unit, dex, field_idx)?;
                build_field_meta(id.dex(), dex, field_idx, flags)
            })?);
        }
        Ok(results::finish(out, |f| f.id))
    }

    fn method_access_flags<'a, C: DexContainer<'a>>(
        &self,
        unit: &DexUnit,
        dex: &DexFile<'a, C>,
        method_idx: u32,
    ) -> Result<u32> {
        Ok(unit
            .cache
            .members(dex)?
            .methods
            .get(method_idx as usize)
            .and_then(|def| def.map(|d| d.access_flags))
            .unwrap_or(0))
    }

    fn field_access_flags<'a, C: DexContainer<'a>>(
        &self,
        unit: &DexUnit,
        dex: &DexFile<'a, C>,
        field_idx: u32,
    ) -> Result<u32> {
        Ok(unit
            .cache
            .members(dex)?
            .fields
            .get(field_idx as usize)
            .and_then(|def| def.map(|d| d.access_flags))
            .unwrap_or(0))
    }

    //------------------------------------------------------------------------------
    // annotations
    //------------------------------------------------------------------------------
    pub fn get_class_annotations(&self, id: EncodedId) -> Result<Vec<AnnotationMeta>> {
        let class_def_idx = self.class_index(id)?;
        self.with_unit(id.dex(), |_, dex| {
            let class_def = dex.get_class_def(class_def_idx)?;
            let accessor = dex.class_annotations(class_def)?;
            resolve_annotation_set(dex, accessor.get_class_annotations())
        })
    }

    pub fn get_method_annotations(&self, id: EncodedId) -> Result<Vec<AnnotationMeta>> {
        let method_idx = self.method_index(id)?;
        self.with_unit(id.dex(), |unit, dex| {
            let accessor = self.annotations_of_method(unit, dex, method_idx)?;
            let set_off = accessor
                .get_method_annotations()
                .iter()
                .find(|item| item.method_idx == method_idx)
                .map(|item| item.annotations_off)
                .unwrap_or(0);
            resolve_annotation_set(dex, dex.get_annotation_set(set_off)?)
        })
    }

    pub fn get_field_annotations(&self, id: EncodedId) -> Result<Vec<AnnotationMeta>> {
        let field_idx = self.field_index(id)?;
        self.with_unit(id.dex(), |unit, dex| {
            let members = unit.cache.members(dex)?;
            let class_def_idx = match members.fields.get(field_idx as usize).and_then(|d| *d) {
                Some(def) => def.class_def_idx,
                None => return Ok(Vec::new()),
            };
            let class_def = dex.get_class_def(class_def_idx)?;
            let accessor = dex.class_annotations(class_def)?;
            let set_off = accessor
                .get_field_annotations()
                .iter()
                .find(|item| item.field_idx == field_idx)
                .map(|item| item.annotations_off)
                .unwrap_or(0);
            resolve_annotation_set(dex, dex.get_annotation_set(set_off)?)
        })
    }

    /// Annotations per parameter, outer list in parameter order.
    pub fn get_parameter_annotations(&self, id: EncodedId) -> Result<Vec<Vec<AnnotationMeta>>> {
        let method_idx = self.method_index(id)?;
        self.with_unit(id.dex(), |unit, dex| {
            let accessor = self.annotations_of_method(unit, dex, method_idx)?;
            let list_off = accessor
                .get_parameter_annotations()
                .iter()
                .find(|item| item.method_idx == method_idx)
                .map(|item| item.annotations_off)
                .unwrap_or(0);
            let mut out = Vec::new();
            for &set_off in dex.get_annotation_set_ref_list(list_off)? {
                out.push(resolve_annotation_set(dex, dex.get_annotation_set(set_off)?)?);
            }
            Ok(out)
        })
    }

    fn annotations_of_method<'a, C: DexContainer<'a>>(
        &self,
        unit: &DexUnit,
        dex: &DexFile<'a, C>,
        method_idx: u32,
    ) -> Result<crate::file::ClassAnnotationsAccessor<'a>> {
        let members = unit.cache.members(dex)?;
        let class_def_idx = match members.methods.get(method_idx as usize).and_then(|d| *d) {
            Some(def) => def.class_def_idx,
            None => return Ok(crate::file::ClassAnnotationsAccessor::empty()),
        };
        let class_def = dex.get_class_def(class_def_idx)?;
        dex.class_annotations(class_def)
    }

    //------------------------------------------------------------------------------
    // method body queries
    //------------------------------------------------------------------------------
    /// Debug-info parameter names, `None` per unnamed slot. Methods
    /// without code or debug info yield an empty list.
    pub fn get_parameter_names(&self, id: EncodedId) -> Result<Vec<Option<String>>> {
        let method_idx = self.method_index(id)?;
        self.with_unit(id.dex(), |unit, dex| {
            let code_off = self.code_off_of(unit, dex, method_idx)?;
            if code_off == 0 {
                return Ok(Vec::new());
            }
            let accessor = dex.get_code_item_accessor(code_off)?;
            dex.get_parameter_names(accessor.debug_info_off())
        })
    }

    /// Opcode bytes of the method body, stream order.
    pub fn get_method_op_codes(&self, id: EncodedId) -> Result<Vec<u8>> {
        let method_idx = self.method_index(id)?;
        self.with_unit(id.dex(), |unit, dex| {
            let code_off = self.code_off_of(unit, dex, method_idx)?;
            if code_off == 0 {
                return Ok(Vec::new());
            }
            let accessor = dex.get_code_item_accessor(code_off)?;
            crate::walker::op_codes(&accessor)
        })
    }

    /// String literals referenced by the method body, source order,
    /// de-duplicated.
    pub fn get_using_strings(&self, id: EncodedId) -> Result<Vec<String>> {
        let method_idx = self.method_index(id)?;
        self.with_unit(id.dex(), |unit, dex| {
            let code = unit.cache.code(dex)?;
            let strings = unit.cache.strings(dex)?;
            Ok(code
                .method_strings
                .get(method_idx as usize)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|&idx| strings.get(idx as usize).cloned())
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    /// Field usage sites of the method body, tagged read/write.
    pub fn get_using_fields(&self, id: EncodedId) -> Result<Vec<UsingFieldMeta>> {
        let method_idx = self.method_index(id)?;
        self.with_unit(id.dex(), |unit, dex| {
            let code = unit.cache.code(dex)?;
            let mut out = Vec::new();
            for (list, access) in [
                (&code.method_field_reads, FieldAccess::Read),
                (&code.method_field_writes, FieldAccess::Write),
            ] {
                for &field_idx in list.get(method_idx as usize).into_iter().flatten() {
                    let flags = self.field_access_flags(unit, dex, field_idx)?;
                    out.push(UsingFieldMeta {
                        field: build_field_meta(id.dex(), dex, field_idx, flags)?,
                        access,
                    });
                }
            }
            out.sort_by_key(|u| (u.field.id.raw(), u.access == FieldAccess::Write));
            out.dedup_by_key(|u| (u.field.id.raw(), u.access));
            Ok(out)
        })
    }

    /// Methods whose bodies invoke the given method (callers).
    pub fn get_call_methods(&self, id: EncodedId) -> Result<Vec<MethodMeta>> {
        let method_idx = self.method_index(id)?;
        self.with_unit(id.dex(), |unit, dex| {
            let code = unit.cache.code(dex)?;
            let callers = code
                .method_callers
                .get(&method_idx)
                .cloned()
                .unwrap_or_default();
            self.methods_from_indexes(id.dex(), unit, dex, &callers)
        })
    }

    /// Methods invoked by the given method's body (callees).
    pub fn get_invoke_methods(&self, id: EncodedId) -> Result<Vec<MethodMeta>> {
        let method_idx = self.method_index(id)?;
        self.with_unit(id.dex(), |unit, dex| {
            let code = unit.cache.code(dex)?;
            let callees: Vec<u32> = code
                .method_invokes
                .get(method_idx as usize)
                .map(|list| list.iter().map(|&(_, callee)| callee).collect())
                .unwrap_or_default();
            self.methods_from_indexes(id.dex(), unit, dex, &callees)
        })
    }

    /// Methods reading the given field.
    pub fn field_get_methods(&self, id: EncodedId) -> Result<Vec<MethodMeta>> {
        let field_idx = self.field_index(id)?;
        self.with_unit(id.dex(), |unit, dex| {
            let code = unit.cache.code(dex)?;
            let readers = code.field_readers.get(&field_idx).cloned().unwrap_or_default();
            self.methods_from_indexes(id.dex(), unit, dex, &readers)
        })
    }

    /// Methods writing the given field.
    pub fn field_put_methods(&self, id: EncodedId) -> Result<Vec<MethodMeta>> {
        let field_idx = self.field_index(id)?;
        self.with_unit(id.dex(), |unit, dex| {
            let code = unit.cache.code(dex)?;
            let writers = code.field_writers.get(&field_idx).cloned().unwrap_or_default();
            self.methods_from_indexes(id.dex(), unit, dex, &writers)
        })
    }

    fn methods_from_indexes<'a, C: DexContainer<'a>>(
        &self,
        ordinal: u16,
        unit: &DexUnit,
        dex: &DexFile<'a, C>,
        indexes: &[u32],
    ) -> Result<Vec<MethodMeta>> {
        let mut out = Vec::with_capacity(indexes.len());
        for &method_idx in indexes {
            let flags = self.method_access_flags(unit, dex, method_idx)?;
            out.push(build_method_meta(ordinal, dex, method_idx, flags)?);
        }
        Ok(results::finish(out, |m| m.id))
    }

    fn code_off_of<'a, C: DexContainer<'a>>(
        &self,
        unit: &DexUnit,
        dex: &DexFile<'a, C>,
        method_idx: u32,
    ) -> Result<u32> {
        Ok(unit
            .cache
            .members(dex)?
            .methods
            .get(method_idx as usize)
            .and_then(|def| def.map(|d| d.code_off))
            .unwrap_or(0))
    }
}

//------------------------------------------------------------------------------
// record builders
//------------------------------------------------------------------------------

pub(crate) fn build_class_meta<'a, C: DexContainer<'a>>(
    ordinal: u16,
    dex: &DexFile<'a, C>,
    class_def_idx: u32,
) -> Result<ClassMeta> {
    let class_def = dex.get_class_def(class_def_idx)?;
    let superclass = if class_def.superclass_idx == NO_INDEX16 {
        None
    } else {
        Some(dex.get_type_desc_at(class_def.superclass_idx)?)
    };
    let interfaces = match dex.get_interfaces_list(class_def)? {
        Some(list) => list
            .iter()
            .map(|item| dex.get_type_desc_at(item.type_idx))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    let source_file = if class_def.source_file_idx == NO_INDEX {
        None
    } else {
        Some(dex.get_utf16_str_lossy_at(class_def.source_file_idx)?)
    };
    Ok(ClassMeta {
        id: EncodedId::class(ordinal, class_def_idx),
        descriptor: dex.get_class_desc(class_def)?,
        access_flags: class_def.access_flags,
        superclass,
        interfaces,
        source_file,
    })
}

pub(crate) fn build_method_meta<'a, C: DexContainer<'a>>(
    ordinal: u16,
    dex: &DexFile<'a, C>,
    method_idx: u32,
    access_flags: u32,
) -> Result<MethodMeta> {
    let method_id = dex.get_method_id(method_idx)?;
    let proto_id = dex.get_proto_id(method_id.proto_idx)?;
    let param_types = match dex.get_parameter_types(proto_id)? {
        Some(list) => list
            .iter()
            .map(|item| dex.get_type_desc_at(item.type_idx))
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(MethodMeta {
        id: EncodedId::method(ordinal, method_idx),
        class_descriptor: dex.get_type_desc_at(method_id.class_idx)?,
        name: dex.get_method_name(method_id)?,
        shorty: dex.get_shorty(proto_id)?,
        return_type: dex.get_type_desc_at(proto_id.return_type_idx)?,
        param_types,
        access_flags,
    })
}

pub(crate) fn build_field_meta<'a, C: DexContainer<'a>>(
    ordinal: u16,
    dex: &DexFile<'a, C>,
    field_idx: u32,
    access_flags: u32,
) -> Result<FieldMeta> {
    let field_id = dex.get_field_id(field_idx)?;
    Ok(FieldMeta {
        id: EncodedId::field(ordinal, field_idx),
        class_descriptor: dex.get_type_desc_at(field_id.class_idx)?,
        name: dex.get_field_name(field_id)?,
        type_descriptor: dex.get_type_desc_at(field_id.type_idx)?,
        access_flags,
    })
}

//------------------------------------------------------------------------------
// annotation resolution
//------------------------------------------------------------------------------

pub(crate) fn resolve_annotation_set<'a, C: DexContainer<'a>>(
    dex: &DexFile<'a, C>,
    set: &[u32],
) -> Result<Vec<AnnotationMeta>> {
    let mut out = Vec::with_capacity(set.len());
    for &annotation_off in set {
        let item = dex.get_annotation_item(annotation_off)?;
        out.push(resolve_annotation_item(dex, &item)?);
    }
    Ok(out)
}

fn resolve_annotation_item<'a, C: DexContainer<'a>>(
    dex: &DexFile<'a, C>,
    item: &AnnotationItem,
) -> Result<AnnotationMeta> {
    let mut elements = Vec::with_capacity(item.annotation.elements.len());
    for element in &item.annotation.elements {
        elements.push(AnnotationElementMeta {
            name: dex.get_utf16_str_lossy_at(element.name_idx)?,
            value: resolve_value(dex, &element.value)?,
        });
    }
    Ok(AnnotationMeta {
        type_descriptor: dex.get_type_desc_at(item.annotation.type_idx as u16)?,
        visibility: item.visibility,
        elements,
    })
}

fn resolve_value<'a, C: DexContainer<'a>>(
    dex: &DexFile<'a, C>,
    value: &EncodedValue,
) -> Result<AnnotationValue> {
    Ok(match value {
        EncodedValue::Byte(v) => AnnotationValue::Byte(*v),
        EncodedValue::Short(v) => AnnotationValue::Short(*v),
        EncodedValue::Char(v) => AnnotationValue::Char(*v),
        EncodedValue::Int(v) => AnnotationValue::Int(*v),
        EncodedValue::Long(v) => AnnotationValue::Long(*v),
        EncodedValue::Float(v) => AnnotationValue::Float(*v),
        EncodedValue::Double(v) => AnnotationValue::Double(*v),
        EncodedValue::Boolean(v) => AnnotationValue::Boolean(*v),
        EncodedValue::MethodType(v) => AnnotationValue::MethodType(*v),
        EncodedValue::MethodHandle(v) => AnnotationValue::MethodHandle(*v),
        EncodedValue::String(idx) => {
            AnnotationValue::String(dex.get_utf16_str_lossy_at(*idx)?)
        }
        EncodedValue::Type(idx) => AnnotationValue::Type(dex.get_type_desc_at(*idx as u16)?),
        EncodedValue::Field(idx) => {
            let field_id = dex.get_field_id(*idx)?;
            AnnotationValue::Field(format!(
                "{}->{}:{}",
                dex.get_type_desc_at(field_id.class_idx)?,
                dex.get_field_name(field_id)?,
                dex.get_type_desc_at(field_id.type_idx)?
            ))
        }
        EncodedValue::Method(idx) => {
            let meta = build_method_meta(0, dex, *idx, 0)?;
            AnnotationValue::Method(meta.descriptor())
        }
        EncodedValue::Enum(idx) => {
            let field_id = dex.get_field_id(*idx)?;
            AnnotationValue::Enum(format!(
                "{}->{}:{}",
                dex.get_type_desc_at(field_id.class_idx)?,
                dex.get_field_name(field_id)?,
                dex.get_type_desc_at(field_id.type_idx)?
            ))
        }
        EncodedValue::Array(values) => {
            let mut out = Vec::with_capacity(values.len());
            for v in values {
                out.push(resolve_value(dex, v)?);
            }
            AnnotationValue::Array(out)
        }
        EncodedValue::Annotation(annotation) => {
            let item = AnnotationItem {
                visibility: crate::file::visibility::BUILD,
                annotation: annotation.clone(),
            };
            AnnotationValue::Annotation(Box::new(resolve_annotation_item(dex, &item)?))
        }
        EncodedValue::Null => AnnotationValue::Null,
    })
}
