//! Query evaluation. The planner materializes string-constrained candidate
//! sets first (one automaton pass over the dex string pool joined against
//! the string->methods index), then applies the residual structural
//! filters; purely structural queries scan the relevant primary index.
//! Work is partitioned by dex ordinal on the session pool, and within a
//! dex by class-def range for the batch scans.

use std::collections::{BTreeMap, HashMap};

use memmap2::Mmap;
use rayon::prelude::*;

use crate::file::{DexFile, FieldAccess};
use crate::query::{
    BatchFindQuery, ClassQuery, CompiledClassQuery, CompiledFieldQuery, CompiledMethodQuery,
    FieldQuery, MatcherSet, MethodQuery, StringMatcher,
};
use crate::results::{self, ClassMeta, FieldMeta, MethodMeta};
use crate::session::{build_class_meta, build_field_meta, build_method_meta, DexKit, DexUnit};
use crate::{Result, NO_INDEX};

type Dex<'a> = DexFile<'a, Mmap>;

impl DexKit {
    /// Classes matching a structured query, across every usable dex.
    pub fn find_class(&self, query: &ClassQuery) -> Result<Vec<ClassMeta>> {
        let compiled = query.compile()?;
        let found = self.scan(|ordinal, unit| {
            let dex = unit.image.open()?;
            let candidates = class_candidates(unit, &dex, &compiled)?;
            let mut out = Vec::new();
            for class_def_idx in candidates {
                if class_matches(unit, &dex, &compiled, class_def_idx, true)? {
                    out.push(build_class_meta(ordinal, &dex, class_def_idx)?);
                }
            }
            Ok(out)
        })?;
        Ok(results::finish(found, |c| c.id))
    }

    /// Methods matching a structured query.
    pub fn find_method(&self, query: &MethodQuery) -> Result<Vec<MethodMeta>> {
        let compiled = query.compile()?;
        let found = self.scan(|ordinal, unit| {
            let dex = unit.image.open()?;
            let candidates = method_candidates(unit, &dex, &compiled)?;
            let mut out = Vec::new();
            for method_idx in candidates {
                if method_matches(unit, &dex, &compiled, method_idx, true)? {
                    let flags = method_flags(unit, &dex, method_idx)?;
                    out.push(build_method_meta(ordinal, &dex, method_idx, flags)?);
                }
            }
            Ok(out)
        })?;
        Ok(results::finish(found, |m| m.id))
    }

    /// Fields matching a structured query.
    pub fn find_field(&self, query: &FieldQuery) -> Result<Vec<FieldMeta>> {
        let compiled = query.compile()?;
        let found = self.scan(|ordinal, unit| {
            let dex = unit.image.open()?;
            let members = unit.cache.members(&dex)?;
            let mut out = Vec::new();
            for (field_idx, def) in members.fields.iter().enumerate() {
                let def = match def {
                    Some(def) => def,
                    None => continue,
                };
                if field_matches(unit, &dex, &compiled, field_idx as u32)? {
                    out.push(build_field_meta(
                        ordinal,
                        &dex,
                        field_idx as u32,
                        def.access_flags,
                    )?);
                }
            }
            Ok(out)
        })?;
        Ok(results::finish(found, |f| f.id))
    }

    /// Batch variant: every pattern of every group is compiled into one
    /// automaton, the dex string pool is scanned once, and a group matches
    /// a class when all of its strings appear somewhere in that class
    /// (name, superclass, interfaces, field types, or method bodies).
    pub fn batch_find_class_using_strings(
        &self,
        query: &BatchFindQuery,
    ) -> Result<BTreeMap<String, Vec<ClassMeta>>> {
        let batch = BatchMatchers::build(query);
        let found = self.scan(|ordinal, unit| {
            let dex = unit.image.open()?;
            let string_hits = batch.scan_pool(unit, &dex)?;
            let num_classes = dex.num_class_defs();
            let per_class: Vec<Vec<(usize, ClassMeta)>> = (0..num_classes)
                .into_par_iter()
                .map(|class_def_idx| -> Result<Vec<(usize, ClassMeta)>> {
                    let mut hits = batch.set.new_hits();
                    for string_idx in class_string_universe(unit, &dex, class_def_idx)? {
                        batch.merge(&string_hits, string_idx, &mut hits);
                    }
                    let mut rows = Vec::new();
                    for (group_idx, instances) in batch.group_instances.iter().enumerate() {
                        if !instances.is_empty()
                            && instances.iter().all(|&i| hits[i as usize])
                        {
                            rows.push((
                                group_idx,
                                build_class_meta(ordinal, &dex, class_def_idx)?,
                            ));
                        }
                    }
                    Ok(rows)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(per_class.into_iter().flatten().collect())
        })?;
        Ok(batch.assemble(found, |c| c.id))
    }

    /// Batch variant over single method bodies.
    pub fn batch_find_method_using_strings(
        &self,
        query: &BatchFindQuery,
    ) -> Result<BTreeMap<String, Vec<MethodMeta>>> {
        let batch = BatchMatchers::build(query);
        let found = self.scan(|ordinal, unit| {
            let dex = unit.image.open()?;
            let string_hits = batch.scan_pool(unit, &dex)?;
            let code = unit.cache.code(&dex)?;
            let mut rows = Vec::new();
            for (method_idx, used) in code.method_strings.iter().enumerate() {
                if used.is_empty() {
                    continue;
                }
                let mut hits = batch.set.new_hits();
                for &string_idx in used {
                    batch.merge(&string_hits, string_idx, &mut hits);
                }
                for (group_idx, instances) in batch.group_instances.iter().enumerate() {
                    if !instances.is_empty() && instances.iter().all(|&i| hits[i as usize]) {
                        let flags = method_flags(unit, &dex, method_idx as u32)?;
                        rows.push((
                            group_idx,
                            build_method_meta(ordinal, &dex, method_idx as u32, flags)?,
                        ));
                    }
                }
            }
            Ok(rows)
        })?;
        Ok(batch.assemble(found, |m| m.id))
    }

    /// Runs `f` over every usable dex on the worker pool. A unit that
    /// fails mid-scan is marked unusable and contributes nothing; the
    /// query keeps going over the remaining images.
    fn scan<T, F>(&self, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(u16, &DexUnit) -> Result<Vec<T>> + Sync,
    {
        let pool = self.pool()?;
        let per_dex: Vec<Vec<T>> = pool.install(|| {
            self.units
                .par_iter()
                .enumerate()
                .map(|(ordinal, unit)| {
                    if !unit.usable() {
                        return Vec::new();
                    }
                    match f(ordinal as u16, unit) {
                        Ok(rows) => rows,
                        Err(err) => {
                            unit.mark_broken(&err);
                            Vec::new()
                        }
                    }
                })
                .collect()
        });
        Ok(per_dex.into_iter().flatten().collect())
    }
}

//------------------------------------------------------------------------------
// batch machinery
//------------------------------------------------------------------------------

struct BatchMatchers {
    set: MatcherSet,
    group_names: Vec<String>,
    group_instances: Vec<Vec<u32>>,
}

impl BatchMatchers {
    fn build(query: &BatchFindQuery) -> BatchMatchers {
        let mut instances = Vec::new();
        let mut group_names = Vec::with_capacity(query.groups.len());
        let mut group_instances = Vec::with_capacity(query.groups.len());
        for (name, patterns) in &query.groups {
            let ids = patterns
                .iter()
                .map(|raw| {
                    instances.push(StringMatcher::parse(raw));
                    (instances.len() - 1) as u32
                })
                .collect();
            group_names.push(name.clone());
            group_instances.push(ids);
        }
        BatchMatchers {
            set: MatcherSet::build(instances),
            group_names,
            group_instances,
        }
    }

    /// One automaton pass over the decoded string pool: string id -> the
    /// anchored instances it satisfies. Only strings with hits are kept.
    fn scan_pool(&self, unit: &DexUnit, dex: &Dex<'_>) -> Result<HashMap<u32, Vec<u32>>> {
        scan_pool_with(unit, dex, &self.set)
    }

    fn merge(&self, string_hits: &HashMap<u32, Vec<u32>>, string_idx: u32, hits: &mut [bool]) {
        if let Some(matched) = string_hits.get(&string_idx) {
            for &instance in matched {
                hits[instance as usize] = true;
            }
        }
    }

    fn assemble<T>(
        &self,
        rows: Vec<(usize, T)>,
        id_of: impl Fn(&T) -> crate::EncodedId + Copy,
    ) -> BTreeMap<String, Vec<T>> {
        let mut groups: BTreeMap<String, Vec<T>> = self
            .group_names
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        for (group_idx, row) in rows {
            groups
                .get_mut(&self.group_names[group_idx])
                .expect("group name out of build")
                .push(row);
        }
        for rows in groups.values_mut() {
            let taken = std::mem::take(rows);
            *rows = results::finish(taken, id_of);
        }
        groups
    }
}

//------------------------------------------------------------------------------
// candidate materialization
//------------------------------------------------------------------------------

/// String ids a class can match literal patterns against: its own name,
/// superclass, interfaces, declared field types, and everything its method
/// bodies reference.
fn class_string_universe(
    unit: &DexUnit,
    dex: &Dex<'_>,
    class_def_idx: u32,
) -> Result<Vec<u32>> {
    let members = unit.cache.members(dex)?;
    let code = unit.cache.code(dex)?;
    let class_def = dex.get_class_def(class_def_idx)?;

    let mut universe = Vec::new();
    universe.push(dex.get_type_id(class_def.class_idx)?.descriptor_idx);
    if class_def.superclass_idx != crate::NO_INDEX16 {
        universe.push(dex.get_type_id(class_def.superclass_idx)?.descriptor_idx);
    }
    if let Some(interfaces) = dex.get_interfaces_list(class_def)? {
        for item in interfaces {
            universe.push(dex.get_type_id(item.type_idx)?.descriptor_idx);
        }
    }
    for &field_idx in &members.class_fields[class_def_idx as usize] {
        let field_id = dex.get_field_id(field_idx)?;
        universe.push(dex.get_type_id(field_id.type_idx)?.descriptor_idx);
    }
    for &method_idx in &members.class_methods[class_def_idx as usize] {
        universe.extend_from_slice(&code.method_strings[method_idx as usize]);
    }
    universe.sort_unstable();
    universe.dedup();
    Ok(universe)
}

/// Class candidates for a structured query: string-constrained queries go
/// through the pool scan, everything else scans the class-def table.
fn class_candidates(
    unit: &DexUnit,
    dex: &Dex<'_>,
    query: &CompiledClassQuery,
) -> Result<Vec<u32>> {
    if query.strings.is_empty() {
        return Ok((0..dex.num_class_defs()).collect());
    }
    let set = MatcherSet::build(query.strings.clone());
    let string_hits = scan_pool_with(unit, dex, &set)?;
    let mut out = Vec::new();
    for class_def_idx in 0..dex.num_class_defs() {
        let mut hits = set.new_hits();
        for string_idx in class_string_universe(unit, dex, class_def_idx)? {
            if let Some(matched) = string_hits.get(&string_idx) {
                for &instance in matched {
                    hits[instance as usize] = true;
                }
            }
        }
        if hits.iter().all(|&h| h) {
            out.push(class_def_idx);
        }
    }
    Ok(out)
}

/// Method candidates: for string-constrained queries, intersect the
/// string->methods postings of every pattern; otherwise every defined
/// method.
fn method_candidates(
    unit: &DexUnit,
    dex: &Dex<'_>,
    query: &CompiledMethodQuery,
) -> Result<Vec<u32>> {
    let members = unit.cache.members(dex)?;
    if query.strings.is_empty() {
        return Ok(members
            .methods
            .iter()
            .enumerate()
            .filter(|(_, def)| def.is_some())
            .map(|(idx, _)| idx as u32)
            .collect());
    }

    let set = MatcherSet::build(query.strings.clone());
    let string_hits = scan_pool_with(unit, dex, &set)?;
    let code = unit.cache.code(dex)?;

    // per instance, the union of methods using any string it matches
    let mut postings: Vec<Vec<u32>> = vec![Vec::new(); set.instance_count()];
    for (string_idx, matched) in &string_hits {
        if let Some(methods) = code.string_methods.get(string_idx) {
            for &instance in matched {
                postings[instance as usize].extend_from_slice(methods);
            }
        }
    }
    for list in &mut postings {
        list.sort_unstable();
        list.dedup();
    }

    // intersect, smallest posting first
    postings.sort_by_key(|list| list.len());
    let mut candidates = match postings.first() {
        Some(first) => first.clone(),
        None => return Ok(Vec::new()),
    };
    for list in &postings[1..] {
        candidates.retain(|idx| list.binary_search(idx).is_ok());
        if candidates.is_empty() {
            break;
        }
    }
    Ok(candidates)
}

fn scan_pool_with(
    unit: &DexUnit,
    dex: &Dex<'_>,
    set: &MatcherSet,
) -> Result<HashMap<u32, Vec<u32>>> {
    let strings = unit.cache.strings(dex)?;
    let mut out = HashMap::new();
    for (string_idx, haystack) in strings.iter().enumerate() {
        let mut hits = set.new_hits();
        set.scan_into(haystack, &mut hits);
        let matched: Vec<u32> = hits
            .iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .map(|(i, _)| i as u32)
            .collect();
        if !matched.is_empty() {
            out.insert(string_idx as u32, matched);
        }
    }
    Ok(out)
}

//------------------------------------------------------------------------------
// predicate evaluation
//------------------------------------------------------------------------------

fn method_flags(unit: &DexUnit, dex: &Dex<'_>, method_idx: u32) -> Result<u32> {
    Ok(unit
        .cache
        .members(dex)?
        .methods
        .get(method_idx as usize)
        .and_then(|def| def.map(|d| d.access_flags))
        .unwrap_or(0))
}

/// Structural class predicate. `strings_checked` is set when the planner
/// already satisfied the literal-string constraint.
fn class_matches(
    unit: &DexUnit,
    dex: &Dex<'_>,
    query: &CompiledClassQuery,
    class_def_idx: u32,
    strings_checked: bool,
) -> Result<bool> {
    let class_def = dex.get_class_def(class_def_idx)?;

    if query.access_flags != 0 && class_def.access_flags & query.access_flags != query.access_flags
    {
        return Ok(false);
    }
    if let Some(re) = &query.descriptor {
        if !re.is_match(&dex.get_class_desc(class_def)?) {
            return Ok(false);
        }
    }
    if let Some(source_file) = &query.source_file {
        let actual = if class_def.source_file_idx == NO_INDEX {
            None
        } else {
            Some(dex.get_utf16_str_lossy_at(class_def.source_file_idx)?)
        };
        if actual.as_deref() != Some(source_file.as_str()) {
            return Ok(false);
        }
    }
    if let Some(superclass) = &query.superclass {
        if class_def.superclass_idx == crate::NO_INDEX16
            || dex.get_type_desc_at(class_def.superclass_idx)? != *superclass
        {
            return Ok(false);
        }
    }
    if !query.interfaces.is_empty() {
        let implemented: Vec<String> = match dex.get_interfaces_list(class_def)? {
            Some(list) => list
                .iter()
                .map(|item| dex.get_type_desc_at(item.type_idx))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        if !query
            .interfaces
            .iter()
            .all(|want| implemented.iter().any(|have| have == want))
        {
            return Ok(false);
        }
    }
    if let Some(re) = &query.annotation {
        let accessor = dex.class_annotations(class_def)?;
        if !annotation_set_matches(dex, accessor.get_class_annotations(), re)? {
            return Ok(false);
        }
    }
    if !strings_checked && !query.strings.is_empty() {
        let strings = unit.cache.strings(dex)?;
        let universe = class_string_universe(unit, dex, class_def_idx)?;
        let covered = query.strings.iter().all(|matcher| {
            universe
                .iter()
                .any(|&sid| matcher.matches(&strings[sid as usize]))
        });
        if !covered {
            return Ok(false);
        }
    }

    let members = unit.cache.members(dex)?;
    if let Some(method_query) = &query.method {
        let mut any = false;
        for &method_idx in &members.class_methods[class_def_idx as usize] {
            if method_matches(unit, dex, method_query, method_idx, false)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }
    if let Some(field_query) = &query.field {
        let mut any = false;
        for &field_idx in &members.class_fields[class_def_idx as usize] {
            if field_matches(unit, dex, field_query, field_idx)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Structural method predicate; works for undefined (imported) method ids
/// as long as the query only constrains the id-level shape.
fn method_matches(
    unit: &DexUnit,
    dex: &Dex<'_>,
    query: &CompiledMethodQuery,
    method_idx: u32,
    strings_checked: bool,
) -> Result<bool> {
    let method_id = dex.get_method_id(method_idx)?;
    let def = unit
        .cache
        .members(dex)?
        .methods
        .get(method_idx as usize)
        .and_then(|d| *d);

    if let Some(re) = &query.name {
        if !re.is_match(&dex.get_method_name(method_id)?) {
            return Ok(false);
        }
    }

    // shorty prefix check first, then the exact descriptors
    let proto_id = dex.get_proto_id(method_id.proto_idx)?;
    if let Some(match_shorty) = &query.match_shorty {
        let shorty = dex.get_shorty(proto_id)?;
        if !crate::desc_names::shorty_descriptor_match(match_shorty, &shorty) {
            return Ok(false);
        }
    }
    if let Some(return_type) = &query.return_type {
        if dex.get_type_desc_at(proto_id.return_type_idx)? != *return_type {
            return Ok(false);
        }
    }
    if let Some(param_types) = &query.param_types {
        let actual: Vec<String> = match dex.get_parameter_types(proto_id)? {
            Some(list) => list
                .iter()
                .map(|item| dex.get_type_desc_at(item.type_idx))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        if actual.len() != param_types.len() {
            return Ok(false);
        }
        for (want, have) in param_types.iter().zip(&actual) {
            if let Some(want) = want {
                if want != have {
                    return Ok(false);
                }
            }
        }
    }

    if query.access_flags != 0 {
        let flags = match def {
            Some(def) => def.access_flags,
            None => return Ok(false),
        };
        if flags & query.access_flags != query.access_flags {
            return Ok(false);
        }
    }

    if let Some(class_query) = &query.declaring_class {
        let class_def_idx = match def {
            Some(def) => def.class_def_idx,
            None => {
                // imported method: resolve the class by descriptor
                let desc = dex.get_type_desc_at(method_id.class_idx)?;
                match unit.cache.class_map(dex)?.get(&desc) {
                    Some(&idx) => idx,
                    None => return Ok(false),
                }
            }
        };
        if !class_matches(unit, dex, class_query, class_def_idx, false)? {
            return Ok(false);
        }
    }

    if let Some(re) = &query.annotation {
        let class_def_idx = match def {
            Some(def) => def.class_def_idx,
            None => return Ok(false),
        };
        let class_def = dex.get_class_def(class_def_idx)?;
        let accessor = dex.class_annotations(class_def)?;
        let set_off = accessor
            .get_method_annotations()
            .iter()
            .find(|item| item.method_idx == method_idx)
            .map(|item| item.annotations_off)
            .unwrap_or(0);
        if !annotation_set_matches(dex, dex.get_annotation_set(set_off)?, re)? {
            return Ok(false);
        }
    }

    if !strings_checked && !query.strings.is_empty() {
        let code = unit.cache.code(dex)?;
        let strings = unit.cache.strings(dex)?;
        let used = code
            .method_strings
            .get(method_idx as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let covered = query.strings.iter().all(|matcher| {
            used.iter()
                .any(|&sid| matcher.matches(&strings[sid as usize]))
        });
        if !covered {
            return Ok(false);
        }
    }

    if !query.using_fields.is_empty() {
        for usage in &query.using_fields {
            if !field_usage_matches(unit, dex, usage.access, &usage.field, method_idx)? {
                return Ok(false);
            }
        }
    }

    if let Some(callee_query) = &query.invokes {
        let code = unit.cache.code(dex)?;
        let callees = code
            .method_invokes
            .get(method_idx as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let mut any = false;
        for &(_, callee) in callees {
            if method_matches(unit, dex, callee_query, callee, false)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }

    if let Some(caller_query) = &query.called_by {
        let code = unit.cache.code(dex)?;
        let callers = code.method_callers.get(&method_idx).cloned().unwrap_or_default();
        let mut any = false;
        for caller in callers {
            if method_matches(unit, dex, caller_query, caller, false)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }

    if !query.op_codes.is_empty() {
        let code_off = match def {
            Some(def) if def.code_off != 0 => def.code_off,
            _ => return Ok(false),
        };
        let accessor = dex.get_code_item_accessor(code_off)?;
        let ops = crate::walker::op_codes(&accessor)?;
        if ops.len() < query.op_codes.len()
            || !ops
                .windows(query.op_codes.len())
                .any(|window| window == query.op_codes.as_slice())
        {
            return Ok(false);
        }
    }

    Ok(true)
}

fn field_usage_matches(
    unit: &DexUnit,
    dex: &Dex<'_>,
    access: Option<FieldAccess>,
    field_query: &CompiledFieldQuery,
    method_idx: u32,
) -> Result<bool> {
    let code = unit.cache.code(dex)?;
    let reads = code
        .method_field_reads
        .get(method_idx as usize)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let writes = code
        .method_field_writes
        .get(method_idx as usize)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let candidates: Vec<u32> = match access {
        Some(FieldAccess::Read) => reads.to_vec(),
        Some(FieldAccess::Write) => writes.to_vec(),
        None => {
            let mut all = reads.to_vec();
            all.extend_from_slice(writes);
            all
        }
    };
    for field_idx in candidates {
        if field_matches(unit, dex, field_query, field_idx)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Structural field predicate.
fn field_matches(
    unit: &DexUnit,
    dex: &Dex<'_>,
    query: &CompiledFieldQuery,
    field_idx: u32,
) -> Result<bool> {
    let field_id = dex.get_field_id(field_idx)?;
    let def = unit
        .cache
        .members(dex)?
        .fields
        .get(field_idx as usize)
        .and_then(|d| *d);

    if let Some(re) = &query.name {
        if !re.is_match(&dex.get_field_name(field_id)?) {
            return Ok(false);
        }
    }
    if let Some(type_desc) = &query.type_descriptor {
        if dex.get_type_desc_at(field_id.type_idx)? != *type_desc {
            return Ok(false);
        }
    }
    if query.access_flags != 0 {
        let flags = match def {
            Some(def) => def.access_flags,
            None => return Ok(false),
        };
        if flags & query.access_flags != query.access_flags {
            return Ok(false);
        }
    }
    if let Some(class_query) = &query.declaring_class {
        let class_def_idx = match def {
            Some(def) => def.class_def_idx,
            None => {
                let desc = dex.get_type_desc_at(field_id.class_idx)?;
                match unit.cache.class_map(dex)?.get(&desc) {
                    Some(&idx) => idx,
                    None => return Ok(false),
                }
            }
        };
        if !class_matches(unit, dex, class_query, class_def_idx, false)? {
            return Ok(false);
        }
    }
    if let Some(re) = &query.annotation {
        let class_def_idx = match def {
            Some(def) => def.class_def_idx,
            None => return Ok(false),
        };
        let class_def = dex.get_class_def(class_def_idx)?;
        let accessor = dex.class_annotations(class_def)?;
        let set_off = accessor
            .get_field_annotations()
            .iter()
            .find(|item| item.field_idx == field_idx)
            .map(|item| item.annotations_off)
            .unwrap_or(0);
        if !annotation_set_matches(dex, dex.get_annotation_set(set_off)?, re)? {
            return Ok(false);
        }
    }

    if let Some(reader_query) = &query.read_by {
        let code = unit.cache.code(dex)?;
        let readers = code.field_readers.get(&field_idx).cloned().unwrap_or_default();
        let mut any = false;
        for reader in readers {
            if method_matches(unit, dex, reader_query, reader, false)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }
    if let Some(writer_query) = &query.written_by {
        let code = unit.cache.code(dex)?;
        let writers = code.field_writers.get(&field_idx).cloned().unwrap_or_default();
        let mut any = false;
        for writer in writers {
            if method_matches(unit, dex, writer_query, writer, false)? {
                any = true;
                break;
            }
        }
        if !any {
            return Ok(false);
        }
    }
    Ok(true)
}

fn annotation_set_matches(
    dex: &Dex<'_>,
    set: &[u32],
    re: &regex::Regex,
) -> Result<bool> {
    for &annotation_off in set {
        let item = dex.get_annotation_item(annotation_off)?;
        let desc = dex.get_type_desc_at(item.annotation.type_idx as u16)?;
        if re.is_match(&desc) {
            return Ok(true);
        }
    }
    Ok(false)
}
