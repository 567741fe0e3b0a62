//! Structured queries. Queries are nested predicate trees over classes,
//! methods, and fields; literal string patterns carry `^`/`$` anchors that
//! turn containment into prefix/suffix/exact matching.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::acdat::AhoCorasickDoubleArrayTrie;
use crate::file::{FieldAccess, ACC_VALID_MASK};
use crate::{dex_err, Result};

/// How a literal pattern is anchored against a haystack.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StringMatchType {
    Contains,
    StartsWith,
    EndsWith,
    Equals,
}

/// A literal pattern plus its anchoring, parsed off `^`/`$` markers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StringMatcher {
    pub pattern: String,
    pub match_type: StringMatchType,
}

impl StringMatcher {
    /// `^foo` anchors at the start, `foo$` at the end, `^foo$` both.
    pub fn parse(raw: &str) -> StringMatcher {
        let starts = raw.starts_with('^');
        // a bare "^" or "$" is a literal, not an anchor pair
        let ends = raw.len() > starts as usize && raw.ends_with('$');
        let pattern = &raw[starts as usize..raw.len() - ends as usize];
        let match_type = match (starts, ends) {
            (false, false) => StringMatchType::Contains,
            (true, false) => StringMatchType::StartsWith,
            (false, true) => StringMatchType::EndsWith,
            (true, true) => StringMatchType::Equals,
        };
        StringMatcher {
            pattern: pattern.to_string(),
            match_type,
        }
    }

    /// Direct match against a full haystack.
    pub fn matches(&self, haystack: &str) -> bool {
        match self.match_type {
            StringMatchType::Contains => haystack.contains(&self.pattern),
            StringMatchType::StartsWith => haystack.starts_with(&self.pattern),
            StringMatchType::EndsWith => haystack.ends_with(&self.pattern),
            StringMatchType::Equals => haystack == self.pattern,
        }
    }

    /// Anchor check for an automaton hit spanning `begin..end` of a
    /// haystack of `len` bytes.
    pub fn accepts_span(&self, begin: usize, end: usize, len: usize) -> bool {
        match self.match_type {
            StringMatchType::Contains => true,
            StringMatchType::StartsWith => begin == 0,
            StringMatchType::EndsWith => end == len,
            StringMatchType::Equals => begin == 0 && end == len,
        }
    }
}

// ---------------------------------------------------------------------------
// query trees
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassQuery {
    /// Regex over the type descriptor.
    pub descriptor: Option<String>,
    /// Exact source file name.
    pub source_file: Option<String>,
    /// Exact superclass descriptor.
    pub superclass: Option<String>,
    /// Descriptors that must all appear among the implemented interfaces.
    pub interfaces: Vec<String>,
    /// Access flag mask; every set bit must be present.
    pub access_flags: u32,
    /// Regex over the class annotation type descriptors.
    pub annotation: Option<String>,
    /// Anchored literal strings the class must contain somewhere in its
    /// name, superclass, interfaces, field types, or method bodies.
    pub using_strings: Vec<String>,
    /// Some declared method must match.
    pub method: Option<Box<MethodQuery>>,
    /// Some declared field must match.
    pub field: Option<Box<FieldQuery>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodQuery {
    pub declaring_class: Option<Box<ClassQuery>>,
    /// Regex over the method name.
    pub name: Option<String>,
    /// Exact return descriptor; `None` is a wildcard.
    pub return_type: Option<String>,
    /// Parameter descriptors; `None` entries are `*` wildcards, a `None`
    /// list leaves the arity open.
    pub param_types: Option<Vec<Option<String>>>,
    pub access_flags: u32,
    pub annotation: Option<String>,
    pub using_strings: Vec<String>,
    /// Field usages the body must contain.
    pub using_fields: Vec<FieldUsageQuery>,
    /// The body must invoke some method matching this.
    pub invokes: Option<Box<MethodQuery>>,
    /// Some matching method must invoke this one.
    pub called_by: Option<Box<MethodQuery>>,
    /// Contiguous opcode subsequence the body must contain.
    pub op_codes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldUsageQuery {
    pub field: FieldQuery,
    /// `None` accepts both reads and writes.
    pub access: Option<FieldAccess>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldQuery {
    pub declaring_class: Option<Box<ClassQuery>>,
    /// Regex over the field name.
    pub name: Option<String>,
    /// Exact type descriptor.
    pub type_descriptor: Option<String>,
    pub access_flags: u32,
    pub annotation: Option<String>,
    /// Some reader / writer must match.
    pub read_by: Option<Box<MethodQuery>>,
    pub written_by: Option<Box<MethodQuery>>,
}

/// Batch query: named groups of anchored literal strings; a group matches
/// an entity only when every one of its strings is present (conjunctive).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchFindQuery {
    pub groups: BTreeMap<String, Vec<String>>,
}

// ---------------------------------------------------------------------------
// compiled forms
// ---------------------------------------------------------------------------

fn compile_regex(pattern: &Option<String>) -> Result<Option<Regex>> {
    match pattern {
        None => Ok(None),
        Some(p) => match Regex::new(p) {
            Ok(re) => Ok(Some(re)),
            Err(err) => dex_err!(QueryMalformed, "bad regex {:?}: {}", p, err),
        },
    }
}

fn check_flags(access_flags: u32) -> Result<u32> {
    if access_flags & !ACC_VALID_MASK != 0 {
        return dex_err!(
            QueryMalformed,
            "unknown access flag bits {:#x}",
            access_flags & !ACC_VALID_MASK
        );
    }
    Ok(access_flags)
}

#[derive(Debug)]
pub(crate) struct CompiledClassQuery {
    pub descriptor: Option<Regex>,
    pub source_file: Option<String>,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub access_flags: u32,
    pub annotation: Option<Regex>,
    pub strings: Vec<StringMatcher>,
    pub method: Option<Box<CompiledMethodQuery>>,
    pub field: Option<Box<CompiledFieldQuery>>,
}

#[derive(Debug)]
pub(crate) struct CompiledMethodQuery {
    pub declaring_class: Option<Box<CompiledClassQuery>>,
    pub name: Option<Regex>,
    pub match_shorty: Option<String>,
    pub return_type: Option<String>,
    pub param_types: Option<Vec<Option<String>>>,
    pub access_flags: u32,
    pub annotation: Option<Regex>,
    pub strings: Vec<StringMatcher>,
    pub using_fields: Vec<CompiledFieldUsageQuery>,
    pub invokes: Option<Box<CompiledMethodQuery>>,
    pub called_by: Option<Box<CompiledMethodQuery>>,
    pub op_codes: Vec<u8>,
}

#[derive(Debug)]
pub(crate) struct CompiledFieldUsageQuery {
    pub field: CompiledFieldQuery,
    pub access: Option<FieldAccess>,
}

#[derive(Debug)]
pub(crate) struct CompiledFieldQuery {
    pub declaring_class: Option<Box<CompiledClassQuery>>,
    pub name: Option<Regex>,
    pub type_descriptor: Option<String>,
    pub access_flags: u32,
    pub annotation: Option<Regex>,
    pub read_by: Option<Box<CompiledMethodQuery>>,
    pub written_by: Option<Box<CompiledMethodQuery>>,
}

impl ClassQuery {
    pub(crate) fn compile(&self) -> Result<CompiledClassQuery> {
        Ok(CompiledClassQuery {
            descriptor: compile_regex(&self.descriptor)?,
            source_file: self.source_file.clone(),
            superclass: self.superclass.clone(),
            interfaces: self.interfaces.clone(),
            access_flags: check_flags(self.access_flags)?,
            annotation: compile_regex(&self.annotation)?,
            strings: self.using_strings.iter().map(|s| StringMatcher::parse(s)).collect(),
            method: match &self.method {
                Some(q) => Some(Box::new(q.compile()?)),
                None => None,
            },
            field: match &self.field {
                Some(q) => Some(Box::new(q.compile()?)),
                None => None,
            },
        })
    }
}

impl MethodQuery {
    pub(crate) fn compile(&self) -> Result<CompiledMethodQuery> {
        // shorty prefilter only once both shape parts are exact enough to
        // bound the arity
        let match_shorty = self.param_types.as_ref().map(|params| {
            crate::desc_names::to_match_shorty(self.return_type.as_deref(), params)
        });
        Ok(CompiledMethodQuery {
            declaring_class: match &self.declaring_class {
                Some(q) => Some(Box::new(q.compile()?)),
                None => None,
            },
            name: compile_regex(&self.name)?,
            match_shorty,
            return_type: self.return_type.clone(),
            param_types: self.param_types.clone(),
            access_flags: check_flags(self.access_flags)?,
            annotation: compile_regex(&self.annotation)?,
            strings: self.using_strings.iter().map(|s| StringMatcher::parse(s)).collect(),
            using_fields: self
                .using_fields
                .iter()
                .map(|usage| {
                    Ok(CompiledFieldUsageQuery {
                        field: usage.field.compile()?,
                        access: usage.access,
                    })
                })
                .collect::<Result<Vec<_>>>()?,
            invokes: match &self.invokes {
                Some(q) => Some(Box::new(q.compile()?)),
                None => None,
            },
            called_by: match &self.called_by {
                Some(q) => Some(Box::new(q.compile()?)),
                None => None,
            },
            op_codes: self.op_codes.clone(),
        })
    }
}

impl FieldQuery {
    pub(crate) fn compile(&self) -> Result<CompiledFieldQuery> {
        Ok(CompiledFieldQuery {
            declaring_class: match &self.declaring_class {
                Some(q) => Some(Box::new(q.compile()?)),
                None => None,
            },
            name: compile_regex(&self.name)?,
            type_descriptor: self.type_descriptor.clone(),
            access_flags: check_flags(self.access_flags)?,
            annotation: compile_regex(&self.annotation)?,
            read_by: match &self.read_by {
                Some(q) => Some(Box::new(q.compile()?)),
                None => None,
            },
            written_by: match &self.written_by {
                Some(q) => Some(Box::new(q.compile()?)),
                None => None,
            },
        })
    }
}

// ---------------------------------------------------------------------------
// pattern instance sets (batch scans)
// ---------------------------------------------------------------------------

/// All patterns of a batch query compiled into one automaton. Identical
/// pattern texts share one trie entry; each anchored instance keeps its own
/// id so the anchor post-filter can accept them independently.
pub(crate) struct MatcherSet {
    trie: AhoCorasickDoubleArrayTrie<u32>,
    instances: Vec<StringMatcher>,
    text_instances: Vec<Vec<u32>>,
}

impl MatcherSet {
    pub fn build(instances: Vec<StringMatcher>) -> MatcherSet {
        let mut texts: Vec<(String, u32)> = Vec::new();
        let mut text_instances: Vec<Vec<u32>> = Vec::new();
        for (instance_id, matcher) in instances.iter().enumerate() {
            match texts.iter().position(|(text, _)| *text == matcher.pattern) {
                Some(text_id) => text_instances[text_id].push(instance_id as u32),
                None => {
                    texts.push((matcher.pattern.clone(), texts.len() as u32));
                    text_instances.push(vec![instance_id as u32]);
                }
            }
        }
        MatcherSet {
            trie: AhoCorasickDoubleArrayTrie::new(texts),
            instances,
            text_instances,
        }
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Runs the automaton over one haystack, marking every anchored
    /// instance that matches in `hits`.
    pub fn scan_into(&self, haystack: &str, hits: &mut [bool]) {
        let len = haystack.len();
        self.trie.parse_text_with(haystack, |begin, end, &text_id| {
            for &instance_id in &self.text_instances[text_id as usize] {
                if !hits[instance_id as usize]
                    && self.instances[instance_id as usize].accepts_span(begin, end, len)
                {
                    hits[instance_id as usize] = true;
                }
            }
            true
        });
    }

    /// Fresh hit vector for `scan_into`.
    pub fn new_hits(&self) -> Vec<bool> {
        vec![false; self.instances.len()]
    }
}
