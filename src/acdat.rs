//! Aho–Corasick automaton compressed into a double-array trie.
//!
//! Layout: `base`/`check` hold the trie (`base[s] + c + 1 == p` with
//! `check[p] == base[s]` witnessing a child edge on byte `c`), `fail` holds
//! failure links per state, `output[s]` lists the pattern ids whose suffix
//! ends at `s`, and `values`/`lengths` carry the per-pattern payload and
//! byte length. Matching operates on unsigned bytes; callers canonicalize
//! case and encoding before building.
//!
//! Accepting trie nodes get a virtual child on the reserved code `0`, whose
//! slot stores `-(pattern id) - 1` in `base`; the exact-match fast path
//! follows plain trie edges and reads terminal acceptance out of that slot.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// A single match: `value` is the payload of the pattern covering
/// `text[begin..end]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit<V> {
    pub begin: usize,
    pub end: usize,
    pub value: V,
}

pub struct AhoCorasickDoubleArrayTrie<V> {
    base: Vec<i32>,
    check: Vec<i32>,
    fail: Vec<u32>,
    output: Vec<Vec<u32>>,
    values: Vec<V>,
    lengths: Vec<usize>,
}

impl<V: Clone> AhoCorasickDoubleArrayTrie<V> {
    /// Builds the automaton from `(pattern, payload)` entries. Pattern ids
    /// are assigned in entry order; empty patterns are skipped.
    pub fn new<K: AsRef<[u8]>>(entries: Vec<(K, V)>) -> Self {
        let mut builder = Builder::new();
        for (key, value) in entries {
            builder.add_keyword(key.as_ref(), value);
        }
        builder.build()
    }

    /// Number of stored patterns.
    pub fn pattern_count(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Payload of a pattern id.
    pub fn value_at(&self, pattern_id: usize) -> &V {
        &self.values[pattern_id]
    }

    /// Collects every hit in `text`.
    pub fn parse_text(&self, text: impl AsRef<[u8]>) -> Vec<Hit<V>> {
        let mut hits = Vec::new();
        self.parse_text_with(text, |begin, end, value| {
            hits.push(Hit {
                begin,
                end,
                value: value.clone(),
            });
            true
        });
        hits
    }

    /// Streams hits into `predicate`; the scan stops once it returns
    /// `false`.
    pub fn parse_text_with<F>(&self, text: impl AsRef<[u8]>, mut predicate: F)
    where
        F: FnMut(usize, usize, &V) -> bool,
    {
        if self.is_empty() {
            return;
        }
        let mut state = 0u32;
        for (i, &c) in text.as_ref().iter().enumerate() {
            let position = i + 1;
            state = self.next_state(state, c);
            for &pid in &self.output[state as usize] {
                let pid = pid as usize;
                if !predicate(position - self.lengths[pid], position, &self.values[pid]) {
                    return;
                }
            }
        }
    }

    /// True when any pattern occurs in `text`.
    pub fn matches(&self, text: impl AsRef<[u8]>) -> bool {
        if self.is_empty() {
            return false;
        }
        let mut state = 0u32;
        for &c in text.as_ref().iter() {
            state = self.next_state(state, c);
            if !self.output[state as usize].is_empty() {
                return true;
            }
        }
        false
    }

    /// First hit in `text`, if any.
    pub fn find_first(&self, text: impl AsRef<[u8]>) -> Option<Hit<V>> {
        let mut first = None;
        self.parse_text_with(text, |begin, end, value| {
            first = Some(Hit {
                begin,
                end,
                value: value.clone(),
            });
            false
        });
        first
    }

    /// Pattern id of `key` iff `key` is exactly a stored pattern. Follows
    /// only trie edges, no failure links.
    pub fn exact_match(&self, key: impl AsRef<[u8]>) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let mut b = self.base[0];
        for &c in key.as_ref().iter() {
            let p = b + c as i32 + 1;
            if p < 0 || p as usize >= self.check.len() || self.check[p as usize] != b {
                return None;
            }
            b = self.base[p as usize];
        }
        // terminal acceptance lives behind the virtual `\0` edge
        let p = b;
        if p < 0 || p as usize >= self.check.len() || self.check[p as usize] != b {
            return None;
        }
        match self.base[p as usize] {
            n if n < 0 => Some((-n - 1) as usize),
            _ => None,
        }
    }

    /// Payload of `key` iff `key` is exactly a stored pattern.
    pub fn get(&self, key: impl AsRef<[u8]>) -> Option<&V> {
        self.exact_match(key).map(|pid| &self.values[pid])
    }

    /// Success transition with failure fallback; the root absorbs bytes it
    /// has no edge for.
    #[inline]
    fn next_state(&self, mut current: u32, c: u8) -> u32 {
        loop {
            match self.transition_with_root(current, c) {
                Some(next) => return next,
                None => current = self.fail[current as usize],
            }
        }
    }

    #[inline]
    fn transition_with_root(&self, node_pos: u32, c: u8) -> Option<u32> {
        let b = self.base[node_pos as usize];
        let p = b + c as i32 + 1;
        if p >= 0 && (p as usize) < self.check.len() && self.check[p as usize] == b {
            return Some(p as u32);
        }
        if node_pos == 0 {
            return Some(0);
        }
        None
    }
}

// ---------------------------------------------------------------------------
// builder
// ---------------------------------------------------------------------------

/// Transient trie node in the build arena. Links are arena ids, not
/// pointers; the arena is dropped once the double array is packed.
struct TrieNode {
    depth: i32,
    success: BTreeMap<u8, u32>,
    failure: u32,
    emits: BTreeSet<u32>,
    index: i32,
}

impl TrieNode {
    fn new(depth: i32) -> Self {
        TrieNode {
            depth,
            success: BTreeMap::new(),
            failure: 0,
            emits: BTreeSet::new(),
            index: 0,
        }
    }

    fn largest_emit(&self) -> Option<u32> {
        self.emits.iter().next_back().copied()
    }

    fn is_acceptable(&self) -> bool {
        self.depth > 0 && !self.emits.is_empty()
    }
}

struct Builder<V> {
    nodes: Vec<TrieNode>,
    base: Vec<i32>,
    check: Vec<i32>,
    used: Vec<bool>,
    size: usize,
    next_check_pos: usize,
    values: Vec<V>,
    lengths: Vec<usize>,
}

const ROOT: u32 = 0;

impl<V: Clone> Builder<V> {
    fn new() -> Self {
        Builder {
            nodes: vec![TrieNode::new(0)],
            base: Vec::new(),
            check: Vec::new(),
            used: Vec::new(),
            size: 0,
            next_check_pos: 0,
            values: Vec::new(),
            lengths: Vec::new(),
        }
    }

    fn add_keyword(&mut self, key: &[u8], value: V) {
        if key.is_empty() {
            return;
        }
        let pattern_id = self.values.len() as u32;
        let mut current = ROOT;
        for &c in key {
            current = self.add_state(current, c);
        }
        self.nodes[current as usize].emits.insert(pattern_id);
        self.values.push(value);
        self.lengths.push(key.len());
    }

    fn add_state(&mut self, parent: u32, c: u8) -> u32 {
        if let Some(&child) = self.nodes[parent as usize].success.get(&c) {
            return child;
        }
        let child = self.nodes.len() as u32;
        let depth = self.nodes[parent as usize].depth + 1;
        self.nodes.push(TrieNode::new(depth));
        self.nodes[parent as usize].success.insert(c, child);
        child
    }

    fn build(mut self) -> AhoCorasickDoubleArrayTrie<V> {
        if self.values.is_empty() {
            return AhoCorasickDoubleArrayTrie {
                base: vec![0],
                check: vec![0],
                fail: vec![0],
                output: vec![Vec::new()],
                values: self.values,
                lengths: self.lengths,
            };
        }

        self.ensure_capacity(65_536);
        self.base[0] = 1;

        let siblings = self.fetch(ROOT);
        self.insert(&siblings);

        let (fail, output) = self.construct_failure_states();

        self.base.truncate(self.size.max(1));
        self.check.truncate(self.size.max(1));
        AhoCorasickDoubleArrayTrie {
            base: self.base,
            check: self.check,
            fail,
            output,
            values: self.values,
            lengths: self.lengths,
        }
    }

    /// Children of `parent` as `(code, node)` pairs in code order. Codes are
    /// `byte + 1`; an accepting parent contributes a virtual leaf on code
    /// `0` carrying its largest pattern id.
    fn fetch(&mut self, parent: u32) -> Vec<(usize, u32)> {
        let mut siblings = Vec::with_capacity(self.nodes[parent as usize].success.len() + 1);
        if self.nodes[parent as usize].is_acceptable() {
            let depth = self.nodes[parent as usize].depth;
            let largest = self.nodes[parent as usize].largest_emit();
            let fake = self.nodes.len() as u32;
            let mut fake_node = TrieNode::new(-(depth + 1));
            if let Some(id) = largest {
                fake_node.emits.insert(id);
            }
            self.nodes.push(fake_node);
            siblings.push((0, fake));
        }
        let children: Vec<(usize, u32)> = self.nodes[parent as usize]
            .success
            .iter()
            .map(|(&c, &node)| (c as usize + 1, node))
            .collect();
        siblings.extend(children);
        siblings
    }

    /// Places a sibling block under a shared `base`, advancing the
    /// candidate on collision, then descends.
    fn insert(&mut self, siblings: &[(usize, u32)]) -> i32 {
        let first_code = siblings[0].0;
        let last_code = siblings[siblings.len() - 1].0;
        // candidate slots start past first_code so that begin stays >= 1;
        // zero in check[] means unused
        let mut pos = (first_code + 1).max(self.next_check_pos) - 1;
        let mut nonzero_num = 0usize;
        let mut first = true;
        let begin;

        'outer: loop {
            pos += 1;
            self.ensure_capacity(pos + 1);
            if self.check[pos] != 0 {
                nonzero_num += 1;
                continue;
            } else if first {
                self.next_check_pos = pos;
                first = false;
            }

            let candidate = pos - first_code;
            self.ensure_capacity(candidate + last_code + 1);
            if self.used[candidate] {
                continue;
            }
            for &(code, _) in &siblings[1..] {
                if self.check[candidate + code] != 0 {
                    continue 'outer;
                }
            }
            begin = candidate;
            break;
        }

        // heuristic from darts: skip a mostly-occupied prefix next time
        if nonzero_num as f64 / (pos - self.next_check_pos + 1) as f64 >= 0.95 {
            self.next_check_pos = pos;
        }
        self.used[begin] = true;
        self.size = self.size.max(begin + last_code + 1);

        for &(code, _) in siblings {
            self.check[begin + code] = begin as i32;
        }
        for &(code, node) in siblings {
            let children = self.fetch(node);
            if children.is_empty() {
                let id = self.nodes[node as usize].largest_emit().unwrap_or(0);
                self.base[begin + code] = -(id as i32) - 1;
            } else {
                let child_begin = self.insert(&children);
                self.base[begin + code] = child_begin;
            }
            self.nodes[node as usize].index = (begin + code) as i32;
        }
        begin as i32
    }

    /// Breadth-first failure computation: depth-1 states fail to the root,
    /// deeper states to the longest proper suffix state, unioning its
    /// output.
    fn construct_failure_states(&mut self) -> (Vec<u32>, Vec<Vec<u32>>) {
        let mut fail = vec![0u32; self.size.max(1)];
        let mut output: Vec<Vec<u32>> = vec![Vec::new(); self.size.max(1)];
        let mut queue = VecDeque::new();

        let root_children: Vec<u32> = self.nodes[ROOT as usize].success.values().copied().collect();
        for child in root_children {
            self.nodes[child as usize].failure = ROOT;
            fail[self.nodes[child as usize].index as usize] = 0;
            Self::record_output(&self.nodes[child as usize], &mut output);
            queue.push_back(child);
        }

        while let Some(current) = queue.pop_front() {
            let transitions: Vec<(u8, u32)> = self.nodes[current as usize]
                .success
                .iter()
                .map(|(&c, &node)| (c, node))
                .collect();
            for (c, target) in transitions {
                queue.push_back(target);

                let mut trace = self.nodes[current as usize].failure;
                let new_failure = loop {
                    match self.trie_next(trace, c) {
                        Some(next) => break next,
                        None => trace = self.nodes[trace as usize].failure,
                    }
                };

                self.nodes[target as usize].failure = new_failure;
                fail[self.nodes[target as usize].index as usize] =
                    self.nodes[new_failure as usize].index as u32;

                let inherited: Vec<u32> = self.nodes[new_failure as usize]
                    .emits
                    .iter()
                    .copied()
                    .collect();
                self.nodes[target as usize].emits.extend(inherited);
                Self::record_output(&self.nodes[target as usize], &mut output);
            }
        }
        (fail, output)
    }

    /// Trie transition used during failure construction; the root falls
    /// back to itself.
    fn trie_next(&self, node: u32, c: u8) -> Option<u32> {
        match self.nodes[node as usize].success.get(&c) {
            Some(&next) => Some(next),
            None if self.nodes[node as usize].depth == 0 => Some(node),
            None => None,
        }
    }

    /// Emits in descending pattern-id order.
    fn record_output(node: &TrieNode, output: &mut [Vec<u32>]) {
        if !node.emits.is_empty() {
            output[node.index as usize] = node.emits.iter().rev().copied().collect();
        }
    }

    fn ensure_capacity(&mut self, n: usize) {
        if n > self.base.len() {
            let new_len = n.max(self.base.len() * 2);
            self.base.resize(new_len, 0);
            self.check.resize(new_len, 0);
            self.used.resize(new_len, false);
        }
    }
}
