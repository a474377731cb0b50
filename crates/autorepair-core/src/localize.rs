//! Fault localization: error text -> the files worth showing the oracle.
//!
//! Seeds come from stack-frame lines (`at pkg.Type.method(Type.java:42)`),
//! including constructor, static-initializer and module-prefixed frames.
//! The seed set is expanded breadth-first over `imports` and `calls`, one
//! frontier per round, for `depth` rounds. With no usable seeds every file
//! is selected.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::LanguageProfile;
use crate::obs;
use crate::registry::{FileEntry, Registry};

static STACK_FRAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bat\s+[\w.$<>/@-]+\((\w+\.\w+):\d+\)").expect("valid stack frame regex")
});

/// Filenames mentioned in stack frames of `error_text` for this language.
pub fn extract_seed_filenames(error_text: &str, language: &LanguageProfile) -> BTreeSet<String> {
    STACK_FRAME_RE
        .captures_iter(error_text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|name| language.matches(name))
        .collect()
}

/// Map a referenced symbol to the filename that would declare it.
///
/// `com.acme.Order` and `Order` both map to `Order.java`.
pub fn symbol_to_filename(symbol: &str, language: &LanguageProfile) -> String {
    if language.matches(symbol) {
        return symbol.to_string();
    }
    let simple = symbol.rsplit('.').next().unwrap_or(symbol);
    language.filename_for(simple)
}

/// Expand `seeds` over the reference graph for `depth` rounds.
///
/// Only files added in the previous round are expanded in the next one.
/// Seeds absent from the registry are dropped from the result.
pub fn fan_out(seeds: &BTreeSet<String>, registry: &Registry, depth: usize) -> BTreeSet<String> {
    let language = registry.language();
    let mut expanded: BTreeSet<String> = seeds
        .iter()
        .filter(|s| registry.contains(s))
        .cloned()
        .collect();
    let mut frontier = expanded.clone();

    for _ in 0..depth {
        if frontier.is_empty() {
            break;
        }
        let mut next = BTreeSet::new();
        for filename in &frontier {
            let Some(entry) = registry.get(filename) else {
                continue;
            };
            for symbol in entry.imports.iter().chain(entry.calls.iter()) {
                let candidate = symbol_to_filename(symbol, language);
                if registry.contains(&candidate) && !expanded.contains(&candidate) {
                    next.insert(candidate);
                }
            }
        }
        expanded.extend(next.iter().cloned());
        frontier = next;
    }

    expanded
}

/// Select the relevant filenames for `error_text`.
pub fn localize(error_text: &str, registry: &Registry, depth: usize) -> BTreeSet<String> {
    let seeds: BTreeSet<String> = extract_seed_filenames(error_text, registry.language())
        .into_iter()
        .filter(|s| registry.contains(s))
        .collect();

    if seeds.is_empty() {
        let all = registry.filenames();
        obs::emit_localize_completed(0, all.len(), depth, true);
        return all;
    }

    let selected = fan_out(&seeds, registry, depth);
    obs::emit_localize_completed(seeds.len(), selected.len(), depth, false);
    selected
}

/// Read-only snapshot of the registry entries chosen for one attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelevantSet {
    entries: BTreeMap<String, FileEntry>,
}

impl RelevantSet {
    /// Snapshot `names` out of `registry`; unknown names are ignored.
    pub fn from_registry<'a, I>(names: I, registry: &Registry) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        let entries = names
            .into_iter()
            .filter_map(|n| registry.get(n).map(|e| (n.clone(), e.clone())))
            .collect();
        Self { entries }
    }

    pub fn get(&self, filename: &str) -> Option<&FileEntry> {
        self.entries.get(filename)
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The key whose base name equals `suggested`'s base name, ignoring case.
    pub fn match_basename(&self, suggested: &str) -> Option<&str> {
        let wanted = basename(suggested).to_lowercase();
        self.entries
            .keys()
            .find(|k| basename(k).to_lowercase() == wanted)
            .map(String::as_str)
    }
}

fn basename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// The last `max_chars` characters of `text`.
pub fn tail_chars(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text;
    }
    let skip = count - max_chars;
    match text.char_indices().nth(skip) {
        Some((idx, _)) => &text[idx..],
        None => "",
    }
}
