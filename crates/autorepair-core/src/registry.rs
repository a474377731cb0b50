//! File Registry: filename -> lexical metadata for every source file.
//!
//! Entries are always rebuilt wholesale from disk; no field of a
//! [`FileEntry`] is ever updated on its own, so `checksum`, `imports` and
//! `calls` always describe the same `content`.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use crate::config::LanguageProfile;
use crate::error::{RepairError, Result};

static DECLARED_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:class|interface|enum|record)\s+(\w+)").expect("valid declared type regex")
});

static IMPORT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*import\s+(?:static\s+)?([\w.]+)\s*;").expect("valid import regex")
});

static CALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"new\s+(\w+)\s*\(|(\w+)\.").expect("valid call regex"));

/// Lexical metadata for one source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: PathBuf,
    pub content: String,
    /// First declared type, or the filename stem
    pub declared_type: String,
    /// Imported symbols, fully qualified, in source order
    pub imports: Vec<String>,
    /// Locally referenced symbols (instantiations and `X.` receivers)
    pub calls: BTreeSet<String>,
    pub modified_at: SystemTime,
    /// SHA-256 hex of `content`
    pub checksum: String,
}

impl FileEntry {
    /// Read `path` and derive a complete entry.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let modified_at = std::fs::metadata(path)?.modified()?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Self::from_content(path, content, modified_at))
    }

    /// Derive an entry from content already in memory.
    pub fn from_content(path: &Path, content: String, modified_at: SystemTime) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            path: path.to_path_buf(),
            declared_type: declared_type(&content).unwrap_or(stem),
            imports: imports(&content),
            calls: calls(&content),
            checksum: checksum(&content),
            modified_at,
            content,
        }
    }
}

/// SHA-256 hex digest of `content`.
pub fn checksum(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

fn declared_type(content: &str) -> Option<String> {
    DECLARED_TYPE_RE
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn imports(content: &str) -> Vec<String> {
    IMPORT_RE
        .captures_iter(content)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

fn calls(content: &str) -> BTreeSet<String> {
    CALL_RE
        .captures_iter(content)
        .filter_map(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// What a [`Registry::refresh`] pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Files no longer on disk
    pub pruned: Vec<String>,
    /// Entries rebuilt because their content changed
    pub rebuilt: Vec<String>,
    /// Entries whose mtime moved but whose checksum did not
    pub touched: Vec<String>,
}

impl RefreshSummary {
    pub fn is_noop(&self) -> bool {
        self.pruned.is_empty() && self.rebuilt.is_empty()
    }
}

/// Filename -> [`FileEntry`] for one project tree.
///
/// Filenames are assumed unique within a project; on collision the first
/// path in walk order wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    root: PathBuf,
    language: LanguageProfile,
    entries: BTreeMap<String, FileEntry>,
}

impl Registry {
    /// Walk `root` and index every file with the language's extension.
    pub fn build(root: &Path, language: &LanguageProfile) -> Result<Self> {
        if !root.is_dir() {
            return Err(RepairError::Discovery(format!(
                "project root {} does not exist",
                root.display()
            )));
        }

        let mut entries: BTreeMap<String, FileEntry> = BTreeMap::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable path");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            if !language.matches(&filename) {
                continue;
            }
            if let Some(existing) = entries.get(&filename) {
                warn!(
                    filename = %filename,
                    kept = %existing.path.display(),
                    ignored = %entry.path().display(),
                    "duplicate filename in project"
                );
                continue;
            }

            match FileEntry::from_path(entry.path()) {
                Ok(file_entry) => {
                    entries.insert(filename, file_entry);
                }
                Err(e) => warn!(path = %entry.path().display(), error = %e, "cannot read source file"),
            }
        }

        debug!(root = %root.display(), files = entries.len(), "registry built");
        Ok(Self {
            root: root.to_path_buf(),
            language: language.clone(),
            entries,
        })
    }

    /// Bring the registry in line with the disk.
    ///
    /// Missing files are pruned. A changed mtime triggers a re-hash; only a
    /// changed checksum rebuilds the entry. Entries whose mtime is unchanged
    /// are not re-read.
    pub fn refresh(&mut self) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        let names: Vec<String> = self.entries.keys().cloned().collect();

        for name in names {
            let Some(entry) = self.entries.get(&name) else {
                continue;
            };
            let (path, stored_mtime, stored_checksum) =
                (entry.path.clone(), entry.modified_at, entry.checksum.clone());

            let modified_at = match std::fs::metadata(&path).and_then(|m| m.modified()) {
                Ok(mtime) => mtime,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.entries.remove(&name);
                    summary.pruned.push(name);
                    continue;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot stat source file");
                    continue;
                }
            };
            if modified_at == stored_mtime {
                continue;
            }

            match FileEntry::from_path(&path) {
                Ok(fresh) if fresh.checksum != stored_checksum => {
                    self.entries.insert(name.clone(), fresh);
                    summary.rebuilt.push(name);
                }
                Ok(_) => summary.touched.push(name),
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    self.entries.remove(&name);
                    summary.pruned.push(name);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "cannot read source file"),
            }
        }

        if !summary.is_noop() {
            debug!(
                pruned = summary.pruned.len(),
                rebuilt = summary.rebuilt.len(),
                "registry refreshed"
            );
        }
        summary
    }

    /// Re-derive one entry from disk after it has been written.
    pub(crate) fn rebuild_entry(&mut self, filename: &str) -> std::io::Result<()> {
        let Some(path) = self.entries.get(filename).map(|e| e.path.clone()) else {
            return Ok(());
        };
        let fresh = FileEntry::from_path(&path)?;
        self.entries.insert(filename.to_string(), fresh);
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn language(&self) -> &LanguageProfile {
        &self.language
    }

    pub fn get(&self, filename: &str) -> Option<&FileEntry> {
        self.entries.get(filename)
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.entries.contains_key(filename)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Filenames in sorted order.
    pub fn filenames(&self) -> BTreeSet<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileEntry)> {
        self.entries.iter()
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}
