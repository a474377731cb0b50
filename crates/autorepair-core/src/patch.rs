//! Patch application: multi-file fix responses -> files on disk.
//!
//! A response is a sequence of blocks:
//!
//! ````text
//! FILENAME: OrderService.java
//! ```java
//! <complete file content>
//! ```
//! ````
//!
//! Only files already in the relevant set are ever written. Each write is
//! preceded by a `<path>.backup_<timestamp>` snapshot and done atomically.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::LanguageProfile;
use crate::localize::RelevantSet;
use crate::metrics::METRICS;
use crate::obs;
use crate::registry::Registry;

const FENCE: &str = "```";
const MARKER_PREFIX: &str = "FILENAME:";

/// One file block extracted from a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedFile {
    /// Filename as written by the oracle
    pub filename: String,
    pub content: String,
}

/// A block that was parsed but not written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchWarning {
    /// The block names a file outside the working set
    UnknownFileSuggested { filename: String },
    /// A code block appeared with no filename before it
    OrphanCodeBlock { line: usize },
    /// The response ended inside a code block
    UnterminatedCodeBlock { filename: String },
    /// Backup or write failed; the file is unchanged
    WriteFailed { filename: String, reason: String },
}

impl fmt::Display for PatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchWarning::UnknownFileSuggested { filename } => {
                write!(f, "oracle suggested unknown file {filename}; skipped")
            }
            PatchWarning::OrphanCodeBlock { line } => {
                write!(f, "code block at line {line} has no filename; skipped")
            }
            PatchWarning::UnterminatedCodeBlock { filename } => {
                write!(f, "code block for {filename} is not terminated; skipped")
            }
            PatchWarning::WriteFailed { filename, reason } => {
                write!(f, "failed to write {filename}: {reason}")
            }
        }
    }
}

/// A file that was backed up and overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedPatch {
    /// Registry key of the written file
    pub filename: String,
    pub path: PathBuf,
    pub backup_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOutcome {
    pub applied: Vec<AppliedPatch>,
    pub warnings: Vec<PatchWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    AwaitingFilename,
    AwaitingFence,
    InCodeBlock,
    /// Inside a code block that had no filename
    SkippingBlock,
}

/// Filename carried by a marker line, if `line` is one.
///
/// Accepts `FILENAME: <name>` (markdown emphasis and backticks are
/// stripped) or a line holding nothing but a path with the language
/// extension.
fn marker_filename(line: &str, language: &LanguageProfile) -> Option<String> {
    let decorations: &[char] = &['*', '`', '#', ' ', '[', ']'];
    let trimmed = line.trim().trim_matches(decorations);

    if trimmed
        .get(..MARKER_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(MARKER_PREFIX))
    {
        let name = trimmed[MARKER_PREFIX.len()..].trim().trim_matches(decorations);
        return (!name.is_empty()).then(|| name.to_string());
    }

    if trimmed.starts_with(FENCE) {
        return None;
    }
    // A bare marker is a lone path; prose that mentions a file is not.
    let mut tokens = trimmed.split_whitespace();
    let path = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }
    language.matches(path).then(|| path.to_string())
}

/// Split a response into file blocks.
///
/// Warnings cover orphan and unterminated blocks; matching against real
/// files happens in [`apply`].
pub fn parse_blocks(
    response: &str,
    language: &LanguageProfile,
) -> (Vec<ProposedFile>, Vec<PatchWarning>) {
    let mut blocks = Vec::new();
    let mut warnings = Vec::new();
    let mut state = ParseState::AwaitingFilename;
    let mut pending: Option<String> = None;
    let mut code: Vec<&str> = Vec::new();

    for (idx, raw) in response.lines().enumerate() {
        let is_fence = raw.trim_start().starts_with(FENCE);

        match state {
            ParseState::InCodeBlock => {
                if is_fence {
                    if let Some(filename) = pending.take() {
                        blocks.push(ProposedFile {
                            filename,
                            content: code.join("\n"),
                        });
                    }
                    code.clear();
                    state = ParseState::AwaitingFilename;
                } else {
                    code.push(raw);
                }
            }
            ParseState::SkippingBlock => {
                if is_fence {
                    state = ParseState::AwaitingFilename;
                }
            }
            ParseState::AwaitingFilename | ParseState::AwaitingFence => {
                if is_fence {
                    if pending.is_some() {
                        state = ParseState::InCodeBlock;
                    } else {
                        warnings.push(PatchWarning::OrphanCodeBlock { line: idx + 1 });
                        state = ParseState::SkippingBlock;
                    }
                } else if let Some(name) = marker_filename(raw, language) {
                    pending = Some(name);
                    state = ParseState::AwaitingFence;
                }
            }
        }
    }

    if state == ParseState::InCodeBlock {
        if let Some(filename) = pending {
            warnings.push(PatchWarning::UnterminatedCodeBlock { filename });
        }
    }

    (blocks, warnings)
}

/// Apply every block of `response` that matches a file in `relevant`.
///
/// Matched files are backed up, overwritten atomically and their registry
/// entries rebuilt. Anything else becomes a warning; this never fails and
/// never creates a file.
pub fn apply(response: &str, relevant: &RelevantSet, registry: &mut Registry) -> PatchOutcome {
    let (blocks, mut warnings) = parse_blocks(response, registry.language());
    let mut applied = Vec::new();

    for block in blocks {
        let Some(filename) = relevant.match_basename(&block.filename).map(str::to_string) else {
            warnings.push(PatchWarning::UnknownFileSuggested {
                filename: block.filename,
            });
            continue;
        };
        let Some(path) = registry.get(&filename).map(|e| e.path.clone()) else {
            warnings.push(PatchWarning::UnknownFileSuggested {
                filename: block.filename,
            });
            continue;
        };

        match write_with_backup(&path, &block.content) {
            Ok(backup_path) => {
                if let Err(e) = registry.rebuild_entry(&filename) {
                    warnings.push(PatchWarning::WriteFailed {
                        filename: filename.clone(),
                        reason: format!("written but not re-indexed: {e}"),
                    });
                }
                debug!(filename = %filename, bytes = block.content.len(), "patch written");
                obs::emit_patch_applied(&filename, &backup_path);
                METRICS.inc_patches_applied();
                applied.push(AppliedPatch {
                    filename,
                    path,
                    backup_path,
                });
            }
            Err(e) => warnings.push(PatchWarning::WriteFailed {
                filename,
                reason: e.to_string(),
            }),
        }
    }

    for warning in &warnings {
        obs::emit_patch_skipped(warning);
    }

    PatchOutcome { applied, warnings }
}

fn write_with_backup(path: &Path, content: &str) -> std::io::Result<PathBuf> {
    let backup_path = create_backup(path)?;
    write_atomic(path, content.as_bytes())?;
    Ok(backup_path)
}

/// Copy `path` to `<path>.backup_<YYYYmmdd_HHMMSS>`, adding `_<n>` when
/// that name is already taken.
pub fn create_backup(path: &Path) -> std::io::Result<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let base = format!("{}.backup_{stamp}", path.display());

    let mut candidate = PathBuf::from(&base);
    let mut n = 1u32;
    while candidate.exists() {
        candidate = PathBuf::from(format!("{base}_{n}"));
        n += 1;
    }

    fs::copy(path, &candidate)?;
    Ok(candidate)
}

/// Replace `path` with `data` via a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let permissions = fs::metadata(path).ok().map(|m| m.permissions());

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    if let Some(permissions) = permissions {
        tmp.as_file().set_permissions(permissions)?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
