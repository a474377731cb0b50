//! Locating the error log and the project it belongs to.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use walkdir::WalkDir;

use crate::config::LanguageProfile;
use crate::error::{RepairError, Result};
use crate::localize::tail_chars;

/// How many ancestors of the log are inspected for a project root.
const MAX_ROOT_ASCENT: usize = 10;

/// Where the error report comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    /// An explicit log file
    File(PathBuf),
    /// Search the project tree for a known log name
    Discover,
}

/// First file under `start_dir` whose name is in `names`.
///
/// Files directly in a directory are preferred over files in its
/// subdirectories; within a directory, `names` order decides.
pub fn discover_error_log(start_dir: &Path, names: &[String]) -> Result<PathBuf> {
    if !start_dir.is_dir() {
        return Err(RepairError::Discovery(format!(
            "project root {} does not exist",
            start_dir.display()
        )));
    }

    let dirs = WalkDir::new(start_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir());

    for dir in dirs {
        for name in names {
            let candidate = dir.path().join(name);
            if candidate.is_file() {
                debug!(path = %candidate.display(), "error log discovered");
                return Ok(candidate);
            }
        }
    }

    Err(RepairError::Discovery(format!(
        "could not locate any of [{}] under {}",
        names.join(", "),
        start_dir.display()
    )))
}

/// Nearest ancestor of `error_log` that looks like a project root.
///
/// A root has a `src/` directory or one of the language's marker files.
/// Falls back to `fallback` when nothing is found within ten levels.
pub fn infer_project_root(error_log: &Path, language: &LanguageProfile, fallback: &Path) -> PathBuf {
    error_log
        .ancestors()
        .skip(1)
        .take(MAX_ROOT_ASCENT)
        .find(|dir| {
            dir.join("src").is_dir() || language.project_markers.iter().any(|m| dir.join(m).is_file())
        })
        .map(Path::to_path_buf)
        .unwrap_or_else(|| fallback.to_path_buf())
}

/// Resolve `source` to a log path.
pub fn resolve_error_log(source: &ErrorSource, project_root: &Path, names: &[String]) -> Result<PathBuf> {
    match source {
        ErrorSource::File(path) if path.is_file() => Ok(path.clone()),
        ErrorSource::File(path) => Err(RepairError::Discovery(format!(
            "error log {} does not exist",
            path.display()
        ))),
        ErrorSource::Discover => discover_error_log(project_root, names),
    }
}

/// Read the log and keep its last `tail` characters.
pub fn read_error_log(path: &Path, tail: usize) -> Result<String> {
    let bytes = std::fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(tail_chars(&text, tail).to_string())
}
