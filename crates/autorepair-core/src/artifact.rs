//! Auditable session artifacts with digest verification.
//!
//! Layout: `<dir>/<session_id>/session.json` and
//! `<dir>/<session_id>/session.digest` (SHA-256 hex of the JSON bytes).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{RepairError, Result};
use crate::orchestrator::SessionSummary;

const ARTIFACT_FILE: &str = "session.json";
const DIGEST_FILE: &str = "session.digest";

fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Persist `summary` under `dir`; returns the JSON path.
pub fn write_session_artifact(summary: &SessionSummary, dir: &Path) -> Result<PathBuf> {
    let session_dir = dir.join(&summary.session_id);
    std::fs::create_dir_all(&session_dir)?;

    let artifact_path = session_dir.join(ARTIFACT_FILE);
    let json = serde_json::to_vec_pretty(summary)?;

    std::fs::write(&artifact_path, &json)?;
    std::fs::write(session_dir.join(DIGEST_FILE), digest_hex(&json).as_bytes())?;

    Ok(artifact_path)
}

/// Read `<dir>/<session_id>/session.json` and verify its digest.
pub fn read_session_artifact(session_id: &str, dir: &Path) -> Result<SessionSummary> {
    let session_dir = dir.join(session_id);
    let json = std::fs::read(session_dir.join(ARTIFACT_FILE))?;
    let expected = std::fs::read_to_string(session_dir.join(DIGEST_FILE))?;
    let actual = digest_hex(&json);

    if expected.trim() != actual {
        return Err(RepairError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }

    Ok(serde_json::from_slice(&json)?)
}
