//! Structured observability hooks for the repair session lifecycle.
//!
//! - `SessionSpan` RAII guard scoping all events to one session
//! - `emit_*` functions with stable `event = ".."` names
//!
//! Events are emitted at `info!` level except failures, which use `warn!`.

use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

/// RAII guard that enters a session-scoped tracing span.
///
/// ```ignore
/// let _span = SessionSpan::enter("3f0c...");
/// // every event below carries session_id
/// ```
pub struct SessionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SessionSpan {
    pub fn enter(session_id: &str) -> Self {
        let span = tracing::info_span!("autorepair.session", session_id = %session_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_session_started(session_id: &str, project_root: &Path, starting_retries: u32) {
    info!(
        event = "session.started",
        session_id = %session_id,
        project_root = %project_root.display(),
        starting_retries = starting_retries,
    );
}

pub fn emit_session_finished(session_id: &str, phase: &str, retries: u32, elapsed: Duration) {
    info!(
        event = "session.finished",
        session_id = %session_id,
        phase = %phase,
        retries = retries,
        duration_ms = duration_ms(elapsed),
    );
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub fn duration_ms(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Emit event: fault localization finished.
pub fn emit_localize_completed(seeds: usize, selected: usize, depth: usize, fail_open: bool) {
    info!(
        event = "localize.completed",
        seeds = seeds,
        selected = selected,
        depth = depth,
        fail_open = fail_open,
    );
}

pub fn emit_patch_applied(filename: &str, backup_path: &Path) {
    info!(
        event = "patch.applied",
        filename = %filename,
        backup = %backup_path.display(),
    );
}

/// Emit event: a proposed block was not written.
pub fn emit_patch_skipped(reason: &dyn std::fmt::Display) {
    warn!(event = "patch.skipped", reason = %reason);
}

pub fn emit_validation_stage_completed(stage: &str, degraded: bool) {
    info!(
        event = "validation.stage_completed",
        stage = %stage,
        degraded = degraded,
    );
}

pub fn emit_validation_decided(decision: &str, failure_reasons: usize) {
    info!(
        event = "validation.decided",
        decision = %decision,
        failure_reasons = failure_reasons,
    );
}

pub fn emit_rollback_restored(filename: &str, path: &Path) {
    info!(
        event = "rollback.restored",
        filename = %filename,
        path = %path.display(),
    );
}

pub fn emit_rollback_restore_failed(filename: &str, error: &dyn std::fmt::Display) {
    warn!(event = "rollback.restore_failed", filename = %filename, error = %error);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_span_and_events_do_not_panic() {
        let _span = SessionSpan::enter("test-session");
        emit_session_started("test-session", Path::new("/tmp/project"), 0);
        emit_patch_skipped(&"unknown file Bar.java");
        emit_rollback_restore_failed("Foo.java", &"permission denied");
        emit_session_finished("test-session", "DEPLOYED", 0, Duration::from_millis(12));
    }

    #[test]
    fn test_duration_ms_saturates() {
        assert_eq!(duration_ms(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
    }
}
