//! Repair Orchestrator: the retry-bounded propose/validate state machine.
//!
//! ```text
//! PROPOSE --(always)--> VALIDATE
//! VALIDATE --DEPLOY--> DEPLOYED
//! VALIDATE --NEEDS_REVIEW--> ESCALATED
//! VALIDATE --REJECT, retries < max--> PROPOSE (retries += 1, feedback)
//! VALIDATE --REJECT, retries >= max--> ABORTED_ROLLED_BACK (restore backups)
//! ```
//!
//! Oracle failures never leave this module as errors; only discovery
//! problems end [`RepairOrchestrator::run`] with `Err`.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use autorepair_oracle::Oracle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::artifact::write_session_artifact;
use crate::config::RepairConfig;
use crate::discovery::{infer_project_root, read_error_log, resolve_error_log, ErrorSource};
use crate::error::Result;
use crate::localize::{localize, RelevantSet};
use crate::metrics::METRICS;
use crate::obs;
use crate::patch::{self, AppliedPatch, PatchWarning};
use crate::proposer::RepairProposer;
use crate::registry::Registry;
use crate::validation::{
    rejection_feedback, render_file_listing, Decision, ValidationInput, ValidationPipeline,
    ValidationVerdict,
};

/// Orchestrator states; the last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepairPhase {
    Propose,
    Validate,
    Deployed,
    Escalated,
    AbortedRolledBack,
}

impl RepairPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RepairPhase::Deployed | RepairPhase::Escalated | RepairPhase::AbortedRolledBack
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RepairPhase::Propose => "PROPOSE",
            RepairPhase::Validate => "VALIDATE",
            RepairPhase::Deployed => "DEPLOYED",
            RepairPhase::Escalated => "ESCALATED",
            RepairPhase::AbortedRolledBack => "ABORTED_ROLLED_BACK",
        }
    }
}

impl fmt::Display for RepairPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where VALIDATE goes for `decision` with the counter at `retries`.
///
/// `DEPLOY` always deploys and `NEEDS_REVIEW` always escalates. `REJECT`
/// loops back while `retries < max_retries` and rolls back otherwise.
pub fn next_phase(decision: Decision, retries: u32, max_retries: u32) -> RepairPhase {
    match decision {
        Decision::Deploy => RepairPhase::Deployed,
        Decision::NeedsReview => RepairPhase::Escalated,
        Decision::Reject if retries >= max_retries => RepairPhase::AbortedRolledBack,
        Decision::Reject => RepairPhase::Propose,
    }
}

/// A file that could not be put back during rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreFailure {
    pub filename: String,
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
    /// Files rewritten with their pristine content
    pub restored: Vec<String>,
    /// Files already identical to their pristine content
    pub unchanged: Vec<String>,
    pub failures: Vec<RestoreFailure>,
}

/// Pristine bytes and location of every file, taken once per session
/// before the first patch.
///
/// Bytes come from disk rather than the registry text, which is decoded
/// lossily and would not round-trip non-UTF-8 sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupMap {
    contents: BTreeMap<String, Vec<u8>>,
    paths: BTreeMap<String, PathBuf>,
}

impl BackupMap {
    pub fn capture(registry: &Registry) -> Self {
        let mut contents = BTreeMap::new();
        let mut paths = BTreeMap::new();
        for (name, entry) in registry.iter() {
            let bytes = match std::fs::read(&entry.path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(
                        path = %entry.path.display(),
                        error = %e,
                        "backup falls back to indexed content"
                    );
                    entry.content.clone().into_bytes()
                }
            };
            contents.insert(name.clone(), bytes);
            paths.insert(name.clone(), entry.path.clone());
        }
        Self { contents, paths }
    }

    pub fn content(&self, filename: &str) -> Option<&[u8]> {
        self.contents.get(filename).map(Vec::as_slice)
    }

    pub fn path(&self, filename: &str) -> Option<&Path> {
        self.paths.get(filename).map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Write every pristine file back. Failures are collected, not raised.
    pub fn restore(&self) -> RollbackReport {
        let mut report = RollbackReport::default();

        for (name, content) in &self.contents {
            let Some(path) = self.paths.get(name) else {
                continue;
            };

            let current = std::fs::read(path).ok();
            if current.as_deref() == Some(content.as_slice()) {
                report.unchanged.push(name.clone());
                continue;
            }

            match patch::write_atomic(path, content) {
                Ok(()) => {
                    obs::emit_rollback_restored(name, path);
                    METRICS.inc_files_restored();
                    report.restored.push(name.clone());
                }
                Err(e) => {
                    obs::emit_rollback_restore_failed(name, &e);
                    report.failures.push(RestoreFailure {
                        filename: name.clone(),
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        report
    }
}

/// One PROPOSE/VALIDATE round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based position within this session
    pub attempt: u32,
    /// Retry counter when the attempt started
    pub retries: u32,
    pub relevant_files: Vec<String>,
    pub applied: Vec<AppliedPatch>,
    pub warnings: Vec<PatchWarning>,
    /// Set when the oracle produced no proposal
    pub proposal_error: Option<String>,
    pub decision: Option<Decision>,
    pub failure_reasons: Vec<String>,
}

/// Inputs of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub project_root: PathBuf,
    pub error_source: ErrorSource,
    /// Not reset by the orchestrator; at or above the ceiling the first
    /// rejection rolls back.
    pub starting_retries: u32,
}

impl SessionRequest {
    /// Discover the error log under `project_root`, starting at zero retries.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            error_source: ErrorSource::Discover,
            starting_retries: 0,
        }
    }

    pub fn with_error_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.error_source = ErrorSource::File(path.into());
        self
    }

    pub fn with_starting_retries(mut self, retries: u32) -> Self {
        self.starting_retries = retries;
        self
    }
}

/// Mutable record threaded through a session.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,
    pub project_root: PathBuf,
    pub error_log: PathBuf,
    /// Tail-truncated error text
    pub error_text: String,
    pub registry: Registry,
    pub relevant: RelevantSet,
    pub backup: Option<BackupMap>,
    pub retries: u32,
    /// Feedback from the last rejection, injected into the next proposal
    pub last_feedback: Option<String>,
    pub phase: RepairPhase,
    pub verdict: Option<ValidationVerdict>,
    pub attempts: Vec<AttemptRecord>,
    pub rollback: Option<RollbackReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionState {
    pub fn decision(&self) -> Option<Decision> {
        self.verdict.as_ref().map(|v| v.decision)
    }

    pub fn report(&self) -> &str {
        self.verdict.as_ref().map(|v| v.report.as_str()).unwrap_or("")
    }

    /// Serializable digest of the session without file contents.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            project_root: self.project_root.clone(),
            error_log: self.error_log.clone(),
            phase: self.phase,
            decision: self.decision(),
            retries: self.retries,
            report: self.report().to_string(),
            recommendations: self
                .verdict
                .as_ref()
                .map(|v| v.recommendations.clone())
                .unwrap_or_default(),
            failure_reasons: self
                .verdict
                .as_ref()
                .map(|v| v.failure_reasons.clone())
                .unwrap_or_default(),
            attempts: self.attempts.clone(),
            rollback: self.rollback.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// What gets persisted and printed for a finished session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub project_root: PathBuf,
    pub error_log: PathBuf,
    pub phase: RepairPhase,
    pub decision: Option<Decision>,
    pub retries: u32,
    pub report: String,
    pub recommendations: Vec<String>,
    pub failure_reasons: Vec<String>,
    pub attempts: Vec<AttemptRecord>,
    pub rollback: Option<RollbackReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Drives sessions against one oracle and configuration.
pub struct RepairOrchestrator {
    config: RepairConfig,
    proposer: RepairProposer,
    pipeline: ValidationPipeline,
}

impl RepairOrchestrator {
    pub fn new(oracle: Arc<dyn Oracle>, config: RepairConfig) -> Self {
        let proposer = RepairProposer::new(
            oracle.clone(),
            config.retry.clone(),
            config.language.clone(),
        );
        let pipeline = ValidationPipeline::new(oracle, config.retry.clone());
        Self {
            config,
            proposer,
            pipeline,
        }
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    /// Run one session to a terminal phase.
    pub async fn run(&self, request: SessionRequest) -> Result<SessionState> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let _span = obs::SessionSpan::enter(&session_id);
        let started = Instant::now();

        let mut state = self.start_session(&session_id, &request)?;
        obs::emit_session_started(&session_id, &state.project_root, state.retries);

        while !state.phase.is_terminal() {
            match state.phase {
                RepairPhase::Propose => self.propose(&mut state).await,
                RepairPhase::Validate => self.validate(&mut state).await,
                _ => break,
            }
        }

        state.finished_at = Some(Utc::now());
        obs::emit_session_finished(
            &session_id,
            state.phase.as_str(),
            state.retries,
            started.elapsed(),
        );
        METRICS.flush();

        if let Some(dir) = &self.config.artifacts_dir {
            match write_session_artifact(&state.summary(), dir) {
                Ok(path) => debug!(path = %path.display(), "session artifact written"),
                Err(e) => warn!(error = %e, "failed to write session artifact"),
            }
        }

        Ok(state)
    }

    fn start_session(&self, session_id: &str, request: &SessionRequest) -> Result<SessionState> {
        let config = &self.config;
        let error_log = resolve_error_log(
            &request.error_source,
            &request.project_root,
            &config.error_log_names,
        )?;

        let project_root = match request.error_source {
            ErrorSource::Discover => {
                let inferred =
                    infer_project_root(&error_log, &config.language, &request.project_root);
                if inferred.starts_with(&request.project_root) {
                    inferred
                } else {
                    request.project_root.clone()
                }
            }
            ErrorSource::File(_) => request.project_root.clone(),
        };

        let error_text = read_error_log(&error_log, config.error_log_tail_chars)?;
        let registry = Registry::build(&project_root, &config.language)?;
        info!(
            project_root = %project_root.display(),
            error_log = %error_log.display(),
            files = registry.len(),
            "session prepared"
        );

        Ok(SessionState {
            session_id: session_id.to_string(),
            project_root,
            error_log,
            error_text,
            registry,
            relevant: RelevantSet::default(),
            backup: None,
            retries: request.starting_retries,
            last_feedback: None,
            phase: RepairPhase::Propose,
            verdict: None,
            attempts: Vec::new(),
            rollback: None,
            started_at: Utc::now(),
            finished_at: None,
        })
    }

    async fn propose(&self, state: &mut SessionState) {
        if !state.attempts.is_empty() {
            state.registry.refresh();
        }

        let names = localize(&state.error_text, &state.registry, self.config.fanout_depth);
        let relevant = RelevantSet::from_registry(&names, &state.registry);

        if state.backup.is_none() {
            state.backup = Some(BackupMap::capture(&state.registry));
        }

        let (outcome, proposal_error) = match self
            .proposer
            .propose(&state.error_text, &relevant, state.last_feedback.as_deref())
            .await
        {
            Ok(response) => (patch::apply(&response, &relevant, &mut state.registry), None),
            Err(err) => (patch::PatchOutcome::default(), Some(err.to_string())),
        };

        // Re-snapshot so validation sees the patched content.
        state.relevant = RelevantSet::from_registry(&names, &state.registry);
        state.attempts.push(AttemptRecord {
            attempt: state.attempts.len() as u32 + 1,
            retries: state.retries,
            relevant_files: names.into_iter().collect(),
            applied: outcome.applied,
            warnings: outcome.warnings,
            proposal_error,
            decision: None,
            failure_reasons: Vec::new(),
        });
        state.phase = RepairPhase::Validate;
    }

    async fn validate(&self, state: &mut SessionState) {
        let input = self.validation_input(state);
        let verdict = self.pipeline.validate(&input).await;

        if let Some(attempt) = state.attempts.last_mut() {
            attempt.decision = Some(verdict.decision);
            attempt.failure_reasons = verdict.failure_reasons.clone();
        }

        let next = next_phase(verdict.decision, state.retries, self.config.max_retries);
        match next {
            RepairPhase::Propose => {
                state.retries += 1;
                state.last_feedback = Some(rejection_feedback(&verdict));
                info!(retries = state.retries, "fix rejected, retrying");
            }
            RepairPhase::AbortedRolledBack => {
                let report = state
                    .backup
                    .as_ref()
                    .map(BackupMap::restore)
                    .unwrap_or_default();
                if !report.failures.is_empty() {
                    warn!(failures = report.failures.len(), "rollback incomplete");
                }
                state.registry.refresh();
                state.rollback = Some(report);
            }
            _ => {}
        }

        state.verdict = Some(verdict);
        state.phase = next;
    }

    fn validation_input(&self, state: &SessionState) -> ValidationInput {
        let backup = state.backup.as_ref();
        let original: Vec<(&str, Cow<'_, str>)> = state
            .relevant
            .iter()
            .map(|(name, entry)| {
                let pristine = backup
                    .and_then(|b| b.content(name))
                    .map(String::from_utf8_lossy)
                    .unwrap_or(Cow::Borrowed(entry.content.as_str()));
                (name.as_str(), pristine)
            })
            .collect();
        let fixed: Vec<(&str, &str)> = state
            .relevant
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.content.as_str()))
            .collect();

        ValidationInput {
            original_code: render_file_listing(original.iter().map(|(n, c)| (*n, &**c))),
            fixed_code: render_file_listing(fixed),
            original_error: state.error_text.clone(),
            change_context: self.config.change_context.clone(),
        }
    }
}
