//! autorepair core library
//!
//! Bounded, self-validating repair of a failing codebase: localize the
//! files behind an error, ask an oracle for a fix, apply it with backups,
//! validate it in stages and loop until deploy, escalation or rollback.

pub mod artifact;
pub mod config;
pub mod discovery;
pub mod error;
pub mod localize;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod patch;
pub mod proposer;
pub mod registry;
pub mod telemetry;
pub mod validation;

pub use artifact::{read_session_artifact, write_session_artifact};
pub use config::{LanguageProfile, RepairConfig, CONFIG_FILE_NAME};
pub use discovery::{
    discover_error_log, infer_project_root, read_error_log, resolve_error_log, ErrorSource,
};
pub use error::{RepairError, Result};
pub use localize::{extract_seed_filenames, fan_out, localize, tail_chars, RelevantSet};
pub use obs::SessionSpan;
pub use orchestrator::{
    next_phase, AttemptRecord, BackupMap, RepairOrchestrator, RepairPhase, RestoreFailure,
    RollbackReport, SessionRequest, SessionState, SessionSummary,
};
pub use patch::{apply as apply_patch, parse_blocks, AppliedPatch, PatchOutcome, PatchWarning};
pub use proposer::{build_repair_prompt, RepairProposer};
pub use registry::{FileEntry, RefreshSummary, Registry};
pub use telemetry::init_tracing;
pub use validation::{
    Decision, Stage, StageJudgments, ValidationInput, ValidationPipeline, ValidationVerdict,
};

pub use autorepair_oracle::{Oracle, OracleConfig, OracleError, RetryPolicy};
