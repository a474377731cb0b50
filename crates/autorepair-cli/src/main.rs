//! autorepair - bounded, self-validating repair of a failing codebase
//!
//! ## Commands
//!
//! - `run`: localize, propose, apply and validate until a terminal state
//! - `localize`: print the files an error log points at, without an oracle
//! - `index`: print the file registry of a project
//! - `show`: print a recorded session after verifying its digest
//!
//! `run` exits with 0 when the fix was deployed, 2 when it needs human
//! review and 3 when it was rolled back.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use autorepair_core::{
    extract_seed_filenames, infer_project_root, localize, read_error_log, read_session_artifact,
    resolve_error_log, ErrorSource, Registry, RepairConfig, RepairOrchestrator, RepairPhase,
    SessionRequest, SessionSummary,
};
use autorepair_oracle::GeminiOracle;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "autorepair")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bounded, self-validating repair of failing codebases", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Repair the project until the fix is deployed, escalated or rolled back
    Run {
        /// Project root (inferred from --error-log when omitted)
        #[arg(short, long)]
        project: Option<PathBuf>,

        /// Error log to repair from (discovered under the project when omitted)
        #[arg(short, long)]
        error_log: Option<PathBuf>,

        /// Retry counter to start from
        #[arg(long, default_value = "0")]
        retries: u32,

        /// Retry ceiling (overrides the config file)
        #[arg(long)]
        max_retries: Option<u32>,

        /// Dependency fan-out depth (overrides the config file)
        #[arg(long)]
        depth: Option<usize>,

        /// Path to an autorepair.toml
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory for session artifacts
        #[arg(long)]
        artifacts_dir: Option<PathBuf>,
    },

    /// Print the relevant files for an error log
    Localize {
        #[arg(short, long)]
        project: Option<PathBuf>,

        #[arg(short, long)]
        error_log: Option<PathBuf>,

        #[arg(long)]
        depth: Option<usize>,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print the file registry of a project
    Index {
        #[arg(short, long, default_value = ".")]
        project: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print a recorded session
    Show {
        /// Session ID
        #[arg(long)]
        session: String,

        /// Root directory containing session artifacts
        #[arg(long, default_value = ".autorepair/sessions")]
        artifacts_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    autorepair_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            project,
            error_log,
            retries,
            max_retries,
            depth,
            config,
            artifacts_dir,
        } => {
            let target = Target::resolve(project, error_log, config.as_deref())?;
            let mut config = target.config.clone();
            if let Some(max) = max_retries {
                config.max_retries = max;
            }
            if let Some(depth) = depth {
                config.fanout_depth = depth;
            }
            if artifacts_dir.is_some() {
                config.artifacts_dir = artifacts_dir;
            }
            let phase = cmd_run(target, config, retries, cli.json).await?;
            Ok(exit_code(phase))
        }
        Commands::Localize {
            project,
            error_log,
            depth,
            config,
        } => {
            let target = Target::resolve(project, error_log, config.as_deref())?;
            let depth = depth.unwrap_or(target.config.fanout_depth);
            cmd_localize(&target, depth, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Index { project, config } => {
            let config = RepairConfig::load(config.as_deref(), &project)
                .context("Failed to load configuration")?;
            cmd_index(&project, &config, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Show {
            session,
            artifacts_dir,
        } => {
            let summary = read_session_artifact(&session, &artifacts_dir)
                .with_context(|| format!("Failed to read session {session}"))?;
            print_summary(&summary, cli.json)?;
            Ok(exit_code(summary.phase))
        }
    }
}

/// Project, error source and configuration of a command.
struct Target {
    project: PathBuf,
    error_source: ErrorSource,
    config: RepairConfig,
}

impl Target {
    /// Without `--project`, the root is inferred from the error log, else
    /// the current directory.
    fn resolve(
        project: Option<PathBuf>,
        error_log: Option<PathBuf>,
        config: Option<&Path>,
    ) -> Result<Self> {
        let cwd = PathBuf::from(".");
        let provisional = RepairConfig::load(config, project.as_deref().unwrap_or(&cwd))
            .context("Failed to load configuration")?;

        let project = match (&project, &error_log) {
            (Some(p), _) => p.clone(),
            (None, Some(log)) => infer_project_root(log, &provisional.language, &cwd),
            (None, None) => cwd,
        };
        let config = RepairConfig::load(config, &project).context("Failed to load configuration")?;

        let error_source = match error_log {
            Some(path) => ErrorSource::File(path),
            None => ErrorSource::Discover,
        };

        Ok(Self {
            project,
            error_source,
            config,
        })
    }
}

fn exit_code(phase: RepairPhase) -> ExitCode {
    match phase {
        RepairPhase::Deployed => ExitCode::SUCCESS,
        RepairPhase::Escalated => ExitCode::from(2),
        RepairPhase::AbortedRolledBack => ExitCode::from(3),
        RepairPhase::Propose | RepairPhase::Validate => ExitCode::FAILURE,
    }
}

async fn cmd_run(target: Target, config: RepairConfig, retries: u32, json: bool) -> Result<RepairPhase> {
    config.validate().context("Invalid configuration")?;

    let oracle_config = config.oracle.clone().with_env_overrides();
    let oracle = GeminiOracle::new(oracle_config).context("Failed to configure the oracle")?;

    let mut request = SessionRequest::new(&target.project).with_starting_retries(retries);
    request.error_source = target.error_source;

    info!(project = %target.project.display(), "starting repair session");
    let orchestrator = RepairOrchestrator::new(Arc::new(oracle), config);
    let state = orchestrator
        .run(request)
        .await
        .context("Repair session failed")?;

    print_summary(&state.summary(), json)?;
    Ok(state.phase)
}

fn print_summary(summary: &SessionSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    println!("Session:  {}", summary.session_id);
    println!("Project:  {}", summary.project_root.display());
    println!("Log:      {}", summary.error_log.display());
    println!("Outcome:  {}", summary.phase);
    println!("Retries:  {}", summary.retries);
    println!("Attempts: {}", summary.attempts.len());
    for attempt in &summary.attempts {
        let decision = attempt
            .decision
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  #{} applied={} warnings={} decision={}",
            attempt.attempt,
            attempt.applied.len(),
            attempt.warnings.len(),
            decision
        );
        if let Some(err) = &attempt.proposal_error {
            println!("     proposal failed: {err}");
        }
    }
    if let Some(rollback) = &summary.rollback {
        println!(
            "Rollback: restored={} unchanged={} failed={}",
            rollback.restored.len(),
            rollback.unchanged.len(),
            rollback.failures.len()
        );
        for failure in &rollback.failures {
            println!("  {} ({}): {}", failure.filename, failure.path.display(), failure.reason);
        }
    }
    if !summary.failure_reasons.is_empty() {
        println!("Failure reasons:");
        for reason in &summary.failure_reasons {
            println!("  - {reason}");
        }
    }
    if !summary.recommendations.is_empty() {
        println!("Recommendations:");
        for rec in &summary.recommendations {
            println!("  - {rec}");
        }
    }
    if !summary.report.is_empty() {
        println!();
        println!("{}", summary.report);
    }
    Ok(())
}

fn cmd_localize(target: &Target, depth: usize, json: bool) -> Result<()> {
    let config = &target.config;
    let log = resolve_error_log(&target.error_source, &target.project, &config.error_log_names)
        .context("Failed to locate the error log")?;
    let error_text = read_error_log(&log, config.error_log_tail_chars)
        .with_context(|| format!("Failed to read {:?}", log))?;
    let registry = Registry::build(&target.project, &config.language)
        .with_context(|| format!("Failed to index {:?}", target.project))?;

    let seeds = extract_seed_filenames(&error_text, &config.language);
    let relevant = localize(&error_text, &registry, depth);
    let fail_open = !seeds.iter().any(|s| registry.contains(s));

    if json {
        let out = serde_json::json!({
            "error_log": log,
            "depth": depth,
            "seeds": seeds,
            "fail_open": fail_open,
            "relevant": relevant,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Error log: {}", log.display());
    if fail_open {
        println!("No known files in the stack trace; selecting all {} files", registry.len());
    } else {
        println!("Seeds: {}", seeds.into_iter().collect::<Vec<_>>().join(", "));
    }
    for name in &relevant {
        println!("  {name}");
    }
    Ok(())
}

fn cmd_index(project: &Path, config: &RepairConfig, json: bool) -> Result<()> {
    let registry = Registry::build(project, &config.language)
        .with_context(|| format!("Failed to index {:?}", project))?;

    if json {
        let entries: Vec<_> = registry
            .iter()
            .map(|(name, entry)| {
                serde_json::json!({
                    "filename": name,
                    "path": entry.path,
                    "declared_type": entry.declared_type,
                    "imports": entry.imports,
                    "calls": entry.calls,
                    "checksum": entry.checksum,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    println!("{} {} files under {}", registry.len(), config.language.name, project.display());
    for (name, entry) in registry.iter() {
        println!(
            "  {:<40} {:<24} imports={:<3} calls={:<3} {}",
            name,
            entry.declared_type,
            entry.imports.len(),
            entry.calls.len(),
            &entry.checksum[..12.min(entry.checksum.len())]
        );
    }
    Ok(())
}
