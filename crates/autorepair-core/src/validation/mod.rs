//! Validation Pipeline: five oracle-backed judgments and one decision.
//!
//! Stages run strictly in order because every prompt embeds the judgments
//! produced before it. A failing stage records `{"error", "raw_response"}`
//! and the pipeline carries on; only a failure in the decision stage
//! changes the outcome, and it always forces `REJECT`.

pub mod prompts;
pub mod report;

use std::fmt;
use std::sync::Arc;

use autorepair_oracle::{ask_json, Oracle, OracleError, RetryPolicy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::metrics::METRICS;
use crate::obs;

pub use report::{rejection_feedback, render_file_listing, render_report};

/// Terminal decision of the validation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Deploy,
    Reject,
    NeedsReview,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Deploy => "DEPLOY",
            Decision::Reject => "REJECT",
            Decision::NeedsReview => "NEEDS_REVIEW",
        }
    }

    /// Lenient parse of an oracle-supplied decision string.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "DEPLOY" => Some(Decision::Deploy),
            "REJECT" => Some(Decision::Reject),
            "NEEDS_REVIEW" => Some(Decision::NeedsReview),
            _ => None,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five judgment stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ErrorAnalysis,
    CodeDiffAnalysis,
    LogicValidation,
    SemanticValidation,
    SecurityValidation,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::ErrorAnalysis,
        Stage::CodeDiffAnalysis,
        Stage::LogicValidation,
        Stage::SemanticValidation,
        Stage::SecurityValidation,
    ];

    /// Field name used for this stage's judgment.
    pub fn key(&self) -> &'static str {
        match self {
            Stage::ErrorAnalysis => "error_analysis",
            Stage::CodeDiffAnalysis => "code_diff_analysis",
            Stage::LogicValidation => "logic_validation",
            Stage::SemanticValidation => "semantic_validation",
            Stage::SecurityValidation => "security_validation",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Stage::ErrorAnalysis => "Error Analysis",
            Stage::CodeDiffAnalysis => "Code Diff Analysis",
            Stage::LogicValidation => "Logic Validation",
            Stage::SemanticValidation => "Semantic Validation",
            Stage::SecurityValidation => "Security Validation",
        }
    }
}

/// What the pipeline judges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationInput {
    pub original_code: String,
    pub fixed_code: String,
    pub original_error: String,
    pub change_context: String,
}

/// Per-stage structured judgments; `None` until the stage has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageJudgments {
    pub error_analysis: Option<Value>,
    pub code_diff_analysis: Option<Value>,
    pub logic_validation: Option<Value>,
    pub semantic_validation: Option<Value>,
    pub security_validation: Option<Value>,
}

impl StageJudgments {
    pub fn get(&self, stage: Stage) -> Option<&Value> {
        match stage {
            Stage::ErrorAnalysis => self.error_analysis.as_ref(),
            Stage::CodeDiffAnalysis => self.code_diff_analysis.as_ref(),
            Stage::LogicValidation => self.logic_validation.as_ref(),
            Stage::SemanticValidation => self.semantic_validation.as_ref(),
            Stage::SecurityValidation => self.security_validation.as_ref(),
        }
    }

    fn slot(&mut self, stage: Stage) -> &mut Option<Value> {
        match stage {
            Stage::ErrorAnalysis => &mut self.error_analysis,
            Stage::CodeDiffAnalysis => &mut self.code_diff_analysis,
            Stage::LogicValidation => &mut self.logic_validation,
            Stage::SemanticValidation => &mut self.semantic_validation,
            Stage::SecurityValidation => &mut self.security_validation,
        }
    }

    pub fn set(&mut self, stage: Stage, value: Value) {
        *self.slot(stage) = Some(value);
    }

    /// `field` of `stage` as display text, `"Unknown"` when absent.
    pub fn field(&self, stage: Stage, field: &str) -> String {
        self.get(stage)
            .and_then(|v| v.get(field))
            .map(value_text)
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Stages that have run, in order.
    pub fn completed(&self) -> impl Iterator<Item = (Stage, &Value)> {
        Stage::ALL
            .into_iter()
            .filter_map(move |s| self.get(s).map(|v| (s, v)))
    }
}

/// Aggregated outcome of one validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub decision: Decision,
    pub report: String,
    pub recommendations: Vec<String>,
    /// Empty unless `decision` is `REJECT`
    pub failure_reasons: Vec<String>,
    pub judgments: StageJudgments,
    /// Raw decision-stage output, absent when that stage failed
    pub final_judgment: Option<Value>,
}

/// Runs the five stages and the decision stage over an oracle.
pub struct ValidationPipeline {
    oracle: Arc<dyn Oracle>,
    retry: RetryPolicy,
}

impl ValidationPipeline {
    pub fn new(oracle: Arc<dyn Oracle>, retry: RetryPolicy) -> Self {
        Self { oracle, retry }
    }

    pub async fn validate(&self, input: &ValidationInput) -> ValidationVerdict {
        let mut judgments = StageJudgments::default();

        for stage in Stage::ALL {
            let prompt = prompts::stage_prompt(stage, input, &judgments);
            let judgment = self.judge(stage, &prompt).await;
            judgments.set(stage, judgment);
        }

        self.decide(input, judgments).await
    }

    async fn judge(&self, stage: Stage, prompt: &str) -> Value {
        METRICS.inc_oracle_calls();
        match ask_json(&*self.oracle, prompt, &self.retry).await {
            Ok(value) => {
                debug!(stage = stage.key(), "stage judgment received");
                obs::emit_validation_stage_completed(stage.key(), false);
                value
            }
            Err(err) => {
                METRICS.inc_oracle_failures();
                warn!(stage = stage.key(), error = %err, "stage degraded");
                obs::emit_validation_stage_completed(stage.key(), true);
                degraded_judgment(&err)
            }
        }
    }

    async fn decide(&self, input: &ValidationInput, judgments: StageJudgments) -> ValidationVerdict {
        let prompt = prompts::decision_prompt(input, &judgments);
        METRICS.inc_oracle_calls();

        let verdict = match ask_json(&*self.oracle, &prompt, &self.retry).await {
            Ok(value) => aggregate(value, judgments),
            Err(err) => {
                METRICS.inc_oracle_failures();
                warn!(error = %err, "decision stage failed, rejecting");
                forced_reject(&err, judgments)
            }
        };

        obs::emit_validation_decided(verdict.decision.as_str(), verdict.failure_reasons.len());
        verdict
    }
}

/// Stage output recorded when the oracle could not produce a judgment.
pub fn degraded_judgment(err: &OracleError) -> Value {
    json!({
        "error": err.to_string(),
        "raw_response": err.raw_response().unwrap_or_default(),
    })
}

/// Fold a decision-stage answer into a verdict.
///
/// A missing or unrecognised `decision` counts as `NEEDS_REVIEW`.
pub fn aggregate(final_judgment: Value, judgments: StageJudgments) -> ValidationVerdict {
    let decision = final_judgment
        .get("decision")
        .and_then(Value::as_str)
        .and_then(Decision::parse)
        .unwrap_or(Decision::NeedsReview);

    let mut recommendations = string_list(&final_judgment, "recommended_actions");
    recommendations.extend(string_list(&final_judgment, "minor_improvements"));

    let failure_reasons = if decision == Decision::Reject {
        string_list(&final_judgment, "critical_issues")
    } else {
        Vec::new()
    };

    let report = render_report(decision, &final_judgment, &judgments);

    ValidationVerdict {
        decision,
        report,
        recommendations,
        failure_reasons,
        judgments,
        final_judgment: Some(final_judgment),
    }
}

/// Verdict used when the decision stage itself failed.
pub fn forced_reject(err: &OracleError, judgments: StageJudgments) -> ValidationVerdict {
    ValidationVerdict {
        decision: Decision::Reject,
        report: format!("Decision process failed: {err}"),
        recommendations: vec!["Manual review required due to system failure".to_string()],
        failure_reasons: vec![format!("System error: {err}")],
        judgments,
        final_judgment: None,
    }
}

fn string_list(value: &Value, key: &str) -> Vec<String> {
    match value.get(key) {
        Some(Value::Array(items)) => items.iter().map(value_text).collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Scalars without JSON quoting; everything else as compact JSON.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "Unknown".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autorepair_oracle::fakes::ScriptedOracle;

    #[test]
    fn test_decision_parse_is_lenient() {
        assert_eq!(Decision::parse("deploy"), Some(Decision::Deploy));
        assert_eq!(Decision::parse(" NEEDS REVIEW "), Some(Decision::NeedsReview));
        assert_eq!(Decision::parse("needs-review"), Some(Decision::NeedsReview));
        assert_eq!(Decision::parse("SHIP IT"), None);
    }

    #[test]
    fn test_decision_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&Decision::NeedsReview).unwrap(),
            "\"NEEDS_REVIEW\""
        );
    }

    #[test]
    fn test_aggregate_concatenates_recommendations() {
        let verdict = aggregate(
            json!({
                "decision": "REJECT",
                "recommended_actions": ["add a null check"],
                "minor_improvements": ["rename x"],
                "critical_issues": ["NPE still reachable"]
            }),
            StageJudgments::default(),
        );

        assert_eq!(verdict.decision, Decision::Reject);
        assert_eq!(verdict.recommendations, vec!["add a null check", "rename x"]);
        assert_eq!(verdict.failure_reasons, vec!["NPE still reachable"]);
    }

    #[test]
    fn test_aggregate_missing_decision_needs_review() {
        let verdict = aggregate(
            json!({"critical_issues": ["x"]}),
            StageJudgments::default(),
        );
        assert_eq!(verdict.decision, Decision::NeedsReview);
        assert!(verdict.failure_reasons.is_empty());
    }

    #[test]
    fn test_forced_reject_shape() {
        let err = OracleError::Unavailable("connection refused".into());
        let verdict = forced_reject(&err, StageJudgments::default());

        assert_eq!(verdict.decision, Decision::Reject);
        assert!(verdict.report.starts_with("Decision process failed:"));
        assert_eq!(verdict.failure_reasons.len(), 1);
        assert!(verdict.failure_reasons[0].starts_with("System error:"));
        assert_eq!(
            verdict.recommendations,
            vec!["Manual review required due to system failure"]
        );
    }

    #[tokio::test]
    async fn test_stage_failure_is_recorded_and_pipeline_continues() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.respond_when(prompts::DECISION_HEADER, Ok(r#"{"decision":"DEPLOY"}"#.into()));
        oracle.push_ok("not json at all");
        for _ in 0..4 {
            oracle.push_ok("{\"ok\": true}");
        }

        let pipeline = ValidationPipeline::new(oracle.clone(), RetryPolicy::immediate(1));
        let verdict = pipeline.validate(&ValidationInput::default()).await;

        assert_eq!(verdict.decision, Decision::Deploy);
        let first = verdict.judgments.error_analysis.as_ref().unwrap();
        assert!(first.get("error").is_some());
        assert_eq!(first["raw_response"], json!("not json at all"));
        assert_eq!(verdict.judgments.security_validation, Some(json!({"ok": true})));
        assert_eq!(oracle.call_count(), 6);
    }

    #[tokio::test]
    async fn test_decision_stage_failure_forces_reject() {
        let oracle = Arc::new(ScriptedOracle::new());
        oracle.respond_when(
            prompts::DECISION_HEADER,
            Err(OracleError::RateLimited("quota".into())),
        );
        oracle.respond_when("", Ok(r#"{"decision":"DEPLOY"}"#.into()));

        let pipeline = ValidationPipeline::new(oracle, RetryPolicy::immediate(1));
        let verdict = pipeline.validate(&ValidationInput::default()).await;

        assert_eq!(verdict.decision, Decision::Reject);
        assert!(verdict.final_judgment.is_none());
    }
}
