//! Human-readable renderings around validation.

use serde_json::Value;

use super::{value_text, Decision, Stage, StageJudgments, ValidationVerdict};

/// `// FILE: <name>\n<content>` blocks separated by a blank line.
pub fn render_file_listing<'a, I>(files: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    files
        .into_iter()
        .map(|(name, content)| format!("// FILE: {name}\n{content}"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn final_field(final_judgment: &Value, field: &str, fallback: &str) -> String {
    final_judgment
        .get(field)
        .map(value_text)
        .unwrap_or_else(|| fallback.to_string())
}

/// Plain-text validation report.
pub fn render_report(decision: Decision, final_judgment: &Value, judgments: &StageJudgments) -> String {
    format!(
        "SRE VALIDATION REPORT
====================

DECISION: {decision}
REASONING: {reasoning}

OVERALL ASSESSMENT: {assessment}
DEPLOYMENT RISK: {risk}

ANALYSIS SUMMARY:
- Error Type: {error_type}
- Error Severity: {severity}
- Logic Correctness: {logic}
- Security Risk: {security}
- Code Quality: {quality}
",
        reasoning = final_field(final_judgment, "decision_reasoning", "No reasoning provided"),
        assessment = final_field(final_judgment, "overall_assessment", "No assessment provided"),
        risk = final_field(final_judgment, "deployment_risk", "Unknown"),
        error_type = judgments.field(Stage::ErrorAnalysis, "error_type"),
        severity = judgments.field(Stage::ErrorAnalysis, "severity"),
        logic = judgments.field(Stage::LogicValidation, "logic_correctness"),
        security = judgments.field(Stage::SecurityValidation, "risk_level"),
        quality = judgments.field(Stage::SemanticValidation, "code_style_compliance"),
    )
}

/// Feedback threaded into the next repair attempt after a rejection.
pub fn rejection_feedback(verdict: &ValidationVerdict) -> String {
    let summary = if verdict.failure_reasons.is_empty() {
        "REJECTED. No clear reason provided.".to_string()
    } else {
        format!("REJECTED. Reasons: {}", verdict.failure_reasons.join("; "))
    };
    format!("{summary}\n\n--- FULL VALIDATION REPORT ---\n{}", verdict.report)
}
