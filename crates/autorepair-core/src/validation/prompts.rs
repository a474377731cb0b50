//! Prompt text for the validation stages.
//!
//! Every stage prompt ends with the judgments of the stages before it so
//! later stages reason over the accumulated picture. Failed stages show up
//! as their `{"error": ..}` object; prompts ask the oracle to treat missing
//! fields as unknown.

use serde_json::Value;

use super::{Stage, StageJudgments, ValidationInput};

/// Phrase identifying the decision prompt.
pub const DECISION_HEADER: &str = "FINAL DEPLOYMENT DECISION";

fn schema(stage: Stage) -> &'static str {
    match stage {
        Stage::ErrorAnalysis => {
            r#"{
    "error_type": "syntax|logic|runtime|performance|security|integration",
    "severity": "critical|high|medium|low",
    "root_cause": "detailed explanation of what caused this error",
    "impact_scope": "local|module|system|global",
    "fix_complexity": "simple|moderate|complex",
    "error_category": "detailed categorization"
}"#
        }
        Stage::CodeDiffAnalysis => {
            r#"{
    "lines_changed": 5,
    "change_type": "addition|deletion|modification|refactoring",
    "change_scope": "minimal|moderate|extensive",
    "change_quality": "poor|adequate|good|excellent",
    "addresses_root_cause": true,
    "introduces_new_risks": false,
    "code_clarity_impact": "improved|unchanged|degraded",
    "maintainability_impact": "improved|unchanged|degraded"
}"#
        }
        Stage::LogicValidation => {
            r#"{
    "logic_correctness": "correct|flawed|partially_correct",
    "addresses_original_error": true,
    "creates_new_logical_errors": false,
    "edge_cases_handled": true,
    "algorithm_soundness": "sound|questionable|flawed",
    "data_flow_correctness": "correct|incorrect|unknown",
    "control_flow_correctness": "correct|incorrect|unknown",
    "logical_reasoning": "detailed explanation of the logical assessment"
}"#
        }
        Stage::SemanticValidation => {
            r#"{
    "code_style_compliance": "excellent|good|acceptable|poor",
    "naming_conventions": "consistent|inconsistent|unclear",
    "code_organization": "well_structured|adequate|poor",
    "documentation_quality": "comprehensive|adequate|minimal|missing",
    "error_handling_quality": "robust|adequate|minimal|missing",
    "performance_implications": "improved|neutral|degraded|concerning",
    "maintainability_impact": "much_improved|improved|neutral|degraded",
    "follows_best_practices": true,
    "semantic_correctness": "correct|questionable|incorrect"
}"#
        }
        Stage::SecurityValidation => {
            r#"{
    "vulnerabilities_found": ["list of security issues"],
    "security_improvements": true,
    "risk_level": "critical|high|medium|low|none",
    "input_validation_quality": "robust|adequate|weak|missing",
    "authentication_impact": "improved|unchanged|degraded",
    "data_exposure_risk": "high|medium|low|none",
    "security_recommendations": ["list of security recommendations"]
}"#
        }
    }
}

fn role(stage: Stage) -> &'static str {
    match stage {
        Stage::ErrorAnalysis => {
            "You are an expert SRE engineer. Analyze this error deeply and provide insights."
        }
        Stage::CodeDiffAnalysis => {
            "You are a senior code reviewer. Analyze the differences between original and fixed code."
        }
        Stage::LogicValidation => {
            "You are a software architect. Validate the logical correctness of this fix."
        }
        Stage::SemanticValidation => {
            "You are a principal engineer and code quality expert. Perform semantic analysis of this code fix."
        }
        Stage::SecurityValidation => {
            "You are a security engineer specializing in secure code review. Analyze this code fix for security implications."
        }
    }
}

fn focus(stage: Stage) -> &'static str {
    match stage {
        Stage::ErrorAnalysis => "Focus on understanding the root cause and impact scope.",
        Stage::CodeDiffAnalysis => {
            "Focus on whether the changes actually address the root cause of the error."
        }
        Stage::LogicValidation => {
            "Focus on whether the fix logically solves the problem without creating new issues."
        }
        Stage::SemanticValidation => {
            "Focus on code quality, maintainability, and adherence to best practices."
        }
        Stage::SecurityValidation => {
            "Focus on identifying vulnerabilities and whether the fix introduces new security risks."
        }
    }
}

/// The input sections each stage looks at.
fn sections(stage: Stage, input: &ValidationInput) -> String {
    let error = format!("ORIGINAL ERROR:\n{}\n", input.original_error);
    let original = format!("ORIGINAL CODE:\n{}\n", input.original_code);
    let fixed = format!("FIXED CODE:\n{}\n", input.fixed_code);
    let context = format!("CHANGE CONTEXT: {}\n", input.change_context);

    match stage {
        Stage::ErrorAnalysis => [error, original].concat(),
        Stage::CodeDiffAnalysis => [original, fixed, context].concat(),
        Stage::LogicValidation => [error, original, fixed].concat(),
        Stage::SemanticValidation => [fixed, context].concat(),
        Stage::SecurityValidation => [original, fixed, error, context].concat(),
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Judgments of the stages that ran before, one labelled block each.
fn prior_judgments(judgments: &StageJudgments) -> String {
    let mut out = String::new();
    for (stage, value) in judgments.completed() {
        out.push_str(&format!("- {}: {}\n", stage.title(), pretty(value)));
    }
    out
}

/// Prompt for one judgment stage.
pub fn stage_prompt(stage: Stage, input: &ValidationInput, judgments: &StageJudgments) -> String {
    let prior = prior_judgments(judgments);
    let prior = if prior.is_empty() {
        String::new()
    } else {
        format!(
            "PREVIOUS ANALYSES (fields may be missing; treat them as unknown):\n{prior}\n"
        )
    };

    format!(
        "{role}\n\n{sections}\n{prior}Respond with a JSON object with this exact structure:\n{schema}\n\n{focus}\n",
        role = role(stage),
        sections = sections(stage, input),
        schema = schema(stage),
        focus = focus(stage),
    )
}

/// Prompt for the aggregation stage.
pub fn decision_prompt(input: &ValidationInput, judgments: &StageJudgments) -> String {
    let mut analyses = String::new();
    for stage in Stage::ALL {
        let rendered = judgments
            .get(stage)
            .map(pretty)
            .unwrap_or_else(|| "{}".to_string());
        analyses.push_str(&format!("- {}: {}\n", stage.title(), rendered));
    }

    format!(
        r#"{DECISION_HEADER}

You are the final decision maker for production deployments. Based on the analysis below, make a deployment decision.

ANALYSIS RESULTS:
{analyses}
ORIGINAL ERROR:
{error}

CHANGE CONTEXT: {context}

Respond with a JSON object with this exact structure:
{{
    "decision": "DEPLOY|REJECT|NEEDS_REVIEW",
    "decision_reasoning": "detailed explanation for the decision",
    "deployment_risk": "low|medium|high|critical",
    "recommended_actions": ["list of recommended actions"],
    "critical_issues": ["list of critical issues that must be addressed"],
    "minor_improvements": ["list of minor improvements that could be made"],
    "overall_assessment": "comprehensive assessment of the fix quality"
}}

DECISION CRITERIA:
- DEPLOY: Fix is safe, correct, and ready for production
- REJECT: Fix has critical issues, security vulnerabilities, or doesn't solve the problem
- NEEDS_REVIEW: Fix is complex, has minor issues, or requires human judgment

Be thorough but decisive. Focus on production safety and correctness.
"#,
        error = input.original_error,
        context = input.change_context,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input() -> ValidationInput {
        ValidationInput {
            original_code: "// FILE: Foo.java\nX".to_string(),
            fixed_code: "// FILE: Foo.java\nY".to_string(),
            original_error: "NullPointerException".to_string(),
            change_context: "automated fix".to_string(),
        }
    }

    #[test]
    fn test_first_stage_has_no_prior_section() {
        let prompt = stage_prompt(Stage::ErrorAnalysis, &input(), &StageJudgments::default());
        assert!(prompt.contains("ORIGINAL ERROR:\nNullPointerException"));
        assert!(prompt.contains("\"root_cause\""));
        assert!(!prompt.contains("PREVIOUS ANALYSES"));
        assert!(!prompt.contains("FIXED CODE"));
    }

    #[test]
    fn test_later_stage_embeds_prior_judgments() {
        let mut judgments = StageJudgments::default();
        judgments.set(Stage::ErrorAnalysis, json!({"severity": "high"}));
        judgments.set(Stage::CodeDiffAnalysis, json!({"error": "Rate limit exceeded"}));

        let prompt = stage_prompt(Stage::LogicValidation, &input(), &judgments);
        assert!(prompt.contains("PREVIOUS ANALYSES"));
        assert!(prompt.contains("\"severity\": \"high\""));
        assert!(prompt.contains("Rate limit exceeded"));
        assert!(prompt.contains("FIXED CODE:\n// FILE: Foo.java\nY"));
        assert!(!prompt.contains(DECISION_HEADER));
    }

    #[test]
    fn test_decision_prompt_lists_every_stage() {
        let prompt = decision_prompt(&input(), &StageJudgments::default());
        assert!(prompt.starts_with(DECISION_HEADER));
        for stage in Stage::ALL {
            assert!(prompt.contains(stage.title()));
        }
        assert!(prompt.contains("\"decision\": \"DEPLOY|REJECT|NEEDS_REVIEW\""));
    }
}
