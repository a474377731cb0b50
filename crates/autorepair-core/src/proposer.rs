//! Repair Proposer: builds the fix request and asks the oracle for it.

use std::sync::Arc;

use autorepair_oracle::{complete_with_retry, Oracle, OracleResult, RetryPolicy};
use tracing::{debug, warn};

use crate::config::LanguageProfile;
use crate::localize::RelevantSet;
use crate::metrics::METRICS;

/// Source listing for the prompt: `--- <name> ---` headers over content.
pub fn source_context(relevant: &RelevantSet) -> String {
    relevant
        .iter()
        .map(|(name, entry)| format!("\n--- {name} ---\n{}", entry.content))
        .collect()
}

/// Full repair prompt.
///
/// `feedback` is the previous rejection, if any.
pub fn build_repair_prompt(
    error_text: &str,
    relevant: &RelevantSet,
    feedback: Option<&str>,
    language: &LanguageProfile,
) -> String {
    let note = match feedback {
        Some(feedback) => format!(
            "\nNOTE FROM VALIDATION AGENT: Previous fix was rejected during automated validation. You MUST address this feedback.\n{feedback}\n"
        ),
        None => String::new(),
    };
    let allowed = relevant.names().into_iter().collect::<Vec<_>>().join(", ");
    let lang = &language.name;
    let tag = &language.fence_tag;

    format!(
        "{upper} ERROR ANALYSIS AND AUTO-FIX
{note}
ERROR LOG:
{error_text}

SOURCE CODE:
{sources}

TASK: Analyze the error and provide FIXED CODE for each problematic file.

REQUIREMENTS:
- Reflect on why the previous fix failed (if any).
- Identify the exact root cause based on the latest error message.
- Only modify files listed in the SOURCE CODE section ({allowed}). Do not suggest new filenames.
- Provide complete, compilable {lang} code for each changed file.
- Ensure all necessary imports are included.
- Preserve the API contract; validate or handle bad input instead of changing types.
- DO NOT CREATE NEW FILES.
- Format each fix exactly as:

FILENAME: [filename]
```{tag}
[complete corrected code]
```
",
        upper = lang.to_uppercase(),
        sources = source_context(relevant),
    )
}

/// Asks the oracle for a multi-file fix.
pub struct RepairProposer {
    oracle: Arc<dyn Oracle>,
    retry: RetryPolicy,
    language: LanguageProfile,
}

impl RepairProposer {
    pub fn new(oracle: Arc<dyn Oracle>, retry: RetryPolicy, language: LanguageProfile) -> Self {
        Self {
            oracle,
            retry,
            language,
        }
    }

    /// Raw fix response for `error_text` over `relevant`.
    pub async fn propose(
        &self,
        error_text: &str,
        relevant: &RelevantSet,
        feedback: Option<&str>,
    ) -> OracleResult<String> {
        let prompt = build_repair_prompt(error_text, relevant, feedback, &self.language);
        debug!(
            files = relevant.len(),
            prompt_chars = prompt.len(),
            with_feedback = feedback.is_some(),
            "requesting repair"
        );

        METRICS.inc_oracle_calls();
        let result = complete_with_retry(&*self.oracle, &prompt, &self.retry).await;
        if let Err(err) = &result {
            METRICS.inc_oracle_failures();
            warn!(error = %err, "repair proposal failed");
        }
        result
    }
}
