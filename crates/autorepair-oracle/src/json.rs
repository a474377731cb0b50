//! Structured (JSON) answers from free-text model output.

use serde_json::Value;

use crate::retry::{complete_with_retry, RetryPolicy};
use crate::{Oracle, OracleError, OracleResult};

/// Ask `oracle` for a JSON object and parse it.
///
/// Transient failures are retried per `policy`. Output that does not
/// contain a parseable object yields `MalformedResponse` carrying the raw
/// text; it is not retried.
pub async fn ask_json<O>(oracle: &O, prompt: &str, policy: &RetryPolicy) -> OracleResult<Value>
where
    O: Oracle + ?Sized,
{
    let raw = complete_with_retry(oracle, prompt, policy).await?;
    parse_json_object(&raw)
}

/// Parse the first JSON object found in `raw`.
pub fn parse_json_object(raw: &str) -> OracleResult<Value> {
    let Some(fragment) = extract_json_object(raw) else {
        return Err(OracleError::MalformedResponse {
            reason: "no JSON object in response".to_string(),
            raw_response: raw.to_string(),
        });
    };

    match serde_json::from_str::<Value>(fragment) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(_) => Err(OracleError::MalformedResponse {
            reason: "response JSON is not an object".to_string(),
            raw_response: raw.to_string(),
        }),
        Err(e) => Err(OracleError::MalformedResponse {
            reason: e.to_string(),
            raw_response: raw.to_string(),
        }),
    }
}

fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    clean.strip_suffix("```").unwrap_or(clean).trim()
}

/// Extract the first balanced `{ .. }` fragment, ignoring braces inside
/// string literals.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let text = strip_markdown_fences(text);
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;
    let mut start_idx = None;

    for (i, c) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' if start_idx.is_some() => in_string = true,
            '{' => {
                if depth == 0 {
                    start_idx = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return start_idx.map(|start| &text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}
