//! Hosted-model oracle over HTTP
//!
//! Speaks the `models/{model}:generateContent` REST shape. The client never
//! retries on its own; see [`crate::retry`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Oracle, OracleError, OracleResult};

const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Oracle connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL of the generative API
    pub endpoint: String,
    /// Model identifier
    pub model: String,
    /// API key; never serialized back out
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            temperature: 0.1,
            max_output_tokens: 4000,
            timeout_secs: 120,
        }
    }
}

impl OracleConfig {
    /// Defaults overlaid with `AUTOREPAIR_API_KEY` (or `GEMINI_API_KEY`),
    /// `AUTOREPAIR_MODEL` and `AUTOREPAIR_ENDPOINT`.
    ///
    /// Only binaries should call this; libraries take a config value.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Fill unset or default fields from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        if self.api_key.is_none() {
            self.api_key = std::env::var("AUTOREPAIR_API_KEY")
                .or_else(|_| std::env::var("GEMINI_API_KEY"))
                .ok()
                .filter(|k| !k.trim().is_empty());
        }
        if let Ok(model) = std::env::var("AUTOREPAIR_MODEL") {
            self.model = model;
        }
        if let Ok(endpoint) = std::env::var("AUTOREPAIR_ENDPOINT") {
            self.endpoint = endpoint;
        }
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// HTTP oracle backed by a hosted generative model
pub struct GeminiOracle {
    config: OracleConfig,
    api_key: String,
    http_client: reqwest::Client,
}

impl GeminiOracle {
    /// Create a client. Fails with `NotConfigured` when no API key is set.
    pub fn new(config: OracleConfig) -> OracleResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| OracleError::NotConfigured("no API key configured".to_string()))?;

        let http_client = reqwest::Client::builder()
            .user_agent(concat!("autorepair/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::NotConfigured(e.to_string()))?;

        Ok(GeminiOracle {
            config,
            api_key,
            http_client,
        })
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }
}

#[async_trait]
impl Oracle for GeminiOracle {
    async fn complete(&self, prompt: &str) -> OracleResult<String> {
        let body = build_request(&self.config, prompt);
        debug!(model = %self.config.model, prompt_chars = prompt.len(), "calling oracle");

        let response = self
            .http_client
            .post(self.config.generate_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(classify_failure(status.as_u16(), &text));
        }

        extract_text(&text)
    }
}

fn build_request<'a>(config: &OracleConfig, prompt: &'a str) -> GenerateRequest<'a> {
    GenerateRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![RequestPart { text: prompt }],
        }],
        generation_config: GenerationConfig {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        },
    }
}

/// Map a non-success HTTP answer to a typed failure.
fn classify_failure(status: u16, body: &str) -> OracleError {
    let lower = body.to_lowercase();
    if status == 429
        || lower.contains("quota")
        || lower.contains("rate limit")
        || lower.contains("resource_exhausted")
    {
        OracleError::RateLimited(format!("HTTP {status}"))
    } else {
        OracleError::Unavailable(format!("HTTP {status}: {}", truncate(body, 300)))
    }
}

fn extract_text(body: &str) -> OracleResult<String> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| OracleError::MalformedResponse {
            reason: e.to_string(),
            raw_response: body.to_string(),
        })?;

    let text: String = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(OracleError::MalformedResponse {
            reason: "response contained no candidate text".to_string(),
            raw_response: body.to_string(),
        });
    }
    Ok(text)
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_chars).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let config = OracleConfig::default();
        let body = serde_json::to_value(build_request(&config, "fix it")).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "fix it");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 4000);
    }

    #[test]
    fn test_generate_url_trims_trailing_slash() {
        let config = OracleConfig {
            endpoint: "http://localhost:8080/v1/".to_string(),
            model: "m".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.generate_url(),
            "http://localhost:8080/v1/models/m:generateContent"
        );
    }

    #[test]
    fn test_classify_rate_limit_by_status_and_body() {
        assert!(classify_failure(429, "").is_rate_limited());
        assert!(classify_failure(400, "Quota exceeded for project").is_rate_limited());
        assert!(matches!(
            classify_failure(503, "backend error"),
            OracleError::Unavailable(_)
        ));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}]}}]}"#;
        assert_eq!(extract_text(body).unwrap(), "ab");
    }

    #[test]
    fn test_extract_text_without_candidates_is_malformed() {
        let err = extract_text(r#"{"candidates":[]}"#).unwrap_err();
        assert!(matches!(err, OracleError::MalformedResponse { .. }));
        assert!(extract_text("<html>").is_err());
    }

    #[test]
    fn test_new_requires_api_key() {
        let err = GeminiOracle::new(OracleConfig::default()).err().unwrap();
        assert!(matches!(err, OracleError::NotConfigured(_)));
        assert!(GeminiOracle::new(OracleConfig::default().with_api_key("k")).is_ok());
    }

    #[test]
    fn test_api_key_not_serialized() {
        let config = OracleConfig::default().with_api_key("secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
