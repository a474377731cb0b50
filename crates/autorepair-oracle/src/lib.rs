//! autorepair-oracle: the reasoning-oracle boundary for autorepair
//!
//! The oracle turns a natural-language prompt into text. Everything above
//! this crate treats it as an opaque, fallible collaborator:
//!
//! - [`Oracle`] is the single async seam (one prompt in, text out)
//! - [`retry::complete_with_retry`] waits out rate limits with a fixed backoff
//! - [`json::ask_json`] extracts a structured judgment from model output
//! - [`GeminiOracle`] talks to a hosted model over HTTP
//! - [`fakes::ScriptedOracle`] replays canned answers in tests

use async_trait::async_trait;

pub mod error;
pub mod fakes;
pub mod gemini;
pub mod json;
pub mod retry;

pub use error::OracleError;
pub use gemini::{GeminiOracle, OracleConfig};
pub use json::{ask_json, extract_json_object};
pub use retry::{complete_with_retry, RetryPolicy};

/// Result type for oracle operations
pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// A reasoning service that answers prompts.
///
/// Implementations must not retry internally; retry policy is applied by
/// [`complete_with_retry`] so it stays uniform across providers.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Send `prompt` and return the raw response text.
    async fn complete(&self, prompt: &str) -> OracleResult<String>;
}

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for std::sync::Arc<T> {
    async fn complete(&self, prompt: &str) -> OracleResult<String> {
        (**self).complete(prompt).await
    }
}
