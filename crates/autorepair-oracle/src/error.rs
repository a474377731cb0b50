//! Error types for the oracle boundary

use thiserror::Error;

/// Failures a reasoning oracle can report.
///
/// None of these are fatal to a repair session: callers convert them into
/// data at the stage boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The provider signalled throttling or quota exhaustion
    #[error("oracle rate limited: {0}")]
    RateLimited(String),

    /// The provider answered, but not in the shape the caller asked for
    #[error("malformed oracle response: {reason}")]
    MalformedResponse {
        reason: String,
        raw_response: String,
    },

    /// Transport failure or non-success status from the provider
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// No credentials or endpoint configured
    #[error("oracle not configured: {0}")]
    NotConfigured(String),
}

impl OracleError {
    /// Whether this failure is a throttling signal worth waiting out.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, OracleError::RateLimited(_))
    }

    /// Raw response text when the failure carries one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            OracleError::MalformedResponse { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            OracleError::RateLimited(err.to_string())
        } else {
            OracleError::Unavailable(err.to_string())
        }
    }
}
