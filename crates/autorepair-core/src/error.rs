//! Error taxonomy for repair sessions.
//!
//! Only failures that end a session abnormally live here. Oracle failures,
//! unknown patch targets and per-file restore failures are recorded as data
//! on the session instead.

/// Errors that can terminate a repair session.
#[derive(Debug, thiserror::Error)]
pub enum RepairError {
    /// Project root or error log is missing.
    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for RepairError {
    fn from(err: toml::de::Error) -> Self {
        RepairError::Config(err.to_string())
    }
}

/// Result type for repair operations.
pub type Result<T> = std::result::Result<T, RepairError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_error_display() {
        let err = RepairError::Discovery("project root /nope does not exist".to_string());
        assert!(err.to_string().contains("discovery error"));
        assert!(err.to_string().contains("/nope"));
    }

    #[test]
    fn test_digest_mismatch_error() {
        let err = RepairError::DigestMismatch {
            expected: "abc123".to_string(),
            actual: "def456".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("def456"));
    }

    #[test]
    fn test_toml_error_becomes_config() {
        let err: RepairError = toml::from_str::<toml::Value>("max_retries = ")
            .unwrap_err()
            .into();
        assert!(matches!(err, RepairError::Config(_)));
    }
}
