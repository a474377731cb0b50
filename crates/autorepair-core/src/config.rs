//! Session configuration.
//!
//! Everything the orchestrator and oracle client need is carried in
//! [`RepairConfig`] and handed over at construction time.

use std::path::{Path, PathBuf};

use autorepair_oracle::{OracleConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepairError, Result};

/// Config file looked up in the project root when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "autorepair.toml";

/// Source-language specifics used by scanning and prompting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LanguageProfile {
    pub name: String,
    /// File extension without the leading dot
    pub extension: String,
    /// Tag used on fenced code blocks in prompts
    pub fence_tag: String,
    /// Files whose presence marks a project root
    pub project_markers: Vec<String>,
}

impl LanguageProfile {
    pub fn java() -> Self {
        Self {
            name: "Java".to_string(),
            extension: "java".to_string(),
            fence_tag: "java".to_string(),
            project_markers: vec!["pom.xml".to_string(), "build.gradle".to_string()],
        }
    }

    /// `<stem>.<extension>`
    pub fn filename_for(&self, stem: &str) -> String {
        format!("{stem}.{}", self.extension)
    }

    /// Whether `name` carries this language's extension.
    pub fn matches(&self, name: &str) -> bool {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
    }
}

impl Default for LanguageProfile {
    fn default() -> Self {
        Self::java()
    }
}

/// Top-level settings for one repair session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Retry ceiling for REJECT decisions
    pub max_retries: u32,
    /// Localizer expansion depth
    pub fanout_depth: usize,
    /// Only the last N characters of the error log are used
    pub error_log_tail_chars: usize,
    /// File names searched for when no error log is given
    pub error_log_names: Vec<String>,
    pub language: LanguageProfile,
    /// Context string handed to the validation stages
    pub change_context: String,
    /// Per-call oracle retry policy
    pub retry: RetryPolicy,
    /// Where session artifacts are written; disabled when unset
    pub artifacts_dir: Option<PathBuf>,
    pub oracle: OracleConfig,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            fanout_depth: 2,
            error_log_tail_chars: 5000,
            error_log_names: vec!["error.log".to_string(), "customs-engine.log".to_string()],
            language: LanguageProfile::java(),
            change_context: "automated fix applied from error log".to_string(),
            retry: RetryPolicy::default(),
            artifacts_dir: None,
            oracle: OracleConfig::default(),
        }
    }
}

impl RepairConfig {
    /// Load from `explicit`, else `<project_root>/autorepair.toml` if it
    /// exists, else defaults. The result is validated.
    pub fn load(explicit: Option<&Path>, project_root: &Path) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let candidate = project_root.join(CONFIG_FILE_NAME);
                candidate.is_file().then_some(candidate)
            }
        };

        let config = match path {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    RepairError::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(RepairError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.error_log_tail_chars == 0 {
            return Err(RepairError::Config(
                "error_log_tail_chars must be at least 1".to_string(),
            ));
        }
        if self.language.extension.trim().is_empty() {
            return Err(RepairError::Config(
                "language.extension must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RepairConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.fanout_depth, 2);
        assert_eq!(config.error_log_tail_chars, 5000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.backoff_secs, 60);
        assert_eq!(config.language.extension, "java");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RepairConfig::from_toml_str(
            r#"
            max_retries = 5

            [retry]
            backoff_secs = 1

            [oracle]
            model = "gemini-1.5-pro"
            "#,
        )
        .unwrap();

        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry.backoff_secs, 1);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.oracle.model, "gemini-1.5-pro");
        assert_eq!(config.fanout_depth, 2);
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let mut config = RepairConfig::default();
        config.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(RepairError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_tail() {
        let config = RepairConfig {
            error_log_tail_chars: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_prefers_project_file_then_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            RepairConfig::load(None, dir.path()).unwrap(),
            RepairConfig::default()
        );

        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "fanout_depth = 0\n").unwrap();
        assert_eq!(RepairConfig::load(None, dir.path()).unwrap().fanout_depth, 0);
    }

    #[test]
    fn test_load_missing_explicit_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = RepairConfig::load(Some(&dir.path().join("nope.toml")), dir.path()).unwrap_err();
        assert!(matches!(err, RepairError::Config(_)));
    }

    #[test]
    fn test_language_matches_extension() {
        let java = LanguageProfile::java();
        assert!(java.matches("Foo.java"));
        assert!(java.matches("Foo.JAVA"));
        assert!(!java.matches("Foo.kt"));
        assert_eq!(java.filename_for("Bar"), "Bar.java");
    }
}
