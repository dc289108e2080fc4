//! Colloquy configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main Colloquy configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ColloquyConfig {
    /// Analysis pipeline configuration
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Conversation store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Analysis pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Number of analysis worker tasks
    pub workers: usize,

    /// Language for rule-based token processing (ISO 639-1)
    pub language: String,

    /// Maximum number of re-read-and-retry attempts after a conditional
    /// store write fails with a concurrent modification
    pub max_commit_retries: u32,

    /// Base backoff between commit retries, in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            language: "en".to_string(),
            max_commit_retries: 3,
            retry_backoff_ms: 50,
        }
    }
}

/// Conversation store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Maximum number of messages kept per conversation. Older messages
    /// are dropped from the head once the window is exceeded.
    pub message_window: usize,

    /// Directory for persisted conversation documents. `None` keeps the
    /// store purely in-memory.
    pub data_dir: Option<std::path::PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            message_window: 50,
            data_dir: None,
        }
    }
}

impl ColloquyConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ColloquyConfig::default();
        assert_eq!(config.analysis.workers, 2);
        assert_eq!(config.analysis.language, "en");
        assert_eq!(config.analysis.max_commit_retries, 3);
        assert_eq!(config.store.message_window, 50);
        assert!(config.store.data_dir.is_none());
    }

    #[test]
    fn test_parse_partial_config() {
        let config: ColloquyConfig = toml::from_str(
            r#"
            [analysis]
            workers = 4
            language = "de"
            max_commit_retries = 5
            retry_backoff_ms = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.analysis.workers, 4);
        assert_eq!(config.analysis.language, "de");
        // store section omitted entirely falls back to defaults
        assert_eq!(config.store.message_window, 50);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("colloquy.toml");
        std::fs::write(
            &path,
            r#"
            [store]
            message_window = 20
            "#,
        )
        .unwrap();

        let config = ColloquyConfig::from_file(&path).unwrap();
        assert_eq!(config.store.message_window, 20);
        assert_eq!(config.analysis.workers, 2);
    }

    #[test]
    fn test_from_file_missing() {
        assert!(ColloquyConfig::from_file("/nonexistent/colloquy.toml").is_err());
    }
}
