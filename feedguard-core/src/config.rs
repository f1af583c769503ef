//! Filter configuration loaded from TOML.
//!
//! Every section has defaults reproducing the stock deployment (two topics on
//! x.com, the Groq chat-completion endpoint, a local SQLite cache), so an empty
//! file or no file at all yields a usable configuration.

use crate::error::{ConfigError, CoreError};
use crate::types::TopicSpec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub topics: Vec<TopicSpec>,
    pub classifier: ClassifierSettings,
    pub page: PageContract,
    pub storage: StorageSettings,
    pub scan: ScanSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    pub endpoint: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds; 0 retries immediately.
    pub retry_delay_ms: u64,
    pub max_delay_ms: u64,
    pub api_key_env: String,
    pub credential_key: String,
    /// 0 disables the request timeout.
    pub request_timeout_secs: u64,
}

/// Markers describing how posts appear in the rendered feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageContract {
    pub host: String,
    pub base_url: String,
    pub container_selector: String,
    pub article_selector: String,
    pub text_selector: String,
    pub status_marker: String,
    pub permalink_base: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub database_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub debounce_ms: u64,
    pub snippet_chars: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            topics: vec![
                TopicSpec::new("politics", "posts about political subjects", 0.8),
                TopicSpec::new("negativity", "posts with overly negative sentiment", 0.9),
            ],
            classifier: ClassifierSettings::default(),
            page: PageContract::default(),
            storage: StorageSettings::default(),
            scan: ScanSettings::default(),
        }
    }
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            temperature: 1.0,
            max_tokens: 1024,
            top_p: 1.0,
            max_attempts: 3,
            retry_delay_ms: 0,
            max_delay_ms: 30_000,
            api_key_env: "GROQ_API_KEY".to_string(),
            credential_key: "GROQ_API_KEY".to_string(),
            request_timeout_secs: 0,
        }
    }
}

impl Default for PageContract {
    fn default() -> Self {
        Self {
            host: "x.com".to_string(),
            base_url: "https://x.com/".to_string(),
            container_selector: r#"[data-testid="cellInnerDiv"]"#.to_string(),
            article_selector: r#"article[data-testid="tweet"]"#.to_string(),
            text_selector: r#"[data-testid="tweetText"]"#.to_string(),
            status_marker: "status".to_string(),
            permalink_base: "https://x.com/user/status/".to_string(),
        }
    }
}

impl PageContract {
    pub fn permalink(&self, post_id: &str) -> String {
        format!("{}{}", self.permalink_base, post_id)
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://feedguard.db".to_string(),
        }
    }
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            snippet_chars: 280,
        }
    }
}

impl FilterConfig {
    pub fn parse_toml(content: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CoreError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                CoreError::Io(e)
            }
        })?;
        Self::parse_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, CoreError> {
        Ok(toml::to_string_pretty(self).map_err(ConfigError::Serialize)?)
    }

    /// Topic list shared by the classifier prompt and the visibility policy.
    pub fn topic_specs(&self) -> Arc<[TopicSpec]> {
        Arc::from(self.topics.clone())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.topics.is_empty() {
            return Err(ConfigError::MissingField {
                field: "topics".to_string(),
            }
            .into());
        }

        let mut seen = HashSet::new();
        for topic in &self.topics {
            if topic.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed {
                    reason: "topic names must not be empty".to_string(),
                }
                .into());
            }
            if !seen.insert(topic.name.as_str()) {
                return Err(ConfigError::ValidationFailed {
                    reason: format!("duplicate topic '{}'", topic.name),
                }
                .into());
            }
            if !(0.0..=1.0).contains(&topic.threshold) {
                return Err(ConfigError::InvalidValue {
                    field: format!("topics.{}.threshold", topic.name),
                    value: topic.threshold.to_string(),
                }
                .into());
            }
        }

        if self.classifier.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "classifier.max_attempts".to_string(),
                value: "0".to_string(),
            }
            .into());
        }
        if self.classifier.endpoint.is_empty() {
            return Err(ConfigError::MissingField {
                field: "classifier.endpoint".to_string(),
            }
            .into());
        }
        if self.scan.debounce_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "scan.debounce_ms".to_string(),
                value: "0".to_string(),
            }
            .into());
        }

        Ok(())
    }
}
