use crate::error::*;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::Classifier(e) => {
                error!("Classifier error details: {:?}", e);
            }
            CoreError::Store(e) => {
                error!("Store error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::Classifier(e) => e.is_retryable(),
            CoreError::Store(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::Serialization(_) => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::Classifier(e) => e.retry_after(),
            CoreError::Store(e) => e.retry_after(),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::Classifier(e) => e.user_friendly_message(),
            CoreError::Store(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Extract(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Network connection error. Please check your internet connection.".to_string()
            }
            CoreError::Io(e) => format!("File access failed: {}", e),
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::Classifier(_) => "CLASSIFIER".to_string(),
            CoreError::Store(_) => "STORE".to_string(),
            CoreError::Config(_) => "CONFIG".to_string(),
            CoreError::Extract(_) => "EXTRACT".to_string(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::Serialization(_) => "SERIALIZATION".to_string(),
            CoreError::Network(_) => "NETWORK".to_string(),
            CoreError::Internal { .. } => "INTERNAL".to_string(),
        }
    }
}

impl ErrorExt for ClassifierError {
    fn log_error(&self) -> &Self {
        error!("ClassifierError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ClassifierError (warning): {}", self);
        self
    }

    // Every failure except a missing credential counts against the retry budget.
    fn is_retryable(&self) -> bool {
        !matches!(self, ClassifierError::MissingCredential { .. })
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ClassifierError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ClassifierError::MissingCredential { provider } => format!(
                "No API key available for {}. Set it in the environment or enter it when prompted.",
                provider
            ),
            ClassifierError::BadRequest { .. } => {
                "The classifier rejected the post text.".to_string()
            }
            ClassifierError::RateLimitExceeded { retry_after } => format!(
                "Too many requests. Please wait {} seconds before trying again.",
                retry_after
            ),
            ClassifierError::Transport { .. } => {
                "Could not reach the classifier. Please check your connection.".to_string()
            }
            _ => "Classifier error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ClassifierError::MissingCredential { .. } => "CLASSIFIER_MISSING_CREDENTIAL".to_string(),
            ClassifierError::BadRequest { .. } => "CLASSIFIER_BAD_REQUEST".to_string(),
            ClassifierError::RateLimitExceeded { .. } => "CLASSIFIER_RATE_LIMIT".to_string(),
            ClassifierError::UnexpectedStatus { .. } => "CLASSIFIER_UNEXPECTED_STATUS".to_string(),
            ClassifierError::Transport { .. } => "CLASSIFIER_TRANSPORT".to_string(),
            ClassifierError::InvalidResponse { .. } => "CLASSIFIER_INVALID_RESPONSE".to_string(),
        }
    }
}

impl ErrorExt for StoreError {
    fn log_error(&self) -> &Self {
        error!("StoreError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("StoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(self, StoreError::ConnectionFailed { .. })
    }

    // Store failures are never retried in place.
    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            StoreError::ConnectionFailed { .. } => {
                "Cache database connection failed. Please try again.".to_string()
            }
            StoreError::NotConnected => "Cache database is not open.".to_string(),
            StoreError::CorruptEntry { key } => {
                format!("Cached entry '{}' could not be read.", key)
            }
            _ => "Cache database error occurred.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            StoreError::ConnectionFailed { .. } => "STORE_CONNECTION_FAILED".to_string(),
            StoreError::MigrationFailed { .. } => "STORE_MIGRATION_FAILED".to_string(),
            StoreError::NotConnected => "STORE_NOT_CONNECTED".to_string(),
            StoreError::CorruptEntry { .. } => "STORE_CORRUPT_ENTRY".to_string(),
            StoreError::Sql(_) => "STORE_SQL_ERROR".to_string(),
        }
    }
}

impl ErrorExt for ExtractError {
    fn log_error(&self) -> &Self {
        error!("ExtractError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ExtractError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ExtractError::InvalidSelector { selector, .. } => {
                format!("The page selector '{}' is not valid CSS.", selector)
            }
            ExtractError::InvalidBaseUrl { url, .. } => {
                format!("The page base URL '{}' is not a valid URL.", url)
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ExtractError::InvalidSelector { .. } => "EXTRACT_INVALID_SELECTOR".to_string(),
            ExtractError::InvalidBaseUrl { .. } => "EXTRACT_INVALID_BASE_URL".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' was not found.", path)
            }
            ConfigError::MissingField { field } => {
                format!("Configuration is missing required field '{}'.", field)
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::ValidationFailed { reason } => {
                format!("Configuration is invalid: {}", reason)
            }
            _ => "Configuration error occurred. Please check your settings.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::MissingField { .. } => "CONFIG_MISSING_FIELD".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
            ConfigError::Serialize(_) => "CONFIG_SERIALIZE_ERROR".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorReporter;

impl ErrorReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn report_error(&self, error: &CoreError) {
        error.log_error();
        info!("Error code: {}", error.error_code());
        info!("User message: {}", error.user_friendly_message());
        if error.is_retryable() {
            if let Some(retry_after) = error.retry_after() {
                info!("Error is retryable. Retry after: {:?}", retry_after);
            }
        }
    }

    /// Logs an error the caller recovers from.
    pub fn report_warning(&self, error: &CoreError) {
        error.log_warn();
        debug!("Error code: {}", error.error_code());
    }
}
