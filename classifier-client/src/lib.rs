pub mod credential;
pub mod prompt;
pub mod retry;
pub mod transport;

pub use credential::{CredentialPrompt, CredentialProvider, CredentialSource, NoPrompt};
pub use prompt::{build_request, parse_response, system_prompt, ChatMessage, ChatRequest};
pub use retry::{RetryConfig, RetryExecutor, RetryMetrics};
pub use transport::{ChatTransport, ReqwestTransport, TransportResponse};

use async_trait::async_trait;
use feedguard_core::{
    AnalysisResult, ClassifierError, ClassifierSettings, CoreError, TopicSpec,
};
use std::sync::Arc;
use tracing::{debug, error};

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Scores `text` against the configured topics.
    ///
    /// Only a missing credential is an error. Exhausting the attempt budget
    /// yields [`AnalysisResult::unavailable`].
    async fn classify(&self, text: &str) -> Result<AnalysisResult, CoreError>;
}

/// Classifier backed by the Groq chat-completion API.
pub struct GroqClassifier {
    settings: ClassifierSettings,
    system_prompt: String,
    transport: Arc<dyn ChatTransport>,
    credentials: CredentialSource,
    executor: RetryExecutor,
}

impl GroqClassifier {
    pub fn new(
        topics: Arc<[TopicSpec]>,
        settings: ClassifierSettings,
        transport: Arc<dyn ChatTransport>,
        credentials: CredentialSource,
    ) -> Self {
        let executor = RetryExecutor::new(RetryConfig::classifier(&settings));
        Self {
            system_prompt: system_prompt(&topics),
            settings,
            transport,
            credentials,
            executor,
        }
    }

    pub fn retry_metrics(&self) -> RetryMetrics {
        self.executor.get_metrics()
    }

    async fn attempt(&self, request: &ChatRequest, api_key: &str) -> Result<AnalysisResult, CoreError> {
        let response = self.transport.send(request, api_key).await?;

        match response.status {
            200..=299 => parse_response(&response.body),
            400 => Err(ClassifierError::BadRequest {
                details: response.body.chars().take(200).collect(),
            }
            .into()),
            429 => Err(ClassifierError::RateLimitExceeded {
                retry_after: response.retry_after.unwrap_or(0),
            }
            .into()),
            status_code => Err(ClassifierError::UnexpectedStatus { status_code }.into()),
        }
    }
}

#[async_trait]
impl Classifier for GroqClassifier {
    async fn classify(&self, text: &str) -> Result<AnalysisResult, CoreError> {
        let api_key = self.credentials.api_key().await?;
        let request = build_request(&self.system_prompt, text, &self.settings);

        match self
            .executor
            .execute("classify", || self.attempt(&request, &api_key))
            .await
        {
            Ok(result) => {
                debug!("Classified post text ({} chars)", text.chars().count());
                Ok(result)
            }
            Err(e) => {
                error!("Max retries reached. Returning empty object. Last error: {}", e);
                Ok(AnalysisResult::unavailable())
            }
        }
    }
}
