use crate::prompt::ChatRequest;
use async_trait::async_trait;
use feedguard_core::{ClassifierError, ClassifierSettings, CoreError};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Raw outcome of one request to the chat-completion endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    /// `retry-after` header, in seconds
    pub retry_after: Option<u64>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// One outbound request. Transport failures are errors; any HTTP status
    /// is a response.
    async fn send(&self, request: &ChatRequest, api_key: &str) -> Result<TransportResponse, CoreError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http_client: Client,
    endpoint: String,
}

impl ReqwestTransport {
    pub fn new(settings: &ClassifierSettings) -> Result<Self, CoreError> {
        let mut builder = Client::builder();
        if settings.request_timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(settings.request_timeout_secs));
        }

        Ok(Self {
            http_client: builder.build()?,
            endpoint: settings.endpoint.clone(),
        })
    }
}

#[async_trait]
impl ChatTransport for ReqwestTransport {
    async fn send(&self, request: &ChatRequest, api_key: &str) -> Result<TransportResponse, CoreError> {
        let start_time = Instant::now();

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                error!("Network error for POST {}: {}", self.endpoint, e);
                ClassifierError::Transport {
                    reason: e.to_string(),
                }
            })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        let body = response.text().await.map_err(|e| ClassifierError::Transport {
            reason: format!("failed to read response body: {}", e),
        })?;

        debug!(
            "POST {} answered {} in {:?}",
            self.endpoint,
            status,
            start_time.elapsed()
        );

        Ok(TransportResponse {
            status,
            body,
            retry_after,
        })
    }
}
