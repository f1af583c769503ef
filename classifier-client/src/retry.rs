use feedguard_core::{ClassifierError, ClassifierSettings, CoreError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, the first one included
    pub max_attempts: u32,
    /// Base delay for exponential backoff (in milliseconds); 0 retries immediately
    pub base_delay_ms: u64,
    /// Maximum delay between retries (in milliseconds)
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Maximum jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 0,
            max_delay_ms: 30000, // 30 seconds
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    /// Retry config for the classifier endpoint
    pub fn classifier(settings: &ClassifierSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay_ms: settings.retry_delay_ms,
            max_delay_ms: settings.max_delay_ms,
            backoff_multiplier: 2.0,
            jitter_factor: if settings.retry_delay_ms > 0 { 0.1 } else { 0.0 },
        }
    }
}

/// Retry strategy based on error type
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry after the configured backoff
    Retry,
    /// Retry after a delay the server asked for
    RetryWithDelay(Duration),
    /// Don't retry (for permanent failures)
    NoRetry,
}

/// Determine retry strategy based on error type
pub fn get_retry_strategy(error: &CoreError) -> RetryStrategy {
    match error {
        CoreError::Classifier(classifier_error) => match classifier_error {
            // Asking the operator again will not help within one call
            ClassifierError::MissingCredential { .. } => RetryStrategy::NoRetry,
            ClassifierError::RateLimitExceeded { retry_after } => {
                RetryStrategy::RetryWithDelay(Duration::from_secs(*retry_after))
            }
            // Rejected input, bad statuses, transport and parse failures all
            // spend the attempt budget
            ClassifierError::BadRequest { .. }
            | ClassifierError::UnexpectedStatus { .. }
            | ClassifierError::Transport { .. }
            | ClassifierError::InvalidResponse { .. } => RetryStrategy::Retry,
        },
        CoreError::Network(_) | CoreError::Serialization(_) => RetryStrategy::Retry,
        _ => RetryStrategy::NoRetry,
    }
}

/// Calculate delay with exponential backoff and jitter
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    if config.base_delay_ms == 0 {
        return Duration::ZERO;
    }

    let base_delay = Duration::from_millis(config.base_delay_ms);
    let max_delay = Duration::from_millis(config.max_delay_ms);

    let exponential_delay = if attempt == 0 {
        base_delay
    } else {
        let multiplier = config.backoff_multiplier.powi(attempt as i32);
        let delay_ms = (config.base_delay_ms as f64 * multiplier) as u64;
        Duration::from_millis(delay_ms.min(config.max_delay_ms))
    };

    let jitter_range = (exponential_delay.as_millis() as f64 * config.jitter_factor) as u64;
    let jitter = fastrand::u64(0..=jitter_range);
    let final_delay = exponential_delay + Duration::from_millis(jitter);

    final_delay.min(max_delay)
}

/// Retry metrics for monitoring
#[derive(Debug, Clone, Default)]
pub struct RetryMetrics {
    pub total_attempts: u64,
    pub total_retries: u64,
    pub successful_retries: u64,
    pub failed_operations: u64,
}

/// Retry executor that wraps operations with a bounded attempt budget
#[derive(Debug)]
pub struct RetryExecutor {
    config: RetryConfig,
    metrics: Arc<Mutex<RetryMetrics>>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(Mutex::new(RetryMetrics::default())),
        }
    }

    /// Execute an operation, retrying retryable failures until the attempt
    /// budget is spent. The last error is returned on exhaustion.
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut last_error: Option<CoreError> = None;
        let mut attempts_made = 0u32;

        for attempt in 0..self.config.max_attempts {
            if attempt > 0 {
                debug!("Retry attempt {} for {}", attempt, operation_name);
            }

            attempts_made += 1;
            self.metrics().total_attempts += 1;

            let start_time = Instant::now();
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        let mut metrics = self.metrics();
                        metrics.total_retries += attempt as u64;
                        metrics.successful_retries += 1;
                        drop(metrics);

                        info!(
                            "Operation {} succeeded after {} retries",
                            operation_name, attempt
                        );
                    }
                    return Ok(result);
                }
                Err(error) => {
                    debug!(
                        "Attempt {} failed for {} after {:?}: {}",
                        attempt + 1,
                        operation_name,
                        start_time.elapsed(),
                        error
                    );

                    let should_retry = attempt + 1 < self.config.max_attempts;
                    let delay = match get_retry_strategy(&error) {
                        RetryStrategy::NoRetry => {
                            debug!(
                                "Not retrying {} due to error type: {}",
                                operation_name, error
                            );
                            last_error = Some(error);
                            break;
                        }
                        RetryStrategy::Retry => calculate_delay(attempt, &self.config),
                        RetryStrategy::RetryWithDelay(delay) => {
                            delay.min(Duration::from_millis(self.config.max_delay_ms))
                        }
                    };

                    last_error = Some(error);
                    if !should_retry {
                        break;
                    }

                    if !delay.is_zero() {
                        info!("Retrying {} in {:?}", operation_name, delay);
                        sleep(delay).await;
                    }
                }
            }
        }

        {
            let mut metrics = self.metrics();
            metrics.total_retries += attempts_made.saturating_sub(1) as u64;
            metrics.failed_operations += 1;
        }

        error!(
            "Operation {} failed after {} attempts",
            operation_name, attempts_made
        );

        Err(last_error.unwrap_or_else(|| CoreError::Internal {
            message: format!("{} was given no attempts", operation_name),
        }))
    }

    /// Get current retry metrics
    pub fn get_metrics(&self) -> RetryMetrics {
        self.metrics().clone()
    }

    fn metrics(&self) -> MutexGuard<'_, RetryMetrics> {
        self.metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bad_request() -> CoreError {
        CoreError::Classifier(ClassifierError::BadRequest {
            details: "too long".to_string(),
        })
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.base_delay_ms, 0);
    }

    #[test]
    fn test_retry_config_from_settings() {
        let settings = ClassifierSettings {
            max_attempts: 5,
            retry_delay_ms: 250,
            ..Default::default()
        };
        let config = RetryConfig::classifier(&settings);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.base_delay_ms, 250);
        assert_eq!(config.jitter_factor, 0.1);
    }

    #[test]
    fn test_retry_strategy_for_errors() {
        assert_eq!(get_retry_strategy(&bad_request()), RetryStrategy::Retry);

        let missing = CoreError::Classifier(ClassifierError::MissingCredential {
            provider: "groq".to_string(),
        });
        assert_eq!(get_retry_strategy(&missing), RetryStrategy::NoRetry);

        let limited = CoreError::Classifier(ClassifierError::RateLimitExceeded { retry_after: 2 });
        assert_eq!(
            get_retry_strategy(&limited),
            RetryStrategy::RetryWithDelay(Duration::from_secs(2))
        );

        let internal = CoreError::Internal {
            message: "boom".to_string(),
        };
        assert_eq!(get_retry_strategy(&internal), RetryStrategy::NoRetry);
    }

    #[test]
    fn test_zero_base_delay_retries_immediately() {
        let config = RetryConfig::default();
        assert_eq!(calculate_delay(0, &config), Duration::ZERO);
        assert_eq!(calculate_delay(5, &config), Duration::ZERO);
    }

    #[test]
    fn test_exponential_backoff_calculation() {
        let config = RetryConfig {
            base_delay_ms: 1000,
            max_delay_ms: 10000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
            ..Default::default()
        };

        assert_eq!(calculate_delay(0, &config), Duration::from_millis(1000));
        assert_eq!(calculate_delay(1, &config), Duration::from_millis(2000));
        assert_eq!(calculate_delay(2, &config), Duration::from_millis(4000));
        assert_eq!(calculate_delay(10, &config), Duration::from_millis(10000));
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let executor = RetryExecutor::new(RetryConfig::default());

        let result = executor
            .execute("test_operation", || async { Ok::<i32, CoreError>(42) })
            .await;

        assert_eq!(result.unwrap(), 42);
        let metrics = executor.get_metrics();
        assert_eq!(metrics.total_attempts, 1);
        assert_eq!(metrics.total_retries, 0);
    }

    #[tokio::test]
    async fn test_success_after_retries() {
        let executor = RetryExecutor::new(RetryConfig::default());
        let attempt_count = Arc::new(Mutex::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result = executor
            .execute("test_operation", move || {
                let attempt_count = attempt_count_clone.clone();
                async move {
                    let mut count = attempt_count.lock().unwrap();
                    *count += 1;
                    if *count < 3 {
                        Err(bad_request())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        let metrics = executor.get_metrics();
        assert_eq!(metrics.total_retries, 2);
        assert_eq!(metrics.successful_retries, 1);
    }

    #[tokio::test]
    async fn test_attempt_budget_is_bounded() {
        let executor = RetryExecutor::new(RetryConfig::default());
        let attempt_count = Arc::new(Mutex::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result = executor
            .execute("test_operation", move || {
                let attempt_count = attempt_count_clone.clone();
                async move {
                    *attempt_count.lock().unwrap() += 1;
                    Err::<i32, CoreError>(bad_request())
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(CoreError::Classifier(ClassifierError::BadRequest { .. }))
        ));
        assert_eq!(*attempt_count.lock().unwrap(), 3);
        assert_eq!(executor.get_metrics().failed_operations, 1);
    }

    #[tokio::test]
    async fn test_no_retry_on_missing_credential() {
        let executor = RetryExecutor::new(RetryConfig::default());
        let attempt_count = Arc::new(Mutex::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result = executor
            .execute("test_operation", move || {
                let attempt_count = attempt_count_clone.clone();
                async move {
                    *attempt_count.lock().unwrap() += 1;
                    Err::<i32, CoreError>(CoreError::Classifier(
                        ClassifierError::MissingCredential {
                            provider: "groq".to_string(),
                        },
                    ))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(*attempt_count.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_delay_is_capped() {
        let executor = RetryExecutor::new(RetryConfig {
            max_attempts: 2,
            max_delay_ms: 500,
            ..Default::default()
        });

        let started = tokio::time::Instant::now();
        let result = executor
            .execute("test_operation", || async {
                Err::<i32, CoreError>(CoreError::Classifier(
                    ClassifierError::RateLimitExceeded { retry_after: 60 },
                ))
            })
            .await;

        assert!(result.is_err());
        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
