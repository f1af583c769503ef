use async_trait::async_trait;
use feedguard_core::{ClassifierError, CoreError, ErrorExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

/// Persistent home of the API credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn load(&self) -> Result<Option<String>, CoreError>;
    async fn store(&self, value: &str) -> Result<(), CoreError>;
}

/// Asks the operator for a credential. `None` means they declined.
pub trait CredentialPrompt: Send + Sync {
    fn ask(&self, provider: &str) -> Option<String>;
}

/// Prompt for non-interactive runs: always declines.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl CredentialPrompt for NoPrompt {
    fn ask(&self, _provider: &str) -> Option<String> {
        None
    }
}

/// Lazily acquired, memoized API key.
///
/// Lookup order is environment variable, stored value, then the operator.
/// A value the operator enters is persisted. Once the operator declines they
/// are not asked again by this source; later calls still look at the
/// environment and the store.
pub struct CredentialSource {
    provider: String,
    env_var: Option<String>,
    store: Arc<dyn CredentialProvider>,
    prompt: Arc<dyn CredentialPrompt>,
    key: OnceCell<String>,
    declined: AtomicBool,
}

impl CredentialSource {
    pub fn new(
        provider: impl Into<String>,
        store: Arc<dyn CredentialProvider>,
        prompt: Arc<dyn CredentialPrompt>,
    ) -> Self {
        Self {
            provider: provider.into(),
            env_var: None,
            store,
            prompt,
            key: OnceCell::new(),
            declined: AtomicBool::new(false),
        }
    }

    pub fn with_env_var(mut self, env_var: impl Into<String>) -> Self {
        self.env_var = Some(env_var.into());
        self
    }

    pub async fn api_key(&self) -> Result<String, CoreError> {
        self.key
            .get_or_try_init(|| self.acquire())
            .await
            .map(|key| key.clone())
    }

    async fn acquire(&self) -> Result<String, CoreError> {
        if let Some(var_name) = &self.env_var {
            if let Some(value) = std::env::var(var_name).ok().filter(|v| !v.trim().is_empty()) {
                debug!("Using {} credential from ${}", self.provider, var_name);
                return Ok(value.trim().to_string());
            }
        }

        match self.store.load().await {
            Ok(Some(value)) if !value.trim().is_empty() => {
                debug!("Using stored {} credential", self.provider);
                return Ok(value);
            }
            Ok(_) => {}
            Err(e) => {
                e.log_warn();
            }
        }

        if self.declined.load(Ordering::SeqCst) {
            return Err(self.missing());
        }

        let entered = self
            .ask_operator()
            .await
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        match entered {
            Some(value) => {
                if let Err(e) = self.store.store(&value).await {
                    warn!("Could not persist {} credential: {}", self.provider, e);
                } else {
                    info!("Stored {} credential for later runs", self.provider);
                }
                Ok(value)
            }
            None => {
                warn!("No {} credential entered, skipping analysis", self.provider);
                self.declined.store(true, Ordering::SeqCst);
                Err(self.missing())
            }
        }
    }

    /// Prompts block on terminal input, so they run off the async workers.
    async fn ask_operator(&self) -> Option<String> {
        let prompt = Arc::clone(&self.prompt);
        let provider = self.provider.clone();
        match tokio::task::spawn_blocking(move || prompt.ask(&provider)).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("{} credential prompt failed: {}", self.provider, e);
                None
            }
        }
    }

    fn missing(&self) -> CoreError {
        ClassifierError::MissingCredential {
            provider: self.provider.clone(),
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryCredential {
        value: Mutex<Option<String>>,
        stores: AtomicUsize,
    }

    #[async_trait]
    impl CredentialProvider for MemoryCredential {
        async fn load(&self) -> Result<Option<String>, CoreError> {
            Ok(self.value.lock().unwrap().clone())
        }

        async fn store(&self, value: &str) -> Result<(), CoreError> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            *self.value.lock().unwrap() = Some(value.to_string());
            Ok(())
        }
    }

    struct ScriptedPrompt {
        answers: Mutex<Vec<Option<String>>>,
        asked: AtomicUsize,
    }

    impl ScriptedPrompt {
        fn new(answers: Vec<Option<&str>>) -> Self {
            Self {
                answers: Mutex::new(answers.into_iter().map(|a| a.map(String::from)).collect()),
                asked: AtomicUsize::new(0),
            }
        }
    }

    impl CredentialPrompt for ScriptedPrompt {
        fn ask(&self, _provider: &str) -> Option<String> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                None
            } else {
                answers.remove(0)
            }
        }
    }

    #[tokio::test]
    async fn test_stored_credential_skips_prompt() {
        let store = Arc::new(MemoryCredential::default());
        *store.value.lock().unwrap() = Some("gsk_stored".to_string());
        let prompt = Arc::new(ScriptedPrompt::new(vec![]));

        let source = CredentialSource::new("groq", store.clone(), prompt.clone());
        assert_eq!(source.api_key().await.unwrap(), "gsk_stored");
        assert_eq!(prompt.asked.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_prompted_credential_is_persisted_and_memoized() {
        let store = Arc::new(MemoryCredential::default());
        let prompt = Arc::new(ScriptedPrompt::new(vec![Some("  gsk_entered ")]));

        let source = CredentialSource::new("groq", store.clone(), prompt.clone());
        assert_eq!(source.api_key().await.unwrap(), "gsk_entered");
        assert_eq!(source.api_key().await.unwrap(), "gsk_entered");

        assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
        assert_eq!(store.stores.load(Ordering::SeqCst), 1);
        assert_eq!(store.load().await.unwrap(), Some("gsk_entered".to_string()));
    }

    #[tokio::test]
    async fn test_declined_prompt_is_not_asked_again() {
        let store = Arc::new(MemoryCredential::default());
        let prompt = Arc::new(ScriptedPrompt::new(vec![None, Some("gsk_later")]));

        let source = CredentialSource::new("groq", store.clone(), prompt.clone());
        let err = source.api_key().await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Classifier(ClassifierError::MissingCredential { .. })
        ));
        assert_eq!(store.stores.load(Ordering::SeqCst), 0);

        assert!(source.api_key().await.is_err());
        assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_declined_prompt() {
        let store = Arc::new(MemoryCredential::default());
        let prompt = Arc::new(ScriptedPrompt::new(vec![None, None, None, None]));
        let source = CredentialSource::new("groq", store, prompt.clone());

        let results = tokio::join!(
            source.api_key(),
            source.api_key(),
            source.api_key(),
            source.api_key()
        );

        assert!(results.0.is_err() && results.1.is_err());
        assert!(results.2.is_err() && results.3.is_err());
        assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stored_credential_found_after_decline() {
        let store = Arc::new(MemoryCredential::default());
        let prompt = Arc::new(ScriptedPrompt::new(vec![None]));
        let source = CredentialSource::new("groq", store.clone(), prompt.clone());

        assert!(source.api_key().await.is_err());
        *store.value.lock().unwrap() = Some("gsk_saved_elsewhere".to_string());
        assert_eq!(source.api_key().await.unwrap(), "gsk_saved_elsewhere");
        assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_blank_answer_counts_as_declined() {
        let store = Arc::new(MemoryCredential::default());
        let source = CredentialSource::new(
            "groq",
            store,
            Arc::new(ScriptedPrompt::new(vec![Some("   ")])),
        );
        assert!(source.api_key().await.is_err());
    }

    #[tokio::test]
    async fn test_environment_variable_takes_precedence() {
        let var_name = "FEEDGUARD_TEST_CREDENTIAL_PRECEDENCE";
        std::env::set_var(var_name, "gsk_env");

        let store = Arc::new(MemoryCredential::default());
        *store.value.lock().unwrap() = Some("gsk_stored".to_string());
        let source = CredentialSource::new("groq", store, Arc::new(NoPrompt)).with_env_var(var_name);

        assert_eq!(source.api_key().await.unwrap(), "gsk_env");
        std::env::remove_var(var_name);
    }
}
