use async_trait::async_trait;
use classifier_client::{
    ChatRequest, ChatTransport, Classifier, CredentialPrompt, CredentialProvider,
    CredentialSource, GroqClassifier, NoPrompt, TransportResponse,
};
use feedguard_core::{ClassifierError, ClassifierSettings, CoreError, FilterConfig};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replays scripted responses; once the script runs out it keeps failing.
struct ScriptedTransport {
    script: Mutex<Vec<Result<TransportResponse, CoreError>>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<(ChatRequest, String)>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Result<TransportResponse, CoreError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn send(&self, request: &ChatRequest, api_key: &str) -> Result<TransportResponse, CoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((request.clone(), api_key.to_string()));

        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            Err(ClassifierError::Transport {
                reason: "script exhausted".to_string(),
            }
            .into())
        } else {
            script.remove(0)
        }
    }
}

struct FixedKey(Option<String>);

#[async_trait]
impl CredentialProvider for FixedKey {
    async fn load(&self) -> Result<Option<String>, CoreError> {
        Ok(self.0.clone())
    }

    async fn store(&self, _value: &str) -> Result<(), CoreError> {
        Ok(())
    }
}

struct CountingPrompt(AtomicUsize);

impl CredentialPrompt for CountingPrompt {
    fn ask(&self, _provider: &str) -> Option<String> {
        self.0.fetch_add(1, Ordering::SeqCst);
        None
    }
}

fn ok(content: serde_json::Value) -> Result<TransportResponse, CoreError> {
    Ok(TransportResponse {
        status: 200,
        body: json!({
            "choices": [{"message": {"role": "assistant", "content": content.to_string()}}]
        })
        .to_string(),
        retry_after: None,
    })
}

fn status(code: u16) -> Result<TransportResponse, CoreError> {
    Ok(TransportResponse {
        status: code,
        body: "{\"error\": {\"message\": \"nope\"}}".to_string(),
        retry_after: None,
    })
}

fn classifier(transport: Arc<ScriptedTransport>) -> GroqClassifier {
    let config = FilterConfig::default();
    let credentials = CredentialSource::new(
        "groq",
        Arc::new(FixedKey(Some("gsk_test".to_string()))),
        Arc::new(NoPrompt),
    );
    GroqClassifier::new(
        config.topic_specs(),
        ClassifierSettings::default(),
        transport,
        credentials,
    )
}

#[tokio::test]
async fn test_success_returns_scores_verbatim() {
    let transport = ScriptedTransport::new(vec![ok(json!({"politics": 0.85, "negativity": 0.1}))]);
    let classifier = classifier(transport.clone());

    let result = classifier.classify("vote tomorrow").await.unwrap();
    assert_eq!(result.score("politics"), Some(0.85));
    assert_eq!(result.score("negativity"), Some(0.1));
    assert_eq!(transport.calls(), 1);

    let seen = transport.seen.lock().unwrap();
    let (request, api_key) = &seen[0];
    assert_eq!(api_key, "gsk_test");
    assert_eq!(request.messages[1].content, "vote tomorrow");
    assert!(request.messages[0].content.contains("politics: posts about political subjects"));
}

#[tokio::test]
async fn test_bad_request_is_retried() {
    let transport = ScriptedTransport::new(vec![status(400), ok(json!({"politics": 0.2}))]);
    let classifier = classifier(transport.clone());

    let result = classifier.classify("text").await.unwrap();
    assert_eq!(result.score("politics"), Some(0.2));
    assert_eq!(transport.calls(), 2);
    assert_eq!(classifier.retry_metrics().successful_retries, 1);
}

#[tokio::test]
async fn test_exhausted_retries_return_empty_result() {
    let transport = ScriptedTransport::new(vec![status(400), status(400), status(400), status(400)]);
    let classifier = classifier(transport.clone());

    let result = classifier.classify("text").await.unwrap();
    assert!(result.is_unavailable());
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_transport_and_parse_failures_share_the_budget() {
    let transport = ScriptedTransport::new(vec![
        Err(ClassifierError::Transport {
            reason: "reset".to_string(),
        }
        .into()),
        Ok(TransportResponse {
            status: 200,
            body: "<html>gateway</html>".to_string(),
            retry_after: None,
        }),
        status(500),
        ok(json!({"politics": 0.9})),
    ]);
    let classifier = classifier(transport.clone());

    let result = classifier.classify("text").await.unwrap();
    assert!(result.is_unavailable());
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_missing_credential_aborts_without_requests() {
    let transport = ScriptedTransport::new(vec![ok(json!({"politics": 0.9}))]);
    let prompt = Arc::new(CountingPrompt(AtomicUsize::new(0)));
    let credentials = CredentialSource::new("groq", Arc::new(FixedKey(None)), prompt.clone());
    let classifier = GroqClassifier::new(
        FilterConfig::default().topic_specs(),
        ClassifierSettings::default(),
        transport.clone(),
        credentials,
    );

    let err = classifier.classify("text").await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::Classifier(ClassifierError::MissingCredential { .. })
    ));
    assert_eq!(transport.calls(), 0);
    assert_eq!(prompt.0.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_malformed_scores_pass_through() {
    let transport = ScriptedTransport::new(vec![ok(json!(null))]);
    let classifier = classifier(transport.clone());

    let result = classifier.classify("text").await.unwrap();
    assert!(result.is_null());
    assert_eq!(transport.calls(), 1);
}
