use feedguard_core::{AnalysisResult, ClassifierError, ClassifierSettings, CoreError, TopicSpec};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chat-completion request body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub stream: bool,
    pub response_format: ResponseFormat,
    pub stop: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// System instruction listing every topic, the expected JSON shape and the
/// topic descriptions.
pub fn system_prompt(topics: &[TopicSpec]) -> String {
    let shape = topics
        .iter()
        .map(|topic| format!("    \"{}\": 0.0", topic.name))
        .collect::<Vec<_>>()
        .join(",\n");
    let descriptions = topics
        .iter()
        .map(|topic| format!("{}: {}", topic.name, topic.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Your task is to evaluate Tweets/X posts. Always respond in JSON. Follow this format:\n\n{{\n{}\n}}\n\nRate the provided post from 0.0 to 1.0 for each topic. Here are the descriptions for each topic:\n\n{}",
        shape, descriptions
    )
}

pub fn build_request(system_prompt: &str, post_text: &str, settings: &ClassifierSettings) -> ChatRequest {
    ChatRequest {
        messages: vec![
            ChatMessage {
                role: "system".to_string(),
                content: system_prompt.to_string(),
            },
            ChatMessage {
                role: "user".to_string(),
                content: post_text.to_string(),
            },
        ],
        model: settings.model.clone(),
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
        top_p: settings.top_p,
        stream: false,
        response_format: ResponseFormat {
            kind: "json_object".to_string(),
        },
        stop: None,
    }
}

/// Pulls `choices[0].message.content` out of a response body and decodes it
/// as JSON. The decoded value is not checked against the topic list.
pub fn parse_response(body: &str) -> Result<AnalysisResult, CoreError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ClassifierError::InvalidResponse {
            details: format!("malformed completion body: {}", e),
        })?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ClassifierError::InvalidResponse {
            details: "completion has no choices".to_string(),
        })?;

    let scores: Value =
        serde_json::from_str(&choice.message.content).map_err(|e| {
            ClassifierError::InvalidResponse {
                details: format!("message content is not JSON: {}", e),
            }
        })?;

    Ok(AnalysisResult::from_value(scores))
}
