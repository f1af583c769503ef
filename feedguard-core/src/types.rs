use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A topic the classifier scores and the threshold above which a post is hidden.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicSpec {
    pub name: String,
    pub description: String,
    pub threshold: f64,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, threshold: f64) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            threshold,
        }
    }
}

/// Reference to a post container: its position within one render of the page.
///
/// A handle is only meaningful for the render it was taken from; once the
/// page is replaced the same ordinal may name a different post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    ordinal: usize,
    revision: u64,
}

impl ElementHandle {
    pub fn new(ordinal: usize) -> Self {
        Self {
            ordinal,
            revision: 0,
        }
    }

    pub fn at_revision(self, revision: u64) -> Self {
        Self { revision, ..self }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub id: String,
    pub text: String,
    pub element: ElementHandle,
}

/// Topic scores as returned by the classifier.
///
/// The value is kept exactly as the classifier produced it. A well-formed
/// result is a JSON object mapping topic names to numbers; the empty object
/// means classification was unavailable. Anything else is malformed and is
/// never treated as grounds to hide a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisResult(Value);

impl AnalysisResult {
    pub fn unavailable() -> Self {
        Self(Value::Object(Map::new()))
    }

    pub fn from_value(value: Value) -> Self {
        Self(value)
    }

    pub fn from_scores<I, K>(scores: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let map = scores
            .into_iter()
            .map(|(topic, score)| (topic.into(), Value::from(score)))
            .collect::<Map<String, Value>>();
        Self(Value::Object(map))
    }

    /// The score map, or `None` when the result is not a JSON object.
    pub fn scores(&self) -> Option<&Map<String, Value>> {
        self.0.as_object()
    }

    pub fn score(&self, topic: &str) -> Option<f64> {
        self.scores()?.get(topic)?.as_f64()
    }

    pub fn is_unavailable(&self) -> bool {
        self.scores().map(|m| m.is_empty()).unwrap_or(false)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub post_id: String,
    pub permalink_url: String,
    pub text_snippet: String,
    pub triggered: Vec<(String, f64)>,
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scores = self
            .triggered
            .iter()
            .map(|(topic, score)| format!("{}: {:.2}", topic, score))
            .collect::<Vec<_>>()
            .join(", ");
        let text = if self.text_snippet.is_empty() {
            "Text not found"
        } else {
            self.text_snippet.as_str()
        };
        write!(
            f,
            "Post {} hidden: {}\n{}\nScores: {}",
            self.post_id, self.permalink_url, text, scores
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handle_revision_is_part_of_identity() {
        let first = ElementHandle::new(2);
        let later = first.at_revision(1);
        assert_eq!(later.ordinal(), 2);
        assert_eq!(later.revision(), 1);
        assert_ne!(first, later);
    }

    #[test]
    fn test_unavailable_is_empty_object() {
        let result = AnalysisResult::unavailable();
        assert!(result.is_unavailable());
        assert_eq!(result.as_value(), &json!({}));
        assert_eq!(result.score("politics"), None);
    }

    #[test]
    fn test_scores_pass_through_out_of_range_values() {
        let result = AnalysisResult::from_value(json!({"politics": 1.7, "negativity": -0.2}));
        assert_eq!(result.score("politics"), Some(1.7));
        assert_eq!(result.score("negativity"), Some(-0.2));
        assert!(!result.is_unavailable());
    }

    #[test]
    fn test_malformed_result_has_no_scores() {
        let result = AnalysisResult::from_value(Value::Null);
        assert!(result.scores().is_none());
        assert!(result.is_null());
        assert!(!result.is_unavailable());

        let result = AnalysisResult::from_value(json!([0.9]));
        assert!(result.scores().is_none());
    }

    #[test]
    fn test_audit_entry_display() {
        let entry = AuditEntry {
            post_id: "123".to_string(),
            permalink_url: "https://x.com/user/status/123".to_string(),
            text_snippet: "a post".to_string(),
            triggered: vec![("politics".to_string(), 0.854)],
        };
        assert_eq!(
            entry.to_string(),
            "Post 123 hidden: https://x.com/user/status/123\na post\nScores: politics: 0.85"
        );

        let entry = AuditEntry {
            text_snippet: String::new(),
            ..entry
        };
        assert!(entry.to_string().contains("\nText not found\n"));
    }
}
