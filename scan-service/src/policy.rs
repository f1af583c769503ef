use crate::audit::AuditLog;
use feed_extractor::FeedPage;
use feedguard_core::{AnalysisResult, PostRecord, TopicSpec};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub hide: bool,
    /// Topics whose score strictly exceeds their threshold, in topic order.
    pub triggered: Vec<(String, f64)>,
}

impl Decision {
    pub fn show() -> Self {
        Self {
            hide: false,
            triggered: Vec::new(),
        }
    }
}

/// What applying a decision did to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Shown,
    Hidden,
    AlreadyHidden,
    /// The page was replaced while the post was being analysed.
    Detached,
}

#[derive(Debug, Clone)]
pub struct VisibilityPolicy {
    topics: Arc<[TopicSpec]>,
}

impl VisibilityPolicy {
    pub fn new(topics: Arc<[TopicSpec]>) -> Self {
        Self { topics }
    }

    /// Hide iff some configured topic scores strictly above its threshold.
    /// Missing topics and non-numeric scores never trigger; a result that is
    /// not a score map never hides.
    pub fn decide(&self, result: &AnalysisResult) -> Decision {
        self.evaluate(None, result)
    }

    /// Decides and, when the post must go, hides its element and records an
    /// audit entry. An element that is already hidden, or that belongs to an
    /// earlier render of the page, is left alone.
    pub fn apply(
        &self,
        post: &PostRecord,
        result: &AnalysisResult,
        page: &dyn FeedPage,
        audit: &AuditLog,
    ) -> Visibility {
        let decision = self.evaluate(Some(&post.id), result);
        if !decision.hide {
            return Visibility::Shown;
        }

        if !page.contains(post.element) {
            debug!("Post {} left the page before it could be hidden", post.id);
            return Visibility::Detached;
        }
        if page.is_hidden(post.element) || !page.hide(post.element) {
            return Visibility::AlreadyHidden;
        }

        let entry = audit.record(post, decision.triggered);
        info!(
            "Post {} hidden due to high scores: {:?}",
            entry.post_id, entry.triggered
        );
        Visibility::Hidden
    }

    fn evaluate(&self, post_id: Option<&str>, result: &AnalysisResult) -> Decision {
        let Some(scores) = result.scores() else {
            warn!(
                "Skipping post {} due to invalid analysis result: {}",
                post_id.unwrap_or("<unknown>"),
                result.as_value()
            );
            return Decision::show();
        };

        let triggered: Vec<(String, f64)> = self
            .topics
            .iter()
            .filter_map(|topic| {
                let score = scores.get(&topic.name)?.as_f64()?;
                (score > topic.threshold).then(|| (topic.name.clone(), score))
            })
            .collect();

        Decision {
            hide: !triggered.is_empty(),
            triggered,
        }
    }
}
