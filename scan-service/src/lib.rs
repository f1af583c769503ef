//! The analysis-and-visibility pipeline.
//!
//! A scan enumerates the posts on the page and runs every post through
//! cache lookup, classification on a miss, and the visibility policy as an
//! independent task. Posts are not ordered relative to each other.
//!
//! Two scans that overlap can both miss the cache for the same post and
//! classify it twice. Nothing de-duplicates in-flight requests; the second
//! write to the cache simply replaces the first.

pub mod audit;
pub mod debounce;
pub mod policy;

pub use audit::AuditLog;
pub use debounce::Debouncer;
pub use policy::{Decision, Visibility, VisibilityPolicy};

use analysis_store::AnalysisCache;
use classifier_client::Classifier;
use feed_extractor::FeedPage;
use feedguard_core::{AnalysisResult, ErrorReporter, PostRecord};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Where a post's analysis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisSource {
    Cache,
    Classifier,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    Decided {
        source: AnalysisSource,
        visibility: Visibility,
    },
    /// No credential was available, so the post was left untouched.
    Aborted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub posts: usize,
    pub cache_hits: usize,
    pub classified: usize,
    pub hidden: usize,
    pub already_hidden: usize,
    /// Posts that should go but whose element was replaced mid-analysis.
    pub detached: usize,
    pub aborted: usize,
    pub failed: usize,
}

impl ScanReport {
    fn record(&mut self, outcome: PostOutcome) {
        match outcome {
            PostOutcome::Decided { source, visibility } => {
                match source {
                    AnalysisSource::Cache => self.cache_hits += 1,
                    AnalysisSource::Classifier => self.classified += 1,
                }
                match visibility {
                    Visibility::Hidden => self.hidden += 1,
                    Visibility::AlreadyHidden => self.already_hidden += 1,
                    Visibility::Detached => self.detached += 1,
                    Visibility::Shown => {}
                }
            }
            PostOutcome::Aborted => self.aborted += 1,
        }
    }
}

pub struct FilterPipeline {
    cache: Arc<dyn AnalysisCache>,
    classifier: Arc<dyn Classifier>,
    policy: VisibilityPolicy,
    audit: Arc<AuditLog>,
    reporter: ErrorReporter,
}

impl FilterPipeline {
    pub fn new(
        cache: Arc<dyn AnalysisCache>,
        classifier: Arc<dyn Classifier>,
        policy: VisibilityPolicy,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            cache,
            classifier,
            policy,
            audit,
            reporter: ErrorReporter::new(),
        }
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// One scan of the page: every extracted post is processed in its own task.
    pub async fn scan(self: &Arc<Self>, page: Arc<dyn FeedPage>) -> ScanReport {
        let posts = page.posts();
        let mut report = ScanReport {
            posts: posts.len(),
            ..Default::default()
        };

        let mut tasks = JoinSet::new();
        for post in posts {
            let pipeline = Arc::clone(self);
            let page = Arc::clone(&page);
            tasks.spawn(async move { pipeline.process_post(post, page.as_ref()).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    error!("Post task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Scan finished: {} posts, {} cached, {} classified, {} hidden",
            report.posts, report.cache_hits, report.classified, report.hidden
        );
        report
    }

    /// cache lookup → classify on miss → cache store → apply visibility.
    pub async fn process_post(&self, post: PostRecord, page: &dyn FeedPage) -> PostOutcome {
        let (analysis, source) = match self.cached(&post.id).await {
            Some(analysis) => (analysis, AnalysisSource::Cache),
            None => match self.classifier.classify(&post.text).await {
                Ok(analysis) => {
                    if let Err(e) = self.cache.put(&post.id, &analysis).await {
                        warn!("Could not cache analysis for post {}", post.id);
                        self.reporter.report_warning(&e);
                    }
                    (analysis, AnalysisSource::Classifier)
                }
                Err(e) => {
                    error!("Aborting analysis of post {}", post.id);
                    self.reporter.report_error(&e);
                    return PostOutcome::Aborted;
                }
            },
        };

        let visibility = self.policy.apply(&post, &analysis, page, &self.audit);
        PostOutcome::Decided { source, visibility }
    }

    async fn cached(&self, post_id: &str) -> Option<AnalysisResult> {
        match self.cache.get(post_id).await {
            Ok(Some(analysis)) => {
                debug!("Cache hit for post {}", post_id);
                Some(analysis)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Cache lookup for post {} failed, treating as miss", post_id);
                self.reporter.report_warning(&e);
                None
            }
        }
    }

    /// Scans once, then once more after every debounced burst of signals,
    /// until the signal channel closes. `refresh` runs before each rescan so
    /// the shell can load the latest render of the page.
    ///
    /// Rescans are not serialized behind earlier scans.
    pub async fn run<T, F>(
        self: Arc<Self>,
        page: Arc<dyn FeedPage>,
        mut signals: mpsc::Receiver<T>,
        debouncer: Debouncer,
        mut refresh: F,
    ) -> Vec<ScanReport>
    where
        F: FnMut(),
    {
        let mut scans = JoinSet::new();
        {
            let pipeline = Arc::clone(&self);
            let page = Arc::clone(&page);
            scans.spawn(async move { pipeline.scan(page).await });
        }

        while debouncer.settle(&mut signals).await {
            debug!("Signals settled after {:?}, rescanning", debouncer.window());
            refresh();
            let pipeline = Arc::clone(&self);
            let page = Arc::clone(&page);
            scans.spawn(async move { pipeline.scan(page).await });
        }

        let mut reports = Vec::new();
        while let Some(joined) = scans.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!("Scan task failed: {}", e),
            }
        }
        reports
    }
}
