use crate::extract::PostExtractor;
use feedguard_core::{CoreError, ElementHandle, PageContract, PostRecord};
use scraper::Html;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// The rendered feed as seen by the filter pipeline.
///
/// Each post pipeline only touches the visibility of its own element, so
/// implementations need no coordination beyond interior mutability.
/// Handles taken from an earlier render never match an element of the
/// current one.
pub trait FeedPage: Send + Sync {
    /// Posts in the current render, in document order.
    fn posts(&self) -> Vec<PostRecord>;

    /// Whether the element belongs to the current render.
    fn contains(&self, element: ElementHandle) -> bool;

    fn is_hidden(&self, element: ElementHandle) -> bool;

    /// Hides the element. Returns `false` when it was already hidden or is
    /// no longer on the page.
    fn hide(&self, element: ElementHandle) -> bool;

    fn hidden_count(&self) -> usize;
}

#[derive(Debug)]
struct PageState {
    source: String,
    /// Ordinals hidden in the current revision.
    hidden: HashSet<usize>,
    revision: u64,
}

impl PageState {
    fn is_current(&self, element: ElementHandle) -> bool {
        element.revision() == self.revision
    }
}

/// A feed page backed by an HTML snapshot.
#[derive(Debug)]
pub struct HtmlFeedPage {
    extractor: PostExtractor,
    host: String,
    state: Mutex<PageState>,
}

impl HtmlFeedPage {
    pub fn new(source: impl Into<String>, contract: &PageContract) -> Result<Self, CoreError> {
        Ok(Self {
            extractor: PostExtractor::new(contract)?,
            host: contract.host.clone(),
            state: Mutex::new(PageState {
                source: source.into(),
                hidden: HashSet::new(),
                revision: 0,
            }),
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P, contract: &PageContract) -> Result<Self, CoreError> {
        let source = std::fs::read_to_string(path)?;
        Self::new(source, contract)
    }

    /// Resolves permalinks against `base_url` instead of the contract's default.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, CoreError> {
        self.extractor = self.extractor.with_base_url(base_url)?;
        Ok(self)
    }

    /// Only pages served from the configured host are filtered.
    pub fn matches_host(&self) -> bool {
        self.extractor.base_url().host_str() == Some(self.host.as_str())
    }

    /// Swaps in a new render of the page. Elements of the old render are gone,
    /// so their visibility flags go with them.
    pub fn replace(&self, source: impl Into<String>) {
        let mut state = self.lock();
        state.source = source.into();
        state.hidden.clear();
        state.revision += 1;
        debug!("Page replaced, now at revision {}", state.revision);
    }

    pub fn revision(&self) -> u64 {
        self.lock().revision
    }

    /// The current render with every hidden post container removed.
    pub fn render(&self) -> String {
        let state = self.lock();
        let mut document = Html::parse_document(&state.source);
        let hidden: Vec<_> = document
            .select(&self.extractor.container)
            .enumerate()
            .filter(|(ordinal, _)| state.hidden.contains(ordinal))
            .map(|(_, container)| container.id())
            .collect();

        for id in hidden {
            if let Some(mut node) = document.tree.get_mut(id) {
                node.detach();
            }
        }

        document.html()
    }

    fn lock(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl FeedPage for HtmlFeedPage {
    fn posts(&self) -> Vec<PostRecord> {
        let (source, revision) = {
            let state = self.lock();
            (state.source.clone(), state.revision)
        };
        self.extractor
            .extract_str(&source)
            .into_iter()
            .map(|post| PostRecord {
                element: post.element.at_revision(revision),
                ..post
            })
            .collect()
    }

    fn contains(&self, element: ElementHandle) -> bool {
        self.lock().is_current(element)
    }

    fn is_hidden(&self, element: ElementHandle) -> bool {
        let state = self.lock();
        state.is_current(element) && state.hidden.contains(&element.ordinal())
    }

    fn hide(&self, element: ElementHandle) -> bool {
        let mut state = self.lock();
        if !state.is_current(element) {
            debug!(
                "Ignoring post container #{} from revision {}, page is at {}",
                element.ordinal(),
                element.revision(),
                state.revision
            );
            return false;
        }
        let toggled = state.hidden.insert(element.ordinal());
        if toggled {
            debug!("Hid post container #{}", element.ordinal());
        }
        toggled
    }

    fn hidden_count(&self) -> usize {
        self.lock().hidden.len()
    }
}
