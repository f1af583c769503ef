use feedguard_core::{CoreError, ElementHandle, ExtractError, PageContract, PostRecord};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// Reads post containers out of a rendered feed document.
#[derive(Debug, Clone)]
pub struct PostExtractor {
    pub(crate) container: Selector,
    article: Selector,
    text: Selector,
    anchor: Selector,
    status_marker: String,
    base_url: Url,
}

impl PostExtractor {
    pub fn new(contract: &PageContract) -> Result<Self, CoreError> {
        let base_url = Url::parse(&contract.base_url).map_err(|e| ExtractError::InvalidBaseUrl {
            url: contract.base_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            container: parse_selector(&contract.container_selector)?,
            article: parse_selector(&contract.article_selector)?,
            text: parse_selector(&contract.text_selector)?,
            anchor: parse_selector("a[href]")?,
            status_marker: contract.status_marker.clone(),
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, CoreError> {
        self.base_url = Url::parse(base_url).map_err(|e| ExtractError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(self)
    }

    pub fn extract_str(&self, source: &str) -> Vec<PostRecord> {
        let document = Html::parse_document(source);
        self.extract(&document)
    }

    /// Yields one record per container that carries a permalink; containers
    /// without one are skipped.
    pub fn extract(&self, document: &Html) -> Vec<PostRecord> {
        let posts: Vec<PostRecord> = document
            .select(&self.container)
            .enumerate()
            .filter_map(|(ordinal, container)| {
                let body = container.select(&self.article).next()?;
                let id = self.post_id(body)?;
                Some(PostRecord {
                    id,
                    text: self.post_text(body),
                    element: ElementHandle::new(ordinal),
                })
            })
            .collect();

        debug!("Extracted {} posts from document", posts.len());
        posts
    }

    fn post_id(&self, body: ElementRef<'_>) -> Option<String> {
        body.select(&self.anchor)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter_map(|href| self.base_url.join(href).ok())
            .find_map(|target| self.segment_after_marker(&target))
    }

    fn segment_after_marker(&self, target: &Url) -> Option<String> {
        let segments: Vec<&str> = target.path_segments()?.collect();
        segments
            .windows(2)
            .find(|pair| pair[0] == self.status_marker && !pair[1].is_empty())
            .map(|pair| pair[1].to_string())
    }

    fn post_text(&self, body: ElementRef<'_>) -> String {
        body.select(&self.text)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default()
    }
}

fn parse_selector(selector: &str) -> Result<Selector, CoreError> {
    Selector::parse(selector).map_err(|e| {
        CoreError::Extract(ExtractError::InvalidSelector {
            selector: selector.to_string(),
            reason: e.to_string(),
        })
    })
}
