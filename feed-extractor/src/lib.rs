//! Post extraction from a rendered feed and the page visibility seam.

mod extract;
mod page;

pub use extract::PostExtractor;
pub use page::{FeedPage, HtmlFeedPage};

use feedguard_core::{CoreError, PageContract, PostRecord};

/// Extracts the posts of `source` under `contract` in one call.
pub fn extract_posts(source: &str, contract: &PageContract) -> Result<Vec<PostRecord>, CoreError> {
    Ok(PostExtractor::new(contract)?.extract_str(source))
}
