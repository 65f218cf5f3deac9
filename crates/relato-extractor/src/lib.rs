//! Content extractor (§4.2): fetch HTML, strip boilerplate, merge a
//! recall-favoring secondary pass, and resolve a publication date.

mod content;
mod date;
mod fetch;

pub use content::{extract_content, ExtractedContent};
pub use date::resolve_published_at;
pub use fetch::fetch_html;

use chrono::{DateTime, Utc};
use relato_common::ExtractError;

/// Fetch `url` and extract `(main_text, metadata, published_at)`, or `None`
/// on any failure (§4.2). `feed_published_at` is the fallback publication
/// timestamp; `min_publication_year` rejects implausible dates.
pub async fn extract(
    url: &str,
    feed_published_at: Option<DateTime<Utc>>,
    min_publication_year: i32,
) -> Result<Option<ExtractedContent>, ExtractError> {
    let html = match fetch_html(url).await {
        Ok(html) => html,
        Err(e) => {
            tracing::warn!(url, error = %e, "extractor: fetch failed");
            return Ok(None);
        }
    };

    let mut content = match extract_content(&html, url) {
        Some(content) => content,
        None => return Ok(None),
    };

    if content.main_text.trim().is_empty() {
        return Ok(None);
    }

    content.published_at = resolve_published_at(&html, feed_published_at, min_publication_year);

    Ok(Some(content))
}
