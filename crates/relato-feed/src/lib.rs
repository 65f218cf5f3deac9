//! Feed fetcher (§4.4, §6.1): build aggregator RSS query URLs, fetch and
//! parse entries, split title into headline/publisher, and enforce a global
//! rate limit between requests. Grounded on
//! `rootsignal-archive/src/services/feed.rs`'s fetch-and-parse shape.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use relato_common::FeedError;
use tracing::{debug, warn};

const BASE_URL: &str = "https://news.google.com/rss/search";

#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub feed_id: String,
    pub feed_url: String,
    pub headline: String,
    pub publisher_name: Option<String>,
    pub publisher_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Build the aggregator search URL for `query` restricted to `locality` and
/// `when` (§6.1 request template). `domain` narrows the query to a single
/// publisher once sharding has tripped for this locality (§4.4 step 4).
pub fn build_query_url(query: &str, locality: &str, when: &str, domain: Option<&str>) -> String {
    let mut full_query = if locality.is_empty() {
        query.to_string()
    } else {
        format!("{query} {locality}")
    };
    if let Some(domain) = domain {
        full_query = format!("{full_query} site:{domain}");
    }
    let q = urlencode(&format!("{full_query} when:{when}"));
    format!("{BASE_URL}?q={q}&hl=pt-BR&gl=BR&ceid=BR:pt-419")
}

fn urlencode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Split an RSS `title` into `(headline, publisher_name)` at the last
/// `" - "` (§4.4 step 1, §6.1 title format `"Headline - Publisher"`).
pub fn split_title(title: &str) -> (String, Option<String>) {
    match title.rsplit_once(" - ") {
        Some((headline, publisher)) => (headline.trim().to_string(), Some(publisher.trim().to_string())),
        None => (title.trim().to_string(), None),
    }
}

/// Rate-limits feed requests to a global requests-per-minute cap and a
/// minimum inter-request interval (§4.4 "Rate-limiting").
pub struct FeedFetcher {
    http: reqwest::Client,
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl FeedFetcher {
    pub fn new(requests_per_minute: u32, min_interval_seconds: u64) -> Self {
        let from_rpm = Duration::from_secs_f64(60.0 / requests_per_minute.max(1) as f64);
        let min_interval = from_rpm.max(Duration::from_secs(min_interval_seconds));
        Self {
            http: reqwest::Client::new(),
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Fetch and parse one feed request (§6.1). Entry iteration order
    /// follows the RSS document order.
    pub async fn fetch(&self, url: &str) -> Result<Vec<FeedEntry>, FeedError> {
        self.wait_for_rate_limit().await;

        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| FeedError::Request(e.to_string()))?;

        let feed = feed_rs::parser::parse(&bytes[..]).map_err(|e| FeedError::Parse(e.to_string()))?;

        debug!(url, entries = feed.entries.len(), "feed: fetched and parsed");

        let entries = feed
            .entries
            .into_iter()
            .filter_map(|entry| {
                let feed_url = entry.links.first().map(|l| l.href.clone())?;
                let feed_id = if !entry.id.is_empty() {
                    entry.id.clone()
                } else {
                    feed_url.clone()
                };
                let title = entry.title.map(|t| t.content).unwrap_or_default();
                let (headline, publisher_name) = split_title(&title);
                let publisher_url = entry
                    .source
                    .as_ref()
                    .and_then(|s| s.links.first())
                    .map(|l| l.href.clone());
                let published_at = entry
                    .published
                    .or(entry.updated)
                    .map(|dt| dt.with_timezone(&Utc));

                Some(FeedEntry {
                    feed_id,
                    feed_url,
                    headline,
                    publisher_name,
                    publisher_url,
                    published_at,
                })
            })
            .collect();

        Ok(entries)
    }

    async fn wait_for_rate_limit(&self) {
        let wait = {
            let mut guard = self.last_request.lock().unwrap();
            let now = Instant::now();
            let wait = guard
                .map(|last| self.min_interval.saturating_sub(now.duration_since(last)))
                .unwrap_or_default();
            *guard = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            if wait > Duration::from_secs(5) {
                warn!(?wait, "feed: rate-limit backpressure");
            }
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_query_url_includes_when_and_locale_params() {
        let url = build_query_url("homicídio", "Rio de Janeiro", "7d", None);
        assert!(url.starts_with(BASE_URL));
        assert!(url.contains("hl=pt-BR"));
        assert!(url.contains("gl=BR"));
        assert!(url.contains("ceid=BR:pt-419"));
        assert!(url.contains("when%3A7d") || url.contains("when:7d"));
    }

    #[test]
    fn build_query_url_with_domain_narrows_to_publisher() {
        let url = build_query_url("homicídio", "Rio de Janeiro", "7d", Some("oglobo.globo.com"));
        assert!(url.contains("site%3Aoglobo.globo.com") || url.contains("site:oglobo.globo.com"));
    }

    #[test]
    fn split_title_splits_at_last_separator() {
        let (headline, publisher) = split_title("Homem é morto a tiros - O Globo");
        assert_eq!(headline, "Homem é morto a tiros");
        assert_eq!(publisher, Some("O Globo".to_string()));
    }

    #[test]
    fn split_title_handles_separator_inside_headline() {
        let (headline, publisher) = split_title("Caso A - B é investigado - G1");
        assert_eq!(headline, "Caso A - B é investigado");
        assert_eq!(publisher, Some("G1".to_string()));
    }

    #[test]
    fn split_title_without_separator_has_no_publisher() {
        let (headline, publisher) = split_title("Manchete sem publisher");
        assert_eq!(headline, "Manchete sem publisher");
        assert_eq!(publisher, None);
    }

    #[test]
    fn fetcher_min_interval_respects_requests_per_minute() {
        let fetcher = FeedFetcher::new(20, 2);
        assert_eq!(fetcher.min_interval, Duration::from_secs(3));
    }

    #[test]
    fn fetcher_min_interval_floor_is_the_configured_seconds() {
        let fetcher = FeedFetcher::new(120, 5);
        assert_eq!(fetcher.min_interval, Duration::from_secs(5));
    }
}
