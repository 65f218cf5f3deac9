//! Aggregator URL resolution (§4.1): decode an aggregator link that encodes a
//! publisher URL in a base64 path segment into that publisher URL.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, warn};

const ARTICLE_PATH_RE: &str = r"/articles/([^/?]+)";
const EMBEDDED_URL_RE: &str = r#"https?://[^\s\x00"']+"#;
const BATCHEXECUTE_URL: &str = "https://news.google.com/_/DotsSplashUi/data/batchexecute";
const BATCHEXECUTE_RPCID: &str = "Fbv4je";

const RETRY_BACKOFF: Duration = Duration::from_millis(300);
const MIN_POLITE_INTERVAL: Duration = Duration::from_millis(200);

/// Decodes aggregator-obfuscated URLs into publisher URLs. Non-aggregator
/// URLs are returned unchanged. Rate-limited to one decode per call with a
/// short polite interval between network-touching decodes.
pub struct UrlResolver {
    http: reqwest::Client,
    last_decode_started: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl Default for UrlResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlResolver {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .user_agent(
                    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36",
                )
                .build()
                .unwrap_or_default(),
            last_decode_started: Mutex::new(None),
            min_interval: MIN_POLITE_INTERVAL,
        }
    }

    /// Resolve `url` to a publisher URL, or `None` on any failure. Never
    /// raises — per §4.1, decode errors are swallowed and reported as null.
    pub async fn resolve(&self, url: &str) -> Option<String> {
        if !is_aggregator_url(url) {
            return Some(url.to_string());
        }

        self.wait_for_polite_interval().await;

        match self.decode_once(url).await {
            Ok(Some(resolved)) => return Some(resolved),
            Ok(None) => {}
            Err(e) => debug!(url, error = %e, "resolver: first decode attempt failed"),
        }

        tokio::time::sleep(RETRY_BACKOFF).await;

        match self.decode_once(url).await {
            Ok(Some(resolved)) => Some(resolved),
            Ok(None) => None,
            Err(e) => {
                warn!(url, error = %e, "resolver: decode failed after retry");
                None
            }
        }
    }

    async fn wait_for_polite_interval(&self) {
        let wait = {
            let mut guard = self.last_decode_started.lock().unwrap();
            let now = Instant::now();
            let wait = guard
                .map(|last| self.min_interval.saturating_sub(now.duration_since(last)))
                .unwrap_or_default();
            *guard = Some(now + wait);
            wait
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }

    async fn decode_once(&self, url: &str) -> Result<Option<String>, String> {
        let article_id = extract_article_id(url).ok_or("not an /articles/ aggregator link")?;

        if let Some(embedded) = decode_embedded_url(&article_id) {
            return Ok(Some(embedded));
        }

        self.resolve_via_batchexecute(url, &article_id).await
    }

    async fn resolve_via_batchexecute(
        &self,
        article_url: &str,
        article_id: &str,
    ) -> Result<Option<String>, String> {
        let page = self
            .http
            .get(article_url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .text()
            .await
            .map_err(|e| e.to_string())?;

        let (signature, timestamp) =
            extract_signature_and_timestamp(&page).ok_or("no signature/timestamp in page")?;

        let inner = serde_json::to_string(&serde_json::json!([
            "garturlreq",
            [["X", "X", ["X", "X"], null, null, 1, "US:en", null, 1, 1, null, null, null, null, null, 0, 1],
             "X", "X", 1, [1, 1, 1], 1, 1, null, 0, 0, null, 0],
            article_id, timestamp, signature,
        ]))
        .map_err(|e| e.to_string())?;

        let f_req = serde_json::to_string(&serde_json::json!([[[BATCHEXECUTE_RPCID, inner, null, "generic"]]]))
            .map_err(|e| e.to_string())?;

        let response = self
            .http
            .post(BATCHEXECUTE_URL)
            .form(&[("f.req", f_req)])
            .send()
            .await
            .map_err(|e| e.to_string())?
            .text()
            .await
            .map_err(|e| e.to_string())?;

        parse_batchexecute_response(&response).ok_or_else(|| "could not parse batchexecute response".to_string())
    }
}

/// Non-aggregator URLs pass through unchanged (§4.1).
pub fn is_aggregator_url(url: &str) -> bool {
    url.contains("news.google.com") && url.contains("/articles/")
}

fn extract_article_id(url: &str) -> Option<String> {
    let re = Regex::new(ARTICLE_PATH_RE).ok()?;
    re.captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Fast path: some aggregator blobs embed the plain publisher URL as a
/// string inside the decoded bytes rather than requiring the batchexecute
/// round trip.
fn decode_embedded_url(article_id: &str) -> Option<String> {
    use base64::Engine;

    let mut padded = article_id.to_string();
    let rem = padded.len() % 4;
    if rem != 0 {
        padded.push_str(&"=".repeat(4 - rem));
    }

    let decoded = base64::engine::general_purpose::URL_SAFE.decode(padded).ok()?;
    let re = Regex::new(EMBEDDED_URL_RE).ok()?;
    let text = String::from_utf8_lossy(&decoded);
    re.find(&text).map(|m| m.as_str().to_string())
}

/// Extract the `data-n-a-sg` / `data-n-a-ts` attributes the aggregator page
/// embeds on its root `c-wiz` element.
fn extract_signature_and_timestamp(html: &str) -> Option<(String, String)> {
    let sig_re = Regex::new(r#"data-n-a-sg="([^"]+)""#).ok()?;
    let ts_re = Regex::new(r#"data-n-a-ts="([^"]+)""#).ok()?;
    let sig = sig_re.captures(html)?.get(1)?.as_str().to_string();
    let ts = ts_re.captures(html)?.get(1)?.as_str().to_string();
    Some((sig, ts))
}

fn parse_batchexecute_response(body: &str) -> Option<String> {
    let json_line = body.lines().find(|l| l.trim_start().starts_with('['))?;
    let parsed: serde_json::Value = serde_json::from_str(json_line).ok()?;
    let inner_str = parsed.get(0)?.get(2)?.as_str()?;
    let inner: serde_json::Value = serde_json::from_str(inner_str).ok()?;
    inner.get(1)?.as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_aggregator_url_is_not_detected() {
        assert!(!is_aggregator_url("https://oglobo.globo.com/rio/noticia.html"));
    }

    #[test]
    fn aggregator_article_url_is_detected() {
        assert!(is_aggregator_url(
            "https://news.google.com/rss/articles/CBMi1234?oc=5"
        ));
    }

    #[test]
    fn extract_article_id_strips_query_string() {
        let id = extract_article_id("https://news.google.com/rss/articles/CBMiABC?oc=5").unwrap();
        assert_eq!(id, "CBMiABC");
    }

    #[test]
    fn extract_article_id_returns_none_for_non_article_url() {
        assert!(extract_article_id("https://oglobo.globo.com/rio/noticia.html").is_none());
    }

    #[test]
    fn decode_embedded_url_finds_plain_url_in_decoded_bytes() {
        use base64::Engine;
        let raw = b"garbage-prefix https://publisher.example.com/story more-garbage";
        let encoded = base64::engine::general_purpose::URL_SAFE.encode(raw);
        let decoded = decode_embedded_url(&encoded).unwrap();
        assert_eq!(decoded, "https://publisher.example.com/story");
    }

    #[test]
    fn decode_embedded_url_returns_none_when_no_url_present() {
        use base64::Engine;
        let raw = b"\x08\x01\x10\x02opaque-protobuf-bytes-no-url-here";
        let encoded = base64::engine::general_purpose::URL_SAFE.encode(raw);
        assert!(decode_embedded_url(&encoded).is_none());
    }

    #[test]
    fn parse_batchexecute_response_extracts_url() {
        let inner = serde_json::to_string(&serde_json::json!([
            "wrb.fr",
            "https://publisher.example.com/final-story"
        ]))
        .unwrap();
        let outer = serde_json::json!([["wrb.fr", "Fbv4je", inner]]);
        let body = format!(")]}}'\n{}", serde_json::to_string(&outer).unwrap());
        let url = parse_batchexecute_response(&body).unwrap();
        assert_eq!(url, "https://publisher.example.com/final-story");
    }
}
