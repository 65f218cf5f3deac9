use chrono::{DateTime, Datelike, Utc};
use regex::Regex;

/// Resolve a publication date: HTML metadata first, the feed's published-at
/// as fallback. The fetched-at timestamp is never used as a publication
/// date (§4.2). A date parsed as future, or older than `min_publication_year`,
/// is rejected (returns `None`).
pub fn resolve_published_at(
    html: &str,
    feed_published_at: Option<DateTime<Utc>>,
    min_publication_year: i32,
) -> Option<DateTime<Utc>> {
    let candidate = extract_metadata_date(html).or(feed_published_at)?;
    validate(candidate, min_publication_year)
}

fn validate(candidate: DateTime<Utc>, min_publication_year: i32) -> Option<DateTime<Utc>> {
    if candidate > Utc::now() {
        return None;
    }
    if candidate.year() < min_publication_year {
        return None;
    }
    Some(candidate)
}

fn extract_metadata_date(html: &str) -> Option<DateTime<Utc>> {
    let patterns = [
        r#"(?is)<meta\s+[^>]*property=["']article:published_time["'][^>]*content=["']([^"']+)["']"#,
        r#"(?is)<meta\s+[^>]*name=["']publish(?:ed)?-?date["'][^>]*content=["']([^"']+)["']"#,
        r#"(?is)<meta\s+[^>]*itemprop=["']datePublished["'][^>]*content=["']([^"']+)["']"#,
        r#"(?is)<time\s+[^>]*datetime=["']([^"']+)["']"#,
    ];

    for pattern in patterns {
        let re = Regex::new(pattern).ok()?;
        if let Some(captures) = re.captures(html) {
            if let Some(raw) = captures.get(1) {
                if let Some(parsed) = parse_flexible(raw.as_str()) {
                    return Some(parsed);
                }
            }
        }
    }
    None
}

fn parse_flexible(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(DateTime::from_naive_utc_and_offset(
            date.and_hms_opt(0, 0, 0)?,
            Utc,
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn metadata_date_takes_priority_over_feed_fallback() {
        let html = r#"<meta property="article:published_time" content="2025-12-15T10:00:00Z">"#;
        let feed_fallback = Some(Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap());
        let resolved = resolve_published_at(html, feed_fallback, 2000).unwrap();
        assert_eq!(resolved.year(), 2025);
        assert_eq!(resolved.month(), 12);
        assert_eq!(resolved.day(), 15);
    }

    #[test]
    fn falls_back_to_feed_published_at_when_no_metadata() {
        let html = "<html><head></head></html>";
        let feed_fallback = Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        let resolved = resolve_published_at(html, feed_fallback, 2000).unwrap();
        assert_eq!(resolved.year(), 2025);
        assert_eq!(resolved.month(), 6);
    }

    #[test]
    fn future_date_is_rejected() {
        let html = "<html></html>";
        let future = Some(Utc::now() + chrono::Duration::days(30));
        assert!(resolve_published_at(html, future, 2000).is_none());
    }

    #[test]
    fn date_older_than_min_year_is_rejected() {
        let html = "<html></html>";
        let too_old = Some(Utc.with_ymd_and_hms(1995, 1, 1, 0, 0, 0).unwrap());
        assert!(resolve_published_at(html, too_old, 2000).is_none());
    }

    #[test]
    fn no_metadata_and_no_feed_fallback_is_none() {
        assert!(resolve_published_at("<html></html>", None, 2000).is_none());
    }
}
