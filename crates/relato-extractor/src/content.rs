use std::collections::HashSet;

use chrono::{DateTime, Utc};
use regex::Regex;
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedContent {
    pub main_text: String,
    pub meta_description: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

/// Precision-favoring pass (main content only), then a recall-favoring
/// secondary pass (including surrounding/comment content), merging any
/// substantively new paragraphs from the secondary pass (§4.2).
pub fn extract_content(html: &str, url: &str) -> Option<ExtractedContent> {
    let parsed_url = url::Url::parse(url).ok();

    let precision = transform(html.as_bytes(), parsed_url.as_ref(), true);
    let recall = transform(html.as_bytes(), parsed_url.as_ref(), false);

    let mut main_text = precision.clone();
    for paragraph in recall.split("\n\n") {
        if is_substantively_new(paragraph, &main_text) {
            main_text.push_str("\n\n");
            main_text.push_str(paragraph.trim());
        }
    }

    let meta_description = extract_meta_description(html);
    if let Some(desc) = &meta_description {
        if is_substantively_new(desc, &main_text) {
            main_text = format!("{desc}\n\n{main_text}");
        }
    }

    if main_text.trim().is_empty() {
        return None;
    }

    Some(ExtractedContent {
        main_text,
        meta_description,
        published_at: None,
    })
}

fn transform(html: &[u8], url: Option<&url::Url>, main_content_only: bool) -> String {
    let config = TransformConfig {
        readability: true,
        main_content: main_content_only,
        return_format: ReturnFormat::Text,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url,
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };
    transform_content_input(input, &config)
}

/// A candidate paragraph counts as substantively new when most of its
/// significant words (length > 3) don't already appear in `existing`.
fn is_substantively_new(candidate: &str, existing: &str) -> bool {
    let candidate = candidate.trim();
    if candidate.len() < 20 {
        return false;
    }
    if existing.contains(candidate) {
        return false;
    }

    let existing_words: HashSet<String> = tokenize(existing);
    let candidate_words: Vec<String> = tokenize(candidate).into_iter().collect();
    if candidate_words.is_empty() {
        return false;
    }

    let overlapping = candidate_words
        .iter()
        .filter(|w| existing_words.contains(*w))
        .count();
    let overlap_ratio = overlapping as f64 / candidate_words.len() as f64;
    overlap_ratio < 0.6
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|w| w.len() > 3)
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

fn extract_meta_description(html: &str) -> Option<String> {
    let description_re =
        Regex::new(r#"(?is)<meta\s+[^>]*name=["']description["'][^>]*content=["']([^"']+)["']"#)
            .ok()?;
    let og_re =
        Regex::new(r#"(?is)<meta\s+[^>]*property=["']og:description["'][^>]*content=["']([^"']+)["']"#)
            .ok()?;

    description_re
        .captures(html)
        .or_else(|| og_re.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_description_prefers_standard_tag_over_og() {
        let html = r#"<html><head>
            <meta name="description" content="Standard description here">
            <meta property="og:description" content="OG description here">
        </head></html>"#;
        assert_eq!(
            extract_meta_description(html),
            Some("Standard description here".to_string())
        );
    }

    #[test]
    fn meta_description_falls_back_to_og_tag() {
        let html = r#"<html><head>
            <meta property="og:description" content="Only OG description">
        </head></html>"#;
        assert_eq!(
            extract_meta_description(html),
            Some("Only OG description".to_string())
        );
    }

    #[test]
    fn meta_description_absent_returns_none() {
        let html = "<html><head></head></html>";
        assert_eq!(extract_meta_description(html), None);
    }

    #[test]
    fn substantively_new_rejects_near_duplicate_paragraph() {
        let existing = "O crime ocorreu no bairro de Copacabana durante a noite de sabado.";
        let candidate = "O crime ocorreu no bairro de Copacabana durante a noite de sabado!!";
        assert!(!is_substantively_new(candidate, existing));
    }

    #[test]
    fn substantively_new_accepts_disjoint_paragraph() {
        let existing = "O crime ocorreu no bairro de Copacabana durante a noite de sabado.";
        let candidate = "Moradores relataram disparos por volta das vinte e duas horas na regiao central.";
        assert!(is_substantively_new(candidate, existing));
    }

    #[test]
    fn substantively_new_rejects_short_fragments() {
        assert!(!is_substantively_new("ok", "something else entirely"));
    }
}
