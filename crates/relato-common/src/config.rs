use std::env;

/// Application configuration loaded from environment variables. Mirrors the
/// configuration surface enumerated for the pipeline: feed query shape and
/// rate limits, per-stage concurrency, LLM model selection, and dedup tuning.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    // LLM provider
    pub anthropic_api_key: String,
    pub openai_api_key: String,
    pub llm_classification_model: String,
    pub llm_extraction_model: String,
    pub llm_enrichment_model: String,
    pub llm_max_retries: u32,

    // Geocoder (optional capability)
    pub geocoder_api_key: String,
    pub geocoder_enabled: bool,

    // Feed fetcher (§4.4, §6.6)
    pub feed_queries: Vec<String>,
    pub feed_when: String,
    pub feed_requests_per_minute: u32,
    pub feed_min_interval_seconds: u64,
    pub feed_sharding_threshold: u32,
    pub feed_sharded_domains: Vec<String>,

    // Pipeline coordinator (§4.9, §6.6)
    pub classify_concurrency: usize,
    pub download_concurrency: usize,
    pub extract_concurrency: usize,
    pub enrichment_concurrency: usize,
    pub batch_size: i64,

    // Content extractor (§4.2, §6.6)
    pub min_publication_year: i32,

    // Deduplication (§4.8, §6.6)
    pub date_tolerance_days: i64,
    pub match_confidence_threshold: f64,
    pub post_pass_window_days: i64,
}

impl Config {
    /// Load configuration for the pipeline CLI. Panics with a clear message
    /// if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            llm_classification_model: env::var("LLM_CLASSIFICATION_MODEL")
                .unwrap_or_else(|_| "claude-3-5-haiku-latest".to_string()),
            llm_extraction_model: env::var("LLM_EXTRACTION_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-latest".to_string()),
            llm_enrichment_model: env::var("LLM_ENRICHMENT_MODEL")
                .unwrap_or_else(|_| "claude-3-5-sonnet-latest".to_string()),
            llm_max_retries: parse_env_or("LLM_MAX_RETRIES", 3),
            geocoder_api_key: env::var("GEOCODER_API_KEY").unwrap_or_default(),
            geocoder_enabled: env::var("GEOCODER_API_KEY")
                .map(|v| !v.is_empty())
                .unwrap_or(false),
            feed_queries: split_env_list("FEED_QUERIES"),
            feed_when: env::var("FEED_WHEN").unwrap_or_else(|_| "7d".to_string()),
            feed_requests_per_minute: parse_env_or("FEED_REQUESTS_PER_MINUTE", 20),
            feed_min_interval_seconds: parse_env_or("FEED_MIN_INTERVAL_SECONDS", 2),
            feed_sharding_threshold: parse_env_or("FEED_SHARDING_THRESHOLD", 100),
            feed_sharded_domains: split_env_list("FEED_SHARDED_DOMAINS"),
            classify_concurrency: parse_env_or("PIPELINE_CLASSIFY_CONCURRENCY", 10),
            download_concurrency: parse_env_or("PIPELINE_DOWNLOAD_CONCURRENCY", 10),
            extract_concurrency: parse_env_or("PIPELINE_EXTRACT_CONCURRENCY", 15),
            enrichment_concurrency: parse_env_or("PIPELINE_ENRICHMENT_CONCURRENCY", 10),
            batch_size: parse_env_or("PIPELINE_BATCH_SIZE", 50),
            min_publication_year: parse_env_or("CONTENT_MIN_PUBLICATION_YEAR", 2000),
            date_tolerance_days: parse_env_or("DEDUP_DATE_TOLERANCE_DAYS", 1),
            match_confidence_threshold: parse_env_or("DEDUP_MATCH_CONFIDENCE_THRESHOLD", 0.8),
            post_pass_window_days: parse_env_or("DEDUP_POST_PASS_WINDOW_DAYS", 7),
        }
    }

    /// Log presence and length of secret fields, never their values.
    pub fn log_redacted(&self) {
        let secrets = [
            ("DATABASE_URL", &self.database_url),
            ("ANTHROPIC_API_KEY", &self.anthropic_api_key),
            ("OPENAI_API_KEY", &self.openai_api_key),
            ("GEOCODER_API_KEY", &self.geocoder_api_key),
        ];
        for (name, value) in secrets {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn split_env_list(key: &str) -> Vec<String> {
    env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_env_list_ignores_blank_and_whitespace() {
        std::env::set_var("SPLIT_ENV_LIST_TEST", " a, b ,,c");
        assert_eq!(split_env_list("SPLIT_ENV_LIST_TEST"), vec!["a", "b", "c"]);
        std::env::remove_var("SPLIT_ENV_LIST_TEST");
    }

    #[test]
    fn split_env_list_missing_var_is_empty() {
        assert!(split_env_list("SPLIT_ENV_LIST_DEFINITELY_UNSET").is_empty());
    }

    #[test]
    fn parse_env_or_falls_back_on_missing_or_invalid() {
        std::env::remove_var("PARSE_ENV_OR_TEST");
        assert_eq!(parse_env_or::<u32>("PARSE_ENV_OR_TEST", 7), 7);
        std::env::set_var("PARSE_ENV_OR_TEST", "not-a-number");
        assert_eq!(parse_env_or::<u32>("PARSE_ENV_OR_TEST", 7), 7);
        std::env::set_var("PARSE_ENV_OR_TEST", "42");
        assert_eq!(parse_env_or::<u32>("PARSE_ENV_OR_TEST", 7), 42);
        std::env::remove_var("PARSE_ENV_OR_TEST");
    }
}
