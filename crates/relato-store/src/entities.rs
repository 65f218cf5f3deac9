//! Row types for the four persistent entities (spec §3). Typed-enum columns
//! (`state`, `dedup_state`, `confidence`, ...) are decoded as `TEXT` and
//! converted at the edges via `relato_common`'s `FromStr`/`Display` impls,
//! preserving the on-disk string representation (§9 design note).

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Source {
    pub id: i64,
    pub feed_id: String,
    pub feed_url: String,
    pub resolved_url: Option<String>,
    pub headline: String,
    pub publisher_name: Option<String>,
    pub publisher_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub main_text: Option<String>,
    pub search_query: Option<String>,
    pub first_fetched_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub state: String,
    pub is_violent_death: Option<bool>,
    pub confidence: Option<String>,
    pub reasoning: Option<String>,
}

impl Source {
    pub fn state(&self) -> Result<relato_common::SourceState, String> {
        self.state.parse()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RawEvent {
    pub id: i64,
    pub source_id: i64,
    pub unique_event_id: Option<i64>,
    pub event_date: Option<NaiveDate>,
    pub date_precision: Option<String>,
    pub time_of_day: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub neighborhood: Option<String>,
    pub victim_count: Option<i32>,
    pub identified_victim_count: Option<i32>,
    pub perpetrator_count: Option<i32>,
    pub security_force_involved: Option<bool>,
    pub homicide_type: Option<String>,
    pub method: Option<String>,
    pub title: Option<String>,
    pub chronological_description: Option<String>,
    pub extraction_data: Value,
    pub extraction_model: String,
    pub extraction_success: bool,
    pub extraction_error: Option<String>,
    pub dedup_state: String,
    pub is_gold_standard: bool,
    pub created_at: DateTime<Utc>,
}

impl RawEvent {
    pub fn dedup_state(&self) -> Result<relato_common::DedupState, String> {
        self.dedup_state.parse()
    }

    /// Normalized location key for Phase 1b grouping (§4.8): the normalized
    /// neighborhood if present, else the normalized city.
    pub fn location_key(&self) -> Option<String> {
        self.neighborhood
            .as_deref()
            .or(self.city.as_deref())
            .map(normalize_location_key)
    }
}

/// Lowercase, diacritic-insensitive-enough, whitespace-collapsed key. Names
/// spelled with or without accents or inconsistent casing still block
/// together (§4.8 groups by "normalized-location-key").
pub fn normalize_location_key(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UniqueEvent {
    pub id: i64,
    pub homicide_type: Option<String>,
    pub method: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub date_precision: Option<String>,
    pub time_of_day: Option<String>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub street: Option<String>,
    pub establishment: Option<String>,
    pub location_description: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub plus_code: Option<String>,
    pub place_id: Option<String>,
    pub formatted_address: Option<String>,
    pub geo_precision: Option<String>,
    pub geo_source: Option<String>,
    pub geo_confidence: Option<f64>,
    pub victim_count: i32,
    pub identified_victim_count: i32,
    pub victim_summary: Option<String>,
    pub perpetrator_count: i32,
    pub identified_perpetrator_count: i32,
    pub security_force_involved: Option<bool>,
    pub title: String,
    pub chronological_description: Option<String>,
    pub additional_context: Option<String>,
    pub merged_data: Option<Value>,
    pub source_count: i32,
    pub confirmed: bool,
    pub needs_enrichment: bool,
    pub last_enriched_at: Option<DateTime<Utc>>,
    pub enrichment_model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CityStats {
    pub id: i64,
    pub locality_key: String,
    pub last_result_count: i32,
    pub hit_limit_count: i32,
    pub needs_sharding: bool,
    pub last_polled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_location_key_collapses_case_and_whitespace() {
        assert_eq!(normalize_location_key("  Copacabana  "), "copacabana");
        assert_eq!(normalize_location_key("Barra  da Tijuca"), "barra da tijuca");
    }
}
