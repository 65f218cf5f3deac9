//! Concrete schema-constrained request/response shapes (§6.4). Each type
//! implements `StructuredOutput` (via the blanket impl in `schema.rs`) and is
//! requested through `LlmClient::complete`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// §6.4a — classification of a headline as violent-death or not.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClassificationResult {
    pub is_violent_death: bool,
    pub confidence: ConfidenceLevel,
    /// ≤ 500 chars per §6.4a; not enforced in the schema itself, only by prompt instruction.
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Alta,
    Media,
    Baixa,
}

/// §6.4b — structured event extraction, abbreviated schema made concrete.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResult {
    pub location_info: LocationInfo,
    pub date_time: DateTimeInfo,
    pub victims: Victims,
    pub perpetrators: Option<Perpetrators>,
    pub homicide_dynamic: HomicideDynamic,
    pub additional_context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LocationInfo {
    pub neighborhood: Option<String>,
    pub street: Option<String>,
    pub establishment: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub full_location_description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DateVerification {
    pub has_explicit_date: bool,
    pub date_source: DateSource,
    pub date_text_quote: Option<String>,
    pub year_explicitly_mentioned: bool,
    pub verification_reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    Explicit,
    InferredFromPublication,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DateTimeInfo {
    pub date_verification: DateVerification,
    /// `YYYY-MM-DD`. MUST be null if `date_verification.has_explicit_date == false`
    /// or `date_source == None` — enforced post-validation, see [`validate_date_consistency`].
    pub date: Option<String>,
    pub date_precision: Option<WireDatePrecision>,
    pub time: Option<String>,
    pub time_of_day: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WireDatePrecision {
    Exata,
    Parcial,
    #[serde(rename = "não informada")]
    NaoInformada,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IdentifiableVictim {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub occupation: Option<String>,
    pub relationship_to_perpetrator: Option<String>,
    pub is_security_force: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UnidentifiedGroup {
    pub count: i32,
    pub description: String,
    pub is_security_force: Option<bool>,
    pub is_civilian: Option<bool>,
    pub context: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Victims {
    pub identifiable_victims: Vec<IdentifiableVictim>,
    pub number_of_identifiable_victims: i32,
    pub unidentified_groups: Option<Vec<UnidentifiedGroup>>,
    pub number_of_unidentified_victims: Option<i32>,
    pub number_of_victims: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IdentifiablePerpetrator {
    pub name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<String>,
    pub occupation: Option<String>,
    pub relationship_to_victim: Option<String>,
    pub is_security_force: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Perpetrators {
    pub identifiable_perpetrators: Vec<IdentifiablePerpetrator>,
    pub number_of_identifiable_perpetrators: i32,
    pub unidentified_groups: Option<Vec<UnidentifiedGroup>>,
    pub number_of_unidentified_perpetrators: Option<i32>,
    pub number_of_perpetrators: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HomicideDynamic {
    pub title: String,
    pub homicide_type: String,
    pub method: Option<String>,
    pub chronological_description: String,
}

/// Schema-level consistency rule from §4.7: a payload is rejected before a
/// `RawEvent` is created if `date` is set but `date_verification` says the
/// date could not be determined. This is a post-validation step, not
/// something the JSON Schema itself can express.
pub fn validate_date_consistency(result: &ExtractionResult) -> Result<(), String> {
    let dt = &result.date_time;
    if dt.date.is_some() {
        if !dt.date_verification.has_explicit_date {
            return Err(format!(
                "date is set but has_explicit_date is false: {}",
                dt.date_verification.verification_reasoning
            ));
        }
        if dt.date_verification.date_source == DateSource::None {
            return Err(format!(
                "date is set but date_source is none: {}",
                dt.date_verification.verification_reasoning
            ));
        }
    }
    Ok(())
}

/// §6.4c — match prompt result for deduplication Phase 1a and the post-pass
/// merge sweep.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MatchResult {
    #[serde(rename = "match")]
    pub is_match: bool,
    pub incident_id: Option<i64>,
    pub confidence: f64,
    pub reasoning: String,
}

/// §6.4d — cluster prompt result for deduplication Phase 1b. Each inner
/// `Vec` is a cluster of 1-indexed positions into the group submitted to
/// the prompt.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClusterResult {
    pub clusters: Vec<Vec<usize>>,
}

/// §6.4e — enrichment prompt result: the canonical `UniqueEvent` field set,
/// with explicit-null semantics (a field genuinely unknown is `None`, not
/// an empty string).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EnrichmentResult {
    pub title: String,
    pub date: Option<String>,
    pub date_precision: Option<WireDatePrecision>,
    pub time_of_day: Option<String>,
    pub homicide_type: String,
    pub method: Option<String>,
    pub victims_summary: Option<String>,
    pub victim_count: i32,
    pub identified_victim_count: i32,
    pub perpetrator_count: i32,
    pub identified_perpetrator_count: i32,
    pub security_force_involved: Option<bool>,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub neighborhood: Option<String>,
    pub street: Option<String>,
    pub establishment: Option<String>,
    pub location_extra_info: Option<String>,
    pub chronological_description: String,
    pub additional_context: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_extraction(has_explicit_date: bool, date_source: DateSource, date: Option<&str>) -> ExtractionResult {
        ExtractionResult {
            location_info: LocationInfo {
                neighborhood: None,
                street: None,
                establishment: None,
                city: None,
                state: None,
                country: None,
                full_location_description: None,
            },
            date_time: DateTimeInfo {
                date_verification: DateVerification {
                    has_explicit_date,
                    date_source,
                    date_text_quote: None,
                    year_explicitly_mentioned: false,
                    verification_reasoning: "test".to_string(),
                },
                date: date.map(|d| d.to_string()),
                date_precision: None,
                time: None,
                time_of_day: None,
            },
            victims: Victims {
                identifiable_victims: vec![],
                number_of_identifiable_victims: 0,
                unidentified_groups: None,
                number_of_unidentified_victims: None,
                number_of_victims: 1,
            },
            perpetrators: None,
            homicide_dynamic: HomicideDynamic {
                title: "t".to_string(),
                homicide_type: "Homicídio".to_string(),
                method: None,
                chronological_description: "d".to_string(),
            },
            additional_context: None,
        }
    }

    #[test]
    fn date_with_explicit_verification_is_valid() {
        let result = base_extraction(true, DateSource::Explicit, Some("2025-12-15"));
        assert!(validate_date_consistency(&result).is_ok());
    }

    #[test]
    fn date_without_explicit_flag_is_rejected() {
        let result = base_extraction(false, DateSource::InferredFromPublication, Some("2025-12-15"));
        assert!(validate_date_consistency(&result).is_err());
    }

    #[test]
    fn date_with_none_source_is_rejected() {
        let result = base_extraction(true, DateSource::None, Some("2025-12-15"));
        assert!(validate_date_consistency(&result).is_err());
    }

    #[test]
    fn no_date_is_always_valid_regardless_of_verification() {
        let result = base_extraction(false, DateSource::None, None);
        assert!(validate_date_consistency(&result).is_ok());
    }

    #[test]
    fn match_result_serializes_match_field_without_rust_keyword_clash() {
        let result = MatchResult {
            is_match: true,
            incident_id: Some(42),
            confidence: 0.91,
            reasoning: "same victim, same date".to_string(),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["match"], serde_json::json!(true));
        assert_eq!(value["incident_id"], serde_json::json!(42));
    }
}
