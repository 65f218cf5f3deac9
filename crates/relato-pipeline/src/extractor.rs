//! Extractor stage (§4.7): run the extraction schema against a downloaded
//! Source's body, enforce the date-consistency rule, and create the
//! resulting `RawEvent`.

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use relato_common::PipelineError;
use relato_llm::schemas::{ExtractionResult, WireDatePrecision};
use relato_llm::LlmClient;
use relato_store::raw_event::NewRawEvent;
use relato_store::Store;
use tracing::{info, warn};

const SYSTEM_PROMPT: &str = "\
Você extrai dados estruturados de notícias sobre mortes violentas no Brasil. Preencha \
apenas o que o texto permite afirmar; use null quando a informação não constar. NUNCA \
invente uma data: `date` só pode ser preenchido quando `date_verification.has_explicit_date` \
for verdadeiro e `date_verification.date_source` não for \"none\".";

pub async fn run(
    store: &Store,
    llm: &LlmClient,
    model_name: &str,
    concurrency: usize,
    batch_size: i64,
) -> Result<usize, PipelineError> {
    let claimed = relato_store::source::claim_batch(
        &store.pool,
        "ready_for_extraction",
        "extracting",
        batch_size,
    )
    .await
    .map_err(relato_common::StoreError::Sqlx)?;

    let processed = claimed.len();

    stream::iter(claimed)
        .for_each_concurrent(concurrency, |source| async move {
            let user_prompt = build_user_prompt(&source);

            let result = match llm.complete::<ExtractionResult>(SYSTEM_PROMPT, &user_prompt).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(source_id = source.id, error = %e, "extractor: llm call failed");
                    write_failure(store, source.id, &e.to_string()).await;
                    return;
                }
            };

            if let Err(reason) = relato_llm::schemas::validate_date_consistency(&result) {
                warn!(source_id = source.id, reason, "extractor: date consistency rejected");
                write_failure(store, source.id, &reason).await;
                return;
            }

            let new_raw_event = to_new_raw_event(source.id, &result, model_name);

            match relato_store::raw_event::insert(&store.pool, new_raw_event).await {
                Ok(raw_event_id) => {
                    if let Err(e) = relato_store::source::write_extraction_success(&store.pool, source.id).await {
                        warn!(source_id = source.id, error = %e, "extractor: success write-back failed");
                    }
                    info!(source_id = source.id, raw_event_id, "extractor: raw event created");
                }
                Err(e) => {
                    warn!(source_id = source.id, error = %e, "extractor: raw event insert failed");
                    write_failure(store, source.id, &e.to_string()).await;
                }
            }
        })
        .await;

    info!(processed, "extractor: stage complete");
    Ok(processed)
}

async fn write_failure(store: &Store, source_id: i64, error: &str) {
    if let Err(e) = relato_store::source::write_extraction_failure(&store.pool, source_id, error).await {
        warn!(source_id, error = %e, "extractor: failure write-back failed");
    }
}

fn build_user_prompt(source: &relato_store::Source) -> String {
    format!(
        "Manchete: {}\nVeículo: {}\nURL: {}\nData de publicação (fallback): {}\n\nTexto:\n{}",
        source.headline,
        source.publisher_name.as_deref().unwrap_or("desconhecido"),
        source.resolved_url.as_deref().unwrap_or(&source.feed_url),
        source
            .published_at
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "desconhecida".to_string()),
        source.main_text.as_deref().unwrap_or(""),
    )
}

fn to_new_raw_event(source_id: i64, result: &ExtractionResult, model_name: &str) -> NewRawEvent {
    let event_date = result
        .date_time
        .date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

    NewRawEvent {
        source_id,
        event_date,
        date_precision: result.date_time.date_precision.map(wire_date_precision_to_db_str),
        time_of_day: result.date_time.time_of_day.clone(),
        city: result.location_info.city.clone(),
        state: result.location_info.state.clone(),
        neighborhood: result.location_info.neighborhood.clone(),
        victim_count: Some(result.victims.number_of_victims),
        identified_victim_count: Some(result.victims.number_of_identifiable_victims),
        perpetrator_count: result.perpetrators.as_ref().map(|p| p.number_of_perpetrators),
        security_force_involved: result
            .victims
            .identifiable_victims
            .iter()
            .any(|v| v.is_security_force == Some(true))
            .then_some(true),
        homicide_type: Some(result.homicide_dynamic.homicide_type.clone()),
        method: result.homicide_dynamic.method.clone(),
        title: Some(result.homicide_dynamic.title.clone()),
        chronological_description: Some(result.homicide_dynamic.chronological_description.clone()),
        extraction_data: serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
        extraction_model: model_name.to_string(),
    }
}

/// Maps the wire-format precision tag to the same string `DatePrecision`'s
/// `FromStr` accepts, so a round trip through the store is lossless.
fn wire_date_precision_to_db_str(precision: WireDatePrecision) -> String {
    match precision {
        WireDatePrecision::Exata => "exata",
        WireDatePrecision::Parcial => "parcial",
        WireDatePrecision::NaoInformada => "nao_informada",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use relato_llm::schemas::{DateSource, DateTimeInfo, DateVerification, HomicideDynamic, LocationInfo, Victims};

    fn sample_result() -> ExtractionResult {
        ExtractionResult {
            location_info: LocationInfo {
                neighborhood: Some("Copacabana".to_string()),
                street: None,
                establishment: None,
                city: Some("Rio de Janeiro".to_string()),
                state: Some("RJ".to_string()),
                country: Some("Brasil".to_string()),
                full_location_description: None,
            },
            date_time: DateTimeInfo {
                date_verification: DateVerification {
                    has_explicit_date: true,
                    date_source: DateSource::Explicit,
                    date_text_quote: Some("15 de dezembro de 2025".to_string()),
                    year_explicitly_mentioned: true,
                    verification_reasoning: "explicit date in body".to_string(),
                },
                date: Some("2025-12-15".to_string()),
                date_precision: Some(WireDatePrecision::Exata),
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
                title: "Homem morto a tiros em Copacabana".to_string(),
                homicide_type: "Homicídio".to_string(),
                method: Some("Arma de fogo".to_string()),
                chronological_description: "...".to_string(),
            },
            additional_context: None,
        }
    }

    #[test]
    fn to_new_raw_event_parses_iso_date() {
        let new_raw_event = to_new_raw_event(1, &sample_result(), "claude-3-5-sonnet-latest");
        assert_eq!(new_raw_event.event_date, Some(NaiveDate::from_ymd_opt(2025, 12, 15).unwrap()));
        assert_eq!(new_raw_event.date_precision.as_deref(), Some("exata"));
        assert_eq!(new_raw_event.city.as_deref(), Some("Rio de Janeiro"));
        assert_eq!(new_raw_event.neighborhood.as_deref(), Some("Copacabana"));
    }

    #[test]
    fn to_new_raw_event_without_date_leaves_event_date_none() {
        let mut result = sample_result();
        result.date_time.date = None;
        result.date_time.date_verification.has_explicit_date = false;
        result.date_time.date_verification.date_source = DateSource::None;
        let new_raw_event = to_new_raw_event(1, &result, "claude-3-5-sonnet-latest");
        assert_eq!(new_raw_event.event_date, None);
    }
}
