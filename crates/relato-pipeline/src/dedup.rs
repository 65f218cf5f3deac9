//! Deduplication & enrichment core (§4.8) — three strictly sequenced phases,
//! each parallel within itself, plus a bounded post-pass merge sweep.
//! Grounded in the simpler claim/process idiom already established by
//! `relato-store`'s repository functions rather than the teacher's
//! event-sourced `scrape_pipeline.rs`/`dedup.rs` handlers, which model a much
//! richer domain than this pipeline needs.

use std::collections::HashMap;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use relato_common::PipelineError;
use relato_llm::schemas::{ClusterResult, EnrichmentResult, MatchResult, WireDatePrecision};
use relato_llm::LlmClient;
use relato_store::unique_event::NewUniqueEvent;
use relato_store::{RawEvent, Store, UniqueEvent};
use tracing::{info, warn};

use crate::geocoder::Geocoder;

const MATCH_SYSTEM_PROMPT: &str = "\
Você decide se um relato de morte violenta se refere ao mesmo incidente real que um dos \
candidatos informados. Mesma vítima + mesma data + mesmo local implica o mesmo evento, \
mesmo com ênfase descritiva diferente. Variações de grafia de nomes contam como a mesma \
pessoa. Datas com diferença de até 1 dia contam como a mesma data. Bairro/cidade \
sobrepostos contam como o mesmo local.";

const CLUSTER_SYSTEM_PROMPT: &str = "\
Você recebe uma lista numerada de relatos de morte violenta, todos do mesmo dia e mesma \
localidade aproximada. Particione os itens em grupos que descrevem o mesmo incidente real. \
Cada item pertence a exatamente um grupo.";

const ENRICHMENT_SYSTEM_PROMPT: &str = "\
Você sintetiza um evento canônico de morte violenta a partir de um ou mais relatos da \
imprensa sobre o mesmo incidente. Preencha apenas o que as fontes permitem afirmar; use \
null para o que for genuinamente desconhecido — a síntese é autoritativa e sobrescreve \
valores anteriores.";

/// Phase 1a (§4.8): match pending, dated RawEvents against a snapshot of
/// existing UniqueEvents. Returns the RawEvents left unmatched, to feed
/// Phase 1b.
pub async fn phase1a_match(
    store: &Store,
    llm: &LlmClient,
    concurrency: usize,
    tolerance_days: i64,
    match_confidence_threshold: f64,
) -> Result<Vec<RawEvent>, PipelineError> {
    let pending = relato_store::raw_event::fetch_pending_with_date(&store.pool)
        .await
        .map_err(relato_common::StoreError::Sqlx)?;

    let snapshot = relato_store::unique_event::all_ids(&store.pool)
        .await
        .map_err(relato_common::StoreError::Sqlx)?;

    let unmatched: Vec<RawEvent> = stream::iter(pending)
        .map(|raw_event| {
            let snapshot: &[i64] = &snapshot;
            async move {
                let event_date = raw_event
                    .event_date
                    .expect("fetch_pending_with_date only returns dated RawEvents");

                let candidates = relato_store::unique_event::candidates_within_date_tolerance(
                    &store.pool,
                    event_date,
                    tolerance_days,
                    snapshot,
                )
                .await
                .unwrap_or_default();

                if candidates.is_empty() {
                    return Some(raw_event);
                }

                let matched_id = match llm
                    .complete::<MatchResult>(MATCH_SYSTEM_PROMPT, &match_prompt(&raw_event, &candidates))
                    .await
                {
                    Ok(result) if result.is_match && result.confidence >= match_confidence_threshold => {
                        result.incident_id
                    }
                    Ok(_) => None,
                    Err(e) => {
                        warn!(raw_event_id = raw_event.id, error = %e, "dedup: phase 1a match call failed");
                        None
                    }
                };

                match matched_id {
                    Some(unique_event_id) => {
                        if let Err(e) =
                            relato_store::raw_event::link_matched(&store.pool, raw_event.id, unique_event_id).await
                        {
                            warn!(raw_event_id = raw_event.id, error = %e, "dedup: link_matched failed");
                        }
                        if let Err(e) =
                            relato_store::unique_event::mark_needs_enrichment(&store.pool, unique_event_id).await
                        {
                            warn!(unique_event_id, error = %e, "dedup: mark_needs_enrichment failed");
                        }
                        None
                    }
                    None => Some(raw_event),
                }
            }
        })
        .buffer_unordered(concurrency)
        .filter_map(|r| async move { r })
        .collect()
        .await;

    info!(unmatched = unmatched.len(), "dedup: phase 1a complete");
    Ok(unmatched)
}

fn match_prompt(raw_event: &RawEvent, candidates: &[UniqueEvent]) -> String {
    let candidate_lines: Vec<String> = candidates
        .iter()
        .map(|c| {
            format!(
                "id={} title={:?} date={:?} city={:?} neighborhood={:?}",
                c.id, c.title, c.event_date, c.city, c.neighborhood
            )
        })
        .collect();

    format!(
        "Relato:\ntítulo={:?} data={:?} cidade={:?} bairro={:?} descrição={:?}\n\nCandidatos:\n{}",
        raw_event.title,
        raw_event.event_date,
        raw_event.city,
        raw_event.neighborhood,
        raw_event.chronological_description,
        candidate_lines.join("\n"),
    )
}

/// Phase 1b (§4.8): group the Phase 1a leftovers by `(event_date,
/// normalized_location_key)`; groups run concurrently, but each group's
/// members are clustered, created, and linked strictly sequentially — the
/// only safe way to prevent two concurrent workers creating a UniqueEvent
/// each for the same real incident (§9 "Race in Phase 1b").
pub async fn phase1b_cluster(
    store: &Store,
    llm: &LlmClient,
    unmatched: Vec<RawEvent>,
    concurrency: usize,
) -> Result<usize, PipelineError> {
    let mut groups: HashMap<(NaiveDate, String), Vec<RawEvent>> = HashMap::new();
    for raw_event in unmatched {
        let Some(event_date) = raw_event.event_date else { continue };
        let location_key = raw_event.location_key().unwrap_or_default();
        groups.entry((event_date, location_key)).or_default().push(raw_event);
    }

    let group_count = groups.len();

    stream::iter(groups.into_values())
        .for_each_concurrent(concurrency, |group| async move {
            if let Err(e) = process_group(store, llm, group).await {
                warn!(error = %e, "dedup: phase 1b group processing failed");
            }
        })
        .await;

    info!(group_count, "dedup: phase 1b complete");
    Ok(group_count)
}

async fn process_group(store: &Store, llm: &LlmClient, group: Vec<RawEvent>) -> Result<(), PipelineError> {
    if group.len() == 1 {
        create_and_link_cluster(store, &group).await?;
        return Ok(());
    }

    let clusters = match llm.complete::<ClusterResult>(CLUSTER_SYSTEM_PROMPT, &cluster_prompt(&group)).await {
        Ok(result) if is_valid_partition(&result, group.len()) => result.clusters,
        Ok(_) => {
            warn!(group_size = group.len(), "dedup: cluster result is not a valid partition, falling back");
            trivial_clusters(group.len())
        }
        Err(e) => {
            warn!(group_size = group.len(), error = %e, "dedup: cluster call failed, falling back to one-per-event");
            trivial_clusters(group.len())
        }
    };

    for cluster_indices in clusters {
        let members: Vec<&RawEvent> = cluster_indices
            .iter()
            .filter_map(|i| i.checked_sub(1).and_then(|i| group.get(i)))
            .collect();
        if members.is_empty() {
            continue;
        }
        create_and_link_cluster(store, &members.into_iter().cloned().collect::<Vec<_>>()).await?;
    }

    Ok(())
}

fn trivial_clusters(n: usize) -> Vec<Vec<usize>> {
    (1..=n).map(|i| vec![i]).collect()
}

fn is_valid_partition(result: &ClusterResult, n: usize) -> bool {
    let mut seen = vec![false; n];
    for cluster in &result.clusters {
        for &i in cluster {
            match i.checked_sub(1).and_then(|i| seen.get_mut(i)) {
                Some(slot) if !*slot => *slot = true,
                _ => return false,
            }
        }
    }
    seen.into_iter().all(|s| s)
}

fn cluster_prompt(group: &[RawEvent]) -> String {
    let lines: Vec<String> = group
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. título={:?} descrição={:?} cidade={:?} bairro={:?}",
                i + 1,
                r.title,
                r.chronological_description,
                r.city,
                r.neighborhood
            )
        })
        .collect();
    lines.join("\n")
}

/// Create one UniqueEvent from the cluster's first member and link every
/// member to it, sequentially (§4.8 Phase 1b).
async fn create_and_link_cluster(store: &Store, cluster: &[RawEvent]) -> Result<(), PipelineError> {
    let first = &cluster[0];
    let new_unique_event = NewUniqueEvent {
        homicide_type: first.homicide_type.clone(),
        method: first.method.clone(),
        event_date: first.event_date,
        date_precision: first.date_precision.clone(),
        time_of_day: first.time_of_day.clone(),
        city: first.city.clone(),
        state: first.state.clone(),
        neighborhood: first.neighborhood.clone(),
        title: first
            .title
            .clone()
            .unwrap_or_else(|| "Incidente sem título".to_string()),
    };

    let unique_event_id = relato_store::unique_event::create(&store.pool, new_unique_event)
        .await
        .map_err(relato_common::StoreError::Sqlx)?;

    for raw_event in cluster {
        relato_store::raw_event::link_clustered(&store.pool, raw_event.id, unique_event_id)
            .await
            .map_err(relato_common::StoreError::Sqlx)?;
    }

    Ok(())
}

/// Phase 2 (§4.8): for each UniqueEvent flagged `needs_enrichment`, gather
/// linked RawEvents and their parent Sources, synthesize, and write back.
/// Optionally geocodes the resolved location (§6.5); a failed or disabled
/// geocode never blocks the synthesis write.
pub async fn phase2_enrich(
    store: &Store,
    llm: &LlmClient,
    model_name: &str,
    geocoder: Option<&Geocoder>,
    concurrency: usize,
) -> Result<usize, PipelineError> {
    let pending = relato_store::unique_event::fetch_needing_enrichment(&store.pool)
        .await
        .map_err(relato_common::StoreError::Sqlx)?;
    let processed = pending.len();

    stream::iter(pending)
        .for_each_concurrent(concurrency, |unique_event| async move {
            if let Err(e) = enrich_one(store, llm, model_name, geocoder, &unique_event).await {
                warn!(unique_event_id = unique_event.id, error = %e, "dedup: enrichment failed");
            }
        })
        .await;

    info!(processed, "dedup: phase 2 complete");
    Ok(processed)
}

async fn enrich_one(
    store: &Store,
    llm: &LlmClient,
    model_name: &str,
    geocoder: Option<&Geocoder>,
    unique_event: &UniqueEvent,
) -> Result<(), PipelineError> {
    let linked = relato_store::raw_event::fetch_by_unique_event(&store.pool, unique_event.id)
        .await
        .map_err(relato_common::StoreError::Sqlx)?;

    let source_ids: Vec<i64> = linked.iter().map(|r| r.source_id).collect();
    let sources = relato_store::source::fetch_many(&store.pool, &source_ids)
        .await
        .map_err(relato_common::StoreError::Sqlx)?;

    let prompt = enrichment_prompt(&linked, &sources);

    let result = llm.complete::<EnrichmentResult>(ENRICHMENT_SYSTEM_PROMPT, &prompt).await?;

    let event_date = result
        .date
        .as_deref()
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());
    let date_precision = result.date_precision.map(wire_date_precision_to_db_str);
    let merged_data = serde_json::to_value(&result).unwrap_or(serde_json::Value::Null);

    relato_store::unique_event::write_synthesis(
        &store.pool,
        unique_event.id,
        &result.title,
        event_date,
        date_precision.as_deref(),
        result.time_of_day.as_deref(),
        &result.homicide_type,
        result.method.as_deref(),
        result.victims_summary.as_deref(),
        result.victim_count,
        result.identified_victim_count,
        result.perpetrator_count,
        result.identified_perpetrator_count,
        result.security_force_involved,
        result.country.as_deref(),
        result.state.as_deref(),
        result.city.as_deref(),
        result.neighborhood.as_deref(),
        result.street.as_deref(),
        result.establishment.as_deref(),
        result.location_extra_info.as_deref(),
        &result.chronological_description,
        result.additional_context.as_deref(),
        &merged_data,
        model_name,
    )
    .await
    .map_err(relato_common::StoreError::Sqlx)?;

    if let Some(geocoder) = geocoder {
        if let Some(query) = geocode_query(&result) {
            if let Some(geocoded) = geocoder.geocode(&query).await {
                if let Err(e) = relato_store::unique_event::set_geocode(
                    &store.pool,
                    unique_event.id,
                    geocoded.latitude,
                    geocoded.longitude,
                    geocoded.plus_code.as_deref(),
                    &geocoded.place_id,
                    &geocoded.formatted_address,
                    geo_precision_db_str(geocoded.precision),
                    "geocoder",
                    1.0,
                )
                .await
                {
                    warn!(unique_event_id = unique_event.id, error = %e, "dedup: geocode write-back failed");
                }
            }
        }
    }

    Ok(())
}

fn geocode_query(result: &EnrichmentResult) -> Option<String> {
    let parts: Vec<&str> = [
        result.street.as_deref(),
        result.neighborhood.as_deref(),
        result.city.as_deref(),
        result.state.as_deref(),
        result.country.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

fn geo_precision_db_str(precision: relato_common::GeoPrecision) -> &'static str {
    match precision {
        relato_common::GeoPrecision::Exact => "exact",
        relato_common::GeoPrecision::Approximate => "approximate",
        relato_common::GeoPrecision::NeighborhoodCenter => "neighborhood_center",
        relato_common::GeoPrecision::CityCenter => "city_center",
    }
}

fn enrichment_prompt(linked: &[RawEvent], sources: &[relato_store::Source]) -> String {
    let lines: Vec<String> = linked
        .iter()
        .map(|r| {
            let source = sources.iter().find(|s| s.id == r.source_id);
            format!(
                "relato: título={:?} descrição={:?} cidade={:?} bairro={:?} veículo={:?} url={:?}",
                r.title,
                r.chronological_description,
                r.city,
                r.neighborhood,
                source.and_then(|s| s.publisher_name.as_deref()),
                source.map(|s| s.resolved_url.as_deref().unwrap_or(&s.feed_url)),
            )
        })
        .collect();
    lines.join("\n")
}

fn wire_date_precision_to_db_str(precision: WireDatePrecision) -> String {
    match precision {
        WireDatePrecision::Exata => "exata",
        WireDatePrecision::Parcial => "parcial",
        WireDatePrecision::NaoInformada => "nao_informada",
    }
    .to_string()
}

/// Post-pass merge sweep (§4.8): bounded to UniqueEvents with `event_date` in
/// the last `window_days`, compares pairs within the same day bucket with the
/// match prompt, and merges on confidence strictly greater than the
/// threshold (§8 "Match confidence boundary").
pub async fn post_pass_merge_sweep(
    store: &Store,
    llm: &LlmClient,
    window_days: i64,
    match_confidence_threshold: f64,
) -> Result<usize, PipelineError> {
    let recent = relato_store::unique_event::fetch_recent_for_merge_sweep(&store.pool, window_days)
        .await
        .map_err(relato_common::StoreError::Sqlx)?;

    let mut buckets: HashMap<NaiveDate, Vec<UniqueEvent>> = HashMap::new();
    for event in recent {
        if let Some(date) = event.event_date {
            buckets.entry(date).or_default().push(event);
        }
    }

    let mut merges = 0;
    for (_, mut bucket) in buckets {
        merges += merge_bucket(store, llm, &mut bucket, match_confidence_threshold).await?;
    }

    info!(merges, "dedup: post-pass merge sweep complete");
    Ok(merges)
}

async fn merge_bucket(
    store: &Store,
    llm: &LlmClient,
    bucket: &mut Vec<UniqueEvent>,
    match_confidence_threshold: f64,
) -> Result<usize, PipelineError> {
    let mut merges = 0;
    let mut i = 0;
    while i < bucket.len() {
        let mut j = i + 1;
        let mut merged_any = false;
        while j < bucket.len() {
            let keeper = &bucket[i];
            let loser = &bucket[j];
            let is_match = match llm
                .complete::<MatchResult>(MATCH_SYSTEM_PROMPT, &merge_prompt(keeper, loser))
                .await
            {
                Ok(result) => result.is_match && result.confidence > match_confidence_threshold,
                Err(e) => {
                    warn!(keeper_id = keeper.id, loser_id = loser.id, error = %e, "dedup: merge match call failed");
                    false
                }
            };

            if is_match {
                let keeper_id = keeper.id;
                let loser_id = loser.id;
                relato_store::raw_event::reparent(&store.pool, loser_id, keeper_id)
                    .await
                    .map_err(relato_common::StoreError::Sqlx)?;
                relato_store::unique_event::mark_needs_enrichment(&store.pool, keeper_id)
                    .await
                    .map_err(relato_common::StoreError::Sqlx)?;
                relato_store::unique_event::delete(&store.pool, loser_id)
                    .await
                    .map_err(relato_common::StoreError::Sqlx)?;
                bucket.remove(j);
                merges += 1;
                merged_any = true;
            } else {
                j += 1;
            }
        }
        if !merged_any {
            i += 1;
        }
    }
    Ok(merges)
}

fn merge_prompt(keeper: &UniqueEvent, loser: &UniqueEvent) -> String {
    format!(
        "Candidato A: título={:?} data={:?} cidade={:?} bairro={:?}\nCandidato B: título={:?} data={:?} cidade={:?} bairro={:?}",
        keeper.title, keeper.event_date, keeper.city, keeper.neighborhood,
        loser.title, loser.event_date, loser.city, loser.neighborhood,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_clusters_are_one_per_event() {
        assert_eq!(trivial_clusters(3), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn valid_partition_covers_every_index_exactly_once() {
        let result = ClusterResult { clusters: vec![vec![1, 2], vec![3]] };
        assert!(is_valid_partition(&result, 3));
    }

    #[test]
    fn partition_missing_an_index_is_invalid() {
        let result = ClusterResult { clusters: vec![vec![1]] };
        assert!(!is_valid_partition(&result, 2));
    }

    #[test]
    fn partition_with_duplicate_index_is_invalid() {
        let result = ClusterResult { clusters: vec![vec![1, 1], vec![2]] };
        assert!(!is_valid_partition(&result, 2));
    }

    #[test]
    fn partition_with_out_of_range_index_is_invalid() {
        let result = ClusterResult { clusters: vec![vec![1, 5]] };
        assert!(!is_valid_partition(&result, 2));
    }
}
