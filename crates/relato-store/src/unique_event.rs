//! Repository for `UniqueEvent` rows: creation (Phase 1b), candidate lookup
//! for blocking (Phase 1a, post-pass sweep), synthesis write-back (Phase 2),
//! and the merge-sweep delete.

use chrono::NaiveDate;
use serde_json::Value;
use sqlx::PgPool;

use crate::entities::UniqueEvent;

/// Seed fields for a brand-new UniqueEvent, initialized from a cluster's
/// first member (§4.8 Phase 1b). `needs_enrichment` always starts `true`.
#[derive(Debug, Clone)]
pub struct NewUniqueEvent {
    pub homicide_type: Option<String>,
    pub method: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub date_precision: Option<String>,
    pub time_of_day: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub neighborhood: Option<String>,
    pub title: String,
}

pub async fn create(pool: &PgPool, e: NewUniqueEvent) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO unique_event
            (homicide_type, method, event_date, date_precision, time_of_day,
             city, state, neighborhood, title, needs_enrichment)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, true)
        RETURNING id
        "#,
    )
    .bind(&e.homicide_type)
    .bind(&e.method)
    .bind(e.event_date)
    .bind(&e.date_precision)
    .bind(&e.time_of_day)
    .bind(&e.city)
    .bind(&e.state)
    .bind(&e.neighborhood)
    .bind(&e.title)
    .fetch_one(pool)
    .await
}

/// Blocking candidates for Phase 1a (§4.8 step 1): UniqueEvents whose
/// `event_date` is within `±tolerance_days` of `event_date`, restricted to
/// the ids in `snapshot` (the set taken at phase start, so a UniqueEvent
/// created concurrently by Phase 1b is never matched against).
pub async fn candidates_within_date_tolerance(
    pool: &PgPool,
    event_date: NaiveDate,
    tolerance_days: i64,
    snapshot_ids: &[i64],
) -> Result<Vec<UniqueEvent>, sqlx::Error> {
    if snapshot_ids.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_as::<_, UniqueEvent>(
        r#"
        SELECT * FROM unique_event
        WHERE id = ANY($1)
          AND event_date IS NOT NULL
          AND event_date BETWEEN $2 - make_interval(days => $3) AND $2 + make_interval(days => $3)
        ORDER BY id
        "#,
    )
    .bind(snapshot_ids)
    .bind(event_date)
    .bind(tolerance_days as i32)
    .fetch_all(pool)
    .await
}

/// All current UniqueEvent ids — the Phase-1a-start snapshot (§4.8 step 1).
pub async fn all_ids(pool: &PgPool) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT id FROM unique_event ORDER BY id")
        .fetch_all(pool)
        .await
}

/// Flag a UniqueEvent for re-enrichment (§4.8 Phase 1a step 3, "mark the
/// UniqueEvent needs-enrichment"). Idempotent: re-flagging an already-flagged
/// event is a no-op in effect.
pub async fn mark_needs_enrichment(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE unique_event SET needs_enrichment = true, updated_at = now() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn fetch_needing_enrichment(pool: &PgPool) -> Result<Vec<UniqueEvent>, sqlx::Error> {
    sqlx::query_as::<_, UniqueEvent>("SELECT * FROM unique_event WHERE needs_enrichment ORDER BY id")
        .fetch_all(pool)
        .await
}

/// Full synthesis write-back (§4.8 Phase 2): overwrites every canonical
/// field, authoritative over prior values because new evidence may correct
/// earlier guesses. Recomputes `source_count` from the link table in the
/// same statement so it never drifts from the authoritative count.
#[allow(clippy::too_many_arguments)]
pub async fn write_synthesis(
    pool: &PgPool,
    id: i64,
    title: &str,
    event_date: Option<NaiveDate>,
    date_precision: Option<&str>,
    time_of_day: Option<&str>,
    homicide_type: &str,
    method: Option<&str>,
    victim_summary: Option<&str>,
    victim_count: i32,
    identified_victim_count: i32,
    perpetrator_count: i32,
    identified_perpetrator_count: i32,
    security_force_involved: Option<bool>,
    country: Option<&str>,
    state: Option<&str>,
    city: Option<&str>,
    neighborhood: Option<&str>,
    street: Option<&str>,
    establishment: Option<&str>,
    location_extra_info: Option<&str>,
    chronological_description: &str,
    additional_context: Option<&str>,
    merged_data: &Value,
    enrichment_model: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE unique_event
        SET title = $1, event_date = $2, date_precision = $3, time_of_day = $4,
            homicide_type = $5, method = $6, victim_summary = $7,
            victim_count = $8, identified_victim_count = $9,
            perpetrator_count = $10, identified_perpetrator_count = $11,
            security_force_involved = $12, country = $13, state = $14, city = $15,
            neighborhood = $16, street = $17, establishment = $18,
            location_description = $19, chronological_description = $20,
            additional_context = $21, merged_data = $22, enrichment_model = $23,
            source_count = (SELECT count(*) FROM raw_event WHERE unique_event_id = $24),
            needs_enrichment = false, last_enriched_at = now(), updated_at = now()
        WHERE id = $24
        "#,
    )
    .bind(title)
    .bind(event_date)
    .bind(date_precision)
    .bind(time_of_day)
    .bind(homicide_type)
    .bind(method)
    .bind(victim_summary)
    .bind(victim_count)
    .bind(identified_victim_count)
    .bind(perpetrator_count)
    .bind(identified_perpetrator_count)
    .bind(security_force_involved)
    .bind(country)
    .bind(state)
    .bind(city)
    .bind(neighborhood)
    .bind(street)
    .bind(establishment)
    .bind(location_extra_info)
    .bind(chronological_description)
    .bind(additional_context)
    .bind(merged_data)
    .bind(enrichment_model)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn set_geocode(
    pool: &PgPool,
    id: i64,
    latitude: f64,
    longitude: f64,
    plus_code: Option<&str>,
    place_id: &str,
    formatted_address: &str,
    precision: &str,
    source: &str,
    confidence: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE unique_event
        SET latitude = $1, longitude = $2, plus_code = $3, place_id = $4,
            formatted_address = $5, geo_precision = $6, geo_source = $7,
            geo_confidence = $8, updated_at = now()
        WHERE id = $9
        "#,
    )
    .bind(latitude)
    .bind(longitude)
    .bind(plus_code)
    .bind(place_id)
    .bind(formatted_address)
    .bind(precision)
    .bind(source)
    .bind(confidence)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Bounded window for the post-pass merge sweep (§4.8): UniqueEvents whose
/// `event_date` falls within the last `window_days`.
pub async fn fetch_recent_for_merge_sweep(
    pool: &PgPool,
    window_days: i64,
) -> Result<Vec<UniqueEvent>, sqlx::Error> {
    sqlx::query_as::<_, UniqueEvent>(
        r#"
        SELECT * FROM unique_event
        WHERE event_date IS NOT NULL
          AND event_date >= (CURRENT_DATE - make_interval(days => $1))
        ORDER BY event_date, id
        "#,
    )
    .bind(window_days as i32)
    .fetch_all(pool)
    .await
}

/// Delete the losing UniqueEvent of a merge. Callers must reparent its
/// RawEvents first (`raw_event::reparent`) — deleting out of order would
/// orphan them, an internal invariant violation (§7).
pub async fn delete(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM unique_event WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_unique_event_requires_a_title() {
        let e = NewUniqueEvent {
            homicide_type: Some("Homicídio".to_string()),
            method: None,
            event_date: None,
            date_precision: None,
            time_of_day: None,
            city: Some("Rio de Janeiro".to_string()),
            state: None,
            neighborhood: Some("Copacabana".to_string()),
            title: "HOMICÍDIO - COPACABANA".to_string(),
        };
        assert!(!e.title.is_empty());
    }
}
