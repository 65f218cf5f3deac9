//! Repository for `RawEvent` rows: creation by the extractor, and the reads
//! the dedup/enrichment core (§4.8) needs.

use chrono::NaiveDate;
use serde_json::Value;
use sqlx::PgPool;

use crate::entities::RawEvent;

#[derive(Debug, Clone)]
pub struct NewRawEvent {
    pub source_id: i64,
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
}

/// Insert a `RawEvent` from a successful extraction (§4.7). No RawEvent is
/// ever created for a failed extraction — that invariant lives in the
/// caller, this function is only reached on success.
pub async fn insert(pool: &PgPool, e: NewRawEvent) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        r#"
        INSERT INTO raw_event
            (source_id, event_date, date_precision, time_of_day, city, state,
             neighborhood, victim_count, identified_victim_count, perpetrator_count,
             security_force_involved, homicide_type, method, title,
             chronological_description, extraction_data, extraction_model,
             extraction_success, dedup_state)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, true, 'pending')
        RETURNING id
        "#,
    )
    .bind(e.source_id)
    .bind(e.event_date)
    .bind(&e.date_precision)
    .bind(&e.time_of_day)
    .bind(&e.city)
    .bind(&e.state)
    .bind(&e.neighborhood)
    .bind(e.victim_count)
    .bind(e.identified_victim_count)
    .bind(e.perpetrator_count)
    .bind(e.security_force_involved)
    .bind(&e.homicide_type)
    .bind(&e.method)
    .bind(&e.title)
    .bind(&e.chronological_description)
    .bind(&e.extraction_data)
    .bind(&e.extraction_model)
    .fetch_one(pool)
    .await
}

/// RawEvents eligible for deduplication (§4.8): `dedup_state = 'pending'`
/// and `event_date IS NOT NULL` — undated RawEvents are not deduplicatable
/// and are left `pending` indefinitely (§7 "Data absence").
pub async fn fetch_pending_with_date(pool: &PgPool) -> Result<Vec<RawEvent>, sqlx::Error> {
    sqlx::query_as::<_, RawEvent>(
        "SELECT * FROM raw_event WHERE dedup_state = 'pending' AND event_date IS NOT NULL ORDER BY id",
    )
    .fetch_all(pool)
    .await
}

/// Link a RawEvent to an existing UniqueEvent (Phase 1a match, §4.8 step 3).
/// Only applies if the row is still `pending` — prevents a slow worker from
/// overwriting a link another pass already made for the same RawEvent.
pub async fn link_matched(
    pool: &PgPool,
    raw_event_id: i64,
    unique_event_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE raw_event
        SET unique_event_id = $1, dedup_state = 'matched'
        WHERE id = $2 AND dedup_state = 'pending'
        "#,
    )
    .bind(unique_event_id)
    .bind(raw_event_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Link a RawEvent to a freshly created UniqueEvent (Phase 1b cluster,
/// §4.8 "For each cluster, create one UniqueEvent... link every RawEvent").
pub async fn link_clustered(
    pool: &PgPool,
    raw_event_id: i64,
    unique_event_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE raw_event
        SET unique_event_id = $1, dedup_state = 'clustered'
        WHERE id = $2 AND dedup_state = 'pending'
        "#,
    )
    .bind(unique_event_id)
    .bind(raw_event_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// All RawEvents currently linked to a UniqueEvent (input to enrichment,
/// §4.8 Phase 2, and to synthesis generally).
pub async fn fetch_by_unique_event(
    pool: &PgPool,
    unique_event_id: i64,
) -> Result<Vec<RawEvent>, sqlx::Error> {
    sqlx::query_as::<_, RawEvent>(
        "SELECT * FROM raw_event WHERE unique_event_id = $1 ORDER BY id",
    )
    .bind(unique_event_id)
    .fetch_all(pool)
    .await
}

/// Re-parent every RawEvent owned by `loser_id` to `keeper_id` (post-pass
/// merge sweep, §4.8, §3 "Lifecycle summary"). Gold-standard RawEvents are
/// still reassigned — only their own `extraction_data` is exempt from
/// overwrite, never their ownership link.
pub async fn reparent(pool: &PgPool, loser_id: i64, keeper_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE raw_event SET unique_event_id = $1 WHERE unique_event_id = $2",
    )
    .bind(keeper_id)
    .bind(loser_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_raw_event_carries_extraction_model_and_payload() {
        let e = NewRawEvent {
            source_id: 1,
            event_date: None,
            date_precision: None,
            time_of_day: None,
            city: None,
            state: None,
            neighborhood: None,
            victim_count: None,
            identified_victim_count: None,
            perpetrator_count: None,
            security_force_involved: None,
            homicide_type: None,
            method: None,
            title: None,
            chronological_description: None,
            extraction_data: serde_json::json!({"ok": true}),
            extraction_model: "claude-3-5-sonnet-latest".to_string(),
        };
        assert_eq!(e.extraction_model, "claude-3-5-sonnet-latest");
        assert_eq!(e.extraction_data["ok"], serde_json::json!(true));
    }
}
