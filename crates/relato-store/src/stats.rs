//! Stage-breakdown statistics (§7 "terminal-failure counts surface in the
//! stats endpoint broken down by stage"). No HTTP surface is built here —
//! that's out of scope (spec §1) — but the read API would need exactly this
//! query, so it's implemented and tested as a plain repository method.

use sqlx::PgPool;

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct StageStats {
    pub ready_for_classification: i64,
    pub classifying: i64,
    pub discarded: i64,
    pub ready_for_download: i64,
    pub downloading: i64,
    pub failed_in_download: i64,
    pub ready_for_extraction: i64,
    pub extracting: i64,
    pub failed_in_extraction: i64,
    pub extracted: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct StateCount {
    state: String,
    count: i64,
}

pub async fn source_stage_stats(pool: &PgPool) -> Result<StageStats, sqlx::Error> {
    let rows: Vec<StateCount> =
        sqlx::query_as("SELECT state, count(*) as count FROM source GROUP BY state")
            .fetch_all(pool)
            .await?;

    let mut stats = StageStats::default();
    for row in rows {
        let field = match row.state.as_str() {
            "ready_for_classification" => &mut stats.ready_for_classification,
            "classifying" => &mut stats.classifying,
            "discarded" => &mut stats.discarded,
            "ready_for_download" => &mut stats.ready_for_download,
            "downloading" => &mut stats.downloading,
            "failed_in_download" => &mut stats.failed_in_download,
            "ready_for_extraction" => &mut stats.ready_for_extraction,
            "extracting" => &mut stats.extracting,
            "failed_in_extraction" => &mut stats.failed_in_extraction,
            "extracted" => &mut stats.extracted,
            other => {
                tracing::warn!(state = other, "stats: unrecognized source state");
                continue;
            }
        };
        *field = row.count;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stage_stats_are_all_zero() {
        let stats = StageStats::default();
        assert_eq!(stats.extracted, 0);
        assert_eq!(stats.failed_in_download, 0);
        assert_eq!(stats.failed_in_extraction, 0);
    }
}
