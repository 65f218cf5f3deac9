//! Feed ingestion stage (§4.4): drives `relato-feed`'s fetcher over every
//! configured query, resolves each entry's URL inline, inserts new Sources,
//! and updates `CityStats` including the publisher-domain sharding re-query.

use std::collections::HashSet;

use relato_common::{Config, FeedError, PipelineError};
use relato_feed::{build_query_url, FeedEntry, FeedFetcher};
use relato_resolver::UrlResolver;
use relato_store::source::NewSource;
use relato_store::Store;
use tracing::info;

pub async fn run(
    store: &Store,
    fetcher: &FeedFetcher,
    resolver: &UrlResolver,
    config: &Config,
) -> Result<usize, PipelineError> {
    let mut total_inserted = 0;

    for query in &config.feed_queries {
        total_inserted += run_one_query(store, fetcher, resolver, config, query).await?;
    }

    Ok(total_inserted)
}

async fn run_one_query(
    store: &Store,
    fetcher: &FeedFetcher,
    resolver: &UrlResolver,
    config: &Config,
    query: &str,
) -> Result<usize, PipelineError> {
    // The locality is folded into `query` itself per config.feed_queries'
    // "seeded with a locality name" convention (§6.6); the query string
    // doubles as the CityStats locality key.
    let existing = relato_store::city_stats::get(&store.pool, query)
        .await
        .map_err(relato_common::StoreError::Sqlx)?;

    let entries = if existing.as_ref().map(|c| c.needs_sharding).unwrap_or(false) {
        fetch_sharded(fetcher, query, &config.feed_when, &config.feed_sharded_domains).await?
    } else {
        let url = build_query_url(query, "", &config.feed_when, None);
        fetcher.fetch(&url).await?
    };

    let result_count = entries.len();
    let mut inserted = 0;

    for entry in &entries {
        let resolved_url = resolver.resolve(&entry.feed_url).await;

        let new_source = NewSource {
            feed_id: entry.feed_id.clone(),
            feed_url: entry.feed_url.clone(),
            resolved_url,
            headline: entry.headline.clone(),
            publisher_name: entry.publisher_name.clone(),
            publisher_url: entry.publisher_url.clone(),
            published_at: entry.published_at,
            search_query: query.to_string(),
        };

        if relato_store::source::insert_if_new(&store.pool, new_source)
            .await
            .map_err(relato_common::StoreError::Sqlx)?
            .is_some()
        {
            inserted += 1;
        }
    }

    relato_store::city_stats::record_poll_result(
        &store.pool,
        query,
        result_count as i32,
        config.feed_sharding_threshold as i32,
    )
    .await
    .map_err(relato_common::StoreError::Sqlx)?;

    info!(query, result_count, inserted, "feed: query polled");
    Ok(inserted)
}

/// Re-issue the query per known publisher domain and union results on
/// feed-ID (§4.4 step 4, "re-issues the query per known publisher domain...
/// and unions results").
async fn fetch_sharded(
    fetcher: &FeedFetcher,
    query: &str,
    when: &str,
    domains: &[String],
) -> Result<Vec<FeedEntry>, FeedError> {
    let mut seen = HashSet::new();
    let mut union = Vec::new();

    for domain in domains {
        let url = build_query_url(query, "", when, Some(domain));
        let entries = fetcher.fetch(&url).await?;
        for entry in entries {
            if seen.insert(entry.feed_id.clone()) {
                union.push(entry);
            }
        }
    }

    Ok(union)
}
