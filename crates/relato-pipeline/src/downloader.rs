//! Downloader stage (§4.6): fetch and extract the article body for each
//! `Source` in `ready_for_download`, falling back to the feed URL when no
//! resolved URL is present.

use futures::stream::{self, StreamExt};
use relato_common::PipelineError;
use relato_resolver::UrlResolver;
use relato_store::Store;
use tracing::{info, warn};

pub async fn run(
    store: &Store,
    resolver: &UrlResolver,
    min_publication_year: i32,
    concurrency: usize,
    batch_size: i64,
) -> Result<usize, PipelineError> {
    let claimed = relato_store::source::claim_batch(
        &store.pool,
        "ready_for_download",
        "downloading",
        batch_size,
    )
    .await
    .map_err(relato_common::StoreError::Sqlx)?;

    let processed = claimed.len();

    stream::iter(claimed)
        .for_each_concurrent(concurrency, |source| async move {
            // §4.6: §4.2 runs against the resolved URL, falling back to the feed URL.
            let target_url = match &source.resolved_url {
                Some(url) => url.clone(),
                None => resolver
                    .resolve(&source.feed_url)
                    .await
                    .unwrap_or_else(|| source.feed_url.clone()),
            };

            let extracted = relato_extractor::extract(&target_url, source.published_at, min_publication_year).await;

            match extracted {
                Ok(Some(content)) if !content.main_text.trim().is_empty() => {
                    if let Err(e) = relato_store::source::write_download_success(
                        &store.pool,
                        source.id,
                        Some(&target_url),
                        &content.main_text,
                        content.published_at,
                    )
                    .await
                    {
                        warn!(source_id = source.id, error = %e, "downloader: write-back failed");
                    }
                }
                Ok(_) => {
                    info!(source_id = source.id, "downloader: empty extraction, terminal failure");
                    if let Err(e) = relato_store::source::write_download_failure(&store.pool, source.id).await {
                        warn!(source_id = source.id, error = %e, "downloader: failure write-back failed");
                    }
                }
                Err(e) => {
                    warn!(source_id = source.id, error = %e, "downloader: extract error, terminal failure");
                    if let Err(e) = relato_store::source::write_download_failure(&store.pool, source.id).await {
                        warn!(source_id = source.id, error = %e, "downloader: failure write-back failed");
                    }
                }
            }
        })
        .await;

    info!(processed, "downloader: stage complete");
    Ok(processed)
}
