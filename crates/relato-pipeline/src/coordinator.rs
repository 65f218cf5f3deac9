//! Pipeline coordinator (§4.9): owns the per-stage bounded worker pools,
//! exposes an imperative trigger per stage, and a composite "run all stages"
//! entrypoint. Grounded in the claim/process idiom already established by
//! `relato-store`'s repository functions — a much simpler shape than the
//! teacher's event-sourced `ScrapePipeline`, which this pipeline's stages
//! don't need (see DESIGN.md).

use relato_common::{Config, PipelineError};
use relato_feed::FeedFetcher;
use relato_llm::LlmClient;
use relato_resolver::UrlResolver;
use relato_store::Store;
use tracing::info;
use uuid::Uuid;

use crate::geocoder::Geocoder;
use crate::{classifier, dedup, downloader, extractor, feed};

/// Owns the long-lived clients every stage needs. One `Coordinator` per
/// running process; stages borrow from it, never share mutable state across
/// the stage boundary (§5 "Shared resource policy").
pub struct Coordinator {
    store: Store,
    resolver: UrlResolver,
    fetcher: FeedFetcher,
    classification_llm: LlmClient,
    extraction_llm: LlmClient,
    enrichment_llm: LlmClient,
    extraction_model: String,
    enrichment_model: String,
    geocoder: Option<Geocoder>,
    config: Config,
}

impl Coordinator {
    pub fn new(store: Store, config: Config) -> Self {
        let classification_llm = LlmClient::claude(
            config.anthropic_api_key.clone(),
            config.llm_classification_model.clone(),
            config.llm_max_retries,
        );
        let extraction_llm = LlmClient::claude(
            config.anthropic_api_key.clone(),
            config.llm_extraction_model.clone(),
            config.llm_max_retries,
        );
        let enrichment_llm = LlmClient::claude(
            config.anthropic_api_key.clone(),
            config.llm_enrichment_model.clone(),
            config.llm_max_retries,
        );
        let geocoder = config.geocoder_enabled.then(|| Geocoder::new(config.geocoder_api_key.clone()));
        let fetcher = FeedFetcher::new(config.feed_requests_per_minute, config.feed_min_interval_seconds);

        Self {
            store,
            resolver: UrlResolver::new(),
            fetcher,
            classification_llm,
            extraction_model: config.llm_extraction_model.clone(),
            enrichment_model: config.llm_enrichment_model.clone(),
            extraction_llm,
            enrichment_llm,
            geocoder,
            config,
        }
    }

    /// Imperative trigger: scheduled ingestion (§4.9 "drives the feed
    /// fetcher"). Runs every configured (query, locality) pair once.
    pub async fn run_feed_ingestion(&self) -> Result<usize, PipelineError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "coordinator: feed ingestion starting");
        let inserted = feed::run(&self.store, &self.fetcher, &self.resolver, &self.config).await?;
        info!(%run_id, inserted, "coordinator: feed ingestion complete");
        Ok(inserted)
    }

    pub async fn run_classifier(&self) -> Result<usize, PipelineError> {
        classifier::run(&self.store, &self.classification_llm, self.config.classify_concurrency, self.config.batch_size).await
    }

    pub async fn run_downloader(&self) -> Result<usize, PipelineError> {
        downloader::run(
            &self.store,
            &self.resolver,
            self.config.min_publication_year,
            self.config.download_concurrency,
            self.config.batch_size,
        )
        .await
    }

    pub async fn run_extractor(&self) -> Result<usize, PipelineError> {
        extractor::run(
            &self.store,
            &self.extraction_llm,
            &self.extraction_model,
            self.config.extract_concurrency,
            self.config.batch_size,
        )
        .await
    }

    /// The three-phase dedup/enrichment core (§4.8), sequenced exactly as the
    /// spec requires: Phase 1a must fully complete before Phase 1b starts,
    /// and Phase 1b before Phase 2 — this ordering is the one place the
    /// coordinator *does* block one phase on another.
    pub async fn run_dedup_and_enrichment(&self) -> Result<(), PipelineError> {
        let unmatched = dedup::phase1a_match(
            &self.store,
            &self.enrichment_llm,
            self.config.enrichment_concurrency,
            self.config.date_tolerance_days,
            self.config.match_confidence_threshold,
        )
        .await?;

        dedup::phase1b_cluster(&self.store, &self.enrichment_llm, unmatched, self.config.enrichment_concurrency).await?;

        dedup::phase2_enrich(
            &self.store,
            &self.enrichment_llm,
            &self.enrichment_model,
            self.geocoder.as_ref(),
            self.config.enrichment_concurrency,
        )
        .await?;

        dedup::post_pass_merge_sweep(
            &self.store,
            &self.enrichment_llm,
            self.config.post_pass_window_days,
            self.config.match_confidence_threshold,
        )
        .await?;

        Ok(())
    }

    /// Composite "run all stages with these bounds" entrypoint (§4.9). Each
    /// stage is invoked in dependency order but does not block on the
    /// others — a stage simply finds no work if the prior stage hasn't
    /// produced any yet on this tick.
    pub async fn run_all_stages(&self) -> Result<(), PipelineError> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "coordinator: tick starting");

        let classified = self.run_classifier().await?;
        let downloaded = self.run_downloader().await?;
        let extracted = self.run_extractor().await?;
        self.run_dedup_and_enrichment().await?;

        info!(%run_id, classified, downloaded, extracted, "coordinator: tick complete");
        Ok(())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}
