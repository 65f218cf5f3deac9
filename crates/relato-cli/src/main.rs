use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use relato_common::Config;
use relato_pipeline::Coordinator;
use relato_store::Store;

/// Shared pool size: each stage borrows a fraction of this through the
/// coordinator, so it must sit above the sum of the per-stage concurrency
/// caps (§5 "Shared resource policy").
const DB_MAX_CONNECTIONS: u32 = 50;

/// Minute offset past the hour for scheduled feed polls, chosen to land
/// away from the top-of-hour crowd most aggregator scrapers hit (§4.9).
const SCHEDULE_MINUTE_OFFSET: u32 = 7;

#[derive(Parser)]
#[command(name = "relato")]
#[command(about = "Violent-death incident ingestion pipeline")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending database migrations and exit.
    Migrate,
    /// Run the scheduled service loop: hourly feed ingestion at a fixed
    /// minute offset, with every downstream stage drained once per tick.
    Serve,
    /// Run one tick of every stage in dependency order, then exit.
    Run,
    /// Poll the feed fetcher for every configured query once.
    Feed,
    /// Classify sources ready for classification once.
    Classify,
    /// Download and extract content for sources ready for download once.
    Download,
    /// Extract structured incident data for sources ready for extraction once.
    Extract,
    /// Run the three-phase dedup/enrichment core once.
    Dedup,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("relato=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_redacted();

    let store = Store::connect(&config.database_url, DB_MAX_CONNECTIONS).await?;
    store.migrate().await?;

    if matches!(cli.command, Command::Migrate) {
        info!("migrations applied");
        return Ok(());
    }

    let coordinator = Coordinator::new(store, config);

    match cli.command {
        Command::Migrate => unreachable!("handled above"),
        Command::Serve => serve(coordinator).await,
        Command::Run => coordinator.run_all_stages().await.map_err(Into::into),
        Command::Feed => {
            let inserted = coordinator.run_feed_ingestion().await?;
            info!(inserted, "feed ingestion complete");
            Ok(())
        }
        Command::Classify => {
            let processed = coordinator.run_classifier().await?;
            info!(processed, "classification complete");
            Ok(())
        }
        Command::Download => {
            let processed = coordinator.run_downloader().await?;
            info!(processed, "download complete");
            Ok(())
        }
        Command::Extract => {
            let processed = coordinator.run_extractor().await?;
            info!(processed, "extraction complete");
            Ok(())
        }
        Command::Dedup => coordinator.run_dedup_and_enrichment().await.map_err(Into::into),
    }
}

/// Drives the coordinator forever: feed ingestion fires once an hour at
/// `SCHEDULE_MINUTE_OFFSET`; every other stage is drained on the same tick
/// (§4.9 "the downstream stages are drained by the same scheduler").
async fn serve(coordinator: Coordinator) -> Result<()> {
    info!(minute_offset = SCHEDULE_MINUTE_OFFSET, "scheduled service starting");
    loop {
        tokio::time::sleep(duration_until_next_tick()).await;

        if let Err(e) = coordinator.run_feed_ingestion().await {
            tracing::warn!(error = %e, "scheduled feed ingestion failed, will retry next hour");
        }
        if let Err(e) = coordinator.run_all_stages().await {
            tracing::warn!(error = %e, "scheduled stage run failed, will retry next hour");
        }
    }
}

fn duration_until_next_tick() -> std::time::Duration {
    use chrono::{Timelike, Utc};

    let now = Utc::now();
    let mut next = now
        .date_naive()
        .and_hms_opt(now.hour(), SCHEDULE_MINUTE_OFFSET, 0)
        .expect("valid wall-clock time")
        .and_utc();
    if next <= now {
        next += chrono::Duration::hours(1);
    }
    (next - now).to_std().unwrap_or(std::time::Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_until_next_tick_is_never_negative_or_over_an_hour() {
        let d = duration_until_next_tick();
        assert!(d.as_secs() <= 3600);
    }
}
