//! Postgres persistence for the ingestion-to-canonicalization pipeline
//! (spec §3, §5). Entity CRUD and the atomic claim pattern live in the
//! per-entity modules; `Store` just owns the pool and runs migrations,
//! mirroring `rootsignal-archive::store::ArchiveStore`.

pub mod city_stats;
pub mod entities;
pub mod raw_event;
pub mod source;
pub mod stats;
pub mod unique_event;

pub use entities::{CityStats, RawEvent, Source, UniqueEvent};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Clone)]
pub struct Store {
    pub pool: PgPool,
}

impl Store {
    /// Connect with a pool sized above the sum of stage-pool sizes (§5
    /// "Shared resource policy"). `max_connections` is the caller's
    /// responsibility to size correctly — this just wires the value through.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}
