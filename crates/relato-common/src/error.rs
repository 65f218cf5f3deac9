use thiserror::Error;

/// Errors surfaced by the LLM client wrapper (§4.3). Transport and
/// schema-violation failures are distinguished because the wrapper retries
/// both but the pipeline reports them differently (§7).
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("transport error after {attempts} attempt(s): {0}", attempts = .1)]
    Transport(String, u32),

    #[error("schema violation after {attempts} attempt(s): {0}", attempts = .1)]
    SchemaViolation(String, u32),

    #[error("provider rate-limited")]
    RateLimited,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("no extractable content")]
    Empty,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Request(String),

    #[error("feed parse failed: {0}")]
    Parse(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Resolver(#[from] ResolverError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("internal invariant violated, stage aborted: {0}")]
    Invariant(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
