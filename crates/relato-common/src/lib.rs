pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{
    ExtractError, FeedError, LlmError, PipelineError, ResolverError, StoreError,
};
pub use types::*;
