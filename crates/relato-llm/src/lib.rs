pub mod client;
pub mod schema;
pub mod schemas;

pub use client::LlmClient;
pub use schema::StructuredOutput;
