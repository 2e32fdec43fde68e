// ABOUTME: Library entry point for autodesc, a dealer description extractor for vehicle detail pages.
// ABOUTME: Re-exports the Client, its builder, results, profiles and the LLM backend types.

//! autodesc - locate, normalize and refine the dealer-written description on
//! a vehicle detail page.
//!
//! Known dealer sites are handled through site profiles (ordered search paths
//! into the page). Unknown sites fall back to a rule-based scorer that ranks
//! every element and proposes new search paths. The located text can then be
//! passed to Anthropic, OpenAI or Mistral to isolate the dealer's own words.
//!
//! # Example
//!
//! ```no_run
//! use autodesc::{Client, LlmConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LlmConfig::from_env()?;
//!     let client = Client::builder().llm_config(&config)?.build();
//!     let result = client.scrape_description("https://www.sftoyota.com/vdp/123").await;
//!     println!("{}", result.format_text());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod dom;
pub mod error;
pub mod extractors;
pub mod llm;
pub mod options;
pub mod resource;
pub mod result;

pub use crate::client::Client;
pub use crate::config::{ConfigError, LlmConfig};
pub use crate::error::{ErrorCode, ExtractError};
pub use crate::extractors::discovery::{Candidate, CandidateSource, ProposedPath};
pub use crate::extractors::loader::load_builtin_registry;
pub use crate::extractors::profile::{
    FreshnessPolicy, Locator, PathStep, ProfileRegistry, RegistryHandle, SearchPath, SiteProfile,
};
pub use crate::llm::{CompletionBackend, LlmClient, Provider, ProviderError, RetryPolicy};
pub use crate::options::{ClientBuilder, Options};
pub use crate::result::{DiscoveryReport, ExtractionResult, ResultError, Status};
