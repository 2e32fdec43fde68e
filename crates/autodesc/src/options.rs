// ABOUTME: Tuning options for the extraction client and the ClientBuilder that assembles them.
// ABOUTME: Covers scoring, profile freshness, fetch settings, the LLM backend and its retry budget.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::client::Client;
use crate::config::{ConfigError, LlmConfig};
use crate::dom::scoring::ScoringWeights;
use crate::extractors::discovery::{DEFAULT_MIN_TEXT_LEN, DEFAULT_TOP_K};
use crate::extractors::locate::DEFAULT_PARTIAL_BONUS;
use crate::extractors::profile::{FreshnessPolicy, ProfileRegistry, RegistryHandle};
use crate::llm::{CompletionBackend, LlmClient, RetryPolicy};
use crate::resource::BROWSER_USER_AGENT;

/// Page fetch timeout used when none is configured.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration options for the extraction client.
#[derive(Clone)]
pub struct Options {
    pub weights: ScoringWeights,
    pub top_k: usize,
    pub min_text_len: usize,
    pub freshness: FreshnessPolicy,
    pub partial_bonus: f64,
    pub retry: RetryPolicy,
    /// Wall-clock budget for the whole refinement, retries included.
    pub refine_deadline: Option<Duration>,
    /// Send located text to the backend when one is configured.
    pub refine: bool,
    pub timeout: Duration,
    pub user_agent: String,
    pub allow_private_networks: bool,
    pub headers: HashMap<String, String>,
    pub http_client: Option<reqwest::Client>,
    pub registry: Option<RegistryHandle>,
    pub backend: Option<Arc<dyn CompletionBackend>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            top_k: DEFAULT_TOP_K,
            min_text_len: DEFAULT_MIN_TEXT_LEN,
            freshness: FreshnessPolicy::default(),
            partial_bonus: DEFAULT_PARTIAL_BONUS,
            retry: RetryPolicy::default(),
            refine_deadline: None,
            refine: true,
            timeout: DEFAULT_FETCH_TIMEOUT,
            user_agent: BROWSER_USER_AGENT.to_string(),
            allow_private_networks: false,
            headers: crate::resource::default_headers(),
            http_client: None,
            registry: None,
            backend: None,
        }
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = self
            .backend
            .as_ref()
            .map(|b| format!("{} ({})", b.provider(), b.model()));
        f.debug_struct("Options")
            .field("weights", &self.weights)
            .field("top_k", &self.top_k)
            .field("min_text_len", &self.min_text_len)
            .field("freshness", &self.freshness)
            .field("partial_bonus", &self.partial_bonus)
            .field("retry", &self.retry)
            .field("refine_deadline", &self.refine_deadline)
            .field("refine", &self.refine)
            .field("timeout", &self.timeout)
            .field("allow_private_networks", &self.allow_private_networks)
            .field("headers", &self.headers)
            .field("backend", &backend)
            .finish_non_exhaustive()
    }
}

/// Builder for constructing Client instances with custom configuration.
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    opts: Options,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            opts: Options::default(),
        }
    }

    pub fn weights(mut self, weights: ScoringWeights) -> Self {
        self.opts.weights = weights;
        self
    }

    /// Number of discovery candidates kept per page.
    pub fn top_k(mut self, top_k: usize) -> Self {
        self.opts.top_k = top_k.max(1);
        self
    }

    /// Minimum normalized text length for a node to be scored.
    pub fn min_text_len(mut self, len: usize) -> Self {
        self.opts.min_text_len = len;
        self
    }

    pub fn freshness(mut self, policy: FreshnessPolicy) -> Self {
        self.opts.freshness = policy;
        self
    }

    pub fn partial_bonus(mut self, bonus: f64) -> Self {
        self.opts.partial_bonus = bonus;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.opts.retry = policy;
        self
    }

    pub fn refine_deadline(mut self, deadline: Duration) -> Self {
        self.opts.refine_deadline = Some(deadline);
        self
    }

    /// Enable or disable the LLM refinement stage.
    pub fn refine(mut self, enabled: bool) -> Self {
        self.opts.refine = enabled;
        self
    }

    /// Set the page fetch timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.opts.user_agent = user_agent.into();
        self
    }

    /// Allow or disallow requests to private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    /// Add or replace a header sent with page requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Use a custom HTTP client for page fetches.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.opts.http_client = Some(client);
        self
    }

    /// Share a registry handle with other clients.
    pub fn registry(mut self, handle: RegistryHandle) -> Self {
        self.opts.registry = Some(handle);
        self
    }

    /// Use a fixed set of profiles instead of the built-in ones.
    pub fn profiles(mut self, registry: ProfileRegistry) -> Self {
        self.opts.registry = Some(RegistryHandle::new(registry));
        self
    }

    pub fn backend<B>(mut self, backend: B) -> Self
    where
        B: CompletionBackend + 'static,
    {
        self.opts.backend = Some(Arc::new(backend));
        self
    }

    pub fn shared_backend(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.opts.backend = Some(backend);
        self
    }

    /// Configure the backend, retry budget and deadline from an LLM configuration.
    pub fn llm_config(mut self, config: &LlmConfig) -> Result<Self, ConfigError> {
        let client = LlmClient::from_config(config)?;
        self.opts.backend = Some(Arc::new(client));
        self.opts.retry = config.retry_policy();
        self.opts.refine_deadline = Some(config.timeout);
        Ok(self)
    }

    /// Build the Client with the configured options.
    pub fn build(self) -> Client {
        Client::new(self.opts)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;

    #[test]
    fn defaults_match_documented_values() {
        let opts = Options::default();
        assert_eq!(opts.top_k, 5);
        assert_eq!(opts.min_text_len, 15);
        assert_eq!(opts.partial_bonus, 0.1);
        assert_eq!(opts.timeout, Duration::from_secs(15));
        assert!(opts.refine);
        assert!(opts.backend.is_none());
        assert!(opts.headers.contains_key("Accept-Language"));
    }

    #[test]
    fn llm_config_sets_backend_and_deadline() {
        let mut config = LlmConfig::new(Provider::Mistral, "mistral-small-latest", "key");
        config.timeout = Duration::from_secs(12);
        config.max_attempts = 5;
        let builder = ClientBuilder::new().llm_config(&config).unwrap();
        let backend = builder.opts.backend.as_ref().unwrap();
        assert_eq!(backend.provider(), Provider::Mistral);
        assert_eq!(backend.model(), "mistral-small-latest");
        assert_eq!(builder.opts.retry.max_attempts, 5);
        assert_eq!(builder.opts.refine_deadline, Some(Duration::from_secs(12)));
    }

    #[test]
    fn debug_names_backend_without_secrets() {
        let config = LlmConfig::new(Provider::OpenAi, "gpt-4o-mini", "sk-secret");
        let builder = ClientBuilder::new().llm_config(&config).unwrap();
        let rendered = format!("{:?}", builder);
        assert!(rendered.contains("openai (gpt-4o-mini)"));
        assert!(!rendered.contains("sk-secret"));
    }

    #[test]
    fn top_k_floor_is_one() {
        assert_eq!(ClientBuilder::new().top_k(0).opts.top_k, 1);
    }
}
