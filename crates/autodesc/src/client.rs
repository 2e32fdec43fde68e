// ABOUTME: The extraction Client that drives a page from HTML to a refined dealer description.
// ABOUTME: Runs locate and normalize synchronously, then refines through the configured LLM backend.

use std::net::ToSocketAddrs;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::dom::normalize::{normalize, strip_phrases};
use crate::dom::scoring::Scorer;
use crate::dom::{decode_checked, Dom};
use crate::error::{ErrorCode, ExtractError};
use crate::extractors::discovery::{propose, CandidateSource, Discovery};
use crate::extractors::loader::load_builtin_registry;
use crate::extractors::locate::CandidateLocator;
use crate::extractors::profile::{normalize_domain, RegistryHandle};
use crate::extractors::select::excluded_nodes;
use crate::llm::refine::{self, Refined};
use crate::llm::retry::send_with_deadline;
use crate::llm::{tokens, CompletionBackend, ProviderError};
use crate::options::{ClientBuilder, Options};
use crate::resource::{fetch, is_private_ip, FetchOptions};
use crate::result::{DiscoveryReport, ExtractionResult, ResultError, Status, DISCOVERED};

const MAX_REDIRECTS: usize = 10;

/// Progress of one run. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum RunState {
    Fetched,
    Located,
    Normalized,
    Refined,
    Done,
    Failed,
}

struct Run<'a> {
    url: &'a str,
    state: RunState,
}

impl<'a> Run<'a> {
    fn start(url: &'a str) -> Self {
        debug!(url, state = ?RunState::Fetched, "run started");
        Self {
            url,
            state: RunState::Fetched,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(next > self.state, "run moved from {:?} to {:?}", self.state, next);
        debug!(url = self.url, from = ?self.state, to = ?next, "run state");
        self.state = next;
    }

    fn fail(&mut self, err: &ExtractError) {
        debug!(url = self.url, from = ?self.state, code = ?err.code, error = %err, "run failed");
        self.state = RunState::Failed;
    }
}

/// Everything the refinement stage needs once the DOM is gone.
#[derive(Debug)]
struct Located {
    domain: String,
    text: String,
    selected_path: String,
    score: f64,
}

fn domain_of(url: &str, op: &str) -> Result<String, ExtractError> {
    let parsed = url::Url::parse(url).map_err(|e| {
        ExtractError::invalid_url(url, op, Some(anyhow::anyhow!("malformed URL: {}", e)))
    })?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ExtractError::invalid_url(url, op, Some(anyhow::anyhow!("URL has no host"))))?;
    Ok(normalize_domain(host))
}

fn provider_failure(url: &str, err: ProviderError) -> ExtractError {
    let code = if err.is_auth() {
        ErrorCode::ProviderAuth
    } else if err.is_cancelled() {
        ErrorCode::Cancelled
    } else {
        ErrorCode::ProviderTransient
    };
    ExtractError::new(code, url, "Refine", Some(anyhow::Error::new(err)))
}

fn failed(url: &str, domain: String, err: &ExtractError) -> ExtractionResult {
    ExtractionResult {
        url: url.to_string(),
        domain,
        description: String::new(),
        token_count: 0,
        status: Status::Failed,
        selected_path: None,
        provider: None,
        model: None,
        score: None,
        error: Some(ResultError::from(err)),
    }
}

fn build_http_client(opts: &Options) -> reqwest::Client {
    if let Some(ref client) = opts.http_client {
        return client.clone();
    }
    let allow_private = opts.allow_private_networks;
    let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        if allow_private {
            return attempt.follow();
        }
        let Some(host) = attempt.url().host_str().map(str::to_string) else {
            return attempt.follow();
        };
        let port = attempt.url().port_or_known_default().unwrap_or(80);
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            if is_private_ip(&ip) {
                return attempt.error("redirect to private IP blocked");
            }
            return attempt.follow();
        }
        // the redirect hook is synchronous
        match (host.as_str(), port).to_socket_addrs() {
            Ok(mut addrs) => {
                if addrs.any(|sa| is_private_ip(&sa.ip())) {
                    attempt.error("redirect to private IP blocked")
                } else {
                    attempt.follow()
                }
            }
            Err(_) => attempt.error("DNS lookup failed during redirect"),
        }
    });

    reqwest::Client::builder()
        .redirect(redirect_policy)
        .user_agent(&opts.user_agent)
        .timeout(opts.timeout)
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .unwrap_or_else(|err| {
            warn!(error = %err, "falling back to a default HTTP client");
            reqwest::Client::new()
        })
}

/// Extracts dealer descriptions from vehicle detail pages.
pub struct Client {
    opts: Options,
    http_client: reqwest::Client,
    registry: RegistryHandle,
    locator: CandidateLocator,
}

impl Client {
    /// Create a new ClientBuilder for configuring the client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a new Client with the given options.
    pub fn new(opts: Options) -> Self {
        let http_client = build_http_client(&opts);
        let registry = opts
            .registry
            .clone()
            .unwrap_or_else(|| RegistryHandle::new(load_builtin_registry()));
        let discovery = Discovery::new(Scorer::new(opts.weights.clone()), opts.top_k, opts.min_text_len);
        let locator = CandidateLocator::new(discovery, opts.freshness.clone(), opts.partial_bonus);

        Self {
            opts,
            http_client,
            registry,
            locator,
        }
    }

    /// The registry handle runs take their snapshot from.
    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn backend(&self) -> Option<&dyn CompletionBackend> {
        self.opts.backend.as_deref()
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Fetch a page and return its decoded HTML.
    pub async fn fetch_page(&self, url: &str) -> Result<String, ExtractError> {
        let fetch_opts = FetchOptions {
            headers: self.opts.headers.clone(),
            allow_private_networks: self.opts.allow_private_networks,
        };
        let page = fetch(&self.http_client, url, &fetch_opts).await?;
        decode_checked(&page.body, page.content_type.as_deref())
            .map_err(|e| ExtractError::malformed_input(url, "Fetch", Some(e.into())))
    }

    /// Fetch a page and extract its description.
    pub async fn scrape_description(&self, url: &str) -> ExtractionResult {
        self.scrape_description_cancellable(url, &CancellationToken::new())
            .await
    }

    /// [`Client::scrape_description`] that stops when `cancel` fires.
    pub async fn scrape_description_cancellable(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ExtractError::new(ErrorCode::Cancelled, url, "Fetch", None)),
            page = self.fetch_page(url) => page,
        };
        match fetched {
            Ok(html) => self.scrape_html_cancellable(&html, url, cancel).await,
            Err(err) => {
                warn!(url, error = %err, "fetch failed");
                let domain = domain_of(url, "Fetch").unwrap_or_default();
                failed(url, domain, &err)
            }
        }
    }

    /// Extract the description from already-fetched HTML.
    pub async fn scrape_html(&self, html: &str, url: &str) -> ExtractionResult {
        self.scrape_html_cancellable(html, url, &CancellationToken::new())
            .await
    }

    /// [`Client::scrape_html`] that stops when `cancel` fires.
    pub async fn scrape_html_cancellable(
        &self,
        html: &str,
        url: &str,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        let mut run = Run::start(url);

        let located = match self.locate_description(html, url, &mut run) {
            Ok(located) => located,
            Err((domain, err)) => {
                run.fail(&err);
                return failed(url, domain, &err);
            }
        };

        let backend = match self.opts.backend.as_deref() {
            Some(backend) if self.opts.refine => backend,
            _ => {
                run.advance(RunState::Done);
                return ExtractionResult {
                    url: url.to_string(),
                    domain: located.domain,
                    description: located.text,
                    token_count: 0,
                    status: Status::Success,
                    selected_path: Some(located.selected_path),
                    provider: None,
                    model: None,
                    score: Some(located.score),
                    error: None,
                };
            }
        };

        let request = refine::build_request(&located.text);
        let outcome = send_with_deadline(
            backend,
            &request,
            &self.opts.retry,
            self.opts.refine_deadline,
            cancel,
        )
        .await;

        let mut result = ExtractionResult {
            url: url.to_string(),
            domain: located.domain,
            description: String::new(),
            token_count: 0,
            status: Status::Success,
            selected_path: Some(located.selected_path),
            provider: Some(backend.provider()),
            model: Some(backend.model().to_string()),
            score: Some(located.score),
            error: None,
        };

        match outcome {
            Ok(response) => {
                run.advance(RunState::Refined);
                result.token_count = tokens::token_count(&response);
                result.model = Some(response.model.clone());
                match refine::parse_reply(&response.text) {
                    Refined::Description(description) => {
                        result.description = description;
                    }
                    Refined::NotFound => {
                        debug!(url, "model reported no description; keeping located text");
                        result.description = located.text;
                        result.status = Status::Partial;
                        result.error = Some(ResultError {
                            code: ErrorCode::NotFound,
                            message: "model reported no description in the located text".to_string(),
                        });
                    }
                }
                run.advance(RunState::Done);
            }
            Err(err) => {
                let err = provider_failure(url, err);
                if matches!(err.code, ErrorCode::ProviderAuth | ErrorCode::Cancelled) {
                    run.fail(&err);
                    result.status = Status::Failed;
                } else {
                    warn!(url, error = %err, "refinement failed; returning located text");
                    run.advance(RunState::Done);
                    result.description = located.text;
                    result.status = Status::Partial;
                }
                result.error = Some(ResultError::from(&err));
            }
        }
        result
    }

    /// Locate and normalize the description; the DOM is dropped on return.
    fn locate_description(
        &self,
        html: &str,
        url: &str,
        run: &mut Run<'_>,
    ) -> Result<Located, (String, ExtractError)> {
        let domain = domain_of(url, "Locate").map_err(|err| (String::new(), err))?;
        let fail = |err: ExtractError| (domain.clone(), err);

        let dom = Dom::parse(html)
            .map_err(|e| fail(ExtractError::malformed_input(url, "Locate", Some(e.into()))))?;

        if dom.is_blank() {
            return Err(fail(ExtractError::not_found(
                url,
                "Locate",
                Some(anyhow::anyhow!("page body has no visible text")),
            )));
        }

        let registry = self.registry.snapshot();
        let profile = registry.lookup(&domain);
        debug!(url, domain = %domain, profiled = profile.is_some(), "registry lookup");

        let candidates = self.locator.locate(&dom, profile.as_deref());
        let Some(best) = candidates.first() else {
            return Err(fail(ExtractError::not_found(
                url,
                "Locate",
                Some(anyhow::anyhow!("no candidate region in the page")),
            )));
        };
        run.advance(RunState::Located);

        let selected_path = match (&best.source, profile.as_deref()) {
            (
                CandidateSource::Profile { path_index } | CandidateSource::PartialProfile { path_index },
                Some(profile),
            ) => profile
                .search_paths
                .get(*path_index)
                .map(|path| path.locator.describe())
                .unwrap_or_else(|| DISCOVERED.to_string()),
            _ => DISCOVERED.to_string(),
        };
        debug!(
            url,
            score = best.score,
            position = best.position,
            path = %selected_path,
            candidates = candidates.len(),
            "selected candidate"
        );

        let (excluded, patterns) = match profile.as_deref() {
            Some(profile) => (excluded_nodes(&dom, &profile.clean), profile.strip_patterns()),
            None => Default::default(),
        };
        let text = dom
            .get(best.node)
            .and_then(|element| normalize(element, &excluded))
            .map(|text| strip_phrases(&text, &patterns))
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                fail(ExtractError::empty_content(
                    url,
                    "Normalize",
                    Some(anyhow::anyhow!("selected region has no visible text")),
                ))
            })?;
        run.advance(RunState::Normalized);

        Ok(Located {
            domain,
            text,
            selected_path,
            score: best.score,
        })
    }

    /// Score the page and propose search paths for a new profile.
    ///
    /// Read-only: the registry is consulted but never changed.
    pub fn determine_search_paths(&self, html: &str, url: &str) -> Result<DiscoveryReport, ExtractError> {
        let domain = domain_of(url, "Discover")?;
        let dom = Dom::parse(html)
            .map_err(|e| ExtractError::malformed_input(url, "Discover", Some(e.into())))?;
        let profiled = self.registry.snapshot().lookup(&domain).is_some();

        let candidates = self.locator.discovery().discover(&dom);
        let proposals = propose(&dom, &candidates);
        debug!(url, domain = %domain, proposals = proposals.len(), "search paths proposed");

        Ok(DiscoveryReport {
            url: url.to_string(),
            domain,
            profiled,
            proposals,
        })
    }
}
