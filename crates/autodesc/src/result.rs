// ABOUTME: ExtractionResult and DiscoveryReport returned by the orchestrator.
// ABOUTME: Includes a plain-text formatter used by the CLI.

use serde::{Deserialize, Serialize};

use chrono::{DateTime, Utc};

use crate::error::{ErrorCode, ExtractError};
use crate::extractors::discovery::ProposedPath;
use crate::extractors::profile::SiteProfile;
use crate::llm::Provider;

/// Descriptor recorded when no profile path produced the description.
pub const DISCOVERED: &str = "discovered";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Description located and, when configured, refined.
    Success,
    /// Description located but refinement did not complete.
    Partial,
    Failed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Partial => "partial",
            Status::Failed => "failed",
        }
    }
}

/// A machine-readable failure or degradation reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultError {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&ExtractError> for ResultError {
    fn from(err: &ExtractError) -> Self {
        Self {
            code: err.code,
            message: err.reason(),
        }
    }
}

/// The outcome of one extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub url: String,
    pub domain: String,
    pub description: String,
    pub token_count: usize,
    pub status: Status,
    pub selected_path: Option<String>,
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub score: Option<f64>,
    pub error: Option<ResultError>,
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }

    /// Human-readable summary followed by the description.
    pub fn format_text(&self) -> String {
        let mut parts = vec![format!("URL: {}", self.url)];
        parts.push(format!("Status: {}", self.status.as_str()));
        if let Some(ref path) = self.selected_path {
            parts.push(format!("Path: {}", path));
        }
        if let Some(provider) = self.provider {
            match self.model {
                Some(ref model) => parts.push(format!("Provider: {} ({})", provider, model)),
                None => parts.push(format!("Provider: {}", provider)),
            }
        }
        parts.push(format!("Tokens: {}", self.token_count));
        if let Some(ref err) = self.error {
            parts.push(format!("Error: {}", err.message));
        }
        if !self.description.is_empty() {
            parts.push(String::new());
            parts.push(self.description.clone());
        }
        parts.join("\n")
    }
}

/// Read-only discovery output for a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryReport {
    pub url: String,
    pub domain: String,
    /// A profile is already registered for the domain.
    pub profiled: bool,
    pub proposals: Vec<ProposedPath>,
}

impl DiscoveryReport {
    /// A profile built from the proposals that match exactly one node.
    ///
    /// Returns `None` when no proposal is specific enough to register.
    pub fn to_profile(&self, verified: DateTime<Utc>) -> Option<SiteProfile> {
        let paths: Vec<_> = self
            .proposals
            .iter()
            .filter(|p| p.matches == 1 && p.matches_candidate)
            .map(|p| p.search_path.clone())
            .collect();
        if paths.is_empty() {
            return None;
        }
        let mut profile = SiteProfile::new(self.domain.clone(), paths);
        profile.last_verified = Some(verified);
        Some(profile)
    }
}
