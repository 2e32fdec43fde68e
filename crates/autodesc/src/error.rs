// ABOUTME: Error types for the extraction pipeline including ErrorCode enum and ExtractError struct.
// ABOUTME: Provides categorized errors with convenience constructors and boolean helpers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Error codes representing the categories of pipeline failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No candidate node was located.
    NotFound,
    /// The chosen candidate normalized to nothing.
    EmptyContent,
    /// Credential or configuration fault reported by the LLM backend.
    ProviderAuth,
    /// Retryable LLM fault that outlived the retry budget.
    ProviderTransient,
    /// The HTML could not be used as a document.
    MalformedInput,
    /// The caller cancelled the run.
    Cancelled,
    InvalidUrl,
    Fetch,
    Config,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::NotFound => "description not found",
            ErrorCode::EmptyContent => "empty content",
            ErrorCode::ProviderAuth => "provider authentication error",
            ErrorCode::ProviderTransient => "provider transient error",
            ErrorCode::MalformedInput => "malformed input",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::InvalidUrl => "invalid URL",
            ErrorCode::Fetch => "fetch error",
            ErrorCode::Config => "configuration error",
        };
        write!(f, "{}", s)
    }
}

/// The main error type for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub struct ExtractError {
    pub code: ErrorCode,
    pub url: String,
    pub op: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl fmt::Display for ExtractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.url.is_empty() {
            write!(f, "autodesc: {}: {}", self.op, self.code)?;
        } else {
            write!(f, "autodesc: {} {}: {}", self.op, self.url, self.code)?;
        }
        if let Some(ref src) = self.source {
            write!(f, ": {}", src)?;
        }
        Ok(())
    }
}

impl ExtractError {
    /// Create an error with an arbitrary code.
    pub fn new(
        code: ErrorCode,
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self {
            code,
            url: url.into(),
            op: op.into(),
            source,
        }
    }

    /// Create a NotFound error.
    pub fn not_found(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::NotFound, url, op, source)
    }

    /// Create an EmptyContent error.
    pub fn empty_content(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::EmptyContent, url, op, source)
    }

    /// Create a MalformedInput error.
    pub fn malformed_input(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::MalformedInput, url, op, source)
    }

    /// Create an InvalidUrl error.
    pub fn invalid_url(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::InvalidUrl, url, op, source)
    }

    /// Create a Fetch error.
    pub fn fetch(
        url: impl Into<String>,
        op: impl Into<String>,
        source: Option<anyhow::Error>,
    ) -> Self {
        Self::new(ErrorCode::Fetch, url, op, source)
    }

    /// Create a Config error; configuration is not tied to a page.
    pub fn config(op: impl Into<String>, source: Option<anyhow::Error>) -> Self {
        Self::new(ErrorCode::Config, "", op, source)
    }

    /// A short human-readable reason, without the op/url prefix.
    pub fn reason(&self) -> String {
        match self.source {
            Some(ref src) => format!("{}: {}", self.code, src),
            None => self.code.to_string(),
        }
    }

    /// Returns true if this is a NotFound error.
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::NotFound
    }

    /// Returns true if this is an EmptyContent error.
    pub fn is_empty_content(&self) -> bool {
        self.code == ErrorCode::EmptyContent
    }

    /// Returns true if this is a MalformedInput error.
    pub fn is_malformed_input(&self) -> bool {
        self.code == ErrorCode::MalformedInput
    }

    /// Returns true if this is a Fetch error.
    pub fn is_fetch(&self) -> bool {
        self.code == ErrorCode::Fetch
    }

    /// Returns true if this is an InvalidUrl error.
    pub fn is_invalid_url(&self) -> bool {
        self.code == ErrorCode::InvalidUrl
    }

    /// Returns true if this is a Config error.
    pub fn is_config(&self) -> bool {
        self.code == ErrorCode::Config
    }
}

impl From<ConfigError> for ExtractError {
    fn from(err: ConfigError) -> Self {
        Self::config("Configure", Some(err.into()))
    }
}
