// ABOUTME: Site profile data models and the per-domain profile registry.
// ABOUTME: Describes known search paths for dealer sites and serves immutable registry snapshots.

//! Site profiles for known dealer websites.
//!
//! A [`SiteProfile`] lists the search paths that locate the description
//! container on one dealer site. Profiles are read by domain through a
//! [`ProfileRegistry`]; a [`RegistryHandle`] shares a registry between runs
//! and swaps whole snapshots on update.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One level of a nested tag lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PathStep {
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Space or comma separated; every listed class must be present.
    #[serde(default, alias = "class_", skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// Case-insensitive substring the element text must contain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
}

impl PathStep {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self
    }

    pub fn with_contents(mut self, contents: impl Into<String>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    /// Individual class names from the `class` field.
    pub fn classes(&self) -> Vec<&str> {
        self.class
            .as_deref()
            .unwrap_or("")
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// CSS rendering of the structural part of the step (tag, id, classes, attributes).
    pub fn to_css(&self) -> String {
        let mut css = if self.tag.is_empty() {
            "*".to_string()
        } else {
            self.tag.to_ascii_lowercase()
        };
        if let Some(id) = &self.id {
            css.push('#');
            css.push_str(&css_ident(id));
        }
        for class in self.classes() {
            css.push('.');
            css.push_str(&css_ident(class));
        }
        for (name, value) in &self.attrs {
            css.push_str(&format!("[{}=\"{}\"]", name, value.replace('"', "\\\"")));
        }
        css
    }
}

// Escape characters that would end a CSS identifier
fn css_ident(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
        let plain = c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii();
        if plain && !(i == 0 && c.is_ascii_digit()) {
            out.push(c);
        } else if i == 0 && c.is_ascii_digit() {
            out.push_str(&format!("\\{:x} ", c as u32));
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// How a search path addresses the description container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    /// A CSS selector string, e.g. `"div#vehicle-description div.description"`
    Css(String),
    /// Nested tag lookups, outermost first
    Chain(Vec<PathStep>),
}

impl Locator {
    /// Selector-style descriptor used in results and logs.
    ///
    /// Chain steps are joined with the descendant combinator, mirroring how
    /// each step searches the whole subtree of the previous one. Steps with
    /// `contents` render as `:contains(...)`, which is not valid CSS.
    pub fn describe(&self) -> String {
        match self {
            Locator::Css(css) => css.clone(),
            Locator::Chain(steps) => steps
                .iter()
                .map(|step| match &step.contents {
                    Some(contents) => format!("{}:contains(\"{}\")", step.to_css(), contents),
                    None => step.to_css(),
                })
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

fn default_confidence() -> f64 {
    0.9
}

/// A locator with the confidence recorded for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPath {
    pub locator: Locator,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

impl SearchPath {
    pub fn css(css: impl Into<String>, confidence: f64) -> Self {
        Self {
            locator: Locator::Css(css.into()),
            confidence,
        }
    }

    pub fn chain(steps: Vec<PathStep>, confidence: f64) -> Self {
        Self {
            locator: Locator::Chain(steps),
            confidence,
        }
    }
}

/// Extraction knowledge for one dealer site.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SiteProfile {
    pub domain: String,
    #[serde(default)]
    pub supported_domains: Vec<String>,
    /// Most specific first.
    #[serde(default)]
    pub search_paths: Vec<SearchPath>,
    #[serde(default)]
    pub last_verified: Option<DateTime<Utc>>,
    /// Selectors for subtrees dropped from the normalized text.
    #[serde(default)]
    pub clean: Vec<String>,
    /// Case-insensitive patterns marking marketing paragraphs to remove.
    #[serde(default)]
    pub strip_phrases: Vec<String>,
}

impl SiteProfile {
    pub fn new(domain: impl Into<String>, search_paths: Vec<SearchPath>) -> Self {
        Self {
            domain: domain.into(),
            search_paths,
            ..Default::default()
        }
    }

    /// Compile `strip_phrases`, skipping invalid patterns.
    pub fn strip_patterns(&self) -> Vec<Regex> {
        self.strip_phrases
            .iter()
            .filter_map(|pattern| {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(re) => Some(re),
                    Err(err) => {
                        warn!(domain = %self.domain, pattern = %pattern, error = %err, "skipping invalid strip phrase");
                        None
                    }
                }
            })
            .collect()
    }

    fn normalized(mut self) -> Self {
        self.domain = normalize_domain(&self.domain);
        self.supported_domains = self
            .supported_domains
            .iter()
            .map(|d| normalize_domain(d))
            .filter(|d| !d.is_empty())
            .collect();
        for path in &mut self.search_paths {
            path.confidence = if path.confidence.is_finite() {
                path.confidence.clamp(0.0, 1.0)
            } else {
                0.0
            };
        }
        self
    }
}

/// How the age of a profile's last verification affects its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessPolicy {
    pub max_age_days: i64,
    pub stale_factor: f64,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            max_age_days: 180,
            stale_factor: 0.8,
        }
    }
}

impl FreshnessPolicy {
    /// 1.0 when verified within the threshold, the stale factor otherwise.
    pub fn factor(&self, last_verified: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
        match last_verified {
            Some(at) if now - at <= Duration::days(self.max_age_days) => 1.0,
            _ => self.stale_factor,
        }
    }
}

/// Canonical form of a domain or URL used as a registry key.
///
/// Strips scheme, credentials, `www.`, path, port and trailing dots, lower-cased.
pub fn normalize_domain(input: &str) -> String {
    let mut s = input.trim();
    if let Some(idx) = s.find("://") {
        s = &s[idx + 3..];
    }
    if let Some(idx) = s.find(|c: char| c == '/' || c == '?' || c == '#') {
        s = &s[..idx];
    }
    if let Some(idx) = s.rfind('@') {
        s = &s[idx + 1..];
    }
    if let Some(idx) = s.find(':') {
        s = &s[..idx];
    }
    let host = s.trim_end_matches('.').to_ascii_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// Registry for looking up site profiles by domain.
#[derive(Debug, Default, Clone)]
pub struct ProfileRegistry {
    map: HashMap<String, Arc<SiteProfile>>,
}

impl ProfileRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a profile under its primary and supported domains, replacing earlier entries.
    ///
    /// A profile already registered for the same primary domain is dropped
    /// entirely, aliases included.
    pub fn register(&mut self, profile: SiteProfile) {
        let profile = Arc::new(profile.normalized());
        if let Some(previous) = self.map.get(&profile.domain).cloned() {
            if previous.domain == profile.domain {
                self.map.retain(|_, existing| !Arc::ptr_eq(existing, &previous));
            }
        }
        if !profile.domain.is_empty() {
            self.map.insert(profile.domain.clone(), Arc::clone(&profile));
        }
        for domain in &profile.supported_domains {
            self.map.insert(domain.clone(), Arc::clone(&profile));
        }
    }

    /// Looks up the profile for a domain or URL, falling back to parent domains.
    pub fn lookup(&self, domain: &str) -> Option<Arc<SiteProfile>> {
        let host = normalize_domain(domain);
        if host.is_empty() {
            return None;
        }
        let mut candidate: &str = &host;
        loop {
            if let Some(profile) = self.map.get(candidate) {
                return Some(Arc::clone(profile));
            }
            match candidate.split_once('.') {
                // stop before a bare TLD
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => return None,
            }
        }
    }

    /// Number of registered domain mappings.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Registered domain keys in sorted order.
    pub fn domains(&self) -> Vec<&str> {
        let mut domains: Vec<&str> = self.map.keys().map(String::as_str).collect();
        domains.sort_unstable();
        domains
    }
}

/// Shared handle to a registry that is replaced wholesale on update.
#[derive(Debug, Clone, Default)]
pub struct RegistryHandle {
    current: Arc<RwLock<Arc<ProfileRegistry>>>,
}

impl RegistryHandle {
    pub fn new(registry: ProfileRegistry) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// The registry as of now; unaffected by later publishes.
    pub fn snapshot(&self) -> Arc<ProfileRegistry> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&*guard)
    }

    /// Install a new registry containing `profile` alongside the existing ones.
    pub fn publish(&self, profile: SiteProfile) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = (**guard).clone();
        next.register(profile);
        *guard = Arc::new(next);
    }

    /// Replace the whole registry.
    pub fn replace(&self, registry: ProfileRegistry) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::new(registry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn profile(domain: &str) -> SiteProfile {
        SiteProfile::new(
            domain,
            vec![SearchPath::css("div.description", 0.9)],
        )
    }

    #[test]
    fn normalize_domain_strips_noise() {
        assert_eq!(normalize_domain("https://www.SFToyota.com/inventory/1"), "sftoyota.com");
        assert_eq!(normalize_domain("http://user:pw@dealer.com:8080/x?y"), "dealer.com");
        assert_eq!(normalize_domain("dealer.com."), "dealer.com");
        assert_eq!(normalize_domain("WWW.Dealer.com/"), "dealer.com");
        assert_eq!(normalize_domain("  "), "");
    }

    #[test]
    fn lookup_is_case_insensitive_and_ignores_www() {
        let mut registry = ProfileRegistry::new();
        registry.register(profile("sftoyota.com"));
        assert!(registry.lookup("https://www.sftoyota.com/vdp/9").is_some());
        assert!(registry.lookup("SFTOYOTA.COM").is_some());
        assert!(registry.lookup("othertoyota.com").is_none());
    }

    #[test]
    fn lookup_falls_back_to_parent_domain() {
        let mut registry = ProfileRegistry::new();
        registry.register(profile("dealer.com"));
        let found = registry.lookup("shop.used.dealer.com").unwrap();
        assert_eq!(found.domain, "dealer.com");
        assert!(registry.lookup("com").is_none());
    }

    #[test]
    fn supported_domains_share_profile() {
        let mut registry = ProfileRegistry::new();
        let mut p = profile("greghublerford.com");
        p.supported_domains = vec!["https://www.greghublerchevy.com".to_string()];
        registry.register(p);
        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.lookup("greghublerchevy.com").unwrap().domain,
            "greghublerford.com"
        );
    }

    #[test]
    fn confidence_is_clamped_on_register() {
        let mut registry = ProfileRegistry::new();
        registry.register(SiteProfile::new(
            "dealer.com",
            vec![SearchPath::css("div", 1.7), SearchPath::css("p", f64::NAN)],
        ));
        let p = registry.lookup("dealer.com").unwrap();
        assert_eq!(p.search_paths[0].confidence, 1.0);
        assert_eq!(p.search_paths[1].confidence, 0.0);
    }

    #[test]
    fn chain_and_css_locators_deserialize_untagged() {
        let json = r#"[
            {"locator": "div#notes", "confidence": 0.8},
            {"locator": [{"tag": "div", "id": "vehicle-description"}, {"tag": "div", "class_": "description"}]}
        ]"#;
        let paths: Vec<SearchPath> = serde_json::from_str(json).unwrap();
        assert_eq!(paths[0], SearchPath::css("div#notes", 0.8));
        assert_eq!(
            paths[1],
            SearchPath::chain(
                vec![
                    PathStep::new("div").with_id("vehicle-description"),
                    PathStep::new("div").with_class("description"),
                ],
                0.9
            )
        );
    }

    #[test]
    fn chain_describe_renders_css_like_descriptor() {
        let locator = Locator::Chain(vec![
            PathStep::new("div").with_class("dealer-comments dealer-comments--square"),
            PathStep::new("div")
                .with_id("dealer-comments")
                .with_class("dealer-comments__text"),
        ]);
        assert_eq!(
            locator.describe(),
            "div.dealer-comments.dealer-comments--square div#dealer-comments.dealer-comments__text"
        );
    }

    #[test]
    fn css_ident_escapes_leading_digit() {
        assert_eq!(PathStep::new("div").with_id("1abc").to_css(), "div#\\31 abc");
    }

    #[test]
    fn freshness_factor() {
        let policy = FreshnessPolicy::default();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let recent = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let old = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(policy.factor(Some(recent), now), 1.0);
        assert_eq!(policy.factor(Some(old), now), 0.8);
        assert_eq!(policy.factor(None, now), 0.8);
    }

    #[test]
    fn strip_patterns_skip_invalid() {
        let mut p = profile("dealer.com");
        p.strip_phrases = vec!["promise:".to_string(), "(unclosed".to_string()];
        let patterns = p.strip_patterns();
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].is_match("PROMISE: yes"));
    }

    #[test]
    fn republished_profile_drops_old_aliases() {
        let handle = RegistryHandle::new(ProfileRegistry::new());
        let mut first = profile("greghublerford.com");
        first.supported_domains = vec!["greghublerchevy.com".to_string()];
        handle.publish(first);

        let mut second = profile("greghublerford.com");
        second.supported_domains = vec!["greghublerkia.com".to_string()];
        second.search_paths = vec![SearchPath::css("div#notes", 0.7)];
        handle.publish(second);

        let registry = handle.snapshot();
        assert_eq!(registry.domains(), vec!["greghublerford.com", "greghublerkia.com"]);
        assert!(registry.lookup("greghublerchevy.com").is_none());
        let current = registry.lookup("greghublerkia.com").unwrap();
        assert_eq!(current.search_paths[0].locator, Locator::Css("div#notes".to_string()));
    }

    #[test]
    fn publish_swaps_snapshot_without_touching_old_one() {
        let handle = RegistryHandle::new(ProfileRegistry::new());
        let before = handle.snapshot();
        handle.publish(profile("newdealer.com"));
        let after = handle.snapshot();
        assert!(before.lookup("newdealer.com").is_none());
        assert!(after.lookup("newdealer.com").is_some());
    }

    #[test]
    fn publish_replaces_existing_profile() {
        let handle = RegistryHandle::default();
        handle.publish(profile("dealer.com"));
        handle.publish(SiteProfile::new(
            "dealer.com",
            vec![SearchPath::css("section.notes", 0.7)],
        ));
        let p = handle.snapshot().lookup("dealer.com").unwrap();
        assert_eq!(p.search_paths, vec![SearchPath::css("section.notes", 0.7)]);
    }
}
