// ABOUTME: Candidate locator combining profile search paths with exploratory scoring.
// ABOUTME: Profile matches win outright; otherwise discovery results are merged with partial path matches.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::dom::Dom;
use crate::extractors::discovery::{sort_candidates, Candidate, CandidateSource, Discovery};
use crate::extractors::profile::{FreshnessPolicy, SiteProfile};
use crate::extractors::select::apply_locator;

/// Default bonus added to heuristically scored partial profile matches.
pub const DEFAULT_PARTIAL_BONUS: f64 = 0.1;

/// Finds description candidates in a document.
#[derive(Debug, Clone)]
pub struct CandidateLocator {
    discovery: Discovery,
    freshness: FreshnessPolicy,
    partial_bonus: f64,
}

impl Default for CandidateLocator {
    fn default() -> Self {
        Self::new(Discovery::default(), FreshnessPolicy::default(), DEFAULT_PARTIAL_BONUS)
    }
}

impl CandidateLocator {
    pub fn new(discovery: Discovery, freshness: FreshnessPolicy, partial_bonus: f64) -> Self {
        Self {
            discovery,
            freshness,
            partial_bonus,
        }
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    /// Locate candidates, judging profile freshness against the current time.
    pub fn locate(&self, dom: &Dom, profile: Option<&SiteProfile>) -> Vec<Candidate> {
        self.locate_at(dom, profile, Utc::now())
    }

    /// Locate candidates, judging profile freshness against `now`.
    pub fn locate_at(
        &self,
        dom: &Dom,
        profile: Option<&SiteProfile>,
        now: DateTime<Utc>,
    ) -> Vec<Candidate> {
        let mut partials = Vec::new();

        if let Some(profile) = profile {
            let freshness = self.freshness.factor(profile.last_verified, now);
            for (path_index, path) in profile.search_paths.iter().enumerate() {
                let matched = apply_locator(dom, &path.locator);
                if matched.is_complete() {
                    let score = (path.confidence * freshness).clamp(0.0, 1.0);
                    debug!(
                        domain = %profile.domain,
                        path_index,
                        nodes = matched.nodes.len(),
                        score,
                        "profile path matched"
                    );
                    return matched
                        .nodes
                        .into_iter()
                        .map(|node| Candidate {
                            node,
                            position: dom.position(node),
                            score,
                            rationale: Vec::new(),
                            source: CandidateSource::Profile { path_index },
                        })
                        .collect();
                }
                if matched.is_partial() {
                    debug!(
                        domain = %profile.domain,
                        path_index,
                        matched_steps = matched.matched_steps,
                        total_steps = matched.total_steps,
                        "profile path matched partially"
                    );
                    partials.extend(matched.nodes.into_iter().map(|node| (path_index, node)));
                }
            }
        }

        let mut candidates = self.discovery.score_all(dom);
        for (path_index, node) in partials {
            let Some(element) = dom.get(node) else {
                continue;
            };
            let scored = self.discovery.scorer().score(element);
            let boosted = Candidate {
                node,
                position: dom.position(node),
                score: (scored.score + self.partial_bonus).min(1.0),
                rationale: scored.rationale,
                source: CandidateSource::PartialProfile { path_index },
            };
            match candidates.iter_mut().find(|c| c.node == node) {
                Some(existing) if existing.score < boosted.score => *existing = boosted,
                Some(_) => {}
                None => candidates.push(boosted),
            }
        }

        sort_candidates(&mut candidates);
        candidates.truncate(self.discovery.top_k());
        candidates
    }
}
