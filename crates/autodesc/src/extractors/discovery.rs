// ABOUTME: Path discovery for dealer sites without a profile.
// ABOUTME: Scores every text-bearing element and proposes reusable search paths for the best ones.

use std::collections::HashSet;

use ego_tree::NodeId;
use scraper::ElementRef;
use serde::Serialize;
use tracing::debug;

use crate::dom::normalize::{is_skipped_tag, normalize, visible_len};
use crate::dom::scoring::{RuleContribution, Scorer};
use crate::dom::Dom;
use crate::extractors::profile::{Locator, PathStep, SearchPath};
use crate::extractors::select::apply_locator;

/// Default number of candidates kept.
pub const DEFAULT_TOP_K: usize = 5;
/// Default minimal text length for a node to be scored.
pub const DEFAULT_MIN_TEXT_LEN: usize = 15;

const PREVIEW_CHARS: usize = 160;

const STRUCTURAL_TAGS: &[&str] = &["html", "head", "body"];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateSource {
    /// Complete match of the profile's search path at `path_index`.
    Profile { path_index: usize },
    /// Prefix match of a profile chain, scored heuristically with a bonus.
    PartialProfile { path_index: usize },
    /// Exploratory scoring.
    Discovery,
}

/// A node considered for the description.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub node: NodeId,
    pub position: usize,
    pub score: f64,
    pub rationale: Vec<RuleContribution>,
    pub source: CandidateSource,
}

/// Order by descending score, then earlier document position.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.position.cmp(&b.position))
    });
}

fn is_scorable(element: ElementRef) -> bool {
    let tag = element.value().name();
    if STRUCTURAL_TAGS.contains(&tag) || VOID_TAGS.contains(&tag) || is_skipped_tag(tag) {
        return false;
    }
    // nothing under <head>, <noscript> and friends is page text
    !element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|a| is_skipped_tag(a.value().name()))
}

/// Exploratory scorer over the whole document.
#[derive(Debug, Clone)]
pub struct Discovery {
    scorer: Scorer,
    top_k: usize,
    min_text_len: usize,
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new(Scorer::default(), DEFAULT_TOP_K, DEFAULT_MIN_TEXT_LEN)
    }
}

impl Discovery {
    pub fn new(scorer: Scorer, top_k: usize, min_text_len: usize) -> Self {
        Self {
            scorer,
            top_k,
            min_text_len,
        }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Score every eligible element, sorted, without truncation.
    pub fn score_all(&self, dom: &Dom) -> Vec<Candidate> {
        let mut candidates: Vec<Candidate> = dom
            .elements()
            .filter(|el| is_scorable(*el))
            .filter(|el| visible_len(*el) > self.min_text_len)
            .map(|el| {
                let scored = self.scorer.score(el);
                Candidate {
                    node: el.id(),
                    position: dom.position(el.id()),
                    score: scored.score,
                    rationale: scored.rationale,
                    source: CandidateSource::Discovery,
                }
            })
            .collect();
        sort_candidates(&mut candidates);
        candidates
    }

    /// The top-K candidates of the document.
    pub fn discover(&self, dom: &Dom) -> Vec<Candidate> {
        let mut candidates = self.score_all(dom);
        debug!(scored = candidates.len(), top_k = self.top_k, "discovery scored nodes");
        candidates.truncate(self.top_k);
        candidates
    }
}

/// A search path derived from a discovered candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProposedPath {
    pub search_path: SearchPath,
    pub css: String,
    /// Number of nodes the proposed path matches in this page.
    pub matches: usize,
    /// The candidate itself is among the matches.
    pub matches_candidate: bool,
    pub preview: String,
    pub score: f64,
    pub rationale: Vec<RuleContribution>,
}

fn step_for(element: ElementRef, with_id: bool) -> PathStep {
    let el = element.value();
    let mut step = PathStep::new(el.name());
    if with_id {
        step.id = el.id().map(str::to_string);
    }
    let classes: Vec<&str> = el.classes().collect();
    if !classes.is_empty() {
        step.class = Some(classes.join(" "));
    }
    step
}

/// A chain anchored at the nearest id-bearing ancestor, at most three steps.
pub fn derive_search_path(dom: &Dom, node: NodeId, confidence: f64) -> Option<SearchPath> {
    let element = dom.get(node)?;
    if element.value().id().is_some() {
        return Some(SearchPath::chain(vec![step_for(element, true)], confidence));
    }

    let ancestors: Vec<ElementRef> = element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .filter(|el| !STRUCTURAL_TAGS.contains(&el.value().name()))
        .collect();

    let mut steps = Vec::with_capacity(3);
    let anchor = ancestors.iter().position(|el| el.value().id().is_some());
    if let Some(index) = anchor {
        steps.push(step_for(ancestors[index], true));
    }

    let node_step = step_for(element, false);
    if node_step.class.is_none() {
        // bare tags need a classed parent to stay specific
        if let Some(parent) = ancestors.first() {
            let parent_is_anchor = anchor == Some(0);
            if !parent_is_anchor && parent.value().classes().next().is_some() {
                steps.push(step_for(*parent, false));
            }
        }
    }
    steps.push(node_step);
    Some(SearchPath::chain(steps, confidence))
}

/// Turn candidates into search path proposals for a new profile.
pub fn propose(dom: &Dom, candidates: &[Candidate]) -> Vec<ProposedPath> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .filter_map(|candidate| {
            let search_path = derive_search_path(dom, candidate.node, candidate.score)?;
            let css = search_path.locator.describe();
            if !seen.insert(css.clone()) {
                return None;
            }
            let matched = apply_locator(dom, &search_path.locator);
            let preview = dom
                .get(candidate.node)
                .and_then(|el| normalize(el, &HashSet::new()))
                .map(|text| preview_of(&text))
                .unwrap_or_default();
            Some(ProposedPath {
                matches: matched.nodes.len(),
                matches_candidate: matched.nodes.contains(&candidate.node),
                search_path,
                css,
                preview,
                score: candidate.score,
                rationale: candidate.rationale.clone(),
            })
        })
        .collect()
}

fn preview_of(text: &str) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let mut cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    cut.push('…');
    cut
}
