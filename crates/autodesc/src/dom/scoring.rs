// ABOUTME: Heuristic scoring of DOM nodes as dealer-authored vehicle descriptions.
// ABOUTME: An ordered list of named rules, each bounded to [-1, 1], weighted and summed deterministically.

use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Node};
use serde::{Deserialize, Serialize};

use super::normalize::{is_block_tag, is_skipped_tag, visible_len, visible_text};
use super::{class_and_id, depth, is_heading_tag};

/// Below this many characters a node is never prose.
pub const MIN_PROSE_CHARS: usize = 15;
/// Lower edge of the plausible description length.
pub const PLAUSIBLE_MIN_CHARS: usize = 40;
/// Upper edge of the plausible description length.
pub const PLAUSIBLE_MAX_CHARS: usize = 3000;

// Class/id fragments that mark description containers
static POSITIVE_FRAGMENTS: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build([
            "description",
            "descr",
            "comment",
            "dealernote",
            "dealer-note",
            "dealer_note",
            "notes",
            "remarks",
            "overview",
            "details",
            "about-vehicle",
            "seller",
        ])
        .unwrap()
});

// Class/id fragments that mark page chrome, matched anywhere
static NEGATIVE_FRAGMENTS: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build([
            "disclaimer",
            "footer",
            "copyright",
            "breadcrumb",
            "newsletter",
            "cookie",
            "navbar",
            "navigation",
            "advert",
            "sidebar",
            "calculator",
        ])
        .unwrap()
});

// Short chrome words, matched as whole class/id tokens only
const NEGATIVE_TOKENS: &[&str] = &[
    "nav", "menu", "ad", "ads", "legal", "modal", "promo", "share", "social", "header", "banner",
    "cta", "pricing", "payment", "finance", "specs", "spec",
];

const NOISE_TAGS: &[&str] = &["footer", "nav", "header", "aside", "form", "dialog"];
const INTERACTIVE_TAGS: &[&str] = &["a", "button", "input", "select", "textarea"];

static HEADING_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(description|dealer\s+(notes|comments)|comments|overview|remarks|about\s+this\s+(vehicle|car|truck|suv)|sellers?'?\s+notes|vehicle\s+details|notes)\b").unwrap()
});

/// How a node's own class/id reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Descriptor {
    Positive,
    Negative,
    Neutral,
}

/// Classify a lower-cased class/id string.
pub fn classify_descriptor(class_and_id: &str) -> Descriptor {
    let negative = NEGATIVE_FRAGMENTS.is_match(class_and_id)
        || class_and_id
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|token| NEGATIVE_TOKENS.contains(&token));
    if negative {
        return Descriptor::Negative;
    }
    if POSITIVE_FRAGMENTS.is_match(class_and_id) {
        return Descriptor::Positive;
    }
    Descriptor::Neutral
}

/// Is this element a noise container (by tag or by class/id)?
fn is_noise_element(element: ElementRef) -> bool {
    let tag = element.value().name();
    NOISE_TAGS.contains(&tag)
        || tag == "script"
        || tag == "iframe"
        || classify_descriptor(&class_and_id(element)) == Descriptor::Negative
}

fn is_noise_container(element: ElementRef) -> bool {
    let tag = element.value().name();
    NOISE_TAGS.contains(&tag) || classify_descriptor(&class_and_id(element)) == Descriptor::Negative
}

/// Count sentence-ending punctuation followed by whitespace, a closing quote or the end.
pub fn count_sentence_ends(text: &str) -> usize {
    let chars: Vec<char> = text.chars().collect();
    let mut count = 0;
    for (i, c) in chars.iter().enumerate() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        match chars.get(i + 1) {
            None => count += 1,
            Some(next) if next.is_whitespace() => count += 1,
            Some('"' | '\'' | ')' | '\u{201D}' | '\u{2019}') => count += 1,
            _ => {}
        }
    }
    count
}

fn heading_hints(element: ElementRef) -> bool {
    let reads_as_hint = |el: ElementRef| {
        is_heading_tag(el.value().name()) && HEADING_HINT_RE.is_match(&visible_text(el))
    };

    let previous = element
        .prev_siblings()
        .find_map(ElementRef::wrap)
        .map(reads_as_hint)
        .unwrap_or(false);
    if previous {
        return true;
    }

    element
        .children()
        .find_map(ElementRef::wrap)
        .map(reads_as_hint)
        .unwrap_or(false)
}

/// Share of the node's text held by its own text, inline and paragraph children.
fn text_concentration(element: ElementRef) -> f64 {
    let mut own = 0usize;
    let mut nested = 0usize;
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                own += text.split_whitespace().map(|w| w.chars().count() + 1).sum::<usize>();
            }
            Node::Element(el) => {
                let name = el.name();
                if is_skipped_tag(name) {
                    continue;
                }
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                let len = visible_len(child_el);
                if is_block_tag(name) && name != "p" {
                    nested += len;
                } else {
                    own += len;
                }
            }
            _ => {}
        }
    }
    let total = own + nested;
    if total == 0 {
        0.0
    } else {
        own as f64 / total as f64
    }
}

/// Structural and textual measurements of one element.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeFeatures {
    pub tag: String,
    pub text_len: usize,
    pub sentence_ends: usize,
    pub interactive_count: usize,
    pub link_text_len: usize,
    pub depth: usize,
    pub descriptor: Descriptor,
    pub heading_hint: bool,
    pub inside_noise: bool,
    pub noise_descendants: usize,
    pub adjacent_noise: bool,
    pub concentration: f64,
}

impl NodeFeatures {
    /// Measure an element.
    pub fn extract(element: ElementRef) -> Self {
        let text = visible_text(element);
        let mut interactive_count = 0;
        let mut link_text_len = 0;
        let mut noise_descendants = 0;
        for node in element.descendants().skip(1) {
            let Some(el) = ElementRef::wrap(node) else {
                continue;
            };
            let name = el.value().name();
            if INTERACTIVE_TAGS.contains(&name) {
                interactive_count += 1;
                if name == "a" {
                    link_text_len += visible_len(el);
                }
            }
            if is_noise_element(el) {
                noise_descendants += 1;
            }
        }

        let inside_noise = element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(is_noise_container);

        let adjacent_noise = element
            .prev_siblings()
            .find_map(ElementRef::wrap)
            .into_iter()
            .chain(element.next_siblings().find_map(ElementRef::wrap))
            .any(is_noise_container);

        Self {
            tag: element.value().name().to_string(),
            text_len: text.chars().count(),
            sentence_ends: count_sentence_ends(&text),
            interactive_count,
            link_text_len,
            depth: depth(element),
            descriptor: classify_descriptor(&class_and_id(element)),
            heading_hint: heading_hints(element),
            inside_noise,
            noise_descendants,
            adjacent_noise,
            concentration: text_concentration(element),
        }
    }

    /// Share of the text that sits inside links.
    pub fn link_density(&self) -> f64 {
        if self.text_len == 0 {
            0.0
        } else {
            (self.link_text_len as f64 / self.text_len as f64).min(1.0)
        }
    }
}

/// The named scoring rules, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    TextLength,
    SentenceDensity,
    Interactivity,
    DescriptorTokens,
    HeadingHint,
    Depth,
    NoiseProximity,
    TextConcentration,
}

impl Rule {
    pub const ALL: [Rule; 8] = [
        Rule::TextLength,
        Rule::SentenceDensity,
        Rule::Interactivity,
        Rule::DescriptorTokens,
        Rule::HeadingHint,
        Rule::Depth,
        Rule::NoiseProximity,
        Rule::TextConcentration,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Rule::TextLength => "text_length",
            Rule::SentenceDensity => "sentence_density",
            Rule::Interactivity => "interactivity",
            Rule::DescriptorTokens => "descriptor_tokens",
            Rule::HeadingHint => "heading_hint",
            Rule::Depth => "depth",
            Rule::NoiseProximity => "noise_proximity",
            Rule::TextConcentration => "text_concentration",
        }
    }

    /// Evaluate the rule, clamped to `[-1, 1]`.
    pub fn evaluate(self, f: &NodeFeatures) -> f64 {
        let value = match self {
            Rule::TextLength => length_value(f.text_len),
            Rule::SentenceDensity => {
                if f.text_len == 0 || f.sentence_ends == 0 {
                    -1.0
                } else {
                    // prose runs about one sentence end per 100 chars
                    let per_100 = f.sentence_ends as f64 * 100.0 / f.text_len as f64;
                    -1.0 + 4.0 * per_100
                }
            }
            Rule::Interactivity => {
                let pressure = (f.link_density() * 2.0).max(f.interactive_count as f64 / 8.0);
                1.0 - 2.0 * pressure.min(1.0)
            }
            Rule::DescriptorTokens => match f.descriptor {
                Descriptor::Positive => 1.0,
                Descriptor::Negative => -1.0,
                Descriptor::Neutral => 0.0,
            },
            Rule::HeadingHint => {
                if f.heading_hint {
                    1.0
                } else {
                    0.0
                }
            }
            Rule::Depth => depth_value(f.depth),
            Rule::NoiseProximity => {
                if f.inside_noise {
                    -1.0
                } else if f.noise_descendants > 0 {
                    -0.5 * (f.noise_descendants as f64).min(2.0) / 2.0 - 0.25
                } else if f.adjacent_noise {
                    0.0
                } else {
                    0.5
                }
            }
            Rule::TextConcentration => 2.0 * f.concentration - 1.0,
        };
        value.clamp(-1.0, 1.0)
    }
}

fn length_value(len: usize) -> f64 {
    if len < MIN_PROSE_CHARS {
        -1.0
    } else if len < PLAUSIBLE_MIN_CHARS {
        (len - MIN_PROSE_CHARS) as f64 / (PLAUSIBLE_MIN_CHARS - MIN_PROSE_CHARS) as f64
    } else if len <= PLAUSIBLE_MAX_CHARS {
        1.0
    } else {
        let over = (len - PLAUSIBLE_MAX_CHARS) as f64 / PLAUSIBLE_MAX_CHARS as f64;
        1.0 - 2.0 * over
    }
}

fn depth_value(depth: usize) -> f64 {
    match depth {
        0 | 1 => -1.0,
        2 => 0.0,
        3 => 0.5,
        4..=18 => 1.0,
        d => 1.0 - (d - 18) as f64 / 6.0,
    }
}

/// Tunable weight per rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub text_length: f64,
    pub sentence_density: f64,
    pub interactivity: f64,
    pub descriptor_tokens: f64,
    pub heading_hint: f64,
    pub depth: f64,
    pub noise_proximity: f64,
    pub text_concentration: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            text_length: 1.0,
            sentence_density: 1.0,
            interactivity: 1.0,
            descriptor_tokens: 3.0,
            heading_hint: 1.0,
            depth: 0.5,
            noise_proximity: 1.5,
            text_concentration: 1.5,
        }
    }
}

impl ScoringWeights {
    pub fn weight(&self, rule: Rule) -> f64 {
        match rule {
            Rule::TextLength => self.text_length,
            Rule::SentenceDensity => self.sentence_density,
            Rule::Interactivity => self.interactivity,
            Rule::DescriptorTokens => self.descriptor_tokens,
            Rule::HeadingHint => self.heading_hint,
            Rule::Depth => self.depth,
            Rule::NoiseProximity => self.noise_proximity,
            Rule::TextConcentration => self.text_concentration,
        }
    }
}

/// One rule's share of a node's score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleContribution {
    pub rule: Rule,
    pub value: f64,
    pub weight: f64,
    pub contribution: f64,
}

/// A score in `[0, 1]` with its per-rule breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scored {
    pub score: f64,
    pub rationale: Vec<RuleContribution>,
}

/// Applies the rule list with a set of weights.
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    weights: ScoringWeights,
}

impl Scorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score measured features.
    pub fn score_features(&self, features: &NodeFeatures) -> Scored {
        let mut raw = 0.0;
        let mut total_weight = 0.0;
        let mut rationale = Vec::with_capacity(Rule::ALL.len());
        for rule in Rule::ALL {
            let weight = self.weights.weight(rule);
            let value = rule.evaluate(features);
            let contribution = weight * value;
            raw += contribution;
            total_weight += weight.abs();
            rationale.push(RuleContribution {
                rule,
                value,
                weight,
                contribution,
            });
        }
        let score = if total_weight == 0.0 {
            0.5
        } else {
            (0.5 + raw / (2.0 * total_weight)).clamp(0.0, 1.0)
        };
        Scored { score, rationale }
    }

    /// Measure and score an element.
    pub fn score(&self, element: ElementRef) -> Scored {
        self.score_features(&NodeFeatures::extract(element))
    }
}
