// ABOUTME: Applies profile search paths (CSS selectors or nested tag chains) to a parsed DOM.
// ABOUTME: Reports matched nodes in document order and whether the full path matched.

//! Search path application.
//!
//! Key behaviors:
//! - CSS locators select every matching element in document pre-order.
//! - Chain locators match step 0 anywhere, then each later step among the
//!   descendants of the previous step's matches.
//! - A chain that stops early still reports the deepest non-empty step as a
//!   partial match.

use std::collections::HashSet;

use ego_tree::NodeId;
use scraper::ElementRef;
use tracing::warn;

use crate::dom::normalize::visible_text;
use crate::dom::Dom;
use crate::extractors::compiled::get_or_compile;
use crate::extractors::profile::{Locator, PathStep};

/// The outcome of applying one locator.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathMatch {
    /// Matched nodes of the deepest matched step, in document order.
    pub nodes: Vec<NodeId>,
    pub matched_steps: usize,
    pub total_steps: usize,
}

impl PathMatch {
    /// Every step matched and produced at least one node.
    pub fn is_complete(&self) -> bool {
        !self.nodes.is_empty() && self.matched_steps == self.total_steps
    }

    /// Some but not all steps matched.
    pub fn is_partial(&self) -> bool {
        !self.nodes.is_empty() && self.matched_steps < self.total_steps
    }
}

/// Does `element` satisfy one chain step?
pub fn step_matches(element: ElementRef, step: &PathStep) -> bool {
    let el = element.value();
    if !step.tag.is_empty() && step.tag != "*" && !el.name().eq_ignore_ascii_case(&step.tag) {
        return false;
    }
    if let Some(id) = &step.id {
        if el.id() != Some(id.as_str()) {
            return false;
        }
    }
    let classes = step.classes();
    if !classes.is_empty() && !classes.iter().all(|wanted| el.classes().any(|c| c == *wanted)) {
        return false;
    }
    if !step
        .attrs
        .iter()
        .all(|(name, value)| el.attr(name) == Some(value.as_str()))
    {
        return false;
    }
    if let Some(contents) = &step.contents {
        let needle = contents.to_lowercase();
        if !visible_text(element).to_lowercase().contains(&needle) {
            return false;
        }
    }
    true
}

fn apply_css(dom: &Dom, css: &str) -> PathMatch {
    let Some(selector) = get_or_compile(css) else {
        warn!(selector = %css, "invalid css locator");
        return PathMatch {
            total_steps: 1,
            ..Default::default()
        };
    };
    let nodes: Vec<NodeId> = dom.html().select(&selector).map(|el| el.id()).collect();
    PathMatch {
        matched_steps: usize::from(!nodes.is_empty()),
        nodes,
        total_steps: 1,
    }
}

fn apply_chain(dom: &Dom, steps: &[PathStep]) -> PathMatch {
    let mut result = PathMatch {
        total_steps: steps.len(),
        ..Default::default()
    };
    let Some((first, rest)) = steps.split_first() else {
        return result;
    };

    let mut current: Vec<NodeId> = dom
        .elements()
        .filter(|el| step_matches(*el, first))
        .map(|el| el.id())
        .collect();
    if current.is_empty() {
        return result;
    }
    result.matched_steps = 1;

    for step in rest {
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for id in &current {
            let Some(parent) = dom.get(*id) else {
                continue;
            };
            for el in parent.descendants().skip(1).filter_map(ElementRef::wrap) {
                if step_matches(el, step) && seen.insert(el.id()) {
                    next.push(el.id());
                }
            }
        }
        if next.is_empty() {
            break;
        }
        next.sort_by_key(|id| dom.position(*id));
        current = next;
        result.matched_steps += 1;
    }

    result.nodes = current;
    result
}

/// Apply a locator to the document.
pub fn apply_locator(dom: &Dom, locator: &Locator) -> PathMatch {
    match locator {
        Locator::Css(css) => apply_css(dom, css),
        Locator::Chain(steps) => apply_chain(dom, steps),
    }
}

/// Nodes matched by any of the `clean` selectors; invalid selectors are ignored.
pub fn excluded_nodes(dom: &Dom, clean: &[String]) -> HashSet<NodeId> {
    clean
        .iter()
        .filter_map(|css| get_or_compile(css))
        .flat_map(|selector| {
            dom.html()
                .select(&selector)
                .map(|el| el.id())
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE_HTML: &str = r#"
        <!DOCTYPE html>
        <html>
        <body>
            <div id="vehicle-description">
                <h2>Vehicle Description</h2>
                <div class="description">Clean one owner truck.</div>
                <div class="description extra">Second block.</div>
            </div>
            <div class="dealer-comments dealer-comments--square">
                <div id="dealer-comments" class="dealer-comments__text">Dealer says hi.</div>
            </div>
            <section data-role="notes"><p>Ask about financing.</p></section>
        </body>
        </html>
    "#;

    fn ids(dom: &Dom, m: &PathMatch) -> Vec<String> {
        m.nodes
            .iter()
            .map(|id| {
                let el = dom.get(*id).unwrap();
                format!(
                    "{}{}",
                    el.value().name(),
                    el.value().attr("class").map(|c| format!(".{}", c)).unwrap_or_default()
                )
            })
            .collect()
    }

    #[test]
    fn chain_returns_all_final_step_matches_in_order() {
        let dom = Dom::parse(SAMPLE_HTML).unwrap();
        let locator = Locator::Chain(vec![
            PathStep::new("div").with_id("vehicle-description"),
            PathStep::new("div").with_class("description"),
        ]);
        let m = apply_locator(&dom, &locator);
        assert!(m.is_complete());
        assert_eq!(
            ids(&dom, &m),
            vec!["div.description", "div.description extra"]
        );
    }

    #[test]
    fn multi_class_step_requires_every_class() {
        let dom = Dom::parse(SAMPLE_HTML).unwrap();
        let locator = Locator::Chain(vec![
            PathStep::new("div").with_class("dealer-comments dealer-comments--square"),
            PathStep::new("div")
                .with_id("dealer-comments")
                .with_class("dealer-comments__text"),
        ]);
        let m = apply_locator(&dom, &locator);
        assert!(m.is_complete());
        assert_eq!(m.nodes.len(), 1);

        let strict = Locator::Chain(vec![PathStep::new("div").with_class("description,missing")]);
        assert!(apply_locator(&dom, &strict).nodes.is_empty());
    }

    #[test]
    fn chain_stopping_early_is_partial() {
        let dom = Dom::parse(SAMPLE_HTML).unwrap();
        let locator = Locator::Chain(vec![
            PathStep::new("div").with_id("vehicle-description"),
            PathStep::new("div").with_class("nonexistent"),
        ]);
        let m = apply_locator(&dom, &locator);
        assert!(m.is_partial());
        assert!(!m.is_complete());
        assert_eq!(m.matched_steps, 1);
        assert_eq!(dom.get(m.nodes[0]).unwrap().value().id(), Some("vehicle-description"));
    }

    #[test]
    fn chain_with_no_first_match_is_empty() {
        let dom = Dom::parse(SAMPLE_HTML).unwrap();
        let m = apply_locator(&dom, &Locator::Chain(vec![PathStep::new("article")]));
        assert!(m.nodes.is_empty());
        assert_eq!(m.matched_steps, 0);
        assert!(!m.is_partial());
    }

    #[test]
    fn contents_and_attrs_filter_steps() {
        let dom = Dom::parse(SAMPLE_HTML).unwrap();
        let mut step = PathStep::new("section").with_contents("FINANCING");
        step.attrs.insert("data-role".to_string(), "notes".to_string());
        let m = apply_locator(&dom, &Locator::Chain(vec![step]));
        assert!(m.is_complete());

        let miss = PathStep::new("section").with_contents("warranty");
        assert!(apply_locator(&dom, &Locator::Chain(vec![miss])).nodes.is_empty());
    }

    #[test]
    fn css_locator_matches_in_document_order() {
        let dom = Dom::parse(SAMPLE_HTML).unwrap();
        let m = apply_locator(&dom, &Locator::Css("#vehicle-description .description".to_string()));
        assert!(m.is_complete());
        assert_eq!(m.nodes.len(), 2);
        assert!(dom.position(m.nodes[0]) < dom.position(m.nodes[1]));
    }

    #[test]
    fn invalid_css_locator_matches_nothing() {
        let dom = Dom::parse(SAMPLE_HTML).unwrap();
        let m = apply_locator(&dom, &Locator::Css("[[[invalid".to_string()));
        assert!(m.nodes.is_empty());
        assert!(!m.is_complete());
    }

    #[test]
    fn excluded_nodes_collects_clean_matches() {
        let dom = Dom::parse(SAMPLE_HTML).unwrap();
        let excluded = excluded_nodes(&dom, &["h2".to_string(), "[[[bad".to_string()]);
        assert_eq!(excluded.len(), 1);
    }
}
