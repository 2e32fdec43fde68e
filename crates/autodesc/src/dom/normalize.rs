// ABOUTME: Text normalizer turning a selected DOM node into clean plain text.
// ABOUTME: Strips script/style subtrees, collapses whitespace and keeps paragraph breaks as newlines.

use std::collections::HashSet;

use ego_tree::iter::Edge;
use ego_tree::{NodeId, NodeRef};
use regex::Regex;
use scraper::{ElementRef, Node};

// Subtrees that never contribute visible text
const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "svg", "iframe", "head", "object", "embed",
    "canvas", "select",
];

// Elements that start and end a paragraph
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "caption", "dd", "details", "dialog", "div",
    "dl", "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4",
    "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "summary",
    "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// True for tags whose subtree is dropped from extracted text.
pub fn is_skipped_tag(tag: &str) -> bool {
    SKIPPED_TAGS.contains(&tag)
}

/// True for tags that delimit paragraphs.
pub fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

/// Collect the raw paragraphs under `node`, skipping excluded subtrees.
fn collect_paragraphs(node: NodeRef<Node>, excluded: &HashSet<NodeId>) -> Vec<String> {
    let mut paragraphs = vec![String::new()];
    let mut skipping: Option<NodeId> = None;

    for edge in node.traverse() {
        match edge {
            Edge::Open(n) => {
                if skipping.is_some() {
                    continue;
                }
                match n.value() {
                    Node::Text(text) => {
                        if let Some(current) = paragraphs.last_mut() {
                            current.push_str(&**text);
                        }
                    }
                    Node::Element(el) => {
                        let name = el.name();
                        if excluded.contains(&n.id()) || is_skipped_tag(name) {
                            skipping = Some(n.id());
                            continue;
                        }
                        if name == "br" || is_block_tag(name) {
                            paragraphs.push(String::new());
                        }
                    }
                    _ => {}
                }
            }
            Edge::Close(n) => {
                if let Some(id) = skipping {
                    if id == n.id() {
                        skipping = None;
                    }
                    continue;
                }
                if let Node::Element(el) = n.value() {
                    if is_block_tag(el.name()) {
                        paragraphs.push(String::new());
                    }
                }
            }
        }
    }

    paragraphs
}

fn collapse(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn join_paragraphs<I, S>(paragraphs: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    paragraphs
        .into_iter()
        .map(|p| collapse(p.as_ref()))
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Normalize already-extracted text: one paragraph per line, single spaces, no blank lines.
///
/// Idempotent: `normalize_text(&normalize_text(s)) == normalize_text(s)`.
pub fn normalize_text(text: &str) -> String {
    join_paragraphs(text.lines())
}

/// Normalize an element subtree to plain text.
///
/// Returns `None` when nothing visible remains after stripping.
pub fn normalize(element: ElementRef, excluded: &HashSet<NodeId>) -> Option<String> {
    let text = join_paragraphs(collect_paragraphs(*element, excluded));
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Visible text of a subtree collapsed to a single line.
pub fn visible_text(element: ElementRef) -> String {
    collapse(&collect_paragraphs(*element, &HashSet::new()).join(" "))
}

/// Character count of [`visible_text`].
pub fn visible_len(element: ElementRef) -> usize {
    visible_text(element).chars().count()
}

/// Remove marketing paragraphs starting at each pattern match.
///
/// A match removes text up to the end of its paragraph, or up to the first
/// period when the paragraph is the whole text.
pub fn strip_phrases(text: &str, patterns: &[Regex]) -> String {
    let mut out = text.to_string();
    for re in patterns {
        while let Some(m) = re.find(&out) {
            if m.as_str().trim().is_empty() {
                break;
            }
            let start = m.start();
            let rest = &out[start..];
            let (end, filler) = match rest.find('\n') {
                Some(i) => (start + i + 1, "\n"),
                None => match rest.find('.') {
                    Some(i) => (start + i + 1, " "),
                    None => (out.len(), " "),
                },
            };
            out.replace_range(start..end, filler);
        }
    }
    normalize_text(&out)
}
