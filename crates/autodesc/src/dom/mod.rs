// ABOUTME: Read-only DOM model built from fetched VDP HTML.
// ABOUTME: Wraps scraper's document tree with pre-order positions, depth and malformed-input checks.

//! DOM model for the extraction pipeline.
//!
//! A [`Dom`] owns the parsed document for the duration of one run. Nodes are
//! addressed by ego-tree [`NodeId`] handles; parent links are non-owning and
//! the tree is never mutated after parsing.

pub mod normalize;
pub mod scoring;

use std::collections::HashMap;

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};

use crate::resource::decode_body;

/// Share of U+FFFD replacement characters above which decoded bytes are rejected.
pub const MAX_REPLACEMENT_RATIO: f64 = 0.10;

/// The input could not be treated as an HTML document.
#[derive(Debug, thiserror::Error)]
#[error("malformed input: {0}")]
pub struct MalformedInput(pub String);

/// A parsed, immutable HTML document.
pub struct Dom {
    html: Html,
    positions: HashMap<NodeId, usize>,
}

impl std::fmt::Debug for Dom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dom")
            .field("elements", &self.positions.len())
            .finish()
    }
}

impl Dom {
    /// Parse an HTML string.
    pub fn parse(html: &str) -> Result<Self, MalformedInput> {
        if html.contains('\0') {
            return Err(MalformedInput("document contains NUL bytes".to_string()));
        }
        Ok(Self::from_html(Html::parse_document(html)))
    }

    fn from_html(html: Html) -> Self {
        let positions = html
            .root_element()
            .descendants()
            .filter(|n| n.value().is_element())
            .enumerate()
            .map(|(i, n)| (n.id(), i))
            .collect();
        Self { html, positions }
    }

    /// The underlying scraper document.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// The `<html>` element.
    pub fn root(&self) -> ElementRef<'_> {
        self.html.root_element()
    }

    /// The `<body>` element, if the parser produced one.
    pub fn body(&self) -> Option<ElementRef<'_>> {
        let selector = Selector::parse("body").ok()?;
        self.html.select(&selector).next()
    }

    /// All elements in document pre-order, starting with `<html>`.
    pub fn elements(&self) -> impl Iterator<Item = ElementRef<'_>> {
        self.html.root_element().descendants().filter_map(ElementRef::wrap)
    }

    /// Resolve a node handle back to its element.
    pub fn get(&self, id: NodeId) -> Option<ElementRef<'_>> {
        self.html.tree.get(id).and_then(ElementRef::wrap)
    }

    /// Pre-order position of an element; unknown ids sort last.
    pub fn position(&self, id: NodeId) -> usize {
        self.positions.get(&id).copied().unwrap_or(usize::MAX)
    }

    /// True when the body holds no visible text.
    pub fn is_blank(&self) -> bool {
        self.body()
            .map(|b| normalize::visible_text(b).is_empty())
            .unwrap_or(true)
    }
}

/// Decode page bytes, rejecting text that is mostly replacement characters.
pub fn decode_checked(bytes: &[u8], content_type: Option<&str>) -> Result<String, MalformedInput> {
    let text = decode_body(bytes, content_type);
    let total = text.chars().count();
    if total > 0 {
        let replaced = text.chars().filter(|c| *c == '\u{FFFD}').count();
        if replaced as f64 / total as f64 > MAX_REPLACEMENT_RATIO {
            return Err(MalformedInput(format!(
                "{} of {} characters could not be decoded",
                replaced, total
            )));
        }
    }
    Ok(text)
}

/// Number of element ancestors of `element` (`<html>` has depth 0).
pub fn depth(element: ElementRef) -> usize {
    element
        .ancestors()
        .filter(|n| n.value().is_element())
        .count()
}

/// Lower-cased `class` and `id` attributes joined by a space.
pub fn class_and_id(element: ElementRef) -> String {
    let class = element.value().attr("class").unwrap_or("");
    let id = element.value().attr("id").unwrap_or("");
    format!("{} {}", class, id).trim().to_lowercase()
}

/// True for `h1`..`h6`.
pub fn is_heading_tag(tag: &str) -> bool {
    matches!(tag, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}
