//! Typed node model for editing surfaces.
//!
//! The document tree is HTML-shaped. Editors want typed records instead: a block image
//! with `{type, align, width}` rather than a `figure` with class names. This module maps
//! between the two.
//!
//! - [`NodeType`]/[`AnnotationType`]: closed sets of what an element can mean.
//! - [`registry`]: one behavior record per node type (tags, RDFa pattern, stored
//!   attributes, allowed children, to-data/to-dom projections).
//! - [`image`]: block image attribute extraction shared with the serializer.
//! - [`converter`]: whole documents to a flat linear model and back.

pub mod converter;
pub mod image;
pub mod registry;

pub use converter::{DomConverter, LinearItem};
pub use registry::{classify, NodeSpec, Registry};

use crate::wiki::token::Attributes;
use crate::wiki::tree::{Document, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Structural node types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Heading,
    List,
    ListItem,
    Comment,
    BlockImage,
    ImageCaption,
    Transclusion,
    Reference,
    /// Markup with no dedicated type, kept as-is.
    Alien,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(registry::spec(*self).name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LinkKind {
    WikiLink,
    ExtLink,
    ExtLinkNumbered,
    ExtLinkUrl,
}

impl LinkKind {
    pub fn rel(self) -> &'static str {
        match self {
            LinkKind::WikiLink => "mw:WikiLink",
            LinkKind::ExtLink => "mw:ExtLink",
            LinkKind::ExtLinkNumbered => "mw:ExtLink/Numbered",
            LinkKind::ExtLinkUrl => "mw:ExtLink/URL",
        }
    }

    pub fn from_rel(rel: &str) -> Option<Self> {
        rel.split_whitespace().find_map(|word| match word {
            "mw:WikiLink" => Some(LinkKind::WikiLink),
            "mw:ExtLink" => Some(LinkKind::ExtLink),
            "mw:ExtLink/Numbered" => Some(LinkKind::ExtLinkNumbered),
            "mw:ExtLink/URL" => Some(LinkKind::ExtLinkUrl),
            _ => None,
        })
    }
}

/// Inline formatting applied to text runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "kind")]
pub enum AnnotationType {
    Bold,
    Italic,
    Link(LinkKind),
}

impl AnnotationType {
    /// The annotation an element stands for, if any.
    pub fn classify(doc: &Document, id: NodeId) -> Option<Self> {
        match doc.name(id)? {
            "b" | "strong" => Some(AnnotationType::Bold),
            "i" | "em" => Some(AnnotationType::Italic),
            "a" => doc
                .attr(id, "rel")
                .and_then(LinkKind::from_rel)
                .map(AnnotationType::Link),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            AnnotationType::Bold => "b",
            AnnotationType::Italic => "i",
            AnnotationType::Link(_) => "a",
        }
    }
}

/// An annotation with its data and the HTML attributes it preserves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub kind: AnnotationType,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub data: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Attributes::is_empty", default)]
    pub html_attributes: Attributes,
}

impl Annotation {
    pub fn from_dom(kind: AnnotationType, doc: &Document, id: NodeId) -> Self {
        let mut data = BTreeMap::new();
        let mut html_attributes = Attributes::new();
        if let Some(attrs) = doc.attrs(id) {
            for attr in attrs.iter() {
                match (kind, attr.name.as_str()) {
                    (AnnotationType::Link(LinkKind::WikiLink), "href") => {
                        data.insert("title".into(), Value::from(title_from_href(&attr.value)));
                    }
                    (AnnotationType::Link(_), "href") => {
                        data.insert("href".into(), Value::from(attr.value.as_str()));
                    }
                    (AnnotationType::Link(_), "rel") => {}
                    _ => html_attributes.push(attr.name.as_str(), attr.value.as_str()),
                }
            }
        }
        Self {
            kind,
            data,
            html_attributes,
        }
    }

    /// Attributes for the element this annotation becomes.
    pub fn to_attrs(&self) -> Attributes {
        let mut attrs = Attributes::new();
        if let AnnotationType::Link(kind) = self.kind {
            attrs.push("rel", kind.rel());
            let href = match kind {
                LinkKind::WikiLink => self
                    .data
                    .get("title")
                    .and_then(Value::as_str)
                    .map(href_from_title),
                _ => self
                    .data
                    .get("href")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            };
            if let Some(href) = href {
                attrs.push("href", href);
            }
        }
        for attr in self.html_attributes.iter() {
            attrs.set(attr.name.as_str(), attr.value.as_str());
        }
        attrs
    }
}

/// `./Foo_bar` (or `../../Foo_bar`) to `Foo bar`.
pub fn title_from_href(href: &str) -> String {
    let mut rest = href;
    while let Some(stripped) = rest.strip_prefix("../") {
        rest = stripped;
    }
    let rest = rest.strip_prefix("./").unwrap_or(rest);
    rest.replace('_', " ")
}

/// `Foo bar` to `./Foo_bar`.
pub fn href_from_title(title: &str) -> String {
    format!("./{}", title.trim().replace(' ', "_"))
}

/// A typed node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataElement {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub attributes: BTreeMap<String, Value>,
    /// HTML attributes the projection does not model, carried through unchanged.
    #[serde(skip_serializing_if = "Attributes::is_empty", default)]
    pub html_attributes: Attributes,
}

impl DataElement {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            attributes: BTreeMap::new(),
            html_attributes: Attributes::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.attributes.get(key).and_then(Value::as_u64)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.attributes
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_titles_and_hrefs() {
        assert_eq!(title_from_href("./Foo_bar"), "Foo bar");
        assert_eq!(title_from_href("../../Help:A_b"), "Help:A b");
        assert_eq!(href_from_title("Foo bar"), "./Foo_bar");
    }

    #[test]
    fn test_link_annotation_keeps_extra_attributes() {
        let mut doc = Document::new();
        let attrs: Attributes = vec![
            ("rel", "mw:WikiLink"),
            ("href", "./Main_Page"),
            ("class", "x"),
        ]
        .into_iter()
        .collect();
        let a = doc.append_element(doc.root(), "a", attrs);

        let kind = AnnotationType::classify(&doc, a).unwrap();
        assert_eq!(kind, AnnotationType::Link(LinkKind::WikiLink));
        let annotation = Annotation::from_dom(kind, &doc, a);
        assert_eq!(annotation.data.get("title"), Some(&Value::from("Main Page")));
        assert_eq!(annotation.html_attributes.get("class"), Some("x"));

        let back = annotation.to_attrs();
        assert_eq!(back.get("href"), Some("./Main_Page"));
        assert_eq!(back.get("rel"), Some("mw:WikiLink"));
        assert_eq!(back.get("class"), Some("x"));
    }
}
