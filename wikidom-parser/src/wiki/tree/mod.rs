//! Document tree
//!
//! An arena of nodes rooted at a `body` element. Structure lives in the arena; source
//! metadata lives in a provenance side-table keyed by node id, so editing a node's
//! attributes never touches what the parser recorded about it.
//!
//! - [`builder`]: token stream to tree, with auto-close recovery for bad nesting.
//! - [`html`]: tree to HTML and back through `html5ever`.

pub mod builder;
pub mod html;

pub use builder::TreeBuilder;

use crate::wiki::token::{Attributes, Provenance};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// The HTML input has no `body` element to read from.
    MissingBody,
    /// A `data-parsoid` attribute could not be decoded.
    InvalidProvenance(String),
    /// A node id that does not belong to this document.
    UnknownNode(usize),
    /// HTML output failed.
    Serialize(String),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TreeError::MissingBody => write!(f, "HTML input has no body element"),
            TreeError::InvalidProvenance(msg) => write!(f, "Invalid data-parsoid: {}", msg),
            TreeError::UnknownNode(id) => write!(f, "Unknown node id {}", id),
            TreeError::Serialize(msg) => write!(f, "HTML serialization failed: {}", msg),
        }
    }
}

impl std::error::Error for TreeError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element { name: String, attrs: Attributes },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// What the parser knew about a node when it built it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeProvenance {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub range: Option<Range<usize>>,
    /// Source of the opening construct (`[[Foo|`, `==`, `*`).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub src_open: Option<String>,
    /// Source of the closing construct (`]]`, `==`, `</span>`).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub src_close: Option<String>,
    /// Attributes as built; a difference from the live attributes marks the node edited.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub original_attrs: Option<Attributes>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub auto_inserted_start: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub auto_inserted_end: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub hints: BTreeMap<String, String>,
}

impl NodeProvenance {
    /// Provenance for a node opened by a token carrying `prov`.
    pub fn from_token(prov: &Provenance, range: Option<Range<usize>>) -> Self {
        let mut hints = prov.hints.clone();
        let auto_inserted_start = hints.remove("auto_inserted_start").is_some();
        let auto_inserted_end = hints.remove("auto_inserted_end").is_some();
        Self {
            range,
            src_open: prov.src.clone(),
            src_close: None,
            original_attrs: None,
            auto_inserted_start,
            auto_inserted_end,
            hints,
        }
    }

    pub fn has_hint(&self, key: &str) -> bool {
        self.hints.contains_key(key)
    }
}

/// Arena-backed document tree.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    provenance: HashMap<NodeId, NodeProvenance>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document: a lone `body` root.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                data: NodeData::Element {
                    name: "body".to_string(),
                    attrs: Attributes::new(),
                },
                parent: None,
                children: Vec::new(),
            }],
            provenance: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    /// Append a new node as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    pub fn append_element(
        &mut self,
        parent: NodeId,
        name: impl Into<String>,
        attrs: Attributes,
    ) -> NodeId {
        self.append(
            parent,
            NodeData::Element {
                name: name.into(),
                attrs,
            },
        )
    }

    pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
        self.append(parent, NodeData::Text(text.into()))
    }

    /// Unlink `id` from its parent. The node stays in the arena but is unreachable.
    pub fn detach(&mut self, id: NodeId) -> Result<(), TreeError> {
        if !self.contains(id) {
            return Err(TreeError::UnknownNode(id.0));
        }
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|child| *child != id);
        }
        Ok(())
    }

    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0].data
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn attrs(&self, id: NodeId) -> Option<&Attributes> {
        match &self.nodes[id.0].data {
            NodeData::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attrs(id).and_then(|attrs| attrs.get(name))
    }

    pub fn attrs_mut(&mut self, id: NodeId) -> Option<&mut Attributes> {
        match &mut self.nodes[id.0].data {
            NodeData::Element { attrs, .. } => Some(attrs),
            _ => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) {
        if let Some(attrs) = self.attrs_mut(id) {
            attrs.set(name, value);
        }
    }

    /// Whether the `typeof` attribute contains `rdfa` as one of its words.
    pub fn has_type(&self, id: NodeId, rdfa: &str) -> bool {
        self.attr(id, "typeof")
            .map(|value| value.split_whitespace().any(|word| word == rdfa))
            .unwrap_or(false)
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|value| value.split_whitespace().any(|word| word == class))
            .unwrap_or(false)
    }

    pub fn provenance(&self, id: NodeId) -> Option<&NodeProvenance> {
        self.provenance.get(&id)
    }

    pub fn provenance_mut(&mut self, id: NodeId) -> &mut NodeProvenance {
        self.provenance.entry(id).or_default()
    }

    pub fn set_provenance(&mut self, id: NodeId, provenance: NodeProvenance) {
        self.provenance.insert(id, provenance);
    }

    /// True when the attributes no longer match what the parser produced.
    pub fn is_edited(&self, id: NodeId) -> bool {
        match (self.attrs(id), self.provenance(id)) {
            (Some(attrs), Some(NodeProvenance {
                original_attrs: Some(original),
                ..
            })) => attrs != original,
            _ => false,
        }
    }

    /// Concatenated text of all descendants.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            if let NodeData::Text(text) = &self.nodes[node.0].data {
                out.push_str(text);
            }
        }
        out
    }

    /// `id` and every node below it, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.nodes[next.0].children.iter().rev().copied());
        }
        out
    }

    /// Elements named `name` in document order.
    pub fn elements_named(&self, name: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|id| self.name(*id) == Some(name))
            .collect()
    }

    /// Elements whose `typeof` contains `rdfa`, in document order.
    pub fn elements_typed(&self, rdfa: &str) -> Vec<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .filter(|id| self.has_type(*id, rdfa))
            .collect()
    }

    /// Copy the subtree at `from` in `other` under `parent`, provenance included.
    pub fn graft(&mut self, parent: NodeId, other: &Document, from: NodeId) -> NodeId {
        let id = self.append(parent, other.data(from).clone());
        if let Some(prov) = other.provenance(from) {
            self.provenance.insert(id, prov.clone());
        }
        for child in other.children(from) {
            self.graft(id, other, *child);
        }
        id
    }
}

impl fmt::Display for Document {
    /// Indented outline, one node per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn walk(doc: &Document, id: NodeId, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let indent = "  ".repeat(depth);
            match doc.data(id) {
                NodeData::Element { name, attrs } => {
                    write!(f, "{}<{}", indent, name)?;
                    for attr in attrs.iter() {
                        write!(f, " {}={:?}", attr.name, attr.value)?;
                    }
                    writeln!(f, ">")?;
                }
                NodeData::Text(text) => writeln!(f, "{}{:?}", indent, text)?,
                NodeData::Comment(text) => writeln!(f, "{}<!--{}-->", indent, text)?,
            }
            for child in doc.children(id) {
                walk(doc, *child, depth + 1, f)?;
            }
            Ok(())
        }
        walk(self, self.root(), 0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_navigate() {
        let mut doc = Document::new();
        let root = doc.root();
        let p = doc.append_element(root, "p", Attributes::new());
        let text = doc.append_text(p, "hi");
        assert_eq!(doc.children(root), &[p]);
        assert_eq!(doc.parent(text), Some(p));
        assert_eq!(doc.text_content(root), "hi");
        assert_eq!(doc.descendants(root), vec![root, p, text]);
    }

    #[test]
    fn test_edit_detection_uses_original_attributes() {
        let mut doc = Document::new();
        let attrs: Attributes = vec![("class", "a")].into_iter().collect();
        let span = doc.append_element(doc.root(), "span", attrs.clone());
        doc.provenance_mut(span).original_attrs = Some(attrs);
        assert!(!doc.is_edited(span));
        doc.set_attr(span, "class", "b");
        assert!(doc.is_edited(span));
    }

    #[test]
    fn test_graft_copies_subtree_and_provenance() {
        let mut source = Document::new();
        let b = source.append_element(source.root(), "b", Attributes::new());
        source.append_text(b, "x");
        source.provenance_mut(b).src_open = Some("'''".into());

        let mut target = Document::new();
        let copied = target.graft(target.root(), &source, b);
        assert_eq!(target.text_content(copied), "x");
        assert_eq!(
            target.provenance(copied).and_then(|p| p.src_open.as_deref()),
            Some("'''")
        );
    }

    #[test]
    fn test_outline_display() {
        let mut doc = Document::new();
        let attrs: Attributes = vec![("class", "a")].into_iter().collect();
        let p = doc.append_element(doc.root(), "p", attrs);
        doc.append_text(p, "hi");
        doc.append(doc.root(), NodeData::Comment("c".into()));
        insta::assert_snapshot!(doc.to_string(), @r#"
        <body>
          <p class="a">
            "hi"
          <!--c-->
        "#);
    }

    #[test]
    fn test_detach() {
        let mut doc = Document::new();
        let a = doc.append_text(doc.root(), "a");
        doc.detach(a).unwrap();
        assert!(doc.is_empty());
        assert_eq!(doc.detach(NodeId(99)), Err(TreeError::UnknownNode(99)));
    }
}
