//! Document tree to linear model and back.
//!
//! The linear model is a flat list: structural nodes open and close around their content,
//! and text carries the stack of annotations (bold, italic, links) active at that point.
//! Block images contribute only their caption; transclusions and references are opaque.

use super::registry::{classify, spec};
use super::{Annotation, AnnotationType, DataElement, NodeType};
use crate::wiki::tree::{Document, NodeData, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "item")]
pub enum LinearItem {
    Open(DataElement),
    Close { node_type: NodeType },
    Text {
        text: String,
        #[serde(skip_serializing_if = "Vec::is_empty", default)]
        annotations: Vec<Annotation>,
    },
}

#[derive(Debug, Default)]
pub struct DomConverter;

impl DomConverter {
    pub fn new() -> Self {
        Self
    }

    pub fn to_linear(&self, doc: &Document) -> Vec<LinearItem> {
        let mut items = Vec::new();
        let mut annotations = Vec::new();
        for child in doc.children(doc.root()) {
            self.walk(doc, *child, &mut annotations, &mut items);
        }
        items
    }

    fn walk(
        &self,
        doc: &Document,
        id: NodeId,
        annotations: &mut Vec<Annotation>,
        items: &mut Vec<LinearItem>,
    ) {
        if let NodeData::Text(text) = doc.data(id) {
            items.push(LinearItem::Text {
                text: text.clone(),
                annotations: annotations.clone(),
            });
            return;
        }

        if let Some(kind) = AnnotationType::classify(doc, id) {
            annotations.push(Annotation::from_dom(kind, doc, id));
            for child in doc.children(id) {
                self.walk(doc, *child, annotations, items);
            }
            annotations.pop();
            return;
        }

        let node_type = classify(doc, id);
        let node_spec = spec(node_type);
        items.push(LinearItem::Open((node_spec.to_data)(doc, id)));
        match node_type {
            NodeType::BlockImage => {
                let captions = doc
                    .children(id)
                    .iter()
                    .filter(|child| classify(doc, **child) == NodeType::ImageCaption);
                for caption in captions {
                    self.walk(doc, *caption, &mut Vec::new(), items);
                }
            }
            NodeType::Transclusion | NodeType::Reference | NodeType::Comment => {}
            _ => {
                // Annotations do not span structural boundaries.
                let mut inner = Vec::new();
                for child in doc.children(id) {
                    self.walk(doc, *child, &mut inner, items);
                }
            }
        }
        items.push(LinearItem::Close { node_type });
    }

    pub fn to_document(&self, items: &[LinearItem]) -> Document {
        let mut doc = Document::new();
        let mut structure = vec![doc.root()];
        let mut open: Vec<(Annotation, NodeId)> = Vec::new();

        for item in items {
            match item {
                LinearItem::Open(data) => {
                    open.clear();
                    let parent = structure.last().copied().unwrap_or_else(|| doc.root());
                    let id = (spec(data.node_type).to_dom)(data, &mut doc, parent);
                    structure.push(id);
                }
                LinearItem::Close { .. } => {
                    open.clear();
                    if structure.len() > 1 {
                        structure.pop();
                    }
                }
                LinearItem::Text { text, annotations } => {
                    let common = open
                        .iter()
                        .zip(annotations.iter())
                        .take_while(|((current, _), wanted)| current == *wanted)
                        .count();
                    open.truncate(common);
                    for annotation in &annotations[common..] {
                        let parent = current_parent(&open, &structure, &doc);
                        let id = doc.append_element(
                            parent,
                            annotation.kind.tag(),
                            annotation.to_attrs(),
                        );
                        open.push((annotation.clone(), id));
                    }
                    let parent = current_parent(&open, &structure, &doc);
                    doc.append_text(parent, text.as_str());
                }
            }
        }
        doc
    }
}

fn current_parent(open: &[(Annotation, NodeId)], structure: &[NodeId], doc: &Document) -> NodeId {
    open.last()
        .map(|(_, id)| *id)
        .or_else(|| structure.last().copied())
        .unwrap_or_else(|| doc.root())
}
