//! Node-type registry.
//!
//! One [`NodeSpec`] per [`NodeType`]: which elements it claims, the RDFa `typeof` pattern
//! that narrows the claim, which HTML attributes the projection owns (and so must not be
//! stored verbatim), which child types it accepts, and the to-data/to-dom pair.

use super::image::ImageData;
use super::{DataElement, NodeType};
use crate::wiki::token::Attributes;
use crate::wiki::tree::{Document, NodeData, NodeId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub type ToData = fn(&Document, NodeId) -> DataElement;
pub type ToDom = fn(&DataElement, &mut Document, NodeId) -> NodeId;

pub struct NodeSpec {
    pub node_type: NodeType,
    pub name: &'static str,
    pub tags: &'static [&'static str],
    /// Pattern one `typeof` word must match, when the type is RDFa-typed.
    pub rdfa: Option<Regex>,
    /// HTML attributes handled by the projection itself.
    pub blacklisted_html_attributes: &'static [&'static str],
    /// Allowed child node types; `None` means any.
    pub child_types: Option<&'static [NodeType]>,
    pub to_data: ToData,
    pub to_dom: ToDom,
}

impl NodeSpec {
    pub fn matches(&self, doc: &Document, id: NodeId) -> bool {
        let Some(name) = doc.name(id) else {
            return false;
        };
        if !self.tags.is_empty() && !self.tags.contains(&name) {
            return false;
        }
        match &self.rdfa {
            Some(pattern) => doc
                .attr(id, "typeof")
                .map(|value| value.split_whitespace().any(|word| pattern.is_match(word)))
                .unwrap_or(false),
            None => true,
        }
    }

    pub fn allows_child(&self, child: NodeType) -> bool {
        self.child_types
            .map(|allowed| allowed.contains(&child))
            .unwrap_or(true)
    }

    /// Attributes of `id` not owned by the projection.
    pub fn stored_html_attributes(&self, doc: &Document, id: NodeId) -> Attributes {
        doc.attrs(id)
            .map(|attrs| {
                attrs
                    .iter()
                    .filter(|attr| !self.blacklisted_html_attributes.contains(&attr.name.as_str()))
                    .map(|attr| (attr.name.clone(), attr.value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub struct Registry {
    specs: Vec<NodeSpec>,
}

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::standard);

fn rdfa(pattern: &str) -> Option<Regex> {
    Regex::new(pattern).ok()
}

impl Registry {
    fn standard() -> Self {
        Self {
            specs: vec![
                NodeSpec {
                    node_type: NodeType::BlockImage,
                    name: "mwBlockImage",
                    tags: &["figure"],
                    rdfa: rdfa(r"^mw:Image/(Thumb|Frame)$"),
                    blacklisted_html_attributes: &[
                        "typeof", "class", "src", "resource", "width", "height", "href", "rel",
                    ],
                    child_types: Some(&[NodeType::ImageCaption]),
                    to_data: block_image_to_data,
                    to_dom: block_image_to_dom,
                },
                NodeSpec {
                    node_type: NodeType::Transclusion,
                    name: "mwTransclusion",
                    tags: &[],
                    rdfa: rdfa(r"^mw:Transclusion$"),
                    blacklisted_html_attributes: &["typeof", "data-mw"],
                    child_types: Some(&[]),
                    to_data: transclusion_to_data,
                    to_dom: transclusion_to_dom,
                },
                NodeSpec {
                    node_type: NodeType::Reference,
                    name: "mwReference",
                    tags: &["sup", "span"],
                    rdfa: rdfa(r"^mw:Extension/ref$"),
                    blacklisted_html_attributes: &["typeof"],
                    child_types: Some(&[]),
                    to_data: reference_to_data,
                    to_dom: reference_to_dom,
                },
                NodeSpec {
                    node_type: NodeType::ImageCaption,
                    name: "mwImageCaption",
                    tags: &["figcaption"],
                    rdfa: None,
                    blacklisted_html_attributes: &[],
                    child_types: None,
                    to_data: plain_to_data,
                    to_dom: plain_to_dom,
                },
                NodeSpec {
                    node_type: NodeType::Heading,
                    name: "heading",
                    tags: &["h1", "h2", "h3", "h4", "h5", "h6"],
                    rdfa: None,
                    blacklisted_html_attributes: &[],
                    child_types: None,
                    to_data: heading_to_data,
                    to_dom: heading_to_dom,
                },
                NodeSpec {
                    node_type: NodeType::List,
                    name: "list",
                    tags: &["ul", "ol", "dl"],
                    rdfa: None,
                    blacklisted_html_attributes: &[],
                    child_types: Some(&[NodeType::ListItem]),
                    to_data: list_to_data,
                    to_dom: list_to_dom,
                },
                NodeSpec {
                    node_type: NodeType::ListItem,
                    name: "listItem",
                    tags: &["li", "dd", "dt"],
                    rdfa: None,
                    blacklisted_html_attributes: &[],
                    child_types: None,
                    to_data: list_item_to_data,
                    to_dom: list_item_to_dom,
                },
                NodeSpec {
                    node_type: NodeType::Comment,
                    name: "comment",
                    tags: &[],
                    rdfa: None,
                    blacklisted_html_attributes: &[],
                    child_types: Some(&[]),
                    to_data: comment_to_data,
                    to_dom: comment_to_dom,
                },
                NodeSpec {
                    node_type: NodeType::Alien,
                    name: "alien",
                    tags: &[],
                    rdfa: None,
                    blacklisted_html_attributes: &[],
                    child_types: None,
                    to_data: alien_to_data,
                    to_dom: alien_to_dom,
                },
            ],
        }
    }

    pub fn global() -> &'static Registry {
        &REGISTRY
    }

    pub fn spec(&self, node_type: NodeType) -> &NodeSpec {
        self.specs
            .iter()
            .find(|spec| spec.node_type == node_type)
            .unwrap_or_else(|| &self.specs[self.specs.len() - 1])
    }

    /// The node type for `id`. RDFa-typed specs are tried before tag-only ones; comments
    /// are recognized by node kind; everything else is alien.
    pub fn classify(&self, doc: &Document, id: NodeId) -> NodeType {
        if matches!(doc.data(id), NodeData::Comment(_)) {
            return NodeType::Comment;
        }
        let typed = self.specs.iter().filter(|spec| spec.rdfa.is_some());
        let untyped = self
            .specs
            .iter()
            .filter(|spec| spec.rdfa.is_none() && !spec.tags.is_empty());
        typed
            .chain(untyped)
            .find(|spec| spec.matches(doc, id))
            .map(|spec| spec.node_type)
            .unwrap_or(NodeType::Alien)
    }
}

pub fn spec(node_type: NodeType) -> &'static NodeSpec {
    Registry::global().spec(node_type)
}

pub fn classify(doc: &Document, id: NodeId) -> NodeType {
    Registry::global().classify(doc, id)
}

fn data_for(node_type: NodeType, doc: &Document, id: NodeId) -> DataElement {
    let mut data = DataElement::new(node_type);
    data.html_attributes = spec(node_type).stored_html_attributes(doc, id);
    data
}

fn element(doc: &mut Document, parent: NodeId, name: &str, data: &DataElement) -> NodeId {
    doc.append_element(parent, name, data.html_attributes.clone())
}

fn block_image_to_data(doc: &Document, id: NodeId) -> DataElement {
    let image = ImageData::from_figure(doc, id);
    let mut data = data_for(NodeType::BlockImage, doc, id)
        .with("type", image.image_type.as_str())
        .with("align", image.align.as_str())
        .with("defaultSize", image.default_size);
    if let Some(resource) = image.resource {
        data = data.with("resource", resource);
    }
    if let Some(src) = image.src {
        data = data.with("src", src);
    }
    if let Some(href) = image.href {
        data = data.with("href", href);
    }
    if let Some(width) = image.width {
        data = data.with("width", width);
    }
    if let Some(height) = image.height {
        data = data.with("height", height);
    }
    data
}

fn block_image_to_dom(data: &DataElement, doc: &mut Document, parent: NodeId) -> NodeId {
    let image = ImageData {
        image_type: data.get_str("type").unwrap_or("thumb").to_string(),
        align: data.get_str("align").unwrap_or("default").to_string(),
        default_size: data.get_bool("defaultSize"),
        resource: data.get_str("resource").map(str::to_string),
        src: data.get_str("src").map(str::to_string),
        href: data.get_str("href").map(str::to_string),
        width: data.get_u64("width").and_then(|w| u32::try_from(w).ok()),
        height: data.get_u64("height").and_then(|h| u32::try_from(h).ok()),
        alt: None,
        caption: None,
    };

    let mut attrs = data.html_attributes.clone();
    attrs.set("typeof", image.rdfa_type());
    if let Some(class) = image.class() {
        attrs.set("class", class);
    }
    let figure = doc.append_element(parent, "figure", attrs);

    let resource = image
        .resource
        .as_deref()
        .map(super::href_from_title)
        .unwrap_or_default();
    let mut link = Attributes::new();
    link.push("href", image.href.clone().unwrap_or_else(|| resource.clone()));
    let a = doc.append_element(figure, "a", link);

    let mut img = Attributes::new();
    img.push("resource", resource);
    if let Some(src) = &image.src {
        img.push("src", src.as_str());
    }
    if let Some(width) = image.width {
        img.push("width", width.to_string());
    }
    if let Some(height) = image.height {
        img.push("height", height.to_string());
    }
    doc.append_element(a, "img", img);
    figure
}

fn transclusion_to_data(doc: &Document, id: NodeId) -> DataElement {
    let mw = doc
        .attr(id, "data-mw")
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
        .unwrap_or(Value::Null);
    let mut data = data_for(NodeType::Transclusion, doc, id).with("mw", mw);
    if let Some(name) = doc.name(id) {
        data = data.with("tag", name);
    }
    data
}

fn transclusion_to_dom(data: &DataElement, doc: &mut Document, parent: NodeId) -> NodeId {
    let mut attrs = data.html_attributes.clone();
    attrs.set("typeof", "mw:Transclusion");
    if let Some(mw) = data.attributes.get("mw").filter(|mw| !mw.is_null()) {
        attrs.set("data-mw", mw.to_string());
    }
    let tag = data.get_str("tag").unwrap_or("span").to_string();
    doc.append_element(parent, tag, attrs)
}

fn reference_to_data(doc: &Document, id: NodeId) -> DataElement {
    data_for(NodeType::Reference, doc, id).with("text", doc.text_content(id))
}

fn reference_to_dom(data: &DataElement, doc: &mut Document, parent: NodeId) -> NodeId {
    let mut attrs = data.html_attributes.clone();
    attrs.set("typeof", "mw:Extension/ref");
    let sup = doc.append_element(parent, "sup", attrs);
    if let Some(text) = data.get_str("text") {
        doc.append_text(sup, text);
    }
    sup
}

fn heading_to_data(doc: &Document, id: NodeId) -> DataElement {
    let level = doc
        .name(id)
        .and_then(|name| name[1..].parse::<u64>().ok())
        .unwrap_or(2);
    data_for(NodeType::Heading, doc, id).with("level", level)
}

fn heading_to_dom(data: &DataElement, doc: &mut Document, parent: NodeId) -> NodeId {
    let level = data.get_u64("level").unwrap_or(2).clamp(1, 6);
    element(doc, parent, &format!("h{}", level), data)
}

fn list_to_data(doc: &Document, id: NodeId) -> DataElement {
    let style = match doc.name(id) {
        Some("ol") => "number",
        Some("dl") => "definition",
        _ => "bullet",
    };
    data_for(NodeType::List, doc, id).with("style", style)
}

fn list_to_dom(data: &DataElement, doc: &mut Document, parent: NodeId) -> NodeId {
    let name = match data.get_str("style") {
        Some("number") => "ol",
        Some("definition") => "dl",
        _ => "ul",
    };
    element(doc, parent, name, data)
}

fn list_item_to_data(doc: &Document, id: NodeId) -> DataElement {
    let style = match doc.name(id) {
        Some("dt") => "term",
        Some("dd") => "definition",
        _ => "item",
    };
    data_for(NodeType::ListItem, doc, id).with("style", style)
}

fn list_item_to_dom(data: &DataElement, doc: &mut Document, parent: NodeId) -> NodeId {
    let name = match data.get_str("style") {
        Some("term") => "dt",
        Some("definition") => "dd",
        _ => "li",
    };
    element(doc, parent, name, data)
}

fn comment_to_data(doc: &Document, id: NodeId) -> DataElement {
    let text = match doc.data(id) {
        NodeData::Comment(text) => text.clone(),
        _ => String::new(),
    };
    DataElement::new(NodeType::Comment).with("text", text)
}

fn comment_to_dom(data: &DataElement, doc: &mut Document, parent: NodeId) -> NodeId {
    let text = data.get_str("text").unwrap_or("").to_string();
    doc.append(parent, NodeData::Comment(text))
}

fn plain_to_data(doc: &Document, id: NodeId) -> DataElement {
    data_for(NodeType::ImageCaption, doc, id)
}

fn plain_to_dom(data: &DataElement, doc: &mut Document, parent: NodeId) -> NodeId {
    element(doc, parent, "figcaption", data)
}

fn alien_to_data(doc: &Document, id: NodeId) -> DataElement {
    let mut data = DataElement::new(NodeType::Alien);
    data.html_attributes = doc.attrs(id).cloned().unwrap_or_default();
    if let Some(name) = doc.name(id) {
        data = data.with("tag", name);
    }
    data
}

fn alien_to_dom(data: &DataElement, doc: &mut Document, parent: NodeId) -> NodeId {
    let tag = data.get_str("tag").unwrap_or("span").to_string();
    element(doc, parent, &tag, data)
}
