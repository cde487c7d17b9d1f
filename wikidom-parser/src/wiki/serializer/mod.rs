//! Document tree back to wikitext.
//!
//! Nodes the parser built and nobody edited are written from provenance: the opening
//! source, the children, the closing source. That alone reproduces the input exactly.
//! Nodes that were edited, or were created without provenance, are rebuilt from their
//! meaning (node type, annotation, RDFa type) as canonical wikitext.
//!
//! Behavior switches are consumed by the parse and never reach the tree, so a page that
//! contains one does not round-trip byte for byte.

use crate::wiki::lexing::markup::is_void_tag;
use crate::wiki::model::image::ImageData;
use crate::wiki::model::registry::classify;
use crate::wiki::model::{title_from_href, AnnotationType, LinkKind, NodeType};
use crate::wiki::tree::{Document, NodeData, NodeId};
use serde_json::Value;

const TARGET: &str = "wikidom::serializer";

#[derive(Debug, Default)]
pub struct WikitextSerializer;

impl WikitextSerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize(&self, doc: &Document) -> String {
        let mut out = String::new();
        self.children(doc, doc.root(), &mut out);
        out
    }

    fn children(&self, doc: &Document, id: NodeId, out: &mut String) {
        for child in doc.children(id) {
            self.node(doc, *child, out);
        }
    }

    fn children_to_string(&self, doc: &Document, id: NodeId) -> String {
        let mut out = String::new();
        self.children(doc, id, &mut out);
        out
    }

    fn node(&self, doc: &Document, id: NodeId, out: &mut String) {
        match doc.data(id) {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Comment(text) => {
                match doc.provenance(id).and_then(|prov| prov.src_open.as_deref()) {
                    Some(src) => out.push_str(src),
                    None => {
                        out.push_str("<!--");
                        out.push_str(text);
                        out.push_str("-->");
                    }
                }
            }
            NodeData::Element { .. } => {
                if !doc.is_edited(id) {
                    if let Some(prov) = doc.provenance(id) {
                        if let Some(open) = &prov.src_open {
                            out.push_str(open);
                            if prov.has_hint("opaque") {
                                return;
                            }
                            self.children(doc, id, out);
                            out.push_str(prov.src_close.as_deref().unwrap_or(""));
                            return;
                        }
                    }
                }
                log::trace!(target: TARGET, "rebuilding <{}>", doc.name(id).unwrap_or(""));
                self.rebuild(doc, id, out);
            }
        }
    }

    fn rebuild(&self, doc: &Document, id: NodeId, out: &mut String) {
        if let Some(kind) = AnnotationType::classify(doc, id) {
            self.annotation(doc, id, kind, out);
            return;
        }

        let name = doc.name(id).unwrap_or("");
        if name == "figure" && is_image(doc, id) {
            self.image(doc, id, out);
            return;
        }

        match classify(doc, id) {
            NodeType::Heading => {
                let level = name
                    .get(1..)
                    .and_then(|n| n.parse::<usize>().ok())
                    .unwrap_or(2);
                let marks = "=".repeat(level);
                start_line(out);
                out.push_str(&marks);
                self.children(doc, id, out);
                out.push_str(&marks);
            }
            NodeType::List | NodeType::ImageCaption | NodeType::Reference => {
                self.children(doc, id, out)
            }
            NodeType::ListItem => {
                start_line(out);
                out.push_str(&bullets(doc, id));
                self.children(doc, id, out);
            }
            NodeType::Transclusion => match transclusion(doc, id) {
                Some(wikitext) => out.push_str(&wikitext),
                None => self.children(doc, id, out),
            },
            NodeType::Comment => {}
            NodeType::BlockImage | NodeType::Alien => self.alien(doc, id, name, out),
        }
    }

    fn annotation(&self, doc: &Document, id: NodeId, kind: AnnotationType, out: &mut String) {
        match kind {
            AnnotationType::Bold => self.wrap(doc, id, "'''", "'''", out),
            AnnotationType::Italic => self.wrap(doc, id, "''", "''", out),
            AnnotationType::Link(LinkKind::WikiLink) => {
                let title = doc.attr(id, "href").map(title_from_href).unwrap_or_default();
                let label = self.children_to_string(doc, id);
                if label.is_empty() || label == title {
                    out.push_str(&format!("[[{}]]", title));
                } else {
                    out.push_str(&format!("[[{}|{}]]", title, label));
                }
            }
            AnnotationType::Link(LinkKind::ExtLink) => {
                let href = doc.attr(id, "href").unwrap_or("");
                let label = self.children_to_string(doc, id);
                out.push_str(&format!("[{} {}]", href, label));
            }
            AnnotationType::Link(LinkKind::ExtLinkNumbered) => {
                out.push_str(&format!("[{}]", doc.attr(id, "href").unwrap_or("")));
            }
            AnnotationType::Link(LinkKind::ExtLinkUrl) => {
                out.push_str(doc.attr(id, "href").unwrap_or(""));
            }
        }
    }

    fn wrap(&self, doc: &Document, id: NodeId, open: &str, close: &str, out: &mut String) {
        out.push_str(open);
        self.children(doc, id, out);
        out.push_str(close);
    }

    fn image(&self, doc: &Document, id: NodeId, out: &mut String) {
        let image = ImageData::from_figure(doc, id);
        let mut parts = vec![image.resource.clone().unwrap_or_default()];
        parts.extend(image.options());
        if let Some(caption) = image.caption {
            let text = self.children_to_string(doc, caption);
            if !text.is_empty() {
                parts.push(text);
            }
        }
        out.push_str(&format!("[[{}]]", parts.join("|")));
    }

    fn alien(&self, doc: &Document, id: NodeId, name: &str, out: &mut String) {
        if doc.has_type(id, "mw:Param") {
            self.children(doc, id, out);
            return;
        }
        // A failed expansion stands for the call that produced it.
        if doc.has_type(id, "mw:Error") {
            if let Some(wikitext) = transclusion(doc, id) {
                out.push_str(&wikitext);
            }
            return;
        }
        let dropped = doc
            .attr(id, "typeof")
            .map(|value| {
                value.split_whitespace().any(|word| {
                    word == "mw:Placeholder/TOC"
                        || word.starts_with("mw:Includes/")
                })
            })
            .unwrap_or(false);
        if dropped {
            return;
        }

        out.push('<');
        out.push_str(name);
        if let Some(attrs) = doc.attrs(id) {
            for attr in attrs.iter() {
                out.push_str(&format!(
                    " {}=\"{}\"",
                    attr.name,
                    attr.value.replace('&', "&amp;").replace('"', "&quot;")
                ));
            }
        }
        out.push('>');
        if is_void_tag(name) {
            return;
        }
        self.children(doc, id, out);
        out.push_str(&format!("</{}>", name));
    }
}

fn is_image(doc: &Document, id: NodeId) -> bool {
    doc.attr(id, "typeof")
        .map(|value| {
            value
                .split_whitespace()
                .any(|word| word.starts_with("mw:Image"))
        })
        .unwrap_or(false)
}

/// Line-start constructs go on a fresh line.
fn start_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// List bullets for an item, outermost first.
fn bullets(doc: &Document, item: NodeId) -> String {
    let mut marks = Vec::new();
    let mut current = Some(item);
    while let Some(id) = current {
        let mark = match (doc.name(id), doc.parent(id).and_then(|p| doc.name(p))) {
            (Some("li"), Some("ol")) => Some('#'),
            (Some("li"), _) => Some('*'),
            (Some("dd"), _) => Some(':'),
            (Some("dt"), _) => Some(';'),
            _ => None,
        };
        marks.extend(mark);
        current = doc.parent(id);
    }
    marks.iter().rev().collect()
}

/// `{{target|positional|name=value}}` from a `data-mw` attribute.
fn transclusion(doc: &Document, id: NodeId) -> Option<String> {
    let mw: Value = serde_json::from_str(doc.attr(id, "data-mw")?).ok()?;
    let template = mw.get("parts")?.get(0)?.get("template")?;
    let target = template.get("target")?.get("wt")?.as_str()?;

    let mut positional: Vec<(usize, String)> = Vec::new();
    let mut named: Vec<String> = Vec::new();
    if let Some(params) = template.get("params").and_then(Value::as_object) {
        for (key, value) in params {
            let wt = value.get("wt").and_then(Value::as_str).unwrap_or("");
            match key.parse::<usize>() {
                Ok(index) => positional.push((index, wt.to_string())),
                Err(_) => named.push(format!("{}={}", key, wt)),
            }
        }
    }
    positional.sort_by_key(|(index, _)| *index);

    let mut parts = vec![target.to_string()];
    let mut next = 1;
    for (index, value) in positional {
        if index == next {
            parts.push(value);
            next += 1;
        } else {
            parts.push(format!("{}={}", index, value));
        }
    }
    parts.extend(named);
    Some(format!("{{{{{}}}}}", parts.join("|")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::token::Attributes;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs.iter().copied().collect()
    }

    fn serialize(doc: &Document) -> String {
        WikitextSerializer::new().serialize(doc)
    }

    fn link_doc() -> (Document, NodeId) {
        let mut doc = Document::new();
        let original = attrs(&[("rel", "mw:WikiLink"), ("href", "./Foo")]);
        let a = doc.append_element(doc.root(), "a", original.clone());
        doc.append_text(a, "bar");
        let prov = doc.provenance_mut(a);
        prov.src_open = Some("[[ Foo |".into());
        prov.src_close = Some("]]".into());
        prov.original_attrs = Some(original);
        (doc, a)
    }

    #[test]
    fn test_unedited_nodes_use_source() {
        let (doc, _) = link_doc();
        assert_eq!(serialize(&doc), "[[ Foo |bar]]");
    }

    #[test]
    fn test_edited_link_is_rebuilt() {
        let (mut doc, a) = link_doc();
        doc.set_attr(a, "href", "./Baz_qux");
        assert_eq!(serialize(&doc), "[[Baz qux|bar]]");
    }

    #[test]
    fn test_opaque_node_skips_children() {
        let mut doc = Document::new();
        let span = doc.append_element(doc.root(), "span", attrs(&[("typeof", "mw:Transclusion")]));
        doc.append_text(span, "expanded");
        let prov = doc.provenance_mut(span);
        prov.src_open = Some("{{Foo}}".into());
        prov.hints.insert("opaque".into(), "1".into());
        assert_eq!(serialize(&doc), "{{Foo}}");
    }

    #[test]
    fn test_new_structure_is_canonical() {
        let mut doc = Document::new();
        let root = doc.root();
        let h2 = doc.append_element(root, "h2", Attributes::new());
        doc.append_text(h2, " Title ");
        let ul = doc.append_element(root, "ul", Attributes::new());
        let li = doc.append_element(ul, "li", Attributes::new());
        doc.append_text(li, " a ");
        let b = doc.append_element(li, "b", Attributes::new());
        doc.append_text(b, "bold");
        let inner = doc.append_element(li, "ol", Attributes::new());
        let nested = doc.append_element(inner, "li", Attributes::new());
        doc.append_text(nested, " b");
        let dl = doc.append_element(root, "dl", Attributes::new());
        let dd = doc.append_element(dl, "dd", Attributes::new());
        doc.append_text(dd, "indented");

        assert_eq!(
            serialize(&doc),
            "== Title ==\n* a '''bold'''\n*# b\n:indented"
        );
    }

    #[test]
    fn test_links_rebuilt_by_kind() {
        let mut doc = Document::new();
        let root = doc.root();
        let ext = doc.append_element(
            root,
            "a",
            attrs(&[("rel", "mw:ExtLink"), ("href", "http://example.com")]),
        );
        doc.append_text(ext, "Example");
        doc.append_text(root, " ");
        doc.append_element(
            root,
            "a",
            attrs(&[("rel", "mw:ExtLink/Numbered"), ("href", "http://a.org")]),
        );
        doc.append_text(root, " ");
        let url = doc.append_element(
            root,
            "a",
            attrs(&[("rel", "mw:ExtLink/URL"), ("href", "http://b.org")]),
        );
        doc.append_text(url, "http://b.org");
        let simple = doc.append_element(root, "a", attrs(&[("rel", "mw:WikiLink"), ("href", "./Main_Page")]));
        doc.append_text(simple, "Main Page");

        assert_eq!(
            serialize(&doc),
            "[http://example.com Example] [http://a.org] http://b.org[[Main Page]]"
        );
    }

    #[test]
    fn test_edited_transclusion_uses_data_mw() {
        let mut doc = Document::new();
        let data_mw = r#"{"parts":[{"template":{"target":{"wt":"Foo"},"params":{"1":{"wt":"x"},"name":{"wt":"y"}}}}]}"#;
        let span = doc.append_element(
            doc.root(),
            "span",
            attrs(&[("typeof", "mw:Transclusion"), ("data-mw", data_mw)]),
        );
        doc.append_text(span, "expanded");
        assert_eq!(serialize(&doc), "{{Foo|x|name=y}}");
    }

    #[test]
    fn test_error_marker_rebuilds_the_failed_call() {
        let mut doc = Document::new();
        let data_mw = r#"{"parts":[{"template":{"target":{"wt":"Deep"},"params":{"1":{"wt":"x"}}}}]}"#;
        doc.append_text(doc.root(), "a ");
        let error = doc.append_element(
            doc.root(),
            "span",
            attrs(&[("typeof", "mw:Error"), ("data-mw", data_mw)]),
        );
        doc.append_text(error, "Template depth limit exceeded");
        doc.append_text(doc.root(), " b");
        assert_eq!(serialize(&doc), "a {{Deep|x}} b");
    }

    #[test]
    fn test_edited_block_image() {
        let mut doc = Document::new();
        let figure = doc.append_element(
            doc.root(),
            "figure",
            attrs(&[("typeof", "mw:Image/Thumb"), ("class", "mw-halign-left")]),
        );
        let a = doc.append_element(figure, "a", attrs(&[("href", "./File:Cat.png")]));
        doc.append_element(
            a,
            "img",
            attrs(&[("resource", "./File:Cat.png"), ("width", "120")]),
        );
        let caption = doc.append_element(figure, "figcaption", Attributes::new());
        doc.append_text(caption, "A cat");
        assert_eq!(serialize(&doc), "[[File:Cat.png|thumb|left|120px|A cat]]");
    }

    #[test]
    fn test_markers_and_generic_html() {
        let mut doc = Document::new();
        let root = doc.root();
        let error = doc.append_element(root, "span", attrs(&[("typeof", "mw:Error")]));
        doc.append_text(error, "Template loop detected");
        doc.append_element(root, "meta", attrs(&[("typeof", "mw:Placeholder/TOC")]));
        let span = doc.append_element(root, "span", attrs(&[("class", "x\"y")]));
        doc.append_text(span, "hi");
        doc.append_element(root, "br", Attributes::new());
        doc.append(root, NodeData::Comment(" note ".into()));
        assert_eq!(
            serialize(&doc),
            "<span class=\"x&quot;y\">hi</span><br><!-- note -->"
        );
    }
}
