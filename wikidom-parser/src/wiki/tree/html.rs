//! HTML projection of the document tree.
//!
//! Output builds an `RcDom` and lets `html5ever` serialize it. With `debug` set, every
//! node with provenance carries it as a `data-parsoid` JSON attribute; [`from_html`]
//! reads that attribute back, so debug HTML can be serialized to the original source.

use super::{Document, NodeData, NodeId, NodeProvenance, TreeError};
use crate::wiki::token::Attributes;
use html5ever::serialize::{serialize, SerializeOpts, TraversalScope};
use html5ever::tendril::TendrilSink;
use html5ever::{ns, parse_document, Attribute, LocalName, QualName};
use markup5ever_rcdom::{Handle, Node, NodeData as DomData, RcDom, SerializableHandle};
use std::cell::{Cell, RefCell};
use std::default::Default;
use std::rc::Rc;

const PROVENANCE_ATTR: &str = "data-parsoid";

/// Serialize the children of the document root as HTML.
pub fn to_html(doc: &Document, debug: bool) -> Result<String, TreeError> {
    let body = build_dom(doc, doc.root(), debug)?;
    let opts = SerializeOpts {
        traversal_scope: TraversalScope::IncludeNode,
        ..Default::default()
    };

    let mut output = Vec::new();
    for child in body.children.borrow().iter() {
        let serializable = SerializableHandle::from(child.clone());
        serialize(&mut output, &serializable, opts.clone())
            .map_err(|e| TreeError::Serialize(e.to_string()))?;
    }
    String::from_utf8(output).map_err(|e| TreeError::Serialize(e.to_string()))
}

/// A complete HTML document around [`to_html`].
pub fn to_html_document(doc: &Document, title: &str, debug: bool) -> Result<String, TreeError> {
    let body = to_html(doc, debug)?;
    Ok(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{}</title>\n</head>\n<body>{}</body>\n</html>\n",
        escape_text(title),
        body
    ))
}

fn escape_text(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn build_dom(doc: &Document, id: NodeId, debug: bool) -> Result<Handle, TreeError> {
    let handle = match doc.data(id) {
        NodeData::Element { name, attrs } => {
            let mut pairs: Vec<(String, String)> = attrs
                .iter()
                .map(|attr| (attr.name.clone(), attr.value.clone()))
                .collect();
            if debug {
                if let Some(prov) = doc.provenance(id) {
                    let json = serde_json::to_string(prov)
                        .map_err(|e| TreeError::Serialize(e.to_string()))?;
                    pairs.push((PROVENANCE_ATTR.to_string(), json));
                }
            }
            create_element(name, pairs)
        }
        NodeData::Text(text) => create_text(text),
        NodeData::Comment(text) => create_comment(text),
    };

    for child in doc.children(id) {
        let child = build_dom(doc, *child, debug)?;
        child.parent.set(Some(Rc::downgrade(&handle)));
        handle.children.borrow_mut().push(child);
    }
    Ok(handle)
}

fn create_element(tag: &str, attrs: Vec<(String, String)>) -> Handle {
    let qual_name = QualName::new(None, ns!(html), LocalName::from(tag));
    let attributes = attrs
        .into_iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(name.as_str())),
            value: value.into(),
        })
        .collect();

    Rc::new(Node {
        parent: Cell::new(None),
        children: RefCell::new(Vec::new()),
        data: DomData::Element {
            name: qual_name,
            attrs: RefCell::new(attributes),
            template_contents: Default::default(),
            mathml_annotation_xml_integration_point: false,
        },
    })
}

fn create_text(text: &str) -> Handle {
    Rc::new(Node {
        parent: Cell::new(None),
        children: RefCell::new(Vec::new()),
        data: DomData::Text {
            contents: RefCell::new(text.into()),
        },
    })
}

fn create_comment(text: &str) -> Handle {
    Rc::new(Node {
        parent: Cell::new(None),
        children: RefCell::new(Vec::new()),
        data: DomData::Comment {
            contents: text.into(),
        },
    })
}

/// Parse HTML (a full document or a body fragment) into a document tree.
pub fn from_html(html: &str) -> Result<Document, TreeError> {
    let dom = parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .one(html.as_bytes());
    let body = find_element(&dom.document, "body").ok_or(TreeError::MissingBody)?;

    let mut doc = Document::new();
    let root = doc.root();
    for child in body.children.borrow().iter() {
        import(&mut doc, root, child)?;
    }
    Ok(doc)
}

fn find_element(handle: &Handle, name: &str) -> Option<Handle> {
    if let DomData::Element { name: ref qname, .. } = handle.data {
        if qname.local.as_ref() == name {
            return Some(handle.clone());
        }
    }
    handle
        .children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, name))
}

fn import(doc: &mut Document, parent: NodeId, handle: &Handle) -> Result<(), TreeError> {
    let id = match &handle.data {
        DomData::Element { name, attrs, .. } => {
            let mut kept = Attributes::new();
            let mut provenance: Option<NodeProvenance> = None;
            for attr in attrs.borrow().iter() {
                let key = attr.name.local.as_ref();
                if key == PROVENANCE_ATTR {
                    let prov = serde_json::from_str(&attr.value)
                        .map_err(|e| TreeError::InvalidProvenance(e.to_string()))?;
                    provenance = Some(prov);
                } else {
                    kept.push(key, attr.value.to_string());
                }
            }
            let id = doc.append_element(parent, name.local.as_ref(), kept);
            if let Some(prov) = provenance {
                doc.set_provenance(id, prov);
            }
            id
        }
        DomData::Text { contents } => {
            doc.append_text(parent, contents.borrow().to_string());
            return Ok(());
        }
        DomData::Comment { contents } => {
            doc.append(parent, NodeData::Comment(contents.to_string()));
            return Ok(());
        }
        _ => return Ok(()),
    };

    for child in handle.children.borrow().iter() {
        import(doc, id, child)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        let mut doc = Document::new();
        let attrs: Attributes = vec![("rel", "mw:WikiLink"), ("href", "./Foo")]
            .into_iter()
            .collect();
        let a = doc.append_element(doc.root(), "a", attrs.clone());
        doc.append_text(a, "Foo & bar");
        let prov = doc.provenance_mut(a);
        prov.src_open = Some("[[Foo|".into());
        prov.src_close = Some("]]".into());
        prov.original_attrs = Some(attrs);
        doc
    }

    #[test]
    fn test_plain_html() {
        let html = to_html(&sample(), false).unwrap();
        assert_eq!(html, "<a rel=\"mw:WikiLink\" href=\"./Foo\">Foo &amp; bar</a>");
    }

    #[test]
    fn test_debug_html_round_trips_provenance() {
        let html = to_html(&sample(), true).unwrap();
        assert!(html.contains("data-parsoid"));

        let parsed = from_html(&html).unwrap();
        let a = parsed.children(parsed.root())[0];
        assert_eq!(parsed.attr(a, "data-parsoid"), None);
        assert_eq!(parsed.attr(a, "href"), Some("./Foo"));
        let prov = parsed.provenance(a).unwrap();
        assert_eq!(prov.src_open.as_deref(), Some("[[Foo|"));
        assert!(!parsed.is_edited(a));
        assert_eq!(parsed.text_content(a), "Foo & bar");
    }

    #[test]
    fn test_invalid_provenance_is_an_error() {
        let result = from_html("<span data-parsoid=\"{oops\">x</span>");
        assert!(matches!(result, Err(TreeError::InvalidProvenance(_))));
    }

    #[test]
    fn test_full_document_wrapper() {
        let html = to_html_document(&sample(), "A < B", false).unwrap();
        assert!(html.contains("<title>A &lt; B</title>"));
        assert!(html.contains("<body><a "));
    }
}
