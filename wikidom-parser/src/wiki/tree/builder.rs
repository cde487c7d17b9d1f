//! Token stream to document tree.
//!
//! Open tags push onto a stack of open elements and close tags pop it. Nesting errors
//! are recovered, never fatal:
//!
//! - A close tag whose element is not on top closes the elements above it first; those
//!   are marked `auto_inserted_end`.
//! - A close tag with no open element to match becomes text when it has source, and is
//!   dropped otherwise.
//! - Elements still open at the end of input are closed automatically.

use super::{Document, NodeData, NodeId, NodeProvenance};
use crate::wiki::env::{DiagnosticKind, Environment};
use crate::wiki::lexing::markup::is_void_tag;
use crate::wiki::token::{Tag, Token};

const TARGET: &str = "wikidom::pipeline";

pub struct TreeBuilder {
    doc: Document,
    open: Vec<NodeId>,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        let doc = Document::new();
        let root = doc.root();
        Self {
            doc,
            open: vec![root],
        }
    }

    /// Build a document from a complete token stream.
    pub fn build(tokens: Vec<Token>, env: &mut Environment) -> Document {
        let mut builder = Self::new();
        for token in tokens {
            if builder.push(token, env) {
                break;
            }
        }
        builder.finish()
    }

    fn current(&self) -> NodeId {
        self.open.last().copied().unwrap_or_else(|| self.doc.root())
    }

    fn element(&mut self, tag: Tag) -> NodeId {
        let parent = self.current();
        let mut prov = NodeProvenance::from_token(&tag.prov, tag.range.clone());
        prov.original_attrs = Some(tag.attrs.clone());
        let id = self.doc.append(
            parent,
            NodeData::Element {
                name: tag.name,
                attrs: tag.attrs,
            },
        );
        self.doc.set_provenance(id, prov);
        id
    }

    /// Feed one token. Returns `true` once end of input has been reached.
    pub fn push(&mut self, token: Token, env: &mut Environment) -> bool {
        match token {
            Token::TagOpen(tag) => {
                let void = is_void_tag(&tag.name);
                let id = self.element(tag);
                if !void {
                    self.open.push(id);
                }
            }
            Token::SelfClosing(tag) => {
                self.element(tag);
            }
            Token::TagClose(tag) => self.close(tag, env),
            Token::Text(text) => {
                let parent = self.current();
                let id = self.doc.append(parent, NodeData::Text(text.value));
                if text.range.is_some() {
                    self.doc.provenance_mut(id).range = text.range;
                }
            }
            Token::Comment(comment) => {
                let parent = self.current();
                let id = self.doc.append(parent, NodeData::Comment(comment.value));
                let prov = NodeProvenance::from_token(&comment.prov, comment.range);
                self.doc.set_provenance(id, prov);
            }
            Token::BehaviorSwitch(tag) => {
                log::debug!(target: TARGET, "unconsumed behavior switch {:?}", tag.prov.src);
            }
            Token::EndOfInput => return true,
        }
        false
    }

    fn close(&mut self, tag: Tag, env: &mut Environment) {
        let matching = self
            .open
            .iter()
            .skip(1)
            .rposition(|id| self.doc.name(*id) == Some(tag.name.as_str()))
            .map(|position| position + 1);

        let Some(position) = matching else {
            let src = tag.prov.src.clone().unwrap_or_default();
            env.report(
                DiagnosticKind::Nesting,
                format!("close tag </{}> without an open element", tag.name),
            );
            if !src.is_empty() {
                let parent = self.current();
                let id = self.doc.append(parent, NodeData::Text(src));
                self.doc.provenance_mut(id).range = tag.range;
            }
            return;
        };

        while self.open.len() > position + 1 {
            if let Some(id) = self.open.pop() {
                env.report(
                    DiagnosticKind::Nesting,
                    format!(
                        "<{}> closed implicitly by </{}>",
                        self.doc.name(id).unwrap_or(""),
                        tag.name
                    ),
                );
                self.doc.provenance_mut(id).auto_inserted_end = true;
            }
        }

        if let Some(id) = self.open.pop() {
            let prov = self.doc.provenance_mut(id);
            if tag.prov.has_hint("auto_inserted_end") {
                prov.auto_inserted_end = true;
            }
            prov.src_close = tag.prov.src;
            if let (Some(open), Some(close)) = (prov.range.clone(), tag.range) {
                prov.range = Some(open.start..close.end);
            }
        }
    }

    /// Close whatever is still open and hand back the document.
    pub fn finish(mut self) -> Document {
        while self.open.len() > 1 {
            if let Some(id) = self.open.pop() {
                self.doc.provenance_mut(id).auto_inserted_end = true;
            }
        }
        self.doc
    }
}
