//! Bold and italic balancing.
//!
//! `mw-quote` markers toggle `i` (`''`), `b` (`'''`) or both (`'''''`). Formatting never
//! crosses a line end or the end of the element it was opened in; both auto-close every
//! open quote. Auto-inserted tags carry empty source, so the quotes the author actually
//! wrote are the only ones that come back out of the serializer.

use crate::wiki::token::{Tag, Token};
use crate::wiki::transforms::{
    HandlerId, TokenHandler, TokenMatch, TokenTransformManager, TransformContext,
    TransformError, TransformOutcome,
};
use std::ops::Range;

#[derive(Debug, Clone)]
struct OpenQuote {
    tag: &'static str,
    /// Element nesting depth at the point the quote opened.
    depth: usize,
}

#[derive(Default)]
pub struct QuoteHandler {
    open: Vec<OpenQuote>,
    depth: usize,
}

impl QuoteHandler {
    pub const RANK: f64 = 2.1;

    pub fn register(manager: &mut TokenTransformManager) -> Result<HandlerId, TransformError> {
        let id = manager.add_handler(Box::<Self>::default());
        manager.add_transform(id, Self::RANK, TokenMatch::Any, None)?;
        Ok(id)
    }

    fn is_open(&self, tag: &str) -> bool {
        self.open.iter().any(|quote| quote.tag == tag)
    }

    fn push(
        &mut self,
        tag: &'static str,
        src: &str,
        range: Option<Range<usize>>,
        out: &mut Vec<Token>,
    ) {
        self.open.push(OpenQuote {
            tag,
            depth: self.depth,
        });
        let mut open = Tag::new(tag).src(src);
        open.range = range;
        out.push(Token::TagOpen(open));
    }

    /// Close `tag`, closing and then reopening anything opened after it.
    fn close(
        &mut self,
        tag: &str,
        src: &str,
        range: Option<Range<usize>>,
        out: &mut Vec<Token>,
    ) {
        let Some(index) = self.open.iter().rposition(|quote| quote.tag == tag) else {
            return;
        };
        let above = self.open.split_off(index + 1);
        for quote in above.iter().rev() {
            out.push(auto_close(quote.tag));
        }
        self.open.pop();
        let mut close = Tag::new(tag).src(src);
        close.range = range;
        out.push(Token::TagClose(close));
        for quote in above {
            out.push(Token::TagOpen(
                Tag::new(quote.tag).src("").hint("auto_inserted_start", "1"),
            ));
            self.open.push(quote);
        }
    }

    fn toggle(
        &mut self,
        tag: &'static str,
        src: &str,
        range: Option<Range<usize>>,
        out: &mut Vec<Token>,
    ) {
        if self.is_open(tag) {
            self.close(tag, src, range, out);
        } else {
            self.push(tag, src, range, out);
        }
    }

    fn bold_italic(&mut self, src: &str, range: Option<Range<usize>>, out: &mut Vec<Token>) {
        match (self.is_open("i"), self.is_open("b")) {
            (true, true) => {
                let inner = self.open.last().map(|quote| quote.tag).unwrap_or("b");
                let outer = if inner == "b" { "i" } else { "b" };
                self.close(inner, src, range, out);
                self.close(outer, "", None, out);
            }
            (true, false) => {
                self.close("i", "''", None, out);
                self.push("b", "'''", None, out);
            }
            (false, true) => {
                self.close("b", "'''", None, out);
                self.push("i", "''", None, out);
            }
            (false, false) => {
                self.push("i", src, range, out);
                self.push("b", "", None, out);
            }
        }
    }

    /// Close quotes opened at or below `depth`, innermost first.
    fn close_from(&mut self, depth: usize, out: &mut Vec<Token>) {
        while self.open.last().map(|quote| quote.depth >= depth).unwrap_or(false) {
            if let Some(quote) = self.open.pop() {
                out.push(auto_close(quote.tag));
            }
        }
    }
}

fn auto_close(tag: &str) -> Token {
    Token::TagClose(Tag::new(tag).src("").hint("auto_inserted_end", "1"))
}

impl TokenHandler for QuoteHandler {
    fn name(&self) -> &'static str {
        "quotes"
    }

    fn on_token(
        &mut self,
        token: &Token,
        _ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        match token {
            Token::SelfClosing(tag) if tag.name == "mw-quote" => {
                let value = tag.attrs.get("value").unwrap_or("");
                let src = tag.prov.src.as_deref().unwrap_or(value);
                let range = tag.range.clone();
                let mut out = Vec::new();
                match value.len() {
                    2 => self.toggle("i", src, range, &mut out),
                    3 => self.toggle("b", src, range, &mut out),
                    5 => self.bold_italic(src, range, &mut out),
                    _ => return Ok(TransformOutcome::Replace(vec![Token::text(src)])),
                }
                Ok(TransformOutcome::Replace(out))
            }
            Token::TagOpen(_) => {
                self.depth += 1;
                Ok(TransformOutcome::Unchanged)
            }
            Token::TagClose(_) => {
                if self.open.is_empty() {
                    self.depth = self.depth.saturating_sub(1);
                    return Ok(TransformOutcome::Unchanged);
                }
                let mut out = Vec::new();
                self.close_from(self.depth, &mut out);
                self.depth = self.depth.saturating_sub(1);
                if out.is_empty() {
                    return Ok(TransformOutcome::Unchanged);
                }
                out.push(token.clone());
                Ok(TransformOutcome::Replace(out))
            }
            Token::EndOfInput => {
                if self.open.is_empty() {
                    return Ok(TransformOutcome::Unchanged);
                }
                let mut out = Vec::new();
                self.close_from(0, &mut out);
                out.push(Token::EndOfInput);
                Ok(TransformOutcome::Replace(out))
            }
            token if token.is_newline() && !self.open.is_empty() => {
                let mut out = Vec::new();
                self.close_from(0, &mut out);
                out.push(token.clone());
                Ok(TransformOutcome::Replace(out))
            }
            _ => Ok(TransformOutcome::Unchanged),
        }
    }
}
