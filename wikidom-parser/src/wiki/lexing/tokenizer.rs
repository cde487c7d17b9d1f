//! Construct matching over base lexemes.
//!
//! The tokenizer walks the lexeme vector once. At each bracket or brace it tries to find
//! the matching terminator (skipping over nested constructs) and emits a token for the
//! whole construct; when no terminator exists the opening character becomes text.
//! Match results are memoized per start position, so nested failures are not rescanned.
//!
//! Inner content (link text, headings, list items, external link labels) is tokenized by
//! a child tokenizer over the same source with a narrower byte range, so every token's
//! range stays absolute.

use super::lexeme::{lex, Lexeme};
use super::markup::{self, image_option};
use crate::wiki::token::{Provenance, Tag, TextData, Token};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::ops::Range;

const TARGET: &str = "wikidom::tokenizer";

static URL_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(?i:https?://|ftp://|mailto:|//)[^\s\[\]<>"]+"#).expect("valid url regex")
});

/// Whether line-start syntax (headings, list items) is recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Block,
    Inline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Construct {
    Template,
    TemplateArg,
    WikiLink,
    ExtLink,
}

#[derive(Debug, Clone)]
struct Matched {
    /// Lexeme index just past the construct.
    end: usize,
    /// Lexeme index ranges of the `|`-separated parts.
    parts: Vec<Range<usize>>,
}

/// Tokenize a full document: block mode, terminated by `EndOfInput`.
pub fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Tokenizer::new(source, 0..source.len(), Mode::Block).run();
    tokens.push(Token::EndOfInput);
    log::trace!(target: TARGET, "{} bytes -> {} tokens", source.len(), tokens.len());
    tokens
}

/// Tokenize included page content: block mode, no `EndOfInput`.
pub fn tokenize_fragment(source: &str) -> Vec<Token> {
    let tokens = Tokenizer::new(source, 0..source.len(), Mode::Block).run();
    log::trace!(target: TARGET, "fragment of {} bytes -> {} tokens", source.len(), tokens.len());
    tokens
}

/// Tokenize a snippet that is spliced mid-line, such as a template argument value.
pub fn tokenize_inline(source: &str) -> Vec<Token> {
    Tokenizer::new(source, 0..source.len(), Mode::Inline).run()
}

pub struct Tokenizer<'a> {
    source: &'a str,
    lexemes: Vec<(Lexeme, Range<usize>)>,
    mode: Mode,
    memo: HashMap<(usize, Construct), Option<Matched>>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(source: &'a str, range: Range<usize>, mode: Mode) -> Self {
        Self {
            source,
            lexemes: lex(source, range),
            mode,
            memo: HashMap::new(),
        }
    }

    pub fn run(mut self) -> Vec<Token> {
        let mut out = Vec::new();
        let mut i = 0;
        let mut line_start = self.mode == Mode::Block;

        while i < self.lexemes.len() {
            if line_start {
                line_start = false;
                if let Some(next) = self.line_construct(i, &mut out) {
                    i = next;
                    continue;
                }
            }
            if self.kind(i) == Some(Lexeme::Newline) {
                out.push(self.text_token(i..i + 1));
                line_start = self.mode == Mode::Block;
                i += 1;
                continue;
            }
            i = self.step(i, &mut out);
        }

        merge_text(out)
    }

    // ---- lexeme helpers ----

    fn kind(&self, i: usize) -> Option<Lexeme> {
        self.lexemes.get(i).map(|(lexeme, _)| *lexeme)
    }

    fn run_of(&self, i: usize, kind: Lexeme) -> usize {
        self.lexemes[i..]
            .iter()
            .take_while(|(lexeme, _)| *lexeme == kind)
            .count()
    }

    /// Byte range covered by lexemes `[from, to)`.
    fn bytes(&self, lexemes: Range<usize>) -> Range<usize> {
        if lexemes.start >= lexemes.end {
            let at = self
                .lexemes
                .get(lexemes.start)
                .map(|(_, span)| span.start)
                .or_else(|| self.lexemes.last().map(|(_, span)| span.end))
                .unwrap_or(0);
            return at..at;
        }
        self.lexemes[lexemes.start].1.start..self.lexemes[lexemes.end - 1].1.end
    }

    fn slice(&self, lexemes: Range<usize>) -> &'a str {
        let range = self.bytes(lexemes);
        &self.source[range]
    }

    fn text_token(&self, lexemes: Range<usize>) -> Token {
        let range = self.bytes(lexemes);
        Token::Text(TextData {
            value: self.source[range.clone()].to_string(),
            range: Some(range),
            prov: Default::default(),
        })
    }

    fn child(&self, range: Range<usize>) -> Vec<Token> {
        Tokenizer::new(self.source, range, Mode::Inline).run()
    }

    // ---- construct matching ----

    fn matched(&mut self, i: usize, construct: Construct) -> Option<Matched> {
        if let Some(cached) = self.memo.get(&(i, construct)) {
            return cached.clone();
        }
        let result = match construct {
            Construct::Template => self.scan_braces(i, 2),
            Construct::TemplateArg => self.scan_braces(i, 3),
            Construct::WikiLink => self.scan_wikilink(i),
            Construct::ExtLink => self.scan_extlink(i),
        };
        self.memo.insert((i, construct), result.clone());
        result
    }

    /// Try the brace constructs at `i`, preferring the three-brace form.
    fn brace_construct(&mut self, i: usize) -> Option<(Construct, Matched)> {
        let run = self.run_of(i, Lexeme::LBrace);
        if run >= 3 {
            if let Some(m) = self.matched(i, Construct::TemplateArg) {
                return Some((Construct::TemplateArg, m));
            }
        }
        if run >= 2 {
            if let Some(m) = self.matched(i, Construct::Template) {
                return Some((Construct::Template, m));
            }
        }
        None
    }

    /// Skip over a nested construct starting at `j`, if there is one.
    fn skip_nested(&mut self, j: usize) -> Option<usize> {
        match self.kind(j)? {
            Lexeme::LBrace if self.run_of(j, Lexeme::LBrace) >= 2 => {
                self.brace_construct(j).map(|(_, m)| m.end)
            }
            Lexeme::LBracket if self.run_of(j, Lexeme::LBracket) >= 2 => {
                self.matched(j, Construct::WikiLink).map(|m| m.end)
            }
            _ => None,
        }
    }

    fn scan_braces(&mut self, i: usize, width: usize) -> Option<Matched> {
        if self.run_of(i, Lexeme::LBrace) < width {
            return None;
        }
        let mut parts = Vec::new();
        let mut part_start = i + width;
        let mut j = part_start;

        while j < self.lexemes.len() {
            match self.kind(j)? {
                Lexeme::RBrace if self.run_of(j, Lexeme::RBrace) >= width => {
                    parts.push(part_start..j);
                    return Some(Matched {
                        end: j + width,
                        parts,
                    });
                }
                Lexeme::Pipe => {
                    parts.push(part_start..j);
                    j += 1;
                    part_start = j;
                }
                _ => j = self.skip_nested(j).unwrap_or(j + 1),
            }
        }
        None
    }

    fn scan_wikilink(&mut self, i: usize) -> Option<Matched> {
        if self.run_of(i, Lexeme::LBracket) < 2 {
            return None;
        }
        let mut parts = Vec::new();
        let mut part_start = i + 2;
        let mut j = part_start;

        while j < self.lexemes.len() {
            match self.kind(j)? {
                Lexeme::RBracket if self.run_of(j, Lexeme::RBracket) >= 2 => {
                    parts.push(part_start..j);
                    if self.slice(parts[0].clone()).trim().is_empty() {
                        return None;
                    }
                    return Some(Matched { end: j + 2, parts });
                }
                Lexeme::Newline if parts.is_empty() => return None,
                Lexeme::Pipe => {
                    parts.push(part_start..j);
                    j += 1;
                    part_start = j;
                }
                _ => j = self.skip_nested(j).unwrap_or(j + 1),
            }
        }
        None
    }

    /// `[url label]` on a single line. `parts` holds one range: the closing bracket index.
    fn scan_extlink(&mut self, i: usize) -> Option<Matched> {
        let start = self.lexemes.get(i)?.1.start;
        let url = URL_PREFIX.find(&self.source[start + 1..])?;
        let url_end = start + 1 + url.end();
        let mut j = i + 1;

        while j < self.lexemes.len() {
            let (lexeme, span) = self.lexemes[j].clone();
            if span.start < url_end {
                j += 1;
                continue;
            }
            match lexeme {
                Lexeme::RBracket => {
                    return Some(Matched {
                        end: j + 1,
                        parts: vec![j..j + 1],
                    })
                }
                Lexeme::Newline => return None,
                _ => j = self.skip_nested(j).unwrap_or(j + 1),
            }
        }
        None
    }

    // ---- emission ----

    fn step(&mut self, i: usize, out: &mut Vec<Token>) -> usize {
        let Some(kind) = self.kind(i) else {
            return i + 1;
        };
        match kind {
            Lexeme::LBrace => {
                if let Some((construct, m)) = self.brace_construct(i) {
                    out.push(self.brace_token(i, construct, &m));
                    return m.end;
                }
            }
            Lexeme::LBracket => {
                if self.run_of(i, Lexeme::LBracket) >= 2 {
                    if let Some(m) = self.matched(i, Construct::WikiLink) {
                        self.emit_wikilink(i, &m, out);
                        return m.end;
                    }
                } else if let Some(m) = self.matched(i, Construct::ExtLink) {
                    self.emit_extlink(i, &m, out);
                    return m.end;
                }
            }
            Lexeme::Quotes => {
                self.emit_quotes(i, out);
                return i + 1;
            }
            Lexeme::MagicWord => {
                let raw = self.slice(i..i + 1);
                let word = &raw[2..raw.len() - 2];
                if markup::is_behavior_switch(word) {
                    let mut token = Token::behavior_switch(word, raw);
                    if let Token::BehaviorSwitch(tag) = &mut token {
                        tag.range = Some(self.bytes(i..i + 1));
                    }
                    out.push(token);
                    return i + 1;
                }
            }
            Lexeme::Comment => {
                let raw = self.slice(i..i + 1);
                let inner = raw.trim_start_matches("<!--");
                let inner = inner.strip_suffix("-->").unwrap_or(inner);
                out.push(Token::Comment(TextData {
                    value: inner.to_string(),
                    range: Some(self.bytes(i..i + 1)),
                    prov: Provenance::with_src(raw),
                }));
                return i + 1;
            }
            Lexeme::HtmlOpen | Lexeme::HtmlClose => {
                if let Some(token) = self.html_token(i, kind == Lexeme::HtmlClose) {
                    out.push(token);
                    return i + 1;
                }
            }
            _ => {}
        }
        out.push(self.text_token(i..i + 1));
        i + 1
    }

    fn brace_token(&mut self, i: usize, construct: Construct, m: &Matched) -> Token {
        let raw = self.slice(i..m.end);
        let range = self.bytes(i..m.end);
        match construct {
            Construct::TemplateArg => {
                let mut tag = Tag::new("templatearg")
                    .attr("name", self.slice(m.parts[0].clone()).trim())
                    .src(raw)
                    .range(range);
                if let Some(default) = m.parts.get(1) {
                    tag.attrs.push("default", self.slice(default.clone()));
                }
                Token::SelfClosing(tag)
            }
            _ => {
                let mut tag = Tag::new("template")
                    .attr("target", self.slice(m.parts[0].clone()).trim())
                    .src(raw)
                    .range(range);
                let mut position = 0;
                for part in &m.parts[1..] {
                    match self.top_level_equals(part.clone()) {
                        Some(eq) => {
                            let name = self.slice(part.start..eq).trim();
                            let value = self.slice(eq + 1..part.end).trim();
                            tag.attrs.push(name, value);
                        }
                        None => {
                            position += 1;
                            tag.attrs.push(position.to_string(), self.slice(part.clone()));
                        }
                    }
                }
                Token::SelfClosing(tag)
            }
        }
    }

    fn top_level_equals(&mut self, part: Range<usize>) -> Option<usize> {
        let mut j = part.start;
        while j < part.end {
            if self.kind(j) == Some(Lexeme::Equals) {
                return Some(j);
            }
            j = self.skip_nested(j).unwrap_or(j + 1);
        }
        None
    }

    fn emit_wikilink(&mut self, i: usize, m: &Matched, out: &mut Vec<Token>) {
        let open_start = self.lexemes[i].1.start;
        let close = m.end - 2;
        let close_range = self.bytes(close..m.end);
        let target = self.slice(m.parts[0].clone()).trim().to_string();
        let mut open = Tag::new("wikilink").attr("target", target.as_str());

        let content: Range<usize> = if markup::is_file_target(&target) {
            open.attrs.push("file", "1");
            let options = &m.parts[1..];
            let caption = options
                .last()
                .filter(|part| image_option(self.slice((*part).clone())).is_none());
            let option_count = options.len() - usize::from(caption.is_some());
            for part in &options[..option_count] {
                open.attrs.push("option", self.slice(part.clone()).trim());
            }
            match caption {
                Some(part) => self.bytes(part.clone()),
                None => close_range.start..close_range.start,
            }
        } else if m.parts.len() == 1 {
            open.attrs.push("simple", "1");
            self.bytes(m.parts[0].clone())
        } else {
            let first = &m.parts[1];
            self.bytes(first.start..close)
        };

        let open_src = &self.source[open_start..content.start];
        out.push(Token::TagOpen(
            open.src(open_src).range(open_start..content.start),
        ));
        if !content.is_empty() {
            out.extend(self.child(content.clone()));
        }
        out.push(Token::TagClose(
            Tag::new("wikilink")
                .src(&self.source[content.end..close_range.end])
                .range(content.end..close_range.end),
        ));
    }

    fn emit_extlink(&mut self, i: usize, m: &Matched, out: &mut Vec<Token>) {
        let start = self.lexemes[i].1.start;
        let close = self.lexemes[m.parts[0].start].1.clone();
        let href_match = URL_PREFIX
            .find(&self.source[start + 1..close.start])
            .map(|found| found.end())
            .unwrap_or(0);
        let href_end = start + 1 + href_match;
        let href = &self.source[start + 1..href_end];
        let sep_len = self.source[href_end..close.start]
            .chars()
            .take_while(|c| c.is_whitespace())
            .map(char::len_utf8)
            .sum::<usize>();
        let content = href_end + sep_len..close.start;

        let mut open = Tag::new("extlink").attr("href", href);
        if content.is_empty() {
            open.attrs.push("numbered", "1");
        }
        out.push(Token::TagOpen(
            open.src(&self.source[start..content.start])
                .range(start..content.start),
        ));
        if !content.is_empty() {
            out.extend(self.child(content.clone()));
        }
        out.push(Token::TagClose(
            Tag::new("extlink")
                .src(&self.source[content.end..close.end])
                .range(content.end..close.end),
        ));
    }

    fn emit_quotes(&self, i: usize, out: &mut Vec<Token>) {
        let range = self.bytes(i..i + 1);
        let len = range.len();
        let (prefix, quote) = match len {
            1 => (1, 0),
            4 => (1, 3),
            n if n > 5 => (n - 5, 5),
            n => (0, n),
        };
        if prefix > 0 {
            let prefix_range = range.start..range.start + prefix;
            out.push(Token::Text(TextData {
                value: self.source[prefix_range.clone()].to_string(),
                range: Some(prefix_range),
                prov: Default::default(),
            }));
        }
        if quote > 0 {
            let quote_range = range.start + prefix..range.end;
            let raw = &self.source[quote_range.clone()];
            out.push(Token::SelfClosing(
                Tag::new("mw-quote")
                    .attr("value", raw)
                    .src(raw)
                    .range(quote_range),
            ));
        }
    }

    fn html_token(&self, i: usize, closing: bool) -> Option<Token> {
        let raw = self.slice(i..i + 1);
        let parsed = markup::parse_html_tag(raw)?;
        if !markup::is_allowed_tag(&parsed.name) {
            return None;
        }
        let mut tag = Tag::new(parsed.name.as_str())
            .src(raw)
            .range(self.bytes(i..i + 1));
        if closing {
            return Some(Token::TagClose(tag));
        }
        tag.attrs = parsed.attrs;
        if parsed.self_closing || markup::is_void_tag(&parsed.name) {
            Some(Token::SelfClosing(tag))
        } else {
            Some(Token::TagOpen(tag))
        }
    }

    // ---- line-start constructs ----

    /// Index of the newline ending the line that starts at `i`, or the lexeme count.
    fn line_end(&mut self, i: usize) -> usize {
        let mut j = i;
        while j < self.lexemes.len() {
            if self.kind(j) == Some(Lexeme::Newline) {
                return j;
            }
            j = self.skip_nested(j).unwrap_or(j + 1);
        }
        self.lexemes.len()
    }

    fn line_construct(&mut self, i: usize, out: &mut Vec<Token>) -> Option<usize> {
        match self.kind(i)? {
            Lexeme::Equals => self.heading(i, out),
            Lexeme::ListMarker => Some(self.list_item(i, out)),
            _ => None,
        }
    }

    fn heading(&mut self, i: usize, out: &mut Vec<Token>) -> Option<usize> {
        let end = self.line_end(i);
        let leading = self.run_of(i, Lexeme::Equals);

        let mut last = end;
        let mut trailing_ws = 0..0;
        if last > i && self.kind(last - 1) == Some(Lexeme::Text) {
            let text = self.slice(last - 1..last);
            if text.trim().is_empty() {
                trailing_ws = self.bytes(last - 1..last);
                last -= 1;
            }
        }
        let mut trailing = 0;
        while last > i + leading && self.kind(last - 1) == Some(Lexeme::Equals) {
            trailing += 1;
            last -= 1;
        }
        if trailing == 0 {
            return None;
        }

        let level = leading.min(trailing).min(6);
        let line_start = self.lexemes[i].1.start;
        let content_start = line_start + level;
        let close_start = self.lexemes[last + trailing - level].1.start;
        if content_start >= close_start {
            return None;
        }
        let close_end = if trailing_ws.is_empty() {
            close_start + level
        } else {
            trailing_ws.end
        };
        let name = format!("h{}", level);

        out.push(Token::TagOpen(
            Tag::new(name.as_str())
                .src("=".repeat(level))
                .range(line_start..content_start),
        ));
        out.extend(self.child(content_start..close_start));
        out.push(Token::TagClose(
            Tag::new(name.as_str())
                .src(&self.source[close_start..close_end])
                .range(close_start..close_end),
        ));
        Some(end)
    }

    fn list_item(&mut self, i: usize, out: &mut Vec<Token>) -> usize {
        let end = self.line_end(i);
        let depth = self.run_of(i, Lexeme::ListMarker).min(end - i);
        let bullets = self.slice(i..i + depth);
        let bullet_range = self.bytes(i..i + depth);
        let content = bullet_range.end..self.bytes(i..end).end;

        out.push(Token::TagOpen(
            Tag::new("listItem")
                .attr("bullets", bullets)
                .src(bullets)
                .range(bullet_range),
        ));
        if !content.is_empty() {
            out.extend(self.child(content.clone()));
        }
        out.push(Token::TagClose(
            Tag::new("listItem").src("").range(content.end..content.end),
        ));
        end
    }
}

/// Collapse runs of adjacent plain text (newlines excluded) into single tokens.
fn merge_text(tokens: Vec<Token>) -> Vec<Token> {
    let mut merged: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        if let (Some(Token::Text(prev)), Token::Text(next)) = (merged.last_mut(), &token) {
            let mergeable = prev.value != "\n"
                && next.value != "\n"
                && prev.prov.src.is_none()
                && next.prov.src.is_none();
            if mergeable {
                prev.value.push_str(&next.value);
                prev.range = match (prev.range.take(), &next.range) {
                    (Some(a), Some(b)) if a.end == b.start => Some(a.start..b.end),
                    _ => None,
                };
                continue;
            }
        }
        merged.push(token);
    }
    merged
}
