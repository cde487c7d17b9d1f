//! Token types shared by the tokenizer, the transform stages and the tree builder.
//!
//! Tokens are immutable once emitted. Handlers that want a different token build a new
//! one (usually through the `with_*` helpers) and hand it back as a replacement.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// Name of the tag carried by behavior-switch tokens.
pub const BEHAVIOR_SWITCH: &str = "behavior-switch";

/// The kind of a token, used as the first half of a transform registration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenKind {
    TagOpen,
    TagClose,
    SelfClosing,
    Text,
    Comment,
    BehaviorSwitch,
    EndOfInput,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::TagOpen => "tag-open",
            TokenKind::TagClose => "tag-close",
            TokenKind::SelfClosing => "self-closing",
            TokenKind::Text => "text",
            TokenKind::Comment => "comment",
            TokenKind::BehaviorSwitch => "behavior-switch",
            TokenKind::EndOfInput => "end-of-input",
        };
        f.write_str(name)
    }
}

/// One key/value pair on a tag-like token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered attribute list. Order matters for template arguments and for the
/// behavior-switch convention of carrying the magic word in the first attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn first(&self) -> Option<&Attribute> {
        self.0.first()
    }

    /// Replace the value of an existing attribute or append a new one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|attr| attr.name == name) {
            Some(attr) => attr.value = value,
            None => self.0.push(Attribute { name, value }),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(Attribute::new(name, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| Attribute::new(name, value))
                .collect(),
        )
    }
}

/// Source metadata that travels with a token and ends up in the tree's provenance table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Raw source text this token stands for, when it differs from what the
    /// serializer would produce on its own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Free-form hints (`auto_inserted`, `generated`, `bullets`, ...).
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub hints: BTreeMap<String, String>,
}

impl Provenance {
    pub fn with_src(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            hints: BTreeMap::new(),
        }
    }

    pub fn hint(&self, key: &str) -> Option<&str> {
        self.hints.get(key).map(String::as_str)
    }

    pub fn has_hint(&self, key: &str) -> bool {
        self.hints.contains_key(key)
    }
}

/// A tag-like token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub attrs: Attributes,
    pub range: Option<Range<usize>>,
    pub prov: Provenance,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Attributes::new(),
            range: None,
            prov: Provenance::default(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.set(name, value);
        self
    }

    pub fn src(mut self, src: impl Into<String>) -> Self {
        self.prov.src = Some(src.into());
        self
    }

    pub fn hint(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.prov.hints.insert(key.into(), value.into());
        self
    }

    pub fn range(mut self, range: Range<usize>) -> Self {
        self.range = Some(range);
        self
    }
}

/// Text-like token payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextData {
    pub value: String,
    pub range: Option<Range<usize>>,
    pub prov: Provenance,
}

impl TextData {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            range: None,
            prov: Provenance::default(),
        }
    }
}

/// The lexical unit that flows between pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    TagOpen(Tag),
    TagClose(Tag),
    SelfClosing(Tag),
    Text(TextData),
    Comment(TextData),
    BehaviorSwitch(Tag),
    EndOfInput,
}

impl Token {
    pub fn text(value: impl Into<String>) -> Self {
        Token::Text(TextData::new(value))
    }

    pub fn newline() -> Self {
        Token::text("\n")
    }

    pub fn open(tag: Tag) -> Self {
        Token::TagOpen(tag)
    }

    pub fn close(name: impl Into<String>) -> Self {
        Token::TagClose(Tag::new(name))
    }

    /// Build a behavior-switch token for `word` (e.g. `NOTOC`, kept as written) found in `src`.
    pub fn behavior_switch(word: &str, src: impl Into<String>) -> Self {
        Token::BehaviorSwitch(
            Tag::new(BEHAVIOR_SWITCH)
                .attr("word", word)
                .src(src),
        )
    }

    pub fn kind(&self) -> TokenKind {
        match self {
            Token::TagOpen(_) => TokenKind::TagOpen,
            Token::TagClose(_) => TokenKind::TagClose,
            Token::SelfClosing(_) => TokenKind::SelfClosing,
            Token::Text(_) => TokenKind::Text,
            Token::Comment(_) => TokenKind::Comment,
            Token::BehaviorSwitch(_) => TokenKind::BehaviorSwitch,
            Token::EndOfInput => TokenKind::EndOfInput,
        }
    }

    /// Tag name for tag-like kinds.
    pub fn name(&self) -> Option<&str> {
        self.tag().map(|tag| tag.name.as_str())
    }

    pub fn tag(&self) -> Option<&Tag> {
        match self {
            Token::TagOpen(tag)
            | Token::TagClose(tag)
            | Token::SelfClosing(tag)
            | Token::BehaviorSwitch(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn attrs(&self) -> Option<&Attributes> {
        self.tag().map(|tag| &tag.attrs)
    }

    pub fn range(&self) -> Option<Range<usize>> {
        match self {
            Token::TagOpen(tag)
            | Token::TagClose(tag)
            | Token::SelfClosing(tag)
            | Token::BehaviorSwitch(tag) => tag.range.clone(),
            Token::Text(text) | Token::Comment(text) => text.range.clone(),
            Token::EndOfInput => None,
        }
    }

    pub fn prov(&self) -> Option<&Provenance> {
        match self {
            Token::TagOpen(tag)
            | Token::TagClose(tag)
            | Token::SelfClosing(tag)
            | Token::BehaviorSwitch(tag) => Some(&tag.prov),
            Token::Text(text) | Token::Comment(text) => Some(&text.prov),
            Token::EndOfInput => None,
        }
    }

    pub fn text_value(&self) -> Option<&str> {
        match self {
            Token::Text(text) => Some(&text.value),
            _ => None,
        }
    }

    pub fn is_newline(&self) -> bool {
        self.text_value() == Some("\n")
    }

    pub fn is_open(&self, name: &str) -> bool {
        matches!(self, Token::TagOpen(tag) if tag.name == name)
    }

    pub fn is_close(&self, name: &str) -> bool {
        matches!(self, Token::TagClose(tag) if tag.name == name)
    }

    /// Copy of this token with its source range dropped. Tokens coming out of a
    /// nested expansion carry offsets into another page's source.
    pub fn without_range(&self) -> Token {
        let mut token = self.clone();
        match &mut token {
            Token::TagOpen(tag)
            | Token::TagClose(tag)
            | Token::SelfClosing(tag)
            | Token::BehaviorSwitch(tag) => tag.range = None,
            Token::Text(text) | Token::Comment(text) => text.range = None,
            Token::EndOfInput => {}
        }
        token
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::TagOpen(tag) => write!(f, "<{}>", tag.name),
            Token::TagClose(tag) => write!(f, "</{}>", tag.name),
            Token::SelfClosing(tag) => write!(f, "<{}/>", tag.name),
            Token::Text(text) => write!(f, "{:?}", text.value),
            Token::Comment(text) => write!(f, "<!--{}-->", text.value),
            Token::BehaviorSwitch(tag) => write!(
                f,
                "__{}__",
                tag.attrs
                    .first()
                    .map(|attr| attr.value.as_str())
                    .unwrap_or_default()
            ),
            Token::EndOfInput => f.write_str("EOI"),
        }
    }
}
