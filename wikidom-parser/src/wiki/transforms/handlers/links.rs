//! Wiki links, external links and file links.
//!
//! The tokenizer emits `wikilink`/`extlink` open and close tokens around the link
//! content. This handler turns them into anchors, or into a `figure` for file links,
//! keeping the tokenizer's source so the serializer can write the link back untouched.
//! Bare URLs inside plain text become `mw:ExtLink/URL` anchors.

use super::{generated_close, generated_open};
use crate::wiki::lexing::markup::{image_option, ImageOption};
use crate::wiki::title::Title;
use crate::wiki::token::{Tag, TextData, Token, TokenKind};
use crate::wiki::transforms::{
    HandlerId, TokenHandler, TokenTransformManager, TransformContext, TransformError,
    TransformOutcome,
};
use once_cell::sync::Lazy;
use regex::Regex;

static BARE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i:https?://|ftp://)[^\s\[\]<>"{}|]+[^\s\[\]<>"{}|.,;:!?)']"#)
        .expect("valid bare url regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
    Anchor,
    Figure { caption: bool },
}

#[derive(Default)]
pub struct LinkHandler {
    stack: Vec<Open>,
    /// Anchors currently open, whoever produced them.
    anchors: usize,
}

impl LinkHandler {
    pub const RANK: f64 = 1.15;

    pub fn register(manager: &mut TokenTransformManager) -> Result<HandlerId, TransformError> {
        let id = manager.add_handler(Box::<Self>::default());
        for name in ["wikilink", "extlink"] {
            manager.add_transform(id, Self::RANK, TokenKind::TagOpen, Some(name))?;
            manager.add_transform(id, Self::RANK, TokenKind::TagClose, Some(name))?;
        }
        manager.add_transform(id, Self::RANK, TokenKind::TagOpen, Some("a"))?;
        manager.add_transform(id, Self::RANK, TokenKind::TagClose, Some("a"))?;
        manager.add_transform(id, Self::RANK, TokenKind::Text, None)?;
        Ok(id)
    }
}

/// Copy source metadata from the tokenizer's tag onto a rewritten tag.
fn carry(from: &Tag, mut to: Tag) -> Tag {
    to.range = from.range.clone();
    to.prov = from.prov.clone();
    to
}

fn wikilink(tag: &Tag, ctx: &TransformContext<'_>) -> Token {
    let target = tag.attrs.get("target").unwrap_or("");
    let title = Title::parse(target);
    let anchor = Tag::new("a")
        .attr("rel", "mw:WikiLink")
        .attr("href", ctx.env.article_href(&title))
        .attr("title", title.full_text());
    Token::TagOpen(carry(tag, anchor))
}

fn extlink(tag: &Tag) -> Token {
    let href = tag.attrs.get("href").unwrap_or("");
    let anchor = if tag.attrs.get("numbered").is_some() {
        Tag::new("a")
            .attr("rel", "mw:ExtLink/Numbered")
            .attr("class", "external autonumber")
            .attr("href", href)
    } else {
        Tag::new("a")
            .attr("rel", "mw:ExtLink")
            .attr("class", "external text")
            .attr("href", href)
    };
    Token::TagOpen(carry(tag, anchor))
}

struct FileLink {
    format: Option<&'static str>,
    align: Option<&'static str>,
    width: Option<u32>,
    height: Option<u32>,
    alt: Option<String>,
    border: bool,
}

impl FileLink {
    fn from_options<'a>(options: impl Iterator<Item = &'a str>) -> Self {
        let mut link = Self {
            format: None,
            align: None,
            width: None,
            height: None,
            alt: None,
            border: false,
        };
        for raw in options {
            match image_option(raw) {
                Some(ImageOption::Format(format)) => link.format = Some(format),
                Some(ImageOption::Align(align)) => link.align = Some(align),
                Some(ImageOption::Size { width, height }) => {
                    link.width = width;
                    link.height = height;
                }
                Some(ImageOption::Border) => link.border = true,
                Some(ImageOption::Keyed(key, value)) if key == "alt" => link.alt = Some(value),
                _ => {}
            }
        }
        link
    }

    fn rdfa_type(&self) -> &'static str {
        match self.format {
            Some("thumb") => "mw:Image/Thumb",
            Some("frame") => "mw:Image/Frame",
            Some("frameless") => "mw:Image/Frameless",
            _ => "mw:Image",
        }
    }

    fn classes(&self) -> Option<String> {
        let mut classes = Vec::new();
        if let Some(align) = self.align {
            classes.push(format!("mw-halign-{}", align));
        }
        let sized = self.width.is_some() || self.height.is_some();
        if self.format == Some("thumb") && !sized {
            classes.push("mw-default-size".to_string());
        }
        if self.border {
            classes.push("mw-image-border".to_string());
        }
        (!classes.is_empty()).then(|| classes.join(" "))
    }
}

fn file_link(tag: &Tag, ctx: &TransformContext<'_>, caption: bool) -> Vec<Token> {
    let target = tag.attrs.get("target").unwrap_or("");
    let title = Title::parse(target);
    let link = FileLink::from_options(
        tag.attrs
            .iter()
            .filter(|attr| attr.name == "option")
            .map(|attr| attr.value.as_str()),
    );

    let mut figure = Tag::new("figure").attr("typeof", link.rdfa_type());
    if let Some(classes) = link.classes() {
        figure.attrs.set("class", classes);
    }

    let resource = ctx.env.article_href(&title);
    let mut img = generated_open("img")
        .attr("resource", resource.as_str())
        .attr("src", ctx.env.upload_url(title.text()));
    if let Some(width) = link.width {
        img.attrs.set("width", width.to_string());
    }
    if let Some(height) = link.height {
        img.attrs.set("height", height.to_string());
    }
    if let Some(alt) = &link.alt {
        img.attrs.set("alt", alt.as_str());
    }

    let mut out = vec![
        Token::TagOpen(carry(tag, figure)),
        Token::TagOpen(generated_open("a").attr("href", resource)),
        Token::SelfClosing(img),
        generated_close("a"),
    ];
    if caption {
        out.push(Token::TagOpen(generated_open("figcaption")));
    }
    out
}

/// Split plain text around bare URLs.
fn autolink(text: &TextData) -> Option<Vec<Token>> {
    if !BARE_URL.is_match(&text.value) {
        return None;
    }
    let mut out = Vec::new();
    let mut last = 0;
    let offset = |at: usize| text.range.as_ref().map(|r| r.start + at);

    let piece = |from: usize, to: usize, out: &mut Vec<Token>| {
        if from < to {
            let mut part = TextData::new(&text.value[from..to]);
            part.range = offset(from).zip(offset(to)).map(|(s, e)| s..e);
            out.push(Token::Text(part));
        }
    };

    for found in BARE_URL.find_iter(&text.value) {
        piece(last, found.start(), &mut out);
        out.push(Token::TagOpen(
            generated_open("a")
                .attr("rel", "mw:ExtLink/URL")
                .attr("class", "external free")
                .attr("href", found.as_str()),
        ));
        piece(found.start(), found.end(), &mut out);
        out.push(generated_close("a"));
        last = found.end();
    }
    piece(last, text.value.len(), &mut out);
    Some(out)
}

impl TokenHandler for LinkHandler {
    fn name(&self) -> &'static str {
        "links"
    }

    fn on_token(
        &mut self,
        token: &Token,
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        match token {
            Token::TagOpen(tag) if tag.name == "wikilink" => {
                if tag.attrs.get("file").is_some() {
                    // A caption exists when the open source stops short of `]]`.
                    let caption = ctx
                        .source_slice(token.range())
                        .or(tag.prov.src.as_deref())
                        .map(|src| src.ends_with('|'))
                        .unwrap_or(false);
                    self.stack.push(Open::Figure { caption });
                    return Ok(TransformOutcome::Replace(file_link(tag, ctx, caption)));
                }
                self.stack.push(Open::Anchor);
                Ok(TransformOutcome::Replace(vec![wikilink(tag, ctx)]))
            }
            Token::TagOpen(tag) if tag.name == "extlink" => {
                self.stack.push(Open::Anchor);
                Ok(TransformOutcome::Replace(vec![extlink(tag)]))
            }
            Token::TagOpen(tag) if tag.name == "a" => {
                self.anchors += 1;
                Ok(TransformOutcome::Unchanged)
            }
            Token::TagClose(tag) if tag.name == "a" => {
                self.anchors = self.anchors.saturating_sub(1);
                Ok(TransformOutcome::Unchanged)
            }
            Token::TagClose(tag) => {
                let replacement = match self.stack.pop() {
                    Some(Open::Figure { caption }) => {
                        let mut out = Vec::new();
                        if caption {
                            out.push(generated_close("figcaption"));
                        }
                        out.push(Token::TagClose(carry(tag, Tag::new("figure"))));
                        out
                    }
                    _ => vec![Token::TagClose(carry(tag, Tag::new("a")))],
                };
                Ok(TransformOutcome::Replace(replacement))
            }
            Token::Text(text) if self.stack.is_empty() && self.anchors == 0 => {
                Ok(match autolink(text) {
                    Some(tokens) => TransformOutcome::Replace(tokens),
                    None => TransformOutcome::Unchanged,
                })
            }
            _ => Ok(TransformOutcome::Unchanged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::env::{EnvOptions, Environment};
    use crate::wiki::lexing::tokenize_inline;
    use crate::wiki::transforms::{Frame, NoExpansion};

    async fn run(source: &str) -> Vec<Token> {
        let mut manager = TokenTransformManager::new("expansion", 1.0..2.0);
        LinkHandler::register(&mut manager).unwrap();
        let mut env = Environment::new(EnvOptions::default());
        manager
            .apply_transforms(
                tokenize_inline(source),
                &mut env,
                &Frame::page(),
                source,
                &NoExpansion,
            )
            .await
    }

    #[tokio::test]
    async fn test_wikilink_becomes_anchor_with_source() {
        let out = run("[[main_page|home]]").await;
        let anchor = out[0].tag().unwrap();
        assert_eq!(anchor.name, "a");
        assert_eq!(anchor.attrs.get("rel"), Some("mw:WikiLink"));
        assert_eq!(anchor.attrs.get("href"), Some("./Main_page"));
        assert_eq!(anchor.prov.src.as_deref(), Some("[[main_page|"));
        assert_eq!(out[1].text_value(), Some("home"));
        assert!(out[2].is_close("a"));
        assert_eq!(out[2].prov().unwrap().src.as_deref(), Some("]]"));
    }

    #[tokio::test]
    async fn test_external_links() {
        let out = run("[http://example.org site] [http://x.org]").await;
        assert_eq!(out[0].attrs().unwrap().get("rel"), Some("mw:ExtLink"));
        let numbered = out.iter().filter(|t| t.is_open("a")).nth(1).unwrap();
        assert_eq!(
            numbered.attrs().unwrap().get("rel"),
            Some("mw:ExtLink/Numbered")
        );
    }

    #[tokio::test]
    async fn test_bare_url_is_linked() {
        let out = run("see https://example.org/x. now").await;
        assert_eq!(out[0].text_value(), Some("see "));
        assert_eq!(
            out[1].attrs().unwrap().get("href"),
            Some("https://example.org/x")
        );
        assert_eq!(out[2].text_value(), Some("https://example.org/x"));
        assert!(out[3].is_close("a"));
        assert_eq!(out[4].text_value(), Some(". now"));
    }

    #[tokio::test]
    async fn test_thumb_file_link_becomes_figure() {
        let out = run("[[File:Cat.png|thumb|left|A cat]]").await;
        let figure = out[0].tag().unwrap();
        assert_eq!(figure.name, "figure");
        assert_eq!(figure.attrs.get("typeof"), Some("mw:Image/Thumb"));
        assert_eq!(
            figure.attrs.get("class"),
            Some("mw-halign-left mw-default-size")
        );
        let img = out.iter().find(|t| t.name() == Some("img")).unwrap();
        assert_eq!(img.attrs().unwrap().get("resource"), Some("./File:Cat.png"));
        assert!(out.iter().any(|t| t.is_open("figcaption")));
        assert!(out.last().unwrap().is_close("figure"));
        assert_eq!(out.last().unwrap().prov().unwrap().src.as_deref(), Some("]]"));
    }

    #[tokio::test]
    async fn test_sized_file_link_without_caption() {
        let out = run("[[File:Cat.png|frame|120px]]").await;
        let figure = out[0].tag().unwrap();
        assert_eq!(figure.attrs.get("typeof"), Some("mw:Image/Frame"));
        assert_eq!(figure.attrs.get("class"), None);
        let img = out.iter().find(|t| t.name() == Some("img")).unwrap();
        assert_eq!(img.attrs().unwrap().get("width"), Some("120"));
        assert!(!out.iter().any(|t| t.is_open("figcaption")));
    }
}
