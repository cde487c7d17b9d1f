//! `<onlyinclude>`, `<includeonly>` and `<noinclude>`.
//!
//! When a page is viewed directly the tags become marker metas that carry their source,
//! and `<includeonly>` content is folded into its marker. When the page is transcluded the
//! tags vanish and the content they guard is kept or dropped.

use crate::wiki::token::{Tag, Token, TokenKind};
use crate::wiki::transforms::{
    HandlerId, TokenHandler, TokenMatch, TokenTransformManager, TransformContext,
    TransformError, TransformOutcome,
};

fn include_meta(kind: &str, src: impl Into<String>, token: &Token) -> Token {
    let mut tag = Tag::new("meta")
        .attr("typeof", format!("mw:Includes/{}", kind))
        .src(src)
        .hint("opaque", "1");
    tag.range = token.range();
    Token::SelfClosing(tag)
}

fn token_src(token: &Token) -> String {
    token
        .prov()
        .and_then(|prov| prov.src.clone())
        .or_else(|| token.text_value().map(str::to_string))
        .unwrap_or_default()
}

/// Keeps only `<onlyinclude>` content when transcluding a page that has any.
#[derive(Default)]
pub struct OnlyIncludeHandler {
    filtering: Option<bool>,
    inside: bool,
}

impl OnlyIncludeHandler {
    pub const RANK: f64 = 0.01;

    pub fn register(manager: &mut TokenTransformManager) -> Result<HandlerId, TransformError> {
        let id = manager.add_handler(Box::<Self>::default());
        manager.add_transform(id, Self::RANK, TokenMatch::Any, None)?;
        Ok(id)
    }
}

impl TokenHandler for OnlyIncludeHandler {
    fn name(&self) -> &'static str {
        "onlyinclude"
    }

    fn on_token(
        &mut self,
        token: &Token,
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        if !ctx.frame.is_inclusion() {
            return Ok(match token {
                Token::TagOpen(tag) if tag.name == "onlyinclude" => TransformOutcome::Replace(
                    vec![include_meta("OnlyInclude", token_src(token), token)],
                ),
                Token::TagClose(tag) if tag.name == "onlyinclude" => TransformOutcome::Replace(
                    vec![include_meta("OnlyInclude/End", token_src(token), token)],
                ),
                _ => TransformOutcome::Unchanged,
            });
        }

        let filtering = *self
            .filtering
            .get_or_insert_with(|| ctx.source.to_ascii_lowercase().contains("<onlyinclude>"));
        match token {
            Token::TagOpen(tag) if tag.name == "onlyinclude" => {
                self.inside = true;
                Ok(TransformOutcome::drop())
            }
            Token::TagClose(tag) if tag.name == "onlyinclude" => {
                self.inside = false;
                Ok(TransformOutcome::drop())
            }
            Token::EndOfInput => Ok(TransformOutcome::Unchanged),
            _ if filtering && !self.inside => Ok(TransformOutcome::drop()),
            _ => Ok(TransformOutcome::Unchanged),
        }
    }
}

/// Drops `<includeonly>` content on direct view, unwraps it when transcluded.
#[derive(Default)]
pub struct IncludeOnlyHandler {
    skipping: Option<Skipped>,
}

struct Skipped {
    start: Option<usize>,
    collected: String,
}

impl IncludeOnlyHandler {
    pub const RANK: f64 = 0.02;

    pub fn register(manager: &mut TokenTransformManager) -> Result<HandlerId, TransformError> {
        let id = manager.add_handler(Box::<Self>::default());
        manager.add_transform(id, Self::RANK, TokenMatch::Any, None)?;
        Ok(id)
    }
}

impl TokenHandler for IncludeOnlyHandler {
    fn name(&self) -> &'static str {
        "includeonly"
    }

    fn on_token(
        &mut self,
        token: &Token,
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        let is_tag = token.name() == Some("includeonly");

        if ctx.frame.is_inclusion() {
            return Ok(if is_tag {
                TransformOutcome::drop()
            } else {
                TransformOutcome::Unchanged
            });
        }

        if let Some(skipped) = self.skipping.as_mut() {
            match token {
                Token::TagClose(_) if is_tag => {
                    let src = match (skipped.start, token.range()) {
                        (Some(start), Some(end)) => ctx
                            .source
                            .get(start..end.end)
                            .map(str::to_string)
                            .unwrap_or_else(|| format!("{}{}", skipped.collected, token_src(token))),
                        _ => format!("{}{}", skipped.collected, token_src(token)),
                    };
                    self.skipping = None;
                    return Ok(TransformOutcome::Replace(vec![include_meta(
                        "IncludeOnly",
                        src,
                        token,
                    )]));
                }
                Token::EndOfInput => {
                    let src = match skipped.start {
                        Some(start) => ctx.source.get(start..).unwrap_or("").to_string(),
                        None => skipped.collected.clone(),
                    };
                    self.skipping = None;
                    return Ok(TransformOutcome::Replace(vec![
                        include_meta("IncludeOnly", src, token),
                        Token::EndOfInput,
                    ]));
                }
                _ => {
                    skipped.collected.push_str(&token_src(token));
                    return Ok(TransformOutcome::drop());
                }
            }
        }

        match token.kind() {
            TokenKind::TagOpen if is_tag => {
                self.skipping = Some(Skipped {
                    start: token.range().map(|r| r.start),
                    collected: token_src(token),
                });
                Ok(TransformOutcome::drop())
            }
            TokenKind::SelfClosing if is_tag => Ok(TransformOutcome::Replace(vec![include_meta(
                "IncludeOnly",
                token_src(token),
                token,
            )])),
            _ => Ok(TransformOutcome::Unchanged),
        }
    }
}

/// Unwraps `<noinclude>` on direct view, drops its content when transcluded.
#[derive(Default)]
pub struct NoIncludeHandler {
    depth: usize,
}

impl NoIncludeHandler {
    pub const RANK: f64 = 0.03;

    pub fn register(manager: &mut TokenTransformManager) -> Result<HandlerId, TransformError> {
        let id = manager.add_handler(Box::<Self>::default());
        manager.add_transform(id, Self::RANK, TokenMatch::Any, None)?;
        Ok(id)
    }
}

impl TokenHandler for NoIncludeHandler {
    fn name(&self) -> &'static str {
        "noinclude"
    }

    fn on_token(
        &mut self,
        token: &Token,
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        let is_tag = token.name() == Some("noinclude");

        if !ctx.frame.is_inclusion() {
            return Ok(match token {
                Token::TagOpen(_) | Token::SelfClosing(_) if is_tag => TransformOutcome::Replace(
                    vec![include_meta("NoInclude", token_src(token), token)],
                ),
                Token::TagClose(_) if is_tag => TransformOutcome::Replace(vec![include_meta(
                    "NoInclude/End",
                    token_src(token),
                    token,
                )]),
                _ => TransformOutcome::Unchanged,
            });
        }

        match token {
            Token::TagOpen(_) if is_tag => {
                self.depth += 1;
                Ok(TransformOutcome::drop())
            }
            Token::TagClose(_) if is_tag => {
                self.depth = self.depth.saturating_sub(1);
                Ok(TransformOutcome::drop())
            }
            Token::SelfClosing(_) if is_tag => Ok(TransformOutcome::drop()),
            Token::EndOfInput => Ok(TransformOutcome::Unchanged),
            _ if self.depth > 0 => Ok(TransformOutcome::drop()),
            _ => Ok(TransformOutcome::Unchanged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::env::{EnvOptions, Environment};
    use crate::wiki::lexing::{tokenize, tokenize_fragment};
    use crate::wiki::transforms::{handlers, Frame, NoExpansion};
    use std::collections::BTreeMap;

    async fn run(source: &str, frame: Frame) -> Vec<Token> {
        let mut manager = TokenTransformManager::new("input", 0.0..1.0);
        handlers::register_sync_input(&mut manager).unwrap();
        let mut env = Environment::new(EnvOptions::default());
        let tokens = if frame.is_inclusion() {
            tokenize_fragment(source)
        } else {
            tokenize(source)
        };
        manager
            .apply_transforms(tokens, &mut env, &frame, source, &NoExpansion)
            .await
    }

    fn texts(tokens: &[Token]) -> String {
        tokens.iter().filter_map(|t| t.text_value()).collect()
    }

    fn inclusion() -> Frame {
        Frame::template("Template:T", BTreeMap::new())
    }

    #[tokio::test]
    async fn test_page_view_folds_includeonly_into_marker() {
        let source = "a<includeonly>hidden</includeonly>b";
        let out = run(source, Frame::page()).await;
        assert_eq!(texts(&out), "ab");
        let meta = out.iter().find(|t| t.name() == Some("meta")).unwrap();
        assert_eq!(
            meta.prov().unwrap().src.as_deref(),
            Some("<includeonly>hidden</includeonly>")
        );
    }

    #[tokio::test]
    async fn test_page_view_keeps_noinclude_content() {
        let out = run("a<noinclude>b</noinclude>c", Frame::page()).await;
        assert_eq!(texts(&out), "abc");
        let metas: Vec<_> = out
            .iter()
            .filter_map(|t| t.attrs().and_then(|a| a.get("typeof")))
            .collect();
        assert_eq!(
            metas,
            vec!["mw:Includes/NoInclude", "mw:Includes/NoInclude/End"]
        );
    }

    #[tokio::test]
    async fn test_inclusion_drops_noinclude_and_unwraps_includeonly() {
        let out = run(
            "a<noinclude>b</noinclude><includeonly>c</includeonly>",
            inclusion(),
        )
        .await;
        assert_eq!(texts(&out), "ac");
        assert!(out.iter().all(|t| t.name().is_none()));
    }

    #[tokio::test]
    async fn test_inclusion_with_onlyinclude_keeps_only_that_content() {
        let out = run(
            "skip<onlyinclude>keep</onlyinclude>skip<onlyinclude>!</onlyinclude>",
            inclusion(),
        )
        .await;
        assert_eq!(texts(&out), "keep!");
    }
}
