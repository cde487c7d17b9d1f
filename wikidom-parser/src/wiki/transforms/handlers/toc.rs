//! Table-of-contents placeholder.
//!
//! A `mw:Placeholder/TOC` meta goes in front of the first heading when `__TOC__` or
//! `__FORCETOC__` is set, or when the page has at least [`TocHandler::MIN_HEADINGS`]
//! headings. `__NOTOC__` suppresses it. Behavior switches are consumed in the expansion
//! stage, so every flag is known by the time this output-stage handler runs.

use crate::wiki::token::{Tag, Token};
use crate::wiki::transforms::{
    HandlerId, TokenHandler, TokenMatch, TokenTransformManager, TransformContext,
    TransformError, TransformOutcome,
};

#[derive(Default)]
pub struct TocHandler {
    /// Tokens held back from the first heading on while the heading count is undecided.
    held: Option<Vec<Token>>,
    headings: usize,
    done: bool,
}

impl TocHandler {
    pub const RANK: f64 = 2.9;
    pub const MIN_HEADINGS: usize = 4;

    pub fn register(manager: &mut TokenTransformManager) -> Result<HandlerId, TransformError> {
        let id = manager.add_handler(Box::<Self>::default());
        manager.add_transform(id, Self::RANK, TokenMatch::Any, None)?;
        Ok(id)
    }

    fn release(&mut self, placeholder: bool, token: &Token) -> TransformOutcome {
        self.done = true;
        let mut out = Vec::new();
        if placeholder {
            out.push(toc_placeholder());
        }
        out.extend(self.held.take().unwrap_or_default());
        out.push(token.clone());
        TransformOutcome::Replace(out)
    }
}

fn is_heading_open(token: &Token) -> bool {
    matches!(token, Token::TagOpen(tag)
        if tag.name.len() == 2
            && tag.name.starts_with('h')
            && tag.name[1..].parse::<u8>().map(|n| (1..=6).contains(&n)).unwrap_or(false))
}

fn toc_placeholder() -> Token {
    Token::SelfClosing(
        Tag::new("meta")
            .attr("typeof", "mw:Placeholder/TOC")
            .src(""),
    )
}

impl TokenHandler for TocHandler {
    fn name(&self) -> &'static str {
        "toc"
    }

    fn on_token(
        &mut self,
        token: &Token,
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        if self.done || ctx.env.is_set("NOTOC") {
            return Ok(TransformOutcome::Unchanged);
        }
        let forced = ctx.env.is_set("TOC") || ctx.env.is_set("FORCETOC");

        if is_heading_open(token) {
            self.headings += 1;
            if forced {
                return Ok(self.release(true, token));
            }
            if self.headings >= Self::MIN_HEADINGS {
                return Ok(self.release(true, token));
            }
            if self.held.is_none() {
                self.held = Some(vec![token.clone()]);
                return Ok(TransformOutcome::drop());
            }
        }

        if *token == Token::EndOfInput && self.held.is_some() {
            return Ok(self.release(false, token));
        }

        match self.held.as_mut() {
            Some(held) => {
                held.push(token.clone());
                Ok(TransformOutcome::drop())
            }
            None => Ok(TransformOutcome::Unchanged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::env::{EnvOptions, Environment};
    use crate::wiki::lexing::tokenize;
    use crate::wiki::transforms::{Frame, NoExpansion};

    async fn run(source: &str, switches: &[&str]) -> Vec<Token> {
        let mut manager = TokenTransformManager::new("output", 2.0..3.0);
        TocHandler::register(&mut manager).unwrap();
        let mut env = Environment::new(EnvOptions::default());
        for switch in switches {
            env.set_variable(*switch, true);
        }
        manager
            .apply_transforms(tokenize(source), &mut env, &Frame::page(), source, &NoExpansion)
            .await
    }

    fn placeholders(tokens: &[Token]) -> usize {
        tokens
            .iter()
            .filter(|t| t.attrs().and_then(|a| a.get("typeof")) == Some("mw:Placeholder/TOC"))
            .count()
    }

    #[tokio::test]
    async fn test_four_headings_get_a_placeholder_before_the_first() {
        let source = "intro\n=a=\n=b=\n=c=\n=d=\n";
        let out = run(source, &[]).await;
        assert_eq!(placeholders(&out), 1);
        assert_eq!(out[0].text_value(), Some("intro"));
        assert!(out[2].name() == Some("meta"));
        assert!(out[3].is_open("h1"));
        assert_eq!(out.last(), Some(&Token::EndOfInput));
        assert_eq!(out.len(), tokenize(source).len() + 1);
    }

    #[tokio::test]
    async fn test_few_headings_keep_stream_intact() {
        let source = "=a=\ntext\n=b=";
        let out = run(source, &[]).await;
        assert_eq!(out, tokenize(source));
    }

    #[tokio::test]
    async fn test_forcetoc_and_notoc() {
        assert_eq!(placeholders(&run("=a=", &["FORCETOC"]).await), 1);
        assert_eq!(
            placeholders(&run("=a=\n=b=\n=c=\n=d=", &["NOTOC"]).await),
            0
        );
    }
}
