//! Template parameters (`{{{name|default}}}`).
//!
//! Inside a transclusion the parameter is replaced by the caller's argument, or by its
//! default, tokenized in place. Replacement tokens still pass through the template
//! handler, so arguments may themselves contain templates. On a page viewed directly
//! there are no arguments; the parameter renders its default inside a wrapper that keeps
//! the original source.
//!
//! Template calls nested in a transcluded page pass parameters of their own; those are
//! resolved against the enclosing frame with [`substitute_params`] before the call is
//! expanded, so `{{Inner|{{{1}}}}}` hands the outer caller's first argument down.

use super::generated_close;
use crate::wiki::lexing::tokenize_inline;
use crate::wiki::token::{Tag, TextData, Token, TokenKind};
use crate::wiki::transforms::{
    Frame, HandlerId, TokenHandler, TokenTransformManager, TransformContext, TransformError,
    TransformOutcome,
};

pub struct TemplateArgHandler;

impl TemplateArgHandler {
    pub const RANK: f64 = 1.05;

    pub fn register(manager: &mut TokenTransformManager) -> Result<HandlerId, TransformError> {
        let id = manager.add_handler(Box::new(Self));
        manager.add_transform(id, Self::RANK, TokenKind::SelfClosing, Some(TEMPLATE_ARG))?;
        Ok(id)
    }
}

const TEMPLATE_ARG: &str = "templatearg";

/// Tokens for an argument value. This handler has already run for them, so parameters
/// left in the value are kept as text.
fn spliced(value: &str) -> Vec<Token> {
    tokenize_inline(value)
        .iter()
        .map(|token| match token {
            Token::SelfClosing(tag) if tag.name == TEMPLATE_ARG => {
                Token::text(tag.prov.src.clone().unwrap_or_default())
            }
            other => other.without_range(),
        })
        .collect()
}

/// Resolve every `{{{param}}}` in `text` against `frame`, including parameters inside
/// nested template calls and inside parameter defaults. A parameter with neither an
/// argument nor a default stays as written.
pub fn substitute_params(text: &str, frame: &Frame) -> String {
    if !text.contains("{{{") {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for token in tokenize_inline(text) {
        let (Some(tag), Some(range)) = (token.tag(), token.range()) else {
            continue;
        };
        if range.start < last || range.end > text.len() {
            continue;
        }
        let replacement = match tag.name.as_str() {
            TEMPLATE_ARG => {
                let name = tag.attrs.get("name").unwrap_or("").trim();
                match (frame.arg(name), tag.attrs.get("default")) {
                    (Some(value), _) => value.to_string(),
                    (None, Some(default)) => substitute_params(default, frame),
                    (None, None) => continue,
                }
            }
            "template" if range.len() >= 4 => {
                let raw = &text[range.clone()];
                format!("{{{{{}}}}}", substitute_params(&raw[2..raw.len() - 2], frame))
            }
            _ => continue,
        };
        out.push_str(&text[last..range.start]);
        out.push_str(&replacement);
        last = range.end;
    }
    out.push_str(&text[last..]);
    out
}

impl TokenHandler for TemplateArgHandler {
    fn name(&self) -> &'static str {
        "template-args"
    }

    fn on_token(
        &mut self,
        token: &Token,
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        let Some(tag) = token.tag() else {
            return Ok(TransformOutcome::Unchanged);
        };
        let name = tag.attrs.get("name").unwrap_or("").trim();
        let default = tag.attrs.get("default");
        let raw = tag.prov.src.clone().unwrap_or_default();

        if ctx.frame.is_inclusion() {
            let replacement = match (ctx.frame.arg(name), default) {
                (Some(value), _) => spliced(value),
                (None, Some(default)) => spliced(default),
                (None, None) => vec![Token::text(raw)],
            };
            return Ok(TransformOutcome::Replace(replacement));
        }

        let mut open = Tag::new("span")
            .attr("typeof", "mw:Param")
            .src(raw.as_str())
            .hint("opaque", "1");
        open.range = tag.range.clone();
        let mut out = vec![Token::TagOpen(open)];
        match default {
            Some(default) => out.extend(spliced(default)),
            None => out.push(Token::Text(TextData::new(raw))),
        }
        out.push(generated_close("span"));
        Ok(TransformOutcome::Replace(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::env::{EnvOptions, Environment};
    use crate::wiki::transforms::NoExpansion;
    use std::collections::BTreeMap;

    async fn expand(source: &str, frame: &Frame) -> Vec<Token> {
        let mut manager = TokenTransformManager::new("expansion", 1.0..2.0);
        TemplateArgHandler::register(&mut manager).unwrap();
        let mut env = Environment::new(EnvOptions::default());
        manager
            .apply_transforms(tokenize_inline(source), &mut env, frame, source, &NoExpansion)
            .await
    }

    fn texts(tokens: &[Token]) -> String {
        tokens.iter().filter_map(|t| t.text_value()).collect()
    }

    #[tokio::test]
    async fn test_argument_substitution() {
        let mut args = BTreeMap::new();
        args.insert("1".to_string(), "one".to_string());
        args.insert("name".to_string(), "''x''".to_string());
        let frame = Frame::template("Template:T", args);

        let out = expand("[{{{1}}}|{{{name}}}|{{{2|two}}}|{{{3}}}]", &frame).await;
        assert_eq!(texts(&out), "[one|x|two|{{{3}}}]");
        assert_eq!(
            out.iter().filter(|t| t.name() == Some("mw-quote")).count(),
            2
        );
    }

    #[test]
    fn test_params_resolve_through_nested_calls() {
        let mut args = BTreeMap::new();
        args.insert("1".to_string(), "x".to_string());
        let frame = Frame::template("Template:Outer", args);

        assert_eq!(substitute_params("{{{1}}}", &frame), "x");
        assert_eq!(substitute_params("a {{{2|{{{1}}}}}} b", &frame), "a x b");
        assert_eq!(
            substitute_params("{{Inner|{{{1}}}|k={{{3}}}}}", &frame),
            "{{Inner|x|k={{{3}}}}}"
        );
        assert_eq!(substitute_params("no params", &frame), "no params");
        assert_eq!(substitute_params("{{{1}}}", &Frame::page()), "{{{1}}}");
    }

    #[tokio::test]
    async fn test_unresolved_parameter_in_argument_stays_text() {
        let mut args = BTreeMap::new();
        args.insert("1".to_string(), "{{{9}}}".to_string());
        let frame = Frame::template("Template:T", args);

        let out = expand("[{{{1}}}]", &frame).await;
        assert!(out.iter().all(|t| t.name() != Some(TEMPLATE_ARG)));
        assert_eq!(texts(&out), "[{{{9}}}]");
    }

    #[tokio::test]
    async fn test_page_view_wraps_default() {
        let out = expand("{{{1|fallback}}}", &Frame::page()).await;
        assert_eq!(out[0].attrs().unwrap().get("typeof"), Some("mw:Param"));
        assert_eq!(
            out[0].prov().unwrap().src.as_deref(),
            Some("{{{1|fallback}}}")
        );
        assert_eq!(texts(&out), "fallback");
    }
}
