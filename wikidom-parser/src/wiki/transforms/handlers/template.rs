//! Template expansion (`{{Foo|a|b=c}}`).
//!
//! Magic variables resolve locally. Parser functions and, when fetching is disabled,
//! every template, stay literal. Everything else suspends on an expansion request; the
//! expander fetches the page and runs it through a nested inclusion pipeline, and the
//! result is wrapped in a `mw:Transclusion` span that remembers the original source.
//! Failed expansions become visible markers instead.

use super::template_args::substitute_params;
use super::{generated_close, generated_open};
use crate::wiki::env::DiagnosticKind;
use crate::wiki::title::Title;
use crate::wiki::token::{Tag, Token, TokenKind};
use crate::wiki::transforms::{
    ExpansionError, ExpansionRequest, Frame, HandlerId, TokenHandler, TokenTransformManager,
    TransformContext, TransformError, TransformOutcome,
};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

const TARGET: &str = "wikidom::transform";

pub struct TemplateHandler;

impl TemplateHandler {
    pub const RANK: f64 = 1.1;

    pub fn register(manager: &mut TokenTransformManager) -> Result<HandlerId, TransformError> {
        let id = manager.add_handler(Box::new(Self));
        manager.add_transform(id, Self::RANK, TokenKind::SelfClosing, Some("template"))?;
        Ok(id)
    }
}

struct Call {
    target: String,
    args: BTreeMap<String, String>,
    src: String,
}

impl Call {
    fn from_token(token: &Token) -> Option<Self> {
        let tag = token.tag()?;
        let mut attrs = tag.attrs.iter();
        let target = attrs.next()?.value.trim().to_string();
        let args = attrs
            .map(|attr| (attr.name.clone(), attr.value.clone()))
            .collect();
        Some(Self {
            target,
            args,
            src: tag.prov.src.clone().unwrap_or_default(),
        })
    }

    /// Target and arguments with the enclosing frame's parameters filled in. The call
    /// itself keeps what was written, so its `data-mw` still round-trips.
    fn resolved(&self, frame: &Frame) -> (String, BTreeMap<String, String>) {
        let target = substitute_params(&self.target, frame).trim().to_string();
        let args = self
            .args
            .iter()
            .map(|(name, value)| (name.clone(), substitute_params(value, frame)))
            .collect();
        (target, args)
    }

    fn data_mw(&self) -> String {
        let params: Map<String, Value> = self
            .args
            .iter()
            .map(|(name, value)| (name.clone(), json!({ "wt": value })))
            .collect();
        json!({
            "parts": [{
                "template": {
                    "target": { "wt": self.target },
                    "params": params,
                }
            }]
        })
        .to_string()
    }
}

fn magic_variable(name: &str, ctx: &TransformContext<'_>) -> Option<String> {
    let title = ctx.env.page_title();
    match name {
        "PAGENAME" => Some(title.text().to_string()),
        "FULLPAGENAME" => Some(title.full_text()),
        "NAMESPACE" => Some(title.namespace().to_string()),
        "PAGENAMEE" => Some(title.text().replace(' ', "_")),
        _ => None,
    }
}

fn is_parser_function(target: &str) -> bool {
    target.starts_with('#')
        || target
            .split_once(':')
            .map(|(prefix, _)| {
                prefix
                    .chars()
                    .all(|c| c.is_ascii_uppercase() || c == '#')
                    && !prefix.is_empty()
            })
            .unwrap_or(false)
}

fn literal(call: &Call, token: &Token, frame: &Frame) -> TransformOutcome {
    let src = if frame.is_inclusion() {
        substitute_params(&call.src, frame)
    } else {
        call.src.clone()
    };
    let mut text = crate::wiki::token::TextData::new(src);
    text.range = token.range();
    TransformOutcome::Replace(vec![Token::Text(text)])
}

/// Wrap expanded content so the tree remembers which source produced it. Nested
/// expansions are not wrapped: their outermost transclusion already is.
fn transclusion(
    call: &Call,
    token: &Token,
    ctx: &TransformContext<'_>,
    body: Vec<Token>,
    extra_typeof: Option<&str>,
) -> Vec<Token> {
    if ctx.frame.is_inclusion() {
        return body;
    }
    let type_of = match extra_typeof {
        Some(extra) => format!("mw:Transclusion {}", extra),
        None => "mw:Transclusion".to_string(),
    };
    let mut open = Tag::new("span")
        .attr("typeof", type_of)
        .attr("data-mw", call.data_mw())
        .src(call.src.as_str())
        .hint("opaque", "1");
    open.range = token.range();

    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(Token::TagOpen(open));
    out.extend(body);
    out.push(generated_close("span"));
    out
}

fn error_marker(call: &Call, token: &Token, class: &str, message: String) -> Vec<Token> {
    let mut open = Tag::new("span")
        .attr("typeof", "mw:Error")
        .attr("class", format!("error {}", class))
        .attr("data-mw", call.data_mw())
        .src(call.src.as_str())
        .hint("opaque", "1");
    open.range = token.range();
    vec![
        Token::TagOpen(open),
        Token::text(message),
        generated_close("span"),
    ]
}

fn red_link(title: &Title, ctx: &TransformContext<'_>) -> Vec<Token> {
    let href = format!("{}?action=edit&redlink=1", ctx.env.article_href(title));
    vec![
        Token::TagOpen(
            generated_open("a")
                .attr("rel", "mw:WikiLink")
                .attr("href", href)
                .attr("class", "new")
                .attr("title", title.full_text()),
        ),
        Token::text(title.full_text()),
        generated_close("a"),
    ]
}

impl TokenHandler for TemplateHandler {
    fn name(&self) -> &'static str {
        "template"
    }

    fn on_token(
        &mut self,
        token: &Token,
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        let Some(call) = Call::from_token(token) else {
            return Ok(TransformOutcome::Unchanged);
        };

        let (target, args) = call.resolved(ctx.frame);

        if args.is_empty() {
            if let Some(value) = magic_variable(&target, ctx) {
                let body = vec![Token::text(value)];
                return Ok(TransformOutcome::Replace(transclusion(
                    &call, token, ctx, body, None,
                )));
            }
        }

        if target.is_empty() || is_parser_function(&target) {
            return Ok(literal(&call, token, ctx.frame));
        }

        if !ctx.env.options().fetch_templates {
            return Ok(literal(&call, token, ctx.frame));
        }

        Ok(TransformOutcome::Suspend(ExpansionRequest {
            target,
            args,
            src: call.src.clone(),
            range: token.range(),
        }))
    }

    fn resume(
        &mut self,
        token: &Token,
        result: Result<Vec<Token>, ExpansionError>,
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        let Some(call) = Call::from_token(token) else {
            return Ok(TransformOutcome::Unchanged);
        };

        let replacement = match result {
            Ok(tokens) => {
                let body = tokens.iter().map(Token::without_range).collect();
                transclusion(&call, token, ctx, body, None)
            }
            Err(ExpansionError::NotFound { .. }) => {
                let (target, _) = call.resolved(ctx.frame);
                let title = Title::for_transclusion(&target);
                let body = red_link(&title, ctx);
                transclusion(&call, token, ctx, body, None)
            }
            Err(err) => {
                let class = match &err {
                    ExpansionError::DepthExceeded { .. } => "mw-recursion-limit",
                    ExpansionError::Loop { .. } => "mw-template-loop",
                    _ => "mw-fetch-error",
                };
                log::warn!(target: TARGET, "{}", err);
                ctx.env.report(DiagnosticKind::Expansion, err.to_string());
                error_marker(&call, token, class, err.to_string())
            }
        };
        Ok(TransformOutcome::Replace(replacement))
    }
}
