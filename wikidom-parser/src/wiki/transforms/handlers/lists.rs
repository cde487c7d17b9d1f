//! List structure from bullet prefixes.
//!
//! Each `listItem` token carries the bullets of its line (`*#:;`). Consecutive items are
//! folded into nested `ul`/`ol`/`dl` lists by comparing bullet prefixes with the lists
//! currently open. Containers the author never wrote get empty source; only the item
//! that owns a line carries its bullets.

use super::generated_open;
use crate::wiki::token::{Tag, Token};
use crate::wiki::transforms::{
    HandlerId, TokenHandler, TokenMatch, TokenTransformManager, TransformContext,
    TransformError, TransformOutcome,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Level {
    list: &'static str,
    item: &'static str,
}

impl Level {
    fn for_bullet(bullet: char) -> Self {
        match bullet {
            '#' => Level {
                list: "ol",
                item: "li",
            },
            ':' => Level {
                list: "dl",
                item: "dd",
            },
            ';' => Level {
                list: "dl",
                item: "dt",
            },
            _ => Level {
                list: "ul",
                item: "li",
            },
        }
    }
}

#[derive(Default)]
pub struct ListHandler {
    levels: Vec<Level>,
    /// The previous item's line ended and nothing has followed it yet.
    after_item: bool,
    pending_newline: Option<Token>,
}

impl ListHandler {
    pub const RANK: f64 = 2.49;

    pub fn register(manager: &mut TokenTransformManager) -> Result<HandlerId, TransformError> {
        let id = manager.add_handler(Box::<Self>::default());
        manager.add_transform(id, Self::RANK, TokenMatch::Any, None)?;
        Ok(id)
    }

    fn close_level(&mut self, out: &mut Vec<Token>) {
        if let Some(level) = self.levels.pop() {
            out.push(close(level.item));
            out.push(close(level.list));
        }
    }

    fn close_all(&mut self, out: &mut Vec<Token>) {
        while !self.levels.is_empty() {
            self.close_level(out);
        }
    }

    fn flush_newline(&mut self, out: &mut Vec<Token>) {
        if let Some(newline) = self.pending_newline.take() {
            out.push(newline);
        }
    }

    fn open_item(&mut self, item: &Tag, out: &mut Vec<Token>) {
        let bullets: Vec<Level> = item
            .attrs
            .get("bullets")
            .unwrap_or("*")
            .chars()
            .map(Level::for_bullet)
            .collect();

        let common = self
            .levels
            .iter()
            .zip(&bullets)
            .take_while(|(open, wanted)| open.list == wanted.list)
            .count();
        while self.levels.len() > common {
            self.close_level(out);
        }

        let mut line_item = Tag::new(bullets[bullets.len() - 1].item);
        line_item.range = item.range.clone();
        line_item.prov = item.prov.clone();

        if common == bullets.len() {
            if let Some(level) = self.levels.last_mut() {
                out.push(close(level.item));
                *level = bullets[bullets.len() - 1];
            }
            self.flush_newline(out);
            out.push(Token::TagOpen(line_item));
            return;
        }

        self.flush_newline(out);
        for (depth, level) in bullets.iter().enumerate().skip(common) {
            out.push(Token::TagOpen(generated_open(level.list)));
            if depth + 1 == bullets.len() {
                out.push(Token::TagOpen(line_item.clone()));
            } else {
                out.push(Token::TagOpen(
                    generated_open(level.item).hint("synthetic", "1"),
                ));
            }
            self.levels.push(*level);
        }
    }
}

fn close(name: &str) -> Token {
    Token::TagClose(Tag::new(name).src(""))
}

impl TokenHandler for ListHandler {
    fn name(&self) -> &'static str {
        "lists"
    }

    fn on_token(
        &mut self,
        token: &Token,
        _ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        match token {
            Token::TagOpen(tag) if tag.name == "listItem" => {
                let mut out = Vec::new();
                if !self.after_item {
                    self.close_all(&mut out);
                }
                self.after_item = false;
                self.open_item(tag, &mut out);
                Ok(TransformOutcome::Replace(out))
            }
            Token::TagClose(tag) if tag.name == "listItem" => {
                self.after_item = true;
                Ok(TransformOutcome::drop())
            }
            token if self.after_item && token.is_newline() && self.pending_newline.is_none() => {
                self.pending_newline = Some(token.clone());
                Ok(TransformOutcome::drop())
            }
            token if self.after_item => {
                let mut out = Vec::new();
                self.after_item = false;
                self.close_all(&mut out);
                self.flush_newline(&mut out);
                out.push(token.clone());
                Ok(TransformOutcome::Replace(out))
            }
            _ => Ok(TransformOutcome::Unchanged),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::env::{EnvOptions, Environment};
    use crate::wiki::lexing::tokenize;
    use crate::wiki::transforms::{Frame, NoExpansion};

    async fn run(source: &str) -> Vec<Token> {
        let mut manager = TokenTransformManager::new("output", 2.0..3.0);
        ListHandler::register(&mut manager).unwrap();
        let mut env = Environment::new(EnvOptions::default());
        manager
            .apply_transforms(tokenize(source), &mut env, &Frame::page(), source, &NoExpansion)
            .await
    }

    fn shape(tokens: &[Token]) -> String {
        tokens
            .iter()
            .filter(|t| **t != Token::EndOfInput)
            .map(|t| match t {
                Token::Text(text) => text.value.replace('\n', "|"),
                other => other.to_string(),
            })
            .collect()
    }

    fn source_of(tokens: &[Token]) -> String {
        tokens
            .iter()
            .map(|t| match t.prov().and_then(|p| p.src.clone()) {
                Some(src) => src,
                None => t.text_value().unwrap_or("").to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_flat_list() {
        let source = "* a\n* b";
        let out = run(source).await;
        assert_eq!(shape(&out), "<ul><li> a</li>|<li> b</li></ul>");
        assert_eq!(source_of(&out), source);
    }

    #[tokio::test]
    async fn test_nested_and_switching_lists() {
        let source = "* a\n** b\n# c\ntext";
        let out = run(source).await;
        assert_eq!(
            shape(&out),
            "<ul><li> a|<ul><li> b</li></ul></li></ul>|<ol><li> c</li></ol>|text"
        );
        assert_eq!(source_of(&out), source);
    }

    #[tokio::test]
    async fn test_skipped_level_gets_synthetic_item() {
        let out = run("*# deep").await;
        assert_eq!(shape(&out), "<ul><li><ol><li> deep</li></ol></li></ul>");
        let synthetic = out
            .iter()
            .find(|t| t.is_open("li"))
            .and_then(|t| t.prov())
            .unwrap();
        assert!(synthetic.has_hint("synthetic"));
    }

    #[tokio::test]
    async fn test_definition_list_shares_container() {
        let out = run("; term\n: def").await;
        assert_eq!(shape(&out), "<dl><dt> term</dt>|<dd> def</dd></dl>");
    }
}
