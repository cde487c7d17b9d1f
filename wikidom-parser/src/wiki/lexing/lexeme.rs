//! Base lexemes for wikitext.
//!
//! Markup characters are lexed one at a time so the tokenizer can pair `{{`, `}}}`
//! and friends itself. Longest-match on runs would split `}}}}` the wrong way.

use logos::Logos;
use std::ops::Range;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lexeme {
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("|")]
    Pipe,
    #[token("=")]
    Equals,
    #[regex("'+")]
    Quotes,
    #[regex(r"[*#:;]")]
    ListMarker,
    #[regex("__[A-Z]+__")]
    MagicWord,
    #[token("_")]
    Underscore,
    #[token("<!--", skip_comment)]
    Comment,
    #[regex(r"<[a-zA-Z][a-zA-Z0-9]*([ \t\r\n][^<>]*)?/?>")]
    HtmlOpen,
    #[regex(r"</[a-zA-Z][a-zA-Z0-9]*[ \t\r\n]*>")]
    HtmlClose,
    #[token("<")]
    Lt,
    #[token("\n")]
    Newline,
    #[regex(r"[^{}\[\]|='*#:;_<\n]+")]
    Text,
}

/// Extend a comment lexeme through its terminator, or to the end of input when unterminated.
fn skip_comment(lex: &mut logos::Lexer<Lexeme>) -> bool {
    let rest = lex.remainder();
    match rest.find("-->") {
        Some(end) => lex.bump(end + 3),
        None => lex.bump(rest.len()),
    }
    true
}

/// Lex `source[range]`, returning lexemes with absolute byte offsets into `source`.
pub fn lex(source: &str, range: Range<usize>) -> Vec<(Lexeme, Range<usize>)> {
    let offset = range.start;
    let mut lexer = Lexeme::lexer(&source[range]);
    let mut lexemes = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        // Every character is covered by some rule, but stay total anyway.
        let lexeme = result.unwrap_or(Lexeme::Text);
        lexemes.push((lexeme, span.start + offset..span.end + offset));
    }

    lexemes
}
