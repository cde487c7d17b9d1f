//! Lexer
//!
//!     Turns wikitext into the flat [`Token`](crate::wiki::token::Token) stream consumed by
//!     the transform stages. Lexing runs in two steps:
//!
//!         1. Base lexing with logos. See [lexeme](lexeme). Every bracket, brace, quote run
//!            and markup character becomes its own lexeme; everything else is text.
//!
//!         2. Construct matching. See [tokenizer](tokenizer). Brackets and braces are paired
//!            (templates, template arguments, wiki links, external links), line-start syntax
//!            is recognized (headings, list items) and the remaining lexemes collapse into
//!            text tokens.
//!
//! Source Preservation
//!
//!     Every token carries the byte range it was produced from, and constructs that the
//!     serializer could not rebuild byte-for-byte keep their raw source in provenance.
//!     Unbalanced brackets never fail: they degrade to text.

pub mod lexeme;
pub mod markup;
pub mod tokenizer;

pub use tokenizer::{tokenize, tokenize_fragment, tokenize_inline, Mode, Tokenizer};
