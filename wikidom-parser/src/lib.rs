//! # wikidom
//!
//! Converts wiki markup into an annotated HTML-like document tree and back.
//!
//! The work happens in a staged token pipeline:
//!
//! src/wiki
//!   ├── lexing        Source text to a flat token stream
//!   ├── transforms    Rank-ordered token handlers grouped in stages
//!   ├── pipeline      Factory, stage wiring and the single-use pipeline
//!   ├── tree          Arena document tree, provenance and HTML projection
//!   ├── serializer    Document tree back to wikitext
//!   └── model         Typed node records consumed by editing surfaces
//!
//! Template content is pulled through a [`ContentProvider`](wiki::fetch::ContentProvider),
//! and [`ParseService`](wiki::service::ParseService) wraps the whole thing behind a
//! title-in, HTML-out interface.

pub mod wiki;
