//! Main module for wikidom library functionality

pub mod env;
pub mod fetch;
pub mod lexing;
pub mod model;
pub mod pipeline;
pub mod serializer;
pub mod service;
pub mod title;
pub mod token;
pub mod transforms;
pub mod tree;

pub use env::{EnvOptions, Environment};
pub use pipeline::{ContentType, ParserPipelineFactory, Pipeline};
pub use serializer::WikitextSerializer;
pub use token::Token;
pub use tree::Document;
