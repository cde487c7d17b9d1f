//! Token transform infrastructure
//!
//! A transform stage is a [`TokenTransformManager`](manager::TokenTransformManager): a
//! registry of [`TokenHandler`]s, each registered for a token kind (and optionally a tag
//! name) at a numeric rank. The manager pushes every token through the matching handlers
//! in rank order.
//!
//! # Handler contract
//!
//! A handler receives the current token and a [`TransformContext`] carrying the mutable
//! [`Environment`](crate::wiki::env::Environment), and answers with a [`TransformOutcome`]:
//!
//! - `Unchanged`: the token continues to the next handler.
//! - `Replace(tokens)`: the token is replaced by zero or more tokens. Replacement tokens
//!   skip every handler that already ran for this position and continue with the
//!   remaining ones (equal-rank handlers registered later included).
//! - `Suspend(request)`: the handler needs external content. The manager asks its
//!   [`Expander`] to resolve the request, then calls [`TokenHandler::resume`] with the
//!   result. Nothing downstream of the token is emitted in the meantime.
//!
//! Errors and panics raised by a handler are logged, recorded as diagnostics, and the
//! token passes on unchanged.

pub mod handlers;
pub mod manager;

pub use manager::{HandlerId, TokenMatch, TokenTransformManager};

use crate::wiki::env::Environment;
use crate::wiki::fetch::FetchError;
use crate::wiki::token::Token;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// Error type for handler faults and registration problems.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformError {
    /// A handler rejected the token it was given.
    Handler { handler: String, message: String },
    /// A handler panicked while processing a token.
    Panicked { handler: String, message: String },
    /// A registration rank falls outside the stage's rank range.
    RankOutOfRange { rank: f64, min: f64, max: f64 },
    /// A registration referenced a handler that was never added.
    UnknownHandler(usize),
    /// Generic error message.
    Error(String),
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformError::Handler { handler, message } => {
                write!(f, "Handler '{}' failed: {}", handler, message)
            }
            TransformError::Panicked { handler, message } => {
                write!(f, "Handler '{}' panicked: {}", handler, message)
            }
            TransformError::RankOutOfRange { rank, min, max } => {
                write!(f, "Rank {} outside stage range [{}, {})", rank, min, max)
            }
            TransformError::UnknownHandler(id) => write!(f, "Unknown handler id {}", id),
            TransformError::Error(msg) => write!(f, "Transform error: {}", msg),
        }
    }
}

impl std::error::Error for TransformError {}

impl From<String> for TransformError {
    fn from(s: String) -> Self {
        TransformError::Error(s)
    }
}

impl From<&str> for TransformError {
    fn from(s: &str) -> Self {
        TransformError::Error(s.to_string())
    }
}

/// Why a template expansion did not produce content.
#[derive(Debug, Clone, PartialEq)]
pub enum ExpansionError {
    /// The configured maximum expansion depth was reached.
    DepthExceeded { title: String, depth: usize },
    /// The page is already being expanded further up the stack.
    Loop { title: String },
    /// The content provider has no such page.
    NotFound { title: String },
    /// The fetch did not resolve in time.
    Timeout { title: String },
    /// The content provider failed.
    Fetch(FetchError),
    /// The nested pipeline could not be assembled.
    Transform(TransformError),
}

impl fmt::Display for ExpansionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpansionError::DepthExceeded { title, depth } => write!(
                f,
                "Template recursion depth limit ({}) exceeded at {}",
                depth, title
            ),
            ExpansionError::Loop { title } => write!(f, "Template loop detected: {}", title),
            ExpansionError::NotFound { title } => write!(f, "Page not found: {}", title),
            ExpansionError::Timeout { title } => write!(f, "Fetch timed out: {}", title),
            ExpansionError::Fetch(err) => write!(f, "{}", err),
            ExpansionError::Transform(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ExpansionError {}

impl From<FetchError> for ExpansionError {
    fn from(err: FetchError) -> Self {
        ExpansionError::Fetch(err)
    }
}

impl From<TransformError> for ExpansionError {
    fn from(err: TransformError) -> Self {
        ExpansionError::Transform(err)
    }
}

/// Arguments and identity of the page currently being expanded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    /// Title being transcluded; `None` for the top-level page.
    pub title: Option<String>,
    pub args: BTreeMap<String, String>,
}

impl Frame {
    pub fn page() -> Self {
        Self::default()
    }

    pub fn template(title: impl Into<String>, args: BTreeMap<String, String>) -> Self {
        Self {
            title: Some(title.into()),
            args,
        }
    }

    /// Inclusion mode: the content is being transcluded rather than viewed directly.
    pub fn is_inclusion(&self) -> bool {
        self.title.is_some()
    }

    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).map(String::as_str)
    }
}

/// A request for external content raised by a suspending handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionRequest {
    /// Target as written, e.g. `Foo` or `:Bar`.
    pub target: String,
    pub args: BTreeMap<String, String>,
    /// Raw source of the construct that triggered the request.
    pub src: String,
    pub range: Option<Range<usize>>,
}

/// What a handler wants done with the token it was given.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOutcome {
    Unchanged,
    Replace(Vec<Token>),
    Suspend(ExpansionRequest),
}

impl TransformOutcome {
    /// Consume the token without emitting anything.
    pub fn drop() -> Self {
        TransformOutcome::Replace(Vec::new())
    }
}

/// State handed to every handler invocation.
pub struct TransformContext<'a> {
    pub env: &'a mut Environment,
    pub frame: &'a Frame,
    /// Source text the current token stream was produced from.
    pub source: &'a str,
}

impl TransformContext<'_> {
    /// Source slice for a token range, when the range is known.
    pub fn source_slice(&self, range: Option<Range<usize>>) -> Option<&str> {
        range.and_then(|r| self.source.get(r))
    }
}

/// A single-responsibility unit that rewrites tokens.
pub trait TokenHandler: Send {
    /// Name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    fn on_token(
        &mut self,
        token: &Token,
        ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError>;

    /// Continue after a `Suspend`. The default keeps the token as is.
    fn resume(
        &mut self,
        _token: &Token,
        _result: Result<Vec<Token>, ExpansionError>,
        _ctx: &mut TransformContext<'_>,
    ) -> Result<TransformOutcome, TransformError> {
        Ok(TransformOutcome::Unchanged)
    }
}

/// Resolves expansion requests into tokens. The pipeline factory implements this by
/// fetching the page and running it through a nested inclusion pipeline.
#[async_trait]
pub trait Expander: Send + Sync {
    async fn expand(
        &self,
        request: &ExpansionRequest,
        env: &mut Environment,
    ) -> Result<Vec<Token>, ExpansionError>;
}

/// Expander for pipelines that never fetch. Every request resolves to `NotFound`.
pub struct NoExpansion;

#[async_trait]
impl Expander for NoExpansion {
    async fn expand(
        &self,
        request: &ExpansionRequest,
        _env: &mut Environment,
    ) -> Result<Vec<Token>, ExpansionError> {
        Err(ExpansionError::NotFound {
            title: request.target.clone(),
        })
    }
}
