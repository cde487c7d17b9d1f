//! Parser pipelines
//!
//! A [`Pipeline`] is one parse: it owns its [`Environment`], its transform stages and the
//! sending half of a one-shot completion channel. It is built by the
//! [`ParserPipelineFactory`] for a [`ContentType`]:
//!
//! - `text/x-mediawiki/full`: tokenize, then sync-input `[0,1)`, async-expansion `[1,2)`,
//!   sync-output `[2,3)`, then tree building.
//! - `text/x-mediawiki`: tokenize without end-of-input, then sync-input and
//!   async-expansion only. Transcluded pages go through this chain.
//!
//! Stages run strictly one after another over the whole token stream, so every handler of
//! a later stage sees the environment as the earlier stages left it.
//!
//! Usage:
//!
//! ```rust,ignore
//! let factory = ParserPipelineFactory::offline();
//! let mut pipeline = factory.make_pipeline(ContentType::FullDocument, env)?;
//! let ready = pipeline.on_document()?;
//! pipeline.process("''hi''").await?;
//! let doc = ready.await??;
//! ```

pub mod factory;

pub use factory::ParserPipelineFactory;

use crate::wiki::env::Environment;
use crate::wiki::lexing::{tokenize, tokenize_fragment};
use crate::wiki::token::Token;
use crate::wiki::transforms::{Expander, ExpansionError, Frame, TokenTransformManager, TransformError};
use crate::wiki::tree::{Document, TreeBuilder, TreeError};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::oneshot;

const TARGET: &str = "wikidom::pipeline";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// A complete page.
    FullDocument,
    /// Content spliced into another page.
    InlineFragment,
}

impl ContentType {
    pub fn mime(self) -> &'static str {
        match self {
            ContentType::FullDocument => "text/x-mediawiki/full",
            ContentType::InlineFragment => "text/x-mediawiki",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

impl FromStr for ContentType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "text/x-mediawiki/full" => Ok(ContentType::FullDocument),
            "text/x-mediawiki" => Ok(ContentType::InlineFragment),
            other => Err(PipelineError::UnknownContentType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// `process` was called on a pipeline that already ran.
    AlreadyProcessed,
    /// The completion receiver was already handed out.
    ReceiverTaken,
    /// The pipeline was dropped before it delivered a document.
    Cancelled,
    UnknownContentType(String),
    /// A stage could not be assembled.
    Transform(TransformError),
    Expansion(ExpansionError),
    Tree(TreeError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::AlreadyProcessed => write!(f, "Pipeline has already processed its input"),
            PipelineError::ReceiverTaken => write!(f, "Completion receiver was already taken"),
            PipelineError::Cancelled => write!(f, "Pipeline was dropped before completing"),
            PipelineError::UnknownContentType(ct) => write!(f, "Unknown content type: {}", ct),
            PipelineError::Transform(err) => write!(f, "{}", err),
            PipelineError::Expansion(err) => write!(f, "{}", err),
            PipelineError::Tree(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<TransformError> for PipelineError {
    fn from(err: TransformError) -> Self {
        PipelineError::Transform(err)
    }
}

impl From<ExpansionError> for PipelineError {
    fn from(err: ExpansionError) -> Self {
        PipelineError::Expansion(err)
    }
}

impl From<TreeError> for PipelineError {
    fn from(err: TreeError) -> Self {
        PipelineError::Tree(err)
    }
}

impl From<oneshot::error::RecvError> for PipelineError {
    fn from(_: oneshot::error::RecvError) -> Self {
        PipelineError::Cancelled
    }
}

pub type DocumentResult = Result<Document, PipelineError>;

/// Resolves once with the pipeline's document, or with `Cancelled` if it never runs.
pub type DocumentReady = oneshot::Receiver<DocumentResult>;

pub struct Pipeline {
    content_type: ContentType,
    env: Environment,
    frame: Frame,
    stages: Vec<TokenTransformManager>,
    expander: Arc<dyn Expander>,
    processed: bool,
    sender: Option<oneshot::Sender<DocumentResult>>,
    receiver: Option<DocumentReady>,
}

impl Pipeline {
    pub(crate) fn new(
        content_type: ContentType,
        env: Environment,
        stages: Vec<TokenTransformManager>,
        expander: Arc<dyn Expander>,
    ) -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            content_type,
            env,
            frame: Frame::page(),
            stages,
            expander,
            processed: false,
            sender: Some(sender),
            receiver: Some(receiver),
        }
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Stage names and rank ranges, in execution order.
    pub fn stages(&self) -> Vec<(&'static str, Range<f64>)> {
        self.stages
            .iter()
            .map(|stage| (stage.name(), stage.ranks()))
            .collect()
    }

    /// The completion signal. Can be taken once.
    pub fn on_document(&mut self) -> Result<DocumentReady, PipelineError> {
        self.receiver.take().ok_or(PipelineError::ReceiverTaken)
    }

    /// Run `input` through every stage and deliver the document on the completion
    /// signal. A pipeline processes exactly one input.
    pub async fn process(&mut self, input: &str) -> Result<(), PipelineError> {
        if self.processed {
            return Err(PipelineError::AlreadyProcessed);
        }
        self.processed = true;

        let tokens = self.transform(input).await;
        let doc = TreeBuilder::build(tokens, &mut self.env);
        log::debug!(
            target: TARGET,
            "{} parse of {} finished: {} nodes, {} diagnostics",
            self.content_type,
            self.env.page_name(),
            doc.len(),
            self.env.diagnostics().len()
        );
        self.complete(Ok(doc));
        Ok(())
    }

    /// Process `input` and wait for the document.
    pub async fn parse(mut self, input: &str) -> DocumentResult {
        let ready = self.on_document()?;
        self.process(input).await?;
        ready.await?
    }

    async fn transform(&mut self, input: &str) -> Vec<Token> {
        let mut tokens = match self.content_type {
            ContentType::FullDocument => tokenize(input),
            ContentType::InlineFragment => tokenize_fragment(input),
        };
        log::trace!(target: TARGET, "tokenized {} tokens", tokens.len());

        for stage in self.stages.iter_mut() {
            tokens = stage
                .apply_transforms(
                    tokens,
                    &mut self.env,
                    &self.frame,
                    input,
                    self.expander.as_ref(),
                )
                .await;
            log::trace!(target: TARGET, "[{}] {} tokens out", stage.name(), tokens.len());
        }
        tokens
    }

    fn complete(&mut self, result: DocumentResult) {
        match self.sender.take() {
            Some(sender) => {
                if sender.send(result).is_err() {
                    log::debug!(target: TARGET, "document receiver dropped before completion");
                }
            }
            None => log::warn!(target: TARGET, "completion already signalled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::env::EnvOptions;

    fn pipeline(content_type: ContentType) -> Pipeline {
        ParserPipelineFactory::offline()
            .make_pipeline(content_type, Environment::new(EnvOptions::default()))
            .unwrap()
    }

    #[test]
    fn test_content_type_names() {
        assert_eq!(
            "text/x-mediawiki/full".parse::<ContentType>(),
            Ok(ContentType::FullDocument)
        );
        assert_eq!(
            "text/x-mediawiki".parse::<ContentType>(),
            Ok(ContentType::InlineFragment)
        );
        assert!(matches!(
            "text/html".parse::<ContentType>(),
            Err(PipelineError::UnknownContentType(_))
        ));
        assert_eq!(ContentType::FullDocument.to_string(), "text/x-mediawiki/full");
    }

    #[tokio::test]
    async fn test_completion_is_signalled_once() {
        let mut pipeline = pipeline(ContentType::FullDocument);
        let ready = pipeline.on_document().unwrap();
        assert_eq!(pipeline.on_document().err(), Some(PipelineError::ReceiverTaken));

        pipeline.process("'''bold'''").await.unwrap();
        let doc = ready.await.unwrap().unwrap();
        assert_eq!(doc.elements_named("b").len(), 1);

        assert_eq!(
            pipeline.process("again").await,
            Err(PipelineError::AlreadyProcessed)
        );
    }

    #[tokio::test]
    async fn test_dropped_pipeline_cancels() {
        let mut pipeline = pipeline(ContentType::FullDocument);
        let ready = pipeline.on_document().unwrap();
        drop(pipeline);
        let result: DocumentResult = match ready.await {
            Ok(result) => result,
            Err(err) => Err(err.into()),
        };
        assert_eq!(result.err(), Some(PipelineError::Cancelled));
    }

    #[tokio::test]
    async fn test_stage_ranks_increase() {
        let full = pipeline(ContentType::FullDocument);
        let names: Vec<&str> = full.stages().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["sync-input", "async-expansion", "sync-output"]);
        for pair in full.stages().windows(2) {
            assert!(pair[0].1.end <= pair[1].1.start);
        }

        let inline = pipeline(ContentType::InlineFragment);
        assert_eq!(inline.stages().len(), 2);
    }

    #[tokio::test]
    async fn test_behavior_switch_reaches_environment() {
        let mut pipeline = pipeline(ContentType::FullDocument);
        pipeline.process("__NOTOC__\n== A ==").await.unwrap();
        assert!(pipeline.environment().is_set("NOTOC"));
    }

    #[tokio::test]
    async fn test_plain_text_leaves_variables_alone() {
        let mut pipeline = pipeline(ContentType::FullDocument);
        pipeline.process("just text, no switches").await.unwrap();
        assert!(pipeline.environment().variables().is_empty());
    }
}
