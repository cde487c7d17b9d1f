//! Pipeline assembly and template expansion.
//!
//! The factory is also the [`Expander`] handed to every stage: when the template handler
//! suspends, the factory fetches the page from its [`ContentProvider`], guards the
//! expansion stack, and runs the page through a fresh inline-fragment stage chain with a
//! template frame. Nested templates inside that page suspend back into the same factory.

use super::{ContentType, Pipeline, PipelineError, TARGET};
use crate::wiki::env::{EnvOptions, Environment};
use crate::wiki::fetch::{ContentProvider, HttpProvider, MemoryProvider, PageContent};
use crate::wiki::lexing::tokenize_fragment;
use crate::wiki::title::Title;
use crate::wiki::token::Token;
use crate::wiki::transforms::handlers::{
    register_async_expansion, register_sync_input, register_sync_output,
};
use crate::wiki::transforms::{
    Expander, ExpansionError, ExpansionRequest, Frame, TokenTransformManager, TransformError,
};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Clone)]
pub struct ParserPipelineFactory {
    provider: Arc<dyn ContentProvider>,
}

impl ParserPipelineFactory {
    pub fn new(provider: Arc<dyn ContentProvider>) -> Self {
        Self { provider }
    }

    /// A factory whose provider knows no pages.
    pub fn offline() -> Self {
        Self::new(Arc::new(MemoryProvider::new()))
    }

    /// A factory fetching raw wikitext from the configured wiki.
    pub fn http(options: &EnvOptions) -> Self {
        Self::new(Arc::new(HttpProvider::new(options.clone())))
    }

    pub fn make_pipeline(
        &self,
        content_type: ContentType,
        env: Environment,
    ) -> Result<Pipeline, PipelineError> {
        let stages = Self::stages(content_type)?;
        log::debug!(
            target: TARGET,
            "new {} pipeline for {} ({} stages)",
            content_type,
            env.page_name(),
            stages.len()
        );
        Ok(Pipeline::new(
            content_type,
            env,
            stages,
            Arc::new(self.clone()),
        ))
    }

    /// Fresh transform stages for `content_type`, in execution order.
    pub fn stages(content_type: ContentType) -> Result<Vec<TokenTransformManager>, TransformError> {
        let mut stages = vec![Self::sync_input_stage()?, Self::async_expansion_stage()?];
        if content_type == ContentType::FullDocument {
            stages.push(Self::sync_output_stage()?);
        }
        Ok(stages)
    }

    pub fn sync_input_stage() -> Result<TokenTransformManager, TransformError> {
        let mut manager = TokenTransformManager::new("sync-input", 0.0..1.0);
        register_sync_input(&mut manager)?;
        Ok(manager)
    }

    pub fn async_expansion_stage() -> Result<TokenTransformManager, TransformError> {
        let mut manager = TokenTransformManager::new("async-expansion", 1.0..2.0);
        register_async_expansion(&mut manager)?;
        Ok(manager)
    }

    pub fn sync_output_stage() -> Result<TokenTransformManager, TransformError> {
        let mut manager = TokenTransformManager::new("sync-output", 2.0..3.0);
        register_sync_output(&mut manager)?;
        Ok(manager)
    }

    async fn fetch_and_expand(
        &self,
        title: &Title,
        request: &ExpansionRequest,
        env: &mut Environment,
    ) -> Result<Vec<Token>, ExpansionError> {
        let timeout = env.options().fetch_timeout();
        let content = tokio::time::timeout(timeout, self.provider.fetch(title))
            .await
            .map_err(|_| ExpansionError::Timeout {
                title: title.full_text(),
            })??;
        let source = match content {
            PageContent::Found(source) => source,
            PageContent::NotFound => {
                return Err(ExpansionError::NotFound {
                    title: title.full_text(),
                })
            }
        };

        let frame = Frame::template(title.full_text(), request.args.clone());
        let mut tokens = tokenize_fragment(&source);
        for mut stage in Self::stages(ContentType::InlineFragment)? {
            tokens = stage
                .apply_transforms(tokens, env, &frame, &source, self)
                .await;
        }
        Ok(tokens)
    }
}

#[async_trait]
impl Expander for ParserPipelineFactory {
    async fn expand(
        &self,
        request: &ExpansionRequest,
        env: &mut Environment,
    ) -> Result<Vec<Token>, ExpansionError> {
        let title = Title::for_transclusion(&request.target);
        let depth = env.enter_expansion(&title)?;
        log::debug!(target: TARGET, "expanding {} at depth {}", title.full_text(), depth);

        let result = self.fetch_and_expand(&title, request, env).await;
        env.exit_expansion();
        result
    }
}
