//! Title-in, HTML-out parse service.
//!
//! A request names a page and picks a route. Locally, `{{:Title}}` is parsed through a
//! full-document pipeline with the page name set to the title, so the page body arrives
//! by transclusion. Delegated, the title is appended to the configured service URL and
//! the response body is the result. Either way the caller gets one `Result`: a failed
//! request never yields empty output. A page that could not be fetched locally is an
//! error too, not a document holding only the failure marker.

use crate::wiki::env::{EnvOptions, Environment};
use crate::wiki::pipeline::{ContentType, ParserPipelineFactory, PipelineError};
use crate::wiki::title::Title;
use crate::wiki::tree::html::to_html;
use crate::wiki::tree::{Document, TreeError};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

const TARGET: &str = "wikidom::service";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// Base URL of the external parse endpoint; the title is appended as a path segment.
    pub service_url: String,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:8000/".to_string(),
        }
    }
}

impl ServiceOptions {
    pub fn url_for(&self, title: &str) -> Result<Url, ServiceError> {
        let mut url =
            Url::parse(&self.service_url).map_err(|e| ServiceError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidUrl(self.service_url.clone()))?
            .pop_if_empty()
            .push(&Title::parse(title).db_key());
        Ok(url)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// The service answered with a non-success status.
    Status { url: String, status: u16 },
    /// The service could not be reached or its response could not be read.
    Transport(String),
    InvalidUrl(String),
    /// The requested page itself could not be fetched for a local parse.
    Fetch(String),
    Pipeline(PipelineError),
    Tree(TreeError),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceError::Status { url, status } => {
                write!(f, "Parse service {} answered {}", url, status)
            }
            ServiceError::Transport(msg) => write!(f, "Parse service unreachable: {}", msg),
            ServiceError::InvalidUrl(msg) => write!(f, "Invalid parse service URL: {}", msg),
            ServiceError::Fetch(msg) => write!(f, "Page fetch failed: {}", msg),
            ServiceError::Pipeline(err) => write!(f, "{}", err),
            ServiceError::Tree(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<PipelineError> for ServiceError {
    fn from(err: PipelineError) -> Self {
        ServiceError::Pipeline(err)
    }
}

impl From<TreeError> for ServiceError {
    fn from(err: TreeError) -> Self {
        ServiceError::Tree(err)
    }
}

pub struct ParseService {
    factory: ParserPipelineFactory,
    env_options: EnvOptions,
    options: ServiceOptions,
    client: reqwest::Client,
}

impl ParseService {
    pub fn new(factory: ParserPipelineFactory, env_options: EnvOptions, options: ServiceOptions) -> Self {
        Self {
            factory,
            env_options,
            options,
            client: reqwest::Client::new(),
        }
    }

    /// A service fetching templates from the wiki named in `env_options`.
    pub fn from_options(env_options: EnvOptions, options: ServiceOptions) -> Self {
        let factory = ParserPipelineFactory::http(&env_options);
        Self::new(factory, env_options, options)
    }

    pub async fn parse(&self, title: &str, use_service: bool) -> Result<String, ServiceError> {
        let result = if use_service {
            self.delegate(title).await
        } else {
            self.parse_locally(title).await
        };
        if let Err(err) = &result {
            log::warn!(target: TARGET, "parse of {} failed: {}", title, err);
        }
        result
    }

    /// Run [`parse`](Self::parse) and hand the outcome to `callback`, exactly once.
    pub async fn parse_with_callback<F>(&self, title: &str, use_service: bool, callback: F)
    where
        F: FnOnce(Result<String, ServiceError>),
    {
        callback(self.parse(title, use_service).await);
    }

    async fn parse_locally(&self, title: &str) -> Result<String, ServiceError> {
        let mut env = Environment::new(self.env_options.clone());
        env.set_page_name(title);
        let pipeline = self.factory.make_pipeline(ContentType::FullDocument, env)?;
        let doc = pipeline.parse(&format!("{{{{:{}}}}}", title)).await?;
        if let Some(message) = page_fetch_failure(&doc) {
            return Err(ServiceError::Fetch(message));
        }
        Ok(to_html(&doc, self.env_options.debug)?)
    }

    async fn delegate(&self, title: &str) -> Result<String, ServiceError> {
        let url = self.options.url_for(title)?;
        log::debug!(target: TARGET, "GET {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response
            .text()
            .await
            .map_err(|e| ServiceError::Transport(e.to_string()))
    }
}

/// The message of a fetch-failure marker standing in for the whole page.
fn page_fetch_failure(doc: &Document) -> Option<String> {
    doc.children(doc.root())
        .iter()
        .find(|id| doc.has_type(**id, "mw:Error") && doc.has_class(**id, "mw-fetch-error"))
        .map(|id| doc.text_content(*id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::fetch::MemoryProvider;
    use std::sync::Arc;

    fn local(provider: MemoryProvider, options: EnvOptions) -> ParseService {
        ParseService::new(
            ParserPipelineFactory::new(Arc::new(provider)),
            options,
            ServiceOptions::default(),
        )
    }

    #[test]
    fn test_service_url_appends_title() {
        let options = ServiceOptions::default();
        assert_eq!(
            options.url_for("Main page").unwrap().as_str(),
            "http://localhost:8000/Main_page"
        );
        let nested = ServiceOptions {
            service_url: "http://parsoid.local/wiki/".into(),
        };
        assert_eq!(
            nested.url_for("Foo").unwrap().as_str(),
            "http://parsoid.local/wiki/Foo"
        );
        let broken = ServiceOptions {
            service_url: "not a url".into(),
        };
        assert!(matches!(broken.url_for("Foo"), Err(ServiceError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_local_parse_transcludes_page() {
        let service = local(
            MemoryProvider::new().with_page("Foo", "''hi''"),
            EnvOptions::default(),
        );
        let html = service.parse("Foo", false).await.unwrap();
        assert!(html.contains("mw:Transclusion"));
        assert!(html.contains("<i>hi</i>"));
    }

    #[tokio::test]
    async fn test_local_parse_without_fetching_keeps_source() {
        let service = local(
            MemoryProvider::new().with_page("Foo", "{{Bar}}"),
            EnvOptions {
                fetch_templates: false,
                ..Default::default()
            },
        );
        let html = service.parse("Foo", false).await.unwrap();
        assert!(!html.contains("mw:Transclusion"));
        assert_eq!(html, "{{:Foo}}");
    }

    #[tokio::test]
    async fn test_callback_runs_once() {
        let service = local(MemoryProvider::new(), EnvOptions::default());
        let mut calls = Vec::new();
        service
            .parse_with_callback("Missing", false, |result| calls.push(result.is_ok()))
            .await;
        assert_eq!(calls, vec![true]);
    }
}
