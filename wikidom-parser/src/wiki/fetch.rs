//! Content providers for template and page fetching.
//!
//! A provider answers "what is the wikitext of this title?" with either the full text or
//! an explicit [`PageContent::NotFound`]. Transport problems are [`FetchError`]s.

use crate::wiki::env::EnvOptions;
use crate::wiki::title::Title;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

const TARGET: &str = "wikidom::fetch";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageContent {
    Found(String),
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The request could not be sent or the response could not be read.
    Transport(String),
    /// The server answered with a status other than success or not-found.
    Status { title: String, status: u16 },
    /// The provider could not build a request URL.
    InvalidUrl(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(msg) => write!(f, "Fetch transport error: {}", msg),
            FetchError::Status { title, status } => {
                write!(f, "Fetch of {} failed with status {}", title, status)
            }
            FetchError::InvalidUrl(msg) => write!(f, "Invalid fetch URL: {}", msg),
        }
    }
}

impl std::error::Error for FetchError {}

#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn fetch(&self, title: &Title) -> Result<PageContent, FetchError>;
}

/// In-memory pages keyed by full title text (`Template:Foo`).
///
/// Lock poisoning is ignored: every write is a single `insert`.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    pages: RwLock<HashMap<String, String>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, title: &str, content: impl Into<String>) -> Self {
        self.insert(title, content);
        self
    }

    pub fn insert(&self, title: &str, content: impl Into<String>) {
        let key = Title::parse(title).full_text();
        self.pages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, content.into());
    }
}

#[async_trait]
impl ContentProvider for MemoryProvider {
    async fn fetch(&self, title: &Title) -> Result<PageContent, FetchError> {
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        Ok(match pages.get(&title.full_text()) {
            Some(content) => PageContent::Found(content.clone()),
            None => PageContent::NotFound,
        })
    }
}

/// Fetches raw wikitext over HTTP from `index.php?title=...&action=raw`.
pub struct HttpProvider {
    client: reqwest::Client,
    options: EnvOptions,
}

impl HttpProvider {
    pub fn new(options: EnvOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            options,
        }
    }
}

#[async_trait]
impl ContentProvider for HttpProvider {
    async fn fetch(&self, title: &Title) -> Result<PageContent, FetchError> {
        let url = self
            .options
            .raw_url(title)
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        log::debug!(target: TARGET, "GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            log::debug!(target: TARGET, "{} not found", title.full_text());
            return Ok(PageContent::NotFound);
        }
        if !status.is_success() {
            log::warn!(target: TARGET, "fetch of {} answered {}", title.full_text(), status);
            return Err(FetchError::Status {
                title: title.full_text(),
                status: status.as_u16(),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(PageContent::Found(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_provider_normalizes_titles() {
        let provider = MemoryProvider::new().with_page("template:foo_bar", "hi");
        let found = provider
            .fetch(&Title::for_transclusion("Foo bar"))
            .await
            .unwrap();
        assert_eq!(found, PageContent::Found("hi".into()));

        let missing = provider.fetch(&Title::parse("Nope")).await.unwrap();
        assert_eq!(missing, PageContent::NotFound);
    }

    #[tokio::test]
    async fn test_memory_provider_survives_a_panicked_writer() {
        let provider = MemoryProvider::new().with_page("Template:Kept", "old");
        std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                let _guard = provider.pages.write().unwrap();
                panic!("writer failed");
            });
            assert!(writer.join().is_err());
        });
        assert!(provider.pages.is_poisoned());

        provider.insert("Template:Added", "new");
        let added = provider
            .fetch(&Title::for_transclusion("Added"))
            .await
            .unwrap();
        assert_eq!(added, PageContent::Found("new".into()));
        let kept = provider
            .fetch(&Title::for_transclusion("Kept"))
            .await
            .unwrap();
        assert_eq!(kept, PageContent::Found("old".into()));
    }
}
