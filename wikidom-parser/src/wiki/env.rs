//! Per-request parse environment.
//!
//! An [`Environment`] is built from [`EnvOptions`] for exactly one parse request and
//! dropped with its pipeline. It holds page configuration, the behavior-switch variable
//! table, the template expansion stack used for recursion guards, and the diagnostics
//! collected while transforms ran. Nothing in here is global.

use crate::wiki::title::Title;
use crate::wiki::transforms::ExpansionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Options recognized when constructing an [`Environment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvOptions {
    pub page_title: String,
    pub script: String,
    pub script_path: String,
    pub script_extension: String,
    pub upload_path: String,
    pub fetch_templates: bool,
    pub debug: bool,
    pub trace: bool,
    pub max_depth: usize,
    pub fetch_timeout_ms: u64,
}

impl Default for EnvOptions {
    fn default() -> Self {
        Self {
            page_title: "Main Page".to_string(),
            script: "http://localhost/mediawiki/".to_string(),
            script_path: String::new(),
            script_extension: ".php".to_string(),
            upload_path: "http://upload.wikimedia.org/wikipedia/commons".to_string(),
            fetch_templates: true,
            debug: false,
            trace: false,
            max_depth: 40,
            fetch_timeout_ms: 10_000,
        }
    }
}

impl EnvOptions {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// URL that returns the raw wikitext of `title`.
    pub fn raw_url(&self, title: &Title) -> Result<Url, url::ParseError> {
        let base = format!(
            "{}{}",
            self.script.trim_end_matches('/'),
            self.script_path.trim_end_matches('/')
        );
        let mut url = Url::parse(&format!(
            "{}/index{}",
            base, self.script_extension
        ))?;
        url.query_pairs_mut()
            .append_pair("title", &title.db_key())
            .append_pair("action", "raw");
        Ok(url)
    }

    pub fn upload_url(&self, file_name: &str) -> String {
        format!(
            "{}/{}",
            self.upload_path.trim_end_matches('/'),
            file_name.trim().replace(' ', "_")
        )
    }
}

/// Value stored for a magic word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariableValue {
    Flag(bool),
    Text(String),
}

impl VariableValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            VariableValue::Flag(flag) => *flag,
            VariableValue::Text(text) => !text.is_empty(),
        }
    }
}

impl From<bool> for VariableValue {
    fn from(value: bool) -> Self {
        VariableValue::Flag(value)
    }
}

impl From<&str> for VariableValue {
    fn from(value: &str) -> Self {
        VariableValue::Text(value.to_string())
    }
}

impl From<String> for VariableValue {
    fn from(value: String) -> Self {
        VariableValue::Text(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Transform,
    Expansion,
    Nesting,
}

/// Something that went wrong but did not stop the parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Environment {
    options: EnvOptions,
    page_name: String,
    variables: BTreeMap<String, VariableValue>,
    expansion_stack: Vec<Title>,
    diagnostics: Vec<Diagnostic>,
}

impl Environment {
    pub fn new(options: EnvOptions) -> Self {
        let page_name = options.page_title.clone();
        Self {
            options,
            page_name,
            variables: BTreeMap::new(),
            expansion_stack: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn options(&self) -> &EnvOptions {
        &self.options
    }

    pub fn page_name(&self) -> &str {
        &self.page_name
    }

    pub fn set_page_name(&mut self, name: impl Into<String>) {
        self.page_name = name.into();
    }

    pub fn page_title(&self) -> Title {
        Title::parse(&self.page_name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: impl Into<VariableValue>) {
        self.variables.insert(name.into(), value.into());
    }

    pub fn variable(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(name)
    }

    /// True when `name` holds a truthy value.
    pub fn is_set(&self, name: &str) -> bool {
        self.variables
            .get(name)
            .map(VariableValue::is_truthy)
            .unwrap_or(false)
    }

    pub fn variables(&self) -> &BTreeMap<String, VariableValue> {
        &self.variables
    }

    /// Push `title` on the expansion stack, refusing loops and expansions past
    /// `max_depth`. Returns the new depth.
    pub fn enter_expansion(&mut self, title: &Title) -> Result<usize, ExpansionError> {
        if self.expansion_stack.contains(title) {
            return Err(ExpansionError::Loop {
                title: title.full_text(),
            });
        }
        if self.expansion_stack.len() >= self.options.max_depth {
            return Err(ExpansionError::DepthExceeded {
                title: title.full_text(),
                depth: self.options.max_depth,
            });
        }
        self.expansion_stack.push(title.clone());
        Ok(self.expansion_stack.len())
    }

    pub fn exit_expansion(&mut self) {
        self.expansion_stack.pop();
    }

    pub fn depth(&self) -> usize {
        self.expansion_stack.len()
    }

    pub fn report(&mut self, kind: DiagnosticKind, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            kind,
            message: message.into(),
        });
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// URL that returns the raw wikitext of `title`.
    pub fn raw_url(&self, title: &Title) -> Result<Url, url::ParseError> {
        self.options.raw_url(title)
    }

    pub fn upload_url(&self, file_name: &str) -> String {
        self.options.upload_url(file_name)
    }

    /// Relative article href as emitted on links (`./Foo_bar`).
    pub fn article_href(&self, title: &Title) -> String {
        format!("./{}", title.db_key())
    }
}
