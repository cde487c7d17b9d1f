//! Settings for the parser environment and the parse service.
//!
//! Precedence, lowest first:
//!
//! 1. `defaults/wikidom.default.toml`, compiled in
//! 2. a `wikidom.toml` file, optional unless named explicitly
//! 3. overrides keyed by dotted path (`environment.max_depth`), which is how CLI flags land
//!
//! ```text
//! [environment]
//! page_title = "Sandbox"
//! fetch_templates = false
//!
//! [service]
//! service_url = "http://parse.local/"
//! ```

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, ValueKind};
use serde::Deserialize;
use std::path::Path;
use wikidom_parser::wiki::service::ServiceOptions;
use wikidom_parser::wiki::EnvOptions;

pub use config::ConfigError as LoadError;

const DEFAULT_TOML: &str = include_str!("../defaults/wikidom.default.toml");

/// The `[environment]` and `[service]` tables.
#[derive(Debug, Clone, Deserialize)]
pub struct WikidomConfig {
    /// Handed to `Environment::new` for every parse.
    pub environment: EnvOptions,
    pub service: ServiceOptions,
}

/// Builds a [`WikidomConfig`] from the compiled-in table plus whatever the caller adds.
#[derive(Debug, Clone)]
pub struct Loader {
    builder: ConfigBuilder<DefaultState>,
}

impl Loader {
    pub fn new() -> Self {
        let builder = Config::builder().add_source(File::from_str(DEFAULT_TOML, FileFormat::Toml));
        Self { builder }
    }

    /// A TOML file the user asked for by name; [`build`](Self::build) fails if it is absent.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(true);
        self.builder = self.builder.add_source(source);
        self
    }

    /// A TOML file picked up by convention, such as `./wikidom.toml`.
    pub fn with_optional_file(mut self, path: impl AsRef<Path>) -> Self {
        let source = File::from(path.as_ref())
            .format(FileFormat::Toml)
            .required(false);
        self.builder = self.builder.add_source(source);
        self
    }

    /// Set one dotted key. `service.service_url` and `environment.fetch_templates` are
    /// typical. A value of the wrong type is only reported by [`build`](Self::build).
    pub fn set_override<I>(mut self, key: &str, value: I) -> Result<Self, ConfigError>
    where
        I: Into<ValueKind>,
    {
        self.builder = self.builder.set_override(key, value)?;
        Ok(self)
    }

    pub fn build(self) -> Result<WikidomConfig, ConfigError> {
        self.builder.build()?.try_deserialize()
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}

/// The compiled-in settings alone.
pub fn load_defaults() -> Result<WikidomConfig, ConfigError> {
    Loader::new().build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_default_config() {
        let config = load_defaults().expect("defaults to deserialize");
        assert_eq!(config.environment, EnvOptions::default());
        assert_eq!(config.service, ServiceOptions::default());
        assert_eq!(config.environment.max_depth, 40);
        assert_eq!(config.environment.script, "http://localhost/mediawiki/");
        assert!(config.environment.fetch_templates);
    }

    #[test]
    fn supports_overrides() {
        let config = Loader::new()
            .set_override("environment.max_depth", 3i64)
            .expect("override to apply")
            .set_override("environment.fetch_templates", false)
            .expect("override to apply")
            .build()
            .expect("config to build");
        assert_eq!(config.environment.max_depth, 3);
        assert!(!config.environment.fetch_templates);
        assert_eq!(config.environment.page_title, "Main Page");
    }

    #[test]
    fn mistyped_override_fails_at_build() {
        let loader = Loader::new()
            .set_override("environment.max_depth", "deep")
            .expect("override to be recorded");
        assert!(loader.build().is_err());
    }

    #[test]
    fn layers_user_file_over_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(
            file,
            "[environment]\npage_title = \"Sandbox\"\n\n[service]\nservice_url = \"http://parse.local/\""
        )
        .expect("write config");

        let config = Loader::new()
            .with_file(file.path())
            .build()
            .expect("config to build");
        assert_eq!(config.environment.page_title, "Sandbox");
        assert_eq!(config.environment.fetch_timeout_ms, 10000);
        assert_eq!(config.service.service_url, "http://parse.local/");
    }

    #[test]
    fn missing_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let absent = dir.path().join("absent.toml");

        assert!(Loader::new().with_file(&absent).build().is_err());
        let config = Loader::new()
            .with_optional_file(&absent)
            .build()
            .expect("optional file to be skipped");
        assert_eq!(config.environment.max_depth, 40);
    }
}
