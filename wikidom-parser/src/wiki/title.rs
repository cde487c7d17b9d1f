//! Page title normalization.

use std::fmt;

const NAMESPACES: &[&str] = &[
    "Talk",
    "User",
    "User talk",
    "Project",
    "File",
    "MediaWiki",
    "Template",
    "Template talk",
    "Help",
    "Category",
    "Special",
    "Media",
];

/// A normalized page title: canonical namespace plus text with spaces, first letter
/// uppercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Title {
    namespace: String,
    text: String,
}

impl Title {
    /// Parse a title as written in a link or request.
    pub fn parse(raw: &str) -> Self {
        let cleaned = collapse_whitespace(&raw.replace('_', " "));
        let cleaned = cleaned.trim_start_matches(':').trim();

        if let Some((prefix, rest)) = cleaned.split_once(':') {
            if let Some(namespace) = canonical_namespace(prefix) {
                return Self {
                    namespace: namespace.to_string(),
                    text: capitalize(rest.trim()),
                };
            }
        }
        Self {
            namespace: String::new(),
            text: capitalize(cleaned),
        }
    }

    /// Resolve a template target. Bare names live in the Template namespace, a leading
    /// `:` selects the main namespace.
    pub fn for_transclusion(target: &str) -> Self {
        let trimmed = target.trim();
        if trimmed.starts_with(':') {
            return Self::parse(trimmed);
        }
        let title = Self::parse(trimmed);
        if title.namespace.is_empty() {
            Self {
                namespace: "Template".to_string(),
                text: title.text,
            }
        } else {
            title
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn full_text(&self) -> String {
        if self.namespace.is_empty() {
            self.text.clone()
        } else {
            format!("{}:{}", self.namespace, self.text)
        }
    }

    /// Underscore form used in URLs and hrefs.
    pub fn db_key(&self) -> String {
        self.full_text().replace(' ', "_")
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_text())
    }
}

fn canonical_namespace(prefix: &str) -> Option<&'static str> {
    let prefix = prefix.trim();
    if prefix.eq_ignore_ascii_case("image") {
        return Some("File");
    }
    if prefix.eq_ignore_ascii_case("wikipedia") {
        return Some("Project");
    }
    NAMESPACES
        .iter()
        .copied()
        .find(|ns| ns.eq_ignore_ascii_case(prefix))
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transclusion_targets() {
        assert_eq!(Title::for_transclusion("foo").full_text(), "Template:Foo");
        assert_eq!(Title::for_transclusion(":foo").full_text(), "Foo");
        assert_eq!(Title::for_transclusion("Help:x").full_text(), "Help:X");
    }

    #[test]
    fn test_normalization() {
        let title = Title::parse("  main_page  ");
        assert_eq!(title.full_text(), "Main page");
        assert_eq!(title.db_key(), "Main_page");
        assert_eq!(Title::parse("image:Cat.png").full_text(), "File:Cat.png");
        assert_eq!(Title::parse("Foo: bar").full_text(), "Foo: bar");
    }
}
