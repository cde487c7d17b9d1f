//! Vocabulary tables used during tokenization: allowed HTML tags, magic words and
//! image options.

use crate::wiki::token::Attributes;
use once_cell::sync::Lazy;
use regex::Regex;

/// HTML tags passed through as tag tokens. Anything else stays literal text.
pub const ALLOWED_TAGS: &[&str] = &[
    "b",
    "big",
    "blockquote",
    "br",
    "center",
    "code",
    "div",
    "em",
    "font",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "hr",
    "i",
    "includeonly",
    "li",
    "noinclude",
    "ol",
    "onlyinclude",
    "p",
    "ref",
    "references",
    "s",
    "small",
    "span",
    "strong",
    "sub",
    "sup",
    "u",
    "ul",
];

pub const VOID_TAGS: &[&str] = &["br", "hr"];

/// Behavior switches recognized as `__WORD__`.
pub const BEHAVIOR_SWITCHES: &[&str] = &[
    "NOTOC",
    "FORCETOC",
    "TOC",
    "NOEDITSECTION",
    "NEWSECTIONLINK",
    "NONEWSECTIONLINK",
    "NOGALLERY",
    "HIDDENCAT",
    "INDEX",
    "NOINDEX",
    "STATICREDIRECT",
    "NOTITLECONVERT",
    "NOCONTENTCONVERT",
    "DISAMBIG",
];

static TAG_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^</?([a-zA-Z][a-zA-Z0-9]*)").expect("valid tag name regex"));

static TAG_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"([a-zA-Z_:][-a-zA-Z0-9_:.]*)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>/=]+)))?"#,
    )
    .expect("valid attribute regex")
});

static IMAGE_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d*)(?:x(\d+))?\s*px$").expect("valid image size regex"));

/// Parsed view of a raw HTML tag lexeme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlTag {
    pub name: String,
    pub attrs: Attributes,
    pub self_closing: bool,
}

pub fn is_allowed_tag(name: &str) -> bool {
    ALLOWED_TAGS.contains(&name)
}

pub fn is_void_tag(name: &str) -> bool {
    VOID_TAGS.contains(&name)
}

pub fn is_behavior_switch(word: &str) -> bool {
    BEHAVIOR_SWITCHES.contains(&word)
}

/// Parse `<name attr="v" ...>` or `</name>`. The name is lowercased.
pub fn parse_html_tag(raw: &str) -> Option<HtmlTag> {
    let captures = TAG_NAME.captures(raw)?;
    let name_match = captures.get(1)?;
    let name = name_match.as_str().to_ascii_lowercase();
    let body = raw[name_match.end()..].trim_end_matches('>');
    let self_closing = body.trim_end().ends_with('/');

    let mut attrs = Attributes::new();
    for attr in TAG_ATTR.captures_iter(body.trim_end_matches('/')) {
        let key = attr[1].to_ascii_lowercase();
        let value = attr
            .get(2)
            .or_else(|| attr.get(3))
            .or_else(|| attr.get(4))
            .map(|m| m.as_str())
            .unwrap_or("");
        attrs.set(key, value);
    }

    Some(HtmlTag {
        name,
        attrs,
        self_closing,
    })
}

/// A recognized image option from a file link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOption {
    Format(&'static str),
    Align(&'static str),
    Size {
        width: Option<u32>,
        height: Option<u32>,
    },
    Border,
    Upright,
    Keyed(String, String),
}

/// Classify one `|`-separated part of a file link. `None` means the part is a caption.
pub fn image_option(raw: &str) -> Option<ImageOption> {
    let part = raw.trim();
    let lower = part.to_ascii_lowercase();
    let option = match lower.as_str() {
        "thumb" | "thumbnail" => ImageOption::Format("thumb"),
        "frame" | "framed" | "enframed" => ImageOption::Format("frame"),
        "frameless" => ImageOption::Format("frameless"),
        "left" => ImageOption::Align("left"),
        "right" => ImageOption::Align("right"),
        "center" | "centre" => ImageOption::Align("center"),
        "none" => ImageOption::Align("none"),
        "border" => ImageOption::Border,
        "upright" => ImageOption::Upright,
        _ => {
            if let Some(size) = IMAGE_SIZE.captures(&lower) {
                let width = size.get(1).and_then(|m| m.as_str().parse().ok());
                let height = size.get(2).and_then(|m| m.as_str().parse().ok());
                if width.is_none() && height.is_none() {
                    return None;
                }
                ImageOption::Size { width, height }
            } else {
                let (key, value) = part.split_once('=')?;
                let key = key.trim().to_ascii_lowercase();
                match key.as_str() {
                    "link" | "alt" | "page" | "class" | "upright" | "lang" => {
                        ImageOption::Keyed(key, value.trim().to_string())
                    }
                    _ => return None,
                }
            }
        }
    };
    Some(option)
}

/// Namespaces whose links render as media rather than anchors.
pub fn is_file_target(target: &str) -> bool {
    let Some((namespace, _)) = target.split_once(':') else {
        return false;
    };
    matches!(
        namespace.trim().to_ascii_lowercase().as_str(),
        "file" | "image"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_html_tag_with_attributes() {
        let tag = parse_html_tag("<SPAN class=\"a b\" id=x title='t'>").unwrap();
        assert_eq!(tag.name, "span");
        assert_eq!(tag.attrs.get("class"), Some("a b"));
        assert_eq!(tag.attrs.get("id"), Some("x"));
        assert_eq!(tag.attrs.get("title"), Some("t"));
        assert!(!tag.self_closing);
    }

    #[test]
    fn test_parse_self_closing_and_close_tags() {
        let tag = parse_html_tag("<references />").unwrap();
        assert!(tag.self_closing);
        assert!(tag.attrs.is_empty());

        let close = parse_html_tag("</div >").unwrap();
        assert_eq!(close.name, "div");
    }

    #[test]
    fn test_image_options() {
        assert_eq!(image_option("thumb"), Some(ImageOption::Format("thumb")));
        assert_eq!(image_option(" left "), Some(ImageOption::Align("left")));
        assert_eq!(
            image_option("200px"),
            Some(ImageOption::Size {
                width: Some(200),
                height: None
            })
        );
        assert_eq!(
            image_option("alt=A cat"),
            Some(ImageOption::Keyed("alt".into(), "A cat".into()))
        );
        assert_eq!(image_option("A cat on a mat"), None);
        assert_eq!(image_option("px"), None);
    }

    #[test]
    fn test_file_targets() {
        assert!(is_file_target("File:Foo.png"));
        assert!(is_file_target("image:Foo.png"));
        assert!(!is_file_target("Help:Foo"));
        assert!(!is_file_target("Foo"));
    }
}
