//! Block image attributes.
//!
//! A block image is a `figure` typed `mw:Image/Thumb` or `mw:Image/Frame`, aligned by an
//! `mw-halign-*` class, holding an `a > img` pair and an optional `figcaption`.

use crate::wiki::tree::{Document, NodeId};

pub const ALIGNMENTS: &[&str] = &["left", "right", "center", "none"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// `thumb`, `frame`, `frameless` or `` for a plain image.
    pub image_type: String,
    /// One of [`ALIGNMENTS`] or `default`.
    pub align: String,
    pub default_size: bool,
    /// Target page, e.g. `File:Cat.png`.
    pub resource: Option<String>,
    pub src: Option<String>,
    pub href: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub alt: Option<String>,
    pub caption: Option<NodeId>,
}

impl ImageData {
    pub fn from_figure(doc: &Document, figure: NodeId) -> Self {
        let image_type = doc
            .attr(figure, "typeof")
            .and_then(|value| {
                value
                    .split_whitespace()
                    .find_map(|word| word.strip_prefix("mw:Image"))
            })
            .map(|rest| rest.trim_start_matches('/').to_ascii_lowercase())
            .unwrap_or_default();

        let align = ALIGNMENTS
            .iter()
            .find(|align| doc.has_class(figure, &format!("mw-halign-{}", align)))
            .map(|align| align.to_string())
            .unwrap_or_else(|| "default".to_string());

        let mut data = Self {
            image_type,
            align,
            default_size: doc.has_class(figure, "mw-default-size"),
            resource: None,
            src: None,
            href: None,
            width: None,
            height: None,
            alt: None,
            caption: None,
        };

        for id in doc.descendants(figure).into_iter().skip(1) {
            match doc.name(id) {
                Some("img") if data.src.is_none() => {
                    data.resource = doc
                        .attr(id, "resource")
                        .map(crate::wiki::model::title_from_href);
                    data.src = doc.attr(id, "src").map(str::to_string);
                    data.width = doc.attr(id, "width").and_then(|w| w.parse().ok());
                    data.height = doc.attr(id, "height").and_then(|h| h.parse().ok());
                    data.alt = doc.attr(id, "alt").map(str::to_string);
                }
                Some("a") if data.href.is_none() => {
                    data.href = doc.attr(id, "href").map(str::to_string);
                }
                Some("figcaption") if data.caption.is_none() => data.caption = Some(id),
                _ => {}
            }
        }
        data
    }

    /// `typeof` value for this image type.
    pub fn rdfa_type(&self) -> String {
        let mut chars = self.image_type.chars();
        match chars.next() {
            Some(first) => format!("mw:Image/{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => "mw:Image".to_string(),
        }
    }

    /// `class` value for alignment and sizing, if any.
    pub fn class(&self) -> Option<String> {
        let mut classes = Vec::new();
        if self.align != "default" {
            classes.push(format!("mw-halign-{}", self.align));
        }
        if self.default_size {
            classes.push("mw-default-size".to_string());
        }
        (!classes.is_empty()).then(|| classes.join(" "))
    }

    /// Link options in source order: format, alignment, size.
    pub fn options(&self) -> Vec<String> {
        let mut options = Vec::new();
        if !self.image_type.is_empty() {
            options.push(self.image_type.clone());
        }
        if self.align != "default" {
            options.push(self.align.clone());
        }
        match (self.width, self.height) {
            (Some(w), Some(h)) => options.push(format!("{}x{}px", w, h)),
            (Some(w), None) => options.push(format!("{}px", w)),
            (None, Some(h)) => options.push(format!("x{}px", h)),
            (None, None) => {}
        }
        if let Some(alt) = &self.alt {
            options.push(format!("alt={}", alt));
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiki::token::Attributes;

    #[test]
    fn test_reads_figure_markup() {
        let mut doc = Document::new();
        let attrs: Attributes = vec![
            ("typeof", "mw:Image/Thumb"),
            ("class", "mw-halign-right mw-default-size"),
        ]
        .into_iter()
        .collect();
        let figure = doc.append_element(doc.root(), "figure", attrs);
        let a = doc.append_element(
            figure,
            "a",
            vec![("href", "./File:Cat.png")].into_iter().collect(),
        );
        doc.append_element(
            a,
            "img",
            vec![("resource", "./File:Cat.png"), ("width", "120")]
                .into_iter()
                .collect(),
        );
        let caption = doc.append_element(figure, "figcaption", Attributes::new());

        let data = ImageData::from_figure(&doc, figure);
        assert_eq!(data.image_type, "thumb");
        assert_eq!(data.align, "right");
        assert!(data.default_size);
        assert_eq!(data.resource.as_deref(), Some("File:Cat.png"));
        assert_eq!(data.width, Some(120));
        assert_eq!(data.caption, Some(caption));
        assert_eq!(data.rdfa_type(), "mw:Image/Thumb");
        assert_eq!(data.options(), vec!["thumb", "right", "120px"]);
    }
}
