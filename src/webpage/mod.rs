//! Webpage model extraction
//!
//! This module turns fetched markup into the normalized model the discovery
//! engine works on:
//! - Hyperlinks (href, class, rel, serialized content)
//! - Image sources
//! - Inline frame sources
//!
//! It also decodes fetched image bytes into `WebImage` records carrying the
//! content hash used for deduplication.

mod image;
mod parser;

pub use self::image::{decode_data_uri, decode_image, WebImage};
pub use parser::parse_webpage;

use std::fmt;

/// A hyperlink found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Absolute, normalized target URL
    pub href: String,

    /// Raw `class` attribute
    pub classes: Option<String>,

    /// Raw `rel` attribute
    pub rel: Option<String>,

    /// Serialized child markup, if any
    pub text_content: Option<String>,
}

impl Link {
    /// Creates a bare link with only an href
    pub fn new(href: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            classes: None,
            rel: None,
            text_content: None,
        }
    }

    /// Serializes the link back into an anchor element
    ///
    /// Discovery compares links in this form, so a "next" button keeps its
    /// class, rel and label when matched against the links of another page.
    pub fn to_markup(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<a href=\"{}\"", self.href)?;
        if let Some(classes) = &self.classes {
            write!(f, " class=\"{}\"", classes)?;
        }
        if let Some(rel) = &self.rel {
            write!(f, " rel=\"{}\"", rel)?;
        }
        write!(f, ">{}</a>", self.text_content.as_deref().unwrap_or(""))
    }
}

/// Normalized extraction of a fetched page
///
/// Produced fresh per fetch and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebpageModel {
    /// Normalized URL of the page (after redirects)
    pub url: String,

    /// Links in document order
    pub links: Vec<Link>,

    /// Image sources in document order
    pub images: Vec<String>,

    /// Inline frame sources in document order
    pub inline_frames: Vec<String>,
}

impl WebpageModel {
    /// Hrefs of every link, in document order
    pub fn link_hrefs(&self) -> Vec<String> {
        self.links.iter().map(|link| link.href.clone()).collect()
    }

    /// Returns true if `src` is one of the page's images
    pub fn has_image(&self, src: &str) -> bool {
        self.images.iter().any(|image| image == src)
    }
}
