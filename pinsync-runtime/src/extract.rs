//! Pulls the banner image and one-line description out of a README.
//!
//! The READMEs open with a block like:
//!
//! ```text
//! <center>
//! <img src="https://example.org/banner.png">
//!
//! A short description of the project.
//! </center>
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ExtractionError;

static CENTER_BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<center\b[^>]*>(.*?)</center\s*>").expect("valid center block regex")
});
static IMG_SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*"([^"]+)"[^>]*>"#).expect("valid img regex")
});
static TAG_ONLY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:<[^>]*>\s*)+$").expect("valid tag-only regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub image_url: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PatternExtractor;

impl PatternExtractor {
    pub fn new() -> Self {
        Self
    }

    /// The first centered block holding an image wins. The description is
    /// the last line of text after the image inside that block.
    pub fn extract(&self, document: &str) -> Result<Extracted, ExtractionError> {
        for block in CENTER_BLOCK_RE.captures_iter(document) {
            let Some(body) = block.get(1) else {
                continue;
            };
            let body = body.as_str();

            let Some(img) = IMG_SRC_RE.captures(body) else {
                continue;
            };
            let image_url = img[1].trim().to_string();
            let after_image = img.get(0).map_or(body.len(), |m| m.end());

            // str::lines drops the trailing '\r' of CRLF documents.
            let description = body[after_image..]
                .lines()
                .map(str::trim)
                .rfind(|line| !line.is_empty() && !TAG_ONLY_RE.is_match(line));

            return match description {
                Some(description) => Ok(Extracted {
                    image_url,
                    description: description.to_string(),
                }),
                None => Err(ExtractionError::MissingDescription),
            };
        }

        Err(ExtractionError::NoCenteredImage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const README: &str = "<center>\n<img src=\"https://cdn.example.org/banner.png\">\n\nTiny sync daemon for pinned repos\n</center>\n\n# pinsync\n\nMore text.\n";

    #[test]
    fn extracts_image_and_description() {
        let extracted = PatternExtractor::new().extract(README).unwrap();
        assert_eq!(extracted.image_url, "https://cdn.example.org/banner.png");
        assert_eq!(extracted.description, "Tiny sync daemon for pinned repos");
    }

    #[test]
    fn tolerates_crlf_line_endings() {
        let crlf = README.replace('\n', "\r\n");
        let extracted = PatternExtractor::new().extract(&crlf).unwrap();
        assert_eq!(extracted.image_url, "https://cdn.example.org/banner.png");
        assert_eq!(extracted.description, "Tiny sync daemon for pinned repos");
    }

    #[test]
    fn ignores_extra_img_attributes_and_markup_lines() {
        let doc = "<CENTER align=\"middle\">\r\n  <img width=\"400\" src=\"img/logo.svg\" alt=\"logo\">\r\n  <br>\r\n  Kanban board in the terminal\r\n  <br/>\r\n</CENTER>";
        let extracted = PatternExtractor::new().extract(doc).unwrap();
        assert_eq!(extracted.image_url, "img/logo.svg");
        assert_eq!(extracted.description, "Kanban board in the terminal");
    }

    #[test]
    fn skips_centered_blocks_without_image() {
        let doc = "<center>badges</center>\n<center>\n<img src=\"a.png\">\nSecond block\n</center>";
        let extracted = PatternExtractor::new().extract(doc).unwrap();
        assert_eq!(extracted.image_url, "a.png");
        assert_eq!(extracted.description, "Second block");
    }

    #[test]
    fn fails_without_centered_block() {
        let doc = "# Title\n\n![banner](banner.png)\n\nNo centered block here.";
        assert_eq!(
            PatternExtractor::new().extract(doc),
            Err(ExtractionError::NoCenteredImage)
        );
        assert_eq!(
            PatternExtractor::new().extract(""),
            Err(ExtractionError::NoCenteredImage)
        );
    }

    #[test]
    fn fails_when_no_text_follows_the_image() {
        let doc = "<center>\n<img src=\"a.png\">\n\n</center>";
        assert_eq!(
            PatternExtractor::new().extract(doc),
            Err(ExtractionError::MissingDescription)
        );
    }
}
