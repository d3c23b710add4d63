use std::path::Path;

use mupdf::{Document, TextPageFlags};

use placeboscan_core::{ExtractorError, PageExtractor};

/// MuPDF-based implementation of [`PageExtractor`].
///
/// This crate is the sole AGPL island — it isolates the mupdf dependency
/// (which is AGPL-3.0) so that non-PDF code paths do not transitively
/// depend on it.
///
/// Extraction is page-addressable: the scan pipeline needs each page's text
/// separately so a mention can be attributed to a page index. No region of
/// the page is excluded; a mention in a footnote counts like any other.
#[derive(Debug, Default)]
pub struct MupdfExtractor;

impl MupdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl PageExtractor for MupdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractorError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| ExtractorError::Open("invalid path encoding".into()))?;

        let document =
            Document::open(path_str).map_err(|e| ExtractorError::Open(e.to_string()))?;

        let mut pages_text = Vec::new();

        for page_result in document
            .pages()
            .map_err(|e| ExtractorError::Extraction(e.to_string()))?
        {
            let page = page_result.map_err(|e| ExtractorError::Extraction(e.to_string()))?;
            let text_page = page
                .to_text_page(TextPageFlags::empty())
                .map_err(|e| ExtractorError::Extraction(e.to_string()))?;

            let mut page_text = String::new();
            for block in text_page.blocks() {
                for line in block.lines() {
                    let line_text: String = line
                        .chars()
                        .map(|c| c.char().unwrap_or('\u{FFFD}'))
                        .collect();
                    page_text.push_str(&line_text);
                    page_text.push('\n');
                }
            }
            pages_text.push(page_text);
        }

        Ok(pages_text)
    }
}
