use std::path::Path;

use placeboscan_core::{DocExtractor, ExtractorError};

/// Whole-document fallback implementation of [`DocExtractor`], built on the
/// pure-Rust `pdf-extract` crate.
///
/// Used when the page-addressable backend found nothing or failed: a second
/// extraction engine recovers text from files the primary mishandles, at the
/// cost of page attribution.
#[derive(Debug, Default)]
pub struct PdfExtractFallback;

impl PdfExtractFallback {
    pub fn new() -> Self {
        Self
    }
}

impl DocExtractor for PdfExtractFallback {
    fn extract_document(&self, path: &Path) -> Result<String, ExtractorError> {
        let bytes = std::fs::read(path)?;
        pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| ExtractorError::Extraction(e.to_string()))
    }
}
